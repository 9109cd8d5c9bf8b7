// Copyright (c) 2025 Joshua Seaton
//
// Use of this source code is governed by a MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT

//! Streaming WebAssembly module decoding.
//!
//! A [`Decoder`] turns the binary encoding of a module into a sequence of
//! [`SectionItem`](types::SectionItem)s, decoding each one only when it is
//! asked for. Input may be fully resident in memory or arrive in chunks from a
//! [`ChunkSource`](cursor::ChunkSource); either way, the underlying source is
//! released exactly once, whether decoding completes, fails, or is abandoned.

#![cfg_attr(not(any(test, feature = "std")), no_std)]
#![cfg_attr(nightly, feature(allocator_api))]

#[cfg(nightly)]
extern crate alloc;

pub mod core_compat;
pub mod cursor;
pub mod decode;
pub mod types;

use core::fmt;
use core::iter::FusedIterator;

use log::debug;

use cursor::{Buffer, ChunkSource, Cursor, StreamCursor};
use decode::{ContextStack, Error, ErrorWithContext, Namespaces, Parser, SectionState};
use types::SectionItem;

/// A convenience trait that captures the required allocation-related trait
/// bounds.
pub trait Allocator: core_compat::alloc::Allocator + fmt::Debug + Clone {}

impl<A> Allocator for A where A: core_compat::alloc::Allocator + fmt::Debug + Clone {}

/// Runtime knobs for a [`Decoder`].
#[derive(Clone, Copy)]
pub struct DecodeOptions {
    max_locals_per_function: usize,
    retain_custom_payload: fn(&str) -> bool,
}

impl DecodeOptions {
    /// The default cap on the number of locals a function may declare.
    pub const DEFAULT_MAX_LOCALS_PER_FUNCTION: usize = 50_000;

    /// Returns the default options.
    pub fn new() -> Self {
        Self::default()
    }

    /// Caps the total number of locals a single function may declare. Bodies
    /// declaring more fail with [`Error::LengthTooLarge`].
    #[must_use]
    pub fn max_locals_per_function(mut self, max: usize) -> Self {
        self.max_locals_per_function = max;
        self
    }

    /// Decides, by section name, whether a custom section's payload is
    /// retained. Rejected payloads are skipped over without being buffered.
    #[must_use]
    pub fn retain_custom_payload(mut self, filter: fn(&str) -> bool) -> Self {
        self.retain_custom_payload = filter;
        self
    }
}

impl Default for DecodeOptions {
    fn default() -> Self {
        Self {
            max_locals_per_function: Self::DEFAULT_MAX_LOCALS_PER_FUNCTION,
            retain_custom_payload: |_| true,
        }
    }
}

impl fmt::Debug for DecodeOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DecodeOptions")
            .field("max_locals_per_function", &self.max_locals_per_function)
            .finish_non_exhaustive()
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum State {
    Preamble,
    Sections,
    Done,
}

/// A pull-based decoder of the items of a module.
///
/// Each call to [`Iterator::next`] decodes just enough input to produce the
/// next item. After the end of the module or the first error, the iterator
/// yields only `None`. The cursor is closed when the module ends, when
/// decoding fails, or when the decoder is finished or dropped, whichever comes
/// first.
pub struct Decoder<C: Cursor, A: Allocator> {
    parser: Parser<C>,
    alloc: A,
    options: DecodeOptions,
    namespaces: Namespaces,
    sections: SectionState,
    state: State,
    closed: bool,
}

impl<C: Cursor, A: Allocator> Decoder<C, A> {
    pub fn new(cursor: C, alloc: A) -> Self {
        Self::with_options(cursor, alloc, DecodeOptions::default())
    }

    pub fn with_options(cursor: C, alloc: A, options: DecodeOptions) -> Self {
        Self {
            parser: Parser::new(cursor),
            alloc,
            options,
            namespaces: Namespaces::new(),
            sections: SectionState::new(),
            state: State::Preamble,
            closed: false,
        }
    }

    /// The number of indices assigned so far in each namespace.
    pub fn namespaces(&self) -> &Namespaces {
        &self.namespaces
    }

    /// The number of input bytes consumed so far.
    pub fn offset(&self) -> usize {
        self.parser.offset()
    }

    /// The options this decoder was created with.
    pub fn options(&self) -> &DecodeOptions {
        &self.options
    }

    /// Stops decoding, releasing the underlying byte source.
    pub fn finish(mut self) {
        self.close();
    }

    fn close(&mut self) {
        if !self.closed {
            self.closed = true;
            self.parser.cursor_mut().close();
        }
    }

    fn advance(
        &mut self,
        context: &mut ContextStack,
    ) -> Result<Option<SectionItem<A>>, Error<C::Error>> {
        if self.state == State::Preamble {
            self.parser.read_preamble(context)?;
            debug!("preamble accepted");
            self.state = State::Sections;
        }
        self.sections.step(
            &mut self.parser,
            context,
            &mut self.namespaces,
            &self.options,
            &self.alloc,
        )
    }
}

impl<Bytes: AsRef<[u8]>, A: Allocator> Decoder<Buffer<Bytes>, A> {
    /// Creates a decoder over a module resident in memory.
    pub fn from_bytes(bytes: Bytes, alloc: A) -> Self {
        Self::new(Buffer::new(bytes), alloc)
    }
}

impl<S: ChunkSource, A: Allocator> Decoder<StreamCursor<S>, A> {
    /// Creates a decoder over a module that arrives in chunks.
    pub fn from_chunks(source: S, alloc: A) -> Self {
        Self::new(StreamCursor::new(source), alloc)
    }
}

impl<C: Cursor, A: Allocator> Iterator for Decoder<C, A> {
    type Item = Result<SectionItem<A>, ErrorWithContext<C::Error>>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.state == State::Done {
            return None;
        }

        let mut context = ContextStack::default();
        match self.advance(&mut context) {
            Ok(Some(item)) => Some(Ok(item)),
            Ok(None) => {
                debug!("end of module at {:#x}", self.offset());
                self.state = State::Done;
                self.close();
                None
            }
            Err(error) => {
                debug!("decoding failed at {:#x}: {error:?}", self.offset());
                self.state = State::Done;
                self.close();
                Some(Err(ErrorWithContext { error, context }))
            }
        }
    }
}

impl<C: Cursor, A: Allocator> FusedIterator for Decoder<C, A> {}

impl<C: Cursor, A: Allocator> Drop for Decoder<C, A> {
    fn drop(&mut self) {
        self.close();
    }
}

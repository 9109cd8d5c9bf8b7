// Copyright (c) 2025 Joshua Seaton
//
// Use of this source code is governed by a MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT

//! Sequential, position-tracked byte access.
//!
//! [`Cursor`] is the one interface the decoder reads through. It is
//! implemented by
//! * [`Buffer`], over bytes already resident in memory;
//! * [`StreamCursor`], over a [`ChunkSource`] that hands out bytes as they
//!   arrive;
//! * [`Bounded`], a view over another cursor that may consume at most a fixed
//!   number of bytes. Views nest, each layer enforcing its own ceiling.

#[cfg(feature = "std")]
mod std;

#[cfg(feature = "std")]
pub use self::std::ReadChunks;

use core::convert::Infallible;
use core::fmt;

use crate::decode::Error;

/// Storage abstraction for the streamed reading of a WASM module.
pub trait Cursor {
    /// Error type for failures of the underlying byte source.
    type Error: fmt::Debug;

    /// Returns the number of bytes consumed so far from the start of the
    /// input.
    fn pos(&self) -> usize;

    /// Reads a single byte, or returns `None` if the input is exhausted.
    ///
    /// This is the only read that tolerates the end of input; it is how the
    /// decoder detects the end of a module at a section boundary.
    fn read_byte_or_end(&mut self) -> Result<Option<u8>, Error<Self::Error>>;

    /// Reads a single byte.
    fn read_byte(&mut self) -> Result<u8, Error<Self::Error>> {
        self.read_byte_or_end()?.ok_or(Error::UnexpectedEndOfInput)
    }

    /// Reads exactly `buf.len()` bytes into the provided buffer.
    ///
    /// Implementors should override for better performance.
    fn read_exact(&mut self, buf: &mut [u8]) -> Result<(), Error<Self::Error>> {
        for byte in buf {
            *byte = self.read_byte()?;
        }
        Ok(())
    }

    /// Skips the specified number of bytes.
    ///
    /// Implementors should override for better performance.
    fn skip(&mut self, count: usize) -> Result<(), Error<Self::Error>> {
        for _ in 0..count {
            self.read_byte()?;
        }
        Ok(())
    }

    /// The number of bytes that may still be consumed before some bounded
    /// view's quota is exceeded, or `None` if the cursor is unbounded.
    fn remaining(&self) -> Option<usize> {
        None
    }

    /// Releases any resources held by the underlying byte source.
    fn close(&mut self) {}

    /// Derives a view that delegates to this cursor but may consume at most
    /// `limit` bytes.
    fn bounded(&mut self, limit: usize) -> Bounded<'_, Self>
    where
        Self: Sized,
    {
        Bounded::new(self, limit)
    }
}

impl<C: Cursor> Cursor for &mut C {
    type Error = C::Error;

    fn pos(&self) -> usize {
        (**self).pos()
    }

    fn read_byte_or_end(&mut self) -> Result<Option<u8>, Error<Self::Error>> {
        (**self).read_byte_or_end()
    }

    fn read_byte(&mut self) -> Result<u8, Error<Self::Error>> {
        (**self).read_byte()
    }

    fn read_exact(&mut self, buf: &mut [u8]) -> Result<(), Error<Self::Error>> {
        (**self).read_exact(buf)
    }

    fn skip(&mut self, count: usize) -> Result<(), Error<Self::Error>> {
        (**self).skip(count)
    }

    fn remaining(&self) -> Option<usize> {
        (**self).remaining()
    }

    fn close(&mut self) {
        (**self).close();
    }
}

/// In-memory buffer implementation of [`Cursor`].
pub struct Buffer<Bytes: AsRef<[u8]>> {
    bytes: Bytes,
    pos: usize,
}

impl<Bytes: AsRef<[u8]>> Buffer<Bytes> {
    /// Create a new buffer cursor from the given bytes.
    pub fn new(bytes: Bytes) -> Self {
        Self { bytes, pos: 0 }
    }

    // Checks that `count` more bytes are available.
    fn available(&self, count: usize) -> Result<(), Error<Infallible>> {
        let bytes = self.bytes.as_ref();
        debug_assert!(self.pos <= bytes.len());
        if count <= bytes.len() - self.pos {
            Ok(())
        } else {
            Err(Error::UnexpectedEndOfInput)
        }
    }
}

impl<Bytes: AsRef<[u8]>> Cursor for Buffer<Bytes> {
    type Error = Infallible;

    fn pos(&self) -> usize {
        self.pos
    }

    fn read_byte_or_end(&mut self) -> Result<Option<u8>, Error<Self::Error>> {
        let byte = self.bytes.as_ref().get(self.pos).copied();
        if byte.is_some() {
            self.pos += 1;
        }
        Ok(byte)
    }

    fn read_exact(&mut self, buf: &mut [u8]) -> Result<(), Error<Self::Error>> {
        self.available(buf.len())?;
        buf.copy_from_slice(&self.bytes.as_ref()[self.pos..(self.pos + buf.len())]);
        self.pos += buf.len();
        Ok(())
    }

    fn skip(&mut self, count: usize) -> Result<(), Error<Self::Error>> {
        self.available(count)?;
        self.pos += count;
        Ok(())
    }
}

/// An upstream source of bytes that arrive incrementally, one chunk at a time.
pub trait ChunkSource {
    /// A chunk of bytes handed out by the source.
    type Chunk: AsRef<[u8]>;

    /// Error type for transport failures.
    type Error: fmt::Debug;

    /// Returns the next chunk, or `None` once the source is exhausted. Empty
    /// chunks are allowed and are skipped over by the reader.
    fn next_chunk(&mut self) -> Result<Option<Self::Chunk>, Self::Error>;

    /// Releases the source. Called at most once, after which `next_chunk()` is
    /// no longer called.
    fn release(&mut self) {}
}

/// A [`ChunkSource`] over an iterator of chunks.
pub struct IterChunks<I>(I);

impl<I> IterChunks<I> {
    /// Wraps an iterator whose items are successive chunks of input.
    pub fn new(chunks: I) -> Self {
        Self(chunks)
    }
}

impl<I, T> ChunkSource for IterChunks<I>
where
    I: Iterator<Item = T>,
    T: AsRef<[u8]>,
{
    type Chunk = T;
    type Error = Infallible;

    fn next_chunk(&mut self) -> Result<Option<T>, Infallible> {
        Ok(self.0.next())
    }
}

/// A [`Cursor`] over a [`ChunkSource`], holding on to the most recently
/// received chunk and slicing reads out of it.
pub struct StreamCursor<S: ChunkSource> {
    source: S,
    chunk: Option<S::Chunk>,
    // Offset of the next unread byte within `chunk`.
    chunk_pos: usize,
    // Total bytes consumed.
    total: usize,
    exhausted: bool,
    released: bool,
}

impl<S: ChunkSource> StreamCursor<S> {
    pub fn new(source: S) -> Self {
        Self {
            source,
            chunk: None,
            chunk_pos: 0,
            total: 0,
            exhausted: false,
            released: false,
        }
    }

    // Ensures that the current chunk has at least one unread byte, pulling
    // from the source as needed. Returns false at the end of input.
    fn fill(&mut self) -> Result<bool, Error<S::Error>> {
        loop {
            if let Some(chunk) = &self.chunk
                && self.chunk_pos < chunk.as_ref().len()
            {
                return Ok(true);
            }
            if self.exhausted || self.released {
                return Ok(false);
            }
            match self.source.next_chunk().map_err(Error::Source)? {
                Some(chunk) => {
                    self.chunk = Some(chunk);
                    self.chunk_pos = 0;
                }
                None => {
                    self.chunk = None;
                    self.exhausted = true;
                }
            }
        }
    }

    // The unread portion of the current chunk.
    fn unread(&self) -> &[u8] {
        match &self.chunk {
            Some(chunk) => &chunk.as_ref()[self.chunk_pos..],
            None => &[],
        }
    }

    fn advance(&mut self, count: usize) {
        self.chunk_pos += count;
        self.total += count;
    }
}

impl<S: ChunkSource> Cursor for StreamCursor<S> {
    type Error = S::Error;

    fn pos(&self) -> usize {
        self.total
    }

    fn read_byte_or_end(&mut self) -> Result<Option<u8>, Error<Self::Error>> {
        if !self.fill()? {
            return Ok(None);
        }
        let byte = self.unread()[0];
        self.advance(1);
        Ok(Some(byte))
    }

    fn read_exact(&mut self, buf: &mut [u8]) -> Result<(), Error<Self::Error>> {
        let mut filled = 0;
        while filled < buf.len() {
            if !self.fill()? {
                return Err(Error::UnexpectedEndOfInput);
            }
            let unread = self.unread();
            let len = unread.len().min(buf.len() - filled);
            buf[filled..(filled + len)].copy_from_slice(&unread[..len]);
            self.advance(len);
            filled += len;
        }
        Ok(())
    }

    fn skip(&mut self, count: usize) -> Result<(), Error<Self::Error>> {
        let mut rest = count;
        while rest > 0 {
            if !self.fill()? {
                return Err(Error::UnexpectedEndOfInput);
            }
            let len = self.unread().len().min(rest);
            self.advance(len);
            rest -= len;
        }
        Ok(())
    }

    fn close(&mut self) {
        if !self.released {
            self.released = true;
            self.chunk = None;
            self.source.release();
        }
    }
}

/// A view over a delegate cursor that may consume at most a fixed number of
/// bytes.
///
/// Every request is checked against the remaining quota before it is
/// delegated; a request that does not fit fails with
/// [`Error::LimitReached`] without consuming anything.
pub struct Bounded<'a, C: Cursor> {
    delegate: &'a mut C,
    limit: usize,
    remaining: usize,
}

impl<'a, C: Cursor> Bounded<'a, C> {
    pub fn new(delegate: &'a mut C, limit: usize) -> Self {
        Self {
            delegate,
            limit,
            remaining: limit,
        }
    }

    /// The quota this view was created with.
    pub fn limit(&self) -> usize {
        self.limit
    }

    /// The number of bytes consumed through this view.
    pub fn consumed(&self) -> usize {
        self.limit - self.remaining
    }

    /// Whether the quota has been used up.
    pub fn is_exhausted(&self) -> bool {
        self.remaining == 0
    }

    fn check_limit(&self, requested: usize) -> Result<(), Error<C::Error>> {
        if requested > self.remaining {
            Err(Error::LimitReached {
                requested,
                remaining: self.remaining,
            })
        } else {
            Ok(())
        }
    }
}

impl<C: Cursor> Cursor for Bounded<'_, C> {
    type Error = C::Error;

    fn pos(&self) -> usize {
        self.delegate.pos()
    }

    fn read_byte_or_end(&mut self) -> Result<Option<u8>, Error<Self::Error>> {
        self.check_limit(1)?;
        let byte = self.delegate.read_byte_or_end()?;
        if byte.is_some() {
            self.remaining -= 1;
        }
        Ok(byte)
    }

    fn read_byte(&mut self) -> Result<u8, Error<Self::Error>> {
        self.check_limit(1)?;
        let byte = self.delegate.read_byte()?;
        self.remaining -= 1;
        Ok(byte)
    }

    fn read_exact(&mut self, buf: &mut [u8]) -> Result<(), Error<Self::Error>> {
        self.check_limit(buf.len())?;
        self.delegate.read_exact(buf)?;
        self.remaining -= buf.len();
        Ok(())
    }

    fn skip(&mut self, count: usize) -> Result<(), Error<Self::Error>> {
        self.check_limit(count)?;
        self.delegate.skip(count)?;
        self.remaining -= count;
        Ok(())
    }

    fn remaining(&self) -> Option<usize> {
        Some(match self.delegate.remaining() {
            Some(outer) => outer.min(self.remaining),
            None => self.remaining,
        })
    }

    fn close(&mut self) {
        self.delegate.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use proptest::prelude::*;

    #[test]
    fn test_buffer_read() {
        let mut buf = Buffer::new([0x12, 0x34]);
        assert_eq!(buf.read_byte(), Ok(0x12));
        assert_eq!(buf.read_byte(), Ok(0x34));
        assert_eq!(buf.read_byte_or_end(), Ok(None));
        assert_eq!(buf.read_byte(), Err(Error::UnexpectedEndOfInput));
        assert_eq!(buf.pos(), 2);
    }

    #[test]
    fn test_buffer_read_exact() {
        let mut buf = Buffer::new([0x01, 0x02, 0x03]);
        let mut one = [0u8; 1];
        let mut two = [0u8; 2];
        assert_eq!(buf.read_exact(&mut one), Ok(()));
        assert_eq!(one, [0x01]);
        assert_eq!(buf.read_exact(&mut two), Ok(()));
        assert_eq!(two, [0x02, 0x03]);
        assert_eq!(buf.read_exact(&mut one), Err(Error::UnexpectedEndOfInput));

        // Zero-length reads succeed even at the end.
        assert_eq!(buf.read_exact(&mut []), Ok(()));
    }

    #[test]
    fn test_buffer_skip() {
        let mut buf = Buffer::new([0x01, 0x02, 0x03]);
        assert_eq!(buf.skip(2), Ok(()));
        assert_eq!(buf.read_byte(), Ok(0x03));
        assert_eq!(buf.skip(1), Err(Error::UnexpectedEndOfInput));
        assert_eq!(buf.skip(0), Ok(()));
        assert_eq!(buf.read_byte_or_end(), Ok(None));
    }

    #[test]
    fn test_buffer_short_read_does_not_consume() {
        let mut buf = Buffer::new([0x01, 0x02]);
        let mut three = [0u8; 3];
        assert_eq!(buf.read_exact(&mut three), Err(Error::UnexpectedEndOfInput));
        assert_eq!(buf.pos(), 0);
    }

    #[test]
    fn test_stream_read_across_chunks() {
        let chunks: [&[u8]; 4] = [&[0x01], &[], &[0x02, 0x03], &[0x04, 0x05]];
        let mut stream = StreamCursor::new(IterChunks::new(chunks.into_iter()));
        let mut buf = [0u8; 4];
        assert_eq!(stream.read_exact(&mut buf), Ok(()));
        assert_eq!(buf, [0x01, 0x02, 0x03, 0x04]);
        assert_eq!(stream.read_byte(), Ok(0x05));
        assert_eq!(stream.read_byte_or_end(), Ok(None));
        assert_eq!(stream.read_byte(), Err(Error::UnexpectedEndOfInput));
        assert_eq!(stream.pos(), 5);
    }

    #[test]
    fn test_stream_skip_and_eof() {
        let chunks: [&[u8]; 2] = [&[0x01, 0x02], &[0x03]];
        let mut stream = StreamCursor::new(IterChunks::new(chunks.into_iter()));
        assert_eq!(stream.skip(1), Ok(()));
        let mut two = [0u8; 2];
        assert_eq!(stream.read_exact(&mut two), Ok(()));
        assert_eq!(two, [0x02, 0x03]);
        assert_eq!(stream.skip(1), Err(Error::UnexpectedEndOfInput));
        assert_eq!(stream.read_byte_or_end(), Ok(None));
    }

    #[derive(Default)]
    struct CountingSource {
        pulls: usize,
        releases: usize,
    }

    impl ChunkSource for &mut CountingSource {
        type Chunk = [u8; 2];
        type Error = Infallible;

        fn next_chunk(&mut self) -> Result<Option<[u8; 2]>, Infallible> {
            self.pulls += 1;
            Ok((self.pulls == 1).then_some([0x12, 0x34]))
        }

        fn release(&mut self) {
            self.releases += 1;
        }
    }

    #[test]
    fn test_stream_release_once() {
        let mut source = CountingSource::default();
        {
            let mut stream = StreamCursor::new(&mut source);
            assert_eq!(stream.read_byte(), Ok(0x12));
            stream.close();
            stream.close();
            // Nothing more is pulled after release.
            assert_eq!(stream.read_byte_or_end(), Ok(None));
        }
        assert_eq!(source.pulls, 1);
        assert_eq!(source.releases, 1);
    }

    #[test]
    fn test_bounded_limit() {
        let mut buf = Buffer::new([0x01, 0x02, 0x03]);
        assert_eq!(
            buf.bounded(0).read_byte(),
            Err(Error::LimitReached {
                requested: 1,
                remaining: 0
            })
        );
        let mut view = buf.bounded(2);
        let mut three = [0u8; 3];
        assert_eq!(
            view.read_exact(&mut three),
            Err(Error::LimitReached {
                requested: 3,
                remaining: 2
            })
        );
        assert_eq!(view.read_byte(), Ok(0x01));
        assert_eq!(view.skip(1), Ok(()));
        assert!(view.is_exhausted());
        assert_eq!(view.consumed(), 2);
        assert_eq!(view.limit(), 2);
        assert!(matches!(
            view.read_byte_or_end(),
            Err(Error::LimitReached { .. })
        ));
        assert_eq!(buf.read_byte(), Ok(0x03));
    }

    #[test]
    fn test_bounded_end_of_input() {
        let mut buf = Buffer::new([0x01]);
        let mut view = buf.bounded(4);
        assert_eq!(view.read_byte(), Ok(0x01));
        assert_eq!(view.read_byte_or_end(), Ok(None));
        assert_eq!(view.remaining(), Some(3));
        assert_eq!(view.read_byte(), Err(Error::UnexpectedEndOfInput));
    }

    #[test]
    fn test_nested_bounded_views() {
        let mut buf = Buffer::new([0u8; 16]);
        let mut outer = buf.bounded(4);
        {
            let mut inner = outer.bounded(8);
            assert_eq!(inner.remaining(), Some(4));
            assert_eq!(inner.skip(3), Ok(()));
            // The inner quota still allows it, the outer one does not.
            assert_eq!(
                inner.skip(2),
                Err(Error::LimitReached {
                    requested: 2,
                    remaining: 1
                })
            );
        }
        assert_eq!(outer.remaining(), Some(1));
        assert_eq!(outer.pos(), 3);
    }

    proptest! {
        #[test]
        fn bounded_view_never_exceeds_quota(
            limit in 0usize..32,
            requests in proptest::collection::vec(0usize..8, 0..16),
        ) {
            let mut buf = Buffer::new([0xAAu8; 64]);
            let mut view = buf.bounded(limit);
            let mut total = 0;
            for request in requests {
                let mut dst = vec![0u8; request];
                if view.read_exact(&mut dst).is_ok() {
                    total += request;
                }
            }
            prop_assert!(total <= limit);
            prop_assert_eq!(view.consumed(), total);
        }
    }
}

// Copyright (c) 2025 Joshua Seaton
//
// Use of this source code is governed by a MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT

//! WebAssembly binary format decoding.

mod decodable_impls;
mod expr;
pub mod leb128;
mod namespace;
mod section;
mod vector;

pub use namespace::{NamespaceIndex, Namespaces};
pub use vector::{LazyIter, LazyVec};

pub(crate) use section::SectionState;

use core::fmt;

use leb128::{Leb128, RawLeb128};

use crate::Allocator;
use crate::core_compat::boxed::Box;
use crate::core_compat::vec::Vec;
use crate::cursor::{Bounded, Cursor};

// The maximum recorded context depth. Deeper frames are not recorded, but
// decoding carries on.
const MAX_DEPTH: usize = 8;

// Bytes read into a growing buffer per step, so that an untrustworthy declared
// length does not translate into an allocation of that size up front.
const READ_STEP: usize = 0x2000;

/// The magic number ('\0asm') followed by version 1.
pub const PREAMBLE: [u8; 8] = [0x00, 0x61, 0x73, 0x6d, 0x01, 0x00, 0x00, 0x00];

// Represents decoding context.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
#[repr(u8)]
pub(crate) enum ContextId {
    #[default]
    Invalid,
    Code,
    CodeSec,
    ConstExpr,
    CustomSec,
    Data,
    DataCountSec,
    DataSec,
    DataToken,
    Elem,
    ElemKind,
    ElemSec,
    ElemToken,
    Export,
    ExportDesc,
    ExportDescToken,
    ExportSec,
    FuncIdx,
    FuncSec,
    FuncType,
    FuncTypeToken,
    Global,
    GlobalIdx,
    GlobalSec,
    GlobalType,
    Import,
    ImportDesc,
    ImportDescToken,
    ImportSec,
    Limits,
    LimitsToken,
    Locals,
    MemIdx,
    MemSec,
    MemType,
    Mut,
    Name,
    Opcode,
    Preamble,
    ReadingBytes,
    RefType,
    ResultType,
    SectionId,
    SkippingBytes,
    StartSec,
    TableIdx,
    TableSec,
    TableType,
    TypeIdx,
    TypeSec,
    U32,
    ValType,
    VecConstExpr,
    VecByte,
    VecFuncIdx,
    VecLocals,
}

impl From<ContextId> for &'static str {
    fn from(id: ContextId) -> Self {
        match id {
            ContextId::Invalid => "<invalid>",
            ContextId::Code => "code",
            ContextId::CodeSec => "codesec",
            ContextId::ConstExpr => "constexpr",
            ContextId::CustomSec => "customsec",
            ContextId::Data => "data",
            ContextId::DataCountSec => "datacountsec",
            ContextId::DataSec => "datasec",
            ContextId::DataToken => "data token",
            ContextId::Elem => "elem",
            ContextId::ElemKind => "elemkind",
            ContextId::ElemSec => "elemsec",
            ContextId::ElemToken => "elem token",
            ContextId::Export => "export",
            ContextId::ExportDesc => "exportdesc",
            ContextId::ExportDescToken => "exportdesc token",
            ContextId::ExportSec => "exportsec",
            ContextId::FuncIdx => "funcidx",
            ContextId::FuncSec => "funcsec",
            ContextId::FuncType => "functype",
            ContextId::FuncTypeToken => "functype token",
            ContextId::Global => "global",
            ContextId::GlobalIdx => "globalidx",
            ContextId::GlobalSec => "globalsec",
            ContextId::GlobalType => "globaltype",
            ContextId::Import => "import",
            ContextId::ImportDesc => "importdesc",
            ContextId::ImportDescToken => "importdesc token",
            ContextId::ImportSec => "importsec",
            ContextId::Limits => "limits",
            ContextId::LimitsToken => "limits token",
            ContextId::Locals => "locals",
            ContextId::MemIdx => "memidx",
            ContextId::MemSec => "memsec",
            ContextId::MemType => "memtype",
            ContextId::Mut => "mut",
            ContextId::Name => "name",
            ContextId::Opcode => "opcode",
            ContextId::Preamble => "preamble",
            ContextId::ReadingBytes => "reading bytes",
            ContextId::RefType => "reftype",
            ContextId::ResultType => "resulttype",
            ContextId::SectionId => "section ID",
            ContextId::SkippingBytes => "skipping bytes",
            ContextId::StartSec => "startsec",
            ContextId::TableIdx => "tableidx",
            ContextId::TableSec => "tablesec",
            ContextId::TableType => "tabletype",
            ContextId::TypeIdx => "typeidx",
            ContextId::TypeSec => "typesec",
            ContextId::U32 => "u32",
            ContextId::ValType => "valtype",
            ContextId::VecConstExpr => "vec(constexpr)",
            ContextId::VecByte => "vec(byte)",
            ContextId::VecFuncIdx => "vec(funcidx)",
            ContextId::VecLocals => "vec(locals)",
        }
    }
}

pub(crate) trait Contextual {
    const ID: ContextId;
}

/// A frame of decoding context.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct ContextFrame {
    /// A description of what was being decoded.
    pub context: &'static str,

    /// Byte offset in the input where this context was entered.
    pub offset: usize,
}

/// Stack for tracking decoding context during error reporting.
#[derive(Clone, Debug, Default)]
pub(crate) struct ContextStack {
    offsets: [usize; MAX_DEPTH],
    ids: [ContextId; MAX_DEPTH],
    depth: u8,
}

impl ContextStack {
    // Pushes a new context frame, returning true if there was room for it.
    pub(crate) fn push(&mut self, id: ContextId, offset: usize) -> bool {
        let depth = self.depth as usize;
        if depth >= MAX_DEPTH {
            return false;
        }
        self.offsets[depth] = offset;
        self.ids[depth] = id;
        self.depth += 1;
        true
    }

    // Pop the top context frame.
    pub(crate) fn pop(&mut self) {
        debug_assert!(self.depth > 0, "{self:#?}");
        self.depth -= 1;
    }

    // Returns an iterator over frames in "pushed" order (outermost to
    // innermost).
    fn iter(&self) -> impl Iterator<Item = ContextFrame> + '_ {
        self.offsets
            .iter()
            .zip(&self.ids)
            .take(self.depth as usize)
            .map(|(&offset, &id)| ContextFrame {
                context: id.into(),
                offset,
            })
    }
}

/// A decoding error with additional context around what hierarchy of things
/// were being decoded at the time.
pub struct ErrorWithContext<E> {
    /// The underlying decoding error.
    pub error: Error<E>,
    pub(crate) context: ContextStack,
}

impl<E> ErrorWithContext<E> {
    /// The recorded context frames, outermost first.
    pub fn frames(&self) -> impl Iterator<Item = ContextFrame> + '_ {
        self.context.iter()
    }
}

impl<E: fmt::Debug> fmt::Debug for ErrorWithContext<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self.error)?;
        for (i, frame) in self.context.iter().enumerate() {
            write!(f, "\n{:#x}: ", frame.offset)?;
            for _ in 0..i {
                write!(f, "  ")?;
            }
            write!(f, "{}", frame.context)?;
        }
        Ok(())
    }
}

impl<E: fmt::Debug> fmt::Display for ErrorWithContext<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

impl<E: fmt::Debug> core::error::Error for ErrorWithContext<E> {}

/// Represents errors that can arise during decoding.
///
/// `E` is the error type of the underlying byte source; it is uninhabited
/// ([`Infallible`](core::convert::Infallible)) for in-memory input.
#[derive(Clone, Copy, Eq, PartialEq)]
pub enum Error<E> {
    /// A length computation would have gone negative.
    IllegalArgument,
    /// A LEB128-encoded value does not fit its target width.
    IntegerOverflow,
    /// A LEB128 encoding ran past the maximum length for its width.
    InvalidEncoding,
    /// The module does not start with the WebAssembly magic number and
    /// version 1.
    InvalidPreamble([u8; 8]),
    /// A vector length or locals count exceeds what is supported.
    LengthTooLarge(u64),
    /// A read would have exceeded the quota of a bounded region, such as a
    /// section or a function body.
    LimitReached { requested: usize, remaining: usize },
    /// A function body does not end with the `end` opcode.
    MalformedTerminator(u8),
    /// The bytes consumed for a section or function body do not match its
    /// declared size.
    SizeMismatch { expected: usize, actual: usize },
    /// Error from the underlying byte source.
    Source(E),
    /// The input ended in the middle of a construct.
    UnexpectedEndOfInput,
    /// A section ID outside of 0 to 12.
    UnknownSectionId(u8),
    /// An unknown discriminator for the given kind of thing.
    UnknownVariantTag { context: &'static str, tag: u32 },
}

impl<E: fmt::Debug> fmt::Debug for Error<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::IllegalArgument => write!(f, "illegal length argument"),
            Error::IntegerOverflow => write!(f, "integer overflow"),
            Error::InvalidEncoding => write!(f, "invalid LEB128-encoding"),
            Error::InvalidPreamble(bytes) => write!(f, "invalid preamble ({bytes:02x?})"),
            Error::LengthTooLarge(len) => write!(f, "length too large ({len:#x})"),
            Error::LimitReached {
                requested,
                remaining,
            } => write!(
                f,
                "limit reached: requested {requested:#x} bytes; {remaining:#x} remaining"
            ),
            Error::MalformedTerminator(byte) => write!(f, "malformed terminator ({byte:#x})"),
            Error::SizeMismatch { expected, actual } => {
                write!(f, "size mismatch: expected {expected:#x}; got {actual:#x}")
            }
            Error::Source(err) => write!(f, "{err:?}"),
            Error::UnexpectedEndOfInput => write!(f, "unexpected end of input"),
            Error::UnknownSectionId(id) => write!(f, "unknown section ID ({id:#x})"),
            Error::UnknownVariantTag { context, tag } => {
                write!(f, "unknown {context} tag ({tag:#x})")
            }
        }
    }
}

impl<E: fmt::Debug> fmt::Display for Error<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

impl<E: fmt::Debug> core::error::Error for Error<E> {}

impl<E> leb128::Error for Error<E> {
    fn invalid_encoding() -> Self {
        Error::InvalidEncoding
    }

    fn integer_overflow() -> Self {
        Error::IntegerOverflow
    }
}

/// Computes `total - consumed`, failing if that would be negative.
pub(crate) fn checked_len<E>(total: usize, consumed: usize) -> Result<usize, Error<E>> {
    total.checked_sub(consumed).ok_or(Error::IllegalArgument)
}

// Couples a cursor with the reading helpers that decoders are written against.
pub(crate) struct Parser<C: Cursor> {
    cursor: C,
}

impl<C: Cursor> Parser<C> {
    pub(crate) fn new(cursor: C) -> Self {
        Self { cursor }
    }

    pub(crate) fn cursor(&self) -> &C {
        &self.cursor
    }

    pub(crate) fn cursor_mut(&mut self) -> &mut C {
        &mut self.cursor
    }

    pub(crate) fn offset(&self) -> usize {
        self.cursor.pos()
    }

    // Derives a parser over a view of at most `limit` bytes.
    pub(crate) fn bounded(&mut self, limit: usize) -> Parser<Bounded<'_, C>> {
        Parser::new(self.cursor.bounded(limit))
    }

    // Pushes a context frame before a call, popping it if successful.
    pub(crate) fn with_context<F, R>(
        &mut self,
        context: &mut ContextStack,
        id: ContextId,
        f: F,
    ) -> Result<R, Error<C::Error>>
    where
        F: FnOnce(&mut Self, &mut ContextStack) -> Result<R, Error<C::Error>>,
    {
        let pushed = context.push(id, self.offset());
        let val = f(self, context)?;
        if pushed {
            context.pop();
        }
        Ok(val)
    }

    pub(crate) fn read_byte_or_end_raw(&mut self) -> Result<Option<u8>, Error<C::Error>> {
        self.cursor.read_byte_or_end()
    }

    pub(crate) fn read_byte_raw(&mut self) -> Result<u8, Error<C::Error>> {
        self.cursor.read_byte()
    }

    pub(crate) fn read_leb128_raw<T: Leb128>(&mut self) -> Result<T, Error<C::Error>> {
        leb128::read(|| self.cursor.read_byte())
    }

    // Reads the raw bytes of a LEB128 encoding and validates them as a `T`.
    pub(crate) fn read_raw_leb128<T: Leb128>(&mut self) -> Result<RawLeb128, Error<C::Error>> {
        let raw = leb128::read_raw::<T, _, _>(|| self.cursor.read_byte())?;
        leb128::decode::<T, Error<C::Error>>(&raw)?;
        Ok(raw)
    }

    pub(crate) fn read_exact_raw(&mut self, buf: &mut [u8]) -> Result<(), Error<C::Error>> {
        self.cursor.read_exact(buf)
    }

    pub(crate) fn skip_bytes(
        &mut self,
        context: &mut ContextStack,
        count: usize,
    ) -> Result<(), Error<C::Error>> {
        self.with_context(context, ContextId::SkippingBytes, |parser, _| {
            parser.cursor.skip(count)
        })
    }

    pub(crate) fn read_bytes<A: Allocator>(
        &mut self,
        context: &mut ContextStack,
        count: usize,
        alloc: &A,
    ) -> Result<Box<[u8], A>, Error<C::Error>> {
        self.with_context(context, ContextId::ReadingBytes, |parser, _| {
            if let Some(remaining) = parser.cursor.remaining()
                && count > remaining
            {
                return Err(Error::LimitReached {
                    requested: count,
                    remaining,
                });
            }
            let mut buf = Vec::new_in(alloc.clone());
            while buf.len() < count {
                let start = buf.len();
                buf.resize(start + (count - start).min(READ_STEP), 0);
                parser.cursor.read_exact(&mut buf[start..])?;
            }
            Ok(buf.into_boxed_slice())
        })
    }

    pub(crate) fn read<A: Allocator, T: Decodable<A> + Contextual>(
        &mut self,
        context: &mut ContextStack,
        alloc: &A,
    ) -> Result<T, Error<C::Error>> {
        self.with_context(context, T::ID, |parser, context| {
            T::decode(parser, context, alloc)
        })
    }

    pub(crate) fn read_copy<T: CopyDecodable + Contextual>(
        &mut self,
        context: &mut ContextStack,
    ) -> Result<T, Error<C::Error>> {
        self.with_context(context, T::ID, |parser, context| {
            <T as CopyDecodable>::decode(parser, context)
        })
    }

    // Reads and checks the 8-byte module preamble.
    pub(crate) fn read_preamble(&mut self, context: &mut ContextStack) -> Result<(), Error<C::Error>> {
        self.with_context(context, ContextId::Preamble, |parser, _| {
            let mut preamble = [0u8; 8];
            parser.read_exact_raw(&mut preamble)?;
            if preamble == PREAMBLE {
                Ok(())
            } else {
                Err(Error::InvalidPreamble(preamble))
            }
        })
    }
}

// Types that can be decoded from a cursor, possibly with allocation.
pub(crate) trait Decodable<A>: Sized
where
    A: Allocator,
{
    fn decode<C: Cursor>(
        parser: &mut Parser<C>,
        context: &mut ContextStack,
        alloc: &A,
    ) -> Result<Self, Error<C::Error>>;
}

// Types that can be decoded from a cursor without allocation.
pub(crate) trait CopyDecodable: Sized + Copy {
    fn decode<C: Cursor>(
        parser: &mut Parser<C>,
        context: &mut ContextStack,
    ) -> Result<Self, Error<C::Error>>;
}

impl<T: CopyDecodable, A: Allocator> Decodable<A> for T {
    fn decode<C: Cursor>(
        parser: &mut Parser<C>,
        context: &mut ContextStack,
        _: &A,
    ) -> Result<Self, Error<C::Error>> {
        <Self as CopyDecodable>::decode(parser, context)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use core::convert::Infallible;

    use crate::cursor::Buffer;

    #[test]
    fn test_preamble() {
        let mut context = ContextStack::default();
        let mut parser = Parser::new(Buffer::new(PREAMBLE));
        assert_eq!(parser.read_preamble(&mut context), Ok(()));
        assert_eq!(parser.offset(), 8);

        let mut bad = PREAMBLE;
        bad[4] = 0x02;
        let mut parser = Parser::new(Buffer::new(bad));
        assert_eq!(
            parser.read_preamble(&mut context),
            Err(Error::InvalidPreamble(bad))
        );

        let mut parser = Parser::new(Buffer::new([0x00, 0x61, 0x73]));
        assert_eq!(
            parser.read_preamble(&mut ContextStack::default()),
            Err(Error::UnexpectedEndOfInput)
        );
    }

    #[test]
    fn test_checked_len() {
        assert_eq!(checked_len::<Infallible>(5, 2), Ok(3));
        assert_eq!(checked_len::<Infallible>(2, 2), Ok(0));
        assert_eq!(checked_len::<Infallible>(2, 5), Err(Error::IllegalArgument));
    }

    #[test]
    fn test_read_bytes() {
        let mut context = ContextStack::default();
        let bytes: std::vec::Vec<u8> = (0..=255u8).cycle().take(3 * READ_STEP + 7).collect();
        let mut parser = Parser::new(Buffer::new(&bytes[..]));
        let read = parser
            .read_bytes(&mut context, bytes.len(), &crate::core_compat::alloc::Global)
            .unwrap();
        assert_eq!(&read[..], &bytes[..]);

        let mut parser = Parser::new(Buffer::new(&bytes[..4]));
        let mut view = parser.bounded(2);
        assert!(matches!(
            view.read_bytes(&mut context, 3, &crate::core_compat::alloc::Global),
            Err(Error::LimitReached {
                requested: 3,
                remaining: 2
            })
        ));
    }

    #[test]
    fn test_context_saturates() {
        let mut context = ContextStack::default();
        for i in 0..MAX_DEPTH {
            assert!(context.push(ContextId::U32, i));
        }
        assert!(!context.push(ContextId::Name, MAX_DEPTH));
        assert_eq!(context.iter().count(), MAX_DEPTH);
        assert_eq!(
            context.iter().last(),
            Some(ContextFrame {
                context: "u32",
                offset: MAX_DEPTH - 1
            })
        );
    }

    #[test]
    fn test_error_context_report() {
        let mut context = ContextStack::default();
        let mut parser = Parser::new(Buffer::new([0x01, 0x02]));
        let result = parser.with_context(&mut context, ContextId::TypeSec, |parser, context| {
            parser.skip_bytes(context, 1)?;
            parser.read_bytes(context, 4, &crate::core_compat::alloc::Global)
        });
        let error = ErrorWithContext {
            error: result.unwrap_err(),
            context,
        };
        assert_eq!(error.error, Error::<Infallible>::UnexpectedEndOfInput);
        let frames: std::vec::Vec<_> = error.frames().collect();
        assert_eq!(
            frames,
            [
                ContextFrame {
                    context: "typesec",
                    offset: 0
                },
                ContextFrame {
                    context: "reading bytes",
                    offset: 1
                },
            ]
        );
        assert_eq!(
            format!("{error:?}"),
            "unexpected end of input\n0x0: typesec\n0x1:   reading bytes"
        );
    }
}

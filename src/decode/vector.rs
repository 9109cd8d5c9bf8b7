// Copyright (c) 2025 Joshua Seaton
//
// Use of this source code is governed by a MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT

//! Length-prefixed vectors, decoded either all at once or one item at a time.

use crate::Allocator;
use crate::core_compat::vec::Vec;
use crate::cursor::Cursor;

use super::{ContextStack, Contextual, Decodable, Error, Parser};

// The largest supported vector length.
pub(crate) const MAX_LEN: u32 = (1 << 31) - 1;

// The most items reserved for up front.
const MAX_RESERVE: usize = 0x400;

// Reads a vector length prefix.
pub(crate) fn read_len<C: Cursor>(
    parser: &mut Parser<C>,
    context: &mut ContextStack,
) -> Result<u32, Error<C::Error>> {
    let len: u32 = parser.read_copy(context)?;
    if len > MAX_LEN {
        return Err(Error::LengthTooLarge(len.into()));
    }
    Ok(len)
}

impl<T, A> Decodable<A> for Vec<T, A>
where
    T: Decodable<A> + Contextual,
    A: Allocator,
{
    fn decode<C: Cursor>(
        parser: &mut Parser<C>,
        context: &mut ContextStack,
        alloc: &A,
    ) -> Result<Self, Error<C::Error>> {
        let len = read_len(parser, context)?;
        let mut vec = Vec::new_in(alloc.clone());

        // Each item takes up at least one byte.
        let hint = parser.cursor().remaining().unwrap_or(0);
        vec.reserve(hint.min(len as usize).min(MAX_RESERVE));
        for _ in 0..len {
            vec.push(parser.read(context, alloc)?);
        }
        Ok(vec)
    }
}

/// The state of a vector whose items are decoded on demand.
///
/// Only the number of items not yet decoded is held; the items themselves are
/// read from a cursor passed in with each request, which lets a caller stop
/// early or interleave other reads.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct LazyVec {
    remaining: u32,
}

impl LazyVec {
    /// Reads the length prefix of a vector.
    pub fn read<C: Cursor>(cursor: &mut C) -> Result<Self, Error<C::Error>> {
        let mut parser = Parser::new(cursor);
        let remaining = read_len(&mut parser, &mut ContextStack::default())?;
        Ok(Self { remaining })
    }

    /// The number of items not yet decoded.
    pub fn remaining(&self) -> u32 {
        self.remaining
    }

    pub fn is_empty(&self) -> bool {
        self.remaining == 0
    }

    /// Decodes the next item with `decode`, or returns `None` if all items have
    /// been produced. A failure ends the vector.
    pub fn next_item<C, T, F>(&mut self, cursor: &mut C, decode: F) -> Option<Result<T, Error<C::Error>>>
    where
        C: Cursor,
        F: FnOnce(&mut C) -> Result<T, Error<C::Error>>,
    {
        if self.remaining == 0 {
            return None;
        }
        let item = decode(cursor);
        self.remaining = if item.is_ok() { self.remaining - 1 } else { 0 };
        Some(item)
    }

    /// Adapts the remaining items into an iterator over `cursor`.
    pub fn iter<C, T, F>(self, cursor: &mut C, decode: F) -> LazyIter<'_, C, F>
    where
        C: Cursor,
        F: FnMut(&mut C) -> Result<T, Error<C::Error>>,
    {
        LazyIter {
            vec: self,
            cursor,
            decode,
        }
    }
}

/// Iterator returned by [`LazyVec::iter`].
pub struct LazyIter<'a, C: Cursor, F> {
    vec: LazyVec,
    cursor: &'a mut C,
    decode: F,
}

impl<C, T, F> Iterator for LazyIter<'_, C, F>
where
    C: Cursor,
    F: FnMut(&mut C) -> Result<T, Error<C::Error>>,
{
    type Item = Result<T, Error<C::Error>>;

    fn next(&mut self) -> Option<Self::Item> {
        self.vec.next_item(&mut *self.cursor, &mut self.decode)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (0, Some(self.vec.remaining as usize))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::core_compat::alloc::Global;
    use crate::cursor::Buffer;

    fn read_u32<C: Cursor>(cursor: &mut C) -> Result<u32, Error<C::Error>> {
        Parser::new(cursor).read_leb128_raw()
    }

    #[test]
    fn test_eager_vec() {
        let mut context = ContextStack::default();
        let mut parser = Parser::new(Buffer::new([0x03, 0x01, 0x80, 0x01, 0x03, 0xff]));
        let vec = <Vec<u32, Global>>::decode(&mut parser, &mut context, &Global).unwrap();
        assert_eq!(&vec[..], &[1, 0x80, 3]);
        assert_eq!(parser.offset(), 5);
    }

    #[test]
    fn test_length_too_large() {
        // 2^31, followed by nothing: the length is rejected before any item
        // is attempted.
        let mut context = ContextStack::default();
        let mut parser = Parser::new(Buffer::new([0x80, 0x80, 0x80, 0x80, 0x08]));
        let result = <Vec<u32, Global>>::decode(&mut parser, &mut context, &Global);
        assert!(matches!(result, Err(Error::LengthTooLarge(0x8000_0000))));

        let mut buf = Buffer::new([0xff, 0xff, 0xff, 0xff, 0x07]);
        assert_eq!(LazyVec::read(&mut buf), Ok(LazyVec { remaining: MAX_LEN }));
    }

    #[test]
    fn test_lazy_vec() {
        let mut buf = Buffer::new([0x03, 0x0a, 0x0b, 0x0c]);
        let mut vec = LazyVec::read(&mut buf).unwrap();
        assert_eq!(vec.remaining(), 3);
        assert_eq!(vec.next_item(&mut buf, read_u32), Some(Ok(0x0a)));
        let rest: std::vec::Vec<_> = vec.iter(&mut buf, read_u32).collect();
        assert_eq!(rest, [Ok(0x0b), Ok(0x0c)]);
        assert_eq!(buf.read_byte_or_end(), Ok(None));
    }

    #[test]
    fn test_lazy_vec_early_stop() {
        let mut buf = Buffer::new([0x04, 0x01, 0x02, 0x03, 0x04]);
        let vec = LazyVec::read(&mut buf).unwrap();
        let first: std::vec::Vec<_> = vec.iter(&mut buf, read_u32).take(2).collect();
        assert_eq!(first, [Ok(1), Ok(2)]);
        assert_eq!(buf.pos(), 3);
    }

    #[test]
    fn test_lazy_vec_ends_on_error() {
        let mut buf = Buffer::new([0x03, 0x01, 0x80]);
        let mut vec = LazyVec::read(&mut buf).unwrap();
        assert_eq!(vec.next_item(&mut buf, read_u32), Some(Ok(1)));
        assert_eq!(
            vec.next_item(&mut buf, read_u32),
            Some(Err(Error::UnexpectedEndOfInput))
        );
        assert!(vec.is_empty());
        assert_eq!(vec.next_item(&mut buf, read_u32), None);
    }
}

// Copyright (c) 2025 Joshua Seaton
//
// Use of this source code is governed by a MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT

//! LEB128 decoding.
//!
//! Decoding happens in two steps. First, up to `ceil(bits / 7)` raw bytes are
//! read, stopping early at the first byte without a continuation bit. Then
//! the raw bytes are interpreted: the value they encode must fit the target
//! width (else [`Error::integer_overflow`]), and the raw bytes must have been
//! terminated within the ceiling (else [`Error::invalid_encoding`]). The raw
//! bytes stay available so that callers can retain the exact source encoding.

const CONTENT_MASK: u8 = 0x7f;
const CONTINUATION_MASK: u8 = 0x80;

/// The longest encoding of any supported width (that of 64-bit integers).
pub const MAX_LEN: usize = 10;

/// A LEB128-decodable integral type.
pub trait Leb128: Copy {
    const BITS: u32;
    const IS_SIGNED: bool;

    // Narrows an already sign-extended value, if in range.
    #[doc(hidden)]
    fn from_wide(value: i128) -> Option<Self>;
}

macro_rules! impl_leb128 {
    ($($type:ty),* $(,)?) => {
        $(
            impl Leb128 for $type {
                const BITS: u32 = <$type>::BITS;
                const IS_SIGNED: bool = <$type>::MIN != 0;

                fn from_wide(value: i128) -> Option<Self> {
                    Self::try_from(value).ok()
                }
            }
        )*
    };
}

impl_leb128!(u8, u16, u32, u64, i8, i16, i32, i64);

/// Error trait for LEB128 decoding failures.
pub trait Error {
    /// The ceiling byte still carried a continuation bit.
    fn invalid_encoding() -> Self;

    /// The encoded value does not fit the target width.
    fn integer_overflow() -> Self;
}

/// The raw bytes of a LEB128-encoded integer, exactly as read.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct RawLeb128 {
    bytes: [u8; MAX_LEN],
    len: usize,
}

impl RawLeb128 {
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes[..self.len]
    }

    // Whether the last raw byte ended the encoding.
    fn is_terminated(&self) -> bool {
        self.as_bytes()
            .last()
            .is_some_and(|byte| byte & CONTINUATION_MASK == 0)
    }
}

/// Reads the raw bytes of an encoding of `T` using the provided byte source
/// function, without interpreting them.
pub fn read_raw<T, F, E>(mut read_byte: F) -> Result<RawLeb128, E>
where
    T: Leb128,
    F: FnMut() -> Result<u8, E>,
{
    let max_len = T::BITS.div_ceil(7) as usize;
    let mut raw = RawLeb128 {
        bytes: [0; MAX_LEN],
        len: 0,
    };
    while raw.len < max_len {
        let byte = read_byte()?;
        raw.bytes[raw.len] = byte;
        raw.len += 1;
        if byte & CONTINUATION_MASK == 0 {
            break;
        }
    }
    Ok(raw)
}

/// Interprets raw bytes previously read with [`read_raw`] as a `T`.
///
/// The range check comes first: an overlong encoding whose accumulated value
/// is out of range is an overflow rather than an encoding error.
pub fn decode<T, E>(raw: &RawLeb128) -> Result<T, E>
where
    T: Leb128,
    E: Error,
{
    let bytes = raw.as_bytes();
    let mut magnitude = 0u128;
    for (i, byte) in bytes.iter().enumerate() {
        magnitude |= u128::from(byte & CONTENT_MASK) << (7 * i);
    }

    // At most 70 bits were accumulated, so the casts below are lossless.
    #[allow(clippy::cast_possible_truncation, clippy::cast_possible_wrap)]
    let wide = {
        let width = 7 * bytes.len() as u32;
        let value = magnitude as i128;
        if T::IS_SIGNED && width > 0 && (magnitude >> (width - 1)) & 1 != 0 {
            value - (1i128 << width)
        } else {
            value
        }
    };

    let value = T::from_wide(wide).ok_or_else(E::integer_overflow)?;
    if !raw.is_terminated() {
        return Err(E::invalid_encoding());
    }
    Ok(value)
}

/// Reads a LEB128-encoded value using the provided byte source function.
pub fn read<T, F, E>(read_byte: F) -> Result<T, E>
where
    T: Leb128,
    F: FnMut() -> Result<u8, E>,
    E: Error,
{
    decode(&read_raw::<T, _, _>(read_byte)?)
}

// Copyright (c) 2025 Joshua Seaton
//
// Use of this source code is governed by a MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT

//! Decodable trait implementations for WebAssembly types.

use core::ops;

use num_enum::TryFromPrimitive;

use crate::Allocator;
use crate::core_compat::boxed::Box;
use crate::core_compat::vec::Vec;
use crate::cursor::Cursor;
use crate::types::*;

use super::expr::read_const_expr;
use super::namespace::Namespaces;
use super::vector::read_len;
use super::{
    ContextId, ContextStack, Contextual, CopyDecodable, Decodable, Error, Parser, checked_len,
};

// The `end` opcode, which terminates every function body.
const END: u8 = 0x0b;

macro_rules! impl_contextual {
    ($type:ident<A: Allocator>, $id:path) => {
        impl<A: Allocator> Contextual for $type<A> {
            const ID: ContextId = $id;
        }
    };
    (Vec<$type:ty, A>, $id:path) => {
        impl<A: Allocator> Contextual for Vec<$type, A> {
            const ID: ContextId = $id;
        }
    };
    ($type:ty, $id:path) => {
        impl Contextual for $type {
            const ID: ContextId = $id;
        }
    };
}

// Decodes a byte-tagged enum, reporting unknown bytes against the type's
// context.
macro_rules! impl_decodable_for_u8_enum {
    ($type:ty) => {
        impl CopyDecodable for $type {
            fn decode<C: Cursor>(
                parser: &mut Parser<C>,
                _: &mut ContextStack,
            ) -> Result<Self, Error<C::Error>> {
                let byte = parser.read_byte_raw()?;
                Self::try_from(byte).map_err(|_| Error::UnknownVariantTag {
                    context: <$type as Contextual>::ID.into(),
                    tag: byte.into(),
                })
            }
        }
    };
}

macro_rules! impl_decodable_for_leb128_u32_enum {
    ($type:ty) => {
        impl CopyDecodable for $type {
            fn decode<C: Cursor>(
                parser: &mut Parser<C>,
                _: &mut ContextStack,
            ) -> Result<Self, Error<C::Error>> {
                let tag: u32 = parser.read_leb128_raw()?;
                Self::try_from(tag).map_err(|_| Error::UnknownVariantTag {
                    context: <$type as Contextual>::ID.into(),
                    tag,
                })
            }
        }
    };
}

macro_rules! impl_decodable_for_newtype {
    ($type:ident<A>) => {
        impl<A: Allocator> Decodable<A> for $type<A> {
            fn decode<C: Cursor>(
                parser: &mut Parser<C>,
                context: &mut ContextStack,
                alloc: &A,
            ) -> Result<Self, Error<C::Error>> {
                Ok(Self::new(<Self as ops::Deref>::Target::decode(
                    parser, context, alloc,
                )?))
            }
        }
    };
    ($type:ident) => {
        impl CopyDecodable for $type {
            fn decode<C: Cursor>(
                parser: &mut Parser<C>,
                context: &mut ContextStack,
            ) -> Result<Self, Error<C::Error>> {
                Ok(Self::new(
                    <<Self as ops::Deref>::Target as CopyDecodable>::decode(parser, context)?,
                ))
            }
        }
    };
}

impl_contextual!(u32, ContextId::U32);
impl_contextual!(ConstExpr<A: Allocator>, ContextId::ConstExpr);
impl_contextual!(Data<A: Allocator>, ContextId::Data);
impl_contextual!(DataToken, ContextId::DataToken);
impl_contextual!(Elem<A: Allocator>, ContextId::Elem);
impl_contextual!(ElemKind, ContextId::ElemKind);
impl_contextual!(ElemToken, ContextId::ElemToken);
impl_contextual!(Export<A: Allocator>, ContextId::Export);
impl_contextual!(ExportDescriptor, ContextId::ExportDesc);
impl_contextual!(ExportDescriptorToken, ContextId::ExportDescToken);
impl_contextual!(FuncIdx, ContextId::FuncIdx);
impl_contextual!(FunctionType<A: Allocator>, ContextId::FuncType);
impl_contextual!(FunctionTypeToken, ContextId::FuncTypeToken);
impl_contextual!(Global<A: Allocator>, ContextId::Global);
impl_contextual!(GlobalIdx, ContextId::GlobalIdx);
impl_contextual!(GlobalType, ContextId::GlobalType);
impl_contextual!(ImportEntry<A: Allocator>, ContextId::Import);
impl_contextual!(ImportEntryDescriptor, ContextId::ImportDesc);
impl_contextual!(ImportDescriptorToken, ContextId::ImportDescToken);
impl_contextual!(Limits, ContextId::Limits);
impl_contextual!(LimitsToken, ContextId::LimitsToken);
impl_contextual!(LocalGroup, ContextId::Locals);
impl_contextual!(Mem, ContextId::MemType);
impl_contextual!(MemIdx, ContextId::MemIdx);
impl_contextual!(MemType, ContextId::MemType);
impl_contextual!(Mutability, ContextId::Mut);
impl_contextual!(Name<A: Allocator>, ContextId::Name);
impl_contextual!(RefType, ContextId::RefType);
impl_contextual!(ResultType<A: Allocator>, ContextId::ResultType);
impl_contextual!(Table, ContextId::TableType);
impl_contextual!(TableIdx, ContextId::TableIdx);
impl_contextual!(TableType, ContextId::TableType);
impl_contextual!(TypeIdx, ContextId::TypeIdx);
impl_contextual!(ValType, ContextId::ValType);
impl_contextual!(Vec<ConstExpr<A>, A>, ContextId::VecConstExpr);
impl_contextual!(Vec<FuncIdx, A>, ContextId::VecFuncIdx);

impl_decodable_for_u8_enum!(ElemKind);
impl_decodable_for_u8_enum!(ExportDescriptorToken);
impl_decodable_for_u8_enum!(FunctionTypeToken);
impl_decodable_for_u8_enum!(ImportDescriptorToken);
impl_decodable_for_u8_enum!(LimitsToken);
impl_decodable_for_u8_enum!(Mutability);
impl_decodable_for_u8_enum!(RefType);
impl_decodable_for_u8_enum!(ValType);

impl_decodable_for_leb128_u32_enum!(DataToken);
impl_decodable_for_leb128_u32_enum!(ElemToken);

impl_decodable_for_newtype!(FuncIdx);
impl_decodable_for_newtype!(GlobalIdx);
impl_decodable_for_newtype!(Mem);
impl_decodable_for_newtype!(MemIdx);
impl_decodable_for_newtype!(MemType);
impl_decodable_for_newtype!(Table);
impl_decodable_for_newtype!(TableIdx);
impl_decodable_for_newtype!(TypeIdx);
impl_decodable_for_newtype!(ResultType<A>);

impl CopyDecodable for u32 {
    fn decode<C: Cursor>(
        parser: &mut Parser<C>,
        _: &mut ContextStack,
    ) -> Result<Self, Error<C::Error>> {
        parser.read_leb128_raw()
    }
}

// Reads a length-prefixed vector of bytes.
fn read_byte_vec<C: Cursor, A: Allocator>(
    parser: &mut Parser<C>,
    context: &mut ContextStack,
    alloc: &A,
) -> Result<Box<[u8], A>, Error<C::Error>> {
    parser.with_context(context, ContextId::VecByte, |parser, context| {
        let len = read_len(parser, context)?;
        parser.read_bytes(context, len as usize, alloc)
    })
}

impl<A: Allocator> Decodable<A> for Name<A> {
    fn decode<C: Cursor>(
        parser: &mut Parser<C>,
        context: &mut ContextStack,
        alloc: &A,
    ) -> Result<Self, Error<C::Error>> {
        let len = read_len(parser, context)?;
        let bytes = parser.read_bytes(context, len as usize, alloc)?;
        let bytes = if str::from_utf8(&bytes).is_ok() {
            bytes
        } else {
            let mut lossy = Vec::new_in(alloc.clone());
            for chunk in bytes.utf8_chunks() {
                lossy.extend_from_slice(chunk.valid().as_bytes());
                if !chunk.invalid().is_empty() {
                    lossy.extend_from_slice("\u{fffd}".as_bytes());
                }
            }
            lossy.into_boxed_slice()
        };
        let bytes_ptr = Box::into_raw(bytes);

        // Safety: The ABIs of [u8] and str are identical, and the byte
        // sequence is either validated UTF-8 or was assembled from valid
        // chunks and replacement characters.
        let str = unsafe { Box::from_raw_in(bytes_ptr as *mut str, alloc.clone()) };
        Ok(Self::new(str))
    }
}

#[repr(u8)]
#[derive(Clone, Copy, Debug, TryFromPrimitive)]
enum FunctionTypeToken {
    Value = 0x60,
}

impl<A: Allocator> Decodable<A> for FunctionType<A> {
    fn decode<C: Cursor>(
        parser: &mut Parser<C>,
        context: &mut ContextStack,
        alloc: &A,
    ) -> Result<Self, Error<C::Error>> {
        parser.read_copy::<FunctionTypeToken>(context)?;
        Ok(Self {
            parameters: parser.read(context, alloc)?,
            results: parser.read(context, alloc)?,
        })
    }
}

#[derive(Copy, Clone, TryFromPrimitive)]
#[repr(u8)]
enum LimitsToken {
    WithoutMax = 0x00,
    WithMax = 0x01,
}

impl CopyDecodable for Limits {
    fn decode<C: Cursor>(
        parser: &mut Parser<C>,
        context: &mut ContextStack,
    ) -> Result<Self, Error<C::Error>> {
        let token: LimitsToken = parser.read_copy(context)?;
        let min: u32 = parser.read_copy(context)?;
        let max = match token {
            LimitsToken::WithoutMax => None,
            LimitsToken::WithMax => Some(parser.read_copy(context)?),
        };
        Ok(Self { min, max })
    }
}

impl CopyDecodable for TableType {
    fn decode<C: Cursor>(
        parser: &mut Parser<C>,
        context: &mut ContextStack,
    ) -> Result<Self, Error<C::Error>> {
        Ok(Self {
            reftype: parser.read_copy(context)?,
            limits: parser.read_copy(context)?,
        })
    }
}

impl CopyDecodable for GlobalType {
    fn decode<C: Cursor>(
        parser: &mut Parser<C>,
        context: &mut ContextStack,
    ) -> Result<Self, Error<C::Error>> {
        Ok(Self {
            value: parser.read_copy(context)?,
            mutability: parser.read_copy(context)?,
        })
    }
}

impl<A: Allocator> Decodable<A> for ConstExpr<A> {
    fn decode<C: Cursor>(
        parser: &mut Parser<C>,
        context: &mut ContextStack,
        alloc: &A,
    ) -> Result<Self, Error<C::Error>> {
        read_const_expr(parser, context, alloc)
    }
}

#[derive(TryFromPrimitive, Copy, Clone)]
#[repr(u8)]
enum ImportDescriptorToken {
    Function = 0x0,
    Table = 0x1,
    Memory = 0x2,
    Global = 0x3,
}

// An import descriptor as encoded, before its entity is assigned an index.
#[derive(Clone, Copy)]
enum ImportEntryDescriptor {
    Function(TypeIdx),
    Table(TableType),
    Memory(MemType),
    Global(GlobalType),
}

impl CopyDecodable for ImportEntryDescriptor {
    fn decode<C: Cursor>(
        parser: &mut Parser<C>,
        context: &mut ContextStack,
    ) -> Result<Self, Error<C::Error>> {
        type Token = ImportDescriptorToken;

        match parser.read_copy(context)? {
            Token::Function => Ok(Self::Function(parser.read_copy(context)?)),
            Token::Table => Ok(Self::Table(parser.read_copy(context)?)),
            Token::Memory => Ok(Self::Memory(parser.read_copy(context)?)),
            Token::Global => Ok(Self::Global(parser.read_copy(context)?)),
        }
    }
}

// An import as encoded.
pub(super) struct ImportEntry<A: Allocator> {
    module: Name<A>,
    field: Name<A>,
    descriptor: ImportEntryDescriptor,
}

impl<A: Allocator> ImportEntry<A> {
    // Registers the imported entity in its namespace.
    pub(super) fn register(self, namespaces: &mut Namespaces) -> Import<A> {
        let descriptor = match self.descriptor {
            ImportEntryDescriptor::Function(ty) => {
                ImportDescriptor::Function(namespaces.indexed(ty))
            }
            ImportEntryDescriptor::Table(ty) => ImportDescriptor::Table(namespaces.indexed(ty)),
            ImportEntryDescriptor::Memory(ty) => ImportDescriptor::Memory(namespaces.indexed(ty)),
            ImportEntryDescriptor::Global(ty) => ImportDescriptor::Global(namespaces.indexed(ty)),
        };
        Import {
            module: self.module,
            field: self.field,
            descriptor,
        }
    }
}

impl<A: Allocator> Decodable<A> for ImportEntry<A> {
    fn decode<C: Cursor>(
        parser: &mut Parser<C>,
        context: &mut ContextStack,
        alloc: &A,
    ) -> Result<Self, Error<C::Error>> {
        Ok(Self {
            module: parser.read(context, alloc)?,
            field: parser.read(context, alloc)?,
            descriptor: parser.read_copy(context)?,
        })
    }
}

impl<A: Allocator> Decodable<A> for Global<A> {
    fn decode<C: Cursor>(
        parser: &mut Parser<C>,
        context: &mut ContextStack,
        alloc: &A,
    ) -> Result<Self, Error<C::Error>> {
        Ok(Self {
            ty: parser.read_copy(context)?,
            init: parser.read(context, alloc)?,
        })
    }
}

#[derive(TryFromPrimitive, Copy, Clone)]
#[repr(u8)]
enum ExportDescriptorToken {
    Function = 0x0,
    Table = 0x1,
    Memory = 0x2,
    Global = 0x3,
}

impl CopyDecodable for ExportDescriptor {
    fn decode<C: Cursor>(
        parser: &mut Parser<C>,
        context: &mut ContextStack,
    ) -> Result<Self, Error<C::Error>> {
        type Token = ExportDescriptorToken;

        match parser.read_copy(context)? {
            Token::Function => Ok(ExportDescriptor::Function(parser.read_copy(context)?)),
            Token::Table => Ok(ExportDescriptor::Table(parser.read_copy(context)?)),
            Token::Memory => Ok(ExportDescriptor::Memory(parser.read_copy(context)?)),
            Token::Global => Ok(ExportDescriptor::Global(parser.read_copy(context)?)),
        }
    }
}

impl<A: Allocator> Decodable<A> for Export<A> {
    fn decode<C: Cursor>(
        parser: &mut Parser<C>,
        context: &mut ContextStack,
        alloc: &A,
    ) -> Result<Self, Error<C::Error>> {
        Ok(Self {
            name: parser.read(context, alloc)?,
            descriptor: parser.read_copy(context)?,
        })
    }
}

#[derive(Copy, Clone, TryFromPrimitive)]
#[repr(u32)]
enum ElemToken {
    ActiveElemIndices = 0,
    PassiveElemIndices = 1,
    ActiveTableIndexElemIndices = 2,
    DeclarativeElemIndices = 3,
    ActiveElemExprs = 4,
    PassiveElemExprs = 5,
    ActiveTableIndexElemExprs = 6,
    DeclarativeElemExprs = 7,
}

#[derive(Copy, Clone, Debug, TryFromPrimitive)]
#[repr(u8)]
enum ElemKind {
    FuncRef = 0x00,
}

impl From<ElemKind> for RefType {
    fn from(value: ElemKind) -> Self {
        match value {
            ElemKind::FuncRef => Self::Func,
        }
    }
}

impl<A: Allocator> Decodable<A> for Elem<A> {
    fn decode<C: Cursor>(
        parser: &mut Parser<C>,
        context: &mut ContextStack,
        alloc: &A,
    ) -> Result<Self, Error<C::Error>> {
        let token: ElemToken = parser.read_copy(context)?;
        match token {
            ElemToken::ActiveElemIndices => {
                let active = ElemModeActive {
                    table: TableIdx::new(0),
                    offset: parser.read(context, alloc)?,
                };
                Ok(Elem {
                    ty: RefType::Func,
                    init: ElemInit::FunctionIndices(parser.read(context, alloc)?),
                    mode: ElemMode::Active(active),
                })
            }
            ElemToken::PassiveElemIndices => {
                let kind: ElemKind = parser.read_copy(context)?;
                Ok(Elem {
                    ty: kind.into(),
                    init: ElemInit::FunctionIndices(parser.read(context, alloc)?),
                    mode: ElemMode::Passive,
                })
            }
            ElemToken::ActiveTableIndexElemIndices => {
                let active = ElemModeActive {
                    table: parser.read_copy(context)?,
                    offset: parser.read(context, alloc)?,
                };
                let kind: ElemKind = parser.read_copy(context)?;
                Ok(Elem {
                    ty: kind.into(),
                    init: ElemInit::FunctionIndices(parser.read(context, alloc)?),
                    mode: ElemMode::Active(active),
                })
            }
            ElemToken::DeclarativeElemIndices => {
                let kind: ElemKind = parser.read_copy(context)?;
                Ok(Elem {
                    ty: kind.into(),
                    init: ElemInit::FunctionIndices(parser.read(context, alloc)?),
                    mode: ElemMode::Declarative,
                })
            }
            ElemToken::ActiveElemExprs => {
                let active = ElemModeActive {
                    table: TableIdx::new(0),
                    offset: parser.read(context, alloc)?,
                };
                Ok(Elem {
                    ty: RefType::Func,
                    init: ElemInit::Expressions(parser.read(context, alloc)?),
                    mode: ElemMode::Active(active),
                })
            }
            ElemToken::PassiveElemExprs => {
                let reftype: RefType = parser.read_copy(context)?;
                Ok(Elem {
                    ty: reftype,
                    init: ElemInit::Expressions(parser.read(context, alloc)?),
                    mode: ElemMode::Passive,
                })
            }
            ElemToken::ActiveTableIndexElemExprs => {
                let active = ElemModeActive {
                    table: parser.read_copy(context)?,
                    offset: parser.read(context, alloc)?,
                };
                let reftype: RefType = parser.read_copy(context)?;
                Ok(Elem {
                    ty: reftype,
                    init: ElemInit::Expressions(parser.read(context, alloc)?),
                    mode: ElemMode::Active(active),
                })
            }
            ElemToken::DeclarativeElemExprs => {
                let reftype: RefType = parser.read_copy(context)?;
                Ok(Elem {
                    ty: reftype,
                    init: ElemInit::Expressions(parser.read(context, alloc)?),
                    mode: ElemMode::Declarative,
                })
            }
        }
    }
}

#[derive(Copy, Clone, TryFromPrimitive)]
#[repr(u32)]
enum DataToken {
    ActiveNoMemIdx = 0,
    Passive = 1,
    ActiveWithMemIdx = 2,
}

impl<A: Allocator> Decodable<A> for Data<A> {
    fn decode<C: Cursor>(
        parser: &mut Parser<C>,
        context: &mut ContextStack,
        alloc: &A,
    ) -> Result<Self, Error<C::Error>> {
        let token: DataToken = parser.read_copy(context)?;
        match token {
            DataToken::ActiveNoMemIdx => {
                let offset: ConstExpr<A> = parser.read(context, alloc)?;
                Ok(Self {
                    init: read_byte_vec(parser, context, alloc)?,
                    mode: DataMode::Active(DataModeActive {
                        memory: MemIdx::new(0),
                        offset,
                    }),
                })
            }
            DataToken::Passive => Ok(Self {
                init: read_byte_vec(parser, context, alloc)?,
                mode: DataMode::Passive,
            }),
            DataToken::ActiveWithMemIdx => {
                let memory = parser.read_copy(context)?;
                let offset: ConstExpr<A> = parser.read(context, alloc)?;
                Ok(Self {
                    init: read_byte_vec(parser, context, alloc)?,
                    mode: DataMode::Active(DataModeActive { memory, offset }),
                })
            }
        }
    }
}

// A run of locals of the same type.
#[derive(Clone, Copy)]
struct LocalGroup {
    count: u32,
    ty: ValType,
}

impl CopyDecodable for LocalGroup {
    fn decode<C: Cursor>(
        parser: &mut Parser<C>,
        context: &mut ContextStack,
    ) -> Result<Self, Error<C::Error>> {
        Ok(Self {
            count: parser.read_copy(context)?,
            ty: parser.read_copy(context)?,
        })
    }
}

// Reads the local declarations of a function, expanding each group.
fn read_locals<C: Cursor, A: Allocator>(
    parser: &mut Parser<C>,
    context: &mut ContextStack,
    alloc: &A,
    max_locals: usize,
) -> Result<Vec<ValType, A>, Error<C::Error>> {
    parser.with_context(context, ContextId::VecLocals, |parser, context| {
        let num_groups = read_len(parser, context)?;
        let mut locals = Vec::new_in(alloc.clone());
        for _ in 0..num_groups {
            let group: LocalGroup = parser.read_copy(context)?;
            let subtotal = locals.len() as u64 + u64::from(group.count);
            if subtotal > max_locals as u64 {
                return Err(Error::LengthTooLarge(subtotal));
            }
            locals.resize(subtotal as usize, group.ty);
        }
        Ok(locals)
    })
}

/// Reads a size-prefixed function body.
///
/// The locals and the body must exactly account for the declared size. If the
/// locals alone use it up, that is reported as a size mismatch rather than
/// as whatever the body would have failed with.
pub(super) fn read_code<C: Cursor, A: Allocator>(
    parser: &mut Parser<C>,
    context: &mut ContextStack,
    alloc: &A,
    max_locals: usize,
) -> Result<Code<A>, Error<C::Error>> {
    parser.with_context(context, ContextId::Code, |parser, context| {
        let size = parser.read_copy::<u32>(context)? as usize;

        // Whether the enclosing regions can supply the whole body, in which
        // case running out of room is this body's own fault.
        let covered = parser
            .cursor()
            .remaining()
            .is_none_or(|remaining| remaining >= size);

        let mut inner = parser.bounded(size);
        let locals = match read_locals(&mut inner, context, alloc, max_locals) {
            Ok(locals) => locals,
            Err(Error::LimitReached {
                requested,
                remaining,
            }) if covered => {
                return Err(Error::SizeMismatch {
                    expected: size,
                    actual: (size - remaining).saturating_add(requested),
                });
            }
            Err(err) => return Err(err),
        };

        let consumed = inner.cursor().consumed();
        if consumed >= size {
            return Err(Error::SizeMismatch {
                expected: size,
                actual: consumed,
            });
        }
        let body_len = checked_len(size - 1, consumed)?;
        let body = inner.read_bytes(context, body_len, alloc)?;
        let terminator = inner.read_byte_raw()?;
        if terminator != END {
            return Err(Error::MalformedTerminator(terminator));
        }
        Ok(Code { locals, body })
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    use core::convert::Infallible;

    use crate::core_compat::alloc::Global;
    use crate::cursor::Buffer;

    fn read<T: Decodable<Global> + Contextual>(bytes: &[u8]) -> Result<T, Error<Infallible>> {
        let mut parser = Parser::new(Buffer::new(bytes));
        parser.read(&mut ContextStack::default(), &Global)
    }

    fn read_code_from(bytes: &[u8]) -> Result<Code<Global>, Error<Infallible>> {
        let mut parser = Parser::new(Buffer::new(bytes));
        read_code(&mut parser, &mut ContextStack::default(), &Global, 50_000)
    }

    #[test]
    fn test_valtype() {
        assert_eq!(read::<ValType>(&[0x7f]), Ok(ValType::I32));
        assert_eq!(read::<ValType>(&[0x70]), Ok(ValType::FuncRef));
        assert_eq!(
            read::<ValType>(&[0x7b]),
            Err(Error::UnknownVariantTag {
                context: "valtype",
                tag: 0x7b
            })
        );
    }

    #[test]
    fn test_function_type() {
        let ty = read::<FunctionType<Global>>(&[0x60, 0x02, 0x7f, 0x7e, 0x01, 0x6f]).unwrap();
        assert_eq!(&ty.parameters[..], &[ValType::I32, ValType::I64]);
        assert_eq!(&ty.results[..], &[ValType::ExternRef]);

        assert!(matches!(
            read::<FunctionType<Global>>(&[0x61, 0x00, 0x00]),
            Err(Error::UnknownVariantTag {
                context: "functype token",
                tag: 0x61
            })
        ));
    }

    #[test]
    fn test_limits() {
        assert_eq!(
            read::<Limits>(&[0x00, 0x01]),
            Ok(Limits { min: 1, max: None })
        );
        assert_eq!(
            read::<Limits>(&[0x01, 0x01, 0x80, 0x02]),
            Ok(Limits {
                min: 1,
                max: Some(0x100)
            })
        );
        assert_eq!(
            read::<Limits>(&[0x02, 0x01]),
            Err(Error::UnknownVariantTag {
                context: "limits token",
                tag: 0x02
            })
        );
    }

    #[test]
    fn test_table_and_global_types() {
        assert_eq!(
            read::<TableType>(&[0x70, 0x01, 0x00, 0x10]),
            Ok(TableType {
                reftype: RefType::Func,
                limits: Limits {
                    min: 0,
                    max: Some(0x10)
                },
            })
        );
        assert_eq!(
            read::<GlobalType>(&[0x7d, 0x01]),
            Ok(GlobalType {
                value: ValType::F32,
                mutability: Mutability::Var,
            })
        );
        assert_eq!(
            read::<GlobalType>(&[0x7d, 0x02]),
            Err(Error::UnknownVariantTag {
                context: "mut",
                tag: 0x02
            })
        );
    }

    #[test]
    fn test_name() {
        let name = read::<Name<Global>>(&[0x03, b'a', b'b', b'c']).unwrap();
        assert_eq!(name, "abc");

        // Invalid sequences are replaced.
        let name = read::<Name<Global>>(&[0x04, b'a', 0xff, 0xfe, b'z']).unwrap();
        assert_eq!(name.as_str(), "a\u{fffd}\u{fffd}z");

        assert!(matches!(
            read::<Name<Global>>(&[0x04, b'a']),
            Err(Error::UnexpectedEndOfInput)
        ));
    }

    #[test]
    fn test_export() {
        let export = read::<Export<Global>>(&[0x01, b'f', 0x00, 0x05]).unwrap();
        assert_eq!(export.name, "f");
        assert_eq!(export.descriptor, ExportDescriptor::Function(FuncIdx::new(5)));

        assert!(matches!(
            read::<Export<Global>>(&[0x01, b'f', 0x04, 0x05]),
            Err(Error::UnknownVariantTag {
                context: "exportdesc token",
                tag: 0x04
            })
        ));
    }

    #[test]
    fn test_import_registration() {
        let mut namespaces = Namespaces::new();
        namespaces.next::<FuncIdx>();
        let entry = read::<ImportEntry<Global>>(&[0x01, b'm', 0x01, b'f', 0x00, 0x02]).unwrap();
        let import = entry.register(&mut namespaces);
        assert_eq!(import.module, "m");
        assert_eq!(import.field, "f");
        assert_eq!(
            import.descriptor,
            ImportDescriptor::Function(Indexed {
                index: FuncIdx::new(1),
                value: TypeIdx::new(2)
            })
        );

        let entry = read::<ImportEntry<Global>>(&[0x00, 0x00, 0x02, 0x00, 0x01]).unwrap();
        assert_eq!(
            entry.register(&mut namespaces).descriptor,
            ImportDescriptor::Memory(Indexed {
                index: MemIdx::new(0),
                value: MemType::new(Limits { min: 1, max: None })
            })
        );
    }

    #[test]
    fn test_elem_variants() {
        // 0: active table 0, offset, function indices.
        let elem = read::<Elem<Global>>(&[0x00, 0x41, 0x00, 0x0b, 0x02, 0x00, 0x01]).unwrap();
        assert_eq!(elem.ty, RefType::Func);
        let ElemMode::Active(active) = &elem.mode else {
            panic!("{:?}", elem.mode)
        };
        assert_eq!(active.table, TableIdx::new(0));
        assert_eq!(active.offset.as_bytes(), &[0x41, 0x00, 0x0b]);
        let ElemInit::FunctionIndices(funcs) = &elem.init else {
            panic!("{:?}", elem.init)
        };
        assert_eq!(&funcs[..], &[FuncIdx::new(0), FuncIdx::new(1)]);

        // 3: declarative, elemkind, function indices.
        let elem = read::<Elem<Global>>(&[0x03, 0x00, 0x01, 0x07]).unwrap();
        assert!(matches!(elem.mode, ElemMode::Declarative));

        // 5: passive, reftype, expressions.
        let elem = read::<Elem<Global>>(&[0x05, 0x6f, 0x01, 0xd0, 0x6f, 0x0b]).unwrap();
        assert_eq!(elem.ty, RefType::Extern);
        assert!(matches!(elem.mode, ElemMode::Passive));
        let ElemInit::Expressions(exprs) = &elem.init else {
            panic!("{:?}", elem.init)
        };
        assert_eq!(exprs[0].as_bytes(), &[0xd0, 0x6f, 0x0b]);

        // 6: active explicit table, offset, reftype, expressions.
        let elem =
            read::<Elem<Global>>(&[0x06, 0x02, 0x23, 0x00, 0x0b, 0x70, 0x01, 0xd2, 0x03, 0x0b])
                .unwrap();
        let ElemMode::Active(active) = &elem.mode else {
            panic!("{:?}", elem.mode)
        };
        assert_eq!(active.table, TableIdx::new(2));
        assert_eq!(active.offset.as_bytes(), &[0x23, 0x00, 0x0b]);

        // Elemkind must be funcref.
        assert!(matches!(
            read::<Elem<Global>>(&[0x01, 0x01, 0x00]),
            Err(Error::UnknownVariantTag {
                context: "elemkind",
                tag: 0x01
            })
        ));
        assert!(matches!(
            read::<Elem<Global>>(&[0x08]),
            Err(Error::UnknownVariantTag {
                context: "elem token",
                tag: 0x08
            })
        ));
    }

    #[test]
    fn test_data_variants() {
        let data = read::<Data<Global>>(&[0x00, 0x41, 0x10, 0x0b, 0x02, 0xaa, 0xbb]).unwrap();
        assert_eq!(&data.init[..], &[0xaa, 0xbb]);
        let DataMode::Active(active) = &data.mode else {
            panic!("{:?}", data.mode)
        };
        assert_eq!(active.memory, MemIdx::new(0));
        assert_eq!(active.offset.as_bytes(), &[0x41, 0x10, 0x0b]);

        let data = read::<Data<Global>>(&[0x01, 0x01, 0xcc]).unwrap();
        assert!(matches!(data.mode, DataMode::Passive));
        assert_eq!(&data.init[..], &[0xcc]);

        let data = read::<Data<Global>>(&[0x02, 0x01, 0x41, 0x00, 0x0b, 0x00]).unwrap();
        let DataMode::Active(active) = &data.mode else {
            panic!("{:?}", data.mode)
        };
        assert_eq!(active.memory, MemIdx::new(1));
        assert!(data.init.is_empty());

        assert!(matches!(
            read::<Data<Global>>(&[0x03]),
            Err(Error::UnknownVariantTag {
                context: "data token",
                tag: 0x03
            })
        ));
    }

    #[test]
    fn test_code() {
        // Two groups (2 x i32, 1 x f64), body `nop`, end.
        let code = read_code_from(&[0x07, 0x02, 0x02, 0x7f, 0x01, 0x7c, 0x01, 0x0b]).unwrap();
        assert_eq!(code.locals(), &[ValType::I32, ValType::I32, ValType::F64]);
        assert_eq!(code.body(), &[0x01]);

        // No locals, empty body.
        let code = read_code_from(&[0x02, 0x00, 0x0b]).unwrap();
        assert!(code.locals().is_empty());
        assert!(code.body().is_empty());
    }

    #[test]
    fn test_code_size_mismatch() {
        // The locals alone take up the declared size of 3.
        assert_eq!(
            read_code_from(&[0x03, 0x01, 0x01, 0x7f, 0x0b]).map(|_| ()),
            Err(Error::SizeMismatch {
                expected: 3,
                actual: 3
            })
        );

        // The locals run past the declared size of 2.
        assert_eq!(
            read_code_from(&[0x02, 0x01, 0x01, 0x7f, 0x0b]).map(|_| ()),
            Err(Error::SizeMismatch {
                expected: 2,
                actual: 3
            })
        );
    }

    #[test]
    fn test_code_malformed_terminator() {
        assert_eq!(
            read_code_from(&[0x03, 0x00, 0x01, 0x01]).map(|_| ()),
            Err(Error::MalformedTerminator(0x01))
        );
    }

    #[test]
    fn test_too_many_locals() {
        let mut parser = Parser::new(Buffer::new([
            0x06, 0x02, 0x02, 0x7f, 0x02, 0x7e, 0x0b,
        ]));
        assert_eq!(
            read_code::<_, Global>(&mut parser, &mut ContextStack::default(), &Global, 3)
                .map(|_| ()),
            Err(Error::LengthTooLarge(4))
        );
    }
}

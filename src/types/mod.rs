// Copyright (c) 2025 Joshua Seaton
//
// Use of this source code is governed by a MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT

//! WebAssembly type definitions.
//!
//! This module contains the types produced by the decoder: value and
//! reference types, function signatures, imports, exports, segments, and the
//! [`SectionItem`] stream element that wraps them.

use num_enum::TryFromPrimitive;

use crate::Allocator;
use crate::core_compat::boxed::Box;
use crate::core_compat::vec::Vec;

// Defines a public newtype without public mutable access to the underlying
// type, along with some convenience trait implementations like Deref and AsRef.
macro_rules! newtype {
    (
        $(#[$meta:meta])*
        pub struct $type:ident<A: Allocator>($underlying:ty);
    ) => {
        $(#[$meta])*
        pub struct $type<A: Allocator>($underlying);

        newtype!(@impl [A: Allocator], $type<A>, $underlying);
    };
    (
        $(#[$meta:meta])*
        pub struct $type:ident($underlying:ty);
    ) => {
        $(#[$meta])*
        pub struct $type($underlying);

        newtype!(@impl [], $type, $underlying);
    };
    (@impl [$($generic_params:tt)*], $qualified_type:ty, $underlying:ty) => {
        impl<$($generic_params)*> $qualified_type {
            pub fn new(value: $underlying) -> Self {
                Self(value)
            }
        }

        impl<$($generic_params)*> ::core::ops::Deref for $qualified_type {
            type Target = $underlying;

            fn deref(&self) -> &Self::Target {
                &self.0
            }
        }

        impl<$($generic_params)*> AsRef<$underlying> for $qualified_type {
            fn as_ref(&self) -> &$underlying {
                &self.0
            }
        }
    };
}

newtype!(
    /// A name (of a module, section, or field).
    ///
    /// Names are decoded lossily: invalid UTF-8 sequences are replaced with
    /// U+FFFD.
    #[derive(Debug, Eq, PartialEq)]
    pub struct Name<A: Allocator>(Box<str, A>);
);

impl<A: Allocator> Name<A> {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl<A: Allocator> PartialEq<str> for Name<A> {
    fn eq(&self, other: &str) -> bool {
        self.as_str() == other
    }
}

impl<A: Allocator> PartialEq<&str> for Name<A> {
    fn eq(&self, other: &&str) -> bool {
        self.as_str() == *other
    }
}

/// Number types classify numeric values.
#[derive(Clone, Copy, Debug, Eq, PartialEq, TryFromPrimitive)]
#[repr(u8)]
pub enum NumType {
    /// 32-bit integer.
    I32 = 0x7f,
    /// 64-bit integer.
    I64 = 0x7e,
    /// 32-bit floating point number.
    F32 = 0x7d,
    /// 64-bit floating point number.
    F64 = 0x7c,
}

/// The type of a reference to an object in the runtime store.
#[derive(Clone, Copy, Debug, Eq, PartialEq, TryFromPrimitive)]
#[repr(u8)]
pub enum RefType {
    /// Function reference type.
    Func = 0x70,
    /// External reference type.
    Extern = 0x6f,
}

/// Value types classify the individual values that WebAssembly code can compute
/// with and the values that a variable accepts.
#[derive(Clone, Copy, Debug, Eq, PartialEq, TryFromPrimitive)]
#[repr(u8)]
pub enum ValType {
    I32 = NumType::I32 as u8,
    I64 = NumType::I64 as u8,
    F32 = NumType::F32 as u8,
    F64 = NumType::F64 as u8,
    FuncRef = RefType::Func as u8,
    ExternRef = RefType::Extern as u8,
}

impl ValType {
    /// The number type, if this is one.
    pub const fn num_type(self) -> Option<NumType> {
        match self {
            ValType::I32 => Some(NumType::I32),
            ValType::I64 => Some(NumType::I64),
            ValType::F32 => Some(NumType::F32),
            ValType::F64 => Some(NumType::F64),
            ValType::FuncRef | ValType::ExternRef => None,
        }
    }

    /// The reference type, if this is one.
    pub const fn ref_type(self) -> Option<RefType> {
        match self {
            ValType::FuncRef => Some(RefType::Func),
            ValType::ExternRef => Some(RefType::Extern),
            _ => None,
        }
    }
}

impl From<NumType> for ValType {
    fn from(value: NumType) -> Self {
        match value {
            NumType::I32 => ValType::I32,
            NumType::I64 => ValType::I64,
            NumType::F32 => ValType::F32,
            NumType::F64 => ValType::F64,
        }
    }
}

impl From<RefType> for ValType {
    fn from(value: RefType) -> Self {
        match value {
            RefType::Func => ValType::FuncRef,
            RefType::Extern => ValType::ExternRef,
        }
    }
}

newtype!(
    /// The sequence of types representing the result of executing instructions
    /// or functions.
    #[derive(Debug, Clone)]
    pub struct ResultType<A: Allocator>(Vec<ValType, A>);
);

/// The signature of a function, mapping parameters to results.
#[derive(Clone, Debug)]
pub struct FunctionType<A: Allocator> {
    pub parameters: ResultType<A>,
    pub results: ResultType<A>,
}

/// The size range of the resizeable storage associated with memory (# of pages)
/// and table types (# of elements).
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Limits {
    /// Minimum size.
    pub min: u32,
    /// Maximum size, with None indicating that there is no upper limit.
    pub max: Option<u32>,
}

newtype!(
    /// A linear memory type with its size limits.
    #[derive(Clone, Copy, Debug, Eq, PartialEq)]
    pub struct MemType(Limits);
);

impl MemType {
    /// The WebAssembly page size.
    pub const PAGE_SIZE: u64 = 0x1_0000; // 64 KiB

    /// The minimum size in bytes of the linear memory region.
    pub const fn min_size_bytes(&self) -> u64 {
        (self.0.min as u64) * Self::PAGE_SIZE
    }

    /// The maximum size in bytes of the linear memory region, if any.
    pub fn max_size_bytes(&self) -> Option<u64> {
        self.0.max.map(|max| u64::from(max) * Self::PAGE_SIZE)
    }
}

/// WebAssembly table type.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct TableType {
    /// Type of references stored in table.
    pub reftype: RefType,
    /// Table size limits.
    pub limits: Limits,
}

impl TableType {
    /// The minimum number of elements in the table.
    pub const fn min_elements(&self) -> u32 {
        self.limits.min
    }

    /// The maximum number of elements in the table, if any.
    pub const fn max_elements(&self) -> Option<u32> {
        self.limits.max
    }
}

/// The mutability of a global variable.
#[derive(Clone, Copy, Debug, Eq, PartialEq, TryFromPrimitive)]
#[repr(u8)]
pub enum Mutability {
    /// Immutable.
    Const = 0x00,
    /// Mutable.
    Var = 0x01,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct GlobalType {
    /// The type of the global.
    pub value: ValType,

    /// The mutability of the global.
    pub mutability: Mutability,
}

newtype!(
    /// An index into the type namespace.
    #[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
    pub struct TypeIdx(u32);
);

newtype!(
    /// An index into the function namespace (imports first).
    #[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
    pub struct FuncIdx(u32);
);

newtype!(
    /// An index into the table namespace.
    #[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
    pub struct TableIdx(u32);
);

newtype!(
    /// An index into the memory namespace.
    #[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
    pub struct MemIdx(u32);
);

newtype!(
    /// An index into the global namespace.
    #[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
    pub struct GlobalIdx(u32);
);

newtype!(
    /// An index into the element segment namespace.
    #[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
    pub struct ElemIdx(u32);
);

newtype!(
    /// An index into the data segment namespace.
    #[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
    pub struct DataIdx(u32);
);

newtype!(
    /// An index into a function's local variables.
    #[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
    pub struct LocalIdx(u32);
);

newtype!(
    /// An index referencing structured control instructions inside an
    /// instruction sequence.
    #[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
    pub struct LabelIdx(u32);
);

/// A decoded value together with the namespace index assigned to it.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Indexed<I, V> {
    pub index: I,
    pub value: V,
}

newtype!(
    /// A constant expression, kept as its exact source bytes (terminating
    /// `end` opcode included).
    #[derive(Clone, Debug, Eq, PartialEq)]
    pub struct ConstExpr<A: Allocator>(Box<[u8], A>);
);

impl<A: Allocator> ConstExpr<A> {
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

/// Section identifier within a module.
#[derive(Clone, Copy, Debug, Eq, TryFromPrimitive, PartialEq)]
#[repr(u8)]
pub enum SectionId {
    /// Custom section with arbitrary data.
    Custom = 0,
    /// Function type declarations.
    Type = 1,
    /// Import declarations.
    Import = 2,
    /// Function type indices for module functions.
    Function = 3,
    /// Table declarations.
    Table = 4,
    /// Memory declarations.
    Memory = 5,
    /// Global declarations.
    Global = 6,
    /// Export declarations.
    Export = 7,
    /// Start function index.
    Start = 8,
    /// Element segments for table initialization.
    Element = 9,
    /// Function bodies.
    Code = 10,
    /// Data segments for memory initialization.
    Data = 11,
    /// Data segment count (for bulk memory operations).
    DataCount = 12,
}

/// Custom section with arbitrary binary data.
#[derive(Debug)]
pub struct CustomSection<A: Allocator> {
    /// Section name.
    pub name: Name<A>,
    /// Section content, or `None` if it was skipped per
    /// [`DecodeOptions::retain_custom_payload`](crate::DecodeOptions::retain_custom_payload).
    pub payload: Option<Box<[u8], A>>,
}

/// Import descriptor types, each carrying the index it was assigned in its
/// namespace.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ImportDescriptor {
    /// Import a function with the given type index.
    Function(Indexed<FuncIdx, TypeIdx>),
    /// Import a table with the given type.
    Table(Indexed<TableIdx, TableType>),
    /// Import a memory with the given type.
    Memory(Indexed<MemIdx, MemType>),
    /// Import a global with the given type.
    Global(Indexed<GlobalIdx, GlobalType>),
}

/// An import declaration.
#[derive(Debug)]
pub struct Import<A: Allocator> {
    /// Name of the module to import from.
    pub module: Name<A>,
    /// Name of the imported entity.
    pub field: Name<A>,
    /// Type of the imported entity.
    pub descriptor: ImportDescriptor,
}

newtype!(
    /// A table definition.
    #[derive(Clone, Copy, Debug, Eq, PartialEq)]
    pub struct Table(TableType);
);

newtype!(
    /// A linear memory definition.
    #[derive(Clone, Copy, Debug, Eq, PartialEq)]
    pub struct Mem(MemType);
);

/// A global definition.
#[derive(Clone, Debug)]
pub struct Global<A: Allocator> {
    /// Global type and mutability.
    pub ty: GlobalType,
    /// Initialization expression.
    pub init: ConstExpr<A>,
}

/// Describes what kind of entity is being exported.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ExportDescriptor {
    /// Export a function with the given index.
    Function(FuncIdx),
    /// Export a table with the given index.
    Table(TableIdx),
    /// Export a memory with the given index.
    Memory(MemIdx),
    /// Export a global with the given index.
    Global(GlobalIdx),
}

/// An export declaration.
#[derive(Debug)]
pub struct Export<A: Allocator> {
    /// Name of the exported entity.
    pub name: Name<A>,
    /// Type and index of the exported entity.
    pub descriptor: ExportDescriptor,
}

/// WebAssembly element segment.
#[derive(Clone, Debug)]
pub struct Elem<A: Allocator> {
    /// The type of references this element segment contains.
    pub ty: RefType,
    /// The initial values for the element segment.
    pub init: ElemInit<A>,
    /// How this element segment should be placed (active, passive, or
    /// declarative).
    pub mode: ElemMode<A>,
}

/// The initialization data for an element segment.
#[derive(Clone, Debug)]
pub enum ElemInit<A: Allocator> {
    /// Element segment contains function indices.
    FunctionIndices(Vec<FuncIdx, A>),
    /// Element segment contains initialization expressions.
    Expressions(Vec<ConstExpr<A>, A>),
}

/// Active element mode with table and offset.
#[derive(Clone, Debug)]
pub struct ElemModeActive<A: Allocator> {
    /// Index of the table to initialize.
    pub table: TableIdx,
    /// Expression computing the offset within the table.
    pub offset: ConstExpr<A>,
}

/// Element segment mode.
#[derive(Clone, Debug)]
pub enum ElemMode<A: Allocator> {
    Passive,
    Active(ElemModeActive<A>),
    Declarative,
}

/// A function body: its local variables and raw instruction bytes.
#[derive(Debug)]
pub struct Code<A: Allocator> {
    pub(crate) locals: Vec<ValType, A>,
    pub(crate) body: Box<[u8], A>,
}

impl<A: Allocator> Code<A> {
    /// The types of the function's declared locals, with each group expanded
    /// into one entry per local.
    pub fn locals(&self) -> &[ValType] {
        &self.locals
    }

    /// The raw instruction bytes of the body, excluding the final `end`
    /// opcode.
    pub fn body(&self) -> &[u8] {
        &self.body
    }
}

/// A data segment for initializing linear memory.
#[derive(Debug)]
pub struct Data<A: Allocator> {
    /// The initial data bytes for this segment.
    pub init: Box<[u8], A>,
    /// How this data segment should be placed (active or passive).
    pub mode: DataMode<A>,
}

/// The placement mode for a data segment.
#[derive(Debug)]
pub enum DataMode<A: Allocator> {
    /// Passive data segment (must be explicitly copied via memory.init).
    Passive,
    /// Active data segment (automatically copied to memory during instantiation).
    Active(DataModeActive<A>),
}

/// Active placement information for a data segment.
#[derive(Debug)]
pub struct DataModeActive<A: Allocator> {
    /// Index of the memory to initialize.
    pub memory: MemIdx,
    /// Expression computing the offset within the memory.
    pub offset: ConstExpr<A>,
}

/// A single decoded item of a module.
///
/// Custom, start, and data count sections each yield one item per appearance;
/// every other section yields one item per element of its vector, in encoding
/// order.
#[derive(Debug)]
pub enum SectionItem<A: Allocator> {
    Custom(CustomSection<A>),
    Type(Indexed<TypeIdx, FunctionType<A>>),
    Import(Import<A>),
    Func(Indexed<FuncIdx, TypeIdx>),
    Table(Indexed<TableIdx, Table>),
    Mem(Indexed<MemIdx, Mem>),
    Global(Indexed<GlobalIdx, Global<A>>),
    Export(Export<A>),
    Start(FuncIdx),
    Elem(Indexed<ElemIdx, Elem<A>>),
    Code(Code<A>),
    Data(Indexed<DataIdx, Data<A>>),
    DataCount(u32),
}

impl<A: Allocator> SectionItem<A> {
    /// The ID of the section this item came from.
    pub const fn section_id(&self) -> SectionId {
        match self {
            SectionItem::Custom(_) => SectionId::Custom,
            SectionItem::Type(_) => SectionId::Type,
            SectionItem::Import(_) => SectionId::Import,
            SectionItem::Func(_) => SectionId::Function,
            SectionItem::Table(_) => SectionId::Table,
            SectionItem::Mem(_) => SectionId::Memory,
            SectionItem::Global(_) => SectionId::Global,
            SectionItem::Export(_) => SectionId::Export,
            SectionItem::Start(_) => SectionId::Start,
            SectionItem::Elem(_) => SectionId::Element,
            SectionItem::Code(_) => SectionId::Code,
            SectionItem::Data(_) => SectionId::Data,
            SectionItem::DataCount(_) => SectionId::DataCount,
        }
    }
}

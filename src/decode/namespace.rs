// Copyright (c) 2025 Joshua Seaton
//
// Use of this source code is governed by a MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT

//! Index namespace bookkeeping.

use core::fmt;

use crate::types::{
    DataIdx, ElemIdx, FuncIdx, GlobalIdx, Indexed, LabelIdx, LocalIdx, MemIdx, TableIdx, TypeIdx,
};

const NUM_NAMESPACES: usize = 9;

/// An index type with its own namespace.
pub trait NamespaceIndex: Copy {
    // The counter backing the namespace.
    #[doc(hidden)]
    const SLOT: usize;

    #[doc(hidden)]
    fn from_raw(index: u32) -> Self;
}

macro_rules! impl_namespace_index {
    ($($type:ty => $slot:literal),* $(,)?) => {
        $(
            impl NamespaceIndex for $type {
                const SLOT: usize = $slot;

                fn from_raw(index: u32) -> Self {
                    Self::new(index)
                }
            }
        )*
    };
}

impl_namespace_index!(
    TypeIdx => 0,
    FuncIdx => 1,
    TableIdx => 2,
    MemIdx => 3,
    GlobalIdx => 4,
    ElemIdx => 5,
    DataIdx => 6,
    LocalIdx => 7,
    LabelIdx => 8,
);

/// The next index to hand out in each namespace.
///
/// Counters start at zero and are shared between every section that
/// introduces entities of a kind; imported functions, for example, are
/// numbered before those defined in the function section.
#[derive(Clone, Default, Eq, PartialEq)]
pub struct Namespaces {
    counters: [u32; NUM_NAMESPACES],
}

impl Namespaces {
    pub fn new() -> Self {
        Self::default()
    }

    /// Assigns the next index in `I`'s namespace.
    pub fn next<I: NamespaceIndex>(&mut self) -> I {
        let counter = &mut self.counters[I::SLOT];
        let index = *counter;
        *counter += 1;
        I::from_raw(index)
    }

    /// Pairs `value` with the next index in `I`'s namespace.
    pub fn indexed<I: NamespaceIndex, V>(&mut self, value: V) -> Indexed<I, V> {
        Indexed {
            index: self.next(),
            value,
        }
    }

    /// The number of indices handed out so far in `I`'s namespace.
    pub fn count<I: NamespaceIndex>(&self) -> u32 {
        self.counters[I::SLOT]
    }
}

impl fmt::Debug for Namespaces {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Namespaces")
            .field("types", &self.count::<TypeIdx>())
            .field("funcs", &self.count::<FuncIdx>())
            .field("tables", &self.count::<TableIdx>())
            .field("mems", &self.count::<MemIdx>())
            .field("globals", &self.count::<GlobalIdx>())
            .field("elems", &self.count::<ElemIdx>())
            .field("datas", &self.count::<DataIdx>())
            .field("locals", &self.count::<LocalIdx>())
            .field("labels", &self.count::<LabelIdx>())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_namespaces_are_independent() {
        let mut namespaces = Namespaces::new();
        assert_eq!(namespaces.next::<FuncIdx>(), FuncIdx::new(0));
        assert_eq!(namespaces.next::<FuncIdx>(), FuncIdx::new(1));
        assert_eq!(namespaces.next::<TypeIdx>(), TypeIdx::new(0));
        assert_eq!(namespaces.next::<LabelIdx>(), LabelIdx::new(0));
        assert_eq!(
            namespaces.indexed::<FuncIdx, _>("f"),
            Indexed {
                index: FuncIdx::new(2),
                value: "f"
            }
        );
        assert_eq!(namespaces.count::<FuncIdx>(), 3);
        assert_eq!(namespaces.count::<TypeIdx>(), 1);
        assert_eq!(namespaces.count::<GlobalIdx>(), 0);
    }
}

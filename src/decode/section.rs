// Copyright (c) 2025 Joshua Seaton
//
// Use of this source code is governed by a MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT

//! Section dispatch.
//!
//! Sections are decoded incrementally: custom, start, and data count sections
//! are read whole, while for every other section only the vector length is
//! read up front and the items are decoded one per request. Between requests,
//! an open section is represented by its unconsumed quota and the number of
//! items still to come.

use log::trace;

use crate::cursor::{Bounded, Cursor};
use crate::types::{CustomSection, Name, SectionId, SectionItem};
use crate::{Allocator, DecodeOptions};

use super::decodable_impls::{ImportEntry, read_code};
use super::namespace::Namespaces;
use super::vector::LazyVec;
use super::{ContextId, ContextStack, Error, Parser, checked_len};

// A section whose payload is a vector of items.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum VecSection {
    Type,
    Import,
    Function,
    Table,
    Memory,
    Global,
    Export,
    Element,
    Code,
    Data,
}

impl VecSection {
    fn context(self) -> ContextId {
        match self {
            VecSection::Type => ContextId::TypeSec,
            VecSection::Import => ContextId::ImportSec,
            VecSection::Function => ContextId::FuncSec,
            VecSection::Table => ContextId::TableSec,
            VecSection::Memory => ContextId::MemSec,
            VecSection::Global => ContextId::GlobalSec,
            VecSection::Export => ContextId::ExportSec,
            VecSection::Element => ContextId::ElemSec,
            VecSection::Code => ContextId::CodeSec,
            VecSection::Data => ContextId::DataSec,
        }
    }
}

impl TryFrom<SectionId> for VecSection {
    type Error = SectionId;

    fn try_from(id: SectionId) -> Result<Self, Self::Error> {
        match id {
            SectionId::Type => Ok(VecSection::Type),
            SectionId::Import => Ok(VecSection::Import),
            SectionId::Function => Ok(VecSection::Function),
            SectionId::Table => Ok(VecSection::Table),
            SectionId::Memory => Ok(VecSection::Memory),
            SectionId::Global => Ok(VecSection::Global),
            SectionId::Export => Ok(VecSection::Export),
            SectionId::Element => Ok(VecSection::Element),
            SectionId::Code => Ok(VecSection::Code),
            SectionId::Data => Ok(VecSection::Data),
            SectionId::Custom | SectionId::Start | SectionId::DataCount => Err(id),
        }
    }
}

#[derive(Debug)]
struct OpenSection {
    kind: VecSection,
    // Offset of the payload.
    offset: usize,
    size: usize,
    // Quota not yet consumed by items.
    remaining: usize,
    items: LazyVec,
}

/// Tracks where the decoder is within the module's sections.
#[derive(Debug, Default)]
pub(crate) struct SectionState {
    open: Option<OpenSection>,
}

impl SectionState {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Decodes the next item of the module, or returns `None` if the input
    /// ended cleanly at a section boundary.
    pub(crate) fn step<C: Cursor, A: Allocator>(
        &mut self,
        parser: &mut Parser<C>,
        context: &mut ContextStack,
        namespaces: &mut Namespaces,
        options: &DecodeOptions,
        alloc: &A,
    ) -> Result<Option<SectionItem<A>>, Error<C::Error>> {
        loop {
            if let Some(open) = self.open.as_mut() {
                let pushed = context.push(open.kind.context(), open.offset);
                let mut view = parser.bounded(open.remaining);
                let kind = open.kind;
                let item = open.items.next_item(view.cursor_mut(), |cursor| {
                    let mut parser = Parser::new(cursor);
                    read_item(&mut parser, kind, context, namespaces, options, alloc)
                });
                if let Some(item) = item {
                    let item = item?;
                    open.remaining -= view.cursor().consumed();
                    if pushed {
                        context.pop();
                    }
                    return Ok(Some(item));
                }

                if open.remaining != 0 {
                    return Err(Error::SizeMismatch {
                        expected: open.size,
                        actual: open.size - open.remaining,
                    });
                }
                if pushed {
                    context.pop();
                }
                trace!("end of {:?} section at {:#x}", open.kind, parser.offset());
                self.open = None;
            }

            let Some((id, size)) = read_header(parser, context)? else {
                return Ok(None);
            };
            let offset = parser.offset();
            trace!("{id:?} section: {size:#x} bytes at {offset:#x}");

            let kind = match VecSection::try_from(id) {
                Ok(kind) => kind,
                Err(id) => {
                    let item = read_single_item(parser, id, size, context, options, alloc)?;
                    trace!("end of {id:?} section at {:#x}", parser.offset());
                    return Ok(Some(item));
                }
            };

            let mut view = parser.bounded(size);
            let items = view.with_context(context, kind.context(), |view, _| {
                LazyVec::read(view.cursor_mut())
            })?;
            self.open = Some(OpenSection {
                kind,
                offset,
                size,
                remaining: size - view.cursor().consumed(),
                items,
            });
        }
    }
}

// Reads a section ID and size, or returns `None` at the end of input.
fn read_header<C: Cursor>(
    parser: &mut Parser<C>,
    context: &mut ContextStack,
) -> Result<Option<(SectionId, usize)>, Error<C::Error>> {
    parser.with_context(context, ContextId::SectionId, |parser, context| {
        let Some(byte) = parser.read_byte_or_end_raw()? else {
            return Ok(None);
        };
        let id = SectionId::try_from(byte).map_err(|_| Error::UnknownSectionId(byte))?;
        let size: u32 = parser.read_copy(context)?;
        Ok(Some((id, size as usize)))
    })
}

fn read_single_item<C: Cursor, A: Allocator>(
    parser: &mut Parser<C>,
    id: SectionId,
    size: usize,
    context: &mut ContextStack,
    options: &DecodeOptions,
    alloc: &A,
) -> Result<SectionItem<A>, Error<C::Error>> {
    let mut view = parser.bounded(size);
    let item = match id {
        SectionId::Custom => view.with_context(context, ContextId::CustomSec, |view, context| {
            let name: Name<A> = view.read(context, alloc)?;
            let len = checked_len(size, view.cursor().consumed())?;
            let payload = if (options.retain_custom_payload)(name.as_str()) {
                Some(view.read_bytes(context, len, alloc)?)
            } else {
                view.skip_bytes(context, len)?;
                None
            };
            Ok(SectionItem::Custom(CustomSection { name, payload }))
        })?,
        SectionId::Start => view.with_context(context, ContextId::StartSec, |view, context| {
            Ok(SectionItem::Start(view.read_copy(context)?))
        })?,
        _ => view.with_context(context, ContextId::DataCountSec, |view, context| {
            Ok(SectionItem::DataCount(view.read_copy(context)?))
        })?,
    };
    check_consumed(&view, size)?;
    Ok(item)
}

fn check_consumed<C: Cursor>(
    view: &Parser<Bounded<'_, C>>,
    size: usize,
) -> Result<(), Error<C::Error>> {
    let consumed = view.cursor().consumed();
    if consumed == size {
        Ok(())
    } else {
        Err(Error::SizeMismatch {
            expected: size,
            actual: consumed,
        })
    }
}

fn read_item<C: Cursor, A: Allocator>(
    parser: &mut Parser<C>,
    kind: VecSection,
    context: &mut ContextStack,
    namespaces: &mut Namespaces,
    options: &DecodeOptions,
    alloc: &A,
) -> Result<SectionItem<A>, Error<C::Error>> {
    Ok(match kind {
        VecSection::Type => SectionItem::Type(namespaces.indexed(parser.read(context, alloc)?)),
        VecSection::Import => {
            let entry: ImportEntry<A> = parser.read(context, alloc)?;
            SectionItem::Import(entry.register(namespaces))
        }
        VecSection::Function => SectionItem::Func(namespaces.indexed(parser.read_copy(context)?)),
        VecSection::Table => SectionItem::Table(namespaces.indexed(parser.read_copy(context)?)),
        VecSection::Memory => SectionItem::Mem(namespaces.indexed(parser.read_copy(context)?)),
        VecSection::Global => {
            SectionItem::Global(namespaces.indexed(parser.read(context, alloc)?))
        }
        VecSection::Export => SectionItem::Export(parser.read(context, alloc)?),
        VecSection::Element => SectionItem::Elem(namespaces.indexed(parser.read(context, alloc)?)),
        VecSection::Code => SectionItem::Code(read_code(
            parser,
            context,
            alloc,
            options.max_locals_per_function,
        )?),
        VecSection::Data => SectionItem::Data(namespaces.indexed(parser.read(context, alloc)?)),
    })
}

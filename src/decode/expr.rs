// Copyright (c) 2025 Joshua Seaton
//
// Use of this source code is governed by a MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT

//! Logic for capturing constant expressions as their raw encoding.
//!
//! A constant expression is not interpreted: its opcodes and immediates are
//! copied byte for byte up to and including the terminating `end`. Only the
//! instructions that may appear in a constant expression have their
//! immediates recognized; any other opcode is copied as if it had none.

use num_enum::TryFromPrimitive;

use crate::Allocator;
use crate::core_compat::vec::Vec;
use crate::cursor::Cursor;
use crate::types::ConstExpr;

use super::{ContextId, ContextStack, Error, Parser};

#[derive(Clone, Copy, Debug, Eq, PartialEq, TryFromPrimitive)]
#[repr(u8)]
enum ConstOpcode {
    End = 0x0b,
    GlobalGet = 0x23,
    I32Const = 0x41,
    I64Const = 0x42,
    F32Const = 0x43,
    F64Const = 0x44,
    RefNull = 0xd0,
    RefFunc = 0xd2,
}

pub(super) fn read_const_expr<C: Cursor, A: Allocator>(
    parser: &mut Parser<C>,
    context: &mut ContextStack,
    alloc: &A,
) -> Result<ConstExpr<A>, Error<C::Error>> {
    let mut bytes = Vec::new_in(alloc.clone());
    loop {
        let byte = parser.read_byte_raw()?;
        bytes.push(byte);
        let Ok(opcode) = ConstOpcode::try_from(byte) else {
            continue;
        };
        if opcode == ConstOpcode::End {
            return Ok(ConstExpr::new(bytes.into_boxed_slice()));
        }
        parser.with_context(context, ContextId::Opcode, |parser, _| {
            copy_immediate(parser, opcode, &mut bytes)
        })?;
    }
}

fn copy_immediate<C: Cursor, A: Allocator>(
    parser: &mut Parser<C>,
    opcode: ConstOpcode,
    bytes: &mut Vec<u8, A>,
) -> Result<(), Error<C::Error>> {
    match opcode {
        ConstOpcode::End => {}
        ConstOpcode::I32Const => {
            let raw = parser.read_raw_leb128::<i32>()?;
            bytes.extend_from_slice(raw.as_bytes());
        }
        ConstOpcode::I64Const => {
            let raw = parser.read_raw_leb128::<i64>()?;
            bytes.extend_from_slice(raw.as_bytes());
        }
        ConstOpcode::GlobalGet | ConstOpcode::RefFunc => {
            let raw = parser.read_raw_leb128::<u32>()?;
            bytes.extend_from_slice(raw.as_bytes());
        }
        ConstOpcode::F32Const => {
            let mut buf = [0u8; 4];
            parser.read_exact_raw(&mut buf)?;
            bytes.extend_from_slice(&buf);
        }
        ConstOpcode::F64Const => {
            let mut buf = [0u8; 8];
            parser.read_exact_raw(&mut buf)?;
            bytes.extend_from_slice(&buf);
        }
        // The heap type is kept as is.
        ConstOpcode::RefNull => bytes.push(parser.read_byte_raw()?),
    }
    Ok(())
}

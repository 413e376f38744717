/*
 * Copyright (c) 2023 xvanc and contributors
 * SPDX-License-Identifier: BSD-3-Clause
 */

//! SYMF symbol maps.
//!
//! A symbol map is a flat little-endian file made of three parts, laid out back to back
//! with no padding:
//!
//! | offset       | contents                                       |
//! |--------------|------------------------------------------------|
//! | `0`          | [`SymbolMapHeader`] (16 bytes)                 |
//! | `16`         | `symbol_count` [`RawSymbol`]s (17 bytes each)  |
//! | `16 + 17*N`  | `strings_size` bytes of NUL-terminated names   |
//!
//! Records appear in the order the symbols were listed, and their names appear in the
//! string table in that same order. Nothing in the format sorts them.
//!
//! The reader ([`SymbolMap`]) is `no_std` and zero-copy. The writer lives behind the
//! `generate` feature.

#![no_std]

#[cfg(any(feature = "std", test))]
extern crate std;

#[cfg(feature = "generate")]
mod generate;
#[cfg(feature = "generate")]
pub use generate::*;

mod map;
pub use map::*;

use bytemuck::{Pod, Zeroable};
use core::{fmt, mem::size_of};

/// `b"SYMF"` read as a little-endian `u32`.
pub const MAGIC: u32 = 0x464d_5953;

pub const HEADER_SIZE: usize = size_of::<SymbolMapHeader>();
pub const SYMBOL_SIZE: usize = size_of::<RawSymbol>();

const _: () = assert!(HEADER_SIZE == 16);
const _: () = assert!(SYMBOL_SIZE == 17);

/// The kind of a code symbol, as the single letter `nm` prints for it.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum SymbolKind {
    /// `T`: a global symbol in the text section
    Global,
    /// `t`: a local symbol in the text section
    Local,
}

impl SymbolKind {
    pub const fn from_byte(byte: u8) -> Option<SymbolKind> {
        match byte {
            b'T' => Some(SymbolKind::Global),
            b't' => Some(SymbolKind::Local),
            _ => None,
        }
    }

    pub const fn as_byte(self) -> u8 {
        match self {
            SymbolKind::Global => b'T',
            SymbolKind::Local => b't',
        }
    }
}

impl fmt::Display for SymbolKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_byte() as char)
    }
}

#[repr(C)]
#[derive(Clone, Copy, Debug, Eq, PartialEq, Pod, Zeroable)]
pub struct SymbolMapHeader {
    magic: u32,
    symbol_count: u32,
    strings_size: u64,
}

impl SymbolMapHeader {
    pub fn new(symbol_count: u32, strings_size: u64) -> SymbolMapHeader {
        SymbolMapHeader {
            magic: MAGIC.to_le(),
            symbol_count: symbol_count.to_le(),
            strings_size: strings_size.to_le(),
        }
    }

    pub fn magic(&self) -> u32 {
        u32::from_le(self.magic)
    }

    pub fn symbol_count(&self) -> u32 {
        u32::from_le(self.symbol_count)
    }

    pub fn strings_size(&self) -> u64 {
        u64::from_le(self.strings_size)
    }

    /// Size of the whole file this header describes, or `None` if it does not fit in a
    /// `usize`.
    pub fn total_size(&self) -> Option<usize> {
        let symbols = (self.symbol_count() as usize).checked_mul(SYMBOL_SIZE)?;
        let strings = usize::try_from(self.strings_size()).ok()?;
        HEADER_SIZE.checked_add(symbols)?.checked_add(strings)
    }
}

/// A symbol table entry as stored on disk.
#[repr(C, packed)]
#[derive(Clone, Copy, Debug, Pod, Zeroable)]
pub struct RawSymbol {
    addr: u64,
    kind: u8,
    name: u64,
}

impl RawSymbol {
    pub fn new(addr: u64, kind: SymbolKind, name_offset: u64) -> RawSymbol {
        RawSymbol {
            addr: addr.to_le(),
            kind: kind.as_byte(),
            name: name_offset.to_le(),
        }
    }

    pub fn addr(&self) -> u64 {
        u64::from_le(self.addr)
    }

    /// The raw kind letter. Use [`SymbolKind::from_byte`] to interpret it.
    pub fn kind_byte(&self) -> u8 {
        self.kind
    }

    /// Offset of the first byte of this symbol's name in the string table.
    pub fn name_offset(&self) -> u64 {
        u64::from_le(self.name)
    }
}

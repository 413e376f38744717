/*
 * Copyright (c) 2023 xvanc and contributors
 * SPDX-License-Identifier: BSD-3-Clause
 */

use crate::{RawSymbol, SymbolKind, SymbolMapHeader, HEADER_SIZE, MAGIC, SYMBOL_SIZE};
use core::{fmt, str};

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum FormatError {
    /// The first four bytes are not `SYMF`
    BadMagic(u32),
    /// The buffer ends before the named section does
    Truncated(&'static str),
    /// The buffer continues past the end of the string table
    TrailingData,
    /// A record has a kind other than `T` or `t`
    InvalidKind(u8),
    /// A name offset does not point at the start of a name
    BadNameOffset(u64),
    /// A name runs off the end of the string table
    UnterminatedName(u64),
}

impl fmt::Display for FormatError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FormatError::BadMagic(magic) => {
                write!(f, "not a symbol map (magic {magic:#010x})")
            }
            FormatError::Truncated(what) => write!(f, "truncated {what}"),
            FormatError::TrailingData => write!(f, "trailing data after string table"),
            FormatError::InvalidKind(kind) => write!(f, "invalid symbol kind {kind:#04x}"),
            FormatError::BadNameOffset(offset) => write!(f, "invalid name offset {offset}"),
            FormatError::UnterminatedName(offset) => {
                write!(f, "unterminated name at offset {offset}")
            }
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for FormatError {}

/// A borrowed view of a SYMF file.
///
/// Every record is validated when the map is created, so the accessors cannot fail.
#[derive(Clone, Copy, Debug)]
pub struct SymbolMap<'sym> {
    header: SymbolMapHeader,
    symbols: &'sym [RawSymbol],
    strings: &'sym [u8],
}

impl<'sym> SymbolMap<'sym> {
    pub fn new(bytes: &'sym [u8]) -> Result<SymbolMap<'sym>, FormatError> {
        // The magic is checked before anything else so that a foreign file is always
        // reported as such, no matter how short it is.
        let magic = bytes.get(..4).ok_or(FormatError::Truncated("header"))?;
        let magic = u32::from_le_bytes([magic[0], magic[1], magic[2], magic[3]]);
        if magic != MAGIC {
            return Err(FormatError::BadMagic(magic));
        }

        let header_bytes = bytes
            .get(..HEADER_SIZE)
            .ok_or(FormatError::Truncated("header"))?;
        let header: SymbolMapHeader = bytemuck::pod_read_unaligned(header_bytes);

        let tab_size = (header.symbol_count() as usize)
            .checked_mul(SYMBOL_SIZE)
            .ok_or(FormatError::Truncated("symbol table"))?;
        let rest = &bytes[HEADER_SIZE..];
        if rest.len() < tab_size {
            return Err(FormatError::Truncated("symbol table"));
        }
        let (table, rest) = rest.split_at(tab_size);

        let str_size = usize::try_from(header.strings_size())
            .map_err(|_| FormatError::Truncated("string table"))?;
        if rest.len() < str_size {
            return Err(FormatError::Truncated("string table"));
        }
        if rest.len() > str_size {
            return Err(FormatError::TrailingData);
        }

        let map = SymbolMap {
            header,
            symbols: bytemuck::cast_slice(table),
            strings: rest,
        };

        for raw in map.symbols {
            Symbol::try_from_raw(map.strings, raw)?;
        }

        Ok(map)
    }

    pub fn header(&self) -> &SymbolMapHeader {
        &self.header
    }

    pub fn len(&self) -> usize {
        self.symbols.len()
    }

    pub fn is_empty(&self) -> bool {
        self.symbols.is_empty()
    }

    /// The raw string table, names and terminators included.
    pub fn strings(&self) -> &'sym [u8] {
        self.strings
    }

    pub fn get(&self, index: usize) -> Option<Symbol<'sym>> {
        self.symbols
            .get(index)
            .map(|raw| Symbol::from_raw(self.strings, raw))
    }

    /// Iterates over the symbols in file order.
    pub fn symbols(&self) -> impl Iterator<Item = Symbol<'sym>> + 'sym {
        let (symbols, strings) = (self.symbols, self.strings);
        symbols
            .iter()
            .map(move |raw| Symbol::from_raw(strings, raw))
    }

    /// Finds the symbol with the highest address at or below `addr`.
    ///
    /// Records are stored in listing order, not address order, so this is a linear scan.
    /// When several symbols share an address the first one in the file wins.
    pub fn lookup(&self, addr: u64) -> Option<Symbol<'sym>> {
        let mut best: Option<Symbol<'sym>> = None;
        for symbol in self.symbols() {
            if symbol.addr <= addr && best.as_ref().map_or(true, |b| symbol.addr > b.addr) {
                best = Some(symbol);
            }
        }
        best
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Symbol<'sym> {
    pub addr: u64,
    pub kind: SymbolKind,
    pub name: &'sym [u8],
    pub name_offset: u64,
}

impl<'sym> Symbol<'sym> {
    fn try_from_raw(strings: &'sym [u8], raw: &RawSymbol) -> Result<Symbol<'sym>, FormatError> {
        let kind = raw.kind_byte();
        Ok(Symbol {
            addr: raw.addr(),
            kind: SymbolKind::from_byte(kind).ok_or(FormatError::InvalidKind(kind))?,
            name: name_at(strings, raw.name_offset())?,
            name_offset: raw.name_offset(),
        })
    }

    // `SymbolMap::new` ran `try_from_raw` on every record, so the fallbacks are unreachable.
    fn from_raw(strings: &'sym [u8], raw: &RawSymbol) -> Symbol<'sym> {
        Symbol::try_from_raw(strings, raw).unwrap_or(Symbol {
            addr: raw.addr(),
            kind: SymbolKind::Global,
            name: &[],
            name_offset: raw.name_offset(),
        })
    }

    pub fn name_str(&self) -> Option<&'sym str> {
        str::from_utf8(self.name).ok()
    }
}

fn name_at(strings: &[u8], offset: u64) -> Result<&[u8], FormatError> {
    let start = usize::try_from(offset)
        .ok()
        .filter(|&start| start < strings.len())
        .ok_or(FormatError::BadNameOffset(offset))?;

    // Must point at the first byte of a non-empty name.
    if (start > 0 && strings[start - 1] != 0) || strings[start] == 0 {
        return Err(FormatError::BadNameOffset(offset));
    }

    let len = strings[start..]
        .iter()
        .position(|&b| b == 0)
        .ok_or(FormatError::UnterminatedName(offset))?;

    Ok(&strings[start..][..len])
}

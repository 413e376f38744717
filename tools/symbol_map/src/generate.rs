/*
 * Copyright (c) 2023 xvanc and contributors
 * SPDX-License-Identifier: BSD-3-Clause
 */

use crate::{RawSymbol, SymbolKind, SymbolMapHeader, HEADER_SIZE, SYMBOL_SIZE};
use core::{fmt, str};
use std::{
    ffi::OsStr,
    format,
    io::{self, Write},
    path::Path,
    process::{Command, ExitStatus},
    string::String,
    vec::Vec,
};

#[derive(Debug)]
pub enum Error {
    /// The symbol-listing command could not be started
    Spawn { command: String, error: io::Error },
    /// The symbol-listing command exited unsuccessfully
    CommandFailed {
        command: String,
        status: ExitStatus,
        stderr: String,
    },
    /// An address field is not a hexadecimal `u64`
    MalformedAddress(String),
    /// A symbol has an empty name
    EmptyName,
    /// A symbol name contains a NUL byte
    NulInName,
    /// The generated symbol map would have too many symbols
    MapTooBig,

    Io(io::Error),
}

impl From<io::Error> for Error {
    fn from(error: io::Error) -> Error {
        Error::Io(error)
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Spawn { command, error } => write!(f, "failed to run `{command}`: {error}"),
            Error::CommandFailed {
                command,
                status,
                stderr,
            } => {
                write!(f, "`{command}` failed ({status})")?;
                match stderr.trim() {
                    "" => Ok(()),
                    stderr => write!(f, ": {stderr}"),
                }
            }
            Error::MalformedAddress(addr) => write!(f, "invalid address `{addr}`"),
            Error::EmptyName => write!(f, "empty symbol name"),
            Error::NulInName => write!(f, "symbol name contains a NUL byte"),
            Error::MapTooBig => write!(f, "generated symbol map would be too large"),
            Error::Io(error) => write!(f, "io error: {error}"),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Spawn { error, .. } | Error::Io(error) => Some(error),
            _ => None,
        }
    }
}

/// One code symbol from a listing.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct SymbolRecord {
    pub addr: u64,
    pub kind: SymbolKind,
    pub name: Vec<u8>,
}

/// Parses one line of `nm` output.
///
/// Lines are `<hex address> <kind> <name> [anything else]`. Lines with fewer than three
/// fields, and lines for anything but `T`/`t` symbols, are skipped with `Ok(None)`. An
/// address that is not valid hex is an error, since it means the listing is not what
/// we expect.
pub fn parse_line(line: &[u8]) -> Result<Option<SymbolRecord>, Error> {
    let mut fields = line
        .split(u8::is_ascii_whitespace)
        .filter(|field| !field.is_empty());

    let (Some(addr), Some(kind), Some(name)) = (fields.next(), fields.next(), fields.next())
    else {
        return Ok(None);
    };
    let kind = match kind {
        &[kind] => match SymbolKind::from_byte(kind) {
            Some(kind) => kind,
            None => return Ok(None),
        },
        _ => return Ok(None),
    };

    Ok(Some(SymbolRecord {
        addr: parse_address(addr)?,
        kind,
        name: name.to_vec(),
    }))
}

fn parse_address(field: &[u8]) -> Result<u64, Error> {
    let malformed = || Error::MalformedAddress(String::from_utf8_lossy(field).into_owned());

    // `from_str_radix` would also take a leading `+`.
    if !field.iter().all(u8::is_ascii_hexdigit) {
        return Err(malformed());
    }
    let text = str::from_utf8(field).map_err(|_| malformed())?;
    u64::from_str_radix(text, 16).map_err(|_| malformed())
}

/// Parses a whole listing, keeping the code symbols in the order they appear.
pub fn parse_listing(listing: &[u8]) -> Result<Vec<SymbolRecord>, Error> {
    let mut records = Vec::new();
    let mut skipped = 0usize;

    for line in listing.split(|&b| b == b'\n') {
        match parse_line(line)? {
            Some(record) => records.push(record),
            None => {
                if !line.trim_ascii().is_empty() {
                    log::trace!("skipping `{}`", String::from_utf8_lossy(line).trim());
                    skipped += 1;
                }
            }
        }
    }

    log::debug!("kept {} symbols, skipped {skipped} lines", records.len());

    Ok(records)
}

/// An encoder for a symbol map.
///
/// Symbols are recorded in the order they are pushed, and each name is appended to the
/// string table as it is pushed. Record order, listing order, and string table order
/// are therefore always the same, and name offsets strictly increase.
#[derive(Clone, Debug, Default)]
pub struct SymbolTable {
    symbols: Vec<RawSymbol>,
    strings: Vec<u8>,
}

impl SymbolTable {
    pub fn new() -> SymbolTable {
        SymbolTable::default()
    }

    pub fn from_records<I>(records: I) -> Result<SymbolTable, Error>
    where
        I: IntoIterator<Item = SymbolRecord>,
    {
        let mut table = SymbolTable::new();
        for record in records {
            table.push(record.addr, record.kind, &record.name)?;
        }
        Ok(table)
    }

    pub fn push(&mut self, addr: u64, kind: SymbolKind, name: &[u8]) -> Result<(), Error> {
        if name.is_empty() {
            return Err(Error::EmptyName);
        }
        if name.contains(&0) {
            return Err(Error::NulInName);
        }
        if self.symbols.len() >= u32::MAX as usize {
            return Err(Error::MapTooBig);
        }

        let name_offset = self.strings.len() as u64;
        self.strings.extend_from_slice(name);
        self.strings.push(0);
        self.symbols.push(RawSymbol::new(addr, kind, name_offset));

        Ok(())
    }

    pub fn len(&self) -> usize {
        self.symbols.len()
    }

    pub fn is_empty(&self) -> bool {
        self.symbols.is_empty()
    }

    pub fn symbols(&self) -> &[RawSymbol] {
        &self.symbols
    }

    pub fn strings(&self) -> &[u8] {
        &self.strings
    }

    pub fn header(&self) -> SymbolMapHeader {
        SymbolMapHeader::new(self.symbols.len() as u32, self.strings.len() as u64)
    }

    pub fn encoded_len(&self) -> usize {
        HEADER_SIZE + self.symbols.len() * SYMBOL_SIZE + self.strings.len()
    }

    pub fn write_to<W: Write>(&self, mut writer: W) -> io::Result<()> {
        writer.write_all(bytemuck::bytes_of(&self.header()))?;
        writer.write_all(bytemuck::cast_slice(&self.symbols))?;
        writer.write_all(&self.strings)?;
        Ok(())
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(self.encoded_len());
        buf.extend_from_slice(bytemuck::bytes_of(&self.header()));
        buf.extend_from_slice(bytemuck::cast_slice(&self.symbols));
        buf.extend_from_slice(&self.strings);
        buf
    }
}

#[derive(Clone, Copy, Debug, Default)]
pub struct GenerateOptions {
    /// Demangle Rust symbol names before storing them
    pub demangle: bool,
}

/// Runs the symbol-listing command on `object` and returns its standard output.
#[inline(always)]
pub fn run_nm<S: AsRef<OsStr>, P: AsRef<Path>>(nm: S, object: P) -> Result<Vec<u8>, Error> {
    run_nm_(nm.as_ref(), object.as_ref())
}

fn run_nm_(nm: &OsStr, object: &Path) -> Result<Vec<u8>, Error> {
    let command = format!("{} {}", nm.to_string_lossy(), object.display());
    log::debug!("running `{command}`");

    let output = match Command::new(nm).arg(object).output() {
        Ok(output) => output,
        Err(error) => return Err(Error::Spawn { command, error }),
    };

    if !output.status.success() {
        return Err(Error::CommandFailed {
            command,
            status: output.status,
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        });
    }

    Ok(output.stdout)
}

/// Lists the code symbols of `object` with `nm` and builds a symbol map from them.
#[inline(always)]
pub fn generate<S: AsRef<OsStr>, P: AsRef<Path>>(
    nm: S,
    object: P,
    options: GenerateOptions,
) -> Result<SymbolTable, Error> {
    generate_(nm.as_ref(), object.as_ref(), options)
}

fn generate_(nm: &OsStr, object: &Path, options: GenerateOptions) -> Result<SymbolTable, Error> {
    let listing = run_nm_(nm, object)?;
    let mut records = parse_listing(&listing)?;

    if options.demangle {
        for record in &mut records {
            demangle_name(&mut record.name);
        }
    }

    SymbolTable::from_records(records)
}

fn demangle_name(name: &mut Vec<u8>) {
    if let Ok(mangled) = str::from_utf8(name) {
        if let Ok(demangled) = rustc_demangle::try_demangle(mangled) {
            *name = format!("{demangled:#}").into_bytes();
        }
    }
}

/*
 * Copyright (c) 2023 xvanc and contributors
 * SPDX-License-Identifier: BSD-3-Clause
 */

use symbol_map::{
    parse_listing, SymbolKind, SymbolMap, SymbolRecord, SymbolTable, HEADER_SIZE, SYMBOL_SIZE,
};

fn record(addr: u64, kind: SymbolKind, name: &[u8]) -> SymbolRecord {
    SymbolRecord {
        addr,
        kind,
        name: name.to_vec(),
    }
}

fn decode(bytes: &[u8]) -> Vec<SymbolRecord> {
    SymbolMap::new(bytes)
        .unwrap()
        .symbols()
        .map(|symbol| record(symbol.addr, symbol.kind, symbol.name))
        .collect()
}

#[test]
fn records_survive_encoding_in_order() {
    let records = vec![
        record(0xffff_ffff_8000_0000, SymbolKind::Global, b"_start"),
        record(0x10, SymbolKind::Local, b"z"),
        record(0x10, SymbolKind::Local, b"z"),
        record(0, SymbolKind::Global, b"a very long name that goes on"),
        record(u64::MAX, SymbolKind::Local, b"\xe2\x82\xac\xff"),
        record(0x8, SymbolKind::Global, b"<impl core::fmt::Debug for T>::fmt"),
    ];

    let table = SymbolTable::from_records(records.clone()).unwrap();
    assert_eq!(decode(&table.to_bytes()), records);
}

#[test]
fn size_law() {
    let names: [&[u8]; 4] = [b"main", b"x", b"helper_with_a_longer_name", b"y"];
    let mut table = SymbolTable::new();
    for (i, name) in names.iter().enumerate() {
        let kind = if i % 2 == 0 {
            SymbolKind::Global
        } else {
            SymbolKind::Local
        };
        table.push(i as u64, kind, name).unwrap();
    }

    let strings_size: usize = names.iter().map(|name| name.len() + 1).sum();
    let bytes = table.to_bytes();

    assert_eq!(table.strings().len(), strings_size);
    assert_eq!(
        bytes.len(),
        HEADER_SIZE + SYMBOL_SIZE * names.len() + strings_size
    );

    let map = SymbolMap::new(&bytes).unwrap();
    assert_eq!(map.header().symbol_count() as usize, names.len());
    assert_eq!(map.header().strings_size() as usize, strings_size);
    assert_eq!(map.header().total_size(), Some(bytes.len()));
}

#[test]
fn decoded_offsets_strictly_increase() {
    let listing = b"\
0000000000400000 T _start
0000000000400010 t frame_dummy
0000000000601000 D data_not_kept
0000000000400020 T main
0000000000400030 T main
";
    let table = SymbolTable::from_records(parse_listing(listing).unwrap()).unwrap();
    let bytes = table.to_bytes();
    let map = SymbolMap::new(&bytes).unwrap();

    let offsets: Vec<_> = map.symbols().map(|symbol| symbol.name_offset).collect();
    assert_eq!(offsets, [0, 7, 19, 24]);
    assert!(offsets.windows(2).all(|w| w[0] < w[1]));
}

#[test]
fn listing_to_lookup() {
    let listing = b"\
0000000000001000 T main
0000000000002000 t helper
0000000000003000 U external_ref
";
    let table = SymbolTable::from_records(parse_listing(listing).unwrap()).unwrap();
    let bytes = table.to_bytes();
    let map = SymbolMap::new(&bytes).unwrap();

    assert_eq!(map.strings(), b"main\0helper\0");
    assert_eq!(map.lookup(0x1fff).unwrap().name_str(), Some("main"));
    assert_eq!(map.lookup(0x2004).unwrap().name_str(), Some("helper"));
}

#[test]
fn magic_mismatch_is_always_rejected() {
    let table = SymbolTable::from_records(vec![record(1, SymbolKind::Global, b"f")]).unwrap();
    let good = table.to_bytes();

    for magic in [*b"symf", *b"FMYS", *b"\x7fELF", [0; 4]] {
        let mut bytes = good.clone();
        bytes[..4].copy_from_slice(&magic);
        assert!(matches!(
            SymbolMap::new(&bytes),
            Err(symbol_map::FormatError::BadMagic(_))
        ));
    }
}

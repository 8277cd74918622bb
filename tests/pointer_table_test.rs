// Load/store behaviour of pointer tables over synthetic ROM images
use romtables::codec::{
    BackgroundCodec, BackgroundRecord, GenericCodec, PaintData, RoomCodec, RoomObject,
};
use romtables::{PointerTable, Rom, StorageRegion, TableConfig, TableError};

use test_log::test;

const ROOMS_BANK: usize = 1;
const DATA_START: usize = 0x100;

const R0: [u8; 6] = [0x01, 0x02, 0x83, 0x21, 0x0A, 0xFE];
const R1: [u8; 5] = [0x03, 0x04, 0x45, 0x2C, 0xFE];
const R2: [u8; 8] = [0x05, 0x06, 0xE0, 0x01, 0x02, 0x03, 0x04, 0xFE];

/// rooms_rom lays `records` out back to back from DATA_START, pointers at 0x0000
fn rooms_rom(records: &[&[u8]]) -> Rom {
    let mut rom = Rom::blank(3);
    let bank = rom.bank_mut(ROOMS_BANK).unwrap();
    let mut addr = DATA_START;
    for (i, record) in records.iter().enumerate() {
        bank.write_u16(i * 2, 0x4000 | addr as u16);
        bank.write(addr, record);
        addr += record.len();
    }
    rom
}

fn rooms_config(count: usize) -> TableConfig {
    TableConfig::shared("rooms", count, ROOMS_BANK, 0x0000, ROOMS_BANK)
}

#[test]
fn unchanged_store_is_byte_identical() {
    let mut rom = rooms_rom(&[&R0, &R1, &R2]);
    let before = rom.clone();
    let mut table = PointerTable::load(&rom, rooms_config(3), RoomCodec).unwrap();
    table.store(&mut rom).unwrap();
    assert_eq!(rom, before);
    table.storage().check_disjoint().unwrap();

    let reloaded = PointerTable::load(&rom, rooms_config(3), RoomCodec).unwrap();
    assert_eq!(reloaded.iter().collect::<Vec<_>>(), table.iter().collect::<Vec<_>>());
}

#[test]
fn grown_room_moves_to_free_space() {
    let mut rom = rooms_rom(&[&R0, &R1, &R2]);
    let mut table = PointerTable::load(&rom, rooms_config(3).expanded(), RoomCodec).unwrap();
    table
        .get_mut(1)
        .unwrap()
        .objects
        .push(RoomObject::Tile { position: 0x11, tile: 0x22 });
    table.store(&mut rom).unwrap();

    assert_eq!(table.location(0), Some(StorageRegion::new(ROOMS_BANK, 0x100, 0x106)));
    assert_eq!(table.location(1), Some(StorageRegion::new(ROOMS_BANK, 0x113, 0x11A)));
    assert_eq!(table.location(2), Some(StorageRegion::new(ROOMS_BANK, 0x10B, 0x113)));
    assert_eq!(table.raw_pointer(1), Some(0x4113));
    assert_eq!(rom.bank(ROOMS_BANK).unwrap().read_u16(2), Some(0x4113));
    assert_eq!(&rom.bank(ROOMS_BANK).unwrap()[0x10B..0x113], &R2);
    table.storage().check_disjoint().unwrap();

    let reloaded = PointerTable::load(&rom, rooms_config(3), RoomCodec).unwrap();
    assert_eq!(reloaded.get(1), table.get(1));
    assert_eq!(reloaded.get(1).unwrap().objects.len(), 2);
    assert_eq!(reloaded.get(2), table.get(2));
}

#[test]
fn grown_room_without_space_fails() {
    let mut rom = rooms_rom(&[&R0, &R1, &R2]);
    let before = rom.clone();
    let mut table = PointerTable::load(&rom, rooms_config(3), RoomCodec).unwrap();
    table
        .get_mut(1)
        .unwrap()
        .objects
        .push(RoomObject::Tile { position: 0x11, tile: 0x22 });
    match table.store(&mut rom) {
        Err(TableError::OutOfSpace {
            index,
            bank,
            required,
            available,
            ..
        }) => {
            assert_eq!(index, 1);
            assert_eq!(bank, ROOMS_BANK);
            assert_eq!(required, 7);
            assert_eq!(available, vec![(0x106, 0x10B)]);
        }
        other => panic!("expected out of space, got {:?}", other.err()),
    }
    // entries before the failing one were written in place with identical bytes
    assert_eq!(&rom.bank(ROOMS_BANK).unwrap()[0x100..0x113], &before.bank(ROOMS_BANK).unwrap()[0x100..0x113]);
}

#[test]
fn shrunk_space_is_reused_by_later_entries() {
    let mut rom = rooms_rom(&[&R0, &R1, &R2]);
    let mut table = PointerTable::load(&rom, rooms_config(3), RoomCodec).unwrap();
    table.get_mut(0).unwrap().objects.clear();
    table
        .get_mut(1)
        .unwrap()
        .objects
        .push(RoomObject::Tile { position: 0x11, tile: 0x22 });
    table.store(&mut rom).unwrap();

    assert_eq!(table.location(0), Some(StorageRegion::new(ROOMS_BANK, 0x100, 0x103)));
    assert_eq!(table.location(1), Some(StorageRegion::new(ROOMS_BANK, 0x103, 0x10A)));
    assert_eq!(table.location(2), Some(StorageRegion::new(ROOMS_BANK, 0x10B, 0x113)));

    let reloaded = PointerTable::load(&rom, rooms_config(3), RoomCodec).unwrap();
    assert!(reloaded.get(0).unwrap().objects.is_empty());
    assert_eq!(reloaded.get(1), table.get(1));
    assert_eq!(reloaded.get(2), table.get(2));
}

#[test]
fn second_store_is_stable() {
    let mut rom = rooms_rom(&[&R0, &R1, &R2]);
    let mut table = PointerTable::load(&rom, rooms_config(3).expanded(), RoomCodec).unwrap();
    table.get_mut(1).unwrap().objects.push(RoomObject::Warp {
        kind: 0,
        map: 0x10,
        room: 0xA1,
        x: 0x50,
        y: 0x48,
    });
    table.store(&mut rom).unwrap();
    let after_first = rom.clone();
    let locations: Vec<_> = (0..3).map(|i| table.location(i)).collect();

    table.store(&mut rom).unwrap();
    assert_eq!(rom, after_first);
    assert_eq!((0..3).map(|i| table.location(i)).collect::<Vec<_>>(), locations);
}

#[test]
fn shared_record_is_not_overwritten() {
    // entries 0 and 1 point at the same room
    let mut rom = rooms_rom(&[&R0, &R1]);
    rom.bank_mut(ROOMS_BANK).unwrap().write_u16(2, 0x4100);
    rom.bank_mut(ROOMS_BANK).unwrap().write_u16(4, 0x4106);
    let mut table = PointerTable::load(&rom, rooms_config(3), RoomCodec).unwrap();
    assert_eq!(table.get(0), table.get(1));

    table.store(&mut rom).unwrap();
    assert_eq!(table.regions_of(0), vec![StorageRegion::new(ROOMS_BANK, 0x100, 0x106)]);
    assert!(table.regions_of(1).is_empty());

    // same size, different bytes: there is nowhere to put it without touching entry 0
    if let Some(RoomObject::Strip { tile, .. }) = table.get_mut(1).unwrap().objects.first_mut() {
        *tile = 0x0B;
    }
    let err = table.store(&mut rom).unwrap_err();
    assert!(matches!(err, TableError::OutOfSpace { index: 1, .. }));
    assert_eq!(&rom.bank(ROOMS_BANK).unwrap()[0x100..0x106], &R0);
}

#[test]
fn shared_record_splits_when_space_exists() {
    let mut rom = rooms_rom(&[&R0, &R1]);
    rom.bank_mut(ROOMS_BANK).unwrap().write_u16(2, 0x4100);
    rom.bank_mut(ROOMS_BANK).unwrap().write_u16(4, 0x4106);
    let mut table = PointerTable::load(&rom, rooms_config(3).expanded(), RoomCodec).unwrap();
    table.get_mut(1).unwrap().header = [0x77, 0x78];
    table.store(&mut rom).unwrap();

    assert_eq!(table.location(0), Some(StorageRegion::new(ROOMS_BANK, 0x100, 0x106)));
    assert_eq!(table.location(1), Some(StorageRegion::new(ROOMS_BANK, 0x10B, 0x111)));
    table.storage().check_disjoint().unwrap();

    let reloaded = PointerTable::load(&rom, rooms_config(3), RoomCodec).unwrap();
    assert_eq!(reloaded.get(0).unwrap().header, [0x01, 0x02]);
    assert_eq!(reloaded.get(1).unwrap().header, [0x77, 0x78]);
    assert_eq!(reloaded.get(2), table.get(2));
}

#[test]
fn per_entry_banks_are_kept_and_rewritten() {
    let mut rom = Rom::blank(4);
    {
        let index = rom.bank_mut(1).unwrap();
        index.write_u16(0, 0x4000);
        index.write_u16(2, 0x4004);
        index.write_u16(4, 0x4000);
        index.write(0x10, &[2, 2, 3]);
    }
    rom.bank_mut(2).unwrap().write(0, &[b'A', b'B', 0xFE, 0xFF, b'C', 0xFE, 0xFF]);
    rom.bank_mut(3).unwrap().write(0, &[b'D', 0xFE, 0xFF]);
    let config = TableConfig::per_entry("texts", 3, 1, 0x00, 1, 0x10);
    let mut table = PointerTable::load(&rom, config.clone(), GenericCodec::default()).unwrap();

    *table.get_mut(0).unwrap() = vec![b'A', 0xFE, 0xFF];
    *table.get_mut(1).unwrap() = vec![b'C', b'C', 0xFE, 0xFF];
    table.store(&mut rom).unwrap();

    assert_eq!(table.location(0), Some(StorageRegion::new(2, 0, 3)));
    assert_eq!(table.location(1), Some(StorageRegion::new(2, 3, 7)));
    assert_eq!(table.location(2), Some(StorageRegion::new(3, 0, 3)));
    assert_eq!(&rom.bank(1).unwrap()[0x10..0x13], &[2, 2, 3]);

    let reloaded = PointerTable::load(&rom, config, GenericCodec::default()).unwrap();
    assert_eq!(reloaded.get(0), Some(&vec![b'A', 0xFE, 0xFF]));
    assert_eq!(reloaded.get(1), Some(&vec![b'C', b'C', 0xFE, 0xFF]));
    assert_eq!(reloaded.get(2), Some(&vec![b'D', 0xFE, 0xFF]));
}

fn backgrounds_rom() -> Rom {
    let mut rom = Rom::blank(9);
    // entry 1 starts at the second command of entry 0, entry 2 is a sentinel
    let program = [
        0x98, 0x00, 0x42, 0x11, // 3 cells of 0x11
        0x98, 0x20, 0x01, 0xA0, 0xA1, // 2 literal cells
        0x00,
    ];
    rom.bank_mut(8).unwrap().write(0x200, &program);
    let pointers = rom.bank_mut(2).unwrap();
    pointers.write_u16(0x10, 0x4200);
    pointers.write_u16(0x12, 0x4204);
    pointers.write_u16(0x14, 0x5651);
    rom
}

fn backgrounds_config() -> TableConfig {
    TableConfig::shared("background_tiles", 3, 2, 0x10, 8).expanded()
}

#[test]
fn tail_sharing_backgrounds_round_trip() {
    let mut rom = backgrounds_rom();
    let before = rom.clone();
    let mut table = PointerTable::load(&rom, backgrounds_config(), BackgroundCodec::new()).unwrap();
    assert_eq!(table.get(2), Some(&BackgroundRecord::Empty));
    assert_eq!(table.location(2), Some(StorageRegion::empty(8, 0x1651)));
    assert_eq!(table.get(0).unwrap().commands().len(), 2);
    assert_eq!(table.get(1).unwrap().commands().len(), 1);

    table.store(&mut rom).unwrap();
    assert_eq!(rom, before);
    table.storage().check_disjoint().unwrap();
    assert_eq!(table.regions_of(0), vec![StorageRegion::new(8, 0x200, 0x20A)]);
    assert!(table.regions_of(1).is_empty());
    assert!(table.regions_of(2).is_empty());
    assert_eq!(table.raw_pointer(2), Some(0x5651));
}

#[test]
fn editing_a_shared_tail_relocates_it() {
    let mut rom = backgrounds_rom();
    let mut table = PointerTable::load(&rom, backgrounds_config(), BackgroundCodec::new()).unwrap();
    if let BackgroundRecord::Commands(commands) = table.get_mut(1).unwrap() {
        commands[0].data = PaintData::Literal(vec![0xB0, 0xB1]);
    }
    table.store(&mut rom).unwrap();

    assert_eq!(table.location(0), Some(StorageRegion::new(8, 0x200, 0x20A)));
    assert_eq!(table.location(1), Some(StorageRegion::new(8, 0x20A, 0x210)));
    table.storage().check_disjoint().unwrap();

    let reloaded = PointerTable::load(&rom, backgrounds_config(), BackgroundCodec::new()).unwrap();
    let canvas0 = reloaded.get(0).unwrap().canvas();
    let canvas1 = reloaded.get(1).unwrap().canvas();
    assert_eq!(canvas0.get(0x9820), Some(0xA0));
    assert_eq!(canvas1.get(0x9820), Some(0xB0));
    assert_eq!(canvas1.get(0x9821), Some(0xB1));
    assert_eq!(reloaded.get(2), Some(&BackgroundRecord::Empty));
}

#[test]
fn sentinel_that_gains_a_program_is_placed() {
    let mut rom = backgrounds_rom();
    let mut table = PointerTable::load(&rom, backgrounds_config(), BackgroundCodec::new()).unwrap();
    let program = table.get(1).unwrap().clone();
    let mut different = program.clone();
    if let BackgroundRecord::Commands(commands) = &mut different {
        commands[0].address = 0x9C00;
    }
    table.replace(2, different.clone());
    table.store(&mut rom).unwrap();

    let location = table.location(2).unwrap();
    assert_eq!(location, StorageRegion::new(8, 0x20A, 0x210));
    assert_eq!(table.raw_pointer(2), Some(0x420A));

    let reloaded = PointerTable::load(&rom, backgrounds_config(), BackgroundCodec::new()).unwrap();
    assert_eq!(reloaded.get(2), Some(&different));
    assert_eq!(reloaded.get(1), Some(&program));
}

fn two_backgrounds_rom(at: usize, first: &[u8], second: &[u8]) -> Rom {
    let mut rom = Rom::blank(9);
    let data = rom.bank_mut(8).unwrap();
    data.write(at, first);
    data.write(at + first.len(), second);
    let pointers = rom.bank_mut(2).unwrap();
    pointers.write_u16(0x10, 0x4000 | at as u16);
    pointers.write_u16(0x12, 0x4000 | (at + first.len()) as u16);
    rom
}

#[test]
fn emptied_background_points_at_a_sentinel() {
    let fill = [0x98, 0x00, 0x40, 0x07, 0x00];
    let literal = [0x98, 0x20, 0x02, 0x01, 0x02, 0x03, 0x00];
    let mut rom = two_backgrounds_rom(0x200, &fill, &literal);
    let config = TableConfig::shared("background_tiles", 2, 2, 0x10, 8);
    let mut table = PointerTable::load(&rom, config.clone(), BackgroundCodec::new()).unwrap();

    table.replace(0, BackgroundRecord::Empty);
    if let BackgroundRecord::Commands(commands) = table.get_mut(1).unwrap() {
        commands[0].data = PaintData::Literal(vec![0x01, 0x02, 0x03, 0x04]);
    }
    table.store(&mut rom).unwrap();

    // entry 1 may take the released bytes, entry 0 must no longer point at them
    assert_eq!(table.location(1), Some(StorageRegion::new(8, 0x200, 0x208)));
    assert_eq!(table.location(0), Some(StorageRegion::empty(8, 0x0000)));
    assert_eq!(table.raw_pointer(0), Some(0x4000));
    assert!(table.regions_of(0).is_empty());
    table.storage().check_disjoint().unwrap();

    let reloaded = PointerTable::load(&rom, config.clone(), BackgroundCodec::new()).unwrap();
    assert_eq!(reloaded.get(0), Some(&BackgroundRecord::Empty));
    assert_eq!(reloaded.get(1), table.get(1));

    let after_first = rom.clone();
    table.store(&mut rom).unwrap();
    assert_eq!(rom, after_first);
}

#[test]
fn relocation_never_starts_at_a_sentinel_offset() {
    // entry 1 ends right at the 0x1651 sentinel offset
    let fill = [0x98, 0x00, 0x40, 0x07, 0x00];
    let literal = [0x98, 0x20, 0x07, 1, 2, 3, 4, 5, 6, 7, 8, 0x00];
    let mut rom = two_backgrounds_rom(0x1640, &fill, &literal);
    let config = TableConfig::shared("background_tiles", 2, 2, 0x10, 8).expanded();
    let mut table = PointerTable::load(&rom, config.clone(), BackgroundCodec::new()).unwrap();
    assert_eq!(table.location(1), Some(StorageRegion::new(8, 0x1645, 0x1651)));

    if let BackgroundRecord::Commands(commands) = table.get_mut(0).unwrap() {
        commands[0].data = PaintData::Literal(vec![0x07, 0x08]);
    }
    table.store(&mut rom).unwrap();
    assert_eq!(table.location(0), Some(StorageRegion::new(8, 0x1652, 0x1658)));
    assert_eq!(table.raw_pointer(0), Some(0x5652));

    let reloaded = PointerTable::load(&rom, config, BackgroundCodec::new()).unwrap();
    assert_eq!(reloaded.get(0), table.get(0));
    assert_eq!(reloaded.get(1), table.get(1));
}

#[test]
fn emptied_text_is_refused() {
    let mut rom = rooms_rom(&[]);
    rom.bank_mut(1).unwrap().write_u16(0, 0x4100);
    rom.bank_mut(1).unwrap().write(0x100, &[b'A', 0xFE, 0xFF]);
    let mut table = PointerTable::load(&rom, TableConfig::shared("texts", 1, 1, 0, 1), GenericCodec::default()).unwrap();
    table.get_mut(0).unwrap().clear();
    match table.store(&mut rom) {
        Err(TableError::InvalidRecord { table, index, .. }) => {
            assert_eq!(table, "texts");
            assert_eq!(index, Some(0));
        }
        other => panic!("expected invalid record, got {:?}", other),
    }
    assert_eq!(rom.bank(1).unwrap().read_u16(0), Some(0x4100));
}

#[test]
fn unencodable_room_is_refused_before_writing() {
    let mut rom = rooms_rom(&[&R0, &R1, &R2]);
    let before = rom.clone();
    let mut table = PointerTable::load(&rom, rooms_config(3).expanded(), RoomCodec).unwrap();
    table.get_mut(1).unwrap().objects = vec![
        RoomObject::Tile { position: 0xE1, tile: 0x04 },
        RoomObject::Strip { vertical: false, length: 20, position: 0x21, tile: 0x0A },
    ];
    let err = table.store(&mut rom).unwrap_err();
    assert!(matches!(err, TableError::InvalidRecord { index: Some(1), .. }));
    assert!(err.to_string().starts_with("Entry 0x1 of 'rooms' cannot be stored"));
    assert_eq!(rom, before);

    // the strip alone is still too long
    table.get_mut(1).unwrap().objects.remove(0);
    assert!(matches!(
        table.store(&mut rom),
        Err(TableError::InvalidRecord { index: Some(1), .. })
    ));
}

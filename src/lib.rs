#![crate_name = "romtables"]

#[macro_use]
extern crate lazy_static;

pub mod canvas;
pub mod codec;
pub mod error;
pub mod layout;
pub mod pointer_table;
pub mod rom;
pub mod storage;
pub mod tables;

pub use error::{Result, TableError};
pub use layout::Layout;
pub use pointer_table::{BankAddressing, PointerTable, TableConfig};
pub use rom::{Bank, Rom, BANK_SIZE};
pub use storage::{StorageRegion, StorageTracker};
pub use tables::RomWithTables;

/*
Tables of the retail image, bank:offset of the pointer array
        1C:0001 texts, bank numbers at 1C:0741
        16:0000 entities
        09:0000 rooms overworld top
        09:0100 rooms overworld bottom, data in bank 1A
        0A:0000 rooms indoor A
        0B:0000 rooms indoor B
        20:052B background tiles, data in bank 08
        24:1C4B background attributes
*/

//! Record codecs
//!
//! A codec knows how long a record is, how to turn its bytes into a typed
//! record and how to turn that record back into bytes. The pointer table
//! engine only ever talks to this trait.

pub mod background;
pub mod generic;
pub mod room;

pub use background::{log_canvas, BackgroundCodec, BackgroundRecord, CanvasInspector, PaintCommand, PaintData};
pub use generic::{GenericCodec, Terminator};
pub use room::{RoomCodec, RoomObject, RoomRecord};

use std::fmt::Debug;

use crate::error::{Result, TableError};
use crate::rom::Bank;
use crate::storage::StorageRegion;

pub trait RecordCodec {
    type Record: Clone + Debug + PartialEq;

    /// read_record detects the length of the record at `pointer` and returns its
    /// bytes together with the offset one past its last byte
    fn read_record(&self, bank: &Bank, pointer: usize) -> Result<(Vec<u8>, usize)>;

    /// decode turns bytes returned by `read_record` into a typed record
    fn decode(&self, region: &StorageRegion, bytes: &[u8]) -> Result<Self::Record>;

    /// encode produces the exact bytes to store for `record`; records that would
    /// not read back as themselves are an `InvalidRecord` error
    fn encode(&self, record: &Self::Record) -> Result<Vec<u8>>;

    /// sentinel_offsets are in-bank offsets that read back as an empty record
    /// without looking at the bank. The first one is written for entries that
    /// become empty, and no record is ever placed at any of them.
    fn sentinel_offsets(&self) -> &[usize] {
        &[]
    }
}

/// byte_at reads one byte of a record, running off the bank is an unterminated record
pub(crate) fn byte_at(bank: &[u8], bank_nr: usize, start: usize, addr: usize) -> Result<u8> {
    bank.get(addr).copied().ok_or(TableError::UnterminatedRecord {
        bank: bank_nr,
        start,
    })
}

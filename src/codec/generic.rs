use serde::{Deserialize, Serialize};

use crate::codec::RecordCodec;
use crate::error::{Result, TableError};
use crate::rom::Bank;
use crate::storage::StorageRegion;

/// Terminator decides where a generic record stops
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Terminator {
    /// the record ends after this exact byte sequence
    Sequence(Vec<u8>),
    /// the record ends after the first byte found in this set
    AnyOf(Vec<u8>),
}

impl Default for Terminator {
    fn default() -> Self {
        Terminator::Sequence(vec![0xFE, 0xFF])
    }
}

impl Terminator {
    /// match_len returns the terminator length if one starts at `data[0]`
    fn match_len(&self, data: &[u8]) -> Option<usize> {
        match self {
            Terminator::Sequence(seq) => data.starts_with(seq).then_some(seq.len()),
            Terminator::AnyOf(set) => data.first().filter(|b| set.contains(*b)).map(|_| 1),
        }
    }

    pub fn is_empty(&self) -> bool {
        match self {
            Terminator::Sequence(b) | Terminator::AnyOf(b) => b.is_empty(),
        }
    }
}

/// GenericCodec reads raw records up to and including a terminator
#[derive(Debug, Clone, Default)]
pub struct GenericCodec {
    terminator: Terminator,
}

impl GenericCodec {
    pub fn new(terminator: Terminator) -> GenericCodec {
        GenericCodec { terminator }
    }

    pub fn terminator(&self) -> &Terminator {
        &self.terminator
    }
}

impl RecordCodec for GenericCodec {
    type Record = Vec<u8>;

    fn read_record(&self, bank: &Bank, pointer: usize) -> Result<(Vec<u8>, usize)> {
        if self.terminator.is_empty() {
            return Ok((Vec::new(), pointer));
        }
        let mut p = pointer;
        while p < bank.len() {
            if let Some(n) = self.terminator.match_len(&bank[p..]) {
                let end = p + n;
                return Ok((bank[pointer..end].to_vec(), end));
            }
            p += 1;
        }
        Err(TableError::UnterminatedRecord {
            bank: bank.number(),
            start: pointer,
        })
    }

    fn decode(&self, _region: &StorageRegion, bytes: &[u8]) -> Result<Vec<u8>> {
        Ok(bytes.to_vec())
    }

    fn encode(&self, record: &Vec<u8>) -> Result<Vec<u8>> {
        // the first terminator must be the one closing the record
        let end = (0..=record.len())
            .find_map(|p| self.terminator.match_len(&record[p..]).map(|n| p + n));
        match end {
            Some(end) if end == record.len() => Ok(record.clone()),
            Some(end) => Err(TableError::invalid_record(format!(
                "terminator ends at byte {} of a {} byte record",
                end,
                record.len()
            ))),
            None => Err(TableError::invalid_record(format!(
                "{} byte record does not end with its terminator",
                record.len()
            ))),
        }
    }
}

//! Pointer tables
//!
//! A pointer table is an array of 16-bit little-endian pointers, optionally
//! paired with an array of bank numbers, that locates `count` variable
//! length records. Loading follows every pointer and decodes the record
//! behind it. Storing writes every record back, in place when it still
//! fits and relocated first-fit into the table's free space otherwise.

use std::collections::HashMap;

use indexmap::IndexMap;
use log::{debug, info, trace, warn};
use serde::{Deserialize, Serialize};

use crate::codec::RecordCodec;
use crate::error::{Result, Span, TableError};
use crate::rom::{Bank, Rom};
use crate::storage::{first_fit, merge, subtract, StorageRegion, StorageTracker};

/// Pointers are CPU addresses; the low 14 bits are the offset inside the bank
pub const POINTER_OFFSET_MASK: u16 = 0x3FFF;
/// Switchable banks are mapped here, bank 0 is mapped at 0x0000
pub const SWITCHABLE_WINDOW: u16 = 0x4000;
/// First address past the switchable ROM window
pub const POINTER_LIMIT: u16 = 0x8000;

/// cpu_pointer converts an in-bank offset to the address the game reads it from
pub fn cpu_pointer(bank: usize, offset: usize) -> u16 {
    let window = if bank == 0 { 0 } else { SWITCHABLE_WINDOW };
    window | (offset as u16 & POINTER_OFFSET_MASK)
}

/// BankAddressing tells where each record's bank number comes from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BankAddressing {
    /// every record lives in `bank`
    Shared { bank: usize },
    /// entry `i` has its bank number at `addr + i` in `bank`
    PerEntry { addr: usize, bank: usize },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableConfig {
    #[serde(default)]
    pub name: String,
    pub count: usize,
    pub pointers_addr: usize,
    pub pointers_bank: usize,
    pub banks: BankAddressing,
    #[serde(default)]
    pub expand_to_end_of_bank: bool,
}

impl TableConfig {
    pub fn shared(name: &str, count: usize, pointers_bank: usize, pointers_addr: usize, data_bank: usize) -> TableConfig {
        TableConfig {
            name: name.to_string(),
            count,
            pointers_addr,
            pointers_bank,
            banks: BankAddressing::Shared { bank: data_bank },
            expand_to_end_of_bank: false,
        }
    }

    pub fn per_entry(
        name: &str,
        count: usize,
        pointers_bank: usize,
        pointers_addr: usize,
        banks_bank: usize,
        banks_addr: usize,
    ) -> TableConfig {
        TableConfig {
            name: name.to_string(),
            count,
            pointers_addr,
            pointers_bank,
            banks: BankAddressing::PerEntry {
                addr: banks_addr,
                bank: banks_bank,
            },
            expand_to_end_of_bank: false,
        }
    }

    pub fn expanded(mut self) -> TableConfig {
        self.expand_to_end_of_bank = true;
        self
    }

    /// reserved lists the table's own pointer and bank arrays, never used for records
    fn reserved(&self) -> Vec<StorageRegion> {
        let mut reserved = vec![StorageRegion::new(
            self.pointers_bank,
            self.pointers_addr,
            self.pointers_addr + self.count * 2,
        )];
        if let BankAddressing::PerEntry { addr, bank } = self.banks {
            reserved.push(StorageRegion::new(bank, addr, addr + self.count));
        }
        reserved
    }
}

#[derive(Debug, Clone)]
struct Entry<R> {
    record: R,
    raw_pointer: u16,
    location: StorageRegion,
}

/// Placement says what `store` did with one entry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Placement {
    Untouched,
    InPlace,
    Shared,
    Relocated,
    Emptied,
}

pub struct PointerTable<C: RecordCodec> {
    config: TableConfig,
    codec: C,
    entries: Vec<Entry<C::Record>>,
    storage: StorageTracker,
    pool: IndexMap<usize, Vec<Span>>,
}

impl<C: RecordCodec> PointerTable<C> {
    /// load reads and decodes every entry of the table described by `config`
    pub fn load(rom: &Rom, config: TableConfig, codec: C) -> Result<PointerTable<C>> {
        let name = config.name.as_str();
        let pointers = rom.bank(config.pointers_bank).ok_or_else(|| {
            TableError::malformed(
                name,
                None,
                format!("pointer bank {:#04x} is not in the image", config.pointers_bank),
            )
        })?;
        let pointers_end = config.count.checked_mul(2).and_then(|n| n.checked_add(config.pointers_addr));
        if pointers_end.map_or(true, |end| end > pointers.len()) {
            return Err(TableError::malformed(
                name,
                None,
                format!(
                    "{} pointers at {:#06x} run past the end of bank {:#04x}",
                    config.count, config.pointers_addr, config.pointers_bank
                ),
            ));
        }
        let bank_numbers: Option<(&Bank, usize)> = match config.banks {
            BankAddressing::Shared { .. } => None,
            BankAddressing::PerEntry { addr, bank } => {
                let b = rom.bank(bank).ok_or_else(|| {
                    TableError::malformed(name, None, format!("bank index bank {:#04x} is not in the image", bank))
                })?;
                if addr.checked_add(config.count).map_or(true, |end| end > b.len()) {
                    return Err(TableError::malformed(
                        name,
                        None,
                        format!("{} bank indices at {:#06x} run past the end of bank {:#04x}", config.count, addr, bank),
                    ));
                }
                Some((b, addr))
            }
        };

        let mut entries = Vec::with_capacity(config.count);
        let mut storage = StorageTracker::new();
        for index in 0..config.count {
            let raw_pointer = pointers
                .read_u16(config.pointers_addr + index * 2)
                .ok_or_else(|| TableError::malformed(name, Some(index), "pointer outside its bank"))?;
            let bank_nr = match (bank_numbers, config.banks) {
                (Some((b, addr)), _) => b[addr + index] as usize,
                (None, BankAddressing::Shared { bank }) => bank,
                (None, BankAddressing::PerEntry { bank, .. }) => bank,
            };
            let bank = rom.bank(bank_nr).ok_or_else(|| {
                TableError::malformed(name, Some(index), format!("bank {:#04x} is not in the image", bank_nr))
            })?;
            if raw_pointer >= POINTER_LIMIT {
                return Err(TableError::malformed(
                    name,
                    Some(index),
                    format!("pointer {:#06x} is outside the ROM window", raw_pointer),
                ));
            }
            let offset = (raw_pointer & POINTER_OFFSET_MASK) as usize;
            if offset >= bank.len() {
                return Err(TableError::malformed(
                    name,
                    Some(index),
                    format!("offset {:#06x} is past the end of bank {:#04x}", offset, bank_nr),
                ));
            }

            let (bytes, end) = codec.read_record(bank, offset)?;
            let location = StorageRegion::new(bank_nr, offset, end);
            let record = codec.decode(&location, &bytes)?;
            trace!("{}[{:#x}] at {:#04x}:{:#06x} ({} bytes)", name, index, bank_nr, offset, bytes.len());

            if let Some((other, region)) = storage.find_overlap(index, &location) {
                if region.contains(&location) {
                    debug!(
                        "{}[{:#x}] shares storage with entry {:#x} at {:#04x}:{:#06x}",
                        name, index, other, bank_nr, offset
                    );
                } else {
                    warn!(
                        "{}[{:#x}] at {:#04x}:{:#06x}..{:#06x} overlaps entry {:#x} at {:#06x}..{:#06x}",
                        name, index, bank_nr, location.start, location.end, other, region.start, region.end
                    );
                }
            }
            storage.claim(index, location);
            entries.push(Entry {
                record,
                raw_pointer,
                location,
            });
        }

        let mut pool = IndexMap::new();
        for bank_nr in storage.banks() {
            let mut spans = storage.pool(bank_nr);
            if config.expand_to_end_of_bank {
                if let (Some(last), Some(bank)) = (spans.last_mut(), rom.bank(bank_nr)) {
                    last.1 = last.1.max(bank.len());
                }
            }
            pool.insert(bank_nr, spans);
        }

        let table = PointerTable {
            config,
            codec,
            entries,
            storage,
            pool,
        };
        info!(
            "Loaded table '{}': {} entries, {} bytes in {} banks",
            table.config.name,
            table.len(),
            table.used_bytes(),
            table.pool.len()
        );
        Ok(table)
    }

    pub fn config(&self) -> &TableConfig {
        &self.config
    }

    pub fn name(&self) -> &str {
        &self.config.name
    }

    pub fn codec(&self) -> &C {
        &self.codec
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&C::Record> {
        self.entries.get(index).map(|e| &e.record)
    }

    pub fn get_mut(&mut self, index: usize) -> Option<&mut C::Record> {
        self.entries.get_mut(index).map(|e| &mut e.record)
    }

    /// replace swaps in a new record and returns the old one, `None` when out of range
    pub fn replace(&mut self, index: usize, record: C::Record) -> Option<C::Record> {
        self.get_mut(index).map(|r| std::mem::replace(r, record))
    }

    pub fn iter(&self) -> impl Iterator<Item = &C::Record> {
        self.entries.iter().map(|e| &e.record)
    }

    /// location is the byte range holding entry `index` in the image
    pub fn location(&self, index: usize) -> Option<StorageRegion> {
        self.entries.get(index).map(|e| e.location)
    }

    pub fn raw_pointer(&self, index: usize) -> Option<u16> {
        self.entries.get(index).map(|e| e.raw_pointer)
    }

    /// regions_of lists the bytes entry `index` owns; shared records own fewer bytes
    /// than their location covers, empty records own none
    pub fn regions_of(&self, index: usize) -> Vec<StorageRegion> {
        self.storage.owned_by(index)
    }

    pub fn storage(&self) -> &StorageTracker {
        &self.storage
    }

    /// pool is the space this table may place records in, per bank
    pub fn pool(&self, bank: usize) -> &[Span] {
        self.pool.get(&bank).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn used_bytes(&self) -> usize {
        self.storage
            .banks()
            .flat_map(|b| merge(self.storage.regions(b).map(|(_, r)| r.span()).collect()))
            .map(|(s, e)| e - s)
            .sum()
    }

    pub fn free_bytes(&self) -> usize {
        let pool: usize = self.pool.values().flatten().map(|(s, e)| e - s).sum();
        pool.saturating_sub(self.used_bytes())
    }

    /// store writes every entry back into `rom` in index order
    pub fn store(&mut self, rom: &mut Rom) -> Result<()> {
        let mut claimed = StorageTracker::new();
        let mut placed: HashMap<(usize, Vec<u8>), usize> = HashMap::new();
        let mut counts: IndexMap<&'static str, usize> = IndexMap::new();

        for index in 0..self.entries.len() {
            let bytes = self
                .codec
                .encode(&self.entries[index].record)
                .map_err(|e| e.for_entry(&self.config.name, index))?;
            let (location, placement) = self.place(rom, index, &bytes, &mut claimed, &mut placed)?;

            if placement != Placement::Untouched {
                let pointer = cpu_pointer(location.bank, location.start);
                trace!("{}[{:#x}] -> {:#04x}:{:#06x} {:?}", self.config.name, index, location.bank, location.start, placement);
                self.write_pointer(rom, index, location.bank, pointer)?;
                self.entries[index].raw_pointer = pointer;
            }
            self.entries[index].location = location;
            *counts
                .entry(match placement {
                    Placement::Untouched => "untouched",
                    Placement::InPlace => "in place",
                    Placement::Shared => "shared",
                    Placement::Relocated => "relocated",
                    Placement::Emptied => "emptied",
                })
                .or_default() += 1;
        }

        claimed.check_disjoint()?;
        self.storage = claimed;
        info!("Stored table '{}': {:?}", self.config.name, counts);
        Ok(())
    }

    /// place finds where entry `index` goes and writes its bytes there
    fn place(
        &self,
        rom: &mut Rom,
        index: usize,
        bytes: &[u8],
        claimed: &mut StorageTracker,
        placed: &mut HashMap<(usize, Vec<u8>), usize>,
    ) -> Result<(StorageRegion, Placement)> {
        let name = self.config.name.as_str();
        let original = self.entries[index].location;
        let bank_nr = original.bank;
        if bytes.is_empty() {
            if original.is_empty() {
                return Ok((StorageRegion::empty(bank_nr, original.start), Placement::Untouched));
            }
            // the old bytes are released, so the pointer must stop referring to them
            let sentinel = self.codec.sentinel_offsets().first().copied().ok_or_else(|| {
                TableError::InvalidRecord {
                    table: name.to_string(),
                    index: Some(index),
                    detail: "record is empty and the table has no pointer for empty records".to_string(),
                }
            })?;
            debug!(
                "{}[{:#x}] emptied, released {:#04x}:{:#06x}..{:#06x}",
                name, index, bank_nr, original.start, original.end
            );
            return Ok((StorageRegion::empty(bank_nr, sentinel), Placement::Emptied));
        }

        let bank = rom
            .bank(bank_nr)
            .ok_or_else(|| TableError::malformed(name, Some(index), format!("bank {:#04x} is not in the image", bank_nr)))?;

        if !original.is_empty() && bytes.len() <= original.len() {
            let target = StorageRegion::new(bank_nr, original.start, original.start + bytes.len());
            if self.conflict(bank, index, &target, bytes, claimed).is_none() {
                let taken: Vec<Span> = claimed
                    .regions(bank_nr)
                    .filter(|(_, r)| r.intersects(&target))
                    .map(|(_, r)| r.span())
                    .collect();
                let pieces = subtract(&[target.span()], &taken);
                let placement = if pieces.is_empty() {
                    Placement::Shared
                } else {
                    Placement::InPlace
                };
                self.write_pieces(rom, index, &target, bytes, &pieces, claimed)?;
                placed.entry((bank_nr, bytes.to_vec())).or_insert(target.start);
                return Ok((target, placement));
            }
        }

        if let Some(&start) = placed.get(&(bank_nr, bytes.to_vec())) {
            debug!("{}[{:#x}] shares identical record at {:#04x}:{:#06x}", name, index, bank_nr, start);
            return Ok((
                StorageRegion::new(bank_nr, start, start + bytes.len()),
                Placement::Shared,
            ));
        }

        let free = self.free_spans(bank_nr, index, claimed);
        let start = first_fit(&free, bytes.len()).ok_or_else(|| TableError::OutOfSpace {
            table: name.to_string(),
            index,
            bank: bank_nr,
            required: bytes.len(),
            available: free.clone(),
        })?;
        let target = StorageRegion::new(bank_nr, start, start + bytes.len());
        if let Some((other_entry, other)) = self.conflict(bank, index, &target, bytes, claimed) {
            return Err(TableError::Overlap {
                bank: bank_nr,
                write: target.span(),
                entry: index,
                other: other.span(),
                other_entry,
            });
        }
        debug!(
            "{}[{:#x}] moved from {:#06x} ({} bytes) to {:#04x}:{:#06x} ({} bytes)",
            name,
            index,
            original.start,
            original.len(),
            bank_nr,
            start,
            bytes.len()
        );
        self.write_pieces(rom, index, &target, bytes, &[target.span()], claimed)?;
        placed.insert((bank_nr, bytes.to_vec()), start);
        Ok((target, Placement::Relocated))
    }

    /// conflict finds a live region whose bytes a write of `bytes` at `target` would change
    fn conflict(
        &self,
        bank: &Bank,
        index: usize,
        target: &StorageRegion,
        bytes: &[u8],
        claimed: &StorageTracker,
    ) -> Option<(usize, StorageRegion)> {
        let differs = |other: &StorageRegion| {
            let s = other.start.max(target.start);
            let e = other.end.min(target.end);
            bank[s..e] != bytes[s - target.start..e - target.start]
        };
        let pending = self
            .entries
            .iter()
            .enumerate()
            .skip(index + 1)
            .map(|(j, e)| (j, e.location));
        claimed
            .regions(target.bank)
            .copied()
            .chain(pending)
            .find(|(_, r)| r.intersects(target) && differs(r))
    }

    /// free_spans is the pool of `bank_nr` minus everything still in use
    fn free_spans(&self, bank_nr: usize, index: usize, claimed: &StorageTracker) -> Vec<Span> {
        let mut taken: Vec<Span> = claimed.regions(bank_nr).map(|(_, r)| r.span()).collect();
        taken.extend(
            self.entries[index + 1..]
                .iter()
                .filter(|e| e.location.bank == bank_nr)
                .map(|e| e.location.span()),
        );
        taken.extend(
            self.config
                .reserved()
                .iter()
                .filter(|r| r.bank == bank_nr)
                .map(StorageRegion::span),
        );
        // a record starting at a sentinel offset would read back as empty
        taken.extend(self.codec.sentinel_offsets().iter().map(|&s| (s, s + 1)));
        subtract(self.pool(bank_nr), &taken)
    }

    fn write_pieces(
        &self,
        rom: &mut Rom,
        index: usize,
        target: &StorageRegion,
        bytes: &[u8],
        pieces: &[Span],
        claimed: &mut StorageTracker,
    ) -> Result<()> {
        let bank = rom.bank_mut(target.bank).ok_or_else(|| {
            TableError::malformed(&self.config.name, Some(index), format!("bank {:#04x} is not in the image", target.bank))
        })?;
        for &(s, e) in pieces {
            let piece = StorageRegion::new(target.bank, s, e);
            if let Some((other_entry, other)) = claimed.find_overlap(index, &piece) {
                return Err(TableError::Overlap {
                    bank: target.bank,
                    write: piece.span(),
                    entry: index,
                    other: other.span(),
                    other_entry,
                });
            }
            bank.write(s, &bytes[s - target.start..e - target.start]);
            claimed.claim(index, piece);
        }
        Ok(())
    }

    fn write_pointer(&self, rom: &mut Rom, index: usize, bank_nr: usize, pointer: u16) -> Result<()> {
        let name = self.config.name.as_str();
        let pointers = rom.bank_mut(self.config.pointers_bank).ok_or_else(|| {
            TableError::malformed(name, None, format!("pointer bank {:#04x} is not in the image", self.config.pointers_bank))
        })?;
        pointers.write_u16(self.config.pointers_addr + index * 2, pointer);
        if let BankAddressing::PerEntry { addr, bank } = self.config.banks {
            let banks = rom.bank_mut(bank).ok_or_else(|| {
                TableError::malformed(name, None, format!("bank index bank {:#04x} is not in the image", bank))
            })?;
            banks[addr + index] = bank_nr as u8;
        }
        Ok(())
    }
}

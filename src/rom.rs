//! Banked ROM image
//!
//! The cartridge image is split into fixed size banks. Every pointer the
//! tables deal with is an offset relative to the start of one bank.

use std::fs;
use std::ops::{Deref, DerefMut};
use std::path::Path;

use log::{debug, info};

use crate::error::Result;

/// Size of one switchable ROM bank
pub const BANK_SIZE: usize = 0x4000;

const TITLE_ADDR: usize = 0x134;
const TITLE_LEN: usize = 15;
const HEADER_CHECKSUM: usize = 0x14D;
const GLOBAL_CHECKSUM: usize = 0x14E;

/// Bank is one contiguous region of the ROM image
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Bank {
    number: usize,
    data: Vec<u8>,
}

impl Bank {
    pub fn new(number: usize, data: Vec<u8>) -> Bank {
        Bank { number, data }
    }

    /// number is the index of this bank inside the image
    pub fn number(&self) -> usize {
        self.number
    }

    pub fn read_u16(&self, addr: usize) -> Option<u16> {
        let lo = *self.data.get(addr)?;
        let hi = *self.data.get(addr + 1)?;
        Some(u16::from_le_bytes([lo, hi]))
    }

    pub fn write_u16(&mut self, addr: usize, value: u16) {
        self.data[addr..addr + 2].copy_from_slice(&value.to_le_bytes());
    }

    pub fn write(&mut self, addr: usize, bytes: &[u8]) {
        self.data[addr..addr + bytes.len()].copy_from_slice(bytes);
    }
}

impl Deref for Bank {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        &self.data
    }
}

impl DerefMut for Bank {
    fn deref_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }
}

/// Rom holds the whole cartridge image as a list of banks
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rom {
    banks: Vec<Bank>,
}

impl Rom {
    /// create a Rom from raw file bytes, a short final chunk becomes a short bank
    pub fn from_bytes(bytes: &[u8]) -> Rom {
        let banks = bytes
            .chunks(BANK_SIZE)
            .enumerate()
            .map(|(n, chunk)| Bank::new(n, chunk.to_vec()))
            .collect();
        Rom { banks }
    }

    /// create a zero filled image of `count` banks
    pub fn blank(count: usize) -> Rom {
        Rom {
            banks: (0..count).map(|n| Bank::new(n, vec![0; BANK_SIZE])).collect(),
        }
    }

    pub fn load(path: &Path) -> Result<Rom> {
        let bytes = fs::read(path)?;
        info!("Loaded ROM {} ({} bytes)", path.display(), bytes.len());
        Ok(Rom::from_bytes(&bytes))
    }

    /// save writes the image back to disk after optionally renaming the cartridge
    /// and refreshing both header checksums
    pub fn save(&mut self, path: &Path, name: Option<&str>) -> Result<()> {
        if let Some(name) = name {
            self.set_title(name);
        }
        self.fix_checksums();
        let bytes = self.to_bytes();
        fs::write(path, &bytes)?;
        info!("Saved ROM {} ({} bytes)", path.display(), bytes.len());
        Ok(())
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        self.banks.iter().flat_map(|b| b.data.iter().copied()).collect()
    }

    pub fn bank_count(&self) -> usize {
        self.banks.len()
    }

    pub fn bank(&self, n: usize) -> Option<&Bank> {
        self.banks.get(n)
    }

    pub fn bank_mut(&mut self, n: usize) -> Option<&mut Bank> {
        self.banks.get_mut(n)
    }

    fn set_title(&mut self, name: &str) {
        let Some(bank) = self.banks.get_mut(0) else {
            return;
        };
        if bank.len() < TITLE_ADDR + TITLE_LEN {
            return;
        }
        let mut title = [0u8; TITLE_LEN];
        for (dst, src) in title.iter_mut().zip(name.bytes()) {
            *dst = src;
        }
        bank.write(TITLE_ADDR, &title);
    }

    fn fix_checksums(&mut self) {
        let Some(bank) = self.banks.get_mut(0) else {
            return;
        };
        if bank.len() <= GLOBAL_CHECKSUM + 1 {
            return;
        }
        let header = bank[TITLE_ADDR..HEADER_CHECKSUM]
            .iter()
            .fold(0u8, |x, b| x.wrapping_sub(*b).wrapping_sub(1));
        bank[HEADER_CHECKSUM] = header;

        let mut global: u16 = 0;
        for (n, bank) in self.banks.iter().enumerate() {
            for (addr, b) in bank.iter().enumerate() {
                if n == 0 && (addr == GLOBAL_CHECKSUM || addr == GLOBAL_CHECKSUM + 1) {
                    continue;
                }
                global = global.wrapping_add(*b as u16);
            }
        }
        self.banks[0][GLOBAL_CHECKSUM..GLOBAL_CHECKSUM + 2].copy_from_slice(&global.to_be_bytes());
        debug!(
            "Header checksum {:#04x}, global checksum {:#06x}",
            header, global
        );
    }
}

//! Background paint programs
//!
//! A background record is a list of paint commands ending in a 0x00 byte.
//! Each command is a big-endian canvas address, a control byte and either
//! one fill byte or a run of literal bytes:
//!
//! ```text
//! control: V R A A A A A A
//!          | | +---------- amount - 1
//!          | +------------ repeat one byte
//!          +-------------- step a row (0x20) instead of a cell
//! ```

use std::rc::Rc;

use log::debug;

use crate::canvas::{Canvas, ROW_STRIDE};
use crate::codec::{byte_at, RecordCodec};
use crate::error::{Result, TableError};
use crate::rom::Bank;
use crate::storage::StorageRegion;

pub const END_OF_COMMANDS: u8 = 0x00;

/// Offsets that mark a table slot without a background
pub const SENTINEL_POINTERS: [usize; 2] = [0x0000, 0x1651];

const AMOUNT_MASK: u8 = 0x3F;
const REPEAT: u8 = 0x40;
const VERTICAL: u8 = 0x80;
const MAX_AMOUNT: usize = AMOUNT_MASK as usize + 1;

pub type CanvasInspector = Rc<dyn Fn(&StorageRegion, &Canvas)>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PaintData {
    /// `count` cells all set to `value`
    Repeat { count: usize, value: u8 },
    /// one cell per byte
    Literal(Vec<u8>),
}

impl PaintData {
    pub fn amount(&self) -> usize {
        match self {
            PaintData::Repeat { count, .. } => *count,
            PaintData::Literal(bytes) => bytes.len(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaintCommand {
    pub address: u16,
    pub vertical: bool,
    pub data: PaintData,
}

impl PaintCommand {
    fn stride(&self) -> u16 {
        if self.vertical {
            ROW_STRIDE
        } else {
            1
        }
    }

    /// cells lists every `(address, value)` this command paints, in order
    pub fn cells(&self) -> Vec<(u16, u8)> {
        let stride = self.stride();
        let value = |n: usize| match &self.data {
            PaintData::Repeat { value, .. } => *value,
            PaintData::Literal(bytes) => bytes[n],
        };
        (0..self.data.amount())
            .map(|n| (self.address.wrapping_add(stride.wrapping_mul(n as u16)), value(n)))
            .collect()
    }

    /// write_to encodes the command, runs longer than one control byte allows
    /// are split into consecutive commands painting the same cells. A command
    /// whose address starts with the end byte would read back as the end of
    /// the program and is refused.
    pub fn write_to(&self, out: &mut Vec<u8>) -> Result<()> {
        let stride = self.stride();
        let vertical = if self.vertical { VERTICAL } else { 0 };
        let mut address = self.address;
        let mut emit = |amount: usize, repeat: bool, data: &[u8], address: &mut u16| -> Result<()> {
            let [hi, lo] = address.to_be_bytes();
            if hi == END_OF_COMMANDS {
                return Err(TableError::invalid_record(format!(
                    "paint address {:#06x} reads back as the end of the program",
                    address
                )));
            }
            out.extend_from_slice(&[hi, lo]);
            let flags = vertical | if repeat { REPEAT } else { 0 };
            out.push(flags | (amount - 1) as u8);
            out.extend_from_slice(data);
            *address = address.wrapping_add(stride.wrapping_mul(amount as u16));
            Ok(())
        };
        match &self.data {
            PaintData::Repeat { count, value } => {
                let mut left = *count;
                while left > 0 {
                    let n = left.min(MAX_AMOUNT);
                    emit(n, true, &[*value], &mut address)?;
                    left -= n;
                }
            }
            PaintData::Literal(bytes) => {
                for chunk in bytes.chunks(MAX_AMOUNT) {
                    emit(chunk.len(), false, chunk, &mut address)?;
                }
            }
        }
        Ok(())
    }
}

/// BackgroundRecord is either an unused table slot or a paint program
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackgroundRecord {
    Empty,
    Commands(Vec<PaintCommand>),
}

impl BackgroundRecord {
    pub fn commands(&self) -> &[PaintCommand] {
        match self {
            BackgroundRecord::Empty => &[],
            BackgroundRecord::Commands(commands) => commands,
        }
    }

    /// canvas replays the program; the result is for inspection only
    pub fn canvas(&self) -> Canvas {
        let mut canvas = Canvas::new();
        for command in self.commands() {
            for (addr, value) in command.cells() {
                canvas.paint(addr, value);
            }
        }
        canvas
    }
}

#[derive(Default)]
pub struct BackgroundCodec {
    inspector: Option<CanvasInspector>,
}

impl BackgroundCodec {
    pub fn new() -> BackgroundCodec {
        BackgroundCodec::default()
    }

    /// with_inspector installs a callback that sees every decoded canvas
    pub fn with_inspector(inspector: CanvasInspector) -> BackgroundCodec {
        BackgroundCodec {
            inspector: Some(inspector),
        }
    }

    pub fn is_sentinel(pointer: usize) -> bool {
        SENTINEL_POINTERS.contains(&pointer)
    }

    fn parse(&self, bank: &[u8], bank_nr: usize, start: usize) -> Result<(Vec<PaintCommand>, usize)> {
        let mut commands = Vec::new();
        let mut p = start;
        while byte_at(bank, bank_nr, start, p)? != END_OF_COMMANDS {
            let hi = byte_at(bank, bank_nr, start, p)?;
            let lo = byte_at(bank, bank_nr, start, p + 1)?;
            let control = byte_at(bank, bank_nr, start, p + 2)?;
            p += 3;
            let amount = (control & AMOUNT_MASK) as usize + 1;
            let data = if control & REPEAT != 0 {
                let value = byte_at(bank, bank_nr, start, p)?;
                p += 1;
                PaintData::Repeat {
                    count: amount,
                    value,
                }
            } else {
                let bytes = bank.get(p..p + amount).ok_or(TableError::UnterminatedRecord {
                    bank: bank_nr,
                    start,
                })?;
                p += amount;
                PaintData::Literal(bytes.to_vec())
            };
            commands.push(PaintCommand {
                address: u16::from_be_bytes([hi, lo]),
                vertical: control & VERTICAL != 0,
                data,
            });
        }
        Ok((commands, p + 1))
    }
}

impl RecordCodec for BackgroundCodec {
    type Record = BackgroundRecord;

    fn read_record(&self, bank: &Bank, pointer: usize) -> Result<(Vec<u8>, usize)> {
        if BackgroundCodec::is_sentinel(pointer) {
            return Ok((Vec::new(), pointer));
        }
        let (_, end) = self.parse(bank, bank.number(), pointer)?;
        Ok((bank[pointer..end].to_vec(), end))
    }

    fn decode(&self, region: &StorageRegion, bytes: &[u8]) -> Result<BackgroundRecord> {
        if bytes.is_empty() {
            return Ok(BackgroundRecord::Empty);
        }
        let (commands, end) = self.parse(bytes, region.bank, 0).map_err(|_| {
            TableError::UnterminatedRecord {
                bank: region.bank,
                start: region.start,
            }
        })?;
        if end != bytes.len() {
            debug!(
                "Background at {:#04x}:{:#06x} has {} bytes after its terminator",
                region.bank,
                region.start,
                bytes.len() - end
            );
        }
        let record = BackgroundRecord::Commands(commands);
        if let Some(inspector) = &self.inspector {
            inspector(region, &record.canvas());
        }
        Ok(record)
    }

    fn encode(&self, record: &BackgroundRecord) -> Result<Vec<u8>> {
        match record {
            BackgroundRecord::Empty => Ok(Vec::new()),
            BackgroundRecord::Commands(commands) => {
                let mut out = Vec::new();
                for (n, command) in commands.iter().enumerate() {
                    if command.data.amount() > 0 {
                        command.write_to(&mut out).map_err(|e| match e {
                            TableError::InvalidRecord { detail, .. } => {
                                TableError::invalid_record(format!("command {}: {}", n, detail))
                            }
                            other => other,
                        })?;
                    }
                }
                out.push(END_OF_COMMANDS);
                Ok(out)
            }
        }
    }

    fn sentinel_offsets(&self) -> &[usize] {
        &SENTINEL_POINTERS
    }
}

/// log_canvas is an inspector that writes the rendered canvas to the debug log
pub fn log_canvas(region: &StorageRegion, canvas: &Canvas) {
    debug!("Background at {:#04x}:{:#06x}", region.bank, region.start);
    for line in canvas.render() {
        debug!("{}", line);
    }
}

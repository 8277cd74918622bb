//! Room object streams
//!
//! A room starts with a two byte header, followed by object descriptors and
//! a single 0xFE end marker. Descriptors carry no length; the width comes
//! from the high nibble of their first byte.

use crate::codec::{byte_at, RecordCodec};
use crate::error::{Result, TableError};
use crate::rom::Bank;
use crate::storage::StorageRegion;

pub const ROOM_HEADER: usize = 2;
pub const END_OF_ROOM: u8 = 0xFE;

const WARP: u8 = 0xE0;
const STRIP_VERTICAL: u8 = 0xC0;
const STRIP_HORIZONTAL: u8 = 0x80;

/// object_width returns the descriptor size selected by `opcode`
pub fn object_width(opcode: u8) -> usize {
    match opcode & 0xF0 {
        WARP => 5,
        STRIP_VERTICAL | STRIP_HORIZONTAL => 3,
        _ => 2,
    }
}

/// RoomObject is one descriptor of a room object stream
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoomObject {
    /// a single object, `position` holds row and column nibbles
    Tile { position: u8, tile: u8 },
    /// a run of `length` copies of `tile` starting at `position`
    Strip {
        vertical: bool,
        length: u8,
        position: u8,
        tile: u8,
    },
    /// a warp to `room` of `map`, arriving at `x`,`y`
    Warp {
        kind: u8,
        map: u8,
        room: u8,
        x: u8,
        y: u8,
    },
}

impl RoomObject {
    /// parse reads one descriptor from the front of `bytes`
    pub fn parse(bytes: &[u8]) -> Option<RoomObject> {
        let op = *bytes.first()?;
        let raw = bytes.get(..object_width(op))?;
        Some(match op & 0xF0 {
            WARP => RoomObject::Warp {
                kind: op & 0x0F,
                map: raw[1],
                room: raw[2],
                x: raw[3],
                y: raw[4],
            },
            kind @ (STRIP_VERTICAL | STRIP_HORIZONTAL) => RoomObject::Strip {
                vertical: kind == STRIP_VERTICAL,
                length: op & 0x0F,
                position: raw[1],
                tile: raw[2],
            },
            _ => RoomObject::Tile {
                position: raw[0],
                tile: raw[1],
            },
        })
    }

    pub fn width(&self) -> usize {
        match self {
            RoomObject::Tile { .. } => 2,
            RoomObject::Strip { .. } => 3,
            RoomObject::Warp { .. } => 5,
        }
    }

    /// write_to appends the descriptor; values that would read back as a
    /// different descriptor are refused
    pub fn write_to(&self, out: &mut Vec<u8>) -> Result<()> {
        match *self {
            RoomObject::Tile { position, tile } => {
                if position == END_OF_ROOM {
                    return Err(TableError::invalid_record(
                        "tile position 0xfe reads back as the end of the room",
                    ));
                }
                if object_width(position) != 2 {
                    return Err(TableError::invalid_record(format!(
                        "tile position {:#04x} reads back as a {} byte descriptor",
                        position,
                        object_width(position)
                    )));
                }
                out.extend_from_slice(&[position, tile]);
            }
            RoomObject::Strip {
                vertical,
                length,
                position,
                tile,
            } => {
                if length > 0x0F {
                    return Err(TableError::invalid_record(format!(
                        "strip length {} does not fit in 4 bits",
                        length
                    )));
                }
                let kind = if vertical { STRIP_VERTICAL } else { STRIP_HORIZONTAL };
                out.extend_from_slice(&[kind | length, position, tile]);
            }
            RoomObject::Warp { kind, map, room, x, y } => {
                if kind > 0x0F {
                    return Err(TableError::invalid_record(format!(
                        "warp kind {} does not fit in 4 bits",
                        kind
                    )));
                }
                out.extend_from_slice(&[WARP | kind, map, room, x, y]);
            }
        }
        Ok(())
    }
}

/// RoomRecord is a decoded room: opaque header plus its objects in stream order
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoomRecord {
    pub header: [u8; ROOM_HEADER],
    pub objects: Vec<RoomObject>,
}

impl RoomRecord {
    pub fn warps(&self) -> impl Iterator<Item = &RoomObject> {
        self.objects
            .iter()
            .filter(|o| matches!(o, RoomObject::Warp { .. }))
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct RoomCodec;

impl RecordCodec for RoomCodec {
    type Record = RoomRecord;

    fn read_record(&self, bank: &Bank, pointer: usize) -> Result<(Vec<u8>, usize)> {
        let start = pointer;
        let mut p = pointer + ROOM_HEADER;
        loop {
            let op = byte_at(bank, bank.number(), start, p)?;
            if op == END_OF_ROOM {
                break;
            }
            p += object_width(op);
        }
        p += 1;
        Ok((bank[start..p].to_vec(), p))
    }

    fn decode(&self, region: &StorageRegion, bytes: &[u8]) -> Result<RoomRecord> {
        let unterminated = || TableError::UnterminatedRecord {
            bank: region.bank,
            start: region.start,
        };
        let header = bytes
            .get(..ROOM_HEADER)
            .and_then(|h| <[u8; ROOM_HEADER]>::try_from(h).ok())
            .ok_or_else(unterminated)?;
        let mut objects = Vec::new();
        let mut p = ROOM_HEADER;
        loop {
            match bytes.get(p) {
                Some(&END_OF_ROOM) => break,
                Some(_) => {
                    let object = RoomObject::parse(&bytes[p..]).ok_or_else(unterminated)?;
                    p += object.width();
                    objects.push(object);
                }
                None => return Err(unterminated()),
            }
        }
        Ok(RoomRecord { header, objects })
    }

    fn encode(&self, record: &RoomRecord) -> Result<Vec<u8>> {
        let mut out = Vec::with_capacity(
            ROOM_HEADER + record.objects.iter().map(RoomObject::width).sum::<usize>() + 1,
        );
        out.extend_from_slice(&record.header);
        for (n, object) in record.objects.iter().enumerate() {
            object.write_to(&mut out).map_err(|e| match e {
                TableError::InvalidRecord { detail, .. } => {
                    TableError::invalid_record(format!("object {}: {}", n, detail))
                }
                other => other,
            })?;
        }
        out.push(END_OF_ROOM);
        Ok(out)
    }
}

//! Table layout of a cartridge
//!
//! The layout says where every pointer table lives. The built-in layout
//! describes the retail image; a TOML file can replace any table of it:
//!
//! ```toml
//! [rooms_indoor_b]
//! count = 0xFF
//! pointers_addr = 0x0000
//! pointers_bank = 0x0B
//! banks = { shared = { bank = 0x0B } }
//! expand_to_end_of_bank = true
//! ```

use std::fs;
use std::path::Path;

use log::debug;
use serde::{Deserialize, Serialize};

use crate::codec::Terminator;
use crate::error::{Result, TableError};
use crate::pointer_table::{BankAddressing, TableConfig};
use crate::rom::BANK_SIZE;

lazy_static! {
    static ref BUILTIN: Layout = Layout::builtin();
}

/// GenericTableSpec is a table of terminator delimited records
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenericTableSpec {
    #[serde(flatten)]
    pub table: TableConfig,
    #[serde(default)]
    pub terminator: Terminator,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Layout {
    pub texts: GenericTableSpec,
    pub entities: GenericTableSpec,
    pub rooms_overworld_top: TableConfig,
    pub rooms_overworld_bottom: TableConfig,
    pub rooms_indoor_a: TableConfig,
    pub rooms_indoor_b: TableConfig,
    pub background_tiles: TableConfig,
    pub background_attributes: TableConfig,
}

impl Default for Layout {
    fn default() -> Self {
        BUILTIN.clone()
    }
}

impl Layout {
    fn builtin() -> Layout {
        Layout {
            texts: GenericTableSpec {
                table: TableConfig::per_entry("texts", 0x2B0, 0x1C, 0x0001, 0x1C, 0x0741),
                terminator: Terminator::Sequence(vec![0xFE, 0xFF]),
            },
            entities: GenericTableSpec {
                table: TableConfig::shared("entities", 0x320, 0x16, 0x0000, 0x16),
                terminator: Terminator::AnyOf(vec![0xFF]),
            },
            rooms_overworld_top: TableConfig::shared("rooms_overworld_top", 0x080, 0x09, 0x0000, 0x09),
            rooms_overworld_bottom: TableConfig::shared("rooms_overworld_bottom", 0x080, 0x09, 0x0100, 0x1A),
            rooms_indoor_a: TableConfig::shared("rooms_indoor_a", 0x100, 0x0A, 0x0000, 0x0A),
            rooms_indoor_b: TableConfig::shared("rooms_indoor_b", 0x0FF, 0x0B, 0x0000, 0x0B),
            background_tiles: TableConfig::shared("background_tiles", 0x25, 0x20, 0x052B, 0x08).expanded(),
            background_attributes: TableConfig::shared("background_attributes", 0x25, 0x24, 0x1C4B, 0x24),
        }
    }

    pub fn from_toml_str(s: &str) -> Result<Layout> {
        let mut layout: Layout = toml::from_str(s)?;
        layout.validate()?;
        Ok(layout)
    }

    pub fn load(path: &Path) -> Result<Layout> {
        let text = fs::read_to_string(path)?;
        debug!("Read layout {}", path.display());
        Layout::from_toml_str(&text)
    }

    pub fn to_toml_string(&self) -> Result<String> {
        Ok(toml::to_string(self)?)
    }

    fn tables_mut(&mut self) -> [(&'static str, &mut TableConfig); 8] {
        [
            ("texts", &mut self.texts.table),
            ("entities", &mut self.entities.table),
            ("rooms_overworld_top", &mut self.rooms_overworld_top),
            ("rooms_overworld_bottom", &mut self.rooms_overworld_bottom),
            ("rooms_indoor_a", &mut self.rooms_indoor_a),
            ("rooms_indoor_b", &mut self.rooms_indoor_b),
            ("background_tiles", &mut self.background_tiles),
            ("background_attributes", &mut self.background_attributes),
        ]
    }

    /// validate names unnamed tables after their key and rejects impossible shapes
    pub fn validate(&mut self) -> Result<()> {
        for (key, table) in self.tables_mut() {
            if table.name.is_empty() {
                table.name = key.to_string();
            }
            validate_table(table)?;
        }
        for (key, spec) in [("texts", &self.texts), ("entities", &self.entities)] {
            if spec.terminator.is_empty() {
                return Err(TableError::Layout(format!("{}: terminator is empty", key)));
            }
        }
        Ok(())
    }
}

fn validate_table(table: &TableConfig) -> Result<()> {
    let fail = |msg: String| Err(TableError::Layout(format!("{}: {}", table.name, msg)));
    if table.count == 0 {
        return fail("count must be at least 1".to_string());
    }
    let pointers_end = table.count.checked_mul(2).and_then(|n| n.checked_add(table.pointers_addr));
    if pointers_end.map_or(true, |end| end > BANK_SIZE) {
        return fail(format!(
            "{} pointers at {:#06x} do not fit in a bank",
            table.count, table.pointers_addr
        ));
    }
    if let BankAddressing::PerEntry { addr, .. } = table.banks {
        if addr.checked_add(table.count).map_or(true, |end| end > BANK_SIZE) {
            return fail(format!(
                "{} bank indices at {:#06x} do not fit in a bank",
                table.count, addr
            ));
        }
    }
    Ok(())
}

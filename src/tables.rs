use std::fmt::{Display, Error, Formatter};
use std::path::Path;
use std::rc::Rc;

use log::info;

use crate::codec::{BackgroundCodec, CanvasInspector, GenericCodec, RecordCodec, RoomCodec};
use crate::error::Result;
use crate::layout::Layout;
use crate::pointer_table::PointerTable;
use crate::rom::Rom;

pub type TextTable = PointerTable<GenericCodec>;
pub type EntityTable = PointerTable<GenericCodec>;
pub type RoomTable = PointerTable<RoomCodec>;
pub type BackgroundTable = PointerTable<BackgroundCodec>;

/// RomWithTables owns a ROM image and every editable table in it
pub struct RomWithTables {
    rom: Rom,
    /// every line of dialog in the game
    pub texts: TextTable,
    /// entity placement lists, one per room
    pub entities: EntityTable,
    pub rooms_overworld_top: RoomTable,
    pub rooms_overworld_bottom: RoomTable,
    pub rooms_indoor_a: RoomTable,
    pub rooms_indoor_b: RoomTable,
    /// backgrounds for things like the title screen
    pub background_tiles: BackgroundTable,
    pub background_attributes: BackgroundTable,
}

impl RomWithTables {
    pub fn open(path: &Path) -> Result<RomWithTables> {
        RomWithTables::from_rom(Rom::load(path)?)
    }

    pub fn from_rom(rom: Rom) -> Result<RomWithTables> {
        RomWithTables::with_layout(rom, &Layout::default())
    }

    pub fn with_layout(rom: Rom, layout: &Layout) -> Result<RomWithTables> {
        RomWithTables::with_inspector(rom, layout, None)
    }

    /// with_inspector loads every table, handing each decoded background canvas
    /// to `inspector`
    pub fn with_inspector(
        rom: Rom,
        layout: &Layout,
        inspector: Option<CanvasInspector>,
    ) -> Result<RomWithTables> {
        let background = || match &inspector {
            Some(inspector) => BackgroundCodec::with_inspector(Rc::clone(inspector)),
            None => BackgroundCodec::new(),
        };
        let texts = PointerTable::load(
            &rom,
            layout.texts.table.clone(),
            GenericCodec::new(layout.texts.terminator.clone()),
        )?;
        let entities = PointerTable::load(
            &rom,
            layout.entities.table.clone(),
            GenericCodec::new(layout.entities.terminator.clone()),
        )?;
        let rooms_overworld_top = PointerTable::load(&rom, layout.rooms_overworld_top.clone(), RoomCodec)?;
        let rooms_overworld_bottom = PointerTable::load(&rom, layout.rooms_overworld_bottom.clone(), RoomCodec)?;
        let rooms_indoor_a = PointerTable::load(&rom, layout.rooms_indoor_a.clone(), RoomCodec)?;
        let rooms_indoor_b = PointerTable::load(&rom, layout.rooms_indoor_b.clone(), RoomCodec)?;
        let background_tiles = PointerTable::load(&rom, layout.background_tiles.clone(), background())?;
        let background_attributes = PointerTable::load(&rom, layout.background_attributes.clone(), background())?;

        Ok(RomWithTables {
            rom,
            texts,
            entities,
            rooms_overworld_top,
            rooms_overworld_bottom,
            rooms_indoor_a,
            rooms_indoor_b,
            background_tiles,
            background_attributes,
        })
    }

    pub fn rom(&self) -> &Rom {
        &self.rom
    }

    pub fn into_rom(self) -> Rom {
        self.rom
    }

    /// store_all writes every table into the in-memory image: texts, entities,
    /// the four room tables, then both background tables
    pub fn store_all(&mut self) -> Result<()> {
        self.texts.store(&mut self.rom)?;
        self.entities.store(&mut self.rom)?;
        self.rooms_overworld_top.store(&mut self.rom)?;
        self.rooms_overworld_bottom.store(&mut self.rom)?;
        self.rooms_indoor_a.store(&mut self.rom)?;
        self.rooms_indoor_b.store(&mut self.rom)?;
        self.background_tiles.store(&mut self.rom)?;
        self.background_attributes.store(&mut self.rom)?;
        Ok(())
    }

    /// save stores every table and writes the image to `path`
    pub fn save(&mut self, path: &Path, name: Option<&str>) -> Result<()> {
        self.store_all()?;
        self.rom.save(path, name)?;
        info!("Saved all tables to {}", path.display());
        Ok(())
    }
}

fn summary<C: RecordCodec>(f: &mut Formatter<'_>, table: &PointerTable<C>) -> std::fmt::Result {
    writeln!(
        f,
        "{:<24} {:>5} entries {:>6} bytes used {:>6} bytes free",
        table.name(),
        table.len(),
        table.used_bytes(),
        table.free_bytes()
    )
}

impl Display for RomWithTables {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::result::Result<(), Error> {
        summary(f, &self.texts)?;
        summary(f, &self.entities)?;
        summary(f, &self.rooms_overworld_top)?;
        summary(f, &self.rooms_overworld_bottom)?;
        summary(f, &self.rooms_indoor_a)?;
        summary(f, &self.rooms_indoor_b)?;
        summary(f, &self.background_tiles)?;
        summary(f, &self.background_attributes)
    }
}

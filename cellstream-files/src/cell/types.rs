use std::io::{Read, Write};

use bitflags::bitflags;

use crate::common::reader::{read_array, Parseable};
use crate::common::types::{C3Vector, C4Quaternion};
use crate::common::writer::{write_array, write_asset, Writable};
use crate::ids::OUTDOORS_CELL_INDEX;
use crate::ParserError;

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct EnvCellFlags: u32 {
        /// The cell is part of a building and can be seen from the outdoor terrain.
        const SEEN_OUTSIDE = 0x0001;
        const HAS_STATIC_OBJECTS = 0x0002;
    }
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct PortalFlags: u16 {
        const EXACT_MATCH = 0x0001;
        /// Flips the half-space of the portal plane that belongs to the owning cell.
        const PORTAL_SIDE = 0x0002;
    }
}

/// One interior room as authored: an environment cell structure placed into the world.
#[derive(Debug, Clone, Default)]
pub struct EnvCellAsset {
    pub id: u32,
    pub flags: EnvCellFlags,
    pub environment_id: u32,
    pub structure_index: u16,
    /// Landblock-local position of the cell origin.
    pub position: C3Vector,
    pub orientation: C4Quaternion,
    pub surfaces: Vec<u32>,
    pub portals: Vec<CellPortalRecord>,
    pub static_objects: Vec<StaticObjectDef>,
}

impl EnvCellAsset {
    pub fn is_seen_outside(&self) -> bool {
        self.flags.contains(EnvCellFlags::SEEN_OUTSIDE)
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, ParserError> {
        write_asset(b"CELL", self)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CellPortalRecord {
    /// Cell index inside the same landblock, or [`OUTDOORS_CELL_INDEX`].
    pub other_cell_index: u16,
    /// Polygon of the cell structure that bounds the opening.
    pub polygon_id: u16,
    pub flags: PortalFlags,
}

impl CellPortalRecord {
    pub fn leads_outdoors(&self) -> bool {
        self.other_cell_index == OUTDOORS_CELL_INDEX
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct StaticObjectDef {
    pub model_id: u32,
    pub position: C3Vector,
    pub orientation: C4Quaternion,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LandblockInfoAsset {
    pub id: u32,
    pub cell_count: u32,
}

impl LandblockInfoAsset {
    pub fn to_bytes(&self) -> Result<Vec<u8>, ParserError> {
        write_asset(b"LBIN", self)
    }
}

impl Parseable<CellPortalRecord> for CellPortalRecord {
    fn parse<R: Read>(rdr: &mut R) -> Result<CellPortalRecord, ParserError> {
        Ok(CellPortalRecord {
            other_cell_index: u16::parse(rdr)?,
            polygon_id: u16::parse(rdr)?,
            flags: PortalFlags::from_bits_retain(u16::parse(rdr)?),
        })
    }
}

impl Writable for CellPortalRecord {
    fn write<W: Write>(&self, wtr: &mut W) -> Result<(), ParserError> {
        self.other_cell_index.write(wtr)?;
        self.polygon_id.write(wtr)?;
        self.flags.bits().write(wtr)
    }
}

impl Parseable<StaticObjectDef> for StaticObjectDef {
    fn parse<R: Read>(rdr: &mut R) -> Result<StaticObjectDef, ParserError> {
        Ok(StaticObjectDef {
            model_id: u32::parse(rdr)?,
            position: C3Vector::parse(rdr)?,
            orientation: C4Quaternion::parse(rdr)?,
        })
    }
}

impl Writable for StaticObjectDef {
    fn write<W: Write>(&self, wtr: &mut W) -> Result<(), ParserError> {
        self.model_id.write(wtr)?;
        self.position.write(wtr)?;
        self.orientation.write(wtr)
    }
}

impl Parseable<EnvCellAsset> for EnvCellAsset {
    fn parse<R: Read>(rdr: &mut R) -> Result<EnvCellAsset, ParserError> {
        let id = u32::parse(rdr)?;
        let flags = EnvCellFlags::from_bits_retain(u32::parse(rdr)?);
        let environment_id = u32::parse(rdr)?;
        let structure_index = u16::parse(rdr)?;
        let position = C3Vector::parse(rdr)?;
        let orientation = C4Quaternion::parse(rdr)?;

        let surface_count = u8::parse(rdr)? as usize;
        let surfaces = read_array::<u32, R>(rdr, surface_count)?;
        let portal_count = u16::parse(rdr)? as usize;
        let portals = read_array::<CellPortalRecord, R>(rdr, portal_count)?;

        let static_objects = if flags.contains(EnvCellFlags::HAS_STATIC_OBJECTS) {
            let static_count = u16::parse(rdr)? as usize;
            read_array::<StaticObjectDef, R>(rdr, static_count)?
        } else {
            Vec::new()
        };

        Ok(EnvCellAsset {
            id,
            flags,
            environment_id,
            structure_index,
            position,
            orientation,
            surfaces,
            portals,
            static_objects,
        })
    }
}

impl Writable for EnvCellAsset {
    fn write<W: Write>(&self, wtr: &mut W) -> Result<(), ParserError> {
        if self.surfaces.len() > u8::MAX as usize {
            return Err(ParserError::FormatError {
                reason: "Too many surfaces on a cell",
            });
        }

        // the flag decides whether the static object list is present at all.
        let mut flags = self.flags;
        flags.set(EnvCellFlags::HAS_STATIC_OBJECTS, !self.static_objects.is_empty());

        self.id.write(wtr)?;
        flags.bits().write(wtr)?;
        self.environment_id.write(wtr)?;
        self.structure_index.write(wtr)?;
        self.position.write(wtr)?;
        self.orientation.write(wtr)?;
        (self.surfaces.len() as u8).write(wtr)?;
        write_array(wtr, &self.surfaces)?;
        (self.portals.len() as u16).write(wtr)?;
        write_array(wtr, &self.portals)?;

        if !self.static_objects.is_empty() {
            (self.static_objects.len() as u16).write(wtr)?;
            write_array(wtr, &self.static_objects)?;
        }
        Ok(())
    }
}

impl Parseable<LandblockInfoAsset> for LandblockInfoAsset {
    fn parse<R: Read>(rdr: &mut R) -> Result<LandblockInfoAsset, ParserError> {
        Ok(LandblockInfoAsset {
            id: u32::parse(rdr)?,
            cell_count: u32::parse(rdr)?,
        })
    }
}

impl Writable for LandblockInfoAsset {
    fn write<W: Write>(&self, wtr: &mut W) -> Result<(), ParserError> {
        self.id.write(wtr)?;
        self.cell_count.write(wtr)
    }
}

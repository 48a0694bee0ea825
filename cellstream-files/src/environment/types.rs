use std::collections::BTreeMap;
use std::io::{Read, Write};

use bitflags::bitflags;

use crate::common::reader::{read_array, Parseable};
use crate::common::types::{C2Vector, C3Vector};
use crate::common::writer::{write_array, write_asset, Writable};
use crate::ParserError;

/// A reusable template of interior room shapes. Placed interior cells reference one of its cell
/// structures by index, many cells typically share the same structure.
#[derive(Debug, Clone, Default)]
pub struct EnvironmentAsset {
    pub id: u32,
    pub cell_structs: BTreeMap<u32, CellStruct>,
}

impl EnvironmentAsset {
    pub fn to_bytes(&self) -> Result<Vec<u8>, ParserError> {
        write_asset(b"ENVI", self)
    }
}

#[derive(Debug, Clone, Default)]
pub struct CellStruct {
    pub index: u32,
    pub vertices: BTreeMap<u16, StructVertex>,
    pub polygons: BTreeMap<u16, StructPolygon>,
}

#[derive(Debug, Clone, Default)]
pub struct StructVertex {
    pub id: u16,
    pub position: C3Vector,
    pub normal: C3Vector,
    /// UV slots, polygons pick one slot per corner.
    pub uvs: Vec<C2Vector>,
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct PolygonFlags: u8 {
        /// The polygon is a pure portal opening and has no renderable surface.
        const NO_DRAW = 0x01;
        const DOUBLE_SIDED = 0x02;
    }
}

#[derive(Debug, Clone, Default)]
pub struct StructPolygon {
    pub id: u16,
    pub flags: PolygonFlags,
    /// Index into the surface list of the placed cell, negative if the polygon has no surface.
    pub surface_index: i16,
    pub vertex_ids: Vec<u16>,
    /// One UV slot per entry of `vertex_ids`.
    pub uv_indices: Vec<u8>,
}

impl StructPolygon {
    pub fn is_renderable(&self) -> bool {
        !self.flags.contains(PolygonFlags::NO_DRAW) && self.surface_index >= 0
    }
}

impl Parseable<StructVertex> for StructVertex {
    fn parse<R: Read>(rdr: &mut R) -> Result<StructVertex, ParserError> {
        let id = u16::parse(rdr)?;
        let position = C3Vector::parse(rdr)?;
        let normal = C3Vector::parse(rdr)?;
        let uv_count = u8::parse(rdr)?;
        let uvs = read_array::<C2Vector, R>(rdr, uv_count as usize)?;

        Ok(StructVertex {
            id,
            position,
            normal,
            uvs,
        })
    }
}

impl Writable for StructVertex {
    fn write<W: Write>(&self, wtr: &mut W) -> Result<(), ParserError> {
        if self.uvs.len() > u8::MAX as usize {
            return Err(ParserError::FormatError {
                reason: "Too many UV slots on a vertex",
            });
        }

        self.id.write(wtr)?;
        self.position.write(wtr)?;
        self.normal.write(wtr)?;
        (self.uvs.len() as u8).write(wtr)?;
        write_array(wtr, &self.uvs)
    }
}

impl Parseable<StructPolygon> for StructPolygon {
    fn parse<R: Read>(rdr: &mut R) -> Result<StructPolygon, ParserError> {
        let id = u16::parse(rdr)?;
        let flags = PolygonFlags::from_bits_retain(u8::parse(rdr)?);
        let surface_index = i16::parse(rdr)?;
        let vertex_count = u8::parse(rdr)? as usize;
        let vertex_ids = read_array::<u16, R>(rdr, vertex_count)?;
        let uv_indices = read_array::<u8, R>(rdr, vertex_count)?;

        Ok(StructPolygon {
            id,
            flags,
            surface_index,
            vertex_ids,
            uv_indices,
        })
    }
}

impl Writable for StructPolygon {
    fn write<W: Write>(&self, wtr: &mut W) -> Result<(), ParserError> {
        if self.vertex_ids.len() != self.uv_indices.len() {
            return Err(ParserError::FormatError {
                reason: "Polygon UV slots do not match its vertices",
            });
        }
        if self.vertex_ids.len() > u8::MAX as usize {
            return Err(ParserError::FormatError {
                reason: "Too many vertices on a polygon",
            });
        }

        self.id.write(wtr)?;
        self.flags.bits().write(wtr)?;
        self.surface_index.write(wtr)?;
        (self.vertex_ids.len() as u8).write(wtr)?;
        write_array(wtr, &self.vertex_ids)?;
        write_array(wtr, &self.uv_indices)
    }
}

impl Parseable<CellStruct> for CellStruct {
    fn parse<R: Read>(rdr: &mut R) -> Result<CellStruct, ParserError> {
        let index = u32::parse(rdr)?;

        let vertex_count = u32::parse(rdr)? as usize;
        let mut vertices = BTreeMap::new();
        for vertex in read_array::<StructVertex, R>(rdr, vertex_count)? {
            if vertices.insert(vertex.id, vertex).is_some() {
                return Err(ParserError::FormatError {
                    reason: "Duplicate vertex id in cell struct",
                });
            }
        }

        let polygon_count = u32::parse(rdr)? as usize;
        let mut polygons = BTreeMap::new();
        for polygon in read_array::<StructPolygon, R>(rdr, polygon_count)? {
            if polygons.insert(polygon.id, polygon).is_some() {
                return Err(ParserError::FormatError {
                    reason: "Duplicate polygon id in cell struct",
                });
            }
        }

        Ok(CellStruct {
            index,
            vertices,
            polygons,
        })
    }
}

impl Writable for CellStruct {
    fn write<W: Write>(&self, wtr: &mut W) -> Result<(), ParserError> {
        self.index.write(wtr)?;
        (self.vertices.len() as u32).write(wtr)?;
        for vertex in self.vertices.values() {
            vertex.write(wtr)?;
        }
        (self.polygons.len() as u32).write(wtr)?;
        for polygon in self.polygons.values() {
            polygon.write(wtr)?;
        }
        Ok(())
    }
}

impl Parseable<EnvironmentAsset> for EnvironmentAsset {
    fn parse<R: Read>(rdr: &mut R) -> Result<EnvironmentAsset, ParserError> {
        let id = u32::parse(rdr)?;
        let struct_count = u32::parse(rdr)? as usize;
        let cell_structs = read_array::<CellStruct, R>(rdr, struct_count)?
            .into_iter()
            .map(|cell_struct| (cell_struct.index, cell_struct))
            .collect();

        Ok(EnvironmentAsset { id, cell_structs })
    }
}

impl Writable for EnvironmentAsset {
    fn write<W: Write>(&self, wtr: &mut W) -> Result<(), ParserError> {
        self.id.write(wtr)?;
        (self.cell_structs.len() as u32).write(wtr)?;
        for cell_struct in self.cell_structs.values() {
            cell_struct.write(wtr)?;
        }
        Ok(())
    }
}

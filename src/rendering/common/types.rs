use std::fmt::{Debug, Display, Formatter};
use std::sync::Arc;

use bytemuck::{Pod, Zeroable};
use glam::{Affine3A, Vec3, Vec4};

use cellstream_files::cell::types::EnvCellAsset;
use cellstream_files::surface::types::TextureAsset;

use crate::rendering::common::bounds::{Aabb, Plane};

#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct CellVertex {
    pub position: [f32; 3],
    pub normal: [f32; 3],
    pub uv: [f32; 2],
}

/// The deduplication key for GPU geometry: two cells with an equal signature render identically,
/// only their placement differs.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct GeometrySignature {
    pub environment_id: u32,
    pub structure_index: u16,
    pub surfaces: Vec<u32>,
}

impl GeometrySignature {
    pub fn of(cell: &EnvCellAsset) -> Self {
        Self {
            environment_id: cell.environment_id,
            structure_index: cell.structure_index,
            surfaces: cell.surfaces.clone(),
        }
    }
}

impl Display for GeometrySignature {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{:08X}/{} [{} surfaces]",
            self.environment_id,
            self.structure_index,
            self.surfaces.len()
        )
    }
}

/// All triangles of one cell that share a surface (material).
#[derive(Clone)]
pub struct SurfaceBatch {
    pub surface_id: u32,
    pub texture_id: Option<u32>,
    pub color: Vec4,
    pub translucent: bool,
    pub indices: Vec<u32>,
}

impl Debug for SurfaceBatch {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{{ surface_id: {:08X}, ", self.surface_id)?;
        write!(f, "texture_id: {:?}, ", self.texture_id)?;
        write!(f, "translucent: {}, ", self.translucent)?;
        write!(f, "indices: [{}] }}", self.indices.len())
    }
}

/// CPU-built geometry, ready to be uploaded. Consumed by exactly one upload.
pub struct PreparedCellGeometry {
    pub signature: GeometrySignature,
    pub vertices: Vec<CellVertex>,
    pub batches: Vec<SurfaceBatch>,
    /// Distinct textures referenced by the batches.
    pub textures: Vec<Arc<TextureAsset>>,
    pub local_bounds: Aabb,
}

impl PreparedCellGeometry {
    pub fn triangle_count(&self) -> usize {
        self.batches.iter().map(|batch| batch.indices.len() / 3).sum()
    }
}

impl Debug for PreparedCellGeometry {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{{ signature: {}, ", self.signature)?;
        write!(f, "vertices: [{}], ", self.vertices.len())?;
        write!(f, "batches: {:?}, ", self.batches)?;
        write!(f, "textures: [{}] }}", self.textures.len())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum PortalTarget {
    /// Full ID of a cell in the same landblock.
    Cell(u32),
    Outdoors,
}

/// A portal plane in the local space of the owning cell, together with the half-space that
/// belongs to the cell.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ClipPlane {
    pub plane: Plane,
    pub inside_positive: bool,
}

impl ClipPlane {
    pub fn is_inside(&self, local_position: Vec3) -> bool {
        let distance = self.plane.distance_to_point(local_position);
        if self.inside_positive {
            distance >= 0.0
        } else {
            distance <= 0.0
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CellPortal {
    pub target: PortalTarget,
    pub polygon_id: u16,
    /// [`None`] when the portal polygon is missing or degenerate, such portals have no side.
    pub clip_plane: Option<ClipPlane>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum CellClass {
    /// Part of a building, seen from the outdoor terrain.
    BuildingInterior,
    DungeonOnly,
}

/// The per-instance half of a prepared cell, the geometry is shared through the signature.
#[derive(Clone, Debug)]
pub struct PreparedCell {
    pub cell_id: u32,
    pub signature: GeometrySignature,
    pub class: CellClass,
    pub world_transform: Affine3A,
    pub local_bounds: Aabb,
    pub portals: Vec<CellPortal>,
}

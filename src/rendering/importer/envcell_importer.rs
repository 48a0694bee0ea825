use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use glam::{Affine3A, Quat, Vec3, Vec4};
use log::{debug, trace};
use thiserror::Error;

use cellstream_files::cell::types::{EnvCellAsset, PortalFlags};
use cellstream_files::common::types::{C3Vector, C4Quaternion};
use cellstream_files::environment::types::{CellStruct, PolygonFlags, StructPolygon};
use cellstream_files::ids::{cell_id, landblock_of};
use cellstream_files::surface::types::TextureAsset;

use crate::rendering::asset_graph::asset_resolver::AssetResolver;
use crate::rendering::asset_graph::resolver::AssetError;
use crate::rendering::common::bounds::{Aabb, Plane};
use crate::rendering::common::coordinate_systems::SpatialCellKey;
use crate::rendering::common::types::{
    CellClass, CellPortal, CellVertex, ClipPlane, GeometrySignature, PortalTarget, PreparedCell,
    PreparedCellGeometry, SurfaceBatch,
};

#[derive(Error, Debug)]
pub enum PrepareError {
    #[error(transparent)]
    Asset(#[from] AssetError),

    #[error("Environment {environment_id:08X} has no cell structure {structure_index}")]
    MissingStructure { environment_id: u32, structure_index: u16 },

    #[error("Cell {cell_id:08X} has no surface in slot {slot}")]
    MissingSurfaceSlot { cell_id: u32, slot: i16 },

    #[error("Polygon {polygon_id} references a vertex or UV slot that does not exist")]
    BrokenPolygon { polygon_id: u16 },

    #[error("Cell {cell_id:08X} did not produce any vertices")]
    Degenerate { cell_id: u32 },
}

/// Where a cell is being placed into the world.
#[derive(Debug, Clone, Copy)]
pub struct PlacementContext {
    pub landblock: SpatialCellKey,
}

impl PlacementContext {
    pub fn for_cell(cell: &EnvCellAsset) -> Self {
        Self {
            landblock: SpatialCellKey(landblock_of(cell.id)),
        }
    }

    pub fn world_transform(&self, position: &C3Vector, orientation: &C4Quaternion) -> Affine3A {
        Affine3A::from_rotation_translation(
            to_quat(orientation),
            self.landblock.origin() + to_vec3(position),
        )
    }
}

struct Material {
    surface_id: u32,
    texture: Option<Arc<TextureAsset>>,
    color: Vec4,
    translucent: bool,
}

#[inline]
fn to_vec3(v: &C3Vector) -> Vec3 {
    Vec3::new(v.x, v.y, v.z)
}

fn to_quat(q: &C4Quaternion) -> Quat {
    let quat = Quat::from_xyzw(q.x, q.y, q.z, q.w);
    if quat.length_squared() < 1e-6 {
        Quat::IDENTITY
    } else {
        quat.normalize()
    }
}

/// Converts interior cells from cellstream-files into prepared geometry and instance data. This is a
/// pure transformation on top of the [`AssetResolver`] and never touches the GPU, so it runs on the
/// streaming worker.
pub struct EnvCellImporter {}

impl EnvCellImporter {
    /// Prepares both halves of a cell: the shareable geometry and the per-instance data.
    pub fn prepare(
        assets: &AssetResolver,
        raw: &EnvCellAsset,
        placement: &PlacementContext,
    ) -> Result<(PreparedCell, PreparedCellGeometry), PrepareError> {
        let env = assets.environment(raw.environment_id)?;
        let structure = Self::structure_of(raw, &env.cell_structs)?;

        let geometry = Self::create_geometry(assets, raw, structure)?;
        let cell = Self::create_instance(raw, structure, placement)?;
        Ok((cell, geometry))
    }

    /// Prepares the per-instance data only, for cells whose signature has been prepared already.
    pub fn prepare_instance(
        assets: &AssetResolver,
        raw: &EnvCellAsset,
        placement: &PlacementContext,
    ) -> Result<PreparedCell, PrepareError> {
        let env = assets.environment(raw.environment_id)?;
        let structure = Self::structure_of(raw, &env.cell_structs)?;
        Self::create_instance(raw, structure, placement)
    }

    fn structure_of<'a>(raw: &EnvCellAsset, structs: &'a BTreeMap<u32, CellStruct>) -> Result<&'a CellStruct, PrepareError> {
        structs
            .get(&(raw.structure_index as u32))
            .ok_or(PrepareError::MissingStructure {
                environment_id: raw.environment_id,
                structure_index: raw.structure_index,
            })
    }

    fn create_instance(
        raw: &EnvCellAsset,
        structure: &CellStruct,
        placement: &PlacementContext,
    ) -> Result<PreparedCell, PrepareError> {
        let local_bounds = Aabb::from_points(structure.vertices.values().map(|v| to_vec3(&v.position)))
            .ok_or(PrepareError::Degenerate { cell_id: raw.id })?;

        Ok(PreparedCell {
            cell_id: raw.id,
            signature: GeometrySignature::of(raw),
            class: if raw.is_seen_outside() {
                CellClass::BuildingInterior
            } else {
                CellClass::DungeonOnly
            },
            world_transform: placement.world_transform(&raw.position, &raw.orientation),
            local_bounds,
            portals: Self::extract_portals(raw, structure),
        })
    }

    /// One portal per portal record, with the separating plane of its boundary polygon. The first
    /// three vertices define the plane, the portal side flag decides which half-space is "inside".
    pub fn extract_portals(raw: &EnvCellAsset, structure: &CellStruct) -> Vec<CellPortal> {
        let landblock = landblock_of(raw.id);

        raw.portals
            .iter()
            .map(|record| {
                let target = if record.leads_outdoors() {
                    PortalTarget::Outdoors
                } else {
                    PortalTarget::Cell(cell_id(landblock, record.other_cell_index))
                };

                let plane = structure
                    .polygons
                    .get(&record.polygon_id)
                    .and_then(|polygon| Self::polygon_plane(structure, polygon));

                if plane.is_none() {
                    debug!(
                        "Portal polygon {} of cell {:08X} is missing or degenerate",
                        record.polygon_id, raw.id
                    );
                }

                CellPortal {
                    target,
                    polygon_id: record.polygon_id,
                    clip_plane: plane.map(|plane| ClipPlane {
                        plane,
                        inside_positive: !record.flags.contains(PortalFlags::PORTAL_SIDE),
                    }),
                }
            })
            .collect()
    }

    fn polygon_plane(structure: &CellStruct, polygon: &StructPolygon) -> Option<Plane> {
        let mut corners = polygon
            .vertex_ids
            .iter()
            .take(3)
            .map(|id| structure.vertices.get(id).map(|v| to_vec3(&v.position)));

        let v0 = corners.next()??;
        let v1 = corners.next()??;
        let v2 = corners.next()??;
        Plane::from_points(v0, v1, v2)
    }

    /// Builds the deduplicated vertex list (a vertex is identified by its vertex id and UV slot) and
    /// fan-triangulates every renderable polygon. Polygons whose data cannot be resolved are skipped,
    /// only a cell without any vertex fails.
    pub fn create_geometry(
        assets: &AssetResolver,
        raw: &EnvCellAsset,
        structure: &CellStruct,
    ) -> Result<PreparedCellGeometry, PrepareError> {
        profiling::scope!("EnvCellImporter::create_geometry");

        let mut vertices: Vec<CellVertex> = Vec::new();
        let mut vertex_lookup: HashMap<(u16, u8), u32> = HashMap::new();
        let mut batches: BTreeMap<i16, SurfaceBatch> = BTreeMap::new();
        let mut textures: BTreeMap<u32, Arc<TextureAsset>> = BTreeMap::new();

        for polygon in structure.polygons.values() {
            if !polygon.is_renderable() {
                continue;
            }

            if polygon.vertex_ids.len() < 3 {
                trace!("Polygon {} of cell {:08X} has less than 3 vertices", polygon.id, raw.id);
                continue;
            }

            let (material, corners) = match Self::resolve_material(assets, raw, polygon.surface_index)
                .and_then(|material| Ok((material, Self::collect_corners(structure, polygon)?)))
            {
                Ok(resolved) => resolved,
                Err(err) => {
                    debug!("Skipping polygon {} of cell {:08X}: {}", polygon.id, raw.id, err);
                    continue;
                }
            };

            let mut indices = Vec::with_capacity(corners.len());
            for (key, vertex) in corners {
                let index = match vertex_lookup.get(&key) {
                    Some(index) => *index,
                    None => {
                        vertices.push(vertex);
                        let index = (vertices.len() - 1) as u32;
                        vertex_lookup.insert(key, index);
                        index
                    }
                };
                indices.push(index);
            }

            if let Some(texture) = &material.texture {
                textures
                    .entry(texture.id)
                    .or_insert_with(|| texture.clone());
            }

            let batch = batches
                .entry(polygon.surface_index)
                .or_insert_with(|| SurfaceBatch {
                    surface_id: material.surface_id,
                    texture_id: material.texture.as_ref().map(|texture| texture.id),
                    color: material.color,
                    translucent: material.translucent,
                    indices: Vec::new(),
                });

            let double_sided = polygon.flags.contains(PolygonFlags::DOUBLE_SIDED);
            for i in 1..indices.len() - 1 {
                batch
                    .indices
                    .extend_from_slice(&[indices[0], indices[i], indices[i + 1]]);
                if double_sided {
                    batch
                        .indices
                        .extend_from_slice(&[indices[0], indices[i + 1], indices[i]]);
                }
            }
        }

        if vertices.is_empty() {
            return Err(PrepareError::Degenerate { cell_id: raw.id });
        }

        let local_bounds = Aabb::from_points(vertices.iter().map(|v| Vec3::from_array(v.position)))
            .ok_or(PrepareError::Degenerate { cell_id: raw.id })?;

        Ok(PreparedCellGeometry {
            signature: GeometrySignature::of(raw),
            vertices,
            batches: batches.into_values().collect(),
            textures: textures.into_values().collect(),
            local_bounds,
        })
    }

    fn resolve_material(assets: &AssetResolver, raw: &EnvCellAsset, slot: i16) -> Result<Material, PrepareError> {
        let surface_id = *raw
            .surfaces
            .get(slot as usize)
            .ok_or(PrepareError::MissingSurfaceSlot { cell_id: raw.id, slot })?;
        let surface = assets.surface(surface_id)?;

        let texture = if surface.has_texture() {
            Some(assets.texture(surface.texture_id)?)
        } else {
            None
        };

        let mut color = Vec4::new(
            surface.color.r as f32 / 255.0,
            surface.color.g as f32 / 255.0,
            surface.color.b as f32 / 255.0,
            surface.color.a as f32 / 255.0,
        );
        color.w *= 1.0 - surface.translucency.clamp(0.0, 1.0);

        Ok(Material {
            surface_id,
            texture,
            color,
            translucent: surface.is_translucent(),
        })
    }

    fn collect_corners(structure: &CellStruct, polygon: &StructPolygon) -> Result<Vec<((u16, u8), CellVertex)>, PrepareError> {
        polygon
            .vertex_ids
            .iter()
            .enumerate()
            .map(|(corner, vertex_id)| {
                let vertex = structure.vertices.get(vertex_id).ok_or(PrepareError::BrokenPolygon {
                    polygon_id: polygon.id,
                })?;
                let slot = polygon.uv_indices.get(corner).copied().unwrap_or(0);

                let uv = match vertex.uvs.get(slot as usize) {
                    Some(uv) => [uv.x, uv.y],
                    None if vertex.uvs.is_empty() => [0.0, 0.0],
                    None => {
                        return Err(PrepareError::BrokenPolygon {
                            polygon_id: polygon.id,
                        });
                    }
                };

                Ok((
                    (*vertex_id, slot),
                    CellVertex {
                        position: to_vec3(&vertex.position).to_array(),
                        normal: to_vec3(&vertex.normal).to_array(),
                        uv,
                    },
                ))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::archive::loader::MemoryArchive;
    use cellstream_files::cell::types::{CellPortalRecord, EnvCellFlags};
    use cellstream_files::common::types::{C2Vector, CArgb};
    use cellstream_files::environment::types::{EnvironmentAsset, StructVertex};
    use cellstream_files::ids::{OUTDOORS_CELL_INDEX, environment_id, surface_id};
    use cellstream_files::surface::types::{SurfaceAsset, SurfaceFlags};

    fn vertex(id: u16, x: f32, y: f32, z: f32, uv_slots: usize) -> (u16, StructVertex) {
        (
            id,
            StructVertex {
                id,
                position: C3Vector::new(x, y, z),
                normal: C3Vector::new(0.0, 0.0, 1.0),
                uvs: (0..uv_slots).map(|i| C2Vector::new(i as f32, 0.0)).collect(),
            },
        )
    }

    fn polygon(id: u16, surface_index: i16, vertex_ids: Vec<u16>, uv_indices: Vec<u8>, flags: PolygonFlags) -> (u16, StructPolygon) {
        (
            id,
            StructPolygon {
                id,
                flags,
                surface_index,
                vertex_ids,
                uv_indices,
            },
        )
    }

    /// A floor quad (two UV slots on vertex 0), a triangle with a broken surface slot, and a portal
    /// opening in the x = 4 wall.
    fn structure() -> CellStruct {
        CellStruct {
            index: 0,
            vertices: BTreeMap::from([
                vertex(0, 0.0, 0.0, 0.0, 2),
                vertex(1, 4.0, 0.0, 0.0, 1),
                vertex(2, 4.0, 4.0, 0.0, 1),
                vertex(3, 0.0, 4.0, 0.0, 1),
                vertex(4, 4.0, 0.0, 3.0, 0),
                vertex(5, 4.0, 4.0, 3.0, 0),
            ]),
            polygons: BTreeMap::from([
                polygon(0, 0, vec![0, 1, 2, 3], vec![0, 0, 0, 0], PolygonFlags::empty()),
                polygon(1, 0, vec![0, 2, 3], vec![1, 0, 0], PolygonFlags::empty()),
                polygon(2, 5, vec![1, 2, 3], vec![0, 0, 0], PolygonFlags::empty()),
                polygon(3, -1, vec![1, 4, 5, 2], vec![0, 0, 0, 0], PolygonFlags::NO_DRAW),
            ]),
        }
    }

    fn raw_cell() -> EnvCellAsset {
        EnvCellAsset {
            id: cell_id(0x0203, 0x0100),
            flags: EnvCellFlags::empty(),
            environment_id: environment_id(1),
            structure_index: 0,
            position: C3Vector::new(10.0, 20.0, -5.0),
            orientation: C4Quaternion::IDENTITY,
            surfaces: vec![surface_id(1)],
            portals: vec![
                CellPortalRecord {
                    other_cell_index: 0x0101,
                    polygon_id: 3,
                    flags: PortalFlags::empty(),
                },
                CellPortalRecord {
                    other_cell_index: OUTDOORS_CELL_INDEX,
                    polygon_id: 42,
                    flags: PortalFlags::PORTAL_SIDE,
                },
            ],
            static_objects: vec![],
        }
    }

    fn assets() -> AssetResolver {
        let archive = Arc::new(MemoryArchive::new());
        let env = EnvironmentAsset {
            id: environment_id(1),
            cell_structs: BTreeMap::from([(0, structure())]),
        };
        archive.insert(env.id, env.to_bytes().unwrap());

        let surface = SurfaceAsset {
            id: surface_id(1),
            flags: SurfaceFlags::BASE_COLOR,
            color: CArgb::from(0xFF80_8080),
            ..Default::default()
        };
        archive.insert(surface.id, surface.to_bytes().unwrap());
        AssetResolver::new(archive)
    }

    #[test]
    fn deduplicates_vertices_by_id_and_uv_slot() {
        let (cell, geometry) =
            EnvCellImporter::prepare(&assets(), &raw_cell(), &PlacementContext::for_cell(&raw_cell())).unwrap();

        // 4 corners of the quad + vertex 0 with its second UV slot; the broken polygon and the
        // portal opening contribute nothing.
        assert_eq!(geometry.vertices.len(), 5);
        assert_eq!(geometry.batches.len(), 1);
        assert_eq!(geometry.triangle_count(), 3);
        assert_eq!(geometry.batches[0].indices[..6], [0, 1, 2, 0, 2, 3]);
        assert_eq!(geometry.batches[0].indices[6..], [4, 2, 3]);
        assert_eq!(geometry.local_bounds, Aabb::new(Vec3::ZERO, Vec3::new(4.0, 4.0, 0.0)));
        assert!(!geometry.batches[0].translucent);

        assert_eq!(cell.class, CellClass::DungeonOnly);
        assert_eq!(cell.local_bounds, Aabb::new(Vec3::ZERO, Vec3::new(4.0, 4.0, 3.0)));
        assert_eq!(
            cell.world_transform.translation,
            (SpatialCellKey(0x0203).origin() + Vec3::new(10.0, 20.0, -5.0)).into()
        );
    }

    #[test]
    fn portal_planes() {
        let cell = EnvCellImporter::prepare_instance(&assets(), &raw_cell(), &PlacementContext::for_cell(&raw_cell()))
            .unwrap();
        assert_eq!(cell.portals.len(), 2);

        let door = &cell.portals[0];
        assert_eq!(door.target, PortalTarget::Cell(0x0203_0101));
        let clip = door.clip_plane.unwrap();
        // (1 -> 4 -> 5): e1 = +z, e2 = (0, 4, 3) => normal = -x
        assert!(clip.plane.normal.abs_diff_eq(-Vec3::X, 1e-6));
        assert_eq!(clip.plane.distance, 4.0);
        assert!(clip.inside_positive);
        assert!(clip.is_inside(Vec3::new(2.0, 2.0, 1.0)));
        assert!(!clip.is_inside(Vec3::new(6.0, 2.0, 1.0)));

        let exit = &cell.portals[1];
        assert_eq!(exit.target, PortalTarget::Outdoors);
        assert!(exit.clip_plane.is_none());
    }

    #[test]
    fn missing_surfaces_shrink_the_mesh() {
        let mut raw = raw_cell();
        raw.surfaces = vec![surface_id(99)];
        let result = EnvCellImporter::prepare(&assets(), &raw, &PlacementContext::for_cell(&raw));
        assert!(matches!(result, Err(PrepareError::Degenerate { .. })));
    }

    #[test]
    fn missing_structure_fails_the_cell() {
        let mut raw = raw_cell();
        raw.structure_index = 7;
        let result = EnvCellImporter::prepare(&assets(), &raw, &PlacementContext::for_cell(&raw));
        assert!(matches!(
            result,
            Err(PrepareError::MissingStructure { structure_index: 7, .. })
        ));
    }
}

//! A deterministic synthetic world, for running the streaming without any game data.
//!
//! Every landblock gets a small building (rooms that are seen from outside) and a dungeon (a chain
//! of underground rooms). Rooms are boxes that are chained along +X, the walls between two rooms
//! are portal openings and the first room of each chain has an exit to the outdoors.
use std::collections::{BTreeMap, HashMap};

use glam::{Affine3A, Vec3};
use log::debug;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use cellstream_files::ParserError;
use cellstream_files::cell::types::{
    CellPortalRecord, EnvCellAsset, EnvCellFlags, LandblockInfoAsset, PortalFlags, StaticObjectDef,
};
use cellstream_files::common::types::{C2Vector, C3Vector, C4Quaternion, CArgb};
use cellstream_files::environment::types::{CellStruct, EnvironmentAsset, PolygonFlags, StructPolygon, StructVertex};
use cellstream_files::ids::{
    FIRST_INTERIOR_CELL, OUTDOORS_CELL_INDEX, cell_id, environment_id, landblock_info_id, surface_id, texture_id,
};
use cellstream_files::surface::types::{SurfaceAsset, SurfaceFlags, TextureAsset, TextureFormat};

use crate::game::placement::{PlacementCategory, PlacementStore, StaticPlacement};
use crate::io::archive::loader::MemoryArchive;
use crate::rendering::common::coordinate_systems::SpatialCellKey;

const ENVIRONMENT: u32 = 1;
/// Polygon ids of the two portal walls, shared by all structures.
const WEST_WALL: u16 = 4;
const EAST_WALL: u16 = 5;
const SURFACES: u32 = 4;

/// (half width, half depth, height)
const STRUCTURES: [(f32, f32, f32); 2] = [(5.0, 5.0, 4.0), (8.0, 6.0, 5.0)];

pub struct SyntheticWorldBuilder {
    seed: u64,
    landblocks: usize,
    origin: SpatialCellKey,
    dungeon_rooms: (usize, usize),
    building_rooms: usize,
}

impl SyntheticWorldBuilder {
    pub fn seed(self, seed: u64) -> Self {
        Self { seed, ..self }
    }

    /// Number of landblocks, placed in a row along +X.
    pub fn landblocks(self, landblocks: usize) -> Self {
        Self { landblocks, ..self }
    }

    pub fn origin(self, origin: SpatialCellKey) -> Self {
        Self { origin, ..self }
    }

    pub fn build(self) -> Result<SyntheticWorld, ParserError> {
        let mut rng = StdRng::seed_from_u64(self.seed);
        let mut world = SyntheticWorld {
            assets: BTreeMap::new(),
            landblocks: Vec::new(),
            cells: HashMap::new(),
            rooms: Vec::new(),
            placements: Vec::new(),
        };

        world.insert(environment_id(ENVIRONMENT), environment().to_bytes()?);
        for index in 1..=SURFACES {
            let surface = surface(index);
            world.insert(surface.id, surface.to_bytes()?);
        }
        for index in 1..=2 {
            world.insert(texture_id(index), checkerboard(texture_id(index), index as u8).to_bytes()?);
        }

        for i in 0..self.landblocks {
            let Some(key) = SpatialCellKey::from_grid(self.origin.x() as i32 + i as i32, self.origin.y() as i32) else {
                break;
            };

            let mut next_index = FIRST_INTERIOR_CELL;
            let building = world.add_chain(&mut rng, key, &mut next_index, self.building_rooms, true)?;
            let dungeon_rooms = rng.random_range(self.dungeon_rooms.0..=self.dungeon_rooms.1);
            let dungeon = world.add_chain(&mut rng, key, &mut next_index, dungeon_rooms, false)?;

            let cell_count = (building + dungeon) as u32;
            let info = LandblockInfoAsset {
                id: landblock_info_id(key.0),
                cell_count,
            };
            world.insert(info.id, info.to_bytes()?);
            world.cells.insert(key, cell_count as usize);
            world.landblocks.push(key);
        }

        debug!(
            "Generated {} landblocks with {} cells and {} assets",
            world.landblocks.len(),
            world.rooms.len(),
            world.assets.len()
        );
        Ok(world)
    }
}

pub struct SyntheticWorld {
    assets: BTreeMap<u32, Vec<u8>>,
    landblocks: Vec<SpatialCellKey>,
    cells: HashMap<SpatialCellKey, usize>,
    /// World space room centers, in generation order.
    rooms: Vec<(u32, Vec3)>,
    placements: Vec<(SpatialCellKey, StaticPlacement)>,
}

impl SyntheticWorld {
    pub fn builder() -> SyntheticWorldBuilder {
        SyntheticWorldBuilder {
            seed: 0,
            landblocks: 4,
            origin: SpatialCellKey::new(100, 100),
            dungeon_rooms: (3, 6),
            building_rooms: 2,
        }
    }

    fn insert(&mut self, id: u32, data: Vec<u8>) {
        self.assets.insert(id, data);
    }

    /// Adds a chain of rooms along +X, returns the number of rooms.
    fn add_chain(
        &mut self,
        rng: &mut StdRng,
        key: SpatialCellKey,
        next_index: &mut u16,
        rooms: usize,
        seen_outside: bool,
    ) -> Result<usize, ParserError> {
        let (y, z) = if seen_outside { (48.0, 0.0) } else { (140.0, -30.0) };
        let mut x = 20.0;
        let first = *next_index;

        for room in 0..rooms {
            let index = first + room as u16;
            let structure = rng.random_range(0..STRUCTURES.len());
            let (half_width, _, height) = STRUCTURES[structure];
            x += half_width;

            let west = if room == 0 { OUTDOORS_CELL_INDEX } else { index - 1 };
            let mut portals = vec![CellPortalRecord {
                other_cell_index: west,
                polygon_id: WEST_WALL,
                flags: PortalFlags::EXACT_MATCH,
            }];
            if room + 1 < rooms {
                portals.push(CellPortalRecord {
                    other_cell_index: index + 1,
                    polygon_id: EAST_WALL,
                    flags: PortalFlags::EXACT_MATCH,
                });
            }

            let static_objects = (0..rng.random_range(0..=2))
                .map(|_| StaticObjectDef {
                    model_id: 0x0200_0000 | rng.random_range(1..=16u32),
                    position: C3Vector {
                        x: x + rng.random_range(-2.0f32..2.0),
                        y: y + rng.random_range(-2.0f32..2.0),
                        z,
                    },
                    orientation: C4Quaternion::IDENTITY,
                })
                .collect();

            let cell = EnvCellAsset {
                id: cell_id(key.0, index),
                flags: if seen_outside {
                    EnvCellFlags::SEEN_OUTSIDE
                } else {
                    EnvCellFlags::empty()
                },
                environment_id: environment_id(ENVIRONMENT),
                structure_index: structure as u16,
                position: C3Vector { x, y, z },
                orientation: C4Quaternion::IDENTITY,
                surfaces: vec![
                    surface_id(rng.random_range(1..=SURFACES)),
                    surface_id(rng.random_range(1..=2)),
                ],
                portals,
                static_objects,
            };

            let center = key.origin() + Vec3::new(x, y, z + height * 0.5);
            if seen_outside {
                self.placements.push((
                    key,
                    StaticPlacement {
                        model_id: 0x0200_0100,
                        owner_cell: cell.id,
                        category: PlacementCategory::InteriorSurface,
                        transform: Affine3A::from_translation(center),
                    },
                ));
            }

            self.insert(cell.id, cell.to_bytes()?);
            self.rooms.push((cell.id, center));
            x += half_width;
        }

        *next_index = first + rooms as u16;
        Ok(rooms)
    }

    pub fn landblocks(&self) -> &[SpatialCellKey] {
        &self.landblocks
    }

    pub fn cells_in(&self, key: SpatialCellKey) -> usize {
        self.cells.get(&key).copied().unwrap_or(0)
    }

    /// Room centers in world space, in the order they have been generated.
    pub fn rooms(&self) -> &[(u32, Vec3)] {
        &self.rooms
    }

    /// Center of the first dungeon room, a good place to start.
    pub fn spawn_point(&self) -> Vec3 {
        self.rooms
            .iter()
            .find(|(_, center)| center.z < 0.0)
            .or(self.rooms.first())
            .map_or(Vec3::ZERO, |(_, center)| *center)
    }

    pub fn archive(&self) -> MemoryArchive {
        let archive = MemoryArchive::new();
        for (id, data) in &self.assets {
            archive.insert(*id, data.clone());
        }
        archive
    }

    /// Hands the placements of the document over to the store.
    pub fn populate(&self, store: &PlacementStore) {
        for (key, placement) in &self.placements {
            store.insert(*key, placement.clone());
        }
    }
}

fn environment() -> EnvironmentAsset {
    let cell_structs = STRUCTURES
        .iter()
        .enumerate()
        .map(|(index, (half_width, half_depth, height))| {
            (index as u32, room(index as u32, *half_width, *half_depth, *height))
        })
        .collect();

    EnvironmentAsset {
        id: environment_id(ENVIRONMENT),
        cell_structs,
    }
}

/// A box, with its origin at the center of the floor. Vertex ids encode the corner: bit 2 is +X,
/// bit 1 is +Y and bit 0 is the ceiling.
fn room(index: u32, half_width: f32, half_depth: f32, height: f32) -> CellStruct {
    let vertices = (0..8u16)
        .map(|id| {
            let position = C3Vector {
                x: if id & 4 != 0 { half_width } else { -half_width },
                y: if id & 2 != 0 { half_depth } else { -half_depth },
                z: if id & 1 != 0 { height } else { 0.0 },
            };
            let vertex = StructVertex {
                id,
                position,
                normal: C3Vector {
                    x: 0.0,
                    y: 0.0,
                    z: 1.0,
                },
                uvs: vec![C2Vector::new(
                    if id & 4 != 0 { 1.0 } else { 0.0 },
                    if id & 3 != 0 { 1.0 } else { 0.0 },
                )],
            };
            (id, vertex)
        })
        .collect();

    // The portal walls are wound so that their normals point into the room.
    let polygons = [
        (0, 1, PolygonFlags::empty(), [0, 4, 6, 2]),
        (1, 1, PolygonFlags::empty(), [1, 3, 7, 5]),
        (2, 0, PolygonFlags::empty(), [0, 1, 5, 4]),
        (3, 0, PolygonFlags::DOUBLE_SIDED, [2, 6, 7, 3]),
        (WEST_WALL, -1, PolygonFlags::NO_DRAW, [0, 2, 3, 1]),
        (EAST_WALL, -1, PolygonFlags::NO_DRAW, [4, 5, 7, 6]),
    ]
    .into_iter()
    .map(|(id, surface_index, flags, vertex_ids)| {
        let polygon = StructPolygon {
            id,
            flags,
            surface_index,
            vertex_ids: vertex_ids.to_vec(),
            uv_indices: vec![0; 4],
        };
        (id, polygon)
    })
    .collect();

    CellStruct {
        index,
        vertices,
        polygons,
    }
}

fn surface(index: u32) -> SurfaceAsset {
    match index {
        1 | 2 => SurfaceAsset {
            id: surface_id(index),
            flags: SurfaceFlags::BASE_IMAGE,
            color: CArgb::default(),
            translucency: 0.0,
            texture_id: texture_id(index),
        },
        3 => SurfaceAsset {
            id: surface_id(index),
            flags: SurfaceFlags::BASE_COLOR | SurfaceFlags::TRANSLUCENT,
            color: CArgb {
                r: 120,
                g: 160,
                b: 255,
                a: 255,
            },
            translucency: 0.5,
            texture_id: 0,
        },
        _ => SurfaceAsset {
            id: surface_id(index),
            flags: SurfaceFlags::BASE_COLOR,
            color: CArgb {
                r: 200,
                g: 180,
                b: 140,
                a: 255,
            },
            translucency: 0.0,
            texture_id: 0,
        },
    }
}

fn checkerboard(id: u32, tint: u8) -> TextureAsset {
    const SIZE: u32 = 8;
    let data = (0..SIZE * SIZE)
        .flat_map(|i| {
            let light = ((i % SIZE) + (i / SIZE)) % 2 == 0;
            let value = if light { 220 } else { 40 };
            [value, value / tint, value, 255]
        })
        .collect();

    TextureAsset {
        id,
        width: SIZE,
        height: SIZE,
        format: TextureFormat::Rgba8,
        data,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::common::loader::RawAssetLoader;

    #[test]
    fn same_seed_same_world() {
        let a = SyntheticWorld::builder().seed(11).build().unwrap();
        let b = SyntheticWorld::builder().seed(11).build().unwrap();
        assert_eq!(a.assets, b.assets);
        assert_eq!(a.landblocks().len(), 4);
    }

    #[test]
    fn every_cell_is_in_the_archive() {
        let world = SyntheticWorld::builder().seed(5).landblocks(2).build().unwrap();
        let archive = world.archive();

        for key in world.landblocks() {
            assert!(archive.contains(landblock_info_id(key.0)));
            for index in 0..world.cells_in(*key) {
                assert!(archive.contains(cell_id(key.0, FIRST_INTERIOR_CELL + index as u16)));
            }
        }
        assert_eq!(
            world.rooms().len(),
            world.landblocks().iter().map(|key| world.cells_in(*key)).sum::<usize>()
        );
        assert!(world.spawn_point().z < 0.0);
    }
}

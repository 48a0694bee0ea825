use dashmap::DashMap;
use glam::{Affine3A, Vec3};
use log::trace;

use cellstream_files::cell::types::{EnvCellAsset, StaticObjectDef};

use crate::rendering::common::coordinate_systems::SpatialCellKey;
use crate::rendering::importer::envcell_importer::PlacementContext;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PlacementCategory {
    /// Inside of a cell that is never seen from outdoors.
    Underground,
    /// Inside of a building that can be seen from outdoors.
    InteriorSurface,
}

/// A placed static object (furniture etc.) that belongs to an interior cell.
#[derive(Debug, Clone, PartialEq)]
pub struct StaticPlacement {
    pub model_id: u32,
    pub owner_cell: u32,
    pub category: PlacementCategory,
    pub transform: Affine3A,
}

impl StaticPlacement {
    /// Places a static object that is embedded into `owner`.
    pub fn embedded(owner: &EnvCellAsset, object: &StaticObjectDef) -> Self {
        Self {
            model_id: object.model_id,
            owner_cell: owner.id,
            category: if owner.is_seen_outside() {
                PlacementCategory::InteriorSurface
            } else {
                PlacementCategory::Underground
            },
            transform: PlacementContext::for_cell(owner).world_transform(&object.position, &object.orientation),
        }
    }

    pub fn position(&self) -> Vec3 {
        self.transform.translation.into()
    }
}

/// The static objects per landblock. Written by whoever owns the placements (document or streaming
/// worker), read by the streaming worker when a landblock is loaded.
#[derive(Default)]
pub struct PlacementStore {
    placements: DashMap<SpatialCellKey, Vec<StaticPlacement>>,
}

impl PlacementStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, key: SpatialCellKey, placement: StaticPlacement) {
        self.placements.entry(key).or_default().push(placement);
    }

    /// Replaces all placements of a landblock.
    pub fn replace(&self, key: SpatialCellKey, placements: Vec<StaticPlacement>) {
        trace!("Storing {} placements for {}", placements.len(), key);
        self.placements.insert(key, placements);
    }

    pub fn placements_of(&self, key: SpatialCellKey) -> Vec<StaticPlacement> {
        self.placements
            .get(&key)
            .map(|placements| placements.value().clone())
            .unwrap_or_default()
    }

    pub fn contains(&self, key: SpatialCellKey) -> bool {
        self.placements.contains_key(&key)
    }

    pub fn remove(&self, key: SpatialCellKey) -> Vec<StaticPlacement> {
        self.placements
            .remove(&key)
            .map(|(_, placements)| placements)
            .unwrap_or_default()
    }

    /// Total number of placements over all landblocks.
    pub fn len(&self) -> usize {
        self.placements.iter().map(|entry| entry.value().len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

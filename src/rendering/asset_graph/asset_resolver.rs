use std::sync::Arc;

use dashmap::DashSet;
use log::{trace, warn};
use quick_cache::Weighter;
use quick_cache::sync::Cache;

use cellstream_files::cell::reader::CellReader;
use cellstream_files::cell::types::{EnvCellAsset, LandblockInfoAsset};
use cellstream_files::environment::types::EnvironmentAsset;
use cellstream_files::ids::landblock_info_id;
use cellstream_files::surface::reader::SurfaceReader;
use cellstream_files::surface::types::{SurfaceAsset, TextureAsset};

use crate::io::common::loader::RawAssetLoader;
use crate::rendering::asset_graph::generators::{AssetGenerator, load_parsed};
use crate::rendering::asset_graph::resolver::{AssetError, Resolver};
use crate::rendering::common::coordinate_systems::SpatialCellKey;

pub const DEFAULT_TEXTURE_BUDGET: u64 = 256 * 1024 * 1024;

#[derive(Clone)]
struct TextureWeighter;

impl Weighter<u32, Arc<TextureAsset>> for TextureWeighter {
    fn weight(&self, _key: &u32, val: &Arc<TextureAsset>) -> u64 {
        val.data.len().max(1) as u64
    }
}

/// Resolves numeric IDs into parsed assets for the geometry preparation.
///
/// Environments and surfaces are shared by many cells and stay cached, decoded textures are kept in
/// a cache that is bounded by their byte size. Interior cells and landblock infos are only read
/// once per load and are not cached. Every kind of asset remembers the IDs that failed to resolve.
pub struct AssetResolver {
    loader: Arc<dyn RawAssetLoader>,
    environments: Resolver<AssetGenerator, EnvironmentAsset>,
    surfaces: Resolver<AssetGenerator, SurfaceAsset>,
    textures: Cache<u32, Arc<TextureAsset>, TextureWeighter>,
    failures: DashSet<u32>,
}

impl AssetResolver {
    pub fn new(loader: Arc<dyn RawAssetLoader>) -> Self {
        Self::with_texture_budget(loader, DEFAULT_TEXTURE_BUDGET)
    }

    pub fn with_texture_budget(loader: Arc<dyn RawAssetLoader>, texture_budget: u64) -> Self {
        Self {
            environments: Resolver::new(AssetGenerator::new(loader.clone())),
            surfaces: Resolver::new(AssetGenerator::new(loader.clone())),
            textures: Cache::with_weighter(256, texture_budget, TextureWeighter),
            failures: DashSet::new(),
            loader,
        }
    }

    pub fn environment(&self, id: u32) -> Result<Arc<EnvironmentAsset>, AssetError> {
        self.environments.resolve(id)
    }

    pub fn surface(&self, id: u32) -> Result<Arc<SurfaceAsset>, AssetError> {
        self.surfaces.resolve(id)
    }

    pub fn texture(&self, id: u32) -> Result<Arc<TextureAsset>, AssetError> {
        if self.failures.contains(&id) {
            return Err(AssetError::KnownBad(id));
        }

        self.textures
            .get_or_insert_with(&id, || {
                load_parsed(
                    self.loader.as_ref(),
                    id,
                    SurfaceReader::parse_texture,
                    |texture| texture.id,
                )
                .map(Arc::new)
            })
            .inspect_err(|err| self.remember_failure(id, err))
    }

    pub fn env_cell(&self, id: u32) -> Result<EnvCellAsset, AssetError> {
        if self.failures.contains(&id) {
            return Err(AssetError::KnownBad(id));
        }

        load_parsed(
            self.loader.as_ref(),
            id,
            CellReader::parse_env_cell,
            |cell| cell.id,
        )
        .inspect_err(|err| self.remember_failure(id, err))
    }

    /// A landblock without info record has no interior cells, that is not a failure.
    pub fn landblock_info(&self, key: SpatialCellKey) -> Result<Option<LandblockInfoAsset>, AssetError> {
        let id = landblock_info_id(key.0);
        if !self.loader.contains(id) {
            trace!("Landblock {} has no interiors", key);
            return Ok(None);
        }

        if self.failures.contains(&id) {
            return Err(AssetError::KnownBad(id));
        }

        load_parsed(
            self.loader.as_ref(),
            id,
            CellReader::parse_landblock_info,
            |info| info.id,
        )
        .map(Some)
        .inspect_err(|err| self.remember_failure(id, err))
    }

    fn remember_failure(&self, id: u32, err: &AssetError) {
        if !matches!(err, AssetError::KnownBad(_)) {
            warn!("Failed to resolve {:08X}: {}", id, err);
            self.failures.insert(id);
        }
    }

    pub fn is_known_bad(&self, id: u32) -> bool {
        self.failures.contains(&id) || self.environments.is_known_bad(id) || self.surfaces.is_known_bad(id)
    }

    pub fn failure_count(&self) -> usize {
        self.failures.len() + self.environments.failure_count() + self.surfaces.failure_count()
    }

    pub fn cached_environments(&self) -> usize {
        self.environments.len()
    }

    pub fn cached_texture_bytes(&self) -> u64 {
        self.textures.weight()
    }
}

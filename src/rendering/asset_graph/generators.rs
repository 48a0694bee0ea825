use std::io::Cursor;
use std::sync::Arc;

use cellstream_files::environment::reader::EnvironmentReader;
use cellstream_files::environment::types::EnvironmentAsset;
use cellstream_files::surface::reader::SurfaceReader;
use cellstream_files::surface::types::SurfaceAsset;
use cellstream_files::ParserError;

use crate::io::common::loader::RawAssetLoader;
use crate::rendering::asset_graph::resolver::{AssetError, GraphNodeGenerator};

/// Loads and parses a single asset, checking that the asset is the one that was asked for.
pub fn load_parsed<T, F, I>(loader: &dyn RawAssetLoader, id: u32, parse: F, id_of: I) -> Result<T, AssetError>
where
    F: FnOnce(&mut Cursor<Vec<u8>>) -> Result<T, ParserError>,
    I: FnOnce(&T) -> u32,
{
    let buf = loader.load_raw_owned(id).ok_or(AssetError::NotFound(id))?;
    let asset = parse(&mut Cursor::new(buf)).map_err(|source| AssetError::Malformed { id, source })?;

    if id_of(&asset) != id {
        return Err(AssetError::Malformed {
            id,
            source: ParserError::FormatError {
                reason: "The asset ID does not match the requested ID",
            },
        });
    }

    Ok(asset)
}

pub struct AssetGenerator {
    loader: Arc<dyn RawAssetLoader>,
}

impl AssetGenerator {
    pub fn new(loader: Arc<dyn RawAssetLoader>) -> Self {
        Self { loader }
    }
}

impl GraphNodeGenerator<EnvironmentAsset> for AssetGenerator {
    fn generate(&self, id: u32) -> Result<Arc<EnvironmentAsset>, AssetError> {
        load_parsed(
            self.loader.as_ref(),
            id,
            EnvironmentReader::parse_asset,
            |env| env.id,
        )
        .map(Arc::new)
    }
}

impl GraphNodeGenerator<SurfaceAsset> for AssetGenerator {
    fn generate(&self, id: u32) -> Result<Arc<SurfaceAsset>, AssetError> {
        load_parsed(
            self.loader.as_ref(),
            id,
            SurfaceReader::parse_surface,
            |surface| surface.id,
        )
        .map(Arc::new)
    }
}

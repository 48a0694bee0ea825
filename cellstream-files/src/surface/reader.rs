use std::io::Read;

use crate::common::reader::{get_mandatory_chunk_by_name, read_asset_chunks};
use crate::surface::types::{SurfaceAsset, TextureAsset};
use crate::ParserError;

pub struct SurfaceReader {}

impl SurfaceReader {
    pub fn parse_surface<R: Read>(rdr: &mut R) -> Result<SurfaceAsset, ParserError> {
        let chunk_list = read_asset_chunks(rdr)?;
        get_mandatory_chunk_by_name::<SurfaceAsset>(&chunk_list, "SURF")
    }

    pub fn parse_texture<R: Read>(rdr: &mut R) -> Result<TextureAsset, ParserError> {
        let chunk_list = read_asset_chunks(rdr)?;
        get_mandatory_chunk_by_name::<TextureAsset>(&chunk_list, "TXTR")
    }
}

use std::io::Read;

use crate::cell::types::{EnvCellAsset, LandblockInfoAsset};
use crate::common::reader::{get_mandatory_chunk_by_name, read_asset_chunks};
use crate::ParserError;

pub struct CellReader {}

impl CellReader {
    pub fn parse_env_cell<R: Read>(rdr: &mut R) -> Result<EnvCellAsset, ParserError> {
        let chunk_list = read_asset_chunks(rdr)?;
        get_mandatory_chunk_by_name::<EnvCellAsset>(&chunk_list, "CELL")
    }

    pub fn parse_landblock_info<R: Read>(rdr: &mut R) -> Result<LandblockInfoAsset, ParserError> {
        let chunk_list = read_asset_chunks(rdr)?;
        get_mandatory_chunk_by_name::<LandblockInfoAsset>(&chunk_list, "LBIN")
    }
}

use std::io::Read;

use crate::common::reader::{get_mandatory_chunk_by_name, read_asset_chunks};
use crate::environment::types::EnvironmentAsset;
use crate::ParserError;

pub struct EnvironmentReader {}

impl EnvironmentReader {
    pub fn parse_asset<R: Read>(rdr: &mut R) -> Result<EnvironmentAsset, ParserError> {
        let chunk_list = read_asset_chunks(rdr)?;
        get_mandatory_chunk_by_name::<EnvironmentAsset>(&chunk_list, "ENVI")
    }
}

use std::io::ErrorKind::UnexpectedEof;
use std::io::Read;

use byteorder::{LittleEndian, ReadBytesExt};

use crate::common::types::{C2Vector, C3Vector, C4Quaternion, CArgb, CVerChunk, IffChunk};
use crate::ParserError;

pub(crate) trait Parseable<T> {
    fn parse<R: Read>(rdr: &mut R) -> Result<T, ParserError>;
}

impl Parseable<C3Vector> for C3Vector {
    fn parse<R: Read>(rdr: &mut R) -> Result<C3Vector, ParserError> {
        Ok(C3Vector {
            x: rdr.read_f32::<LittleEndian>()?,
            y: rdr.read_f32::<LittleEndian>()?,
            z: rdr.read_f32::<LittleEndian>()?,
        })
    }
}

impl Parseable<C2Vector> for C2Vector {
    fn parse<R: Read>(rdr: &mut R) -> Result<C2Vector, ParserError> {
        Ok(C2Vector {
            x: rdr.read_f32::<LittleEndian>()?,
            y: rdr.read_f32::<LittleEndian>()?,
        })
    }
}

impl Parseable<C4Quaternion> for C4Quaternion {
    fn parse<R: Read>(rdr: &mut R) -> Result<C4Quaternion, ParserError> {
        Ok(C4Quaternion {
            x: rdr.read_f32::<LittleEndian>()?,
            y: rdr.read_f32::<LittleEndian>()?,
            z: rdr.read_f32::<LittleEndian>()?,
            w: rdr.read_f32::<LittleEndian>()?,
        })
    }
}

impl Parseable<CArgb> for CArgb {
    fn parse<R: Read>(rdr: &mut R) -> Result<CArgb, ParserError> {
        Ok(CArgb::from(rdr.read_u32::<LittleEndian>()?))
    }
}

impl Parseable<u8> for u8 {
    fn parse<R: Read>(rdr: &mut R) -> Result<u8, ParserError> {
        Ok(rdr.read_u8()?)
    }
}

impl Parseable<u16> for u16 {
    fn parse<R: Read>(rdr: &mut R) -> Result<u16, ParserError> {
        Ok(rdr.read_u16::<LittleEndian>()?)
    }
}

impl Parseable<i16> for i16 {
    fn parse<R: Read>(rdr: &mut R) -> Result<i16, ParserError> {
        Ok(rdr.read_i16::<LittleEndian>()?)
    }
}

impl Parseable<u32> for u32 {
    fn parse<R: Read>(rdr: &mut R) -> Result<u32, ParserError> {
        Ok(rdr.read_u32::<LittleEndian>()?)
    }
}

impl Parseable<f32> for f32 {
    fn parse<R: Read>(rdr: &mut R) -> Result<f32, ParserError> {
        Ok(rdr.read_f32::<LittleEndian>()?)
    }
}

/// Upper bound for the up-front allocation of [`read_array`], larger arrays grow while reading.
const MAX_PREALLOCATED_ELEMENTS: usize = 4096;

/// Reads exactly `count` elements, used for the length-prefixed arrays inside a chunk.
/// `count` comes from the asset itself, so a corrupt count ends in an EOF error, not an allocation.
pub(crate) fn read_array<T: Parseable<T>, R: Read>(rdr: &mut R, count: usize) -> Result<Vec<T>, ParserError> {
    let mut list = Vec::with_capacity(count.min(MAX_PREALLOCATED_ELEMENTS));
    for _ in 0..count {
        list.push(T::parse(rdr)?);
    }
    Ok(list)
}

/// Reads the version header and all following chunks until EOF.
pub(crate) fn read_asset_chunks<R: Read>(rdr: &mut R) -> Result<Vec<IffChunk>, ParserError> {
    let version_hdr = match IffChunk::read_next_chunk(rdr) {
        Err(ParserError::IOError(internal)) if internal.kind() == UnexpectedEof => {
            return Err(ParserError::EmptySource);
        }
        res => res?,
    };

    if !version_hdr.magic_str().eq("CVER") {
        return Err(ParserError::InvalidMagicValue {
            magic: version_hdr.magic,
        });
    }

    let cver = version_hdr.parse::<CVerChunk>()?;
    if cver.version != CVerChunk::CURRENT {
        return Err(ParserError::FormatError {
            reason: "Unknown CVER Version",
        });
    }

    let mut chunk_list = Vec::<IffChunk>::new();
    let mut chunk_res = IffChunk::read_next_chunk(rdr);
    while let Ok(chunk) = chunk_res {
        chunk_list.push(chunk);
        chunk_res = IffChunk::read_next_chunk(rdr);
    }

    // weird error handling because when EoF, we get that inside a parser error.
    match chunk_res {
        Err(ParserError::IOError(internal)) if internal.kind() == UnexpectedEof => Ok(chunk_list),
        Err(err) => Err(err),
        Ok(_) => unreachable!("the loop only terminates on errors"),
    }
}

pub(crate) fn get_mandatory_chunk_by_name<T: Parseable<T>>(
    chunk_list: &[IffChunk],
    chunk_magic: &'static str,
) -> Result<T, ParserError> {
    chunk_list
        .iter()
        .find(|chunk| chunk.magic_str().eq(chunk_magic))
        .ok_or(ParserError::MissingChunk { magic: chunk_magic })?
        .parse::<T>()
}

use std::io::Write;

use byteorder::{LittleEndian, WriteBytesExt};

use crate::common::types::{C2Vector, C3Vector, C4Quaternion, CArgb, CVerChunk, IffChunk};
use crate::ParserError;

/// The inverse of [`crate::common::reader::Parseable`], used to author assets (tools, tests and
/// the synthetic worlds of the client).
pub(crate) trait Writable {
    fn write<W: Write>(&self, wtr: &mut W) -> Result<(), ParserError>;
}

impl Writable for C3Vector {
    fn write<W: Write>(&self, wtr: &mut W) -> Result<(), ParserError> {
        wtr.write_f32::<LittleEndian>(self.x)?;
        wtr.write_f32::<LittleEndian>(self.y)?;
        wtr.write_f32::<LittleEndian>(self.z)?;
        Ok(())
    }
}

impl Writable for C2Vector {
    fn write<W: Write>(&self, wtr: &mut W) -> Result<(), ParserError> {
        wtr.write_f32::<LittleEndian>(self.x)?;
        wtr.write_f32::<LittleEndian>(self.y)?;
        Ok(())
    }
}

impl Writable for C4Quaternion {
    fn write<W: Write>(&self, wtr: &mut W) -> Result<(), ParserError> {
        wtr.write_f32::<LittleEndian>(self.x)?;
        wtr.write_f32::<LittleEndian>(self.y)?;
        wtr.write_f32::<LittleEndian>(self.z)?;
        wtr.write_f32::<LittleEndian>(self.w)?;
        Ok(())
    }
}

impl Writable for CArgb {
    fn write<W: Write>(&self, wtr: &mut W) -> Result<(), ParserError> {
        Ok(wtr.write_u32::<LittleEndian>(u32::from(*self))?)
    }
}

impl Writable for u8 {
    fn write<W: Write>(&self, wtr: &mut W) -> Result<(), ParserError> {
        Ok(wtr.write_u8(*self)?)
    }
}

impl Writable for u16 {
    fn write<W: Write>(&self, wtr: &mut W) -> Result<(), ParserError> {
        Ok(wtr.write_u16::<LittleEndian>(*self)?)
    }
}

impl Writable for i16 {
    fn write<W: Write>(&self, wtr: &mut W) -> Result<(), ParserError> {
        Ok(wtr.write_i16::<LittleEndian>(*self)?)
    }
}

impl Writable for u32 {
    fn write<W: Write>(&self, wtr: &mut W) -> Result<(), ParserError> {
        Ok(wtr.write_u32::<LittleEndian>(*self)?)
    }
}

impl Writable for f32 {
    fn write<W: Write>(&self, wtr: &mut W) -> Result<(), ParserError> {
        Ok(wtr.write_f32::<LittleEndian>(*self)?)
    }
}

pub(crate) fn write_array<T: Writable, W: Write>(wtr: &mut W, list: &[T]) -> Result<(), ParserError> {
    for element in list {
        element.write(wtr)?;
    }
    Ok(())
}

/// Serializes a whole asset: the version chunk followed by the given payload chunk.
pub(crate) fn write_asset<T: Writable>(name: &[u8; 4], payload: &T) -> Result<Vec<u8>, ParserError> {
    let mut buf = Vec::new();
    IffChunk::from_writable(
        b"CVER",
        &CVerChunk {
            version: CVerChunk::CURRENT,
        },
    )?
    .write_chunk(&mut buf)?;
    IffChunk::from_writable(name, payload)?.write_chunk(&mut buf)?;
    Ok(buf)
}

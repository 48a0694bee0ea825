use std::io::ErrorKind::UnexpectedEof;
use std::io::{Cursor, Read, Write};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};

use crate::common::reader::Parseable;
use crate::common::writer::Writable;
use crate::ParserError;

#[derive(Debug, Copy, Clone, Default, PartialEq)]
pub struct C3Vector {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl C3Vector {
    pub const fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }
}

#[derive(Debug, Copy, Clone, Default, PartialEq)]
pub struct C2Vector {
    pub x: f32,
    pub y: f32,
}

impl C2Vector {
    pub const fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }
}

#[derive(Debug, Copy, Clone, PartialEq)]
pub struct C4Quaternion {
    pub x: f32,
    pub y: f32,
    pub z: f32,
    pub w: f32,
}

impl C4Quaternion {
    pub const IDENTITY: C4Quaternion = C4Quaternion {
        x: 0.0,
        y: 0.0,
        z: 0.0,
        w: 1.0,
    };
}

impl Default for C4Quaternion {
    fn default() -> Self {
        Self::IDENTITY
    }
}

#[derive(Debug, Copy, Clone, Default, PartialEq, Eq)]
pub struct CArgb {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
}

impl From<u32> for CArgb {
    fn from(value: u32) -> Self {
        let bytes = value.to_le_bytes();
        CArgb {
            r: bytes[0],
            g: bytes[1],
            b: bytes[2],
            a: bytes[3],
        }
    }
}

impl From<CArgb> for u32 {
    fn from(value: CArgb) -> Self {
        u32::from_le_bytes([value.r, value.g, value.b, value.a])
    }
}

/// The version chunk every asset file starts with.
#[derive(Debug, Clone, Copy)]
pub struct CVerChunk {
    pub version: u32,
}

impl CVerChunk {
    pub const CURRENT: u32 = 1;
}

impl Parseable<CVerChunk> for CVerChunk {
    fn parse<R: Read>(rdr: &mut R) -> Result<CVerChunk, ParserError> {
        Ok(CVerChunk {
            version: rdr.read_u32::<LittleEndian>()?,
        })
    }
}

impl Writable for CVerChunk {
    fn write<W: Write>(&self, wtr: &mut W) -> Result<(), ParserError> {
        Ok(wtr.write_u32::<LittleEndian>(self.version)?)
    }
}

#[derive(Debug)]
pub(crate) struct IffChunk {
    pub magic: u32,
    pub size: u32,
    pub data: Vec<u8>,
}

impl IffChunk {
    /// Chunk magics are stored so that their big endian bytes spell the name.
    pub const fn magic_of(name: &[u8; 4]) -> u32 {
        u32::from_be_bytes(*name)
    }

    pub fn magic_str(&self) -> String {
        String::from_utf8_lossy(&self.magic.to_be_bytes()[..]).into_owned()
    }

    pub fn parse<T: Parseable<T>>(&self) -> Result<T, ParserError> {
        T::parse(&mut Cursor::new(&self.data))
    }

    pub fn read_next_chunk<R: Read>(rdr: &mut R) -> Result<IffChunk, ParserError> {
        let magic = rdr.read_u32::<LittleEndian>()?;
        let size = rdr.read_u32::<LittleEndian>()?;
        let mut data = Vec::new();
        rdr.by_ref().take(size as u64).read_to_end(&mut data)?;
        if data.len() != size as usize {
            return Err(std::io::Error::from(UnexpectedEof).into());
        }

        Ok(IffChunk { magic, size, data })
    }

    pub fn from_writable<T: Writable>(name: &[u8; 4], payload: &T) -> Result<IffChunk, ParserError> {
        let mut data = Vec::new();
        payload.write(&mut data)?;
        Ok(IffChunk {
            magic: Self::magic_of(name),
            size: data.len() as u32,
            data,
        })
    }

    pub fn write_chunk<W: Write>(&self, wtr: &mut W) -> Result<(), ParserError> {
        wtr.write_u32::<LittleEndian>(self.magic)?;
        wtr.write_u32::<LittleEndian>(self.size)?;
        wtr.write_all(&self.data)?;
        Ok(())
    }
}

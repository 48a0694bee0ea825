use std::io::{Read, Write};

use bitflags::bitflags;

use crate::common::reader::{read_array, Parseable};
use crate::common::types::CArgb;
use crate::common::writer::{write_array, write_asset, Writable};
use crate::ParserError;

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct SurfaceFlags: u32 {
        const BASE_COLOR = 0x0001;
        const BASE_IMAGE = 0x0002;
        const TRANSLUCENT = 0x0010;
        const ADDITIVE = 0x0100;
    }
}

/// A material, either a solid color or a reference to a texture.
#[derive(Debug, Clone, Default)]
pub struct SurfaceAsset {
    pub id: u32,
    pub flags: SurfaceFlags,
    pub color: CArgb,
    pub translucency: f32,
    /// Only meaningful with [`SurfaceFlags::BASE_IMAGE`].
    pub texture_id: u32,
}

impl SurfaceAsset {
    pub fn has_texture(&self) -> bool {
        self.flags.contains(SurfaceFlags::BASE_IMAGE) && self.texture_id != 0
    }

    pub fn is_translucent(&self) -> bool {
        self.flags.intersects(SurfaceFlags::TRANSLUCENT | SurfaceFlags::ADDITIVE) || self.translucency > 0.0
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, ParserError> {
        write_asset(b"SURF", self)
    }
}

impl Parseable<SurfaceAsset> for SurfaceAsset {
    fn parse<R: Read>(rdr: &mut R) -> Result<SurfaceAsset, ParserError> {
        Ok(SurfaceAsset {
            id: u32::parse(rdr)?,
            flags: SurfaceFlags::from_bits_retain(u32::parse(rdr)?),
            color: CArgb::parse(rdr)?,
            translucency: f32::parse(rdr)?,
            texture_id: u32::parse(rdr)?,
        })
    }
}

impl Writable for SurfaceAsset {
    fn write<W: Write>(&self, wtr: &mut W) -> Result<(), ParserError> {
        self.id.write(wtr)?;
        self.flags.bits().write(wtr)?;
        self.color.write(wtr)?;
        self.translucency.write(wtr)?;
        self.texture_id.write(wtr)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum TextureFormat {
    Rgba8 = 1,
    Luminance8 = 2,
}

impl TextureFormat {
    pub fn bytes_per_pixel(&self) -> usize {
        match self {
            TextureFormat::Rgba8 => 4,
            TextureFormat::Luminance8 => 1,
        }
    }
}

impl TryFrom<u32> for TextureFormat {
    type Error = ParserError;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(TextureFormat::Rgba8),
            2 => Ok(TextureFormat::Luminance8),
            _ => Err(ParserError::FormatError {
                reason: "Unknown texture format",
            }),
        }
    }
}

#[derive(Clone)]
pub struct TextureAsset {
    pub id: u32,
    pub width: u32,
    pub height: u32,
    pub format: TextureFormat,
    pub data: Vec<u8>,
}

impl std::fmt::Debug for TextureAsset {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{{ id: {:#010X}, {}x{} {:?}, data: [{}] }}",
            self.id,
            self.width,
            self.height,
            self.format,
            self.data.len()
        )
    }
}

impl TextureAsset {
    pub fn to_bytes(&self) -> Result<Vec<u8>, ParserError> {
        write_asset(b"TXTR", self)
    }
}

impl Parseable<TextureAsset> for TextureAsset {
    fn parse<R: Read>(rdr: &mut R) -> Result<TextureAsset, ParserError> {
        let id = u32::parse(rdr)?;
        let width = u32::parse(rdr)?;
        let height = u32::parse(rdr)?;
        let format = TextureFormat::try_from(u32::parse(rdr)?)?;
        let data_len = u32::parse(rdr)? as usize;

        let expected_len = (width as usize)
            .checked_mul(height as usize)
            .and_then(|pixels| pixels.checked_mul(format.bytes_per_pixel()));
        if expected_len != Some(data_len) {
            return Err(ParserError::FormatError {
                reason: "Texture data does not match its dimensions",
            });
        }

        let data = read_array::<u8, R>(rdr, data_len)?;
        Ok(TextureAsset {
            id,
            width,
            height,
            format,
            data,
        })
    }
}

impl Writable for TextureAsset {
    fn write<W: Write>(&self, wtr: &mut W) -> Result<(), ParserError> {
        self.id.write(wtr)?;
        self.width.write(wtr)?;
        self.height.write(wtr)?;
        (self.format as u32).write(wtr)?;
        (self.data.len() as u32).write(wtr)?;
        write_array(wtr, &self.data)
    }
}

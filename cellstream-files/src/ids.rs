//! Asset ID conventions. Every asset is addressed by a single `u32`, the high byte (or the high
//! word, for landblock-owned assets) tells which kind of asset it is.

pub const ENVIRONMENT_PREFIX: u32 = 0x0D00_0000;
pub const SURFACE_PREFIX: u32 = 0x0800_0000;
pub const TEXTURE_PREFIX: u32 = 0x0500_0000;

/// The first index of interior cells inside a landblock, lower indices are outdoor cells.
pub const FIRST_INTERIOR_CELL: u16 = 0x0100;
/// The index of the landblock info record inside a landblock.
pub const LANDBLOCK_INFO_INDEX: u16 = 0xFFFE;
/// Portal target of a cell portal that leads outside, i.e. to the outdoor terrain.
pub const OUTDOORS_CELL_INDEX: u16 = 0xFFFF;

#[inline]
pub fn environment_id(index: u32) -> u32 {
    ENVIRONMENT_PREFIX | (index & 0x00FF_FFFF)
}

#[inline]
pub fn surface_id(index: u32) -> u32 {
    SURFACE_PREFIX | (index & 0x00FF_FFFF)
}

#[inline]
pub fn texture_id(index: u32) -> u32 {
    TEXTURE_PREFIX | (index & 0x00FF_FFFF)
}

#[inline]
pub fn cell_id(landblock: u16, index: u16) -> u32 {
    ((landblock as u32) << 16) | index as u32
}

#[inline]
pub fn landblock_info_id(landblock: u16) -> u32 {
    cell_id(landblock, LANDBLOCK_INFO_INDEX)
}

#[inline]
pub fn landblock_of(id: u32) -> u16 {
    (id >> 16) as u16
}

#[inline]
pub fn cell_index_of(id: u32) -> u16 {
    (id & 0xFFFF) as u16
}

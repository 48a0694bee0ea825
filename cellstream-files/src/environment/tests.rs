use std::collections::BTreeMap;
use std::io::Cursor;

use crate::common::types::{C2Vector, C3Vector};
use crate::environment::reader::EnvironmentReader;
use crate::environment::types::{CellStruct, EnvironmentAsset, PolygonFlags, StructPolygon, StructVertex};
use crate::ParserError;

fn quad_struct(index: u32) -> CellStruct {
    let mut vertices = BTreeMap::new();
    for (id, (x, y)) in [(0.0, 0.0), (1.0, 0.0), (1.0, 1.0), (0.0, 1.0)].into_iter().enumerate() {
        vertices.insert(
            id as u16,
            StructVertex {
                id: id as u16,
                position: C3Vector::new(x, y, 0.0),
                normal: C3Vector::new(0.0, 0.0, 1.0),
                uvs: vec![C2Vector::new(x, y)],
            },
        );
    }

    let mut polygons = BTreeMap::new();
    polygons.insert(
        0,
        StructPolygon {
            id: 0,
            flags: PolygonFlags::empty(),
            surface_index: 0,
            vertex_ids: vec![0, 1, 2, 3],
            uv_indices: vec![0, 0, 0, 0],
        },
    );
    polygons.insert(
        1,
        StructPolygon {
            id: 1,
            flags: PolygonFlags::NO_DRAW,
            surface_index: -1,
            vertex_ids: vec![0, 1, 2],
            uv_indices: vec![0, 0, 0],
        },
    );

    CellStruct {
        index,
        vertices,
        polygons,
    }
}

#[test]
fn parse_written_environment() -> Result<(), anyhow::Error> {
    let mut environment = EnvironmentAsset {
        id: 0x0D00_0042,
        cell_structs: BTreeMap::new(),
    };
    environment.cell_structs.insert(0, quad_struct(0));
    environment.cell_structs.insert(3, quad_struct(3));

    let bytes = environment.to_bytes()?;
    let parsed = EnvironmentReader::parse_asset(&mut Cursor::new(bytes))?;

    assert_eq!(parsed.id, 0x0D00_0042);
    assert_eq!(parsed.cell_structs.keys().copied().collect::<Vec<_>>(), vec![0, 3]);

    let cell_struct = &parsed.cell_structs[&3];
    assert_eq!(cell_struct.vertices.len(), 4);
    assert_eq!(cell_struct.vertices[&2].position, C3Vector::new(1.0, 1.0, 0.0));
    assert!(cell_struct.polygons[&0].is_renderable());
    assert!(!cell_struct.polygons[&1].is_renderable());
    Ok(())
}

#[test]
fn reject_missing_version_header() {
    let bytes = vec![b'X', b'X', b'X', b'X', 0, 0, 0, 0];
    let result = EnvironmentReader::parse_asset(&mut Cursor::new(bytes));
    assert!(matches!(result, Err(ParserError::InvalidMagicValue { .. })));
}

#[test]
fn reject_empty_source() {
    let result = EnvironmentReader::parse_asset(&mut Cursor::new(Vec::<u8>::new()));
    assert!(matches!(result, Err(ParserError::EmptySource)));
}

#[test]
fn reject_truncated_payload() -> Result<(), anyhow::Error> {
    let mut environment = EnvironmentAsset::default();
    environment.cell_structs.insert(0, quad_struct(0));
    let mut bytes = environment.to_bytes()?;
    bytes.truncate(bytes.len() - 5);

    // the ENVI chunk can't be read completely, so it's never found.
    let result = EnvironmentReader::parse_asset(&mut Cursor::new(bytes));
    assert!(matches!(result, Err(ParserError::MissingChunk { magic: "ENVI" })));
    Ok(())
}

#[test]
fn corrupt_struct_count_is_an_error() -> Result<(), anyhow::Error> {
    let mut bytes = EnvironmentAsset::default().to_bytes()?;
    // the ENVI payload ends with the struct count
    let count_offset = bytes.len() - 4;
    bytes[count_offset..].copy_from_slice(&u32::MAX.to_le_bytes());

    let result = EnvironmentReader::parse_asset(&mut Cursor::new(bytes));
    assert!(matches!(result, Err(ParserError::IOError(_))));
    Ok(())
}

#[test]
fn corrupt_vertex_count_is_an_error() -> Result<(), anyhow::Error> {
    let mut environment = EnvironmentAsset::default();
    environment.cell_structs.insert(0, CellStruct::default());
    let mut bytes = environment.to_bytes()?;
    // an empty struct is written as index, vertex count, polygon count
    let vertex_count_offset = bytes.len() - 8;
    bytes[vertex_count_offset..vertex_count_offset + 4].copy_from_slice(&u32::MAX.to_le_bytes());

    let result = EnvironmentReader::parse_asset(&mut Cursor::new(bytes));
    assert!(matches!(result, Err(ParserError::IOError(_))));
    Ok(())
}

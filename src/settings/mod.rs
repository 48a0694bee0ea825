use clap::{Parser, Subcommand, value_parser};
use glam::Vec3;
use itertools::Itertools;
use std::str::FromStr;

#[derive(Parser, Debug)]
#[command(name = "cellstream")]
#[command(version)]
#[command(about = "Streams interior cells around a camera that flies through a world, without a window")]
pub struct CliArgs {
    #[arg(long, env = "CELLSTREAM_DATA_DIR", default_value_t = default_data_dir())]
    pub data_dir: String,

    #[arg(long, env = "CELLSTREAM_FRAMES", default_value_t = 600)]
    pub frames: u64,

    /// Time per frame that may be spent on GPU uploads.
    #[arg(long, env = "CELLSTREAM_BUDGET_MS", default_value_t = 4.0)]
    pub budget_ms: f32,

    /// Overrides the load radius of the placed objects, in world units.
    #[arg(long, env = "CELLSTREAM_LOAD_RADIUS")]
    pub load_radius: Option<f32>,

    /// Where the camera starts, e.g. "(120.5, 300, -30)". Defaults to the first dungeon room.
    #[arg(long, value_parser = value_parser!(Vector3))]
    pub start: Option<Vector3>,

    #[command(subcommand)]
    pub source: AssetSource,
}

pub fn default_data_dir() -> String {
    std::env::current_dir()
        .map(|dir| dir.join("_data").to_string_lossy().to_string())
        .unwrap_or_else(|_| "_data".to_string())
}

#[derive(Subcommand, Debug)]
pub enum AssetSource {
    /// Generates a world of chained rooms in memory.
    Synthetic {
        #[arg(long, default_value_t = 1)]
        seed: u64,
        #[arg(long, default_value_t = 4)]
        landblocks: usize,
        /// Additionally writes the generated assets into this folder, to be read by `directory`.
        #[arg(long)]
        export: Option<String>,
    },
    /// Reads `{id:08X}.bin` files from a folder, defaulting to the data dir.
    Directory { path: Option<String> },
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Vector3 {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl From<Vector3> for Vec3 {
    fn from(value: Vector3) -> Self {
        Vec3::new(value.x, value.y, value.z)
    }
}

fn trim_brackets(input: &str) -> &str {
    let mut chars = input.chars();
    chars.next();
    chars.next_back();
    chars.as_str()
}

impl FromStr for Vector3 {
    type Err = String;

    // (-a, b, c)
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let string: String = s.chars().filter(|&c| !c.is_whitespace()).collect();
        if !string.starts_with('(') || !string.ends_with(')') || string.len() < 2 {
            return Err("Missing start or end bracket".to_string());
        }

        let splits = trim_brackets(&string).split(',').collect_vec();
        if splits.len() != 3 {
            return Err(format!("Comma splitting resulted in {} splits, not 3!", splits.len()));
        }

        let components: Vec<f32> = splits
            .iter()
            .map(|&split| {
                split
                    .parse::<f32>()
                    .map_err(|err| format!("Component \"{}\": {}", split, err))
            })
            .try_collect()?;

        Ok(Vector3 {
            x: components[0],
            y: components[1],
            z: components[2],
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_vectors() {
        assert_eq!(
            "( -1.5, 2,3 )".parse::<Vector3>(),
            Ok(Vector3 {
                x: -1.5,
                y: 2.0,
                z: 3.0
            })
        );
    }

    #[test]
    fn rejects_malformed_vectors() {
        assert!("1, 2, 3".parse::<Vector3>().is_err());
        assert!("(1, 2)".parse::<Vector3>().is_err());
        assert!("(1, b, 3)".parse::<Vector3>().is_err());
        assert!(")".parse::<Vector3>().is_err());
    }

    #[test]
    fn parses_subcommands() {
        let args = CliArgs::try_parse_from([
            "cellstream",
            "--frames",
            "10",
            "--start",
            "(1, 2, 3)",
            "synthetic",
            "--seed",
            "5",
        ])
        .unwrap();

        assert_eq!(args.frames, 10);
        assert_eq!(args.start.map(Vec3::from), Some(Vec3::new(1.0, 2.0, 3.0)));
        assert!(matches!(args.source, AssetSource::Synthetic {
            seed: 5,
            landblocks: 4,
            export: None
        }));
    }
}

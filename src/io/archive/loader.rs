use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use dashmap::DashMap;
use itertools::Itertools;
use log::{trace, warn};

use crate::io::common::loader::RawAssetLoader;

/// File name of an asset inside a data directory, e.g. `0D000001.bin`.
pub fn asset_file_name(id: u32) -> String {
    format!("{:08X}.bin", id)
}

fn parse_asset_file_name(file_name: &str) -> Option<u32> {
    let (stem, extension) = file_name.rsplit_once('.')?;
    if !extension.eq_ignore_ascii_case("bin") || stem.len() != 8 {
        return None;
    }

    u32::from_str_radix(stem, 16).ok()
}

/// Serves assets from a data folder of `{id:08X}.bin` files. Direct sub folders are enumerated as
/// well (no further recursion), files in the data folder itself win over those in sub folders.
pub struct DirectoryLoader {
    files: HashMap<u32, PathBuf>,
    data_folder: PathBuf,
}

impl DirectoryLoader {
    pub fn new(data_folder: impl AsRef<Path>) -> Result<Self, std::io::Error> {
        let data_folder = data_folder.as_ref().to_path_buf();

        let mut entries = Vec::new();
        for entry in fs::read_dir(&data_folder)?.filter_map(|file| file.ok()) {
            if entry.path().is_dir() {
                entries.extend(
                    fs::read_dir(entry.path())?
                        .filter_map(|file| file.ok())
                        .filter(|file| file.path().is_file())
                        .map(|file| (1, file.path())),
                );
            } else {
                entries.push((0, entry.path()));
            }
        }

        let mut files = HashMap::new();
        for (_, path) in entries.into_iter().sorted() {
            let Some(id) = path
                .file_name()
                .and_then(|name| name.to_str())
                .and_then(parse_asset_file_name)
            else {
                continue;
            };

            if let Some(existing) = files.get(&id) {
                warn!("Asset {:08X} exists twice, keeping {:?} over {:?}", id, existing, path);
                continue;
            }

            files.insert(id, path);
        }

        trace!("Indexed {} assets in {:?}", files.len(), data_folder);
        Ok(Self { files, data_folder })
    }

    pub fn data_folder(&self) -> &Path {
        &self.data_folder
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}

impl RawAssetLoader for DirectoryLoader {
    fn load_raw_owned(&self, id: u32) -> Option<Vec<u8>> {
        let path = self.files.get(&id)?;
        match fs::read(path) {
            Ok(buf) => Some(buf),
            Err(err) => {
                warn!("Could not read {:?}: {}", path, err);
                None
            }
        }
    }

    fn contains(&self, id: u32) -> bool {
        self.files.contains_key(&id)
    }
}

/// An in-memory archive, used for generated worlds and as a test double.
#[derive(Default)]
pub struct MemoryArchive {
    assets: DashMap<u32, Vec<u8>>,
}

impl MemoryArchive {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, id: u32, data: Vec<u8>) {
        self.assets.insert(id, data);
    }

    pub fn remove(&self, id: u32) -> Option<Vec<u8>> {
        self.assets.remove(&id).map(|(_, data)| data)
    }

    pub fn len(&self) -> usize {
        self.assets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.assets.is_empty()
    }

    /// Writes every asset into `folder` in the layout [`DirectoryLoader`] reads.
    pub fn export_to(&self, folder: impl AsRef<Path>) -> Result<usize, std::io::Error> {
        let folder = folder.as_ref();
        fs::create_dir_all(folder)?;

        let mut written = 0;
        for entry in self.assets.iter() {
            fs::write(folder.join(asset_file_name(*entry.key())), entry.value())?;
            written += 1;
        }
        Ok(written)
    }
}

impl RawAssetLoader for MemoryArchive {
    fn load_raw_owned(&self, id: u32) -> Option<Vec<u8>> {
        self.assets.get(&id).map(|data| data.value().clone())
    }

    fn contains(&self, id: u32) -> bool {
        self.assets.contains_key(&id)
    }
}

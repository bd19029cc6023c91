use anyhow::Result;
use grid_merge::fetch::mirror_file_names;
use grid_merge::{Fetch, FetchError, RawPeriodTable};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// Serves reports from a local directory tree of previously downloaded files,
/// or of per-sheet CSV exports of them.
pub struct MirrorFetcher {
    files: HashMap<String, PathBuf>,
}

impl MirrorFetcher {
    pub fn new(dir: &Path) -> Result<Self> {
        if !dir.is_dir() {
            anyhow::bail!("mirror directory not found: {}", dir.display());
        }

        let mut files = HashMap::new();
        for entry in WalkDir::new(dir).into_iter().filter_map(|e| e.ok()) {
            if !entry.file_type().is_file() {
                continue;
            }
            let name = entry.file_name().to_string_lossy().to_lowercase();
            files.entry(name).or_insert_with(|| entry.path().to_path_buf());
        }

        Ok(Self { files })
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}

impl Fetch for MirrorFetcher {
    fn fetch(&self, address: &str) -> Result<RawPeriodTable, FetchError> {
        let path = mirror_file_names(address)
            .iter()
            .find_map(|name| self.files.get(name))
            .ok_or_else(|| FetchError::NotFound {
                address: address.to_string(),
            })?;

        let bytes = std::fs::read(path).map_err(|e| FetchError::Io {
            address: address.to_string(),
            message: e.to_string(),
        })?;
        RawPeriodTable::from_bytes(address, &bytes)
    }
}

//! Cross-platform application paths

use std::fs;
use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum PathsError {
    #[error("Could not determine data directory")]
    NoDataDir,
    #[error("Failed to create data directory {path:?}: {source}")]
    Create {
        path: PathBuf,
        source: std::io::Error,
    },
}

#[derive(Debug, Clone)]
pub struct AppPaths {
    data_dir: PathBuf,
}

impl AppPaths {
    pub fn new() -> Result<Self, PathsError> {
        let data_dir = Self::get_data_dir()?;

        // Ensure directory exists
        fs::create_dir_all(&data_dir).map_err(|source| PathsError::Create {
            path: data_dir.clone(),
            source,
        })?;

        Ok(Self { data_dir })
    }

    fn get_data_dir() -> Result<PathBuf, PathsError> {
        let base = dirs::data_dir().ok_or(PathsError::NoDataDir)?;
        Ok(base.join("wasmcompute"))
    }

    pub fn data_dir(&self) -> &PathBuf {
        &self.data_dir
    }

    pub fn config_file(&self) -> PathBuf {
        self.data_dir.join("config.json")
    }
}

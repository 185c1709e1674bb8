use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use image::ImageFormat;
use uuid::Uuid;

use crate::error::EngineError;

/// Writes decoded images under one output directory as PNG files named
/// `<prefix>_<uuid>.png`.
#[derive(Debug, Clone)]
pub struct LocalStorage {
    output_dir: PathBuf,
}

impl LocalStorage {
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
        }
    }

    pub fn allocate_path(&self, prefix: &str) -> PathBuf {
        self.output_dir
            .join(format!("{prefix}_{}.png", Uuid::new_v4()))
    }

    /// Re-encodes `bytes` to PNG at `path`, whatever format the API returned.
    pub fn save(&self, bytes: &[u8], path: &Path) -> Result<(), EngineError> {
        ensure_directory(&self.output_dir)?;
        let decoded = image::load_from_memory(bytes).map_err(|source| EngineError::Encode {
            path: path.to_path_buf(),
            source,
        })?;
        decoded
            .save_with_format(path, ImageFormat::Png)
            .map_err(|source| EngineError::Encode {
                path: path.to_path_buf(),
                source,
            })
    }
}

pub fn ensure_directory(path: &Path) -> Result<(), EngineError> {
    match fs::create_dir_all(path) {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == ErrorKind::AlreadyExists => Ok(()),
        Err(source) => Err(EngineError::Io {
            context: "failed to create output directory",
            path: path.to_path_buf(),
            source,
        }),
    }
}

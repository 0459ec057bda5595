//! Directory-backed durable surface
//!
//! Persists durable cache entries to disk so they survive restarts.
//! Each key maps to one file whose name is the hex-encoded key.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use super::surface::{DurableSurface, SurfaceError};
use crate::{Error, Result};

const EXTENSION: &str = "json";

/// Durable surface storing one file per key under `base_dir`.
///
/// The quota is a total byte budget over all value files in the directory.
pub struct FileSurface {
    base_dir: PathBuf,
    quota_bytes: u64,
}

impl FileSurface {
    /// Create a surface rooted at `base_dir`, creating the directory if needed
    pub fn new(base_dir: PathBuf, quota_bytes: u64) -> Result<Self> {
        if !base_dir.exists() {
            fs::create_dir_all(&base_dir)
                .map_err(|e| Error::Storage(format!("Failed to create durable cache dir: {e}")))?;
        }

        Ok(Self {
            base_dir,
            quota_bytes,
        })
    }

    /// Create a surface in the default location (`~/.statcache/durable`)
    pub fn default_location(quota_bytes: u64) -> Result<Self> {
        Self::new(default_dir()?, quota_bytes)
    }

    /// Directory holding the value files
    #[must_use]
    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    fn item_path(&self, key: &str) -> PathBuf {
        self.base_dir
            .join(format!("{}.{EXTENSION}", hex::encode(key.as_bytes())))
    }

    fn used_bytes(&self) -> u64 {
        let Ok(dir) = fs::read_dir(&self.base_dir) else {
            return 0;
        };
        dir.filter_map(std::result::Result::ok)
            .filter(|e| e.path().extension().is_some_and(|ext| ext == EXTENSION))
            .filter_map(|e| e.metadata().ok())
            .map(|m| m.len())
            .sum()
    }
}

/// Default durable directory (`~/.statcache/durable`)
pub(crate) fn default_dir() -> Result<PathBuf> {
    let home = dirs::home_dir()
        .ok_or_else(|| Error::Storage("Cannot determine home directory".to_string()))?;
    Ok(home.join(".statcache").join("durable"))
}

fn to_usize(bytes: u64) -> usize {
    usize::try_from(bytes).unwrap_or(usize::MAX)
}

impl DurableSurface for FileSurface {
    fn get_item(&self, key: &str) -> Option<String> {
        let path = self.item_path(key);
        match fs::read_to_string(&path) {
            Ok(content) => Some(content),
            Err(e) if e.kind() == ErrorKind::NotFound => None,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Failed to read durable item");
                None
            }
        }
    }

    fn set_item(&self, key: &str, value: &str) -> std::result::Result<(), SurfaceError> {
        let path = self.item_path(key);
        let replaced = fs::metadata(&path).map_or(0, |m| m.len());
        let in_use = self.used_bytes().saturating_sub(replaced);
        let available = self.quota_bytes.saturating_sub(in_use);
        let needed = value.len() as u64;
        if needed > available {
            return Err(SurfaceError::QuotaExceeded {
                needed: to_usize(needed),
                available: to_usize(available),
            });
        }

        // Write-then-rename so readers never observe a partial value
        let tmp = path.with_extension("tmp");
        fs::write(&tmp, value)?;
        fs::rename(&tmp, &path)?;
        debug!(path = %path.display(), bytes = needed, "Wrote durable item");
        Ok(())
    }

    fn remove_item(&self, key: &str) {
        let path = self.item_path(key);
        if let Err(e) = fs::remove_file(&path) {
            if e.kind() != ErrorKind::NotFound {
                warn!(path = %path.display(), error = %e, "Failed to remove durable item");
            }
        }
    }

    fn keys(&self) -> Vec<String> {
        let Ok(dir) = fs::read_dir(&self.base_dir) else {
            return Vec::new();
        };
        let mut keys: Vec<String> = dir
            .filter_map(std::result::Result::ok)
            .filter_map(|entry| {
                let path = entry.path();
                if path.extension()? != EXTENSION {
                    return None;
                }
                let stem = path.file_stem()?.to_str()?;
                let raw = hex::decode(stem).ok()?;
                String::from_utf8(raw).ok()
            })
            .collect();
        keys.sort();
        keys
    }
}

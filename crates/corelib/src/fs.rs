//! FileSystem gateway: the only place the engine touches the filesystem.
//!
//! Loaders and renderers receive an [`AssetSource`] and ask it for whole-file byte
//! buffers. `res://` paths are resolved against the configured asset root.

use std::{
    collections::HashMap,
    path::{Path, PathBuf},
};

use parking_lot::RwLock;

use crate::{EngineError, EngineResult};

pub const ASSET_SCHEME: &str = "res://";

pub trait AssetSource: Send + Sync {
    /// Read a file addressed by a plain filesystem path.
    fn load_file_into_memory(&self, path: &str) -> EngineResult<Vec<u8>>;

    /// Read a file addressed relative to the asset root (with or without `res://`).
    fn load_assets_file(&self, path: &str) -> EngineResult<Vec<u8>>;

    /// Dispatch on the `res://` prefix.
    fn read(&self, path: &str) -> EngineResult<Vec<u8>> {
        if path.starts_with(ASSET_SCHEME) {
            self.load_assets_file(path)
        } else {
            self.load_file_into_memory(path)
        }
    }
}

/// Join `relative` onto the directory that contains `base`, keeping a `res://` prefix.
pub fn sibling_path(base: &str, relative: &str) -> String {
    if relative.starts_with(ASSET_SCHEME) || Path::new(relative).is_absolute() {
        return relative.to_owned();
    }
    match base.rfind(['/', '\\']) {
        Some(idx) => format!("{}/{}", &base[..idx], relative),
        None => relative.to_owned(),
    }
}

#[derive(Clone, Debug)]
pub struct DiskAssetSource {
    asset_root: PathBuf,
}

impl DiskAssetSource {
    pub fn new(asset_root: impl Into<PathBuf>) -> Self {
        Self {
            asset_root: asset_root.into(),
        }
    }

    pub fn asset_root(&self) -> &Path {
        &self.asset_root
    }

    pub fn resolve(&self, path: &str) -> PathBuf {
        let relative = path.strip_prefix(ASSET_SCHEME).unwrap_or(path);
        self.asset_root.join(relative)
    }
}

impl AssetSource for DiskAssetSource {
    fn load_file_into_memory(&self, path: &str) -> EngineResult<Vec<u8>> {
        let bytes = std::fs::read(path).map_err(|e| EngineError::from_io(path, e))?;
        log::debug!("Read {} bytes from {}", bytes.len(), path);
        Ok(bytes)
    }

    fn load_assets_file(&self, path: &str) -> EngineResult<Vec<u8>> {
        let resolved = self.resolve(path);
        let bytes = std::fs::read(&resolved).map_err(|e| EngineError::from_io(path, e))?;
        log::debug!(
            "Read {} bytes from {} ({})",
            bytes.len(),
            path,
            resolved.display()
        );
        Ok(bytes)
    }
}

/// In-memory gateway for embedded assets and tests. Keys are normalized without `res://`.
#[derive(Debug, Default)]
pub struct MemoryAssetSource {
    files: RwLock<HashMap<String, Vec<u8>>>,
}

impl MemoryAssetSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, path: &str, bytes: impl Into<Vec<u8>>) {
        self.files.write().insert(normalize(path).to_owned(), bytes.into());
    }

    pub fn with_file(self, path: &str, bytes: impl Into<Vec<u8>>) -> Self {
        self.insert(path, bytes);
        self
    }

    pub fn len(&self) -> usize {
        self.files.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.read().is_empty()
    }

    fn get(&self, path: &str) -> EngineResult<Vec<u8>> {
        self.files
            .read()
            .get(normalize(path))
            .cloned()
            .ok_or_else(|| EngineError::AssetNotFound {
                path: path.to_owned(),
            })
    }
}

fn normalize(path: &str) -> &str {
    path.strip_prefix(ASSET_SCHEME).unwrap_or(path)
}

impl AssetSource for MemoryAssetSource {
    fn load_file_into_memory(&self, path: &str) -> EngineResult<Vec<u8>> {
        self.get(path)
    }

    fn load_assets_file(&self, path: &str) -> EngineResult<Vec<u8>> {
        self.get(path)
    }
}

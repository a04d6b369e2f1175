use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};
use tracing::{debug, info};

use super::{Animation, AnimationDocument, AnimationLoadError};
use crate::asset_keys::resolve_asset_path;

const ANIMATION_EXTENSION: &str = "animation";

#[derive(Debug, Clone)]
struct CachedDocument {
    path: PathBuf,
    digest_hex: String,
    document: AnimationDocument,
}

/// Parsed animation documents shared by every sprite that uses the same key.
#[derive(Debug)]
pub struct AnimationLibrary {
    asset_root: PathBuf,
    cache: HashMap<String, CachedDocument>,
}

impl AnimationLibrary {
    pub fn new(asset_root: impl Into<PathBuf>) -> Self {
        Self {
            asset_root: asset_root.into(),
            cache: HashMap::new(),
        }
    }

    pub fn asset_root(&self) -> &Path {
        &self.asset_root
    }

    pub fn len(&self) -> usize {
        self.cache.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cache.is_empty()
    }

    /// Returns a fresh player for `key` (e.g. `navis/mega/battle`), parsing the file on first use.
    pub fn load(&mut self, key: &str) -> Result<Animation, AnimationLoadError> {
        let cached = self.cached(key)?;
        let mut animation = Animation::from_document(cached.document.clone());
        animation.set_path(cached.path.clone());
        Ok(animation)
    }

    /// Re-reads every cached file and reparses only the ones whose bytes changed.
    /// Returns the keys that were reparsed.
    pub fn refresh(&mut self) -> Result<Vec<String>, AnimationLoadError> {
        let mut changed = Vec::new();
        for (key, cached) in &mut self.cache {
            let (digest_hex, data) = read_with_digest(&cached.path)?;
            if digest_hex == cached.digest_hex {
                continue;
            }
            cached.document = AnimationDocument::parse(&data);
            cached.digest_hex = digest_hex;
            changed.push(key.clone());
        }
        changed.sort_unstable();
        if !changed.is_empty() {
            info!(changed = changed.len(), "animation_library_refreshed");
        }
        Ok(changed)
    }

    /// Swaps the cached document for `key` into `animation`, keeping its current state name.
    pub fn apply_to(&self, key: &str, animation: &mut Animation) -> bool {
        match self.cache.get(key) {
            Some(cached) => {
                animation.replace_document(cached.document.clone());
                true
            }
            None => false,
        }
    }

    fn cached(&mut self, key: &str) -> Result<&CachedDocument, AnimationLoadError> {
        match self.cache.entry(key.to_string()) {
            Entry::Occupied(entry) => Ok(entry.into_mut()),
            Entry::Vacant(entry) => {
                let path = resolve_asset_path(&self.asset_root, key, ANIMATION_EXTENSION)
                    .map_err(|source| AnimationLoadError::InvalidKey {
                        key: key.to_string(),
                        source,
                    })?;
                let (digest_hex, data) = read_with_digest(&path)?;
                let document = AnimationDocument::parse(&data);
                debug!(
                    key,
                    states = document.len(),
                    digest = %digest_hex,
                    "animation_document_cached"
                );
                Ok(entry.insert(CachedDocument {
                    path,
                    digest_hex,
                    document,
                }))
            }
        }
    }
}

fn read_with_digest(path: &Path) -> Result<(String, String), AnimationLoadError> {
    let data = fs::read_to_string(path).map_err(|source| AnimationLoadError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    let mut hasher = Sha256::new();
    hasher.update(data.as_bytes());
    Ok((to_hex_lower(&hasher.finalize()), data))
}

fn to_hex_lower(bytes: &[u8]) -> String {
    let mut output = String::with_capacity(bytes.len() * 2);
    for byte in bytes {
        use std::fmt::Write as _;
        let _ = write!(&mut output, "{byte:02x}");
    }
    output
}

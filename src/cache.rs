mod types;

pub use types::{CACHE_VERSION, CacheDocument, CacheEntry};

use crate::error::CacheError;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Owner of the persisted cache document for one suite.
///
/// Everything else works on the in-memory snapshot returned by [`load`]. The
/// file is only ever replaced whole, never patched.
///
/// [`load`]: CacheStore::load
#[derive(Debug, Clone)]
pub struct CacheStore {
    path: PathBuf,
}

impl CacheStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Loads the document, or `None` when it is absent or untrustworthy.
    pub async fn load(&self) -> Option<CacheDocument> {
        match self.try_load().await {
            Ok(doc) => Some(doc),
            Err(CacheError::Missing(path)) => {
                debug!(path = %path.display(), "no cache file");
                None
            }
            Err(e) => {
                warn!(error = %e, "ignoring cache");
                None
            }
        }
    }

    pub async fn try_load(&self) -> Result<CacheDocument, CacheError> {
        let bytes = match tokio::fs::read(&self.path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(CacheError::Missing(self.path.clone()));
            }
            Err(e) => return Err(CacheError::io(&self.path, e)),
        };

        let value: serde_json::Value =
            serde_json::from_slice(&bytes).map_err(|source| CacheError::Corrupt {
                path: self.path.clone(),
                source,
            })?;

        let found = value
            .get("version")
            .and_then(serde_json::Value::as_u64)
            .unwrap_or(0);
        if found != u64::from(CACHE_VERSION) {
            return Err(CacheError::VersionMismatch {
                found: u32::try_from(found).unwrap_or(u32::MAX),
                expected: CACHE_VERSION,
            });
        }

        let mut doc: CacheDocument =
            serde_json::from_value(value).map_err(|source| CacheError::Corrupt {
                path: self.path.clone(),
                source,
            })?;

        doc.entries.retain(|artifact, entry| {
            let consistent = entry.is_consistent();
            if !consistent {
                warn!(artifact, "dropping inconsistent cache entry");
            }
            consistent
        });

        Ok(doc)
    }

    /// Writes the document to a sibling temp file and renames it into place, so
    /// readers see either the old or the new document, never a partial one.
    pub async fn save(&self, doc: &CacheDocument) -> Result<(), CacheError> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| CacheError::io(parent, e))?;
        }

        let mut content = serde_json::to_string_pretty(doc).map_err(CacheError::Serialize)?;
        content.push('\n');

        let tmp = self.tmp_path();
        tokio::fs::write(&tmp, content)
            .await
            .map_err(|e| CacheError::io(&tmp, e))?;
        if let Err(e) = tokio::fs::rename(&tmp, &self.path).await {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(CacheError::io(&self.path, e));
        }

        debug!(path = %self.path.display(), entries = doc.entries.len(), "saved cache");
        Ok(())
    }

    fn tmp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        name.push(format!(".{}.tmp", std::process::id()));
        self.path.with_file_name(name)
    }
}

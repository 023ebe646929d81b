//! Object storage for the persisted tables.
//!
//! The pipelines read and replace whole objects addressed by a logical key
//! (`news.csv`, `behaviors.tsv`, ...). [`ObjectStore`] is the seam a cloud
//! bucket client would implement; [`LocalStore`] keeps objects under a
//! directory on disk.
//!
//! Writes replace the whole object. There is no locking: the last writer wins.

use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, info, instrument};

use crate::error::{NewsError, Result};
use crate::utils::ensure_writable_dir;

/// Whole-object storage addressed by key.
pub trait ObjectStore {
    /// Read an object, `None` if it does not exist.
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>>;

    /// Create or replace an object.
    async fn put(&self, key: &str, bytes: &[u8]) -> Result<()>;

    async fn exists(&self, key: &str) -> Result<bool> {
        Ok(self.get(key).await?.is_some())
    }
}

/// Objects stored as files under `root`.
#[derive(Debug, Clone)]
pub struct LocalStore {
    root: PathBuf,
}

impl LocalStore {
    /// Open a store rooted at `root`, creating the directory when missing.
    pub async fn open(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        ensure_writable_dir(&root).await?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, key: &str) -> Result<PathBuf> {
        let relative = Path::new(key);
        if key.is_empty()
            || relative.is_absolute()
            || relative
                .components()
                .any(|c| matches!(c, std::path::Component::ParentDir))
        {
            return Err(NewsError::Config(format!("invalid object key: {key:?}")));
        }
        Ok(self.root.join(relative))
    }
}

impl ObjectStore for LocalStore {
    #[instrument(level = "debug", skip(self))]
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let path = self.path_for(key)?;
        match fs::read(&path).await {
            Ok(bytes) => {
                debug!(bytes = bytes.len(), "Read object");
                Ok(Some(bytes))
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("Object not found");
                Ok(None)
            }
            Err(e) => Err(e.into()),
        }
    }

    #[instrument(level = "info", skip(self, bytes), fields(bytes = bytes.len()))]
    async fn put(&self, key: &str, bytes: &[u8]) -> Result<()> {
        let path = self.path_for(key)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }
        // write beside the target, then swap in one rename
        let tmp = path.with_extension(format!("tmp-{}", rand::random::<u32>()));
        fs::write(&tmp, bytes).await?;
        if let Err(e) = fs::rename(&tmp, &path).await {
            let _ = fs::remove_file(&tmp).await;
            return Err(e.into());
        }
        info!(path = %path.display(), "Uploaded object");
        Ok(())
    }
}

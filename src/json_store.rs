use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tracing::info;

use crate::favorites::{Favorite, FavoritesBackend, StorageError};

/// Favorites kept in one pretty-printed JSON array on disk.
///
/// Every call re-reads the whole document and every mutation rewrites it in
/// full, through a sibling temp file that is renamed over the existing one.
pub struct JsonFileBackend {
    path: PathBuf,
}

impl JsonFileBackend {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn read_all(&self) -> Result<Vec<Favorite>, StorageError> {
        let content = match tokio::fs::read_to_string(&self.path).await {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                info!("Creating empty favorites file at {}", self.path.display());
                self.write_all(&[]).await?;
                return Ok(Vec::new());
            }
            Err(e) => return Err(self.io_error(e)),
        };

        if content.trim().is_empty() {
            return Ok(Vec::new());
        }

        serde_json::from_str(&content).map_err(|source| StorageError::Corrupt {
            path: self.path.display().to_string(),
            source,
        })
    }

    async fn write_all(&self, favorites: &[Favorite]) -> Result<(), StorageError> {
        let json = serde_json::to_string_pretty(favorites).map_err(StorageError::Encode)?;

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent)
                    .await
                    .map_err(|e| self.io_error(e))?;
            }
        }

        let tmp = self.temp_path();
        tokio::fs::write(&tmp, json)
            .await
            .map_err(|e| self.io_error(e))?;
        tokio::fs::rename(&tmp, &self.path)
            .await
            .map_err(|e| self.io_error(e))?;

        Ok(())
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        name.push(".tmp");
        self.path.with_file_name(name)
    }

    fn io_error(&self, source: std::io::Error) -> StorageError {
        StorageError::Io {
            path: self.path.display().to_string(),
            source,
        }
    }
}

#[async_trait]
impl FavoritesBackend for JsonFileBackend {
    async fn list(&self) -> Result<Vec<Favorite>, StorageError> {
        self.read_all().await
    }

    async fn contains(&self, id: &str, url: &str) -> Result<bool, StorageError> {
        Ok(self
            .read_all()
            .await?
            .iter()
            .any(|f| f.id == id || f.url == url))
    }

    async fn insert(&self, favorite: &Favorite) -> Result<(), StorageError> {
        let mut favorites = self.read_all().await?;
        favorites.push(favorite.clone());
        self.write_all(&favorites).await
    }

    async fn remove(&self, id: &str) -> Result<bool, StorageError> {
        let favorites = self.read_all().await?;
        let before = favorites.len();
        let kept: Vec<Favorite> = favorites.into_iter().filter(|f| f.id != id).collect();

        if kept.len() == before {
            return Ok(false);
        }

        self.write_all(&kept).await?;
        Ok(true)
    }
}

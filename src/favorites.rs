use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::normalize::{derive_id, normalize_url};

const DEFAULT_SOURCE: &str = "Unknown";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Favorite {
    pub id: String,
    pub title: String,
    pub source: String,
    pub url: String,
    #[serde(serialize_with = "to_iso_millis", deserialize_with = "from_rfc3339")]
    pub saved_at: DateTime<Utc>,
}

/// Caller-supplied fields for a new favorite, before validation.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct NewFavorite {
    pub title: Option<String>,
    pub source: Option<String>,
    pub url: Option<String>,
}

#[derive(Debug, Error)]
pub enum FavoriteError {
    #[error("missing required fields (title, url)")]
    Validation,

    #[error("article already in favorites")]
    Duplicate,

    #[error("favorite not found")]
    NotFound,

    #[error("storage failure: {0}")]
    Storage(#[from] StorageError),
}

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("i/o error on {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("corrupt favorites document {path}: {source}")]
    Corrupt {
        path: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to encode favorites: {0}")]
    Encode(#[source] serde_json::Error),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// Durable home of the favorites collection.
///
/// Implementations keep insertion order and hold at most one record per id.
/// Callers serialize access; backends do no locking of their own.
#[async_trait]
pub trait FavoritesBackend: Send + Sync {
    async fn list(&self) -> Result<Vec<Favorite>, StorageError>;

    /// True if a record has this id or this stored URL. Records written
    /// under another id scheme are still caught by their URL.
    async fn contains(&self, id: &str, url: &str) -> Result<bool, StorageError>;

    async fn insert(&self, favorite: &Favorite) -> Result<(), StorageError>;

    /// Returns `false` if no favorite had this id.
    async fn remove(&self, id: &str) -> Result<bool, StorageError>;
}

/// List/add/remove over a backend, with dedup by normalized URL.
///
/// Every operation runs under one mutex so a load-modify-persist cycle never
/// interleaves with another on the same store. Separate processes sharing
/// the same artifact are not coordinated.
pub struct FavoritesStore {
    backend: Box<dyn FavoritesBackend>,
    lock: Mutex<()>,
}

impl FavoritesStore {
    pub fn new(backend: impl FavoritesBackend + 'static) -> Self {
        Self {
            backend: Box::new(backend),
            lock: Mutex::new(()),
        }
    }

    pub async fn list(&self) -> Result<Vec<Favorite>, FavoriteError> {
        let _guard = self.lock.lock().await;
        Ok(self.backend.list().await?)
    }

    pub async fn add(&self, new: NewFavorite) -> Result<Favorite, FavoriteError> {
        let title = required(new.title).ok_or(FavoriteError::Validation)?;
        let raw_url = required(new.url).ok_or(FavoriteError::Validation)?;
        let source = required(new.source).unwrap_or_else(|| DEFAULT_SOURCE.to_string());

        let url = normalize_url(&raw_url);
        let id = derive_id(&url);

        let _guard = self.lock.lock().await;

        if self.backend.contains(&id, &url).await? {
            debug!("Rejecting duplicate favorite {}", url);
            return Err(FavoriteError::Duplicate);
        }

        let favorite = Favorite {
            id,
            title,
            source,
            url,
            saved_at: Utc::now(),
        };
        self.backend.insert(&favorite).await?;

        info!("Saved favorite {} ({})", favorite.id, favorite.url);
        Ok(favorite)
    }

    pub async fn remove(&self, id: &str) -> Result<(), FavoriteError> {
        let _guard = self.lock.lock().await;

        if !self.backend.remove(id).await? {
            debug!("No favorite with id {}", id);
            return Err(FavoriteError::NotFound);
        }

        info!("Removed favorite {}", id);
        Ok(())
    }
}

fn required(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

// `savedAt` is written like `2025-03-01T10:15:30.123Z`.
fn to_iso_millis<S: Serializer>(value: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&value.to_rfc3339_opts(SecondsFormat::Millis, true))
}

fn from_rfc3339<'de, D: Deserializer<'de>>(deserializer: D) -> Result<DateTime<Utc>, D::Error> {
    let raw = String::deserialize(deserializer)?;
    DateTime::parse_from_rfc3339(&raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(serde::de::Error::custom)
}

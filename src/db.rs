use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use sqlx::{sqlite::SqlitePoolOptions, FromRow, SqlitePool};

use crate::favorites::{Favorite, FavoritesBackend, StorageError};

#[derive(Debug, Clone, FromRow)]
struct FavoriteRow {
    id: String,
    title: String,
    source: String,
    url: String,
    saved_at: String,
}

impl FavoriteRow {
    fn into_favorite(self) -> Result<Favorite, StorageError> {
        let saved_at = DateTime::parse_from_rfc3339(&self.saved_at)
            .map_err(|e| StorageError::Database(sqlx::Error::Decode(Box::new(e))))?
            .with_timezone(&Utc);

        Ok(Favorite {
            id: self.id,
            title: self.title,
            source: self.source,
            url: self.url,
            saved_at,
        })
    }
}

/// Favorites in a SQLite table keyed by id.
///
/// Same contract as the JSON file, but each mutation touches a single row.
pub struct SqliteBackend {
    pool: SqlitePool,
}

impl SqliteBackend {
    pub async fn new(database_url: &str) -> Result<Self, StorageError> {
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect(database_url)
            .await?;

        Ok(Self { pool })
    }

    pub async fn initialize(&self) -> Result<(), StorageError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS favorites (
                seq INTEGER PRIMARY KEY AUTOINCREMENT,
                id TEXT NOT NULL UNIQUE,
                title TEXT NOT NULL,
                source TEXT NOT NULL,
                url TEXT NOT NULL,
                saved_at TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

#[async_trait]
impl FavoritesBackend for SqliteBackend {
    async fn list(&self) -> Result<Vec<Favorite>, StorageError> {
        let rows = sqlx::query_as::<_, FavoriteRow>(
            "SELECT id, title, source, url, saved_at FROM favorites ORDER BY seq",
        )
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(FavoriteRow::into_favorite).collect()
    }

    async fn contains(&self, id: &str, url: &str) -> Result<bool, StorageError> {
        let count: (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM favorites WHERE id = ? OR url = ?")
                .bind(id)
                .bind(url)
                .fetch_one(&self.pool)
                .await?;
        Ok(count.0 > 0)
    }

    async fn insert(&self, favorite: &Favorite) -> Result<(), StorageError> {
        let saved_at = favorite
            .saved_at
            .to_rfc3339_opts(SecondsFormat::Millis, true);

        sqlx::query(
            r#"
            INSERT INTO favorites (id, title, source, url, saved_at)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(&favorite.id)
        .bind(&favorite.title)
        .bind(&favorite.source)
        .bind(&favorite.url)
        .bind(saved_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn remove(&self, id: &str) -> Result<bool, StorageError> {
        let result = sqlx::query("DELETE FROM favorites WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}

use std::any::Any;
use std::sync::Arc;

use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::{HeaderValue, Method, StatusCode},
    response::{IntoResponse, Response},
    routing::{delete, get},
    Json, Router,
};
use serde_json::json;
use tower::ServiceBuilder;
use tower_http::{
    catch_panic::CatchPanicLayer,
    cors::{AllowOrigin, Any as AnyHeader, CorsLayer},
    trace::TraceLayer,
};
use tracing::{debug, error};

use crate::config::{Config, StorageKind};
use crate::db::SqliteBackend;
use crate::favorites::{Favorite, FavoriteError, FavoritesStore, NewFavorite};
use crate::json_store::JsonFileBackend;
use crate::news::{build_source, Article, NewsError, NewsSource};

const INTERNAL_ERROR: &str = "internal error";
const NEWS_ERROR: &str = "failed to fetch news";

pub struct AppState {
    pub favorites: FavoritesStore,
    pub news: Arc<dyn NewsSource>,
}

impl AppState {
    pub async fn from_config(config: &Config) -> anyhow::Result<Self> {
        let favorites = match config.storage.backend {
            StorageKind::Json => {
                FavoritesStore::new(JsonFileBackend::new(config.storage.path.clone()))
            }
            StorageKind::Sqlite => {
                let backend = SqliteBackend::new(&config.storage.database_url).await?;
                backend.initialize().await?;
                FavoritesStore::new(backend)
            }
        };

        Ok(Self {
            favorites,
            news: build_source(&config.news)?,
        })
    }
}

// Custom error type
pub enum AppError {
    Favorite(FavoriteError),
    News(NewsError),
}

impl From<FavoriteError> for AppError {
    fn from(err: FavoriteError) -> Self {
        AppError::Favorite(err)
    }
}

impl From<NewsError> for AppError {
    fn from(err: NewsError) -> Self {
        AppError::News(err)
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        match self {
            AppError::Favorite(err @ (FavoriteError::Validation | FavoriteError::Duplicate)) => {
                error_response(StatusCode::BAD_REQUEST, &err.to_string())
            }
            AppError::Favorite(err @ FavoriteError::NotFound) => {
                error_response(StatusCode::NOT_FOUND, &err.to_string())
            }
            AppError::Favorite(err @ FavoriteError::Storage(_)) => {
                error!("Favorites storage failed: {:#}", anyhow::Error::from(err));
                error_response(StatusCode::INTERNAL_SERVER_ERROR, INTERNAL_ERROR)
            }
            AppError::News(err) => {
                error!("News fetch failed: {:#}", anyhow::Error::from(err));
                error_response(StatusCode::INTERNAL_SERVER_ERROR, NEWS_ERROR)
            }
        }
    }
}

fn error_response(status: StatusCode, message: &str) -> Response {
    (status, Json(json!({ "error": message }))).into_response()
}

fn handle_panic(err: Box<dyn Any + Send + 'static>) -> Response {
    let detail = err
        .downcast_ref::<String>()
        .map(String::as_str)
        .or_else(|| err.downcast_ref::<&str>().copied())
        .unwrap_or("unknown panic");
    error!("Request handler panicked: {}", detail);
    error_response(StatusCode::INTERNAL_SERVER_ERROR, INTERNAL_ERROR)
}

pub fn cors_layer(frontend_origin: Option<&str>) -> anyhow::Result<CorsLayer> {
    let allow_origin = match frontend_origin {
        Some(origin) => AllowOrigin::exact(HeaderValue::from_str(origin)?),
        None => AllowOrigin::mirror_request(),
    };

    Ok(CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_methods([Method::GET, Method::POST, Method::DELETE])
        .allow_headers(AnyHeader))
}

pub fn router(state: Arc<AppState>, cors: CorsLayer) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/health", get(health))
        .route("/api/news", get(news))
        .route("/api/favorites", get(list_favorites).post(add_favorite))
        .route("/api/favorites/:id", delete(remove_favorite))
        .fallback(not_found)
        .with_state(state)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(cors)
                .layer(CatchPanicLayer::custom(handle_panic)),
        )
}

// Route handlers
pub async fn index() -> &'static str {
    "Welcome to the veille-news backend!"
}

pub async fn health() -> &'static str {
    "OK"
}

pub async fn news(State(state): State<Arc<AppState>>) -> Result<Json<Vec<Article>>, AppError> {
    let articles = state.news.fetch().await?;
    Ok(Json(articles))
}

pub async fn list_favorites(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<Favorite>>, AppError> {
    let favorites = state.favorites.list().await?;
    Ok(Json(favorites))
}

pub async fn add_favorite(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<NewFavorite>, JsonRejection>,
) -> Result<(StatusCode, Json<Favorite>), AppError> {
    let Json(new) = payload.map_err(|rejection| {
        debug!("Rejected favorite body: {}", rejection.body_text());
        FavoriteError::Validation
    })?;

    let favorite = state.favorites.add(new).await?;
    Ok((StatusCode::CREATED, Json(favorite)))
}

pub async fn remove_favorite(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<serde_json::Value>, AppError> {
    state.favorites.remove(&id).await?;
    Ok(Json(json!({ "success": true })))
}

async fn not_found() -> Response {
    error_response(StatusCode::NOT_FOUND, "not found")
}

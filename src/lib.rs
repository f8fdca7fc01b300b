//! Veille News - marketing news and saved favorites
//!
//! This crate serves a small JSON API: recent posts from an external news
//! source, and a persisted list of favorite articles deduplicated by
//! normalized URL.

pub mod config;
pub mod db;
pub mod favorites;
pub mod json_store;
pub mod news;
pub mod normalize;
pub mod reddit;
pub mod routes;
pub mod rss;

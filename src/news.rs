//! The external news collaborator and the article shape it produces.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::{NewsConfig, NewsStrategy};
use crate::reddit::RedditSource;
use crate::rss::RssSource;

pub const UNTITLED: &str = "Untitled";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Article {
    pub title: String,
    pub source: String,
    pub url: String,
}

#[derive(Debug, Error)]
pub enum NewsError {
    #[error("news source credentials are not configured")]
    MissingCredentials,

    #[error("request to {url} failed: {source}")]
    Request {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("{url} answered {status}: {body}")]
    Status {
        url: String,
        status: reqwest::StatusCode,
        body: String,
    },

    #[error("unreadable payload from {url}: {reason}")]
    Payload { url: String, reason: String },
}

/// A source of recent articles.
#[async_trait]
pub trait NewsSource: Send + Sync {
    async fn fetch(&self) -> Result<Vec<Article>, NewsError>;
}

pub fn build_source(config: &NewsConfig) -> anyhow::Result<Arc<dyn NewsSource>> {
    let client = Client::builder()
        .timeout(Duration::from_secs(config.timeout_secs))
        .user_agent(config.user_agent.clone())
        .build()?;

    let source: Arc<dyn NewsSource> = match config.strategy {
        NewsStrategy::Reddit => Arc::new(RedditSource::new(client, config.reddit.clone(), config.limit)),
        NewsStrategy::Rss => Arc::new(RssSource::new(client, config.rss.clone(), config.limit)),
    };
    Ok(source)
}

// Upstream bodies can be large; only a prefix goes into the error.
pub(crate) fn excerpt(body: &str) -> String {
    body.chars().take(200).collect()
}

use async_trait::async_trait;
use feed_rs::model::Entry;
use feed_rs::parser;
use reqwest::Client;
use tracing::{info, warn};

use crate::config::RssConfig;
use crate::news::{excerpt, Article, NewsError, NewsSource, UNTITLED};

/// Articles from a single RSS/Atom feed.
pub struct RssSource {
    client: Client,
    config: RssConfig,
    limit: u32,
}

impl RssSource {
    pub fn new(client: Client, config: RssConfig, limit: u32) -> Self {
        Self {
            client,
            config,
            limit,
        }
    }

    pub fn articles_from_feed(&self, bytes: &[u8]) -> Result<Vec<Article>, NewsError> {
        let parsed = parser::parse(bytes).map_err(|e| NewsError::Payload {
            url: self.config.url.clone(),
            reason: e.to_string(),
        })?;

        let articles = parsed
            .entries
            .iter()
            .filter_map(|entry| self.article_from_entry(entry))
            .take(self.limit as usize)
            .collect();
        Ok(articles)
    }

    fn article_from_entry(&self, entry: &Entry) -> Option<Article> {
        let title = entry
            .title
            .as_ref()
            .map(|t| t.content.clone())
            .unwrap_or_else(|| UNTITLED.to_string());

        let link = entry
            .links
            .first()
            .map(|l| l.href.trim().to_string())
            .unwrap_or_default();

        if link.is_empty() {
            warn!("Skipping entry with no link: {}", title);
            return None;
        }

        Some(Article {
            title,
            source: self.config.source_name.clone(),
            url: link,
        })
    }
}

#[async_trait]
impl NewsSource for RssSource {
    async fn fetch(&self) -> Result<Vec<Article>, NewsError> {
        let url = &self.config.url;
        info!("Fetching feed: {}", url);

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|source| NewsError::Request {
                url: url.clone(),
                source,
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(NewsError::Status {
                url: url.clone(),
                status,
                body: excerpt(&body),
            });
        }

        let bytes = response.bytes().await.map_err(|source| NewsError::Request {
            url: url.clone(),
            source,
        })?;

        let articles = self.articles_from_feed(&bytes)?;
        info!("Fetched {} entries from {}", articles.len(), url);
        Ok(articles)
    }
}

use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::{Client, Response, StatusCode};
use serde::Deserialize;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::config::RedditConfig;
use crate::news::{excerpt, Article, NewsError, NewsSource, UNTITLED};

const SOURCE_NAME: &str = "Reddit";
const PERMALINK_BASE: &str = "https://www.reddit.com";

/// A cached token is only reused while it has more life left than this.
const EXPIRY_MARGIN: Duration = Duration::from_secs(5);

/// Short-lived bearer token from the client-credentials grant.
#[derive(Debug, Clone)]
pub struct Credential {
    access_token: String,
    expires_at: Instant,
}

impl Credential {
    /// `None` when the lifetime does not fit on the monotonic clock.
    pub fn new(access_token: String, expires_in: Duration) -> Option<Self> {
        let expires_at = Instant::now().checked_add(expires_in)?;
        Some(Self {
            access_token,
            expires_at,
        })
    }

    pub fn is_fresh(&self) -> bool {
        self.expires_at > Instant::now() + EXPIRY_MARGIN
    }
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default = "default_expires_in")]
    expires_in: u64,
}

fn default_expires_in() -> u64 {
    3600
}

#[derive(Deserialize)]
struct Listing {
    data: Option<ListingData>,
}

#[derive(Deserialize)]
struct ListingData {
    #[serde(default)]
    children: Vec<Child>,
}

#[derive(Deserialize)]
struct Child {
    data: Option<Post>,
}

#[derive(Deserialize)]
struct Post {
    title: Option<String>,
    permalink: Option<String>,
}

/// Newest posts of one subreddit through the authenticated JSON API.
pub struct RedditSource {
    client: Client,
    config: RedditConfig,
    limit: u32,
    credential: Mutex<Option<Credential>>,
}

impl RedditSource {
    pub fn new(client: Client, config: RedditConfig, limit: u32) -> Self {
        Self {
            client,
            config,
            limit,
            credential: Mutex::new(None),
        }
    }

    fn listing_url(&self) -> String {
        format!(
            "{}/r/{}/new.json",
            self.config.api_base.trim_end_matches('/'),
            self.config.subreddit
        )
    }

    // Holding the lock across the token request keeps concurrent callers
    // from each requesting their own token.
    async fn access_token(&self) -> Result<String, NewsError> {
        let mut cached = self.credential.lock().await;

        if let Some(credential) = cached.as_ref().filter(|c| c.is_fresh()) {
            return Ok(credential.access_token.clone());
        }

        let credential = self.request_token().await?;
        let token = credential.access_token.clone();
        *cached = Some(credential);
        Ok(token)
    }

    async fn invalidate(&self) {
        *self.credential.lock().await = None;
    }

    async fn request_token(&self) -> Result<Credential, NewsError> {
        let (client_id, client_secret) = match (&self.config.client_id, &self.config.client_secret) {
            (Some(id), Some(secret)) if !id.is_empty() && !secret.is_empty() => (id, secret),
            _ => return Err(NewsError::MissingCredentials),
        };

        let url = &self.config.oauth_url;
        debug!("Requesting Reddit access token");

        let response = self
            .client
            .post(url)
            .basic_auth(client_id, Some(client_secret))
            .form(&[("grant_type", "client_credentials")])
            .send()
            .await
            .map_err(|source| NewsError::Request {
                url: url.clone(),
                source,
            })?;

        let response = ensure_success(url, response).await?;
        let token: TokenResponse = response.json().await.map_err(|e| NewsError::Payload {
            url: url.clone(),
            reason: e.to_string(),
        })?;

        let expires_in = token.expires_in;
        let credential = Credential::new(token.access_token, Duration::from_secs(expires_in))
            .ok_or_else(|| NewsError::Payload {
                url: url.clone(),
                reason: format!("token lifetime out of range: {}s", expires_in),
            })?;

        info!("Obtained Reddit access token valid for {}s", expires_in);
        Ok(credential)
    }

    async fn get_listing(&self, token: &str) -> Result<Response, NewsError> {
        let url = self.listing_url();
        self.client
            .get(&url)
            .bearer_auth(token)
            .query(&[("limit", self.limit)])
            .send()
            .await
            .map_err(|source| NewsError::Request { url, source })
    }
}

#[async_trait]
impl NewsSource for RedditSource {
    async fn fetch(&self) -> Result<Vec<Article>, NewsError> {
        let token = self.access_token().await?;
        let mut response = self.get_listing(&token).await?;

        if response.status() == StatusCode::UNAUTHORIZED {
            warn!("Reddit rejected the access token, retrying with a new one");
            self.invalidate().await;
            let token = self.access_token().await?;
            response = self.get_listing(&token).await?;
        }

        let url = self.listing_url();
        let response = ensure_success(&url, response).await?;
        let listing: Listing = response.json().await.map_err(|e| NewsError::Payload {
            url: url.clone(),
            reason: e.to_string(),
        })?;

        let articles = articles_from_listing(listing);
        info!("Fetched {} posts from r/{}", articles.len(), self.config.subreddit);
        Ok(articles)
    }
}

async fn ensure_success(url: &str, response: Response) -> Result<Response, NewsError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    Err(NewsError::Status {
        url: url.to_string(),
        status,
        body: excerpt(&body),
    })
}

fn articles_from_listing(listing: Listing) -> Vec<Article> {
    let children = listing.data.map(|d| d.children).unwrap_or_default();

    children
        .into_iter()
        .filter_map(|child| child.data)
        .filter_map(|post| {
            let permalink = post.permalink.filter(|p| !p.is_empty())?;
            Some(Article {
                title: post.title.unwrap_or_else(|| UNTITLED.to_string()),
                source: SOURCE_NAME.to_string(),
                url: format!("{}{}", PERMALINK_BASE, permalink),
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_string_contains, header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn source_for(server: &MockServer) -> RedditSource {
        let config = RedditConfig {
            subreddit: "marketing".to_string(),
            client_id: Some("id".to_string()),
            client_secret: Some("secret".to_string()),
            oauth_url: format!("{}/api/v1/access_token", server.uri()),
            api_base: server.uri(),
        };
        RedditSource::new(Client::new(), config, 30)
    }

    fn token_body(token: &str, expires_in: u64) -> serde_json::Value {
        json!({ "access_token": token, "token_type": "bearer", "expires_in": expires_in })
    }

    fn listing_body() -> serde_json::Value {
        json!({
            "kind": "Listing",
            "data": {
                "children": [
                    { "kind": "t3", "data": { "title": "First post", "permalink": "/r/marketing/comments/1/first/" } },
                    { "kind": "t3", "data": { "permalink": "/r/marketing/comments/2/untitled/" } },
                    { "kind": "t3", "data": { "title": "No link" } },
                    { "kind": "t3", "data": { "title": "Empty link", "permalink": "" } }
                ]
            }
        })
    }

    async fn mount_token(server: &MockServer, token: &str, expires_in: u64, times: u64) {
        Mock::given(method("POST"))
            .and(path("/api/v1/access_token"))
            .and(header("authorization", "Basic aWQ6c2VjcmV0"))
            .and(body_string_contains("grant_type=client_credentials"))
            .respond_with(ResponseTemplate::new(200).set_body_json(token_body(token, expires_in)))
            .up_to_n_times(times)
            .expect(times)
            .mount(server)
            .await;
    }

    mod mapping_tests {
        use super::*;

        #[test]
        fn test_articles_from_listing() {
            let listing: Listing = serde_json::from_value(listing_body()).unwrap();
            let articles = articles_from_listing(listing);

            assert_eq!(articles.len(), 2);
            assert_eq!(articles[0].title, "First post");
            assert_eq!(articles[0].source, "Reddit");
            assert_eq!(
                articles[0].url,
                "https://www.reddit.com/r/marketing/comments/1/first/"
            );
            assert_eq!(articles[1].title, "Untitled");
        }

        #[test]
        fn test_listing_without_data_is_empty() {
            let listing: Listing = serde_json::from_value(json!({ "kind": "Listing" })).unwrap();
            assert!(articles_from_listing(listing).is_empty());
        }
    }

    mod credential_tests {
        use super::*;

        #[test]
        fn test_long_lived_credential_is_fresh() {
            let credential = Credential::new("t".to_string(), Duration::from_secs(3600)).unwrap();
            assert!(credential.is_fresh());
        }

        #[test]
        fn test_credential_inside_margin_is_stale() {
            let credential = Credential::new("t".to_string(), Duration::from_secs(3)).unwrap();
            assert!(!credential.is_fresh());
        }

        #[test]
        fn test_unrepresentable_lifetime_is_rejected() {
            assert!(Credential::new("t".to_string(), Duration::from_secs(u64::MAX)).is_none());
        }
    }

    mod fetch_tests {
        use super::*;

        #[tokio::test]
        async fn test_fetch_maps_posts() {
            let server = MockServer::start().await;
            mount_token(&server, "tok", 3600, 1).await;

            Mock::given(method("GET"))
                .and(path("/r/marketing/new.json"))
                .and(query_param("limit", "30"))
                .and(header("authorization", "Bearer tok"))
                .respond_with(ResponseTemplate::new(200).set_body_json(listing_body()))
                .expect(1)
                .mount(&server)
                .await;

            let articles = source_for(&server).fetch().await.unwrap();

            assert_eq!(articles.len(), 2);
            assert_eq!(articles[0].title, "First post");
        }

        #[tokio::test]
        async fn test_token_is_reused_while_fresh() {
            let server = MockServer::start().await;
            mount_token(&server, "tok", 3600, 1).await;

            Mock::given(method("GET"))
                .and(path("/r/marketing/new.json"))
                .respond_with(ResponseTemplate::new(200).set_body_json(listing_body()))
                .expect(2)
                .mount(&server)
                .await;

            let source = source_for(&server);
            source.fetch().await.unwrap();
            source.fetch().await.unwrap();
        }

        #[tokio::test]
        async fn test_expired_token_is_refreshed() {
            let server = MockServer::start().await;
            mount_token(&server, "tok", 0, 2).await;

            Mock::given(method("GET"))
                .and(path("/r/marketing/new.json"))
                .respond_with(ResponseTemplate::new(200).set_body_json(listing_body()))
                .expect(2)
                .mount(&server)
                .await;

            let source = source_for(&server);
            source.fetch().await.unwrap();
            source.fetch().await.unwrap();
        }

        #[tokio::test]
        async fn test_unauthorized_triggers_one_refresh() {
            let server = MockServer::start().await;
            mount_token(&server, "old", 3600, 1).await;
            mount_token(&server, "new", 3600, 1).await;

            Mock::given(method("GET"))
                .and(path("/r/marketing/new.json"))
                .and(header("authorization", "Bearer old"))
                .respond_with(ResponseTemplate::new(401))
                .expect(1)
                .mount(&server)
                .await;

            Mock::given(method("GET"))
                .and(path("/r/marketing/new.json"))
                .and(header("authorization", "Bearer new"))
                .respond_with(ResponseTemplate::new(200).set_body_json(listing_body()))
                .expect(1)
                .mount(&server)
                .await;

            let articles = source_for(&server).fetch().await.unwrap();
            assert_eq!(articles.len(), 2);
        }

        #[tokio::test]
        async fn test_second_unauthorized_is_an_error() {
            let server = MockServer::start().await;
            mount_token(&server, "tok", 3600, 2).await;

            Mock::given(method("GET"))
                .and(path("/r/marketing/new.json"))
                .respond_with(ResponseTemplate::new(401))
                .expect(2)
                .mount(&server)
                .await;

            let result = source_for(&server).fetch().await;
            assert!(matches!(
                result,
                Err(NewsError::Status { status, .. }) if status == StatusCode::UNAUTHORIZED
            ));
        }

        #[tokio::test]
        async fn test_server_error_is_not_retried() {
            let server = MockServer::start().await;
            mount_token(&server, "tok", 3600, 1).await;

            Mock::given(method("GET"))
                .and(path("/r/marketing/new.json"))
                .respond_with(ResponseTemplate::new(503).set_body_string("busy"))
                .expect(1)
                .mount(&server)
                .await;

            let result = source_for(&server).fetch().await;
            match result {
                Err(NewsError::Status { status, body, .. }) => {
                    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
                    assert_eq!(body, "busy");
                }
                other => panic!("unexpected result: {:?}", other),
            }
        }

        #[tokio::test]
        async fn test_malformed_listing_is_a_payload_error() {
            let server = MockServer::start().await;
            mount_token(&server, "tok", 3600, 1).await;

            Mock::given(method("GET"))
                .and(path("/r/marketing/new.json"))
                .respond_with(ResponseTemplate::new(200).set_body_string("<html>nope</html>"))
                .mount(&server)
                .await;

            let result = source_for(&server).fetch().await;
            assert!(matches!(result, Err(NewsError::Payload { .. })));
        }

        #[tokio::test]
        async fn test_failed_token_request_is_an_error() {
            let server = MockServer::start().await;

            Mock::given(method("POST"))
                .and(path("/api/v1/access_token"))
                .respond_with(ResponseTemplate::new(401).set_body_string("bad creds"))
                .expect(1)
                .mount(&server)
                .await;

            let result = source_for(&server).fetch().await;
            assert!(matches!(
                result,
                Err(NewsError::Status { status, .. }) if status == StatusCode::UNAUTHORIZED
            ));
        }

        #[tokio::test]
        async fn test_huge_token_lifetime_is_a_payload_error() {
            let server = MockServer::start().await;
            mount_token(&server, "tok", u64::MAX, 1).await;

            let result = source_for(&server).fetch().await;

            assert!(matches!(result, Err(NewsError::Payload { .. })));
            let requests = server.received_requests().await.unwrap();
            assert_eq!(requests.len(), 1);
        }

        #[tokio::test]
        async fn test_missing_credentials_make_no_request() {
            let server = MockServer::start().await;
            let mut source = source_for(&server);
            source.config.client_secret = None;

            let result = source.fetch().await;

            assert!(matches!(result, Err(NewsError::MissingCredentials)));
            assert!(server.received_requests().await.unwrap().is_empty());
        }
    }
}

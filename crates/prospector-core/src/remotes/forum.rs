//! Forum client: fetches candidate posts per origin.
//!
//! [`HttpForumClient`] speaks the public listing JSON endpoint
//! (`GET <base>/r/<origin>/hot.json`). The trait seam lets the
//! orchestrator run against scripted forums in tests.

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::debug;

use prospector_llm::error::{RemoteError, Result};
use prospector_types::Post;

/// Fetches candidate posts from one forum origin.
#[async_trait]
pub trait ForumClient: Send + Sync {
    /// Fetch up to `limit` posts from `origin` scoring at least
    /// `min_score`.
    async fn fetch_posts(&self, origin: &str, min_score: i64, limit: usize)
        -> Result<Vec<Post>>;
}

/// HTTP implementation over the public listing endpoint.
pub struct HttpForumClient {
    base_url: String,
    http: reqwest::Client,
}

impl HttpForumClient {
    pub fn new(base_url: String, timeout: Duration) -> Self {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent("prospector/0.4")
            .build()
            .unwrap_or_default();
        Self { base_url, http }
    }
}

// Wire shape of the listing endpoint.
#[derive(Deserialize)]
struct Listing {
    data: ListingData,
}

#[derive(Deserialize)]
struct ListingData {
    children: Vec<ListingChild>,
}

#[derive(Deserialize)]
struct ListingChild {
    data: serde_json::Value,
}

#[async_trait]
impl ForumClient for HttpForumClient {
    async fn fetch_posts(
        &self,
        origin: &str,
        min_score: i64,
        limit: usize,
    ) -> Result<Vec<Post>> {
        let base = self.base_url.trim_end_matches('/');
        let url = format!("{base}/r/{origin}/hot.json?limit={limit}");

        let response = self.http.get(&url).send().await.map_err(|e| {
            if e.is_timeout() {
                RemoteError::Timeout
            } else {
                RemoteError::Http(e)
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(RemoteError::from_status(status.as_u16(), body));
        }

        let listing: Listing = response
            .json()
            .await
            .map_err(|e| RemoteError::InvalidResponse(format!("listing parse: {e}")))?;

        let posts: Vec<Post> = listing
            .data
            .children
            .into_iter()
            .filter_map(|child| post_from_listing(origin, child.data))
            .filter(|post| post.score >= min_score)
            .collect();

        debug!(origin, count = posts.len(), "forum posts fetched");
        Ok(posts)
    }
}

/// Map one listing entry into a [`Post`]. Entries missing an id or
/// title are skipped rather than failing the whole fetch.
fn post_from_listing(origin: &str, data: serde_json::Value) -> Option<Post> {
    let id = data.get("id")?.as_str()?.to_string();
    let title = data.get("title")?.as_str()?.to_string();
    Some(Post {
        id,
        title,
        body: data
            .get("selftext")
            .and_then(|v| v.as_str())
            .unwrap_or_default()
            .to_string(),
        origin: origin.to_string(),
        author: data
            .get("author")
            .and_then(|v| v.as_str())
            .unwrap_or_default()
            .to_string(),
        score: data.get("score").and_then(|v| v.as_i64()).unwrap_or(0),
        url: data
            .get("url")
            .and_then(|v| v.as_str())
            .unwrap_or_default()
            .to_string(),
        original_ts: data
            .get("created_utc")
            .and_then(|v| v.as_f64())
            .unwrap_or(0.0) as i64,
        raw_json: data.to_string(),
    })
}

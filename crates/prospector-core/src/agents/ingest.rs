//! Ingest stage: fetch candidate posts from the configured origins.
//!
//! The only stage that talks to the forum remote and the only one that
//! returns multiple items. A failing origin is logged and skipped so
//! one flaky forum cannot starve the others; an empty overall result is
//! fine (the run simply has nothing new to do).

use tracing::warn;

use prospector_llm::{RemoteKind, RetryPolicy};
use prospector_types::Post;

use crate::remotes::ForumClient;
use crate::sanitize;

/// Fetch, score-filter, and sanitize posts from every origin in order.
pub async fn fetch_candidates(
    client: &dyn ForumClient,
    retry: &RetryPolicy,
    origins: &[String],
    min_score: i64,
    limit_per_origin: usize,
) -> Vec<Post> {
    let mut posts = Vec::new();
    for origin in origins {
        let fetched = retry
            .execute(RemoteKind::Forum, || {
                client.fetch_posts(origin, min_score, limit_per_origin)
            })
            .await;
        match fetched {
            Ok(batch) => posts.extend(batch.into_iter().map(sanitize_post)),
            Err(e) => {
                warn!(origin = %origin, error = %e, "origin fetch failed; skipping");
            }
        }
    }
    posts
}

/// Cleanse every externally-sourced text field before it can reach a
/// prompt or the database.
fn sanitize_post(post: Post) -> Post {
    Post {
        title: sanitize::store_text(&sanitize::ingress(&post.title)),
        body: sanitize::store_text(&sanitize::ingress(&post.body)),
        author: sanitize::store_text(&sanitize::ingress(&post.author)),
        url: sanitize::store_text(&post.url),
        raw_json: sanitize::store_text(&post.raw_json),
        ..post
    }
}

// Trait boundaries between the engine and its collaborators. Real
// implementations: twitter-client (source), store.rs (documents),
// forwarder.rs (enrichment). testing.rs provides in-memory doubles.

use async_trait::async_trait;
use serde_json::Value;

use birdwatch_common::HarvestError;
use twitter_client::{RateLimitWindow, Status, TwitterClient, TwitterError};

/// Identity of a rate-limited endpoint: the limit-status document is
/// keyed by resource family, then endpoint path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitKey {
    pub resource: &'static str,
    pub endpoint: &'static str,
}

pub const TIMELINE_LIMIT_KEY: RateLimitKey = RateLimitKey {
    resource: "statuses",
    endpoint: "/statuses/user_timeline",
};

pub const SEARCH_LIMIT_KEY: RateLimitKey = RateLimitKey {
    resource: "search",
    endpoint: "/search/tweets",
};

/// Read side of the source API.
#[async_trait]
pub trait StatusSource: Send + Sync {
    async fn user_timeline(
        &self,
        screen_name: &str,
        since_id: Option<u64>,
        max_id: Option<u64>,
        count: u32,
    ) -> Result<Vec<Status>, TwitterError>;

    async fn mentions_of(
        &self,
        screen_name: &str,
        since_id: Option<u64>,
        max_id: Option<u64>,
        count: u32,
    ) -> Result<Vec<Status>, TwitterError>;

    /// Current limit window for one endpoint, if the API reports it.
    async fn rate_limit_window(
        &self,
        key: RateLimitKey,
    ) -> Result<Option<RateLimitWindow>, TwitterError>;
}

#[async_trait]
impl StatusSource for TwitterClient {
    async fn user_timeline(
        &self,
        screen_name: &str,
        since_id: Option<u64>,
        max_id: Option<u64>,
        count: u32,
    ) -> Result<Vec<Status>, TwitterError> {
        TwitterClient::user_timeline(self, screen_name, since_id, max_id, count).await
    }

    async fn mentions_of(
        &self,
        screen_name: &str,
        since_id: Option<u64>,
        max_id: Option<u64>,
        count: u32,
    ) -> Result<Vec<Status>, TwitterError> {
        TwitterClient::search_mentions(self, screen_name, since_id, max_id, count).await
    }

    async fn rate_limit_window(
        &self,
        key: RateLimitKey,
    ) -> Result<Option<RateLimitWindow>, TwitterError> {
        let status = self.rate_limit_status().await?;
        Ok(status.window(key.resource, key.endpoint))
    }
}

/// Outcome of one idempotent document write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PersistOutcome {
    Created,
    Updated,
}

/// Query + upsert surface of the indexed store.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Number of non-reply documents authored by `screen_name`.
    async fn count_posts(&self, screen_name: &str) -> Result<u64, HarvestError>;

    /// Highest-id non-reply document authored by `screen_name`.
    async fn latest_post_id(&self, screen_name: &str) -> Result<Option<u64>, HarvestError>;

    /// The author's user id, read off any stored document authored by
    /// `screen_name`.
    async fn author_user_id(&self, screen_name: &str) -> Result<Option<u64>, HarvestError>;

    /// Highest-id document addressed to `user_id`.
    async fn latest_mention_id(&self, user_id: u64) -> Result<Option<u64>, HarvestError>;

    /// Full-document upsert keyed by the status id. Writing the same id
    /// twice leaves the store in the same logical state as writing once.
    async fn upsert(&self, id: u64, raw: &Value) -> Result<PersistOutcome, HarvestError>;
}

/// Downstream enrichment pipeline trigger.
#[async_trait]
pub trait EnrichmentSink: Send + Sync {
    async fn forward(&self, batch: &[Value]) -> Result<(), HarvestError>;
}

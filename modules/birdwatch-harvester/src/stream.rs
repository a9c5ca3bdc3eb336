// The two harvest flows (a subject's own posts, and the replies/mentions
// addressed to it) share one engine; a StreamQuery supplies the
// flow-specific watermark lookup and page request.

use async_trait::async_trait;
use tracing::info;

use birdwatch_common::{HarvestError, Subject};
use twitter_client::{Status, TwitterError};

use crate::traits::{
    DocumentStore, RateLimitKey, StatusSource, SEARCH_LIMIT_KEY, TIMELINE_LIMIT_KEY,
};

/// Where a scan starts, as resolved against the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanStart {
    /// Fetch everything newer than this id (None = full history).
    Since(Option<u64>),
    /// The flow's prerequisite is missing; skip the subject without
    /// touching the source API.
    Skip,
}

#[async_trait]
pub trait StreamQuery: Send + Sync {
    fn name(&self) -> &'static str;

    fn rate_limit_key(&self) -> RateLimitKey;

    /// Resolve the watermark for this flow. Read-only.
    async fn scan_start(
        &self,
        store: &dyn DocumentStore,
        subject: &Subject,
    ) -> Result<ScanStart, HarvestError>;

    /// Request one page of at most `count` items within `(since_id, max_id]`.
    async fn page(
        &self,
        source: &dyn StatusSource,
        subject: &Subject,
        since_id: Option<u64>,
        max_id: Option<u64>,
        count: u32,
    ) -> Result<Vec<Status>, TwitterError>;
}

/// A subject's own posts.
pub struct TimelineStream;

#[async_trait]
impl StreamQuery for TimelineStream {
    fn name(&self) -> &'static str {
        "timeline"
    }

    fn rate_limit_key(&self) -> RateLimitKey {
        TIMELINE_LIMIT_KEY
    }

    async fn scan_start(
        &self,
        store: &dyn DocumentStore,
        subject: &Subject,
    ) -> Result<ScanStart, HarvestError> {
        let total = store.count_posts(&subject.screen_name).await?;
        if total == 0 {
            info!(subject = %subject.screen_name, "no stored posts, fetching full history");
            return Ok(ScanStart::Since(None));
        }

        let latest = store.latest_post_id(&subject.screen_name).await?;
        info!(
            subject = %subject.screen_name,
            stored = total,
            watermark = ?latest,
            "resolved timeline watermark"
        );
        Ok(ScanStart::Since(latest))
    }

    async fn page(
        &self,
        source: &dyn StatusSource,
        subject: &Subject,
        since_id: Option<u64>,
        max_id: Option<u64>,
        count: u32,
    ) -> Result<Vec<Status>, TwitterError> {
        source
            .user_timeline(&subject.screen_name, since_id, max_id, count)
            .await
    }
}

/// Replies and mentions addressed to a subject.
pub struct MentionStream;

#[async_trait]
impl StreamQuery for MentionStream {
    fn name(&self) -> &'static str {
        "mentions"
    }

    fn rate_limit_key(&self) -> RateLimitKey {
        SEARCH_LIMIT_KEY
    }

    async fn scan_start(
        &self,
        store: &dyn DocumentStore,
        subject: &Subject,
    ) -> Result<ScanStart, HarvestError> {
        // Mentions are indexed by recipient user id, not screen name; an
        // already-stored authored document is the only place to read that
        // id from.
        let Some(user_id) = store.author_user_id(&subject.screen_name).await? else {
            return Ok(ScanStart::Skip);
        };

        let latest = store.latest_mention_id(user_id).await?;
        info!(
            subject = %subject.screen_name,
            user_id,
            watermark = ?latest,
            "resolved mention watermark"
        );
        Ok(ScanStart::Since(latest))
    }

    async fn page(
        &self,
        source: &dyn StatusSource,
        subject: &Subject,
        since_id: Option<u64>,
        max_id: Option<u64>,
        count: u32,
    ) -> Result<Vec<Status>, TwitterError> {
        source
            .mentions_of(&subject.screen_name, since_id, max_id, count)
            .await
    }
}

// Incremental harvest engine: watermark-anchored backward pagination with
// quota-governed retries, idempotent persistence, batch forwarding.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tracing::{info, warn};

use birdwatch_common::{HarvestError, Subject};
use twitter_client::{Status, TwitterError};

use crate::quota::QuotaGovernor;
use crate::stream::{ScanStart, StreamQuery};
use crate::traits::{DocumentStore, EnrichmentSink, PersistOutcome, StatusSource};

/// Outcome counters for one subject scan.
#[derive(Debug, Default)]
pub struct HarvestStats {
    pub pages: u32,
    pub fetched: u32,
    /// Items the API returned at or below the watermark, dropped.
    pub boundary_rejected: u32,
    pub created: u32,
    pub updated: u32,
    pub persist_failed: u32,
    pub forwarded: u32,
    /// Subject skipped before fetching (missing prerequisite).
    pub skipped: bool,
}

impl fmt::Display for HarvestStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.skipped {
            return write!(f, "skipped (prerequisite missing)");
        }
        write!(
            f,
            "{} fetched over {} pages, {} created, {} updated, {} failed, {} forwarded",
            self.fetched, self.pages, self.created, self.updated, self.persist_failed,
            self.forwarded
        )?;
        if self.boundary_rejected > 0 {
            write!(f, ", {} below watermark", self.boundary_rejected)?;
        }
        Ok(())
    }
}

pub struct Harvester {
    store: Arc<dyn DocumentStore>,
    sink: Option<Arc<dyn EnrichmentSink>>,
    governor: QuotaGovernor,
    page_size: u32,
}

impl Harvester {
    pub fn new(
        store: Arc<dyn DocumentStore>,
        sink: Option<Arc<dyn EnrichmentSink>>,
        governor: QuotaGovernor,
        page_size: u32,
    ) -> Self {
        Self {
            store,
            sink,
            governor,
            page_size,
        }
    }

    /// Scan one subject: resolve the watermark, drain the window, persist
    /// each item, forward the batch. Nothing reaches the store until the
    /// fetch phase has terminated cleanly.
    pub async fn harvest(
        &self,
        stream: &dyn StreamQuery,
        source: &dyn StatusSource,
        subject: &Subject,
    ) -> Result<HarvestStats, HarvestError> {
        let mut stats = HarvestStats::default();

        let since_id = match stream.scan_start(self.store.as_ref(), subject).await? {
            ScanStart::Since(id) => id,
            ScanStart::Skip => {
                warn!(
                    subject = %subject.screen_name,
                    stream = stream.name(),
                    "prerequisite missing, skipping subject"
                );
                stats.skipped = true;
                return Ok(stats);
            }
        };

        let batch = self
            .fetch_new(stream, source, subject, since_id, &mut stats)
            .await?;
        if batch.is_empty() {
            info!(subject = %subject.screen_name, stream = stream.name(), "nothing new");
            return Ok(stats);
        }

        let payloads = self.persist(&batch, subject, &mut stats).await;

        if let Some(sink) = &self.sink {
            match sink.forward(&payloads).await {
                Ok(()) => stats.forwarded = payloads.len() as u32,
                Err(e) => {
                    // Persistence already completed; forwarding is
                    // fire-and-forget.
                    warn!(subject = %subject.screen_name, error = %e, "enrichment forward failed");
                }
            }
        }

        Ok(stats)
    }

    /// Collect every item newer than `since_id`, walking `max_id`
    /// backward one page at a time until the window is exhausted. Eager:
    /// the whole window is held in memory until the scan terminates.
    async fn fetch_new(
        &self,
        stream: &dyn StreamQuery,
        source: &dyn StatusSource,
        subject: &Subject,
        since_id: Option<u64>,
        stats: &mut HarvestStats,
    ) -> Result<Vec<Status>, HarvestError> {
        let mut collected = Vec::new();
        let mut max_id: Option<u64> = None;
        let mut waited = Duration::ZERO;

        loop {
            let page = match stream
                .page(source, subject, since_id, max_id, self.page_size)
                .await
            {
                Ok(page) => page,
                Err(TwitterError::RateLimited { .. }) => {
                    self.governor
                        .await_quota(
                            source,
                            stream.rate_limit_key(),
                            &subject.screen_name,
                            &mut waited,
                        )
                        .await?;
                    // Cursor state unchanged; retry the same request.
                    continue;
                }
                Err(e) => return Err(HarvestError::Source(e.to_string())),
            };

            stats.pages += 1;
            if page.is_empty() {
                break;
            }

            let page_len = page.len() as u32;
            let page_min = page.iter().map(|s| s.id).min().unwrap_or(0);

            // Watermark boundary: a well-behaved API never returns ids at
            // or below since_id; a violating item is dropped, not trusted.
            for status in page {
                if let Some(since) = since_id {
                    if status.id <= since {
                        warn!(
                            subject = %subject.screen_name,
                            id = status.id,
                            since_id = since,
                            "item at or below watermark, dropping"
                        );
                        stats.boundary_rejected += 1;
                        continue;
                    }
                }
                collected.push(status);
            }

            // Exclusive upper bound for the next page. The cursor must
            // move strictly downward or the loop would never terminate.
            let next_max = page_min.saturating_sub(1);
            if let Some(prev) = max_id {
                if next_max >= prev {
                    return Err(HarvestError::CursorStalled { max_id: prev });
                }
            }
            max_id = Some(next_max);

            info!(
                subject = %subject.screen_name,
                stream = stream.name(),
                page = page_len,
                total = collected.len(),
                "page collected"
            );

            // An under-filled page is treated as the final one, saving
            // the trailing empty-page call. Documented approximation: a
            // one-page-early stop is healed by the next run's watermark.
            if page_len < self.page_size {
                break;
            }
        }

        stats.fetched = collected.len() as u32;
        Ok(collected)
    }

    /// Upsert the batch one document at a time. A failed write skips that
    /// item only; every raw payload still joins the forward batch.
    async fn persist(
        &self,
        batch: &[Status],
        subject: &Subject,
        stats: &mut HarvestStats,
    ) -> Vec<Value> {
        let mut payloads = Vec::with_capacity(batch.len());
        for status in batch {
            match self.store.upsert(status.id, &status.raw).await {
                Ok(PersistOutcome::Created) => stats.created += 1,
                Ok(PersistOutcome::Updated) => stats.updated += 1,
                Err(e) => {
                    warn!(
                        subject = %subject.screen_name,
                        id = status.id,
                        error = %e,
                        "persist failed, skipping item"
                    );
                    stats.persist_failed += 1;
                }
            }
            payloads.push(status.raw.clone());
        }
        payloads
    }
}

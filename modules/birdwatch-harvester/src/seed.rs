// Queue seeding: scan the service indices and enqueue every service that
// names a screen name onto both flow queues.

use serde_json::Value;
use tracing::{info, warn};

use birdwatch_common::{Config, ServiceRecord};

use crate::queue::WorkQueue;
use crate::store::EsStore;

#[derive(Debug, Default)]
pub struct SeedStats {
    pub enqueued: u32,
    pub skipped: u32,
}

pub async fn seed(
    store: &EsStore,
    queue: &mut WorkQueue,
    config: &Config,
) -> anyhow::Result<SeedStats> {
    anyhow::ensure!(
        !config.service_indices.is_empty(),
        "SERVICE_INDICES names no indices to seed from"
    );

    let available = store.indices().await?;
    anyhow::ensure!(
        !available.is_empty(),
        "the store reports no indices at all; nothing to seed from"
    );

    let mut usable = Vec::new();
    for wanted in &config.service_indices {
        match available.iter().find(|info| &info.index == wanted) {
            None => warn!(index = %wanted, "service index not found, skipping"),
            Some(info) if info.doc_count() == 0 => {
                warn!(index = %wanted, "service index is empty, skipping")
            }
            Some(_) => usable.push(wanted.clone()),
        }
    }
    anyhow::ensure!(!usable.is_empty(), "no usable service indices");

    let mut stats = SeedStats::default();
    for index in usable {
        let hits = store.services(&index).await?;
        info!(index = %index, services = hits.len(), "scanning service index");

        for hit in hits {
            match parse_record(&hit) {
                Some(record) => {
                    info!(
                        organisation = record.source.organisation_name.as_deref().unwrap_or("-"),
                        screen_name = record.source.twitter_screen_name.as_deref().unwrap_or("-"),
                        "enqueueing service"
                    );
                    queue.push(&config.feed_queue, &hit).await?;
                    queue.push(&config.replies_queue, &hit).await?;
                    stats.enqueued += 1;
                }
                None => {
                    warn!(index = %index, "service has no screen name, skipping");
                    stats.skipped += 1;
                }
            }
        }
    }

    Ok(stats)
}

/// A hit seeds the queues only when it parses and names a screen name.
fn parse_record(hit: &Value) -> Option<ServiceRecord> {
    let record: ServiceRecord = serde_json::from_value(hit.clone()).ok()?;
    record
        .source
        .twitter_screen_name
        .as_deref()
        .filter(|s| !s.is_empty())?;
    Some(record)
}

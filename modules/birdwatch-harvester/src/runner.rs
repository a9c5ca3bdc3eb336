// Drains one work queue subject by subject. Sequential on purpose:
// subjects usually share the default credential set, so their quota
// window is a shared resource and serializing keeps the governor's view
// of it coherent.

use std::fmt;
use std::time::Duration;

use tokio::time::Instant;
use tracing::{error, info, warn};

use birdwatch_common::{Config, HarvestError, Subject};
use twitter_client::{Credentials, TwitterClient};

use crate::engine::Harvester;
use crate::queue::WorkQueue;
use crate::stream::StreamQuery;

/// Aggregate counters for one run.
#[derive(Debug, Default)]
pub struct RunStats {
    pub subjects: u32,
    pub skipped: u32,
    pub failed: u32,
    pub fetched: u32,
    pub persisted: u32,
    pub forwarded: u32,
}

impl fmt::Display for RunStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "\n=== Harvest Run Complete ===")?;
        writeln!(f, "Subjects processed: {}", self.subjects)?;
        writeln!(f, "Subjects skipped:   {}", self.skipped)?;
        writeln!(f, "Subjects failed:    {}", self.failed)?;
        writeln!(f, "Items fetched:      {}", self.fetched)?;
        writeln!(f, "Items persisted:    {}", self.persisted)?;
        writeln!(f, "Items forwarded:    {}", self.forwarded)?;
        Ok(())
    }
}

/// Pop subjects until the queue is empty, harvesting each with a client
/// built from its resolved credentials.
pub async fn drain_queue(
    queue: &mut WorkQueue,
    queue_name: &str,
    stream: &dyn StreamQuery,
    harvester: &Harvester,
    config: &Config,
) -> anyhow::Result<RunStats> {
    let started = Instant::now();
    let run_budget = config.run_budget_secs.map(Duration::from_secs);
    let subject_budget = config.subject_budget_secs.map(Duration::from_secs);
    let mut stats = RunStats::default();

    loop {
        // Budget check sits before the destructive pop so unprocessed
        // subjects stay queued.
        if let Some(budget) = run_budget {
            if started.elapsed() >= budget {
                warn!(
                    queue = queue_name,
                    elapsed_secs = started.elapsed().as_secs(),
                    "run budget exhausted, leaving remaining subjects queued"
                );
                break;
            }
        }

        let Some(record) = queue.pop(queue_name).await? else {
            break;
        };

        let Some(subject) = record.into_subject() else {
            warn!(queue = queue_name, "record names no screen name, dropping");
            continue;
        };

        info!(
            subject = %subject.screen_name,
            organisation = subject.organisation.as_deref().unwrap_or("-"),
            stream = stream.name(),
            "processing subject"
        );

        let source = client_for(config, &subject);
        let scan = harvester.harvest(stream, &source, &subject);
        let result = match subject_budget {
            Some(budget) => tokio::time::timeout(budget, scan)
                .await
                .unwrap_or(Err(HarvestError::SubjectBudgetExceeded)),
            None => scan.await,
        };

        match result {
            Ok(scan_stats) => {
                info!(subject = %subject.screen_name, "{scan_stats}");
                stats.subjects += 1;
                if scan_stats.skipped {
                    stats.skipped += 1;
                }
                stats.fetched += scan_stats.fetched;
                stats.persisted += scan_stats.created + scan_stats.updated;
                stats.forwarded += scan_stats.forwarded;
            }
            Err(e) if e.is_subject_scoped() => {
                warn!(subject = %subject.screen_name, error = %e, "subject failed, continuing");
                stats.subjects += 1;
                stats.failed += 1;
            }
            Err(e) => {
                // Fetch/transport and store failures end the run; subjects
                // already popped but unprocessed are lost until re-seeded.
                error!(subject = %subject.screen_name, error = %e, "aborting run");
                return Err(e.into());
            }
        }
    }

    Ok(stats)
}

/// Immutable client configuration per subject: the override token pair
/// when present, else the default set. Built fresh each time rather than
/// mutating a shared handle.
fn client_for(config: &Config, subject: &Subject) -> TwitterClient {
    let mut credentials = Credentials {
        consumer_key: config.consumer_key.clone(),
        consumer_secret: config.consumer_secret.clone(),
        access_token: config.access_token.clone(),
        access_token_secret: config.access_token_secret.clone(),
    };

    if let Some(pair) = &subject.overrides {
        info!(subject = %subject.screen_name, "using subject-provided access tokens");
        credentials.access_token = pair.token.clone();
        credentials.access_token_secret = pair.secret.clone();
    }

    match &config.api_base_url {
        Some(url) => TwitterClient::with_base_url(credentials, url),
        None => TwitterClient::new(credentials),
    }
}

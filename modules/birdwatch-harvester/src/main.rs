use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::Utc;
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

use birdwatch_common::Config;
use birdwatch_harvester::engine::Harvester;
use birdwatch_harvester::forwarder::PipelineTrigger;
use birdwatch_harvester::queue::WorkQueue;
use birdwatch_harvester::quota::QuotaGovernor;
use birdwatch_harvester::resubmit::resubmit;
use birdwatch_harvester::runner::drain_queue;
use birdwatch_harvester::seed::seed;
use birdwatch_harvester::store::EsStore;
use birdwatch_harvester::stream::{MentionStream, StreamQuery, TimelineStream};
use birdwatch_harvester::traits::EnrichmentSink;

#[derive(Parser)]
#[command(name = "birdwatch", about = "Incremental social feed harvester")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Harvest tracked accounts' own posts from the feed queue
    Timeline,
    /// Harvest replies and mentions from the replies queue
    Mentions,
    /// Scan the service indices and populate both work queues
    Seed,
    /// Re-forward every stored document to the enrichment pipeline
    Resubmit,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env()
                .add_directive("birdwatch_harvester=info".parse()?)
                .add_directive("twitter_client=info".parse()?),
        )
        .init();

    let cli = Cli::parse();

    info!(started = %Utc::now(), "Birdwatch starting");
    let config = Config::from_env();
    config.log_redacted();

    let store = EsStore::new(&config.elastic_endpoint, &config.timeline_index);

    match cli.command {
        Command::Timeline => {
            run_harvest(&config, store, &TimelineStream, &config.feed_queue).await
        }
        Command::Mentions => {
            run_harvest(&config, store, &MentionStream, &config.replies_queue).await
        }
        Command::Seed => {
            let mut queue = WorkQueue::connect(&config.redis_url)
                .await
                .context("connecting to work queue")?;
            let stats = seed(&store, &mut queue, &config).await?;
            info!(
                enqueued = stats.enqueued,
                skipped = stats.skipped,
                "seeding complete"
            );
            Ok(())
        }
        Command::Resubmit => {
            let forward = config
                .forward
                .as_ref()
                .context("resubmission requires FORWARD_URL and FORWARD_PIPELINE")?;
            let sink = PipelineTrigger::new(forward);
            let stats = resubmit(&store, &sink).await?;
            info!(
                submitted = stats.submitted,
                failed = stats.failed,
                "resubmission complete"
            );
            Ok(())
        }
    }
}

async fn run_harvest(
    config: &Config,
    store: EsStore,
    stream: &dyn StreamQuery,
    queue_name: &str,
) -> Result<()> {
    let mut queue = WorkQueue::connect(&config.redis_url)
        .await
        .context("connecting to work queue")?;
    let pending = queue.len(queue_name).await?;
    info!(queue = queue_name, pending, stream = stream.name(), "draining work queue");

    let sink: Option<Arc<dyn EnrichmentSink>> = match &config.forward {
        Some(forward) => Some(Arc::new(PipelineTrigger::new(forward))),
        None => {
            info!("enrichment forwarding disabled");
            None
        }
    };

    let harvester = Harvester::new(
        Arc::new(store),
        sink,
        QuotaGovernor::new(Duration::from_secs(config.max_quota_wait_secs)),
        config.page_size,
    );

    let stats = drain_queue(&mut queue, queue_name, stream, &harvester, config).await?;
    info!("{stats}");
    Ok(())
}

use std::env;

use tracing::info;

/// Runtime configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    // Source API (default credential set, overridable per subject)
    pub consumer_key: String,
    pub consumer_secret: String,
    pub access_token: String,
    pub access_token_secret: String,
    /// Non-default API host, mainly for staging setups.
    pub api_base_url: Option<String>,

    // Indexed store
    pub elastic_endpoint: String,
    pub timeline_index: String,
    /// Service indices scanned by `seed`, comma-separated in the env.
    pub service_indices: Vec<String>,

    // Work queue
    pub redis_url: String,
    pub feed_queue: String,
    pub replies_queue: String,

    // Fetching
    pub page_size: u32,
    /// Cap on cumulative quota wait per subject, in seconds.
    pub max_quota_wait_secs: u64,
    pub subject_budget_secs: Option<u64>,
    pub run_budget_secs: Option<u64>,

    // Enrichment pipeline; absent = forwarding disabled
    pub forward: Option<ForwardConfig>,
}

#[derive(Debug, Clone)]
pub struct ForwardConfig {
    pub url: String,
    pub pipeline: String,
}

impl Config {
    /// Load configuration from environment variables.
    /// Panics with a clear message if required vars are missing.
    pub fn from_env() -> Self {
        let forward = if flag_env("FORWARD_ENABLED") {
            Some(ForwardConfig {
                url: required_env("FORWARD_URL"),
                pipeline: required_env("FORWARD_PIPELINE"),
            })
        } else {
            None
        };

        Self {
            consumer_key: required_env("TWITTER_CONSUMER_KEY"),
            consumer_secret: required_env("TWITTER_CONSUMER_SECRET"),
            access_token: required_env("TWITTER_ACCESS_TOKEN"),
            access_token_secret: required_env("TWITTER_ACCESS_TOKEN_SECRET"),
            api_base_url: env::var("TWITTER_API_URL").ok(),
            elastic_endpoint: required_env("ELASTIC_ENDPOINT"),
            timeline_index: env::var("ELASTIC_TIMELINE_INDEX")
                .unwrap_or_else(|_| "kb_twitter_raw".to_string()),
            service_indices: env::var("SERVICE_INDICES")
                .unwrap_or_default()
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect(),
            redis_url: required_env("REDIS_URL"),
            feed_queue: env::var("FEED_QUEUE")
                .unwrap_or_else(|_| "twitter_feed_services".to_string()),
            replies_queue: env::var("REPLIES_QUEUE")
                .unwrap_or_else(|_| "twitter_replies_services".to_string()),
            page_size: parsed_env("PAGE_SIZE", 200),
            max_quota_wait_secs: parsed_env("MAX_QUOTA_WAIT_SECS", 3600),
            subject_budget_secs: optional_parsed_env("SUBJECT_BUDGET_SECS"),
            run_budget_secs: optional_parsed_env("RUN_BUDGET_SECS"),
            forward,
        }
    }

    /// Log the effective configuration without credential material.
    pub fn log_redacted(&self) {
        info!(
            elastic_endpoint = %self.elastic_endpoint,
            timeline_index = %self.timeline_index,
            feed_queue = %self.feed_queue,
            replies_queue = %self.replies_queue,
            page_size = self.page_size,
            max_quota_wait_secs = self.max_quota_wait_secs,
            forwarding = self.forward.is_some(),
            "Configuration loaded"
        );
    }
}

fn required_env(key: &str) -> String {
    env::var(key).unwrap_or_else(|_| panic!("{key} environment variable is required"))
}

fn flag_env(key: &str) -> bool {
    matches!(
        env::var(key).as_deref(),
        Ok("1") | Ok("true") | Ok("TRUE") | Ok("yes")
    )
}

fn parsed_env<T: std::str::FromStr>(key: &str, default: T) -> T {
    match env::var(key) {
        Ok(v) => v
            .parse()
            .unwrap_or_else(|_| panic!("{key} must be a number")),
        Err(_) => default,
    }
}

fn optional_parsed_env<T: std::str::FromStr>(key: &str) -> Option<T> {
    env::var(key)
        .ok()
        .map(|v| v.parse().unwrap_or_else(|_| panic!("{key} must be a number")))
}

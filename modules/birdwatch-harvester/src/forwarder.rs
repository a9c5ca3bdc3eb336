// Enrichment pipeline trigger. Persistence has already completed by the
// time this fires; failures are logged by the caller and never retried.

use async_trait::async_trait;
use serde_json::Value;
use tracing::info;

use birdwatch_common::{ForwardConfig, HarvestError};

use crate::traits::EnrichmentSink;

pub struct PipelineTrigger {
    http: reqwest::Client,
    url: String,
    pipeline: String,
}

impl PipelineTrigger {
    pub fn new(config: &ForwardConfig) -> Self {
        Self {
            http: reqwest::Client::new(),
            url: config.url.clone(),
            pipeline: config.pipeline.clone(),
        }
    }
}

#[async_trait]
impl EnrichmentSink for PipelineTrigger {
    async fn forward(&self, batch: &[Value]) -> Result<(), HarvestError> {
        let payload =
            serde_json::to_string(batch).map_err(|e| HarvestError::Forward(e.to_string()))?;

        let part = reqwest::multipart::Part::text(payload)
            .file_name("input.json")
            .mime_str("application/json")
            .map_err(|e| HarvestError::Forward(e.to_string()))?;
        let form = reqwest::multipart::Form::new().part("input", part);

        let resp = self
            .http
            .post(&self.url)
            .query(&[("pipeline", self.pipeline.as_str())])
            .multipart(form)
            .send()
            .await
            .map_err(|e| HarvestError::Forward(e.to_string()))?;

        let status = resp.status();
        let body = resp.text().await.unwrap_or_default();
        if !status.is_success() {
            return Err(HarvestError::Forward(format!(
                "pipeline trigger returned {status}: {body}"
            )));
        }

        info!(
            batch = batch.len(),
            status = status.as_u16(),
            response = %body,
            "batch handed to enrichment pipeline"
        );
        Ok(())
    }
}

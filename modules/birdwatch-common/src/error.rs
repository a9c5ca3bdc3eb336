use thiserror::Error;

#[derive(Debug, Error)]
pub enum HarvestError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("work queue error: {0}")]
    Queue(String),

    #[error("store error: {0}")]
    Store(String),

    #[error("source API error: {0}")]
    Source(String),

    #[error("enrichment forward error: {0}")]
    Forward(String),

    /// Cumulative quota wait crossed the per-subject cap.
    #[error("quota wait for {subject} exceeded cap after {waited_secs}s")]
    QuotaTimeout { subject: String, waited_secs: u64 },

    /// Rate-limit state could not be read; ends the subject's scan only.
    #[error("quota state unavailable: {0}")]
    QuotaUnavailable(String),

    /// A page failed to move the pagination cursor strictly downward.
    #[error("pagination cursor failed to advance below {max_id}")]
    CursorStalled { max_id: u64 },

    #[error("subject scan exceeded its wall-clock budget")]
    SubjectBudgetExceeded,

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl HarvestError {
    /// Failures that end one subject's scan but let the run continue.
    /// Everything else terminates the run.
    pub fn is_subject_scoped(&self) -> bool {
        matches!(
            self,
            HarvestError::QuotaTimeout { .. }
                | HarvestError::QuotaUnavailable(_)
                | HarvestError::SubjectBudgetExceeded
        )
    }
}

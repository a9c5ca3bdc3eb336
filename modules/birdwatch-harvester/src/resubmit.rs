// Replays the stored corpus through the enrichment pipeline, one
// document per trigger call. Best-effort: a failed submission is logged
// and the scan moves on.

use tracing::{info, warn};

use crate::store::EsStore;
use crate::traits::EnrichmentSink;

const SCAN_PAGE_SIZE: u32 = 1000;

#[derive(Debug, Default)]
pub struct ResubmitStats {
    pub submitted: u32,
    pub failed: u32,
}

pub async fn resubmit(store: &EsStore, sink: &dyn EnrichmentSink) -> anyhow::Result<ResubmitStats> {
    let mut stats = ResubmitStats::default();
    let mut after = None;

    loop {
        let page = store.scan(after, SCAN_PAGE_SIZE).await?;
        if page.documents.is_empty() {
            break;
        }

        for document in &page.documents {
            match sink.forward(std::slice::from_ref(document)).await {
                Ok(()) => stats.submitted += 1,
                Err(e) => {
                    warn!(error = %e, "resubmission failed for document");
                    stats.failed += 1;
                }
            }
        }

        info!(
            submitted = stats.submitted,
            failed = stats.failed,
            "resubmission progress"
        );

        after = page.last_id;
        if after.is_none() {
            break;
        }
    }

    Ok(stats)
}

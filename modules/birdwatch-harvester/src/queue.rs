// Redis-backed work queue. Consumption is a destructive LPOP: a record
// popped but not completed is lost for this run and restored by the next
// seeding pass, which the watermark mechanism makes safe.

use redis::AsyncCommands;
use serde_json::Value;
use tracing::warn;

use birdwatch_common::{HarvestError, ServiceRecord};

pub struct WorkQueue {
    conn: redis::aio::MultiplexedConnection,
}

impl WorkQueue {
    pub async fn connect(url: &str) -> Result<Self, HarvestError> {
        let client = redis::Client::open(url).map_err(|e| HarvestError::Queue(e.to_string()))?;
        let conn = client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| HarvestError::Queue(e.to_string()))?;
        Ok(Self { conn })
    }

    pub async fn len(&mut self, queue: &str) -> Result<u64, HarvestError> {
        self.conn
            .llen(queue)
            .await
            .map_err(|e| HarvestError::Queue(e.to_string()))
    }

    /// Pop the next service record. Records that fail to parse are
    /// dropped with a warning rather than wedging the queue.
    pub async fn pop(&mut self, queue: &str) -> Result<Option<ServiceRecord>, HarvestError> {
        loop {
            let raw: Option<String> = self
                .conn
                .lpop(queue, None)
                .await
                .map_err(|e| HarvestError::Queue(e.to_string()))?;

            let Some(raw) = raw else {
                return Ok(None);
            };
            match serde_json::from_str::<ServiceRecord>(&raw) {
                Ok(record) => return Ok(Some(record)),
                Err(e) => {
                    warn!(queue, error = %e, "dropping malformed queue record");
                }
            }
        }
    }

    pub async fn push(&mut self, queue: &str, record: &Value) -> Result<(), HarvestError> {
        let _: i64 = self
            .conn
            .rpush(queue, record.to_string())
            .await
            .map_err(|e| HarvestError::Queue(e.to_string()))?;
        Ok(())
    }
}

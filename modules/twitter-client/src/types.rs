use std::collections::HashMap;

use serde::Deserialize;
use serde_json::Value;

use crate::error::{Result, TwitterError};

/// One fetched status. The fields the harvester keys on are lifted out;
/// the payload is kept verbatim for persistence.
#[derive(Debug, Clone)]
pub struct Status {
    /// Source-assigned numeric id, monotonically increasing.
    pub id: u64,
    pub author: StatusAuthor,
    /// Recipient user id when the status is a reply, absent otherwise.
    pub in_reply_to_user_id: Option<u64>,
    pub raw: Value,
}

#[derive(Debug, Clone)]
pub struct StatusAuthor {
    pub id: u64,
    pub screen_name: String,
}

impl Status {
    /// Lift the keyed fields out of a raw API document.
    pub fn from_raw(raw: Value) -> Result<Self> {
        let id = raw
            .get("id")
            .and_then(Value::as_u64)
            .ok_or_else(|| TwitterError::Malformed("missing numeric id".into()))?;

        let user = raw
            .get("user")
            .ok_or_else(|| TwitterError::Malformed(format!("status {id} has no user object")))?;
        let author = StatusAuthor {
            id: user
                .get("id")
                .and_then(Value::as_u64)
                .ok_or_else(|| TwitterError::Malformed(format!("status {id} has no user id")))?,
            screen_name: user
                .get("screen_name")
                .and_then(Value::as_str)
                .ok_or_else(|| {
                    TwitterError::Malformed(format!("status {id} has no screen name"))
                })?
                .to_string(),
        };

        Ok(Self {
            id,
            author,
            in_reply_to_user_id: raw.get("in_reply_to_user_id").and_then(Value::as_u64),
            raw,
        })
    }
}

/// Envelope of `search/tweets.json`.
#[derive(Debug, Deserialize)]
pub(crate) struct SearchResponse {
    pub statuses: Vec<Value>,
}

/// Response of `application/rate_limit_status.json`: windows keyed by
/// resource family, then by endpoint path.
#[derive(Debug, Deserialize)]
pub struct RateLimitStatus {
    pub resources: HashMap<String, HashMap<String, RateLimitWindow>>,
}

#[derive(Debug, Clone, Copy, Deserialize)]
pub struct RateLimitWindow {
    pub limit: u32,
    pub remaining: u32,
    /// Epoch second at which the window resets.
    pub reset: i64,
}

impl RateLimitStatus {
    /// Window for an endpoint path like `/statuses/user_timeline`.
    pub fn window(&self, resource: &str, endpoint: &str) -> Option<RateLimitWindow> {
        self.resources
            .get(resource)
            .and_then(|family| family.get(endpoint))
            .copied()
    }
}

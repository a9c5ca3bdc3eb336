// In-memory doubles for the engine's trait seams, plus fixture builders.
//
// Three mocks matching the three boundaries:
// - ScriptedSource (StatusSource): serves queued page results in order,
//   records every call's cursor state
// - MockStore (DocumentStore): HashMap-backed document index
// - MockSink (EnrichmentSink): records forwarded batches

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::{json, Value};

use birdwatch_common::{HarvestError, Subject};
use twitter_client::{RateLimitWindow, Status, TwitterError};

use crate::traits::{DocumentStore, EnrichmentSink, PersistOutcome, RateLimitKey, StatusSource};

// ---------------------------------------------------------------------------
// Fixture builders
// ---------------------------------------------------------------------------

pub(crate) fn subject(screen_name: &str) -> Subject {
    Subject {
        screen_name: screen_name.to_string(),
        organisation: None,
        overrides: None,
    }
}

/// Raw document for a post authored by `screen_name`.
pub(crate) fn post_doc(id: u64, screen_name: &str, user_id: u64) -> Value {
    json!({
        "id": id,
        "id_str": id.to_string(),
        "full_text": format!("post {id}"),
        "user": { "id": user_id, "screen_name": screen_name }
    })
}

/// Raw document for a reply/mention addressed to `to_user_id`.
pub(crate) fn mention_doc(id: u64, from: &str, to_user_id: u64) -> Value {
    json!({
        "id": id,
        "id_str": id.to_string(),
        "full_text": format!("reply {id}"),
        "user": { "id": id + 500_000, "screen_name": from },
        "in_reply_to_user_id": to_user_id
    })
}

pub(crate) fn status(raw: Value) -> Status {
    Status::from_raw(raw).expect("fixture document must parse")
}

/// A page of posts with the given ids, newest first as the API orders them.
pub(crate) fn post_page(ids: impl IntoIterator<Item = u64>, screen_name: &str) -> Vec<Status> {
    let mut ids: Vec<u64> = ids.into_iter().collect();
    ids.sort_unstable_by(|a, b| b.cmp(a));
    ids.into_iter()
        .map(|id| status(post_doc(id, screen_name, 42)))
        .collect()
}

// ---------------------------------------------------------------------------
// ScriptedSource
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct PageCall {
    pub kind: &'static str,
    pub since_id: Option<u64>,
    pub max_id: Option<u64>,
    pub count: u32,
}

pub(crate) struct ScriptedSource {
    pages: Mutex<VecDeque<Result<Vec<Status>, TwitterError>>>,
    window: Option<RateLimitWindow>,
    pub calls: Mutex<Vec<PageCall>>,
    pub window_reads: Mutex<u32>,
}

impl ScriptedSource {
    pub fn new() -> Self {
        Self {
            pages: Mutex::new(VecDeque::new()),
            window: None,
            calls: Mutex::new(Vec::new()),
            window_reads: Mutex::new(0),
        }
    }

    /// Queue the next page result; results are served in push order
    /// regardless of flow. An exhausted script serves empty pages.
    pub fn push_page(self, page: Result<Vec<Status>, TwitterError>) -> Self {
        self.pages.lock().unwrap().push_back(page);
        self
    }

    pub fn with_window(mut self, window: RateLimitWindow) -> Self {
        self.window = Some(window);
        self
    }

    pub fn page_calls(&self) -> Vec<PageCall> {
        self.calls.lock().unwrap().clone()
    }

    fn serve(
        &self,
        kind: &'static str,
        since_id: Option<u64>,
        max_id: Option<u64>,
        count: u32,
    ) -> Result<Vec<Status>, TwitterError> {
        self.calls.lock().unwrap().push(PageCall {
            kind,
            since_id,
            max_id,
            count,
        });
        self.pages
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok(Vec::new()))
    }
}

#[async_trait]
impl StatusSource for ScriptedSource {
    async fn user_timeline(
        &self,
        _screen_name: &str,
        since_id: Option<u64>,
        max_id: Option<u64>,
        count: u32,
    ) -> Result<Vec<Status>, TwitterError> {
        self.serve("timeline", since_id, max_id, count)
    }

    async fn mentions_of(
        &self,
        _screen_name: &str,
        since_id: Option<u64>,
        max_id: Option<u64>,
        count: u32,
    ) -> Result<Vec<Status>, TwitterError> {
        self.serve("mentions", since_id, max_id, count)
    }

    async fn rate_limit_window(
        &self,
        _key: RateLimitKey,
    ) -> Result<Option<RateLimitWindow>, TwitterError> {
        *self.window_reads.lock().unwrap() += 1;
        Ok(self.window)
    }
}

// ---------------------------------------------------------------------------
// MockStore
// ---------------------------------------------------------------------------

#[derive(Default)]
pub(crate) struct MockStore {
    docs: Mutex<HashMap<u64, Value>>,
    fail_ids: HashSet<u64>,
}

impl MockStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Upserts of these ids fail, simulating per-item store trouble.
    pub fn failing_on(mut self, ids: impl IntoIterator<Item = u64>) -> Self {
        self.fail_ids = ids.into_iter().collect();
        self
    }

    pub fn seeded_with(self, docs: impl IntoIterator<Item = Value>) -> Self {
        {
            let mut map = self.docs.lock().unwrap();
            for doc in docs {
                let id = doc.get("id").and_then(Value::as_u64).expect("seed doc id");
                map.insert(id, doc);
            }
        }
        self
    }

    pub fn document(&self, id: u64) -> Option<Value> {
        self.docs.lock().unwrap().get(&id).cloned()
    }

    pub fn len(&self) -> usize {
        self.docs.lock().unwrap().len()
    }

    fn authored_by(doc: &Value, screen_name: &str) -> bool {
        doc.pointer("/user/screen_name")
            .and_then(Value::as_str)
            .is_some_and(|name| name.eq_ignore_ascii_case(screen_name))
    }

    fn is_reply(doc: &Value) -> bool {
        doc.get("in_reply_to_user_id")
            .is_some_and(|v| !v.is_null())
    }
}

#[async_trait]
impl DocumentStore for MockStore {
    async fn count_posts(&self, screen_name: &str) -> Result<u64, HarvestError> {
        let docs = self.docs.lock().unwrap();
        Ok(docs
            .values()
            .filter(|d| Self::authored_by(d, screen_name) && !Self::is_reply(d))
            .count() as u64)
    }

    async fn latest_post_id(&self, screen_name: &str) -> Result<Option<u64>, HarvestError> {
        let docs = self.docs.lock().unwrap();
        Ok(docs
            .values()
            .filter(|d| Self::authored_by(d, screen_name) && !Self::is_reply(d))
            .filter_map(|d| d.get("id").and_then(Value::as_u64))
            .max())
    }

    async fn author_user_id(&self, screen_name: &str) -> Result<Option<u64>, HarvestError> {
        let docs = self.docs.lock().unwrap();
        Ok(docs
            .values()
            .find(|d| Self::authored_by(d, screen_name))
            .and_then(|d| d.pointer("/user/id"))
            .and_then(Value::as_u64))
    }

    async fn latest_mention_id(&self, user_id: u64) -> Result<Option<u64>, HarvestError> {
        let docs = self.docs.lock().unwrap();
        Ok(docs
            .values()
            .filter(|d| {
                d.get("in_reply_to_user_id").and_then(Value::as_u64) == Some(user_id)
            })
            .filter_map(|d| d.get("id").and_then(Value::as_u64))
            .max())
    }

    async fn upsert(&self, id: u64, raw: &Value) -> Result<PersistOutcome, HarvestError> {
        if self.fail_ids.contains(&id) {
            return Err(HarvestError::Store(format!("write of {id} rejected")));
        }
        let mut docs = self.docs.lock().unwrap();
        match docs.insert(id, raw.clone()) {
            None => Ok(PersistOutcome::Created),
            Some(_) => Ok(PersistOutcome::Updated),
        }
    }
}

// ---------------------------------------------------------------------------
// MockSink
// ---------------------------------------------------------------------------

#[derive(Default)]
pub(crate) struct MockSink {
    pub batches: Mutex<Vec<Vec<Value>>>,
    fail: bool,
}

impl MockSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing() -> Self {
        Self {
            batches: Mutex::new(Vec::new()),
            fail: true,
        }
    }

    pub fn forwarded(&self) -> Vec<Vec<Value>> {
        self.batches.lock().unwrap().clone()
    }
}

#[async_trait]
impl EnrichmentSink for MockSink {
    async fn forward(&self, batch: &[Value]) -> Result<(), HarvestError> {
        if self.fail {
            return Err(HarvestError::Forward("pipeline unreachable".into()));
        }
        self.batches.lock().unwrap().push(batch.to_vec());
        Ok(())
    }
}

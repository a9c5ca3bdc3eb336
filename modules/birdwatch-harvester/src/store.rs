// HTTP client for the indexed store. Queries are built by the pure
// functions in `queries` and posted as JSON bodies; writes are
// full-document upserts keyed by the status id.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

use birdwatch_common::HarvestError;

use crate::traits::{DocumentStore, PersistOutcome};

pub struct EsStore {
    http: reqwest::Client,
    endpoint: String,
    index: String,
}

/// One page of a full-corpus scan, ordered by id.
pub struct ScanPage {
    pub documents: Vec<Value>,
    /// Id to resume after; None when the corpus is exhausted.
    pub last_id: Option<u64>,
}

/// A row of `_cat/indices?format=json`.
#[derive(Debug, Deserialize)]
pub struct IndexInfo {
    pub index: String,
    #[serde(rename = "docs.count", default)]
    docs_count: Option<String>,
}

impl IndexInfo {
    pub fn doc_count(&self) -> u64 {
        self.docs_count
            .as_deref()
            .and_then(|c| c.parse().ok())
            .unwrap_or(0)
    }
}

#[derive(Debug, Deserialize)]
struct CountResponse {
    count: u64,
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    hits: Hits,
}

#[derive(Debug, Deserialize)]
struct Hits {
    hits: Vec<Hit>,
}

#[derive(Debug, Deserialize)]
struct Hit {
    #[serde(rename = "_source")]
    source: Value,
}

impl EsStore {
    pub fn new(endpoint: &str, index: &str) -> Self {
        Self {
            http: reqwest::Client::new(),
            endpoint: endpoint.trim_end_matches('/').to_string(),
            index: index.to_string(),
        }
    }

    async fn search(&self, index: &str, body: &Value) -> Result<SearchResponse, HarvestError> {
        self.post_json(&format!("{}/{}/_search", self.endpoint, index), body)
            .await
    }

    async fn post_json<T: serde::de::DeserializeOwned>(
        &self,
        url: &str,
        body: &Value,
    ) -> Result<T, HarvestError> {
        let resp = self
            .http
            .post(url)
            .json(body)
            .send()
            .await
            .map_err(|e| HarvestError::Store(e.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            return Err(HarvestError::Store(format!(
                "{url} returned {status}: {text}"
            )));
        }
        resp.json()
            .await
            .map_err(|e| HarvestError::Store(e.to_string()))
    }

    fn top_hit_id(resp: &SearchResponse) -> Option<u64> {
        resp.hits
            .hits
            .first()
            .and_then(|hit| hit.source.get("id"))
            .and_then(Value::as_u64)
    }

    /// Raw hits of every service document in an index. The seeding scan
    /// pushes whole hits onto the queues, envelope included.
    pub async fn services(&self, index: &str) -> Result<Vec<Value>, HarvestError> {
        #[derive(Deserialize)]
        struct RawSearchResponse {
            hits: RawHits,
        }
        #[derive(Deserialize)]
        struct RawHits {
            hits: Vec<Value>,
        }

        let resp: RawSearchResponse = self
            .post_json(
                &format!("{}/{}/_search", self.endpoint, index),
                &queries::all_services(1000),
            )
            .await?;
        Ok(resp.hits.hits)
    }

    /// All indices known to the store.
    pub async fn indices(&self) -> Result<Vec<IndexInfo>, HarvestError> {
        let resp = self
            .http
            .get(format!("{}/_cat/indices?format=json", self.endpoint))
            .send()
            .await
            .map_err(|e| HarvestError::Store(e.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            return Err(HarvestError::Store(format!(
                "_cat/indices returned {status}"
            )));
        }
        resp.json()
            .await
            .map_err(|e| HarvestError::Store(e.to_string()))
    }

    /// One page of the harvested corpus, resuming after `after`.
    pub async fn scan(&self, after: Option<u64>, size: u32) -> Result<ScanPage, HarvestError> {
        let resp = self
            .search(&self.index, &queries::corpus_page(after, size))
            .await?;

        let documents: Vec<Value> = resp.hits.hits.into_iter().map(|h| h.source).collect();
        let last_id = documents
            .last()
            .and_then(|doc| doc.get("id"))
            .and_then(Value::as_u64);
        Ok(ScanPage { documents, last_id })
    }
}

#[async_trait]
impl DocumentStore for EsStore {
    async fn count_posts(&self, screen_name: &str) -> Result<u64, HarvestError> {
        let resp: CountResponse = self
            .post_json(
                &format!("{}/{}/_count", self.endpoint, self.index),
                &queries::post_count(&screen_name.to_lowercase()),
            )
            .await?;
        Ok(resp.count)
    }

    async fn latest_post_id(&self, screen_name: &str) -> Result<Option<u64>, HarvestError> {
        let resp = self
            .search(
                &self.index,
                &queries::latest_post(&screen_name.to_lowercase()),
            )
            .await?;
        Ok(Self::top_hit_id(&resp))
    }

    async fn author_user_id(&self, screen_name: &str) -> Result<Option<u64>, HarvestError> {
        let resp = self
            .search(&self.index, &queries::any_post(&screen_name.to_lowercase()))
            .await?;
        Ok(resp
            .hits
            .hits
            .first()
            .and_then(|hit| hit.source.pointer("/user/id"))
            .and_then(Value::as_u64))
    }

    async fn latest_mention_id(&self, user_id: u64) -> Result<Option<u64>, HarvestError> {
        let resp = self
            .search(&self.index, &queries::latest_mention(user_id))
            .await?;
        Ok(Self::top_hit_id(&resp))
    }

    async fn upsert(&self, id: u64, raw: &Value) -> Result<PersistOutcome, HarvestError> {
        let url = format!("{}/{}/_doc/{}", self.endpoint, self.index, id);
        let resp = self
            .http
            .put(&url)
            .json(raw)
            .send()
            .await
            .map_err(|e| HarvestError::Store(e.to_string()))?;

        let status = resp.status();
        debug!(id, status = status.as_u16(), "document upsert");
        match status.as_u16() {
            201 => Ok(PersistOutcome::Created),
            200 => Ok(PersistOutcome::Updated),
            _ => {
                let text = resp.text().await.unwrap_or_default();
                Err(HarvestError::Store(format!(
                    "upsert of {id} returned {status}: {text}"
                )))
            }
        }
    }
}

pub(crate) mod queries {
    use serde_json::{json, Value};

    /// Count of non-reply posts authored by a screen name.
    pub(crate) fn post_count(screen_name: &str) -> Value {
        json!({
            "query": {
                "bool": {
                    "filter": [
                        { "term": { "user.screen_name": screen_name } }
                    ],
                    "must_not": [
                        { "exists": { "field": "in_reply_to_user_id" } }
                    ]
                }
            }
        })
    }

    /// Highest-id non-reply post authored by a screen name.
    pub(crate) fn latest_post(screen_name: &str) -> Value {
        json!({
            "query": {
                "bool": {
                    "filter": [
                        { "term": { "user.screen_name": screen_name } }
                    ],
                    "must_not": [
                        { "exists": { "field": "in_reply_to_user_id" } }
                    ]
                }
            },
            "sort": [{ "id": { "order": "desc" } }],
            "size": 1
        })
    }

    /// Any single post authored by a screen name.
    pub(crate) fn any_post(screen_name: &str) -> Value {
        json!({
            "query": {
                "bool": {
                    "filter": [
                        { "term": { "user.screen_name": screen_name } }
                    ]
                }
            },
            "size": 1
        })
    }

    /// Highest-id reply/mention addressed to a user id.
    pub(crate) fn latest_mention(user_id: u64) -> Value {
        json!({
            "query": {
                "bool": {
                    "filter": [
                        { "term": { "in_reply_to_user_id": user_id } }
                    ]
                }
            },
            "sort": [{ "id": { "order": "desc" } }],
            "size": 1
        })
    }

    /// Page of the whole corpus in ascending id order, resuming after
    /// `after`.
    pub(crate) fn corpus_page(after: Option<u64>, size: u32) -> Value {
        let mut body = json!({
            "query": { "match_all": {} },
            "sort": [{ "id": { "order": "asc" } }],
            "size": size
        });
        if let Some(after) = after {
            body["search_after"] = json!([after]);
        }
        body
    }

    /// Every service in an index (the queue-seeding scan).
    pub(crate) fn all_services(size: u32) -> Value {
        json!({ "size": size })
    }
}

#[cfg(test)]
mod tests {
    use super::queries;
    use serde_json::json;

    #[test]
    fn post_count_filters_author_and_excludes_replies() {
        let body = queries::post_count("someorg");
        assert_eq!(
            body["query"]["bool"]["filter"][0]["term"]["user.screen_name"],
            json!("someorg")
        );
        assert_eq!(
            body["query"]["bool"]["must_not"][0]["exists"]["field"],
            json!("in_reply_to_user_id")
        );
    }

    #[test]
    fn latest_post_sorts_descending_and_takes_one() {
        let body = queries::latest_post("someorg");
        assert_eq!(body["sort"][0]["id"]["order"], json!("desc"));
        assert_eq!(body["size"], json!(1));
    }

    #[test]
    fn latest_mention_keys_on_recipient_user_id() {
        let body = queries::latest_mention(42);
        assert_eq!(
            body["query"]["bool"]["filter"][0]["term"]["in_reply_to_user_id"],
            json!(42)
        );
        assert_eq!(body["sort"][0]["id"]["order"], json!("desc"));
    }

    #[test]
    fn corpus_page_resumes_after_cursor() {
        let first = queries::corpus_page(None, 500);
        assert!(first.get("search_after").is_none());

        let next = queries::corpus_page(Some(900), 500);
        assert_eq!(next["search_after"], json!([900]));
        assert_eq!(next["sort"][0]["id"]["order"], json!("asc"));
    }
}

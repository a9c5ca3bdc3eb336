pub mod error;
pub mod oauth;
pub mod types;

pub use error::{Result, TwitterError};
pub use types::{RateLimitStatus, RateLimitWindow, Status, StatusAuthor};

use reqwest::header::AUTHORIZATION;
use reqwest::StatusCode;
use serde::de::DeserializeOwned;

use oauth::OAuthSigner;
use types::SearchResponse;

const DEFAULT_API_URL: &str = "https://api.twitter.com/1.1";

/// Pre-provisioned OAuth 1.0a credential set.
#[derive(Debug, Clone)]
pub struct Credentials {
    pub consumer_key: String,
    pub consumer_secret: String,
    pub access_token: String,
    pub access_token_secret: String,
}

pub struct TwitterClient {
    client: reqwest::Client,
    base_url: String,
    signer: OAuthSigner,
}

impl TwitterClient {
    pub fn new(credentials: Credentials) -> Self {
        Self::with_base_url(credentials, DEFAULT_API_URL)
    }

    /// Point the client at a non-default API host.
    pub fn with_base_url(credentials: Credentials, base_url: &str) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            signer: OAuthSigner::new(credentials),
        }
    }

    /// One page of a user's own posts, newest first, within
    /// `(since_id, max_id]`.
    pub async fn user_timeline(
        &self,
        screen_name: &str,
        since_id: Option<u64>,
        max_id: Option<u64>,
        count: u32,
    ) -> Result<Vec<Status>> {
        let mut params = vec![
            ("screen_name".to_string(), screen_name.to_string()),
            ("count".to_string(), count.to_string()),
            ("tweet_mode".to_string(), "extended".to_string()),
        ];
        push_window(&mut params, since_id, max_id);

        tracing::debug!(screen_name, ?since_id, ?max_id, count, "fetching user timeline page");
        let raw: Vec<serde_json::Value> =
            self.get("/statuses/user_timeline.json", &params).await?;
        raw.into_iter().map(Status::from_raw).collect()
    }

    /// One page of statuses addressed to a user (replies and mentions),
    /// newest first, within `(since_id, max_id]`.
    pub async fn search_mentions(
        &self,
        screen_name: &str,
        since_id: Option<u64>,
        max_id: Option<u64>,
        count: u32,
    ) -> Result<Vec<Status>> {
        let mut params = vec![
            ("q".to_string(), format!("to:{screen_name}")),
            ("count".to_string(), count.to_string()),
            ("tweet_mode".to_string(), "extended".to_string()),
        ];
        push_window(&mut params, since_id, max_id);

        tracing::debug!(screen_name, ?since_id, ?max_id, count, "searching mentions page");
        let resp: SearchResponse = self.get("/search/tweets.json", &params).await?;
        resp.statuses.into_iter().map(Status::from_raw).collect()
    }

    /// Current rate-limit windows across all endpoints.
    pub async fn rate_limit_status(&self) -> Result<RateLimitStatus> {
        self.get("/application/rate_limit_status.json", &[]).await
    }

    async fn get<T: DeserializeOwned>(
        &self,
        endpoint: &str,
        params: &[(String, String)],
    ) -> Result<T> {
        let url = format!("{}{}", self.base_url, endpoint);
        let auth = self.signer.authorization_header("GET", &url, params)?;

        let resp = self
            .client
            .get(&url)
            .query(params)
            .header(AUTHORIZATION, auth)
            .send()
            .await?;

        let status = resp.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            let reset = resp
                .headers()
                .get("x-rate-limit-reset")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse::<i64>().ok());
            return Err(TwitterError::RateLimited { reset });
        }
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(TwitterError::Api {
                status: status.as_u16(),
                message: body,
            });
        }

        Ok(resp.json().await?)
    }
}

fn push_window(params: &mut Vec<(String, String)>, since_id: Option<u64>, max_id: Option<u64>) {
    if let Some(since) = since_id {
        params.push(("since_id".to_string(), since.to_string()));
    }
    if let Some(max) = max_id {
        params.push(("max_id".to_string(), max.to_string()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn window_params_are_optional() {
        let mut params = Vec::new();
        push_window(&mut params, None, None);
        assert!(params.is_empty());

        push_window(&mut params, Some(100), Some(99));
        assert_eq!(
            params,
            vec![
                ("since_id".to_string(), "100".to_string()),
                ("max_id".to_string(), "99".to_string()),
            ]
        );
    }
}

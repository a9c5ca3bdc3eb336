use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Wire format of one work-queue record: a search hit from the service
/// indices, `_source` lifted out and everything else carried along.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceRecord {
    #[serde(rename = "_source")]
    pub source: ServiceSource,
    #[serde(flatten)]
    pub envelope: Map<String, Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceSource {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub organisation_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub twitter_screen_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub twitter_oauth_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub twitter_oauth_secret: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// One account to harvest, drawn from the work queue. Immutable for the
/// duration of its scan.
#[derive(Debug, Clone)]
pub struct Subject {
    pub screen_name: String,
    pub organisation: Option<String>,
    /// Per-subject access token pair; the default credentials apply when
    /// absent.
    pub overrides: Option<TokenPair>,
}

#[derive(Debug, Clone)]
pub struct TokenPair {
    pub token: String,
    pub secret: String,
}

impl ServiceRecord {
    /// A record is harvestable only when it names a screen name. A token
    /// pair with either half missing or empty falls back to the default
    /// credentials.
    pub fn into_subject(self) -> Option<Subject> {
        let src = self.source;
        let screen_name = src.twitter_screen_name.filter(|s| !s.is_empty())?;
        let overrides = match (src.twitter_oauth_token, src.twitter_oauth_secret) {
            (Some(token), Some(secret)) if !token.is_empty() && !secret.is_empty() => {
                Some(TokenPair { token, secret })
            }
            _ => None,
        };
        Some(Subject {
            screen_name,
            organisation: src.organisation_name,
            overrides,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(source: Value) -> ServiceRecord {
        serde_json::from_value(json!({
            "_index": "kb_services",
            "_id": "svc-1",
            "_source": source
        }))
        .unwrap()
    }

    #[test]
    fn record_with_screen_name_becomes_subject() {
        let subject = record(json!({
            "organisation_name": "Some Org",
            "twitter_screen_name": "someorg"
        }))
        .into_subject()
        .unwrap();

        assert_eq!(subject.screen_name, "someorg");
        assert_eq!(subject.organisation.as_deref(), Some("Some Org"));
        assert!(subject.overrides.is_none());
    }

    #[test]
    fn record_without_screen_name_is_rejected() {
        assert!(record(json!({ "organisation_name": "No Handle" }))
            .into_subject()
            .is_none());
        assert!(record(json!({ "twitter_screen_name": "" }))
            .into_subject()
            .is_none());
    }

    #[test]
    fn full_token_pair_becomes_override() {
        let subject = record(json!({
            "twitter_screen_name": "someorg",
            "twitter_oauth_token": "tok",
            "twitter_oauth_secret": "sec"
        }))
        .into_subject()
        .unwrap();

        let pair = subject.overrides.unwrap();
        assert_eq!(pair.token, "tok");
        assert_eq!(pair.secret, "sec");
    }

    #[test]
    fn half_token_pair_falls_back_to_defaults() {
        let subject = record(json!({
            "twitter_screen_name": "someorg",
            "twitter_oauth_token": "tok",
            "twitter_oauth_secret": ""
        }))
        .into_subject()
        .unwrap();

        assert!(subject.overrides.is_none());
    }

    #[test]
    fn envelope_survives_a_round_trip() {
        let raw = json!({
            "_index": "kb_services",
            "_id": "svc-9",
            "_source": { "twitter_screen_name": "someorg", "languages": ["en", "el"] }
        });
        let rec: ServiceRecord = serde_json::from_value(raw.clone()).unwrap();
        assert_eq!(serde_json::to_value(&rec).unwrap(), raw);
    }
}

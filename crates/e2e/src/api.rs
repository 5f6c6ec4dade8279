//! REST client for the Lochness WebUI API
//!
//! Used for fixture cleanup, post-teardown verification and the keystore
//! checks. Requests reuse the browser session's cookies when one is attached.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::COOKIE;
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::assertions::Presence;
use crate::entity::EntityRecord;
use crate::error::{E2eError, E2eResult};
use crate::session::Session;
use crate::teardown::FixtureBackend;

/// Result of a single DELETE call
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum DeleteOutcome {
    Deleted,
    /// 404 or 410; the entity was already gone
    AlreadyAbsent,
    Rejected { status: u16, body: String },
    Unreachable { reason: String },
}

/// Raw status and JSON body of an API call
#[derive(Debug, Clone)]
pub struct ApiReply {
    pub status: u16,
    pub body: serde_json::Value,
}

impl ApiReply {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// The `error` field of an error body, if present.
    pub fn error_message(&self) -> Option<&str> {
        self.body.get("error").and_then(|e| e.as_str())
    }

    pub fn json<T: DeserializeOwned>(&self) -> E2eResult<T> {
        Ok(serde_json::from_value(self.body.clone())?)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KeystoreEntry {
    pub keystore_name: String,
    pub key_type: String,
    pub project_id: String,
    #[serde(default)]
    pub key_metadata: serde_json::Value,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct KeystoreListing {
    pub entries: Vec<KeystoreEntry>,
}

#[derive(Debug, Clone)]
pub struct LochnessApi {
    client: reqwest::Client,
    base_url: String,
    cookie: Option<String>,
}

impl LochnessApi {
    pub fn new(base_url: &str, timeout: Duration) -> E2eResult<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            cookie: None,
        })
    }

    /// Attach (or clear) the session whose cookies authenticate requests.
    pub fn set_session(&mut self, session: Option<&Session>) {
        self.cookie = session.and_then(Session::cookie_header);
    }

    /// A copy of this client with no session attached.
    pub fn anonymous(&self) -> Self {
        Self {
            client: self.client.clone(),
            base_url: self.base_url.clone(),
            cookie: None,
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn request(&self, method: reqwest::Method, path: &str) -> reqwest::RequestBuilder {
        let builder = self.client.request(method, format!("{}{}", self.base_url, path));
        match &self.cookie {
            Some(cookie) => builder.header(COOKIE, cookie),
            None => builder,
        }
    }

    async fn reply(response: reqwest::Response) -> E2eResult<ApiReply> {
        let status = response.status().as_u16();
        let text = response.text().await?;
        let body = if text.trim().is_empty() {
            serde_json::Value::Null
        } else {
            serde_json::from_str(&text).unwrap_or(serde_json::Value::String(text))
        };
        Ok(ApiReply { status, body })
    }

    /// Delete one entity. Never fails; the outcome says what happened.
    pub async fn delete(&self, record: &EntityRecord) -> DeleteOutcome {
        let Some(path) = record.delete_path() else {
            return DeleteOutcome::Unreachable {
                reason: format!("{} is missing the ancestors its delete route needs", record),
            };
        };
        debug!("DELETE {}", path);

        let response = match self.request(reqwest::Method::DELETE, &path).send().await {
            Ok(response) => response,
            Err(e) => {
                return DeleteOutcome::Unreachable {
                    reason: e.to_string(),
                }
            }
        };

        let status = response.status();
        if status.is_success() {
            return DeleteOutcome::Deleted;
        }
        if status == StatusCode::NOT_FOUND || status == StatusCode::GONE {
            return DeleteOutcome::AlreadyAbsent;
        }
        let body = response.text().await.unwrap_or_default();
        DeleteOutcome::Rejected {
            status: status.as_u16(),
            body,
        }
    }

    /// Whether a project still exists.
    pub async fn project(&self, project_id: &str) -> E2eResult<Presence> {
        let path = format!("/api/v1/projects/{}", project_id);
        let response = self.request(reqwest::Method::GET, &path).send().await?;
        match response.status() {
            s if s.is_success() => Ok(Presence::Found),
            StatusCode::NOT_FOUND | StatusCode::GONE => Ok(Presence::NotFound),
            other => Err(E2eError::AssertionFailed(format!(
                "GET {} returned unexpected status {}",
                path, other
            ))),
        }
    }

    /// `GET /api/v1/keystore`, optionally scoped to a project.
    pub async fn keystore(&self, project_id: Option<&str>) -> E2eResult<ApiReply> {
        let mut request = self.request(reqwest::Method::GET, "/api/v1/keystore");
        if let Some(project_id) = project_id {
            request = request.query(&[("project_id", project_id)]);
        }
        Self::reply(request.send().await?).await
    }
}

#[async_trait]
impl FixtureBackend for LochnessApi {
    async fn delete(&self, record: &EntityRecord) -> DeleteOutcome {
        LochnessApi::delete(self, record).await
    }
}

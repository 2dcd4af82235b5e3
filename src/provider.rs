//! External calendar provider: error taxonomy, service trait, HTTP client.
//!
//! The worker and executor depend only on [`CalendarService`], so tests run
//! against in-memory fakes and never touch the network.

use anyhow::Context;
use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use reqwest::{Client, Method, Url};
use serde_json::Value;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

use crate::config::Config;
use crate::event::ProviderEvent;
use crate::logger::SyncLogger;
use crate::model::Credential;

#[derive(Debug, Error)]
pub enum SyncError {
    #[error("no active credentials for specialist {specialist_id}")]
    NoCredentials { specialist_id: i64 },
    #[error("token refresh failed: {0}")]
    TokenRefresh(String),
    #[error("provider error: {message}")]
    Provider { status: u16, message: String },
    #[error("{0}")]
    Unknown(String),
}

// Rate limiting is detected by message content. Fragile, but it matches the
// provider's observed error strings; a structured error code would replace
// this single pattern.
static RATE_LIMIT_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)rate|quota|too many requests").expect("valid regex"));

impl SyncError {
    pub fn is_rate_limited(&self) -> bool {
        if let SyncError::Provider { status: 429, .. } = self {
            return true;
        }
        RATE_LIMIT_RE.is_match(&self.to_string())
    }

    pub fn is_not_found(&self) -> bool {
        match self {
            SyncError::Provider { status, message } => {
                *status == 404 || message.contains("not found")
            }
            _ => false,
        }
    }
}

impl From<anyhow::Error> for SyncError {
    fn from(err: anyhow::Error) -> Self {
        SyncError::Unknown(format!("{err:#}"))
    }
}

/// New access material returned by the provider's token endpoint.
#[derive(Debug, Clone)]
pub struct RefreshedToken {
    pub access_token: String,
    pub expires_in: i64,
}

/// The four opaque provider operations the core needs.
#[async_trait]
pub trait CalendarService: Send + Sync {
    /// Create an event; returns the provider-assigned event id.
    async fn create_event(
        &self,
        credential: &Credential,
        event: &ProviderEvent,
    ) -> Result<String, SyncError>;

    async fn update_event(
        &self,
        credential: &Credential,
        event_id: &str,
        event: &ProviderEvent,
    ) -> Result<(), SyncError>;

    async fn delete_event(&self, credential: &Credential, event_id: &str)
        -> Result<(), SyncError>;

    /// Exchange a refresh token for a new access token.
    async fn refresh_credential(&self, refresh_token: &str) -> Result<RefreshedToken, SyncError>;
}

pub struct CalendarClient {
    http: Client,
    api_base: Url,
    token_url: Url,
    client_id: String,
    client_secret: String,
    logger: Arc<SyncLogger>,
}

impl fmt::Debug for CalendarClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CalendarClient")
            .field("api_base", &self.api_base)
            .finish_non_exhaustive()
    }
}

impl CalendarClient {
    pub fn from_config(cfg: &Config, logger: Arc<SyncLogger>) -> anyhow::Result<Self> {
        let api_base = Url::parse(&cfg.provider.api_base).context("invalid provider.api_base")?;
        let token_url =
            Url::parse(&cfg.provider.token_url).context("invalid provider.token_url")?;
        let http = Client::builder()
            .user_agent("calsync/0.1")
            .timeout(Duration::from_secs(cfg.provider.request_timeout_secs))
            .build()
            .context("failed to build HTTP client")?;
        Ok(Self {
            http,
            api_base,
            token_url,
            client_id: cfg.provider.client_id.clone(),
            client_secret: cfg.provider.client_secret.clone(),
            logger,
        })
    }

    fn events_url(&self, calendar_id: &str, event_id: Option<&str>) -> Result<Url, SyncError> {
        let mut path = format!("calendars/{calendar_id}/events");
        if let Some(id) = event_id {
            path.push('/');
            path.push_str(id);
        }
        self.api_base
            .join(&path)
            .map_err(|e| SyncError::Unknown(format!("invalid provider URL: {e}")))
    }

    async fn request(
        &self,
        method: Method,
        url: Url,
        access_token: &str,
        body: Option<&ProviderEvent>,
    ) -> Result<Value, SyncError> {
        let body_json = body
            .map(serde_json::to_string)
            .transpose()
            .map_err(|e| SyncError::Unknown(format!("failed to encode event: {e}")))?;
        self.logger
            .api_request(method.as_str(), url.as_str(), body_json.as_deref());

        let mut req = self
            .http
            .request(method, url)
            .header("Authorization", format!("Bearer {access_token}"))
            .header("Accept", "application/json");
        if let Some(event) = body {
            req = req.json(event);
        }

        let res = req.send().await.map_err(|e| SyncError::Provider {
            status: 0,
            message: format!("transport error: {e}"),
        })?;
        let status = res.status().as_u16();
        let text = res.text().await.unwrap_or_default();
        self.logger.api_response(status, &text);

        if (200..300).contains(&status) {
            if text.is_empty() {
                return Ok(Value::Null);
            }
            serde_json::from_str(&text)
                .map_err(|e| SyncError::Unknown(format!("invalid provider response JSON: {e}")))
        } else {
            Err(SyncError::Provider {
                status,
                message: provider_error_message(status, &text),
            })
        }
    }
}

/// Human-readable provider failure: "HTTP 403 - <message> (Code: 403)" when
/// the body carries a structured error, a trimmed body snippet otherwise.
fn provider_error_message(status: u16, body: &str) -> String {
    let mut detail = format!("HTTP {status}");
    if let Ok(parsed) = serde_json::from_str::<Value>(body) {
        if let Some(msg) = parsed["error"]["message"].as_str() {
            detail.push_str(" - ");
            detail.push_str(msg);
            if let Some(code) = parsed["error"]["code"].as_i64() {
                detail.push_str(&format!(" (Code: {code})"));
            }
            return detail;
        }
    }
    if !body.is_empty() {
        let snippet: String = body.chars().take(200).collect();
        detail.push_str(&format!(" - Response: {snippet}"));
    }
    detail
}

#[async_trait]
impl CalendarService for CalendarClient {
    async fn create_event(
        &self,
        credential: &Credential,
        event: &ProviderEvent,
    ) -> Result<String, SyncError> {
        let url = self.events_url(&credential.calendar_id, None)?;
        let resp = self
            .request(Method::POST, url, &credential.access_token, Some(event))
            .await?;
        match resp["id"].as_str().filter(|id| !id.is_empty()) {
            Some(id) => Ok(id.to_string()),
            None => Err(SyncError::Unknown(
                "provider accepted the event but returned no event id".into(),
            )),
        }
    }

    async fn update_event(
        &self,
        credential: &Credential,
        event_id: &str,
        event: &ProviderEvent,
    ) -> Result<(), SyncError> {
        let url = self.events_url(&credential.calendar_id, Some(event_id))?;
        self.request(Method::PUT, url, &credential.access_token, Some(event))
            .await?;
        Ok(())
    }

    async fn delete_event(
        &self,
        credential: &Credential,
        event_id: &str,
    ) -> Result<(), SyncError> {
        let url = self.events_url(&credential.calendar_id, Some(event_id))?;
        self.request(Method::DELETE, url, &credential.access_token, None)
            .await?;
        Ok(())
    }

    async fn refresh_credential(&self, refresh_token: &str) -> Result<RefreshedToken, SyncError> {
        let params = [
            ("client_id", self.client_id.as_str()),
            ("client_secret", self.client_secret.as_str()),
            ("refresh_token", refresh_token),
            ("grant_type", "refresh_token"),
        ];
        self.logger
            .api_request("POST", self.token_url.as_str(), None);

        let res = self
            .http
            .post(self.token_url.clone())
            .form(&params)
            .send()
            .await
            .map_err(|e| SyncError::TokenRefresh(format!("transport error: {e}")))?;
        let status = res.status().as_u16();
        // Token payloads never go to the log.
        self.logger.api_response(status, "[token response omitted]");

        if !(200..300).contains(&status) {
            return Err(SyncError::TokenRefresh(format!("HTTP {status}")));
        }
        let body: Value = res
            .json()
            .await
            .map_err(|_| SyncError::TokenRefresh("invalid token endpoint response".into()))?;
        let access_token = body["access_token"]
            .as_str()
            .filter(|t| !t.is_empty())
            .ok_or_else(|| SyncError::TokenRefresh("no access_token in refresh response".into()))?
            .to_string();
        Ok(RefreshedToken {
            access_token,
            expires_in: body["expires_in"].as_i64().unwrap_or(3600),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn logger() -> Arc<SyncLogger> {
        let dir = tempfile::tempdir().unwrap().into_path();
        Arc::new(SyncLogger::new(dir.join("test.log"), false).unwrap())
    }

    fn client() -> CalendarClient {
        let cfg: Config = serde_yaml::from_str(crate::config::example()).unwrap();
        CalendarClient::from_config(&cfg, logger()).unwrap()
    }

    #[test]
    fn events_url_shape() {
        let client = client();
        assert_eq!(
            client.events_url("primary", None).unwrap().as_str(),
            "https://www.googleapis.com/calendar/v3/calendars/primary/events"
        );
        assert_eq!(
            client.events_url("primary", Some("evt_1")).unwrap().as_str(),
            "https://www.googleapis.com/calendar/v3/calendars/primary/events/evt_1"
        );
    }

    #[test]
    fn rate_limit_detection() {
        let by_status = SyncError::Provider {
            status: 429,
            message: "HTTP 429".into(),
        };
        assert!(by_status.is_rate_limited());

        let by_message = SyncError::Provider {
            status: 403,
            message: "HTTP 403 - Calendar usage limits exceeded: quota".into(),
        };
        assert!(by_message.is_rate_limited());

        let generic = SyncError::Provider {
            status: 500,
            message: "HTTP 500 - Backend Error".into(),
        };
        assert!(!generic.is_rate_limited());
        assert!(!SyncError::TokenRefresh("HTTP 401".into()).is_rate_limited());
    }

    #[test]
    fn not_found_detection() {
        let by_status = SyncError::Provider {
            status: 404,
            message: "HTTP 404".into(),
        };
        assert!(by_status.is_not_found());

        let by_message = SyncError::Provider {
            status: 410,
            message: "HTTP 410 - resource not found".into(),
        };
        assert!(by_message.is_not_found());

        assert!(!SyncError::Unknown("boom".into()).is_not_found());
    }

    #[test]
    fn provider_error_message_parses_structured_bodies() {
        let body = r#"{"error": {"code": 403, "message": "Rate Limit Exceeded"}}"#;
        assert_eq!(
            provider_error_message(403, body),
            "HTTP 403 - Rate Limit Exceeded (Code: 403)"
        );

        assert_eq!(
            provider_error_message(502, "<html>bad gateway</html>"),
            "HTTP 502 - Response: <html>bad gateway</html>"
        );
        assert_eq!(provider_error_message(500, ""), "HTTP 500");
    }
}

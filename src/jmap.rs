//! JMAP transport, session discovery, and method-call helpers
//!
//! Provides the request/response envelope types, a `JmapTransport` seam with
//! an HTTP implementation over `reqwest`, and `JmapClient`, which scopes every
//! method call to the resolved account and unwraps the matching response.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::{StatusCode, Url};
use secrecy::{ExposeSecret, SecretString};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, info};

use crate::config::ServerConfig;
use crate::errors::{AppError, AppResult};
use crate::server::duration_ms;

/// Core capability, required on every request
pub const CORE_CAPABILITY: &str = "urn:ietf:params:jmap:core";
/// Mail capability (Email, Mailbox, Thread)
pub const MAIL_CAPABILITY: &str = "urn:ietf:params:jmap:mail";
/// Submission capability (Identity, EmailSubmission)
pub const SUBMISSION_CAPABILITY: &str = "urn:ietf:params:jmap:submission";

/// Capabilities for mail read/write calls
pub const USING_MAIL: &[&str] = &[CORE_CAPABILITY, MAIL_CAPABILITY];
/// Capabilities for submission calls
pub const USING_SUBMISSION: &[&str] = &[CORE_CAPABILITY, MAIL_CAPABILITY, SUBMISSION_CAPABILITY];

/// Call id used for single-method requests
const CALL_ID: &str = "0";
/// Maximum characters of an HTTP error body echoed into an error message
const MAX_ERROR_BODY_CHARS: usize = 512;

/// A method call or method response: `[name, arguments, callId]`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Invocation(pub String, pub Value, pub String);

/// JMAP API request envelope
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JmapRequest {
    pub using: Vec<String>,
    pub method_calls: Vec<Invocation>,
}

/// JMAP API response envelope
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JmapResponse {
    pub method_responses: Vec<Invocation>,
    #[serde(default)]
    pub session_state: Option<String>,
}

/// JMAP session resource (subset)
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    /// URL of the API endpoint; may be relative to the session URL
    pub api_url: String,
    /// Primary account id per capability
    #[serde(default)]
    pub primary_accounts: HashMap<String, String>,
    #[serde(default)]
    pub username: Option<String>,
}

impl Session {
    /// Resolve the account id used for every call
    ///
    /// A configured id wins; otherwise the primary mail account is used.
    ///
    /// # Errors
    ///
    /// Returns `InvalidInput` if neither source yields an account id.
    pub fn resolve_account_id(&self, configured: Option<&str>) -> AppResult<String> {
        if let Some(id) = configured {
            return Ok(id.to_owned());
        }
        self.primary_accounts
            .get(MAIL_CAPABILITY)
            .cloned()
            .ok_or_else(|| {
                AppError::invalid("session has no primary mail account; set JMAP_ACCOUNT_ID")
            })
    }
}

/// Sends JMAP API requests
///
/// Implemented over HTTP for production and in memory for tests.
#[async_trait]
pub trait JmapTransport: Send + Sync {
    async fn send(&self, request: JmapRequest) -> AppResult<JmapResponse>;
}

/// HTTP transport with bearer authentication
pub struct HttpTransport {
    http: reqwest::Client,
    api_url: Url,
    token: SecretString,
}

impl HttpTransport {
    /// Fetch the session resource and build a transport for its API URL
    ///
    /// # Errors
    ///
    /// - `AuthFailed` if the server rejects the bearer token
    /// - `Timeout` if the session request times out
    /// - `Remote` for other HTTP or network failures
    /// - `Internal` if the session document cannot be parsed
    pub async fn connect(config: &ServerConfig) -> AppResult<(Self, Session)> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_millis(config.request_timeout_ms))
            .connect_timeout(Duration::from_millis(config.connect_timeout_ms))
            .user_agent(concat!(
                env!("CARGO_PKG_NAME"),
                "/",
                env!("CARGO_PKG_VERSION")
            ))
            .build()
            .map_err(|e| AppError::Internal(format!("http client build failed: {e}")))?;

        let response = http
            .get(config.session_url.clone())
            .bearer_auth(config.bearer_token.expose_secret())
            .send()
            .await
            .map_err(transport_error)?;
        let session: Session = check_status(response)
            .await?
            .json()
            .await
            .map_err(|e| AppError::Internal(format!("invalid JMAP session document: {e}")))?;

        let api_url = config
            .session_url
            .join(&session.api_url)
            .map_err(|e| AppError::Internal(format!("invalid apiUrl '{}': {e}", session.api_url)))?;
        info!(api_url = %api_url, username = ?session.username, "JMAP session discovered");

        Ok((
            Self {
                http,
                api_url,
                token: config.bearer_token.clone(),
            },
            session,
        ))
    }
}

#[async_trait]
impl JmapTransport for HttpTransport {
    async fn send(&self, request: JmapRequest) -> AppResult<JmapResponse> {
        let response = self
            .http
            .post(self.api_url.clone())
            .bearer_auth(self.token.expose_secret())
            .json(&request)
            .send()
            .await
            .map_err(transport_error)?;
        check_status(response)
            .await?
            .json()
            .await
            .map_err(|e| AppError::Internal(format!("invalid JMAP response: {e}")))
    }
}

/// Map a `reqwest` send failure onto the error taxonomy
fn transport_error(e: reqwest::Error) -> AppError {
    if e.is_timeout() {
        AppError::Timeout(format!("JMAP request timed out: {e}"))
    } else {
        AppError::Remote(format!("JMAP request failed: {e}"))
    }
}

/// Reject non-success HTTP statuses, echoing a bounded slice of the body
async fn check_status(response: reqwest::Response) -> AppResult<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    let body: String = body.chars().take(MAX_ERROR_BODY_CHARS).collect();
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
            Err(AppError::AuthFailed(format!("HTTP {status}")))
        }
        _ => Err(AppError::Remote(format!("HTTP {status}: {body}"))),
    }
}

/// Account-scoped JMAP method caller
#[derive(Clone)]
pub struct JmapClient {
    transport: Arc<dyn JmapTransport>,
    account_id: String,
}

impl JmapClient {
    pub fn new(transport: Arc<dyn JmapTransport>, account_id: impl Into<String>) -> Self {
        Self {
            transport,
            account_id: account_id.into(),
        }
    }

    pub fn account_id(&self) -> &str {
        &self.account_id
    }

    /// Issue a single method call and return its typed response arguments
    ///
    /// `accountId` is injected into the serialized arguments, which must be
    /// a JSON object.
    ///
    /// # Errors
    ///
    /// - Transport errors as produced by the `JmapTransport`
    /// - `Remote` if the server answers with a method-level `error`
    /// - `Internal` if the response is missing or has an unexpected shape
    pub async fn call<A, R>(&self, using: &[&str], method: &str, arguments: A) -> AppResult<R>
    where
        A: Serialize,
        R: DeserializeOwned,
    {
        let mut arguments = serde_json::to_value(arguments)?;
        let Value::Object(map) = &mut arguments else {
            return Err(AppError::Internal(format!(
                "{method} arguments must be a JSON object"
            )));
        };
        map.insert(
            "accountId".to_owned(),
            Value::String(self.account_id.clone()),
        );

        let request = JmapRequest {
            using: using.iter().map(|c| (*c).to_owned()).collect(),
            method_calls: vec![Invocation(
                method.to_owned(),
                arguments,
                CALL_ID.to_owned(),
            )],
        };

        let started = Instant::now();
        let response = self.transport.send(request).await?;
        debug!(
            method,
            elapsed_ms = duration_ms(started),
            session_state = ?response.session_state,
            "JMAP call completed"
        );
        extract_response(method, response)
    }
}

/// Find the response for `method` within a response envelope
fn extract_response<R: DeserializeOwned>(method: &str, response: JmapResponse) -> AppResult<R> {
    for Invocation(name, arguments, call_id) in response.method_responses {
        if call_id != CALL_ID {
            continue;
        }
        if name == "error" {
            return Err(AppError::method_error(method, &arguments));
        }
        if name == method {
            return serde_json::from_value(arguments).map_err(|e| {
                AppError::Internal(format!("unexpected {method} response shape: {e}"))
            });
        }
    }
    Err(AppError::Internal(format!(
        "server response did not include {method}"
    )))
}

/// Sort comparator for `*/query`
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Comparator {
    pub property: &'static str,
    pub is_ascending: bool,
}

/// Arguments for `*/query`
///
/// An absent filter is omitted entirely rather than sent as `{}`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryArgs<F: Serialize> {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filter: Option<F>,
    pub sort: Vec<Comparator>,
    pub position: u64,
    pub limit: u32,
    pub calculate_total: bool,
}

/// Arguments for `*/get`
///
/// `ids: None` serializes as `null`, which fetches every record.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GetArgs {
    pub ids: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub properties: Option<Vec<String>>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Arguments for `*/set`
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SetArgs {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub create: Option<Map<String, Value>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub update: Option<Map<String, Value>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub destroy: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub on_success_update_email: Option<Map<String, Value>>,
}

/// Response of `*/query`
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryResponse {
    pub ids: Vec<String>,
    #[serde(default)]
    pub total: Option<u64>,
    #[serde(default)]
    pub position: u64,
    #[serde(default)]
    pub query_state: Option<String>,
    #[serde(default)]
    pub can_calculate_changes: bool,
}

/// Response of `*/get`
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", bound(deserialize = "T: DeserializeOwned"))]
pub struct GetResponse<T> {
    #[serde(default)]
    pub list: Vec<T>,
    #[serde(default)]
    pub not_found: Option<Vec<String>>,
}

/// Response of `*/set`, partitioned into succeeded and failed ids
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SetResponse {
    #[serde(default)]
    pub created: Option<Map<String, Value>>,
    #[serde(default)]
    pub updated: Option<Map<String, Value>>,
    #[serde(default)]
    pub destroyed: Option<Vec<String>>,
    #[serde(default)]
    pub not_created: Option<Map<String, Value>>,
    #[serde(default)]
    pub not_updated: Option<Map<String, Value>>,
    #[serde(default)]
    pub not_destroyed: Option<Map<String, Value>>,
}


#[cfg(test)]
mod tests {
    use serde_json::{Value, json};

    use super::testing::{MockTransport, client};
    use super::{
        CORE_CAPABILITY, GetArgs, GetResponse, Invocation, JmapResponse, QueryResponse, Session,
        USING_MAIL, extract_response,
    };
    use crate::errors::AppError;

    #[tokio::test]
    async fn call_injects_account_id_and_core_capability() {
        let transport = MockTransport::new();
        transport.reply("Thread/get", json!({ "list": [], "notFound": ["T1"] }));

        let response: GetResponse<Value> = client(&transport)
            .call(
                USING_MAIL,
                "Thread/get",
                GetArgs {
                    ids: Some(vec!["T1".to_owned()]),
                    ..Default::default()
                },
            )
            .await
            .expect("call succeeds");
        assert_eq!(response.not_found, Some(vec!["T1".to_owned()]));

        let requests = transport.requests();
        assert_eq!(requests.len(), 1);
        assert!(requests[0].using.iter().any(|c| c == CORE_CAPABILITY));
        assert_eq!(
            transport.call_args(0),
            json!({ "accountId": "A1", "ids": ["T1"] })
        );
    }

    #[test]
    fn get_response_records_need_no_default() {
        #[derive(Debug, serde::Deserialize)]
        struct Record {
            id: String,
        }

        let response: GetResponse<Record> =
            serde_json::from_value(json!({ "list": [{ "id": "I1" }] })).expect("parses");
        assert_eq!(response.list.len(), 1);
        assert_eq!(response.list[0].id, "I1");
        assert_eq!(response.not_found, None);

        let empty: GetResponse<Record> = serde_json::from_value(json!({})).expect("parses");
        assert!(empty.list.is_empty());
    }

    #[test]
    fn request_serializes_as_jmap_envelope() {
        let request = super::JmapRequest {
            using: vec![CORE_CAPABILITY.to_owned()],
            method_calls: vec![Invocation(
                "Email/get".to_owned(),
                json!({ "ids": ["E1"] }),
                "0".to_owned(),
            )],
        };
        assert_eq!(
            serde_json::to_value(&request).expect("serializes"),
            json!({
                "using": ["urn:ietf:params:jmap:core"],
                "methodCalls": [["Email/get", { "ids": ["E1"] }, "0"]]
            })
        );
    }

    #[test]
    fn get_args_without_ids_requests_all_records() {
        let value = serde_json::to_value(GetArgs::default()).expect("serializes");
        assert_eq!(value, json!({ "ids": null }));
    }

    #[test]
    fn method_error_response_becomes_remote_error() {
        let response = JmapResponse {
            method_responses: vec![Invocation(
                "error".to_owned(),
                json!({ "type": "invalidArguments", "description": "limit too large" }),
                "0".to_owned(),
            )],
            session_state: None,
        };
        let err = extract_response::<QueryResponse>("Email/query", response)
            .expect_err("must fail");
        assert!(matches!(err, AppError::Remote(_)));
        assert!(err.to_string().contains("limit too large"));
    }

    #[test]
    fn missing_method_response_is_internal_error() {
        let response = JmapResponse {
            method_responses: vec![],
            session_state: None,
        };
        let err = extract_response::<QueryResponse>("Email/query", response)
            .expect_err("must fail");
        assert!(err.to_string().contains("did not include Email/query"));
    }

    #[test]
    fn session_resolves_configured_or_primary_mail_account() {
        let session: Session = serde_json::from_value(json!({
            "apiUrl": "https://jmap.example.com/api/",
            "primaryAccounts": { "urn:ietf:params:jmap:mail": "u42" },
            "username": "me@example.com",
            "capabilities": {}
        }))
        .expect("parses");
        assert_eq!(session.resolve_account_id(None).expect("primary"), "u42");
        assert_eq!(
            session.resolve_account_id(Some("override")).expect("configured"),
            "override"
        );

        let empty: Session =
            serde_json::from_value(json!({ "apiUrl": "/api" })).expect("parses");
        let err = empty.resolve_account_id(None).expect_err("must fail");
        assert!(err.to_string().contains("JMAP_ACCOUNT_ID"));
    }
}

pub mod censys;
pub mod cloudflare;
pub mod ipapi;
pub mod peeringdb;
pub mod serpstack;

pub use censys::CensysProvider;
pub use cloudflare::CloudflareProvider;
pub use ipapi::IpApiProvider;
pub use peeringdb::PeeringDbProvider;
pub use serpstack::SerpStackProvider;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::time::Duration;

/// Free-form parameter map handed to `Provider::fetch`.
pub type Params = Map<String, Value>;

/// Coarse classification of a failed provider call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// Provider is registered but its required API key is absent.
    MissingCredential,
    /// The upstream call exceeded its configured timeout. Never retried.
    Timeout,
    /// Upstream returned a non-success status or a malformed body.
    Upstream,
    /// A required request parameter is missing or malformed.
    InvalidParams,
}

/// Outcome of one provider invocation. Immutable once produced.
///
/// Exactly one of `data`/`error` is set: `success == true` carries data and
/// no error, `success == false` carries an error message and a kind. The
/// constructors below are the only way these are built.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderResult {
    pub provider: String,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kind: Option<FailureKind>,
}

impl ProviderResult {
    pub fn ok(provider: &str, data: Value) -> Self {
        Self {
            provider: provider.to_string(),
            success: true,
            data: Some(data),
            error: None,
            kind: None,
        }
    }

    pub fn fail(provider: &str, kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            provider: provider.to_string(),
            success: false,
            data: None,
            error: Some(message.into()),
            kind: Some(kind),
        }
    }

    pub(crate) fn from_outcome(provider: &str, outcome: FetchOutcome) -> Self {
        match outcome {
            Ok(data) => Self::ok(provider, data),
            Err(failure) => Self::fail(provider, failure.kind, failure.message),
        }
    }
}

/// Describes one capability a provider exposes, for introspection listings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EndpointInfo {
    pub kind: String,
    pub description: String,
    pub requires_api_key: bool,
}

impl EndpointInfo {
    pub fn new(kind: &str, description: &str, requires_api_key: bool) -> Self {
        Self {
            kind: kind.to_string(),
            description: description.to_string(),
            requires_api_key,
        }
    }
}

/// One external data source integration.
///
/// `fetch` never returns `Err`: every failure mode (timeout, upstream
/// status, malformed body, missing parameter or credential) is converted
/// into a failed `ProviderResult` so a single bad call can be embedded in
/// a larger report without aborting it.
#[async_trait]
pub trait Provider: Send + Sync {
    fn name(&self) -> &str;
    fn version(&self) -> &str;
    fn endpoints(&self) -> Vec<EndpointInfo>;
    async fn fetch(&self, params: &Params) -> ProviderResult;
}

impl std::fmt::Debug for dyn Provider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Provider")
            .field("name", &self.name())
            .field("version", &self.version())
            .finish()
    }
}

/// Error carrier used by the typed provider helpers before the outcome is
/// folded into a `ProviderResult`.
#[derive(Debug)]
pub struct Failure {
    pub kind: FailureKind,
    pub message: String,
}

pub type FetchOutcome = std::result::Result<Value, Failure>;

impl Failure {
    pub fn credential(message: impl Into<String>) -> Self {
        Self {
            kind: FailureKind::MissingCredential,
            message: message.into(),
        }
    }

    pub fn upstream(message: impl Into<String>) -> Self {
        Self {
            kind: FailureKind::Upstream,
            message: message.into(),
        }
    }

    pub fn params(message: impl Into<String>) -> Self {
        Self {
            kind: FailureKind::InvalidParams,
            message: message.into(),
        }
    }
}

impl From<reqwest::Error> for Failure {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            return Self {
                kind: FailureKind::Timeout,
                message: format!("request timed out: {err}"),
            };
        }
        let message = match err.status() {
            Some(status) => format!("upstream returned status {status}"),
            None => format!("request failed: {err}"),
        };
        Self {
            kind: FailureKind::Upstream,
            message,
        }
    }
}

/// Shared client construction so every provider carries the same UA scheme
/// and its own timeout.
pub(crate) fn http_client(user_agent: &str, timeout: Duration) -> reqwest::Client {
    reqwest::Client::builder()
        .user_agent(user_agent)
        .timeout(timeout)
        .build()
        .unwrap_or_else(|_| reqwest::Client::new())
}

pub(crate) fn str_param<'a>(params: &'a Params, key: &str) -> Option<&'a str> {
    params.get(key).and_then(Value::as_str)
}

pub(crate) fn u64_param(params: &Params, key: &str) -> Option<u64> {
    params.get(key).and_then(Value::as_u64)
}

/// Convenience builder for small parameter maps.
pub fn params_from(pairs: &[(&str, Value)]) -> Params {
    pairs
        .iter()
        .map(|(key, value)| (key.to_string(), value.clone()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn ok_result_carries_data_and_no_error() {
        let result = ProviderResult::ok("ipapi", json!({"country": "Chile"}));
        assert!(result.success);
        assert!(result.data.is_some());
        assert!(result.error.is_none());
        assert!(result.kind.is_none());
    }

    #[test]
    fn failed_result_carries_error_and_no_data() {
        let result = ProviderResult::fail("censys", FailureKind::MissingCredential, "no token");
        assert!(!result.success);
        assert!(result.data.is_none());
        assert_eq!(result.error.as_deref(), Some("no token"));
        assert_eq!(result.kind, Some(FailureKind::MissingCredential));
    }

    #[test]
    fn failure_kind_serializes_snake_case() {
        let kind = serde_json::to_string(&FailureKind::MissingCredential).unwrap();
        assert_eq!(kind, "\"missing_credential\"");
    }
}

use super::{
    http_client, str_param, EndpointInfo, Failure, FetchOutcome, Params, Provider, ProviderResult,
};
use async_trait::async_trait;
use serde_json::{json, Map, Value};
use std::time::Duration;

const NAME: &str = "cloudflare";
const VERSION: &str = "1.0.0";
const USER_AGENT: &str = "netintel/0.1 (cloudflare-trace)";

/// Published trace endpoints; the first is the default, the rest are
/// alternates a caller can select with the `endpoint` parameter.
pub const TRACE_ENDPOINTS: [&str; 8] = [
    "https://one.one.one.one/cdn-cgi/trace",
    "https://1.0.0.1/cdn-cgi/trace",
    "https://cloudflare-dns.com/cdn-cgi/trace",
    "https://cloudflare-eth.com/cdn-cgi/trace",
    "https://workers.dev/cdn-cgi/trace",
    "https://pages.dev/cdn-cgi/trace",
    "https://cloudflare.tv/cdn-cgi/trace",
    "https://icanhazip.com/cdn-cgi/trace",
];

const GEOLOCATION_ENDPOINT: &str = "https://speed.cloudflare.com/meta";
const GEOLOCATION_HEADERS_ENDPOINT: &str = "https://speed.cloudflare.com/__down";

/// Cloudflare trace and geolocation, no API key required.
pub struct CloudflareProvider {
    client: reqwest::Client,
}

impl CloudflareProvider {
    pub fn new(timeout: Duration) -> Self {
        Self {
            client: http_client(USER_AGENT, timeout),
        }
    }

    /// Fetches the `key=value` trace body and returns the parsed fields.
    pub async fn trace(&self, endpoint: Option<&str>) -> FetchOutcome {
        let url = endpoint.unwrap_or(TRACE_ENDPOINTS[0]);
        let text = self
            .client
            .get(url)
            .send()
            .await
            .map_err(Failure::from)?
            .error_for_status()
            .map_err(Failure::from)?
            .text()
            .await
            .map_err(Failure::from)?;
        Ok(json!({
            "endpoint": url,
            "fields": Value::Object(parse_trace(&text)),
        }))
    }

    pub async fn geolocation(&self) -> FetchOutcome {
        let body: Value = self
            .client
            .get(GEOLOCATION_ENDPOINT)
            .send()
            .await
            .map_err(Failure::from)?
            .error_for_status()
            .map_err(Failure::from)?
            .json()
            .await
            .map_err(Failure::from)?;
        Ok(json!({
            "endpoint": GEOLOCATION_ENDPOINT,
            "meta": body,
        }))
    }

    /// Geolocation metadata carried in `cf-meta-*` response headers.
    pub async fn geolocation_headers(&self) -> FetchOutcome {
        let response = self
            .client
            .get(GEOLOCATION_HEADERS_ENDPOINT)
            .send()
            .await
            .map_err(Failure::from)?
            .error_for_status()
            .map_err(Failure::from)?;

        let mut headers = Map::new();
        for (key, value) in response.headers() {
            let key = key.as_str();
            if key.starts_with("cf-meta-") {
                if let Ok(value) = value.to_str() {
                    headers.insert(key.to_string(), Value::String(value.to_string()));
                }
            }
        }
        Ok(json!({
            "endpoint": GEOLOCATION_HEADERS_ENDPOINT,
            "headers": Value::Object(headers),
        }))
    }
}

#[async_trait]
impl Provider for CloudflareProvider {
    fn name(&self) -> &str {
        NAME
    }

    fn version(&self) -> &str {
        VERSION
    }

    fn endpoints(&self) -> Vec<EndpointInfo> {
        vec![
            EndpointInfo::new("trace", "Connection trace: ip, colo, TLS, warp status", false),
            EndpointInfo::new("geolocation", "Geolocation metadata as JSON", false),
            EndpointInfo::new(
                "geolocation_headers",
                "Geolocation metadata from cf-meta-* headers",
                false,
            ),
        ]
    }

    async fn fetch(&self, params: &Params) -> ProviderResult {
        let query_type = str_param(params, "query_type").unwrap_or("trace");
        let outcome = match query_type {
            "trace" => self.trace(str_param(params, "endpoint")).await,
            "geolocation" => self.geolocation().await,
            "geolocation_headers" => self.geolocation_headers().await,
            "all" => {
                let trace = self.trace(str_param(params, "endpoint")).await;
                let geolocation = self.geolocation().await;
                let headers = self.geolocation_headers().await;
                Ok(json!({
                    "trace": slot(trace),
                    "geolocation": slot(geolocation),
                    "geolocation_headers": slot(headers),
                }))
            }
            other => Err(Failure::params(format!(
                "unsupported query_type '{other}', expected one of: trace, geolocation, geolocation_headers, all"
            ))),
        };
        ProviderResult::from_outcome(NAME, outcome)
    }
}

/// In the `all` mode each sub-query fails independently; its slot carries
/// either the payload or an inline error object.
fn slot(outcome: FetchOutcome) -> Value {
    match outcome {
        Ok(value) => value,
        Err(failure) => json!({ "error": failure.message }),
    }
}

/// Parses the trace body (`key=value`, one pair per line) into a map.
pub fn parse_trace(text: &str) -> Map<String, Value> {
    let mut fields = Map::new();
    for line in text.lines() {
        if let Some((key, value)) = line.split_once('=') {
            fields.insert(
                key.trim().to_string(),
                Value::String(value.trim().to_string()),
            );
        }
    }
    fields
}

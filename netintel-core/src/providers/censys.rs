use super::{
    str_param, EndpointInfo, Failure, FetchOutcome, Params, Provider, ProviderResult,
};
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT};
use serde_json::{json, Value};
use std::time::Duration;

const NAME: &str = "censys";
const VERSION: &str = "2.0.0";
const HOST_ASSET_URL: &str = "https://api.platform.censys.io/v3/global/asset/host";
const USER_AGENT: &str = "netintel/0.1";
const ACCEPT_HEADER: &str = "application/vnd.censys.api.v3.host.v1+json";

const MAX_SERVICES: usize = 10;
const MAX_DNS_NAMES: usize = 20;

/// Internet-wide host search via the Censys Platform API v3.
/// Requires `CENSYS_API_TOKEN`.
pub struct CensysProvider {
    api_token: Option<String>,
    client: reqwest::Client,
}

impl CensysProvider {
    pub fn new(api_token: Option<String>, timeout: Duration) -> Self {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static(ACCEPT_HEADER));
        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(timeout)
            .default_headers(headers)
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self { api_token, client }
    }

    /// Raw host view, `GET /v3/global/asset/host/{ip}`.
    pub async fn view_host(&self, ip: &str) -> FetchOutcome {
        let token = self
            .api_token
            .as_deref()
            .ok_or_else(|| Failure::credential("CENSYS_API_TOKEN is not configured"))?;

        let response = self
            .client
            .get(format!("{HOST_ASSET_URL}/{ip}"))
            .bearer_auth(token)
            .send()
            .await
            .map_err(Failure::from)?;

        let status = response.status();
        if !status.is_success() {
            let message = match status.as_u16() {
                401 => "authentication failed (401): check CENSYS_API_TOKEN".to_string(),
                403 => "access denied (403): token lacks permission".to_string(),
                404 => format!("host {ip} not found (404)"),
                code => format!("censys returned status {code}"),
            };
            return Err(Failure::upstream(message));
        }

        response.json().await.map_err(Failure::from)
    }

    /// Condensed host view: open ports, service list, ASN, location.
    pub async fn host_summary(&self, ip: &str) -> FetchOutcome {
        let body = self.view_host(ip).await?;
        summarize(ip, &body)
            .ok_or_else(|| Failure::upstream(format!("host {ip} not present in censys response")))
    }
}

#[async_trait]
impl Provider for CensysProvider {
    fn name(&self) -> &str {
        NAME
    }

    fn version(&self) -> &str {
        VERSION
    }

    fn endpoints(&self) -> Vec<EndpointInfo> {
        vec![
            EndpointInfo::new("view_host", "Full host record for an IP", true),
            EndpointInfo::new(
                "get_host_summary",
                "Open ports, services, ASN and location for an IP",
                true,
            ),
        ]
    }

    async fn fetch(&self, params: &Params) -> ProviderResult {
        let query_type = str_param(params, "query_type").unwrap_or("get_host_summary");
        let Some(ip) = str_param(params, "ip") else {
            return ProviderResult::fail(
                NAME,
                super::FailureKind::InvalidParams,
                "missing required parameter: ip",
            );
        };

        let outcome = match query_type {
            "get_host_summary" => self.host_summary(ip).await,
            "view_host" => self.view_host(ip).await,
            other => Err(Failure::params(format!(
                "unsupported query_type '{other}', expected 'get_host_summary' or 'view_host'"
            ))),
        };
        ProviderResult::from_outcome(NAME, outcome)
    }
}

/// Extracts the summary from a raw v3 host response. Returns `None` when
/// the response carries no resource for the host.
fn summarize(ip: &str, body: &Value) -> Option<Value> {
    let resource = body.get("result")?.get("resource")?;
    if resource.is_null() {
        return None;
    }

    let services = resource
        .get("services")
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default();

    let mut ports: Vec<u64> = services
        .iter()
        .filter_map(|s| s.get("port").and_then(Value::as_u64))
        .collect();
    ports.sort_unstable();
    ports.dedup();

    let service_entries: Vec<Value> = services
        .iter()
        .take(MAX_SERVICES)
        .map(|s| {
            json!({
                "port": s.get("port").cloned().unwrap_or(Value::Null),
                "service_name": s.get("protocol").cloned().unwrap_or(Value::Null),
                "transport_protocol": s.get("transport_protocol").cloned().unwrap_or(Value::Null),
            })
        })
        .collect();

    let asn = resource.get("autonomous_system").cloned().unwrap_or(Value::Null);
    let location = resource.get("location").cloned().unwrap_or(Value::Null);
    let dns_names: Vec<Value> = resource
        .get("dns")
        .and_then(|d| d.get("names"))
        .and_then(Value::as_array)
        .map(|names| names.iter().take(MAX_DNS_NAMES).cloned().collect())
        .unwrap_or_default();

    Some(json!({
        "ip": ip,
        "ports": ports,
        "services": service_entries,
        "services_count": services.len(),
        "autonomous_system": {
            "asn": asn.get("asn").cloned().unwrap_or(Value::Null),
            "name": asn.get("name").cloned().unwrap_or(Value::Null),
            "country_code": asn.get("country_code").cloned().unwrap_or(Value::Null),
        },
        "location": {
            "country": location.get("country").cloned().unwrap_or(Value::Null),
            "country_code": location.get("country_code").cloned().unwrap_or(Value::Null),
            "city": location.get("city").cloned().unwrap_or(Value::Null),
            "coordinates": location.get("coordinates").cloned().unwrap_or(Value::Null),
        },
        "dns_names": dns_names,
        "last_updated": resource.get("last_updated_at").cloned().unwrap_or(Value::Null),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_body() -> Value {
        json!({
            "result": {
                "resource": {
                    "services": [
                        {"port": 443, "protocol": "HTTP", "transport_protocol": "TCP"},
                        {"port": 80, "protocol": "HTTP", "transport_protocol": "TCP"},
                        {"port": 443, "protocol": "HTTP", "transport_protocol": "TCP"}
                    ],
                    "autonomous_system": {"asn": 13335, "name": "CLOUDFLARENET", "country_code": "US"},
                    "location": {"country": "United States", "country_code": "US", "city": "San Francisco"},
                    "dns": {"names": ["one.one.one.one"]},
                    "last_updated_at": "2026-08-01T00:00:00Z"
                }
            }
        })
    }

    #[test]
    fn summary_sorts_and_dedups_ports() {
        let summary = summarize("1.1.1.1", &sample_body()).unwrap();
        assert_eq!(summary["ports"], json!([80, 443]));
        assert_eq!(summary["services_count"], 3);
        assert_eq!(summary["autonomous_system"]["asn"], 13335);
        assert_eq!(summary["location"]["country"], "United States");
    }

    #[test]
    fn missing_resource_yields_none() {
        assert!(summarize("1.1.1.1", &json!({"result": {}})).is_none());
        assert!(summarize("1.1.1.1", &json!({})).is_none());
    }

    #[tokio::test]
    async fn fetch_without_token_is_missing_credential() {
        let provider = CensysProvider::new(None, Duration::from_secs(1));
        let params = super::super::params_from(&[("ip", "1.1.1.1".into())]);
        let result = provider.fetch(&params).await;
        assert!(!result.success);
        assert_eq!(result.kind, Some(super::super::FailureKind::MissingCredential));
    }

    #[tokio::test]
    async fn fetch_without_ip_is_invalid_params() {
        let provider = CensysProvider::new(Some("censys_token".into()), Duration::from_secs(1));
        let result = provider.fetch(&Params::new()).await;
        assert!(!result.success);
        assert_eq!(result.kind, Some(super::super::FailureKind::InvalidParams));
    }
}

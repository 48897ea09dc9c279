use super::{
    http_client, str_param, u64_param, EndpointInfo, Failure, FetchOutcome, Params, Provider,
    ProviderResult,
};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::time::Duration;
use url::Url;

const NAME: &str = "serpstack";
const VERSION: &str = "1.0.0";
const BASE_URL: &str = "https://api.serpstack.com";
const USER_AGENT: &str = "netintel/0.1";
const MAX_RESULTS: u64 = 100;

/// SERP search via the serpstack API. Requires `SERPSTACK_API_KEY`.
pub struct SerpStackProvider {
    api_key: Option<String>,
    client: reqwest::Client,
}

/// One organic search result, normalized from the upstream payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchItem {
    pub title: Option<String>,
    pub url: Option<String>,
    pub position: Option<u32>,
}

/// A unique hostname extracted from search results, tagged with the
/// earliest result it was seen in.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DomainCandidate {
    pub domain: String,
    pub url: String,
    pub title: Option<String>,
    pub position: Option<u32>,
}

impl SerpStackProvider {
    pub fn new(api_key: Option<String>, timeout: Duration) -> Self {
        Self {
            api_key,
            client: http_client(USER_AGENT, timeout),
        }
    }

    pub async fn search(
        &self,
        query: &str,
        num: u64,
        location: Option<&str>,
    ) -> FetchOutcome {
        let api_key = self
            .api_key
            .as_deref()
            .ok_or_else(|| Failure::credential("SERPSTACK_API_KEY is not configured"))?;

        let mut request_params = vec![
            ("access_key", api_key.to_string()),
            ("query", query.to_string()),
            ("num", num.min(MAX_RESULTS).to_string()),
        ];
        if let Some(location) = location {
            request_params.push(("location", location.to_string()));
        }

        let body: Value = self
            .client
            .get(format!("{BASE_URL}/search"))
            .query(&request_params)
            .send()
            .await
            .map_err(Failure::from)?
            .error_for_status()
            .map_err(Failure::from)?
            .json()
            .await
            .map_err(Failure::from)?;

        // serpstack reports API-level errors in-body with a 200 status.
        if let Some(upstream) = body.get("error") {
            let info = upstream
                .get("info")
                .and_then(Value::as_str)
                .unwrap_or("serpstack reported an unspecified error");
            return Err(Failure::upstream(info));
        }

        let organic_results: Vec<Value> = body
            .get("organic_results")
            .and_then(Value::as_array)
            .map(|items| {
                items
                    .iter()
                    .map(|item| {
                        json!({
                            "title": item.get("title").cloned().unwrap_or(Value::Null),
                            "url": item.get("url").cloned().unwrap_or(Value::Null),
                            "position": item.get("position").cloned().unwrap_or(Value::Null),
                        })
                    })
                    .collect()
            })
            .unwrap_or_default();

        Ok(json!({
            "query": query,
            "total_results": organic_results.len(),
            "organic_results": organic_results,
        }))
    }

    async fn search_domains(
        &self,
        query: &str,
        num: u64,
        location: Option<&str>,
        limit: usize,
    ) -> FetchOutcome {
        let body = self.search(query, num, location).await?;
        let items: Vec<SearchItem> = body
            .get("organic_results")
            .map(|v| serde_json::from_value(v.clone()))
            .transpose()
            .map_err(|err| Failure::upstream(format!("malformed organic_results: {err}")))?
            .unwrap_or_default();
        let domains = extract_domains(&items, limit);
        Ok(json!({
            "query": query,
            "total_domains": domains.len(),
            "domains": domains,
        }))
    }
}

#[async_trait]
impl Provider for SerpStackProvider {
    fn name(&self) -> &str {
        NAME
    }

    fn version(&self) -> &str {
        VERSION
    }

    fn endpoints(&self) -> Vec<EndpointInfo> {
        vec![
            EndpointInfo::new("search", "Google SERP search", true),
            EndpointInfo::new(
                "extract_domains",
                "Unique hostnames from search results, first-seen order",
                true,
            ),
        ]
    }

    async fn fetch(&self, params: &Params) -> ProviderResult {
        let query_type = str_param(params, "query_type").unwrap_or("search");
        let Some(query) = str_param(params, "query") else {
            return ProviderResult::fail(
                NAME,
                super::FailureKind::InvalidParams,
                "missing required parameter: query",
            );
        };
        let num = u64_param(params, "num").unwrap_or(10);
        let location = str_param(params, "location");

        let outcome = match query_type {
            "search" => self.search(query, num, location).await,
            "extract_domains" => {
                let limit = u64_param(params, "limit").unwrap_or(num) as usize;
                self.search_domains(query, num, location, limit).await
            }
            other => Err(Failure::params(format!(
                "unsupported query_type '{other}', expected 'search' or 'extract_domains'"
            ))),
        };
        ProviderResult::from_outcome(NAME, outcome)
    }
}

/// Hostname of a result URL, with a leading `www.` stripped.
pub fn result_hostname(raw: &str) -> Option<String> {
    let parsed = Url::parse(raw).ok()?;
    let host = parsed.host_str()?;
    let host = host.strip_prefix("www.").unwrap_or(host);
    if host.is_empty() {
        None
    } else {
        Some(host.to_ascii_lowercase())
    }
}

/// Deduplicates hostnames from search results, preserving first-seen order.
/// Because SERP results arrive position-ordered, the kept entry carries the
/// earliest (lowest) position a domain appeared at. Output length <= `limit`.
pub fn extract_domains(items: &[SearchItem], limit: usize) -> Vec<DomainCandidate> {
    let mut candidates: Vec<DomainCandidate> = Vec::new();
    for item in items {
        if candidates.len() == limit {
            break;
        }
        let Some(url) = item.url.as_deref() else {
            continue;
        };
        let Some(domain) = result_hostname(url) else {
            continue;
        };
        if candidates.iter().any(|c| c.domain == domain) {
            continue;
        }
        candidates.push(DomainCandidate {
            domain,
            url: url.to_string(),
            title: item.title.clone(),
            position: item.position,
        });
    }
    candidates
}

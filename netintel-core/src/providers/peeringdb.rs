use super::{
    http_client, str_param, u64_param, EndpointInfo, Failure, FetchOutcome, Params, Provider,
    ProviderResult,
};
use async_trait::async_trait;
use serde_json::{json, Value};
use std::time::Duration;

const NAME: &str = "peeringdb";
const VERSION: &str = "1.0.0";
const BASE_URL: &str = "https://www.peeringdb.com/api";
const USER_AGENT: &str = "netintel/0.1";

/// Peering registry lookups against PeeringDB. No API key required.
pub struct PeeringDbProvider {
    client: reqwest::Client,
}

impl PeeringDbProvider {
    pub fn new(timeout: Duration) -> Self {
        Self {
            client: http_client(USER_AGENT, timeout),
        }
    }

    /// First network record registered for `asn`, with depth-2 relations.
    pub async fn network_by_asn(&self, asn: u64) -> FetchOutcome {
        let body: Value = self
            .client
            .get(format!("{BASE_URL}/net"))
            .query(&[("asn", asn.to_string()), ("depth", "2".to_string())])
            .send()
            .await
            .map_err(Failure::from)?
            .error_for_status()
            .map_err(Failure::from)?
            .json()
            .await
            .map_err(Failure::from)?;

        let network = body
            .get("data")
            .and_then(Value::as_array)
            .and_then(|records| records.first())
            .cloned();

        match network {
            Some(network) => Ok(json!({ "asn": asn, "network": network })),
            None => Err(Failure::upstream(format!(
                "no peeringdb network record for AS{asn}"
            ))),
        }
    }
}

#[async_trait]
impl Provider for PeeringDbProvider {
    fn name(&self) -> &str {
        NAME
    }

    fn version(&self) -> &str {
        VERSION
    }

    fn endpoints(&self) -> Vec<EndpointInfo> {
        vec![EndpointInfo::new(
            "get_network_by_asn",
            "Network record for an autonomous system number",
            false,
        )]
    }

    async fn fetch(&self, params: &Params) -> ProviderResult {
        let query_type = str_param(params, "query_type").unwrap_or("get_network_by_asn");
        let Some(asn) = u64_param(params, "asn") else {
            return ProviderResult::fail(
                NAME,
                super::FailureKind::InvalidParams,
                "missing required parameter: asn",
            );
        };

        let outcome = match query_type {
            "get_network_by_asn" => self.network_by_asn(asn).await,
            other => Err(Failure::params(format!(
                "unsupported query_type '{other}', expected 'get_network_by_asn'"
            ))),
        };
        ProviderResult::from_outcome(NAME, outcome)
    }
}

use super::{
    http_client, str_param, EndpointInfo, Failure, FetchOutcome, Params, Provider, ProviderResult,
};
use async_trait::async_trait;
use serde_json::Value;
use std::time::Duration;

const NAME: &str = "ipapi";
const VERSION: &str = "1.0.0";
// Free tier is plain HTTP only.
const BASE_URL: &str = "http://ip-api.com";
const USER_AGENT: &str = "netintel/0.1";

/// Free IP geolocation via ip-api.com. No API key required.
pub struct IpApiProvider {
    client: reqwest::Client,
}

impl IpApiProvider {
    pub fn new(timeout: Duration) -> Self {
        Self {
            client: http_client(USER_AGENT, timeout),
        }
    }

    /// Looks up geolocation for `ip`, or the caller's own address when
    /// `ip` is `None`.
    pub async fn lookup(&self, ip: Option<&str>, lang: Option<&str>) -> FetchOutcome {
        let url = match ip {
            Some(ip) => format!("{BASE_URL}/json/{ip}"),
            None => format!("{BASE_URL}/json/"),
        };
        let mut request = self.client.get(url);
        if let Some(lang) = lang.filter(|l| *l != "en") {
            request = request.query(&[("lang", lang)]);
        }

        let body: Value = request
            .send()
            .await
            .map_err(Failure::from)?
            .error_for_status()
            .map_err(Failure::from)?
            .json()
            .await
            .map_err(Failure::from)?;

        // ip-api signals errors in-body with status=fail and a 200 code.
        if body.get("status").and_then(Value::as_str) == Some("fail") {
            let message = body
                .get("message")
                .and_then(Value::as_str)
                .unwrap_or("ip-api reported failure");
            return Err(Failure::upstream(message));
        }
        Ok(body)
    }
}

#[async_trait]
impl Provider for IpApiProvider {
    fn name(&self) -> &str {
        NAME
    }

    fn version(&self) -> &str {
        VERSION
    }

    fn endpoints(&self) -> Vec<EndpointInfo> {
        vec![EndpointInfo::new(
            "lookup",
            "IP geolocation: country, city, ISP, coordinates",
            false,
        )]
    }

    async fn fetch(&self, params: &Params) -> ProviderResult {
        let query_type = str_param(params, "query_type").unwrap_or("lookup");
        let outcome = match query_type {
            "lookup" => {
                self.lookup(str_param(params, "ip"), str_param(params, "lang"))
                    .await
            }
            other => Err(Failure::params(format!(
                "unsupported query_type '{other}', expected 'lookup'"
            ))),
        };
        ProviderResult::from_outcome(NAME, outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn unsupported_query_type_is_invalid_params() {
        let provider = IpApiProvider::new(Duration::from_secs(1));
        let params = super::super::params_from(&[("query_type", "batch".into())]);
        let result = provider.fetch(&params).await;
        assert!(!result.success);
        assert_eq!(result.kind, Some(super::super::FailureKind::InvalidParams));
    }
}

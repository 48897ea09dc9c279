pub mod orchestrator;

pub use orchestrator::Orchestrator;

use crate::providers::serpstack::DomainCandidate;
use crate::providers::ProviderResult;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeSet;
use std::net::{IpAddr, Ipv4Addr};

pub const WORKFLOW_SEARCH: &str = "serp_dns_fanout";
pub const WORKFLOW_SELF: &str = "self_analysis";

/// Parsed request parameters for one orchestration run.
///
/// `query = None` selects the own-IP path: the search and DNS stages are
/// skipped and the caller's public address is analyzed instead.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalyzeRequest {
    pub query: Option<String>,
    pub num_results: u64,
    pub analyze_top: usize,
    pub include_censys: bool,
    pub location: Option<String>,
    pub language: Option<String>,
}

impl Default for AnalyzeRequest {
    fn default() -> Self {
        Self {
            query: None,
            num_results: 5,
            analyze_top: 3,
            include_censys: true,
            location: None,
            language: None,
        }
    }
}

impl AnalyzeRequest {
    pub fn for_query(query: impl Into<String>) -> Self {
        Self {
            query: Some(query.into()),
            ..Self::default()
        }
    }
}

/// What the search stage produced, kept in the report for traceability.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SerpSummary {
    pub total_results: usize,
    pub domains: Vec<DomainCandidate>,
}

/// Per-target section of the report. Provider slots are absent (not null)
/// when the provider was skipped; a failed call keeps its slot with the
/// failure recorded inline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DomainAnalysis {
    pub domain: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub position: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ip: Option<String>,
    pub dns_resolved: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trace: Option<ProviderResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub geolocation: Option<ProviderResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub censys: Option<ProviderResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub peering: Option<ProviderResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl DomainAnalysis {
    pub(crate) fn unresolved(candidate: &DomainCandidate) -> Self {
        Self {
            domain: candidate.domain.clone(),
            title: candidate.title.clone(),
            position: candidate.position,
            ip: None,
            dns_resolved: false,
            trace: None,
            geolocation: None,
            censys: None,
            peering: None,
            error: Some("DNS resolution failed".to_string()),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportSummary {
    pub domains_analyzed: usize,
    pub domains_resolved: usize,
    pub distinct_countries: Vec<String>,
    pub total_open_ports: usize,
}

/// Consolidated report for one orchestration run. Always `status: success`;
/// per-item failures live inline in `analysis`. A top-level failure is an
/// `OrchestratorError::PipelineAbort` instead of a report.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisReport {
    pub status: String,
    pub timestamp: DateTime<Utc>,
    pub workflow: String,
    pub query: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub serp: Option<SerpSummary>,
    pub analysis: Vec<DomainAnalysis>,
    pub summary: ReportSummary,
    pub execution_ms: u64,
}

/// Aggregation over the per-domain results, in report order.
pub(crate) fn summarize(analysis: &[DomainAnalysis]) -> ReportSummary {
    let domains_resolved = analysis.iter().filter(|entry| entry.dns_resolved).count();

    let mut countries = BTreeSet::new();
    let mut total_open_ports = 0usize;

    for entry in analysis {
        if let Some(geo) = entry.geolocation.as_ref().filter(|r| r.success) {
            if let Some(country) = geo
                .data
                .as_ref()
                .and_then(|d| d.get("country"))
                .and_then(Value::as_str)
            {
                countries.insert(country.to_string());
            }
        }
        if let Some(censys) = entry.censys.as_ref().filter(|r| r.success) {
            if let Some(ports) = censys
                .data
                .as_ref()
                .and_then(|d| d.get("ports"))
                .and_then(Value::as_array)
            {
                total_open_ports += ports.len();
            }
        }
    }

    ReportSummary {
        domains_analyzed: analysis.len(),
        domains_resolved,
        distinct_countries: countries.into_iter().collect(),
        total_open_ports,
    }
}

/// Seam for the DNS stage so orchestration is testable without the network.
#[async_trait]
pub trait DnsResolver: Send + Sync {
    /// Resolves a hostname to at most one IPv4 address.
    async fn resolve_v4(&self, domain: &str) -> Option<Ipv4Addr>;
}

/// System resolver backed by `tokio::net::lookup_host`.
pub struct SystemResolver;

#[async_trait]
impl DnsResolver for SystemResolver {
    async fn resolve_v4(&self, domain: &str) -> Option<Ipv4Addr> {
        let addrs = tokio::net::lookup_host((domain, 0u16)).await.ok()?;
        addrs
            .filter_map(|addr| match addr.ip() {
                IpAddr::V4(v4) => Some(v4),
                IpAddr::V6(_) => None,
            })
            .next()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::{FailureKind, ProviderResult};
    use serde_json::json;

    fn entry(
        domain: &str,
        resolved: bool,
        geo: Option<ProviderResult>,
        censys: Option<ProviderResult>,
    ) -> DomainAnalysis {
        DomainAnalysis {
            domain: domain.to_string(),
            title: None,
            position: None,
            ip: resolved.then(|| "198.51.100.1".to_string()),
            dns_resolved: resolved,
            trace: None,
            geolocation: geo,
            censys,
            peering: None,
            error: None,
        }
    }

    #[test]
    fn summary_counts_and_orders_countries() {
        let analysis = vec![
            entry(
                "a.example",
                true,
                Some(ProviderResult::ok("ipapi", json!({"country": "United States"}))),
                Some(ProviderResult::ok("censys", json!({"ports": [80, 443]}))),
            ),
            entry(
                "b.example",
                true,
                Some(ProviderResult::ok("ipapi", json!({"country": "Chile"}))),
                Some(ProviderResult::ok("censys", json!({"ports": [22]}))),
            ),
            entry("c.example", false, None, None),
        ];

        let summary = summarize(&analysis);
        assert_eq!(summary.domains_analyzed, 3);
        assert_eq!(summary.domains_resolved, 2);
        assert_eq!(summary.distinct_countries, vec!["Chile", "United States"]);
        assert_eq!(summary.total_open_ports, 3);
    }

    #[test]
    fn failed_provider_results_do_not_count() {
        let analysis = vec![entry(
            "a.example",
            true,
            Some(ProviderResult::fail("ipapi", FailureKind::Timeout, "timed out")),
            Some(ProviderResult::fail("censys", FailureKind::Upstream, "503")),
        )];
        let summary = summarize(&analysis);
        assert!(summary.distinct_countries.is_empty());
        assert_eq!(summary.total_open_ports, 0);
    }

    #[test]
    fn request_defaults_match_contract() {
        let request = AnalyzeRequest::default();
        assert_eq!(request.num_results, 5);
        assert_eq!(request.analyze_top, 3);
        assert!(request.include_censys);
    }

    #[test]
    fn skipped_slots_are_absent_from_json() {
        let analysis = entry("a.example", false, None, None);
        let value = serde_json::to_value(&analysis).unwrap();
        let object = value.as_object().unwrap();
        assert!(!object.contains_key("censys"));
        assert!(!object.contains_key("peering"));
        assert!(!object.contains_key("geolocation"));
        assert!(object.contains_key("dns_resolved"));
    }
}

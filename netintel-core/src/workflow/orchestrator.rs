use super::{
    summarize, AnalyzeRequest, AnalysisReport, DnsResolver, DomainAnalysis, SerpSummary,
    SystemResolver, WORKFLOW_SEARCH, WORKFLOW_SELF,
};
use crate::error::{OrchestratorError, Result};
use crate::providers::serpstack::{extract_domains, DomainCandidate, SearchItem};
use crate::providers::{Params, Provider, ProviderResult};
use crate::registry::ProviderRegistry;
use chrono::Utc;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Instant;
use tokio::task::JoinSet;

/// Composes the registered providers into the dependency-ordered pipeline:
/// search, domain extraction, DNS resolution, then a concurrent per-domain
/// fan-out, and finally aggregation into one consolidated report.
///
/// Only the search stage is mandatory; every other per-domain or
/// per-provider failure is recorded inline so the caller always gets the
/// best available picture.
pub struct Orchestrator {
    registry: Arc<ProviderRegistry>,
    resolver: Arc<dyn DnsResolver>,
}

/// The providers a single domain's analysis bundle invokes. Resolved once
/// per run; absent entries mean the provider is skipped for every domain.
struct FanOut {
    cloudflare: Option<Arc<dyn Provider>>,
    ipapi: Option<Arc<dyn Provider>>,
    censys: Option<Arc<dyn Provider>>,
    peeringdb: Option<Arc<dyn Provider>>,
    language: Option<String>,
}

impl Orchestrator {
    pub fn new(registry: Arc<ProviderRegistry>) -> Self {
        Self {
            registry,
            resolver: Arc::new(SystemResolver),
        }
    }

    pub fn with_resolver(mut self, resolver: Arc<dyn DnsResolver>) -> Self {
        self.resolver = resolver;
        self
    }

    pub async fn run(&self, request: &AnalyzeRequest) -> Result<AnalysisReport> {
        let started = Instant::now();
        match request.query.as_deref() {
            Some(query) if !query.trim().is_empty() => {
                self.run_search(query.trim(), request, started).await
            }
            Some(_) => Err(OrchestratorError::InvalidInput(
                "query must not be empty".to_string(),
            )),
            None => self.run_self(request, started).await,
        }
    }

    /// The full pipeline: SERP search feeding DNS resolution and fan-out.
    async fn run_search(
        &self,
        query: &str,
        request: &AnalyzeRequest,
        started: Instant,
    ) -> Result<AnalysisReport> {
        tracing::info!(query = %query, "starting search analysis");

        let serp = self
            .registry
            .resolve("serpstack")
            .map_err(|_| abort("search", "serpstack provider is not registered"))?;

        let mut params = Params::new();
        params.insert("query_type".to_string(), json!("search"));
        params.insert("query".to_string(), json!(query));
        params.insert("num".to_string(), json!(request.num_results));
        if let Some(location) = &request.location {
            params.insert("location".to_string(), json!(location));
        }

        let result = serp.fetch(&params).await;
        if !result.success {
            let message = result
                .error
                .unwrap_or_else(|| "search failed without detail".to_string());
            return Err(abort("search", message));
        }
        let data = result.data.unwrap_or(Value::Null);

        let items: Vec<SearchItem> = data
            .get("organic_results")
            .map(|v| serde_json::from_value(v.clone()))
            .transpose()?
            .unwrap_or_default();

        let candidates = extract_domains(&items, request.analyze_top);
        tracing::info!(
            total_results = items.len(),
            domains = candidates.len(),
            "search stage complete"
        );

        let analysis = self.analyze_candidates(&candidates, request).await;

        Ok(AnalysisReport {
            status: "success".to_string(),
            timestamp: Utc::now(),
            workflow: WORKFLOW_SEARCH.to_string(),
            query: query.to_string(),
            serp: Some(SerpSummary {
                total_results: items.len(),
                domains: candidates,
            }),
            summary: summarize(&analysis),
            analysis,
            execution_ms: started.elapsed().as_millis() as u64,
        })
    }

    /// Own-IP path: no search or DNS stages; the caller's public address is
    /// discovered from a trace and fed straight into the fan-out.
    async fn run_self(&self, request: &AnalyzeRequest, started: Instant) -> Result<AnalysisReport> {
        tracing::info!("starting own-IP analysis");

        let cloudflare = self
            .registry
            .resolve("cloudflare")
            .map_err(|_| abort("trace", "cloudflare provider is not registered"))?;

        let mut params = Params::new();
        params.insert("query_type".to_string(), json!("trace"));
        let result = cloudflare.fetch(&params).await;
        if !result.success {
            let message = result
                .error
                .unwrap_or_else(|| "trace failed without detail".to_string());
            return Err(abort("trace", message));
        }

        let ip = result
            .data
            .as_ref()
            .and_then(|d| d.get("fields"))
            .and_then(|f| f.get("ip"))
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| abort("trace", "trace response did not include an ip field"))?;

        let fan_out = self.fan_out_for(request);
        let analysis = vec![analyze_ip("self".to_string(), None, None, ip, &fan_out).await];

        Ok(AnalysisReport {
            status: "success".to_string(),
            timestamp: Utc::now(),
            workflow: WORKFLOW_SELF.to_string(),
            query: "self".to_string(),
            serp: None,
            summary: summarize(&analysis),
            analysis,
            execution_ms: started.elapsed().as_millis() as u64,
        })
    }

    /// Stages 3 and 4: one task per candidate, each resolving DNS and then
    /// fanning out over the analysis providers. Results are merged back in
    /// candidate order regardless of task completion order.
    async fn analyze_candidates(
        &self,
        candidates: &[DomainCandidate],
        request: &AnalyzeRequest,
    ) -> Vec<DomainAnalysis> {
        let fan_out = Arc::new(self.fan_out_for(request));
        let mut tasks = JoinSet::new();

        for (index, candidate) in candidates.iter().cloned().enumerate() {
            let fan_out = Arc::clone(&fan_out);
            let resolver = Arc::clone(&self.resolver);
            tasks.spawn(async move {
                let analysis = analyze_candidate(candidate, resolver, fan_out).await;
                (index, analysis)
            });
        }

        let mut slots: Vec<Option<DomainAnalysis>> =
            (0..candidates.len()).map(|_| None).collect();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((index, analysis)) => slots[index] = Some(analysis),
                Err(err) => tracing::error!(error = %err, "analysis task failed to complete"),
            }
        }

        slots
            .into_iter()
            .enumerate()
            .map(|(index, slot)| {
                slot.unwrap_or_else(|| {
                    let mut entry = DomainAnalysis::unresolved(&candidates[index]);
                    entry.error = Some("analysis task failed to complete".to_string());
                    entry
                })
            })
            .collect()
    }

    fn fan_out_for(&self, request: &AnalyzeRequest) -> FanOut {
        let censys_enabled = request.include_censys;
        FanOut {
            cloudflare: self.registry.resolve("cloudflare").ok(),
            ipapi: self.registry.resolve("ipapi").ok(),
            censys: censys_enabled
                .then(|| self.registry.resolve("censys").ok())
                .flatten(),
            // The peering lookup only ever runs on an ASN discovered by the
            // host search, so disabling censys disables it too.
            peeringdb: censys_enabled
                .then(|| self.registry.resolve("peeringdb").ok())
                .flatten(),
            language: request.language.clone(),
        }
    }
}

fn abort(stage: &'static str, message: impl Into<String>) -> OrchestratorError {
    OrchestratorError::PipelineAbort {
        stage,
        message: message.into(),
    }
}

async fn analyze_candidate(
    candidate: DomainCandidate,
    resolver: Arc<dyn DnsResolver>,
    fan_out: Arc<FanOut>,
) -> DomainAnalysis {
    let Some(ip) = resolver.resolve_v4(&candidate.domain).await else {
        tracing::debug!(domain = %candidate.domain, "DNS resolution failed");
        return DomainAnalysis::unresolved(&candidate);
    };

    analyze_ip(
        candidate.domain,
        candidate.title,
        candidate.position,
        ip.to_string(),
        &fan_out,
    )
    .await
}

/// Stage 4 for one target: trace, geolocation and the host-search chain run
/// concurrently; a failure in one never cancels the others. The peering
/// lookup is conditional on the host search reporting an ASN.
async fn analyze_ip(
    domain: String,
    title: Option<String>,
    position: Option<u32>,
    ip: String,
    fan_out: &FanOut,
) -> DomainAnalysis {
    let trace_call = async {
        match &fan_out.cloudflare {
            Some(provider) => {
                let mut params = Params::new();
                params.insert("query_type".to_string(), json!("trace"));
                params.insert("ip".to_string(), json!(ip));
                Some(provider.fetch(&params).await)
            }
            None => None,
        }
    };

    let geo_call = async {
        match &fan_out.ipapi {
            Some(provider) => {
                let mut params = Params::new();
                params.insert("query_type".to_string(), json!("lookup"));
                params.insert("ip".to_string(), json!(ip));
                if let Some(lang) = &fan_out.language {
                    params.insert("lang".to_string(), json!(lang));
                }
                Some(provider.fetch(&params).await)
            }
            None => None,
        }
    };

    let host_chain = async {
        let Some(censys) = &fan_out.censys else {
            return (None, None);
        };
        let mut params = Params::new();
        params.insert("query_type".to_string(), json!("get_host_summary"));
        params.insert("ip".to_string(), json!(ip));
        let censys_result = censys.fetch(&params).await;

        let peering = match (&fan_out.peeringdb, discovered_asn(&censys_result)) {
            (Some(provider), Some(asn)) => {
                let mut params = Params::new();
                params.insert("query_type".to_string(), json!("get_network_by_asn"));
                params.insert("asn".to_string(), json!(asn));
                Some(provider.fetch(&params).await)
            }
            _ => None,
        };
        (Some(censys_result), peering)
    };

    let (trace, geolocation, (censys, peering)) = tokio::join!(trace_call, geo_call, host_chain);

    DomainAnalysis {
        domain,
        title,
        position,
        ip: Some(ip),
        dns_resolved: true,
        trace,
        geolocation,
        censys,
        peering,
        error: None,
    }
}

fn discovered_asn(result: &ProviderResult) -> Option<u64> {
    result
        .data
        .as_ref()
        .filter(|_| result.success)?
        .get("autonomous_system")?
        .get("asn")?
        .as_u64()
}

use crate::config::Config;
use crate::error::{OrchestratorError, Result};
use crate::providers::{
    CensysProvider, CloudflareProvider, EndpointInfo, IpApiProvider, PeeringDbProvider, Provider,
    SerpStackProvider,
};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;

/// Mapping from provider name to provider instance.
///
/// Built once at startup from the fixed set of compiled-in providers and
/// treated as immutable afterwards; shared across requests behind an `Arc`.
/// Registering a name twice overwrites the previous instance (last one
/// wins) without disturbing its place in the listing order.
#[derive(Default)]
pub struct ProviderRegistry {
    providers: HashMap<String, Arc<dyn Provider>>,
    order: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ProviderInfo {
    pub name: String,
    pub version: String,
    pub endpoints: Vec<EndpointInfo>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, provider: Arc<dyn Provider>) {
        let name = provider.name().to_string();
        let version = provider.version().to_string();
        if self.providers.insert(name.clone(), provider).is_none() {
            self.order.push(name.clone());
        }
        tracing::info!(provider = %name, version = %version, "provider registered");
    }

    pub fn resolve(&self, name: &str) -> Result<Arc<dyn Provider>> {
        self.providers
            .get(name)
            .cloned()
            .ok_or_else(|| OrchestratorError::UnknownProvider(name.to_string()))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.providers.contains_key(name)
    }

    /// Providers in registration order, for introspection listings.
    pub fn list(&self) -> Vec<ProviderInfo> {
        self.order
            .iter()
            .filter_map(|name| self.providers.get(name))
            .map(|provider| ProviderInfo {
                name: provider.name().to_string(),
                version: provider.version().to_string(),
                endpoints: provider.endpoints(),
            })
            .collect()
    }

    pub fn names(&self) -> Vec<String> {
        self.order.clone()
    }

    pub fn len(&self) -> usize {
        self.providers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }
}

/// Builds the registry from configuration. Providers whose required API key
/// is absent are not registered at all, so a request naming them resolves
/// to `UnknownProvider` instead of failing deep inside a pipeline.
pub fn build_registry(config: &Config) -> ProviderRegistry {
    let mut registry = ProviderRegistry::new();

    match config.serpstack_api_key.clone() {
        Some(key) => registry.register(Arc::new(SerpStackProvider::new(
            Some(key),
            config.search_timeout,
        ))),
        None => tracing::warn!("SERPSTACK_API_KEY not set; serpstack provider disabled"),
    }

    registry.register(Arc::new(CloudflareProvider::new(config.trace_timeout)));
    registry.register(Arc::new(IpApiProvider::new(config.trace_timeout)));

    match config.censys_api_token.clone() {
        Some(token) => registry.register(Arc::new(CensysProvider::new(
            Some(token),
            config.host_search_timeout,
        ))),
        None => tracing::warn!("CENSYS_API_TOKEN not set; censys provider disabled"),
    }

    registry.register(Arc::new(PeeringDbProvider::new(config.peering_timeout)));

    registry
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::{Params, ProviderResult};
    use async_trait::async_trait;
    use serde_json::json;

    struct StubProvider {
        name: &'static str,
        version: &'static str,
    }

    #[async_trait]
    impl Provider for StubProvider {
        fn name(&self) -> &str {
            self.name
        }

        fn version(&self) -> &str {
            self.version
        }

        fn endpoints(&self) -> Vec<EndpointInfo> {
            vec![]
        }

        async fn fetch(&self, _params: &Params) -> ProviderResult {
            ProviderResult::ok(self.name, json!({}))
        }
    }

    fn stub(name: &'static str, version: &'static str) -> Arc<dyn Provider> {
        Arc::new(StubProvider { name, version })
    }

    #[test]
    fn resolve_unknown_name_fails() {
        let registry = ProviderRegistry::new();
        let err = registry.resolve("nope").unwrap_err();
        assert!(matches!(err, OrchestratorError::UnknownProvider(name) if name == "nope"));
    }

    #[test]
    fn listing_preserves_registration_order() {
        let mut registry = ProviderRegistry::new();
        registry.register(stub("beta", "1"));
        registry.register(stub("alpha", "1"));
        registry.register(stub("gamma", "1"));
        let names: Vec<String> = registry.list().into_iter().map(|p| p.name).collect();
        assert_eq!(names, vec!["beta", "alpha", "gamma"]);
    }

    #[test]
    fn duplicate_registration_overwrites_in_place() {
        let mut registry = ProviderRegistry::new();
        registry.register(stub("alpha", "1.0.0"));
        registry.register(stub("beta", "1.0.0"));
        registry.register(stub("alpha", "2.0.0"));

        assert_eq!(registry.len(), 2);
        let listing = registry.list();
        assert_eq!(listing[0].name, "alpha");
        assert_eq!(listing[0].version, "2.0.0");
        assert_eq!(listing[1].name, "beta");
    }

    #[test]
    fn registry_gated_on_api_keys() {
        let config = Config {
            serpstack_api_key: None,
            censys_api_token: None,
            ..Config::default()
        };
        let registry = build_registry(&config);
        assert!(!registry.contains("serpstack"));
        assert!(!registry.contains("censys"));
        assert!(registry.contains("cloudflare"));
        assert!(registry.contains("ipapi"));
        assert!(registry.contains("peeringdb"));

        let config = Config {
            serpstack_api_key: Some("key".into()),
            censys_api_token: Some("censys_token".into()),
            ..Config::default()
        };
        let registry = build_registry(&config);
        assert_eq!(registry.len(), 5);
        assert!(registry.contains("serpstack"));
        assert!(registry.contains("censys"));
    }
}

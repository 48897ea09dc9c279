use crate::providers::Params;
use crate::registry::ProviderRegistry;
use crate::Result;
use chrono::Utc;
use serde_json::{json, Value};

/// Direct single-provider query, outside the analysis pipeline.
///
/// An unknown provider name fails immediately with `UnknownProvider` and no
/// partial work; any failure inside the provider call itself comes back as
/// a failed `ProviderResult` embedded in the envelope.
pub async fn query_provider(
    registry: &ProviderRegistry,
    name: &str,
    params: &Params,
) -> Result<Value> {
    let provider = registry.resolve(name)?;
    tracing::info!(provider = %name, "direct provider query");
    let result = provider.fetch(params).await;

    Ok(json!({
        "status": "success",
        "timestamp": Utc::now(),
        "provider": name,
        "request_params": Value::Object(params.clone()),
        "data": result,
    }))
}

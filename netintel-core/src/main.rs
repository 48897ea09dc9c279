use anyhow::{bail, Context};
use chrono::Utc;
use clap::{Parser, Subcommand};
use netintel_core::observability::setup_logging;
use netintel_core::persistence::sanitize_label;
use netintel_core::providers::Params;
use netintel_core::{
    build_registry, query_provider, AnalyzeRequest, Config, CryptoManager, FileSink, Orchestrator,
};
use serde_json::{json, Value};
use std::sync::Arc;

#[derive(Parser)]
#[command(
    name = "netintel",
    about = "Multi-provider network intelligence with chunked RSA-OAEP output"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Search, resolve and fan out analysis over the top result domains
    Analyze {
        /// Free-text search query; omit together with --self-ip
        query: Option<String>,
        #[arg(long, default_value_t = 5)]
        num_results: u64,
        #[arg(long, default_value_t = 3)]
        analyze_top: usize,
        /// Skip the host-search provider and the dependent peering lookup
        #[arg(long)]
        no_censys: bool,
        #[arg(long)]
        location: Option<String>,
        #[arg(long)]
        lang: Option<String>,
        /// Analyze this machine's public IP instead of searching
        #[arg(long = "self")]
        self_ip: bool,
        /// Encrypt the report and print the envelope instead of the report
        #[arg(long)]
        encrypt: bool,
        /// With --encrypt, print the plain report alongside the envelope
        #[arg(long)]
        plain_out: bool,
    },
    /// Query a single provider directly
    Query {
        provider: String,
        /// Provider parameters as a JSON object
        #[arg(long, default_value = "{}")]
        params: String,
        #[arg(long)]
        encrypt: bool,
    },
    /// List registered providers
    Providers,
    /// Print the public encryption key as PEM
    PublicKey,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    setup_logging();

    let cli = Cli::parse();
    let config = Config::from_env();
    let registry = Arc::new(build_registry(&config));

    match cli.command {
        Command::Analyze {
            query,
            num_results,
            analyze_top,
            no_censys,
            location,
            lang,
            self_ip,
            encrypt,
            plain_out,
        } => {
            if query.is_none() && !self_ip {
                bail!("either a query or --self is required");
            }
            if query.is_some() && self_ip {
                bail!("--self cannot be combined with a query");
            }

            let request = AnalyzeRequest {
                query,
                num_results,
                analyze_top,
                include_censys: !no_censys,
                location,
                language: lang,
            };

            let orchestrator = Orchestrator::new(Arc::clone(&registry));
            match orchestrator.run(&request).await {
                Ok(report) => {
                    let label = format!("search_{}", sanitize_label(&report.query));
                    let plain = serde_json::to_value(&report)?;
                    emit(&config, &label, plain, encrypt, plain_out)?;
                }
                Err(err) => {
                    // The caller always gets well-formed JSON, even on a
                    // top-level pipeline failure.
                    println!(
                        "{}",
                        serde_json::to_string_pretty(&json!({
                            "status": "error",
                            "error": err.to_string(),
                        }))?
                    );
                    std::process::exit(1);
                }
            }
        }
        Command::Query {
            provider,
            params,
            encrypt,
        } => {
            let params: Params =
                serde_json::from_str(&params).context("--params must be a JSON object")?;
            let envelope = query_provider(&registry, &provider, &params).await?;
            let label = format!("query_{}", sanitize_label(&provider));
            emit(&config, &label, envelope, encrypt, false)?;
        }
        Command::Providers => {
            let listing = json!({
                "total_providers": registry.len(),
                "providers": registry.list(),
            });
            println!("{}", serde_json::to_string_pretty(&listing)?);
        }
        Command::PublicKey => {
            let crypto = CryptoManager::init(&config.keys_dir, config.force_new_keys)?;
            print!("{}", crypto.public_key_pem()?);
        }
    }

    Ok(())
}

/// Persists the document (best-effort) and prints either the plain report,
/// the encrypted envelope, or both with `--plain-out`.
fn emit(
    config: &Config,
    label: &str,
    plain: Value,
    encrypt: bool,
    plain_out: bool,
) -> anyhow::Result<()> {
    let artifact = if encrypt {
        let crypto = CryptoManager::init(&config.keys_dir, config.force_new_keys)?;
        Some(crypto.encrypt_value(&plain)?)
    } else {
        None
    };

    match FileSink::new(&config.output_dir)
        .and_then(|sink| sink.save(label, Utc::now(), &plain, artifact.as_ref()))
    {
        Ok(path) => tracing::debug!(path = %path.display(), "artifacts stored"),
        Err(err) => tracing::warn!(error = %err, "failed to persist report, continuing"),
    }

    let output = output_document(plain, artifact, plain_out)?;
    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}

/// What gets printed: the plain report when encryption was not requested,
/// the envelope alone with `--encrypt`, or `{plain, encrypted}` when the
/// caller also asked for `--plain-out`.
fn output_document(
    plain: Value,
    artifact: Option<netintel_core::EncryptedArtifact>,
    plain_out: bool,
) -> anyhow::Result<Value> {
    Ok(match artifact {
        Some(artifact) if plain_out => json!({
            "plain": plain,
            "encrypted": artifact,
        }),
        Some(artifact) => serde_json::to_value(&artifact)?,
        None => plain,
    })
}

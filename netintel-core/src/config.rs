use std::env;
use std::path::PathBuf;
use std::time::Duration;

const DEFAULT_OUTPUT_DIR: &str = "shared_data";

/// Process-level configuration, read once from the environment at startup.
///
/// Presence or absence of an API key decides whether the matching provider
/// is registered at all; see `registry::build_registry`.
#[derive(Debug, Clone)]
pub struct Config {
    pub serpstack_api_key: Option<String>,
    pub censys_api_token: Option<String>,
    /// Where reports and encrypted artifacts are written.
    pub output_dir: PathBuf,
    /// Where the RSA key pair is stored. Defaults to the output directory.
    pub keys_dir: PathBuf,
    /// Discard any stored key pair and generate a fresh one.
    pub force_new_keys: bool,
    pub trace_timeout: Duration,
    pub search_timeout: Duration,
    pub host_search_timeout: Duration,
    pub peering_timeout: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            serpstack_api_key: None,
            censys_api_token: None,
            output_dir: PathBuf::from(DEFAULT_OUTPUT_DIR),
            keys_dir: PathBuf::from(DEFAULT_OUTPUT_DIR),
            force_new_keys: false,
            trace_timeout: Duration::from_secs(10),
            search_timeout: Duration::from_secs(15),
            host_search_timeout: Duration::from_secs(30),
            peering_timeout: Duration::from_secs(15),
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        let defaults = Config::default();
        let output_dir = env_path("NETINTEL_OUTPUT_DIR").unwrap_or(defaults.output_dir);
        let keys_dir = env_path("NETINTEL_KEYS_DIR").unwrap_or_else(|| output_dir.clone());

        Self {
            serpstack_api_key: env_non_empty("SERPSTACK_API_KEY"),
            censys_api_token: env_non_empty("CENSYS_API_TOKEN"),
            output_dir,
            keys_dir,
            force_new_keys: env_flag("NETINTEL_FORCE_NEW_KEYS"),
            trace_timeout: env_secs("NETINTEL_TRACE_TIMEOUT_SECS", defaults.trace_timeout),
            search_timeout: env_secs("NETINTEL_SEARCH_TIMEOUT_SECS", defaults.search_timeout),
            host_search_timeout: env_secs(
                "NETINTEL_HOST_SEARCH_TIMEOUT_SECS",
                defaults.host_search_timeout,
            ),
            peering_timeout: env_secs("NETINTEL_PEERING_TIMEOUT_SECS", defaults.peering_timeout),
        }
    }
}

fn env_non_empty(name: &str) -> Option<String> {
    env::var(name).ok().filter(|v| !v.trim().is_empty())
}

fn env_path(name: &str) -> Option<PathBuf> {
    env_non_empty(name).map(PathBuf::from)
}

fn env_flag(name: &str) -> bool {
    matches!(
        env::var(name).ok().as_deref(),
        Some("1") | Some("true") | Some("yes")
    )
}

fn env_secs(name: &str, default: Duration) -> Duration {
    env_non_empty(name)
        .and_then(|v| v.parse::<u64>().ok())
        .map(Duration::from_secs)
        .unwrap_or(default)
}

use std::collections::HashSet;
use std::path::PathBuf;
use std::time::Duration;

/// Engine configuration. Built once at startup and consumed by
/// [`crate::Resolver::new`].
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Bundled baseline dictionary file, loaded first.
    pub baseline: Option<PathBuf>,
    /// Local override dictionaries, loaded after the baseline in order.
    pub overrides: Vec<PathBuf>,
    /// Remote dictionary site queried for the startup catalog and for
    /// one-shot record fetches on resolution misses.
    pub remote_site: Option<String>,
    /// Usage-log notification endpoint. Unset disables the logger.
    pub log_site: Option<String>,
    /// Expected distribution domain; records declaring a different
    /// `%Z`/`%DistribDomain` are discarded. Unset disables the gate.
    pub expected_domain: Option<String>,
    /// Numeric version the profile predicate compares against.
    pub version: f64,
    /// Enabled feature flags for profile predicate evaluation.
    pub flags: HashSet<String>,
    /// Whether remote fetches (catalog, miss fallback) are permitted.
    pub network: bool,
    /// Timeout for remote dictionary fetches.
    pub fetch_timeout: Duration,
    /// Timeout for each mirror probe request.
    pub probe_timeout: Duration,
    /// Usage-log queue capacity; events beyond it are dropped.
    pub log_queue: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            baseline: None,
            overrides: Vec::new(),
            remote_site: None,
            log_site: None,
            expected_domain: None,
            version: 1.0,
            flags: HashSet::new(),
            network: true,
            fetch_timeout: Duration::from_secs(60),
            probe_timeout: Duration::from_secs(1),
            log_queue: 64,
        }
    }
}

impl EngineConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        Ok(Self {
            baseline: std::env::var("SKYTAG_DICT").ok().map(PathBuf::from),
            overrides: env_csv("SKYTAG_DICT_OVERRIDES", &[])
                .into_iter()
                .map(PathBuf::from)
                .collect(),
            remote_site: std::env::var("SKYTAG_REMOTE_SITE").ok(),
            log_site: std::env::var("SKYTAG_LOG_SITE").ok(),
            expected_domain: std::env::var("SKYTAG_DOMAIN").ok(),
            version: env_parse("SKYTAG_VERSION", 1.0)?,
            flags: env_csv("SKYTAG_FLAGS", &[]).into_iter().collect(),
            network: env_parse("SKYTAG_NETWORK", true)?,
            fetch_timeout: Duration::from_secs(env_parse("SKYTAG_FETCH_TIMEOUT_SECS", 60)?),
            probe_timeout: Duration::from_millis(env_parse("SKYTAG_PROBE_TIMEOUT_MS", 1000)?),
            log_queue: env_parse("SKYTAG_LOG_QUEUE", 64)?,
        })
    }
}

pub(crate) fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> anyhow::Result<T>
where
    T::Err: std::fmt::Display,
{
    match std::env::var(key) {
        Ok(val) => val
            .parse::<T>()
            .map_err(|e| anyhow::anyhow!("Failed to parse env var {key}={val}: {e}")),
        Err(_) => Ok(default),
    }
}

pub(crate) fn env_csv(key: &str, default: &[&str]) -> Vec<String> {
    match std::env::var(key) {
        Ok(raw) => raw
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(ToString::to_string)
            .collect(),
        Err(_) => default.iter().map(|s| (*s).to_string()).collect(),
    }
}

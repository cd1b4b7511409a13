use skytag::EngineConfig;

#[derive(Debug, Clone)]
pub struct Config {
    /// Port the daemon listens on
    pub port: u16,
    /// Engine knobs, shared with library consumers
    pub engine: EngineConfig,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();
        Ok(Self {
            port: env_parse("SKYTAGD_PORT", 7280)?,
            engine: EngineConfig::from_env()?,
        })
    }
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> anyhow::Result<T>
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

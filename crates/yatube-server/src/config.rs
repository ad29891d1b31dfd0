use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, bail};

/// Placeholder JWT secrets that MUST NOT be used.
const PLACEHOLDER_SECRETS: &[&str] = &[
    "change-me-to-a-random-string",
    "dev-secret-change-me",
];

#[derive(Debug, Clone)]
pub struct Config {
    pub jwt_secret: String,
    pub db_path: PathBuf,
    pub addr: SocketAddr,
    pub media_dir: PathBuf,
    /// Lifetime of cached global-feed pages. Zero disables the cache.
    pub index_cache_ttl: Duration,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let jwt_secret = lookup("YATUBE_JWT_SECRET").unwrap_or_default();
        if jwt_secret.is_empty() || PLACEHOLDER_SECRETS.contains(&jwt_secret.as_str()) {
            bail!("YATUBE_JWT_SECRET is unset or still a placeholder; set it in your .env file and restart");
        }

        let host = lookup("YATUBE_HOST").unwrap_or_else(|| "0.0.0.0".into());
        let port: u16 = lookup("YATUBE_PORT")
            .unwrap_or_else(|| "8000".into())
            .parse()
            .context("YATUBE_PORT must be a port number")?;
        let addr: SocketAddr = format!("{}:{}", host, port)
            .parse()
            .with_context(|| format!("invalid listen address {}:{}", host, port))?;

        let db_path: PathBuf = lookup("YATUBE_DB_PATH").unwrap_or_else(|| "yatube.db".into()).into();
        let media_dir: PathBuf = lookup("YATUBE_MEDIA_DIR").unwrap_or_else(|| "./media".into()).into();
        let cache_secs: u64 = lookup("YATUBE_INDEX_CACHE_SECS")
            .unwrap_or_else(|| "20".into())
            .parse()
            .context("YATUBE_INDEX_CACHE_SECS must be a whole number of seconds")?;

        Ok(Self {
            jwt_secret,
            db_path,
            addr,
            media_dir,
            index_cache_ttl: Duration::from_secs(cache_secs),
        })
    }
}

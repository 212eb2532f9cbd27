use anyhow::{bail, Context, Result};
use std::env;
use std::net::SocketAddr;
use tracing::info;

use crate::cache::ReadPolicy;
use crate::tmdb::{IMAGE_BASE, TMDB_BASE};

const DEFAULT_DATABASE_URL: &str = "sqlite://videri.db?mode=rwc";
const DEFAULT_BIND_ADDR: &str = "0.0.0.0:3146";

#[derive(Debug, Clone)]
pub struct Settings {
    pub tmdb_api_key: String,
    pub tmdb_base_url: String,
    pub image_base_url: String,
    pub database_url: String,
    pub bind_addr: SocketAddr,
    pub read_policy: ReadPolicy,
}

impl Settings {
    pub fn from_env() -> Result<Self> {
        let tmdb_api_key = env::var("TMDB_API_KEY")
            .ok()
            .filter(|s| !s.trim().is_empty())
            .context("TMDB_API_KEY not set")?;
        let bind_addr = env_or("BIND_ADDR", DEFAULT_BIND_ADDR)
            .parse()
            .context("BIND_ADDR is not a valid socket address")?;
        let read_policy = match env_or("CACHE_POLICY", "fresh").to_ascii_lowercase().as_str() {
            "fresh" => ReadPolicy::FreshFirst,
            "cache" => ReadPolicy::CacheFirst,
            other => bail!("CACHE_POLICY must be 'fresh' or 'cache', got '{}'", other),
        };

        let settings = Self {
            tmdb_api_key,
            tmdb_base_url: env_or("TMDB_BASE_URL", TMDB_BASE),
            image_base_url: env_or("TMDB_IMAGE_BASE_URL", IMAGE_BASE),
            database_url: env_or("DATABASE_URL", DEFAULT_DATABASE_URL),
            bind_addr,
            read_policy,
        };
        info!(
            "Loaded settings (database={}, bind={}, policy={:?})",
            settings.database_url, settings.bind_addr, settings.read_policy
        );
        Ok(settings)
    }
}

fn env_or(key: &str, default: &str) -> String {
    env::var(key)
        .ok()
        .filter(|s| !s.trim().is_empty())
        .unwrap_or_else(|| default.to_string())
}

//! Resolve catalog content through the cache and print the mapped entities.
//! Usage:
//!   cargo run --bin catalog_props -- movie <tmdb_id>
//!   cargo run --bin catalog_props -- tv <tmdb_id>
//!   cargo run --bin catalog_props -- popular <movie|tv>
//!   cargo run --bin catalog_props -- search <movie|tv> <query>
//! Requires TMDB_API_KEY in the environment (.env supported). Nothing is
//! written to disk; entities are cached in memory for the run only.

use anyhow::{Context, Result};
use dotenvy::dotenv;
use std::env;
use std::sync::Arc;
use videri::cache::{ContentCache, ReadPolicy};
use videri::config::Settings;
use videri::mapper::{EntityMapper, ImageConfig};
use videri::models::{ContentKey, ContentKind};
use videri::store::MemoryStore;
use videri::tmdb::TmdbClient;

fn usage() -> ! {
    eprintln!("Usage: cargo run --bin catalog_props -- <movie|tv> <tmdb_id>");
    eprintln!("       cargo run --bin catalog_props -- popular <movie|tv>");
    eprintln!("       cargo run --bin catalog_props -- search <movie|tv> <query>");
    std::process::exit(1);
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv().ok();
    let args: Vec<String> = env::args().collect();
    if args.len() < 3 {
        usage();
    }

    let settings = Settings::from_env()?;
    let cache = ContentCache::new(
        Arc::new(TmdbClient::from_settings(&settings)?),
        Arc::new(MemoryStore::new()),
        EntityMapper::new(ImageConfig::new(settings.image_base_url.clone())),
        ReadPolicy::FreshFirst,
    );

    let output = match args[1].as_str() {
        "popular" => {
            let kind: ContentKind = args[2].parse()?;
            serde_json::to_value(cache.list_popular(kind, 1).await)?
        }
        "search" => {
            let kind: ContentKind = args[2].parse()?;
            let query = args.get(3..).map(|rest| rest.join(" ")).unwrap_or_default();
            if query.trim().is_empty() {
                usage();
            }
            serde_json::to_value(cache.search(kind, &query, 1).await)?
        }
        kind => {
            let kind: ContentKind = kind.parse()?;
            let id: u64 = args[2].parse().context("tmdb_id must be an integer")?;
            let entity = cache.resolve(&ContentKey::new(id.to_string(), kind)).await?;
            serde_json::to_value(entity)?
        }
    };

    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}

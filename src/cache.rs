use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::{Result, SyncError};
use crate::mapper::{EntityMapper, GenreTable};
use crate::models::{CatalogPage, ContentEntity, ContentKey, ContentKind};
use crate::store::ContentStore;
use crate::tmdb::{CatalogApi, CatalogResults, Feed};

const TRENDING_FALLBACK_LIMIT: usize = 10;
const SIMILAR_LIMIT: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReadPolicy {
    /// Always try the remote first; the store is only a fallback.
    #[default]
    FreshFirst,
    /// Serve a cached entity when present; fetch only on a miss.
    CacheFirst,
}

/// Cache-aside resolver over the remote catalog and the content store.
pub struct ContentCache {
    api: Arc<dyn CatalogApi>,
    store: Arc<dyn ContentStore>,
    mapper: EntityMapper,
    policy: ReadPolicy,
}

impl ContentCache {
    pub fn new(
        api: Arc<dyn CatalogApi>,
        store: Arc<dyn ContentStore>,
        mapper: EntityMapper,
        policy: ReadPolicy,
    ) -> Self {
        Self {
            api,
            store,
            mapper,
            policy,
        }
    }

    pub async fn resolve(&self, key: &ContentKey) -> Result<ContentEntity> {
        self.resolve_inner(key, None).await
    }

    /// Like [`ContentCache::resolve`], but gives up as soon as `cancel` fires.
    /// A cancelled resolve never writes through.
    pub async fn resolve_cancellable(
        &self,
        key: &ContentKey,
        cancel: &CancellationToken,
    ) -> Result<ContentEntity> {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                debug!(key = %key, "Resolve cancelled");
                Err(SyncError::Cancelled)
            }
            res = self.resolve_inner(key, Some(cancel)) => res,
        }
    }

    async fn resolve_inner(
        &self,
        key: &ContentKey,
        cancel: Option<&CancellationToken>,
    ) -> Result<ContentEntity> {
        let cached = match self.store.get_entity(key).await {
            Ok(hit) => hit,
            Err(e) => {
                warn!("Cache read failed for {}: {}", key, e);
                None
            }
        };

        if self.policy == ReadPolicy::CacheFirst {
            if let Some(entity) = cached {
                debug!(key = %key, "Serving cached entity");
                return Ok(entity);
            }
        }

        match self.fetch_entity(key).await {
            Ok(entity) => {
                if cancel.is_some_and(CancellationToken::is_cancelled) {
                    return Err(SyncError::Cancelled);
                }
                if let Err(e) = self.store.upsert_entities(std::slice::from_ref(&entity)).await {
                    warn!("Write-through failed for {}: {}", key, e);
                }
                Ok(entity)
            }
            Err(err) => match cached {
                Some(entity) => {
                    warn!("Remote fetch failed for {}, serving cached copy: {}", key, err);
                    Ok(entity)
                }
                None => {
                    warn!("Remote fetch failed for {} with nothing cached: {}", key, err);
                    Err(err)
                }
            },
        }
    }

    async fn fetch_entity(&self, key: &ContentKey) -> Result<ContentEntity> {
        match key.kind {
            ContentKind::Movie => {
                let (details, credits) =
                    tokio::join!(self.api.movie_details(&key.id), self.api.credits(key));
                let details = details?;
                let credits = credits
                    .map_err(|e| warn!("Credits unavailable for {}: {}", key, e))
                    .ok();
                Ok(ContentEntity::Movie(
                    self.mapper.map_movie_details(&details, credits.as_ref()),
                ))
            }
            ContentKind::TvShow => {
                let (details, credits) =
                    tokio::join!(self.api.tv_details(&key.id), self.api.credits(key));
                let details = details?;
                let credits = credits
                    .map_err(|e| warn!("Credits unavailable for {}: {}", key, e))
                    .ok();
                Ok(ContentEntity::TvShow(
                    self.mapper.map_tv_details(&details, credits.as_ref()),
                ))
            }
        }
    }

    /// Explicit eviction; there is no automatic expiry.
    pub async fn evict(&self, key: &ContentKey) -> Result<()> {
        self.store.delete_entity(key).await?;
        info!("Evicted {} from cache", key);
        Ok(())
    }

    pub async fn list_popular(&self, kind: ContentKind, page: u32) -> CatalogPage {
        let remote = self.api.feed(kind, Feed::Popular, page.max(1)).await;
        self.fresh_or_degraded(kind, "popular", remote, |cached| cached)
            .await
    }

    pub async fn list_trending(&self, kind: ContentKind) -> CatalogPage {
        let remote = self.api.feed(kind, Feed::Trending, 1).await;
        self.fresh_or_degraded(kind, "trending", remote, |mut cached| {
            cached.truncate(TRENDING_FALLBACK_LIMIT);
            cached
        })
        .await
    }

    pub async fn list_top_rated(&self, kind: ContentKind, page: u32) -> CatalogPage {
        let remote = self.api.feed(kind, Feed::TopRated, page.max(1)).await;
        self.fresh_or_degraded(kind, "top_rated", remote, |mut cached| {
            cached.sort_by(|a, b| b.rating().total_cmp(&a.rating()));
            cached
        })
        .await
    }

    pub async fn search(&self, kind: ContentKind, query: &str, page: u32) -> CatalogPage {
        let query = query.trim();
        if query.is_empty() {
            return CatalogPage::degraded(Vec::new());
        }
        let remote = self.api.search(kind, query, page.max(1)).await;
        let needle = query.to_lowercase();
        self.fresh_or_degraded(kind, "search", remote, move |cached| {
            cached
                .into_iter()
                .filter(|e| e.title().to_lowercase().contains(&needle))
                .collect()
        })
        .await
    }

    pub async fn by_genre(&self, kind: ContentKind, genre: &str, page: u32) -> CatalogPage {
        let table = genre_table(kind);
        let wanted = genre.trim().to_string();
        let filter = move |cached: Vec<ContentEntity>| -> Vec<ContentEntity> {
            cached
                .into_iter()
                .filter(|e| e.genres().iter().any(|g| g.eq_ignore_ascii_case(&wanted)))
                .collect()
        };
        let Some(genre_id) = table.id_for(genre) else {
            debug!("Unknown {} genre '{}', serving cached matches", kind, genre);
            return CatalogPage::degraded(filter(self.cached_of_kind(kind).await));
        };
        let remote = self.api.discover_by_genre(kind, genre_id, page.max(1)).await;
        self.fresh_or_degraded(kind, "genre", remote, filter).await
    }

    pub async fn similar(&self, key: &ContentKey) -> CatalogPage {
        let remote = self.api.similar(key).await.map(|mut results| {
            match &mut results {
                CatalogResults::Movies(p) => p.results.truncate(SIMILAR_LIMIT),
                CatalogResults::TvShows(p) => p.results.truncate(SIMILAR_LIMIT),
            }
            results
        });
        self.fresh_or_degraded(key.kind, "similar", remote, |_| Vec::new())
            .await
    }

    async fn fresh_or_degraded(
        &self,
        kind: ContentKind,
        label: &str,
        remote: Result<CatalogResults>,
        degrade: impl FnOnce(Vec<ContentEntity>) -> Vec<ContentEntity>,
    ) -> CatalogPage {
        match remote {
            Ok(results) => {
                let page = self.map_results(results);
                if let Err(e) = self.store.upsert_entities(&page.items).await {
                    warn!("Write-through of {} {} page failed: {}", kind, label, e);
                }
                page
            }
            Err(err) => {
                warn!("Remote {} {} listing failed, degrading to cache: {}", kind, label, err);
                CatalogPage::degraded(degrade(self.cached_of_kind(kind).await))
            }
        }
    }

    async fn cached_of_kind(&self, kind: ContentKind) -> Vec<ContentEntity> {
        self.store.list_entities(kind).await.unwrap_or_else(|e| {
            warn!("Cache enumeration for {} failed: {}", kind, e);
            Vec::new()
        })
    }

    fn map_results(&self, results: CatalogResults) -> CatalogPage {
        match results {
            CatalogResults::Movies(p) => CatalogPage {
                items: p
                    .results
                    .iter()
                    .map(|m| ContentEntity::Movie(self.mapper.map_movie(m, GenreTable::movie())))
                    .collect(),
                page: p.page,
                total_pages: p.total_pages,
                total_results: p.total_results,
                stale: false,
            },
            CatalogResults::TvShows(p) => CatalogPage {
                items: p
                    .results
                    .iter()
                    .map(|t| ContentEntity::TvShow(self.mapper.map_tv_show(t, GenreTable::tv())))
                    .collect(),
                page: p.page,
                total_pages: p.total_pages,
                total_results: p.total_results,
                stale: false,
            },
        }
    }
}

fn genre_table(kind: ContentKind) -> &'static GenreTable {
    match kind {
        ContentKind::Movie => GenreTable::movie(),
        ContentKind::TvShow => GenreTable::tv(),
    }
}

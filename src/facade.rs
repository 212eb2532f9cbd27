use std::sync::Arc;
use tokio_stream::{Stream, StreamExt};
use tracing::{info, warn};

use crate::cache::{ContentCache, ReadPolicy};
use crate::error::{Result, SyncError};
use crate::ledger::{LibraryLedger, LibrarySnapshot};
use crate::lists::CustomListStore;
use crate::mapper::EntityMapper;
use crate::models::{
    CatalogPage, ContentDetail, ContentEntity, ContentKey, ContentKind, CustomList, WatchedEntry,
    WatchedEpisode, WatchlistEntry,
};
use crate::store::PersistentStore;
use crate::tmdb::CatalogApi;

/// Single entry point for the presentation layer. Reads go through the
/// cache and are decorated with library state; writes only touch the
/// ledger and list store, never the network.
pub struct SyncFacade {
    cache: ContentCache,
    ledger: LibraryLedger,
    lists: CustomListStore,
}

impl SyncFacade {
    pub fn new(cache: ContentCache, ledger: LibraryLedger, lists: CustomListStore) -> Self {
        Self {
            cache,
            ledger,
            lists,
        }
    }

    /// Wires every component to one backing store.
    pub async fn with_store<S>(
        api: Arc<dyn CatalogApi>,
        store: Arc<S>,
        mapper: EntityMapper,
        policy: ReadPolicy,
    ) -> Result<Self>
    where
        S: PersistentStore + 'static,
    {
        let ledger = LibraryLedger::load(store.clone()).await?;
        let lists = CustomListStore::load(store.clone()).await?;
        let cache = ContentCache::new(api, store, mapper, policy);
        info!("Sync facade ready (policy={:?})", policy);
        Ok(Self::new(cache, ledger, lists))
    }

    pub async fn movie(&self, id: &str) -> Result<ContentDetail> {
        self.detail(&ContentKey::movie(id)).await
    }

    pub async fn tv_show(&self, id: &str) -> Result<ContentDetail> {
        self.detail(&ContentKey::tv(id)).await
    }

    pub async fn detail(&self, key: &ContentKey) -> Result<ContentDetail> {
        let entity = self.cache.resolve(key).await?;
        Ok(self.decorate(entity))
    }

    /// Resolves `key` once, then re-emits the decorated detail on every
    /// library change.
    pub async fn watch_detail(
        &self,
        key: &ContentKey,
    ) -> Result<impl Stream<Item = ContentDetail> + Send + 'static> {
        let entity = self.cache.resolve(key).await?;
        let key = key.clone();
        Ok(self.ledger.snapshots().map(move |snapshot| ContentDetail {
            entity: entity.clone(),
            library: snapshot.flags(&key),
        }))
    }

    fn decorate(&self, entity: ContentEntity) -> ContentDetail {
        let library = self.ledger.flags(&entity.key());
        ContentDetail { entity, library }
    }

    pub async fn popular(&self, kind: ContentKind, page: u32) -> CatalogPage {
        self.cache.list_popular(kind, page).await
    }

    pub async fn trending(&self, kind: ContentKind) -> CatalogPage {
        self.cache.list_trending(kind).await
    }

    pub async fn top_rated(&self, kind: ContentKind, page: u32) -> CatalogPage {
        self.cache.list_top_rated(kind, page).await
    }

    pub async fn search(&self, kind: ContentKind, query: &str, page: u32) -> CatalogPage {
        self.cache.search(kind, query, page).await
    }

    pub async fn by_genre(&self, kind: ContentKind, genre: &str, page: u32) -> CatalogPage {
        self.cache.by_genre(kind, genre, page).await
    }

    pub async fn similar(&self, key: &ContentKey) -> CatalogPage {
        self.cache.similar(key).await
    }

    /// Drops the cached copy of `key`; the next read goes to the network.
    pub async fn evict(&self, key: &ContentKey) -> Result<()> {
        self.cache.evict(key).await
    }

    /// Returns whether `key` is in the watchlist afterwards.
    pub async fn toggle_watchlist(&self, key: &ContentKey) -> Result<bool> {
        self.ledger.toggle_watchlist(key).await
    }

    /// Returns whether `key` is watched afterwards.
    pub async fn toggle_watched(&self, key: &ContentKey) -> Result<bool> {
        self.ledger.toggle_watched(key).await
    }

    pub async fn add_to_watchlist(&self, key: &ContentKey) -> Result<()> {
        self.ledger.add_to_watchlist(key).await
    }

    pub async fn remove_from_watchlist(&self, key: &ContentKey) -> Result<()> {
        self.ledger.remove_from_watchlist(key).await
    }

    pub async fn mark_watched(
        &self,
        key: &ContentKey,
        rating: Option<f32>,
        review: Option<String>,
    ) -> Result<()> {
        self.ledger.mark_watched(key, rating, review).await
    }

    pub async fn mark_unwatched(&self, key: &ContentKey) -> Result<()> {
        self.ledger.mark_unwatched(key).await
    }

    pub async fn rate(&self, key: &ContentKey, value: f32) -> Result<()> {
        self.ledger.rate(key, value).await
    }

    pub async fn review(&self, key: &ContentKey, text: String) -> Result<()> {
        self.ledger.review(key, text).await
    }

    pub async fn mark_episode_watched(
        &self,
        show: &ContentKey,
        season_number: i32,
        episode_number: i32,
        rating: Option<f32>,
    ) -> Result<WatchedEpisode> {
        self.ledger
            .mark_episode_watched(show, season_number, episode_number, rating)
            .await
    }

    pub async fn mark_episode_unwatched(
        &self,
        show: &ContentKey,
        season_number: i32,
        episode_number: i32,
    ) -> Result<()> {
        self.ledger
            .mark_episode_unwatched(show, season_number, episode_number)
            .await
    }

    pub fn watched_episodes(&self, show: &ContentKey) -> Vec<WatchedEpisode> {
        self.ledger.watched_episodes(show)
    }

    pub fn watchlist(&self) -> Vec<WatchlistEntry> {
        let mut entries: Vec<_> = self.ledger.snapshot().watchlist.values().cloned().collect();
        entries.sort_by(|a, b| b.added_at.cmp(&a.added_at));
        entries
    }

    pub fn watched(&self) -> Vec<WatchedEntry> {
        let mut entries: Vec<_> = self.ledger.snapshot().watched.values().cloned().collect();
        entries.sort_by(|a, b| b.watched_at.cmp(&a.watched_at));
        entries
    }

    pub async fn create_list(
        &self,
        name: &str,
        description: Option<String>,
        is_public: bool,
    ) -> Result<CustomList> {
        self.lists.create_list(name, description, is_public).await
    }

    pub async fn update_list(&self, list: &CustomList) -> Result<CustomList> {
        self.lists.update_list(list).await
    }

    pub async fn delete_list(&self, list_id: &str) -> Result<()> {
        self.lists.delete_list(list_id).await
    }

    pub async fn add_to_list(&self, list_id: &str, key: &ContentKey) -> Result<CustomList> {
        self.lists.add_member(list_id, key).await
    }

    pub async fn remove_from_list(&self, list_id: &str, key: &ContentKey) -> Result<CustomList> {
        self.lists.remove_member(list_id, key).await
    }

    pub async fn get_list(&self, list_id: &str) -> Result<CustomList> {
        self.lists
            .get_list(list_id)
            .await
            .ok_or_else(|| SyncError::ListNotFound(list_id.to_string()))
    }

    pub fn lists(&self) -> Vec<CustomList> {
        self.lists.list_all()
    }

    /// Resolves every member of a list. Members that cannot be resolved are
    /// skipped.
    pub async fn list_contents(&self, list_id: &str) -> Result<Vec<ContentDetail>> {
        let list = self.get_list(list_id).await?;
        let mut contents = Vec::with_capacity(list.members.len());
        for key in &list.members {
            match self.cache.resolve(key).await {
                Ok(entity) => contents.push(self.decorate(entity)),
                Err(e) => warn!("Skipping {} in list {}: {}", key, list_id, e),
            }
        }
        Ok(contents)
    }

    pub fn library_snapshot(&self) -> LibrarySnapshot {
        self.ledger.snapshot()
    }

    pub fn library_snapshots(&self) -> impl Stream<Item = LibrarySnapshot> + Send + 'static {
        self.ledger.snapshots()
    }

    pub fn watchlist_updates(&self) -> impl Stream<Item = Vec<WatchlistEntry>> + Send + 'static {
        self.ledger.watchlist_updates()
    }

    pub fn watched_updates(&self) -> impl Stream<Item = Vec<WatchedEntry>> + Send + 'static {
        self.ledger.watched_updates()
    }

    pub fn episode_updates(
        &self,
        show: &ContentKey,
    ) -> impl Stream<Item = Vec<WatchedEpisode>> + Send + 'static {
        self.ledger.episode_updates(show)
    }

    pub fn lists_updates(&self) -> impl Stream<Item = Arc<Vec<CustomList>>> + Send + 'static {
        self.lists.lists_updates()
    }
}

use async_trait::async_trait;

use crate::error::Result;
use crate::models::{
    ContentEntity, ContentKey, ContentKind, CustomList, RatingEntry, ReviewEntry, WatchedEntry,
    WatchedEpisode, WatchlistEntry,
};

mod memory;
mod sqlite;

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

/// Cached catalog entities, keyed by [`ContentKey`].
#[async_trait]
pub trait ContentStore: Send + Sync {
    async fn get_entity(&self, key: &ContentKey) -> Result<Option<ContentEntity>>;
    async fn upsert_entities(&self, entities: &[ContentEntity]) -> Result<()>;
    /// All cached entities of a kind, ordered by id.
    async fn list_entities(&self, kind: ContentKind) -> Result<Vec<ContentEntity>>;
    async fn delete_entity(&self, key: &ContentKey) -> Result<()>;
}

/// Everything the ledger needs to rebuild its in-memory state.
#[derive(Debug, Clone, Default)]
pub struct LibraryRecords {
    pub watchlist: Vec<WatchlistEntry>,
    pub watched: Vec<WatchedEntry>,
    pub ratings: Vec<RatingEntry>,
    pub reviews: Vec<ReviewEntry>,
    pub episodes: Vec<WatchedEpisode>,
}

#[async_trait]
pub trait LibraryStore: Send + Sync {
    async fn load_library(&self) -> Result<LibraryRecords>;
    async fn insert_watchlist(&self, entry: &WatchlistEntry) -> Result<()>;
    async fn delete_watchlist(&self, key: &ContentKey) -> Result<()>;
    /// Upserts the watched entry, removes any watchlist row for the same key
    /// and upserts the optional rating and review, all as one unit.
    async fn record_watched(
        &self,
        entry: &WatchedEntry,
        rating: Option<&RatingEntry>,
        review: Option<&ReviewEntry>,
    ) -> Result<()>;
    async fn delete_watched(&self, key: &ContentKey) -> Result<()>;
    async fn upsert_rating(&self, rating: &RatingEntry) -> Result<()>;
    async fn upsert_review(&self, review: &ReviewEntry) -> Result<()>;
    /// Upserts on (show, season, episode).
    async fn upsert_watched_episode(&self, episode: &WatchedEpisode) -> Result<()>;
    async fn delete_watched_episode(
        &self,
        show: &ContentKey,
        season_number: i32,
        episode_number: i32,
    ) -> Result<()>;
}

#[async_trait]
pub trait ListStore: Send + Sync {
    async fn load_lists(&self) -> Result<Vec<CustomList>>;
    /// Writes list metadata and replaces its membership rows.
    async fn save_list(&self, list: &CustomList) -> Result<()>;
    async fn delete_list(&self, list_id: &str) -> Result<()>;
}

/// Convenience bound for stores that back every component.
pub trait PersistentStore: ContentStore + LibraryStore + ListStore {}

impl<T: ContentStore + LibraryStore + ListStore> PersistentStore for T {}

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::Mutex;

use super::{ContentStore, LibraryRecords, LibraryStore, ListStore};
use crate::error::{Result, SyncError};
use crate::models::{
    ContentEntity, ContentKey, ContentKind, CustomList, RatingEntry, ReviewEntry, WatchedEntry,
    WatchedEpisode, WatchlistEntry,
};

#[derive(Debug, Default)]
struct Tables {
    content: BTreeMap<ContentKey, ContentEntity>,
    watchlist: BTreeMap<ContentKey, WatchlistEntry>,
    watched: BTreeMap<ContentKey, WatchedEntry>,
    ratings: BTreeMap<ContentKey, RatingEntry>,
    reviews: BTreeMap<ContentKey, ReviewEntry>,
    episodes: BTreeMap<(ContentKey, i32, i32), WatchedEpisode>,
    lists: BTreeMap<String, CustomList>,
}

/// Map-backed store with the same contract as [`super::SqliteStore`].
/// Nothing survives the process.
#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn with_tables<T>(&self, f: impl FnOnce(&mut Tables) -> T) -> Result<T> {
        let mut guard = self
            .tables
            .lock()
            .map_err(|_| SyncError::Persistence("memory store mutex poisoned".to_string()))?;
        Ok(f(&mut guard))
    }
}

#[async_trait]
impl ContentStore for MemoryStore {
    async fn get_entity(&self, key: &ContentKey) -> Result<Option<ContentEntity>> {
        self.with_tables(|t| t.content.get(key).cloned())
    }

    async fn upsert_entities(&self, entities: &[ContentEntity]) -> Result<()> {
        self.with_tables(|t| {
            for entity in entities {
                t.content.insert(entity.key(), entity.clone());
            }
        })
    }

    async fn list_entities(&self, kind: ContentKind) -> Result<Vec<ContentEntity>> {
        self.with_tables(|t| {
            t.content
                .iter()
                .filter(|(k, _)| k.kind == kind)
                .map(|(_, e)| e.clone())
                .collect()
        })
    }

    async fn delete_entity(&self, key: &ContentKey) -> Result<()> {
        self.with_tables(|t| {
            t.content.remove(key);
        })
    }
}

#[async_trait]
impl LibraryStore for MemoryStore {
    async fn load_library(&self) -> Result<LibraryRecords> {
        self.with_tables(|t| LibraryRecords {
            watchlist: t.watchlist.values().cloned().collect(),
            watched: t.watched.values().cloned().collect(),
            ratings: t.ratings.values().cloned().collect(),
            reviews: t.reviews.values().cloned().collect(),
            episodes: t.episodes.values().cloned().collect(),
        })
    }

    async fn insert_watchlist(&self, entry: &WatchlistEntry) -> Result<()> {
        self.with_tables(|t| {
            t.watchlist
                .entry(entry.key.clone())
                .or_insert_with(|| entry.clone());
        })
    }

    async fn delete_watchlist(&self, key: &ContentKey) -> Result<()> {
        self.with_tables(|t| {
            t.watchlist.remove(key);
        })
    }

    async fn record_watched(
        &self,
        entry: &WatchedEntry,
        rating: Option<&RatingEntry>,
        review: Option<&ReviewEntry>,
    ) -> Result<()> {
        self.with_tables(|t| {
            t.watched.insert(entry.key.clone(), entry.clone());
            t.watchlist.remove(&entry.key);
            if let Some(rating) = rating {
                t.ratings.insert(rating.key.clone(), rating.clone());
            }
            if let Some(review) = review {
                t.reviews.insert(review.key.clone(), review.clone());
            }
        })
    }

    async fn delete_watched(&self, key: &ContentKey) -> Result<()> {
        self.with_tables(|t| {
            t.watched.remove(key);
        })
    }

    async fn upsert_rating(&self, rating: &RatingEntry) -> Result<()> {
        self.with_tables(|t| {
            t.ratings.insert(rating.key.clone(), rating.clone());
        })
    }

    async fn upsert_review(&self, review: &ReviewEntry) -> Result<()> {
        self.with_tables(|t| {
            t.reviews.insert(review.key.clone(), review.clone());
        })
    }

    async fn upsert_watched_episode(&self, episode: &WatchedEpisode) -> Result<()> {
        let key = (
            episode.show.clone(),
            episode.season_number,
            episode.episode_number,
        );
        self.with_tables(|t| {
            t.episodes.insert(key, episode.clone());
        })
    }

    async fn delete_watched_episode(
        &self,
        show: &ContentKey,
        season_number: i32,
        episode_number: i32,
    ) -> Result<()> {
        self.with_tables(|t| {
            t.episodes.remove(&(show.clone(), season_number, episode_number));
        })
    }
}

#[async_trait]
impl ListStore for MemoryStore {
    async fn load_lists(&self) -> Result<Vec<CustomList>> {
        self.with_tables(|t| t.lists.values().cloned().collect())
    }

    async fn save_list(&self, list: &CustomList) -> Result<()> {
        self.with_tables(|t| {
            t.lists.insert(list.id.clone(), list.clone());
        })
    }

    async fn delete_list(&self, list_id: &str) -> Result<()> {
        self.with_tables(|t| {
            t.lists.remove(list_id);
        })
    }
}

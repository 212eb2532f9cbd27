use chrono::Utc;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::{watch, Mutex, MutexGuard};
use tokio_stream::wrappers::WatchStream;
use tokio_stream::{Stream, StreamExt};
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::{Result, SyncError};
use crate::models::{
    ContentKey, ContentKind, LibraryFlags, RatingEntry, ReviewEntry, WatchedEntry, WatchedEpisode,
    WatchlistEntry,
};
use crate::store::LibraryStore;

type Collection<T> = BTreeMap<ContentKey, T>;

/// Watched episodes of one show, keyed by (season, episode).
pub type ShowEpisodes = BTreeMap<(i32, i32), WatchedEpisode>;

/// Immutable view of the whole library, published after every mutation.
#[derive(Debug, Clone, Default)]
pub struct LibrarySnapshot {
    pub version: u64,
    pub watchlist: Arc<Collection<WatchlistEntry>>,
    pub watched: Arc<Collection<WatchedEntry>>,
    pub episodes: Arc<Collection<ShowEpisodes>>,
    pub ratings: Arc<Collection<RatingEntry>>,
    pub reviews: Arc<Collection<ReviewEntry>>,
}

impl LibrarySnapshot {
    pub fn flags(&self, key: &ContentKey) -> LibraryFlags {
        let watched = self.watched.get(key);
        LibraryFlags {
            is_watched: watched.is_some(),
            is_in_watchlist: self.watchlist.contains_key(key),
            user_rating: self.ratings.get(key).map(|r| r.value),
            user_review: self.reviews.get(key).map(|r| r.text.clone()),
            watched_at: watched.map(|w| w.watched_at),
        }
    }

    /// Season then episode order.
    pub fn watched_episodes(&self, show: &ContentKey) -> Vec<WatchedEpisode> {
        self.episodes
            .get(show)
            .map(|episodes| episodes.values().cloned().collect())
            .unwrap_or_default()
    }
}

/// Locks held while a key moves into the watched collection.
struct WatchGuards<'a> {
    watchlist: MutexGuard<'a, Collection<WatchlistEntry>>,
    watched: MutexGuard<'a, Collection<WatchedEntry>>,
    ratings: MutexGuard<'a, Collection<RatingEntry>>,
    reviews: MutexGuard<'a, Collection<ReviewEntry>>,
}

/// Watchlist, watched history, watched episodes, ratings and reviews.
///
/// Each collection has its own lock. Paths that take more than one lock
/// acquire them in the order watchlist, watched, episodes, ratings, reviews.
/// A key that is watched is never added to the watchlist.
pub struct LibraryLedger {
    store: Arc<dyn LibraryStore>,
    watchlist: Mutex<Collection<WatchlistEntry>>,
    watched: Mutex<Collection<WatchedEntry>>,
    episodes: Mutex<Collection<ShowEpisodes>>,
    ratings: Mutex<Collection<RatingEntry>>,
    reviews: Mutex<Collection<ReviewEntry>>,
    snapshots: watch::Sender<LibrarySnapshot>,
}

impl LibraryLedger {
    /// Hydrates the ledger from `store`.
    pub async fn load(store: Arc<dyn LibraryStore>) -> Result<Self> {
        let records = store.load_library().await?;
        let watchlist: Collection<_> = records
            .watchlist
            .into_iter()
            .map(|e| (e.key.clone(), e))
            .collect();
        let watched: Collection<_> = records
            .watched
            .into_iter()
            .map(|e| (e.key.clone(), e))
            .collect();
        let mut episodes: Collection<ShowEpisodes> = BTreeMap::new();
        for episode in records.episodes {
            episodes
                .entry(episode.show.clone())
                .or_default()
                .insert((episode.season_number, episode.episode_number), episode);
        }
        let ratings: Collection<_> = records
            .ratings
            .into_iter()
            .map(|e| (e.key.clone(), e))
            .collect();
        let reviews: Collection<_> = records
            .reviews
            .into_iter()
            .map(|e| (e.key.clone(), e))
            .collect();
        info!(
            "Loaded library: {} watchlisted, {} watched, {} shows with episodes, {} ratings, {} reviews",
            watchlist.len(),
            watched.len(),
            episodes.len(),
            ratings.len(),
            reviews.len()
        );

        let (snapshots, _) = watch::channel(LibrarySnapshot {
            version: 0,
            watchlist: Arc::new(watchlist.clone()),
            watched: Arc::new(watched.clone()),
            episodes: Arc::new(episodes.clone()),
            ratings: Arc::new(ratings.clone()),
            reviews: Arc::new(reviews.clone()),
        });
        Ok(Self {
            store,
            watchlist: Mutex::new(watchlist),
            watched: Mutex::new(watched),
            episodes: Mutex::new(episodes),
            ratings: Mutex::new(ratings),
            reviews: Mutex::new(reviews),
            snapshots,
        })
    }

    /// Idempotent. Adding a key that is already watched is a no-op.
    pub async fn add_to_watchlist(&self, key: &ContentKey) -> Result<()> {
        let mut watchlist = self.watchlist.lock().await;
        let watched = self.watched.lock().await;
        self.insert_into_watchlist(&mut watchlist, &watched, key)
            .await
            .map(|_| ())
    }

    pub async fn remove_from_watchlist(&self, key: &ContentKey) -> Result<()> {
        let mut watchlist = self.watchlist.lock().await;
        self.drop_from_watchlist(&mut watchlist, key).await
    }

    /// Flips watchlist membership and returns whether `key` is in the
    /// watchlist afterwards. The decision is made under the watchlist lock,
    /// so concurrent toggles alternate.
    pub async fn toggle_watchlist(&self, key: &ContentKey) -> Result<bool> {
        let mut watchlist = self.watchlist.lock().await;
        let watched = self.watched.lock().await;
        if watchlist.contains_key(key) {
            self.drop_from_watchlist(&mut watchlist, key).await?;
            Ok(false)
        } else {
            self.insert_into_watchlist(&mut watchlist, &watched, key).await
        }
    }

    /// Returns whether `key` is in the watchlist afterwards.
    async fn insert_into_watchlist(
        &self,
        watchlist: &mut Collection<WatchlistEntry>,
        watched: &Collection<WatchedEntry>,
        key: &ContentKey,
    ) -> Result<bool> {
        if watched.contains_key(key) {
            debug!("{} already watched, not adding to watchlist", key);
            return Ok(false);
        }
        if watchlist.contains_key(key) {
            debug!("{} already in watchlist", key);
            return Ok(true);
        }
        let entry = WatchlistEntry {
            entry_id: Uuid::new_v4().to_string(),
            key: key.clone(),
            added_at: Utc::now(),
        };
        self.store.insert_watchlist(&entry).await?;
        watchlist.insert(key.clone(), entry);
        self.publish(|s| s.watchlist = Arc::new(watchlist.clone()));
        info!("Added {} to watchlist", key);
        Ok(true)
    }

    async fn drop_from_watchlist(
        &self,
        watchlist: &mut Collection<WatchlistEntry>,
        key: &ContentKey,
    ) -> Result<()> {
        if !watchlist.contains_key(key) {
            return Ok(());
        }
        self.store.delete_watchlist(key).await?;
        watchlist.remove(key);
        self.publish(|s| s.watchlist = Arc::new(watchlist.clone()));
        info!("Removed {} from watchlist", key);
        Ok(())
    }

    /// Records `key` as watched and drops it from the watchlist as one step.
    /// Re-marking keeps the original watched entry but still applies the
    /// given rating and review.
    pub async fn mark_watched(
        &self,
        key: &ContentKey,
        rating: Option<f32>,
        review: Option<String>,
    ) -> Result<()> {
        if let Some(value) = rating {
            validate_rating(value)?;
        }
        let mut guards = self.lock_for_watch().await;
        self.record_watched(&mut guards, key, rating, review).await
    }

    /// Forgets the watched entry only; ratings and reviews stay.
    pub async fn mark_unwatched(&self, key: &ContentKey) -> Result<()> {
        let mut watched = self.watched.lock().await;
        self.forget_watched(&mut watched, key).await
    }

    /// Flips the watched state and returns whether `key` is watched
    /// afterwards. Marking through a toggle carries no rating or review.
    pub async fn toggle_watched(&self, key: &ContentKey) -> Result<bool> {
        let mut guards = self.lock_for_watch().await;
        if guards.watched.contains_key(key) {
            self.forget_watched(&mut guards.watched, key).await?;
            Ok(false)
        } else {
            self.record_watched(&mut guards, key, None, None).await?;
            Ok(true)
        }
    }

    async fn lock_for_watch(&self) -> WatchGuards<'_> {
        let watchlist = self.watchlist.lock().await;
        let watched = self.watched.lock().await;
        let ratings = self.ratings.lock().await;
        let reviews = self.reviews.lock().await;
        WatchGuards {
            watchlist,
            watched,
            ratings,
            reviews,
        }
    }

    async fn record_watched(
        &self,
        guards: &mut WatchGuards<'_>,
        key: &ContentKey,
        rating: Option<f32>,
        review: Option<String>,
    ) -> Result<()> {
        let now = Utc::now();
        let entry = guards
            .watched
            .get(key)
            .cloned()
            .unwrap_or_else(|| WatchedEntry {
                entry_id: Uuid::new_v4().to_string(),
                key: key.clone(),
                watched_at: now,
                user_rating: rating,
                user_review: review.clone(),
            });
        let rating_entry = rating.map(|value| RatingEntry {
            key: key.clone(),
            value,
            created_at: guards.ratings.get(key).map_or(now, |r| r.created_at),
            updated_at: now,
        });
        let review_entry = review.map(|text| ReviewEntry {
            key: key.clone(),
            text,
            created_at: guards.reviews.get(key).map_or(now, |r| r.created_at),
            updated_at: now,
        });

        self.store
            .record_watched(&entry, rating_entry.as_ref(), review_entry.as_ref())
            .await?;

        guards.watchlist.remove(key);
        guards.watched.insert(key.clone(), entry);
        if let Some(r) = rating_entry {
            guards.ratings.insert(key.clone(), r);
        }
        if let Some(r) = review_entry {
            guards.reviews.insert(key.clone(), r);
        }
        self.publish(|s| {
            s.watchlist = Arc::new(guards.watchlist.clone());
            s.watched = Arc::new(guards.watched.clone());
            s.ratings = Arc::new(guards.ratings.clone());
            s.reviews = Arc::new(guards.reviews.clone());
        });
        info!("Marked {} as watched", key);
        Ok(())
    }

    async fn forget_watched(
        &self,
        watched: &mut Collection<WatchedEntry>,
        key: &ContentKey,
    ) -> Result<()> {
        if !watched.contains_key(key) {
            return Ok(());
        }
        self.store.delete_watched(key).await?;
        watched.remove(key);
        self.publish(|s| s.watched = Arc::new(watched.clone()));
        info!("Marked {} as unwatched", key);
        Ok(())
    }

    /// Marks one episode of `show` as watched. Re-marking refreshes the
    /// timestamp and replaces the episode rating. The show-level watched
    /// entry is not touched.
    pub async fn mark_episode_watched(
        &self,
        show: &ContentKey,
        season_number: i32,
        episode_number: i32,
        rating: Option<f32>,
    ) -> Result<WatchedEpisode> {
        validate_episode(show, season_number, episode_number)?;
        if let Some(value) = rating {
            validate_rating(value)?;
        }

        let mut episodes = self.episodes.lock().await;
        let entry = WatchedEpisode {
            show: show.clone(),
            season_number,
            episode_number,
            watched_at: Utc::now(),
            user_rating: rating,
        };
        self.store.upsert_watched_episode(&entry).await?;
        episodes
            .entry(show.clone())
            .or_default()
            .insert((season_number, episode_number), entry.clone());
        self.publish(|s| s.episodes = Arc::new(episodes.clone()));
        info!("Marked {} {} as watched", show, entry.episode_id());
        Ok(entry)
    }

    /// No-op if the episode is not tracked.
    pub async fn mark_episode_unwatched(
        &self,
        show: &ContentKey,
        season_number: i32,
        episode_number: i32,
    ) -> Result<()> {
        validate_episode(show, season_number, episode_number)?;
        let number = (season_number, episode_number);

        let mut episodes = self.episodes.lock().await;
        if !episodes.get(show).is_some_and(|e| e.contains_key(&number)) {
            return Ok(());
        }
        self.store
            .delete_watched_episode(show, season_number, episode_number)
            .await?;
        if let Some(show_episodes) = episodes.get_mut(show) {
            show_episodes.remove(&number);
            if show_episodes.is_empty() {
                episodes.remove(show);
            }
        }
        self.publish(|s| s.episodes = Arc::new(episodes.clone()));
        info!(
            "Marked {} s{}e{} as unwatched",
            show, season_number, episode_number
        );
        Ok(())
    }

    pub async fn rate(&self, key: &ContentKey, value: f32) -> Result<()> {
        validate_rating(value)?;
        let mut ratings = self.ratings.lock().await;
        let now = Utc::now();
        let entry = RatingEntry {
            key: key.clone(),
            value,
            created_at: ratings.get(key).map_or(now, |r| r.created_at),
            updated_at: now,
        };
        self.store.upsert_rating(&entry).await?;
        ratings.insert(key.clone(), entry);
        self.publish(|s| s.ratings = Arc::new(ratings.clone()));
        debug!("Rated {} {}", key, value);
        Ok(())
    }

    pub async fn review(&self, key: &ContentKey, text: String) -> Result<()> {
        let mut reviews = self.reviews.lock().await;
        let now = Utc::now();
        let entry = ReviewEntry {
            key: key.clone(),
            text,
            created_at: reviews.get(key).map_or(now, |r| r.created_at),
            updated_at: now,
        };
        self.store.upsert_review(&entry).await?;
        reviews.insert(key.clone(), entry);
        self.publish(|s| s.reviews = Arc::new(reviews.clone()));
        debug!("Reviewed {}", key);
        Ok(())
    }

    fn publish(&self, apply: impl FnOnce(&mut LibrarySnapshot)) {
        self.snapshots.send_modify(|snapshot| {
            apply(snapshot);
            snapshot.version += 1;
        });
    }

    pub fn snapshot(&self) -> LibrarySnapshot {
        self.snapshots.borrow().clone()
    }

    pub fn is_watched(&self, key: &ContentKey) -> bool {
        self.snapshots.borrow().watched.contains_key(key)
    }

    pub fn is_in_watchlist(&self, key: &ContentKey) -> bool {
        self.snapshots.borrow().watchlist.contains_key(key)
    }

    pub fn current_rating(&self, key: &ContentKey) -> Option<f32> {
        self.snapshots.borrow().ratings.get(key).map(|r| r.value)
    }

    pub fn current_review(&self, key: &ContentKey) -> Option<String> {
        self.snapshots.borrow().reviews.get(key).map(|r| r.text.clone())
    }

    pub fn watched_entry(&self, key: &ContentKey) -> Option<WatchedEntry> {
        self.snapshots.borrow().watched.get(key).cloned()
    }

    pub fn watched_episodes(&self, show: &ContentKey) -> Vec<WatchedEpisode> {
        self.snapshots.borrow().watched_episodes(show)
    }

    pub fn flags(&self, key: &ContentKey) -> LibraryFlags {
        self.snapshots.borrow().flags(key)
    }

    pub fn subscribe(&self) -> watch::Receiver<LibrarySnapshot> {
        self.snapshots.subscribe()
    }

    /// Every published snapshot, starting with the current one.
    pub fn snapshots(&self) -> impl Stream<Item = LibrarySnapshot> + Send + 'static {
        WatchStream::new(self.snapshots.subscribe())
    }

    /// Watchlist entries, newest first.
    pub fn watchlist_updates(&self) -> impl Stream<Item = Vec<WatchlistEntry>> + Send + 'static {
        project(self.snapshots(), |s| s.watchlist.clone(), |mut entries| {
            entries.sort_by(|a, b| b.added_at.cmp(&a.added_at));
            entries
        })
    }

    /// Watched entries, most recently watched first.
    pub fn watched_updates(&self) -> impl Stream<Item = Vec<WatchedEntry>> + Send + 'static {
        project(self.snapshots(), |s| s.watched.clone(), |mut entries| {
            entries.sort_by(|a, b| b.watched_at.cmp(&a.watched_at));
            entries
        })
    }

    /// Watched episodes of `show`, emitted again only when that show's
    /// episodes change.
    pub fn episode_updates(
        &self,
        show: &ContentKey,
    ) -> impl Stream<Item = Vec<WatchedEpisode>> + Send + 'static {
        let show = show.clone();
        let mut last: Option<Vec<WatchedEpisode>> = None;
        self.snapshots().filter_map(move |snapshot| {
            let current = snapshot.watched_episodes(&show);
            if last.as_ref() == Some(&current) {
                return None;
            }
            last = Some(current.clone());
            Some(current)
        })
    }

    pub fn rating_updates(&self) -> impl Stream<Item = Vec<RatingEntry>> + Send + 'static {
        project(self.snapshots(), |s| s.ratings.clone(), |mut entries| {
            entries.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
            entries
        })
    }

    pub fn review_updates(&self) -> impl Stream<Item = Vec<ReviewEntry>> + Send + 'static {
        project(self.snapshots(), |s| s.reviews.clone(), |mut entries| {
            entries.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
            entries
        })
    }
}

fn validate_rating(value: f32) -> Result<()> {
    if value.is_finite() && (0.0..=10.0).contains(&value) {
        Ok(())
    } else {
        Err(SyncError::InvalidRating(value))
    }
}

/// Season 0 holds specials; episodes start at 1.
fn validate_episode(show: &ContentKey, season_number: i32, episode_number: i32) -> Result<()> {
    if show.kind != ContentKind::TvShow {
        return Err(SyncError::InvalidEpisode(format!("{show} is not a tv show")));
    }
    if season_number < 0 || episode_number < 1 {
        return Err(SyncError::InvalidEpisode(format!(
            "{show} has no s{season_number}e{episode_number}"
        )));
    }
    Ok(())
}

/// Projects one collection out of the snapshot stream, skipping snapshots
/// where that collection was not replaced.
fn project<T, S>(
    snapshots: S,
    pick: fn(&LibrarySnapshot) -> Arc<Collection<T>>,
    order: fn(Vec<T>) -> Vec<T>,
) -> impl Stream<Item = Vec<T>> + Send + 'static
where
    T: Clone + Send + Sync + 'static,
    S: Stream<Item = LibrarySnapshot> + Send + 'static,
{
    let mut last: Option<Arc<Collection<T>>> = None;
    snapshots.filter_map(move |snapshot| {
        let current = pick(&snapshot);
        if last.as_ref().is_some_and(|prev| Arc::ptr_eq(prev, &current)) {
            return None;
        }
        last = Some(current.clone());
        Some(order(current.values().cloned().collect()))
    })
}

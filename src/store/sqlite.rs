use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions, SqliteRow};
use sqlx::Row;
use std::collections::HashMap;
use tracing::{debug, info};

use super::{ContentStore, LibraryRecords, LibraryStore, ListStore};
use crate::error::{Result, SyncError};
use crate::models::{
    ContentEntity, ContentKey, ContentKind, CustomList, RatingEntry, ReviewEntry, WatchedEntry,
    WatchedEpisode, WatchlistEntry,
};

const SCHEMA: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS content (
        content_id TEXT NOT NULL,
        content_type TEXT NOT NULL,
        payload TEXT NOT NULL,
        updated_at TEXT NOT NULL,
        PRIMARY KEY (content_id, content_type)
    )",
    "CREATE TABLE IF NOT EXISTS watchlist (
        entry_id TEXT NOT NULL,
        content_id TEXT NOT NULL,
        content_type TEXT NOT NULL,
        added_at TEXT NOT NULL,
        PRIMARY KEY (content_id, content_type)
    )",
    "CREATE TABLE IF NOT EXISTS watched (
        entry_id TEXT NOT NULL,
        content_id TEXT NOT NULL,
        content_type TEXT NOT NULL,
        watched_at TEXT NOT NULL,
        user_rating REAL,
        user_review TEXT,
        PRIMARY KEY (content_id, content_type)
    )",
    "CREATE TABLE IF NOT EXISTS ratings (
        content_id TEXT NOT NULL,
        content_type TEXT NOT NULL,
        rating REAL NOT NULL,
        created_at TEXT NOT NULL,
        updated_at TEXT NOT NULL,
        PRIMARY KEY (content_id, content_type)
    )",
    "CREATE TABLE IF NOT EXISTS reviews (
        content_id TEXT NOT NULL,
        content_type TEXT NOT NULL,
        review TEXT NOT NULL,
        created_at TEXT NOT NULL,
        updated_at TEXT NOT NULL,
        PRIMARY KEY (content_id, content_type)
    )",
    "CREATE TABLE IF NOT EXISTS watched_episodes (
        content_id TEXT NOT NULL,
        content_type TEXT NOT NULL,
        season_number INTEGER NOT NULL,
        episode_number INTEGER NOT NULL,
        watched_at TEXT NOT NULL,
        user_rating REAL,
        PRIMARY KEY (content_id, content_type, season_number, episode_number)
    )",
    "CREATE TABLE IF NOT EXISTS custom_lists (
        id TEXT PRIMARY KEY,
        name TEXT NOT NULL,
        description TEXT,
        is_public INTEGER NOT NULL,
        created_at TEXT NOT NULL,
        updated_at TEXT NOT NULL
    )",
    "CREATE TABLE IF NOT EXISTS custom_list_members (
        list_id TEXT NOT NULL,
        content_id TEXT NOT NULL,
        content_type TEXT NOT NULL,
        position INTEGER NOT NULL,
        PRIMARY KEY (list_id, content_id, content_type)
    )",
];

/// SQLite-backed store. Library and list rows are the durable copy of what
/// the ledger and list store hold in memory.
#[derive(Debug, Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    pub async fn connect(database_url: &str) -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(4)
            .connect(database_url)
            .await?;
        let store = Self { pool };
        store.initialize_schema().await?;
        info!("Connected to store at {}", database_url);
        Ok(store)
    }

    /// Private in-memory database. A single connection keeps every query on
    /// the same database.
    pub async fn in_memory() -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await?;
        let store = Self { pool };
        store.initialize_schema().await?;
        Ok(store)
    }

    async fn initialize_schema(&self) -> Result<()> {
        for statement in SCHEMA {
            sqlx::query(*statement).execute(&self.pool).await?;
        }
        debug!("Store schema ready");
        Ok(())
    }
}

fn key_from_row(row: &SqliteRow) -> Result<ContentKey> {
    let id: String = row.try_get("content_id")?;
    let kind: String = row.try_get("content_type")?;
    Ok(ContentKey::new(id, kind.parse::<ContentKind>()?))
}

fn decode_entity(row: &SqliteRow) -> Result<ContentEntity> {
    let payload: String = row.try_get("payload")?;
    serde_json::from_str(&payload)
        .map_err(|e| SyncError::Persistence(format!("corrupt cached entity: {e}")))
}

#[async_trait]
impl ContentStore for SqliteStore {
    async fn get_entity(&self, key: &ContentKey) -> Result<Option<ContentEntity>> {
        let row = sqlx::query(
            "SELECT payload FROM content WHERE content_id = ?1 AND content_type = ?2",
        )
        .bind(&key.id)
        .bind(key.kind.as_str())
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(decode_entity).transpose()
    }

    async fn upsert_entities(&self, entities: &[ContentEntity]) -> Result<()> {
        let now = Utc::now();
        let mut tx = self.pool.begin().await?;
        for entity in entities {
            let payload = serde_json::to_string(entity)
                .map_err(|e| SyncError::Persistence(format!("encoding entity: {e}")))?;
            sqlx::query(
                "INSERT INTO content (content_id, content_type, payload, updated_at)
                 VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT (content_id, content_type)
                 DO UPDATE SET payload = excluded.payload, updated_at = excluded.updated_at",
            )
            .bind(entity.id())
            .bind(entity.kind().as_str())
            .bind(payload)
            .bind(now)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    async fn list_entities(&self, kind: ContentKind) -> Result<Vec<ContentEntity>> {
        let rows = sqlx::query(
            "SELECT payload FROM content WHERE content_type = ?1 ORDER BY content_id ASC",
        )
        .bind(kind.as_str())
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(decode_entity).collect()
    }

    async fn delete_entity(&self, key: &ContentKey) -> Result<()> {
        sqlx::query("DELETE FROM content WHERE content_id = ?1 AND content_type = ?2")
            .bind(&key.id)
            .bind(key.kind.as_str())
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

#[async_trait]
impl LibraryStore for SqliteStore {
    async fn load_library(&self) -> Result<LibraryRecords> {
        let mut records = LibraryRecords::default();

        for row in sqlx::query("SELECT * FROM watchlist ORDER BY added_at ASC")
            .fetch_all(&self.pool)
            .await?
        {
            records.watchlist.push(WatchlistEntry {
                entry_id: row.try_get("entry_id")?,
                key: key_from_row(&row)?,
                added_at: row.try_get("added_at")?,
            });
        }

        for row in sqlx::query("SELECT * FROM watched ORDER BY watched_at ASC")
            .fetch_all(&self.pool)
            .await?
        {
            records.watched.push(WatchedEntry {
                entry_id: row.try_get("entry_id")?,
                key: key_from_row(&row)?,
                watched_at: row.try_get("watched_at")?,
                user_rating: row.try_get("user_rating")?,
                user_review: row.try_get("user_review")?,
            });
        }

        for row in sqlx::query("SELECT * FROM ratings")
            .fetch_all(&self.pool)
            .await?
        {
            records.ratings.push(RatingEntry {
                key: key_from_row(&row)?,
                value: row.try_get("rating")?,
                created_at: row.try_get("created_at")?,
                updated_at: row.try_get("updated_at")?,
            });
        }

        for row in sqlx::query("SELECT * FROM reviews")
            .fetch_all(&self.pool)
            .await?
        {
            records.reviews.push(ReviewEntry {
                key: key_from_row(&row)?,
                text: row.try_get("review")?,
                created_at: row.try_get("created_at")?,
                updated_at: row.try_get("updated_at")?,
            });
        }

        for row in sqlx::query(
            "SELECT * FROM watched_episodes
             ORDER BY content_id ASC, season_number ASC, episode_number ASC",
        )
        .fetch_all(&self.pool)
        .await?
        {
            records.episodes.push(WatchedEpisode {
                show: key_from_row(&row)?,
                season_number: row.try_get("season_number")?,
                episode_number: row.try_get("episode_number")?,
                watched_at: row.try_get("watched_at")?,
                user_rating: row.try_get("user_rating")?,
            });
        }

        Ok(records)
    }

    async fn insert_watchlist(&self, entry: &WatchlistEntry) -> Result<()> {
        sqlx::query(
            "INSERT OR IGNORE INTO watchlist (entry_id, content_id, content_type, added_at)
             VALUES (?1, ?2, ?3, ?4)",
        )
        .bind(&entry.entry_id)
        .bind(&entry.key.id)
        .bind(entry.key.kind.as_str())
        .bind(entry.added_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn delete_watchlist(&self, key: &ContentKey) -> Result<()> {
        sqlx::query("DELETE FROM watchlist WHERE content_id = ?1 AND content_type = ?2")
            .bind(&key.id)
            .bind(key.kind.as_str())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn record_watched(
        &self,
        entry: &WatchedEntry,
        rating: Option<&RatingEntry>,
        review: Option<&ReviewEntry>,
    ) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        sqlx::query(
            "INSERT INTO watched (entry_id, content_id, content_type, watched_at, user_rating, user_review)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)
             ON CONFLICT (content_id, content_type) DO UPDATE SET
                entry_id = excluded.entry_id,
                watched_at = excluded.watched_at,
                user_rating = excluded.user_rating,
                user_review = excluded.user_review",
        )
        .bind(&entry.entry_id)
        .bind(&entry.key.id)
        .bind(entry.key.kind.as_str())
        .bind(entry.watched_at)
        .bind(entry.user_rating)
        .bind(entry.user_review.as_deref())
        .execute(&mut *tx)
        .await?;

        sqlx::query("DELETE FROM watchlist WHERE content_id = ?1 AND content_type = ?2")
            .bind(&entry.key.id)
            .bind(entry.key.kind.as_str())
            .execute(&mut *tx)
            .await?;

        if let Some(rating) = rating {
            upsert_rating_row(&mut *tx, rating).await?;
        }
        if let Some(review) = review {
            upsert_review_row(&mut *tx, review).await?;
        }
        tx.commit().await?;
        Ok(())
    }

    async fn delete_watched(&self, key: &ContentKey) -> Result<()> {
        sqlx::query("DELETE FROM watched WHERE content_id = ?1 AND content_type = ?2")
            .bind(&key.id)
            .bind(key.kind.as_str())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn upsert_rating(&self, rating: &RatingEntry) -> Result<()> {
        let mut conn = self.pool.acquire().await?;
        upsert_rating_row(&mut *conn, rating).await
    }

    async fn upsert_review(&self, review: &ReviewEntry) -> Result<()> {
        let mut conn = self.pool.acquire().await?;
        upsert_review_row(&mut *conn, review).await
    }

    async fn upsert_watched_episode(&self, episode: &WatchedEpisode) -> Result<()> {
        sqlx::query(
            "INSERT INTO watched_episodes
                (content_id, content_type, season_number, episode_number, watched_at, user_rating)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)
             ON CONFLICT (content_id, content_type, season_number, episode_number)
             DO UPDATE SET watched_at = excluded.watched_at, user_rating = excluded.user_rating",
        )
        .bind(&episode.show.id)
        .bind(episode.show.kind.as_str())
        .bind(episode.season_number)
        .bind(episode.episode_number)
        .bind(episode.watched_at)
        .bind(episode.user_rating)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn delete_watched_episode(
        &self,
        show: &ContentKey,
        season_number: i32,
        episode_number: i32,
    ) -> Result<()> {
        sqlx::query(
            "DELETE FROM watched_episodes
             WHERE content_id = ?1 AND content_type = ?2
               AND season_number = ?3 AND episode_number = ?4",
        )
        .bind(&show.id)
        .bind(show.kind.as_str())
        .bind(season_number)
        .bind(episode_number)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

async fn upsert_rating_row(conn: &mut sqlx::SqliteConnection, rating: &RatingEntry) -> Result<()> {
    sqlx::query(
        "INSERT INTO ratings (content_id, content_type, rating, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5)
         ON CONFLICT (content_id, content_type)
         DO UPDATE SET rating = excluded.rating, updated_at = excluded.updated_at",
    )
    .bind(&rating.key.id)
    .bind(rating.key.kind.as_str())
    .bind(rating.value)
    .bind(rating.created_at)
    .bind(rating.updated_at)
    .execute(conn)
    .await?;
    Ok(())
}

async fn upsert_review_row(conn: &mut sqlx::SqliteConnection, review: &ReviewEntry) -> Result<()> {
    sqlx::query(
        "INSERT INTO reviews (content_id, content_type, review, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5)
         ON CONFLICT (content_id, content_type)
         DO UPDATE SET review = excluded.review, updated_at = excluded.updated_at",
    )
    .bind(&review.key.id)
    .bind(review.key.kind.as_str())
    .bind(&review.text)
    .bind(review.created_at)
    .bind(review.updated_at)
    .execute(conn)
    .await?;
    Ok(())
}

#[async_trait]
impl ListStore for SqliteStore {
    async fn load_lists(&self) -> Result<Vec<CustomList>> {
        let mut members: HashMap<String, Vec<ContentKey>> = HashMap::new();
        for row in sqlx::query(
            "SELECT list_id, content_id, content_type FROM custom_list_members
             ORDER BY list_id ASC, position ASC",
        )
        .fetch_all(&self.pool)
        .await?
        {
            let list_id: String = row.try_get("list_id")?;
            members.entry(list_id).or_default().push(key_from_row(&row)?);
        }

        let mut lists = Vec::new();
        for row in sqlx::query("SELECT * FROM custom_lists ORDER BY created_at ASC")
            .fetch_all(&self.pool)
            .await?
        {
            let id: String = row.try_get("id")?;
            let keys = members.remove(&id).unwrap_or_default();
            let created_at: DateTime<Utc> = row.try_get("created_at")?;
            lists.push(CustomList {
                name: row.try_get("name")?,
                description: row.try_get("description")?,
                is_public: row.try_get("is_public")?,
                created_at,
                updated_at: row.try_get("updated_at")?,
                member_count: keys.len(),
                members: keys,
                id,
            });
        }
        Ok(lists)
    }

    async fn save_list(&self, list: &CustomList) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        sqlx::query(
            "INSERT INTO custom_lists (id, name, description, is_public, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)
             ON CONFLICT (id) DO UPDATE SET
                name = excluded.name,
                description = excluded.description,
                is_public = excluded.is_public,
                updated_at = excluded.updated_at",
        )
        .bind(&list.id)
        .bind(&list.name)
        .bind(list.description.as_deref())
        .bind(list.is_public)
        .bind(list.created_at)
        .bind(list.updated_at)
        .execute(&mut *tx)
        .await?;

        sqlx::query("DELETE FROM custom_list_members WHERE list_id = ?1")
            .bind(&list.id)
            .execute(&mut *tx)
            .await?;
        for (position, key) in list.members.iter().enumerate() {
            sqlx::query(
                "INSERT INTO custom_list_members (list_id, content_id, content_type, position)
                 VALUES (?1, ?2, ?3, ?4)",
            )
            .bind(&list.id)
            .bind(&key.id)
            .bind(key.kind.as_str())
            .bind(position as i64)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    async fn delete_list(&self, list_id: &str) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM custom_list_members WHERE list_id = ?1")
            .bind(list_id)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM custom_lists WHERE id = ?1")
            .bind(list_id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Movie;

    fn movie(id: &str, title: &str) -> ContentEntity {
        ContentEntity::Movie(Movie {
            id: id.to_string(),
            title: title.to_string(),
            poster_url: None,
            backdrop_url: None,
            rating: 7.1,
            release_year: "2001".to_string(),
            description: String::new(),
            genres: vec!["Drama".to_string()],
            runtime: Some(101),
            budget: None,
            revenue: None,
            cast: Vec::new(),
            crew: Vec::new(),
        })
    }

    #[tokio::test]
    async fn entity_upsert_replaces_the_whole_value() {
        let store = SqliteStore::in_memory().await.unwrap();
        store.upsert_entities(&[movie("1", "Old")]).await.unwrap();
        store.upsert_entities(&[movie("1", "New")]).await.unwrap();

        let got = store.get_entity(&ContentKey::movie("1")).await.unwrap();
        assert_eq!(got, Some(movie("1", "New")));
        assert!(store
            .get_entity(&ContentKey::tv("1"))
            .await
            .unwrap()
            .is_none());
        assert_eq!(store.list_entities(ContentKind::Movie).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn record_watched_clears_watchlist_row_in_one_transaction() {
        let store = SqliteStore::in_memory().await.unwrap();
        let key = ContentKey::movie("42");
        let now = Utc::now();
        store
            .insert_watchlist(&WatchlistEntry {
                entry_id: "w1".to_string(),
                key: key.clone(),
                added_at: now,
            })
            .await
            .unwrap();
        let rating = RatingEntry {
            key: key.clone(),
            value: 9.0,
            created_at: now,
            updated_at: now,
        };
        store
            .record_watched(
                &WatchedEntry {
                    entry_id: "h1".to_string(),
                    key: key.clone(),
                    watched_at: now,
                    user_rating: Some(9.0),
                    user_review: None,
                },
                Some(&rating),
                None,
            )
            .await
            .unwrap();

        let records = store.load_library().await.unwrap();
        assert!(records.watchlist.is_empty());
        assert_eq!(records.watched.len(), 1);
        assert_eq!(records.ratings[0].value, 9.0);
    }

    #[tokio::test]
    async fn watched_episodes_upsert_per_show_and_number() {
        let store = SqliteStore::in_memory().await.unwrap();
        let show = ContentKey::tv("1399");
        let episode = |season, number, rating| WatchedEpisode {
            show: show.clone(),
            season_number: season,
            episode_number: number,
            watched_at: Utc::now(),
            user_rating: rating,
        };
        store.upsert_watched_episode(&episode(1, 1, None)).await.unwrap();
        store.upsert_watched_episode(&episode(1, 2, None)).await.unwrap();
        store
            .upsert_watched_episode(&episode(1, 1, Some(8.0)))
            .await
            .unwrap();
        store.delete_watched_episode(&show, 1, 2).await.unwrap();

        let episodes = store.load_library().await.unwrap().episodes;
        assert_eq!(episodes.len(), 1);
        assert_eq!(episodes[0].show, show);
        assert_eq!(episodes[0].episode_id(), "s1e1");
        assert_eq!(episodes[0].user_rating, Some(8.0));
    }

    #[tokio::test]
    async fn lists_round_trip_with_member_order() {
        let store = SqliteStore::in_memory().await.unwrap();
        let now = Utc::now();
        let list = CustomList {
            id: "l1".to_string(),
            name: "Heist night".to_string(),
            description: None,
            is_public: true,
            created_at: now,
            updated_at: now,
            members: vec![ContentKey::movie("2"), ContentKey::tv("1")],
            member_count: 2,
        };
        store.save_list(&list).await.unwrap();

        let lists = store.load_lists().await.unwrap();
        assert_eq!(lists.len(), 1);
        assert_eq!(lists[0].members, list.members);
        assert_eq!(lists[0].member_count, 2);

        store.delete_list("l1").await.unwrap();
        assert!(store.load_lists().await.unwrap().is_empty());
    }
}

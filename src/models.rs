use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::SyncError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentKind {
    Movie,
    TvShow,
}

impl ContentKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ContentKind::Movie => "movie",
            ContentKind::TvShow => "tv",
        }
    }
}

impl fmt::Display for ContentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ContentKind {
    type Err = SyncError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "movie" | "movies" => Ok(ContentKind::Movie),
            "tv" | "tv_show" | "show" | "shows" => Ok(ContentKind::TvShow),
            other => Err(SyncError::InvalidKind(other.to_string())),
        }
    }
}

/// Identity of a piece of catalog content. Ids are only unique within a kind.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ContentKey {
    pub id: String,
    pub kind: ContentKind,
}

impl ContentKey {
    pub fn new(id: impl Into<String>, kind: ContentKind) -> Self {
        Self {
            id: id.into(),
            kind,
        }
    }

    pub fn movie(id: impl Into<String>) -> Self {
        Self::new(id, ContentKind::Movie)
    }

    pub fn tv(id: impl Into<String>) -> Self {
        Self::new(id, ContentKind::TvShow)
    }
}

impl fmt::Display for ContentKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind, self.id)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CastMember {
    pub id: String,
    pub name: String,
    pub character: String,
    pub profile_url: Option<String>,
    pub order: i32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CrewMember {
    pub id: String,
    pub name: String,
    pub job: String,
    pub department: String,
    pub profile_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Movie {
    pub id: String,
    pub title: String,
    pub poster_url: Option<String>,
    pub backdrop_url: Option<String>,
    pub rating: f32,
    pub release_year: String,
    pub description: String,
    pub genres: Vec<String>,
    pub runtime: Option<i32>,
    pub budget: Option<i64>,
    pub revenue: Option<i64>,
    #[serde(default)]
    pub cast: Vec<CastMember>,
    #[serde(default)]
    pub crew: Vec<CrewMember>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TvStatus {
    Ongoing,
    Ended,
    Pilot,
    Unknown,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Season {
    pub id: String,
    pub season_number: i32,
    pub title: Option<String>,
    pub episode_count: i32,
    pub air_date: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TvShow {
    pub id: String,
    pub title: String,
    pub poster_url: Option<String>,
    pub backdrop_url: Option<String>,
    pub rating: f32,
    pub release_year: String,
    pub description: String,
    pub genres: Vec<String>,
    pub status: TvStatus,
    pub total_seasons: Option<i32>,
    pub total_episodes: Option<i32>,
    #[serde(default)]
    pub seasons: Vec<Season>,
    #[serde(default)]
    pub cast: Vec<CastMember>,
    #[serde(default)]
    pub crew: Vec<CrewMember>,
}

/// A catalog entity of either kind. Values are replaced whole, never patched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentEntity {
    Movie(Movie),
    TvShow(TvShow),
}

impl ContentEntity {
    pub fn key(&self) -> ContentKey {
        match self {
            ContentEntity::Movie(m) => ContentKey::movie(m.id.clone()),
            ContentEntity::TvShow(t) => ContentKey::tv(t.id.clone()),
        }
    }

    pub fn kind(&self) -> ContentKind {
        match self {
            ContentEntity::Movie(_) => ContentKind::Movie,
            ContentEntity::TvShow(_) => ContentKind::TvShow,
        }
    }

    pub fn id(&self) -> &str {
        match self {
            ContentEntity::Movie(m) => &m.id,
            ContentEntity::TvShow(t) => &t.id,
        }
    }

    pub fn title(&self) -> &str {
        match self {
            ContentEntity::Movie(m) => &m.title,
            ContentEntity::TvShow(t) => &t.title,
        }
    }

    pub fn rating(&self) -> f32 {
        match self {
            ContentEntity::Movie(m) => m.rating,
            ContentEntity::TvShow(t) => t.rating,
        }
    }

    pub fn genres(&self) -> &[String] {
        match self {
            ContentEntity::Movie(m) => &m.genres,
            ContentEntity::TvShow(t) => &t.genres,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WatchlistEntry {
    pub entry_id: String,
    pub key: ContentKey,
    pub added_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WatchedEntry {
    pub entry_id: String,
    pub key: ContentKey,
    pub watched_at: DateTime<Utc>,
    pub user_rating: Option<f32>,
    pub user_review: Option<String>,
}

/// One watched episode of a tracked show. Episodes are tracked apart from
/// the show-level watched entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WatchedEpisode {
    pub show: ContentKey,
    pub season_number: i32,
    pub episode_number: i32,
    pub watched_at: DateTime<Utc>,
    pub user_rating: Option<f32>,
}

impl WatchedEpisode {
    /// Stable per-show id in the `s1e3` form.
    pub fn episode_id(&self) -> String {
        format!("s{}e{}", self.season_number, self.episode_number)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RatingEntry {
    pub key: ContentKey,
    pub value: f32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReviewEntry {
    pub key: ContentKey,
    pub text: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CustomList {
    pub id: String,
    pub name: String,
    pub description: Option<String>,
    pub is_public: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub members: Vec<ContentKey>,
    pub member_count: usize,
}

impl CustomList {
    pub fn contains(&self, key: &ContentKey) -> bool {
        self.members.iter().any(|k| k == key)
    }
}

/// Per-user state merged into an entity on every read.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LibraryFlags {
    pub is_watched: bool,
    pub is_in_watchlist: bool,
    pub user_rating: Option<f32>,
    pub user_review: Option<String>,
    pub watched_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContentDetail {
    pub entity: ContentEntity,
    pub library: LibraryFlags,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatalogPage {
    pub items: Vec<ContentEntity>,
    pub page: u32,
    pub total_pages: u32,
    pub total_results: u32,
    /// Set when the remote call failed and the items came from the local store.
    pub stale: bool,
}

impl CatalogPage {
    pub fn degraded(items: Vec<ContentEntity>) -> Self {
        let total = items.len() as u32;
        Self {
            items,
            page: 1,
            total_pages: if total == 0 { 0 } else { 1 },
            total_results: total,
            stale: true,
        }
    }
}

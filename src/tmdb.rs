use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

use crate::config::Settings;
use crate::error::{Result, SyncError};
use crate::models::{ContentKey, ContentKind};

pub const TMDB_BASE: &str = "https://api.themoviedb.org/3";
pub const IMAGE_BASE: &str = "https://image.tmdb.org/t/p";

const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);
const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Feed {
    Popular,
    TopRated,
    Trending,
}

/// Remote catalog contract. Implemented by [`TmdbClient`] and by test fakes.
#[async_trait]
pub trait CatalogApi: Send + Sync {
    async fn movie_details(&self, id: &str) -> Result<TmdbMovieDetails>;
    async fn tv_details(&self, id: &str) -> Result<TmdbTvDetails>;
    async fn credits(&self, key: &ContentKey) -> Result<TmdbCredits>;
    async fn feed(&self, kind: ContentKind, feed: Feed, page: u32) -> Result<CatalogResults>;
    async fn search(&self, kind: ContentKind, query: &str, page: u32) -> Result<CatalogResults>;
    async fn discover_by_genre(
        &self,
        kind: ContentKind,
        genre_id: i32,
        page: u32,
    ) -> Result<CatalogResults>;
    async fn similar(&self, key: &ContentKey) -> Result<CatalogResults>;
}

#[derive(Debug, Clone)]
pub struct TmdbClient {
    client: Client,
    api_key: String,
    base_url: String,
}

impl TmdbClient {
    pub fn new(client: Client, api_key: impl Into<String>, base_url: impl Into<String>) -> Self {
        Self {
            client,
            api_key: api_key.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    pub fn http_client() -> Result<Client> {
        let user_agent = format!("videri/{}", env!("CARGO_PKG_VERSION"));
        Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .timeout(REQUEST_TIMEOUT)
            .user_agent(user_agent)
            .build()
            .map_err(|e| SyncError::RemoteUnavailable(format!("failed to build HTTP client: {e}")))
    }

    pub fn from_settings(settings: &Settings) -> Result<Self> {
        Ok(Self::new(
            Self::http_client()?,
            settings.tmdb_api_key.clone(),
            settings.tmdb_base_url.clone(),
        ))
    }

    fn url(&self, path: &str, params: &[(&str, String)]) -> String {
        let mut url = format!("{}/{}?api_key={}", self.base_url, path, self.api_key);
        for (name, value) in params {
            url.push('&');
            url.push_str(name);
            url.push('=');
            url.push_str(&urlencoding::encode(value));
        }
        url
    }

    async fn get_json<T: for<'de> Deserialize<'de>>(
        &self,
        path: &str,
        params: &[(&str, String)],
    ) -> std::result::Result<T, HttpFailure> {
        let url = self.url(path, params);
        debug!(path = %path, "TMDB request");
        let res = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| HttpFailure::Transport(format!("{path}: {}", e.without_url())))?;
        let status = res.status();
        let text = res
            .text()
            .await
            .map_err(|e| HttpFailure::Transport(format!("{path}: reading body failed: {e}")))?;
        if !status.is_success() {
            return Err(HttpFailure::Status(status, format!("{path} -> {text}")));
        }
        serde_json::from_str(&text).map_err(|e| HttpFailure::Decode(format!("{path}: {e}")))
    }

    async fn get_page(
        &self,
        kind: ContentKind,
        path: &str,
        params: &[(&str, String)],
    ) -> Result<CatalogResults> {
        match kind {
            ContentKind::Movie => self
                .get_json::<TmdbPage<TmdbMovie>>(path, params)
                .await
                .map(CatalogResults::Movies)
                .map_err(|f| f.into_sync(None)),
            ContentKind::TvShow => self
                .get_json::<TmdbPage<TmdbTvShow>>(path, params)
                .await
                .map(CatalogResults::TvShows)
                .map_err(|f| f.into_sync(None)),
        }
    }
}

#[async_trait]
impl CatalogApi for TmdbClient {
    async fn movie_details(&self, id: &str) -> Result<TmdbMovieDetails> {
        let key = ContentKey::movie(id);
        let path = format!("movie/{}", urlencoding::encode(id));
        self.get_json(&path, &[])
            .await
            .map_err(|f| f.into_sync(Some(&key)))
    }

    async fn tv_details(&self, id: &str) -> Result<TmdbTvDetails> {
        let key = ContentKey::tv(id);
        let path = format!("tv/{}", urlencoding::encode(id));
        self.get_json(&path, &[])
            .await
            .map_err(|f| f.into_sync(Some(&key)))
    }

    async fn credits(&self, key: &ContentKey) -> Result<TmdbCredits> {
        let path = format!("{}/{}/credits", key.kind, urlencoding::encode(&key.id));
        self.get_json(&path, &[])
            .await
            .map_err(|f| f.into_sync(Some(key)))
    }

    async fn feed(&self, kind: ContentKind, feed: Feed, page: u32) -> Result<CatalogResults> {
        let (path, params) = match feed {
            Feed::Popular => (format!("{kind}/popular"), vec![("page", page.to_string())]),
            Feed::TopRated => (format!("{kind}/top_rated"), vec![("page", page.to_string())]),
            Feed::Trending => (format!("trending/{kind}/day"), Vec::new()),
        };
        self.get_page(kind, &path, &params).await
    }

    async fn search(&self, kind: ContentKind, query: &str, page: u32) -> Result<CatalogResults> {
        let path = format!("search/{kind}");
        let params = [("query", query.to_string()), ("page", page.to_string())];
        self.get_page(kind, &path, &params).await
    }

    async fn discover_by_genre(
        &self,
        kind: ContentKind,
        genre_id: i32,
        page: u32,
    ) -> Result<CatalogResults> {
        let path = format!("discover/{kind}");
        let params = [
            ("with_genres", genre_id.to_string()),
            ("page", page.to_string()),
        ];
        self.get_page(kind, &path, &params).await
    }

    async fn similar(&self, key: &ContentKey) -> Result<CatalogResults> {
        let path = format!("{}/{}/similar", key.kind, urlencoding::encode(&key.id));
        self.get_page(key.kind, &path, &[]).await
    }
}

#[derive(Debug)]
enum HttpFailure {
    Transport(String),
    Status(StatusCode, String),
    Decode(String),
}

impl HttpFailure {
    fn into_sync(self, key: Option<&ContentKey>) -> SyncError {
        match (self, key) {
            (HttpFailure::Status(StatusCode::NOT_FOUND, _), Some(key)) => {
                SyncError::NotFound(key.clone())
            }
            (HttpFailure::Status(status, body), _) => {
                SyncError::RemoteUnavailable(format!("status {status}: {body}"))
            }
            (HttpFailure::Transport(msg), _) => SyncError::RemoteUnavailable(msg),
            (HttpFailure::Decode(msg), _) => SyncError::MalformedResponse(msg),
        }
    }
}

#[derive(Debug, Clone)]
pub enum CatalogResults {
    Movies(TmdbPage<TmdbMovie>),
    TvShows(TmdbPage<TmdbTvShow>),
}

#[derive(Debug, Clone, Deserialize)]
pub struct TmdbPage<T> {
    #[serde(default)]
    pub page: u32,
    pub results: Vec<T>,
    #[serde(default)]
    pub total_pages: u32,
    #[serde(default)]
    pub total_results: u32,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct TmdbMovie {
    pub id: i64,
    pub title: String,
    pub overview: String,
    pub poster_path: Option<String>,
    pub backdrop_path: Option<String>,
    pub release_date: Option<String>,
    pub vote_average: f64,
    pub genre_ids: Vec<i32>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct TmdbTvShow {
    pub id: i64,
    pub name: String,
    pub overview: String,
    pub poster_path: Option<String>,
    pub backdrop_path: Option<String>,
    pub first_air_date: Option<String>,
    pub vote_average: f64,
    pub genre_ids: Vec<i32>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TmdbGenre {
    pub id: i32,
    #[serde(default)]
    pub name: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TmdbMovieDetails {
    pub id: i64,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub overview: String,
    #[serde(default)]
    pub poster_path: Option<String>,
    #[serde(default)]
    pub backdrop_path: Option<String>,
    #[serde(default)]
    pub release_date: Option<String>,
    #[serde(default)]
    pub vote_average: f64,
    #[serde(default)]
    pub genres: Vec<TmdbGenre>,
    #[serde(default)]
    pub runtime: Option<i32>,
    #[serde(default)]
    pub budget: Option<i64>,
    #[serde(default)]
    pub revenue: Option<i64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TmdbSeason {
    pub id: i64,
    #[serde(default)]
    pub season_number: i32,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub air_date: Option<String>,
    #[serde(default)]
    pub episode_count: i32,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TmdbTvDetails {
    pub id: i64,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub overview: String,
    #[serde(default)]
    pub poster_path: Option<String>,
    #[serde(default)]
    pub backdrop_path: Option<String>,
    #[serde(default)]
    pub first_air_date: Option<String>,
    #[serde(default)]
    pub vote_average: f64,
    #[serde(default)]
    pub genres: Vec<TmdbGenre>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub number_of_seasons: Option<i32>,
    #[serde(default)]
    pub number_of_episodes: Option<i32>,
    #[serde(default)]
    pub seasons: Vec<TmdbSeason>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TmdbCredits {
    #[serde(default)]
    pub cast: Vec<TmdbCastMember>,
    #[serde(default)]
    pub crew: Vec<TmdbCrewMember>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct TmdbCastMember {
    pub id: i64,
    pub name: String,
    pub character: String,
    pub profile_path: Option<String>,
    pub order: i32,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct TmdbCrewMember {
    pub id: i64,
    pub name: String,
    pub job: String,
    pub department: String,
    pub profile_path: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client() -> TmdbClient {
        TmdbClient::new(Client::new(), "secret", "https://api.example.test/3/")
    }

    #[test]
    fn builds_urls_with_encoded_params() {
        let url = client().url("search/movie", &[("query", "the matrix & co".to_string())]);
        assert_eq!(
            url,
            "https://api.example.test/3/search/movie?api_key=secret&query=the%20matrix%20%26%20co"
        );
    }

    #[test]
    fn not_found_status_maps_to_not_found_for_entities() {
        let key = ContentKey::movie("603");
        let err = HttpFailure::Status(StatusCode::NOT_FOUND, "gone".into()).into_sync(Some(&key));
        assert!(matches!(err, SyncError::NotFound(k) if k == key));

        let err = HttpFailure::Status(StatusCode::NOT_FOUND, "gone".into()).into_sync(None);
        assert!(matches!(err, SyncError::RemoteUnavailable(_)));
    }

    #[test]
    fn decode_failures_are_malformed_responses() {
        let err = HttpFailure::Decode("expected value".into()).into_sync(None);
        assert!(matches!(err, SyncError::MalformedResponse(_)));
        assert!(err.is_remote());
    }

    #[test]
    fn list_payload_tolerates_missing_optional_fields() {
        let raw = r#"{"page":1,"results":[{"id":603,"title":"The Matrix"}],"total_pages":3,"total_results":50}"#;
        let page: TmdbPage<TmdbMovie> = serde_json::from_str(raw).unwrap();
        assert_eq!(page.results.len(), 1);
        assert_eq!(page.results[0].poster_path, None);
        assert!(page.results[0].genre_ids.is_empty());
        assert_eq!(page.total_pages, 3);
    }

    #[test]
    fn list_payload_without_results_is_rejected() {
        let raw = r#"{"status_message":"Invalid API key"}"#;
        assert!(serde_json::from_str::<TmdbPage<TmdbMovie>>(raw).is_err());
    }
}

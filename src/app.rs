use anyhow::Result;
use axum::{
    extract::{DefaultBodyLimit, Path, Query, State},
    http::StatusCode,
    response::{
        sse::{Event, KeepAlive, Sse},
        IntoResponse, Response,
    },
    routing::{get, post, put},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use tokio_stream::{Stream, StreamExt};
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

use crate::config::Settings;
use crate::error::SyncError;
use crate::facade::SyncFacade;
use crate::ledger::LibrarySnapshot;
use crate::mapper::{EntityMapper, ImageConfig};
use crate::models::{
    CatalogPage, ContentDetail, ContentKey, ContentKind, CustomList, RatingEntry, ReviewEntry,
    WatchedEntry, WatchedEpisode, WatchlistEntry,
};
use crate::store::SqliteStore;
use crate::tmdb::TmdbClient;

const MAX_BODY_BYTES: usize = 64 * 1024;

type ApiResult<T> = std::result::Result<Json<T>, SyncError>;

#[derive(Clone)]
pub struct AppState {
    pub facade: Arc<SyncFacade>,
}

pub async fn run_server(settings: Settings) -> Result<()> {
    let api = Arc::new(TmdbClient::from_settings(&settings)?);
    let store = Arc::new(SqliteStore::connect(&settings.database_url).await?);
    let mapper = EntityMapper::new(ImageConfig::new(settings.image_base_url.clone()));
    let facade = SyncFacade::with_store(api, store, mapper, settings.read_policy).await?;

    let app = build_router(AppState {
        facade: Arc::new(facade),
    });

    info!("Listening on {}", settings.bind_addr);
    let listener = tokio::net::TcpListener::bind(settings.bind_addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/content/:kind/:id", get(content_detail).delete(evict_content))
        .route("/catalog/:kind/genre/:name", get(catalog_by_genre))
        .route("/catalog/:kind/:feed", get(catalog_feed))
        .route("/library/watchlist", get(watchlist))
        .route("/library/watched", get(watched))
        .route("/library/events", get(library_events))
        .route("/library/:kind/:id/watchlist/toggle", post(toggle_watchlist))
        .route("/library/:kind/:id/watched/toggle", post(toggle_watched))
        .route("/library/:kind/:id/rating", put(rate))
        .route("/library/:kind/:id/review", put(review))
        .route("/library/:kind/:id/episodes", get(watched_episodes))
        .route(
            "/library/:kind/:id/episodes/:season/:episode",
            put(mark_episode_watched).delete(mark_episode_unwatched),
        )
        .route("/lists", get(all_lists).post(create_list))
        .route(
            "/lists/:list_id",
            get(get_list).put(update_list).delete(delete_list),
        )
        .route(
            "/lists/:list_id/members/:kind/:id",
            put(add_member).delete(remove_member),
        )
        .route("/lists/:list_id/contents", get(list_contents))
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

impl IntoResponse for SyncError {
    fn into_response(self) -> Response {
        let status = match &self {
            SyncError::NotFound(_) | SyncError::ListNotFound(_) => StatusCode::NOT_FOUND,
            SyncError::InvalidRating(_)
            | SyncError::InvalidList(_)
            | SyncError::InvalidKind(_)
            | SyncError::InvalidEpisode(_) => StatusCode::BAD_REQUEST,
            SyncError::RemoteUnavailable(_) | SyncError::MalformedResponse(_) => {
                StatusCode::BAD_GATEWAY
            }
            SyncError::Cancelled => StatusCode::SERVICE_UNAVAILABLE,
            SyncError::Persistence(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if status.is_server_error() {
            error!("Request failed: {}", self);
        } else {
            warn!("Request rejected: {}", self);
        }
        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}

fn content_key(kind: &str, id: &str) -> std::result::Result<ContentKey, SyncError> {
    let kind: ContentKind = kind.parse()?;
    Ok(ContentKey::new(id, kind))
}

async fn health() -> &'static str {
    "OK"
}

async fn content_detail(
    State(state): State<AppState>,
    Path((kind, id)): Path<(String, String)>,
) -> ApiResult<ContentDetail> {
    let key = content_key(&kind, &id)?;
    Ok(Json(state.facade.detail(&key).await?))
}

async fn evict_content(
    State(state): State<AppState>,
    Path((kind, id)): Path<(String, String)>,
) -> std::result::Result<StatusCode, SyncError> {
    let key = content_key(&kind, &id)?;
    state.facade.evict(&key).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Debug, Default, Deserialize)]
struct CatalogQuery {
    page: Option<u32>,
    q: Option<String>,
}

async fn catalog_feed(
    State(state): State<AppState>,
    Path((kind, feed)): Path<(String, String)>,
    Query(query): Query<CatalogQuery>,
) -> ApiResult<CatalogPage> {
    let kind: ContentKind = kind.parse()?;
    let page = query.page.unwrap_or(1);
    let facade = &state.facade;
    let result = match feed.as_str() {
        "popular" => facade.popular(kind, page).await,
        "trending" => facade.trending(kind).await,
        "top_rated" => facade.top_rated(kind, page).await,
        "search" => {
            facade
                .search(kind, query.q.as_deref().unwrap_or_default(), page)
                .await
        }
        other => return Err(SyncError::InvalidKind(format!("unknown catalog feed '{other}'"))),
    };
    Ok(Json(result))
}

async fn catalog_by_genre(
    State(state): State<AppState>,
    Path((kind, name)): Path<(String, String)>,
    Query(query): Query<CatalogQuery>,
) -> ApiResult<CatalogPage> {
    let kind: ContentKind = kind.parse()?;
    let page = query.page.unwrap_or(1);
    Ok(Json(state.facade.by_genre(kind, &name, page).await))
}

async fn watchlist(State(state): State<AppState>) -> Json<Vec<WatchlistEntry>> {
    Json(state.facade.watchlist())
}

async fn watched(State(state): State<AppState>) -> Json<Vec<WatchedEntry>> {
    Json(state.facade.watched())
}

async fn toggle_watchlist(
    State(state): State<AppState>,
    Path((kind, id)): Path<(String, String)>,
) -> ApiResult<serde_json::Value> {
    let key = content_key(&kind, &id)?;
    let in_watchlist = state.facade.toggle_watchlist(&key).await?;
    Ok(Json(json!({ "key": key, "in_watchlist": in_watchlist })))
}

async fn toggle_watched(
    State(state): State<AppState>,
    Path((kind, id)): Path<(String, String)>,
) -> ApiResult<serde_json::Value> {
    let key = content_key(&kind, &id)?;
    let watched = state.facade.toggle_watched(&key).await?;
    Ok(Json(json!({ "key": key, "watched": watched })))
}

#[derive(Debug, Deserialize)]
struct RatingBody {
    value: f32,
}

async fn rate(
    State(state): State<AppState>,
    Path((kind, id)): Path<(String, String)>,
    Json(body): Json<RatingBody>,
) -> std::result::Result<StatusCode, SyncError> {
    let key = content_key(&kind, &id)?;
    state.facade.rate(&key, body.value).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Debug, Deserialize)]
struct ReviewBody {
    text: String,
}

async fn review(
    State(state): State<AppState>,
    Path((kind, id)): Path<(String, String)>,
    Json(body): Json<ReviewBody>,
) -> std::result::Result<StatusCode, SyncError> {
    let key = content_key(&kind, &id)?;
    state.facade.review(&key, body.text).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn watched_episodes(
    State(state): State<AppState>,
    Path((kind, id)): Path<(String, String)>,
) -> ApiResult<Vec<WatchedEpisode>> {
    let show = content_key(&kind, &id)?;
    Ok(Json(state.facade.watched_episodes(&show)))
}

#[derive(Debug, Default, Deserialize)]
struct EpisodeBody {
    #[serde(default)]
    rating: Option<f32>,
}

async fn mark_episode_watched(
    State(state): State<AppState>,
    Path((kind, id, season, episode)): Path<(String, String, i32, i32)>,
    body: Option<Json<EpisodeBody>>,
) -> ApiResult<WatchedEpisode> {
    let show = content_key(&kind, &id)?;
    let rating = body.and_then(|Json(body)| body.rating);
    let watched = state
        .facade
        .mark_episode_watched(&show, season, episode, rating)
        .await?;
    Ok(Json(watched))
}

async fn mark_episode_unwatched(
    State(state): State<AppState>,
    Path((kind, id, season, episode)): Path<(String, String, i32, i32)>,
) -> std::result::Result<StatusCode, SyncError> {
    let show = content_key(&kind, &id)?;
    state
        .facade
        .mark_episode_unwatched(&show, season, episode)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn all_lists(State(state): State<AppState>) -> Json<Vec<CustomList>> {
    Json(state.facade.lists())
}

#[derive(Debug, Deserialize)]
struct ListBody {
    name: String,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    is_public: bool,
}

async fn create_list(
    State(state): State<AppState>,
    Json(body): Json<ListBody>,
) -> std::result::Result<(StatusCode, Json<CustomList>), SyncError> {
    let list = state
        .facade
        .create_list(&body.name, body.description, body.is_public)
        .await?;
    Ok((StatusCode::CREATED, Json(list)))
}

async fn get_list(
    State(state): State<AppState>,
    Path(list_id): Path<String>,
) -> ApiResult<CustomList> {
    Ok(Json(state.facade.get_list(&list_id).await?))
}

async fn update_list(
    State(state): State<AppState>,
    Path(list_id): Path<String>,
    Json(body): Json<ListBody>,
) -> ApiResult<CustomList> {
    let mut list = state.facade.get_list(&list_id).await?;
    list.name = body.name;
    list.description = body.description;
    list.is_public = body.is_public;
    Ok(Json(state.facade.update_list(&list).await?))
}

async fn delete_list(
    State(state): State<AppState>,
    Path(list_id): Path<String>,
) -> std::result::Result<StatusCode, SyncError> {
    state.facade.delete_list(&list_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn add_member(
    State(state): State<AppState>,
    Path((list_id, kind, id)): Path<(String, String, String)>,
) -> ApiResult<CustomList> {
    let key = content_key(&kind, &id)?;
    Ok(Json(state.facade.add_to_list(&list_id, &key).await?))
}

async fn remove_member(
    State(state): State<AppState>,
    Path((list_id, kind, id)): Path<(String, String, String)>,
) -> ApiResult<CustomList> {
    let key = content_key(&kind, &id)?;
    Ok(Json(state.facade.remove_from_list(&list_id, &key).await?))
}

async fn list_contents(
    State(state): State<AppState>,
    Path(list_id): Path<String>,
) -> ApiResult<Vec<ContentDetail>> {
    Ok(Json(state.facade.list_contents(&list_id).await?))
}

#[derive(Debug, Serialize)]
struct LibraryEvent {
    version: u64,
    watchlist: Vec<WatchlistEntry>,
    watched: Vec<WatchedEntry>,
    episodes: Vec<WatchedEpisode>,
    ratings: Vec<RatingEntry>,
    reviews: Vec<ReviewEntry>,
}

impl From<LibrarySnapshot> for LibraryEvent {
    fn from(snapshot: LibrarySnapshot) -> Self {
        Self {
            version: snapshot.version,
            watchlist: snapshot.watchlist.values().cloned().collect(),
            watched: snapshot.watched.values().cloned().collect(),
            episodes: snapshot
                .episodes
                .values()
                .flat_map(|episodes| episodes.values().cloned())
                .collect(),
            ratings: snapshot.ratings.values().cloned().collect(),
            reviews: snapshot.reviews.values().cloned().collect(),
        }
    }
}

async fn library_events(
    State(state): State<AppState>,
) -> Sse<impl Stream<Item = std::result::Result<Event, axum::Error>>> {
    let events = state.facade.library_snapshots().map(|snapshot| {
        Event::default()
            .event("library")
            .json_data(LibraryEvent::from(snapshot))
    });
    Sse::new(events).keep_alive(KeepAlive::default())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut term) => {
                term.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Shutdown signal received (Ctrl+C)");
        }
        _ = terminate => {
            info!("Shutdown signal received (SIGTERM)");
        }
    }
}

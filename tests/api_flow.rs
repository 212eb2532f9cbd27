use async_trait::async_trait;
use axum::body::{to_bytes, Body};
use axum::http::{Request, StatusCode};
use axum::Router;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tower::util::ServiceExt;
use videri::app::{build_router, AppState};
use videri::cache::ReadPolicy;
use videri::error::{Result, SyncError};
use videri::facade::SyncFacade;
use videri::mapper::{EntityMapper, ImageConfig};
use videri::models::{ContentKey, ContentKind};
use videri::store::MemoryStore;
use videri::tmdb::{
    CatalogApi, CatalogResults, Feed, TmdbCredits, TmdbMovie, TmdbMovieDetails, TmdbPage,
    TmdbTvDetails,
};

#[derive(Default)]
struct FakeCatalog {
    offline: AtomicBool,
}

impl FakeCatalog {
    fn check(&self) -> Result<()> {
        if self.offline.load(Ordering::SeqCst) {
            Err(SyncError::RemoteUnavailable("offline".to_string()))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl CatalogApi for FakeCatalog {
    async fn movie_details(&self, id: &str) -> Result<TmdbMovieDetails> {
        self.check()?;
        if id == "404" {
            return Err(SyncError::NotFound(ContentKey::movie(id)));
        }
        Ok(TmdbMovieDetails {
            id: id.parse().unwrap_or_default(),
            title: "The Matrix".to_string(),
            overview: "Neo wakes up".to_string(),
            poster_path: Some("/matrix.jpg".to_string()),
            release_date: Some("1999-03-30".to_string()),
            vote_average: 8.2,
            ..Default::default()
        })
    }

    async fn tv_details(&self, id: &str) -> Result<TmdbTvDetails> {
        self.check()?;
        Ok(TmdbTvDetails {
            id: id.parse().unwrap_or_default(),
            name: "Dark".to_string(),
            status: Some("Ended".to_string()),
            ..Default::default()
        })
    }

    async fn credits(&self, _key: &ContentKey) -> Result<TmdbCredits> {
        self.check()?;
        Ok(TmdbCredits::default())
    }

    async fn feed(&self, _kind: ContentKind, _feed: Feed, page: u32) -> Result<CatalogResults> {
        self.check()?;
        Ok(CatalogResults::Movies(TmdbPage {
            page,
            results: vec![
                TmdbMovie {
                    id: 603,
                    title: "The Matrix".to_string(),
                    vote_average: 8.2,
                    genre_ids: vec![28, 878],
                    ..Default::default()
                },
                TmdbMovie {
                    id: 604,
                    title: "The Matrix Reloaded".to_string(),
                    vote_average: 7.0,
                    genre_ids: vec![28],
                    ..Default::default()
                },
            ],
            total_pages: 1,
            total_results: 2,
        }))
    }

    async fn search(&self, kind: ContentKind, _query: &str, page: u32) -> Result<CatalogResults> {
        self.feed(kind, Feed::Popular, page).await
    }

    async fn discover_by_genre(
        &self,
        kind: ContentKind,
        _genre_id: i32,
        page: u32,
    ) -> Result<CatalogResults> {
        self.feed(kind, Feed::Popular, page).await
    }

    async fn similar(&self, key: &ContentKey) -> Result<CatalogResults> {
        self.feed(key.kind, Feed::Popular, 1).await
    }
}

async fn app() -> (Router, Arc<FakeCatalog>) {
    let api = Arc::new(FakeCatalog::default());
    let facade = SyncFacade::with_store(
        api.clone(),
        Arc::new(MemoryStore::new()),
        EntityMapper::new(ImageConfig::new("https://img.test/t/p")),
        ReadPolicy::FreshFirst,
    )
    .await
    .unwrap();
    let state = AppState {
        facade: Arc::new(facade),
    };
    (build_router(state), api)
}

async fn send(app: &Router, req: Request<Body>) -> (StatusCode, Value) {
    let res = app.clone().oneshot(req).await.unwrap();
    let status = res.status();
    let bytes = to_bytes(res.into_body(), 1024 * 1024).await.unwrap();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, body)
}

fn get(uri: &str) -> Request<Body> {
    Request::get(uri).body(Body::empty()).unwrap()
}

fn with_json(method: &str, uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn empty(method: &str, uri: &str) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .body(Body::empty())
        .unwrap()
}

#[tokio::test]
async fn health_is_ok() {
    let (app, _) = app().await;
    let res = app.oneshot(get("/health")).await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);
}

#[tokio::test]
async fn detail_is_decorated_with_library_state() {
    let (app, _) = app().await;
    let (status, body) = send(&app, empty("POST", "/library/movie/603/watchlist/toggle")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["in_watchlist"], json!(true));

    let (status, body) = send(&app, get("/content/movie/603")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["entity"]["type"], "movie");
    assert_eq!(body["entity"]["title"], "The Matrix");
    assert_eq!(
        body["entity"]["poster_url"],
        "https://img.test/t/p/w342/matrix.jpg"
    );
    assert_eq!(body["library"]["is_in_watchlist"], json!(true));
    assert_eq!(body["library"]["is_watched"], json!(false));
}

#[tokio::test]
async fn toggling_watched_clears_watchlist() {
    let (app, _) = app().await;
    send(&app, empty("POST", "/library/tv/1399/watchlist/toggle")).await;
    let (_, body) = send(&app, empty("POST", "/library/tv/1399/watched/toggle")).await;
    assert_eq!(body["watched"], json!(true));

    let (_, watchlist) = send(&app, get("/library/watchlist")).await;
    assert_eq!(watchlist, json!([]));
    let (_, watched) = send(&app, get("/library/watched")).await;
    assert_eq!(watched.as_array().unwrap().len(), 1);
    assert_eq!(watched[0]["key"]["kind"], json!(ContentKind::TvShow));
}

#[tokio::test]
async fn rating_validation_maps_to_bad_request() {
    let (app, _) = app().await;
    let (status, _) = send(
        &app,
        with_json("PUT", "/library/movie/42/rating", json!({ "value": 7.5 })),
    )
    .await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, body) = send(
        &app,
        with_json("PUT", "/library/movie/42/rating", json!({ "value": 11.0 })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().contains("11"));

    let (status, _) = send(&app, get("/content/podcast/1")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn remote_errors_map_to_gateway_and_not_found() {
    let (app, api) = app().await;
    let (status, _) = send(&app, get("/content/movie/404")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    api.offline.store(true, Ordering::SeqCst);
    let (status, _) = send(&app, get("/content/movie/777")).await;
    assert_eq!(status, StatusCode::BAD_GATEWAY);
}

#[tokio::test]
async fn evicted_content_is_no_longer_served_offline() {
    let (app, api) = app().await;
    let (status, _) = send(&app, get("/content/movie/603")).await;
    assert_eq!(status, StatusCode::OK);

    api.offline.store(true, Ordering::SeqCst);
    let (status, _) = send(&app, get("/content/movie/603")).await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = send(&app, empty("DELETE", "/content/movie/603")).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    let (status, _) = send(&app, get("/content/movie/603")).await;
    assert_eq!(status, StatusCode::BAD_GATEWAY);
}

#[tokio::test]
async fn episodes_are_tracked_over_http() {
    let (app, _) = app().await;
    let (status, episode) = send(
        &app,
        with_json(
            "PUT",
            "/library/tv/1399/episodes/1/2",
            json!({ "rating": 8.5 }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(episode["season_number"], json!(1));
    assert_eq!(episode["episode_number"], json!(2));
    assert_eq!(episode["user_rating"], json!(8.5));

    let (status, _) = send(&app, empty("PUT", "/library/tv/1399/episodes/1/1")).await;
    assert_eq!(status, StatusCode::OK);
    let (_, episodes) = send(&app, get("/library/tv/1399/episodes")).await;
    assert_eq!(episodes.as_array().unwrap().len(), 2);
    assert_eq!(episodes[0]["episode_number"], json!(1));

    let (status, _) = send(&app, empty("DELETE", "/library/tv/1399/episodes/1/1")).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    let (_, episodes) = send(&app, get("/library/tv/1399/episodes")).await;
    assert_eq!(episodes.as_array().unwrap().len(), 1);

    let (status, _) = send(&app, empty("PUT", "/library/movie/603/episodes/1/1")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    let (_, watched) = send(&app, get("/library/watched")).await;
    assert_eq!(watched, json!([]));
}

#[tokio::test]
async fn catalog_degrades_to_cached_items_when_offline() {
    let (app, api) = app().await;
    let (status, fresh) = send(&app, get("/catalog/movie/popular?page=1")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(fresh["stale"], json!(false));
    assert_eq!(fresh["items"].as_array().unwrap().len(), 2);

    api.offline.store(true, Ordering::SeqCst);
    let (status, stale) = send(&app, get("/catalog/movie/search?q=reloaded")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(stale["stale"], json!(true));
    assert_eq!(stale["items"][0]["title"], "The Matrix Reloaded");

    let (_, by_genre) = send(&app, get("/catalog/movie/genre/Science%20Fiction")).await;
    assert_eq!(by_genre["items"].as_array().unwrap().len(), 1);

    let (status, _) = send(&app, get("/catalog/movie/upcoming")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn list_lifecycle_over_http() {
    let (app, _) = app().await;
    let (status, list) = send(
        &app,
        with_json("POST", "/lists", json!({ "name": "Cyberpunk" })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    let id = list["id"].as_str().unwrap().to_string();

    let (_, list) = send(&app, empty("PUT", &format!("/lists/{id}/members/movie/603"))).await;
    assert_eq!(list["member_count"], json!(1));
    let (_, list) = send(&app, empty("PUT", &format!("/lists/{id}/members/movie/603"))).await;
    assert_eq!(list["member_count"], json!(1));
    send(&app, empty("PUT", &format!("/lists/{id}/members/movie/404"))).await;

    let (status, contents) = send(&app, get(&format!("/lists/{id}/contents"))).await;
    assert_eq!(status, StatusCode::OK);
    let contents = contents.as_array().unwrap();
    assert_eq!(contents.len(), 1);
    assert_eq!(contents[0]["entity"]["id"], "603");

    let (_, renamed) = send(
        &app,
        with_json(
            "PUT",
            &format!("/lists/{id}"),
            json!({ "name": "Cyberpunk classics", "is_public": true }),
        ),
    )
    .await;
    assert_eq!(renamed["name"], "Cyberpunk classics");
    assert_eq!(renamed["member_count"], json!(2));

    let (status, _) = send(&app, empty("DELETE", &format!("/lists/{id}"))).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    let (status, _) = send(&app, get(&format!("/lists/{id}"))).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = send(&app, with_json("POST", "/lists", json!({ "name": " " }))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

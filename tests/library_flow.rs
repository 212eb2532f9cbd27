use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;
use tokio_stream::StreamExt;
use videri::cache::ReadPolicy;
use videri::error::{Result, SyncError};
use videri::facade::SyncFacade;
use videri::mapper::{EntityMapper, ImageConfig};
use videri::models::{ContentEntity, ContentKey, ContentKind};
use videri::store::SqliteStore;
use videri::tmdb::{
    CatalogApi, CatalogResults, Feed, TmdbCastMember, TmdbCredits, TmdbMovieDetails, TmdbPage,
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
        Ok(TmdbMovieDetails {
            id: id.parse().unwrap_or_default(),
            title: format!("Movie {}", id),
            vote_average: 7.4,
            runtime: Some(120),
            ..Default::default()
        })
    }

    async fn tv_details(&self, id: &str) -> Result<TmdbTvDetails> {
        self.check()?;
        Ok(TmdbTvDetails {
            id: id.parse().unwrap_or_default(),
            name: format!("Show {}", id),
            status: Some("Returning Series".to_string()),
            number_of_seasons: Some(2),
            ..Default::default()
        })
    }

    async fn credits(&self, _key: &ContentKey) -> Result<TmdbCredits> {
        self.check()?;
        Ok(TmdbCredits {
            cast: vec![TmdbCastMember {
                id: 1,
                name: "Lead".to_string(),
                character: "Hero".to_string(),
                ..Default::default()
            }],
            crew: Vec::new(),
        })
    }

    async fn feed(&self, _kind: ContentKind, _feed: Feed, _page: u32) -> Result<CatalogResults> {
        self.check()?;
        Ok(CatalogResults::Movies(TmdbPage {
            page: 1,
            results: Vec::new(),
            total_pages: 0,
            total_results: 0,
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

async fn facade_on(api: Arc<FakeCatalog>, store: Arc<SqliteStore>) -> SyncFacade {
    SyncFacade::with_store(
        api,
        store,
        EntityMapper::new(ImageConfig::default()),
        ReadPolicy::FreshFirst,
    )
    .await
    .unwrap()
}

async fn facade() -> (SyncFacade, Arc<FakeCatalog>, Arc<SqliteStore>) {
    let api = Arc::new(FakeCatalog::default());
    let store = Arc::new(SqliteStore::in_memory().await.unwrap());
    (facade_on(api.clone(), store.clone()).await, api, store)
}

#[tokio::test]
async fn rating_untracked_movie_leaves_other_flags_clear() {
    let (facade, _, _) = facade().await;
    let key = ContentKey::movie("42");
    facade.rate(&key, 7.5).await.unwrap();

    let detail = facade.detail(&key).await.unwrap();
    assert_eq!(detail.library.user_rating, Some(7.5));
    assert!(!detail.library.is_watched);
    assert!(!detail.library.is_in_watchlist);

    let other = facade.detail(&ContentKey::tv("42")).await.unwrap();
    assert_eq!(other.library.user_rating, None);
}

#[tokio::test]
async fn rating_survives_unwatching() {
    let (facade, _, _) = facade().await;
    let key = ContentKey::movie("603");
    facade.add_to_watchlist(&key).await.unwrap();
    facade.mark_watched(&key, Some(9.0), None).await.unwrap();

    let detail = facade.detail(&key).await.unwrap();
    assert!(detail.library.is_watched);
    assert!(!detail.library.is_in_watchlist);

    facade.mark_unwatched(&key).await.unwrap();
    let detail = facade.detail(&key).await.unwrap();
    assert!(!detail.library.is_watched);
    assert_eq!(detail.library.user_rating, Some(9.0));
}

#[tokio::test]
async fn cached_entity_is_served_identically_when_remote_fails() {
    let (facade, api, _) = facade().await;
    let first = facade.movie("603").await.unwrap();
    let ContentEntity::Movie(movie) = &first.entity else {
        panic!("expected a movie, got {:?}", first.entity);
    };
    assert_eq!(movie.cast.len(), 1);
    assert_eq!(movie.runtime, Some(120));

    api.offline.store(true, Ordering::SeqCst);
    let second = facade.movie("603").await.unwrap();
    assert_eq!(first, second);

    let err = facade.tv_show("1399").await.unwrap_err();
    assert!(err.is_remote());
}

#[tokio::test]
async fn typed_reads_carry_library_flags() {
    let (facade, _, _) = facade().await;
    facade
        .mark_watched(&ContentKey::movie("603"), Some(8.0), None)
        .await
        .unwrap();
    facade.add_to_watchlist(&ContentKey::tv("1399")).await.unwrap();

    let movie = facade.movie("603").await.unwrap();
    assert!(movie.library.is_watched);
    assert_eq!(movie.library.user_rating, Some(8.0));

    let show = facade.tv_show("1399").await.unwrap();
    assert!(matches!(&show.entity, ContentEntity::TvShow(t) if t.title == "Show 1399"));
    assert!(show.library.is_in_watchlist);
    assert!(!show.library.is_watched);
}

#[tokio::test]
async fn toggles_flip_state_and_report_it() {
    let (facade, _, _) = facade().await;
    let key = ContentKey::tv("1399");

    assert!(facade.toggle_watchlist(&key).await.unwrap());
    assert!(!facade.toggle_watchlist(&key).await.unwrap());
    assert!(facade.toggle_watchlist(&key).await.unwrap());

    assert!(facade.toggle_watched(&key).await.unwrap());
    assert!(facade.watchlist().is_empty());
    assert!(!facade.toggle_watched(&key).await.unwrap());
    assert!(facade.watched().is_empty());
}

#[tokio::test]
async fn library_state_survives_restart() {
    let (facade, api, store) = facade().await;
    let key = ContentKey::movie("603");
    facade
        .mark_watched(&key, Some(8.5), Some("Still holds up".to_string()))
        .await
        .unwrap();
    facade.add_to_watchlist(&ContentKey::tv("66732")).await.unwrap();
    facade
        .mark_episode_watched(&ContentKey::tv("66732"), 1, 1, Some(9.0))
        .await
        .unwrap();
    let list = facade.create_list("Rewatch", None, false).await.unwrap();
    facade.add_to_list(&list.id, &key).await.unwrap();
    facade.movie("603").await.unwrap();
    drop(facade);

    api.offline.store(true, Ordering::SeqCst);
    let facade = facade_on(api, store).await;
    let detail = facade.detail(&key).await.unwrap();
    assert!(detail.library.is_watched);
    assert_eq!(detail.library.user_rating, Some(8.5));
    assert_eq!(detail.library.user_review.as_deref(), Some("Still holds up"));
    assert_eq!(facade.watchlist().len(), 1);
    let episodes = facade.watched_episodes(&ContentKey::tv("66732"));
    assert_eq!(episodes.len(), 1);
    assert_eq!(episodes[0].episode_id(), "s1e1");
    assert_eq!(episodes[0].user_rating, Some(9.0));

    let contents = facade.list_contents(&list.id).await.unwrap();
    assert_eq!(contents.len(), 1);
    assert!(matches!(&contents[0].entity, ContentEntity::Movie(m) if m.id == "603"));
}

#[tokio::test]
async fn watch_detail_follows_library_changes() {
    let (facade, _, _) = facade().await;
    let key = ContentKey::movie("603");
    let mut details = Box::pin(facade.watch_detail(&key).await.unwrap());

    let initial = details.next().await.unwrap();
    assert!(!initial.library.is_in_watchlist);

    facade.add_to_watchlist(&key).await.unwrap();
    let updated = timeout(Duration::from_secs(1), details.next())
        .await
        .unwrap()
        .unwrap();
    assert!(updated.library.is_in_watchlist);
    assert_eq!(updated.entity, initial.entity);
}

#[tokio::test]
async fn episode_stream_tracks_one_show() {
    let (facade, _, _) = facade().await;
    let show = ContentKey::tv("1399");
    let mut updates = Box::pin(facade.episode_updates(&show));
    assert!(updates.next().await.unwrap().is_empty());

    facade.mark_episode_watched(&show, 1, 1, None).await.unwrap();
    let episodes = timeout(Duration::from_secs(1), updates.next())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(episodes.len(), 1);

    facade.mark_episode_unwatched(&show, 1, 1).await.unwrap();
    let episodes = timeout(Duration::from_secs(1), updates.next())
        .await
        .unwrap()
        .unwrap();
    assert!(episodes.is_empty());
    assert!(!facade.detail(&show).await.unwrap().library.is_watched);
}

#[tokio::test]
async fn list_stream_tracks_membership() {
    let (facade, _, _) = facade().await;
    let mut updates = Box::pin(facade.lists_updates());
    assert!(updates.next().await.unwrap().is_empty());

    let list = facade.create_list("Queue", None, false).await.unwrap();
    let lists = timeout(Duration::from_secs(1), updates.next())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(lists.len(), 1);

    facade.add_to_list(&list.id, &ContentKey::movie("1")).await.unwrap();
    let lists = timeout(Duration::from_secs(1), updates.next())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(lists[0].member_count, 1);

    assert!(matches!(
        facade.list_contents("nope").await,
        Err(SyncError::ListNotFound(_))
    ));
}

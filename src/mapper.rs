use once_cell::sync::Lazy;
use std::collections::{HashMap, HashSet};

use crate::models::{CastMember, CrewMember, Movie, Season, TvShow, TvStatus};
use crate::tmdb::{
    TmdbCastMember, TmdbCredits, TmdbCrewMember, TmdbGenre, TmdbMovie, TmdbMovieDetails,
    TmdbSeason, TmdbTvDetails, TmdbTvShow, IMAGE_BASE,
};

pub const POSTER_SIZE: &str = "w342";
pub const BACKDROP_SIZE: &str = "w780";
pub const PROFILE_SIZE: &str = "w185";

static MOVIE_GENRES: Lazy<GenreTable> = Lazy::new(|| {
    GenreTable::from_pairs(&[
        (28, "Action"),
        (12, "Adventure"),
        (16, "Animation"),
        (35, "Comedy"),
        (80, "Crime"),
        (99, "Documentary"),
        (18, "Drama"),
        (10751, "Family"),
        (14, "Fantasy"),
        (36, "History"),
        (27, "Horror"),
        (10402, "Music"),
        (9648, "Mystery"),
        (10749, "Romance"),
        (878, "Science Fiction"),
        (10770, "TV Movie"),
        (53, "Thriller"),
        (10752, "War"),
        (37, "Western"),
    ])
});

static TV_GENRES: Lazy<GenreTable> = Lazy::new(|| {
    GenreTable::from_pairs(&[
        (10759, "Action & Adventure"),
        (16, "Animation"),
        (35, "Comedy"),
        (80, "Crime"),
        (99, "Documentary"),
        (18, "Drama"),
        (10751, "Family"),
        (10762, "Kids"),
        (9648, "Mystery"),
        (10763, "News"),
        (10764, "Reality"),
        (10765, "Sci-Fi & Fantasy"),
        (10766, "Soap"),
        (10767, "Talk"),
        (10768, "War & Politics"),
        (37, "Western"),
    ])
});

/// Static snapshot of the remote genre catalog. It may lag the service, so
/// unknown ids are dropped rather than treated as errors.
#[derive(Debug, Clone, Default)]
pub struct GenreTable {
    names: HashMap<i32, String>,
}

impl GenreTable {
    pub fn from_pairs(pairs: &[(i32, &str)]) -> Self {
        Self {
            names: pairs
                .iter()
                .map(|(id, name)| (*id, name.to_string()))
                .collect(),
        }
    }

    pub fn movie() -> &'static GenreTable {
        &MOVIE_GENRES
    }

    pub fn tv() -> &'static GenreTable {
        &TV_GENRES
    }

    pub fn name(&self, id: i32) -> Option<&str> {
        self.names.get(&id).map(String::as_str)
    }

    pub fn id_for(&self, name: &str) -> Option<i32> {
        self.names
            .iter()
            .find(|(_, n)| n.eq_ignore_ascii_case(name.trim()))
            .map(|(id, _)| *id)
    }
}

#[derive(Debug, Clone)]
pub struct ImageConfig {
    pub base_url: String,
}

impl Default for ImageConfig {
    fn default() -> Self {
        Self {
            base_url: IMAGE_BASE.to_string(),
        }
    }
}

impl ImageConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    pub fn url(&self, path: Option<&str>, size: &str) -> Option<String> {
        let path = path.map(str::trim).filter(|p| !p.is_empty())?;
        if path.starts_with('/') {
            Some(format!("{}/{}{}", self.base_url, size, path))
        } else {
            Some(format!("{}/{}/{}", self.base_url, size, path))
        }
    }
}

/// Stateless translation from the TMDB wire schema to canonical entities.
#[derive(Debug, Clone, Default)]
pub struct EntityMapper {
    images: ImageConfig,
}

impl EntityMapper {
    pub fn new(images: ImageConfig) -> Self {
        Self { images }
    }

    pub fn map_movie(&self, remote: &TmdbMovie, genres: &GenreTable) -> Movie {
        Movie {
            id: remote.id.to_string(),
            title: remote.title.clone(),
            poster_url: self.images.url(remote.poster_path.as_deref(), POSTER_SIZE),
            backdrop_url: self
                .images
                .url(remote.backdrop_path.as_deref(), BACKDROP_SIZE),
            rating: normalize_rating(remote.vote_average),
            release_year: release_year(remote.release_date.as_deref()),
            description: remote.overview.clone(),
            genres: genre_names(&remote.genre_ids, genres),
            runtime: None,
            budget: None,
            revenue: None,
            cast: Vec::new(),
            crew: Vec::new(),
        }
    }

    pub fn map_tv_show(&self, remote: &TmdbTvShow, genres: &GenreTable) -> TvShow {
        TvShow {
            id: remote.id.to_string(),
            title: remote.name.clone(),
            poster_url: self.images.url(remote.poster_path.as_deref(), POSTER_SIZE),
            backdrop_url: self
                .images
                .url(remote.backdrop_path.as_deref(), BACKDROP_SIZE),
            rating: normalize_rating(remote.vote_average),
            release_year: release_year(remote.first_air_date.as_deref()),
            description: remote.overview.clone(),
            genres: genre_names(&remote.genre_ids, genres),
            // List payloads carry no status.
            status: TvStatus::Unknown,
            total_seasons: None,
            total_episodes: None,
            seasons: Vec::new(),
            cast: Vec::new(),
            crew: Vec::new(),
        }
    }

    pub fn map_movie_details(
        &self,
        details: &TmdbMovieDetails,
        credits: Option<&TmdbCredits>,
    ) -> Movie {
        Movie {
            id: details.id.to_string(),
            title: details.title.clone(),
            poster_url: self.images.url(details.poster_path.as_deref(), POSTER_SIZE),
            backdrop_url: self
                .images
                .url(details.backdrop_path.as_deref(), BACKDROP_SIZE),
            rating: normalize_rating(details.vote_average),
            release_year: release_year(details.release_date.as_deref()),
            description: details.overview.clone(),
            genres: detail_genres(&details.genres),
            runtime: details.runtime.filter(|r| *r > 0),
            budget: details.budget.filter(|b| *b > 0),
            revenue: details.revenue.filter(|r| *r > 0),
            cast: self.map_cast(credits),
            crew: self.map_crew(credits),
        }
    }

    pub fn map_tv_details(&self, details: &TmdbTvDetails, credits: Option<&TmdbCredits>) -> TvShow {
        TvShow {
            id: details.id.to_string(),
            title: details.name.clone(),
            poster_url: self.images.url(details.poster_path.as_deref(), POSTER_SIZE),
            backdrop_url: self
                .images
                .url(details.backdrop_path.as_deref(), BACKDROP_SIZE),
            rating: normalize_rating(details.vote_average),
            release_year: release_year(details.first_air_date.as_deref()),
            description: details.overview.clone(),
            genres: detail_genres(&details.genres),
            status: tv_status(details.status.as_deref().unwrap_or_default()),
            total_seasons: details.number_of_seasons,
            total_episodes: details.number_of_episodes,
            seasons: details.seasons.iter().map(map_season).collect(),
            cast: self.map_cast(credits),
            crew: self.map_crew(credits),
        }
    }

    fn map_cast(&self, credits: Option<&TmdbCredits>) -> Vec<CastMember> {
        let mut cast: Vec<&TmdbCastMember> = credits.map(|c| c.cast.iter().collect()).unwrap_or_default();
        // Stable sort keeps payload order among equal billing positions.
        cast.sort_by_key(|c| c.order);
        cast.into_iter()
            .map(|c| CastMember {
                id: c.id.to_string(),
                name: c.name.clone(),
                character: c.character.clone(),
                profile_url: self.images.url(c.profile_path.as_deref(), PROFILE_SIZE),
                order: c.order,
            })
            .collect()
    }

    fn map_crew(&self, credits: Option<&TmdbCredits>) -> Vec<CrewMember> {
        credits
            .map(|c| c.crew.iter().map(|m| self.map_crew_member(m)).collect())
            .unwrap_or_default()
    }

    fn map_crew_member(&self, member: &TmdbCrewMember) -> CrewMember {
        CrewMember {
            id: member.id.to_string(),
            name: member.name.clone(),
            job: member.job.clone(),
            department: member.department.clone(),
            profile_url: self.images.url(member.profile_path.as_deref(), PROFILE_SIZE),
        }
    }
}

fn map_season(season: &TmdbSeason) -> Season {
    Season {
        id: season.id.to_string(),
        season_number: season.season_number,
        title: season.name.clone().filter(|n| !n.trim().is_empty()),
        episode_count: season.episode_count,
        air_date: season.air_date.clone().filter(|d| !d.trim().is_empty()),
    }
}

pub fn tv_status(raw: &str) -> TvStatus {
    let lower = raw.to_lowercase();
    if lower.contains("returning") || lower.contains("production") || lower.contains("planned") {
        TvStatus::Ongoing
    } else if lower.contains("ended") || lower.contains("cancel") {
        TvStatus::Ended
    } else if lower.contains("pilot") {
        TvStatus::Pilot
    } else {
        TvStatus::Unknown
    }
}

fn normalize_rating(vote_average: f64) -> f32 {
    if !vote_average.is_finite() {
        return 0.0;
    }
    let clamped = vote_average.clamp(0.0, 10.0);
    ((clamped * 10.0).round() / 10.0) as f32
}

fn release_year(date: Option<&str>) -> String {
    let date = date.unwrap_or_default().trim();
    match date.get(..4) {
        Some(year) if year.chars().all(|c| c.is_ascii_digit()) => year.to_string(),
        _ => String::new(),
    }
}

fn genre_names(ids: &[i32], table: &GenreTable) -> Vec<String> {
    dedupe_preserve_order(ids.iter().filter_map(|id| table.name(*id)).map(str::to_string))
}

fn detail_genres(genres: &[TmdbGenre]) -> Vec<String> {
    dedupe_preserve_order(
        genres
            .iter()
            .map(|g| g.name.trim().to_string())
            .filter(|n| !n.is_empty()),
    )
}

fn dedupe_preserve_order(items: impl IntoIterator<Item = String>) -> Vec<String> {
    let mut seen = HashSet::new();
    items
        .into_iter()
        .filter(|item| seen.insert(item.clone()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mapper() -> EntityMapper {
        EntityMapper::new(ImageConfig::new("https://img.test/t/p/"))
    }

    #[test]
    fn maps_list_movie_and_drops_unknown_genres() {
        let remote = TmdbMovie {
            id: 603,
            title: "The Matrix".to_string(),
            overview: "Neo wakes up".to_string(),
            poster_path: Some("/matrix.jpg".to_string()),
            backdrop_path: None,
            release_date: Some("1999-03-30".to_string()),
            vote_average: 8.216,
            genre_ids: vec![28, 999_999, 878, 28],
        };
        let movie = mapper().map_movie(&remote, GenreTable::movie());
        assert_eq!(movie.id, "603");
        assert_eq!(movie.release_year, "1999");
        assert_eq!(movie.rating, 8.2);
        assert_eq!(
            movie.poster_url.as_deref(),
            Some("https://img.test/t/p/w342/matrix.jpg")
        );
        assert_eq!(movie.backdrop_url, None);
        assert_eq!(movie.genres, vec!["Action", "Science Fiction"]);
    }

    #[test]
    fn tv_status_keywords_are_case_insensitive() {
        assert_eq!(tv_status("Returning Series"), TvStatus::Ongoing);
        assert_eq!(tv_status("IN PRODUCTION"), TvStatus::Ongoing);
        assert_eq!(tv_status("Ended"), TvStatus::Ended);
        assert_eq!(tv_status("Canceled"), TvStatus::Ended);
        assert_eq!(tv_status("pilot"), TvStatus::Pilot);
        assert_eq!(tv_status("Rumored"), TvStatus::Unknown);
        assert_eq!(tv_status(""), TvStatus::Unknown);
    }

    #[test]
    fn malformed_dates_and_paths_fall_back_to_defaults() {
        assert_eq!(release_year(Some("")), "");
        assert_eq!(release_year(Some("19")), "");
        assert_eq!(release_year(Some("TBA-01")), "");
        assert_eq!(release_year(None), "");
        assert_eq!(mapper().images.url(Some("  "), POSTER_SIZE), None);
    }

    #[test]
    fn ratings_are_clamped_and_rounded_to_one_decimal() {
        assert_eq!(normalize_rating(7.46), 7.5);
        assert_eq!(normalize_rating(12.0), 10.0);
        assert_eq!(normalize_rating(-1.0), 0.0);
        assert_eq!(normalize_rating(f64::NAN), 0.0);
    }

    #[test]
    fn detail_mapping_orders_cast_by_billing() {
        let details = TmdbTvDetails {
            id: 1399,
            name: "Game of Thrones".to_string(),
            status: Some("Ended".to_string()),
            number_of_seasons: Some(8),
            seasons: vec![TmdbSeason {
                id: 3624,
                season_number: 1,
                name: Some("Season 1".to_string()),
                air_date: Some("2011-04-17".to_string()),
                episode_count: 10,
            }],
            ..Default::default()
        };
        let credits = TmdbCredits {
            cast: vec![
                TmdbCastMember {
                    id: 2,
                    name: "Second".to_string(),
                    order: 1,
                    ..Default::default()
                },
                TmdbCastMember {
                    id: 1,
                    name: "First".to_string(),
                    order: 0,
                    ..Default::default()
                },
            ],
            crew: vec![TmdbCrewMember {
                id: 9,
                name: "Showrunner".to_string(),
                job: "Executive Producer".to_string(),
                department: "Production".to_string(),
                profile_path: None,
            }],
        };
        let show = mapper().map_tv_details(&details, Some(&credits));
        assert_eq!(show.status, TvStatus::Ended);
        assert_eq!(show.seasons.len(), 1);
        assert_eq!(show.seasons[0].episode_count, 10);
        let names: Vec<_> = show.cast.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["First", "Second"]);
        assert_eq!(show.crew[0].job, "Executive Producer");
    }

    #[test]
    fn missing_credits_yield_empty_cast_and_crew() {
        let details = TmdbMovieDetails {
            id: 1,
            title: "Untitled".to_string(),
            runtime: Some(0),
            ..Default::default()
        };
        let movie = mapper().map_movie_details(&details, None);
        assert!(movie.cast.is_empty());
        assert!(movie.crew.is_empty());
        assert_eq!(movie.runtime, None);
    }

    #[test]
    fn genre_lookup_by_name_ignores_case() {
        assert_eq!(GenreTable::movie().id_for("science fiction"), Some(878));
        assert_eq!(GenreTable::tv().id_for("Kids"), Some(10762));
        assert_eq!(GenreTable::tv().id_for("Western Noir"), None);
    }
}

//! Title lookup against TMDB, used to fill in the media fields of a request.

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use thiserror::Error;

use crate::config::MediaConfig;
use crate::db::MediaType;

#[derive(Debug, Error)]
pub enum MediaError {
    #[error("Media search is not configured")]
    NotConfigured,
    #[error("Media search failed: {0}")]
    Upstream(#[from] reqwest::Error),
}

/// A search hit, normalized across movies and shows
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaSearchResult {
    pub id: i64,
    pub title: String,
    pub poster_path: Option<String>,
    pub year: Option<String>,
    pub media_type: MediaType,
}

#[derive(Debug, Deserialize)]
struct SearchPage {
    #[serde(default)]
    results: Vec<RawResult>,
}

#[derive(Debug, Deserialize)]
struct RawResult {
    id: i64,
    #[serde(default)]
    media_type: Option<String>,
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    poster_path: Option<String>,
    #[serde(default)]
    release_date: Option<String>,
    #[serde(default)]
    first_air_date: Option<String>,
}

impl RawResult {
    /// Map one raw hit; people and other kinds are dropped
    fn normalize(self, searched: Option<MediaType>) -> Option<MediaSearchResult> {
        let media_type = match (searched, self.media_type.as_deref()) {
            (Some(kind), _) => kind,
            (None, Some("movie")) => MediaType::Movie,
            (None, Some("tv")) => MediaType::Tv,
            _ => return None,
        };

        let (title, date) = match media_type {
            MediaType::Movie => (self.title.or(self.name)?, self.release_date),
            MediaType::Tv => (self.name.or(self.title)?, self.first_air_date),
        };
        let year = date.and_then(|d| d.get(..4).map(str::to_string));

        Some(MediaSearchResult {
            id: self.id,
            title,
            poster_path: self.poster_path,
            year,
            media_type,
        })
    }
}

type CacheKey = (Option<MediaType>, String);

pub struct MediaSearch {
    config: MediaConfig,
    client: reqwest::Client,
    cache: DashMap<CacheKey, (Instant, Vec<MediaSearchResult>)>,
}

impl MediaSearch {
    pub fn new(config: MediaConfig) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self {
            config,
            client,
            cache: DashMap::new(),
        }
    }

    pub fn is_configured(&self) -> bool {
        self.config.api_key.as_deref().is_some_and(|k| !k.is_empty())
    }

    fn cached(&self, key: &CacheKey) -> Option<Vec<MediaSearchResult>> {
        let ttl = Duration::from_secs(self.config.cache_ttl_secs);
        let entry = self.cache.get(key)?;
        if entry.0.elapsed() < ttl {
            Some(entry.1.clone())
        } else {
            None
        }
    }

    /// Search movies, shows or both. Results are cached per kind and query.
    pub async fn search(
        &self,
        query: &str,
        media_type: Option<MediaType>,
    ) -> Result<Vec<MediaSearchResult>, MediaError> {
        let api_key = self
            .config
            .api_key
            .as_deref()
            .filter(|k| !k.is_empty())
            .ok_or(MediaError::NotConfigured)?;

        let key = (media_type, query.trim().to_lowercase());
        if let Some(hit) = self.cached(&key) {
            tracing::debug!(query = %key.1, "Media search cache hit");
            return Ok(hit);
        }

        let endpoint = match media_type {
            Some(MediaType::Movie) => "movie",
            Some(MediaType::Tv) => "tv",
            None => "multi",
        };
        let url = format!(
            "{}/search/{}",
            self.config.base_url.trim_end_matches('/'),
            endpoint
        );

        let page: SearchPage = self
            .client
            .get(&url)
            .query(&[
                ("api_key", api_key),
                ("query", query.trim()),
                ("language", self.config.language.as_str()),
                ("include_adult", "false"),
            ])
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        let results: Vec<MediaSearchResult> = page
            .results
            .into_iter()
            .filter_map(|raw| raw.normalize(media_type))
            .collect();

        self.cache.insert(key, (Instant::now(), results.clone()));
        self.prune_cache();
        Ok(results)
    }

    fn prune_cache(&self) {
        let ttl = Duration::from_secs(self.config.cache_ttl_secs);
        self.cache.retain(|_, (at, _)| at.elapsed() < ttl);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_normalize_multi_results() {
        let page: SearchPage = serde_json::from_value(json!({
            "results": [
                {"id": 603, "media_type": "movie", "title": "Matrix", "poster_path": "/m.jpg", "release_date": "1999-03-31"},
                {"id": 1399, "media_type": "tv", "name": "Game of Thrones", "first_air_date": "2011-04-17"},
                {"id": 6384, "media_type": "person", "name": "Keanu Reeves"},
                {"id": 7, "media_type": "movie", "title": "Untitled", "release_date": ""}
            ]
        }))
        .unwrap();

        let results: Vec<MediaSearchResult> = page
            .results
            .into_iter()
            .filter_map(|r| r.normalize(None))
            .collect();

        assert_eq!(results.len(), 3);
        assert_eq!(results[0].year.as_deref(), Some("1999"));
        assert_eq!(results[1].title, "Game of Thrones");
        assert_eq!(results[1].media_type, MediaType::Tv);
        assert_eq!(results[2].year, None);
    }

    #[test]
    fn test_typed_search_keeps_requested_kind() {
        let raw: RawResult = serde_json::from_value(json!({
            "id": 1399, "name": "Game of Thrones", "first_air_date": "2011-04-17"
        }))
        .unwrap();
        let result = raw.normalize(Some(MediaType::Tv)).unwrap();
        assert_eq!(result.media_type, MediaType::Tv);
        assert_eq!(result.year.as_deref(), Some("2011"));
    }

    #[tokio::test]
    async fn test_missing_key_is_not_configured() {
        let search = MediaSearch::new(MediaConfig::default());
        assert!(!search.is_configured());
        assert!(matches!(
            search.search("matrix", None).await,
            Err(MediaError::NotConfigured)
        ));
    }

    #[tokio::test]
    async fn test_cached_results_skip_upstream() {
        let search = MediaSearch::new(MediaConfig {
            api_key: Some("key".to_string()),
            // Nothing listens here; a cache miss would fail
            base_url: "http://127.0.0.1:9".to_string(),
            ..Default::default()
        });
        let hit = vec![MediaSearchResult {
            id: 603,
            title: "Matrix".to_string(),
            poster_path: None,
            year: Some("1999".to_string()),
            media_type: MediaType::Movie,
        }];
        search
            .cache
            .insert((Some(MediaType::Movie), "matrix".to_string()), (Instant::now(), hit.clone()));

        let results = search.search("  Matrix ", Some(MediaType::Movie)).await.unwrap();
        assert_eq!(results, hit);
        assert!(search.search("matrix", None).await.is_err());
    }
}

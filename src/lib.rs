//! Client core for the Anompa vocabulary service: debounced remote search,
//! persisted search history, and the category catalog.

pub mod api;
pub mod catalog;
pub mod data;
pub mod debounce;
pub mod history;
pub mod search;
pub mod view;

pub use api::{ApiConfig, ApiError, ContentApi, HttpContentApi, SearchPage, SearchScope};
pub use catalog::{Catalog, WordDetail};
pub use data::{
    Category, CategoryRef, CategoryWord, HistoryEntry, HistoryEntryInput, MediaKind,
    NavigationIntent, ResultKind, SearchResultEntry,
};
pub use debounce::Debouncer;
pub use history::{
    BlobHistoryStore, BlobStore, CookieFileStore, HistoryConfig, HistoryStore, MemoryBlobStore,
    StoreError,
};
pub use search::{RequestToken, SearchConfig, SearchController, SearchControllerState, SearchHandle};
pub use view::{SearchPhase, SearchSnapshot};

use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Everything needed to talk to one deployment of the service.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    pub api: ApiConfig,
    pub search: SearchConfig,
    pub history: HistoryConfig,
    pub media_host: String,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            api: ApiConfig::default(),
            search: SearchConfig::default(),
            history: HistoryConfig::default(),
            media_host: view::DEFAULT_MEDIA_HOST.to_string(),
        }
    }
}

/// The wired-up pieces a front-end drives.
pub struct Client {
    pub api: Arc<HttpContentApi>,
    pub history: Arc<BlobHistoryStore<CookieFileStore>>,
    pub catalog: Catalog<Arc<HttpContentApi>>,
    config: ClientConfig,
}

pub type Controller = SearchController<Arc<HttpContentApi>, Arc<BlobHistoryStore<CookieFileStore>>>;

impl Client {
    pub fn new(config: ClientConfig) -> Result<Self, ApiError> {
        let api = Arc::new(HttpContentApi::new(&config.api)?);
        let history = Arc::new(config.history.open());
        Ok(Self {
            catalog: Catalog::new(Arc::clone(&api)),
            api,
            history,
            config,
        })
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// A fresh controller for one search screen. Requires a tokio runtime.
    pub fn search_controller(&self) -> Arc<Controller> {
        SearchController::new(
            Arc::clone(&self.api),
            Arc::clone(&self.history),
            self.config.search.clone(),
        )
    }

    pub fn media_url(&self, url: &str) -> String {
        view::resolve_media_url(url, &self.config.media_host)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_fills_missing_sections_with_defaults() {
        let config: ClientConfig = serde_json::from_str(
            r#"{"api": {"base_url": "http://localhost:9000/api/"}, "search": {"debounce_ms": 150}}"#,
        )
        .unwrap();
        assert_eq!(config.api.base_url, "http://localhost:9000/api/");
        assert_eq!(config.api.timeout_ms, api::DEFAULT_TIMEOUT_MS);
        assert_eq!(config.search.debounce_ms, 150);
        assert_eq!(config.search.blur_grace_ms, 200);
        assert_eq!(config.search.scope, SearchScope::All);
        assert!(config.history.seed_defaults);
        assert_eq!(config.media_host, "https://admin.anompa.com");
    }

    #[test]
    fn client_resolves_media_against_configured_host() {
        let dir = tempfile::tempdir().unwrap();
        let config = ClientConfig {
            media_host: "https://media.example".into(),
            history: HistoryConfig {
                path: dir.path().join("history.cookies"),
                seed_defaults: false,
            },
            ..ClientConfig::default()
        };
        let client = Client::new(config).unwrap();
        assert_eq!(client.media_url("/api/gridfs/1"), "https://media.example/api/gridfs/1");
        assert!(client.history.load().is_empty());
        assert_eq!(client.api.base_url().as_str(), api::DEFAULT_API_BASE);
    }
}

use crate::data::{
    Category, CategoryRef, CategoryWord, MediaKind, ResultKind, SearchResultEntry, encode_component,
    non_blank,
};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;
use url::Url;

pub const DEFAULT_API_BASE: &str = "https://admin.anompa.com/api/";
pub const DEFAULT_TIMEOUT_MS: u64 = 10_000;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    pub base_url: String,
    pub timeout_ms: u64,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_API_BASE.to_string(),
            timeout_ms: DEFAULT_TIMEOUT_MS,
        }
    }
}

impl ApiConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("request timed out")]
    Timeout,
    #[error("transport error: {0}")]
    Transport(#[source] reqwest::Error),
    #[error("unexpected status {0}")]
    Status(StatusCode),
    #[error("malformed response: {0}")]
    Decode(String),
    #[error("request rejected by content service: {0}")]
    Rejected(String),
    #[error("invalid url: {0}")]
    InvalidUrl(#[from] url::ParseError),
}

impl From<reqwest::Error> for ApiError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            ApiError::Timeout
        } else if err.is_decode() {
            ApiError::Decode(err.to_string())
        } else {
            ApiError::Transport(err)
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchScope {
    #[default]
    All,
    Words,
    Categories,
}

impl SearchScope {
    pub fn as_str(&self) -> &'static str {
        match self {
            SearchScope::All => "all",
            SearchScope::Words => "words",
            SearchScope::Categories => "categories",
        }
    }
}

impl fmt::Display for SearchScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SearchScope {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "all" => Ok(SearchScope::All),
            "words" | "word" => Ok(SearchScope::Words),
            "categories" | "category" => Ok(SearchScope::Categories),
            other => Err(format!("unknown search scope {other:?}")),
        }
    }
}

/// One page of search hits.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SearchPage {
    pub results: Vec<SearchResultEntry>,
    pub total: usize,
    pub has_more: bool,
    pub next_cursor: Option<String>,
}

/// The remote content service.
#[async_trait]
pub trait ContentApi: Send + Sync + 'static {
    async fn search(
        &self,
        query: &str,
        scope: SearchScope,
        cursor: Option<&str>,
    ) -> Result<SearchPage, ApiError>;

    async fn categories(&self) -> Result<Vec<Category>, ApiError>;

    async fn category_words(&self, category_id: &str) -> Result<Vec<CategoryWord>, ApiError>;
}

#[async_trait]
impl<T: ContentApi + ?Sized> ContentApi for Arc<T> {
    async fn search(
        &self,
        query: &str,
        scope: SearchScope,
        cursor: Option<&str>,
    ) -> Result<SearchPage, ApiError> {
        (**self).search(query, scope, cursor).await
    }

    async fn categories(&self) -> Result<Vec<Category>, ApiError> {
        (**self).categories().await
    }

    async fn category_words(&self, category_id: &str) -> Result<Vec<CategoryWord>, ApiError> {
        (**self).category_words(category_id).await
    }
}

/// `ContentApi` over HTTP+JSON.
#[derive(Debug, Clone)]
pub struct HttpContentApi {
    client: Client,
    base: Url,
}

impl HttpContentApi {
    pub fn new(config: &ApiConfig) -> Result<Self, ApiError> {
        let mut base = config.base_url.trim().to_string();
        if !base.ends_with('/') {
            base.push('/');
        }
        let base = Url::parse(&base)?;
        let client = Client::builder()
            .timeout(config.timeout())
            .build()
            .map_err(ApiError::Transport)?;
        Ok(Self { client, base })
    }

    pub fn base_url(&self) -> &Url {
        &self.base
    }

    fn endpoint(&self, path: &str) -> Result<Url, ApiError> {
        Ok(self.base.join(path)?)
    }

    async fn get_json<T: DeserializeOwned>(&self, url: Url) -> Result<T, ApiError> {
        debug!(%url, "content api request");
        let response = self.client.get(url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(ApiError::Status(status));
        }
        let bytes = response.bytes().await?;
        serde_json::from_slice(&bytes).map_err(|err| ApiError::Decode(err.to_string()))
    }
}

#[async_trait]
impl ContentApi for HttpContentApi {
    async fn search(
        &self,
        query: &str,
        scope: SearchScope,
        cursor: Option<&str>,
    ) -> Result<SearchPage, ApiError> {
        let mut url = self.endpoint("search")?;
        {
            let mut pairs = url.query_pairs_mut();
            pairs.append_pair("query", query);
            pairs.append_pair("scope", scope.as_str());
            if let Some(cursor) = cursor {
                pairs.append_pair("cursor", cursor);
            }
        }
        let envelope: SearchEnvelope = self.get_json(url).await?;
        if !envelope.success {
            return Err(ApiError::Rejected(rejection_message(envelope.message)));
        }
        let page = envelope.data.unwrap_or(envelope.page);
        Ok(page.into_page())
    }

    async fn categories(&self) -> Result<Vec<Category>, ApiError> {
        let url = self.endpoint("category/list")?;
        let envelope: Envelope<Vec<Category>> = self.get_json(url).await?;
        envelope.into_data()
    }

    async fn category_words(&self, category_id: &str) -> Result<Vec<CategoryWord>, ApiError> {
        let url = self.endpoint(&format!(
            "sub-category/single/{}",
            encode_component(category_id)
        ))?;
        let envelope: Envelope<Vec<WireSubCategory>> = self.get_json(url).await?;
        Ok(envelope
            .into_data()?
            .into_iter()
            .map(WireSubCategory::into_word)
            .collect())
    }
}

fn rejection_message(message: Option<String>) -> String {
    non_blank(message).unwrap_or_else(|| "success flag was false".to_string())
}

#[derive(Debug, Deserialize)]
struct Envelope<T> {
    #[serde(default)]
    success: bool,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    data: Option<T>,
}

impl<T> Envelope<T> {
    fn into_data(self) -> Result<T, ApiError> {
        if !self.success {
            return Err(ApiError::Rejected(rejection_message(self.message)));
        }
        self.data
            .ok_or_else(|| ApiError::Decode("response is missing `data`".to_string()))
    }
}

/// Search responses carry the page either at the top level or nested under
/// `data`.
#[derive(Debug, Deserialize)]
struct SearchEnvelope {
    #[serde(default)]
    success: bool,
    #[serde(default)]
    message: Option<String>,
    #[serde(flatten)]
    page: WirePage,
    #[serde(default)]
    data: Option<WirePage>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WirePage {
    #[serde(default)]
    results: Vec<WireSearchResult>,
    #[serde(default)]
    total: Option<usize>,
    #[serde(default)]
    has_more: bool,
    #[serde(default, alias = "cursor")]
    next_cursor: Option<String>,
}

impl WirePage {
    fn into_page(self) -> SearchPage {
        let results: Vec<SearchResultEntry> = self
            .results
            .into_iter()
            .map(WireSearchResult::into_entry)
            .collect();
        SearchPage {
            total: self.total.unwrap_or(results.len()),
            results,
            has_more: self.has_more,
            next_cursor: non_blank(self.next_cursor),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct WireMedia {
    #[serde(default)]
    url: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireSearchResult {
    #[serde(rename = "_id", alias = "id")]
    id: String,
    #[serde(alias = "displayName")]
    name: String,
    #[serde(rename = "type", alias = "kind", default)]
    kind: Option<String>,
    #[serde(rename = "chickasawAnalytical", alias = "analyticalText", default)]
    analytical: Option<String>,
    #[serde(rename = "language", alias = "secondaryText", default)]
    secondary: Option<String>,
    #[serde(default)]
    media_url: Option<String>,
    #[serde(default)]
    media_type: Option<String>,
    #[serde(default)]
    video: Option<WireMedia>,
    #[serde(rename = "category", alias = "categoryRef", default)]
    category: Option<CategoryRef>,
}

impl WireSearchResult {
    fn into_entry(self) -> SearchResultEntry {
        let video_url = self.video.and_then(|video| non_blank(video.url));
        let media_kind = MediaKind::detect(self.media_type.as_deref(), video_url.is_some());
        let media_url = non_blank(self.media_url).or(video_url);
        SearchResultEntry {
            id: self.id,
            display_name: self.name,
            kind: ResultKind::from_wire(self.kind.as_deref()),
            analytical_text: non_blank(self.analytical),
            secondary_text: non_blank(self.secondary),
            media_url,
            media_kind,
            category_ref: self.category.and_then(CategoryRef::non_empty),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireSubCategory {
    #[serde(rename = "_id", alias = "id")]
    id: String,
    name: String,
    #[serde(rename = "chickasawAnalytical", default)]
    analytical: Option<String>,
    #[serde(rename = "language", default)]
    secondary: Option<String>,
    #[serde(default)]
    audio_url: Option<String>,
    #[serde(default)]
    video_url: Option<String>,
    #[serde(default)]
    media_type: Option<String>,
    #[serde(default)]
    category: Option<CategoryRef>,
}

impl WireSubCategory {
    fn into_word(self) -> CategoryWord {
        let audio = non_blank(self.audio_url);
        let video = non_blank(self.video_url);
        let media_kind = MediaKind::detect(self.media_type.as_deref(), video.is_some() && audio.is_none());
        let media_url = match media_kind {
            MediaKind::Video => video.or(audio),
            MediaKind::Audio => audio.or(video),
        };
        CategoryWord {
            id: self.id,
            name: self.name,
            analytical_text: non_blank(self.analytical),
            secondary_text: non_blank(self.secondary),
            media_url,
            media_kind,
            category_ref: self.category.and_then(CategoryRef::non_empty),
        }
    }
}

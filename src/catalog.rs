use crate::api::{ApiError, ContentApi, SearchScope};
use crate::data::{Category, CategoryWord, ResultKind, SearchResultEntry};
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, warn};

/// Word detail resolved by name. `entry` is `None` when the lookup failed or
/// matched nothing, in which case only the name is known.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WordDetail {
    pub name: String,
    pub entry: Option<SearchResultEntry>,
}

impl WordDetail {
    pub fn name_only(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            entry: None,
        }
    }

    pub fn is_resolved(&self) -> bool {
        self.entry.is_some()
    }
}

/// Category directory and word lookups on top of a [`ContentApi`].
///
/// The category list is fetched once and shared until [`Catalog::refresh`];
/// failed fetches are not remembered.
pub struct Catalog<A> {
    api: A,
    categories: Mutex<Option<Arc<[Category]>>>,
}

impl<A: ContentApi> Catalog<A> {
    pub fn new(api: A) -> Self {
        Self {
            api,
            categories: Mutex::new(None),
        }
    }

    pub fn api(&self) -> &A {
        &self.api
    }

    pub async fn categories(&self) -> Result<Arc<[Category]>, ApiError> {
        let mut cached = self.categories.lock().await;
        if let Some(categories) = cached.as_ref() {
            return Ok(Arc::clone(categories));
        }
        let fetched: Arc<[Category]> = Arc::from(self.api.categories().await?);
        debug!(count = fetched.len(), "category directory loaded");
        *cached = Some(Arc::clone(&fetched));
        Ok(fetched)
    }

    pub async fn refresh(&self) -> Result<Arc<[Category]>, ApiError> {
        self.categories.lock().await.take();
        self.categories().await
    }

    pub async fn category(&self, id: &str) -> Result<Option<Category>, ApiError> {
        let categories = self.categories().await?;
        Ok(categories.iter().find(|category| category.id == id).cloned())
    }

    pub async fn category_words(&self, category_id: &str) -> Result<Vec<CategoryWord>, ApiError> {
        self.api.category_words(category_id).await
    }

    /// Finds a word by its display name.
    ///
    /// An exact (case-insensitive) word match in the hinted category wins,
    /// then any exact word match, then the first hit. Failures degrade to a
    /// name-only detail.
    pub async fn lookup_word(&self, name: &str, category_hint: Option<&str>) -> WordDetail {
        let page = match self.api.search(name, SearchScope::All, None).await {
            Ok(page) => page,
            Err(err) => {
                warn!(error = %err, word = %name, "word lookup failed");
                return WordDetail::name_only(name);
            }
        };
        let results = page.results;
        let exact = |entry: &&SearchResultEntry| {
            entry.kind == ResultKind::Word && entry.display_name.eq_ignore_ascii_case(name.trim())
        };
        let in_hint = |entry: &&SearchResultEntry| match (category_hint, &entry.category_ref) {
            (Some(hint), Some(category)) => category.name.eq_ignore_ascii_case(hint),
            _ => false,
        };
        let chosen = results
            .iter()
            .filter(exact)
            .find(in_hint)
            .or_else(|| results.iter().find(exact))
            .or_else(|| results.first())
            .cloned();
        if chosen.is_none() {
            debug!(word = %name, "word lookup matched nothing");
        }
        WordDetail {
            name: name.to_string(),
            entry: chosen,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::SearchPage;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    #[derive(Default)]
    struct CountingApi {
        category_calls: AtomicUsize,
        fail_categories: AtomicBool,
        fail_search: bool,
    }

    #[async_trait]
    impl ContentApi for CountingApi {
        async fn search(
            &self,
            query: &str,
            _scope: SearchScope,
            _cursor: Option<&str>,
        ) -> Result<SearchPage, ApiError> {
            if self.fail_search {
                return Err(ApiError::Timeout);
            }
            let results = match query {
                "fish" => vec![
                    SearchResultEntry::category("c9", "Fish"),
                    SearchResultEntry::word("w1", "fish").with_category("c1", "Animals"),
                    SearchResultEntry::word("w2", "Fish").with_category("c2", "Food"),
                ],
                "wolf" => vec![SearchResultEntry::word("w3", "gray wolf")],
                _ => Vec::new(),
            };
            Ok(SearchPage {
                total: results.len(),
                results,
                ..SearchPage::default()
            })
        }

        async fn categories(&self) -> Result<Vec<Category>, ApiError> {
            self.category_calls.fetch_add(1, Ordering::SeqCst);
            if self.fail_categories.load(Ordering::SeqCst) {
                return Err(ApiError::Rejected("unavailable".into()));
            }
            Ok(vec![
                Category {
                    id: "c1".into(),
                    name: "Animals".into(),
                    word_count: 12,
                },
                Category {
                    id: "c2".into(),
                    name: "Food".into(),
                    word_count: 4,
                },
            ])
        }

        async fn category_words(&self, _category_id: &str) -> Result<Vec<CategoryWord>, ApiError> {
            Ok(Vec::new())
        }
    }

    #[tokio::test]
    async fn categories_are_fetched_once_until_refresh() {
        let catalog = Catalog::new(CountingApi::default());
        let first = catalog.categories().await.unwrap();
        let second = catalog.categories().await.unwrap();
        assert_eq!(first.len(), 2);
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(catalog.api().category_calls.load(Ordering::SeqCst), 1);

        catalog.refresh().await.unwrap();
        assert_eq!(catalog.api().category_calls.load(Ordering::SeqCst), 2);
        let food = catalog.category("c2").await.unwrap();
        assert_eq!(food.map(|category| category.word_count), Some(4));
        assert_eq!(catalog.api().category_calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn failed_fetch_is_not_cached() {
        let catalog = Catalog::new(CountingApi::default());
        catalog.api().fail_categories.store(true, Ordering::SeqCst);
        assert!(catalog.categories().await.is_err());
        catalog.api().fail_categories.store(false, Ordering::SeqCst);
        assert_eq!(catalog.categories().await.unwrap().len(), 2);
        assert_eq!(catalog.api().category_calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn lookup_prefers_exact_word_in_hinted_category() {
        let catalog = Catalog::new(CountingApi::default());
        let hinted = catalog.lookup_word("fish", Some("food")).await;
        assert_eq!(hinted.entry.map(|entry| entry.id).as_deref(), Some("w2"));

        let unhinted = catalog.lookup_word("fish", None).await;
        assert_eq!(unhinted.entry.map(|entry| entry.id).as_deref(), Some("w1"));

        let loose = catalog.lookup_word("wolf", None).await;
        assert_eq!(loose.entry.map(|entry| entry.id).as_deref(), Some("w3"));
    }

    #[tokio::test]
    async fn lookup_falls_back_to_name_only() {
        let catalog = Catalog::new(CountingApi::default());
        let missing = catalog.lookup_word("unknown", None).await;
        assert_eq!(missing, WordDetail::name_only("unknown"));

        let failing = Catalog::new(CountingApi {
            fail_search: true,
            ..CountingApi::default()
        });
        let detail = failing.lookup_word("fish", None).await;
        assert!(!detail.is_resolved());
        assert_eq!(detail.name, "fish");
    }
}

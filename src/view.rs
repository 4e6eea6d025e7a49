//! What a screen renders from the search controller, plus the helpers that
//! belong at the presentation boundary rather than in the core.

use crate::data::SearchResultEntry;
use std::sync::Arc;
use unicode_normalization::UnicodeNormalization;

pub const DEFAULT_MEDIA_HOST: &str = "https://admin.anompa.com";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchPhase {
    Idle,
    Typing,
    Searching,
    Results,
}

/// Immutable view of the controller state, published after every change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchSnapshot {
    pub query_text: String,
    pub is_loading: bool,
    pub results_visible: bool,
    pub debounce_pending: bool,
    pub results: Arc<[SearchResultEntry]>,
}

impl Default for SearchSnapshot {
    fn default() -> Self {
        Self {
            query_text: String::new(),
            is_loading: false,
            results_visible: false,
            debounce_pending: false,
            results: Arc::from(Vec::new()),
        }
    }
}

impl SearchSnapshot {
    pub fn phase(&self) -> SearchPhase {
        if self.query_text.is_empty() {
            SearchPhase::Idle
        } else if self.is_loading {
            SearchPhase::Searching
        } else if self.debounce_pending {
            SearchPhase::Typing
        } else {
            SearchPhase::Results
        }
    }

    pub fn is_settled(&self) -> bool {
        !self.is_loading && !self.debounce_pending
    }

    /// Message for a visible, settled, empty result list.
    pub fn empty_message(&self) -> Option<String> {
        let showing_nothing = self.results_visible && self.is_settled() && self.results.is_empty();
        (showing_nothing && !self.query_text.trim().is_empty())
            .then(|| empty_results_message(&self.query_text))
    }
}

pub fn empty_results_message(query: &str) -> String {
    format!("No results found for \"{query}\"")
}

/// Absolute URLs pass through; anything else is a path on the media host.
pub fn resolve_media_url(url: &str, media_host: &str) -> String {
    let url = url.trim();
    if url.starts_with("http://") || url.starts_with("https://") {
        return url.to_string();
    }
    let host = media_host.trim_end_matches('/');
    if url.starts_with('/') {
        format!("{host}{url}")
    } else {
        format!("{host}/{url}")
    }
}

/// NFC-composes text so combining diacritics render as single glyphs.
pub fn normalize_text(text: &str) -> String {
    text.nfc().collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn media_urls_resolve_against_host() {
        assert_eq!(
            resolve_media_url("/api/gridfs/68f9", DEFAULT_MEDIA_HOST),
            "https://admin.anompa.com/api/gridfs/68f9"
        );
        assert_eq!(
            resolve_media_url("api/gridfs/1", "https://media.example/"),
            "https://media.example/api/gridfs/1"
        );
        assert_eq!(
            resolve_media_url("https://cdn.example/a.mp3", DEFAULT_MEDIA_HOST),
            "https://cdn.example/a.mp3"
        );
    }

    #[test]
    fn text_is_nfc_composed() {
        let decomposed = "a\u{0301}lhpi\u{0301}sa";
        let composed = normalize_text(decomposed);
        assert_eq!(composed, "\u{00e1}lhp\u{00ed}sa");
        assert_eq!(normalize_text(""), "");
    }

    #[test]
    fn phases_follow_state() {
        let mut snapshot = SearchSnapshot::default();
        assert_eq!(snapshot.phase(), SearchPhase::Idle);
        snapshot.query_text = "cat".into();
        snapshot.debounce_pending = true;
        assert_eq!(snapshot.phase(), SearchPhase::Typing);
        snapshot.debounce_pending = false;
        snapshot.is_loading = true;
        assert_eq!(snapshot.phase(), SearchPhase::Searching);
        snapshot.is_loading = false;
        assert_eq!(snapshot.phase(), SearchPhase::Results);
    }

    #[test]
    fn empty_message_echoes_query() {
        let snapshot = SearchSnapshot {
            query_text: "zzz".into(),
            results_visible: true,
            ..SearchSnapshot::default()
        };
        assert_eq!(
            snapshot.empty_message().as_deref(),
            Some("No results found for \"zzz\"")
        );
        let hidden = SearchSnapshot {
            results_visible: false,
            ..snapshot
        };
        assert_eq!(hidden.empty_message(), None);
    }
}

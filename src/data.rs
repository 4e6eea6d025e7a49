use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, utf8_percent_encode};
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;

/// Characters left untouched by `encodeURIComponent`; everything else is escaped.
pub(crate) const COMPONENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'!')
    .remove(b'~')
    .remove(b'*')
    .remove(b'\'')
    .remove(b'(')
    .remove(b')');

pub(crate) fn encode_component(value: &str) -> String {
    utf8_percent_encode(value, COMPONENT).to_string()
}

pub(crate) fn non_blank(value: Option<String>) -> Option<String> {
    value.filter(|text| !text.trim().is_empty())
}

fn blank_as_none<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Option::<String>::deserialize(deserializer).map(non_blank)
}

fn empty_category_as_none<'de, D>(deserializer: D) -> Result<Option<CategoryRef>, D::Error>
where
    D: Deserializer<'de>,
{
    Option::<CategoryRef>::deserialize(deserializer).map(|value| value.and_then(CategoryRef::non_empty))
}

/// Whether a search hit points at a single word or at a whole category.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResultKind {
    #[default]
    Word,
    Category,
}

impl ResultKind {
    /// Interprets the API's free-form `type` field. Anything that is not
    /// `category` is treated as a word.
    pub fn from_wire(value: Option<&str>) -> Self {
        match value {
            Some(kind) if kind.trim().eq_ignore_ascii_case("category") => ResultKind::Category,
            _ => ResultKind::Word,
        }
    }
}

impl fmt::Display for ResultKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResultKind::Word => write!(f, "word"),
            ResultKind::Category => write!(f, "category"),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    #[default]
    Audio,
    Video,
}

impl MediaKind {
    pub fn detect(media_type: Option<&str>, has_video: bool) -> Self {
        let declared_video = media_type
            .map(|kind| kind.to_ascii_lowercase().contains("video"))
            .unwrap_or(false);
        if declared_video || has_video {
            MediaKind::Video
        } else {
            MediaKind::Audio
        }
    }
}

/// Back-reference from a word to the category that owns it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryRef {
    #[serde(rename = "_id", alias = "id", default)]
    pub id: String,
    #[serde(default)]
    pub name: String,
}

impl CategoryRef {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
        }
    }

    /// The API sends `{"_id": "", "name": ""}` for "no category".
    pub fn non_empty(self) -> Option<Self> {
        if self.id.trim().is_empty() && self.name.trim().is_empty() {
            None
        } else {
            Some(self)
        }
    }
}

/// One matched item from the search endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchResultEntry {
    pub id: String,
    pub display_name: String,
    pub kind: ResultKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub analytical_text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secondary_text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub media_url: Option<String>,
    #[serde(default)]
    pub media_kind: MediaKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category_ref: Option<CategoryRef>,
}

impl SearchResultEntry {
    pub fn word(id: impl Into<String>, display_name: impl Into<String>) -> Self {
        Self::new(id, display_name, ResultKind::Word)
    }

    pub fn category(id: impl Into<String>, display_name: impl Into<String>) -> Self {
        Self::new(id, display_name, ResultKind::Category)
    }

    fn new(id: impl Into<String>, display_name: impl Into<String>, kind: ResultKind) -> Self {
        Self {
            id: id.into(),
            display_name: display_name.into(),
            kind,
            analytical_text: None,
            secondary_text: None,
            media_url: None,
            media_kind: MediaKind::Audio,
            category_ref: None,
        }
    }

    pub fn with_category(mut self, id: impl Into<String>, name: impl Into<String>) -> Self {
        self.category_ref = CategoryRef::new(id, name).non_empty();
        self
    }

    pub fn with_texts(mut self, analytical: impl Into<String>, secondary: impl Into<String>) -> Self {
        self.analytical_text = non_blank(Some(analytical.into()));
        self.secondary_text = non_blank(Some(secondary.into()));
        self
    }

    pub fn with_media(mut self, url: impl Into<String>, kind: MediaKind) -> Self {
        self.media_url = non_blank(Some(url.into()));
        self.media_kind = kind;
        self
    }

    /// Where selecting this result should take the user.
    pub fn navigation(&self) -> NavigationIntent {
        match self.kind {
            ResultKind::Category => NavigationIntent::NavigateToCategory {
                id: self.id.clone(),
                name: self.display_name.clone(),
            },
            ResultKind::Word => NavigationIntent::NavigateToWord {
                name: self.display_name.clone(),
                category_hint: category_hint(self.category_ref.as_ref()),
            },
        }
    }
}

fn category_hint(category: Option<&CategoryRef>) -> Option<String> {
    category
        .map(|category| category.name.clone())
        .filter(|name| !name.trim().is_empty())
}

/// A previously selected result, persisted across sessions.
///
/// The serialized shape matches the blob written by the web front-end, so a
/// history cookie can be shared between the two.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub id: String,
    #[serde(rename = "name")]
    pub display_name: String,
    #[serde(
        rename = "chickasawAnalytical",
        default,
        deserialize_with = "blank_as_none",
        skip_serializing_if = "Option::is_none"
    )]
    pub analytical_text: Option<String>,
    #[serde(
        rename = "language",
        default,
        deserialize_with = "blank_as_none",
        skip_serializing_if = "Option::is_none"
    )]
    pub secondary_text: Option<String>,
    #[serde(
        rename = "mediaUrl",
        default,
        deserialize_with = "blank_as_none",
        skip_serializing_if = "Option::is_none"
    )]
    pub media_url: Option<String>,
    #[serde(
        rename = "category",
        default,
        deserialize_with = "empty_category_as_none",
        skip_serializing_if = "Option::is_none"
    )]
    pub category_ref: Option<CategoryRef>,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<ResultKind>,
    #[serde(rename = "timestamp")]
    pub selected_at: u64,
}

impl HistoryEntry {
    pub fn from_input(input: HistoryEntryInput, selected_at: u64) -> Self {
        Self {
            id: input.id,
            display_name: input.display_name,
            analytical_text: input.analytical_text,
            secondary_text: input.secondary_text,
            media_url: input.media_url,
            category_ref: input.category_ref,
            kind: input.kind,
            selected_at,
        }
    }

    /// Entries written without a `type` are classified the way the web
    /// front-end does: no linguistic text and no owning category means the
    /// entry is itself a category.
    pub fn kind(&self) -> ResultKind {
        self.kind.unwrap_or_else(|| {
            let owning_category = self
                .category_ref
                .as_ref()
                .map(|category| !category.id.trim().is_empty())
                .unwrap_or(false);
            if self.analytical_text.is_none() && self.secondary_text.is_none() && !owning_category
            {
                ResultKind::Category
            } else {
                ResultKind::Word
            }
        })
    }

    pub fn navigation(&self) -> NavigationIntent {
        match self.kind() {
            ResultKind::Category => NavigationIntent::NavigateToCategory {
                id: self.id.clone(),
                name: self.display_name.clone(),
            },
            ResultKind::Word => NavigationIntent::NavigateToWord {
                name: self.display_name.clone(),
                category_hint: category_hint(self.category_ref.as_ref()),
            },
        }
    }
}

/// A history record before it has been stamped with a selection time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryEntryInput {
    pub id: String,
    pub display_name: String,
    pub analytical_text: Option<String>,
    pub secondary_text: Option<String>,
    pub media_url: Option<String>,
    pub category_ref: Option<CategoryRef>,
    pub kind: Option<ResultKind>,
}

impl From<&SearchResultEntry> for HistoryEntryInput {
    fn from(entry: &SearchResultEntry) -> Self {
        Self {
            id: entry.id.clone(),
            display_name: entry.display_name.clone(),
            analytical_text: entry.analytical_text.clone(),
            secondary_text: entry.secondary_text.clone(),
            media_url: entry.media_url.clone(),
            category_ref: entry.category_ref.clone(),
            kind: Some(entry.kind),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Category {
    #[serde(rename = "_id", alias = "id")]
    pub id: String,
    pub name: String,
    #[serde(rename = "wordCount", default)]
    pub word_count: u32,
}

/// One row of a category's word list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CategoryWord {
    pub id: String,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub analytical_text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub secondary_text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub media_url: Option<String>,
    pub media_kind: MediaKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category_ref: Option<CategoryRef>,
}

impl CategoryWord {
    pub fn navigation(&self) -> NavigationIntent {
        NavigationIntent::NavigateToWord {
            name: self.name.clone(),
            category_hint: category_hint(self.category_ref.as_ref()),
        }
    }
}

/// Where the view layer should go next. The core never navigates itself.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "intent", rename_all = "snake_case")]
pub enum NavigationIntent {
    NavigateToCategory {
        id: String,
        name: String,
    },
    NavigateToWord {
        name: String,
        category_hint: Option<String>,
    },
}

impl NavigationIntent {
    /// Browser route for this intent, with path and query components escaped.
    pub fn route(&self) -> String {
        match self {
            NavigationIntent::NavigateToCategory { id, name } => {
                format!("/category/{}/{}", encode_component(id), encode_component(name))
            }
            NavigationIntent::NavigateToWord {
                name,
                category_hint: Some(category),
            } => format!(
                "/word/{}?category={}",
                encode_component(name),
                encode_component(category)
            ),
            NavigationIntent::NavigateToWord {
                name,
                category_hint: None,
            } => format!("/word/{}", encode_component(name)),
        }
    }
}

impl fmt::Display for NavigationIntent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NavigationIntent::NavigateToCategory { name, .. } => write!(f, "category {name}"),
            NavigationIntent::NavigateToWord {
                name,
                category_hint: Some(category),
            } => write!(f, "word {name} ({category})"),
            NavigationIntent::NavigateToWord { name, .. } => write!(f, "word {name}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn category_result_navigates_to_category() {
        let entry = SearchResultEntry::category("c1", "Animals");
        assert_eq!(
            entry.navigation(),
            NavigationIntent::NavigateToCategory {
                id: "c1".into(),
                name: "Animals".into()
            }
        );
    }

    #[test]
    fn word_result_carries_category_hint() {
        let entry = SearchResultEntry::word("w1", "wolf").with_category("c1", "Animals");
        assert_eq!(
            entry.navigation(),
            NavigationIntent::NavigateToWord {
                name: "wolf".into(),
                category_hint: Some("Animals".into())
            }
        );
        let bare = SearchResultEntry::word("w2", "fish");
        assert_eq!(
            bare.navigation(),
            NavigationIntent::NavigateToWord {
                name: "fish".into(),
                category_hint: None
            }
        );
    }

    #[test]
    fn routes_escape_components() {
        let intent = NavigationIntent::NavigateToWord {
            name: "good morning".into(),
            category_hint: Some("Plants & Trees".into()),
        };
        assert_eq!(intent.route(), "/word/good%20morning?category=Plants%20%26%20Trees");
        let category = NavigationIntent::NavigateToCategory {
            id: "68f9".into(),
            name: "Fruits & Foods".into(),
        };
        assert_eq!(category.route(), "/category/68f9/Fruits%20%26%20Foods");
    }

    #[test]
    fn history_entry_reads_front_end_blob() {
        let raw = r#"[
            {"id":"68f9cafd","name":"Animals","chickasawAnalytical":"","language":"","mediaUrl":"",
             "category":{"_id":"","name":""},"timestamp":1761307531657},
            {"id":"68f9e0f7","name":"wolf","chickasawAnalytical":"nashoba","language":"nashoba",
             "mediaUrl":"/api/gridfs/68f9d874","category":{"_id":"68f9cafd","name":"Animals"},
             "timestamp":1761307582152}
        ]"#;
        let entries: Vec<HistoryEntry> = serde_json::from_str(raw).unwrap();
        assert_eq!(entries[0].analytical_text, None);
        assert_eq!(entries[0].category_ref, None);
        assert_eq!(entries[0].kind(), ResultKind::Category);
        assert_eq!(entries[1].kind(), ResultKind::Word);
        assert_eq!(
            entries[1].navigation().route(),
            "/word/wolf?category=Animals"
        );
    }

    #[test]
    fn explicit_kind_wins_over_heuristic() {
        let input = HistoryEntryInput::from(&SearchResultEntry::word("w9", "hello"));
        let entry = HistoryEntry::from_input(input, 1);
        assert_eq!(entry.kind(), ResultKind::Word);
        let json = serde_json::to_value(&entry).unwrap();
        assert_eq!(json["type"], "word");
        assert_eq!(json["name"], "hello");
        assert!(json.get("chickasawAnalytical").is_none());
    }

    #[test]
    fn media_kind_detection() {
        assert_eq!(MediaKind::detect(Some("video/mp4"), false), MediaKind::Video);
        assert_eq!(MediaKind::detect(Some("audio"), true), MediaKind::Video);
        assert_eq!(MediaKind::detect(None, false), MediaKind::Audio);
    }
}

use crate::data::{CategoryRef, HistoryEntry, HistoryEntryInput, encode_component};
use cookie::Cookie;
use cookie::time::{Duration as CookieDuration, OffsetDateTime};
use once_cell::sync::Lazy;
use parking_lot::{Mutex, RwLock};
use percent_encoding::percent_decode_str;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use tempfile::NamedTempFile;
use thiserror::Error;
use tracing::{debug, warn};

pub const SEARCH_HISTORY_KEY: &str = "chickasaw_search_history";
pub const MAX_HISTORY: usize = 10;
const COOKIE_TTL_DAYS: i64 = 365;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("history storage io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("history serialization error: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error("stored value for {0:?} is not valid percent-encoded utf-8")]
    Encoding(String),
}

/// A client-scoped key/value store holding opaque string blobs.
pub trait BlobStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError>;
    fn set(&self, key: &str, value: &str) -> Result<(), StoreError>;
    fn delete(&self, key: &str) -> Result<(), StoreError>;
}

#[derive(Debug, Default)]
pub struct MemoryBlobStore {
    blobs: RwLock<HashMap<String, String>>,
}

impl MemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_blob(key: &str, value: &str) -> Self {
        let store = Self::default();
        store.blobs.write().insert(key.to_string(), value.to_string());
        store
    }
}

impl BlobStore for MemoryBlobStore {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        Ok(self.blobs.read().get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        self.blobs.write().insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn delete(&self, key: &str) -> Result<(), StoreError> {
        self.blobs.write().remove(key);
        Ok(())
    }
}

/// Persists blobs as cookies in a Set-Cookie-per-line file.
///
/// Values are percent-encoded and every write refreshes a one-year expiry;
/// expired cookies are dropped on read. Writers in other processes sharing
/// the file win by last write.
#[derive(Debug)]
pub struct CookieFileStore {
    path: PathBuf,
    lock: Mutex<()>,
}

impl CookieFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_jar(&self) -> Result<BTreeMap<String, Cookie<'static>>, StoreError> {
        let text = match fs::read_to_string(&self.path) {
            Ok(text) => text,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(BTreeMap::new()),
            Err(err) => return Err(err.into()),
        };
        let now = OffsetDateTime::now_utc();
        let mut jar = BTreeMap::new();
        for line in text.lines().map(str::trim).filter(|line| !line.is_empty()) {
            match Cookie::parse(line.to_string()) {
                Ok(cookie) => {
                    if cookie.expires_datetime().is_some_and(|at| at <= now) {
                        debug!(name = cookie.name(), "dropping expired cookie");
                        continue;
                    }
                    jar.insert(cookie.name().to_string(), cookie);
                }
                Err(err) => warn!(error = %err, path = %self.path.display(), "skipping malformed cookie line"),
            }
        }
        Ok(jar)
    }

    fn write_jar(&self, jar: &BTreeMap<String, Cookie<'static>>) -> Result<(), StoreError> {
        let parent = self
            .path
            .parent()
            .filter(|parent| !parent.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        fs::create_dir_all(parent)?;
        let mut body = String::new();
        for cookie in jar.values() {
            body.push_str(&cookie.to_string());
            body.push('\n');
        }
        let mut staging = NamedTempFile::new_in(parent)?;
        staging.write_all(body.as_bytes())?;
        staging
            .persist(&self.path)
            .map_err(|err| StoreError::Io(err.error))?;
        Ok(())
    }
}

impl BlobStore for CookieFileStore {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let _guard = self.lock.lock();
        let jar = self.read_jar()?;
        match jar.get(key) {
            Some(cookie) => percent_decode_str(cookie.value())
                .decode_utf8()
                .map(|value| Some(value.into_owned()))
                .map_err(|_| StoreError::Encoding(key.to_string())),
            None => Ok(None),
        }
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        let _guard = self.lock.lock();
        let mut jar = self.read_jar()?;
        let cookie = Cookie::build((key.to_string(), encode_component(value)))
            .path("/")
            .expires(OffsetDateTime::now_utc() + CookieDuration::days(COOKIE_TTL_DAYS))
            .build();
        jar.insert(key.to_string(), cookie);
        self.write_jar(&jar)
    }

    fn delete(&self, key: &str) -> Result<(), StoreError> {
        let _guard = self.lock.lock();
        let mut jar = self.read_jar()?;
        if jar.remove(key).is_some() {
            self.write_jar(&jar)?;
        }
        Ok(())
    }
}

/// Recently selected search results.
///
/// Implementations never fail towards the caller: storage problems are
/// logged and surface as an empty history.
pub trait HistoryStore: Send + Sync + 'static {
    fn load(&self) -> Vec<HistoryEntry>;
    fn add(&self, input: HistoryEntryInput);
    fn clear(&self);
}

impl<T: HistoryStore + ?Sized> HistoryStore for Arc<T> {
    fn load(&self) -> Vec<HistoryEntry> {
        (**self).load()
    }

    fn add(&self, input: HistoryEntryInput) {
        (**self).add(input)
    }

    fn clear(&self) {
        (**self).clear()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HistoryConfig {
    pub path: PathBuf,
    pub seed_defaults: bool,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            path: default_history_path(),
            seed_defaults: true,
        }
    }
}

impl HistoryConfig {
    pub fn open(&self) -> BlobHistoryStore<CookieFileStore> {
        BlobHistoryStore::new(CookieFileStore::new(&self.path)).with_seed_defaults(self.seed_defaults)
    }
}

/// `<data dir>/anompa/history.cookies`, falling back to the home directory.
pub fn default_history_path() -> PathBuf {
    dirs::data_dir()
        .or_else(dirs::home_dir)
        .unwrap_or_else(|| PathBuf::from("."))
        .join("anompa")
        .join("history.cookies")
}

/// `HistoryStore` persisted as one JSON blob under [`SEARCH_HISTORY_KEY`].
#[derive(Debug)]
pub struct BlobHistoryStore<B> {
    blob: B,
    seed_defaults: bool,
}

impl<B: BlobStore> BlobHistoryStore<B> {
    pub fn new(blob: B) -> Self {
        Self {
            blob,
            seed_defaults: true,
        }
    }

    pub fn with_seed_defaults(mut self, seed_defaults: bool) -> Self {
        self.seed_defaults = seed_defaults;
        self
    }

    pub fn blob(&self) -> &B {
        &self.blob
    }

    fn persist(&self, entries: &[HistoryEntry]) {
        let encoded = match serde_json::to_string(entries) {
            Ok(encoded) => encoded,
            Err(err) => {
                warn!(error = %err, "failed to serialize search history");
                return;
            }
        };
        if let Err(err) = self.blob.set(SEARCH_HISTORY_KEY, &encoded) {
            warn!(error = %err, "failed to persist search history");
        }
    }
}

impl<B: BlobStore + 'static> HistoryStore for BlobHistoryStore<B> {
    fn load(&self) -> Vec<HistoryEntry> {
        let stored = match self.blob.get(SEARCH_HISTORY_KEY) {
            Ok(stored) => stored,
            Err(err) => {
                warn!(error = %err, "failed to read search history");
                return Vec::new();
            }
        };
        let mut entries = match stored.as_deref().map(str::trim) {
            None | Some("") => Vec::new(),
            Some(raw) => match serde_json::from_str::<Vec<HistoryEntry>>(raw) {
                Ok(entries) => entries,
                Err(err) => {
                    warn!(error = %err, "discarding malformed search history");
                    return Vec::new();
                }
            },
        };
        if entries.len() > MAX_HISTORY {
            debug!(stored = entries.len(), "trimming oversized search history");
            entries.truncate(MAX_HISTORY);
        }
        if entries.is_empty() && self.seed_defaults {
            let defaults = DEFAULT_HISTORY.clone();
            self.persist(&defaults);
            debug!(count = defaults.len(), "seeded default search history");
            return defaults;
        }
        entries
    }

    fn add(&self, input: HistoryEntryInput) {
        let mut entries = self.load();
        entries.retain(|entry| entry.id != input.id);
        let newest = entries.iter().map(|entry| entry.selected_at).max().unwrap_or(0);
        let selected_at = now_millis().max(newest.saturating_add(1));
        entries.insert(0, HistoryEntry::from_input(input, selected_at));
        entries.truncate(MAX_HISTORY);
        self.persist(&entries);
    }

    fn clear(&self) {
        if let Err(err) = self.blob.delete(SEARCH_HISTORY_KEY) {
            warn!(error = %err, "failed to clear search history");
        }
    }
}

fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_millis() as u64)
        .unwrap_or(0)
}

fn seeded(
    id: &str,
    name: &str,
    analytical: &str,
    secondary: &str,
    media: &str,
    category: Option<(&str, &str)>,
    selected_at: u64,
) -> HistoryEntry {
    let text = |value: &str| (!value.is_empty()).then(|| value.to_string());
    HistoryEntry {
        id: id.to_string(),
        display_name: name.to_string(),
        analytical_text: text(analytical),
        secondary_text: text(secondary),
        media_url: text(media),
        category_ref: category.map(|(id, name)| CategoryRef::new(id, name)),
        kind: None,
        selected_at,
    }
}

/// Shortcuts shown before the user has selected anything.
pub static DEFAULT_HISTORY: Lazy<Vec<HistoryEntry>> = Lazy::new(|| {
    const ANIMALS: (&str, &str) = ("68f9cafd58872957ec816c51", "Animals");
    vec![
        seeded(
            "68f9e0f758872957ec816f5a",
            "wolf",
            "nashoba",
            "nashoba",
            "/api/gridfs/68f9d87458872957ec816e10",
            Some(ANIMALS),
            1_761_307_582_152,
        ),
        seeded(
            "68f9e0f558872957ec816f1c",
            "bird",
            "foshi?",
            "foshi",
            "/api/gridfs/68f9d85d58872957ec816dcc",
            Some(ANIMALS),
            1_761_307_565_184,
        ),
        seeded(
            "68f9e0f658872957ec816f32",
            "fish",
            "nani?",
            "nunni",
            "/api/gridfs/68f9d86658872957ec816de4",
            Some(ANIMALS),
            1_761_307_543_233,
        ),
        seeded(ANIMALS.0, ANIMALS.1, "", "", "", None, 1_761_307_531_657),
        seeded(
            "68f9e0f558872957ec816f26",
            "chicken",
            "akanka?",
            "akaka",
            "/api/gridfs/68f9d86058872957ec816dd6",
            Some(ANIMALS),
            1_761_307_518_898,
        ),
    ]
});

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{NavigationIntent, ResultKind, SearchResultEntry};

    fn input(id: &str) -> HistoryEntryInput {
        HistoryEntryInput::from(&SearchResultEntry::word(id, format!("word-{id}")))
    }

    fn unseeded() -> BlobHistoryStore<MemoryBlobStore> {
        BlobHistoryStore::new(MemoryBlobStore::new()).with_seed_defaults(false)
    }

    #[test]
    fn first_load_seeds_defaults_once() {
        let store = BlobHistoryStore::new(MemoryBlobStore::new());
        let first = store.load();
        assert_eq!(first.len(), 5);
        assert!(store.blob().get(SEARCH_HISTORY_KEY).unwrap().is_some());
        let second = store.load();
        assert_eq!(first, second);
        assert_eq!(first[0].display_name, "wolf");
        assert_eq!(first[3].kind(), ResultKind::Category);
    }

    #[test]
    fn empty_stored_list_is_reseeded() {
        let store = BlobHistoryStore::new(MemoryBlobStore::with_blob(SEARCH_HISTORY_KEY, "[]"));
        assert_eq!(store.load().len(), 5);
    }

    #[test]
    fn seeding_can_be_disabled() {
        let store = unseeded();
        assert!(store.load().is_empty());
        assert!(store.blob().get(SEARCH_HISTORY_KEY).unwrap().is_none());
    }

    #[test]
    fn malformed_blob_reads_as_empty() {
        let store = BlobHistoryStore::new(MemoryBlobStore::with_blob(
            SEARCH_HISTORY_KEY,
            "{not json",
        ));
        assert!(store.load().is_empty());
    }

    #[test]
    fn history_is_bounded_newest_first() {
        let store = unseeded();
        for n in 0..11 {
            store.add(input(&n.to_string()));
        }
        let entries = store.load();
        assert_eq!(entries.len(), MAX_HISTORY);
        let ids: Vec<_> = entries.iter().map(|entry| entry.id.as_str()).collect();
        assert_eq!(ids, ["10", "9", "8", "7", "6", "5", "4", "3", "2", "1"]);
        assert!(
            entries
                .windows(2)
                .all(|pair| pair[0].selected_at > pair[1].selected_at)
        );
    }

    #[test]
    fn re_adding_moves_to_front_without_growth() {
        let store = unseeded();
        for id in ["a", "b", "c"] {
            store.add(input(id));
        }
        store.add(input("a"));
        let ids: Vec<_> = store.load().into_iter().map(|entry| entry.id).collect();
        assert_eq!(ids, ["a", "c", "b"]);
    }

    #[test]
    fn add_on_fresh_store_keeps_defaults_behind_new_entry() {
        let store = BlobHistoryStore::new(MemoryBlobStore::new());
        store.add(HistoryEntryInput::from(&SearchResultEntry::category(
            "68f9cafd58872957ec816c51",
            "Animals",
        )));
        let entries = store.load();
        assert_eq!(entries.len(), 5);
        assert_eq!(entries[0].display_name, "Animals");
        assert_eq!(
            entries[0].navigation(),
            NavigationIntent::NavigateToCategory {
                id: "68f9cafd58872957ec816c51".into(),
                name: "Animals".into()
            }
        );
    }

    #[test]
    fn clear_removes_blob() {
        let store = unseeded();
        store.add(input("a"));
        store.clear();
        assert!(store.blob().get(SEARCH_HISTORY_KEY).unwrap().is_none());
        assert!(store.load().is_empty());
    }

    #[test]
    fn cookie_file_round_trips_across_instances() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("profile").join("history.cookies");
        {
            let store = BlobHistoryStore::new(CookieFileStore::new(&path)).with_seed_defaults(false);
            store.add(HistoryEntryInput::from(
                &SearchResultEntry::word("w1", "good morning; friend")
                    .with_category("c1", "Greetings"),
            ));
        }
        let raw = fs::read_to_string(&path).unwrap();
        assert!(raw.starts_with("chickasaw_search_history="));
        assert!(raw.contains("Path=/"));
        assert!(raw.contains("Expires="));
        assert!(!raw.contains("good morning;"));

        let reopened = BlobHistoryStore::new(CookieFileStore::new(&path)).with_seed_defaults(false);
        let entries = reopened.load();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].display_name, "good morning; friend");
        assert_eq!(entries[0].category_ref, Some(CategoryRef::new("c1", "Greetings")));
    }

    #[test]
    fn cookie_file_keeps_other_keys_and_drops_expired() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("jar");
        fs::write(
            &path,
            "stale=1; Path=/; Expires=Thu, 01 Jan 1970 00:00:00 GMT\ntheme=dark; Path=/\n",
        )
        .unwrap();
        let store = CookieFileStore::new(&path);
        assert_eq!(store.get("stale").unwrap(), None);
        store.set(SEARCH_HISTORY_KEY, "[]").unwrap();
        assert_eq!(store.get("theme").unwrap().as_deref(), Some("dark"));
        store.delete(SEARCH_HISTORY_KEY).unwrap();
        assert_eq!(store.get(SEARCH_HISTORY_KEY).unwrap(), None);
        assert!(!fs::read_to_string(&path).unwrap().contains("stale"));
    }

    #[test]
    fn oversized_stored_history_is_trimmed_on_load() {
        let stored: Vec<HistoryEntry> = (0..12u64)
            .map(|n| HistoryEntry::from_input(input(&n.to_string()), 1_000 - n))
            .collect();
        let blob = serde_json::to_string(&stored).unwrap();
        let store = BlobHistoryStore::new(MemoryBlobStore::with_blob(SEARCH_HISTORY_KEY, &blob))
            .with_seed_defaults(false);
        let entries = store.load();
        assert_eq!(entries.len(), MAX_HISTORY);
        assert_eq!(entries[0].id, "0");
        assert_eq!(entries[MAX_HISTORY - 1].id, "9");
    }

    #[test]
    fn stores_sharing_a_file_never_fail_writes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("shared.cookies");
        let first = CookieFileStore::new(&path);
        let second = CookieFileStore::new(&path);
        std::thread::scope(|scope| {
            for (store, prefix) in [(&first, "a"), (&second, "b")] {
                scope.spawn(move || {
                    for n in 0..25 {
                        store.set(&format!("{prefix}{n}"), "[]").unwrap();
                    }
                });
            }
        });
        assert!(first.get("a24").is_ok());
        let leftovers: Vec<_> = fs::read_dir(dir.path())
            .unwrap()
            .map(|entry| entry.unwrap().file_name())
            .filter(|name| name != "shared.cookies")
            .collect();
        assert!(leftovers.is_empty(), "staging files left behind: {leftovers:?}");
    }

    #[test]
    fn default_path_lives_under_anompa_data_dir() {
        let path = default_history_path();
        assert!(path.ends_with(Path::new("anompa").join("history.cookies")));
        if let Some(data) = dirs::data_dir() {
            assert!(path.starts_with(data));
        }
    }

    #[test]
    fn missing_cookie_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = CookieFileStore::new(dir.path().join("absent"));
        assert_eq!(store.get(SEARCH_HISTORY_KEY).unwrap(), None);
        store.delete(SEARCH_HISTORY_KEY).unwrap();
    }
}

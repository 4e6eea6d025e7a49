use crate::api::{ApiError, ContentApi, SearchScope};
use crate::data::{HistoryEntry, HistoryEntryInput, NavigationIntent, SearchResultEntry};
use crate::debounce::{DEBOUNCE_DELAY, Debouncer};
use crate::history::HistoryStore;
use crate::view::SearchSnapshot;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::{AbortHandle, JoinHandle};
use tokio::time::sleep;
use tracing::{debug, warn};

pub const BLUR_GRACE_PERIOD: Duration = Duration::from_millis(200);

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    pub debounce_ms: u64,
    pub blur_grace_ms: u64,
    pub scope: SearchScope,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            debounce_ms: DEBOUNCE_DELAY.as_millis() as u64,
            blur_grace_ms: BLUR_GRACE_PERIOD.as_millis() as u64,
            scope: SearchScope::All,
        }
    }
}

impl SearchConfig {
    pub fn debounce_delay(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    pub fn blur_grace(&self) -> Duration {
        Duration::from_millis(self.blur_grace_ms)
    }
}

/// Identifies one issued search; only the current token's response is applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RequestToken(u64);

impl RequestToken {
    pub fn value(&self) -> u64 {
        self.0
    }
}

/// An in-flight search. Abandoning it aborts the request task.
#[derive(Debug)]
pub struct SearchHandle {
    token: RequestToken,
    task: AbortHandle,
}

impl SearchHandle {
    pub fn token(&self) -> RequestToken {
        self.token
    }

    pub fn abandon(self) {
        self.task.abort();
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SearchControllerState {
    pub query_text: String,
    pub is_loading: bool,
    pub results_visible: bool,
    pub debounce_pending: bool,
    pub results: Arc<[SearchResultEntry]>,
    pub pending_request_token: Option<RequestToken>,
}

impl SearchControllerState {
    fn snapshot(&self) -> SearchSnapshot {
        SearchSnapshot {
            query_text: self.query_text.clone(),
            is_loading: self.is_loading,
            results_visible: self.results_visible,
            debounce_pending: self.debounce_pending,
            results: Arc::clone(&self.results),
        }
    }
}

#[derive(Debug, Default)]
struct Inner {
    state: SearchControllerState,
    in_flight: Option<SearchHandle>,
    blur: Option<JoinHandle<()>>,
}

/// Search-as-you-type for one screen.
///
/// Keystrokes are debounced into remote searches; overlapping searches are
/// resolved last-submitted-wins through [`RequestToken`]s, and every failure
/// resolves to an empty result list. Selection records history and hands a
/// [`NavigationIntent`] back to the caller.
///
/// The state lock is never held across an await. Dropping the controller
/// cancels its timers and abandons any in-flight search.
pub struct SearchController<A, H> {
    api: Arc<A>,
    history: H,
    config: SearchConfig,
    debouncer: Debouncer,
    inner: Mutex<Inner>,
    next_token: AtomicU64,
    snapshots: watch::Sender<SearchSnapshot>,
    me: Weak<Self>,
}

impl<A: ContentApi, H: HistoryStore> SearchController<A, H> {
    pub fn new(api: A, history: H, config: SearchConfig) -> Arc<Self> {
        let (snapshots, _) = watch::channel(SearchSnapshot::default());
        let debouncer = Debouncer::new(config.debounce_delay());
        Arc::new_cyclic(|me| Self {
            api: Arc::new(api),
            history,
            config,
            debouncer,
            inner: Mutex::new(Inner::default()),
            next_token: AtomicU64::new(0),
            snapshots,
            me: me.clone(),
        })
    }

    pub fn config(&self) -> &SearchConfig {
        &self.config
    }

    pub fn state(&self) -> SearchControllerState {
        self.inner.lock().state.clone()
    }

    pub fn snapshot(&self) -> SearchSnapshot {
        self.snapshots.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<SearchSnapshot> {
        self.snapshots.subscribe()
    }

    /// Waits until no debounce timer or search is outstanding.
    pub async fn settled(&self) -> SearchSnapshot {
        let mut receiver = self.subscribe();
        let settled = match receiver.wait_for(SearchSnapshot::is_settled).await {
            Ok(snapshot) => snapshot.clone(),
            Err(_) => self.snapshot(),
        };
        settled
    }

    pub fn history(&self) -> Vec<HistoryEntry> {
        self.history.load()
    }

    pub fn on_query_changed(&self, text: impl Into<String>) {
        let text = text.into();
        self.update(|state| {
            state.query_text = text.clone();
            state.results_visible = !text.is_empty();
            state.debounce_pending = true;
        });
        let me = self.me.clone();
        self.debouncer.schedule(move || {
            if let Some(controller) = me.upgrade() {
                controller.commit(text);
            }
        });
    }

    /// Runs when the quiet period ends. A commit whose text no longer matches
    /// the pending query lost a race with a newer keystroke and is dropped.
    fn commit(&self, text: String) {
        let mut inner = self.inner.lock();
        if !inner.state.debounce_pending || inner.state.query_text != text {
            drop(inner);
            debug!(query = %text, "dropping superseded commit");
            return;
        }
        if text.trim().is_empty() {
            inner.state.debounce_pending = false;
            inner.state.is_loading = false;
            inner.state.pending_request_token = None;
            inner.state.results = Arc::from(Vec::new());
            let abandoned = inner.in_flight.take();
            let snapshot = inner.state.snapshot();
            drop(inner);
            self.snapshots.send_replace(snapshot);
            if let Some(search) = abandoned {
                search.abandon();
            }
            debug!("blank query committed; results cleared");
            return;
        }

        let token = RequestToken(self.next_token.fetch_add(1, Ordering::Relaxed) + 1);
        let superseded = {
            inner.state.debounce_pending = false;
            inner.state.is_loading = true;
            inner.state.pending_request_token = Some(token);
            let handle = self.issue(token, text.clone());
            let superseded = inner.in_flight.replace(handle);
            let snapshot = inner.state.snapshot();
            drop(inner);
            self.snapshots.send_replace(snapshot);
            superseded
        };
        debug!(query = %text, token = token.value(), "search issued");
        if let Some(previous) = superseded {
            debug!(token = previous.token().value(), "abandoning superseded search");
            previous.abandon();
        }
    }

    fn issue(&self, token: RequestToken, text: String) -> SearchHandle {
        let api = Arc::clone(&self.api);
        let me = self.me.clone();
        let scope = self.config.scope;
        let task = tokio::spawn(async move {
            let outcome = api
                .search(&text, scope, None)
                .await
                .map(|page| page.results);
            if let Some(controller) = me.upgrade() {
                controller.on_search_resolved(token, outcome);
            }
        });
        SearchHandle {
            token,
            task: task.abort_handle(),
        }
    }

    /// Applies a search outcome if `token` is still current; stale outcomes
    /// are dropped. Failures surface as an empty result list.
    pub fn on_search_resolved(
        &self,
        token: RequestToken,
        outcome: Result<Vec<SearchResultEntry>, ApiError>,
    ) {
        let mut inner = self.inner.lock();
        if inner.state.pending_request_token != Some(token) {
            drop(inner);
            debug!(token = token.value(), "discarding stale search response");
            return;
        }
        let results = match outcome {
            Ok(results) => results,
            Err(err) => {
                warn!(error = %err, token = token.value(), "search failed; showing no results");
                Vec::new()
            }
        };
        inner.state.results = Arc::from(results);
        inner.state.is_loading = false;
        inner.state.pending_request_token = None;
        if inner
            .in_flight
            .as_ref()
            .is_some_and(|search| search.token() == token)
        {
            inner.in_flight = None;
        }
        let snapshot = inner.state.snapshot();
        drop(inner);
        self.snapshots.send_replace(snapshot);
    }

    pub fn on_focus(&self) {
        let blur = self.inner.lock().blur.take();
        if let Some(blur) = blur {
            blur.abort();
        }
        self.update(|state| {
            if !state.query_text.is_empty() {
                state.results_visible = true;
            }
        });
    }

    /// Hides results after the grace period unless the query still has text,
    /// so a click on a result that blurred the input lands first.
    pub fn on_blur_deferred(&self) {
        let me = self.me.clone();
        let grace = self.config.blur_grace();
        let timer = tokio::spawn(async move {
            sleep(grace).await;
            if let Some(controller) = me.upgrade() {
                controller.update(|state| {
                    if state.query_text.trim().is_empty() {
                        state.results_visible = false;
                    }
                });
            }
        });
        let previous = self.inner.lock().blur.replace(timer);
        if let Some(previous) = previous {
            previous.abort();
        }
    }

    pub fn on_clear(&self) {
        self.debouncer.cancel();
        let blur = self.inner.lock().blur.take();
        if let Some(blur) = blur {
            blur.abort();
        }
        self.update(|state| *state = SearchControllerState::default());
    }

    pub fn on_result_selected(&self, entry: &SearchResultEntry) -> NavigationIntent {
        self.history.add(HistoryEntryInput::from(entry));
        self.debouncer.cancel();
        self.update(|state| {
            state.query_text = entry.display_name.clone();
            state.results_visible = false;
            state.debounce_pending = false;
            state.is_loading = false;
            state.pending_request_token = None;
        });
        let intent = entry.navigation();
        debug!(id = %entry.id, kind = %entry.kind, route = %intent.route(), "result selected");
        intent
    }

    /// Cancels timers, abandons any in-flight search and publishes the
    /// settled state.
    pub fn dispose(&self) {
        self.debouncer.cancel();
        let blur = self.inner.lock().blur.take();
        if let Some(blur) = blur {
            blur.abort();
        }
        self.update(|state| {
            state.pending_request_token = None;
            state.is_loading = false;
            state.debounce_pending = false;
        });
    }

    /// Mutates state and publishes a snapshot. An in-flight search whose
    /// token the mutation invalidated is abandoned.
    fn update(&self, mutate: impl FnOnce(&mut SearchControllerState)) {
        let mut inner = self.inner.lock();
        mutate(&mut inner.state);
        let orphaned = match (&inner.in_flight, inner.state.pending_request_token) {
            (Some(search), Some(token)) if search.token() == token => None,
            (Some(_), _) => inner.in_flight.take(),
            (None, _) => None,
        };
        let snapshot = inner.state.snapshot();
        drop(inner);
        self.snapshots.send_replace(snapshot);
        if let Some(search) = orphaned {
            debug!(token = search.token().value(), "abandoning search");
            search.abandon();
        }
    }
}

impl<A, H> Drop for SearchController<A, H> {
    fn drop(&mut self) {
        let inner = self.inner.get_mut();
        if let Some(search) = inner.in_flight.take() {
            search.abandon();
        }
        if let Some(blur) = inner.blur.take() {
            blur.abort();
        }
    }
}

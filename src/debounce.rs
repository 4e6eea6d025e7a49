use parking_lot::Mutex;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::sleep;

pub const DEBOUNCE_DELAY: Duration = Duration::from_millis(300);

/// Runs only the most recently scheduled task once no newer task has been
/// scheduled for `delay`.
///
/// Superseded timers are aborted; a generation counter guards the window
/// between a timer waking up and the abort landing. Must be used from
/// within a tokio runtime.
#[derive(Debug)]
pub struct Debouncer {
    delay: Duration,
    generation: Arc<AtomicU64>,
    pending: Mutex<Option<JoinHandle<()>>>,
}

impl Debouncer {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            generation: Arc::new(AtomicU64::new(0)),
            pending: Mutex::new(None),
        }
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }

    pub fn schedule<F>(&self, task: F)
    where
        F: FnOnce() + Send + 'static,
    {
        let generation = self.generation.fetch_add(1, Ordering::AcqRel) + 1;
        let current = Arc::clone(&self.generation);
        let delay = self.delay;
        let timer = tokio::spawn(async move {
            sleep(delay).await;
            if current.load(Ordering::Acquire) == generation {
                task();
            }
        });
        if let Some(previous) = self.pending.lock().replace(timer) {
            previous.abort();
        }
    }

    pub fn cancel(&self) {
        self.generation.fetch_add(1, Ordering::AcqRel);
        if let Some(timer) = self.pending.lock().take() {
            timer.abort();
        }
    }

    pub fn is_pending(&self) -> bool {
        self.pending
            .lock()
            .as_ref()
            .is_some_and(|timer| !timer.is_finished())
    }
}

impl Default for Debouncer {
    fn default() -> Self {
        Self::new(DEBOUNCE_DELAY)
    }
}

impl Drop for Debouncer {
    fn drop(&mut self) {
        self.cancel();
    }
}

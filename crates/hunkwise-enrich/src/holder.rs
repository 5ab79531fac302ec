use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use hunkwise_core::ChangeSet;
use tracing::debug;

/// Concurrency-safe home of the current [`ChangeSet`] snapshot.
///
/// Readers get a cheap `Arc` clone and never see a half-updated list.
/// Writers swap the whole snapshot. A snapshot older (by generation) than
/// the one held is rejected, so a slow background pass cannot clobber a
/// newer reload.
///
/// # Examples
///
/// ```
/// use hunkwise_core::ChangeSet;
/// use hunkwise_enrich::holder::SnapshotHolder;
///
/// let holder = SnapshotHolder::new();
/// assert!(holder.get().is_none());
///
/// let first = holder.publish(ChangeSet::new("main", "HEAD", Vec::new()));
/// let second = holder.publish(ChangeSet::new("main", "HEAD", Vec::new()));
/// assert!(second.generation > first.generation);
///
/// // A result computed from the first snapshot arrives late and is dropped.
/// assert!(!holder.replace((*first).clone()));
/// assert_eq!(holder.get().unwrap().generation, second.generation);
/// ```
#[derive(Debug, Default)]
pub struct SnapshotHolder {
    current: RwLock<Option<Arc<ChangeSet>>>,
    generation: AtomicU64,
    analysis_in_progress: AtomicBool,
    // Generation of the newest analysis still running.
    active_analysis: Mutex<Option<u64>>,
    last_error: RwLock<Option<String>>,
}

impl SnapshotHolder {
    /// An empty holder: no repository loaded.
    pub fn new() -> Self {
        Self::default()
    }

    /// The current snapshot, or `None` when nothing has been loaded.
    pub fn get(&self) -> Option<Arc<ChangeSet>> {
        self.current
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Reserve the next generation number. Strictly increasing, starting at 1.
    pub fn next_generation(&self) -> u64 {
        self.generation.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Stamp `snapshot` with a fresh generation and install it.
    pub fn publish(&self, mut snapshot: ChangeSet) -> Arc<ChangeSet> {
        snapshot.generation = self.next_generation();
        let snapshot = Arc::new(snapshot);
        self.install(Arc::clone(&snapshot));
        snapshot
    }

    /// Install `snapshot` unless the held one has a newer generation.
    ///
    /// Returns whether the swap happened.
    pub fn replace(&self, snapshot: ChangeSet) -> bool {
        self.install(Arc::new(snapshot))
    }

    fn install(&self, snapshot: Arc<ChangeSet>) -> bool {
        let mut current = self.current.write().unwrap_or_else(PoisonError::into_inner);
        if let Some(held) = current.as_ref() {
            if snapshot.generation < held.generation {
                debug!(
                    incoming = snapshot.generation,
                    held = held.generation,
                    "dropping stale snapshot"
                );
                return false;
            }
        }
        *current = Some(snapshot);
        true
    }

    /// Record that an analysis of snapshot `generation` has started and
    /// raise the in-progress flag.
    pub fn begin_analysis(&self, generation: u64) {
        let mut active = self
            .active_analysis
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        *active = Some(active.map_or(generation, |g| g.max(generation)));
        self.set_analysis_in_progress(true);
    }

    /// Settle an analysis started with [`begin_analysis`](Self::begin_analysis).
    ///
    /// The result is installed through [`replace`](Self::replace). Its error
    /// (or `None` on success) becomes the last error only when the result was
    /// installed. The in-progress flag drops only when no newer analysis has
    /// started since. Returns whether the result was installed.
    pub fn finish_analysis(&self, snapshot: ChangeSet, error: Option<String>) -> bool {
        let generation = snapshot.generation;
        let mut active = self
            .active_analysis
            .lock()
            .unwrap_or_else(PoisonError::into_inner);

        let installed = self.replace(snapshot);
        if installed {
            self.set_last_error(error);
        } else {
            debug!(generation, "discarding outcome of stale analysis");
        }
        if active.map_or(true, |g| g <= generation) {
            *active = None;
            self.set_analysis_in_progress(false);
        }
        installed
    }

    /// Mark background analysis as running or finished.
    pub fn set_analysis_in_progress(&self, running: bool) {
        self.analysis_in_progress.store(running, Ordering::SeqCst);
    }

    /// Whether background analysis is running.
    pub fn is_analysis_in_progress(&self) -> bool {
        self.analysis_in_progress.load(Ordering::SeqCst)
    }

    /// Record (or clear, with `None`) the last background analysis error.
    pub fn set_last_error(&self, error: Option<String>) {
        *self.last_error.write().unwrap_or_else(PoisonError::into_inner) = error;
    }

    /// The last background analysis error, if the most recent run failed.
    pub fn last_error(&self) -> Option<String> {
        self.last_error
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

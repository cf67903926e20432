//! Progress reporting for update and import operations
//!
//! Each operation owns one [`Monitor`]. It combines a download signal and an
//! import signal into a single [`StagedProgress`] that is handed to the
//! observer exactly once, when the operation starts. The observer keeps the
//! handle and polls it; the producer never waits on the observer.

use parking_lot::RwLock;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::Arc;

/// Stage labels published while an operation runs
pub mod stage {
    pub const CHECKING: &str = "checking for update";
    pub const NO_UPDATE: &str = "no update available";
    pub const DOWNLOADING: &str = "downloading";
    pub const UNARCHIVING: &str = "unarchiving";
    pub const VALIDATING: &str = "validating DB integrity";
    pub const ACTIVATING: &str = "activating";
}

/// Observer invoked once per operation with its progress handle
pub type ProgressCallback = Arc<dyn Fn(StagedProgress) + Send + Sync>;

#[derive(Debug, Default)]
struct ManualInner {
    current: AtomicI64,
    size: AtomicI64,
    completed: AtomicBool,
}

/// Thread-safe counter advanced by a producer and read by observers
#[derive(Debug, Clone, Default)]
pub struct ManualProgress {
    inner: Arc<ManualInner>,
}

impl ManualProgress {
    /// Create a counter expecting `size` units of work
    pub fn new(size: i64) -> Self {
        let progress = Self::default();
        progress.inner.size.store(size, Ordering::SeqCst);
        progress
    }

    pub fn set_total(&self, size: i64) {
        self.inner.size.store(size, Ordering::SeqCst);
    }

    pub fn set(&self, current: i64) {
        self.inner.current.store(current, Ordering::SeqCst);
    }

    pub fn add(&self, delta: i64) {
        self.inner.current.fetch_add(delta, Ordering::SeqCst);
    }

    pub fn current(&self) -> i64 {
        self.inner.current.load(Ordering::SeqCst)
    }

    pub fn size(&self) -> i64 {
        self.inner.size.load(Ordering::SeqCst)
    }

    /// Mark the work done; the current value is raised to the size
    pub fn set_completed(&self) {
        let size = self.size();
        self.inner.current.fetch_max(size, Ordering::SeqCst);
        self.inner.completed.store(true, Ordering::SeqCst);
    }

    pub fn is_completed(&self) -> bool {
        self.inner.completed.load(Ordering::SeqCst)
    }

    /// Fraction done in `[0, 1]`; completed counters always report 1
    pub fn fraction(&self) -> f64 {
        if self.is_completed() {
            return 1.0;
        }
        let size = self.size();
        if size <= 0 {
            return 0.0;
        }
        (self.current() as f64 / size as f64).clamp(0.0, 1.0)
    }
}

/// Shared, mutable stage label
#[derive(Debug, Clone, Default)]
pub struct AtomicStage {
    current: Arc<RwLock<String>>,
}

impl AtomicStage {
    pub fn new(stage: impl Into<String>) -> Self {
        Self {
            current: Arc::new(RwLock::new(stage.into())),
        }
    }

    pub fn set(&self, stage: impl Into<String>) {
        *self.current.write() = stage.into();
    }

    pub fn get(&self) -> String {
        self.current.read().clone()
    }
}

/// Combined view of one operation: a stage label plus both phases
#[derive(Debug, Clone)]
pub struct StagedProgress {
    stage: AtomicStage,
    download: ManualProgress,
    import: ManualProgress,
}

impl StagedProgress {
    /// Current stage label
    pub fn stage(&self) -> String {
        self.stage.get()
    }

    /// Sum of work done across both phases
    pub fn current(&self) -> i64 {
        self.download.current() + self.import.current()
    }

    /// Sum of expected work across both phases
    pub fn size(&self) -> i64 {
        self.download.size() + self.import.size()
    }

    /// Overall percentage (0-100), each phase weighted equally
    pub fn percentage(&self) -> u8 {
        let fraction = (self.download.fraction() + self.import.fraction()) / 2.0;
        (fraction * 100.0).min(100.0) as u8
    }

    /// Whether both phases have finished (successfully or not)
    pub fn is_completed(&self) -> bool {
        self.download.is_completed() && self.import.is_completed()
    }
}

/// Progress for a single update or import
///
/// Dropping the monitor marks both phases complete, so observers see the
/// operation end on every exit path.
pub(crate) struct Monitor {
    progress: StagedProgress,
}

impl Monitor {
    /// Create the monitor and publish its progress handle to `callback`
    pub fn new(callback: Option<&ProgressCallback>) -> Self {
        let progress = StagedProgress {
            stage: AtomicStage::default(),
            download: ManualProgress::new(1),
            import: ManualProgress::new(1),
        };

        if let Some(callback) = callback {
            callback(progress.clone());
        }

        Self { progress }
    }

    pub fn set_stage(&self, stage: &str) {
        tracing::trace!(stage, "database operation stage");
        self.progress.stage.set(stage);
    }

    pub fn download_progress(&self) -> &ManualProgress {
        &self.progress.download
    }

    pub fn import_progress(&self) -> &ManualProgress {
        &self.progress.import
    }

    pub fn set_completed(&self) {
        self.progress.download.set_completed();
        self.progress.import.set_completed();
    }
}

impl Drop for Monitor {
    fn drop(&mut self) {
        self.set_completed();
    }
}

/// Marks one progress signal complete when dropped
pub(crate) struct CompleteOnDrop<'a>(pub &'a ManualProgress);

impl Drop for CompleteOnDrop<'_> {
    fn drop(&mut self) {
        self.0.set_completed();
    }
}

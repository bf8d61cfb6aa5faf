//! minimizer::execution — serial and pooled evaluation of contour points.
//!
//! Purpose
//! -------
//! Evaluate a list of independent grid points either in the calling thread
//! or on a worker pool, and return the outcomes in submission order no
//! matter in which order the workers finish.
//!
//! Key behaviors
//! -------------
//! - [`ExecutionStrategy::Serial`] evaluates points one after the other.
//! - [`ExecutionStrategy::Parallel`] submits the whole batch to a
//!   [`WorkerPool`], polls the returned [`BatchHandle`] at a fixed interval
//!   (one second by default) while reporting progress, then collects.
//! - [`RayonPool`] is the built-in pool: one rayon task per point, results
//!   written into per-point slots.
//! - Progress goes through [`ProgressSink`]: log lines by default, an
//!   `indicatif` bar with the `progress` feature.
//!
//! Invariants & assumptions
//! ------------------------
//! - `collect()` returns exactly one outcome per submitted point, in
//!   submission order.
//! - A panicking point job is recorded as a failed point; it never takes
//!   the pool down.
//!
//! Conventions
//! -----------
//! - The job is a shared closure; each call builds its own engine, so jobs
//!   share no mutable state.
//!
//! Testing notes
//! -------------
//! - Unit tests compare serial and pooled results on the same batch,
//!   including a stub pool that completes in reverse order.
use crate::minimizer::{
    contour::{FailureCause, GridPoint, PointOutcome},
    errors::{MinResult, MinimizerError},
};
use std::{
    fmt,
    panic::{AssertUnwindSafe, catch_unwind},
    sync::{
        Arc, Condvar, Mutex, MutexGuard,
        atomic::{AtomicUsize, Ordering},
    },
    thread,
    time::Duration,
};

/// Work item executed for every grid point.
pub type PointJob = Arc<dyn Fn(GridPoint) -> PointOutcome + Send + Sync>;

/// Default interval between two polls of a batch handle.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Handle to a submitted batch.
pub trait BatchHandle: Send {
    /// Completed fraction in `[0, 1]`.
    fn progress(&self) -> f64;
    fn is_ready(&self) -> bool;
    /// Block until every point is done and return outcomes in submission order.
    fn collect(self: Box<Self>) -> MinResult<Vec<PointOutcome>>;
}

/// Anything that can run a batch of point jobs asynchronously.
pub trait WorkerPool: Send + Sync {
    fn submit(&self, points: Vec<GridPoint>, job: PointJob) -> MinResult<Box<dyn BatchHandle>>;
}

/// Options of the pooled strategy.
#[derive(Clone)]
pub struct ParallelOptions {
    pool: Arc<dyn WorkerPool>,
    poll_interval: Duration,
}

impl ParallelOptions {
    pub fn new(pool: Arc<dyn WorkerPool>) -> Self {
        Self { pool, poll_interval: DEFAULT_POLL_INTERVAL }
    }

    /// Pooled options backed by a new [`RayonPool`].
    pub fn rayon(threads: Option<usize>) -> MinResult<Self> {
        Ok(Self::new(Arc::new(RayonPool::new(threads)?)))
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn poll_interval(&self) -> Duration {
        self.poll_interval
    }
}

impl fmt::Debug for ParallelOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ParallelOptions").field("poll_interval", &self.poll_interval).finish_non_exhaustive()
    }
}

/// How the points of a contour are evaluated.
#[derive(Debug, Clone, Default)]
pub enum ExecutionStrategy {
    #[default]
    Serial,
    Parallel(ParallelOptions),
}

impl ExecutionStrategy {
    /// Evaluate `points` and return outcomes in the same order.
    pub fn execute(
        &self, points: Vec<GridPoint>, job: PointJob, progress: &mut dyn ProgressSink,
    ) -> MinResult<Vec<PointOutcome>> {
        match self {
            ExecutionStrategy::Serial => Ok(run_serial(&points, &job, progress)),
            ExecutionStrategy::Parallel(options) => run_parallel(points, job, options, progress),
        }
    }
}

pub fn run_serial(points: &[GridPoint], job: &PointJob, progress: &mut dyn ProgressSink) -> Vec<PointOutcome> {
    progress.start(points.len() as u64);
    let outcomes = points
        .iter()
        .map(|&point| {
            let outcome = guarded(job, point);
            progress.inc();
            outcome
        })
        .collect();
    progress.finish();
    outcomes
}

/// Submit, poll until ready, collect.
pub fn run_parallel(
    points: Vec<GridPoint>, job: PointJob, options: &ParallelOptions, progress: &mut dyn ProgressSink,
) -> MinResult<Vec<PointOutcome>> {
    let total = points.len();
    progress.start(total as u64);
    let handle = options.pool.submit(points, job)?;
    while !handle.is_ready() {
        thread::sleep(options.poll_interval);
        progress.set_position((handle.progress() * total as f64).round() as u64);
    }
    let outcomes = handle.collect()?;
    progress.set_position(total as u64);
    progress.finish();
    if outcomes.len() != total {
        return Err(MinimizerError::WorkerPool {
            text: format!("batch returned {} outcomes for {total} points", outcomes.len()),
        });
    }
    Ok(outcomes)
}

/// Run one job, turning a panic into a failed point.
fn guarded(job: &PointJob, point: GridPoint) -> PointOutcome {
    catch_unwind(AssertUnwindSafe(|| job(point))).unwrap_or_else(|_| {
        PointOutcome::Failed(FailureCause::Engine("worker panicked while evaluating the point".into()))
    })
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

/// Worker pool backed by a dedicated rayon thread pool.
pub struct RayonPool {
    pool: rayon::ThreadPool,
}

impl RayonPool {
    /// `threads = None` uses rayon's default (one per logical CPU).
    pub fn new(threads: Option<usize>) -> MinResult<Self> {
        let mut builder =
            rayon::ThreadPoolBuilder::new().thread_name(|i| format!("astrofit-worker-{i}"));
        if let Some(n) = threads {
            builder = builder.num_threads(n);
        }
        let pool = builder.build().map_err(|e| MinimizerError::WorkerPool { text: e.to_string() })?;
        Ok(Self { pool })
    }

    pub fn threads(&self) -> usize {
        self.pool.current_num_threads()
    }
}

impl WorkerPool for RayonPool {
    fn submit(&self, points: Vec<GridPoint>, job: PointJob) -> MinResult<Box<dyn BatchHandle>> {
        let batch = Arc::new(BatchState::new(points.len()));
        for (slot, point) in points.into_iter().enumerate() {
            let batch = Arc::clone(&batch);
            let job = Arc::clone(&job);
            self.pool.spawn(move || batch.complete(slot, guarded(&job, point)));
        }
        Ok(Box::new(SlotBatch { batch }))
    }
}

/// Shared per-batch slots filled by the workers.
#[derive(Debug)]
pub struct BatchState {
    slots: Mutex<Vec<Option<PointOutcome>>>,
    done: AtomicUsize,
    total: usize,
    ready: Condvar,
}

impl BatchState {
    pub fn new(total: usize) -> Self {
        Self {
            slots: Mutex::new(vec![None; total]),
            done: AtomicUsize::new(0),
            total,
            ready: Condvar::new(),
        }
    }

    pub fn complete(&self, slot: usize, outcome: PointOutcome) {
        let mut slots = lock(&self.slots);
        if let Some(cell) = slots.get_mut(slot) {
            *cell = Some(outcome);
        }
        self.done.fetch_add(1, Ordering::SeqCst);
        self.ready.notify_all();
    }
}

/// [`BatchHandle`] over a [`BatchState`].
#[derive(Debug)]
pub struct SlotBatch {
    batch: Arc<BatchState>,
}

impl SlotBatch {
    pub fn new(batch: Arc<BatchState>) -> Self {
        Self { batch }
    }
}

impl BatchHandle for SlotBatch {
    fn progress(&self) -> f64 {
        if self.batch.total == 0 {
            return 1.0;
        }
        self.batch.done.load(Ordering::SeqCst) as f64 / self.batch.total as f64
    }

    fn is_ready(&self) -> bool {
        self.batch.done.load(Ordering::SeqCst) >= self.batch.total
    }

    fn collect(self: Box<Self>) -> MinResult<Vec<PointOutcome>> {
        let mut slots = lock(&self.batch.slots);
        while self.batch.done.load(Ordering::SeqCst) < self.batch.total {
            slots = self.batch.ready.wait(slots).unwrap_or_else(|e| e.into_inner());
        }
        slots
            .iter_mut()
            .enumerate()
            .map(|(k, cell)| {
                cell.take().ok_or_else(|| MinimizerError::WorkerPool {
                    text: format!("no outcome recorded for point {k}"),
                })
            })
            .collect()
    }
}

/// Progress reporting decoupled from the evaluation loop.
///
/// Lifecycle: `start` once, then `inc`/`set_position`, then `finish` once.
pub trait ProgressSink {
    fn start(&mut self, _total: u64) {}
    fn inc(&mut self) {}
    fn set_position(&mut self, _done: u64) {}
    fn finish(&mut self) {}
}

/// No-op sink.
impl ProgressSink for () {}

/// Logs every tenth of the batch at `info` level.
#[derive(Debug, Clone, Default)]
pub struct LogProgress {
    total: u64,
    done: u64,
    last_decile: u64,
}

impl ProgressSink for LogProgress {
    fn start(&mut self, total: u64) {
        *self = Self { total, done: 0, last_decile: 0 };
    }

    fn inc(&mut self) {
        self.set_position(self.done + 1);
    }

    fn set_position(&mut self, done: u64) {
        self.done = done.min(self.total);
        if self.total == 0 {
            return;
        }
        let decile = self.done * 10 / self.total;
        if decile > self.last_decile {
            self.last_decile = decile;
            log::info!("Profiling likelihood: {}/{} points ({}%)", self.done, self.total, decile * 10);
        }
    }
}

#[cfg(feature = "progress")]
pub use self::bar::IndicatifProgress;

#[cfg(feature = "progress")]
mod bar {
    use super::ProgressSink;
    use indicatif::{ProgressBar, ProgressStyle};
    use std::time::Duration;

    /// `indicatif` progress bar.
    pub struct IndicatifProgress {
        pb: ProgressBar,
    }

    impl Default for IndicatifProgress {
        fn default() -> Self {
            // The actual length is set in `start()`.
            Self { pb: ProgressBar::new(1) }
        }
    }

    impl ProgressSink for IndicatifProgress {
        fn start(&mut self, total: u64) {
            self.pb.set_length(total.max(1));
            if let Ok(style) = ProgressStyle::with_template(
                "Profiling likelihood {bar:40.cyan/blue} {pos}/{len} ({percent:>3}%) | ETA {eta_precise}",
            ) {
                self.pb.set_style(style);
            }
            self.pb.enable_steady_tick(Duration::from_millis(200));
        }

        fn inc(&mut self) {
            self.pb.inc(1);
        }

        fn set_position(&mut self, done: u64) {
            self.pb.set_position(done);
        }

        fn finish(&mut self) {
            self.pb.finish_and_clear();
        }
    }
}

/// Sink used when progress display is requested.
pub fn default_progress() -> Box<dyn ProgressSink> {
    #[cfg(feature = "progress")]
    {
        Box::new(IndicatifProgress::default())
    }
    #[cfg(not(feature = "progress"))]
    {
        Box::new(LogProgress::default())
    }
}

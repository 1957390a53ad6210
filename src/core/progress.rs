//! Progress milestones for package loading.
//!
//! Purely observational: the reporter never influences the model.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// Phase boundaries reported to the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubTask {
    /// The first file parse started; the oracle finished its preparation.
    PreparationDone,
    /// Another power-of-two number of files was parsed. Arg: the count.
    NFilesParsed,
    /// Main and builtin queries are done. Arg: parsed file count.
    ParsePackagesDone,
    /// The flat package table is built. Arg: package count.
    CollectPackages,
    /// Modules are resolved. Arg: module count.
    CollectModules,
}

/// `(task, time since the previous reset, task args)`
pub type ProgressCallback<'a> = dyn Fn(SubTask, Duration, &[u32]) + Sync + 'a;

/// Measures elapsed time between milestones.
#[derive(Debug)]
pub struct StopWatch {
    last: Mutex<Instant>,
}

impl StopWatch {
    pub fn new() -> Self {
        Self {
            last: Mutex::new(Instant::now()),
        }
    }

    /// Time since the last reset; restarts the watch when `reset` is set.
    pub fn duration(&self, reset: bool) -> Duration {
        let mut last = self.last.lock().unwrap_or_else(|e| e.into_inner());
        let now = Instant::now();
        let elapsed = now.duration_since(*last);
        if reset {
            *last = now;
        }
        elapsed
    }
}

impl Default for StopWatch {
    fn default() -> Self {
        Self::new()
    }
}

/// Forwards milestones to an optional callback and counts parsed files.
///
/// `file_parsed` may be called from many oracle threads at once.
pub struct ProgressReporter<'a> {
    callback: Option<&'a ProgressCallback<'a>>,
    watch: StopWatch,
    parsed_files: AtomicU32,
}

impl<'a> ProgressReporter<'a> {
    pub fn new(callback: Option<&'a ProgressCallback<'a>>) -> Self {
        Self {
            callback,
            watch: StopWatch::new(),
            parsed_files: AtomicU32::new(0),
        }
    }

    pub fn report(&self, reset_watch: bool, task: SubTask, args: &[u32]) {
        if let Some(callback) = self.callback {
            callback(task, self.watch.duration(reset_watch), args);
        }
    }

    /// Count one parsed file, reporting at every power of two.
    pub fn file_parsed(&self) {
        let n = self.parsed_files.fetch_add(1, Ordering::Relaxed) + 1;
        if n & (n - 1) == 0 {
            if n == 1 {
                self.report(true, SubTask::PreparationDone, &[]);
            } else {
                self.report(false, SubTask::NFilesParsed, &[n]);
            }
        }
    }

    pub fn parsed_files(&self) -> u32 {
        self.parsed_files.load(Ordering::Relaxed)
    }
}

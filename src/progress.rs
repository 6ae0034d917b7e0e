//! Progress reporting for the tile exporter.
//!
//! The exporter emits [`ProgressEvent`]s to a
//! [`ProgressReport`]. Any `Fn(&ProgressEvent) + Sync`
//! closure is a report; [`Tracker`] shows a console spinner.

use std::fmt;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::Duration;

use indicatif::ProgressBar;
use tracing::{info, warn};

use crate::tiling::TilePlan;

const PROGRESS_UPDATE_MILLIS: u64 = 500;

#[derive(Debug)]
pub enum ProgressEvent<'a> {
    /// Emitted once, before the first tile is cropped.
    Planned { plan: &'a TilePlan },
    /// A tile was written. `index` is 1-based.
    TileWritten { index: usize, path: &'a Path },
    /// Emitted once after the last tile, or after the export
    /// stopped.
    Finished { written: usize },
}

pub trait ProgressReport: Sync {
    fn report(&self, event: &ProgressEvent<'_>);
}

impl<F> ProgressReport for F
where
    F: Fn(&ProgressEvent<'_>) + Sync,
{
    fn report(&self, event: &ProgressEvent<'_>) {
        self(event)
    }
}

/// Discards all events.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoProgress;

impl ProgressReport for NoProgress {
    fn report(&self, _: &ProgressEvent<'_>) {}
}

#[derive(Debug, Default)]
pub struct Counter {
    val: AtomicUsize,
}
impl Counter {
    pub fn load(&self) -> usize {
        self.val.load(Ordering::Acquire)
    }

    pub fn store(&self, val: usize) {
        self.val.store(val, Ordering::Release);
    }

    pub fn fetch_add(&self, inc: usize) -> usize {
        self.val.fetch_add(inc, Ordering::AcqRel)
    }
}
impl fmt::Display for Counter {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.load())
    }
}

#[derive(Debug)]
pub struct DetailCounter {
    pub total: Counter,
    pub processed: Counter,
    name: &'static str,
}
impl DetailCounter {
    pub fn new(name: &'static str) -> Self {
        DetailCounter {
            total: Default::default(),
            processed: Default::default(),
            name,
        }
    }
}
impl fmt::Display for DetailCounter {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "{}: completed {} of {}.",
            self.name,
            self.processed.load(),
            self.total.load()
        )
    }
}

#[derive(Debug, Default)]
pub struct Flag {
    val: AtomicBool,
}
impl Flag {
    pub fn load(&self) -> bool {
        self.val.load(Ordering::Acquire)
    }

    pub fn store(&self, val: bool) {
        self.val.store(val, Ordering::Release);
    }
}

/// A wrapper for a progress bar with a displayable
/// information. The value type `T` is typically a counter.
pub struct Progress<T> {
    pub bar: ProgressBar,
    pub value: T,
    done: Flag,
}
impl<T> Progress<T> {
    pub fn new(value: T) -> Self {
        let bar = {
            use indicatif::*;
            let progress = ProgressBar::new_spinner();
            progress.set_style(
                ProgressStyle::default_spinner().template("{spinner} [{elapsed_precise}] {msg}"),
            );
            progress
        };
        Progress {
            bar,
            value,
            done: Default::default(),
        }
    }

    pub fn done(&self) -> bool {
        self.done.load()
    }

    pub fn finish(&self) {
        self.done.store(true);
    }
}
impl<T: fmt::Display> Progress<T> {
    pub fn update_progress(&self) {
        self.bar.set_message(&format!("{}", self.value));
    }

    /// Blocks the current thread, and updates at the
    /// interval provided until `finish` is called in another
    /// thread.
    pub fn update_until_done(&self, timeout: Duration) {
        while !self.done() {
            self.update_progress();
            std::thread::park_timeout(timeout);
        }
        self.update_progress();
        self.bar.finish();
    }
}
impl<T: Send + Sync + fmt::Display + 'static> Progress<T> {
    pub fn spawn_auto_update_thread(self: Arc<Self>, timeout: Duration) -> JoinHandle<()> {
        std::thread::spawn(move || self.update_until_done(timeout))
    }
}

/// Console spinner counting written tiles.
pub struct Tracker {
    progress: Arc<Progress<DetailCounter>>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl Tracker {
    pub fn new(units: &'static str) -> Self {
        Tracker {
            progress: Arc::new(Progress::new(DetailCounter::new(units))),
            handle: Mutex::new(None),
        }
    }

    pub fn processed(&self) -> usize {
        self.progress.value.processed.load()
    }

    fn stop(&self) {
        self.progress.finish();
        let handle = self
            .handle
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take();
        if let Some(handle) = handle {
            handle.thread().unpark();
            if handle.join().is_err() {
                warn!("progress thread panicked");
            }
        }
    }
}

impl ProgressReport for Tracker {
    fn report(&self, event: &ProgressEvent<'_>) {
        match event {
            ProgressEvent::Planned { plan } => {
                info!(
                    "Number of tiles = {}, using tile length = ({},{}) pixels / ({},{}) meters",
                    plan.len(),
                    plan.tile_pixels.0,
                    plan.tile_pixels.1,
                    plan.tile_meters.0 as i64,
                    plan.tile_meters.1 as i64,
                );
                self.progress.value.total.store(plan.len());
                let mut handle = self.handle.lock().unwrap_or_else(|e| e.into_inner());
                if handle.is_none() {
                    *handle = Some(
                        self.progress
                            .clone()
                            .spawn_auto_update_thread(Duration::from_millis(PROGRESS_UPDATE_MILLIS)),
                    );
                }
            }
            ProgressEvent::TileWritten { .. } => {
                self.progress.value.processed.fetch_add(1);
            }
            ProgressEvent::Finished { .. } => self.stop(),
        }
    }
}

impl Drop for Tracker {
    fn drop(&mut self) {
        self.stop();
    }
}

//! The flush thread and the file collaborator it writes through.
//!
//! The thread sleeps on a condition variable for at most the flush interval.
//! It wakes early when a writer runs out of buffer space, when the settings
//! change, when someone asks for a flush, or on shutdown. Each pass opens the
//! destination, drains every registered buffer into it in registration-list
//! order, and closes it again.

use std::fs::OpenOptions;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use crate::trace::{debug, trace};

use super::fatal;
use super::pipeline::Shared;

/// Where flushed bytes end up.
///
/// The flush thread calls `open` once per pass, writes each buffer's pending
/// bytes to the returned writer, flushes it and drops it.
pub trait Sink: Send + 'static {
    fn open(&mut self, dest: &Path) -> io::Result<Box<dyn Write + '_>>;
}

/// Appends to the destination file, creating it if needed.
#[derive(Debug, Default, Clone, Copy)]
pub struct FileSink;

impl Sink for FileSink {
    fn open(&mut self, dest: &Path) -> io::Result<Box<dyn Write + '_>> {
        let file = OpenOptions::new().create(true).append(true).open(dest)?;
        Ok(Box::new(file))
    }
}

#[derive(Debug, Clone)]
pub(crate) struct FlushSettings {
    pub dest_file: PathBuf,
    pub interval: Duration,
}

#[derive(Debug)]
struct FlushState {
    settings: FlushSettings,
    /// `settings` differs from what the flush thread last loaded.
    changed: bool,
    /// A writer is waiting for space.
    wake: bool,
    /// `flush()` callers waiting on the next pass.
    flush_requests: u32,
    shutdown: bool,
}

impl FlushState {
    fn has_work(&self) -> bool {
        self.wake || self.changed || self.flush_requests > 0 || self.shutdown
    }
}

/// What the flush thread should do after waking.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Wakeup {
    /// Flush requests this pass answers.
    pub requests: u32,
    /// Drain one last time, then exit.
    pub shutdown: bool,
}

/// Settings and wakeup flags shared between writers and the flush thread.
#[derive(Debug)]
pub(crate) struct FlushControl {
    state: Mutex<FlushState>,
    cond: Condvar,
}

impl FlushControl {
    pub(crate) fn new(settings: FlushSettings) -> Self {
        Self {
            state: Mutex::new(FlushState {
                settings,
                changed: false,
                wake: false,
                flush_requests: 0,
                shutdown: false,
            }),
            cond: Condvar::new(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, FlushState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn update(&self, f: impl FnOnce(&mut FlushState)) {
        let mut state = self.lock();
        f(&mut state);
        drop(state);
        self.cond.notify_one();
    }

    pub(crate) fn wake(&self) {
        self.update(|state| state.wake = true);
    }

    pub(crate) fn set_dest_file(&self, dest_file: PathBuf) {
        self.update(|state| {
            state.settings.dest_file = dest_file;
            state.changed = true;
        });
    }

    pub(crate) fn set_interval(&self, interval: Duration) {
        self.update(|state| {
            state.settings.interval = interval;
            state.changed = true;
        });
    }

    pub(crate) fn dest_file(&self) -> PathBuf {
        self.lock().settings.dest_file.clone()
    }

    pub(crate) fn request_flush(&self) {
        self.update(|state| state.flush_requests += 1);
    }

    pub(crate) fn shutdown(&self) {
        self.update(|state| state.shutdown = true);
    }

    /// Sleeps until there is work or `current.interval` elapses, then picks up
    /// any settings change into `current`.
    pub(crate) fn wait(&self, current: &mut FlushSettings) -> Wakeup {
        let state = self.lock();
        let (mut state, _) = self
            .cond
            .wait_timeout_while(state, current.interval, |state| !state.has_work())
            .unwrap_or_else(PoisonError::into_inner);

        if state.changed {
            *current = state.settings.clone();
            state.changed = false;
            debug!(
                dest_file = %current.dest_file.display(),
                interval_ms = current.interval.as_millis() as u64,
                "flush settings reloaded"
            );
        }
        state.wake = false;

        Wakeup {
            requests: std::mem::take(&mut state.flush_requests),
            shutdown: state.shutdown,
        }
    }
}

/// Body of the `spool-flush` thread.
pub(crate) struct FlushThread<S> {
    shared: Arc<Shared>,
    sink: S,
    settings: FlushSettings,
}

impl<S: Sink> FlushThread<S> {
    pub(crate) fn new(shared: Arc<Shared>, sink: S, settings: FlushSettings) -> Self {
        Self {
            shared,
            sink,
            settings,
        }
    }

    pub(crate) fn run(mut self) {
        loop {
            let wakeup = self.shared.control.wait(&mut self.settings);
            self.drain_all();
            for _ in 0..wakeup.requests {
                self.shared.flushed.signal();
            }
            if wakeup.shutdown {
                break;
            }
        }
    }

    /// One pass: every buffer, oldest bytes first, through one open sink.
    #[cfg_attr(not(feature = "tracing"), allow(unused_variables, unused_assignments))]
    fn drain_all(&mut self) {
        let dest = &self.settings.dest_file;
        let mut out = match self.sink.open(dest) {
            Ok(out) => out,
            Err(err) => fatal(format_args!(
                "failed to open log file {}: {err}",
                dest.display()
            )),
        };

        let mut bytes = 0;
        for buffer in self.shared.registry.iter() {
            // SAFETY: this thread is the only consumer of every buffer.
            match unsafe { buffer.drain(&mut out) } {
                Ok(n) => bytes += n,
                Err(err) => fatal(format_args!(
                    "failed to write log file {}: {err}",
                    dest.display()
                )),
            }
        }

        if let Err(err) = out.flush() {
            fatal(format_args!(
                "failed to flush log file {}: {err}",
                dest.display()
            ));
        }
        trace!(bytes, "flush pass complete");
    }
}

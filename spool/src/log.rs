//! Asynchronous per-thread logging.
//!
//! Writers append raw bytes to a buffer owned by their thread and return
//! without touching the file. A background flush thread appends all buffers
//! to the destination file every flush interval, or sooner when a writer runs
//! out of space.
//!
//! Use a [`LogPipeline`] directly, or the process-wide facade below
//! ([`log_init`], [`log_write`], [`logf!`](crate::logf), [`log_quit`]).
//!
//! Misuse of a running pipeline, or an I/O failure while flushing, aborts the
//! process after reporting the problem on stderr.

mod buffer;
pub mod config;
pub mod flush;
pub mod pipeline;

use std::fmt;
use std::path::PathBuf;
use std::sync::{PoisonError, RwLock, RwLockReadGuard};
use std::time::Duration;

pub use config::LogConfig;
pub use flush::{FileSink, Sink};
pub use pipeline::{LogError, LogPipeline};

use crate::trace::{error, warn};

static GLOBAL: RwLock<Option<LogPipeline>> = RwLock::new(None);

/// Reports an unrecoverable logging error and aborts.
#[cold]
pub(crate) fn fatal(args: fmt::Arguments<'_>) -> ! {
    error!("{args}");
    eprintln!("spool: fatal: {args}");
    std::process::abort()
}

fn global() -> RwLockReadGuard<'static, Option<LogPipeline>> {
    GLOBAL.read().unwrap_or_else(PoisonError::into_inner)
}

fn with_global(f: impl FnOnce(&LogPipeline)) {
    match global().as_ref() {
        Some(pipeline) => f(pipeline),
        None => fatal(format_args!("logging used before log_init")),
    }
}

/// Starts the global logger with default settings, appending to `dest_file`.
///
/// Aborts if the logger is already running or can't be started.
pub fn log_init(dest_file: impl Into<PathBuf>) {
    log_init_with(LogConfig::new(dest_file));
}

/// Starts the global logger with `config`.
///
/// Aborts if the logger is already running or can't be started.
pub fn log_init_with(config: LogConfig) {
    let mut global = GLOBAL.write().unwrap_or_else(PoisonError::into_inner);
    if global.is_some() {
        fatal(format_args!("log_init called twice"));
    }
    match LogPipeline::start(config) {
        Ok(pipeline) => *global = Some(pipeline),
        Err(err) => fatal(format_args!("{err}")),
    }
}

/// Flushes everything and stops the global logger. Does nothing if it isn't
/// running.
///
/// Waits for in-flight writes to finish first. Logging again afterwards
/// requires another [`log_init`].
pub fn log_quit() {
    let pipeline = GLOBAL
        .write()
        .unwrap_or_else(PoisonError::into_inner)
        .take();
    match pipeline {
        Some(pipeline) => pipeline.shutdown(),
        None => warn!("log_quit called without a running logger"),
    }
}

/// Appends `bytes` to the calling thread's buffer of the global logger.
pub fn log_write(bytes: &[u8]) {
    with_global(|pipeline| pipeline.write(bytes));
}

/// Formats and appends one record to the global logger. See [`logf!`](crate::logf).
pub fn log_write_fmt(args: fmt::Arguments<'_>) {
    with_global(|pipeline| pipeline.write_fmt(args));
}

pub fn log_set_dest_file(dest_file: impl Into<PathBuf>) {
    with_global(|pipeline| pipeline.set_dest_file(dest_file));
}

pub fn log_set_flush_timeout(interval: Duration) {
    with_global(|pipeline| pipeline.set_flush_interval(interval));
}

/// Blocks until everything the calling thread logged has reached the file.
pub fn log_flush() {
    with_global(LogPipeline::flush);
}

/// `printf`-style logging through the global logger.
///
/// ```no_run
/// spool::log::log_init("app.log");
/// spool::logf!("request {} took {}ms\n", 17, 3);
/// spool::log::log_quit();
/// ```
#[macro_export]
macro_rules! logf {
    ($($arg:tt)*) => {
        $crate::log::log_write_fmt(::std::format_args!($($arg)*))
    };
}

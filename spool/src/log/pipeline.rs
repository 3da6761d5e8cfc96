//! The logging pipeline: lifecycle, writer entry points and errors.
//!
//! [`LogPipeline::start`] spawns the `spool-flush` thread; writes go to the
//! calling thread's buffer and never wait on I/O, only on buffer space.

use std::fmt;
use std::io::{self, Cursor};
use std::path::PathBuf;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crate::sync::os_semaphore::RawSemaphore;
use crate::trace::{debug, info};

use super::buffer::Registry;
use super::config::LogConfig;
use super::fatal;
use super::flush::{FileSink, FlushControl, FlushSettings, FlushThread, Sink};

/// Formatted messages up to this size never touch the heap.
const FORMAT_STACK_BUFFER: usize = 4096;

/// Shortest interval the flush thread will sleep for.
const MIN_FLUSH_INTERVAL: Duration = Duration::from_millis(1);

#[derive(Debug, thiserror::Error)]
pub enum LogError {
    #[error("failed to open log file {}: {source}", path.display())]
    Open {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to spawn flush thread: {0}")]
    Spawn(#[source] io::Error),

    #[error("buffer capacity 2^{0} is out of range")]
    CapacityOutOfRange(u32),
}

/// State shared by the writers and the flush thread.
pub(crate) struct Shared {
    pub registry: Registry,
    pub control: FlushControl,
    /// One unit per answered `flush()` request.
    pub flushed: RawSemaphore,
}

/// An asynchronous logger.
///
/// Each writing thread appends to its own lock-free buffer; a background
/// thread periodically appends every buffer to the destination file. Bytes
/// from one thread reach the file in the order they were written and a single
/// write is never split by another thread's bytes. There is no ordering across
/// threads.
///
/// Dropping the pipeline (or calling [`LogPipeline::shutdown`]) flushes
/// everything written so far and stops the flush thread.
///
/// # Example
///
/// ```no_run
/// use spool::log::{LogConfig, LogPipeline};
///
/// let pipeline = LogPipeline::start(LogConfig::new("app.log"))?;
/// pipeline.write(b"starting up\n");
/// write!(pipeline, "{} workers\n", 4);
/// pipeline.shutdown();
/// # Ok::<(), spool::log::LogError>(())
/// ```
pub struct LogPipeline {
    shared: Arc<Shared>,
    flush_handle: Option<JoinHandle<()>>,
}

impl LogPipeline {
    /// Starts a pipeline appending to `config.dest_file`.
    ///
    /// # Errors
    ///
    /// Fails if the buffer capacity is out of range, if the destination can't
    /// be opened, or if the flush thread can't be spawned.
    pub fn start(config: LogConfig) -> Result<Self, LogError> {
        Self::with_sink(config, FileSink)
    }

    /// Starts a pipeline that writes through `sink` instead of the filesystem.
    ///
    /// The destination is opened once up front so a bad path is reported here
    /// rather than from the flush thread.
    ///
    /// # Errors
    ///
    /// See [`LogPipeline::start`].
    pub fn with_sink<S: Sink>(config: LogConfig, mut sink: S) -> Result<Self, LogError> {
        config.validate()?;
        sink.open(&config.dest_file).map_err(|source| LogError::Open {
            path: config.dest_file.clone(),
            source,
        })?;

        let settings = FlushSettings {
            dest_file: config.dest_file,
            interval: config.flush_interval.max(MIN_FLUSH_INTERVAL),
        };
        let shared = Arc::new(Shared {
            registry: Registry::new(config.buffer_capacity_log2),
            control: FlushControl::new(settings.clone()),
            flushed: RawSemaphore::new(0),
        });

        debug!(
            dest_file = %settings.dest_file.display(),
            interval_ms = settings.interval.as_millis() as u64,
            buffer_capacity = 1u64 << config.buffer_capacity_log2,
            "spawning flush thread"
        );
        let flusher = FlushThread::new(Arc::clone(&shared), sink, settings);
        let flush_handle = thread::Builder::new()
            .name("spool-flush".into())
            .spawn(move || {
                info!("flush thread started");
                flusher.run();
                info!("flush thread exiting");
            })
            .map_err(LogError::Spawn)?;

        Ok(Self {
            shared,
            flush_handle: Some(flush_handle),
        })
    }

    /// Appends `bytes` to the calling thread's buffer.
    ///
    /// Blocks while the buffer doesn't have room, waking the flush thread
    /// early so it does. Aborts the process if `bytes` is larger than a whole
    /// buffer, since it could never fit.
    pub fn write(&self, bytes: &[u8]) {
        if bytes.is_empty() {
            return;
        }
        let buffer = self.shared.registry.local();
        if bytes.len() > buffer.capacity() {
            fatal(format_args!(
                "log write of {} bytes exceeds the {} byte thread buffer",
                bytes.len(),
                buffer.capacity()
            ));
        }
        if buffer.free_space() < bytes.len() {
            self.shared.control.wake();
        }
        // SAFETY: `local` returned the calling thread's own buffer.
        unsafe { buffer.append(bytes) };
    }

    /// Formats `args` and writes the result as one record.
    pub fn write_fmt(&self, args: fmt::Arguments<'_>) {
        if let Some(s) = args.as_str() {
            self.write(s.as_bytes());
            return;
        }

        let mut stack = [0u8; FORMAT_STACK_BUFFER];
        let mut cursor = Cursor::new(&mut stack[..]);
        if io::Write::write_fmt(&mut cursor, args).is_ok() {
            let len = cursor.position() as usize;
            self.write(&stack[..len]);
        } else {
            self.write(fmt::format(args).as_bytes());
        }
    }

    /// Switches the destination file, starting with the next flush pass.
    pub fn set_dest_file(&self, dest_file: impl Into<PathBuf>) {
        let dest_file = dest_file.into();
        debug!(dest_file = %dest_file.display(), "changing log destination");
        self.shared.control.set_dest_file(dest_file);
    }

    /// Changes how long bytes may sit in a buffer before a flush pass.
    pub fn set_flush_interval(&self, interval: Duration) {
        self.shared
            .control
            .set_interval(interval.max(MIN_FLUSH_INTERVAL));
    }

    /// Blocks until everything this thread wrote so far has reached the sink.
    pub fn flush(&self) {
        self.shared.control.request_flush();
        self.shared.flushed.wait();
    }

    /// Number of threads that have written through this pipeline.
    #[must_use]
    pub fn registered_buffers(&self) -> usize {
        self.shared.registry.len()
    }

    /// The file the next flush pass will write to.
    #[must_use]
    pub fn dest_file(&self) -> PathBuf {
        self.shared.control.dest_file()
    }

    /// Flushes every buffer one last time and stops the flush thread.
    pub fn shutdown(mut self) {
        self.stop();
    }

    fn stop(&mut self) {
        let Some(handle) = self.flush_handle.take() else {
            return;
        };
        info!("log pipeline shutdown initiated");
        self.shared.control.shutdown();
        debug!("waiting for flush thread to exit");
        if handle.join().is_err() {
            fatal(format_args!("flush thread panicked"));
        }
        info!(
            buffers = self.registered_buffers(),
            "log pipeline shutdown complete"
        );
    }
}

impl Drop for LogPipeline {
    fn drop(&mut self) {
        self.stop();
    }
}

impl fmt::Debug for LogPipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LogPipeline")
            .field("dest_file", &self.dest_file())
            .field("registered_buffers", &self.registered_buffers())
            .finish_non_exhaustive()
    }
}

/// Lets `write!`/`writeln!` target a shared pipeline reference.
impl io::Write for &LogPipeline {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        LogPipeline::write(self, buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        LogPipeline::flush(self);
        Ok(())
    }
}

//! Tracing hooks for the queues and the logging pipeline.
//!
//! Enable with `--features tracing`. All trace macros become no-ops when
//! the feature is disabled, so the hot paths pay nothing for them.
//!
//! These events describe the pipeline itself (buffer registration, flush
//! passes, configuration changes). They never go through the pipeline.

/// Installs a global subscriber that prints timestamped events to stderr.
///
/// Call this at the start of tests or the bench binary to enable trace output.
/// The filter comes from `RUST_LOG`, defaulting to `spool=trace`. Returns
/// `false` if a global subscriber was already installed, so repeated calls
/// are harmless. Does nothing if the `tracing` feature is not enabled.
#[cfg(feature = "tracing")]
pub fn init_tracing() -> bool {
    use tracing_subscriber::{EnvFilter, fmt, prelude::*};

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("spool=trace"));

    tracing_subscriber::registry()
        .with(
            fmt::layer()
                .with_writer(std::io::stderr)
                .with_thread_ids(true)
                .with_thread_names(true)
                .with_timer(fmt::time::uptime()),
        )
        .with(filter)
        .try_init()
        .is_ok()
}

#[cfg(not(feature = "tracing"))]
pub const fn init_tracing() -> bool {
    false
}

#[cfg(feature = "tracing")]
pub(crate) use tracing::{debug, error, info, trace, warn};

// Expands to `()` so a call still works where an expression is expected.
#[cfg(not(feature = "tracing"))]
macro_rules! discard {
    ($($arg:tt)*) => {
        ()
    };
}

#[cfg(not(feature = "tracing"))]
pub(crate) use {
    discard as debug, discard as error, discard as info, discard as trace, discard as warn,
};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_macros_work_in_expression_position() {
        let quiet = |running: Option<u32>| match running {
            Some(_) => debug!("running"),
            None => warn!("not running"),
        };
        quiet(Some(1));
        quiet(None);

        let level = 3;
        let () = if level > 2 {
            trace!(level, "verbose")
        } else {
            info!("quiet")
        };
        error!("{}", level);
    }
}

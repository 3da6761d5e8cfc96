//! End-to-end tests for the asynchronous log pipeline.
//!
//! # Running with tracing
//!
//! ```bash
//! RUST_LOG=spool=debug cargo test --features tracing --test log_pipeline -- --nocapture
//! ```

use std::fs;
use std::io::{self, Write};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex, Once};
use std::thread;
use std::time::Duration;

use spool::log::{LogConfig, LogError, LogPipeline, Sink};

static INIT_TRACING: Once = Once::new();

fn init_test_tracing() {
    INIT_TRACING.call_once(|| {
        spool::init_tracing();
    });
}

fn read(path: &Path) -> Vec<u8> {
    fs::read(path).unwrap_or_default()
}

#[test]
fn lines_reach_the_file_after_the_interval() {
    init_test_tracing();
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("interval.log");

    let config = LogConfig::new(&path).with_flush_interval(Duration::from_millis(50));
    let pipeline = LogPipeline::start(config).unwrap();

    let mut expected = Vec::new();
    for i in 0..100 {
        let line = format!("line {i:010}\n");
        assert_eq!(line.len(), 16);
        pipeline.write(line.as_bytes());
        expected.extend_from_slice(line.as_bytes());
    }

    thread::sleep(Duration::from_millis(200));
    assert_eq!(read(&path), expected);

    pipeline.shutdown();
    assert_eq!(read(&path), expected);
}

#[test]
fn threads_keep_their_own_order_and_lines_stay_whole() {
    init_test_tracing();
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("threads.log");

    // Small buffers so writers keep running into backpressure
    let config = LogConfig::new(&path)
        .with_flush_interval(Duration::from_millis(10))
        .with_buffer_capacity_log2(8);
    let pipeline = Arc::new(LogPipeline::start(config).unwrap());

    let writers: Vec<_> = ['a', 'b']
        .into_iter()
        .map(|tag| {
            let pipeline = Arc::clone(&pipeline);
            thread::spawn(move || {
                for seq in 0..1000 {
                    write!(pipeline, "{tag}:{seq:05}\n");
                }
            })
        })
        .collect();
    for w in writers {
        w.join().unwrap();
    }
    assert_eq!(pipeline.registered_buffers(), 2);

    Arc::into_inner(pipeline).unwrap().shutdown();

    let contents = String::from_utf8(read(&path)).unwrap();
    let mut next = [0u32; 2];
    for line in contents.lines() {
        let (tag, seq) = line.split_once(':').expect("torn line");
        let seq: u32 = seq.parse().expect("torn line");
        let slot = match tag {
            "a" => 0,
            "b" => 1,
            other => panic!("torn line: {other:?}"),
        };
        assert_eq!(seq, next[slot], "thread {tag} out of order");
        next[slot] += 1;
    }
    assert_eq!(next, [1000, 1000]);
}

#[test]
fn flush_returns_after_bytes_reach_the_file() {
    init_test_tracing();
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("flush.log");

    let config = LogConfig::new(&path).with_flush_interval(Duration::from_secs(3600));
    let pipeline = LogPipeline::start(config).unwrap();

    pipeline.write(b"before flush\n");
    pipeline.flush();
    assert_eq!(read(&path), b"before flush\n");

    pipeline.write(b"after flush\n");
    pipeline.flush();
    assert_eq!(read(&path), b"before flush\nafter flush\n");
}

#[test]
fn dest_file_can_change_while_running() {
    init_test_tracing();
    let dir = tempfile::tempdir().unwrap();
    let first = dir.path().join("first.log");
    let second = dir.path().join("second.log");

    let config = LogConfig::new(&first).with_flush_interval(Duration::from_secs(3600));
    let pipeline = LogPipeline::start(config).unwrap();

    pipeline.write(b"one\n");
    pipeline.flush();

    pipeline.set_dest_file(&second);
    assert_eq!(pipeline.dest_file(), second);
    pipeline.write(b"two\n");
    pipeline.flush();

    pipeline.set_flush_interval(Duration::from_millis(20));
    pipeline.write(b"three\n");
    thread::sleep(Duration::from_millis(150));

    assert_eq!(read(&first), b"one\n");
    assert_eq!(read(&second), b"two\nthree\n");
}

#[test]
fn dropping_the_pipeline_flushes_everything() {
    init_test_tracing();
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("drop.log");

    {
        let config = LogConfig::new(&path).with_flush_interval(Duration::from_secs(3600));
        let pipeline = LogPipeline::start(config).unwrap();
        pipeline.write(b"pending\n");
        pipeline.write(b"");
    }

    assert_eq!(read(&path), b"pending\n");
}

#[test]
fn long_formatted_records_are_written_whole() {
    init_test_tracing();
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("long.log");

    let pipeline = LogPipeline::start(LogConfig::new(&path)).unwrap();
    let long = "x".repeat(6000);
    write!(pipeline, "{}|{}\n", long, 7);
    write!(pipeline, "short {}\n", 1);
    pipeline.shutdown();

    let expected = format!("{long}|7\nshort 1\n");
    assert_eq!(read(&path), expected.as_bytes());
}

#[test]
fn start_reports_bad_configuration() {
    init_test_tracing();
    let dir = tempfile::tempdir().unwrap();

    let missing_dir = dir.path().join("no-such-dir").join("x.log");
    match LogPipeline::start(LogConfig::new(&missing_dir)) {
        Err(LogError::Open { path, .. }) => assert_eq!(path, missing_dir),
        other => panic!("expected open error, got {other:?}"),
    }

    let oversized = LogConfig::new(dir.path().join("x.log")).with_buffer_capacity_log2(40);
    assert!(matches!(
        LogPipeline::start(oversized),
        Err(LogError::CapacityOutOfRange(40))
    ));
}

/// Collects flushed bytes in memory; writes block while the gate is closed.
#[derive(Clone, Default)]
struct GatedSink {
    bytes: Arc<Mutex<Vec<u8>>>,
    gate: Arc<(Mutex<bool>, Condvar)>,
}

impl GatedSink {
    fn open_gate(&self) {
        let (open, cond) = &*self.gate;
        *open.lock().unwrap() = true;
        cond.notify_all();
    }
}

impl Sink for GatedSink {
    fn open(&mut self, _dest: &Path) -> io::Result<Box<dyn Write + '_>> {
        Ok(Box::new(GatedWriter { sink: &*self }))
    }
}

struct GatedWriter<'a> {
    sink: &'a GatedSink,
}

impl Write for GatedWriter<'_> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let (open, cond) = &*self.sink.gate;
        let _open = cond
            .wait_while(open.lock().unwrap(), |open| !*open)
            .unwrap();
        self.sink.bytes.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

#[test]
fn full_buffer_blocks_the_writer_until_flushed() {
    init_test_tracing();
    let sink = GatedSink::default();
    let config = LogConfig::new("gated.log")
        .with_flush_interval(Duration::from_secs(3600))
        .with_buffer_capacity_log2(6);
    let pipeline = Arc::new(LogPipeline::with_sink(config, sink.clone()).unwrap());

    let filled = Arc::new(AtomicBool::new(false));
    let second_done = Arc::new(AtomicBool::new(false));
    let writer = {
        let pipeline = Arc::clone(&pipeline);
        let filled = Arc::clone(&filled);
        let second_done = Arc::clone(&second_done);
        thread::spawn(move || {
            pipeline.write(&[b'a'; 64]);
            filled.store(true, Ordering::Release);
            pipeline.write(&[b'b'; 16]);
            second_done.store(true, Ordering::Release);
        })
    };

    while !filled.load(Ordering::Acquire) {
        thread::sleep(Duration::from_millis(1));
    }
    thread::sleep(Duration::from_millis(50));
    assert!(!second_done.load(Ordering::Acquire));
    assert!(sink.bytes.lock().unwrap().is_empty());

    sink.open_gate();
    writer.join().unwrap();
    assert!(second_done.load(Ordering::Acquire));

    Arc::into_inner(pipeline).unwrap().shutdown();
    let mut expected = vec![b'a'; 64];
    expected.extend_from_slice(&[b'b'; 16]);
    assert_eq!(*sink.bytes.lock().unwrap(), expected);
}

//! Queue throughput and latency benchmark.
//!
//! Usage:
//!     cargo run --release --bin queue_bench
//!
//! Environment variables:
//!     PRODUCER_CPU=0  Pin the SPSC producer to CPU 0 (default: 0)
//!     CONSUMER_CPU=2  Pin the SPSC consumer to CPU 2 (default: 2)
//!     THREADS=4       Producers and consumers each for the MPMC run
//!                     (default: half the logical CPUs)

use std::env;
use std::hint;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;

use minstant::Instant;
use spool::sync::{mpmc::MpmcQueue, spmc, spsc};

const QUEUE_SIZE_LOG2: u32 = 16;
const ITERATIONS: u64 = 1 << 24;

type Payload = u64;

fn env_usize(name: &str) -> Option<usize> {
    env::var(name).ok().and_then(|s| s.parse().ok())
}

fn get_cpu_affinity() -> (Option<usize>, Option<usize>) {
    (
        env_usize("PRODUCER_CPU").or(Some(0)),
        env_usize("CONSUMER_CPU").or(Some(2)),
    )
}

fn pin_to_cpu(cpu: Option<usize>) {
    if let Some(id) = cpu {
        core_affinity::set_for_current(core_affinity::CoreId { id });
    }
}

fn report(name: &str, items: u64, start: Instant) {
    let elapsed = start.elapsed();
    let ops_per_ms = u128::from(items) * 1_000_000 / elapsed.as_nanos().max(1);
    println!("  {name:<18} {ops_per_ms:>8} ops/ms");
}

fn bench_spsc_throughput(producer_cpu: Option<usize>, consumer_cpu: Option<usize>) {
    let (producer, consumer) = spsc::channel::<Payload>(QUEUE_SIZE_LOG2);
    let ready = Arc::new(AtomicBool::new(false));
    let ready_clone = Arc::clone(&ready);

    let consumer_thread = thread::spawn(move || {
        pin_to_cpu(consumer_cpu);
        ready_clone.store(true, Ordering::Release);

        for expected in 0..ITERATIONS {
            loop {
                if let Some(value) = consumer.pop() {
                    assert_eq!(value, expected, "data corruption");
                    break;
                }
                hint::spin_loop();
            }
        }
    });

    while !ready.load(Ordering::Acquire) {
        hint::spin_loop();
    }
    pin_to_cpu(producer_cpu);

    let start = Instant::now();
    for i in 0..ITERATIONS {
        let mut item = i;
        while let Err(returned) = producer.push(item) {
            item = returned;
            hint::spin_loop();
        }
    }
    consumer_thread.join().unwrap();
    report("spsc", ITERATIONS, start);
}

fn bench_spsc_rtt(producer_cpu: Option<usize>, consumer_cpu: Option<usize>) {
    let rounds = ITERATIONS >> 4;
    let (ping_tx, ping_rx) = spsc::channel::<Payload>(QUEUE_SIZE_LOG2);
    let (pong_tx, pong_rx) = spsc::channel::<Payload>(QUEUE_SIZE_LOG2);

    let responder = thread::spawn(move || {
        pin_to_cpu(consumer_cpu);
        for _ in 0..rounds {
            loop {
                if let Some(value) = ping_rx.pop() {
                    pong_tx.push(value).unwrap();
                    break;
                }
                hint::spin_loop();
            }
        }
    });

    pin_to_cpu(producer_cpu);
    let start = Instant::now();
    for i in 0..rounds {
        ping_tx.push(i).unwrap();
        while pong_rx.pop().is_none() {
            hint::spin_loop();
        }
    }
    let elapsed = start.elapsed();
    responder.join().unwrap();

    println!(
        "  {:<18} {:>8} ns RTT",
        "spsc ping-pong",
        elapsed.as_nanos() / u128::from(rounds)
    );
}

fn bench_spmc(consumers: usize) {
    let (producer, consumer) = spmc::channel::<Payload>(QUEUE_SIZE_LOG2);

    let workers: Vec<_> = (0..consumers)
        .map(|_| {
            let consumer = consumer.clone();
            thread::spawn(move || {
                let mut seen = 0u64;
                loop {
                    match consumer.pop() {
                        Some(Payload::MAX) => return seen,
                        Some(_) => seen += 1,
                        None => hint::spin_loop(),
                    }
                }
            })
        })
        .collect();

    let start = Instant::now();
    for i in (0..ITERATIONS).chain(std::iter::repeat_n(Payload::MAX, consumers)) {
        let mut item = i;
        while let Err(returned) = producer.push(item) {
            item = returned;
            hint::spin_loop();
        }
    }
    let total: u64 = workers.into_iter().map(|w| w.join().unwrap()).sum();
    assert_eq!(total, ITERATIONS, "items lost or duplicated");
    report(&format!("spmc 1x{consumers}"), ITERATIONS, start);
}

fn bench_mpmc(threads: usize) {
    let queue = Arc::new(MpmcQueue::<Payload>::new(QUEUE_SIZE_LOG2));
    let per_producer = ITERATIONS / threads as u64;

    let start = Instant::now();
    let producers: Vec<_> = (0..threads)
        .map(|_| {
            let queue = Arc::clone(&queue);
            thread::spawn(move || {
                for i in 0..per_producer {
                    queue.push(i);
                }
            })
        })
        .collect();
    let consumers: Vec<_> = (0..threads)
        .map(|_| {
            let queue = Arc::clone(&queue);
            thread::spawn(move || {
                for _ in 0..per_producer {
                    hint::black_box(queue.pop());
                }
            })
        })
        .collect();

    for h in producers.into_iter().chain(consumers) {
        h.join().unwrap();
    }
    report(
        &format!("mpmc {threads}x{threads}"),
        per_producer * threads as u64,
        start,
    );
}

fn main() {
    let (producer_cpu, consumer_cpu) = get_cpu_affinity();
    let threads = env_usize("THREADS").unwrap_or_else(|| (num_cpus::get() / 2).max(1));

    println!(
        "spool queues (size=2^{}, iters={}):",
        QUEUE_SIZE_LOG2, ITERATIONS
    );
    bench_spsc_throughput(producer_cpu, consumer_cpu);
    bench_spsc_rtt(producer_cpu, consumer_cpu);
    bench_spmc(threads);
    bench_mpmc(threads);
}

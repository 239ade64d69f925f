use super::*;
use std::sync::Arc;
use std::thread;

#[test]
fn log2_buckets() {
    assert_eq!(log2_bucket(0), 0);
    assert_eq!(log2_bucket(1), 0);
    assert_eq!(log2_bucket(2), 1);
    assert_eq!(log2_bucket(3), 1);
    assert_eq!(log2_bucket(4), 2);
    assert_eq!(log2_bucket(1023), 9);
    assert_eq!(log2_bucket(1024), 10);
    assert_eq!(log2_bucket(u64::MAX), HISTOGRAM_BUCKETS - 1);
}

#[test]
fn latency_aggregates() {
    let metrics = Metrics::new();
    assert_eq!(metrics.snapshot().time_min, 0);
    for ns in [900u64, 100, 5_000] {
        metrics.observe_latency(ns);
    }
    let snapshot = metrics.snapshot();
    assert_eq!(snapshot.time_min, 100);
    assert_eq!(snapshot.time_max, 5_000);
    assert_eq!(snapshot.time_sum, 6_000);
    assert_eq!(snapshot.time_count, 3);
    assert_eq!(snapshot.mean_ns(), Some(2_000));
    assert_eq!(snapshot.histogram[log2_bucket(100)], 1);
    assert_eq!(snapshot.histogram[log2_bucket(900)], 1);
    assert_eq!(snapshot.histogram.iter().sum::<u64>(), 3);
}

#[test]
fn concurrent_increments_are_not_lost() {
    let metrics = Arc::new(Metrics::with_shards(4));
    let workers: Vec<_> = (0..8)
        .map(|_| {
            let metrics = Arc::clone(&metrics);
            thread::spawn(move || {
                for i in 0..1_000u64 {
                    metrics.increment(Outcome::Received);
                    if i % 2 == 0 {
                        metrics.increment(Outcome::Transmitted);
                    }
                    metrics.observe_latency(i + 1);
                }
            })
        })
        .collect();
    for worker in workers {
        worker.join().unwrap();
    }
    let snapshot = metrics.snapshot();
    assert_eq!(snapshot.received, 8_000);
    assert_eq!(snapshot.outcome(Outcome::Transmitted), 4_000);
    assert_eq!(snapshot.time_count, 8_000);
    assert_eq!(snapshot.time_min, 1);
    assert_eq!(snapshot.time_max, 1_000);
}

#[test]
fn reset_clears_everything() {
    let metrics = Metrics::with_shards(0);
    metrics.increment(Outcome::Errored);
    metrics.increment(Outcome::Passed);
    metrics.observe_latency(42);
    metrics.reset();
    assert_eq!(metrics.snapshot(), MetricsSnapshot::default());
    assert_eq!(metrics.snapshot().mean_ns(), None);
}

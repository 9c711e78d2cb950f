//! Redzone poisoner throughput.
//!
//! Measures `poison_partial_right_redzone` across redzone lengths at both
//! granularities, with per-sample percentiles printed as
//! `POISON_BENCH` lines.

use std::cell::RefCell;
use std::time::{Duration, Instant};

use criterion::{BenchmarkId, Criterion, Throughput, black_box, criterion_group, criterion_main};
use shadowsan_core::{
    DEFAULT_GRANULARITY, Granularity, ShadowMagic, WIDE_GRANULARITY, encode_granule,
    poison_partial_right_redzone, shadow_len,
};

#[derive(Default)]
struct BenchStats {
    samples_ns_per_op: Vec<f64>,
}

impl BenchStats {
    fn record(&mut self, iters: u64, dur: Duration) {
        self.samples_ns_per_op
            .push(dur.as_nanos() as f64 / iters as f64);
    }

    fn report(&self, granularity: usize, bench_label: &str) {
        let mut samples = self.samples_ns_per_op.clone();
        if samples.is_empty() {
            return;
        }
        samples.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
        let mean = samples.iter().sum::<f64>() / samples.len() as f64;
        println!(
            "POISON_BENCH g={} bench={} samples={} p50_ns_op={:.3} p99_ns_op={:.3} mean_ns_op={:.3}",
            granularity,
            bench_label,
            samples.len(),
            percentile_sorted(&samples, 0.50),
            percentile_sorted(&samples, 0.99),
            mean
        );
    }
}

fn percentile_sorted(sorted: &[f64], p: f64) -> f64 {
    let idx = ((sorted.len() - 1) as f64 * p).round() as usize;
    sorted[idx.min(sorted.len() - 1)]
}

fn bench_poisoner(c: &mut Criterion) {
    let mut group = c.benchmark_group("poison_partial_right_redzone");
    for granularity in [DEFAULT_GRANULARITY, WIDE_GRANULARITY] {
        for redzone in [32_usize, 128, 1024, 4096] {
            if redzone < granularity.bytes() {
                continue;
            }
            let mut shadow = vec![0_u8; shadow_len(redzone, granularity)];
            let size = redzone / 2 + 3;
            group.throughput(Throughput::Bytes(redzone as u64));

            let label = format!("rz{redzone}");
            let stats = RefCell::new(BenchStats::default());
            group.bench_function(BenchmarkId::new(&label, granularity.bytes()), |b| {
                b.iter_custom(|iters| {
                    let start = Instant::now();
                    for _ in 0..iters {
                        poison_partial_right_redzone(
                            black_box(&mut shadow),
                            black_box(size),
                            redzone,
                            granularity,
                            ShadowMagic::HeapRightRedzone,
                        );
                    }
                    let dur = start.elapsed().max(Duration::from_nanos(1));
                    stats.borrow_mut().record(iters, dur);
                    dur
                });
            });
            stats.borrow().report(granularity.bytes(), &label);
        }
    }
    group.finish();
}

fn bench_encode(c: &mut Criterion) {
    let mut group = c.benchmark_group("encode_granule");
    group.throughput(Throughput::Elements(1));
    for g in [8_usize, 128] {
        let granularity = Granularity::new(g).unwrap_or(DEFAULT_GRANULARITY);
        group.bench_function(BenchmarkId::new("encode", g), |b| {
            let mut offset = 0_usize;
            b.iter(|| {
                offset = (offset + granularity.bytes()) % (4 * granularity.bytes());
                black_box(encode_granule(
                    black_box(offset),
                    black_box(2 * g + 1),
                    granularity,
                    ShadowMagic::GlobalRedzone,
                ))
            });
        });
    }
    group.finish();
}

criterion_group!(
    name = benches;
    config = Criterion::default()
        .warm_up_time(Duration::from_millis(100))
        .measurement_time(Duration::from_secs(2))
        .sample_size(100);
    targets = bench_poisoner, bench_encode
);
criterion_main!(benches);

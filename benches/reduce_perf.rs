//! Frame statistic reduction benchmarks
//!
//! Measures sealing and reducing a 60-second, 60Hz window with and without
//! compositor counters, plus the series summary over 1000 launch timings.

use criterion::{Criterion, criterion_group, criterion_main};
use perf_probe::{
    model::CompositorCounters,
    perf::MetricSummary,
    probe::{MeasurementWindow, Sample},
};
use std::hint::black_box;

const TICKS: u64 = 3600;

fn sixty_seconds(with_counters: bool) -> Vec<Sample> {
    (0..TICKS)
        .map(|i| Sample {
            timestamp_ms: i as f64 * 1000.0 / 60.0,
            counters:     with_counters.then_some(CompositorCounters {
                composition_frames: i,
                composition_fps:    60.0,
                transaction_frames: i / 2,
                transaction_fps:    30.0,
            }),
        })
        .collect()
}

fn seal(samples: &[Sample]) -> perf_probe::probe::SealedWindow {
    let mut window = MeasurementWindow::new();
    for sample in samples {
        window.push(*sample);
    }
    window.seal()
}

fn bench_reduce_timestamps(c: &mut Criterion) {
    let window = seal(&sixty_seconds(false));

    c.bench_function("reduce_60s_timestamps", |b| {
        b.iter(|| {
            black_box(&window).reduce().unwrap();
        });
    });
}

fn bench_reduce_counters(c: &mut Criterion) {
    let window = seal(&sixty_seconds(true));

    c.bench_function("reduce_60s_counters", |b| {
        b.iter(|| {
            black_box(&window).reduce().unwrap();
        });
    });
}

fn bench_series_summary(c: &mut Criterion) {
    let values: Vec<f64> = (0..1000).map(|i| 200.0 + f64::from(i % 97) * 1.5).collect();

    c.bench_function("summarize_1000_launches", |b| {
        b.iter(|| {
            MetricSummary::from_values(black_box(values.clone())).unwrap();
        });
    });
}

criterion_group!(
    benches,
    bench_reduce_timestamps,
    bench_reduce_counters,
    bench_series_summary
);
criterion_main!(benches);

//! Benchmarks for synchronized multi-signal reads
//!
//! Measures:
//! - Reading equal-rate signals on a shared domain
//! - Reading signals whose rates need per-signal dividers
//! - Initial synchronization dropping pre-roll samples
//!
//! Platform: Cross-platform (synthetic packets, CI-safe)

use criterion::{BatchSize, BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use daq_reader::test_utils::{send_ramp, test_signal};
use daq_reader::{MultiReader, MultiReaderBuilder, Signal};
use std::hint::black_box;
use std::time::Duration;

const COMMON_SAMPLES: usize = 1024;

struct Setup {
    _signals: Vec<Signal>,
    reader: MultiReader,
    buffers: Vec<Vec<f64>>,
}

/// Build a reader over signals with `deltas` and queue `COMMON_SAMPLES` common samples each.
fn setup(deltas: &[i64], pre_roll: i64) -> Setup {
    let signals: Vec<Signal> =
        deltas.iter().enumerate().map(|(i, &delta)| test_signal(&format!("ai{}", i), delta)).collect();
    let mut builder = MultiReaderBuilder::<f64, i64>::new();
    for signal in &signals {
        builder.add_signal(signal);
    }
    let reader: MultiReader = builder.build().expect("reader");
    let dividers = reader.sample_rate_dividers();

    let mut buffers = Vec::with_capacity(signals.len());
    for ((signal, &delta), divider) in signals.iter().zip(deltas).zip(dividers) {
        let count = COMMON_SAMPLES * divider;
        // Every signal but the first starts `pre_roll` ticks later.
        let offset = if buffers.is_empty() { 0 } else { pre_roll };
        let extra = (pre_roll / delta) as usize + 1;
        send_ramp(signal, offset, 0, count + extra).expect("send");
        buffers.push(vec![0.0; count]);
    }
    Setup { _signals: signals, reader, buffers }
}

fn read_all(setup: &mut Setup) -> usize {
    let mut columns: Vec<&mut [f64]> = setup.buffers.iter_mut().map(|b| b.as_mut_slice()).collect();
    let status = setup.reader.read(&mut columns, COMMON_SAMPLES, Duration::ZERO).expect("read");
    status.count
}

fn bench_rates(c: &mut Criterion) {
    let mut group = c.benchmark_group("multi_reader_rates");
    group.throughput(Throughput::Elements(COMMON_SAMPLES as u64));

    let cases: [(&str, &[i64]); 3] =
        [("equal_x4", &[1, 1, 1, 1]), ("mixed_1_2_5", &[1, 2, 5]), ("mixed_1_10_100", &[1, 10, 100])];
    for (name, deltas) in cases {
        group.bench_with_input(BenchmarkId::new("read", name), deltas, |b, deltas| {
            b.iter_batched(|| setup(deltas, 0), |mut setup| black_box(read_all(&mut setup)), BatchSize::SmallInput)
        });
    }

    group.finish();
}

fn bench_initial_sync(c: &mut Criterion) {
    let mut group = c.benchmark_group("multi_reader_sync");

    for pre_roll in [0i64, 1_000, 10_000] {
        group.bench_with_input(BenchmarkId::new("pre_roll_ticks", pre_roll), &pre_roll, |b, &pre_roll| {
            b.iter_batched(
                || setup(&[1, 2], pre_roll),
                |mut setup| black_box(read_all(&mut setup)),
                BatchSize::SmallInput,
            )
        });
    }

    group.finish();
}

criterion_group!(benches, bench_rates, bench_initial_sync);
criterion_main!(benches);

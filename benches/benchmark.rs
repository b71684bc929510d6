use criterion::{black_box, criterion_group, criterion_main, Criterion};
use collatz_explorer::*;
use num_bigint::BigInt;
use num_traits::One;

fn bench_step_small(c: &mut Criterion) {
    let n = BigInt::from(27u64);

    c.bench_function("step n=27", |b| {
        b.iter(|| step(black_box(&n)))
    });
}

fn bench_accelerated_step_threshold(c: &mut Criterion) {
    let n = trivial_threshold() + 1u32;

    c.bench_function("accelerated step 2^68+1", |b| {
        b.iter(|| accelerated_step(black_box(&n)))
    });
}

fn bench_accelerated_step_large(c: &mut Criterion) {
    let n = (BigInt::one() << 10000u32) - 1u32;

    c.bench_function("accelerated step 2^10000-1", |b| {
        b.iter(|| accelerated_step(black_box(&n)))
    });
}

fn bench_trace_27(c: &mut Criterion) {
    let start = BigInt::from(27u64);

    c.bench_function("trace 27->1 (unaccelerated)", |b| {
        b.iter(|| trace(black_box(&start), 1000, StepKind::Unaccelerated))
    });
}

fn bench_trace_threshold(c: &mut Criterion) {
    let start = trivial_threshold() + 1u32;

    c.bench_function("trace 2^68+1 (accelerated)", |b| {
        b.iter(|| trace(black_box(&start), DEFAULT_SEARCH_CAP, StepKind::Accelerated))
    });
}

criterion_group!(
    benches,
    bench_step_small,
    bench_accelerated_step_threshold,
    bench_accelerated_step_large,
    bench_trace_27,
    bench_trace_threshold,
);
criterion_main!(benches);

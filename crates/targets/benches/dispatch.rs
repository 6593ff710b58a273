//! Dispatch overhead benchmarks
//!
//! Run: `cargo bench -p targets`
//! Native: `RUSTFLAGS='-C target-cpu=native' cargo bench -p targets`

use core::hint::black_box;

use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use targets::{chosen_target, dynamic_dispatch, isa::Isa, supported_targets};

fn sum_impl<I: Isa>(xs: &[u32]) -> u64 {
  xs.iter().map(|&x| u64::from(x)).sum()
}

dynamic_dispatch! {
  fn sum(xs: &[u32]) -> u64 = sum_impl;
}

fn bench_selection(c: &mut Criterion) {
  let mut group = c.benchmark_group("selection");

  chosen_target().update();
  group.bench_function("get_index", |b| b.iter(|| black_box(chosen_target().get_index())));
  group.bench_function("supported_targets", |b| b.iter(|| black_box(supported_targets())));

  group.finish();
}

fn bench_call(c: &mut Criterion) {
  let mut group = c.benchmark_group("call");

  for size in [0usize, 16, 256, 4096] {
    let data: Vec<u32> = (0..size as u32).collect();
    group.throughput(Throughput::Elements(size as u64));

    group.bench_with_input(BenchmarkId::new("dispatched", size), &data, |b, data| {
      b.iter(|| sum(black_box(data)))
    });
    group.bench_with_input(BenchmarkId::new("direct", size), &data, |b, data| {
      b.iter(|| sum_impl::<targets::isa::Scalar>(black_box(data)))
    });
  }

  group.finish();
}

criterion_group!(benches, bench_selection, bench_call);
criterion_main!(benches);

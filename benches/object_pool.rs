/// Object Pool Benchmarks
///
/// Measures the hot-path cost of pooled trace records against plain heap
/// allocation, single-threaded and under contention.
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tracekeeper::object_handle::HandlePool;
use tracekeeper::pool_factory::create_recyclable_pool;
use tracekeeper::records::SpanRecord;

fn filled_span(span: &mut SpanRecord, i: usize) {
    span.set_name_owned(format!("syscall_{}", i));
    span.add_attribute_static("syscall.result", "0".to_string());
    span.timestamp_nanos = 1234567890;
    span.duration_nanos = 1000;
}

/// Benchmark: Direct heap allocation (baseline)
fn bench_heap_allocation(c: &mut Criterion) {
    let mut group = c.benchmark_group("heap_allocation");
    group.measurement_time(Duration::from_secs(5));
    group.throughput(Throughput::Elements(1000));

    group.bench_function("alloc_1000_spans", |b| {
        b.iter(|| {
            let mut spans = Vec::with_capacity(1000);
            for i in 0..1000 {
                let mut span = SpanRecord::default();
                filled_span(&mut span, i);
                spans.push(span);
            }
            black_box(spans);
        });
    });

    group.finish();
}

/// Benchmark: Pooled allocation with warm pool
fn bench_pool_allocation(c: &mut Criterion) {
    let mut group = c.benchmark_group("pool_allocation");
    group.measurement_time(Duration::from_secs(5));
    group.throughput(Throughput::Elements(1000));

    group.bench_function("acquire_1000_spans", |b| {
        let pool = create_recyclable_pool::<SpanRecord>(1024);
        b.iter(|| {
            let mut spans = Vec::with_capacity(1000);
            for i in 0..1000 {
                let mut span = pool.create_instance();
                filled_span(&mut span, i);
                spans.push(span);
            }
            for span in spans {
                pool.recycle(span);
            }
        });
    });

    group.finish();
}

/// Benchmark: Single create/recycle cycle
fn bench_pool_cycle(c: &mut Criterion) {
    let mut group = c.benchmark_group("pool_cycle");
    group.measurement_time(Duration::from_secs(5));
    group.throughput(Throughput::Elements(1));

    group.bench_function("create_recycle", |b| {
        let pool = create_recyclable_pool::<SpanRecord>(1024);
        b.iter(|| {
            let span = pool.create_instance();
            black_box(&span);
            pool.recycle(span);
        });
    });

    group.bench_function("handle_acquire_release", |b| {
        let handles = HandlePool::new(1024, || Vec::<u8>::with_capacity(256));
        b.iter(|| {
            let buf = handles.acquire();
            black_box(&*buf);
        });
    });

    group.finish();
}

/// Benchmark: Pool with different sizes
fn bench_pool_sizes(c: &mut Criterion) {
    let mut group = c.benchmark_group("pool_sizes");
    group.measurement_time(Duration::from_secs(5));

    for size in [128, 512, 2048, 4096].iter() {
        group.bench_with_input(BenchmarkId::from_parameter(size), size, |b, &size| {
            let pool = create_recyclable_pool::<SpanRecord>(size);
            b.iter(|| {
                // Hold half the pool
                let spans: Vec<_> = (0..size / 2).map(|_| pool.create_instance()).collect();
                for span in spans {
                    pool.recycle(span);
                }
            });
        });
    }

    group.finish();
}

/// Benchmark: Contended create/recycle across threads
fn bench_contended(c: &mut Criterion) {
    let mut group = c.benchmark_group("contended");
    group.measurement_time(Duration::from_secs(10));
    group.sample_size(30);

    for threads in [2, 4, 8].iter() {
        group.throughput(Throughput::Elements((*threads * 1000) as u64));
        group.bench_with_input(
            BenchmarkId::from_parameter(threads),
            threads,
            |b, &threads| {
                let pool = Arc::new(create_recyclable_pool::<SpanRecord>(1024));
                b.iter(|| {
                    let workers: Vec<_> = (0..threads)
                        .map(|_| {
                            let pool = pool.clone();
                            thread::spawn(move || {
                                for _ in 0..1000 {
                                    let span = pool.create_instance();
                                    pool.recycle(black_box(span));
                                }
                            })
                        })
                        .collect();
                    for worker in workers {
                        worker.join().unwrap();
                    }
                });
            },
        );
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_heap_allocation,
    bench_pool_allocation,
    bench_pool_cycle,
    bench_pool_sizes,
    bench_contended
);

criterion_main!(benches);

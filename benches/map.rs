use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use splinter::HashMap;
use std::hint::black_box;
use std::sync::Arc;
use std::thread;

const ITER: u64 = 32 * 1024;

fn insert_u64_u64(c: &mut Criterion) {
    let mut group = c.benchmark_group("insert_u64_u64");
    group.throughput(Throughput::Elements(ITER));
    let max = thread::available_parallelism().map_or(1, |n| n.get());

    for threads in 1..=max {
        group.bench_with_input(
            BenchmarkId::from_parameter(threads),
            &threads,
            |b, &threads| {
                b.iter(|| {
                    let map = Arc::new(HashMap::<u64, u64>::new());
                    let inc = ITER / threads as u64;
                    let handles: Vec<_> = (0..threads as u64)
                        .map(|t| {
                            let map = Arc::clone(&map);
                            thread::spawn(move || {
                                let guard = map.guard();
                                let start = t * inc;
                                for i in start..(start + inc) {
                                    map.insert(i, i + 7, &guard);
                                }
                            })
                        })
                        .collect();
                    for handle in handles {
                        handle.join().unwrap();
                    }
                    map
                })
            },
        );
    }

    group.finish();
}

fn get_u64_u64(c: &mut Criterion) {
    let mut group = c.benchmark_group("get_u64_u64");
    group.throughput(Throughput::Elements(ITER));

    let map = HashMap::<u64, u64>::new();
    {
        let guard = map.guard();
        for i in 0..ITER {
            map.insert(i, i + 7, &guard);
        }
    }

    group.bench_function("guard_once", |b| {
        let guard = map.guard();
        b.iter(|| {
            for i in 0..ITER {
                black_box(map.get(&i, &guard));
            }
        })
    });

    group.bench_function("guard_every_it", |b| {
        b.iter(|| {
            for i in 0..ITER {
                black_box(map.get(&i, &map.guard()));
            }
        })
    });

    group.finish();
}

criterion_group!(benches, insert_u64_u64, get_u64_u64);
criterion_main!(benches);

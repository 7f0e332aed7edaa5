use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use wire_runtime::{Runtime, Stack, WireConfig};

fn runtime() -> Runtime {
    Runtime::new(WireConfig::new()).unwrap()
}

fn bench_spawn_run(c: &mut Criterion) {
    c.bench_function("spawn_run_empty_task", |b| {
        let rt = runtime();
        b.iter(|| {
            rt.spawn("empty", Stack::new(16 * 1024).unwrap(), |_| {});
            black_box(rt.run().unwrap());
        });
    });
}

fn bench_yield(c: &mut Criterion) {
    let mut group = c.benchmark_group("yield");

    for tasks in [1u64, 2, 16] {
        const YIELDS: u64 = 10_000;
        group.throughput(Throughput::Elements(tasks * YIELDS));
        group.bench_with_input(BenchmarkId::new("round_robin", tasks), &tasks, |b, &tasks| {
            let rt = runtime();
            b.iter(|| {
                for _ in 0..tasks {
                    rt.spawn_default("yielder", |w| {
                        for _ in 0..YIELDS {
                            w.yield_now();
                        }
                    })
                    .unwrap();
                }
                black_box(rt.run().unwrap());
            });
        });
    }

    group.finish();
}

criterion_group!(benches, bench_spawn_run, bench_yield);
criterion_main!(benches);

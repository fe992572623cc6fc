use std::convert::Infallible;

use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};
use futures::StreamExt;
use sluice_pool::PoolBuilder;
use tokio::runtime::{Handle, Runtime};

const ITEMS: u64 = 1_000;

async fn run_pool(num_workers: usize, max_concurrent: usize) {
    let pool = PoolBuilder::new(Handle::current())
        .num_workers(num_workers)
        .max_concurrent(max_concurrent)
        .queue_size(64)
        .build(|item: u64| async move { Ok::<_, Infallible>(item.wrapping_mul(item)) })
        .expect("the configuration is valid");

    pool.run().expect("the pool is freshly created");

    let collector = tokio::spawn(pool.collect().count());

    for item in 0..ITEMS {
        pool.submit(item).await.expect("the pool is open");
    }
    pool.close();
    pool.wait().await;

    assert_eq!(collector.await.unwrap(), ITEMS as usize);
}

fn bench_pool(c: &mut Criterion) {
    let mut group = c.benchmark_group("pool");

    for (num_workers, max_concurrent) in [(1, 1), (4, 2), (8, 8)] {
        group.bench_with_input(
            BenchmarkId::from_parameter(format!("{num_workers}w/{max_concurrent}c")),
            &(num_workers, max_concurrent),
            |b, &(num_workers, max_concurrent)| {
                let runtime = Runtime::new().unwrap();
                b.iter(|| runtime.block_on(run_pool(num_workers, max_concurrent)));
            },
        );
    }

    group.finish();
}

criterion_group!(benches, bench_pool);
criterion_main!(benches);

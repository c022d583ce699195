use core::hint::black_box;
use criterion::{Criterion, Throughput, criterion_group, criterion_main};
use futures::future::try_join_all;
use snippy::{
    IdentityConfig, MemoryStore, NoopObserver, Result, ServiceContext, ShortIdGenerator,
    SnippetDraft, SnippetService, SystemClock, ThreadRandom, TokioYield, UniquenessProbe,
    UsernameGenerator,
};
use std::{sync::Arc, time::Instant};
use tokio::runtime::{Builder, Runtime};

// Number of identifiers or operations per benchmark iteration.
const TOTAL_OPS: usize = 4096;

// Favorites issued concurrently against one snippet.
const FANS: usize = 256;

struct FreeProbe;

impl UniquenessProbe for FreeProbe {
    async fn exists(&self, _candidate: &str) -> Result<bool> {
        Ok(false)
    }
}

struct TakenProbe;

impl UniquenessProbe for TakenProbe {
    async fn exists(&self, _candidate: &str) -> Result<bool> {
        Ok(true)
    }
}

fn runtime(workers: usize) -> Runtime {
    Builder::new_multi_thread()
        .enable_all()
        .worker_threads(workers)
        .build()
        .unwrap()
}

fn context() -> Arc<ServiceContext> {
    Arc::new(
        ServiceContext::with_components(
            &IdentityConfig::default(),
            ThreadRandom,
            SystemClock,
            Arc::new(NoopObserver),
        )
        .unwrap(),
    )
}

fn bench_candidates(c: &mut Criterion) {
    let mut group = c.benchmark_group("candidate");
    group.throughput(Throughput::Elements(TOTAL_OPS as u64));

    let short_ids = ShortIdGenerator::new(ThreadRandom);
    group.bench_function(format!("short_id/elems/{TOTAL_OPS}"), |b| {
        b.iter(|| {
            for _ in 0..TOTAL_OPS {
                black_box(short_ids.candidate());
            }
        });
    });

    let usernames = UsernameGenerator::new(ThreadRandom);
    group.bench_function(format!("username/elems/{TOTAL_OPS}"), |b| {
        b.iter(|| {
            for _ in 0..TOTAL_OPS {
                let base = usernames.base(Some("Ada Lovelace"));
                black_box(usernames.candidate(&base));
            }
        });
    });

    group.finish();
}

/// First-attempt acceptance: the common path.
fn bench_assign_free(c: &mut Criterion) {
    let mut group = c.benchmark_group("assign/free");
    group.throughput(Throughput::Elements(TOTAL_OPS as u64));

    group.bench_function(format!("short_id/elems/{TOTAL_OPS}"), |b| {
        let rt = runtime(1);
        let context = context();
        b.to_async(&rt).iter_custom(|iters| {
            let context = Arc::clone(&context);
            async move {
                let start = Instant::now();
                for _ in 0..iters {
                    for _ in 0..TOTAL_OPS {
                        let assignment = context.assign_short_id(&FreeProbe, None).await.unwrap();
                        black_box(assignment);
                    }
                }
                start.elapsed()
            }
        });
    });

    group.finish();
}

/// Every candidate collides. Backoff is replaced by a yield so the number
/// measures probe and fallback overhead, not timer resolution.
fn bench_assign_exhausted(c: &mut Criterion) {
    let mut group = c.benchmark_group("assign/exhausted");
    group.throughput(Throughput::Elements(TOTAL_OPS as u64));

    group.bench_function(format!("short_id/elems/{TOTAL_OPS}"), |b| {
        let rt = runtime(1);
        let context = context();
        b.to_async(&rt).iter_custom(|iters| {
            let context = Arc::clone(&context);
            async move {
                let start = Instant::now();
                for _ in 0..iters {
                    for _ in 0..TOTAL_OPS {
                        let assignment = context
                            .assign_short_id_with::<TokioYield, _>(&TakenProbe, None)
                            .await
                            .unwrap();
                        black_box(assignment);
                    }
                }
                start.elapsed()
            }
        });
    });

    group.finish();
}

/// Concurrent favorites on one snippet through the in-memory store.
fn bench_contended_favorites(c: &mut Criterion) {
    let mut group = c.benchmark_group("service/favorite");
    group.throughput(Throughput::Elements(FANS as u64));
    group.sample_size(20);

    group.bench_function(format!("contended/elems/{FANS}"), |b| {
        let rt = runtime(4);
        b.to_async(&rt).iter_custom(|iters| async move {
            let mut total = core::time::Duration::ZERO;
            for _ in 0..iters {
                let service = Arc::new(SnippetService::new(MemoryStore::new(), context()));
                let mut fans = Vec::with_capacity(FANS);
                for i in 0..FANS {
                    let user = service
                        .register_user(Some("Fan"), &format!("bench|{i}"))
                        .await
                        .unwrap();
                    fans.push(user.id);
                }
                let snippet = service
                    .create_snippet(fans[0], SnippetDraft::titled("bench"))
                    .await
                    .unwrap();

                let start = Instant::now();
                let tasks = fans.into_iter().map(|fan| {
                    let service = Arc::clone(&service);
                    let short_id = snippet.short_id.clone();
                    tokio::spawn(async move { service.toggle_favorite(fan, &short_id).await })
                });
                for toggled in try_join_all(tasks).await.unwrap() {
                    black_box(toggled.unwrap());
                }
                total += start.elapsed();
            }
            total
        });
    });

    group.finish();
}

criterion_group!(
    benches,
    bench_candidates,
    bench_assign_free,
    bench_assign_exhausted,
    bench_contended_favorites,
);
criterion_main!(benches);

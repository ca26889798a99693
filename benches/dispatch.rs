//! Dispatch and bookkeeping benchmarks.

use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use gridio::metadata::FileStat;
use gridio::plugin::{Backend, Operation, Registry};
use gridio::{BackendResult, Context, DescriptorTable, DispatchConfig, FileHandle, MetadataCache};
use rustix::fs::Mode;
use std::hint::black_box;
use std::sync::Arc;

struct Scheme {
    name: String,
    scheme: String,
    priority: i32,
}

impl Backend for Scheme {
    fn name(&self) -> &str {
        &self.name
    }

    fn priority(&self) -> i32 {
        self.priority
    }

    fn check_url(&self, url: &str, _operation: Operation) -> BackendResult<bool> {
        Ok(url.starts_with(&self.scheme))
    }

    fn stat(&self, _url: &str) -> BackendResult<FileStat> {
        Ok(FileStat::regular(Mode::from_raw_mode(0o644), 1))
    }
}

fn registry_with(count: usize) -> Registry {
    let registry = Registry::new(DispatchConfig::in_process());
    for i in 0..count {
        registry.register(Box::new(Scheme {
            name: format!("backend{i}"),
            scheme: format!("proto{i}://"),
            priority: i as i32,
        }));
    }
    registry
}

fn bench_find_for(c: &mut Criterion) {
    let mut group = c.benchmark_group("find_for");

    for count in [1, 8, 32] {
        let registry = registry_with(count);
        // Lowest priority, so every predicate runs.
        let url = "proto0://host/path".to_string();
        registry.discover_and_load().unwrap();

        group.throughput(Throughput::Elements(1));
        group.bench_with_input(BenchmarkId::from_parameter(count), &url, |b, url| {
            b.iter(|| black_box(registry.find_for(url, Operation::Stat).unwrap()));
        });
    }

    group.finish();
}

fn bench_stat_dispatch(c: &mut Criterion) {
    let context = Context::new(DispatchConfig::in_process());
    context.register_backend(Scheme {
        name: "mock".to_string(),
        scheme: "mock://".to_string(),
        priority: 0,
    });

    c.bench_function("stat_dispatch", |b| {
        b.iter(|| black_box(context.stat("mock://host/file").unwrap()));
    });
}

fn bench_descriptor_table(c: &mut Criterion) {
    let mut group = c.benchmark_group("descriptor_table");

    let table = DescriptorTable::new("file", usize::MAX);
    let handle = Arc::new(FileHandle::new("mock", ()));
    group.throughput(Throughput::Elements(1));
    group.bench_function("insert_remove", |b| {
        b.iter(|| {
            let key = table.insert(handle.clone()).unwrap();
            black_box(table.remove(key).unwrap());
        });
    });

    let table = Arc::new(DescriptorTable::new("file", usize::MAX));
    group.throughput(Throughput::Elements(400));
    group.bench_function("4_threads_100_ops_each", |b| {
        b.iter(|| {
            let handles: Vec<_> = (0..4)
                .map(|_| {
                    let table = Arc::clone(&table);
                    std::thread::spawn(move || {
                        let handle = Arc::new(FileHandle::new("mock", ()));
                        for _ in 0..100 {
                            let key = table.insert(handle.clone()).unwrap();
                            black_box(table.get(key).unwrap());
                            table.remove(key).unwrap();
                        }
                    })
                })
                .collect();

            for h in handles {
                h.join().unwrap();
            }
        });
    });

    group.finish();
}

fn bench_metadata_cache(c: &mut Criterion) {
    let cache = MetadataCache::new(5000);
    let stat = FileStat::regular(Mode::from_raw_mode(0o644), 1);

    c.bench_function("cache_add_take", |b| {
        b.iter(|| {
            cache.add("srm://se/pnfs/file", stat.clone());
            black_box(cache.take_one("srm://se/pnfs/file").unwrap());
        });
    });
}

criterion_group!(
    benches,
    bench_find_for,
    bench_stat_dispatch,
    bench_descriptor_table,
    bench_metadata_cache
);
criterion_main!(benches);

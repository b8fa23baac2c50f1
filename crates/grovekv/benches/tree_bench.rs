use criterion::{criterion_group, criterion_main, BatchSize, Criterion};
use grovekv::{Config, Tree};
use tempfile::tempdir;

const N_KEYS: usize = 10_000;
const VALUE_SIZE: usize = 100;

fn populated_tree() -> (tempfile::TempDir, Tree) {
    let dir = tempdir().unwrap();
    let conf = Config::new(dir.path()).build().unwrap();
    let tree = Tree::new(conf).unwrap();
    for i in 0..N_KEYS {
        tree.put(format!("key{i}").as_bytes(), &vec![b'x'; VALUE_SIZE])
            .unwrap();
    }
    (dir, tree)
}

fn put_benchmark(c: &mut Criterion) {
    c.bench_function("tree_put_10k", |b| {
        b.iter_batched(
            || {
                let dir = tempdir().unwrap();
                let conf = Config::new(dir.path()).build().unwrap();
                let tree = Tree::new(conf).unwrap();
                (dir, tree)
            },
            |(_dir, tree)| {
                for i in 0..N_KEYS {
                    tree.put(format!("key{i}").as_bytes(), &vec![b'x'; VALUE_SIZE])
                        .unwrap();
                }
                tree.close();
            },
            BatchSize::SmallInput,
        );
    });
}

fn get_hit_benchmark(c: &mut Criterion) {
    c.bench_function("tree_get_hit_10k", |b| {
        b.iter_batched(
            populated_tree,
            |(_dir, tree)| {
                for i in 0..N_KEYS {
                    let v = tree.get(format!("key{i}").as_bytes()).unwrap();
                    assert!(v.is_some());
                }
                tree.close();
            },
            BatchSize::LargeInput,
        );
    });
}

fn get_miss_benchmark(c: &mut Criterion) {
    c.bench_function("tree_get_miss_10k", |b| {
        b.iter_batched(
            populated_tree,
            |(_dir, tree)| {
                for i in 0..N_KEYS {
                    let v = tree.get(format!("absent{i}").as_bytes()).unwrap();
                    assert!(v.is_none());
                }
                tree.close();
            },
            BatchSize::LargeInput,
        );
    });
}

criterion_group!(benches, put_benchmark, get_hit_benchmark, get_miss_benchmark);
criterion_main!(benches);

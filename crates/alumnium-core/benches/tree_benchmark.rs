//! Accessibility Tree Benchmarks
//!
//! Measures the work done on every do/check/get call:
//! - Rendering a snapshot for the model prompt
//! - Fingerprinting and area scoping
//! - Instruction cache lookups

use criterion::{BenchmarkId, Criterion, black_box, criterion_group, criterion_main};

use alumnium_core::interpreter::InstructionCache;
use alumnium_core::{AccessibilityTree, AxNode, DriverAction};

/// A page of `sections` navigation blocks, each holding ten links
fn page(sections: u32) -> AccessibilityTree {
    let mut nodes = vec![AxNode::new(1, "document", "Benchmark page")];
    let mut next = 2;

    for s in 0..sections {
        let section = next;
        nodes.push(AxNode::new(section, "navigation", format!("Section {}", s)).with_parent(1));
        next += 1;

        for l in 0..10 {
            nodes.push(
                AxNode::new(next, "link", format!("Link {}-{}", s, l))
                    .with_parent(section)
                    .with_attribute("href", format!("/s{}/l{}", s, l)),
            );
            next += 1;
        }
    }

    AccessibilityTree::from_nodes(nodes).expect("benchmark ids are unique")
}

fn bench_tree_rendering(c: &mut Criterion) {
    let mut group = c.benchmark_group("tree_rendering");

    for sections in [10u32, 100] {
        let tree = page(sections);

        group.bench_with_input(BenchmarkId::new("to_text", sections), &tree, |b, tree| {
            b.iter(|| black_box(tree.to_text()))
        });

        group.bench_with_input(BenchmarkId::new("fingerprint", sections), &tree, |b, tree| {
            b.iter(|| black_box(tree.fingerprint()))
        });

        group.bench_with_input(BenchmarkId::new("subtree", sections), &tree, |b, tree| {
            b.iter(|| black_box(tree.subtree(black_box(2))))
        });
    }

    group.finish();
}

fn bench_instruction_cache(c: &mut Criterion) {
    let mut group = c.benchmark_group("instruction_cache");

    let fingerprint = page(10).fingerprint();
    let mut cache = InstructionCache::in_memory();
    for i in 0..500 {
        let key = InstructionCache::key(&format!("click link {}", i), &fingerprint);
        cache.insert(key, vec![DriverAction::Click { id: i + 2 }]);
    }

    group.bench_function("hit", |b| {
        b.iter(|| {
            let key = InstructionCache::key(black_box("Click Link 250"), &fingerprint);
            black_box(cache.get(&key).is_some())
        })
    });

    group.bench_function("miss", |b| {
        b.iter(|| {
            let key = InstructionCache::key(black_box("open the settings"), &fingerprint);
            black_box(cache.get(&key).is_none())
        })
    });

    group.finish();
}

criterion_group!(benches, bench_tree_rendering, bench_instruction_cache);
criterion_main!(benches);

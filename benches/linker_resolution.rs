//! Benchmarks for reference resolution and barrel re-export chasing
//! (component 4.G), run under the `service` feature alongside the rest of
//! the watcher/persistence wiring it would run next to in a real deployment.
//!
//! Run with: cargo bench --bench linker_resolution --features service

use std::collections::HashMap;

use criterion::{criterion_group, criterion_main, Criterion};
use ingestor_core::linker::{
    chase_reexports, resolve_reference, AliasTable, FileProbe, LinkOutcome, RawReference, ReferenceKind,
    DEFAULT_MAX_CHASE_DEPTH,
};

struct FakeFs(HashMap<String, String>);

impl FileProbe for FakeFs {
    fn exists(&self, path: &str) -> bool {
        self.0.contains_key(path)
    }

    fn read_to_string(&self, path: &str) -> Option<String> {
        self.0.get(path).cloned()
    }
}

fn flat_fs() -> FakeFs {
    let mut files = HashMap::new();
    files.insert("/proj/src/button.ext".to_string(), "function render() {}".to_string());
    FakeFs(files)
}

fn barrel_chain_fs(depth: usize) -> FakeFs {
    let mut files = HashMap::new();
    for i in 0..depth {
        files.insert(
            format!("/proj/src/f{i}.ext"),
            format!(r#"export {{ widget }} from "./f{}""#, i + 1),
        );
    }
    files.insert(
        format!("/proj/src/f{depth}.ext"),
        "function widget() {}".to_string(),
    );
    FakeFs(files)
}

fn bench_resolve_direct_reference(c: &mut Criterion) {
    let fs = flat_fs();
    let aliases = AliasTable::new();
    let reference = RawReference {
        kind: ReferenceKind::Import,
        symbols: vec![],
        is_local: true,
        raw_path: "./button".to_string(),
        line: 1,
    };
    c.bench_function("resolve_reference_direct", |b| {
        b.iter(|| resolve_reference(&reference, "/proj/src", &aliases, &["ext"], &fs, DEFAULT_MAX_CHASE_DEPTH));
    });
}

fn bench_resolve_external_package(c: &mut Criterion) {
    let fs = flat_fs();
    let aliases = AliasTable::new();
    let reference = RawReference {
        kind: ReferenceKind::Import,
        symbols: vec!["useState".to_string()],
        is_local: false,
        raw_path: "react".to_string(),
        line: 1,
    };
    c.bench_function("resolve_reference_external", |b| {
        b.iter(|| resolve_reference(&reference, "/proj/src", &aliases, &["ext"], &fs, DEFAULT_MAX_CHASE_DEPTH));
    });
}

fn bench_chase_shallow_barrel(c: &mut Criterion) {
    let fs = barrel_chain_fs(2);
    let aliases = AliasTable::new();
    c.bench_function("chase_reexports_depth_2", |b| {
        b.iter(|| {
            chase_reexports(
                "/proj/src/f0.ext",
                "widget",
                &aliases,
                &["ext"],
                &fs,
                DEFAULT_MAX_CHASE_DEPTH,
            )
        });
    });
}

fn bench_chase_deep_barrel(c: &mut Criterion) {
    let fs = barrel_chain_fs(DEFAULT_MAX_CHASE_DEPTH - 1);
    let aliases = AliasTable::new();
    c.bench_function("chase_reexports_depth_9", |b| {
        b.iter(|| {
            let outcome = chase_reexports(
                "/proj/src/f0.ext",
                "widget",
                &aliases,
                &["ext"],
                &fs,
                DEFAULT_MAX_CHASE_DEPTH,
            );
            assert!(!outcome.depth_exceeded);
        });
    });
}

fn bench_resolve_through_barrel(c: &mut Criterion) {
    let fs = barrel_chain_fs(5);
    let aliases = AliasTable::new();
    let reference = RawReference {
        kind: ReferenceKind::Import,
        symbols: vec!["widget".to_string()],
        is_local: true,
        raw_path: "./f0".to_string(),
        line: 1,
    };
    c.bench_function("resolve_reference_through_barrel", |b| {
        b.iter(|| {
            let outcome = resolve_reference(&reference, "/proj/src", &aliases, &["ext"], &fs, DEFAULT_MAX_CHASE_DEPTH);
            assert!(matches!(outcome, LinkOutcome::Resolved { .. }));
        });
    });
}

criterion_group! {
    name = benches;
    config = Criterion::default();
    targets =
        bench_resolve_direct_reference,
        bench_resolve_external_package,
        bench_chase_shallow_barrel,
        bench_chase_deep_barrel,
        bench_resolve_through_barrel,
}

criterion_main!(benches);

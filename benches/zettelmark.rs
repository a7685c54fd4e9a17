//! Performance benchmarks for the rendering pipeline and the index worker
//!
//! Measures:
//! - Zettelmarkup parsing and cleanup
//! - Evaluation with transclusions
//! - Encoding to HTML and sz
//! - Indexing a directory box from scratch
//!
//! Run with: cargo bench

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use std::{path::PathBuf, sync::Arc};
use tempfile::TempDir;
use zettel_core::{
    boxes::{manager::Manager, memory::MemBox, ZettelBox},
    config::Config,
    context::Context,
    encoder::{encode_blocks_to_string, EncoderOptions, Encoding},
    eval::evaluate_zettel,
    id::Zid,
    meta::Meta,
    parser::{self, parse_zettel},
    zettel::Zettel,
};

const SECTION: &str = "=== Section heading
Some **strong** and __emphasised__ text with a [[link|20240101000002]] and ``code``.
* first item
* second item with [[an external link|https://example.org/]]
** nested item

|=Name|=Value
|alpha|1
|beta|2

```rust
fn main() {}
```
";

fn document(sections: usize) -> String {
    SECTION.repeat(sections)
}

fn zettel(n: u64, content: &str) -> Zettel {
    let mut meta = Meta::new(Zid::from_u64(n).unwrap_or(Zid::INVALID));
    meta.set("title", &format!("Zettel {n}"));
    meta.set("syntax", "zmk");
    Zettel::new(meta, content)
}

fn bench_parse(c: &mut Criterion) {
    let mut group = c.benchmark_group("parse_zmk");
    for sections in [1, 10, 100] {
        let src = document(sections);
        group.bench_with_input(BenchmarkId::from_parameter(sections), &src, |b, src| {
            b.iter(|| parser::parse_blocks(src.as_bytes(), &Meta::new(Zid::INVALID), "zmk"))
        });
    }
    group.finish();
}

fn bench_encode(c: &mut Criterion) {
    let blocks = parser::parse_blocks(document(50).as_bytes(), &Meta::new(Zid::INVALID), "zmk");
    let options = EncoderOptions::default();
    for encoding in [Encoding::Html, Encoding::Sz, Encoding::Text, Encoding::Zmk] {
        c.bench_function(&format!("encode_{encoding}"), |b| {
            b.iter(|| encode_blocks_to_string(encoding, &options, &blocks).unwrap())
        });
    }
}

fn bench_evaluate(c: &mut Criterion) {
    let ctx = Context::background();
    let mem = MemBox::with_limits(1, 1024, 16 * 1024 * 1024);
    let transcluding = (2..=20)
        .map(|n| format!("{{{{{{{}}}}}}}\n\n", 20240101000000 + n))
        .collect::<String>();
    mem.update_zettel(&ctx, zettel(20240101000001, &transcluding))
        .unwrap();
    for n in 2..=20 {
        mem.update_zettel(&ctx, zettel(20240101000000 + n, &document(2)))
            .unwrap();
    }
    let manager = Manager::with_boxes(vec![Arc::new(mem)], &Config::default());
    let root = manager
        .get_zettel(&ctx, Zid::from_u64(20240101000001).unwrap())
        .unwrap();

    c.bench_function("evaluate_transclusions", |b| {
        b.iter(|| {
            let mut parsed = parse_zettel(&root, "", None);
            evaluate_zettel(&ctx, &manager, None, &mut parsed);
            parsed.ast.len()
        })
    });
}

fn setup_dir_box(count: u64) -> (TempDir, PathBuf) {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().to_path_buf();
    for n in 1..=count {
        let text = format!("title: Zettel {n}\nsyntax: zmk\n\n{}", document(3));
        std::fs::write(path.join(format!("{}.zmk", 20240101000000 + n)), text).unwrap();
    }
    (temp_dir, path)
}

fn bench_index_directory(c: &mut Criterion) {
    let rt = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap();
    let (_temp_dir, path) = setup_dir_box(200);
    let config = Config {
        box_uri: vec![format!("dir://{}", path.display())],
        ..Config::default()
    };

    c.bench_function("index_directory_200", |b| {
        b.to_async(&rt).iter(|| async {
            let manager = Manager::new(&config).unwrap();
            let ctx = Context::background();
            manager.start(&ctx).unwrap();
            manager.wait_idle().await;
            let indexed = manager.read_stats().indexed_zettel;
            manager.stop(&ctx);
            indexed
        });
    });
}

criterion_group!(
    benches,
    bench_parse,
    bench_encode,
    bench_evaluate,
    bench_index_directory
);
criterion_main!(benches);

//! Shared test utilities for integration tests.
//!
//! Import from integration test files as:
//! ```ignore
//! mod common;
//! ```

use std::path::{Path, PathBuf};
use tempfile::TempDir;
use zettel_core::{id::Zid, meta::Meta, zettel::Zettel};

/// Initialize tracing for tests, respecting RUST_LOG env var.
///
/// Safe to call multiple times; subsequent calls are no-ops.
#[allow(dead_code)]
pub fn init_logging() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init()
        .ok();
}

#[allow(dead_code)]
pub fn zid(n: u64) -> Zid {
    Zid::from_u64(n).unwrap()
}

/// Builds a zettel from a title, a syntax and its content. `n == 0` leaves the identifier to
/// the box.
#[allow(dead_code)]
pub fn zettel(n: u64, title: &str, syntax: &str, content: &str) -> Zettel {
    let mut meta = Meta::new(Zid::from_u64(n).unwrap_or(Zid::INVALID));
    meta.set("title", title);
    meta.set("syntax", syntax);
    Zettel::new(meta, content)
}

/// Create a directory box holding two linked zettel.
///
/// `20240101000001.zmk` links to `20240101000002.zmk`; both carry an inline metadata header.
#[allow(dead_code)]
pub fn create_test_box(temp_dir: &TempDir) -> PathBuf {
    let box_path = temp_dir.path().join("box");
    std::fs::create_dir(&box_path).unwrap();

    write_file(
        &box_path,
        "20240101000001.zmk",
        "title: Index\ntags: #start\n\nSee [[the note|20240101000002]] about apples.\n",
    );
    write_file(
        &box_path,
        "20240101000002.zmk",
        "title: Note\n\n=== Apples\nApples grow on trees.\n",
    );

    box_path
}

#[allow(dead_code)]
pub fn write_file(dir: &Path, name: &str, content: &str) {
    std::fs::write(dir.join(name), content).unwrap();
}

/// A minimal valid PNG: one transparent pixel.
#[allow(dead_code)]
pub const PNG_1X1: [u8; 67] = [
    0x89, 0x50, 0x4e, 0x47, 0x0d, 0x0a, 0x1a, 0x0a, 0x00, 0x00, 0x00, 0x0d, 0x49, 0x48, 0x44,
    0x52, 0x00, 0x00, 0x00, 0x01, 0x00, 0x00, 0x00, 0x01, 0x08, 0x06, 0x00, 0x00, 0x00, 0x1f,
    0x15, 0xc4, 0x89, 0x00, 0x00, 0x00, 0x0a, 0x49, 0x44, 0x41, 0x54, 0x78, 0x9c, 0x63, 0x00,
    0x01, 0x00, 0x00, 0x05, 0x00, 0x01, 0x0d, 0x0a, 0x2d, 0xb4, 0x00, 0x00, 0x00, 0x00, 0x49,
    0x45, 0x4e, 0x44, 0xae, 0x42, 0x60, 0x82,
];

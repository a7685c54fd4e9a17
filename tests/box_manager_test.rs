//! Integration tests for the box manager over directory and memory boxes.
//!
//! These tests drive the public API only: starting the manager, waiting for the index worker,
//! reading enriched metadata, and writing through the first writable box.

mod common;

use common::{create_test_box, zettel, zid};
use parking_lot::Mutex;
use pretty_assertions::assert_eq;
use std::sync::Arc;
use tempfile::TempDir;
use test_log::test;
use zettel_core::{
    boxes::{
        dir::DirBox, manager::Manager, memory::MemBox, UpdateInfo, UpdateReason, ZettelBox,
    },
    config::Config,
    context::Context,
    query::Query,
    ZettelError,
};

fn dir_config(path: &std::path::Path) -> Config {
    Config {
        box_uri: vec![format!("dir://{}", path.display())],
        ..Config::default()
    }
}

#[test(tokio::test)]
async fn directory_box_is_indexed_on_start() {
    let temp_dir = TempDir::new().unwrap();
    let path = create_test_box(&temp_dir);
    let manager = Manager::new(&dir_config(&path)).unwrap();
    let ctx = Context::background();
    manager.start(&ctx).unwrap();
    manager.wait_idle().await;

    let note = manager.get_meta(&ctx, zid(20240101000002)).unwrap();
    assert_eq!(note.get("title"), Some("Note"));
    assert_eq!(note.get("back-ref"), Some("20240101000001"));
    assert_eq!(note.get("box-number"), Some("1"));

    let index = manager.get_meta(&ctx, zid(20240101000001)).unwrap();
    assert_eq!(index.get("fwd-ref"), Some("20240101000002"));
    assert_eq!(index.get("all-tags"), Some("#start"));

    let found: Vec<_> = manager
        .select_meta(&ctx, &Query::parse("apples"))
        .unwrap()
        .into_iter()
        .map(|m| m.zid())
        .collect();
    assert_eq!(found, vec![zid(20240101000002), zid(20240101000001)]);

    let stats = manager.read_stats();
    assert!(stats.started);
    assert_eq!(stats.boxes.len(), 3);
    assert_eq!(stats.boxes[0].zettel, 2);
    assert!(stats.indexed_zettel >= 2);
    assert!(stats.words > 0);
    manager.stop(&ctx);
    assert!(!manager.read_stats().started);
}

#[test(tokio::test)]
async fn created_zettel_land_in_the_directory() {
    let temp_dir = TempDir::new().unwrap();
    let path = create_test_box(&temp_dir);
    let manager = Manager::new(&dir_config(&path)).unwrap();
    let ctx = Context::background();
    manager.start(&ctx).unwrap();
    manager.wait_idle().await;

    let new_zid = manager
        .create_zettel(&ctx, zettel(0, "Fresh", "zmk", "A zettel about quinces."))
        .unwrap();
    assert!(new_zid.is_valid());
    assert!(path.join(format!("{new_zid}.zmk")).is_file());

    manager.wait_idle().await;
    let found = manager.select_meta(&ctx, &Query::parse("quinces")).unwrap();
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].zid(), new_zid);
    assert!(found[0].has("created"));

    manager.delete_zettel(&ctx, new_zid).unwrap();
    assert!(!path.join(format!("{new_zid}.zmk")).exists());
    manager.wait_idle().await;
    assert!(manager
        .select_meta(&ctx, &Query::parse("quinces"))
        .unwrap()
        .is_empty());
    manager.stop(&ctx);
}

#[test]
fn updates_of_read_only_zettel_go_to_an_earlier_writable_box() {
    let temp_dir = TempDir::new().unwrap();
    let path = create_test_box(&temp_dir);
    let ctx = Context::background();
    let mem = Arc::new(MemBox::new(1));
    let dir = Arc::new(DirBox::new(&path, true, 2));
    dir.start(&ctx).unwrap();
    let manager = Manager::with_boxes(vec![mem.clone(), dir], &Config::default());

    let mut note = manager.get_zettel(&ctx, zid(20240101000002)).unwrap();
    assert_eq!(note.meta.get("box-number"), Some("2"));
    note.content = "Rewritten".into();
    assert!(manager.can_update_zettel(&ctx, &note));
    manager.update_zettel(&ctx, note).unwrap();

    assert!(mem.has_zettel(&ctx, zid(20240101000002)));
    let current = manager.get_zettel(&ctx, zid(20240101000002)).unwrap();
    assert_eq!(current.content.as_text(), "Rewritten");
    assert_eq!(current.meta.get("box-number"), Some("1"));
    let copies = manager.get_all_zettel(&ctx, zid(20240101000002)).unwrap();
    assert_eq!(copies.len(), 2);

    let on_disk = std::fs::read_to_string(path.join("20240101000002.zmk")).unwrap();
    assert!(on_disk.contains("Apples grow on trees."));
}

#[test]
fn writable_box_behind_a_read_only_holder_refuses_updates() {
    let temp_dir = TempDir::new().unwrap();
    let path = create_test_box(&temp_dir);
    let ctx = Context::background();
    let dir = Arc::new(DirBox::new(&path, true, 1));
    dir.start(&ctx).unwrap();
    let mem = Arc::new(MemBox::new(2));
    let manager = Manager::with_boxes(vec![dir, mem.clone()], &Config::default());

    let mut note = manager.get_zettel(&ctx, zid(20240101000002)).unwrap();
    note.content = "Rewritten".into();
    assert!(!manager.can_update_zettel(&ctx, &note));
    assert_eq!(manager.update_zettel(&ctx, note), Err(ZettelError::ReadOnly));
    assert!(!mem.has_zettel(&ctx, zid(20240101000002)));
    assert!(manager
        .get_zettel(&ctx, zid(20240101000002))
        .unwrap()
        .content
        .as_text()
        .contains("Apples grow on trees."));
}

#[test(tokio::test)]
async fn reload_indexes_more_zettel_than_the_queue_holds() {
    let ctx = Context::background();
    let mem = MemBox::new(1);
    for n in 1..=20 {
        mem.update_zettel(
            &ctx,
            zettel(20240101000000 + n, &format!("Medlar {n}"), "zmk", "Medlars ripen late."),
        )
        .unwrap();
    }
    let config = Config {
        index_queue_capacity: 8,
        ..Config::default()
    };
    let manager = Manager::with_boxes(vec![Arc::new(mem)], &config);
    manager.start(&ctx).unwrap();
    manager.wait_idle().await;

    let stats = manager.read_stats();
    assert_eq!(stats.dropped, 0);
    assert_eq!(stats.queue_len, 0);
    assert!(stats.indexed_zettel >= 20, "{stats:?}");
    let found = manager.select_meta(&ctx, &Query::parse("ripen")).unwrap();
    assert_eq!(found.len(), 20);
    manager.stop(&ctx);
}

#[test]
fn read_only_configuration_refuses_writes() {
    let config = Config::from_toml_str("read-only = true\nbox-uri = [\"mem:\"]\n").unwrap();
    let manager = Manager::new(&config).unwrap();
    let ctx = Context::background();
    assert!(!manager.can_create_zettel(&ctx));
    assert_eq!(
        manager.create_zettel(&ctx, zettel(0, "X", "zmk", "")),
        Err(ZettelError::ReadOnly)
    );
    assert!(manager.read_stats().read_only);
}

#[test]
fn unknown_box_scheme_is_a_configuration_error() {
    let config = Config {
        box_uri: vec!["ftp://example.org/zettel".to_string()],
        ..Config::default()
    };
    assert!(matches!(Manager::new(&config), Err(ZettelError::Config(_))));
}

#[test]
fn cancelled_context_stops_calls() {
    let manager = Manager::new(&Config::default()).unwrap();
    let ctx = Context::background();
    ctx.cancel();
    assert_eq!(
        manager.get_zettel(&ctx, zid(20240101000001)),
        Err(ZettelError::Cancelled)
    );
    assert_eq!(
        manager.select_meta(&ctx, &Query::parse("")),
        Err(ZettelError::Cancelled)
    );
}

#[test(tokio::test)]
async fn observers_see_writes_and_readiness() {
    let manager = Manager::with_boxes(vec![Arc::new(MemBox::new(1))], &Config::default());
    let seen: Arc<Mutex<Vec<UpdateInfo>>> = Arc::default();
    let sink = seen.clone();
    manager.register_observer(Arc::new(move |info: &UpdateInfo| sink.lock().push(*info)));
    let ctx = Context::background();
    manager.start(&ctx).unwrap();
    let created = manager
        .create_zettel(&ctx, zettel(0, "Observed", "zmk", ""))
        .unwrap();
    manager.wait_idle().await;

    let seen = seen.lock().clone();
    assert!(seen
        .iter()
        .any(|i| i.reason == UpdateReason::OnReady && i.box_number == 0));
    assert!(seen
        .iter()
        .any(|i| i.reason == UpdateReason::OnZettel && i.zid == created && i.box_number == 1));
    manager.stop(&ctx);
}

#[test(tokio::test)]
async fn configuration_zettel_reflects_the_manager() {
    let temp_dir = TempDir::new().unwrap();
    let path = create_test_box(&temp_dir);
    let manager = Manager::new(&dir_config(&path)).unwrap();
    let ctx = Context::background();
    manager.start(&ctx).unwrap();
    manager.wait_idle().await;

    let stats = manager
        .get_zettel(&ctx, zettel_core::id::Zid::BOX_MANAGER)
        .unwrap();
    let text = stats.content.as_text();
    assert!(text.starts_with("|=Key|=Value\n"), "{text}");
    assert!(text.contains("|started|true"), "{text}");

    let json = serde_json::to_value(manager.read_stats()).unwrap();
    assert_eq!(json["read-only"], serde_json::Value::Bool(false));
    assert_eq!(json["boxes"].as_array().map(Vec::len), Some(3));
    manager.stop(&ctx);
}

#[cfg(feature = "service")]
#[test(tokio::test(flavor = "multi_thread"))]
async fn external_edits_are_picked_up() {
    use std::time::Duration;

    let temp_dir = TempDir::new().unwrap();
    let path = create_test_box(&temp_dir);
    let manager = Manager::new(&dir_config(&path)).unwrap();
    let ctx = Context::background();
    manager.start(&ctx).unwrap();
    manager.wait_idle().await;

    common::write_file(&path, "20240101000003.zmk", "title: Later\n\nWritten behind our back.\n");
    let mut found = false;
    for _ in 0..100 {
        tokio::time::sleep(Duration::from_millis(100)).await;
        if manager.has_zettel(&ctx, zid(20240101000003)) {
            found = true;
            break;
        }
    }
    assert!(found, "external file was not noticed");
    manager.wait_idle().await;
    let meta = manager.get_meta(&ctx, zid(20240101000003)).unwrap();
    assert_eq!(meta.get("title"), Some("Later"));
    manager.stop(&ctx);
}

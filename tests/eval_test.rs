//! Evaluation against a box manager: transclusion, links and query actions end to end.

mod common;

use common::{zettel, zid};
use pretty_assertions::assert_eq;
use std::sync::Arc;
use test_log::test;
use zettel_core::{
    ast::{BlockNode, InlineNode, RefState},
    boxes::{manager::Manager, memory::MemBox, ZettelBox},
    config::Config,
    context::Context,
    encoder::{encode_blocks_to_string, text::blocks_to_text, EncoderOptions, Encoding},
    eval::{evaluate_zettel, Evaluator},
    parser::{parse_zettel, ParsedZettel},
    zettel::Zettel,
};

const A: u64 = 20240101000001;
const B: u64 = 20240101000002;
const C: u64 = 20240101000003;

fn manager_with(config: &Config, zettel: Vec<Zettel>) -> Manager {
    let ctx = Context::background();
    let mem = MemBox::new(1);
    for z in zettel {
        mem.update_zettel(&ctx, z).unwrap();
    }
    Manager::with_boxes(vec![Arc::new(mem)], config)
}

fn evaluated(manager: &Manager, n: u64) -> (ParsedZettel, usize) {
    let ctx = Context::background();
    let rtc = manager.runtime_config();
    let z = manager.get_zettel(&ctx, zid(n)).unwrap();
    let mut parsed = parse_zettel(&z, "", Some(rtc.as_ref()));
    let mut evaluator = Evaluator::new(&ctx, manager, Some(rtc.as_ref()));
    evaluator.evaluate_zettel(&mut parsed);
    (parsed, evaluator.transclude_count())
}

fn html(parsed: &ParsedZettel) -> String {
    encode_blocks_to_string(Encoding::Html, &EncoderOptions::default(), &parsed.ast).unwrap()
}

#[test]
fn transclusion_reads_through_the_manager() {
    let manager = manager_with(
        &Config::default(),
        vec![
            zettel(A, "A", "zmk", "{{{20240101000002}}}"),
            zettel(B, "B", "zmk", "transcluded body"),
        ],
    );
    let (parsed, count) = evaluated(&manager, A);
    assert_eq!(count, 1);
    assert_eq!(blocks_to_text(&parsed.ast), "transcluded body");
}

#[test]
fn self_transclusion_reports_recursion_once() {
    let manager = manager_with(
        &Config::default(),
        vec![zettel(A, "A", "zmk", "{{{20240101000001}}}")],
    );
    let (parsed, count) = evaluated(&manager, A);
    assert_eq!(count, 1);
    assert!(blocks_to_text(&parsed.ast).contains("Recursive"));
}

#[test]
fn bundled_zettel_can_be_transcluded() {
    let manager = manager_with(
        &Config::default(),
        vec![zettel(A, "A", "zmk", "{{{00010000000000}}}")],
    );
    let (parsed, _) = evaluated(&manager, A);
    assert!(matches!(parsed.ast.first(), Some(BlockNode::Heading { .. })));
    assert!(blocks_to_text(&parsed.ast).starts_with("Welcome"));
}

#[test]
fn configured_transclusion_limit_applies() {
    let mut config = Config::default();
    config.runtime.max_transclusions = 2;
    let content = "{{{20240101000002}}}\n\n".repeat(5);
    let manager = manager_with(
        &config,
        vec![
            zettel(A, "A", "zmk", &content),
            zettel(B, "B", "zmk", "leaf"),
        ],
    );
    let (parsed, _) = evaluated(&manager, A);
    let text = blocks_to_text(&parsed.ast);
    assert!(text.contains("Too many transclusions"), "{text}");
}

#[test]
fn missing_link_targets_are_broken() {
    let manager = manager_with(
        &Config::default(),
        vec![
            zettel(A, "A", "zmk", "[[00000000000099]] and [[b|20240101000002]]"),
            zettel(B, "B", "zmk", ""),
        ],
    );
    let (parsed, _) = evaluated(&manager, A);
    let BlockNode::Para(inlines) = &parsed.ast[0] else {
        panic!("expected paragraph, got {:?}", parsed.ast[0]);
    };
    let states: Vec<RefState> = inlines
        .iter()
        .filter_map(|i| match i {
            InlineNode::Link { reference, .. } => Some(reference.state),
            _ => None,
        })
        .collect();
    assert_eq!(states, vec![RefState::Broken, RefState::Zettel]);
    let out = html(&parsed);
    assert!(out.contains("class=\"broken\""), "{out}");
    assert!(out.contains("title=\"Zettel not found\""), "{out}");
}

#[test]
fn tag_query_counts_and_sizes_tags() {
    let mut one = zettel(A, "One", "zmk", "");
    one.meta.set("tags", "#a");
    let mut two = zettel(B, "Two", "zmk", "");
    two.meta.set("tags", "#a");
    let mut three = zettel(C, "Three", "zmk", "");
    three.meta.set("tags", "#b");
    let q = zettel(20240101000004, "Q", "zmk", "{{{query:| tags}}}");
    let manager = manager_with(&Config::default(), vec![one, two, three, q]);

    let (parsed, _) = evaluated(&manager, 20240101000004);
    assert_eq!(blocks_to_text(&parsed.ast), "#a2 #b1");
    let out = html(&parsed);
    assert!(out.contains("zs-font-size-3"), "{out}");
    assert!(out.contains("zs-font-size-2"), "{out}");
}

#[test]
fn free_function_evaluates_with_defaults() {
    let manager = manager_with(
        &Config::default(),
        vec![zettel(A, "A", "zmk", "x {{20240101000002}} y"), zettel(B, "B", "zmk", "inner")],
    );
    let ctx = Context::background();
    let z = manager.get_zettel(&ctx, zid(A)).unwrap();
    let mut parsed = parse_zettel(&z, "", None);
    evaluate_zettel(&ctx, &manager, None, &mut parsed);
    assert_eq!(blocks_to_text(&parsed.ast), "x inner y");
}

#[test(tokio::test)]
async fn word_query_uses_the_index() {
    let manager = manager_with(
        &Config::default(),
        vec![
            zettel(A, "A", "zmk", "{{{query:quince}}}"),
            zettel(B, "Fruit", "zmk", "A quince is a fruit."),
            zettel(C, "Other", "zmk", "Nothing to see."),
        ],
    );
    let ctx = Context::background();
    manager.start(&ctx).unwrap();
    manager.wait_idle().await;
    let (parsed, _) = evaluated(&manager, A);
    let text = blocks_to_text(&parsed.ast);
    assert!(text.contains("Fruit"), "{text}");
    assert!(!text.contains("Other"), "{text}");
    manager.stop(&ctx);
}

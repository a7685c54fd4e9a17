//! Properties of the parsers and of cleanup, checked over generated input.

mod common;

use pretty_assertions::assert_eq;
use proptest::prelude::*;
use zettel_core::{
    ast::BlockNode,
    encoder::{encode_blocks_to_string, sz::blocks_to_sx, EncoderOptions, Encoding},
    id::Zid,
    meta::Meta,
    parser::{
        self,
        cleaner::{cleanup_blocks, CleanupOptions},
    },
    sx,
};

const LINES: &[&str] = &[
    "plain words here",
    "=== Heading",
    "=== Heading",
    "==== Sub heading",
    "* item one",
    "* item two",
    "# numbered",
    "> quoted text",
    "; term",
    ": definition",
    "|a|b",
    "|=x|=y",
    "---",
    "",
    "text with %%comment",
    "%%only comment",
    "**strong** and __emph__",
    "[[link|20240101000001]]",
    "[!mark|marked] text",
    "[!mark] again",
    "{{{20240101000001}}}",
    "{{20240101000002}} embedded",
    "``code``",
    "```",
    "@@<b>raw</b>@@{=html}",
    "#tag #other",
];

fn meta() -> Meta {
    Meta::new(Zid::INVALID)
}

fn document() -> impl Strategy<Value = String> {
    prop::collection::vec(prop::sample::select(LINES), 0..12).prop_map(|lines| lines.join("\n"))
}

fn any_source() -> impl Strategy<Value = String> {
    prop_oneof![document(), any::<String>()]
}

proptest! {
    #[test]
    fn zmk_parsing_is_total(src in any::<String>()) {
        let blocks = parser::parse_blocks(src.as_bytes(), &meta(), "zmk");
        let _ = blocks_to_sx(&blocks).to_string();
    }

    #[test]
    fn markdown_parsing_is_total(src in any::<String>()) {
        let _ = parser::parse_blocks(src.as_bytes(), &meta(), "markdown");
    }

    #[test]
    fn arbitrary_bytes_are_total(bytes in prop::collection::vec(any::<u8>(), 0..256)) {
        for syntax in ["zmk", "plain", "css", "png", "svg", "sxn", "draw"] {
            let _ = parser::parse_blocks(&bytes, &meta(), syntax);
        }
    }

    #[test]
    fn cleanup_is_idempotent(src in document()) {
        let mut blocks = parser::parse_blocks(src.as_bytes(), &meta(), "zmk");
        let once = blocks.clone();
        cleanup_blocks(&mut blocks, "zmk", &CleanupOptions::default());
        prop_assert_eq!(blocks, once);
    }

    #[test]
    fn zettelmarkup_output_parses_back(src in any_source()) {
        let blocks = parser::parse_blocks(src.as_bytes(), &meta(), "zmk");
        let zmk = encode_blocks_to_string(Encoding::Zmk, &EncoderOptions::default(), &blocks)
            .unwrap();
        let again = parser::parse_blocks(zmk.as_bytes(), &meta(), "zmk");
        prop_assert_eq!(again, blocks, "zmk output: {:?}", zmk);
    }

    #[test]
    fn sz_output_reads_back_and_reprints_identically(src in any_source()) {
        let blocks = parser::parse_blocks(src.as_bytes(), &meta(), "zmk");
        let printed = blocks_to_sx(&blocks).to_string();
        let reread = sx::read(&printed).unwrap();
        prop_assert_eq!(reread.to_string(), printed);
    }

    #[test]
    fn cleaned_paragraphs_are_never_empty(src in document()) {
        let blocks = parser::parse_blocks(src.as_bytes(), &meta(), "zmk");
        for block in blocks.iter() {
            if let BlockNode::Para(inlines) = block {
                prop_assert!(!inlines.is_empty());
            }
        }
    }
}

#[test]
fn colliding_heading_slugs_get_suffixes() {
    let blocks = parser::parse_blocks(b"=== h\n=== h", &meta(), "zmk");
    let fragments: Vec<&str> = blocks
        .iter()
        .filter_map(|b| match b {
            BlockNode::Heading { fragment, .. } => Some(fragment.as_str()),
            _ => None,
        })
        .collect();
    assert_eq!(fragments, vec!["h", "h-1"]);
}

#[test]
fn png_becomes_a_single_blob() {
    let mut meta = meta();
    meta.set("title", "Pixel");
    let blocks = parser::parse_blocks(&common::PNG_1X1, &meta, "png");
    assert_eq!(blocks.len(), 1);
    assert!(matches!(
        &blocks[0],
        BlockNode::Blob { syntax, blob, .. } if syntax == "png" && blob.len() == common::PNG_1X1.len()
    ));
}

#[test]
fn unknown_syntax_falls_back_to_plain_text() {
    let info = parser::get("no-such-syntax");
    assert!(info.is_text_format());
    let blocks = parser::parse_blocks(b"just text", &meta(), "no-such-syntax");
    assert!(!blocks.is_empty());
}

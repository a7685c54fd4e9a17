//! Encoders over parsed zettel, through the public registry.

mod common;

use common::{zettel, PNG_1X1};
use pretty_assertions::assert_eq;
use test_log::test;
use zettel_core::{
    encoder::{self, encode_blocks_to_string, sz::blob_data, EncoderOptions, Encoding},
    id::Zid,
    meta::Meta,
    parser::{self, parse_zettel},
};

fn encode(encoding: Encoding, src: &str) -> String {
    let blocks = parser::parse_blocks(src.as_bytes(), &Meta::new(Zid::INVALID), "zmk");
    encode_blocks_to_string(encoding, &EncoderOptions::default(), &blocks).unwrap()
}

#[test]
fn minimal_zettelmarkup() {
    assert_eq!(
        encode(Encoding::Sz, "Hello, world"),
        r#"(BLOCK (PARA (TEXT "Hello,") (SPACE) (TEXT "world")))"#
    );
    assert_eq!(encode(Encoding::Html, "Hello, world"), "<p>Hello, world</p>");
    assert_eq!(encode(Encoding::Text, "Hello, world"), "Hello, world");
    assert_eq!(encode(Encoding::Zmk, "Hello, world"), "Hello, world");
}

#[test]
fn colliding_headings_get_distinct_ids() {
    assert_eq!(
        encode(Encoding::Html, "=== h\n=== h"),
        "<h2 id=\"h\">h</h2><h2 id=\"h-1\">h</h2>"
    );
}

#[test]
fn png_blob_is_inlined_as_data() {
    let mut z = zettel(20240101000001, "Pixel", "png", "");
    z.content = PNG_1X1.to_vec().into();
    let parsed = parse_zettel(&z, "", None);
    assert_eq!(parsed.ast.len(), 1);
    let data = blob_data("png", &PNG_1X1);

    let html = encode_blocks_to_string(Encoding::Html, &EncoderOptions::default(), &parsed.ast)
        .unwrap();
    assert_eq!(
        html,
        format!("<p><img alt=\"Pixel\" src=\"data:image/png;base64,{data}\"></p>")
    );

    let sz = encode_blocks_to_string(Encoding::Sz, &EncoderOptions::default(), &parsed.ast)
        .unwrap();
    assert_eq!(
        sz,
        format!("(BLOCK (BLOB (INLINE (TEXT \"Pixel\")) \"png\" \"{data}\"))")
    );
}

#[test]
fn every_encoding_is_registered() {
    for encoding in Encoding::ALL {
        assert!(
            encoder::create(encoding, &EncoderOptions::default()).is_some(),
            "{encoding}"
        );
        assert_eq!(encoding.name().parse::<Encoding>().unwrap(), encoding);
    }
    assert!(encoder::create(Encoding::Unknown, &EncoderOptions::default()).is_none());
    assert_eq!("docx".parse::<Encoding>().unwrap(), Encoding::Unknown);
}

#[test]
fn html_zettel_is_a_document() {
    let z = zettel(20240101000001, "My Note", "zmk", "Some **bold** text");
    let parsed = parse_zettel(&z, "", None);
    let enc = encoder::create(Encoding::Html, &EncoderOptions::default()).unwrap();
    let mut out = Vec::new();
    let written = enc.write_zettel(&mut out, &parsed).unwrap();
    let html = String::from_utf8(out).unwrap();
    assert_eq!(written, html.len());
    assert!(html.starts_with("<!DOCTYPE html>\n<html"), "{html}");
    assert!(html.contains("<title>My Note</title>"), "{html}");
    assert!(html.contains("<h1>My Note</h1>"), "{html}");
    assert!(html.contains("<strong>bold</strong>"), "{html}");
}

#[test]
fn text_and_markdown_agree_on_words() {
    let src = "=== Title\nSome __emphasised__ words and a [[link|https://example.org]]";
    let text = encode(Encoding::Text, src);
    assert_eq!(text, "Title\nSome emphasised words and a link");
    let md = encode(Encoding::Md, src);
    assert!(md.contains("[link](https://example.org)"), "{md}");
    assert!(md.contains("*emphasised*"), "{md}");
}

#[test]
fn zettelmarkup_output_parses_back() {
    let src = "=== Head\nA [[link|20240101000002]] and ``code``.";
    let blocks = parser::parse_blocks(src.as_bytes(), &Meta::new(Zid::INVALID), "zmk");
    let zmk = encode_blocks_to_string(Encoding::Zmk, &EncoderOptions::default(), &blocks).unwrap();
    let again = parser::parse_blocks(zmk.as_bytes(), &Meta::new(Zid::INVALID), "zmk");
    assert_eq!(again, blocks);
}

//! HTML5 output, printed from the tree built by [`super::shtml`].
use std::io;

use crate::{
    ast::{BlockSlice, InlineSlice},
    encoder::{
        shtml::{
            blocks_tree, inlines_tree, meta_elements, zettel_tree, SYM_ATTRS, SYM_COMMENT,
            SYM_RAW,
        },
        EncWriter, Encoder, EncoderOptions,
    },
    error::ZettelError,
    meta::Meta,
    parser::ParsedZettel,
    sx::Sx,
};

const VOID_ELEMENTS: &[&str] = &[
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "source",
    "track", "wbr",
];

#[derive(Debug, Default, Clone)]
pub struct HtmlEncoder {
    options: EncoderOptions,
}

impl HtmlEncoder {
    pub fn new(options: &EncoderOptions) -> HtmlEncoder {
        HtmlEncoder {
            options: options.clone(),
        }
    }
}

impl Encoder for HtmlEncoder {
    fn write_zettel(&self, w: &mut dyn io::Write, zettel: &ParsedZettel) -> Result<usize, ZettelError> {
        let mut out = EncWriter::new(w);
        out.write_str("<!DOCTYPE html>\n");
        out.write_str(&render(&[zettel_tree(zettel, &self.options)]));
        out.write_str("\n");
        out.finish()
    }

    fn write_meta(&self, w: &mut dyn io::Write, meta: &Meta) -> Result<usize, ZettelError> {
        let mut out = EncWriter::new(w);
        for element in meta_elements(meta) {
            out.write_str(&render(&[element]));
            out.write_str("\n");
        }
        out.finish()
    }

    fn write_blocks(&self, w: &mut dyn io::Write, blocks: &BlockSlice) -> Result<usize, ZettelError> {
        let mut out = EncWriter::new(w);
        out.write_str(&render(&blocks_tree(blocks, &self.options)));
        out.finish()
    }

    fn write_inlines(
        &self,
        w: &mut dyn io::Write,
        inlines: &InlineSlice,
    ) -> Result<usize, ZettelError> {
        let mut out = EncWriter::new(w);
        out.write_str(&render(&inlines_tree(inlines, &self.options)));
        out.finish()
    }
}

pub fn escape_text(s: &str, out: &mut String) {
    for ch in s.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            ch => out.push(ch),
        }
    }
}

pub fn escape_attr(s: &str, out: &mut String) {
    for ch in s.chars() {
        match ch {
            '"' => out.push_str("&quot;"),
            ch => escape_text(ch.encode_utf8(&mut [0; 4]), out),
        }
    }
}

/// Prints an HTML tree.
pub fn render(nodes: &[Sx]) -> String {
    let mut out = String::new();
    for node in nodes {
        render_node(node, &mut out);
    }
    out
}

fn render_node(node: &Sx, out: &mut String) {
    match node {
        Sx::Str(s) | Sx::Symbol(s) => escape_text(s, out),
        Sx::Int(n) => out.push_str(&n.to_string()),
        Sx::Pair(..) => {}
        Sx::List(items) => match items.first() {
            Some(Sx::Symbol(tag)) => match tag.as_str() {
                SYM_RAW => items[1..]
                    .iter()
                    .filter_map(Sx::as_str)
                    .for_each(|s| out.push_str(s)),
                SYM_COMMENT => {
                    out.push_str("<!-- ");
                    for s in items[1..].iter().filter_map(Sx::as_str) {
                        escape_text(&s.replace("--", "-&#45;"), out);
                    }
                    out.push_str(" -->");
                }
                SYM_ATTRS => {}
                tag => render_element(tag, &items[1..], out),
            },
            _ => items.iter().for_each(|item| render_node(item, out)),
        },
    }
}

fn render_element(tag: &str, rest: &[Sx], out: &mut String) {
    out.push('<');
    out.push_str(tag);
    let children = match rest.first() {
        Some(attrs) if attrs.head() == Some(SYM_ATTRS) => {
            for a in &attrs.as_list().unwrap_or_default()[1..] {
                if let Sx::Pair(name, value) = a {
                    let (Some(name), Some(value)) = (name.as_symbol(), value.as_str()) else {
                        continue;
                    };
                    out.push(' ');
                    out.push_str(name);
                    out.push_str("=\"");
                    escape_attr(value, out);
                    out.push('"');
                }
            }
            &rest[1..]
        }
        _ => rest,
    };
    out.push('>');
    if VOID_ELEMENTS.contains(&tag) {
        return;
    }
    for child in children {
        render_node(child, out);
    }
    out.push_str("</");
    out.push_str(tag);
    out.push('>');
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        ast::{BlockNode, InlineNode, RefState, Reference},
        encoder::encode_blocks_to_string,
        encoder::Encoding,
        id::Zid,
        parser,
    };
    use pretty_assertions::assert_eq;

    fn html(src: &str) -> String {
        let blocks = parser::parse_blocks(src.as_bytes(), &Meta::new(Zid::INVALID), "zmk");
        encode_blocks_to_string(Encoding::Html, &EncoderOptions::default(), &blocks).unwrap()
    }

    #[test]
    fn minimal_paragraph() {
        assert_eq!(html("Hello, world"), "<p>Hello, world</p>");
    }

    #[test]
    fn text_is_escaped() {
        assert_eq!(html("a &lt; <b>"), "<p>a &lt; &lt;b&gt;</p>");
    }

    #[test]
    fn heading_and_rule() {
        assert_eq!(
            html("=== Intro\n---"),
            "<h2 id=\"intro\">Intro</h2><hr>"
        );
    }

    #[test]
    fn broken_link() {
        let blocks = vec![BlockNode::Para(vec![InlineNode::Link {
            attrs: Default::default(),
            reference: Reference::new("00000000000099", RefState::Broken),
            inlines: vec![],
        }])];
        let out = encode_blocks_to_string(Encoding::Html, &EncoderOptions::default(), &blocks)
            .unwrap();
        assert_eq!(
            out,
            "<p><a href=\"00000000000099\" class=\"broken\" title=\"Zettel not found\">00000000000099</a></p>"
        );
    }

    #[test]
    fn code_block_language() {
        assert_eq!(
            html("```go\nx < y\n```"),
            "<pre><code class=\"language-go\">x &lt; y</code></pre>"
        );
    }

    #[test]
    fn raw_html_needs_permission() {
        let blocks = vec![BlockNode::Para(vec![InlineNode::Literal {
            kind: crate::ast::LiteralKind::Html,
            attrs: Default::default(),
            content: "<kbd>x</kbd>".to_string(),
        }])];
        let denied =
            encode_blocks_to_string(Encoding::Html, &EncoderOptions::default(), &blocks).unwrap();
        assert_eq!(denied, "<p></p>");
        let options = EncoderOptions {
            html_insecurity: crate::config::HtmlInsecurity::Html,
            ..EncoderOptions::default()
        };
        let allowed = encode_blocks_to_string(Encoding::Html, &options, &blocks).unwrap();
        assert_eq!(allowed, "<p><kbd>x</kbd></p>");
    }
}

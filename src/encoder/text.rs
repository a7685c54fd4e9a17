//! Plain text: only what a reader sees, without markup.
use std::io;

use crate::{
    ast::{BlockNode, BlockSlice, InlineNode, InlineSlice, LiteralKind, VerbatimKind},
    encoder::{EncWriter, Encoder},
    error::ZettelError,
    meta::{
        clean_tag,
        keys::{key_type, KeyType},
        Meta,
    },
    parser::{parse_inlines, ParsedZettel},
};

#[derive(Debug, Default, Clone)]
pub struct TextEncoder;

impl Encoder for TextEncoder {
    fn write_zettel(&self, w: &mut dyn io::Write, zettel: &ParsedZettel) -> Result<usize, ZettelError> {
        let mut out = EncWriter::new(w);
        out.write_str(&meta_to_text(&zettel.inh_meta));
        let content = blocks_to_text(&zettel.ast);
        if !content.is_empty() {
            out.write_str("\n");
            out.write_str(&content);
        }
        out.finish()
    }

    fn write_meta(&self, w: &mut dyn io::Write, meta: &Meta) -> Result<usize, ZettelError> {
        let mut out = EncWriter::new(w);
        out.write_str(&meta_to_text(meta));
        out.finish()
    }

    fn write_blocks(&self, w: &mut dyn io::Write, blocks: &BlockSlice) -> Result<usize, ZettelError> {
        let mut out = EncWriter::new(w);
        out.write_str(&blocks_to_text(blocks));
        out.finish()
    }

    fn write_inlines(
        &self,
        w: &mut dyn io::Write,
        inlines: &InlineSlice,
    ) -> Result<usize, ZettelError> {
        let mut out = EncWriter::new(w);
        out.write_str(&inlines_to_text(inlines));
        out.finish()
    }
}

/// Metadata values, one per line.
pub fn meta_to_text(meta: &Meta) -> String {
    let mut out = String::new();
    for (key, value) in meta.pairs() {
        out.push_str(&meta_value_text(key, value));
        out.push('\n');
    }
    out
}

/// Visible form of a metadata value: tags lose their `#`, zettelmarkup values their markup.
pub fn meta_value_text(key: &str, value: &str) -> String {
    match key_type(key) {
        KeyType::TagSet => value
            .split_whitespace()
            .map(clean_tag)
            .collect::<Vec<_>>()
            .join(" "),
        KeyType::Zettelmarkup => inlines_to_text(&parse_inlines(value, "zmk")),
        _ => value.to_string(),
    }
}

pub fn blocks_to_text(blocks: &BlockSlice) -> String {
    let mut lines: Vec<String> = Vec::new();
    for block in blocks {
        block_text(block, &mut lines);
    }
    lines.join("\n")
}

fn push_line(lines: &mut Vec<String>, line: String) {
    if !line.is_empty() {
        lines.push(line);
    }
}

fn block_text(block: &BlockNode, lines: &mut Vec<String>) {
    match block {
        BlockNode::Para(inlines) | BlockNode::Heading { inlines, .. } => {
            push_line(lines, inlines_to_text(inlines))
        }
        BlockNode::List { items, .. } => {
            for item in items {
                for block in item {
                    block_text(block, lines);
                }
            }
        }
        BlockNode::Description(descrs) => {
            for descr in descrs {
                push_line(lines, inlines_to_text(&descr.term));
                for blocks in &descr.descriptions {
                    for block in blocks {
                        block_text(block, lines);
                    }
                }
            }
        }
        BlockNode::Table(table) => {
            for row in std::iter::once(&table.header).chain(table.rows.iter()) {
                let cells: Vec<String> = row
                    .iter()
                    .map(|cell| inlines_to_text(&cell.inlines))
                    .filter(|s| !s.is_empty())
                    .collect();
                push_line(lines, cells.join(" "));
            }
        }
        BlockNode::Region {
            blocks, inlines, ..
        } => {
            for block in blocks {
                block_text(block, lines);
            }
            push_line(lines, inlines_to_text(inlines));
        }
        BlockNode::Verbatim { kind, content, .. } => match kind {
            VerbatimKind::Comment | VerbatimKind::Html => {}
            _ => push_line(lines, content.clone()),
        },
        BlockNode::Blob { description, .. } => push_line(lines, inlines_to_text(description)),
        BlockNode::HRule { .. } | BlockNode::Transclude { .. } => {}
    }
}

pub fn inlines_to_text(inlines: &InlineSlice) -> String {
    let mut out = String::new();
    inline_text(inlines, &mut out);
    out.trim().to_string()
}

fn push_space(out: &mut String) {
    if !out.is_empty() && !out.ends_with([' ', '\n']) {
        out.push(' ');
    }
}

fn inline_text(inlines: &InlineSlice, out: &mut String) {
    for inline in inlines {
        match inline {
            InlineNode::Text(s) => out.push_str(s),
            InlineNode::Space(_) | InlineNode::Soft => push_space(out),
            InlineNode::Hard => out.push('\n'),
            InlineNode::Link {
                reference, inlines, ..
            } => {
                if inlines.is_empty() {
                    out.push_str(&reference.source());
                } else {
                    inline_text(inlines, out);
                }
            }
            InlineNode::Cite { key, inlines, .. } => {
                out.push_str(key);
                if !inlines.is_empty() {
                    push_space(out);
                    inline_text(inlines, out);
                }
            }
            InlineNode::Embed { inlines, .. }
            | InlineNode::EmbedBlob { inlines, .. }
            | InlineNode::Mark { inlines, .. }
            | InlineNode::Format { inlines, .. } => inline_text(inlines, out),
            InlineNode::Footnote { .. } => {}
            InlineNode::Literal { kind, content, .. } => match kind {
                LiteralKind::Comment | LiteralKind::Html => {}
                _ => out.push_str(content),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{id::Zid, parser::zmk};

    #[test]
    fn visible_text_only() {
        let blocks = zmk::parse_blocks(
            "=== Head\n**bold**   text %%hidden\n\n* [[Link|https://x.org]] [^note]\n* ``code``",
        );
        assert_eq!(blocks_to_text(&blocks), "Head\nbold text\nLink\ncode");
    }

    #[test]
    fn tags_are_cleaned() {
        let mut meta = Meta::new(Zid::INVALID);
        meta.set("title", "A **b**");
        meta.set("tags", "#x #y");
        assert_eq!(meta_to_text(&meta), "A b\nx y\n");
    }
}

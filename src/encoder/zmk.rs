//! Zettelmarkup output.
//!
//! Encoding a cleaned zettelmarkup AST and parsing the result again yields the same AST. BLOBs
//! and inline BLOBs have no source form and are dropped; blocks that cannot be nested inside
//! list items or descriptions are dropped there as well.
use std::io;

use crate::{
    ast::{
        Alignment, Attributes, BlockNode, BlockSlice, Description, InlineNode, InlineSlice,
        ListKind, LiteralKind, RegionKind, Table, TableCell, VerbatimKind,
    },
    encoder::{EncWriter, Encoder},
    error::ZettelError,
    meta::{parse::write_meta, Meta},
    parser::ParsedZettel,
};

/// Characters that always need a backslash in text.
const ALWAYS_ESCAPED: &[char] = &['\\', '{', '}', '&', '[', ']', '|'];
/// Characters that open a format or literal when doubled.
const PAIR_DELIMITERS: &[char] = &[
    '_', '*', '>', '~', '^', ',', '"', '#', ':', '`', '\'', '=', '@', '$', '%',
];
/// Characters that may start a block when they begin a paragraph line.
const BLOCK_STARTS: &[char] = &[
    '=', '-', '*', '#', '>', ';', '|', '{', '`', '~', '$', '%', '@', ':', '<', '"',
];

#[derive(Debug, Default, Clone, Copy)]
pub struct ZmkEncoder;

impl Encoder for ZmkEncoder {
    fn write_zettel(&self, w: &mut dyn io::Write, zettel: &ParsedZettel) -> Result<usize, ZettelError> {
        let mut out = EncWriter::new(w);
        let header = write_meta(&zettel.meta);
        if !header.is_empty() {
            out.write_str(&header);
            out.write_str("\n");
        }
        out.write_str(&blocks_to_zmk(&zettel.ast));
        out.finish()
    }

    fn write_meta(&self, w: &mut dyn io::Write, meta: &Meta) -> Result<usize, ZettelError> {
        let mut out = EncWriter::new(w);
        out.write_str(&write_meta(meta));
        out.finish()
    }

    fn write_blocks(&self, w: &mut dyn io::Write, blocks: &BlockSlice) -> Result<usize, ZettelError> {
        let mut out = EncWriter::new(w);
        out.write_str(&blocks_to_zmk(blocks));
        out.finish()
    }

    fn write_inlines(
        &self,
        w: &mut dyn io::Write,
        inlines: &InlineSlice,
    ) -> Result<usize, ZettelError> {
        let mut out = EncWriter::new(w);
        out.write_str(&inlines_to_zmk(inlines));
        out.finish()
    }
}

pub fn blocks_to_zmk(blocks: &BlockSlice) -> String {
    ZmkWriter::default().blocks(blocks)
}

/// Inline zettelmarkup on a single line, as used for metadata values.
pub fn inlines_to_zmk(inlines: &InlineSlice) -> String {
    ZmkWriter::default().inlines(inlines, Breaks::Single, false, None)
}

/// How line breaks are written inside an inline sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Breaks {
    /// The construct must stay on one line.
    Single,
    /// A new line indented by the given number of spaces.
    Indent(usize),
}

impl Breaks {
    /// Breaks allowed inside a nested construct.
    fn nested(self) -> Breaks {
        match self {
            Breaks::Indent(0) => Breaks::Indent(0),
            _ => Breaks::Single,
        }
    }
}

#[derive(Debug, Default)]
struct ZmkWriter {
    verse: bool,
}

impl ZmkWriter {
    fn blocks(&mut self, blocks: &BlockSlice) -> String {
        blocks
            .iter()
            .map(|block| self.block(block))
            .filter(|s| !s.is_empty())
            .collect::<Vec<_>>()
            .join("\n\n")
    }

    fn block(&mut self, block: &BlockNode) -> String {
        match block {
            BlockNode::Para(inlines) => self.inlines(inlines, Breaks::Indent(0), true, None),
            BlockNode::Heading {
                level,
                attrs,
                inlines,
                ..
            } => {
                let mut s = "=".repeat(usize::from((*level).clamp(1, 5)) + 2);
                s.push(' ');
                s.push_str(&self.inlines(inlines, Breaks::Single, false, None));
                if !attrs.is_empty() {
                    s.push(' ');
                    s.push_str(&attributes(attrs));
                }
                s
            }
            BlockNode::HRule { attrs } => format!("---{}", attributes(attrs)),
            BlockNode::List { kind, items } => self.list("", *kind, items),
            BlockNode::Description(descrs) => self.description(descrs),
            BlockNode::Table(table) => self.table(table),
            BlockNode::Region {
                kind,
                attrs,
                blocks,
                inlines,
            } => self.region(*kind, attrs, blocks, inlines),
            BlockNode::Verbatim {
                kind,
                attrs,
                content,
            } => verbatim(*kind, attrs, content),
            BlockNode::Transclude { attrs, reference } => {
                format!("{{{{{{{}}}}}}}{}", reference.source(), attributes(attrs))
            }
            BlockNode::Blob { .. } => String::new(),
        }
    }

    fn list(&mut self, prefix: &str, kind: ListKind, items: &[BlockSlice]) -> String {
        let prefix = format!("{prefix}{}", kind.as_char());
        let indent = prefix.chars().count() + 1;
        let mut lines = Vec::new();
        for item in items {
            let (first, rest) = match item.split_first() {
                Some((BlockNode::Para(inlines), rest)) => {
                    (self.inlines(inlines, Breaks::Indent(indent), false, None), rest)
                }
                _ => (String::new(), &item[..]),
            };
            lines.push(format!("{prefix} {first}"));
            for block in rest {
                match block {
                    BlockNode::List { kind, items } => lines.push(self.list(&prefix, *kind, items)),
                    BlockNode::Para(inlines) => lines.push(format!(
                        "{}{}",
                        " ".repeat(indent),
                        self.inlines(inlines, Breaks::Indent(indent), false, None)
                    )),
                    other => tracing::debug!("[ZmkEncoder::list] dropping nested {other:?}"),
                }
            }
        }
        lines.join("\n")
    }

    fn description(&mut self, descrs: &[Description]) -> String {
        let mut lines = Vec::new();
        for descr in descrs {
            lines.push(format!("; {}", self.inlines(&descr.term, Breaks::Single, false, None)));
            for blocks in &descr.descriptions {
                let paras: Vec<String> = blocks
                    .iter()
                    .filter_map(|block| match block {
                        BlockNode::Para(inlines) => {
                            Some(self.inlines(inlines, Breaks::Indent(2), false, None))
                        }
                        _ => None,
                    })
                    .collect();
                lines.push(format!(": {}", paras.join("\n  ")));
            }
        }
        lines.join("\n")
    }

    fn table(&mut self, table: &Table) -> String {
        let mut lines = Vec::new();
        if !table.header.is_empty() {
            let cells: Vec<String> = table
                .header
                .iter()
                .map(|cell| {
                    let mut s = self.inlines(&cell.inlines, Breaks::Single, false, None);
                    let ends_in_text = matches!(cell.inlines.last(), Some(InlineNode::Text(_)));
                    if ends_in_text && s.ends_with(['<', ':', '>']) {
                        let last = s.len() - 1;
                        if !s[..last].ends_with('\\') {
                            s.insert(last, '\\');
                        }
                    }
                    if let Some(c) = cell.align.as_char() {
                        s.push(c);
                    }
                    format!("={s}")
                })
                .collect();
            lines.push(format!("|{}", cells.join("|")));
        }
        for row in &table.rows {
            let cells: Vec<String> = row
                .iter()
                .enumerate()
                .map(|(col, cell)| {
                    let column = table.align.get(col).copied().unwrap_or_default();
                    self.data_cell(cell, column)
                })
                .collect();
            lines.push(format!("|{}", cells.join("|")));
        }
        lines.join("\n")
    }

    fn data_cell(&mut self, cell: &TableCell, column: Alignment) -> String {
        let mut s = self.inlines(&cell.inlines, Breaks::Single, false, None);
        let mut chars = s.chars();
        let (first, second) = (chars.next(), chars.next());
        if let Some(c) = first {
            if (Alignment::from_char(c).is_some() || c == '=') && second != first {
                s.insert(0, '\\');
            }
        }
        match cell.align.as_char() {
            Some(c) if cell.align != column => format!("{c}{s}"),
            _ => s,
        }
    }

    fn region(
        &mut self,
        kind: RegionKind,
        attrs: &Attributes,
        blocks: &BlockSlice,
        citation: &InlineSlice,
    ) -> String {
        let fence = kind.fence_char().to_string().repeat(3 + region_height(blocks));
        let outer_verse = self.verse;
        self.verse = outer_verse || kind == RegionKind::Verse;
        let body = self.blocks(blocks);
        self.verse = outer_verse;

        let mut lines = vec![format!("{fence}{}", attributes(attrs))];
        if !body.is_empty() {
            lines.push(body);
        }
        if citation.is_empty() {
            lines.push(fence);
        } else {
            lines.push(format!(
                "{fence} {}",
                self.inlines(citation, Breaks::Single, false, None)
            ));
        }
        lines.join("\n")
    }

    /// `closer` is the delimiter that ends the enclosing construct, if any.
    fn inlines(
        &mut self,
        inlines: &InlineSlice,
        breaks: Breaks,
        para_start: bool,
        closer: Option<char>,
    ) -> String {
        let mut out = String::new();
        let mut line_start = para_start;
        for (i, inline) in inlines.iter().enumerate() {
            let at_line_start = line_start;
            line_start = false;
            match inline {
                InlineNode::Text(s) => {
                    let follow = inlines.get(i + 1).map_or(closer, leading_char);
                    escape_text(s, at_line_start, follow, &mut out)
                }
                InlineNode::Space(lexeme) => out.push_str(if lexeme.is_empty() { " " } else { lexeme }),
                InlineNode::Soft => match breaks {
                    Breaks::Indent(n) => {
                        out.push('\n');
                        out.push_str(&" ".repeat(n));
                        line_start = n == 0;
                    }
                    Breaks::Single => out.push(' '),
                },
                InlineNode::Hard => match breaks {
                    Breaks::Indent(n) => {
                        if !self.verse {
                            out.push('\\');
                        }
                        out.push('\n');
                        out.push_str(&" ".repeat(n));
                        line_start = n == 0;
                    }
                    Breaks::Single => out.push(' '),
                },
                InlineNode::Link {
                    attrs,
                    reference,
                    inlines,
                } => {
                    out.push_str("[[");
                    if !inlines.is_empty() {
                        out.push_str(&self.inlines(inlines, Breaks::Single, false, None));
                        out.push('|');
                    }
                    out.push_str(&reference.source());
                    out.push_str("]]");
                    out.push_str(&attributes(attrs));
                }
                InlineNode::Embed {
                    attrs,
                    reference,
                    inlines,
                    ..
                } => {
                    out.push_str("{{");
                    if !inlines.is_empty() {
                        out.push_str(&self.inlines(inlines, Breaks::Single, false, None));
                        out.push('|');
                    }
                    out.push_str(&reference.source());
                    out.push_str("}}");
                    out.push_str(&attributes(attrs));
                }
                InlineNode::EmbedBlob { .. } => {}
                InlineNode::Cite {
                    attrs,
                    key,
                    inlines,
                } => {
                    out.push_str("[@");
                    out.push_str(key);
                    if !inlines.is_empty() {
                        out.push(' ');
                        out.push_str(&self.inlines(inlines, breaks.nested(), false, Some(']')));
                    }
                    out.push(']');
                    out.push_str(&attributes(attrs));
                }
                InlineNode::Footnote { attrs, inlines } => {
                    out.push_str("[^");
                    out.push_str(&self.inlines(inlines, breaks.nested(), false, Some(']')));
                    out.push(']');
                    out.push_str(&attributes(attrs));
                }
                InlineNode::Mark { mark, inlines, .. } => {
                    out.push_str("[!");
                    out.push_str(mark);
                    if !inlines.is_empty() {
                        out.push('|');
                        out.push_str(&self.inlines(inlines, breaks.nested(), false, Some(']')));
                    }
                    out.push(']');
                }
                InlineNode::Format {
                    kind,
                    attrs,
                    inlines,
                } => {
                    let delim = kind.delimiter().to_string().repeat(2);
                    out.push_str(&delim);
                    out.push_str(&self.inlines(
                        inlines,
                        breaks.nested(),
                        false,
                        Some(kind.delimiter()),
                    ));
                    out.push_str(&delim);
                    out.push_str(&attributes(attrs));
                }
                InlineNode::Literal {
                    kind: LiteralKind::Comment,
                    attrs,
                    content,
                } => {
                    out.push_str("%%");
                    out.push_str(&attributes(attrs));
                    if !content.is_empty() {
                        out.push(' ');
                        out.push_str(content);
                    }
                }
                InlineNode::Literal {
                    kind,
                    attrs,
                    content,
                } => {
                    let c = kind.delimiter();
                    out.push(c);
                    out.push(c);
                    for ch in content.chars() {
                        if ch == c || ch == '\\' {
                            out.push('\\');
                        }
                        out.push(if ch == '\n' { ' ' } else { ch });
                    }
                    out.push(c);
                    out.push(c);
                    if *kind == LiteralKind::Html {
                        out.push_str(&attributes(&attrs.clone().with("", "html")));
                    } else {
                        out.push_str(&attributes(attrs));
                    }
                }
            }
        }
        out
    }
}

/// Nesting depth of regions, used to pick fences the inner regions cannot close.
fn region_height(blocks: &BlockSlice) -> usize {
    blocks
        .iter()
        .map(|block| match block {
            BlockNode::Region { blocks, .. } => 1 + region_height(blocks),
            _ => 0,
        })
        .max()
        .unwrap_or(0)
}

fn verbatim(kind: VerbatimKind, attrs: &Attributes, content: &str) -> String {
    let c = kind.fence_char();
    let longest = content
        .lines()
        .map(|line| line.chars().take_while(|&ch| ch == c).count())
        .max()
        .unwrap_or(0);
    let fence = c.to_string().repeat((longest + 1).max(3));
    let attrs = if kind == VerbatimKind::Html {
        attributes(&attrs.clone().with("", "html"))
    } else {
        attributes(attrs)
    };
    if content.is_empty() {
        format!("{fence}{attrs}\n{fence}")
    } else {
        format!("{fence}{attrs}\n{content}\n{fence}")
    }
}

/// First character of the source form of an inline node.
fn leading_char(inline: &InlineNode) -> Option<char> {
    match inline {
        InlineNode::Text(s) => s.chars().next(),
        InlineNode::Format { kind, .. } => Some(kind.delimiter()),
        InlineNode::Literal { kind, .. } => Some(kind.delimiter()),
        InlineNode::Link { .. }
        | InlineNode::Cite { .. }
        | InlineNode::Footnote { .. }
        | InlineNode::Mark { .. } => Some('['),
        InlineNode::Embed { .. } => Some('{'),
        _ => None,
    }
}

/// Escapes text so it reads back as text. `follow` is the first character written after it.
fn escape_text(s: &str, line_start: bool, follow: Option<char>, out: &mut String) {
    let chars: Vec<char> = s.chars().collect();
    for (i, &ch) in chars.iter().enumerate() {
        let next = chars.get(i + 1).copied().or(follow);
        let escape = ALWAYS_ESCAPED.contains(&ch)
            || (i == 0 && line_start && BLOCK_STARTS.contains(&ch))
            || (PAIR_DELIMITERS.contains(&ch) && next == Some(ch));
        match ch {
            '\u{A0}' => out.push_str("\\ "),
            '\n' => out.push(' '),
            ch => {
                if escape {
                    out.push('\\');
                }
                out.push(ch);
            }
        }
    }
}

/// `{...}` form of attributes, empty if there are none.
pub fn attributes(attrs: &Attributes) -> String {
    if attrs.is_empty() {
        return String::new();
    }
    let items: Vec<String> = attrs
        .iter()
        .filter(|(key, _)| key.is_empty() || key.chars().all(|c| c.is_alphanumeric() || c == '-' || c == '_'))
        .map(|(key, value)| match key {
            "" => format!("={}", quote(value)),
            "-" => "-".to_string(),
            key => format!("{key}={}", quote(value)),
        })
        .collect();
    format!("{{{}}}", items.join(" "))
}

fn quote(value: &str) -> String {
    let mut s = String::with_capacity(value.len() + 2);
    s.push('"');
    for ch in value.chars() {
        if ch == '"' || ch == '\\' {
            s.push('\\');
        }
        s.push(ch);
    }
    s.push('"');
    s
}

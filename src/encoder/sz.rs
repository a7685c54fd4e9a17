//! The canonical s-expression encoding of the AST.
//!
//! ```text
//! (BLOCK (PARA (TEXT "Hello,") (SPACE) (TEXT "world")))
//! ```
//!
//! Attributes are written as `()` when empty, otherwise as `(quote (("key" . "value") ...))`.
//! Blob data is base64, except SVG which stays text. The HTML encoders consume this form.
use std::io;

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};

use crate::{
    ast::{
        Alignment, Attributes, BlockNode, BlockSlice, FormatKind, InlineNode, InlineSlice,
        LiteralKind, ListKind, Reference, RegionKind, TableCell, VerbatimKind,
    },
    encoder::{EncWriter, Encoder},
    error::ZettelError,
    meta::{keys::key_type, Meta},
    parser::ParsedZettel,
    sx::Sx,
};

pub const SYM_BLOCK: &str = "BLOCK";
pub const SYM_INLINE: &str = "INLINE";
pub const SYM_META: &str = "META";
pub const SYM_ZETTEL: &str = "ZETTEL";
pub const SYM_QUOTE: &str = "quote";

#[derive(Debug, Default, Clone)]
pub struct SzEncoder;

impl Encoder for SzEncoder {
    fn write_zettel(&self, w: &mut dyn io::Write, zettel: &ParsedZettel) -> Result<usize, ZettelError> {
        let sx = Sx::list(vec![
            Sx::sym(SYM_ZETTEL),
            meta_to_sx(&zettel.inh_meta),
            blocks_to_sx(&zettel.ast),
        ]);
        write_sx(w, &sx)
    }

    fn write_meta(&self, w: &mut dyn io::Write, meta: &Meta) -> Result<usize, ZettelError> {
        write_sx(w, &meta_to_sx(meta))
    }

    fn write_blocks(&self, w: &mut dyn io::Write, blocks: &BlockSlice) -> Result<usize, ZettelError> {
        write_sx(w, &blocks_to_sx(blocks))
    }

    fn write_inlines(
        &self,
        w: &mut dyn io::Write,
        inlines: &InlineSlice,
    ) -> Result<usize, ZettelError> {
        write_sx(w, &inlines_to_sx(inlines))
    }
}

fn write_sx(w: &mut dyn io::Write, sx: &Sx) -> Result<usize, ZettelError> {
    let mut out = EncWriter::new(w);
    out.write_str(&sx.to_string());
    out.finish()
}

/// `(META (TYPE "key" "value") ...)`, including the computed `id`.
pub fn meta_to_sx(meta: &Meta) -> Sx {
    let mut items = vec![Sx::sym(SYM_META)];
    for (key, value) in meta.computed_pairs() {
        items.push(Sx::list(vec![
            Sx::sym(key_type(&key).name().to_ascii_uppercase()),
            Sx::str(key),
            Sx::str(value),
        ]));
    }
    Sx::list(items)
}

pub fn blocks_to_sx(blocks: &BlockSlice) -> Sx {
    let mut items = Vec::with_capacity(blocks.len() + 1);
    items.push(Sx::sym(SYM_BLOCK));
    items.extend(blocks.iter().map(block_to_sx));
    Sx::list(items)
}

pub fn inlines_to_sx(inlines: &InlineSlice) -> Sx {
    let mut items = Vec::with_capacity(inlines.len() + 1);
    items.push(Sx::sym(SYM_INLINE));
    items.extend(inlines.iter().map(inline_to_sx));
    Sx::list(items)
}

pub fn attrs_to_sx(attrs: &Attributes) -> Sx {
    if attrs.is_empty() {
        return Sx::nil();
    }
    let pairs = attrs
        .iter()
        .map(|(k, v)| Sx::pair(Sx::str(k), Sx::str(v)))
        .collect();
    Sx::list(vec![Sx::sym(SYM_QUOTE), Sx::list(pairs)])
}

/// Reverse of [`attrs_to_sx`]. Anything malformed is ignored.
pub fn attrs_from_sx(sx: &Sx) -> Attributes {
    let pairs = match sx.as_list() {
        Some([Sx::Symbol(q), Sx::List(pairs)]) if q == SYM_QUOTE => pairs,
        _ => return Attributes::new(),
    };
    pairs
        .iter()
        .filter_map(|p| match p {
            Sx::Pair(k, v) => Some((k.as_str()?.to_string(), v.as_str()?.to_string())),
            _ => None,
        })
        .collect()
}

pub fn blob_data(syntax: &str, blob: &[u8]) -> String {
    if syntax == "svg" {
        String::from_utf8_lossy(blob).into_owned()
    } else {
        BASE64.encode(blob)
    }
}

pub fn reference_to_sx(reference: &Reference) -> Sx {
    Sx::list(vec![
        Sx::sym(reference.state.symbol()),
        Sx::str(reference.value.as_str()),
    ])
}

pub fn list_symbol(kind: ListKind) -> &'static str {
    match kind {
        ListKind::Ordered => "LIST-ORDERED",
        ListKind::Unordered => "LIST-UNORDERED",
        ListKind::Quote => "LIST-QUOTE",
    }
}

pub fn region_symbol(kind: RegionKind) -> &'static str {
    match kind {
        RegionKind::Span => "REGION-BLOCK",
        RegionKind::Quote => "REGION-QUOTE",
        RegionKind::Verse => "REGION-VERSE",
    }
}

pub fn verbatim_symbol(kind: VerbatimKind) -> &'static str {
    match kind {
        VerbatimKind::Program => "VERBATIM-CODE",
        VerbatimKind::Eval => "VERBATIM-EVAL",
        VerbatimKind::Math => "VERBATIM-MATH",
        VerbatimKind::Comment => "VERBATIM-COMMENT",
        VerbatimKind::Zettel => "VERBATIM-ZETTEL",
        VerbatimKind::Html => "VERBATIM-HTML",
    }
}

pub fn format_symbol(kind: FormatKind) -> &'static str {
    match kind {
        FormatKind::Emph => "FORMAT-EMPH",
        FormatKind::Strong => "FORMAT-STRONG",
        FormatKind::Insert => "FORMAT-INSERT",
        FormatKind::Delete => "FORMAT-DELETE",
        FormatKind::Super => "FORMAT-SUPER",
        FormatKind::Sub => "FORMAT-SUB",
        FormatKind::Quote => "FORMAT-QUOTE",
        FormatKind::Mark => "FORMAT-MARK",
        FormatKind::Span => "FORMAT-SPAN",
    }
}

pub fn literal_symbol(kind: LiteralKind) -> &'static str {
    match kind {
        LiteralKind::Program => "LITERAL-CODE",
        LiteralKind::Input => "LITERAL-INPUT",
        LiteralKind::Output => "LITERAL-OUTPUT",
        LiteralKind::Comment => "LITERAL-COMMENT",
        LiteralKind::Math => "LITERAL-MATH",
        LiteralKind::Zettel => "LITERAL-ZETTEL",
        LiteralKind::Html => "LITERAL-HTML",
    }
}

pub fn cell_symbol(align: Alignment) -> &'static str {
    match align {
        Alignment::Default => "CELL",
        Alignment::Left => "CELL-LEFT",
        Alignment::Center => "CELL-CENTER",
        Alignment::Right => "CELL-RIGHT",
    }
}

fn node(symbol: &str, mut rest: Vec<Sx>) -> Sx {
    rest.insert(0, Sx::sym(symbol));
    Sx::list(rest)
}

fn with_inlines(mut head: Vec<Sx>, inlines: &InlineSlice) -> Vec<Sx> {
    head.extend(inlines.iter().map(inline_to_sx));
    head
}

fn row_to_sx(row: &[TableCell]) -> Sx {
    Sx::list(
        row.iter()
            .map(|cell| node(cell_symbol(cell.align), with_inlines(vec![], &cell.inlines)))
            .collect(),
    )
}

pub fn block_to_sx(block: &BlockNode) -> Sx {
    match block {
        BlockNode::Para(inlines) => node("PARA", with_inlines(vec![], inlines)),
        BlockNode::Heading {
            level,
            attrs,
            slug,
            fragment,
            inlines,
        } => node(
            "HEADING",
            with_inlines(
                vec![
                    Sx::Int(i64::from(*level)),
                    attrs_to_sx(attrs),
                    Sx::str(slug.as_str()),
                    Sx::str(fragment.as_str()),
                ],
                inlines,
            ),
        ),
        BlockNode::HRule { attrs } => node("THEMATIC", vec![attrs_to_sx(attrs)]),
        BlockNode::List { kind, items } => {
            node(list_symbol(*kind), items.iter().map(blocks_to_sx).collect())
        }
        BlockNode::Description(descrs) => {
            let mut rest = Vec::with_capacity(descrs.len() * 2);
            for descr in descrs {
                rest.push(inlines_to_sx(&descr.term));
                let mut defs = vec![Sx::sym(SYM_BLOCK)];
                defs.extend(descr.descriptions.iter().map(blocks_to_sx));
                rest.push(Sx::list(defs));
            }
            node("DESCRIPTION", rest)
        }
        BlockNode::Table(table) => {
            let mut rest = vec![row_to_sx(&table.header)];
            rest.extend(table.rows.iter().map(|row| row_to_sx(row)));
            node("TABLE", rest)
        }
        BlockNode::Region {
            kind,
            attrs,
            blocks,
            inlines,
        } => node(
            region_symbol(*kind),
            with_inlines(vec![attrs_to_sx(attrs), blocks_to_sx(blocks)], inlines),
        ),
        BlockNode::Verbatim {
            kind,
            attrs,
            content,
        } => node(
            verbatim_symbol(*kind),
            vec![attrs_to_sx(attrs), Sx::str(content.as_str())],
        ),
        BlockNode::Transclude { attrs, reference } => node(
            "TRANSCLUDE",
            vec![attrs_to_sx(attrs), reference_to_sx(reference)],
        ),
        BlockNode::Blob {
            description,
            syntax,
            blob,
        } => node(
            "BLOB",
            vec![
                inlines_to_sx(description),
                Sx::str(syntax.as_str()),
                Sx::str(blob_data(syntax, blob)),
            ],
        ),
    }
}

pub fn inline_to_sx(inline: &InlineNode) -> Sx {
    match inline {
        InlineNode::Text(s) => node("TEXT", vec![Sx::str(s.as_str())]),
        InlineNode::Space(lexeme) if lexeme == " " => node("SPACE", vec![]),
        InlineNode::Space(lexeme) => node("SPACE", vec![Sx::str(lexeme.as_str())]),
        InlineNode::Soft => node("SOFT", vec![]),
        InlineNode::Hard => node("HARD", vec![]),
        InlineNode::Link {
            attrs,
            reference,
            inlines,
        } => node(
            &format!("LINK-{}", reference.state.symbol()),
            with_inlines(
                vec![attrs_to_sx(attrs), Sx::str(reference.value.as_str())],
                inlines,
            ),
        ),
        InlineNode::Embed {
            attrs,
            reference,
            syntax,
            inlines,
        } => node(
            "EMBED",
            with_inlines(
                vec![
                    attrs_to_sx(attrs),
                    reference_to_sx(reference),
                    Sx::str(syntax.as_str()),
                ],
                inlines,
            ),
        ),
        InlineNode::EmbedBlob {
            attrs,
            syntax,
            blob,
            inlines,
        } => node(
            "EMBED-BLOB",
            with_inlines(
                vec![
                    attrs_to_sx(attrs),
                    Sx::str(syntax.as_str()),
                    Sx::str(blob_data(syntax, blob)),
                ],
                inlines,
            ),
        ),
        InlineNode::Cite {
            attrs,
            key,
            inlines,
        } => node(
            "CITE",
            with_inlines(vec![attrs_to_sx(attrs), Sx::str(key.as_str())], inlines),
        ),
        InlineNode::Footnote { attrs, inlines } => {
            node("ENDNOTE", with_inlines(vec![attrs_to_sx(attrs)], inlines))
        }
        InlineNode::Mark {
            mark,
            slug,
            fragment,
            inlines,
        } => node(
            "MARK",
            with_inlines(
                vec![
                    Sx::str(mark.as_str()),
                    Sx::str(slug.as_str()),
                    Sx::str(fragment.as_str()),
                ],
                inlines,
            ),
        ),
        InlineNode::Format {
            kind,
            attrs,
            inlines,
        } => node(
            format_symbol(*kind),
            with_inlines(vec![attrs_to_sx(attrs)], inlines),
        ),
        InlineNode::Literal {
            kind,
            attrs,
            content,
        } => node(
            literal_symbol(*kind),
            vec![attrs_to_sx(attrs), Sx::str(content.as_str())],
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{id::Zid, parser};
    use pretty_assertions::assert_eq;

    fn sz(src: &str) -> String {
        let blocks = parser::parse_blocks(src.as_bytes(), &Meta::new(Zid::INVALID), "zmk");
        blocks_to_sx(&blocks).to_string()
    }

    #[test]
    fn minimal_paragraph() {
        assert_eq!(
            sz("Hello, world"),
            r#"(BLOCK (PARA (TEXT "Hello,") (SPACE) (TEXT "world")))"#
        );
    }

    #[test]
    fn heading_and_attributes() {
        assert_eq!(
            sz("=== Title {.c}"),
            r#"(BLOCK (HEADING 1 (quote (("class" . "c"))) "title" "title" (TEXT "Title")))"#
        );
    }

    #[test]
    fn links_carry_their_state() {
        assert_eq!(
            sz("[[x|https://example.org]]"),
            r#"(BLOCK (PARA (LINK-EXTERNAL () "https://example.org" (TEXT "x"))))"#
        );
    }

    #[test]
    fn attributes_read_back() {
        let attrs = Attributes::new().with("", "go").with("lang", "en");
        assert_eq!(attrs_from_sx(&attrs_to_sx(&attrs)), attrs);
        assert_eq!(attrs_from_sx(&Sx::nil()), Attributes::new());
    }

    #[test]
    fn png_blob_is_base64() {
        let blob = BlockNode::Blob {
            description: vec![],
            syntax: "png".to_string(),
            blob: vec![0x89, b'P', b'N', b'G'],
        };
        assert_eq!(
            block_to_sx(&blob).to_string(),
            r#"(BLOB (INLINE) "png" "iVBORw==")"#
        );
    }

    #[test]
    fn meta_with_types() {
        let mut meta = Meta::new(Zid::parse("20240101120000").unwrap());
        meta.set("title", "T");
        assert_eq!(
            meta_to_sx(&meta).to_string(),
            r#"(META (IDENTIFIER "id" "20240101120000") (ZETTELMARKUP "title" "T"))"#
        );
    }
}

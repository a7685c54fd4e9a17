//! CommonMark content, parsed by pulldown-cmark and mapped onto the zettel AST.
//!
//! GFM extensions are enabled. Nodes without a counterpart are approximated: task list markers
//! become text, footnote definitions are folded into their references, metadata blocks are
//! dropped.
use std::collections::HashMap;

use pulldown_cmark::{
    Alignment as MdAlignment, CodeBlockKind, Event as MdEvent, Options, Parser as MdParser,
    Tag as MdTag,
};

use crate::{
    ast::{
        text_to_inlines, walk_blocks_mut, Alignment, Attributes, BlockNode, BlockSlice,
        Description, Descend, FormatKind, InlineNode, InlineSlice, ListKind, LiteralKind,
        Reference, RegionKind, Table, TableCell, VerbatimKind, VisitorMut,
    },
    meta::Meta,
    parser::SyntaxParser,
};

pub struct Markdown;

/// Footnote label carried by a reference until its definition is folded in.
const FOOTNOTE_LABEL: &str = "-md-footnote";

pub fn md_options() -> Options {
    let mut md_options = Options::empty();
    md_options.insert(Options::ENABLE_DEFINITION_LIST);
    md_options.insert(Options::ENABLE_FOOTNOTES);
    md_options.insert(Options::ENABLE_GFM);
    md_options.insert(Options::ENABLE_MATH);
    md_options.insert(Options::ENABLE_STRIKETHROUGH);
    md_options.insert(Options::ENABLE_SUBSCRIPT);
    md_options.insert(Options::ENABLE_SUPERSCRIPT);
    md_options.insert(Options::ENABLE_TABLES);
    md_options.insert(Options::ENABLE_TASKLISTS);
    md_options.insert(Options::ENABLE_YAML_STYLE_METADATA_BLOCKS);
    md_options
}

impl SyntaxParser for Markdown {
    fn parse_blocks(&self, input: &[u8], _meta: &Meta, _syntax: &str) -> BlockSlice {
        parse_markdown(&String::from_utf8_lossy(input))
    }

    fn parse_inlines(&self, input: &[u8], _syntax: &str) -> InlineSlice {
        let blocks = parse_markdown(&String::from_utf8_lossy(input));
        blocks
            .into_iter()
            .find_map(|block| match block {
                BlockNode::Para(inlines) => Some(inlines),
                _ => None,
            })
            .unwrap_or_default()
    }
}

pub fn parse_markdown(src: &str) -> BlockSlice {
    let mut builder = MdBuilder {
        events: MdParser::new_ext(src, md_options()).collect(),
        pos: 0,
        footnotes: HashMap::new(),
    };
    let mut blocks = builder.blocks();
    if builder.footnotes.is_empty() {
        return blocks;
    }
    let mut folder = FootnoteFolder(builder.footnotes);
    walk_blocks_mut(&mut folder, &mut blocks);
    blocks
}

struct MdBuilder<'a> {
    events: Vec<MdEvent<'a>>,
    pos: usize,
    footnotes: HashMap<String, InlineSlice>,
}

fn is_block_tag(tag: &MdTag) -> bool {
    matches!(
        tag,
        MdTag::Paragraph
            | MdTag::Heading { .. }
            | MdTag::BlockQuote(_)
            | MdTag::CodeBlock(_)
            | MdTag::HtmlBlock
            | MdTag::List(_)
            | MdTag::Item
            | MdTag::FootnoteDefinition(_)
            | MdTag::DefinitionList
            | MdTag::DefinitionListTitle
            | MdTag::DefinitionListDefinition
            | MdTag::Table(_)
            | MdTag::TableHead
            | MdTag::TableRow
            | MdTag::TableCell
            | MdTag::MetadataBlock(_)
    )
}

fn push_inlines(out: &mut InlineSlice, more: InlineSlice) {
    for node in more {
        match (out.last_mut(), node) {
            (Some(InlineNode::Text(prev)), InlineNode::Text(next)) => prev.push_str(&next),
            (_, node) => out.push(node),
        }
    }
}

impl<'a> MdBuilder<'a> {
    fn peek(&self) -> Option<&MdEvent<'a>> {
        self.events.get(self.pos)
    }

    /// Blocks up to and including the end tag closing the current level.
    fn blocks(&mut self) -> BlockSlice {
        let mut out = BlockSlice::new();
        while let Some(event) = self.peek().cloned() {
            match event {
                MdEvent::End(_) => {
                    self.pos += 1;
                    break;
                }
                MdEvent::Start(tag) if is_block_tag(&tag) => {
                    self.pos += 1;
                    if let Some(block) = self.block(tag) {
                        out.push(block);
                    }
                }
                MdEvent::Rule => {
                    self.pos += 1;
                    out.push(BlockNode::HRule {
                        attrs: Attributes::new(),
                    });
                }
                _ => {
                    let inlines = self.inline_run(true);
                    if !inlines.is_empty() {
                        out.push(BlockNode::Para(inlines));
                    }
                }
            }
        }
        out
    }

    /// Inline content. With `loose` set, stops in front of the next block instead of consuming
    /// up to the closing tag.
    fn inline_run(&mut self, loose: bool) -> InlineSlice {
        let mut out = InlineSlice::new();
        while let Some(event) = self.peek().cloned() {
            match event {
                MdEvent::End(_) => {
                    if !loose {
                        self.pos += 1;
                    }
                    break;
                }
                MdEvent::Start(tag) if is_block_tag(&tag) => {
                    if loose {
                        break;
                    }
                    self.pos += 1;
                    self.block(tag);
                }
                MdEvent::Rule if loose => break,
                event => {
                    self.pos += 1;
                    self.inline(event, &mut out);
                }
            }
        }
        out
    }

    fn inline(&mut self, event: MdEvent<'a>, out: &mut InlineSlice) {
        let node = match event {
            MdEvent::Text(text) => {
                push_inlines(out, text_to_inlines(&text));
                return;
            }
            MdEvent::Code(code) => literal(LiteralKind::Program, &code),
            MdEvent::InlineMath(math) | MdEvent::DisplayMath(math) => {
                literal(LiteralKind::Math, &math)
            }
            MdEvent::Html(html) | MdEvent::InlineHtml(html) => literal(LiteralKind::Html, &html),
            MdEvent::SoftBreak => InlineNode::Soft,
            MdEvent::HardBreak => InlineNode::Hard,
            MdEvent::FootnoteReference(label) => InlineNode::Footnote {
                attrs: Attributes::new().with(FOOTNOTE_LABEL, label.to_string()),
                inlines: InlineSlice::new(),
            },
            MdEvent::TaskListMarker(checked) => {
                push_inlines(
                    out,
                    vec![
                        InlineNode::text(if checked { "[x]" } else { "[ ]" }),
                        InlineNode::space(),
                    ],
                );
                return;
            }
            MdEvent::Start(tag) => {
                let kind = match &tag {
                    MdTag::Emphasis => Some(FormatKind::Emph),
                    MdTag::Strong => Some(FormatKind::Strong),
                    MdTag::Strikethrough => Some(FormatKind::Delete),
                    MdTag::Superscript => Some(FormatKind::Super),
                    MdTag::Subscript => Some(FormatKind::Sub),
                    _ => None,
                };
                let inlines = self.inline_run(false);
                match (kind, tag) {
                    (Some(kind), _) => InlineNode::Format {
                        kind,
                        attrs: Attributes::new(),
                        inlines,
                    },
                    (None, MdTag::Link { dest_url, .. }) => InlineNode::Link {
                        attrs: Attributes::new(),
                        reference: Reference::parse(&dest_url),
                        inlines,
                    },
                    (None, MdTag::Image { dest_url, .. }) => InlineNode::Embed {
                        attrs: Attributes::new(),
                        reference: Reference::parse(&dest_url),
                        syntax: String::new(),
                        inlines,
                    },
                    _ => {
                        push_inlines(out, inlines);
                        return;
                    }
                }
            }
            MdEvent::End(_) | MdEvent::Rule => return,
        };
        out.push(node);
    }

    fn raw_text(&mut self) -> String {
        let mut text = String::new();
        while let Some(event) = self.peek().cloned() {
            self.pos += 1;
            match event {
                MdEvent::End(_) => break,
                MdEvent::Text(t) | MdEvent::Html(t) | MdEvent::Code(t) => text.push_str(&t),
                _ => {}
            }
        }
        text
    }

    fn block(&mut self, tag: MdTag<'a>) -> Option<BlockNode> {
        match tag {
            MdTag::Paragraph => {
                let inlines = self.inline_run(false);
                (!inlines.is_empty()).then_some(BlockNode::Para(inlines))
            }
            MdTag::Heading { level, classes, .. } => {
                let mut attrs = Attributes::new();
                for class in classes {
                    attrs.add_class(&class);
                }
                Some(BlockNode::Heading {
                    level: (level as u8).clamp(1, 5),
                    attrs,
                    slug: String::new(),
                    fragment: String::new(),
                    inlines: self.inline_run(false),
                })
            }
            MdTag::BlockQuote(_) => Some(BlockNode::Region {
                kind: RegionKind::Quote,
                attrs: Attributes::new(),
                blocks: self.blocks(),
                inlines: InlineSlice::new(),
            }),
            MdTag::CodeBlock(kind) => {
                let mut attrs = Attributes::new();
                if let CodeBlockKind::Fenced(lang) = kind {
                    if let Some(lang) = lang.split_whitespace().next() {
                        attrs.set("", lang);
                    }
                }
                let content = self.raw_text();
                Some(BlockNode::Verbatim {
                    kind: VerbatimKind::Program,
                    attrs,
                    content: content.strip_suffix('\n').unwrap_or(&content).to_string(),
                })
            }
            MdTag::HtmlBlock => {
                let content = self.raw_text();
                Some(BlockNode::Verbatim {
                    kind: VerbatimKind::Html,
                    attrs: Attributes::new(),
                    content: content.trim_end().to_string(),
                })
            }
            MdTag::List(start) => {
                let kind = if start.is_some() {
                    ListKind::Ordered
                } else {
                    ListKind::Unordered
                };
                let mut items = Vec::new();
                while let Some(event) = self.peek().cloned() {
                    self.pos += 1;
                    match event {
                        MdEvent::Start(MdTag::Item) => items.push(self.blocks()),
                        MdEvent::End(_) => break,
                        _ => {}
                    }
                }
                Some(BlockNode::List { kind, items })
            }
            MdTag::FootnoteDefinition(label) => {
                let blocks = self.blocks();
                let mut inlines = InlineSlice::new();
                for block in blocks {
                    if let BlockNode::Para(para) = block {
                        if !inlines.is_empty() {
                            inlines.push(InlineNode::space());
                        }
                        inlines.extend(para);
                    }
                }
                self.footnotes.insert(label.to_string(), inlines);
                None
            }
            MdTag::DefinitionList => {
                let mut descrs: Vec<Description> = Vec::new();
                while let Some(event) = self.peek().cloned() {
                    self.pos += 1;
                    match event {
                        MdEvent::Start(MdTag::DefinitionListTitle) => descrs.push(Description {
                            term: self.inline_run(false),
                            descriptions: Vec::new(),
                        }),
                        MdEvent::Start(MdTag::DefinitionListDefinition) => {
                            let blocks = self.blocks();
                            if let Some(last) = descrs.last_mut() {
                                last.descriptions.push(blocks);
                            }
                        }
                        MdEvent::End(_) => break,
                        _ => {}
                    }
                }
                Some(BlockNode::Description(descrs))
            }
            MdTag::Table(aligns) => Some(BlockNode::Table(self.table(aligns))),
            MdTag::MetadataBlock(_) => {
                self.raw_text();
                None
            }
            _ => {
                self.blocks();
                None
            }
        }
    }

    fn table(&mut self, aligns: Vec<MdAlignment>) -> Table {
        let align: Vec<Alignment> = aligns
            .into_iter()
            .map(|a| match a {
                MdAlignment::None => Alignment::Default,
                MdAlignment::Left => Alignment::Left,
                MdAlignment::Center => Alignment::Center,
                MdAlignment::Right => Alignment::Right,
            })
            .collect();
        let mut header = Vec::new();
        let mut rows = Vec::new();
        while let Some(event) = self.peek().cloned() {
            self.pos += 1;
            match event {
                MdEvent::Start(MdTag::TableHead) => header = self.cells(&align),
                MdEvent::Start(MdTag::TableRow) => rows.push(self.cells(&align)),
                MdEvent::End(_) => break,
                _ => {}
            }
        }
        Table {
            header,
            rows,
            align,
        }
    }

    fn cells(&mut self, align: &[Alignment]) -> Vec<TableCell> {
        let mut cells = Vec::new();
        while let Some(event) = self.peek().cloned() {
            self.pos += 1;
            match event {
                MdEvent::Start(MdTag::TableCell) => cells.push(TableCell {
                    align: align.get(cells.len()).copied().unwrap_or_default(),
                    inlines: self.inline_run(false),
                }),
                MdEvent::End(_) => break,
                _ => {}
            }
        }
        cells
    }
}

fn literal(kind: LiteralKind, content: &str) -> InlineNode {
    InlineNode::Literal {
        kind,
        attrs: Attributes::new(),
        content: content.to_string(),
    }
}

struct FootnoteFolder(HashMap<String, InlineSlice>);

impl VisitorMut for FootnoteFolder {
    fn visit_inline(&mut self, inline: &mut InlineNode) -> Descend {
        if let InlineNode::Footnote { attrs, inlines } = inline {
            if let Some(label) = attrs.remove(FOOTNOTE_LABEL) {
                if let Some(text) = self.0.get(&label) {
                    *inlines = text.clone();
                }
            }
        }
        Descend::Children
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::RefState;

    #[test]
    fn paragraphs_and_emphasis() {
        let blocks = parse_markdown("Hello *world*\n\nsecond");
        assert_eq!(blocks.len(), 2);
        assert_eq!(
            blocks[0],
            BlockNode::Para(vec![
                InlineNode::text("Hello"),
                InlineNode::space(),
                InlineNode::Format {
                    kind: FormatKind::Emph,
                    attrs: Attributes::new(),
                    inlines: vec![InlineNode::text("world")],
                },
            ])
        );
    }

    #[test]
    fn headings_lists_and_code() {
        let blocks = parse_markdown("# Title\n\n- a\n- b\n\n```rust\nfn x() {}\n```\n");
        assert!(matches!(blocks[0], BlockNode::Heading { level: 1, .. }));
        match &blocks[1] {
            BlockNode::List { kind, items } => {
                assert_eq!(*kind, ListKind::Unordered);
                assert_eq!(items.len(), 2);
                assert_eq!(items[0], vec![BlockNode::Para(vec![InlineNode::text("a")])]);
            }
            other => panic!("{other:?}"),
        }
        assert_eq!(
            blocks[2],
            BlockNode::Verbatim {
                kind: VerbatimKind::Program,
                attrs: Attributes::new().with("", "rust"),
                content: "fn x() {}".to_string(),
            }
        );
    }

    #[test]
    fn links_and_images() {
        let blocks = parse_markdown("[x](https://example.com) ![alt](img.png)");
        let BlockNode::Para(inlines) = &blocks[0] else {
            panic!("{blocks:?}");
        };
        match &inlines[0] {
            InlineNode::Link { reference, .. } => {
                assert_eq!(reference.state, RefState::External)
            }
            other => panic!("{other:?}"),
        }
        assert!(matches!(inlines[2], InlineNode::Embed { .. }));
    }

    #[test]
    fn footnotes_are_folded() {
        let blocks = parse_markdown("a[^1]\n\n[^1]: note\n");
        let BlockNode::Para(inlines) = &blocks[0] else {
            panic!("{blocks:?}");
        };
        assert_eq!(
            inlines[1],
            InlineNode::Footnote {
                attrs: Attributes::new(),
                inlines: vec![InlineNode::text("note")],
            }
        );
    }

    #[test]
    fn tables() {
        let blocks = parse_markdown("| a | b |\n|:--|--:|\n| 1 | 2 |\n");
        let BlockNode::Table(table) = &blocks[0] else {
            panic!("{blocks:?}");
        };
        assert_eq!(table.align, vec![Alignment::Left, Alignment::Right]);
        assert_eq!(table.rows[0][1].inlines, vec![InlineNode::text("2")]);
    }
}

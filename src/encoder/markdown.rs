//! Best-effort CommonMark output.
//!
//! The AST is turned into pulldown-cmark events and printed by pulldown-cmark-to-cmark.
//! Description lists, tables, endnotes, transclusions, comments and BLOBs have no Markdown
//! counterpart and produce no output.
use std::io;

use pulldown_cmark::{
    BlockQuoteKind, CodeBlockKind, CowStr, Event as MdEvent, HeadingLevel, LinkType,
    Tag as MdTag, TagEnd,
};
use pulldown_cmark_to_cmark::cmark;

use crate::{
    ast::{
        BlockNode, BlockSlice, FormatKind, InlineNode, InlineSlice, ListKind, RegionKind,
        VerbatimKind,
    },
    config::HtmlInsecurity,
    encoder::{text::meta_value_text, EncWriter, Encoder, EncoderOptions},
    error::ZettelError,
    meta::Meta,
    parser::{parse_title, ParsedZettel},
};

#[derive(Debug, Default, Clone)]
pub struct MdEncoder {
    options: EncoderOptions,
}

impl MdEncoder {
    pub fn new(options: &EncoderOptions) -> MdEncoder {
        MdEncoder {
            options: options.clone(),
        }
    }

    fn allow_html(&self) -> bool {
        self.options.html_insecurity >= HtmlInsecurity::Markdown
    }

    fn render(&self, events: Vec<MdEvent<'static>>) -> Result<String, ZettelError> {
        let mut out = String::new();
        cmark(events.iter(), &mut out)?;
        Ok(out)
    }
}

impl Encoder for MdEncoder {
    fn write_zettel(&self, w: &mut dyn io::Write, zettel: &ParsedZettel) -> Result<usize, ZettelError> {
        let mut events = Vec::new();
        let title = parse_title(&zettel.inh_meta);
        if !title.is_empty() {
            events.push(MdEvent::Start(MdTag::Heading {
                level: HeadingLevel::H1,
                id: None,
                classes: vec![],
                attrs: vec![],
            }));
            self.inlines(&title, &mut events);
            events.push(MdEvent::End(TagEnd::Heading(HeadingLevel::H1)));
        }
        self.blocks(&zettel.ast, &mut events);
        let text = self.render(events)?;
        let mut out = EncWriter::new(w);
        out.write_str(&text);
        out.finish()
    }

    fn write_meta(&self, w: &mut dyn io::Write, meta: &Meta) -> Result<usize, ZettelError> {
        let mut out = EncWriter::new(w);
        for (key, value) in meta.pairs() {
            out.write_str(&format!("{key}: {}\n", meta_value_text(key, value)));
        }
        out.finish()
    }

    fn write_blocks(&self, w: &mut dyn io::Write, blocks: &BlockSlice) -> Result<usize, ZettelError> {
        let mut events = Vec::new();
        self.blocks(blocks, &mut events);
        let text = self.render(events)?;
        let mut out = EncWriter::new(w);
        out.write_str(&text);
        out.finish()
    }

    fn write_inlines(
        &self,
        w: &mut dyn io::Write,
        inlines: &InlineSlice,
    ) -> Result<usize, ZettelError> {
        let mut events = Vec::new();
        self.inlines(inlines, &mut events);
        let text = self.render(events)?;
        let mut out = EncWriter::new(w);
        out.write_str(&text);
        out.finish()
    }
}

fn heading_level(level: u8) -> HeadingLevel {
    match level {
        0 | 1 => HeadingLevel::H1,
        2 => HeadingLevel::H2,
        3 => HeadingLevel::H3,
        4 => HeadingLevel::H4,
        5 => HeadingLevel::H5,
        _ => HeadingLevel::H6,
    }
}

fn text(s: impl Into<String>) -> MdEvent<'static> {
    MdEvent::Text(CowStr::from(s.into()))
}

impl MdEncoder {
    fn blocks(&self, blocks: &BlockSlice, events: &mut Vec<MdEvent<'static>>) {
        for block in blocks {
            self.block(block, events);
        }
    }

    fn block(&self, block: &BlockNode, events: &mut Vec<MdEvent<'static>>) {
        match block {
            BlockNode::Para(inlines) => {
                events.push(MdEvent::Start(MdTag::Paragraph));
                self.inlines(inlines, events);
                events.push(MdEvent::End(TagEnd::Paragraph));
            }
            BlockNode::Heading { level, inlines, .. } => {
                let level = heading_level(*level);
                events.push(MdEvent::Start(MdTag::Heading {
                    level,
                    id: None,
                    classes: vec![],
                    attrs: vec![],
                }));
                self.inlines(inlines, events);
                events.push(MdEvent::End(TagEnd::Heading(level)));
            }
            BlockNode::HRule { .. } => events.push(MdEvent::Rule),
            BlockNode::List {
                kind: ListKind::Quote,
                items,
            } => {
                events.push(MdEvent::Start(MdTag::BlockQuote(None)));
                for item in items {
                    self.blocks(item, events);
                }
                events.push(MdEvent::End(TagEnd::BlockQuote(None::<BlockQuoteKind>)));
            }
            BlockNode::List { kind, items } => {
                let ordered = *kind == ListKind::Ordered;
                events.push(MdEvent::Start(MdTag::List(ordered.then_some(1))));
                for item in items {
                    events.push(MdEvent::Start(MdTag::Item));
                    match &item[..] {
                        [BlockNode::Para(inlines)] => self.inlines(inlines, events),
                        _ => self.blocks(item, events),
                    }
                    events.push(MdEvent::End(TagEnd::Item));
                }
                events.push(MdEvent::End(TagEnd::List(ordered)));
            }
            BlockNode::Region {
                kind: RegionKind::Quote,
                blocks,
                ..
            } => {
                events.push(MdEvent::Start(MdTag::BlockQuote(None)));
                self.blocks(blocks, events);
                events.push(MdEvent::End(TagEnd::BlockQuote(None)));
            }
            BlockNode::Region { blocks, .. } => self.blocks(blocks, events),
            BlockNode::Verbatim {
                kind: VerbatimKind::Comment,
                ..
            } => {}
            BlockNode::Verbatim {
                kind: VerbatimKind::Html,
                content,
                ..
            } => {
                if self.allow_html() {
                    events.push(MdEvent::Start(MdTag::HtmlBlock));
                    events.push(MdEvent::Html(CowStr::from(format!("{content}\n"))));
                    events.push(MdEvent::End(TagEnd::HtmlBlock));
                }
            }
            BlockNode::Verbatim { attrs, content, .. } => {
                let lang = attrs.default_value().unwrap_or_default().to_string();
                events.push(MdEvent::Start(MdTag::CodeBlock(CodeBlockKind::Fenced(
                    CowStr::from(lang),
                ))));
                events.push(text(format!("{content}\n")));
                events.push(MdEvent::End(TagEnd::CodeBlock));
            }
            BlockNode::Description(_)
            | BlockNode::Table(_)
            | BlockNode::Transclude { .. }
            | BlockNode::Blob { .. } => {}
        }
    }

    fn wrap_html(
        &self,
        tag: &str,
        inlines: &InlineSlice,
        events: &mut Vec<MdEvent<'static>>,
    ) {
        events.push(MdEvent::InlineHtml(CowStr::from(format!("<{tag}>"))));
        self.inlines(inlines, events);
        events.push(MdEvent::InlineHtml(CowStr::from(format!("</{tag}>"))));
    }

    fn inlines(&self, inlines: &InlineSlice, events: &mut Vec<MdEvent<'static>>) {
        for inline in inlines {
            self.inline(inline, events);
        }
    }

    fn inline(&self, inline: &InlineNode, events: &mut Vec<MdEvent<'static>>) {
        match inline {
            InlineNode::Text(s) => events.push(text(s.as_str())),
            InlineNode::Space(_) => events.push(text(" ")),
            InlineNode::Soft => events.push(MdEvent::SoftBreak),
            InlineNode::Hard => events.push(MdEvent::HardBreak),
            InlineNode::Link {
                reference, inlines, ..
            } => {
                events.push(MdEvent::Start(MdTag::Link {
                    link_type: LinkType::Inline,
                    dest_url: CowStr::from(reference.source()),
                    title: CowStr::from(""),
                    id: CowStr::from(""),
                }));
                if inlines.is_empty() {
                    events.push(text(reference.source()));
                } else {
                    self.inlines(inlines, events);
                }
                events.push(MdEvent::End(TagEnd::Link));
            }
            InlineNode::Embed {
                reference, inlines, ..
            } => {
                events.push(MdEvent::Start(MdTag::Image {
                    link_type: LinkType::Inline,
                    dest_url: CowStr::from(reference.source()),
                    title: CowStr::from(""),
                    id: CowStr::from(""),
                }));
                self.inlines(inlines, events);
                events.push(MdEvent::End(TagEnd::Image));
            }
            InlineNode::Cite { key, inlines, .. } => {
                events.push(text(key.as_str()));
                if !inlines.is_empty() {
                    events.push(text(", "));
                    self.inlines(inlines, events);
                }
            }
            InlineNode::Mark { inlines, .. } => self.inlines(inlines, events),
            InlineNode::Format { kind, inlines, .. } => match kind {
                FormatKind::Emph => {
                    events.push(MdEvent::Start(MdTag::Emphasis));
                    self.inlines(inlines, events);
                    events.push(MdEvent::End(TagEnd::Emphasis));
                }
                FormatKind::Strong => {
                    events.push(MdEvent::Start(MdTag::Strong));
                    self.inlines(inlines, events);
                    events.push(MdEvent::End(TagEnd::Strong));
                }
                FormatKind::Delete => {
                    events.push(MdEvent::Start(MdTag::Strikethrough));
                    self.inlines(inlines, events);
                    events.push(MdEvent::End(TagEnd::Strikethrough));
                }
                FormatKind::Insert => self.wrap_html("ins", inlines, events),
                FormatKind::Super => self.wrap_html("sup", inlines, events),
                FormatKind::Sub => self.wrap_html("sub", inlines, events),
                FormatKind::Mark => self.wrap_html("mark", inlines, events),
                FormatKind::Quote => {
                    events.push(text("\u{201c}"));
                    self.inlines(inlines, events);
                    events.push(text("\u{201d}"));
                }
                FormatKind::Span => self.inlines(inlines, events),
            },
            InlineNode::Literal { kind, content, .. } => match kind {
                crate::ast::LiteralKind::Comment => {}
                crate::ast::LiteralKind::Html => {
                    if self.allow_html() {
                        events.push(MdEvent::InlineHtml(CowStr::from(content.clone())));
                    }
                }
                _ => events.push(MdEvent::Code(CowStr::from(content.clone()))),
            },
            InlineNode::EmbedBlob { .. } | InlineNode::Footnote { .. } => {}
        }
    }
}

//! Post-parse cleanup: removes what must not reach an encoder and assigns heading and mark
//! fragments.
//!
//! Cleanup is idempotent, so parsed content can be cleaned again after evaluation without
//! renumbering anything.
use std::collections::HashSet;

use unicode_normalization::{char::is_combining_mark, UnicodeNormalization};

use crate::{
    ast::{
        attr::DASH_KEY,
        walk::{walk_inlines_mut, Descend, VisitorMut},
        walk_blocks_mut, BlockNode, BlockSlice, InlineNode, InlineSlice, LiteralKind,
        VerbatimKind,
    },
    config::HtmlInsecurity,
    encoder::text::inlines_to_text,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CleanupOptions {
    /// Alternative text of embedded images must not contain links or footnotes.
    pub no_links_in_alt: bool,
    pub html_insecurity: HtmlInsecurity,
}

impl Default for CleanupOptions {
    fn default() -> Self {
        CleanupOptions {
            no_links_in_alt: true,
            html_insecurity: HtmlInsecurity::None,
        }
    }
}

pub fn cleanup_blocks(blocks: &mut BlockSlice, syntax: &str, options: &CleanupOptions) {
    let mut structure = Structure::new(syntax, options);
    walk_blocks_mut(&mut structure, blocks);
    walk_blocks_mut(&mut Fragments::default(), blocks);
}

pub fn cleanup_inlines(inlines: &mut InlineSlice, syntax: &str, options: &CleanupOptions) {
    let mut structure = Structure::new(syntax, options);
    structure.clean(inlines);
    trim_inlines(inlines);
    walk_inlines_mut(&mut structure, inlines);
    walk_inlines_mut(&mut Fragments::default(), inlines);
}

/// Normalised anchor name: accents removed, lowercase, runs of other characters as one `-`.
pub fn slugify(s: &str) -> String {
    let mut slug = String::with_capacity(s.len());
    for ch in s.nfkd().filter(|ch| !is_combining_mark(*ch)) {
        if ch.is_alphanumeric() {
            slug.extend(ch.to_lowercase());
        } else if !slug.is_empty() && !slug.ends_with('-') {
            slug.push('-');
        }
    }
    while slug.ends_with('-') {
        slug.pop();
    }
    slug
}

struct Structure {
    allow_html: bool,
    no_links_in_alt: bool,
}

impl Structure {
    fn new(syntax: &str, options: &CleanupOptions) -> Structure {
        Structure {
            allow_html: options.html_insecurity.allow_html(syntax),
            no_links_in_alt: options.no_links_in_alt,
        }
    }

    fn keep_inline(&self, inline: &InlineNode) -> bool {
        match inline {
            InlineNode::Literal {
                kind: LiteralKind::Comment,
                attrs,
                ..
            } => attrs.has(DASH_KEY),
            InlineNode::Literal {
                kind: LiteralKind::Html,
                ..
            } => self.allow_html,
            _ => true,
        }
    }

    fn clean(&self, inlines: &mut InlineSlice) {
        let mut result = InlineSlice::with_capacity(inlines.len());
        for inline in inlines.drain(..) {
            if !self.keep_inline(&inline) {
                continue;
            }
            match (result.last_mut(), inline) {
                (Some(InlineNode::Text(prev)), InlineNode::Text(s)) => prev.push_str(&s),
                (Some(InlineNode::Space(prev)), InlineNode::Space(s)) => prev.push_str(&s),
                (Some(InlineNode::Space(_)), brk @ (InlineNode::Soft | InlineNode::Hard)) => {
                    result.pop();
                    result.push(brk);
                }
                (_, inline) => result.push(inline),
            }
        }
        *inlines = result;
    }
}

fn is_blank_inline(inline: &InlineNode) -> bool {
    matches!(
        inline,
        InlineNode::Space(_) | InlineNode::Soft | InlineNode::Hard
    )
}

fn trim_inlines(inlines: &mut InlineSlice) {
    while inlines.last().is_some_and(is_blank_inline) {
        inlines.pop();
    }
    let leading = inlines.iter().take_while(|i| is_blank_inline(i)).count();
    inlines.drain(..leading);
}

/// Links become their text and footnotes vanish, at any depth.
fn strip_alt(inlines: &mut InlineSlice) {
    let mut result = InlineSlice::with_capacity(inlines.len());
    for inline in inlines.drain(..) {
        match inline {
            InlineNode::Footnote { .. } => {}
            InlineNode::Link {
                inlines: mut children,
                ..
            } => {
                strip_alt(&mut children);
                result.extend(children);
            }
            InlineNode::Format {
                kind,
                attrs,
                inlines: mut children,
            } => {
                strip_alt(&mut children);
                result.push(InlineNode::Format {
                    kind,
                    attrs,
                    inlines: children,
                });
            }
            other => result.push(other),
        }
    }
    *inlines = result;
}

impl VisitorMut for Structure {
    fn visit_blocks(&mut self, blocks: &mut BlockSlice) -> Descend {
        for block in blocks.iter_mut() {
            if let BlockNode::Para(inlines) = block {
                self.clean(inlines);
                trim_inlines(inlines);
            }
        }
        let allow_html = self.allow_html;
        blocks.retain(|block| match block {
            BlockNode::Para(inlines) => !inlines.is_empty(),
            BlockNode::Verbatim {
                kind: VerbatimKind::Html,
                ..
            } => allow_html,
            _ => true,
        });
        Descend::Children
    }

    fn visit_block(&mut self, block: &mut BlockNode) -> Descend {
        if let BlockNode::Heading { inlines, .. } = block {
            self.clean(inlines);
            trim_inlines(inlines);
        }
        Descend::Children
    }

    fn visit_inlines(&mut self, inlines: &mut InlineSlice) -> Descend {
        self.clean(inlines);
        Descend::Children
    }

    fn visit_inline(&mut self, inline: &mut InlineNode) -> Descend {
        if self.no_links_in_alt {
            if let InlineNode::Embed { inlines, .. } | InlineNode::EmbedBlob { inlines, .. } =
                inline
            {
                strip_alt(inlines);
            }
        }
        Descend::Children
    }
}

/// Assigns slugs and document-unique fragments to headings and marks, in document order.
#[derive(Default)]
struct Fragments {
    used: HashSet<String>,
}

impl Fragments {
    fn unique(&mut self, slug: &str) -> String {
        if self.used.insert(slug.to_string()) {
            return slug.to_string();
        }
        let mut n = 1;
        loop {
            let candidate = format!("{slug}-{n}");
            if self.used.insert(candidate.clone()) {
                return candidate;
            }
            n += 1;
        }
    }

    fn assign(&mut self, source: &str, slug: &mut String, fragment: &mut String) {
        let new_slug = slugify(source);
        if new_slug.is_empty() {
            slug.clear();
            fragment.clear();
            return;
        }
        *fragment = self.unique(&new_slug);
        *slug = new_slug;
    }
}

impl VisitorMut for Fragments {
    fn visit_block(&mut self, block: &mut BlockNode) -> Descend {
        if let BlockNode::Heading {
            inlines,
            slug,
            fragment,
            ..
        } = block
        {
            let text = inlines_to_text(inlines);
            self.assign(&text, slug, fragment);
        }
        Descend::Children
    }

    fn visit_inline(&mut self, inline: &mut InlineNode) -> Descend {
        if let InlineNode::Mark {
            mark,
            slug,
            fragment,
            ..
        } = inline
        {
            let mark = mark.clone();
            self.assign(&mark, slug, fragment);
        }
        Descend::Children
    }
}

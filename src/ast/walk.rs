//! Depth-first traversal of the AST.
//!
//! A [`Visitor`] sees every slice and node before its children and decides whether to descend.
//! Slices are visited too, so transforms can intercept a whole block or inline sequence.
use super::{BlockNode, BlockSlice, InlineNode, InlineSlice};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Descend {
    Children,
    Prune,
}

#[derive(Debug, Clone, Copy)]
pub enum Node<'a> {
    Blocks(&'a BlockSlice),
    Inlines(&'a InlineSlice),
    Block(&'a BlockNode),
    Inline(&'a InlineNode),
}

pub trait Visitor {
    fn visit(&mut self, node: Node<'_>) -> Descend;
}

pub fn walk_blocks<V: Visitor + ?Sized>(v: &mut V, blocks: &BlockSlice) {
    if v.visit(Node::Blocks(blocks)) == Descend::Prune {
        return;
    }
    for block in blocks {
        walk_block(v, block);
    }
}

pub fn walk_inlines<V: Visitor + ?Sized>(v: &mut V, inlines: &InlineSlice) {
    if v.visit(Node::Inlines(inlines)) == Descend::Prune {
        return;
    }
    for inline in inlines {
        walk_inline(v, inline);
    }
}

pub fn walk_block<V: Visitor + ?Sized>(v: &mut V, block: &BlockNode) {
    if v.visit(Node::Block(block)) == Descend::Prune {
        return;
    }
    match block {
        BlockNode::Para(inlines) | BlockNode::Heading { inlines, .. } => walk_inlines(v, inlines),
        BlockNode::List { items, .. } => {
            for item in items {
                walk_blocks(v, item);
            }
        }
        BlockNode::Description(descrs) => {
            for d in descrs {
                walk_inlines(v, &d.term);
                for blocks in &d.descriptions {
                    walk_blocks(v, blocks);
                }
            }
        }
        BlockNode::Table(table) => {
            for cell in table.header.iter().chain(table.rows.iter().flatten()) {
                walk_inlines(v, &cell.inlines);
            }
        }
        BlockNode::Region { blocks, inlines, .. } => {
            walk_blocks(v, blocks);
            walk_inlines(v, inlines);
        }
        BlockNode::Blob { description, .. } => walk_inlines(v, description),
        BlockNode::HRule { .. } | BlockNode::Verbatim { .. } | BlockNode::Transclude { .. } => {}
    }
}

pub fn walk_inline<V: Visitor + ?Sized>(v: &mut V, inline: &InlineNode) {
    if v.visit(Node::Inline(inline)) == Descend::Prune {
        return;
    }
    if let Some(children) = inline_children(inline) {
        walk_inlines(v, children);
    }
}

fn inline_children(inline: &InlineNode) -> Option<&InlineSlice> {
    match inline {
        InlineNode::Link { inlines, .. }
        | InlineNode::Embed { inlines, .. }
        | InlineNode::EmbedBlob { inlines, .. }
        | InlineNode::Cite { inlines, .. }
        | InlineNode::Footnote { inlines, .. }
        | InlineNode::Mark { inlines, .. }
        | InlineNode::Format { inlines, .. } => Some(inlines),
        InlineNode::Text(_)
        | InlineNode::Space(_)
        | InlineNode::Soft
        | InlineNode::Hard
        | InlineNode::Literal { .. } => None,
    }
}

/// Mutating counterpart of [`Visitor`]. Slice hooks may rewrite a slice wholesale before its
/// elements are visited.
pub trait VisitorMut {
    fn visit_blocks(&mut self, _blocks: &mut BlockSlice) -> Descend {
        Descend::Children
    }

    fn visit_inlines(&mut self, _inlines: &mut InlineSlice) -> Descend {
        Descend::Children
    }

    fn visit_block(&mut self, _block: &mut BlockNode) -> Descend {
        Descend::Children
    }

    fn visit_inline(&mut self, _inline: &mut InlineNode) -> Descend {
        Descend::Children
    }
}

pub fn walk_blocks_mut<V: VisitorMut + ?Sized>(v: &mut V, blocks: &mut BlockSlice) {
    if v.visit_blocks(blocks) == Descend::Prune {
        return;
    }
    for block in blocks.iter_mut() {
        walk_block_mut(v, block);
    }
}

pub fn walk_inlines_mut<V: VisitorMut + ?Sized>(v: &mut V, inlines: &mut InlineSlice) {
    if v.visit_inlines(inlines) == Descend::Prune {
        return;
    }
    for inline in inlines.iter_mut() {
        walk_inline_mut(v, inline);
    }
}

pub fn walk_block_mut<V: VisitorMut + ?Sized>(v: &mut V, block: &mut BlockNode) {
    if v.visit_block(block) == Descend::Prune {
        return;
    }
    match block {
        BlockNode::Para(inlines) | BlockNode::Heading { inlines, .. } => {
            walk_inlines_mut(v, inlines)
        }
        BlockNode::List { items, .. } => {
            for item in items.iter_mut() {
                walk_blocks_mut(v, item);
            }
        }
        BlockNode::Description(descrs) => {
            for d in descrs.iter_mut() {
                walk_inlines_mut(v, &mut d.term);
                for blocks in d.descriptions.iter_mut() {
                    walk_blocks_mut(v, blocks);
                }
            }
        }
        BlockNode::Table(table) => {
            for cell in table
                .header
                .iter_mut()
                .chain(table.rows.iter_mut().flatten())
            {
                walk_inlines_mut(v, &mut cell.inlines);
            }
        }
        BlockNode::Region { blocks, inlines, .. } => {
            walk_blocks_mut(v, blocks);
            walk_inlines_mut(v, inlines);
        }
        BlockNode::Blob { description, .. } => walk_inlines_mut(v, description),
        BlockNode::HRule { .. } | BlockNode::Verbatim { .. } | BlockNode::Transclude { .. } => {}
    }
}

pub fn walk_inline_mut<V: VisitorMut + ?Sized>(v: &mut V, inline: &mut InlineNode) {
    if v.visit_inline(inline) == Descend::Prune {
        return;
    }
    match inline {
        InlineNode::Link { inlines, .. }
        | InlineNode::Embed { inlines, .. }
        | InlineNode::EmbedBlob { inlines, .. }
        | InlineNode::Cite { inlines, .. }
        | InlineNode::Footnote { inlines, .. }
        | InlineNode::Mark { inlines, .. }
        | InlineNode::Format { inlines, .. } => walk_inlines_mut(v, inlines),
        InlineNode::Text(_)
        | InlineNode::Space(_)
        | InlineNode::Soft
        | InlineNode::Hard
        | InlineNode::Literal { .. } => {}
    }
}

/// Collects every reference of links, embeds and transclusions, in document order.
pub fn collect_references(blocks: &BlockSlice) -> Vec<super::Reference> {
    struct Collector(Vec<super::Reference>);
    impl Visitor for Collector {
        fn visit(&mut self, node: Node<'_>) -> Descend {
            match node {
                Node::Block(BlockNode::Transclude { reference, .. })
                | Node::Inline(InlineNode::Link { reference, .. })
                | Node::Inline(InlineNode::Embed { reference, .. }) => {
                    self.0.push(reference.clone())
                }
                _ => {}
            }
            Descend::Children
        }
    }
    let mut c = Collector(Vec::new());
    walk_blocks(&mut c, blocks);
    c.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{Attributes, Reference};

    struct Counter {
        texts: usize,
        prune_links: bool,
    }

    impl Visitor for Counter {
        fn visit(&mut self, node: Node<'_>) -> Descend {
            match node {
                Node::Inline(InlineNode::Text(_)) => self.texts += 1,
                Node::Inline(InlineNode::Link { .. }) if self.prune_links => {
                    return Descend::Prune
                }
                _ => {}
            }
            Descend::Children
        }
    }

    fn sample() -> BlockSlice {
        vec![BlockNode::Para(vec![
            InlineNode::text("a"),
            InlineNode::Link {
                attrs: Attributes::new(),
                reference: Reference::parse("20240101000000"),
                inlines: vec![InlineNode::text("b")],
            },
        ])]
    }

    #[test]
    fn prune_skips_children() {
        let blocks = sample();
        let mut all = Counter {
            texts: 0,
            prune_links: false,
        };
        walk_blocks(&mut all, &blocks);
        assert_eq!(all.texts, 2);
        let mut pruned = Counter {
            texts: 0,
            prune_links: true,
        };
        walk_blocks(&mut pruned, &blocks);
        assert_eq!(pruned.texts, 1);
    }

    #[test]
    fn references_in_order() {
        let refs = collect_references(&sample());
        assert_eq!(refs.len(), 1);
        assert_eq!(refs[0].value, "20240101000000");
    }
}

//! Evaluation of parsed content against a zettel store.
//!
//! The [`Evaluator`] walks an AST and expands transclusions, embeds and queries, and checks the
//! targets of zettel links. It never fails: problems become inline error nodes in the tree.
//! Every transclusion and embed is charged against a budget taken from the runtime
//! configuration, and a zettel that is being expanded cannot be transcluded again.
//!
//! Zettel are fetched through a [`Port`], usually the box manager.
use std::collections::HashMap;

use crate::{
    ast::{
        error_inline, text_to_inlines,
        walk::{walk_block, walk_block_mut, walk_blocks, walk_inline_mut, walk_inlines_mut},
        walk_blocks_mut, Attributes, BlockNode, BlockSlice, Description, Descend, FormatKind,
        InlineNode, InlineSlice, Node, RefState, Reference, Visitor, VisitorMut,
    },
    config::{RuntimeConfig, DEFAULT_MAX_TRANSCLUSIONS},
    context::Context,
    error::ZettelError,
    id::Zid,
    meta::{
        key_type,
        keys::{is_valid_key, KEY_SYNTAX},
        KeyType, Meta,
    },
    parser::{self, blob::image_description, parse_zettel, sxn::sxn_blocks, ParsedZettel},
    query::{parse_query, Query},
    zettel::Zettel,
};

pub mod action;

/// Access to zettel needed during evaluation.
pub trait Port {
    fn get_zettel(&self, ctx: &Context, zid: Zid) -> Result<Zettel, ZettelError>;
    fn get_meta(&self, ctx: &Context, zid: Zid) -> Result<Meta, ZettelError>;
    fn query_meta(&self, ctx: &Context, query: &Query) -> Result<Vec<Meta>, ZettelError>;

    /// Schedules a zettel for re-indexing. Ports without an index ignore it.
    fn reindex(&self, _ctx: &Context, _zid: Zid) -> Result<(), ZettelError> {
        Ok(())
    }
}

/// Decides which zettel the current principal may read.
pub trait AccessPolicy {
    fn can_read(&self, meta: &Meta) -> bool;
}

impl<F: Fn(&Meta) -> bool> AccessPolicy for F {
    fn can_read(&self, meta: &Meta) -> bool {
        self(meta)
    }
}

/// A port that hides zettel the policy does not allow to read.
pub struct PolicyPort<P, A> {
    port: P,
    policy: A,
}

impl<P: Port, A: AccessPolicy> PolicyPort<P, A> {
    pub fn new(port: P, policy: A) -> Self {
        PolicyPort { port, policy }
    }

    fn check(&self, meta: &Meta) -> Result<(), ZettelError> {
        if self.policy.can_read(meta) {
            Ok(())
        } else {
            Err(ZettelError::NotAllowed {
                op: "read".to_string(),
                zid: meta.zid(),
            })
        }
    }
}

impl<P: Port, A: AccessPolicy> Port for PolicyPort<P, A> {
    fn get_zettel(&self, ctx: &Context, zid: Zid) -> Result<Zettel, ZettelError> {
        let zettel = self.port.get_zettel(ctx, zid)?;
        self.check(&zettel.meta)?;
        Ok(zettel)
    }

    fn get_meta(&self, ctx: &Context, zid: Zid) -> Result<Meta, ZettelError> {
        let meta = self.port.get_meta(ctx, zid)?;
        self.check(&meta)?;
        Ok(meta)
    }

    fn query_meta(&self, ctx: &Context, query: &Query) -> Result<Vec<Meta>, ZettelError> {
        let mut metas = self.port.query_meta(ctx, query)?;
        metas.retain(|meta| self.policy.can_read(meta));
        Ok(metas)
    }

    fn reindex(&self, ctx: &Context, zid: Zid) -> Result<(), ZettelError> {
        self.port.reindex(ctx, zid)
    }
}

#[derive(Debug, Clone)]
enum Cost {
    InProgress,
    Done { ast: BlockSlice, cost: usize },
}

pub struct Evaluator<'a> {
    ctx: &'a Context,
    port: &'a dyn Port,
    rtc: Option<&'a dyn RuntimeConfig>,
    transclude_max: usize,
    transclude_count: usize,
    cost_map: HashMap<Zid, Cost>,
    /// Syntax and default description of embedded images.
    embed_map: HashMap<Zid, (String, InlineSlice)>,
}

impl<'a> Evaluator<'a> {
    pub fn new(
        ctx: &'a Context,
        port: &'a dyn Port,
        rtc: Option<&'a dyn RuntimeConfig>,
    ) -> Evaluator<'a> {
        Evaluator {
            ctx,
            port,
            rtc,
            transclude_max: rtc
                .map(|rtc| rtc.max_transclusions())
                .unwrap_or(DEFAULT_MAX_TRANSCLUSIONS),
            transclude_count: 0,
            cost_map: HashMap::new(),
            embed_map: HashMap::new(),
        }
    }

    pub fn with_max_transclusions(mut self, max: usize) -> Self {
        self.transclude_max = max;
        self
    }

    /// Transclusions and embeds charged so far.
    pub fn transclude_count(&self) -> usize {
        self.transclude_count
    }

    #[tracing::instrument(skip_all, fields(zid = %zettel.meta.zid()))]
    pub fn evaluate_zettel(&mut self, zettel: &mut ParsedZettel) {
        let zid = zettel.meta.zid();
        let before = self.transclude_count;
        if zid.is_valid() {
            self.cost_map.insert(zid, Cost::InProgress);
        }
        self.expand(zettel);
        if zid.is_valid() {
            self.cost_map.insert(
                zid,
                Cost::Done {
                    ast: zettel.ast.clone(),
                    cost: self.transclude_count - before,
                },
            );
        }
    }

    pub fn evaluate_blocks(&mut self, blocks: &mut BlockSlice) {
        walk_blocks_mut(self, blocks);
    }

    pub fn evaluate_inlines(&mut self, inlines: &mut InlineSlice) {
        walk_inlines_mut(self, inlines);
    }

    fn expand(&mut self, zettel: &mut ParsedZettel) {
        match zettel.syntax.as_str() {
            "none" => zettel.ast = meta_description(&zettel.inh_meta),
            "sxn" => zettel.ast = sxn_blocks(&zettel.content.as_text(), true),
            _ => {}
        }
        self.evaluate_blocks(&mut zettel.ast);
    }

    fn charge(&mut self, amount: usize) -> Result<(), ZettelError> {
        self.transclude_count += amount;
        if self.transclude_count > self.transclude_max {
            tracing::debug!(
                "[Evaluator] Transclusion budget of {} exhausted",
                self.transclude_max
            );
            return Err(ZettelError::EvalLimit);
        }
        Ok(())
    }

    fn error_message(&self, err: &ZettelError) -> String {
        match err {
            ZettelError::EvalLimit => format!(
                "Too many transclusions (must be at most {}, see runtime configuration key max-transclusions)",
                self.transclude_max
            ),
            err => err.to_string(),
        }
    }

    fn error_para(&self, err: &ZettelError) -> BlockSlice {
        vec![BlockNode::Para(vec![error_inline(self.error_message(err))])]
    }

    /// `Ok(None)` if the zettel may not be read.
    fn fetch(&self, zid: Zid) -> Result<Option<Zettel>, ZettelError> {
        match self.port.get_zettel(self.ctx, zid) {
            Ok(zettel) => Ok(Some(zettel)),
            Err(ZettelError::NotAllowed { .. }) => {
                tracing::debug!("[Evaluator] Skipping zettel {zid}, access denied");
                Ok(None)
            }
            Err(err) => Err(err),
        }
    }

    /// The memoized expansion of a zettel, or an error if it is being expanded right now.
    fn memoized(&mut self, zid: Zid) -> Result<Option<BlockSlice>, ZettelError> {
        match self.cost_map.get(&zid) {
            Some(Cost::InProgress) => Err(ZettelError::EvalCycle(zid)),
            Some(Cost::Done { ast, cost }) => {
                let (ast, cost) = (ast.clone(), *cost);
                self.charge(cost)?;
                Ok(Some(ast))
            }
            None => Ok(None),
        }
    }

    fn expand_target(&mut self, mut zettel: Zettel, attrs: &Attributes) -> BlockSlice {
        let zid = zettel.zid();
        apply_attribute_meta(&mut zettel.meta, attrs);
        let mut parsed = parse_zettel(&zettel, "", self.rtc);
        let before = self.transclude_count;
        self.cost_map.insert(zid, Cost::InProgress);
        self.expand(&mut parsed);
        self.cost_map.insert(
            zid,
            Cost::Done {
                ast: parsed.ast.clone(),
                cost: self.transclude_count - before,
            },
        );
        parsed.ast
    }

    fn transclude(&mut self, attrs: &Attributes, reference: &Reference) -> BlockSlice {
        if let Err(err) = self.charge(1) {
            return self.error_para(&err);
        }
        match reference.state {
            RefState::Invalid => self.error_para(&ZettelError::InvalidZid(reference.value.clone())),
            RefState::Broken => match reference.zid() {
                Some(zid) => self.error_para(&ZettelError::NotFound(zid)),
                None => self.error_para(&ZettelError::InvalidZid(reference.value.clone())),
            },
            RefState::SelfRef => vec![BlockNode::Para(vec![error_inline(format!(
                "Self transclusion of {} is not possible",
                reference.value
            ))])],
            RefState::Found | RefState::External => vec![BlockNode::Transclude {
                attrs: attrs.clone(),
                reference: reference.clone(),
            }],
            RefState::Hosted | RefState::Based => match image_syntax(reference) {
                Some(syntax) => vec![BlockNode::Para(vec![InlineNode::Embed {
                    attrs: attrs.clone(),
                    reference: reference.clone(),
                    syntax,
                    inlines: InlineSlice::new(),
                }])],
                None => vec![BlockNode::Transclude {
                    attrs: attrs.clone(),
                    reference: reference.clone(),
                }],
            },
            RefState::Query => self.transclude_query(reference),
            RefState::Zettel => match reference.zid() {
                Some(zid) => self.transclude_zettel(zid, attrs, reference.fragment()),
                None => self.error_para(&ZettelError::InvalidZid(reference.value.clone())),
            },
        }
    }

    fn transclude_zettel(
        &mut self,
        zid: Zid,
        attrs: &Attributes,
        fragment: Option<&str>,
    ) -> BlockSlice {
        let ast = match self.memoized(zid) {
            Ok(Some(ast)) => ast,
            Ok(None) => match self.fetch(zid) {
                Ok(Some(zettel)) => self.expand_target(zettel, attrs),
                Ok(None) => return BlockSlice::new(),
                Err(err) => return self.error_para(&err),
            },
            Err(err) => return self.error_para(&err),
        };
        match fragment {
            None => ast,
            Some(fragment) => select_section(&ast, fragment).unwrap_or_else(|| {
                vec![BlockNode::Para(vec![error_inline(format!(
                    "Fragment #{fragment} not found in zettel {zid}"
                ))])]
            }),
        }
    }

    fn run_query(&mut self, reference: &Reference) -> Result<BlockSlice, ZettelError> {
        let query = parse_query(&reference.value);
        let metas = self.port.query_meta(self.ctx, &query)?;
        if query
            .actions
            .iter()
            .any(|action| action == action::ACTION_REINDEX)
        {
            for meta in &metas {
                if let Err(err) = self.port.reindex(self.ctx, meta.zid()) {
                    tracing::warn!("[Evaluator] Unable to reindex {}: {err}", meta.zid());
                }
            }
        }
        let site_name = self.rtc.map(|rtc| rtc.site_name()).unwrap_or_default();
        let mut blocks: BlockSlice = action::query_action(&query, &metas, site_name)
            .into_iter()
            .collect();
        self.evaluate_blocks(&mut blocks);
        Ok(blocks)
    }

    fn transclude_query(&mut self, reference: &Reference) -> BlockSlice {
        self.run_query(reference)
            .unwrap_or_else(|err| self.error_para(&err))
    }

    fn embed(
        &mut self,
        attrs: &Attributes,
        reference: &Reference,
        syntax: &str,
        inlines: &InlineSlice,
    ) -> InlineSlice {
        let unchanged = || {
            vec![InlineNode::Embed {
                attrs: attrs.clone(),
                reference: reference.clone(),
                syntax: syntax.to_string(),
                inlines: inlines.clone(),
            }]
        };
        match reference.state {
            RefState::Found | RefState::External => return unchanged(),
            RefState::Hosted | RefState::Based => {
                return match (syntax.is_empty(), image_syntax(reference)) {
                    (true, Some(image)) => vec![InlineNode::Embed {
                        attrs: attrs.clone(),
                        reference: reference.clone(),
                        syntax: image,
                        inlines: inlines.clone(),
                    }],
                    _ => unchanged(),
                };
            }
            _ => {}
        }
        if let Err(err) = self.charge(1) {
            return vec![error_inline(self.error_message(&err))];
        }
        match reference.state {
            RefState::Query => match self.run_query(reference) {
                Ok(blocks) => paragraph_inlines(&blocks),
                Err(err) => vec![error_inline(self.error_message(&err))],
            },
            RefState::Zettel => match reference.zid() {
                Some(zid) => self.embed_zettel(zid, attrs, reference, inlines),
                None => vec![broken_embed(attrs, inlines)],
            },
            RefState::Broken => vec![broken_embed(attrs, inlines)],
            RefState::SelfRef => vec![error_inline(format!(
                "Self embedding of {} is not possible",
                reference.value
            ))],
            _ => vec![error_inline(
                ZettelError::InvalidZid(reference.value.clone()).to_string(),
            )],
        }
    }

    fn embed_zettel(
        &mut self,
        zid: Zid,
        attrs: &Attributes,
        reference: &Reference,
        inlines: &InlineSlice,
    ) -> InlineSlice {
        if let Some((syntax, description)) = self.embed_map.get(&zid) {
            return vec![image_embed(attrs, reference, syntax, description, inlines)];
        }
        let ast = match self.memoized(zid) {
            Ok(Some(ast)) => ast,
            Ok(None) => {
                let zettel = match self.fetch(zid) {
                    Ok(Some(zettel)) => zettel,
                    Ok(None) => return InlineSlice::new(),
                    Err(ZettelError::NotFound(_)) => return vec![broken_embed(attrs, inlines)],
                    Err(err) => return vec![error_inline(self.error_message(&err))],
                };
                let info = parser::get(zettel.meta.syntax());
                if info.is_image_format() {
                    let syntax = info.name.clone();
                    let description = image_description(&zettel.meta);
                    let result =
                        vec![image_embed(attrs, reference, &syntax, &description, inlines)];
                    self.embed_map.insert(zid, (syntax, description));
                    return result;
                }
                if !info.is_ast_parser() {
                    return vec![error_inline(format!(
                        "Unable to embed zettel {zid} of syntax {}",
                        info.name
                    ))];
                }
                self.expand_target(zettel, attrs)
            }
            Err(err) => return vec![error_inline(self.error_message(&err))],
        };
        match reference.fragment() {
            Some(fragment) => fragment_inlines(&ast, fragment).unwrap_or_else(|| {
                vec![error_inline(format!(
                    "Fragment #{fragment} not found in zettel {zid}"
                ))]
            }),
            None => first_inlines(&ast, attrs).unwrap_or_else(|| {
                vec![error_inline(format!("Nothing to embed from zettel {zid}"))]
            }),
        }
    }

    fn resolve_link(&mut self, inline: &mut InlineNode) {
        let InlineNode::Link {
            attrs,
            reference,
            inlines,
        } = inline
        else {
            return;
        };
        if reference.state != RefState::Zettel {
            return;
        }
        let Some(zid) = reference.zid() else {
            reference.state = RefState::Invalid;
            return;
        };
        match self.port.get_meta(self.ctx, zid) {
            Ok(_) => {}
            Err(ZettelError::NotAllowed { .. }) => {
                let mut text = std::mem::take(inlines);
                if text.is_empty() {
                    text.push(InlineNode::Text(reference.value.clone()));
                }
                *inline = InlineNode::Format {
                    kind: FormatKind::Span,
                    attrs: std::mem::take(attrs),
                    inlines: text,
                };
            }
            Err(err) => {
                tracing::debug!("[Evaluator] Link to {zid} is broken: {err}");
                reference.state = RefState::Broken;
            }
        }
    }
}

impl VisitorMut for Evaluator<'_> {
    fn visit_blocks(&mut self, blocks: &mut BlockSlice) -> Descend {
        let mut i = 0;
        while i < blocks.len() {
            if let BlockNode::Transclude { attrs, reference } = &blocks[i] {
                let (attrs, reference) = (attrs.clone(), reference.clone());
                let replacement = self.transclude(&attrs, &reference);
                let n = replacement.len();
                blocks.splice(i..=i, replacement);
                i += n;
            } else {
                walk_block_mut(self, &mut blocks[i]);
                i += 1;
            }
        }
        Descend::Prune
    }

    fn visit_inlines(&mut self, inlines: &mut InlineSlice) -> Descend {
        let mut i = 0;
        while i < inlines.len() {
            if let InlineNode::Embed {
                attrs,
                reference,
                syntax,
                inlines: alt,
            } = &inlines[i]
            {
                let (attrs, reference, syntax, alt) =
                    (attrs.clone(), reference.clone(), syntax.clone(), alt.clone());
                let replacement = self.embed(&attrs, &reference, &syntax, &alt);
                let n = replacement.len();
                inlines.splice(i..=i, replacement);
                i += n;
            } else {
                self.resolve_link(&mut inlines[i]);
                walk_inline_mut(self, &mut inlines[i]);
                i += 1;
            }
        }
        Descend::Prune
    }
}

/// Evaluates a parsed zettel in place.
pub fn evaluate_zettel(
    ctx: &Context,
    port: &dyn Port,
    rtc: Option<&dyn RuntimeConfig>,
    zettel: &mut ParsedZettel,
) {
    Evaluator::new(ctx, port, rtc).evaluate_zettel(zettel);
}

/// Evaluates free-standing blocks in place.
pub fn evaluate_blocks(
    ctx: &Context,
    port: &dyn Port,
    rtc: Option<&dyn RuntimeConfig>,
    blocks: &mut BlockSlice,
) {
    Evaluator::new(ctx, port, rtc).evaluate_blocks(blocks);
}

fn image_syntax(reference: &Reference) -> Option<String> {
    let ext = reference.extension()?;
    parser::PARSERS
        .lookup(&ext)
        .filter(|info| info.is_image_format())
        .map(|info| info.name.clone())
}

/// Attributes of a transclusion override metadata of the target; the default attribute names
/// its syntax.
fn apply_attribute_meta(meta: &mut Meta, attrs: &Attributes) {
    for (key, value) in attrs.iter() {
        match key {
            "" => meta.set(KEY_SYNTAX, value),
            "class" | "-" => {}
            key if is_valid_key(key) => meta.set(key, value),
            _ => {}
        }
    }
}

fn broken_embed(attrs: &Attributes, inlines: &InlineSlice) -> InlineNode {
    InlineNode::Embed {
        attrs: attrs.clone(),
        reference: Reference::new(Zid::EMOJI.to_string(), RefState::Found),
        syntax: "gif".to_string(),
        inlines: inlines.clone(),
    }
}

/// Metadata of a zettel without content, as a description list.
fn meta_description(meta: &Meta) -> BlockSlice {
    let descriptions = meta
        .computed_pairs()
        .into_iter()
        .map(|(key, value)| Description {
            term: vec![InlineNode::Text(key.clone())],
            descriptions: vec![vec![BlockNode::Para(meta_value_inlines(&key, &value))]],
        })
        .collect();
    vec![BlockNode::Description(descriptions)]
}

fn meta_value_inlines(key: &str, value: &str) -> InlineSlice {
    match key_type(key) {
        KeyType::Id | KeyType::IdSet => {
            let mut result = InlineSlice::new();
            for zid in value.split_whitespace().filter_map(|s| Zid::parse(s).ok()) {
                if !result.is_empty() {
                    result.push(InlineNode::space());
                }
                result.push(InlineNode::Link {
                    attrs: Attributes::new(),
                    reference: Reference::new(zid.to_string(), RefState::Zettel),
                    inlines: InlineSlice::new(),
                });
            }
            result
        }
        _ => text_to_inlines(value),
    }
}

fn heading_position(blocks: &BlockSlice, fragment: &str) -> Option<(usize, u8)> {
    blocks.iter().enumerate().find_map(|(i, block)| match block {
        BlockNode::Heading {
            level, fragment: f, ..
        } if f == fragment => Some((i, *level)),
        _ => None,
    })
}

struct MarkFinder<'f> {
    fragment: &'f str,
    found: Option<InlineSlice>,
}

impl Visitor for MarkFinder<'_> {
    fn visit(&mut self, node: Node<'_>) -> Descend {
        if self.found.is_some() {
            return Descend::Prune;
        }
        if let Node::Inlines(inlines) = node {
            let has_mark = inlines.iter().any(
                |inline| matches!(inline, InlineNode::Mark { fragment, .. } if fragment == self.fragment),
            );
            if has_mark {
                self.found = Some(inlines.clone());
                return Descend::Prune;
            }
        }
        Descend::Children
    }
}

/// The section introduced by the heading with the fragment, up to the next heading of the same
/// or a higher level. Otherwise the top-level block holding the mark with the fragment.
fn select_section(blocks: &BlockSlice, fragment: &str) -> Option<BlockSlice> {
    if let Some((start, level)) = heading_position(blocks, fragment) {
        let end = blocks[start + 1..]
            .iter()
            .position(|b| matches!(b, BlockNode::Heading { level: l, .. } if *l <= level))
            .map_or(blocks.len(), |p| start + 1 + p);
        return Some(blocks[start..end].to_vec());
    }
    blocks
        .iter()
        .find(|block| {
            let mut finder = MarkFinder {
                fragment,
                found: None,
            };
            walk_block(&mut finder, block);
            finder.found.is_some()
        })
        .map(|block| vec![block.clone()])
}

/// The first paragraph after the heading with the fragment, or the inlines holding the mark.
fn fragment_inlines(blocks: &BlockSlice, fragment: &str) -> Option<InlineSlice> {
    if let Some((start, _)) = heading_position(blocks, fragment) {
        return blocks[start + 1..].iter().find_map(|block| match block {
            BlockNode::Para(inlines) => Some(inlines.clone()),
            _ => None,
        });
    }
    let mut finder = MarkFinder {
        fragment,
        found: None,
    };
    walk_blocks(&mut finder, blocks);
    finder.found
}

/// The first paragraph, or a leading BLOB as embedded BLOB.
/// An embedded image. Text written at the embed wins over the image's own description.
fn image_embed(
    attrs: &Attributes,
    reference: &Reference,
    syntax: &str,
    description: &InlineSlice,
    inlines: &InlineSlice,
) -> InlineNode {
    InlineNode::Embed {
        attrs: attrs.clone(),
        reference: Reference::new(reference.value.clone(), RefState::Found),
        syntax: syntax.to_string(),
        inlines: if inlines.is_empty() {
            description.clone()
        } else {
            inlines.clone()
        },
    }
}

fn first_inlines(blocks: &BlockSlice, attrs: &Attributes) -> Option<InlineSlice> {
    if let Some(inlines) = blocks.iter().find_map(|block| match block {
        BlockNode::Para(inlines) => Some(inlines.clone()),
        _ => None,
    }) {
        return Some(inlines);
    }
    match blocks.first() {
        Some(BlockNode::Blob {
            description,
            syntax,
            blob,
        }) => Some(vec![InlineNode::EmbedBlob {
            attrs: attrs.clone(),
            syntax: syntax.clone(),
            blob: blob.clone(),
            inlines: description.clone(),
        }]),
        _ => None,
    }
}

/// All paragraph inlines of a block slice, separated by spaces.
fn paragraph_inlines(blocks: &BlockSlice) -> InlineSlice {
    struct Collector(InlineSlice);
    impl Visitor for Collector {
        fn visit(&mut self, node: Node<'_>) -> Descend {
            match node {
                Node::Block(BlockNode::Para(inlines)) => {
                    if !self.0.is_empty() {
                        self.0.push(InlineNode::space());
                    }
                    self.0.extend(inlines.iter().cloned());
                    Descend::Prune
                }
                _ => Descend::Children,
            }
        }
    }
    let mut collector = Collector(InlineSlice::new());
    walk_blocks(&mut collector, blocks);
    collector.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        encoder::{encode_blocks_to_string, EncoderOptions, Encoding},
        meta::keys::{KEY_TAGS, KEY_VISIBILITY},
        tests::helpers::{create_test_zettel, MemPort},
    };
    use pretty_assertions::assert_eq;
    use test_log::test;

    const A: u64 = 20240101000001;
    const B: u64 = 20240101000002;
    const C: u64 = 20240101000003;

    fn zid(n: u64) -> Zid {
        Zid::from_u64(n).unwrap()
    }

    fn evaluate(port: &MemPort, zettel: &Zettel) -> (ParsedZettel, usize) {
        let ctx = Context::background();
        let mut parsed = parse_zettel(zettel, "", None);
        let mut evaluator = Evaluator::new(&ctx, port, None);
        evaluator.evaluate_zettel(&mut parsed);
        (parsed, evaluator.transclude_count())
    }

    fn error_texts(blocks: &BlockSlice) -> Vec<String> {
        struct Errors(Vec<String>);
        impl Visitor for Errors {
            fn visit(&mut self, node: Node<'_>) -> Descend {
                if let Node::Inline(InlineNode::Format { attrs, inlines, .. }) = node {
                    if attrs.get("class") == Some("error") {
                        if let Some(InlineNode::Text(s)) = inlines.first() {
                            self.0.push(s.clone());
                        }
                    }
                }
                Descend::Children
            }
        }
        let mut errors = Errors(Vec::new());
        walk_blocks(&mut errors, blocks);
        errors.0
    }

    #[test]
    fn transclusion_splices_blocks() {
        let a = create_test_zettel(A, "A", "zmk", "before\n\n{{{20240101000002}}}\n\nafter");
        let b = create_test_zettel(B, "B", "zmk", "=== Inner\none\n\ntwo");
        let port = MemPort::new(vec![a.clone(), b]);
        let (parsed, count) = evaluate(&port, &a);
        assert_eq!(count, 1);
        assert_eq!(parsed.ast.len(), 5);
        assert!(matches!(parsed.ast[1], BlockNode::Heading { .. }));
        assert!(error_texts(&parsed.ast).is_empty());
    }

    #[test]
    fn self_transclusion_is_recursive() {
        let a = create_test_zettel(A, "A", "zmk", "{{{20240101000001}}}");
        let port = MemPort::new(vec![a.clone()]);
        let (parsed, count) = evaluate(&port, &a);
        assert_eq!(count, 1);
        let errors = error_texts(&parsed.ast);
        assert_eq!(errors.len(), 1);
        assert!(errors[0].contains("Recursive"), "{errors:?}");
    }

    #[test]
    fn cycle_yields_one_error() {
        let a = create_test_zettel(A, "A", "zmk", "{{{20240101000002}}}");
        let b = create_test_zettel(B, "B", "zmk", "b\n\n{{{20240101000001}}}");
        let port = MemPort::new(vec![a.clone(), b]);
        let (parsed, _) = evaluate(&port, &a);
        let errors = error_texts(&parsed.ast);
        assert_eq!(errors, vec![format!("Recursive transclusion of zettel {}", zid(A))]);
    }

    #[test]
    fn transclusion_budget_bounds_fetches() {
        let content = "{{{20240101000002}}}\n\n".repeat(10);
        let a = create_test_zettel(A, "A", "zmk", &content);
        let b = create_test_zettel(B, "B", "zmk", "{{{20240101000003}}}");
        let c = create_test_zettel(C, "C", "zmk", "leaf");
        let port = MemPort::new(vec![a.clone(), b, c]);
        let ctx = Context::background();
        let mut parsed = parse_zettel(&a, "", None);
        let mut evaluator = Evaluator::new(&ctx, &port, None).with_max_transclusions(3);
        evaluator.evaluate_zettel(&mut parsed);
        assert!(port.fetches() <= 4);
        let errors = error_texts(&parsed.ast);
        assert!(!errors.is_empty());
        assert!(errors.iter().all(|e| e.starts_with("Too many transclusions")));
    }

    #[test]
    fn broken_link_is_marked() {
        let a = create_test_zettel(A, "A", "zmk", "[[00000000000099]] [[20240101000002]]");
        let b = create_test_zettel(B, "B", "zmk", "");
        let port = MemPort::new(vec![a.clone(), b]);
        let (parsed, _) = evaluate(&port, &a);
        let BlockNode::Para(inlines) = &parsed.ast[0] else {
            panic!("expected paragraph");
        };
        let states: Vec<RefState> = inlines
            .iter()
            .filter_map(|i| match i {
                InlineNode::Link { reference, .. } => Some(reference.state),
                _ => None,
            })
            .collect();
        assert_eq!(states, vec![RefState::Broken, RefState::Zettel]);
        let html =
            encode_blocks_to_string(Encoding::Html, &EncoderOptions::default(), &parsed.ast)
                .unwrap();
        assert!(html.contains("class=\"broken\""), "{html}");
        assert!(html.contains("title=\"Zettel not found\""), "{html}");
    }

    #[test]
    fn denied_zettel_are_omitted() {
        let a = create_test_zettel(
            A,
            "A",
            "zmk",
            "{{{20240101000002}}}\n\n[[secret|20240101000002]]",
        );
        let mut b = create_test_zettel(B, "B", "zmk", "hidden");
        b.meta.set(KEY_VISIBILITY, "owner");
        let port = PolicyPort::new(MemPort::new(vec![a.clone(), b]), |meta: &Meta| {
            meta.get(KEY_VISIBILITY) != Some("owner")
        });
        let ctx = Context::background();
        let mut parsed = parse_zettel(&a, "", None);
        evaluate_zettel(&ctx, &port, None, &mut parsed);
        assert_eq!(parsed.ast.len(), 1);
        let BlockNode::Para(inlines) = &parsed.ast[0] else {
            panic!("expected paragraph");
        };
        assert!(matches!(
            &inlines[0],
            InlineNode::Format { kind: FormatKind::Span, inlines, .. }
                if inlines == &vec![InlineNode::text("secret")]
        ));
    }

    #[test]
    fn fragment_transclusion_takes_section() {
        let a = create_test_zettel(A, "A", "zmk", "{{{20240101000002#two}}}");
        let b = create_test_zettel(
            B,
            "B",
            "zmk",
            "=== One\nfirst\n=== Two\nsecond\n==== Sub\nthird\n=== Three\nfourth",
        );
        let port = MemPort::new(vec![a.clone(), b]);
        let (parsed, _) = evaluate(&port, &a);
        let text = crate::encoder::text::blocks_to_text(&parsed.ast);
        assert_eq!(text, "Two\nsecond\nSub\nthird");
    }

    #[test]
    fn embed_takes_first_paragraph() {
        let a = create_test_zettel(A, "A", "zmk", "x {{20240101000002}} y");
        let b = create_test_zettel(B, "B", "zmk", "=== Head\nbody **text**");
        let port = MemPort::new(vec![a.clone(), b]);
        let (parsed, _) = evaluate(&port, &a);
        let text = crate::encoder::text::blocks_to_text(&parsed.ast);
        assert_eq!(text, "x body text y");
    }

    #[test]
    fn image_embed_carries_syntax() {
        let a = create_test_zettel(A, "A", "zmk", "{{20240101000002}}");
        let mut b = create_test_zettel(B, "Picture", "png", "");
        b.content = crate::zettel::Content::new(vec![0x89, b'P', b'N', b'G']);
        let port = MemPort::new(vec![a.clone(), b]);
        let (parsed, _) = evaluate(&port, &a);
        let BlockNode::Para(inlines) = &parsed.ast[0] else {
            panic!("expected paragraph");
        };
        assert!(matches!(
            &inlines[0],
            InlineNode::Embed { syntax, inlines, reference, .. }
                if syntax == "png"
                    && inlines == &vec![InlineNode::text("Picture")]
                    && reference.state == RefState::Found
        ));
    }

    #[test]
    fn repeated_image_embeds_keep_their_own_text() {
        let a = create_test_zettel(
            A,
            "A",
            "zmk",
            "{{20240101000002}} {{Other text|20240101000002}}",
        );
        let mut b = create_test_zettel(B, "Picture", "png", "");
        b.content = crate::zettel::Content::new(vec![0x89, b'P', b'N', b'G']);
        let port = MemPort::new(vec![a.clone(), b]);
        let (parsed, _) = evaluate(&port, &a);
        let BlockNode::Para(inlines) = &parsed.ast[0] else {
            panic!("expected paragraph");
        };
        let descriptions: Vec<&InlineSlice> = inlines
            .iter()
            .filter_map(|i| match i {
                InlineNode::Embed { inlines, .. } => Some(inlines),
                _ => None,
            })
            .collect();
        assert_eq!(
            descriptions,
            vec![
                &vec![InlineNode::text("Picture")],
                &vec![
                    InlineNode::text("Other"),
                    InlineNode::space(),
                    InlineNode::text("text")
                ],
            ]
        );
        assert_eq!(port.fetches(), 1);
    }

    #[test]
    fn query_transclusion_renders_tag_cloud() {
        let q = create_test_zettel(A, "Q", "zmk", "{{{query:| tags}}}");
        let mut one = create_test_zettel(B, "One", "zmk", "");
        one.meta.set(KEY_TAGS, "#a");
        let mut two = create_test_zettel(C, "Two", "zmk", "");
        two.meta.set(KEY_TAGS, "#a #b");
        let port = MemPort::new(vec![q.clone(), one, two]);
        let (parsed, _) = evaluate(&port, &q);
        let text = crate::encoder::text::blocks_to_text(&parsed.ast);
        assert_eq!(text, "#a2 #b1");
    }

    #[test]
    fn reindex_action_reaches_port() {
        let q = create_test_zettel(A, "Q", "zmk", "{{{query:title:one | REINDEX}}}");
        let one = create_test_zettel(B, "One", "zmk", "");
        let port = MemPort::new(vec![q.clone(), one]);
        evaluate(&port, &q);
        assert_eq!(port.reindexed(), vec![zid(B)]);
    }

    #[test]
    fn syntax_none_shows_metadata() {
        let a = create_test_zettel(A, "A", "none", "ignored");
        let port = MemPort::new(vec![]);
        let (parsed, _) = evaluate(&port, &a);
        let BlockNode::Description(descrs) = &parsed.ast[0] else {
            panic!("expected description list");
        };
        assert_eq!(descrs[0].term, vec![InlineNode::text("id")]);
        assert!(descrs.iter().any(|d| d.term == vec![InlineNode::text("title")]));
    }

    #[test]
    fn syntax_sxn_is_pretty_printed() {
        let a = create_test_zettel(A, "A", "sxn", "(a b) (c)");
        let port = MemPort::new(vec![]);
        let (parsed, _) = evaluate(&port, &a);
        assert_eq!(parsed.ast.len(), 2);
        assert!(matches!(
            &parsed.ast[1],
            BlockNode::Verbatim { content, .. } if content == "(c)"
        ));
    }
}

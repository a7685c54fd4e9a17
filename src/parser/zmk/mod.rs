//! Zettelmarkup, the native markup of zettel.
//!
//! A recursive descent parser over an [`Input`] stream. Block constructs are recognised by the
//! first characters of a line; everything else is a paragraph of inline elements. Malformed
//! constructs never fail, they fall back to literal text.
use std::collections::{HashMap, HashSet};

use crate::{
    ast::{
        Alignment, Attributes, BlockNode, BlockSlice, Description, InlineNode, InlineSlice,
        ListKind, Reference, RegionKind, Table, TableCell, VerbatimKind,
    },
    input::{is_eol, is_space, Input},
    meta::Meta,
    parser::SyntaxParser,
};

mod attr;
mod inline;

pub(crate) use attr::parse_attributes;

/// Maximum nesting of inline and region structures. Deeper structures become plain text.
pub const MAX_NESTING: usize = 50;

pub struct Zettelmarkup;

impl SyntaxParser for Zettelmarkup {
    fn parse_blocks(&self, input: &[u8], _meta: &Meta, _syntax: &str) -> BlockSlice {
        parse_blocks(&String::from_utf8_lossy(input))
    }

    fn parse_inlines(&self, input: &[u8], _syntax: &str) -> InlineSlice {
        parse_inlines(&String::from_utf8_lossy(input))
    }
}

/// Parses zettelmarkup into blocks. Cleanup is not applied.
pub fn parse_blocks(src: &str) -> BlockSlice {
    let mut p = ZmkParser::new(src, 0);
    p.parse_block_slice(None).0
}

/// Parses zettelmarkup inline text, for example metadata titles. Line endings become soft breaks.
pub fn parse_inlines(src: &str) -> InlineSlice {
    let mut p = ZmkParser::new(src, 0);
    let (mut inlines, _) = p.parse_inline_seq(LineMode::Free);
    inline::trim_trailing_space(&mut inlines);
    inlines
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) enum Closer {
    Pair(char),
    Bracket,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum LineMode {
    /// Stop at the end of the line.
    Single,
    /// Continue on the next line as long as the paragraph goes on.
    Para,
    /// Continue until the end of input.
    Free,
}

pub(crate) struct ZmkParser {
    pub(crate) inp: Input,
    pub(crate) depth: usize,
    pub(crate) closers: Vec<Closer>,
    /// Start positions where a bracketed or paired construct already failed.
    pub(crate) failed: HashSet<(usize, Closer)>,
    /// An enclosed parse ran into the end of its line or input without meeting any pending
    /// closer, so every enclosing attempt fails the same way.
    pub(crate) exhausted: bool,
    /// Per closer, a span known to hold no reachable closing delimiter.
    pub(crate) barren: HashMap<Closer, (usize, usize)>,
    /// Inline constructs recognised so far.
    pub(crate) constructs: usize,
    /// Set while parsing a heading line: trailing attributes end the line.
    pub(crate) heading_attrs: Option<Option<Attributes>>,
    /// Closing fence of the region being parsed, ends paragraphs.
    region_fence: Option<(char, usize)>,
}

struct ListFrame {
    kind: ListKind,
    items: Vec<BlockSlice>,
}

#[derive(Default)]
struct BlockState {
    out: BlockSlice,
    lists: Vec<ListFrame>,
    descr: Option<Vec<Description>>,
    table: Option<Vec<Vec<String>>>,
}

impl BlockState {
    fn pop_lists_to(&mut self, depth: usize) {
        while self.lists.len() > depth {
            let Some(frame) = self.lists.pop() else {
                break;
            };
            let node = BlockNode::List {
                kind: frame.kind,
                items: frame.items,
            };
            match self.lists.last_mut() {
                Some(parent) => {
                    if parent.items.is_empty() {
                        parent.items.push(BlockSlice::new());
                    }
                    if let Some(item) = parent.items.last_mut() {
                        item.push(node);
                    }
                }
                None => self.out.push(node),
            }
        }
    }

    fn close_lists(&mut self) {
        self.pop_lists_to(0);
    }

    fn close_descr(&mut self) {
        if let Some(descrs) = self.descr.take() {
            self.out.push(BlockNode::Description(descrs));
        }
    }

    fn close_table(&mut self, depth: usize) {
        if let Some(rows) = self.table.take() {
            if !rows.is_empty() {
                self.out.push(BlockNode::Table(build_table(rows, depth)));
            }
        }
    }

    fn flush(&mut self, depth: usize) {
        self.close_lists();
        self.close_descr();
        self.close_table(depth);
    }

    fn push(&mut self, node: BlockNode, depth: usize) {
        self.flush(depth);
        self.out.push(node);
    }
}

impl ZmkParser {
    pub(crate) fn new(src: &str, depth: usize) -> ZmkParser {
        ZmkParser {
            inp: Input::new(src),
            depth,
            closers: Vec::new(),
            failed: HashSet::new(),
            exhausted: false,
            barren: HashMap::new(),
            constructs: 0,
            heading_attrs: None,
            region_fence: None,
        }
    }

    /// Parses blocks until end of input or, inside a region, until its closing fence.
    /// Returns the blocks and the citation found on the closing line.
    fn parse_block_slice(&mut self, fence: Option<(char, usize)>) -> (BlockSlice, Option<InlineSlice>) {
        let outer_fence = self.region_fence;
        self.region_fence = fence;
        let mut st = BlockState::default();
        let mut citation = None;
        while !self.inp.at_eos() {
            if let Some((c, n)) = fence {
                if self.inp.ch() == c && self.inp.count_run(c) >= n {
                    self.inp.pos += self.inp.count_run(c);
                    self.inp.skip_space();
                    let (mut cite, _) = self.parse_inline_seq(LineMode::Single);
                    inline::trim_trailing_space(&mut cite);
                    self.inp.skip_to_eol();
                    self.inp.eat_eol();
                    citation = Some(cite);
                    break;
                }
            }
            self.parse_line(&mut st);
        }
        st.flush(self.depth);
        self.region_fence = outer_fence;
        (st.out, citation)
    }

    fn parse_line(&mut self, st: &mut BlockState) {
        if self.inp.rest_is_blank() {
            self.inp.skip_to_eol();
            self.inp.eat_eol();
            st.flush(self.depth);
            return;
        }
        let start = self.inp.pos;
        let ch = self.inp.ch();
        if is_space(ch) {
            let n = self.inp.skip_space();
            if !st.lists.is_empty() && n >= 2 {
                self.list_continuation(st, n);
                return;
            }
            if st.lists.is_empty() && n >= 2 && self.descr_continuation(st) {
                return;
            }
            st.flush(self.depth);
            self.parse_para(st);
            return;
        }
        if self.try_list_item(st) {
            return;
        }
        st.close_lists();
        if self.try_description(st) {
            return;
        }
        st.close_descr();
        if ch == '|' {
            self.table_row(st);
            return;
        }
        st.close_table(self.depth);
        let node = match ch {
            '=' => self.heading(),
            '-' => self.hrule(),
            ':' => self.region(RegionKind::Span),
            '<' => self.region(RegionKind::Quote),
            '"' => self.region(RegionKind::Verse),
            '`' | '~' | '$' | '%' | '@' => self.verbatim(ch),
            '{' => self.transclude(),
            _ => None,
        };
        match node {
            Some(node) => st.push(node, self.depth),
            None => {
                self.inp.pos = start;
                self.parse_para(st);
            }
        }
    }

    fn parse_para(&mut self, st: &mut BlockState) {
        self.inp.skip_space();
        let (mut inlines, _) = self.parse_inline_seq(LineMode::Para);
        inline::trim_trailing_space(&mut inlines);
        self.inp.skip_to_eol();
        self.inp.eat_eol();
        if !inlines.is_empty() {
            st.out.push(BlockNode::Para(inlines));
        }
    }

    /// Whether the current line, at its first column, starts a block other than a paragraph.
    pub(crate) fn line_starts_block(&self) -> bool {
        let inp = &self.inp;
        let ch = inp.ch();
        let run = inp.count_run(ch);
        match ch {
            '=' => run >= 3 && is_space(inp.peek_n(run)),
            '-' => run >= 3,
            '*' | '#' | '>' => {
                let mut n = 0;
                while ListKind::from_char(inp.peek_n(n)).is_some() {
                    n += 1;
                }
                is_space(inp.peek_n(n))
            }
            ';' => is_space(inp.peek()),
            ':' | '<' | '"' | '`' | '~' | '$' | '%' | '@' => run >= 3,
            '|' => true,
            '{' => run >= 3,
            _ => false,
        }
    }

    fn try_list_item(&mut self, st: &mut BlockState) -> bool {
        let mut kinds = Vec::new();
        while let Some(kind) = ListKind::from_char(self.inp.peek_n(kinds.len())) {
            kinds.push(kind);
        }
        if kinds.is_empty() || !is_space(self.inp.peek_n(kinds.len())) {
            return false;
        }
        self.inp.pos += kinds.len();
        self.inp.skip_space();
        st.close_descr();
        st.close_table(self.depth);

        let n = kinds.len();
        let mut keep = st.lists.len().min(n);
        for (i, frame) in st.lists.iter().enumerate().take(keep) {
            if frame.kind != kinds[i] {
                keep = i;
                break;
            }
        }
        st.pop_lists_to(keep);
        while st.lists.len() < n {
            let kind = kinds[st.lists.len()];
            st.lists.push(ListFrame {
                kind,
                items: Vec::new(),
            });
        }

        let (mut inlines, _) = self.parse_inline_seq(LineMode::Single);
        inline::trim_trailing_space(&mut inlines);
        self.inp.skip_to_eol();
        self.inp.eat_eol();
        let item = if inlines.is_empty() {
            BlockSlice::new()
        } else {
            vec![BlockNode::Para(inlines)]
        };
        if let Some(frame) = st.lists.last_mut() {
            frame.items.push(item);
        }
        true
    }

    fn list_continuation(&mut self, st: &mut BlockState, spaces: usize) {
        let level = (spaces - 1).min(st.lists.len()).max(1);
        st.pop_lists_to(level);
        let (mut inlines, _) = self.parse_inline_seq(LineMode::Single);
        inline::trim_trailing_space(&mut inlines);
        self.inp.skip_to_eol();
        self.inp.eat_eol();
        let Some(frame) = st.lists.last_mut() else {
            return;
        };
        if frame.items.is_empty() {
            frame.items.push(BlockSlice::new());
        }
        if let Some(item) = frame.items.last_mut() {
            append_continuation(item, inlines);
        }
    }

    fn descr_continuation(&mut self, st: &mut BlockState) -> bool {
        let has_target = st
            .descr
            .as_ref()
            .and_then(|d| d.last())
            .map(|d| !d.descriptions.is_empty())
            .unwrap_or(false);
        if !has_target {
            return false;
        }
        let (mut inlines, _) = self.parse_inline_seq(LineMode::Single);
        inline::trim_trailing_space(&mut inlines);
        self.inp.skip_to_eol();
        self.inp.eat_eol();
        if let Some(blocks) = st
            .descr
            .as_mut()
            .and_then(|d| d.last_mut())
            .and_then(|d| d.descriptions.last_mut())
        {
            append_continuation(blocks, inlines);
        }
        true
    }

    fn try_description(&mut self, st: &mut BlockState) -> bool {
        let ch = self.inp.ch();
        if !is_space(self.inp.peek()) {
            return false;
        }
        match ch {
            ';' => {
                self.inp.next();
                self.inp.skip_space();
                st.close_table(self.depth);
                let (mut term, _) = self.parse_inline_seq(LineMode::Single);
                inline::trim_trailing_space(&mut term);
                self.inp.skip_to_eol();
                self.inp.eat_eol();
                st.descr.get_or_insert_with(Vec::new).push(Description {
                    term,
                    descriptions: Vec::new(),
                });
                true
            }
            ':' => {
                let Some(last) = st.descr.as_mut().and_then(|d| d.last_mut()) else {
                    return false;
                };
                self.inp.next();
                self.inp.skip_space();
                let (mut inlines, _) = self.parse_inline_seq(LineMode::Single);
                inline::trim_trailing_space(&mut inlines);
                self.inp.skip_to_eol();
                self.inp.eat_eol();
                let blocks = if inlines.is_empty() {
                    BlockSlice::new()
                } else {
                    vec![BlockNode::Para(inlines)]
                };
                last.descriptions.push(blocks);
                true
            }
            _ => false,
        }
    }

    fn heading(&mut self) -> Option<BlockNode> {
        let run = self.inp.count_run('=');
        if run < 3 || !is_space(self.inp.peek_n(run)) {
            return None;
        }
        self.inp.pos += run;
        self.inp.skip_space();
        self.heading_attrs = Some(None);
        let (mut inlines, _) = self.parse_inline_seq(LineMode::Single);
        let attrs = self.heading_attrs.take().flatten().unwrap_or_default();
        inline::trim_trailing_space(&mut inlines);
        self.inp.skip_to_eol();
        self.inp.eat_eol();
        Some(BlockNode::Heading {
            level: (run - 2).min(5) as u8,
            attrs,
            slug: String::new(),
            fragment: String::new(),
            inlines,
        })
    }

    fn hrule(&mut self) -> Option<BlockNode> {
        let run = self.inp.count_run('-');
        if run < 3 {
            return None;
        }
        self.inp.pos += run;
        self.inp.skip_space();
        let attrs = parse_attributes(&mut self.inp, false).unwrap_or_default();
        if !self.inp.rest_is_blank() {
            return None;
        }
        self.inp.skip_to_eol();
        self.inp.eat_eol();
        Some(BlockNode::HRule { attrs })
    }

    /// Attributes of a fence opening line: `{...}` or one bare word. The rest must be blank.
    fn fence_attributes(&mut self) -> Option<Attributes> {
        self.inp.skip_space();
        let attrs = if self.inp.ch() == '{' {
            parse_attributes(&mut self.inp, true)?
        } else {
            let mut word = String::new();
            while !is_eol(self.inp.ch()) && !is_space(self.inp.ch()) {
                word.push(self.inp.ch());
                self.inp.next();
            }
            let mut attrs = Attributes::new();
            if !word.is_empty() {
                attrs.set("", word);
            }
            attrs
        };
        if !self.inp.rest_is_blank() {
            return None;
        }
        self.inp.skip_to_eol();
        self.inp.eat_eol();
        Some(attrs)
    }

    fn region(&mut self, kind: RegionKind) -> Option<BlockNode> {
        let c = kind.fence_char();
        let run = self.inp.count_run(c);
        if run < 3 || self.depth >= MAX_NESTING {
            return None;
        }
        self.inp.pos += run;
        let attrs = self.fence_attributes()?;
        self.depth += 1;
        let (mut blocks, citation) = self.parse_block_slice(Some((c, run)));
        self.depth -= 1;
        if kind == RegionKind::Verse {
            soft_to_hard(&mut blocks);
        }
        Some(BlockNode::Region {
            kind,
            attrs,
            blocks,
            inlines: citation.unwrap_or_default(),
        })
    }

    fn verbatim(&mut self, c: char) -> Option<BlockNode> {
        let run = self.inp.count_run(c);
        if run < 3 {
            return None;
        }
        self.inp.pos += run;
        let mut attrs = self.fence_attributes()?;
        let mut lines: Vec<String> = Vec::new();
        while !self.inp.at_eos() {
            let n = self.inp.count_run(c);
            if n >= run {
                let save = self.inp.pos;
                self.inp.pos += n;
                if self.inp.rest_is_blank() {
                    self.inp.skip_to_eol();
                    self.inp.eat_eol();
                    break;
                }
                self.inp.pos = save;
            }
            lines.push(self.inp.line_rest());
            self.inp.skip_to_eol();
            self.inp.eat_eol();
        }
        let mut kind = match c {
            '`' => VerbatimKind::Program,
            '~' => VerbatimKind::Eval,
            '$' => VerbatimKind::Math,
            '%' => VerbatimKind::Comment,
            _ => VerbatimKind::Zettel,
        };
        if kind == VerbatimKind::Zettel && attrs.has_default_syntax("html") {
            kind = VerbatimKind::Html;
            attrs.remove("");
        }
        Some(BlockNode::Verbatim {
            kind,
            attrs,
            content: lines.join("\n"),
        })
    }

    fn transclude(&mut self) -> Option<BlockNode> {
        if self.inp.count_run('{') != 3 {
            return None;
        }
        self.inp.pos += 3;
        let start = self.inp.pos;
        loop {
            let ch = self.inp.ch();
            if is_eol(ch) {
                return None;
            }
            if ch == '}' && self.inp.count_run('}') >= 3 {
                break;
            }
            self.inp.next();
        }
        let raw = self.inp.slice(start, self.inp.pos);
        let value = raw.trim();
        if value.is_empty()
            || (!value.starts_with(crate::ast::reference::QUERY_PREFIX)
                && value.contains(char::is_whitespace))
        {
            return None;
        }
        self.inp.pos += 3;
        let attrs = parse_attributes(&mut self.inp, false).unwrap_or_default();
        if !self.inp.rest_is_blank() {
            return None;
        }
        self.inp.skip_to_eol();
        self.inp.eat_eol();
        Some(BlockNode::Transclude {
            attrs,
            reference: Reference::parse(value),
        })
    }

    fn table_row(&mut self, st: &mut BlockState) {
        if self.inp.peek() == '%' {
            self.inp.skip_to_eol();
            self.inp.eat_eol();
            if st.table.is_none() {
                st.table = Some(Vec::new());
            }
            return;
        }
        let mut cells = Vec::new();
        self.inp.next();
        loop {
            if self.inp.rest_is_blank() {
                break;
            }
            let start = self.inp.pos;
            let mut depth = 0usize;
            loop {
                let ch = self.inp.ch();
                if is_eol(ch) {
                    break;
                }
                if ch == '\\' {
                    self.inp.next();
                    if !is_eol(self.inp.ch()) {
                        self.inp.next();
                    }
                    continue;
                }
                if (ch == '[' || ch == '{') && self.inp.peek() == ch {
                    depth += 1;
                    self.inp.pos += 2;
                    continue;
                }
                if (ch == ']' || ch == '}') && self.inp.peek() == ch && depth > 0 {
                    depth -= 1;
                    self.inp.pos += 2;
                    continue;
                }
                if ch == '|' && depth == 0 {
                    break;
                }
                self.inp.next();
            }
            cells.push(self.inp.slice(start, self.inp.pos));
            if self.inp.ch() == '|' {
                self.inp.next();
            } else {
                break;
            }
        }
        self.inp.skip_to_eol();
        self.inp.eat_eol();
        let rows = st.table.get_or_insert_with(Vec::new);
        if !cells.is_empty() {
            rows.push(cells);
        }
    }

    /// Inline content of a substring, parsed with a fresh parser one level deeper.
    pub(crate) fn child_inlines(&self, src: &str) -> InlineSlice {
        let mut child = ZmkParser::new(src, self.depth + 1);
        let (mut inlines, _) = child.parse_inline_seq(LineMode::Single);
        while matches!(inlines.first(), Some(InlineNode::Space(_))) {
            inlines.remove(0);
        }
        inline::trim_trailing_space(&mut inlines);
        inlines
    }
}

fn append_continuation(item: &mut BlockSlice, inlines: InlineSlice) {
    if inlines.is_empty() {
        return;
    }
    if let Some(BlockNode::Para(para)) = item.last_mut() {
        if !matches!(para.last(), Some(InlineNode::Hard)) {
            para.push(InlineNode::Soft);
        }
        para.extend(inlines);
        return;
    }
    item.push(BlockNode::Para(inlines));
}

fn soft_to_hard(blocks: &mut BlockSlice) {
    use crate::ast::walk::{walk_blocks_mut, Descend, VisitorMut};
    struct Verse;
    impl VisitorMut for Verse {
        fn visit_inline(&mut self, inline: &mut InlineNode) -> Descend {
            if matches!(inline, InlineNode::Soft) {
                *inline = InlineNode::Hard;
            }
            Descend::Children
        }
    }
    walk_blocks_mut(&mut Verse, blocks);
}

fn build_table(rows: Vec<Vec<String>>, depth: usize) -> Table {
    let parser = ZmkParser::new("", depth);
    let mut rows = rows.into_iter().peekable();
    let is_header = rows
        .peek()
        .map(|r| r.iter().all(|c| c.trim().starts_with('=')))
        .unwrap_or(false);

    let mut header = Vec::new();
    if is_header {
        for raw in rows.next().unwrap_or_default() {
            let s = raw.trim();
            let s = s.strip_prefix('=').unwrap_or(s);
            let (s, align) = split_header_align(s);
            header.push(TableCell {
                align,
                inlines: parser.child_inlines(s.trim()),
            });
        }
    }
    let raw_rows: Vec<Vec<String>> = rows.collect();
    let width = raw_rows
        .iter()
        .map(Vec::len)
        .chain(std::iter::once(header.len()))
        .max()
        .unwrap_or(0);
    let mut align: Vec<Alignment> = header.iter().map(|c| c.align).collect();
    align.resize(width, Alignment::Default);
    while header.len() < width && !header.is_empty() {
        header.push(TableCell {
            align: align[header.len()],
            inlines: InlineSlice::new(),
        });
    }

    let data = raw_rows
        .into_iter()
        .map(|raw_row| {
            let mut row: Vec<TableCell> = raw_row
                .iter()
                .enumerate()
                .map(|(col, raw)| {
                    let s = raw.trim();
                    let mut chars = s.chars();
                    let first = chars.next();
                    let second = chars.next();
                    match first.and_then(Alignment::from_char) {
                        Some(a) if second != first => TableCell {
                            align: a,
                            inlines: parser.child_inlines(s[1..].trim()),
                        },
                        _ => TableCell {
                            align: align[col],
                            inlines: parser.child_inlines(s),
                        },
                    }
                })
                .collect();
            while row.len() < width {
                row.push(TableCell {
                    align: align[row.len()],
                    inlines: InlineSlice::new(),
                });
            }
            row
        })
        .collect();
    Table {
        header,
        rows: data,
        align,
    }
}

fn split_header_align(s: &str) -> (&str, Alignment) {
    let trimmed = s.trim_end();
    if let Some(last) = trimmed.chars().last() {
        if let Some(a) = Alignment::from_char(last) {
            let body = &trimmed[..trimmed.len() - 1];
            if !body.ends_with('\\') {
                return (body, a);
            }
        }
    }
    (s, Alignment::Default)
}

#[cfg(test)]
mod tests;

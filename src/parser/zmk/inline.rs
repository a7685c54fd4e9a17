use super::{parse_attributes, Closer, LineMode, ZmkParser, MAX_NESTING};
use crate::{
    ast::{
        reference::QUERY_PREFIX, Attributes, FormatKind, InlineNode, InlineSlice, LiteralKind,
        Reference,
    },
    input::{is_eol, is_space_or_eol},
};

use super::attr::is_name_char;

pub(crate) enum End {
    Eol,
    Eos,
    Closer(usize),
}

pub(crate) fn trim_trailing_space(inlines: &mut InlineSlice) {
    while matches!(inlines.last(), Some(InlineNode::Space(_))) {
        inlines.pop();
    }
}

fn push_text(out: &mut InlineSlice, s: &str) {
    if let Some(InlineNode::Text(text)) = out.last_mut() {
        text.push_str(s);
    } else {
        out.push(InlineNode::Text(s.to_string()));
    }
}

fn push_char(out: &mut InlineSlice, ch: char) {
    if let Some(InlineNode::Text(text)) = out.last_mut() {
        text.push(ch);
    } else {
        out.push(InlineNode::Text(ch.to_string()));
    }
}

impl ZmkParser {
    fn nesting(&self) -> usize {
        self.depth + self.closers.len()
    }

    /// Index of the innermost pending closer found at the current position.
    fn closer_at(&self) -> Option<usize> {
        let ch = self.inp.ch();
        self.closers.iter().rposition(|closer| match closer {
            Closer::Pair(c) => ch == *c && self.inp.peek() == *c,
            Closer::Bracket => ch == ']',
        })
    }

    pub(crate) fn parse_inline_seq(&mut self, mode: LineMode) -> (InlineSlice, End) {
        let mut out = InlineSlice::new();
        loop {
            if self.exhausted {
                if !self.closers.is_empty() {
                    return (out, End::Eos);
                }
                self.exhausted = false;
            }
            if let Some(idx) = self.closer_at() {
                return (out, End::Closer(idx));
            }
            if self.inp.at_eos() {
                return (out, End::Eos);
            }
            let ch = self.inp.ch();
            match ch {
                '\n' => {
                    if !self.line_end(&mut out, mode, false) {
                        return (out, End::Eol);
                    }
                }
                ' ' | '\t' => {
                    let start = self.inp.pos;
                    self.inp.skip_space();
                    out.push(InlineNode::Space(self.inp.slice(start, self.inp.pos)));
                }
                '\\' => {
                    let next = self.inp.peek();
                    if next == '\n' {
                        self.inp.next();
                        if !self.line_end(&mut out, mode, true) {
                            return (out, End::Eol);
                        }
                    } else if self.inp.pos + 1 >= self.inp.len() {
                        push_char(&mut out, '\\');
                        self.inp.next();
                    } else {
                        push_char(&mut out, if next == ' ' { '\u{A0}' } else { next });
                        self.inp.pos += 2;
                    }
                }
                '&' => match self.inp.scan_entity() {
                    Some(s) => push_text(&mut out, &s),
                    None => {
                        push_char(&mut out, '&');
                        self.inp.next();
                    }
                },
                '[' => {
                    let node = match self.inp.peek() {
                        '[' => self.try_link('[', ']').map(|(inlines, reference, attrs)| {
                            InlineNode::Link {
                                attrs,
                                reference,
                                inlines,
                            }
                        }),
                        '@' => self.try_cite(mode),
                        '^' => self.try_footnote(mode),
                        '!' => self.try_mark(mode),
                        _ => None,
                    };
                    self.push_or_text(&mut out, node, ch);
                }
                '{' => {
                    if self.inp.peek() == '{' {
                        let node = self.try_link('{', '}').map(|(inlines, reference, attrs)| {
                            InlineNode::Embed {
                                attrs,
                                reference,
                                syntax: String::new(),
                                inlines,
                            }
                        });
                        self.push_or_text(&mut out, node, ch);
                    } else if self.heading_attrs.is_some() && self.closers.is_empty() {
                        let start = self.inp.pos;
                        match parse_attributes(&mut self.inp, false) {
                            Some(attrs) if self.inp.rest_is_blank() => {
                                self.heading_attrs = Some(Some(attrs));
                                return (out, End::Eol);
                            }
                            _ => {
                                self.inp.pos = start;
                                push_char(&mut out, ch);
                                self.inp.next();
                            }
                        }
                    } else {
                        push_char(&mut out, ch);
                        self.inp.next();
                    }
                }
                '%' if self.inp.peek() == '%' => {
                    let node = self.comment();
                    self.constructs += 1;
                    out.push(node);
                }
                '`' | '\'' | '=' | '@' | '$' if self.inp.peek() == ch => {
                    let node = self.try_literal(ch);
                    self.push_or_text(&mut out, node, ch);
                }
                '_' | '*' | '>' | '~' | '^' | ',' | '"' | '#' | ':' if self.inp.peek() == ch => {
                    let node = self.try_format(ch, mode);
                    self.push_or_text(&mut out, node, ch);
                }
                _ => {
                    push_char(&mut out, ch);
                    self.inp.next();
                }
            }
        }
    }

    fn push_or_text(&mut self, out: &mut InlineSlice, node: Option<InlineNode>, ch: char) {
        match node {
            Some(node) => {
                self.constructs += 1;
                out.push(node);
            }
            None => {
                push_char(out, ch);
                self.inp.next();
            }
        }
    }

    /// Handles a line ending at the current position. Returns whether parsing goes on.
    fn line_end(&mut self, out: &mut InlineSlice, mode: LineMode, hard: bool) -> bool {
        let mut trailing = 0;
        while let Some(InlineNode::Space(lexeme)) = out.last() {
            trailing += lexeme.chars().count();
            out.pop();
        }
        if hard {
            out.push(InlineNode::Hard);
        }
        let goes_on = match mode {
            LineMode::Single => false,
            LineMode::Free => self.inp.pos + 1 < self.inp.len(),
            LineMode::Para => self.para_continues(),
        };
        if !goes_on {
            return false;
        }
        if !hard {
            out.push(if trailing >= 2 {
                InlineNode::Hard
            } else {
                InlineNode::Soft
            });
        }
        self.inp.next();
        self.inp.skip_space();
        true
    }

    /// At a line ending inside a paragraph: does the next line continue it?
    fn para_continues(&mut self) -> bool {
        let save = self.inp.pos;
        self.inp.pos += 1;
        let result = !self.inp.at_eos() && !self.inp.rest_is_blank() && !self.line_starts_block();
        self.inp.pos = save;
        result
    }

    fn trailing_attrs(&mut self) -> Attributes {
        if self.inp.ch() == '{' && self.inp.peek() != '{' {
            parse_attributes(&mut self.inp, false).unwrap_or_default()
        } else {
            Attributes::new()
        }
    }

    /// Parses up to the given closer, which must be found. The closer itself is not consumed.
    fn parse_enclosed(&mut self, closer: Closer, mode: LineMode) -> Option<InlineSlice> {
        let content_start = self.inp.pos;
        let constructs = self.constructs;
        self.closers.push(closer);
        let mine = self.closers.len() - 1;
        let (inlines, end) = self.parse_inline_seq(mode);
        let result = match end {
            End::Closer(idx) if idx == mine => Some(inlines),
            End::Closer(_) => None,
            End::Eol | End::Eos => {
                // Only a scan over plain text proves the span holds no closer.
                if !self.exhausted && self.constructs == constructs {
                    let span = (content_start, self.inp.pos);
                    for pending in &self.closers {
                        self.barren.insert(*pending, span);
                    }
                }
                self.exhausted = true;
                None
            }
        };
        self.closers.pop();
        result
    }

    /// Runs `parse` for a construct starting at the current position, remembering failures so
    /// a start position is never entered twice for the same closer.
    fn attempt<T>(
        &mut self,
        closer: Closer,
        parse: impl FnOnce(&mut Self) -> Option<T>,
    ) -> Option<T> {
        let start = self.inp.pos;
        let key = (start, closer);
        if self.nesting() >= MAX_NESTING || self.failed.contains(&key) {
            return None;
        }
        if let Some(&(from, to)) = self.barren.get(&closer) {
            if from <= start && start < to {
                self.failed.insert(key);
                return None;
            }
        }
        let result = parse(self);
        if result.is_none() {
            self.failed.insert(key);
            self.inp.pos = start;
        }
        result
    }

    fn try_format(&mut self, c: char, mode: LineMode) -> Option<InlineNode> {
        let kind = FormatKind::from_delimiter(c)?;
        let closer = Closer::Pair(c);
        self.attempt(closer, |p| {
            p.inp.pos += 2;
            let inlines = p.parse_enclosed(closer, mode)?;
            p.inp.pos += 2;
            let attrs = p.trailing_attrs();
            Some(InlineNode::Format {
                kind,
                attrs,
                inlines,
            })
        })
    }

    fn try_literal(&mut self, c: char) -> Option<InlineNode> {
        let kind = match c {
            '`' => LiteralKind::Program,
            '\'' => LiteralKind::Input,
            '=' => LiteralKind::Output,
            '@' => LiteralKind::Zettel,
            '$' => LiteralKind::Math,
            _ => return None,
        };
        let start = self.inp.pos;
        self.inp.pos += 2;
        let mut content = String::new();
        loop {
            let ch = self.inp.ch();
            if is_eol(ch) {
                self.inp.pos = start;
                return None;
            }
            let next = self.inp.peek();
            if ch == '\\' && (next == c || next == '\\') {
                content.push(next);
                self.inp.pos += 2;
                continue;
            }
            if ch == c && next == c {
                self.inp.pos += 2;
                break;
            }
            content.push(ch);
            self.inp.next();
        }
        let mut attrs = self.trailing_attrs();
        let kind = if kind == LiteralKind::Zettel && attrs.has_default_syntax("html") {
            attrs.remove("");
            LiteralKind::Html
        } else {
            kind
        };
        Some(InlineNode::Literal {
            kind,
            attrs,
            content,
        })
    }

    fn comment(&mut self) -> InlineNode {
        self.inp.pos += 2;
        let attrs = if self.inp.ch() == '{' {
            parse_attributes(&mut self.inp, false).unwrap_or_default()
        } else {
            Attributes::new()
        };
        let content = self.inp.line_rest().trim().to_string();
        self.inp.skip_to_eol();
        InlineNode::Literal {
            kind: LiteralKind::Comment,
            attrs,
            content,
        }
    }

    /// `[[text|ref]]` and `{{text|ref}}`: the body is scanned raw on one line, the text part is
    /// parsed separately.
    fn try_link(&mut self, open: char, close: char) -> Option<(InlineSlice, Reference, Attributes)> {
        if self.nesting() >= MAX_NESTING {
            return None;
        }
        let body_start = self.inp.pos + 2;
        let mut p = body_start;
        let mut depth = 0usize;
        let mut pipes = Vec::new();
        let end = loop {
            let ch = self.inp.at(p);
            if is_eol(ch) {
                return None;
            }
            let next = self.inp.at(p + 1);
            if ch == '\\' {
                if is_eol(next) {
                    return None;
                }
                p += 2;
                continue;
            }
            if ch == open && next == open {
                depth += 1;
                p += 2;
                continue;
            }
            if ch == close && next == close {
                if depth == 0 {
                    break p;
                }
                depth -= 1;
                p += 2;
                continue;
            }
            if ch == '|' && depth == 0 {
                pipes.push(p);
            }
            p += 1;
        };
        let whole = self.inp.slice(body_start, end);
        let split = if whole.trim_start().starts_with(QUERY_PREFIX) {
            None
        } else {
            pipes
                .iter()
                .find(|&&q| {
                    self.inp
                        .slice(q + 1, end)
                        .trim_start()
                        .starts_with(QUERY_PREFIX)
                })
                .or(pipes.last())
                .copied()
        };
        let (text, target) = match split {
            Some(q) => (self.inp.slice(body_start, q), self.inp.slice(q + 1, end)),
            None => (String::new(), whole),
        };
        let target = target.trim();
        if target.is_empty()
            || (!target.starts_with(QUERY_PREFIX) && target.contains(char::is_whitespace))
        {
            return None;
        }
        let inlines = if text.trim().is_empty() {
            InlineSlice::new()
        } else {
            self.child_inlines(&text)
        };
        let reference = Reference::parse(target);
        self.inp.pos = end + 2;
        let attrs = self.trailing_attrs();
        Some((inlines, reference, attrs))
    }

    fn try_cite(&mut self, mode: LineMode) -> Option<InlineNode> {
        self.attempt(Closer::Bracket, |p| {
            p.inp.pos += 2;
            let mut key = String::new();
            while !is_space_or_eol(p.inp.ch()) && p.inp.ch() != ',' && p.inp.ch() != ']' {
                key.push(p.inp.ch());
                p.inp.next();
            }
            if key.is_empty() {
                return None;
            }
            if p.inp.ch() == ',' {
                p.inp.next();
            }
            p.inp.skip_space();
            let inlines = p.parse_enclosed(Closer::Bracket, mode)?;
            p.inp.next();
            let attrs = p.trailing_attrs();
            Some(InlineNode::Cite {
                attrs,
                key,
                inlines,
            })
        })
    }

    fn try_footnote(&mut self, mode: LineMode) -> Option<InlineNode> {
        self.attempt(Closer::Bracket, |p| {
            p.inp.pos += 2;
            p.inp.skip_space();
            let inlines = p.parse_enclosed(Closer::Bracket, mode)?;
            p.inp.next();
            let attrs = p.trailing_attrs();
            Some(InlineNode::Footnote { attrs, inlines })
        })
    }

    fn try_mark(&mut self, mode: LineMode) -> Option<InlineNode> {
        self.attempt(Closer::Bracket, |p| {
            p.inp.pos += 2;
            let mut mark = String::new();
            while is_name_char(p.inp.ch()) {
                mark.push(p.inp.ch());
                p.inp.next();
            }
            let inlines = match p.inp.ch() {
                '|' => {
                    p.inp.next();
                    p.parse_enclosed(Closer::Bracket, mode)?
                }
                ']' => InlineSlice::new(),
                _ => return None,
            };
            p.inp.next();
            Some(InlineNode::Mark {
                mark,
                slug: String::new(),
                fragment: String::new(),
                inlines,
            })
        })
    }
}

//! Character input stream with one-character lookahead, used by the text parsers.

/// End-of-stream sentinel. Real NUL characters are replaced by U+FFFD when the input is built.
pub const EOS: char = '\0';

#[derive(Debug, Clone)]
pub struct Input {
    chars: Vec<char>,
    pub pos: usize,
}

impl Input {
    /// Line endings are normalised to `\n`.
    pub fn new(src: &str) -> Input {
        let mut chars = Vec::with_capacity(src.len());
        let mut it = src.chars().peekable();
        while let Some(ch) = it.next() {
            match ch {
                '\r' => {
                    if it.peek() == Some(&'\n') {
                        it.next();
                    }
                    chars.push('\n');
                }
                EOS => chars.push('\u{FFFD}'),
                ch => chars.push(ch),
            }
        }
        Input { chars, pos: 0 }
    }

    pub fn len(&self) -> usize {
        self.chars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chars.is_empty()
    }

    /// The current character, or [`EOS`].
    pub fn ch(&self) -> char {
        self.chars.get(self.pos).copied().unwrap_or(EOS)
    }

    pub fn at(&self, pos: usize) -> char {
        self.chars.get(pos).copied().unwrap_or(EOS)
    }

    pub fn peek(&self) -> char {
        self.at(self.pos + 1)
    }

    pub fn peek_n(&self, n: usize) -> char {
        self.at(self.pos + n)
    }

    /// Advances and returns the new current character.
    pub fn next(&mut self) -> char {
        if self.pos < self.chars.len() {
            self.pos += 1;
        }
        self.ch()
    }

    pub fn at_eos(&self) -> bool {
        self.pos >= self.chars.len()
    }

    pub fn at_eol(&self) -> bool {
        is_eol(self.ch())
    }

    pub fn skip_to_eol(&mut self) {
        while !self.at_eol() {
            self.next();
        }
    }

    /// Consumes one line ending. Returns false at end of stream or inside a line.
    pub fn eat_eol(&mut self) -> bool {
        if self.ch() == '\n' {
            self.next();
            true
        } else {
            false
        }
    }

    pub fn skip_space(&mut self) -> usize {
        let start = self.pos;
        while is_space(self.ch()) {
            self.next();
        }
        self.pos - start
    }

    /// Number of consecutive `ch` starting at the current position.
    pub fn count_run(&self, ch: char) -> usize {
        let mut n = 0;
        while self.at(self.pos + n) == ch {
            n += 1;
        }
        n
    }

    pub fn slice(&self, from: usize, to: usize) -> String {
        let to = to.min(self.chars.len());
        if from >= to {
            return String::new();
        }
        self.chars[from..to].iter().collect()
    }

    /// Rest of the current line, without consuming it.
    pub fn line_rest(&self) -> String {
        let mut end = self.pos;
        while !is_eol(self.at(end)) {
            end += 1;
        }
        self.slice(self.pos, end)
    }

    /// Whether the rest of the current line is blank.
    pub fn rest_is_blank(&self) -> bool {
        let mut p = self.pos;
        while is_space(self.at(p)) {
            p += 1;
        }
        is_eol(self.at(p))
    }

    /// Scans a character entity at `&`. On success the input is positioned after `;`.
    pub fn scan_entity(&mut self) -> Option<String> {
        if self.ch() != '&' {
            return None;
        }
        let start = self.pos;
        let mut end = start + 1;
        while end - start <= 32 {
            match self.at(end) {
                ';' => break,
                c if c.is_ascii_alphanumeric() || c == '#' => end += 1,
                _ => return None,
            }
        }
        if self.at(end) != ';' {
            return None;
        }
        let name = self.slice(start + 1, end);
        let resolved = resolve_entity(&name)?;
        self.pos = end + 1;
        Some(resolved)
    }
}

pub fn is_space(ch: char) -> bool {
    ch == ' ' || ch == '\t'
}

pub fn is_eol(ch: char) -> bool {
    ch == '\n' || ch == EOS
}

pub fn is_space_or_eol(ch: char) -> bool {
    is_space(ch) || is_eol(ch)
}

fn resolve_entity(name: &str) -> Option<String> {
    if let Some(num) = name.strip_prefix('#') {
        let code = if let Some(hex) = num.strip_prefix(['x', 'X']) {
            u32::from_str_radix(hex, 16).ok()?
        } else {
            num.parse::<u32>().ok()?
        };
        return match char::from_u32(code) {
            Some(c) if c != EOS => Some(c.to_string()),
            _ => None,
        };
    }
    NAMED_ENTITIES
        .iter()
        .find(|(n, _)| *n == name)
        .map(|(_, c)| c.to_string())
}

const NAMED_ENTITIES: &[(&str, char)] = &[
    ("amp", '&'),
    ("apos", '\''),
    ("bull", '\u{2022}'),
    ("cent", '\u{A2}'),
    ("copy", '\u{A9}'),
    ("deg", '\u{B0}'),
    ("divide", '\u{F7}'),
    ("euro", '\u{20AC}'),
    ("gt", '>'),
    ("hellip", '\u{2026}'),
    ("larr", '\u{2190}'),
    ("laquo", '\u{AB}'),
    ("ldquo", '\u{201C}'),
    ("lsquo", '\u{2018}'),
    ("lt", '<'),
    ("mdash", '\u{2014}'),
    ("micro", '\u{B5}'),
    ("middot", '\u{B7}'),
    ("nbsp", '\u{A0}'),
    ("ndash", '\u{2013}'),
    ("para", '\u{B6}'),
    ("plusmn", '\u{B1}'),
    ("pound", '\u{A3}'),
    ("quot", '"'),
    ("raquo", '\u{BB}'),
    ("rarr", '\u{2192}'),
    ("rdquo", '\u{201D}'),
    ("reg", '\u{AE}'),
    ("rsquo", '\u{2019}'),
    ("sect", '\u{A7}'),
    ("shy", '\u{AD}'),
    ("times", '\u{D7}'),
    ("trade", '\u{2122}'),
    ("yen", '\u{A5}'),
];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalises_line_endings_and_nul() {
        let inp = Input::new("a\r\nb\rc\0");
        assert_eq!(inp.slice(0, inp.len()), "a\nb\nc\u{FFFD}");
    }

    #[test]
    fn entities() {
        for (src, want) in [("&amp;", "&"), ("&#65;", "A"), ("&#x41;", "A"), ("&nbsp;", "\u{A0}")] {
            let mut inp = Input::new(src);
            assert_eq!(inp.scan_entity().as_deref(), Some(want), "{src}");
            assert!(inp.at_eos());
        }
        for bad in ["&nope;", "&#0;", "&amp", "& x;"] {
            let mut inp = Input::new(bad);
            assert_eq!(inp.scan_entity(), None, "{bad}");
            assert_eq!(inp.pos, 0);
        }
    }

    #[test]
    fn runs_and_lines() {
        let mut inp = Input::new("===  x\nnext");
        assert_eq!(inp.count_run('='), 3);
        inp.skip_to_eol();
        assert!(inp.eat_eol());
        assert_eq!(inp.line_rest(), "next");
    }
}

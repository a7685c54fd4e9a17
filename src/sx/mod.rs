//! S-expression values with a reader, a byte-exact printer and a pretty printer.
//!
//! Used for the canonical `sz` AST encoding, the `shtml` tree, and the `sxn` content syntax.
use std::fmt::{Display, Formatter, Write};

use crate::error::ZettelError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Sx {
    Symbol(String),
    Str(String),
    Int(i64),
    List(Vec<Sx>),
    /// Dotted pair `(car . cdr)`, used in association lists.
    Pair(Box<Sx>, Box<Sx>),
}

impl Sx {
    pub fn sym(s: impl Into<String>) -> Sx {
        Sx::Symbol(s.into())
    }

    pub fn str(s: impl Into<String>) -> Sx {
        Sx::Str(s.into())
    }

    pub fn list(items: Vec<Sx>) -> Sx {
        Sx::List(items)
    }

    pub fn nil() -> Sx {
        Sx::List(Vec::new())
    }

    pub fn pair(car: Sx, cdr: Sx) -> Sx {
        Sx::Pair(Box::new(car), Box::new(cdr))
    }

    pub fn as_symbol(&self) -> Option<&str> {
        match self {
            Sx::Symbol(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Sx::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[Sx]> {
        match self {
            Sx::List(items) => Some(items),
            _ => None,
        }
    }

    pub fn is_nil(&self) -> bool {
        matches!(self, Sx::List(items) if items.is_empty())
    }

    /// The head symbol of a list.
    pub fn head(&self) -> Option<&str> {
        self.as_list()?.first()?.as_symbol()
    }

    fn write_to(&self, out: &mut String) {
        match self {
            Sx::Symbol(s) => out.push_str(s),
            Sx::Str(s) => write_string(out, s),
            Sx::Int(n) => {
                let _ = write!(out, "{n}");
            }
            Sx::List(items) => {
                out.push('(');
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        out.push(' ');
                    }
                    item.write_to(out);
                }
                out.push(')');
            }
            Sx::Pair(car, cdr) => {
                out.push('(');
                car.write_to(out);
                out.push_str(" . ");
                cdr.write_to(out);
                out.push(')');
            }
        }
    }

    /// Multi-line rendering; lists that fit on a line stay on one line.
    pub fn pretty(&self) -> String {
        let mut out = String::new();
        self.pretty_to(&mut out, 0);
        out
    }

    fn pretty_to(&self, out: &mut String, indent: usize) {
        let flat = self.to_string();
        let items = match self {
            Sx::List(items) if flat.len() + indent > PRETTY_WIDTH && items.len() > 1 => items,
            _ => {
                out.push_str(&flat);
                return;
            }
        };
        out.push('(');
        items[0].pretty_to(out, indent + 1);
        for item in &items[1..] {
            out.push('\n');
            out.push_str(&" ".repeat(indent + 2));
            item.pretty_to(out, indent + 2);
        }
        out.push(')');
    }
}

const PRETTY_WIDTH: usize = 72;

impl Display for Sx {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let mut out = String::new();
        self.write_to(&mut out);
        f.write_str(&out)
    }
}

fn write_string(out: &mut String, s: &str) {
    out.push('"');
    for ch in s.chars() {
        match ch {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\t' => out.push_str("\\t"),
            '\r' => out.push_str("\\r"),
            ch => out.push(ch),
        }
    }
    out.push('"');
}

/// Reads all top-level objects of `src`.
pub fn read_all(src: &str) -> Result<Vec<Sx>, ZettelError> {
    let mut reader = Reader {
        chars: src.chars().collect(),
        pos: 0,
    };
    let mut result = Vec::new();
    loop {
        reader.skip_ws();
        if reader.pos >= reader.chars.len() {
            return Ok(result);
        }
        result.push(reader.read()?);
    }
}

/// Reads exactly one object.
pub fn read(src: &str) -> Result<Sx, ZettelError> {
    let mut all = read_all(src)?;
    if all.len() != 1 {
        return Err(ZettelError::Serialization(format!(
            "expected one s-expression, found {}",
            all.len()
        )));
    }
    Ok(all.remove(0))
}

struct Reader {
    chars: Vec<char>,
    pos: usize,
}

impl Reader {
    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn err(&self, msg: &str) -> ZettelError {
        ZettelError::Serialization(format!("s-expression: {msg} at {}", self.pos))
    }

    fn skip_ws(&mut self) {
        while let Some(ch) = self.peek() {
            if ch.is_whitespace() {
                self.pos += 1;
            } else if ch == ';' {
                while let Some(c) = self.peek() {
                    if c == '\n' {
                        break;
                    }
                    self.pos += 1;
                }
            } else {
                break;
            }
        }
    }

    fn read(&mut self) -> Result<Sx, ZettelError> {
        self.skip_ws();
        match self.peek() {
            None => Err(self.err("unexpected end")),
            Some('(') => {
                self.pos += 1;
                self.read_list()
            }
            Some(')') => Err(self.err("unexpected ')'")),
            Some('"') => {
                self.pos += 1;
                self.read_string()
            }
            Some('\'') => {
                self.pos += 1;
                let quoted = self.read()?;
                Ok(Sx::List(vec![Sx::sym("quote"), quoted]))
            }
            Some(_) => Ok(self.read_atom()),
        }
    }

    fn read_list(&mut self) -> Result<Sx, ZettelError> {
        let mut items = Vec::new();
        loop {
            self.skip_ws();
            match self.peek() {
                None => return Err(self.err("unterminated list")),
                Some(')') => {
                    self.pos += 1;
                    return Ok(Sx::List(items));
                }
                Some('.') if items.len() == 1 && self.is_lone_dot() => {
                    self.pos += 1;
                    let cdr = self.read()?;
                    self.skip_ws();
                    if self.peek() != Some(')') {
                        return Err(self.err("malformed dotted pair"));
                    }
                    self.pos += 1;
                    let car = items.remove(0);
                    return Ok(Sx::pair(car, cdr));
                }
                Some(_) => items.push(self.read()?),
            }
        }
    }

    fn is_lone_dot(&self) -> bool {
        self.chars
            .get(self.pos + 1)
            .map(|c| c.is_whitespace() || *c == '(' || *c == '"')
            .unwrap_or(false)
    }

    fn read_string(&mut self) -> Result<Sx, ZettelError> {
        let mut s = String::new();
        loop {
            match self.peek() {
                None => return Err(self.err("unterminated string")),
                Some('"') => {
                    self.pos += 1;
                    return Ok(Sx::Str(s));
                }
                Some('\\') => {
                    self.pos += 1;
                    let esc = self.peek().ok_or_else(|| self.err("dangling escape"))?;
                    self.pos += 1;
                    s.push(match esc {
                        'n' => '\n',
                        't' => '\t',
                        'r' => '\r',
                        c => c,
                    });
                }
                Some(c) => {
                    self.pos += 1;
                    s.push(c);
                }
            }
        }
    }

    fn read_atom(&mut self) -> Sx {
        let start = self.pos;
        while let Some(c) = self.peek() {
            if c.is_whitespace() || matches!(c, '(' | ')' | '"' | ';') {
                break;
            }
            self.pos += 1;
        }
        let token: String = self.chars[start..self.pos].iter().collect();
        let numeric = token
            .strip_prefix('-')
            .unwrap_or(&token)
            .chars()
            .all(|c| c.is_ascii_digit());
        if numeric && token.chars().any(|c| c.is_ascii_digit()) {
            if let Ok(n) = token.parse::<i64>() {
                if n.to_string() == token {
                    return Sx::Int(n);
                }
            }
        }
        Sx::Symbol(token)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn print_is_byte_exact_after_read() {
        let src = r#"(BLOCK (PARA (TEXT "a \"b\"\n") (SPACE)) (quote (("" . "go"))) -3 007)"#;
        let sx = read(src).unwrap();
        assert_eq!(sx.to_string(), src);
    }

    #[test]
    fn comments_and_quote() {
        let all = read_all("; leading\n'x (a) ; tail").unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].to_string(), "(quote x)");
    }

    #[test]
    fn errors_on_unbalanced() {
        assert!(read("(a").is_err());
        assert!(read(")").is_err());
        assert!(read("\"x").is_err());
    }

    #[test]
    fn pretty_breaks_long_lists() {
        let long = Sx::list(
            (0..20)
                .map(|i| Sx::str(format!("element-{i}")))
                .collect(),
        );
        let pretty = long.pretty();
        assert!(pretty.contains('\n'));
        assert_eq!(read(&pretty).unwrap(), long);
        assert_eq!(Sx::sym("a").pretty(), "a");
    }
}

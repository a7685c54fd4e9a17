//! The textual metadata format shared by directory and bundled boxes.
//!
//! ```text
//! title: A zettel
//! tags: #example #demo
//!
//! Content starts after the first blank line.
//! ```
//!
//! Alternatively the header is framed by two lines consisting of exactly `---`. Lines starting
//! with whitespace continue the previous value. Keys are lowercased, values trimmed, unknown keys
//! are kept.
use once_cell::sync::Lazy;
use regex::Regex;

use super::{key_type, Meta};
use crate::id::Zid;

static HEADER_LINE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^([A-Za-z0-9][A-Za-z0-9-]*)\s*:\s*(.*)$").expect("valid regex"));

const FRAME: &str = "---";

/// Splits `src` into header pairs and the byte offset where the content starts.
///
/// Text without a recognisable header yields no pairs and offset zero.
pub fn split_header(src: &str) -> (Vec<(String, String)>, usize) {
    let mut pairs: Vec<(String, String)> = Vec::new();
    let mut offset = 0;
    let mut lines = LineIter { src, pos: 0 };

    let framed = match lines.peek() {
        Some((line, _)) if line.trim_end() == FRAME => {
            lines.next();
            true
        }
        Some((line, _)) if HEADER_LINE.is_match(line.trim_end()) => false,
        _ => return (pairs, 0),
    };

    while let Some((line, end)) = lines.next() {
        offset = end;
        let line = line.trim_end_matches(['\r', '\n']);
        if framed && line.trim_end() == FRAME {
            break;
        }
        if !framed && line.trim().is_empty() {
            break;
        }
        if line.starts_with([' ', '\t']) {
            if let Some((_, value)) = pairs.last_mut() {
                if !value.is_empty() {
                    value.push(' ');
                }
                value.push_str(line.trim());
            }
            continue;
        }
        match HEADER_LINE.captures(line) {
            Some(caps) => {
                let key = caps[1].to_lowercase();
                let value = caps[2].trim().to_string();
                if let Some(existing) = pairs.iter_mut().find(|(k, _)| *k == key) {
                    if key_type(&key).is_set() {
                        existing.1.push(' ');
                        existing.1.push_str(&value);
                    } else {
                        existing.1 = value;
                    }
                } else {
                    pairs.push((key, value));
                }
            }
            None if framed => {}
            None => {
                tracing::debug!("[split_header] ignoring malformed header line {:?}", line);
            }
        }
    }
    (pairs, offset)
}

/// Parses a complete metadata text, as found in `.meta` files.
pub fn parse_meta(zid: Zid, src: &str) -> Meta {
    let mut meta = Meta::new(zid);
    let (pairs, _) = split_header(src);
    for (k, v) in pairs {
        meta.set(&k, &v);
    }
    meta
}

/// Parses a text zettel with inline header into metadata and content.
pub fn parse_zettel_text(zid: Zid, src: &str) -> (Meta, String) {
    let mut meta = Meta::new(zid);
    let (pairs, offset) = split_header(src);
    for (k, v) in pairs {
        meta.set(&k, &v);
    }
    (meta, src[offset..].to_string())
}

/// Writes the user editable pairs as header lines.
pub fn write_meta(meta: &Meta) -> String {
    write_pairs(meta.user_pairs())
}

/// Writes every pair a box persists: enriched keys are dropped, computed and internal kept.
pub fn write_stored_meta(meta: &Meta) -> String {
    write_pairs(meta.stored_pairs())
}

fn write_pairs(pairs: Vec<(&str, &str)>) -> String {
    let mut out = String::new();
    for (k, v) in pairs {
        out.push_str(k);
        out.push_str(": ");
        out.push_str(v);
        out.push('\n');
    }
    out
}

/// Writes the stored header, blank separator and content.
pub fn write_zettel_text(meta: &Meta, content: &str) -> String {
    let header = write_stored_meta(meta);
    if header.is_empty() {
        return content.to_string();
    }
    format!("{header}\n{content}")
}

struct LineIter<'a> {
    src: &'a str,
    pos: usize,
}

impl<'a> LineIter<'a> {
    fn peek(&self) -> Option<(&'a str, usize)> {
        if self.pos >= self.src.len() {
            return None;
        }
        let rest = &self.src[self.pos..];
        let len = rest.find('\n').map(|i| i + 1).unwrap_or(rest.len());
        Some((&rest[..len], self.pos + len))
    }
}

impl<'a> Iterator for LineIter<'a> {
    type Item = (&'a str, usize);

    fn next(&mut self) -> Option<Self::Item> {
        let item = self.peek()?;
        self.pos = item.1;
        Some(item)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn zid() -> Zid {
        Zid::parse("20240102030405").unwrap()
    }

    #[test]
    fn header_until_blank_line() {
        let (meta, content) = parse_zettel_text(zid(), "Title: Hello\ntags: #a\n\nBody\ntext");
        assert_eq!(meta.get("title"), Some("Hello"));
        assert_eq!(meta.get("tags"), Some("#a"));
        assert_eq!(content, "Body\ntext");
    }

    #[test]
    fn framed_header() {
        let (meta, content) = parse_zettel_text(zid(), "---\ntitle: Framed\n---\nBody");
        assert_eq!(meta.title(), Some("Framed"));
        assert_eq!(content, "Body");
    }

    #[test]
    fn no_header_keeps_everything() {
        let (meta, content) = parse_zettel_text(zid(), "Just text.\n\nMore.");
        assert!(meta.is_empty());
        assert_eq!(content, "Just text.\n\nMore.");
    }

    #[test]
    fn continuation_and_repeated_set_keys() {
        let meta = parse_meta(zid(), "title: A long\n  title\ntags: #a\ntags: #b\n");
        assert_eq!(meta.title(), Some("A long title"));
        assert_eq!(meta.get("tags"), Some("#a #b"));
    }

    #[test]
    fn header_only_text() {
        let (meta, content) = parse_zettel_text(zid(), "title: only");
        assert_eq!(meta.title(), Some("only"));
        assert_eq!(content, "");
    }

    #[test]
    fn write_skips_computed_keys() {
        let mut meta = Meta::new(zid());
        meta.set("title", "T");
        meta.set("back-ref", "20240101000000");
        assert_eq!(write_meta(&meta), "title: T\n");
        assert_eq!(write_zettel_text(&meta, "x"), "title: T\n\nx");
    }

    #[test]
    fn stored_header_keeps_modified() {
        let mut meta = Meta::new(zid());
        meta.set("title", "T");
        meta.set("modified", "20240102030405");
        meta.set("all-tags", "#x");
        assert_eq!(write_meta(&meta), "title: T\n");
        assert_eq!(write_stored_meta(&meta), "title: T\nmodified: 20240102030405\n");
    }
}

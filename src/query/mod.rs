//! The built-in metadata query.
//!
//! A query is a list of term groups separated by `OR`, ordering and paging directives, and a
//! tail of actions after the first `|`:
//!
//! ```text
//! tags:#project status!done ORDER created LIMIT 20 | N
//! ```
//!
//! Terms within a group must all match; a zettel is selected if any group matches. Free words
//! are looked up in the word index of the box manager. Directive keywords are only recognised
//! in upper case, everything else is matched case-insensitively.
use std::{
    cmp::Ordering,
    collections::{BTreeSet, HashMap},
    fmt::{Display, Formatter},
};

use serde::{Deserialize, Serialize};

use crate::{
    id::Zid,
    meta::{clean_tag, key_type, normalize_tag, KeyType, Meta},
};

mod parse;

pub use parse::parse_query;

/// Zettel that contain a word, as maintained by the index worker.
pub trait WordIndex {
    /// Identifiers of zettel with an indexed word starting with `word`, already normalised by
    /// [`normalize_word`].
    fn search_word(&self, word: &str) -> BTreeSet<Zid>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CompareOp {
    /// `key:value`
    Equal,
    /// `key!value`
    NotEqual,
    /// `key<value`
    Less,
    /// `key>value`
    Greater,
    /// `key~value`
    Contains,
}

impl CompareOp {
    pub fn symbol(&self) -> char {
        match self {
            CompareOp::Equal => ':',
            CompareOp::NotEqual => '!',
            CompareOp::Less => '<',
            CompareOp::Greater => '>',
            CompareOp::Contains => '~',
        }
    }

    pub fn from_symbol(ch: char) -> Option<CompareOp> {
        match ch {
            ':' => Some(CompareOp::Equal),
            '!' => Some(CompareOp::NotEqual),
            '<' => Some(CompareOp::Less),
            '>' => Some(CompareOp::Greater),
            '~' => Some(CompareOp::Contains),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Term {
    /// Full-text search for a word.
    Search(String),
    Compare {
        key: String,
        op: CompareOp,
        value: String,
    },
    /// `key?`
    Exists(String),
    /// `key!?`
    Missing(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Order {
    pub key: String,
    pub descending: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Query {
    /// Alternatives, at least one must match. No alternatives select everything.
    pub alternatives: Vec<Vec<Term>>,
    pub order: Vec<Order>,
    pub offset: usize,
    /// Zero means no limit.
    pub limit: usize,
    pub actions: Vec<String>,
}

impl Query {
    pub fn parse(s: &str) -> Query {
        parse_query(s)
    }

    /// True if the query selects every zettel.
    pub fn selects_all(&self) -> bool {
        self.alternatives.iter().all(Vec::is_empty)
    }

    /// All free words of the query, normalised.
    pub fn search_words(&self) -> BTreeSet<String> {
        self.alternatives
            .iter()
            .flatten()
            .filter_map(|term| match term {
                Term::Search(word) => Some(normalize_word(word)),
                _ => None,
            })
            .filter(|w| !w.is_empty())
            .collect()
    }

    /// Filters, sorts and pages the given metadata. Without an index, free words are matched
    /// against the metadata values.
    pub fn select(&self, metas: Vec<Meta>, index: Option<&dyn WordIndex>) -> Vec<Meta> {
        let found: HashMap<String, BTreeSet<Zid>> = match index {
            Some(index) => self
                .search_words()
                .into_iter()
                .map(|w| {
                    let zids = index.search_word(&w);
                    (w, zids)
                })
                .collect(),
            None => HashMap::new(),
        };
        let mut selected: Vec<Meta> = metas
            .into_iter()
            .filter(|meta| self.matches(meta, index.map(|_| &found)))
            .collect();
        selected.sort_by(|a, b| self.compare(a, b));
        let selected = selected.into_iter().skip(self.offset);
        if self.limit > 0 {
            selected.take(self.limit).collect()
        } else {
            selected.collect()
        }
    }

    fn matches(&self, meta: &Meta, found: Option<&HashMap<String, BTreeSet<Zid>>>) -> bool {
        if self.selects_all() {
            return true;
        }
        self.alternatives
            .iter()
            .filter(|group| !group.is_empty())
            .any(|group| group.iter().all(|term| term_matches(term, meta, found)))
    }

    fn compare(&self, a: &Meta, b: &Meta) -> Ordering {
        for order in &self.order {
            let ord = match (a.get_value(&order.key), b.get_value(&order.key)) {
                (Some(x), Some(y)) => {
                    let ord = compare_values(key_type(&order.key), &x, &y);
                    if order.descending {
                        ord.reverse()
                    } else {
                        ord
                    }
                }
                (Some(_), None) => Ordering::Less,
                (None, Some(_)) => Ordering::Greater,
                (None, None) => Ordering::Equal,
            };
            if ord != Ordering::Equal {
                return ord;
            }
        }
        b.zid().cmp(&a.zid())
    }
}

impl Display for Query {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let mut parts: Vec<String> = Vec::new();
        let groups: Vec<String> = self
            .alternatives
            .iter()
            .filter(|g| !g.is_empty())
            .map(|g| g.iter().map(Term::to_string).collect::<Vec<_>>().join(" "))
            .collect();
        if !groups.is_empty() {
            parts.push(groups.join(" OR "));
        }
        for order in &self.order {
            let keyword = if order.descending { "RORDER" } else { "ORDER" };
            parts.push(format!("{keyword} {}", order.key));
        }
        if self.offset > 0 {
            parts.push(format!("OFFSET {}", self.offset));
        }
        if self.limit > 0 {
            parts.push(format!("LIMIT {}", self.limit));
        }
        if !self.actions.is_empty() {
            parts.push(format!("| {}", self.actions.join(" ")));
        }
        f.write_str(&parts.join(" "))
    }
}

impl Display for Term {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Term::Search(word) => f.write_str(word),
            Term::Compare { key, op, value } => write!(f, "{key}{}{value}", op.symbol()),
            Term::Exists(key) => write!(f, "{key}?"),
            Term::Missing(key) => write!(f, "{key}!?"),
        }
    }
}

fn term_matches(
    term: &Term,
    meta: &Meta,
    found: Option<&HashMap<String, BTreeSet<Zid>>>,
) -> bool {
    match term {
        Term::Search(word) => {
            let word = normalize_word(word);
            match found {
                Some(found) => found
                    .get(&word)
                    .map(|zids| zids.contains(&meta.zid()))
                    .unwrap_or(false),
                None => meta.computed_pairs().iter().any(|(_, v)| {
                    v.split_whitespace()
                        .any(|token| normalize_word(token).starts_with(&word))
                }),
            }
        }
        Term::Exists(key) => meta.has(key),
        Term::Missing(key) => !meta.has(key),
        Term::Compare { key, op, value } => {
            let kt = key_type(key);
            match meta.get_value(key) {
                Some(stored) => compare_matches(kt, &stored, *op, value),
                None => *op == CompareOp::NotEqual,
            }
        }
    }
}

fn compare_matches(kt: KeyType, stored: &str, op: CompareOp, value: &str) -> bool {
    let value_lc = value.to_lowercase();
    match op {
        CompareOp::Equal => value_equals(kt, stored, &value_lc),
        CompareOp::NotEqual => !value_equals(kt, stored, &value_lc),
        CompareOp::Contains => stored.to_lowercase().contains(&value_lc),
        CompareOp::Less => compare_values(kt, stored, value) == Ordering::Less,
        CompareOp::Greater => compare_values(kt, stored, value) == Ordering::Greater,
    }
}

fn value_equals(kt: KeyType, stored: &str, value: &str) -> bool {
    match kt {
        KeyType::TagSet => {
            let tag = normalize_tag(value);
            stored
                .split_whitespace()
                .any(|t| clean_tag(t).eq_ignore_ascii_case(clean_tag(&tag)))
        }
        KeyType::IdSet | KeyType::WordSet => stored
            .split_whitespace()
            .any(|elem| elem.to_lowercase() == value),
        KeyType::Timestamp => stored.starts_with(value),
        KeyType::Bool | KeyType::Id | KeyType::Number | KeyType::Word => {
            stored.to_lowercase() == value
        }
        KeyType::Credential
        | KeyType::Empty
        | KeyType::String
        | KeyType::Url
        | KeyType::Zettelmarkup => stored.to_lowercase().contains(value),
    }
}

/// Orders two values of the same key: numbers and timestamps numerically, everything else
/// lexically ignoring case.
pub fn compare_values(kt: KeyType, a: &str, b: &str) -> Ordering {
    match kt {
        KeyType::Number | KeyType::Id => match (a.trim().parse::<i64>(), b.trim().parse::<i64>()) {
            (Ok(x), Ok(y)) => x.cmp(&y),
            _ => a.to_lowercase().cmp(&b.to_lowercase()),
        },
        KeyType::Timestamp => pad_timestamp(a).cmp(&pad_timestamp(b)),
        _ => a.to_lowercase().cmp(&b.to_lowercase()),
    }
}

fn pad_timestamp(ts: &str) -> String {
    let mut s = ts.trim().to_string();
    while s.len() < 14 {
        s.push('0');
    }
    s
}

#[cfg(feature = "stemming")]
static STEMMER: once_cell::sync::Lazy<rust_stemmers::Stemmer> =
    once_cell::sync::Lazy::new(|| rust_stemmers::Stemmer::create(rust_stemmers::Algorithm::English));

/// Index form of a word: lowercase alphanumerics, stemmed with the `stemming` feature.
pub fn normalize_word(word: &str) -> String {
    let lower: String = word
        .chars()
        .filter(|c| c.is_alphanumeric())
        .flat_map(char::to_lowercase)
        .collect();
    #[cfg(feature = "stemming")]
    {
        STEMMER.stem(&lower).into_owned()
    }
    #[cfg(not(feature = "stemming"))]
    {
        lower
    }
}

/// Splits free text into normalised index words.
pub fn split_words(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .map(normalize_word)
        .filter(|w| !w.is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::meta::keys::{KEY_CREATED, KEY_TAGS, KEY_TITLE};
    use pretty_assertions::assert_eq;

    fn meta(n: u64, title: &str, tags: &str) -> Meta {
        let mut m = Meta::new(Zid::from_u64(20_240_101_000_000 + n).unwrap());
        m.set(KEY_TITLE, title);
        m.set(KEY_TAGS, tags);
        m.set(KEY_CREATED, &format!("2024010{n}"));
        m
    }

    fn corpus() -> Vec<Meta> {
        vec![
            meta(1, "Alpha", "#a"),
            meta(2, "Beta", "#a #b"),
            meta(3, "Gamma", "#b"),
        ]
    }

    fn titles(q: &str) -> Vec<String> {
        Query::parse(q)
            .select(corpus(), None)
            .iter()
            .map(|m| m.title().unwrap_or_default().to_string())
            .collect()
    }

    #[test]
    fn default_order_is_newest_first() {
        assert_eq!(titles(""), vec!["Gamma", "Beta", "Alpha"]);
    }

    #[test]
    fn tag_terms_ignore_the_hash() {
        assert_eq!(titles("tags:a"), vec!["Beta", "Alpha"]);
        assert_eq!(titles("tags:#B"), vec!["Gamma", "Beta"]);
        assert_eq!(titles("tags!a"), vec!["Gamma"]);
    }

    #[test]
    fn alternatives_and_ordering() {
        assert_eq!(titles("title:alpha OR title:gamma ORDER title"), vec!["Alpha", "Gamma"]);
        assert_eq!(titles("ORDER created OFFSET 1 LIMIT 1"), vec!["Beta"]);
    }

    #[test]
    fn existence_and_comparison() {
        assert_eq!(titles("author?"), Vec::<String>::new());
        assert_eq!(titles("author!?").len(), 3);
        assert_eq!(titles("created<20240102"), vec!["Alpha"]);
        assert_eq!(titles("created>2024010"), vec!["Gamma", "Beta", "Alpha"]);
        assert_eq!(titles("title~mm"), vec!["Gamma"]);
    }

    #[test]
    fn words_match_metadata_without_index() {
        assert_eq!(titles("beta"), vec!["Beta"]);
    }

    #[test]
    fn words_use_the_index() {
        struct Fixed;
        impl WordIndex for Fixed {
            fn search_word(&self, word: &str) -> BTreeSet<Zid> {
                if word == normalize_word("content") {
                    [Zid::from_u64(20_240_101_000_001).unwrap()].into()
                } else {
                    BTreeSet::new()
                }
            }
        }
        let q = Query::parse("content");
        let found = q.select(corpus(), Some(&Fixed));
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].title(), Some("Alpha"));
    }

    #[test]
    fn prints_canonical_form() {
        let q = Query::parse("Tags:#a   word OR role!? RORDER title LIMIT 5 | N tags");
        assert_eq!(q.to_string(), "tags:#a word OR role!? RORDER title LIMIT 5 | N tags");
        assert_eq!(Query::parse(&q.to_string()), q);
    }
}

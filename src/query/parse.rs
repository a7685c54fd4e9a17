use std::{convert::Infallible, str::FromStr};

use super::{CompareOp, Order, Query, Term};
use crate::meta::keys::is_valid_key;

const KW_OR: &str = "OR";
const KW_ORDER: &str = "ORDER";
const KW_RORDER: &str = "RORDER";
const KW_OFFSET: &str = "OFFSET";
const KW_LIMIT: &str = "LIMIT";

/// Parses a query. Parsing never fails: anything that is not a valid term or directive is a
/// search word.
pub fn parse_query(src: &str) -> Query {
    let (terms, actions) = match src.split_once('|') {
        Some((terms, actions)) => (terms, Some(actions)),
        None => (src, None),
    };
    let mut query = Query {
        actions: actions
            .map(|a| a.split_whitespace().map(str::to_string).collect())
            .unwrap_or_default(),
        ..Query::default()
    };
    let mut group: Vec<Term> = Vec::new();
    let mut tokens = terms.split_whitespace().peekable();
    while let Some(token) = tokens.next() {
        match token {
            KW_OR => {
                if !group.is_empty() {
                    query.alternatives.push(std::mem::take(&mut group));
                }
            }
            KW_ORDER | KW_RORDER => match tokens.peek().map(|k| k.to_lowercase()) {
                Some(key) if is_valid_key(&key) => {
                    tokens.next();
                    query.order.push(Order {
                        key,
                        descending: token == KW_RORDER,
                    });
                }
                _ => group.push(Term::Search(token.to_lowercase())),
            },
            KW_OFFSET | KW_LIMIT => match tokens.peek().and_then(|n| n.parse::<usize>().ok()) {
                Some(n) => {
                    tokens.next();
                    if token == KW_OFFSET {
                        query.offset = n;
                    } else {
                        query.limit = n;
                    }
                }
                None => group.push(Term::Search(token.to_lowercase())),
            },
            _ => group.push(parse_term(token)),
        }
    }
    if !group.is_empty() {
        query.alternatives.push(group);
    }
    tracing::debug!("[parse_query] {src:?} -> {query}");
    query
}

fn parse_term(token: &str) -> Term {
    let split = token
        .char_indices()
        .find(|(_, c)| CompareOp::from_symbol(*c).is_some() || *c == '?');
    let Some((pos, symbol)) = split else {
        return Term::Search(token.to_lowercase());
    };
    let key = token[..pos].to_lowercase();
    if !is_valid_key(&key) {
        return Term::Search(token.to_lowercase());
    }
    let rest = &token[pos + symbol.len_utf8()..];
    match (symbol, rest) {
        ('?', "") => Term::Exists(key),
        ('!', "?") | ('!', "") => Term::Missing(key),
        (_, "") => Term::Exists(key),
        ('?', _) => Term::Search(token.to_lowercase()),
        (symbol, value) => match CompareOp::from_symbol(symbol) {
            Some(op) => Term::Compare {
                key,
                op,
                value: value.to_string(),
            },
            None => Term::Search(token.to_lowercase()),
        },
    }
}

impl FromStr for Query {
    type Err = Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(parse_query(s))
    }
}

//! Extraction of index data from a zettel and derivation of enriched metadata.
use std::collections::BTreeSet;

use super::index::{Index, ZettelIndex};
use crate::{
    ast::{
        walk::{walk_blocks, Descend, Node, Visitor},
        BlockNode, InlineNode, RefState, Reference,
    },
    id::Zid,
    meta::{
        clean_tag, is_timestamp, key_type,
        keys::{
            is_internal, KEY_ALL_TAGS, KEY_BACK_REF, KEY_BOX_NUMBER, KEY_CONTENT_TAGS, KEY_CREATED,
            KEY_FWD_REF, KEY_MODIFIED, KEY_PUBLISHED, KEY_TAGS,
        },
        normalize_tag, KeyType, Meta,
    },
    parser::parse_zettel,
    query::split_words,
    zettel::Zettel,
};

struct Collector<'a> {
    entry: &'a mut ZettelIndex,
}

impl Collector<'_> {
    fn reference(&mut self, reference: &Reference) {
        match reference.state {
            RefState::External => {
                self.entry.urls.insert(reference.value.clone());
            }
            _ => {
                if let Some(zid) = reference.zid() {
                    self.entry.refs.insert(zid);
                }
            }
        }
    }

    fn text(&mut self, text: &str) {
        self.entry.words.extend(split_words(text));
        self.entry.content_tags.extend(content_tags(text));
    }
}

impl Visitor for Collector<'_> {
    fn visit(&mut self, node: Node<'_>) -> Descend {
        match node {
            Node::Inline(InlineNode::Text(text)) => self.text(text),
            Node::Inline(InlineNode::Link { reference, .. })
            | Node::Inline(InlineNode::Embed { reference, .. })
            | Node::Block(BlockNode::Transclude { reference, .. }) => self.reference(reference),
            _ => {}
        }
        Descend::Children
    }
}

/// `#tag` words written in text.
fn content_tags(text: &str) -> impl Iterator<Item = String> + '_ {
    text.split_whitespace()
        .filter_map(|w| w.strip_prefix('#'))
        .map(|w| {
            let end = w
                .find(|c: char| !(c.is_alphanumeric() || c == '-' || c == '_'))
                .unwrap_or(w.len());
            &w[..end]
        })
        .filter(|t| !t.is_empty())
        .map(normalize_tag)
}

/// Parses a zettel and collects its words, URLs, references and content tags.
pub fn collect_zettel_index(zettel: &Zettel) -> ZettelIndex {
    let mut entry = ZettelIndex {
        zid: zettel.zid(),
        ..ZettelIndex::default()
    };
    for (key, value) in zettel.meta.pairs() {
        if is_internal(key) {
            continue;
        }
        match key_type(key) {
            KeyType::Id | KeyType::IdSet => entry
                .refs
                .extend(value.split_whitespace().filter_map(|v| Zid::parse(v).ok())),
            KeyType::Url => {
                entry.urls.insert(value.to_string());
            }
            KeyType::TagSet => entry.words.extend(
                value
                    .split_whitespace()
                    .flat_map(|t| split_words(clean_tag(t))),
            ),
            KeyType::String | KeyType::Word | KeyType::WordSet | KeyType::Zettelmarkup => {
                entry.words.extend(split_words(value))
            }
            _ => {}
        }
    }
    let parsed = parse_zettel(zettel, "", None);
    walk_blocks(&mut Collector { entry: &mut entry }, &parsed.ast);
    tracing::debug!(
        "[collect_zettel_index] {}: {} words, {} refs, {} urls",
        entry.zid,
        entry.words.len(),
        entry.refs.len(),
        entry.urls.len()
    );
    entry
}

/// Adds the derived keys to metadata read from box number `box_number`.
pub fn enrich_meta(meta: &mut Meta, box_number: usize, index: &Index) {
    let zid = meta.zid();
    meta.set(KEY_BOX_NUMBER, &box_number.to_string());
    if meta.get(KEY_PUBLISHED).is_none() {
        let published = meta
            .get(KEY_MODIFIED)
            .or_else(|| meta.get(KEY_CREATED))
            .filter(|v| is_timestamp(v))
            .map(str::to_string)
            .or_else(|| zid.timestamp().map(|_| zid.to_string()));
        if let Some(published) = published {
            meta.set(KEY_PUBLISHED, &published);
        }
    }
    let join = |zids: BTreeSet<Zid>| {
        zids.iter()
            .map(Zid::to_string)
            .collect::<Vec<_>>()
            .join(" ")
    };
    meta.set_non_empty(KEY_BACK_REF, &join(index.back_refs(zid)));
    let Some(entry) = index.get(zid) else {
        return;
    };
    meta.set_non_empty(KEY_FWD_REF, &join(index.forward_refs(zid)));
    let content_tags: Vec<&str> = entry.content_tags.iter().map(String::as_str).collect();
    meta.set_non_empty(KEY_CONTENT_TAGS, &content_tags.join(" "));
    let mut all_tags: BTreeSet<String> = meta
        .get_tags(KEY_TAGS)
        .iter()
        .map(|t| normalize_tag(t))
        .collect();
    all_tags.extend(entry.content_tags.iter().cloned());
    let all_tags: Vec<String> = all_tags.into_iter().collect();
    meta.set_non_empty(KEY_ALL_TAGS, &all_tags.join(" "));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{query::normalize_word, tests::helpers::create_test_zettel};
    use pretty_assertions::assert_eq;

    #[test]
    fn collects_words_refs_and_tags() {
        let mut zettel = create_test_zettel(
            20_240_101_000_001,
            "Apple notes",
            "zmk",
            "See [[other|20240101000002]] and [[web|https://example.org/]] #fruit #Tree.",
        );
        zettel.meta.set("folge", "20240101000003");
        let entry = collect_zettel_index(&zettel);
        assert!(entry.words.contains(&normalize_word("apple")));
        assert!(entry.words.contains(&normalize_word("see")));
        assert_eq!(
            entry.refs,
            [
                Zid::parse("20240101000002").unwrap(),
                Zid::parse("20240101000003").unwrap()
            ]
            .into()
        );
        assert!(entry.urls.contains("https://example.org/"));
        assert_eq!(
            entry.content_tags,
            ["#fruit".to_string(), "#tree".to_string()].into()
        );
    }

    #[test]
    fn enrichment_derives_keys() {
        let a = create_test_zettel(20_240_101_000_001, "A", "zmk", "[[b|20240101000002]] #x");
        let mut b = create_test_zettel(20_240_101_000_002, "B", "zmk", "plain");
        b.meta.set("tags", "#y");
        let mut index = Index::default();
        index.update(collect_zettel_index(&a));
        index.update(collect_zettel_index(&b));

        let mut meta = a.meta.clone();
        enrich_meta(&mut meta, 1, &index);
        assert_eq!(meta.get(KEY_FWD_REF), Some("20240101000002"));
        assert_eq!(meta.get(KEY_CONTENT_TAGS), Some("#x"));
        assert_eq!(meta.get(KEY_ALL_TAGS), Some("#x"));
        assert_eq!(meta.get(KEY_BOX_NUMBER), Some("1"));
        assert_eq!(meta.get(KEY_PUBLISHED), Some("20240101000001"));

        let mut meta = b.meta.clone();
        enrich_meta(&mut meta, 2, &index);
        assert_eq!(meta.get(KEY_BACK_REF), Some("20240101000001"));
        assert_eq!(meta.get(KEY_ALL_TAGS), Some("#y"));
        assert_eq!(meta.get(KEY_FWD_REF), None);
    }
}

//! Query actions: turn the metadata selected by a query into a block node.
use std::collections::BTreeMap;

use chrono::NaiveDateTime;

use crate::{
    ast::{
        Attributes, BlockNode, BlockSlice, FormatKind, InlineNode, InlineSlice, ListKind,
        RefState, Reference, VerbatimKind,
    },
    encoder::html::escape_attr,
    id::Zid,
    meta::{
        key_type,
        keys::{KEY_MODIFIED, KEY_PUBLISHED, KEY_SUMMARY},
        KeyType, Meta,
    },
    parser::parse_title,
    query::Query,
};

pub const ACTION_ORDERED: &str = "N";
pub const ACTION_MIN: &str = "MIN";
pub const ACTION_MAX: &str = "MAX";
pub const ACTION_TITLE: &str = "TITLE";
pub const ACTION_REINDEX: &str = "REINDEX";
pub const ACTION_KEYS: &str = "KEYS";
pub const ACTION_ATOM: &str = "ATOM";
pub const ACTION_RSS: &str = "RSS";

/// Number of font-size classes of a tag cloud.
pub const FONT_SIZES: usize = 6;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Output {
    Keys,
    Atom,
    Rss,
}

#[derive(Debug, Default)]
struct ActionPlan {
    list_kind: Option<ListKind>,
    min: Option<usize>,
    max: Option<usize>,
    title: Vec<String>,
    output: Option<Output>,
    key: Option<(String, KeyType)>,
}

impl ActionPlan {
    fn parse(actions: &[String]) -> ActionPlan {
        let mut plan = ActionPlan::default();
        let mut words = actions.iter();
        while let Some(word) = words.next() {
            match word.as_str() {
                ACTION_ORDERED => plan.list_kind = Some(ListKind::Ordered),
                ACTION_KEYS => plan.output = plan.output.or(Some(Output::Keys)),
                ACTION_ATOM => plan.output = Some(Output::Atom),
                ACTION_RSS => plan.output = Some(Output::Rss),
                ACTION_REINDEX => {}
                ACTION_TITLE => {
                    plan.title = words.by_ref().cloned().collect();
                }
                w if w.starts_with(ACTION_MIN) && w[ACTION_MIN.len()..].parse::<usize>().is_ok() => {
                    plan.min = w[ACTION_MIN.len()..].parse().ok();
                }
                w if w.starts_with(ACTION_MAX) && w[ACTION_MAX.len()..].parse::<usize>().is_ok() => {
                    plan.max = w[ACTION_MAX.len()..].parse().ok();
                }
                w if plan.key.is_none() && w.chars().all(|c| !c.is_ascii_uppercase()) => {
                    let kt = key_type(w);
                    if matches!(kt, KeyType::Word | KeyType::WordSet | KeyType::TagSet) {
                        plan.key = Some((w.to_string(), kt));
                    }
                }
                w => tracing::debug!("[query_action] Ignoring unknown action {w:?}"),
            }
        }
        plan
    }

    fn in_range(&self, count: usize) -> bool {
        self.min.map_or(true, |min| count >= min) && self.max.map_or(true, |max| count <= max)
    }
}

/// Renders the metadata list selected by `query` according to its actions. Returns `None` if
/// there is nothing to show.
pub fn query_action(query: &Query, metas: &[Meta], site_name: &str) -> Option<BlockNode> {
    let plan = ActionPlan::parse(&query.actions);
    match plan.output {
        Some(Output::Atom) => return Some(feed_block(atom_feed(&plan, metas, site_name))),
        Some(Output::Rss) => return Some(feed_block(rss_feed(&plan, metas, site_name))),
        _ => {}
    }
    if metas.is_empty() {
        return None;
    }
    if let Some((key, kt)) = &plan.key {
        return match kt {
            KeyType::TagSet => tag_cloud(&plan, key, metas),
            _ => word_list(&plan, key, *kt == KeyType::WordSet, metas),
        };
    }
    if plan.output == Some(Output::Keys) {
        return key_list(&plan, metas);
    }
    Some(link_list(plan.list_kind.unwrap_or(ListKind::Unordered), metas))
}

fn query_link(query: String, label: InlineSlice) -> InlineNode {
    InlineNode::Link {
        attrs: Attributes::new(),
        reference: Reference::new(query, RefState::Query),
        inlines: label,
    }
}

fn count_super(count: usize) -> InlineNode {
    InlineNode::Format {
        kind: FormatKind::Super,
        attrs: Attributes::new(),
        inlines: vec![InlineNode::Text(count.to_string())],
    }
}

fn zettel_link(meta: &Meta) -> InlineNode {
    let mut label = parse_title(meta);
    if label.is_empty() {
        label.push(InlineNode::Text(meta.zid().to_string()));
    }
    InlineNode::Link {
        attrs: Attributes::new(),
        reference: Reference::new(meta.zid().to_string(), RefState::Zettel),
        inlines: label,
    }
}

fn link_list(kind: ListKind, metas: &[Meta]) -> BlockNode {
    BlockNode::List {
        kind,
        items: metas
            .iter()
            .map(|meta| vec![BlockNode::Para(vec![zettel_link(meta)])])
            .collect(),
    }
}

/// Values of a word or word-set key and the zettel carrying them.
fn word_list(plan: &ActionPlan, key: &str, is_set: bool, metas: &[Meta]) -> Option<BlockNode> {
    let mut groups: BTreeMap<String, Vec<&Meta>> = BTreeMap::new();
    for meta in metas {
        let Some(value) = meta.get(key) else { continue };
        if is_set {
            for word in value.split_whitespace() {
                groups.entry(word.to_string()).or_default().push(meta);
            }
        } else if !value.is_empty() {
            groups.entry(value.to_string()).or_default().push(meta);
        }
    }
    let items: Vec<BlockSlice> = groups
        .into_iter()
        .filter(|(_, group)| plan.in_range(group.len()))
        .map(|(value, group)| {
            vec![
                BlockNode::Para(vec![
                    query_link(format!("{key}:{value}"), vec![InlineNode::Text(value)]),
                    InlineNode::space(),
                    count_super(group.len()),
                ]),
                BlockNode::List {
                    kind: ListKind::Unordered,
                    items: group
                        .into_iter()
                        .map(|meta| vec![BlockNode::Para(vec![zettel_link(meta)])])
                        .collect(),
                },
            ]
        })
        .collect();
    if items.is_empty() {
        return None;
    }
    Some(BlockNode::List {
        kind: plan.list_kind.unwrap_or(ListKind::Unordered),
        items,
    })
}

fn key_list(plan: &ActionPlan, metas: &[Meta]) -> Option<BlockNode> {
    let mut counts: BTreeMap<String, usize> = BTreeMap::new();
    for meta in metas {
        for (key, _) in meta.computed_pairs() {
            *counts.entry(key).or_default() += 1;
        }
    }
    let items: Vec<BlockSlice> = counts
        .into_iter()
        .filter(|(_, count)| plan.in_range(*count))
        .map(|(key, count)| {
            vec![BlockNode::Para(vec![
                query_link(format!("{key}?"), vec![InlineNode::Text(key)]),
                InlineNode::space(),
                count_super(count),
            ])]
        })
        .collect();
    if items.is_empty() {
        return None;
    }
    Some(BlockNode::List {
        kind: plan.list_kind.unwrap_or(ListKind::Unordered),
        items,
    })
}

fn tag_cloud(plan: &ActionPlan, key: &str, metas: &[Meta]) -> Option<BlockNode> {
    let mut counts: BTreeMap<String, usize> = BTreeMap::new();
    for meta in metas {
        for tag in meta.get_tags(key) {
            *counts.entry(tag).or_default() += 1;
        }
    }
    counts.retain(|_, count| plan.in_range(*count));
    if counts.is_empty() {
        return None;
    }
    let sizes = font_sizes(&counts.values().copied().collect::<Vec<_>>());
    let mut inlines = InlineSlice::new();
    for (tag, count) in counts {
        if !inlines.is_empty() {
            inlines.push(InlineNode::space());
        }
        let mut attrs = Attributes::new();
        attrs.add_class(&format!("zs-font-size-{}", sizes.get(&count).copied().unwrap_or(0)));
        inlines.push(InlineNode::Link {
            attrs,
            inlines: vec![InlineNode::Text(format!("#{tag}"))],
            reference: Reference::new(format!("{key}:{tag}"), RefState::Query),
        });
        inlines.push(count_super(count));
    }
    Some(BlockNode::Para(inlines))
}

/// Maps every tag count to one of [`FONT_SIZES`] buckets.
///
/// Fewer distinct counts than buckets are centered. Otherwise the counts are walked in ascending
/// order and a bucket is closed once it holds its share of the remaining tags.
pub fn font_sizes(counts: &[usize]) -> BTreeMap<usize, usize> {
    let mut occurrences: BTreeMap<usize, usize> = BTreeMap::new();
    for count in counts {
        *occurrences.entry(*count).or_default() += 1;
    }
    let mut result = BTreeMap::new();
    if occurrences.len() <= FONT_SIZES {
        let mut size = (FONT_SIZES - occurrences.len()) / 2;
        for count in occurrences.keys() {
            result.insert(*count, size);
            size += 1;
        }
        return result;
    }
    let mut remaining = counts.len();
    let mut size = 0;
    let budget = |remaining: usize, size: usize| {
        (remaining as f64 / (FONT_SIZES - size) as f64).round() as usize
    };
    let mut share = budget(remaining, size);
    let mut used = 0;
    for (count, n) in occurrences {
        result.insert(count, size);
        used += n;
        remaining -= n;
        if used >= share && size < FONT_SIZES - 1 {
            size += 1;
            share = budget(remaining, size);
            used = 0;
        }
    }
    result
}

fn feed_block(content: String) -> BlockNode {
    BlockNode::Verbatim {
        kind: VerbatimKind::Program,
        attrs: Attributes::new().with("", "xml"),
        content,
    }
}

fn escaped(s: &str) -> String {
    let mut out = String::new();
    escape_attr(s, &mut out);
    out
}

fn feed_title(plan: &ActionPlan, site_name: &str) -> String {
    if plan.title.is_empty() {
        site_name.to_string()
    } else {
        plan.title.join(" ")
    }
}

/// Publication time: the `published` key, then `modified`, then the zid itself.
fn published(meta: &Meta) -> Option<NaiveDateTime> {
    [KEY_PUBLISHED, KEY_MODIFIED]
        .iter()
        .filter_map(|key| meta.get(key))
        .find_map(|value| Zid::parse(value).ok()?.timestamp())
        .or_else(|| meta.zid().timestamp())
}

fn rss_feed(plan: &ActionPlan, metas: &[Meta], site_name: &str) -> String {
    let mut out = String::from("<?xml version=\"1.0\" encoding=\"utf-8\"?>\n");
    out.push_str("<rss version=\"2.0\">\n<channel>\n");
    out.push_str(&format!("<title>{}</title>\n", escaped(&feed_title(plan, site_name))));
    for meta in metas {
        out.push_str("<item>\n");
        out.push_str(&format!(
            "<title>{}</title>\n",
            escaped(meta.title().unwrap_or_default())
        ));
        if let Some(summary) = meta.get(KEY_SUMMARY) {
            out.push_str(&format!("<description>{}</description>\n", escaped(summary)));
        }
        out.push_str(&format!("<guid isPermaLink=\"false\">{}</guid>\n", meta.zid()));
        if let Some(ts) = published(meta) {
            out.push_str(&format!(
                "<pubDate>{}</pubDate>\n",
                ts.format("%a, %d %b %Y %H:%M:%S +0000")
            ));
        }
        out.push_str("</item>\n");
    }
    out.push_str("</channel>\n</rss>");
    out
}

fn atom_feed(plan: &ActionPlan, metas: &[Meta], site_name: &str) -> String {
    let rfc3339 = "%Y-%m-%dT%H:%M:%SZ";
    let mut out = String::from("<?xml version=\"1.0\" encoding=\"utf-8\"?>\n");
    out.push_str("<feed xmlns=\"http://www.w3.org/2005/Atom\">\n");
    out.push_str(&format!("<title>{}</title>\n", escaped(&feed_title(plan, site_name))));
    if let Some(ts) = metas.iter().filter_map(published).max() {
        out.push_str(&format!("<updated>{}</updated>\n", ts.format(rfc3339)));
    }
    for meta in metas {
        out.push_str("<entry>\n");
        out.push_str(&format!(
            "<title>{}</title>\n",
            escaped(meta.title().unwrap_or_default())
        ));
        out.push_str(&format!("<id>{}</id>\n", meta.zid()));
        if let Some(ts) = published(meta) {
            out.push_str(&format!("<updated>{}</updated>\n", ts.format(rfc3339)));
        }
        if let Some(summary) = meta.get(KEY_SUMMARY) {
            out.push_str(&format!("<summary>{}</summary>\n", escaped(summary)));
        }
        out.push_str("</entry>\n");
    }
    out.push_str("</feed>");
    out
}

//! Inverted indexes maintained by the index worker, and the queue feeding it.
use petgraph::{graphmap::DiGraphMap, Direction};
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet, VecDeque};

use crate::{id::Zid, query::WordIndex};

/// What indexing extracted from one zettel.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ZettelIndex {
    pub zid: Zid,
    pub words: BTreeSet<String>,
    pub urls: BTreeSet<String>,
    pub refs: BTreeSet<Zid>,
    pub content_tags: BTreeSet<String>,
}

#[derive(Debug, Default)]
pub struct Index {
    words: BTreeMap<String, BTreeSet<Zid>>,
    urls: BTreeMap<String, BTreeSet<Zid>>,
    /// Forward references; an edge `a -> b` means `a` references `b`.
    refs: DiGraphMap<Zid, ()>,
    zettel: HashMap<Zid, ZettelIndex>,
}

impl Index {
    pub fn update(&mut self, entry: ZettelIndex) {
        let zid = entry.zid;
        self.remove(zid);
        for word in entry.words.iter() {
            self.words.entry(word.clone()).or_default().insert(zid);
        }
        for url in entry.urls.iter() {
            self.urls.entry(url.clone()).or_default().insert(zid);
        }
        self.refs.add_node(zid);
        for target in entry.refs.iter().filter(|t| **t != zid) {
            self.refs.add_edge(zid, *target, ());
        }
        self.zettel.insert(zid, entry);
    }

    /// Forgets what `zid` contributed. References other zettel make to it stay.
    pub fn remove(&mut self, zid: Zid) {
        let Some(old) = self.zettel.remove(&zid) else {
            return;
        };
        for word in old.words.iter() {
            remove_from(&mut self.words, word, zid);
        }
        for url in old.urls.iter() {
            remove_from(&mut self.urls, url, zid);
        }
        let targets: Vec<Zid> = self
            .refs
            .neighbors_directed(zid, Direction::Outgoing)
            .collect();
        for target in targets {
            self.refs.remove_edge(zid, target);
            self.prune_node(target);
        }
        self.prune_node(zid);
    }

    /// Drops a node nobody references and that is not indexed itself.
    fn prune_node(&mut self, zid: Zid) {
        let referenced = self
            .refs
            .neighbors_directed(zid, Direction::Incoming)
            .next()
            .is_some();
        if !referenced && !self.zettel.contains_key(&zid) {
            self.refs.remove_node(zid);
        }
    }

    pub fn clear(&mut self) {
        *self = Index::default();
    }

    pub fn get(&self, zid: Zid) -> Option<&ZettelIndex> {
        self.zettel.get(&zid)
    }

    pub fn contains(&self, zid: Zid) -> bool {
        self.zettel.contains_key(&zid)
    }

    pub fn forward_refs(&self, zid: Zid) -> BTreeSet<Zid> {
        if !self.refs.contains_node(zid) {
            return BTreeSet::new();
        }
        self.refs
            .neighbors_directed(zid, Direction::Outgoing)
            .collect()
    }

    /// Zettel referencing `zid`.
    pub fn back_refs(&self, zid: Zid) -> BTreeSet<Zid> {
        if !self.refs.contains_node(zid) {
            return BTreeSet::new();
        }
        self.refs
            .neighbors_directed(zid, Direction::Incoming)
            .collect()
    }

    pub fn search_url(&self, url: &str) -> BTreeSet<Zid> {
        self.urls.get(url).cloned().unwrap_or_default()
    }

    pub fn word_count(&self) -> usize {
        self.words.len()
    }

    pub fn url_count(&self) -> usize {
        self.urls.len()
    }

    pub fn zettel_count(&self) -> usize {
        self.zettel.len()
    }
}

fn remove_from(map: &mut BTreeMap<String, BTreeSet<Zid>>, key: &str, zid: Zid) {
    if let Some(zids) = map.get_mut(key) {
        zids.remove(&zid);
        if zids.is_empty() {
            map.remove(key);
        }
    }
}

impl WordIndex for Index {
    fn search_word(&self, word: &str) -> BTreeSet<Zid> {
        self.words
            .range(word.to_string()..)
            .take_while(|(w, _)| w.starts_with(word))
            .flat_map(|(_, zids)| zids.iter().copied())
            .collect()
    }
}

/// Bounded FIFO of zettel waiting to be indexed.
///
/// A zettel already waiting is not queued twice. When the queue is full the oldest entry is
/// dropped and counted. A reload backlog is kept apart: it is never truncated and is worked
/// off after the individual updates.
#[derive(Debug)]
pub struct IndexQueue {
    capacity: usize,
    items: VecDeque<Zid>,
    backlog: VecDeque<Zid>,
    pending: HashSet<Zid>,
    dropped: u64,
    /// The worker took an entry and has not reported back yet.
    busy: bool,
}

impl IndexQueue {
    pub fn new(capacity: usize) -> IndexQueue {
        IndexQueue {
            capacity: capacity.max(1),
            items: VecDeque::new(),
            backlog: VecDeque::new(),
            pending: HashSet::new(),
            dropped: 0,
            busy: false,
        }
    }

    /// Queues `zid`. Returns false if it was coalesced with a waiting entry.
    pub fn push(&mut self, zid: Zid) -> bool {
        self.busy = true;
        if !self.pending.insert(zid) {
            return false;
        }
        if self.items.len() >= self.capacity {
            if let Some(oldest) = self.items.pop_front() {
                self.pending.remove(&oldest);
                self.dropped += 1;
                tracing::warn!("[IndexQueue] Queue full, dropping {oldest}");
            }
        }
        self.items.push_back(zid);
        true
    }

    /// Replaces everything waiting with `zids`, regardless of the capacity.
    pub fn reload(&mut self, zids: impl IntoIterator<Item = Zid>) {
        self.clear();
        self.busy = true;
        for zid in zids {
            if self.pending.insert(zid) {
                self.backlog.push_back(zid);
            }
        }
    }

    pub fn pop(&mut self) -> Option<Zid> {
        let zid = self
            .items
            .pop_front()
            .or_else(|| self.backlog.pop_front())?;
        self.pending.remove(&zid);
        Some(zid)
    }

    /// Called by the worker when it finds the queue empty. Returns true if it is now idle.
    pub fn finish(&mut self) -> bool {
        if self.is_empty() {
            self.busy = false;
        }
        !self.busy
    }

    pub fn is_idle(&self) -> bool {
        self.is_empty() && !self.busy
    }

    pub fn clear(&mut self) {
        self.items.clear();
        self.backlog.clear();
        self.pending.clear();
    }

    pub fn len(&self) -> usize {
        self.items.len() + self.backlog.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty() && self.backlog.is_empty()
    }

    pub fn dropped(&self) -> u64 {
        self.dropped
    }
}

//! The box manager: one logical zettel store composed of an ordered list of boxes.
//!
//! Reads try the boxes in order and return the first hit, so earlier boxes shadow later ones.
//! Writes go to the first writable box. After the configured boxes the manager always appends
//! the bundled [`ConstBox`] and the [`CompBox`].
//!
//! A single index worker task consumes a bounded queue of identifiers published by the boxes'
//! update events. For each it parses the zettel, updates the word and URL indexes and the
//! reference graph. Enriched metadata keys are derived from these indexes on every read.
use chrono::Local;
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::{
    collections::{BTreeMap, BTreeSet},
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, Weak,
    },
    time::{Duration, Instant},
};
use tokio::{sync::Notify, task::JoinHandle};

use super::{
    compbox::{CompBox, RowsFn},
    connect,
    constbox::ConstBox,
    BoxStats, Observers, UpdateFn, UpdateInfo, UpdateReason, ZettelBox,
};
use crate::{
    config::{Config, RuntimeConfig},
    context::Context,
    error::ZettelError,
    eval::Port,
    id::Zid,
    meta::{
        keys::{describe, KeyUsage, KEY_CREATED, KEY_MODIFIED},
        Meta,
    },
    query::{Query, WordIndex},
    zettel::Zettel,
};

pub mod enrich;
pub mod index;

use enrich::{collect_zettel_index, enrich_meta};
use index::{Index, IndexQueue};

const TIMESTAMP_FORMAT: &str = "%Y%m%d%H%M%S";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct ManagerStats {
    pub read_only: bool,
    pub started: bool,
    /// Zettel over all boxes, shadowed copies included.
    pub zettel: usize,
    pub boxes: Vec<BoxStats>,
    pub last_reload: Option<String>,
    pub dur_last_reload_ms: u64,
    pub indexes_since_reload: u64,
    pub index_updates: u64,
    pub queue_len: usize,
    pub dropped: u64,
    pub indexed_zettel: usize,
    pub words: usize,
    pub urls: usize,
}

impl ManagerStats {
    /// Key/value rows, as shown by the box manager zettel.
    pub fn rows(&self) -> Vec<(String, String)> {
        let mut rows = vec![
            ("read-only".to_string(), self.read_only.to_string()),
            ("started".to_string(), self.started.to_string()),
            ("boxes".to_string(), self.boxes.len().to_string()),
            ("zettel".to_string(), self.zettel.to_string()),
            (
                "last-reload".to_string(),
                self.last_reload.clone().unwrap_or_default(),
            ),
            (
                "duration-last-reload".to_string(),
                format!("{}ms", self.dur_last_reload_ms),
            ),
            (
                "indexes-since-reload".to_string(),
                self.indexes_since_reload.to_string(),
            ),
            ("index-updates".to_string(), self.index_updates.to_string()),
            ("queue".to_string(), self.queue_len.to_string()),
            ("dropped".to_string(), self.dropped.to_string()),
            ("indexed-zettel".to_string(), self.indexed_zettel.to_string()),
            ("words".to_string(), self.words.to_string()),
            ("urls".to_string(), self.urls.to_string()),
        ];
        for b in self.boxes.iter() {
            rows.push((
                format!("box {}", b.location),
                format!(
                    "{} zettel{}",
                    b.zettel,
                    if b.read_only { ", read-only" } else { "" }
                ),
            ));
        }
        rows
    }
}

#[derive(Debug, Default)]
struct IndexStats {
    last_reload: Option<String>,
    dur_last_reload: Duration,
    indexes_since_reload: u64,
    index_updates: u64,
}

struct ManagerState {
    boxes: Vec<Arc<dyn ZettelBox>>,
    rtc: Arc<dyn RuntimeConfig>,
    read_only: bool,
    started: AtomicBool,
    observers: Observers,
    queue: Mutex<IndexQueue>,
    /// Wakes the index worker.
    work: Arc<Notify>,
    /// Signalled whenever the worker drains the queue.
    idle: Notify,
    index: RwLock<Index>,
    stats: Mutex<IndexStats>,
}

impl ManagerState {
    fn handle_update(&self, info: &UpdateInfo) {
        match info.reason {
            UpdateReason::OnReady => {
                tracing::debug!("[Manager] Box {} is ready", info.box_number);
                return;
            }
            UpdateReason::OnZettel | UpdateReason::OnDelete => self.enqueue(info.zid),
            UpdateReason::OnReload => self.reload(),
        }
        self.observers.notify(*info);
    }

    fn enqueue(&self, zid: Zid) {
        if !zid.is_valid() {
            return;
        }
        self.queue.lock().push(zid);
        self.work.notify_one();
    }

    /// Clears the indexes and queues every zettel of every box.
    fn reload(&self) {
        let ctx = Context::background();
        let mut zids = BTreeSet::new();
        for b in self.boxes.iter() {
            match b.fetch_zids(&ctx) {
                Ok(found) => zids.extend(found),
                Err(e) => tracing::warn!("[Manager::reload] Box {} failed: {e}", b.number()),
            }
        }
        self.index.write().clear();
        self.stats.lock().indexes_since_reload = 0;
        self.queue.lock().reload(zids.iter().copied());
        tracing::info!("[Manager::reload] Queued {} zettel for indexing", zids.len());
        self.work.notify_one();
    }

    /// The first copy of a zettel, together with the number of the box holding it.
    fn get_raw(&self, ctx: &Context, zid: Zid) -> Result<(usize, Zettel), ZettelError> {
        ctx.check()?;
        for b in self.boxes.iter() {
            match b.get_zettel(ctx, zid) {
                Ok(zettel) => return Ok((b.number(), zettel)),
                Err(ZettelError::NotFound(_)) => continue,
                Err(e) => return Err(e),
            }
        }
        Err(ZettelError::NotFound(zid))
    }

    /// Like [`ManagerState::get_raw`], but for the metadata only.
    fn get_raw_meta(&self, ctx: &Context, zid: Zid) -> Result<(usize, Meta), ZettelError> {
        ctx.check()?;
        for b in self.boxes.iter() {
            match b.get_meta(ctx, zid) {
                Ok(meta) => return Ok((b.number(), meta)),
                Err(ZettelError::NotFound(_)) => continue,
                Err(e) => return Err(e),
            }
        }
        Err(ZettelError::NotFound(zid))
    }

    fn index_zettel(&self, zid: Zid) {
        let ctx = Context::background();
        match self.get_raw(&ctx, zid) {
            Ok((_, zettel)) => {
                let entry = collect_zettel_index(&zettel);
                self.index.write().update(entry);
            }
            Err(ZettelError::NotFound(_)) => self.index.write().remove(zid),
            Err(e) => tracing::error!("[IndexWorker] Unable to index {zid}: {e}"),
        }
        let mut stats = self.stats.lock();
        stats.indexes_since_reload += 1;
        stats.index_updates += 1;
    }

    /// Reports an empty queue. Returns false if new work arrived meanwhile.
    fn finish_round(&self, round: Instant) -> bool {
        if !self.queue.lock().finish() {
            return false;
        }
        {
            let mut stats = self.stats.lock();
            stats.last_reload = Some(Local::now().naive_local().format("%Y-%m-%d %H:%M:%S").to_string());
            stats.dur_last_reload = round.elapsed();
            tracing::info!(
                "[IndexWorker] Queue drained after {:?}, {} indexed since reload",
                stats.dur_last_reload,
                stats.indexes_since_reload
            );
        }
        self.idle.notify_waiters();
        true
    }

    fn enrich(&self, meta: &mut Meta, box_number: usize) {
        enrich_meta(meta, box_number, &self.index.read());
    }

    fn stats(&self) -> ManagerStats {
        let boxes: Vec<BoxStats> = self
            .boxes
            .iter()
            .map(|b| {
                let mut stats = BoxStats::default();
                b.read_stats(&mut stats);
                stats
            })
            .collect();
        let (queue_len, dropped) = {
            let queue = self.queue.lock();
            (queue.len(), queue.dropped())
        };
        let (indexed_zettel, words, urls) = {
            let index = self.index.read();
            (index.zettel_count(), index.word_count(), index.url_count())
        };
        let stats = self.stats.lock();
        ManagerStats {
            read_only: self.read_only,
            started: self.started.load(Ordering::SeqCst),
            zettel: boxes.iter().map(|b| b.zettel).sum(),
            boxes,
            last_reload: stats.last_reload.clone(),
            dur_last_reload_ms: stats.dur_last_reload.as_millis() as u64,
            indexes_since_reload: stats.indexes_since_reload,
            index_updates: stats.index_updates,
            queue_len,
            dropped,
            indexed_zettel,
            words,
            urls,
        }
    }
}

fn spawn_worker(state: &Arc<ManagerState>, runtime: &tokio::runtime::Handle) -> JoinHandle<()> {
    let weak = Arc::downgrade(state);
    let notifier = state.work.clone();
    runtime.spawn(async move {
        tracing::info!("[IndexWorker] Starting index worker");
        loop {
            notifier.notified().await;
            let round = Instant::now();
            loop {
                let done = {
                    let Some(state) = weak.upgrade() else {
                        tracing::info!("[IndexWorker] Manager dropped, stopping");
                        return;
                    };
                    let next = state.queue.lock().pop();
                    match next {
                        Some(zid) => {
                            tracing::debug!("[IndexWorker] Indexing {zid}");
                            state.index_zettel(zid);
                            false
                        }
                        None => state.finish_round(round),
                    }
                };
                if done {
                    break;
                }
                tokio::task::yield_now().await;
            }
        }
    })
}

/// Removes keys that are derived on every read.
fn strip_enriched(meta: &mut Meta) {
    let enriched: Vec<String> = meta
        .pairs()
        .into_iter()
        .map(|(k, _)| k)
        .filter(|k| {
            describe(k)
                .map(|d| d.usage.contains(KeyUsage::Enriched))
                .unwrap_or(false)
        })
        .map(str::to_string)
        .collect();
    for key in enriched {
        meta.delete(&key);
    }
}

fn now_timestamp() -> String {
    Local::now().naive_local().format(TIMESTAMP_FORMAT).to_string()
}

pub struct Manager {
    state: Arc<ManagerState>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl std::fmt::Debug for Manager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Manager")
            .field("boxes", &self.state.boxes.len())
            .field("started", &self.is_started())
            .finish()
    }
}

impl Manager {
    /// Connects the boxes named by `config.box_uri`.
    pub fn new(config: &Config) -> Result<Manager, ZettelError> {
        let boxes = config
            .box_uri
            .iter()
            .enumerate()
            .map(|(i, uri)| connect(uri, i + 1))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Manager::with_boxes(boxes, config))
    }

    /// Composes already constructed boxes. They keep their numbers; the bundled boxes follow.
    pub fn with_boxes(mut boxes: Vec<Arc<dyn ZettelBox>>, config: &Config) -> Manager {
        let config_rows = config.describe();
        let rtc: Arc<dyn RuntimeConfig> = Arc::new(config.clone());
        let read_only = config.read_only;
        let capacity = config.index_queue_capacity;
        let state = Arc::new_cyclic(|weak: &Weak<ManagerState>| {
            let n = boxes.len();
            boxes.push(Arc::new(ConstBox::new(n + 1)));
            let source = weak.clone();
            let stats_rows: RowsFn = Arc::new(move || {
                source
                    .upgrade()
                    .map(|state| state.stats().rows())
                    .unwrap_or_default()
            });
            let config_rows: RowsFn = Arc::new(move || config_rows.clone());
            boxes.push(Arc::new(CompBox::new(n + 2, stats_rows, config_rows)));
            ManagerState {
                boxes,
                rtc,
                read_only,
                started: AtomicBool::new(false),
                observers: Observers::default(),
                queue: Mutex::new(IndexQueue::new(capacity)),
                work: Arc::new(Notify::new()),
                idle: Notify::new(),
                index: RwLock::new(Index::default()),
                stats: Mutex::new(IndexStats::default()),
            }
        });
        for b in state.boxes.iter() {
            let weak = Arc::downgrade(&state);
            b.register_observer(Arc::new(move |info: &UpdateInfo| {
                if let Some(state) = weak.upgrade() {
                    state.handle_update(info);
                }
            }));
        }
        Manager {
            state,
            worker: Mutex::new(None),
        }
    }

    pub fn runtime_config(&self) -> Arc<dyn RuntimeConfig> {
        self.state.rtc.clone()
    }

    pub fn is_started(&self) -> bool {
        self.state.started.load(Ordering::SeqCst)
    }

    /// Starts all boxes and the index worker, then indexes every zettel.
    ///
    /// Must be called from within a tokio runtime, which hosts the index worker.
    #[tracing::instrument(skip_all)]
    pub fn start(&self, ctx: &Context) -> Result<(), ZettelError> {
        ctx.check()?;
        if self.is_started() {
            return Ok(());
        }
        let runtime = tokio::runtime::Handle::try_current().map_err(|e| {
            ZettelError::BoxUnavailable(format!("index worker needs a tokio runtime: {e}"))
        })?;
        for (i, b) in self.state.boxes.iter().enumerate() {
            if let Err(e) = b.start(ctx) {
                tracing::error!("[Manager] Box {} failed to start: {e}", b.location());
                for started in self.state.boxes[..i].iter().rev() {
                    started.stop(ctx);
                }
                return Err(e);
            }
        }
        *self.worker.lock() = Some(spawn_worker(&self.state, &runtime));
        self.state.reload();
        self.state.started.store(true, Ordering::SeqCst);
        tracing::info!("[Manager] Started with {} boxes", self.state.boxes.len());
        self.state
            .observers
            .notify(UpdateInfo::new(0, UpdateReason::OnReady, Zid::INVALID));
        Ok(())
    }

    pub fn stop(&self, ctx: &Context) {
        if let Some(worker) = self.worker.lock().take() {
            worker.abort();
        }
        for b in self.state.boxes.iter().rev() {
            b.stop(ctx);
        }
        {
            let mut queue = self.state.queue.lock();
            queue.clear();
            queue.finish();
        }
        self.state.idle.notify_waiters();
        self.state.started.store(false, Ordering::SeqCst);
        tracing::info!("[Manager] Stopped");
    }

    /// Waits until the index worker has drained its queue. Returns at once if not started.
    pub async fn wait_idle(&self) {
        loop {
            let notified = self.state.idle.notified();
            if self.worker.lock().is_none() || self.state.queue.lock().is_idle() {
                return;
            }
            notified.await;
        }
    }

    /// Observers see every change of every box, and `OnReady` with box number 0 once the
    /// manager has started.
    pub fn register_observer(&self, observer: UpdateFn) {
        self.state.observers.register(observer);
    }

    pub fn read_stats(&self) -> ManagerStats {
        self.state.stats()
    }

    /// Queues a zettel for indexing.
    pub fn reindex(&self, zid: Zid) {
        tracing::debug!("[Manager] Reindex {zid} requested");
        self.state.enqueue(zid);
    }

    /// The first copy of a zettel, with enriched metadata.
    pub fn get_zettel(&self, ctx: &Context, zid: Zid) -> Result<Zettel, ZettelError> {
        let (number, mut zettel) = self.state.get_raw(ctx, zid)?;
        self.state.enrich(&mut zettel.meta, number);
        Ok(zettel)
    }

    /// Every box's copy of a zettel, in box order.
    pub fn get_all_zettel(&self, ctx: &Context, zid: Zid) -> Result<Vec<Zettel>, ZettelError> {
        ctx.check()?;
        let mut result = Vec::new();
        for b in self.state.boxes.iter() {
            match b.get_zettel(ctx, zid) {
                Ok(mut zettel) => {
                    self.state.enrich(&mut zettel.meta, b.number());
                    result.push(zettel);
                }
                Err(ZettelError::NotFound(_)) => {}
                Err(e) => return Err(e),
            }
        }
        Ok(result)
    }

    pub fn get_meta(&self, ctx: &Context, zid: Zid) -> Result<Meta, ZettelError> {
        let (number, mut meta) = self.state.get_raw_meta(ctx, zid)?;
        self.state.enrich(&mut meta, number);
        Ok(meta)
    }

    pub fn has_zettel(&self, ctx: &Context, zid: Zid) -> bool {
        self.state.boxes.iter().any(|b| b.has_zettel(ctx, zid))
    }

    pub fn fetch_zids(&self, ctx: &Context) -> Result<BTreeSet<Zid>, ZettelError> {
        let mut zids = BTreeSet::new();
        for b in self.state.boxes.iter() {
            zids.extend(b.fetch_zids(ctx)?);
        }
        Ok(zids)
    }

    /// Enriched metadata of all visible zettel, filtered, sorted and paged by `query`.
    pub fn select_meta(&self, ctx: &Context, query: &Query) -> Result<Vec<Meta>, ZettelError> {
        ctx.check()?;
        let mut metas: BTreeMap<Zid, Meta> = BTreeMap::new();
        for b in self.state.boxes.iter() {
            let mut found = Vec::new();
            b.apply_meta(ctx, &mut |m| found.push(m), &|zid| !metas.contains_key(&zid))?;
            for mut meta in found {
                if !metas.contains_key(&meta.zid()) {
                    self.state.enrich(&mut meta, b.number());
                    metas.insert(meta.zid(), meta);
                }
            }
        }
        let index = self.state.index.read();
        Ok(query.select(metas.into_values().collect(), Some(&*index)))
    }

    /// Zettel mentioning `url` in their content or metadata.
    pub fn search_url(&self, url: &str) -> BTreeSet<Zid> {
        self.state.index.read().search_url(url)
    }

    pub fn can_create_zettel(&self, ctx: &Context) -> bool {
        !self.state.read_only && self.state.boxes.iter().any(|b| b.can_create_zettel(ctx))
    }

    /// Stores a new zettel in the first writable box.
    pub fn create_zettel(&self, ctx: &Context, mut zettel: Zettel) -> Result<Zid, ZettelError> {
        ctx.check()?;
        if self.state.read_only {
            return Err(ZettelError::ReadOnly);
        }
        strip_enriched(&mut zettel.meta);
        if !zettel.meta.has(KEY_CREATED) {
            zettel.meta.set(KEY_CREATED, &now_timestamp());
        }
        let target = self
            .state
            .boxes
            .iter()
            .find(|b| b.can_create_zettel(ctx))
            .ok_or(ZettelError::ReadOnly)?;
        let zid = target.create_zettel(ctx, zettel)?;
        tracing::debug!("[Manager] Created {zid} in box {}", target.number());
        Ok(zid)
    }

    pub fn can_update_zettel(&self, ctx: &Context, zettel: &Zettel) -> bool {
        if self.state.read_only {
            return false;
        }
        match self.holder_position(ctx, zettel.zid()) {
            Some(pos) => self.state.boxes[..=pos]
                .iter()
                .any(|b| b.can_update_zettel(ctx, zettel)),
            None => false,
        }
    }

    fn holder_position(&self, ctx: &Context, zid: Zid) -> Option<usize> {
        self.state.boxes.iter().position(|b| b.has_zettel(ctx, zid))
    }

    /// Updates the box holding the zettel. A zettel of a read-only box is copied into the first
    /// writable box before it, where it shadows the original. A writable box behind the holder
    /// would stay hidden, so the update is refused instead.
    pub fn update_zettel(&self, ctx: &Context, mut zettel: Zettel) -> Result<(), ZettelError> {
        ctx.check()?;
        if self.state.read_only {
            return Err(ZettelError::ReadOnly);
        }
        let zid = zettel.zid();
        let pos = self
            .holder_position(ctx, zid)
            .ok_or(ZettelError::NotFound(zid))?;
        let holder = &self.state.boxes[pos];
        strip_enriched(&mut zettel.meta);
        zettel.meta.set(KEY_MODIFIED, &now_timestamp());
        if holder.can_update_zettel(ctx, &zettel) {
            return holder.update_zettel(ctx, zettel);
        }
        let target = self.state.boxes[..pos]
            .iter()
            .find(|b| b.can_update_zettel(ctx, &zettel))
            .ok_or(ZettelError::ReadOnly)?;
        tracing::debug!(
            "[Manager] {zid} of box {} overlaid in box {}",
            holder.number(),
            target.number()
        );
        target.update_zettel(ctx, zettel)
    }

    pub fn can_rename_zettel(&self, ctx: &Context, zid: Zid) -> bool {
        !self.state.read_only
            && self
                .state
                .boxes
                .iter()
                .find(|b| b.has_zettel(ctx, zid))
                .map(|b| b.can_rename_zettel(ctx, zid))
                .unwrap_or(false)
    }

    pub fn rename_zettel(&self, ctx: &Context, from: Zid, to: Zid) -> Result<(), ZettelError> {
        ctx.check()?;
        if self.state.read_only {
            return Err(ZettelError::ReadOnly);
        }
        if !to.is_valid() || self.has_zettel(ctx, to) {
            return Err(ZettelError::InvalidZid(to.to_string()));
        }
        let holder = self
            .state
            .boxes
            .iter()
            .find(|b| b.has_zettel(ctx, from))
            .ok_or(ZettelError::NotFound(from))?;
        if !holder.can_rename_zettel(ctx, from) {
            return Err(ZettelError::ReadOnly);
        }
        holder.rename_zettel(ctx, from, to)
    }

    pub fn can_delete_zettel(&self, ctx: &Context, zid: Zid) -> bool {
        !self.state.read_only
            && self
                .state
                .boxes
                .iter()
                .find(|b| b.has_zettel(ctx, zid))
                .map(|b| b.can_delete_zettel(ctx, zid))
                .unwrap_or(false)
    }

    /// Deletes the first copy of a zettel. A shadowed copy in a later box becomes visible.
    pub fn delete_zettel(&self, ctx: &Context, zid: Zid) -> Result<(), ZettelError> {
        ctx.check()?;
        if self.state.read_only {
            return Err(ZettelError::ReadOnly);
        }
        let holder = self
            .state
            .boxes
            .iter()
            .find(|b| b.has_zettel(ctx, zid))
            .ok_or(ZettelError::NotFound(zid))?;
        if !holder.can_delete_zettel(ctx, zid) {
            return Err(ZettelError::ReadOnly);
        }
        holder.delete_zettel(ctx, zid)
    }
}

impl Drop for Manager {
    fn drop(&mut self) {
        if let Some(worker) = self.worker.lock().take() {
            worker.abort();
        }
    }
}

impl Port for Manager {
    fn get_zettel(&self, ctx: &Context, zid: Zid) -> Result<Zettel, ZettelError> {
        Manager::get_zettel(self, ctx, zid)
    }

    fn get_meta(&self, ctx: &Context, zid: Zid) -> Result<Meta, ZettelError> {
        Manager::get_meta(self, ctx, zid)
    }

    fn query_meta(&self, ctx: &Context, query: &Query) -> Result<Vec<Meta>, ZettelError> {
        self.select_meta(ctx, query)
    }

    fn reindex(&self, ctx: &Context, zid: Zid) -> Result<(), ZettelError> {
        ctx.check()?;
        Manager::reindex(self, zid);
        Ok(())
    }
}

impl WordIndex for Manager {
    fn search_word(&self, word: &str) -> BTreeSet<Zid> {
        self.state.index.read().search_word(word)
    }
}

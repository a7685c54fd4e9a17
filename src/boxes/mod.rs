//! Zettel storage backends ("boxes") and the [`manager::Manager`] composing them.
//!
//! Every box implements [`ZettelBox`]. Writable boxes answer the `can_*` queries with `true`;
//! read-only boxes keep the default implementations, which refuse with
//! [`ZettelError::ReadOnly`].
//!
//! Boxes publish [`UpdateInfo`] events to registered observers whenever they detect a change,
//! whether caused by their own writes or by external edits. Observers are called synchronously
//! and must be idempotent: notifications may be duplicated or coalesced.
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::{collections::BTreeSet, sync::Arc};

use crate::{context::Context, error::ZettelError, id::Zid, meta::Meta, zettel::Zettel};

pub mod compbox;
pub mod constbox;
pub mod dir;
pub mod filefmt;
pub mod manager;
pub mod memory;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum UpdateReason {
    /// The box finished starting.
    OnReady,
    /// A zettel was created or changed.
    OnZettel,
    /// A zettel was removed.
    OnDelete,
    /// Everything may have changed; observers should rebuild what they derived.
    OnReload,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateInfo {
    pub box_number: usize,
    pub reason: UpdateReason,
    pub zid: Zid,
}

impl UpdateInfo {
    pub fn new(box_number: usize, reason: UpdateReason, zid: Zid) -> UpdateInfo {
        UpdateInfo {
            box_number,
            reason,
            zid,
        }
    }
}

pub type UpdateFn = Arc<dyn Fn(&UpdateInfo) + Send + Sync>;

/// Copy-on-write observer registry.
///
/// Registration swaps in a new list, so an observer added while events are delivered only sees
/// the next event.
#[derive(Default)]
pub struct Observers(RwLock<Arc<Vec<UpdateFn>>>);

impl Observers {
    pub fn register(&self, observer: UpdateFn) {
        let mut list = self.0.write();
        let mut next = Vec::with_capacity(list.len() + 1);
        next.extend(list.iter().cloned());
        next.push(observer);
        *list = Arc::new(next);
    }

    pub fn notify(&self, info: UpdateInfo) {
        let current = self.0.read().clone();
        tracing::debug!(
            "[Observers::notify] box {} {:?} {} to {} observers",
            info.box_number,
            info.reason,
            info.zid,
            current.len()
        );
        for observer in current.iter() {
            observer(&info);
        }
    }

    pub fn len(&self) -> usize {
        self.0.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl std::fmt::Debug for Observers {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Observers({})", self.len())
    }
}

/// Statistics of a single box.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoxStats {
    pub location: String,
    pub read_only: bool,
    pub zettel: usize,
}

/// A zettel storage backend.
pub trait ZettelBox: Send + Sync {
    /// The URI the box was created from.
    fn location(&self) -> String;

    /// Position of the box inside its manager, starting at 1.
    fn number(&self) -> usize;

    fn get_zettel(&self, ctx: &Context, zid: Zid) -> Result<Zettel, ZettelError>;

    /// Metadata of a zettel. Boxes that can answer without loading the content override this.
    fn get_meta(&self, ctx: &Context, zid: Zid) -> Result<Meta, ZettelError> {
        self.get_zettel(ctx, zid).map(|z| z.meta)
    }

    fn has_zettel(&self, ctx: &Context, zid: Zid) -> bool;

    /// Calls `handler` with the metadata of every zettel whose identifier passes `include`.
    fn apply_meta(
        &self,
        ctx: &Context,
        handler: &mut dyn FnMut(Meta),
        include: &dyn Fn(Zid) -> bool,
    ) -> Result<(), ZettelError>;

    /// Identifiers of all zettel in this box.
    fn fetch_zids(&self, ctx: &Context) -> Result<BTreeSet<Zid>, ZettelError> {
        let mut zids = BTreeSet::new();
        self.apply_meta(ctx, &mut |m| {
            zids.insert(m.zid());
        }, &|_| true)?;
        Ok(zids)
    }

    fn can_create_zettel(&self, _ctx: &Context) -> bool {
        false
    }

    /// Stores a new zettel under a fresh identifier and returns it.
    fn create_zettel(&self, _ctx: &Context, _zettel: Zettel) -> Result<Zid, ZettelError> {
        Err(ZettelError::ReadOnly)
    }

    fn can_update_zettel(&self, _ctx: &Context, _zettel: &Zettel) -> bool {
        false
    }

    fn update_zettel(&self, _ctx: &Context, _zettel: Zettel) -> Result<(), ZettelError> {
        Err(ZettelError::ReadOnly)
    }

    fn can_rename_zettel(&self, _ctx: &Context, _zid: Zid) -> bool {
        false
    }

    fn rename_zettel(&self, _ctx: &Context, _from: Zid, _to: Zid) -> Result<(), ZettelError> {
        Err(ZettelError::ReadOnly)
    }

    fn can_delete_zettel(&self, _ctx: &Context, _zid: Zid) -> bool {
        false
    }

    fn delete_zettel(&self, _ctx: &Context, _zid: Zid) -> Result<(), ZettelError> {
        Err(ZettelError::ReadOnly)
    }

    fn read_stats(&self, stats: &mut BoxStats);

    fn start(&self, _ctx: &Context) -> Result<(), ZettelError> {
        Ok(())
    }

    fn stop(&self, _ctx: &Context) {}

    fn register_observer(&self, _observer: UpdateFn) {}
}

/// Builds a box from its URI: `dir:///path[?readonly]` or `mem:[?max-zettel=n&max-bytes=n]`.
pub fn connect(uri: &str, number: usize) -> Result<Arc<dyn ZettelBox>, ZettelError> {
    let parsed = url::Url::parse(uri)?;
    match parsed.scheme() {
        "dir" => Ok(Arc::new(dir::DirBox::from_url(&parsed, number)?)),
        "mem" => Ok(Arc::new(memory::MemBox::from_url(&parsed, number)?)),
        scheme => Err(ZettelError::Config(format!(
            "Unknown box scheme {scheme:?} in {uri}"
        ))),
    }
}

/// First free timestamp identifier at or after now according to `taken`.
pub(crate) fn new_zid(taken: impl Fn(Zid) -> bool) -> Result<Zid, ZettelError> {
    let mut zid = Zid::now();
    for _ in 0..1024 {
        if zid.is_valid() && !taken(zid) {
            return Ok(zid);
        }
        zid = zid.next();
    }
    Err(ZettelError::BoxUnavailable(
        "no free zettel identifier".to_string(),
    ))
}

/// Reads the value of a boolean or numeric query parameter of a box URI.
pub(crate) fn url_param(url: &url::Url, name: &str) -> Option<String> {
    url.query_pairs()
        .find(|(k, _)| k == name)
        .map(|(_, v)| v.into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn observers_added_during_fanout_wait_for_next_event() {
        let observers = Arc::new(Observers::default());
        let calls = Arc::new(AtomicUsize::new(0));
        let (o, c) = (observers.clone(), calls.clone());
        observers.register(Arc::new(move |_| {
            let c = c.clone();
            c.fetch_add(1, Ordering::SeqCst);
            if o.len() == 1 {
                let c2 = c.clone();
                o.register(Arc::new(move |_| {
                    c2.fetch_add(10, Ordering::SeqCst);
                }));
            }
        }));
        observers.notify(UpdateInfo::new(1, UpdateReason::OnZettel, Zid::VERSION));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        observers.notify(UpdateInfo::new(1, UpdateReason::OnZettel, Zid::VERSION));
        assert_eq!(calls.load(Ordering::SeqCst), 12);
    }

    #[test]
    fn connect_rejects_unknown_scheme() {
        assert!(matches!(
            connect("ftp://example.org/x", 1),
            Err(ZettelError::Config(_))
        ));
        assert!(connect("mem:", 1).is_ok());
    }
}

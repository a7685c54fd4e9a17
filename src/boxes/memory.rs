//! A volatile box keeping all zettel in memory, optionally bounded in count and size.
use parking_lot::RwLock;
use std::collections::BTreeMap;

use super::{new_zid, url_param, BoxStats, Observers, UpdateFn, UpdateInfo, UpdateReason, ZettelBox};
use crate::{context::Context, error::ZettelError, id::Zid, meta::Meta, zettel::Zettel};

pub const DEFAULT_MAX_ZETTEL: usize = 127;
pub const DEFAULT_MAX_BYTES: usize = 65_535;

#[derive(Debug)]
pub struct MemBox {
    location: String,
    number: usize,
    max_zettel: usize,
    max_bytes: usize,
    zettel: RwLock<BTreeMap<Zid, Zettel>>,
    observers: Observers,
}

impl MemBox {
    pub fn new(number: usize) -> MemBox {
        MemBox::with_limits(number, DEFAULT_MAX_ZETTEL, DEFAULT_MAX_BYTES)
    }

    pub fn with_limits(number: usize, max_zettel: usize, max_bytes: usize) -> MemBox {
        MemBox {
            location: format!("mem:?max-zettel={max_zettel}&max-bytes={max_bytes}"),
            number,
            max_zettel,
            max_bytes,
            zettel: RwLock::new(BTreeMap::new()),
            observers: Observers::default(),
        }
    }

    pub fn from_url(url: &url::Url, number: usize) -> Result<MemBox, ZettelError> {
        let limit = |name: &str, default: usize| -> Result<usize, ZettelError> {
            match url_param(url, name) {
                Some(v) => v.parse::<usize>().map_err(|_| {
                    ZettelError::Config(format!("{name} must be a number, got {v:?}"))
                }),
                None => Ok(default),
            }
        };
        Ok(MemBox::with_limits(
            number,
            limit("max-zettel", DEFAULT_MAX_ZETTEL)?,
            limit("max-bytes", DEFAULT_MAX_BYTES)?,
        ))
    }

    fn used_bytes(zettel: &BTreeMap<Zid, Zettel>) -> usize {
        zettel.values().map(Zettel::byte_len).sum()
    }

    /// Would storing `zettel` (replacing `replaced`) stay inside the limits?
    fn fits(&self, stored: &BTreeMap<Zid, Zettel>, zettel: &Zettel, replaced: Option<Zid>) -> bool {
        let (count, freed) = match replaced.and_then(|zid| stored.get(&zid)) {
            Some(old) => (stored.len(), old.byte_len()),
            None => (stored.len() + 1, 0),
        };
        count <= self.max_zettel && Self::used_bytes(stored) - freed + zettel.byte_len() <= self.max_bytes
    }

    fn notify(&self, reason: UpdateReason, zid: Zid) {
        self.observers
            .notify(UpdateInfo::new(self.number, reason, zid));
    }
}

impl ZettelBox for MemBox {
    fn location(&self) -> String {
        self.location.clone()
    }

    fn number(&self) -> usize {
        self.number
    }

    fn get_zettel(&self, ctx: &Context, zid: Zid) -> Result<Zettel, ZettelError> {
        ctx.check()?;
        self.zettel
            .read()
            .get(&zid)
            .cloned()
            .ok_or(ZettelError::NotFound(zid))
    }

    fn get_meta(&self, ctx: &Context, zid: Zid) -> Result<Meta, ZettelError> {
        ctx.check()?;
        self.zettel
            .read()
            .get(&zid)
            .map(|z| z.meta.clone())
            .ok_or(ZettelError::NotFound(zid))
    }

    fn has_zettel(&self, _ctx: &Context, zid: Zid) -> bool {
        self.zettel.read().contains_key(&zid)
    }

    fn apply_meta(
        &self,
        ctx: &Context,
        handler: &mut dyn FnMut(Meta),
        include: &dyn Fn(Zid) -> bool,
    ) -> Result<(), ZettelError> {
        ctx.check()?;
        let metas: Vec<Meta> = self
            .zettel
            .read()
            .values()
            .filter(|z| include(z.zid()))
            .map(|z| z.meta.clone())
            .collect();
        for meta in metas {
            handler(meta);
        }
        Ok(())
    }

    fn can_create_zettel(&self, _ctx: &Context) -> bool {
        self.zettel.read().len() < self.max_zettel
    }

    fn create_zettel(&self, ctx: &Context, mut zettel: Zettel) -> Result<Zid, ZettelError> {
        ctx.check()?;
        let zid = {
            let mut stored = self.zettel.write();
            let zid = new_zid(|zid| stored.contains_key(&zid))?;
            zettel.meta.set_zid(zid);
            if !self.fits(&stored, &zettel, None) {
                return Err(ZettelError::NotAllowed {
                    op: "create".to_string(),
                    zid,
                });
            }
            stored.insert(zid, zettel);
            zid
        };
        self.notify(UpdateReason::OnZettel, zid);
        Ok(zid)
    }

    fn can_update_zettel(&self, _ctx: &Context, zettel: &Zettel) -> bool {
        let stored = self.zettel.read();
        self.fits(&stored, zettel, Some(zettel.zid()))
    }

    fn update_zettel(&self, ctx: &Context, zettel: Zettel) -> Result<(), ZettelError> {
        ctx.check()?;
        let zid = zettel.zid();
        if !zid.is_valid() {
            return Err(ZettelError::InvalidZid(zid.to_string()));
        }
        {
            let mut stored = self.zettel.write();
            if !self.fits(&stored, &zettel, Some(zid)) {
                return Err(ZettelError::NotAllowed {
                    op: "update".to_string(),
                    zid,
                });
            }
            stored.insert(zid, zettel);
        }
        self.notify(UpdateReason::OnZettel, zid);
        Ok(())
    }

    fn can_rename_zettel(&self, _ctx: &Context, _zid: Zid) -> bool {
        true
    }

    fn rename_zettel(&self, ctx: &Context, from: Zid, to: Zid) -> Result<(), ZettelError> {
        ctx.check()?;
        {
            let mut stored = self.zettel.write();
            if stored.contains_key(&to) {
                return Err(ZettelError::InvalidZid(to.to_string()));
            }
            let mut zettel = stored.remove(&from).ok_or(ZettelError::NotFound(from))?;
            zettel.meta.set_zid(to);
            stored.insert(to, zettel);
        }
        self.notify(UpdateReason::OnDelete, from);
        self.notify(UpdateReason::OnZettel, to);
        Ok(())
    }

    fn can_delete_zettel(&self, _ctx: &Context, zid: Zid) -> bool {
        self.zettel.read().contains_key(&zid)
    }

    fn delete_zettel(&self, ctx: &Context, zid: Zid) -> Result<(), ZettelError> {
        ctx.check()?;
        if self.zettel.write().remove(&zid).is_none() {
            return Err(ZettelError::NotFound(zid));
        }
        self.notify(UpdateReason::OnDelete, zid);
        Ok(())
    }

    fn read_stats(&self, stats: &mut BoxStats) {
        stats.location = self.location.clone();
        stats.read_only = false;
        stats.zettel = self.zettel.read().len();
    }

    fn start(&self, _ctx: &Context) -> Result<(), ZettelError> {
        tracing::info!(
            "[MemBox] Starting box {} with at most {} zettel / {} bytes",
            self.number,
            self.max_zettel,
            self.max_bytes
        );
        self.notify(UpdateReason::OnReady, Zid::INVALID);
        Ok(())
    }

    fn stop(&self, _ctx: &Context) {
        self.zettel.write().clear();
    }

    fn register_observer(&self, observer: UpdateFn) {
        self.observers.register(observer);
    }
}

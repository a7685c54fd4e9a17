//! Shared test utilities for evaluator and encoder tests

use std::{
    collections::BTreeMap,
    sync::atomic::{AtomicUsize, Ordering},
};

use parking_lot::Mutex;

use crate::{
    context::Context,
    error::ZettelError,
    eval::Port,
    id::Zid,
    meta::{keys::KEY_SYNTAX, keys::KEY_TITLE, Meta},
    query::Query,
    zettel::Zettel,
};

/// Builds a zettel from a title, a syntax and its content.
pub fn create_test_zettel(zid: u64, title: &str, syntax: &str, content: &str) -> Zettel {
    let zid = Zid::from_u64(zid).unwrap_or(Zid::INVALID);
    let mut meta = Meta::new(zid);
    meta.set_non_empty(KEY_TITLE, title);
    meta.set(KEY_SYNTAX, syntax);
    Zettel::new(meta, content.as_bytes().to_vec())
}

/// An evaluation port over a fixed set of zettel that counts content fetches.
#[derive(Debug, Default)]
pub struct MemPort {
    zettel: BTreeMap<Zid, Zettel>,
    fetches: AtomicUsize,
    reindexed: Mutex<Vec<Zid>>,
}

impl MemPort {
    pub fn new(zettel: Vec<Zettel>) -> MemPort {
        MemPort {
            zettel: zettel.into_iter().map(|z| (z.zid(), z)).collect(),
            ..MemPort::default()
        }
    }

    pub fn fetches(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }

    pub fn reindexed(&self) -> Vec<Zid> {
        self.reindexed.lock().clone()
    }
}

impl Port for MemPort {
    fn get_zettel(&self, ctx: &Context, zid: Zid) -> Result<Zettel, ZettelError> {
        ctx.check()?;
        self.fetches.fetch_add(1, Ordering::SeqCst);
        self.zettel.get(&zid).cloned().ok_or(ZettelError::NotFound(zid))
    }

    fn get_meta(&self, ctx: &Context, zid: Zid) -> Result<Meta, ZettelError> {
        ctx.check()?;
        self.zettel
            .get(&zid)
            .map(|z| z.meta.clone())
            .ok_or(ZettelError::NotFound(zid))
    }

    fn query_meta(&self, ctx: &Context, query: &Query) -> Result<Vec<Meta>, ZettelError> {
        ctx.check()?;
        let metas = self.zettel.values().map(|z| z.meta.clone()).collect();
        Ok(query.select(metas, None))
    }

    fn reindex(&self, _ctx: &Context, zid: Zid) -> Result<(), ZettelError> {
        self.reindexed.lock().push(zid);
        Ok(())
    }
}

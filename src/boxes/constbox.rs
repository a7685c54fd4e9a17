//! Zettel compiled into the binary: default home, emoji placeholder, base stylesheet and the
//! zettelmarkup help. They use the directory box file format.
use include_dir::{include_dir, Dir};
use once_cell::sync::Lazy;
use std::collections::BTreeMap;

use super::{filefmt, BoxStats, UpdateFn, UpdateInfo, UpdateReason, Observers, ZettelBox};
use crate::{context::Context, error::ZettelError, id::Zid, meta::Meta, zettel::Zettel};

pub const LOCATION: &str = "const:";

static CONSTBOX_DIR: Dir<'_> = include_dir!("$CARGO_MANIFEST_DIR/assets/constbox");

static CONST_ZETTEL: Lazy<BTreeMap<Zid, Zettel>> = Lazy::new(|| {
    let mut files: BTreeMap<Zid, (Option<(String, &'static [u8])>, Option<&'static [u8]>)> =
        BTreeMap::new();
    for file in CONSTBOX_DIR.files() {
        let Some(name) = file.path().file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        let Some((zid, ext)) = filefmt::parse_file_name(name) else {
            tracing::warn!("[ConstBox] Ignoring bundled file {name}");
            continue;
        };
        let slot = files.entry(zid).or_default();
        if ext == filefmt::META_EXT {
            slot.1 = Some(file.contents());
        } else {
            slot.0 = Some((ext, file.contents()));
        }
    }
    files
        .into_iter()
        .map(|(zid, (content, meta))| {
            let content = content.as_ref().map(|(ext, bytes)| (ext.as_str(), *bytes));
            (zid, filefmt::decode(zid, content, meta))
        })
        .collect()
});

#[derive(Debug)]
pub struct ConstBox {
    number: usize,
    observers: Observers,
}

impl ConstBox {
    pub fn new(number: usize) -> ConstBox {
        ConstBox {
            number,
            observers: Observers::default(),
        }
    }
}

impl ZettelBox for ConstBox {
    fn location(&self) -> String {
        LOCATION.to_string()
    }

    fn number(&self) -> usize {
        self.number
    }

    fn get_zettel(&self, ctx: &Context, zid: Zid) -> Result<Zettel, ZettelError> {
        ctx.check()?;
        CONST_ZETTEL
            .get(&zid)
            .cloned()
            .ok_or(ZettelError::NotFound(zid))
    }

    fn get_meta(&self, ctx: &Context, zid: Zid) -> Result<Meta, ZettelError> {
        ctx.check()?;
        CONST_ZETTEL
            .get(&zid)
            .map(|z| z.meta.clone())
            .ok_or(ZettelError::NotFound(zid))
    }

    fn has_zettel(&self, _ctx: &Context, zid: Zid) -> bool {
        CONST_ZETTEL.contains_key(&zid)
    }

    fn apply_meta(
        &self,
        ctx: &Context,
        handler: &mut dyn FnMut(Meta),
        include: &dyn Fn(Zid) -> bool,
    ) -> Result<(), ZettelError> {
        ctx.check()?;
        for (zid, zettel) in CONST_ZETTEL.iter() {
            if include(*zid) {
                handler(zettel.meta.clone());
            }
        }
        Ok(())
    }

    fn read_stats(&self, stats: &mut BoxStats) {
        stats.location = LOCATION.to_string();
        stats.read_only = true;
        stats.zettel = CONST_ZETTEL.len();
    }

    fn start(&self, _ctx: &Context) -> Result<(), ZettelError> {
        tracing::debug!("[ConstBox] {} bundled zettel", CONST_ZETTEL.len());
        self.observers
            .notify(UpdateInfo::new(self.number, UpdateReason::OnReady, Zid::INVALID));
        Ok(())
    }

    fn register_observer(&self, observer: UpdateFn) {
        self.observers.register(observer);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bundled_zettel_are_present() {
        let ctx = Context::background();
        let b = ConstBox::new(1);
        for zid in [Zid::DEFAULT_HOME, Zid::EMOJI, Zid::BASE_CSS, Zid::ZMK_HELP] {
            assert!(b.has_zettel(&ctx, zid), "{zid} missing");
        }
        let emoji = b.get_zettel(&ctx, Zid::EMOJI).unwrap();
        assert_eq!(emoji.meta.syntax(), "gif");
        assert!(emoji.content.is_binary());
        let css = b.get_zettel(&ctx, Zid::BASE_CSS).unwrap();
        assert_eq!(css.meta.syntax(), "css");
        assert!(css.content.as_text().contains(".zs-font-size-5"));
    }

    #[test]
    fn writes_are_refused() {
        let ctx = Context::background();
        let b = ConstBox::new(1);
        let home = b.get_zettel(&ctx, Zid::DEFAULT_HOME).unwrap();
        assert!(!b.can_update_zettel(&ctx, &home));
        assert_eq!(b.update_zettel(&ctx, home), Err(ZettelError::ReadOnly));
        assert_eq!(
            b.delete_zettel(&ctx, Zid::DEFAULT_HOME),
            Err(ZettelError::ReadOnly)
        );
    }
}

//! Virtual read-only zettel computed on every access.
use std::{fmt::Write, sync::Arc};

use super::{BoxStats, Observers, UpdateFn, UpdateInfo, UpdateReason, ZettelBox};
use crate::{
    context::Context,
    error::ZettelError,
    id::Zid,
    meta::{
        keys::{KeyUsage, KEY_DESCRIPTIONS, KEY_READONLY, KEY_ROLE, KEY_SYNTAX, KEY_TITLE, KEY_VISIBILITY},
        Meta,
    },
    parser::PARSERS,
    zettel::Zettel,
};

pub const LOCATION: &str = "comp:";

/// Supplies rows of `(name, value)` at the time a zettel is computed.
pub type RowsFn = Arc<dyn Fn() -> Vec<(String, String)> + Send + Sync>;

struct Computed {
    zid: Zid,
    title: &'static str,
    syntax: &'static str,
}

const COMPUTED: &[Computed] = &[
    Computed {
        zid: Zid::VERSION,
        title: "Version",
        syntax: "plain",
    },
    Computed {
        zid: Zid::BOX_MANAGER,
        title: "Box Manager",
        syntax: "zmk",
    },
    Computed {
        zid: Zid::METADATA_KEYS,
        title: "Supported Metadata Keys",
        syntax: "zmk",
    },
    Computed {
        zid: Zid::PARSERS,
        title: "Supported Parsers",
        syntax: "zmk",
    },
    Computed {
        zid: Zid::CONFIGURATION,
        title: "Runtime Configuration",
        syntax: "zmk",
    },
];

pub struct CompBox {
    number: usize,
    stats: RowsFn,
    config: RowsFn,
    observers: Observers,
}

impl std::fmt::Debug for CompBox {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompBox")
            .field("number", &self.number)
            .finish()
    }
}

impl CompBox {
    pub fn new(number: usize, stats: RowsFn, config: RowsFn) -> CompBox {
        CompBox {
            number,
            stats,
            config,
            observers: Observers::default(),
        }
    }

    fn meta(computed: &Computed) -> Meta {
        let mut meta = Meta::new(computed.zid);
        meta.set(KEY_TITLE, computed.title);
        meta.set(KEY_ROLE, "configuration");
        meta.set(KEY_SYNTAX, computed.syntax);
        meta.set(KEY_VISIBILITY, "expert");
        meta.set(KEY_READONLY, "true");
        meta
    }

    fn content(&self, zid: Zid) -> String {
        match zid {
            Zid::VERSION => env!("CARGO_PKG_VERSION").to_string(),
            Zid::BOX_MANAGER => key_value_table((self.stats)()),
            Zid::METADATA_KEYS => metadata_keys_table(),
            Zid::PARSERS => parsers_table(),
            Zid::CONFIGURATION => key_value_table((self.config)()),
            _ => String::new(),
        }
    }
}

fn key_value_table(rows: Vec<(String, String)>) -> String {
    let mut out = String::from("|=Key|=Value\n");
    for (k, v) in rows {
        let _ = writeln!(out, "|{k}|{v}");
    }
    out
}

fn metadata_keys_table() -> String {
    let mut out = String::from("|=Name|=Type|=Computed|=Property\n");
    for desc in KEY_DESCRIPTIONS {
        let property = if desc.usage.contains(KeyUsage::Inherited) {
            "inherited"
        } else if desc.usage.contains(KeyUsage::Enriched) {
            "enriched"
        } else if desc.usage.contains(KeyUsage::Internal) {
            "internal"
        } else {
            ""
        };
        let _ = writeln!(
            out,
            "|[[{}|query:{}?]]|{}|{}|{}",
            desc.name,
            desc.name,
            desc.key_type,
            if desc.is_computed() { "yes" } else { "no" },
            property
        );
    }
    out
}

fn parsers_table() -> String {
    let mut out = String::from("|=Syntax|=Alternates|=AST|=Text|=Image\n");
    let yes_no = |b: bool| if b { "yes" } else { "no" };
    let mut infos = PARSERS.infos();
    infos.sort_by(|a, b| a.name.cmp(&b.name));
    for info in infos {
        let _ = writeln!(
            out,
            "|{}|{}|{}|{}|{}",
            info.name,
            info.alt_names.join(", "),
            yes_no(info.is_ast_parser()),
            yes_no(info.is_text_format()),
            yes_no(info.is_image_format())
        );
    }
    out
}

impl ZettelBox for CompBox {
    fn location(&self) -> String {
        LOCATION.to_string()
    }

    fn number(&self) -> usize {
        self.number
    }

    fn get_zettel(&self, ctx: &Context, zid: Zid) -> Result<Zettel, ZettelError> {
        ctx.check()?;
        let computed = COMPUTED
            .iter()
            .find(|c| c.zid == zid)
            .ok_or(ZettelError::NotFound(zid))?;
        Ok(Zettel::new(CompBox::meta(computed), self.content(zid)))
    }

    fn get_meta(&self, ctx: &Context, zid: Zid) -> Result<Meta, ZettelError> {
        ctx.check()?;
        COMPUTED
            .iter()
            .find(|c| c.zid == zid)
            .map(CompBox::meta)
            .ok_or(ZettelError::NotFound(zid))
    }

    fn has_zettel(&self, _ctx: &Context, zid: Zid) -> bool {
        COMPUTED.iter().any(|c| c.zid == zid)
    }

    fn apply_meta(
        &self,
        ctx: &Context,
        handler: &mut dyn FnMut(Meta),
        include: &dyn Fn(Zid) -> bool,
    ) -> Result<(), ZettelError> {
        ctx.check()?;
        for computed in COMPUTED.iter().filter(|c| include(c.zid)) {
            handler(CompBox::meta(computed));
        }
        Ok(())
    }

    fn read_stats(&self, stats: &mut BoxStats) {
        stats.location = LOCATION.to_string();
        stats.read_only = true;
        stats.zettel = COMPUTED.len();
    }

    fn start(&self, _ctx: &Context) -> Result<(), ZettelError> {
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

    fn comp() -> CompBox {
        CompBox::new(
            2,
            Arc::new(|| vec![("zettel".to_string(), "7".to_string())]),
            Arc::new(|| vec![("site-name".to_string(), "Notes".to_string())]),
        )
    }

    #[test]
    fn version_is_the_crate_version() {
        let z = comp()
            .get_zettel(&Context::background(), Zid::VERSION)
            .unwrap();
        assert_eq!(z.content.as_text(), env!("CARGO_PKG_VERSION"));
        assert_eq!(z.meta.get(KEY_READONLY), Some("true"));
    }

    #[test]
    fn tables_are_zettelmarkup() {
        let ctx = Context::background();
        let b = comp();
        let stats = b.get_zettel(&ctx, Zid::BOX_MANAGER).unwrap();
        assert_eq!(stats.content.as_text(), "|=Key|=Value\n|zettel|7\n");
        let config = b.get_zettel(&ctx, Zid::CONFIGURATION).unwrap();
        assert!(config.content.as_text().contains("|site-name|Notes"));
        let parsers = b.get_zettel(&ctx, Zid::PARSERS).unwrap();
        assert!(parsers.content.as_text().contains("|zmk|zettelmarkup|yes|yes|no"));
        let keys = b.get_zettel(&ctx, Zid::METADATA_KEYS).unwrap();
        assert!(keys.content.as_text().contains("|[[back-ref|query:back-ref?]]|IdentifierSet|yes|enriched"));
    }

    #[test]
    fn unknown_zid_is_not_found() {
        let b = comp();
        let zid = Zid::from_u64(3).unwrap();
        assert_eq!(
            b.get_zettel(&Context::background(), zid),
            Err(ZettelError::NotFound(zid))
        );
        let mut seen = Vec::new();
        b.apply_meta(&Context::background(), &mut |m| seen.push(m.zid()), &|_| true)
            .unwrap();
        assert_eq!(seen.len(), 5);
    }
}

//! Content parsers and their registry.
//!
//! Every syntax a zettel may declare in its `syntax` key maps to a [`SyntaxParser`] through the
//! global [`PARSERS`] registry. Lookup never fails: unknown syntaxes are parsed as plain text.
//!
//! ```
//! use zettel_core::{meta::Meta, id::Zid, parser};
//!
//! let blocks = parser::parse_blocks(b"Hello, **world**", &Meta::new(Zid::INVALID), "zmk");
//! assert_eq!(blocks.len(), 1);
//! ```
use std::{sync::Arc, time::Duration};

use enumset::{EnumSet, EnumSetType};
use once_cell::sync::Lazy;
use parking_lot::RwLock;

use crate::{
    ast::{BlockSlice, InlineSlice},
    config::RuntimeConfig,
    meta::{keys::KEY_TITLE, InhMeta, Meta},
    zettel::{Content, Zettel},
};

pub mod blob;
pub mod cleaner;
pub mod draw;
pub mod markdown;
pub mod plain;
pub mod sxn;
pub mod zmk;

pub use cleaner::{cleanup_blocks, cleanup_inlines, CleanupOptions};

/// Syntax used when a name is not registered.
pub const FALLBACK_SYNTAX: &str = "plain";

pub trait SyntaxParser: Send + Sync {
    fn parse_blocks(&self, input: &[u8], meta: &Meta, syntax: &str) -> BlockSlice;
    fn parse_inlines(&self, input: &[u8], syntax: &str) -> InlineSlice;
}

#[derive(EnumSetType, Debug)]
pub enum ParserFlag {
    /// Produces a structured AST instead of one opaque node.
    Ast,
    /// Input is human-readable text.
    Text,
    /// Content is image data.
    Image,
}

pub struct ParserInfo {
    pub name: String,
    pub alt_names: Vec<String>,
    pub flags: EnumSet<ParserFlag>,
    pub parser: Arc<dyn SyntaxParser>,
}

impl ParserInfo {
    pub fn new(
        name: &str,
        alt_names: &[&str],
        flags: EnumSet<ParserFlag>,
        parser: Arc<dyn SyntaxParser>,
    ) -> ParserInfo {
        ParserInfo {
            name: name.to_string(),
            alt_names: alt_names.iter().map(|s| s.to_string()).collect(),
            flags,
            parser,
        }
    }

    pub fn is_ast_parser(&self) -> bool {
        self.flags.contains(ParserFlag::Ast)
    }

    pub fn is_text_format(&self) -> bool {
        self.flags.contains(ParserFlag::Text)
    }

    pub fn is_image_format(&self) -> bool {
        self.flags.contains(ParserFlag::Image)
    }

    fn answers_to(&self, name: &str) -> bool {
        self.name == name || self.alt_names.iter().any(|alt| alt == name)
    }
}

impl std::fmt::Debug for ParserInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ParserInfo")
            .field("name", &self.name)
            .field("alt_names", &self.alt_names)
            .field("flags", &self.flags)
            .finish()
    }
}

pub static PARSERS: Lazy<ParserMap> = Lazy::new(ParserMap::create);

#[derive(Clone)]
pub struct ParserMap(Arc<RwLock<Vec<Arc<ParserInfo>>>>);

impl ParserMap {
    pub fn create() -> Self {
        let ast_text = ParserFlag::Ast | ParserFlag::Text;
        let image = EnumSet::only(ParserFlag::Image);
        let infos = vec![
            ParserInfo::new("zmk", &["zettelmarkup"], ast_text, Arc::new(zmk::Zettelmarkup)),
            ParserInfo::new("markdown", &["md"], ast_text, Arc::new(markdown::Markdown)),
            ParserInfo::new(
                "plain",
                &["text", "txt", "css"],
                EnumSet::only(ParserFlag::Text),
                Arc::new(plain::Plain),
            ),
            ParserInfo::new(
                "html",
                &[],
                EnumSet::only(ParserFlag::Text),
                Arc::new(plain::Html),
            ),
            ParserInfo::new(
                "svg",
                &[],
                ParserFlag::Text | ParserFlag::Image,
                Arc::new(blob::Svg),
            ),
            ParserInfo::new("draw", &[], ast_text, Arc::new(draw::Draw)),
            ParserInfo::new("sxn", &[], ast_text, Arc::new(sxn::Sxn)),
            ParserInfo::new("gif", &[], image, Arc::new(blob::Image)),
            ParserInfo::new("jpeg", &["jpg"], image, Arc::new(blob::Image)),
            ParserInfo::new("png", &[], image, Arc::new(blob::Image)),
            ParserInfo::new("webp", &[], image, Arc::new(blob::Image)),
            ParserInfo::new("none", &[], EnumSet::empty(), Arc::new(plain::NoneSyntax)),
        ];
        ParserMap(Arc::new(RwLock::new(
            infos.into_iter().map(Arc::new).collect(),
        )))
    }

    /// Registers a parser, replacing any parser registered under the same primary name.
    pub fn insert(&self, info: ParserInfo) {
        while self.0.is_locked_exclusive() {
            tracing::info!("[ParserMap::insert] Waiting for write access to the parser map");
            std::thread::sleep(Duration::from_millis(10));
        }
        let mut writer = self.0.write_arc();
        let info = Arc::new(info);
        match writer.iter_mut().find(|entry| entry.name == info.name) {
            Some(entry) => *entry = info,
            None => writer.push(info),
        }
    }

    /// The parser registered under `name`, if any.
    pub fn lookup(&self, name: &str) -> Option<Arc<ParserInfo>> {
        while self.0.is_locked_exclusive() {
            tracing::info!("[ParserMap::lookup] Waiting for read access to the parser map");
            std::thread::sleep(Duration::from_millis(10));
        }
        let name = name.trim().to_ascii_lowercase();
        let reader = self.0.read_arc();
        reader.iter().find(|info| info.answers_to(&name)).cloned()
    }

    /// Like [`ParserMap::lookup`], falling back to the plain text parser.
    pub fn get(&self, name: &str) -> Arc<ParserInfo> {
        if let Some(info) = self.lookup(name) {
            return info;
        }
        tracing::debug!("[ParserMap::get] Unknown syntax {name:?}, using {FALLBACK_SYNTAX}");
        match self.lookup(FALLBACK_SYNTAX) {
            Some(info) => info,
            None => Arc::new(ParserInfo::new(
                FALLBACK_SYNTAX,
                &[],
                EnumSet::only(ParserFlag::Text),
                Arc::new(plain::Plain),
            )),
        }
    }

    /// Primary and alternate names, sorted.
    pub fn names(&self) -> Vec<String> {
        let reader = self.0.read_arc();
        let mut names: Vec<String> = reader
            .iter()
            .flat_map(|info| std::iter::once(info.name.clone()).chain(info.alt_names.clone()))
            .collect();
        names.sort();
        names
    }

    pub fn infos(&self) -> Vec<Arc<ParserInfo>> {
        self.0.read_arc().iter().cloned().collect()
    }
}

pub fn get(syntax: &str) -> Arc<ParserInfo> {
    PARSERS.get(syntax)
}

/// Parses content of the given syntax into blocks and applies the default cleanup.
pub fn parse_blocks(input: &[u8], meta: &Meta, syntax: &str) -> BlockSlice {
    let mut blocks = get(syntax).parser.parse_blocks(input, meta, syntax);
    cleanup_blocks(&mut blocks, syntax, &CleanupOptions::default());
    blocks
}

/// Parses inline content of the given syntax and applies the default cleanup.
pub fn parse_inlines(input: &str, syntax: &str) -> InlineSlice {
    let mut inlines = get(syntax).parser.parse_inlines(input.as_bytes(), syntax);
    cleanup_inlines(&mut inlines, syntax, &CleanupOptions::default());
    inlines
}

/// Parses a metadata value as zettelmarkup inline text, as used for titles.
pub fn parse_meta_inlines(meta: &Meta, key: &str) -> InlineSlice {
    match meta.get(key) {
        Some(value) if !value.is_empty() => parse_inlines(value, "zmk"),
        _ => InlineSlice::new(),
    }
}

pub fn parse_title(meta: &Meta) -> InlineSlice {
    parse_meta_inlines(meta, KEY_TITLE)
}

/// A zettel together with its parsed content.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedZettel {
    pub meta: Meta,
    /// Metadata with runtime defaults applied.
    pub inh_meta: InhMeta,
    pub content: Content,
    pub syntax: String,
    pub ast: BlockSlice,
}

/// Parses a zettel's content. An empty `syntax` means the syntax declared in the metadata.
pub fn parse_zettel(
    zettel: &Zettel,
    syntax: &str,
    rtc: Option<&dyn RuntimeConfig>,
) -> ParsedZettel {
    let inh_meta = match rtc {
        Some(rtc) => rtc.add_defaults(&zettel.meta),
        None => zettel.meta.clone(),
    };
    let syntax = if syntax.is_empty() {
        inh_meta.syntax().to_string()
    } else {
        syntax.to_string()
    };
    let options = CleanupOptions {
        html_insecurity: rtc.map(|rtc| rtc.html_insecurity()).unwrap_or_default(),
        ..CleanupOptions::default()
    };
    let info = get(&syntax);
    tracing::debug!(
        "[parse_zettel] {} with {} parser",
        zettel.meta.zid(),
        info.name
    );
    let mut ast = info
        .parser
        .parse_blocks(zettel.content.as_bytes(), &inh_meta, &syntax);
    cleanup_blocks(&mut ast, &syntax, &options);
    ParsedZettel {
        meta: zettel.meta.clone(),
        inh_meta,
        content: zettel.content.clone(),
        syntax,
        ast,
    }
}

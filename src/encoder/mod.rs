//! Encoders turn a (cleaned, usually evaluated) AST into an output format.
//!
//! Encoders never mutate the AST. They are looked up by [`Encoding`] through the global
//! [`ENCODERS`] registry; an unknown encoding has no encoder.
use std::{
    convert::Infallible,
    fmt::{Display, Formatter},
    io,
    str::FromStr,
    sync::Arc,
    time::Duration,
};

use once_cell::sync::Lazy;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::{
    ast::{BlockSlice, InlineSlice},
    config::HtmlInsecurity,
    error::ZettelError,
    meta::Meta,
    parser::ParsedZettel,
};

pub mod html;
pub mod markdown;
pub mod shtml;
pub mod sz;
pub mod text;
pub mod zmk;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Encoding {
    Html,
    Md,
    Shtml,
    Sz,
    Text,
    Zmk,
    Unknown,
}

impl Encoding {
    pub const ALL: [Encoding; 6] = [
        Encoding::Html,
        Encoding::Md,
        Encoding::Shtml,
        Encoding::Sz,
        Encoding::Text,
        Encoding::Zmk,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Encoding::Html => "html",
            Encoding::Md => "md",
            Encoding::Shtml => "shtml",
            Encoding::Sz => "sz",
            Encoding::Text => "text",
            Encoding::Zmk => "zmk",
            Encoding::Unknown => "unknown",
        }
    }
}

impl FromStr for Encoding {
    type Err = Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s.trim().to_ascii_lowercase().as_str() {
            "html" => Encoding::Html,
            "md" | "markdown" => Encoding::Md,
            "shtml" => Encoding::Shtml,
            "sz" => Encoding::Sz,
            "text" | "txt" => Encoding::Text,
            "zmk" => Encoding::Zmk,
            _ => Encoding::Unknown,
        })
    }
}

impl Display for Encoding {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Settings shared by all encoders.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EncoderOptions {
    pub html_insecurity: HtmlInsecurity,
    /// Language of the surrounding document; elements with another `lang` are marked.
    pub lang: Option<String>,
}

pub trait Encoder: Send + Sync {
    /// Metadata and content of a whole zettel.
    fn write_zettel(&self, w: &mut dyn io::Write, zettel: &ParsedZettel)
        -> Result<usize, ZettelError>;

    fn write_meta(&self, w: &mut dyn io::Write, meta: &Meta) -> Result<usize, ZettelError>;

    fn write_content(
        &self,
        w: &mut dyn io::Write,
        zettel: &ParsedZettel,
    ) -> Result<usize, ZettelError> {
        self.write_blocks(w, &zettel.ast)
    }

    fn write_blocks(&self, w: &mut dyn io::Write, blocks: &BlockSlice)
        -> Result<usize, ZettelError>;

    fn write_inlines(
        &self,
        w: &mut dyn io::Write,
        inlines: &InlineSlice,
    ) -> Result<usize, ZettelError>;
}

/// Byte counting writer with a sticky error: after the first failure nothing more is written,
/// but the count of bytes already written stays available.
pub struct EncWriter<'w> {
    w: &'w mut dyn io::Write,
    written: usize,
    err: Option<ZettelError>,
}

impl<'w> EncWriter<'w> {
    pub fn new(w: &'w mut dyn io::Write) -> EncWriter<'w> {
        EncWriter {
            w,
            written: 0,
            err: None,
        }
    }

    /// Writes `s` unless an earlier write failed. Returns the cumulative byte count.
    pub fn write_str(&mut self, s: &str) -> usize {
        self.write_bytes(s.as_bytes())
    }

    pub fn write_bytes(&mut self, b: &[u8]) -> usize {
        if self.err.is_none() {
            match self.w.write_all(b) {
                Ok(()) => self.written += b.len(),
                Err(e) => {
                    tracing::debug!("[EncWriter] write failed after {} bytes: {e}", self.written);
                    self.err = Some(ZettelError::Io(format!("encoder output: {e}")));
                }
            }
        }
        self.written
    }

    pub fn written(&self) -> usize {
        self.written
    }

    pub fn has_error(&self) -> bool {
        self.err.is_some()
    }

    pub fn finish(self) -> Result<usize, ZettelError> {
        match self.err {
            Some(err) => Err(err),
            None => Ok(self.written),
        }
    }
}

type EncoderFactory = fn(&EncoderOptions) -> Box<dyn Encoder>;

fn html_encoder(options: &EncoderOptions) -> Box<dyn Encoder> {
    Box::new(html::HtmlEncoder::new(options))
}

fn md_encoder(options: &EncoderOptions) -> Box<dyn Encoder> {
    Box::new(markdown::MdEncoder::new(options))
}

fn shtml_encoder(options: &EncoderOptions) -> Box<dyn Encoder> {
    Box::new(shtml::ShtmlEncoder::new(options))
}

fn sz_encoder(_: &EncoderOptions) -> Box<dyn Encoder> {
    Box::new(sz::SzEncoder)
}

fn text_encoder(_: &EncoderOptions) -> Box<dyn Encoder> {
    Box::new(text::TextEncoder)
}

fn zmk_encoder(_: &EncoderOptions) -> Box<dyn Encoder> {
    Box::new(zmk::ZmkEncoder)
}

pub static ENCODERS: Lazy<EncoderMap> = Lazy::new(EncoderMap::create);

#[derive(Clone)]
pub struct EncoderMap(Arc<RwLock<Vec<(Encoding, EncoderFactory)>>>);

impl EncoderMap {
    pub fn create() -> Self {
        let factories: Vec<(Encoding, EncoderFactory)> = vec![
            (Encoding::Html, html_encoder as EncoderFactory),
            (Encoding::Md, md_encoder as EncoderFactory),
            (Encoding::Shtml, shtml_encoder as EncoderFactory),
            (Encoding::Sz, sz_encoder as EncoderFactory),
            (Encoding::Text, text_encoder as EncoderFactory),
            (Encoding::Zmk, zmk_encoder as EncoderFactory),
        ];
        EncoderMap(Arc::new(RwLock::new(factories)))
    }

    pub fn insert(&self, encoding: Encoding, factory: EncoderFactory) {
        while self.0.is_locked_exclusive() {
            tracing::info!("[EncoderMap::insert] Waiting for write access to the encoder map");
            std::thread::sleep(Duration::from_millis(10));
        }
        let mut writer = self.0.write_arc();
        match writer.iter_mut().find(|(enc, _)| *enc == encoding) {
            Some(entry) => entry.1 = factory,
            None => writer.push((encoding, factory)),
        }
    }

    pub fn get(&self, encoding: Encoding, options: &EncoderOptions) -> Option<Box<dyn Encoder>> {
        while self.0.is_locked_exclusive() {
            tracing::info!("[EncoderMap::get] Waiting for read access to the encoder map");
            std::thread::sleep(Duration::from_millis(10));
        }
        let reader = self.0.read_arc();
        reader
            .iter()
            .find(|(enc, _)| *enc == encoding)
            .map(|(_, factory)| factory(options))
    }

    pub fn encodings(&self) -> Vec<Encoding> {
        self.0.read_arc().iter().map(|(enc, _)| *enc).collect()
    }
}

/// The encoder for `encoding`, or `None` if there is none.
pub fn create(encoding: Encoding, options: &EncoderOptions) -> Option<Box<dyn Encoder>> {
    ENCODERS.get(encoding, options)
}

/// Convenience for tests and the CLI: encodes blocks into a string.
pub fn encode_blocks_to_string(
    encoding: Encoding,
    options: &EncoderOptions,
    blocks: &BlockSlice,
) -> Result<String, ZettelError> {
    let encoder = create(encoding, options)
        .ok_or_else(|| ZettelError::Encoding(format!("no encoder for {encoding}")))?;
    let mut buf = Vec::new();
    encoder.write_blocks(&mut buf, blocks)?;
    String::from_utf8(buf).map_err(|e| ZettelError::Encoding(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Failing(usize);

    impl io::Write for Failing {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            if self.0 == 0 {
                return Err(io::Error::new(io::ErrorKind::Other, "full"));
            }
            self.0 -= 1;
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn encoding_names() {
        assert_eq!("HTML".parse::<Encoding>(), Ok(Encoding::Html));
        assert_eq!("nope".parse::<Encoding>(), Ok(Encoding::Unknown));
        for enc in Encoding::ALL {
            assert_eq!(enc.name().parse::<Encoding>(), Ok(enc));
        }
    }

    #[test]
    fn unknown_encoding_has_no_encoder() {
        assert!(create(Encoding::Unknown, &EncoderOptions::default()).is_none());
        for enc in Encoding::ALL {
            assert!(create(enc, &EncoderOptions::default()).is_some(), "{enc}");
        }
    }

    #[test]
    fn writer_error_is_sticky() {
        let mut sink = Failing(1);
        let mut w = EncWriter::new(&mut sink);
        assert_eq!(w.write_str("abc"), 3);
        assert_eq!(w.write_str("de"), 3);
        assert_eq!(w.write_str("f"), 3);
        assert!(w.has_error());
        assert!(w.finish().is_err());
    }
}

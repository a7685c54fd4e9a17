use serde::{Deserialize, Serialize};

use crate::{id::Zid, meta::Meta};

/// Opaque zettel content. Text syntaxes hold UTF-8, image syntaxes raw bytes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Content(Vec<u8>);

impl Content {
    pub fn new(bytes: impl Into<Vec<u8>>) -> Content {
        Content(bytes.into())
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Content as text, replacing invalid UTF-8 sequences.
    pub fn as_text(&self) -> String {
        String::from_utf8_lossy(&self.0).into_owned()
    }

    /// Binary content contains NUL bytes or is not valid UTF-8.
    pub fn is_binary(&self) -> bool {
        self.0.contains(&0) || std::str::from_utf8(&self.0).is_err()
    }
}

impl From<&str> for Content {
    fn from(s: &str) -> Self {
        Content(s.as_bytes().to_vec())
    }
}

impl From<String> for Content {
    fn from(s: String) -> Self {
        Content(s.into_bytes())
    }
}

impl From<Vec<u8>> for Content {
    fn from(bytes: Vec<u8>) -> Self {
        Content(bytes)
    }
}

/// A zettel as handed out by boxes. Every returned value is a detached copy.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Zettel {
    pub meta: Meta,
    pub content: Content,
}

impl Zettel {
    pub fn new(meta: Meta, content: impl Into<Content>) -> Zettel {
        Zettel {
            meta,
            content: content.into(),
        }
    }

    pub fn zid(&self) -> Zid {
        self.meta.zid()
    }

    /// Total size used for box quotas.
    pub fn byte_len(&self) -> usize {
        self.content.len()
            + self
                .meta
                .pairs()
                .iter()
                .map(|(k, v)| k.len() + v.len())
                .sum::<usize>()
    }
}

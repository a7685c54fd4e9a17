//! Known metadata keys, their value types and how they are used.
use enumset::{EnumSet, EnumSetType};
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};

pub const KEY_ID: &str = "id";
pub const KEY_TITLE: &str = "title";
pub const KEY_ROLE: &str = "role";
pub const KEY_TAGS: &str = "tags";
pub const KEY_SYNTAX: &str = "syntax";
pub const KEY_ALL_TAGS: &str = "all-tags";
pub const KEY_AUTHOR: &str = "author";
pub const KEY_BACK_REF: &str = "back-ref";
pub const KEY_BOX_NUMBER: &str = "box-number";
pub const KEY_CONTENT_TAGS: &str = "content-tags";
pub const KEY_COPYRIGHT: &str = "copyright";
pub const KEY_CREATED: &str = "created";
pub const KEY_CREDENTIAL: &str = "credential";
pub const KEY_EXPIRE: &str = "expire";
pub const KEY_FOLGE: &str = "folge";
pub const KEY_FWD_REF: &str = "fwd-ref";
pub const KEY_LANG: &str = "lang";
pub const KEY_LICENSE: &str = "license";
pub const KEY_MODIFIED: &str = "modified";
pub const KEY_PRECURSOR: &str = "precursor";
pub const KEY_PUBLISHED: &str = "published";
pub const KEY_READONLY: &str = "readonly";
pub const KEY_SUMMARY: &str = "summary";
pub const KEY_URL: &str = "url";
pub const KEY_USER_ID: &str = "user-id";
pub const KEY_USER_ROLE: &str = "user-role";
pub const KEY_VISIBILITY: &str = "visibility";

pub const DEFAULT_SYNTAX: &str = "zmk";

/// The type of a metadata value. It decides validation, normalisation and query semantics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum KeyType {
    Bool,
    Credential,
    Empty,
    Id,
    IdSet,
    Number,
    String,
    TagSet,
    Timestamp,
    Url,
    Word,
    WordSet,
    Zettelmarkup,
}

impl KeyType {
    pub fn name(&self) -> &'static str {
        match self {
            KeyType::Bool => "Boolean",
            KeyType::Credential => "Credential",
            KeyType::Empty => "EString",
            KeyType::Id => "Identifier",
            KeyType::IdSet => "IdentifierSet",
            KeyType::Number => "Number",
            KeyType::String => "String",
            KeyType::TagSet => "TagSet",
            KeyType::Timestamp => "Timestamp",
            KeyType::Url => "URL",
            KeyType::Word => "Word",
            KeyType::WordSet => "WordSet",
            KeyType::Zettelmarkup => "Zettelmarkup",
        }
    }

    /// Set types hold space separated elements whose order is not significant.
    pub fn is_set(&self) -> bool {
        matches!(self, KeyType::IdSet | KeyType::TagSet | KeyType::WordSet)
    }

    /// Values are compared as whole tokens, not as free text.
    pub fn is_token(&self) -> bool {
        matches!(
            self,
            KeyType::Bool | KeyType::Id | KeyType::Number | KeyType::Timestamp | KeyType::Word
        )
    }
}

impl Display for KeyType {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

#[derive(EnumSetType, Debug, Serialize, Deserialize)]
pub enum KeyUsage {
    /// Value is maintained by the software, not by the user.
    Computed,
    /// Value is supplied by the index worker on every read.
    Enriched,
    /// Missing values are taken from the runtime configuration.
    Inherited,
    /// Never shown outside of the box that stores it.
    Internal,
}

#[derive(Debug, Clone, Copy)]
pub struct KeyDescription {
    pub name: &'static str,
    pub key_type: KeyType,
    pub usage: EnumSet<KeyUsage>,
}

impl KeyDescription {
    pub fn is_computed(&self) -> bool {
        self.usage.contains(KeyUsage::Computed) || self.usage.contains(KeyUsage::Enriched)
    }
}

const fn key(name: &'static str, key_type: KeyType, usage: EnumSet<KeyUsage>) -> KeyDescription {
    KeyDescription {
        name,
        key_type,
        usage,
    }
}

const USER: EnumSet<KeyUsage> = EnumSet::EMPTY;

pub static KEY_DESCRIPTIONS: &[KeyDescription] = &[
    key(KEY_ID, KeyType::Id, enumset::enum_set!(KeyUsage::Computed)),
    key(KEY_TITLE, KeyType::Zettelmarkup, USER),
    key(KEY_ROLE, KeyType::Word, enumset::enum_set!(KeyUsage::Inherited)),
    key(KEY_TAGS, KeyType::TagSet, USER),
    key(KEY_SYNTAX, KeyType::Word, enumset::enum_set!(KeyUsage::Inherited)),
    key(KEY_ALL_TAGS, KeyType::TagSet, enumset::enum_set!(KeyUsage::Enriched)),
    key(KEY_AUTHOR, KeyType::String, USER),
    key(KEY_BACK_REF, KeyType::IdSet, enumset::enum_set!(KeyUsage::Enriched)),
    key(KEY_BOX_NUMBER, KeyType::Number, enumset::enum_set!(KeyUsage::Enriched)),
    key(KEY_CONTENT_TAGS, KeyType::TagSet, enumset::enum_set!(KeyUsage::Enriched)),
    key(KEY_COPYRIGHT, KeyType::String, enumset::enum_set!(KeyUsage::Inherited)),
    key(KEY_CREATED, KeyType::Timestamp, USER),
    key(KEY_CREDENTIAL, KeyType::Credential, enumset::enum_set!(KeyUsage::Internal)),
    key(KEY_EXPIRE, KeyType::Timestamp, USER),
    key(KEY_FOLGE, KeyType::IdSet, USER),
    key(KEY_FWD_REF, KeyType::IdSet, enumset::enum_set!(KeyUsage::Enriched)),
    key(KEY_LANG, KeyType::Word, enumset::enum_set!(KeyUsage::Inherited)),
    key(KEY_LICENSE, KeyType::Empty, enumset::enum_set!(KeyUsage::Inherited)),
    key(KEY_MODIFIED, KeyType::Timestamp, enumset::enum_set!(KeyUsage::Computed)),
    key(KEY_PRECURSOR, KeyType::IdSet, USER),
    key(KEY_PUBLISHED, KeyType::Timestamp, enumset::enum_set!(KeyUsage::Enriched)),
    key(KEY_READONLY, KeyType::Bool, USER),
    key(KEY_SUMMARY, KeyType::Zettelmarkup, USER),
    key(KEY_URL, KeyType::Url, USER),
    key(KEY_USER_ID, KeyType::Word, USER),
    key(KEY_USER_ROLE, KeyType::Word, USER),
    key(KEY_VISIBILITY, KeyType::Word, enumset::enum_set!(KeyUsage::Inherited)),
];

/// Looks up the description of a known key.
pub fn describe(key: &str) -> Option<&'static KeyDescription> {
    KEY_DESCRIPTIONS.iter().find(|d| d.name == key)
}

/// The type of any key. Unknown keys are typed by naming convention, falling back to string.
pub fn key_type(key: &str) -> KeyType {
    if let Some(desc) = describe(key) {
        return desc.key_type;
    }
    const SUFFIXES: &[(&str, KeyType)] = &[
        ("-date", KeyType::Timestamp),
        ("-number", KeyType::Number),
        ("-role", KeyType::Word),
        ("-set", KeyType::WordSet),
        ("-title", KeyType::Zettelmarkup),
        ("-url", KeyType::Url),
        ("-zid", KeyType::Id),
        ("-zids", KeyType::IdSet),
    ];
    SUFFIXES
        .iter()
        .find(|(suffix, _)| key.ends_with(suffix))
        .map(|(_, kt)| *kt)
        .unwrap_or(KeyType::String)
}

pub fn is_computed(key: &str) -> bool {
    describe(key).map(|d| d.is_computed()).unwrap_or(false)
}

pub fn is_internal(key: &str) -> bool {
    describe(key)
        .map(|d| d.usage.contains(KeyUsage::Internal))
        .unwrap_or(false)
}

/// A key is valid if it is non-empty lowercase ASCII made of letters, digits and dashes.
pub fn is_valid_key(key: &str) -> bool {
    !key.is_empty()
        && key
            .bytes()
            .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || b == b'-')
}

//! Typed key/value metadata of a zettel.
//!
//! A [`Meta`] is an ordered mapping from lowercase keys to string values. Every key has a
//! [`KeyType`](keys::KeyType) that decides how values are validated, normalised and compared.
//! Stored tag values always carry their leading `#`; use [`clean_tag`] for display.
//!
//! Missing values of inherited keys (`lang`, `role`, `syntax`, `visibility`, ...) come from the
//! runtime configuration, see [`Meta::with_defaults`] and
//! [`RuntimeConfig::add_defaults`](crate::config::RuntimeConfig::add_defaults). The flattened
//! result is called [`InhMeta`].
use serde::{Deserialize, Serialize};
use std::{collections::BTreeMap, fmt::Write};

use crate::{error::ZettelError, id::Zid};

pub mod keys;
pub mod parse;

pub use keys::{key_type, KeyType, KeyUsage};

/// Metadata flattened with the runtime defaults, as seen during evaluation.
pub type InhMeta = Meta;

/// Keys that come first when metadata is written, in this order.
const FIRST_KEYS: &[&str] = &[keys::KEY_TITLE, keys::KEY_ROLE, keys::KEY_TAGS, keys::KEY_SYNTAX];

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Meta {
    zid: Zid,
    pairs: BTreeMap<String, String>,
}

impl Meta {
    pub fn new(zid: Zid) -> Meta {
        Meta {
            zid,
            pairs: BTreeMap::new(),
        }
    }

    pub fn zid(&self) -> Zid {
        self.zid
    }

    /// Moves the metadata to another identifier. Used by rename and creation.
    pub fn set_zid(&mut self, zid: Zid) {
        self.zid = zid;
    }

    /// The raw stored value. The `id` key is answered by [`Meta::zid`] and is never stored.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.pairs.get(key).map(|v| v.as_str())
    }

    /// Like [`Meta::get`] but also answers the computed `id` key.
    pub fn get_value(&self, key: &str) -> Option<String> {
        if key == keys::KEY_ID {
            return Some(self.zid.to_string());
        }
        self.get(key).map(str::to_string)
    }

    pub fn get_default<'a>(&'a self, key: &str, default: &'a str) -> &'a str {
        self.get(key).unwrap_or(default)
    }

    pub fn has(&self, key: &str) -> bool {
        key == keys::KEY_ID || self.pairs.contains_key(key)
    }

    /// Boolean interpretation: absent or starting with `0`, `f`, `n` (any case) is false.
    pub fn get_bool(&self, key: &str) -> bool {
        self.get(key).map(parse_bool).unwrap_or(false)
    }

    pub fn get_number(&self, key: &str, default: i64) -> i64 {
        self.get(key)
            .and_then(|v| v.trim().parse::<i64>().ok())
            .unwrap_or(default)
    }

    /// Elements of a set-typed value.
    pub fn get_list(&self, key: &str) -> Vec<&str> {
        self.get(key)
            .map(|v| v.split_whitespace().collect())
            .unwrap_or_default()
    }

    pub fn get_zids(&self, key: &str) -> Vec<Zid> {
        self.get_list(key)
            .into_iter()
            .filter_map(|s| Zid::parse(s).ok())
            .collect()
    }

    /// Tags of the given tagset key, without their leading `#`.
    pub fn get_tags(&self, key: &str) -> Vec<String> {
        self.get_list(key)
            .into_iter()
            .map(clean_tag)
            .filter(|t| !t.is_empty())
            .map(str::to_string)
            .collect()
    }

    pub fn title(&self) -> Option<&str> {
        self.get(keys::KEY_TITLE)
    }

    /// The syntax of the content. Absent means zettelmarkup.
    pub fn syntax(&self) -> &str {
        match self.get(keys::KEY_SYNTAX) {
            Some(s) if !s.is_empty() => s,
            _ => keys::DEFAULT_SYNTAX,
        }
    }

    /// Stores a normalised value. Writes to computed `id` are ignored.
    pub fn set(&mut self, key: &str, value: &str) {
        let key = key.trim().to_lowercase();
        if key == keys::KEY_ID || key.is_empty() {
            return;
        }
        let value = normalize_value(key_type(&key), value);
        self.pairs.insert(key, value);
    }

    /// Stores a value only if it is not empty after trimming.
    pub fn set_non_empty(&mut self, key: &str, value: &str) {
        if !value.trim().is_empty() {
            self.set(key, value);
        }
    }

    /// Validates key and value against the key type before storing it.
    pub fn set_checked(&mut self, key: &str, value: &str) -> Result<(), ZettelError> {
        let lkey = key.trim().to_lowercase();
        if !keys::is_valid_key(&lkey) || lkey == keys::KEY_ID {
            return Err(ZettelError::InvalidMeta {
                key: key.to_string(),
                value: value.to_string(),
            });
        }
        let kt = key_type(&lkey);
        let normalized = normalize_value(kt, value);
        if !is_valid_value(kt, &normalized) {
            tracing::warn!("[Meta::set_checked] {} rejects {:?} for {}", kt, value, lkey);
            return Err(ZettelError::InvalidMeta {
                key: lkey,
                value: value.to_string(),
            });
        }
        self.pairs.insert(lkey, normalized);
        Ok(())
    }

    pub fn delete(&mut self, key: &str) -> Option<String> {
        self.pairs.remove(key)
    }

    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    /// Stored pairs in output order: title, role, tags, syntax, then the rest sorted by key.
    pub fn pairs(&self) -> Vec<(&str, &str)> {
        let mut result = Vec::with_capacity(self.pairs.len());
        for first in FIRST_KEYS {
            if let Some(v) = self.pairs.get(*first) {
                result.push((*first, v.as_str()));
            }
        }
        result.extend(
            self.pairs
                .iter()
                .filter(|(k, _)| !FIRST_KEYS.contains(&k.as_str()))
                .map(|(k, v)| (k.as_str(), v.as_str())),
        );
        result
    }

    /// Pairs a user may edit: computed and internal keys are left out.
    pub fn user_pairs(&self) -> Vec<(&str, &str)> {
        self.pairs()
            .into_iter()
            .filter(|(k, _)| !keys::is_computed(k) && !keys::is_internal(k))
            .collect()
    }

    /// Pairs a box persists. Enriched keys are recomputed on every read and never stored.
    pub fn stored_pairs(&self) -> Vec<(&str, &str)> {
        self.pairs()
            .into_iter()
            .filter(|(k, _)| {
                !keys::describe(k)
                    .map(|d| d.usage.contains(KeyUsage::Enriched))
                    .unwrap_or(false)
            })
            .collect()
    }

    /// Pairs including the computed `id` key, which comes first.
    pub fn computed_pairs(&self) -> Vec<(String, String)> {
        let mut result = vec![(keys::KEY_ID.to_string(), self.zid.to_string())];
        result.extend(
            self.pairs()
                .into_iter()
                .map(|(k, v)| (k.to_string(), v.to_string())),
        );
        result
    }

    /// Fills in inherited keys that are missing here from `defaults`.
    pub fn with_defaults(&self, defaults: &Meta) -> InhMeta {
        let mut result = self.clone();
        for (key, value) in defaults.pairs.iter() {
            let inherited = keys::describe(key)
                .map(|d| d.usage.contains(KeyUsage::Inherited))
                .unwrap_or(false);
            if inherited && !result.pairs.contains_key(key) {
                result.pairs.insert(key.clone(), value.clone());
            }
        }
        result
    }

    /// A short human readable dump, one `key: value` per line.
    pub fn dump(&self) -> String {
        let mut out = String::new();
        for (k, v) in self.computed_pairs() {
            let _ = writeln!(out, "{k}: {v}");
        }
        out
    }
}

/// Strips the leading `#` of a stored tag.
pub fn clean_tag(tag: &str) -> &str {
    tag.trim().trim_start_matches('#')
}

/// Stored form of a tag: trimmed, lowercase, with one leading `#`.
pub fn normalize_tag(tag: &str) -> String {
    let cleaned = clean_tag(tag);
    if cleaned.is_empty() {
        String::new()
    } else {
        format!("#{}", cleaned.to_lowercase())
    }
}

pub fn parse_bool(value: &str) -> bool {
    !matches!(
        value.trim().chars().next(),
        None | Some('0') | Some('f') | Some('F') | Some('n') | Some('N')
    )
}

fn normalize_value(kt: KeyType, value: &str) -> String {
    let value = value.trim();
    if kt.is_set() {
        let mut seen: Vec<String> = Vec::new();
        for elem in value.split_whitespace() {
            let elem = match kt {
                KeyType::TagSet => normalize_tag(elem),
                _ => elem.to_string(),
            };
            if !elem.is_empty() && !seen.contains(&elem) {
                seen.push(elem);
            }
        }
        return seen.join(" ");
    }
    match kt {
        KeyType::Word => value.split_whitespace().next().unwrap_or("").to_lowercase(),
        _ => value.split(['\n', '\r']).collect::<Vec<_>>().join(" "),
    }
}

/// Whether a normalised value is acceptable for its key type.
pub fn is_valid_value(kt: KeyType, value: &str) -> bool {
    match kt {
        KeyType::Id => Zid::parse(value).is_ok(),
        KeyType::IdSet => value.split_whitespace().all(|s| Zid::parse(s).is_ok()),
        KeyType::Number => value.parse::<i64>().is_ok(),
        KeyType::Timestamp => is_timestamp(value),
        KeyType::Url => url::Url::parse(value).is_ok(),
        KeyType::Word => !value.is_empty() && !value.contains(char::is_whitespace),
        KeyType::TagSet => value.split_whitespace().all(|t| t.len() > 1),
        KeyType::Bool
        | KeyType::Credential
        | KeyType::Empty
        | KeyType::String
        | KeyType::WordSet
        | KeyType::Zettelmarkup => true,
    }
}

/// Timestamps are `YYYY[MM[DD[hh[mm[ss]]]]]`.
pub fn is_timestamp(value: &str) -> bool {
    matches!(value.len(), 4 | 6 | 8 | 10 | 12 | 14) && value.bytes().all(|b| b.is_ascii_digit())
}

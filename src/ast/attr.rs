use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Key of the default attribute, usually a class or syntax hint.
pub const DEFAULT_KEY: &str = "";
/// A bare `-` attribute. Marks inline comments that must survive cleanup.
pub const DASH_KEY: &str = "-";
pub const CLASS_KEY: &str = "class";

/// Attributes of a node. Keys iterate sorted, so the default key always comes first.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attributes(BTreeMap<String, String>);

impl Attributes {
    pub fn new() -> Attributes {
        Attributes::default()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    pub fn has(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    pub fn default_value(&self) -> Option<&str> {
        self.get(DEFAULT_KEY)
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) -> &mut Self {
        self.0.insert(key.into(), value.into());
        self
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.set(key, value);
        self
    }

    /// Appends to a space separated value, as classes accumulate.
    pub fn add(&mut self, key: &str, value: &str) {
        match self.0.get_mut(key) {
            Some(existing) if !existing.is_empty() => {
                if !existing.split(' ').any(|v| v == value) {
                    existing.push(' ');
                    existing.push_str(value);
                }
            }
            _ => {
                self.0.insert(key.to_string(), value.to_string());
            }
        }
    }

    pub fn add_class(&mut self, class: &str) {
        self.add(CLASS_KEY, class);
    }

    pub fn remove(&mut self, key: &str) -> Option<String> {
        self.0.remove(key)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// True if the default value names the given syntax, ignoring case.
    pub fn has_default_syntax(&self, syntax: &str) -> bool {
        self.default_value()
            .map(|v| v.eq_ignore_ascii_case(syntax))
            .unwrap_or(false)
    }
}

impl FromIterator<(String, String)> for Attributes {
    fn from_iter<T: IntoIterator<Item = (String, String)>>(iter: T) -> Self {
        Attributes(iter.into_iter().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_key_sorts_first() {
        let mut a = Attributes::new();
        a.set("lang", "en").set(DEFAULT_KEY, "go");
        let keys: Vec<&str> = a.iter().map(|(k, _)| k).collect();
        assert_eq!(keys, vec!["", "lang"]);
    }

    #[test]
    fn classes_accumulate_once() {
        let mut a = Attributes::new();
        a.add_class("x");
        a.add_class("y");
        a.add_class("x");
        assert_eq!(a.get("class"), Some("x y"));
    }
}

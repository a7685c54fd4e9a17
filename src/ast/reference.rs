use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};

use crate::id::Zid;

pub const QUERY_PREFIX: &str = "query:";

/// How a reference resolves. The parser assigns a preliminary state, the evaluator refines it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RefState {
    Invalid,
    Zettel,
    SelfRef,
    Found,
    Broken,
    Hosted,
    Based,
    External,
    Query,
}

impl RefState {
    /// Symbol suffix used by the s-expression encodings.
    pub fn symbol(&self) -> &'static str {
        match self {
            RefState::Invalid => "INVALID",
            RefState::Zettel => "ZETTEL",
            RefState::SelfRef => "SELF",
            RefState::Found => "FOUND",
            RefState::Broken => "BROKEN",
            RefState::Hosted => "HOSTED",
            RefState::Based => "BASED",
            RefState::External => "EXTERNAL",
            RefState::Query => "QUERY",
        }
    }

    pub fn from_symbol(s: &str) -> Option<RefState> {
        Some(match s {
            "INVALID" => RefState::Invalid,
            "ZETTEL" => RefState::Zettel,
            "SELF" => RefState::SelfRef,
            "FOUND" => RefState::Found,
            "BROKEN" => RefState::Broken,
            "HOSTED" => RefState::Hosted,
            "BASED" => RefState::Based,
            "EXTERNAL" => RefState::External,
            "QUERY" => RefState::Query,
            _ => return None,
        })
    }
}

/// A URL-like reference found in links, embeds and transclusions.
///
/// For query references `value` holds the query expression without its `query:` prefix.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Reference {
    pub value: String,
    pub state: RefState,
}

impl Reference {
    pub fn new(value: impl Into<String>, state: RefState) -> Reference {
        Reference {
            value: value.into(),
            state,
        }
    }

    pub fn parse(s: &str) -> Reference {
        if s.is_empty() || s == "00000000000000" {
            return Reference::new(s, RefState::Invalid);
        }
        if let Some(q) = s.strip_prefix(QUERY_PREFIX) {
            return Reference::new(q, RefState::Query);
        }
        if let Some(state) = local_state(s) {
            return Reference::new(s, state);
        }
        if s.starts_with('#') {
            if s.len() > 1 && !s.contains(char::is_whitespace) {
                return Reference::new(s, RefState::SelfRef);
            }
            return Reference::new(s, RefState::Invalid);
        }
        let (path, _) = split_fragment(s);
        if path.len() == 14 && path.bytes().all(|b| b.is_ascii_digit()) {
            return match Zid::parse(path) {
                Ok(_) => Reference::new(s, RefState::Zettel),
                Err(_) => Reference::new(s, RefState::Invalid),
            };
        }
        if s.contains(char::is_whitespace) {
            return Reference::new(s, RefState::Invalid);
        }
        match url::Url::parse(s) {
            Ok(_) => Reference::new(s, RefState::External),
            Err(_) => Reference::new(s, RefState::Invalid),
        }
    }

    /// The target zettel of zettel-like references.
    pub fn zid(&self) -> Option<Zid> {
        match self.state {
            RefState::Zettel | RefState::Found | RefState::Broken => {
                Zid::parse(split_fragment(&self.value).0).ok()
            }
            _ => None,
        }
    }

    pub fn fragment(&self) -> Option<&str> {
        match self.state {
            RefState::Query => None,
            _ => split_fragment(&self.value).1.filter(|f| !f.is_empty()),
        }
    }

    pub fn is_zettel(&self) -> bool {
        matches!(
            self.state,
            RefState::Zettel | RefState::Found | RefState::Broken
        )
    }

    pub fn is_local(&self) -> bool {
        matches!(self.state, RefState::Hosted | RefState::Based)
    }

    pub fn is_external(&self) -> bool {
        self.state == RefState::External
    }

    pub fn is_valid(&self) -> bool {
        self.state != RefState::Invalid
    }

    /// Source form, as written in zettelmarkup.
    pub fn source(&self) -> String {
        match self.state {
            RefState::Query => format!("{QUERY_PREFIX}{}", self.value),
            _ => self.value.clone(),
        }
    }

    /// Lowercased extension of the path part, if any.
    pub fn extension(&self) -> Option<String> {
        let (path, _) = split_fragment(&self.value);
        let path = path.split('?').next().unwrap_or(path);
        let name = path.rsplit('/').next().unwrap_or(path);
        name.rsplit_once('.')
            .map(|(_, ext)| ext.to_ascii_lowercase())
            .filter(|ext| !ext.is_empty())
    }
}

impl Display for Reference {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.source())
    }
}

fn local_state(s: &str) -> Option<RefState> {
    if s.starts_with("//") {
        Some(RefState::Based)
    } else if s.starts_with('/') || s.starts_with("./") || s.starts_with("../") {
        Some(RefState::Hosted)
    } else {
        None
    }
}

fn split_fragment(s: &str) -> (&str, Option<&str>) {
    match s.split_once('#') {
        Some((path, frag)) => (path, Some(frag)),
        None => (s, None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn preliminary_states() {
        let cases = [
            ("", RefState::Invalid),
            ("00000000000000", RefState::Invalid),
            ("20240101120000", RefState::Zettel),
            ("20240101120000#intro", RefState::Zettel),
            ("#intro", RefState::SelfRef),
            ("/files/a.png", RefState::Hosted),
            ("../a.png", RefState::Hosted),
            ("//static/a.css", RefState::Based),
            ("https://example.org/x", RefState::External),
            ("query:tags:a", RefState::Query),
            ("no scheme", RefState::Invalid),
            ("word", RefState::Invalid),
        ];
        for (src, state) in cases {
            assert_eq!(Reference::parse(src).state, state, "{src:?}");
        }
    }

    #[test]
    fn zid_and_fragment() {
        let r = Reference::parse("20240101120000#intro");
        assert_eq!(r.zid().map(|z| z.to_string()).as_deref(), Some("20240101120000"));
        assert_eq!(r.fragment(), Some("intro"));
        assert_eq!(Reference::parse("query:a b").source(), "query:a b");
    }

    #[test]
    fn extension_of_local_reference() {
        assert_eq!(Reference::parse("/img/a.PNG").extension().as_deref(), Some("png"));
        assert_eq!(Reference::parse("/img/a").extension(), None);
    }
}

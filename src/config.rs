//! Configuration, loaded from TOML.
//!
//! ```toml
//! box-uri = ["dir:///srv/zettel", "mem:?max-zettel=100"]
//! read-only = false
//!
//! [runtime]
//! max-transclusions = 1024
//! insecure-html = "none"
//! ```
//!
//! The box manager and the evaluator only see the narrow [`RuntimeConfig`] trait.
use std::{
    fmt::{Display, Formatter},
    fs::read_to_string,
    path::Path,
    str::FromStr,
};

use serde::{Deserialize, Serialize};

use crate::{
    error::ZettelError,
    id::Zid,
    meta::{
        keys::{KEY_LANG, KEY_ROLE, KEY_SYNTAX, KEY_VISIBILITY},
        InhMeta, Meta,
    },
};

pub const DEFAULT_MAX_TRANSCLUSIONS: usize = 1024;
pub const DEFAULT_INDEX_QUEUE_CAPACITY: usize = 4096;

/// Which content syntaxes may carry raw HTML into the output. Each level includes the ones
/// before it.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum HtmlInsecurity {
    #[default]
    None,
    Html,
    Markdown,
    Zettelmarkup,
}

impl HtmlInsecurity {
    /// Whether raw HTML written in content of the given syntax may be kept.
    pub fn allow_html(&self, syntax: &str) -> bool {
        match syntax {
            "html" => *self >= HtmlInsecurity::Html,
            "markdown" | "md" => *self >= HtmlInsecurity::Markdown,
            _ => *self >= HtmlInsecurity::Zettelmarkup,
        }
    }
}

impl FromStr for HtmlInsecurity {
    type Err = ZettelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "none" | "" => Ok(HtmlInsecurity::None),
            "html" => Ok(HtmlInsecurity::Html),
            "markdown" => Ok(HtmlInsecurity::Markdown),
            "zettelmarkup" | "zmk" => Ok(HtmlInsecurity::Zettelmarkup),
            other => Err(ZettelError::Config(format!(
                "unknown insecure-html value {other:?}"
            ))),
        }
    }
}

impl Display for HtmlInsecurity {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            HtmlInsecurity::None => "none",
            HtmlInsecurity::Html => "html",
            HtmlInsecurity::Markdown => "markdown",
            HtmlInsecurity::Zettelmarkup => "zettelmarkup",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct RuntimeSettings {
    pub max_transclusions: usize,
    pub insecure_html: HtmlInsecurity,
    pub default_syntax: String,
    pub default_lang: String,
    pub default_role: String,
    pub default_visibility: String,
    pub site_name: String,
    pub home_zettel: Zid,
    pub footer: Option<String>,
}

impl Default for RuntimeSettings {
    fn default() -> Self {
        RuntimeSettings {
            max_transclusions: DEFAULT_MAX_TRANSCLUSIONS,
            insecure_html: HtmlInsecurity::None,
            default_syntax: "zmk".to_string(),
            default_lang: "en".to_string(),
            default_role: "zettel".to_string(),
            default_visibility: "login".to_string(),
            site_name: "Zettelstore".to_string(),
            home_zettel: Zid::DEFAULT_HOME,
            footer: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct Config {
    /// Box URIs, in lookup order.
    pub box_uri: Vec<String>,
    pub read_only: bool,
    pub index_queue_capacity: usize,
    pub runtime: RuntimeSettings,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            box_uri: Vec::new(),
            read_only: false,
            index_queue_capacity: DEFAULT_INDEX_QUEUE_CAPACITY,
            runtime: RuntimeSettings::default(),
        }
    }
}

impl Config {
    pub fn from_toml_str(s: &str) -> Result<Config, ZettelError> {
        let config: Config = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    /// Reads the configuration file. A missing file gives the default configuration.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Config, ZettelError> {
        let path = path.as_ref();
        tracing::debug!("Attempting to read configuration from: {:?}", path);
        if !path.exists() {
            tracing::debug!("Config file not found, using defaults.");
            return Ok(Config::default());
        }
        let content = read_to_string(path)?;
        Config::from_toml_str(&content)
    }

    pub fn to_toml_string(&self) -> Result<String, ZettelError> {
        Ok(toml::to_string(self)?)
    }

    fn validate(&self) -> Result<(), ZettelError> {
        if self.index_queue_capacity == 0 {
            return Err(ZettelError::Config(
                "index-queue-capacity must be positive".to_string(),
            ));
        }
        if !self.runtime.home_zettel.is_valid() {
            return Err(ZettelError::Config("home-zettel is invalid".to_string()));
        }
        Ok(())
    }

    /// Key/value view, as shown by the configuration zettel.
    pub fn describe(&self) -> Vec<(String, String)> {
        let rt = &self.runtime;
        vec![
            ("box-uri".to_string(), self.box_uri.join(" ")),
            ("read-only".to_string(), self.read_only.to_string()),
            (
                "index-queue-capacity".to_string(),
                self.index_queue_capacity.to_string(),
            ),
            (
                "max-transclusions".to_string(),
                rt.max_transclusions.to_string(),
            ),
            ("insecure-html".to_string(), rt.insecure_html.to_string()),
            ("default-syntax".to_string(), rt.default_syntax.clone()),
            ("default-lang".to_string(), rt.default_lang.clone()),
            ("default-role".to_string(), rt.default_role.clone()),
            (
                "default-visibility".to_string(),
                rt.default_visibility.clone(),
            ),
            ("site-name".to_string(), rt.site_name.clone()),
            ("home-zettel".to_string(), rt.home_zettel.to_string()),
        ]
    }
}

/// The part of the configuration the box manager and the evaluator depend on.
pub trait RuntimeConfig: Send + Sync {
    /// Flattened metadata with inherited defaults applied.
    fn add_defaults(&self, meta: &Meta) -> InhMeta;
    fn max_transclusions(&self) -> usize;
    fn html_insecurity(&self) -> HtmlInsecurity;
    fn home_zettel(&self) -> Zid;
    fn site_name(&self) -> &str;
}

impl RuntimeConfig for Config {
    fn add_defaults(&self, meta: &Meta) -> InhMeta {
        let rt = &self.runtime;
        let mut defaults = Meta::new(meta.zid());
        defaults.set(KEY_SYNTAX, &rt.default_syntax);
        defaults.set(KEY_LANG, &rt.default_lang);
        defaults.set(KEY_ROLE, &rt.default_role);
        defaults.set(KEY_VISIBILITY, &rt.default_visibility);
        meta.with_defaults(&defaults)
    }

    fn max_transclusions(&self) -> usize {
        self.runtime.max_transclusions
    }

    fn html_insecurity(&self) -> HtmlInsecurity {
        self.runtime.insecure_html
    }

    fn home_zettel(&self) -> Zid {
        self.runtime.home_zettel
    }

    fn site_name(&self) -> &str {
        &self.runtime.site_name
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_toml_with_defaults() {
        let config = Config::from_toml_str(
            r#"
box-uri = ["dir:///tmp/z", "mem:"]

[runtime]
max-transclusions = 5
insecure-html = "markdown"
"#,
        )
        .unwrap();
        assert_eq!(config.box_uri.len(), 2);
        assert_eq!(config.max_transclusions(), 5);
        assert_eq!(config.html_insecurity(), HtmlInsecurity::Markdown);
        assert_eq!(config.index_queue_capacity, DEFAULT_INDEX_QUEUE_CAPACITY);
        assert_eq!(config.runtime.default_lang, "en");
    }

    #[test]
    fn rejects_bad_values() {
        assert!(Config::from_toml_str("index-queue-capacity = 0").is_err());
        assert!(Config::from_toml_str("[runtime]\ninsecure-html = \"all\"").is_err());
    }

    #[test]
    fn html_insecurity_levels() {
        assert!(!HtmlInsecurity::None.allow_html("html"));
        assert!(HtmlInsecurity::Html.allow_html("html"));
        assert!(!HtmlInsecurity::Html.allow_html("md"));
        assert!(HtmlInsecurity::Markdown.allow_html("markdown"));
        assert!(!HtmlInsecurity::Markdown.allow_html("zmk"));
        assert!(HtmlInsecurity::Zettelmarkup.allow_html("zmk"));
    }

    #[test]
    fn inherited_defaults() {
        let config = Config::default();
        let meta = Meta::new(Zid::parse("20240101120000").unwrap());
        let inh = config.add_defaults(&meta);
        assert_eq!(inh.syntax(), "zmk");
        assert_eq!(inh.get(KEY_LANG), Some("en"));
    }

    #[test]
    fn missing_file_gives_defaults() {
        let config = Config::load("/nonexistent/zettel.toml").unwrap();
        assert_eq!(config, Config::default());
    }
}

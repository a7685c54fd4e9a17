use std::{fmt, io, path::StripPrefixError};

use http::status::StatusCode;
use pulldown_cmark_to_cmark::Error as CmarkToCmarkError;
use regex::Error as RegexError;
use serde::{Deserialize, Serialize};
use serde_json::Error as JsonError;
use thiserror::Error;
use url::ParseError as UrlParseError;

#[cfg(feature = "service")]
use notify::{Error as NotifyError, ErrorKind as NotifyErrorKind};

use crate::id::Zid;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Error)]
pub enum ZettelError {
    #[error("Zettel not found: {0}")]
    NotFound(Zid),
    #[error("Operation '{op}' not allowed for zettel {zid}")]
    NotAllowed { op: String, zid: Zid },
    #[error("Box or manager is read-only")]
    ReadOnly,
    #[error("Invalid zettel identifier: {0:?}")]
    InvalidZid(String),
    #[error("Invalid metadata value {value:?} for key {key:?}")]
    InvalidMeta { key: String, value: String },
    #[error("Parser nesting or size limit exceeded")]
    ParserLimit,
    #[error("Transclusion limit exhausted")]
    EvalLimit,
    #[error("Recursive transclusion of zettel {0}")]
    EvalCycle(Zid),
    #[error("Box unavailable: {0}")]
    BoxUnavailable(String),
    #[error("I/O error: {0}")]
    Io(String),
    #[error("(De)Serialization error: {0}")]
    Serialization(String),
    #[error("Configuration error: {0}")]
    Config(String),
    #[error("Encoding error: {0}")]
    Encoding(String),
    #[error("Operation cancelled")]
    Cancelled,
}

impl ZettelError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            ZettelError::NotFound(_) => StatusCode::NOT_FOUND,
            ZettelError::NotAllowed { .. } => StatusCode::FORBIDDEN,
            ZettelError::ReadOnly => StatusCode::FORBIDDEN,
            ZettelError::InvalidZid(_) => StatusCode::BAD_REQUEST,
            ZettelError::InvalidMeta { .. } => StatusCode::BAD_REQUEST,
            ZettelError::ParserLimit => StatusCode::UNPROCESSABLE_ENTITY,
            ZettelError::EvalLimit => StatusCode::UNPROCESSABLE_ENTITY,
            ZettelError::EvalCycle(_) => StatusCode::UNPROCESSABLE_ENTITY,
            ZettelError::BoxUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            ZettelError::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ZettelError::Serialization(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ZettelError::Config(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ZettelError::Encoding(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ZettelError::Cancelled => StatusCode::NO_CONTENT,
        }
    }

    /// Whether the error means "nothing there", as opposed to a failure of the backend.
    pub fn is_not_found(&self) -> bool {
        matches!(self, ZettelError::NotFound(_))
    }
}

impl From<io::Error> for ZettelError {
    fn from(x: io::Error) -> Self {
        match x.kind() {
            io::ErrorKind::NotFound => ZettelError::NotFound(Zid::INVALID),
            io::ErrorKind::PermissionDenied => ZettelError::NotAllowed {
                op: "io".to_string(),
                zid: Zid::INVALID,
            },
            _ => ZettelError::Io(format!("IOError: {x}")),
        }
    }
}

impl From<StripPrefixError> for ZettelError {
    fn from(src: StripPrefixError) -> ZettelError {
        ZettelError::Io(format!("Strip prefix failed for path. Error: {src}"))
    }
}

impl From<toml::de::Error> for ZettelError {
    fn from(src: toml::de::Error) -> ZettelError {
        ZettelError::Serialization(format!("Toml deserialization error: {src}"))
    }
}

impl From<toml::ser::Error> for ZettelError {
    fn from(src: toml::ser::Error) -> ZettelError {
        ZettelError::Serialization(format!("Toml serialization error: {src}"))
    }
}

impl From<JsonError> for ZettelError {
    fn from(src: JsonError) -> ZettelError {
        ZettelError::Serialization(format!("JSON (de)serialization error: {src}"))
    }
}

impl From<UrlParseError> for ZettelError {
    fn from(src: UrlParseError) -> ZettelError {
        ZettelError::Serialization(format!("Invalid URL: {src}"))
    }
}

impl From<RegexError> for ZettelError {
    fn from(x: RegexError) -> Self {
        ZettelError::Serialization(format!("Regex parse failed: {x}"))
    }
}

impl From<fmt::Error> for ZettelError {
    fn from(x: fmt::Error) -> Self {
        ZettelError::Encoding(format!("{x}"))
    }
}

impl From<CmarkToCmarkError> for ZettelError {
    fn from(x: CmarkToCmarkError) -> Self {
        ZettelError::Encoding(format!("{x}"))
    }
}

#[cfg(feature = "service")]
impl From<NotifyError> for ZettelError {
    fn from(notify_error: NotifyError) -> Self {
        match notify_error.kind {
            NotifyErrorKind::Generic(msg) => ZettelError::BoxUnavailable(format!(
                "notify-debouncer: {}, paths: {:?}",
                msg, notify_error.paths
            )),
            NotifyErrorKind::Io(io_error) => ZettelError::Io(format!(
                "notify-debouncer: io error {}, paths: {:?}",
                io_error.kind(),
                notify_error.paths
            )),
            NotifyErrorKind::PathNotFound | NotifyErrorKind::WatchNotFound => {
                ZettelError::BoxUnavailable(format!(
                    "notify-debouncer: path(s) not found: {:?}",
                    notify_error.paths
                ))
            }
            NotifyErrorKind::InvalidConfig(_) => {
                ZettelError::Config("notify-debouncer invalid config".to_string())
            }
            NotifyErrorKind::MaxFilesWatch => ZettelError::BoxUnavailable(
                "notify-debouncer max file watch limit reached".to_string(),
            ),
        }
    }
}

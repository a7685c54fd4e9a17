//! Zettel identifiers.
//!
//! A [`Zid`] is a 14 digit decimal number, usually the timestamp `YYYYMMDDhhmmss` of the moment
//! the zettel was created. Identifiers below `00000000010000` are reserved for zettel that ship
//! with the software or are computed at runtime.
use chrono::{Local, NaiveDateTime};
use serde::{de, Deserialize, Deserializer, Serialize, Serializer};
use std::{
    fmt::{Display, Formatter},
    str::FromStr,
};

use crate::error::ZettelError;

const ZID_LEN: usize = 14;
const MAX_ZID: u64 = 99_999_999_999_999;
const TIMESTAMP_FORMAT: &str = "%Y%m%d%H%M%S";

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Zid(u64);

impl Zid {
    pub const INVALID: Zid = Zid(0);
    pub const VERSION: Zid = Zid(1);
    pub const HOST: Zid = Zid(2);
    pub const BOX_MANAGER: Zid = Zid(20);
    pub const METADATA_KEYS: Zid = Zid(90);
    pub const PARSERS: Zid = Zid(92);
    pub const CONFIGURATION: Zid = Zid(100);
    pub const BASE_CSS: Zid = Zid(20_001);
    pub const EMOJI: Zid = Zid(40_001);
    pub const ZMK_HELP: Zid = Zid(60_010);
    pub const DEFAULT_HOME: Zid = Zid(10_000_000_000);

    /// Parses exactly 14 decimal digits. The all-zero value is rejected.
    pub fn parse(s: &str) -> Result<Zid, ZettelError> {
        if s.len() != ZID_LEN || !s.bytes().all(|b| b.is_ascii_digit()) {
            return Err(ZettelError::InvalidZid(s.to_string()));
        }
        match s.parse::<u64>() {
            Ok(0) | Err(_) => Err(ZettelError::InvalidZid(s.to_string())),
            Ok(n) => Ok(Zid(n)),
        }
    }

    pub fn from_u64(n: u64) -> Option<Zid> {
        if n == 0 || n > MAX_ZID {
            None
        } else {
            Some(Zid(n))
        }
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }

    pub fn is_valid(&self) -> bool {
        self.0 > 0 && self.0 <= MAX_ZID
    }

    /// Reserved identifiers belong to bundled or computed zettel.
    pub fn is_reserved(&self) -> bool {
        self.0 < 10_000
    }

    /// A fresh identifier derived from the current local time.
    pub fn now() -> Zid {
        Zid::from_timestamp(&Local::now().naive_local())
    }

    pub fn from_timestamp(ts: &NaiveDateTime) -> Zid {
        let s = ts.format(TIMESTAMP_FORMAT).to_string();
        Zid::parse(&s).unwrap_or(Zid::INVALID)
    }

    /// Interprets the identifier as a creation timestamp, if it is one.
    pub fn timestamp(&self) -> Option<NaiveDateTime> {
        NaiveDateTime::parse_from_str(&self.to_string(), TIMESTAMP_FORMAT).ok()
    }

    /// The next identifier in timestamp order, used to resolve creation collisions.
    pub fn next(&self) -> Zid {
        match self.timestamp() {
            Some(ts) => Zid::from_timestamp(&(ts + chrono::Duration::seconds(1))),
            None => Zid(self.0 + 1),
        }
    }
}

impl Display for Zid {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:014}", self.0)
    }
}

impl FromStr for Zid {
    type Err = ZettelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Zid::parse(s)
    }
}

impl Serialize for Zid {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for Zid {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        if s == "00000000000000" {
            return Ok(Zid::INVALID);
        }
        Zid::parse(&s).map_err(de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_and_display() {
        let zid = Zid::parse("20231224183000").unwrap();
        assert_eq!(zid.to_string(), "20231224183000");
        assert_eq!(Zid::CONFIGURATION.to_string(), "00000000000100");
        assert_eq!(Zid::INVALID.to_string(), "00000000000000");
    }

    #[test]
    fn rejects_malformed() {
        for bad in ["", "123", "0000000000000a", "00000000000000", "123456789012345"] {
            assert!(Zid::parse(bad).is_err(), "{bad:?} should be rejected");
        }
        assert!(Zid::parse("00000000000100").is_ok());
    }

    #[test]
    fn ordering_follows_numeric_value() {
        let a = Zid::parse("20200101000000").unwrap();
        let b = Zid::parse("20210101000000").unwrap();
        assert!(a < b);
        assert!(Zid::VERSION < Zid::CONFIGURATION);
    }

    #[test]
    fn next_advances_one_second() {
        let zid = Zid::parse("20231231235959").unwrap();
        assert_eq!(zid.next().to_string(), "20240101000000");
        assert_eq!(Zid::VERSION.next(), Zid::HOST);
    }
}

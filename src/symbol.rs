//! Trading symbols.
//!
//! The source this crate is modeled on hard-codes a closed set of
//! crypto/USD pairs (`BTC-USD`, `ETH-USD`, …). The spec calls for a venue
//! that matches orders against any "named trading symbol" the registry has
//! been told to create a book for, so `Symbol` is a validated newtype
//! around a `String` rather than a fixed enum — the registry, not the
//! type system, decides which symbols exist (via `addOrderBook`).

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::errors::EngineError;

/// A validated trading symbol, e.g. `"BTC-USD"` or `"AAPL"`.
///
/// Symbols are ASCII, 1–32 bytes, and made up of letters, digits, `-` and
/// `_` — permissive enough for both crypto pairs and equity tickers,
/// strict enough to be safe as a store key component and a URL path
/// segment.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Symbol(String);

impl Symbol {
    pub fn new(raw: impl Into<String>) -> Result<Self, EngineError> {
        let raw = raw.into();
        let valid = !raw.is_empty()
            && raw.len() <= 32
            && raw
                .bytes()
                .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_');
        if !valid {
            return Err(EngineError::InvalidNumber(format!(
                "unsupported symbol `{raw}`"
            )));
        }
        Ok(Symbol(raw))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for Symbol {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Symbol::new(s)
    }
}

impl TryFrom<String> for Symbol {
    type Error = EngineError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Symbol::new(value)
    }
}

impl From<Symbol> for String {
    fn from(value: Symbol) -> Self {
        value.0
    }
}

impl Serialize for Symbol {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for Symbol {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Symbol::new(s).map_err(serde::de::Error::custom)
    }
}

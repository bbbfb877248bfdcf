//! Exact-precision decimal substrate.
//!
//! Prices and quantities never touch a float. We lean on [`rust_decimal`]
//! rather than hand-rolling a bignum: it already gives us exact add/sub,
//! a total order, and a `Display`/`FromStr` pair that round-trips, which is
//! everything the core asks of "Decimal". What this module adds on top is
//! the one thing `rust_decimal` doesn't know about our domain: the
//! canonical-string discipline a price level's map key depends on.

use rust_decimal::Decimal;

use crate::errors::EngineError;

/// Parses a client-supplied price or quantity string.
///
/// Returns `InvalidNumber` rather than panicking — this is the boundary
/// where untrusted strings become `Decimal`, so it must never panic on
/// malformed input.
pub fn parse_decimal(raw: &str) -> Result<Decimal, EngineError> {
    raw.trim()
        .parse::<Decimal>()
        .map_err(|_| EngineError::InvalidNumber(raw.to_string()))
}

/// Normalizes a decimal to the canonical minimal form used as a price-level
/// map key and as the wire representation crossing the store/transport
/// boundary: no trailing fractional zeros (except for exact zero), no
/// superfluous leading zeros, a single `-` for negatives.
pub fn canonicalize(value: Decimal) -> Decimal {
    value.normalize()
}

/// The canonical string form of a decimal, suitable as a price-level key.
pub fn canonical_key(value: Decimal) -> String {
    canonicalize(value).to_string()
}

//! Core types: Symbol and the cents money convention.

use std::fmt;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Ticker symbol stored inline (no heap allocation), at most 8 ASCII bytes.
///
/// `Symbol` is `Copy`, so it can be used freely as a hash-map key and passed
/// by value through the engine. Ordering is lexicographic on the ticker.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Symbol {
    bytes: [u8; Symbol::MAX_LEN],
    len: u8,
}

impl Symbol {
    /// Maximum ticker length in bytes.
    pub const MAX_LEN: usize = 8;

    /// Create a symbol, returning `None` if `s` is empty, longer than
    /// [`Symbol::MAX_LEN`] bytes, or contains non-printable / non-ASCII bytes.
    pub fn try_new(s: &str) -> Option<Self> {
        let raw = s.as_bytes();
        if raw.is_empty() || raw.len() > Self::MAX_LEN {
            return None;
        }
        if !raw.iter().all(|b| b.is_ascii_graphic()) {
            return None;
        }
        let mut bytes = [0u8; Self::MAX_LEN];
        bytes[..raw.len()].copy_from_slice(raw);
        Some(Self {
            bytes,
            len: raw.len() as u8,
        })
    }

    /// Create a symbol.
    ///
    /// # Panics
    ///
    /// Panics if `s` is not a valid ticker (see [`Symbol::try_new`]).
    #[track_caller]
    pub fn new(s: &str) -> Self {
        match Self::try_new(s) {
            Some(sym) => sym,
            None => panic!("invalid symbol: {s:?}"),
        }
    }

    /// The ticker as a string slice.
    pub fn as_str(&self) -> &str {
        // Only ASCII bytes are ever stored.
        std::str::from_utf8(&self.bytes[..self.len as usize]).unwrap_or_default()
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

impl fmt::Debug for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Symbol({:?})", self.as_str())
    }
}

impl Serialize for Symbol {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for Symbol {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Symbol::try_new(&s)
            .ok_or_else(|| serde::de::Error::custom(format!("invalid symbol: {s:?}")))
    }
}

/// Convert a dollar amount to integer cents (rounded to nearest).
#[inline]
pub fn to_cents(dollars: f64) -> i64 {
    (dollars * 100.0).round() as i64
}

/// Convert integer cents to dollars.
#[inline]
pub fn to_dollars(cents: i64) -> f64 {
    cents as f64 / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn symbol_roundtrip() {
        let s = Symbol::new("BRK.B");
        assert_eq!(s.as_str(), "BRK.B");
        assert_eq!(format!("{s}"), "BRK.B");
        assert_eq!(format!("{s:?}"), "Symbol(\"BRK.B\")");
    }

    #[test]
    fn symbol_rejects_bad_input() {
        assert!(Symbol::try_new("").is_none());
        assert!(Symbol::try_new("TOOLONGNAME").is_none());
        assert!(Symbol::try_new("AA PL").is_none());
        assert!(Symbol::try_new("ÄPL").is_none());
    }

    #[test]
    fn symbol_ordering_is_lexicographic() {
        assert!(Symbol::new("AB") < Symbol::new("ABC"));
        assert!(Symbol::new("ABC") < Symbol::new("ABD"));
        assert!(Symbol::new("QQQ") < Symbol::new("SPY"));
    }

    #[test]
    fn symbol_serde() {
        let json = serde_json::to_string(&Symbol::new("SPY")).unwrap();
        assert_eq!(json, "\"SPY\"");
        let back: Symbol = serde_json::from_str(&json).unwrap();
        assert_eq!(back, Symbol::new("SPY"));
        assert!(serde_json::from_str::<Symbol>("\"WAYTOOLONG\"").is_err());
    }

    #[test]
    fn cents_conversion() {
        assert_eq!(to_cents(105.0), 105_00);
        assert_eq!(to_cents(0.016), 2);
        assert_eq!(to_cents(-12.344), -12_34);
        assert_eq!(to_dollars(12_34), 12.34);
    }
}

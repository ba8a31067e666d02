// 🏠 Address Normalizer - canonical form + (unit, number, street) split
//
// Two cleaning strengths:
// - normal: lowercase, city qualifier and E/W direction tokens removed
// - strong: also street types and a leading unit number removed, used to
//   match a business address against a property address

use crate::error::AddressError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// City qualifier as it appears in both source files
const CITY_QUALIFIER: &str = ", vancouver";

/// Single-letter direction tokens ("1209 Hastings St E")
const DIRECTION_TOKENS: &[&str] = &["e", "w"];

/// Street-type tokens dropped by strong normalization
const STREET_TYPE_TOKENS: &[&str] = &["st", "av", "ave", "drive", "dr", "diversion"];

// ============================================================================
// ADDRESS
// ============================================================================

/// Decomposed address, e.g. "101 305 pender st" -> (101, 305, "pender st")
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Address {
    pub unit: Option<i64>,
    pub street_number: i64,
    pub street_name: String,
}

impl Address {
    /// Block number: 1209 -> 12, 305 -> 3
    pub fn block(&self) -> i64 {
        self.street_number.div_euclid(100)
    }

    /// First word of the street name ("pender street" -> "pender").
    /// This is the form the governed street table is keyed by.
    pub fn street_key(&self) -> &str {
        self.street_name.split_whitespace().next().unwrap_or("")
    }

    /// Same street, two doors down (the other side of an odd/even pair).
    /// None when the street number would underflow.
    pub fn previous_neighbour(&self) -> Option<Address> {
        Some(Address {
            unit: self.unit,
            street_number: self.street_number.checked_sub(2)?,
            street_name: self.street_name.clone(),
        })
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.unit {
            Some(unit) => write!(f, "{} {} {}", unit, self.street_number, self.street_name),
            None => write!(f, "{} {}", self.street_number, self.street_name),
        }
    }
}

// ============================================================================
// NORMALIZATION
// ============================================================================

/// Canonical comparable form of a raw address. Never fails: garbage in gives
/// a degenerate string, which `decompose` then rejects.
pub fn normalize(raw: &str, strong: bool) -> String {
    // Stripping one token can expose another (", e vancouver"), so run to a
    // fixed point. Every pass only shortens the string.
    let mut address = raw.to_lowercase();
    loop {
        let next = clean_once(&address);
        if next == address {
            break;
        }
        address = next;
    }

    if strong {
        address = strong_clean(&address);
    }

    address
}

/// Shorthand for `normalize(raw, true)`
pub fn strong_normalize(raw: &str) -> String {
    normalize(raw, true)
}

fn clean_once(address: &str) -> String {
    let without_city = address.replace(CITY_QUALIFIER, "");

    without_city
        .split_whitespace()
        .enumerate()
        .filter(|(i, token)| *i == 0 || !DIRECTION_TOKENS.contains(token))
        .map(|(_, token)| token)
        .collect::<Vec<_>>()
        .join(" ")
}

fn strong_clean(address: &str) -> String {
    let mut tokens: Vec<&str> = address
        .split_whitespace()
        .filter(|token| !STREET_TYPE_TOKENS.contains(token))
        .collect();

    // A number in second place means the first token was a unit number
    if tokens.len() > 1 && is_integer(tokens[1]) {
        tokens.remove(0);
    }

    tokens.join(" ")
}

fn is_integer(token: &str) -> bool {
    token.parse::<i64>().is_ok()
}

// ============================================================================
// DECOMPOSITION
// ============================================================================

/// Split an address into (unit, street number, street name).
///
/// Layouts, on the normalized tokens:
/// - `{unit} {number} {street...}` when the second token is a number
/// - `{number} {street...}` when only the first token is
///
/// Anything else has no street number and is an `AddressError`.
pub fn decompose(raw: &str) -> Result<Address, AddressError> {
    let clean = normalize(raw, false);
    let parts: Vec<&str> = clean.split_whitespace().collect();

    let first = parts.first().and_then(|t| t.parse::<i64>().ok());
    let second = parts.get(1).and_then(|t| t.parse::<i64>().ok());

    let (unit, street_number, rest) = match (first, second) {
        (Some(unit), Some(number)) => (Some(unit), number, &parts[2..]),
        (Some(number), None) => (None, number, &parts[1..]),
        _ => return Err(AddressError::new(raw)),
    };

    if rest.is_empty() {
        return Err(AddressError::new(raw));
    }

    Ok(Address {
        unit,
        street_number,
        street_name: rest.join(" "),
    })
}

/// "318 powell st" -> "316 powell st". Input must already be normalized.
pub fn previous_neighbour_of(clean: &str) -> Result<String, AddressError> {
    let address = decompose(clean)?;
    address
        .previous_neighbour()
        .map(|previous| previous.to_string())
        .ok_or_else(|| AddressError::new(clean))
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_basic() {
        assert_eq!(normalize("  305 PENDER ST E, VANCOUVER ", false), "305 pender st");
        assert_eq!(normalize("1209 E Hastings St", false), "1209 hastings st");
        assert_eq!(normalize("400 Powell W", false), "400 powell");
        assert_eq!(normalize("305  Pender   St", false), "305 pender st");
    }

    #[test]
    fn test_normalize_keeps_letters_inside_words() {
        // Only whole-word E/W tokens go
        assert_eq!(normalize("55 West Pender", false), "55 west pender");
        assert_eq!(normalize("12 Ewen Ave", false), "12 ewen ave");
    }

    #[test]
    fn test_normalize_strong() {
        assert_eq!(normalize("305 Pender St, Vancouver", true), "305 pender");
        assert_eq!(normalize("101 305 Pender St E", true), "305 pender");
        assert_eq!(normalize("1250 Hastings Ave", true), "1250 hastings");
        assert_eq!(normalize("1280 Grandview Diversion", true), "1280 grandview");
        assert_eq!(normalize("12 Commercial Drive", true), "12 commercial");
        // Street types go only as whole words
        assert_eq!(normalize("300 drake st", true), "300 drake");
        assert_eq!(normalize("40 Avenue Rd", true), "40 avenue rd");
    }

    #[test]
    fn test_normalize_strong_degenerate() {
        // Never fails, whatever comes in
        assert_eq!(normalize("", true), "");
        assert_eq!(normalize("st", true), "");
        assert_eq!(normalize("hastings", true), "hastings");
    }

    #[test]
    fn test_normalize_idempotent() {
        let samples = [
            "101 305 PENDER ST E, VANCOUVER",
            "a e e e",
            "1 x,  vancouver",
            "1 main e, e vancouver",
            "   ",
            "W 4th Ave",
        ];

        for raw in samples {
            let once = normalize(raw, false);
            let twice = normalize(&once, false);
            assert_eq!(once, twice, "not idempotent for {:?}", raw);
        }
    }

    #[test]
    fn test_decompose_with_unit() {
        let address = decompose("101 305 pender st").unwrap();

        assert_eq!(address.unit, Some(101));
        assert_eq!(address.street_number, 305);
        assert_eq!(address.street_name, "pender st");
    }

    #[test]
    fn test_decompose_without_unit() {
        let address = decompose("1209 HASTINGS ST E, VANCOUVER").unwrap();

        assert_eq!(address.unit, None);
        assert_eq!(address.street_number, 1209);
        assert_eq!(address.street_name, "hastings st");
        assert_eq!(address.block(), 12);
        assert_eq!(address.street_key(), "hastings");
    }

    #[test]
    fn test_decompose_failures() {
        assert!(decompose("").is_err());
        assert!(decompose("pender st").is_err());
        assert!(decompose("305").is_err());
        assert!(decompose("101 305").is_err());
        // Number in second place but no unit before it
        assert!(decompose("unit 305 pender").is_err());
    }

    #[test]
    fn test_previous_neighbour() {
        assert_eq!(previous_neighbour_of("318 powell st").unwrap(), "316 powell st");

        let address = decompose("101 305 pender st").unwrap();
        let previous = address.previous_neighbour().unwrap();
        assert_eq!(previous.street_number, 303);
        assert_eq!(previous.unit, Some(101));
        assert_eq!(previous.to_string(), "101 303 pender st");

        assert!(previous_neighbour_of("powell").is_err());
    }

    #[test]
    fn test_previous_neighbour_at_minimum_number() {
        let lowest = format!("{} powell st", i64::MIN);
        assert!(previous_neighbour_of(&lowest).is_err());
        assert_eq!(decompose(&lowest).unwrap().previous_neighbour(), None);

        let near = format!("{} powell st", i64::MIN + 2);
        assert_eq!(
            previous_neighbour_of(&near).unwrap(),
            format!("{} powell st", i64::MIN)
        );
    }

    #[test]
    fn test_street_key_is_first_word() {
        assert_eq!(decompose("305 Railway Street").unwrap().street_key(), "railway");
        assert_eq!(decompose("1150 Pender Street E").unwrap().street_key(), "pender");
        assert_eq!(decompose("101 305 pender st").unwrap().street_key(), "pender");
    }
}

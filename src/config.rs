// 🗺️ Neighbourhood Config - Tables as Data
// Street/block ranges, manual address overrides and ignore lists.
//
// Loaded once at startup (built-in defaults or a JSON file) and then only
// ever read. Components borrow it; nothing mutates it after load.

use crate::error::MergeError;
use anyhow::{Context as AnyhowContext, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::Path;

// ============================================================================
// BUILT-IN TABLES (Strathcona)
// ============================================================================

/// Streets and the blocks (street number / 100) that count as governed.
/// e.g. Railway St covers the 300, 400 and 500 blocks.
const STRATHCONA_BLOCKS: &[(&str, &[i64])] = &[
    // West-East
    ("railway", &[3, 4, 5]),
    ("alexander", &[3, 4, 5, 6, 7]),
    ("powell", &[3, 4, 5, 6, 7, 8, 9, 10, 11, 12, 13]),
    ("cordova", &[3, 4, 5, 6, 7, 8, 9, 10]),
    ("hastings", &[3, 4, 5, 6, 7, 8, 9, 10, 11, 12, 13]),
    ("franklin", &[11, 12]),
    ("pender", &[10, 11, 12]),
    ("frances", &[12, 13]),
    ("keefer", &[10]),
    ("georgia", &[10, 11, 12]),
    ("adanac", &[12]),
    ("union", &[10, 11]),
    ("venables", &[10, 11, 12, 13]),
    // North-South
    ("gore", &[0, 1, 2, 3, 4]),
    ("dunlevy", &[0, 1, 2, 3, 4]),
    ("jackson", &[0, 1, 2, 3, 4]),
    ("princess", &[1, 2, 3, 4]),
    ("heatley", &[1, 2, 3, 4]),
    ("hawks", &[1, 2, 3, 4]),
    ("campbell", &[3, 4]),
    ("raymur", &[2, 3, 4, 5, 6, 7, 8]),
    ("glen", &[2, 3, 4, 5, 6, 7, 8]),
    ("vernon", &[2, 3, 4, 5, 6, 7, 8]),
    ("clark", &[2, 3, 4, 5, 6, 7, 8]),
];

/// Business address -> property owner address, confirmed by hand.
/// Keys are strong-normalized business addresses, values are property addresses.
const STRATHCONA_ADDRESS_OWNERS: &[(&str, &str)] = &[
    ("1227 adanac", "1219 adanac"),
    ("1228 adanac", "1255 venables"),
    ("1311 adanac", "790 clark"),
    ("302 alexander", "300 alexander"),
    ("310 alexander", "320 alexander"),
    ("362 alexander", "360 alexander"),
    ("397 alexander", "395 alexander"),
    ("472 alexander", "450 alexander"),
    ("720 alexander", "716 alexander"),
    ("526 clark", "1305 frances"),
    ("530 clark", "1305 frances"),
    ("550 clark", "1305 frances"),
    ("560 clark", "1305 frances"),
    ("570 clark", "1305 frances"),
    ("590 clark", "1305 frances"),
    ("777 clark", "775 clark"),
    ("823 clark", "1255 venables"),
    ("385 cordova", "255 dunlevy"),
    ("742 cordova", "731 cordova"),
    ("876 cordova", "889 cordova"),
    ("1007 cordova", "252 raymur"),
    ("1009 cordova", "252 raymur"),
    ("1019 cordova", "252 raymur"),
    ("1021 cordova", "252 raymur"),
    ("1055 cordova", "252 raymur"),
    ("37 dunlevy", "45 dunlevy"),
    ("49 dunlevy", "45 dunlevy"),
    ("55 dunlevy", "395 alexander"),
    ("402 dunlevy", "406 hastings"),
    ("406 dunlevy", "406 hastings"),
    ("408 dunlevy", "406 hastings"),
    ("418 dunlevy", "406 hastings"),
    ("1221 frances", "1223 frances"),
    ("1231 frances", "1223 frances"),
    ("1258 frances", "1254 frances"),
    ("1104 franklin", "1102 franklin"),
    ("1146 franklin", "1180 franklin"),
    ("1198 franklin", "1180 franklin"),
    ("1138 georgia", "1134 georgia"),
    ("326 hastings", "330 hastings"),
    ("328 hastings", "330 hastings"),
    ("336 hastings", "334 hastings"),
    ("339 hastings", "337 hastings"),
    ("380 hastings", "427 dunlevy"),
    ("384 hastings", "427 dunlevy"),
    ("388 hastings", "427 dunlevy"),
    ("398 hastings", "392 hastings"),
    ("408 hastings", "406 hastings"),
    ("410 hastings", "406 hastings"),
    ("412 hastings", "406 hastings"),
    ("420 hastings", "422 hastings"),
    ("431 hastings", "437 hastings"),
    ("432 hastings", "430 hastings"),
    ("439 hastings", "437 hastings"),
    ("441 hastings", "440 hastings"),
    ("461 hastings", "459 hastings"),
    ("463 hastings", "459 hastings"),
    ("502 hastings", "408 jackson"),
    ("504 hastings", "408 jackson"),
    ("505 hastings", "501 hastings"),
    ("509 hastings", "501 hastings"),
    ("531 hastings", "527 hastings"),
    ("604 hastings", "600 hastings"),
    ("606 hastings", "600 hastings"),
    ("643 hastings", "641 hastings"),
    ("649 hastings", "647 hastings"),
    ("651 hastings", "647 hastings"),
    ("708 hastings", "702 hastings"),
    ("745 hastings", "717 hastings"),
    ("786 hastings", "782 hastings"),
    ("823 hastings", "821 hastings"),
    ("825 hastings", "821 hastings"),
    ("852 hastings", "848 hastings"),
    ("862 hastings", "848 hastings"),
    ("869 hastings", "877 hastings"),
    ("873 hastings", "877 hastings"),
    ("879 hastings", "877 hastings"),
    ("881 hastings", "877 hastings"),
    ("884 hastings", "882 hastings"),
    ("961 hastings", "955 hastings"),
    ("965 hastings", "955 hastings"),
    ("1121 hastings", "1127 hastings"),
    ("1125 hastings", "1127 hastings"),
    ("1129 hastings", "1127 hastings"),
    ("1133 hastings", "1131 hastings"),
    ("1278 hastings", "1268 hastings"),
    ("1283 hastings", "1279 hastings"),
    ("1291 hastings", "1279 hastings"),
    ("1299 hastings", "1279 hastings"),
    ("1190 hastings", "403 vernon"),
    ("1192 hastings", "403 vernon"),
    ("250 hawks", "837 cordova"),
    ("405 heatley", "401 heatley"),
    ("407 heatley", "401 heatley"),
    ("409 heatley", "401 heatley"),
    ("417 heatley", "401 heatley"),
    ("419 heatley", "401 heatley"),
    ("28 jackson", "20 jackson"),
    ("370 jackson", "501 hastings"),
    ("1218 pender", "1222 pender"),
    ("1220 pender", "1222 pender"),
    ("1202 pender", "1222 pender"),
    ("1206 pender", "1222 pender"),
    ("1212 pender", "1222 pender"),
    ("1310 pender", "1305 frances"),
    ("1320 pender", "1305 frances"),
    ("318 powell", "316 powell"),
    ("346 powell", "342 powell"),
    ("348 powell", "342 powell"),
    ("350 powell", "342 powell"),
    ("394 powell", "347 powell"),
    ("356 powell", "358 powell"),
    ("362 powell", "358 powell"),
    ("368 powell", "370 powell"),
    ("376 powell", "374 powell"),
    ("415 powell", "411 powell"),
    ("429 powell", "427 powell"),
    ("435 powell", "427 powell"),
    ("439 powell", "437 powell"),
    ("469 powell", "467 powell"),
    ("475 powell", "473 powell"),
    ("543 powell", "537 powell"),
    ("578 powell", "215 princess"),
    ("580 powell", "215 princess"),
    ("582 powell", "215 princess"),
    ("683 powell", "687 powell"),
    ("686 powell", "209 heatley"),
    ("758 powell", "756 powell"),
    ("784 powell", "1302 powell"),
    ("811 powell", "807 powell"),
    ("827 powell", "825 powell"),
    ("836 powell", "838 powell"),
    ("1132 powell", "1130 powell"),
    ("1142 powell", "1130 powell"),
    ("1160 powell", "1159 franklin"),
    ("120 princess", "1302 powell"),
    ("420 princess", "600 hastings"),
    ("329 railway", "325 railway"),
    ("380 railway", "45 dunlevy"),
    ("397 railway", "395 railway"),
    ("435 railway", "439 railway"),
    ("495 railway", "485 railway"),
    ("505 railway", "503 railway"),
    ("258 raymur", "252 raymur"),
    ("260 raymur", "252 raymur"),
    ("266 raymur", "252 raymur"),
    ("1103 union", "1101 union"),
    ("1113 union", "1111 union"),
    ("1121 union", "1111 union"),
    ("1100 venables", "1101 venables"),
    ("1275 venables", "1255 venables"),
    ("1233 venables", "1255 venables"),
    ("1299 venables", "1255 venables"),
    ("510 vernon", "1222 pender"),
    ("520 vernon", "1222 pender"),
    ("530 vernon", "1222 pender"),
    ("704 vernon", "700 vernon"),
];

/// Mailing address last lines that name a country.
const DEFAULT_COUNTRIES: &[&str] = &["usa", "hong kong"];

const DEFAULT_INVALID_LICENSE_TYPES: &[&str] = &["one family dwelling"];

const DEFAULT_INVALID_BUSINESS_NAMES: &[&str] = &["provincial rental housing corporation"];

// ============================================================================
// NEIGHBOURHOOD CONFIG
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NeighbourhoodConfig {
    /// Street name -> governed block numbers
    pub valid_blocks: BTreeMap<String, BTreeSet<i64>>,

    /// Manual override: business address -> property address
    pub address_owners: BTreeMap<String, String>,

    /// Countries recognised on the last mailing address line (lowercase)
    pub countries: Vec<String>,

    /// License types that are never loaded (lowercase, '-' replaced by ' ')
    pub invalid_license_types: Vec<String>,

    /// Business names that are never loaded (lowercase)
    pub invalid_business_names: Vec<String>,
}

impl NeighbourhoodConfig {
    /// Built-in Strathcona tables
    pub fn strathcona() -> Self {
        NeighbourhoodConfig {
            valid_blocks: STRATHCONA_BLOCKS
                .iter()
                .map(|(street, blocks)| (street.to_string(), blocks.iter().copied().collect()))
                .collect(),
            address_owners: STRATHCONA_ADDRESS_OWNERS
                .iter()
                .map(|(business, property)| (business.to_string(), property.to_string()))
                .collect(),
            countries: to_strings(DEFAULT_COUNTRIES),
            invalid_license_types: to_strings(DEFAULT_INVALID_LICENSE_TYPES),
            invalid_business_names: to_strings(DEFAULT_INVALID_BUSINESS_NAMES),
        }
    }

    /// Load config from JSON file. Sections left out keep their defaults.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read neighbourhood config: {:?}", path.as_ref()))?;

        Self::from_json(&content)
            .with_context(|| format!("Invalid neighbourhood config: {:?}", path.as_ref()))
    }

    pub fn from_json(content: &str) -> Result<Self, MergeError> {
        serde_json::from_str(content).map_err(|e| MergeError::Config(e.to_string()))
    }

    /// Blocks governed on `street`, if the street is governed at all
    pub fn blocks_for(&self, street: &str) -> Option<&BTreeSet<i64>> {
        self.valid_blocks.get(street)
    }

    /// Property address a human matched to this business address
    pub fn override_for(&self, business_address: &str) -> Option<&str> {
        self.address_owners.get(business_address).map(String::as_str)
    }

    pub fn is_country(&self, line: &str) -> bool {
        let line = line.to_lowercase();
        self.countries.iter().any(|c| *c == line)
    }

    pub fn is_valid_license_type(&self, license_type: &str) -> bool {
        let clean = license_type.to_lowercase().replace('-', " ");
        !self.invalid_license_types.contains(&clean)
    }

    pub fn is_valid_business_name(&self, business_name: &str) -> bool {
        !self
            .invalid_business_names
            .contains(&business_name.to_lowercase())
    }
}

impl Default for NeighbourhoodConfig {
    fn default() -> Self {
        Self::strathcona()
    }
}

fn to_strings(values: &[&str]) -> Vec<String> {
    values.iter().map(|v| v.to_string()).collect()
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_tables() {
        let config = NeighbourhoodConfig::default();

        assert_eq!(config.valid_blocks.len(), 24);
        assert!(config.blocks_for("railway").unwrap().contains(&4));
        assert!(!config.blocks_for("railway").unwrap().contains(&6));
        assert!(config.blocks_for("main").is_none());

        assert_eq!(config.override_for("398 hastings"), Some("392 hastings"));
        assert_eq!(config.override_for("392 hastings"), None);
    }

    #[test]
    fn test_partial_json_keeps_defaults() {
        let json = r#"{ "valid_blocks": { "main": [1, 2] } }"#;
        let config = NeighbourhoodConfig::from_json(json).unwrap();

        assert_eq!(config.valid_blocks.len(), 1);
        assert!(config.blocks_for("main").unwrap().contains(&2));
        // Sections not given fall back to the built-in tables
        assert_eq!(config.override_for("1227 adanac"), Some("1219 adanac"));
        assert_eq!(config.countries, vec!["usa", "hong kong"]);
    }

    #[test]
    fn test_malformed_json_is_config_error() {
        let result = NeighbourhoodConfig::from_json("{\"valid_blocks\": [1, 2]");
        assert!(matches!(result, Err(MergeError::Config(_))));

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("neighbourhood.json");
        fs::write(&path, "not json").unwrap();
        let err = NeighbourhoodConfig::from_file(&path).unwrap_err();
        assert!(err.downcast_ref::<MergeError>().is_some());
    }

    #[test]
    fn test_from_file_missing() {
        let result = NeighbourhoodConfig::from_file("/nonexistent/neighbourhood.json");
        assert!(result.is_err());
    }

    #[test]
    fn test_ignore_lists() {
        let config = NeighbourhoodConfig::default();

        assert!(!config.is_valid_license_type("One-Family Dwelling"));
        assert!(config.is_valid_license_type("Retail Dealer"));
        assert!(!config.is_valid_business_name("PROVINCIAL RENTAL HOUSING CORPORATION"));
        assert!(config.is_valid_business_name("Benny's Bagels"));
        assert!(config.is_country("USA"));
        assert!(!config.is_country("Canada"));
    }
}

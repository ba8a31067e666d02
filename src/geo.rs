// 📍 Geo Membership - is this address inside the governed neighbourhood?

use crate::address::decompose;
use crate::config::NeighbourhoodConfig;

/// Ledger reason for records that fail the membership check
pub const NOT_GOVERNED_REASON: &str = "not governed or invalid address";

/// Checks addresses against the street/block table of a neighbourhood.
///
/// Borrows the config: the table is loaded once and never changes.
pub struct GeoMembership<'a> {
    config: &'a NeighbourhoodConfig,
}

impl<'a> GeoMembership<'a> {
    pub fn new(config: &'a NeighbourhoodConfig) -> Self {
        GeoMembership { config }
    }

    /// True when the address decomposes and its block is governed on its street.
    ///
    /// An address that cannot be decomposed is simply not governed.
    pub fn is_governed(&self, raw: &str) -> bool {
        let address = match decompose(raw) {
            Ok(address) => address,
            Err(_) => return false,
        };

        match self.config.blocks_for(address.street_key()) {
            Some(blocks) => blocks.contains(&address.block()),
            None => false,
        }
    }
}

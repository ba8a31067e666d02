// ⚖️ Reconciliation Engine - attach each business license to its property
//
// Matching is exact after strong normalization:
//   1. business address == property address
//   2. else the manual override table maps the business address to a
//      property address, which must then be in the owners list
//
// At most one owner per license, any number of licenses per owner.
// A license with no match stays in its collection, unlinked, and is
// recorded in the ErrorLedger.

use crate::address::strong_normalize;
use crate::config::NeighbourhoodConfig;
use crate::ledger::ErrorLedger;
use crate::records::{LicenseRecord, PropertyOwnerRecord};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::{debug, info, warn};

/// Ledger reason for licenses with no owning property
pub const NO_MATCH_REASON: &str = "no match in property owners";

// ============================================================================
// MATCH RESULT
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MatchPath {
    /// Business address equals a property address
    Direct,

    /// Business address found in the manual override table
    ManualOverride,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LicenseMatch {
    pub license_index: usize,
    pub owner_index: usize,
    pub path: MatchPath,
}

// ============================================================================
// RECONCILIATION REPORT
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReconciliationReport {
    pub matches: Vec<LicenseMatch>,

    /// Indices of licenses with no owner
    pub unmatched: Vec<usize>,

    /// Licenses skipped because they already had an owner
    pub already_linked: usize,

    pub reconciled_at: DateTime<Utc>,
}

impl ReconciliationReport {
    pub fn direct_count(&self) -> usize {
        self.count_path(MatchPath::Direct)
    }

    pub fn override_count(&self) -> usize {
        self.count_path(MatchPath::ManualOverride)
    }

    fn count_path(&self, path: MatchPath) -> usize {
        self.matches.iter().filter(|m| m.path == path).count()
    }

    pub fn summary(&self) -> String {
        format!(
            "Reconciliation: {} matched ({} direct, {} by override), {} unmatched",
            self.matches.len(),
            self.direct_count(),
            self.override_count(),
            self.unmatched.len()
        )
    }
}

// ============================================================================
// RECONCILIATION ENGINE
// ============================================================================

pub struct ReconciliationEngine<'a> {
    config: &'a NeighbourhoodConfig,
}

impl<'a> ReconciliationEngine<'a> {
    pub fn new(config: &'a NeighbourhoodConfig) -> Self {
        ReconciliationEngine { config }
    }

    /// Link licenses to owners in place.
    ///
    /// Each matched license gets `owner = Some(owner_index)` and its index is
    /// appended to that owner's `licenses`. Licenses that already have an
    /// owner are left alone.
    pub fn reconcile(
        &self,
        owners: &mut [PropertyOwnerRecord],
        licenses: &mut [LicenseRecord],
        ledger: &mut ErrorLedger,
    ) -> ReconciliationReport {
        let index = self.build_index(owners);

        let mut matches = Vec::new();
        let mut unmatched = Vec::new();
        let mut already_linked = 0;

        for (license_index, license) in licenses.iter_mut().enumerate() {
            if license.is_linked() {
                already_linked += 1;
                continue;
            }

            match self.find_owner(&index, &license.address) {
                Some((owner_index, path)) => {
                    debug!(
                        license = %license,
                        owner = %owners[owner_index],
                        ?path,
                        "license matched"
                    );
                    owners[owner_index].licenses.push(license_index);
                    license.owner = Some(owner_index);
                    matches.push(LicenseMatch {
                        license_index,
                        owner_index,
                        path,
                    });
                }
                None => {
                    ledger.add(license.clone(), NO_MATCH_REASON);
                    unmatched.push(license_index);
                }
            }
        }

        let report = ReconciliationReport {
            matches,
            unmatched,
            already_linked,
            reconciled_at: Utc::now(),
        };
        info!("{}", report.summary());

        report
    }

    /// Strong-normalized civic address -> owner index.
    /// A later owner with the same normalized address replaces an earlier one.
    fn build_index(&self, owners: &[PropertyOwnerRecord]) -> HashMap<String, usize> {
        let mut index = HashMap::with_capacity(owners.len());

        for (i, owner) in owners.iter().enumerate() {
            let addr = strong_normalize(&owner.civic);
            if let Some(previous) = index.insert(addr.clone(), i) {
                warn!(
                    address = %addr,
                    replaced = %owners[previous],
                    by = %owner,
                    "two property owners share a normalized address, keeping the later one"
                );
            }
        }

        index
    }

    /// First successful path wins: direct, then manual override
    fn find_owner(
        &self,
        index: &HashMap<String, usize>,
        license_address: &str,
    ) -> Option<(usize, MatchPath)> {
        let addr = strong_normalize(license_address);

        if let Some(&owner_index) = index.get(&addr) {
            return Some((owner_index, MatchPath::Direct));
        }

        let property_addr = self.config.override_for(&addr)?;
        index
            .get(&strong_normalize(property_addr))
            .map(|&owner_index| (owner_index, MatchPath::ManualOverride))
    }
}

// ============================================================================
// TESTS
// ============================================================================

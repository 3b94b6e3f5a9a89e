//! Claims ↔ pharmacy and claims ↔ revert joins.

use std::collections::HashSet;

use tracing::{debug, info};

use crate::ingest::RecordSet;
use crate::model::{ClaimRecord, JoinedClaim, PharmacyRecord, RevertRecord};

/// Joined claims plus the number excluded for referencing an unknown NPI.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct JoinOutcome {
    pub claims: Vec<JoinedClaim>,
    pub unknown_pharmacy: usize,
}

impl JoinOutcome {
    pub fn reverted_count(&self) -> usize {
        self.claims.iter().filter(|c| c.reverted).count()
    }
}

/// Claim ids referenced by at least one revert.
pub fn reverted_claim_ids(reverts: &RecordSet<RevertRecord>) -> HashSet<&str> {
    reverts.iter().map(|r| r.claim_id.as_str()).collect()
}

/// Attach chain, unit price and revert flag to every claim whose pharmacy is
/// known. Claims from unknown pharmacies are dropped. Claim order is kept.
pub fn join_claims(
    claims: &RecordSet<ClaimRecord>,
    pharmacies: &RecordSet<PharmacyRecord>,
    reverts: &RecordSet<RevertRecord>,
) -> JoinOutcome {
    let reverted_ids = reverted_claim_ids(reverts);
    let mut outcome = JoinOutcome::default();

    for claim in claims {
        let Some(pharmacy) = pharmacies.get(&claim.npi) else {
            debug!(claim_id = %claim.id, npi = %claim.npi, "claim references unknown pharmacy");
            outcome.unknown_pharmacy += 1;
            continue;
        };
        outcome.claims.push(JoinedClaim {
            id: claim.id.clone(),
            npi: claim.npi.clone(),
            ndc: claim.ndc.clone(),
            chain: pharmacy.chain.clone(),
            price: claim.price,
            quantity: claim.quantity,
            // quantity > 0 is guaranteed by validation
            unit_price: claim.price / claim.quantity,
            reverted: reverted_ids.contains(claim.id.as_str()),
            timestamp: claim.timestamp,
        });
    }

    info!(
        joined = outcome.claims.len(),
        unknown_pharmacy = outcome.unknown_pharmacy,
        reverted = outcome.reverted_count(),
        "joined claims"
    );
    outcome
}

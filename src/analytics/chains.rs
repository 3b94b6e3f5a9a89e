//! Cheapest-chain recommendations per drug.

use std::collections::BTreeMap;

use super::derive::{PriceAccumulator, round_cents};
use super::types::{ChainPrice, ChainRanking};
use crate::model::JoinedClaim;

/// Number of chains recommended per drug.
pub const CHAIN_RANK_LIMIT: usize = 2;

/// Rank chains per ndc by mean unit price (to the cent), cheapest first,
/// ties broken by chain name, keeping at most [`CHAIN_RANK_LIMIT`]. Rankings come out
/// sorted by ndc.
///
/// Ranking uses the rounded price that is emitted, not the exact mean.
/// Chains whose means differ by less than a cent therefore count as tied
/// and are picked by name: exact means 1.004, 1.001 and 1.003 for `alpha`,
/// `zeta` and `mid` all round to 1.00 and keep `alpha` and `mid`, even
/// though `zeta` is cheapest. In exchange the emitted list is always
/// ascending by `avg_price` with a name tie-break.
pub fn rank_chains(claims: &[JoinedClaim]) -> Vec<ChainRanking> {
    let mut by_drug: BTreeMap<&str, BTreeMap<&str, PriceAccumulator>> = BTreeMap::new();

    for claim in claims {
        by_drug
            .entry(claim.ndc.as_str())
            .or_default()
            .entry(claim.chain.as_str())
            .and_modify(|acc| acc.add(claim.unit_price))
            .or_insert_with(|| PriceAccumulator::new(claim.unit_price));
    }

    by_drug
        .into_iter()
        .map(|(ndc, chains)| {
            // rank on the emitted price; equal cents fall back to name order
            let mut ranked: Vec<(&str, f64)> = chains
                .into_iter()
                .map(|(chain, acc)| (chain, round_cents(acc.mean())))
                .collect();
            ranked.sort_by(|a, b| a.1.total_cmp(&b.1).then_with(|| a.0.cmp(b.0)));

            ChainRanking {
                ndc: ndc.to_string(),
                chain: ranked
                    .into_iter()
                    .take(CHAIN_RANK_LIMIT)
                    .map(|(name, avg_price)| ChainPrice {
                        name: name.to_string(),
                        avg_price,
                    })
                    .collect(),
            }
        })
        .collect()
}

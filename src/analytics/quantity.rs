//! Most-prescribed quantities per drug.
//!
//! Ordering is by descending frequency; quantities with equal counts keep
//! the order in which they first appeared for that drug.

use std::collections::{BTreeMap, HashMap};

use super::types::QuantityProfile;
use crate::model::JoinedClaim;

#[derive(Debug, Clone, Copy)]
struct QuantityCount {
    value: f64,
    count: usize,
    first_seen: usize,
}

#[derive(Default)]
struct DrugQuantities {
    counts: Vec<QuantityCount>,
    // f64 bit pattern -> slot in `counts`
    slots: HashMap<u64, usize>,
}

impl DrugQuantities {
    fn record(&mut self, value: f64) {
        // validated quantities are > 0, so -0.0 never shows up as a key
        let key = value.to_bits();
        match self.slots.get(&key) {
            Some(&slot) => self.counts[slot].count += 1,
            None => {
                let first_seen = self.counts.len();
                self.slots.insert(key, first_seen);
                self.counts.push(QuantityCount {
                    value,
                    count: 1,
                    first_seen,
                });
            }
        }
    }

    fn ranked(mut self) -> Vec<f64> {
        self.counts.sort_by(|a, b| {
            b.count
                .cmp(&a.count)
                .then_with(|| a.first_seen.cmp(&b.first_seen))
        });
        self.counts.into_iter().map(|q| q.value).collect()
    }
}

/// Frequency-ranked distinct quantities for every ndc, sorted by ndc.
pub fn profile_quantities(claims: &[JoinedClaim]) -> Vec<QuantityProfile> {
    let mut by_drug: BTreeMap<&str, DrugQuantities> = BTreeMap::new();
    for claim in claims {
        by_drug
            .entry(claim.ndc.as_str())
            .or_default()
            .record(claim.quantity);
    }

    by_drug
        .into_iter()
        .map(|(ndc, quantities)| QuantityProfile {
            ndc: ndc.to_string(),
            most_prescribed_quantity: quantities.ranked(),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn claims(ndc: &str, quantities: &[f64]) -> Vec<JoinedClaim> {
        quantities
            .iter()
            .enumerate()
            .map(|(i, &quantity)| JoinedClaim {
                id: format!("{ndc}-{i}"),
                npi: "A".into(),
                ndc: ndc.into(),
                chain: "health".into(),
                price: 10.0,
                quantity,
                unit_price: 10.0 / quantity,
                reverted: false,
                timestamp: Utc::now(),
            })
            .collect()
    }

    #[test]
    fn most_frequent_first() {
        let profiles = profile_quantities(&claims("D1", &[2.0, 2.0, 5.0, 5.0, 5.0]));
        assert_eq!(
            profiles,
            vec![QuantityProfile {
                ndc: "D1".into(),
                most_prescribed_quantity: vec![5.0, 2.0],
            }]
        );
    }

    #[test]
    fn ties_keep_first_appearance_not_value_order() {
        let profiles = profile_quantities(&claims("D1", &[90.0, 30.0, 60.0, 30.0, 90.0, 60.0]));
        assert_eq!(profiles[0].most_prescribed_quantity, vec![90.0, 30.0, 60.0]);
    }

    #[test]
    fn fractional_quantities_are_distinct_values() {
        let profiles = profile_quantities(&claims("D1", &[2.5, 2.0, 2.5]));
        assert_eq!(profiles[0].most_prescribed_quantity, vec![2.5, 2.0]);
    }

    #[test]
    fn no_truncation_and_each_value_once() {
        let input: Vec<f64> = (1..=8).map(f64::from).collect();
        let profiles = profile_quantities(&claims("D1", &input));
        assert_eq!(profiles[0].most_prescribed_quantity, input);
    }

    #[test]
    fn drugs_are_profiled_separately() {
        let mut input = claims("D2", &[1.0, 3.0, 3.0]);
        input.extend(claims("D1", &[7.0]));
        let profiles = profile_quantities(&input);
        assert_eq!(profiles.len(), 2);
        assert_eq!(profiles[0].ndc, "D1");
        assert_eq!(profiles[0].most_prescribed_quantity, vec![7.0]);
        assert_eq!(profiles[1].most_prescribed_quantity, vec![3.0, 1.0]);
    }
}

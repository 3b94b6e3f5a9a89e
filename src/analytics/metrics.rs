//! Per-pharmacy, per-drug fill metrics.

use std::collections::BTreeMap;

use super::derive::{PriceAccumulator, round_cents};
use super::types::MetricRow;
use crate::model::JoinedClaim;

struct Group {
    unit_prices: PriceAccumulator,
    prices: PriceAccumulator,
    reverted: usize,
}

/// Group by (npi, ndc) and compute fills, reverts, mean unit price and total
/// price. Rows come out sorted by (npi, ndc).
pub fn compute_metrics(claims: &[JoinedClaim]) -> Vec<MetricRow> {
    let mut groups: BTreeMap<(&str, &str), Group> = BTreeMap::new();

    for claim in claims {
        let reverted = usize::from(claim.reverted);
        groups
            .entry((claim.npi.as_str(), claim.ndc.as_str()))
            .and_modify(|g| {
                g.unit_prices.add(claim.unit_price);
                g.prices.add(claim.price);
                g.reverted += reverted;
            })
            .or_insert_with(|| Group {
                unit_prices: PriceAccumulator::new(claim.unit_price),
                prices: PriceAccumulator::new(claim.price),
                reverted,
            });
    }

    groups
        .into_iter()
        .map(|((npi, ndc), g)| MetricRow {
            npi: npi.to_string(),
            ndc: ndc.to_string(),
            fills: g.unit_prices.count(),
            reverted: g.reverted,
            avg_price: round_cents(g.unit_prices.mean()),
            total_price: round_cents(g.prices.sum()),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn claim(id: &str, npi: &str, ndc: &str, price: f64, quantity: f64, reverted: bool) -> JoinedClaim {
        JoinedClaim {
            id: id.into(),
            npi: npi.into(),
            ndc: ndc.into(),
            chain: "health".into(),
            price,
            quantity,
            unit_price: price / quantity,
            reverted,
            timestamp: Utc::now(),
        }
    }

    #[test]
    fn single_group_scenario() {
        let rows = compute_metrics(&[
            claim("c1", "0000000000", "D1", 100.0, 2.0, true),
            claim("c2", "0000000000", "D1", 50.0, 5.0, false),
        ]);
        assert_eq!(
            rows,
            vec![MetricRow {
                npi: "0000000000".into(),
                ndc: "D1".into(),
                fills: 2,
                reverted: 1,
                avg_price: 30.0,
                total_price: 150.0,
            }]
        );
    }

    #[test]
    fn total_price_sums_raw_price_not_unit_price() {
        let rows = compute_metrics(&[claim("c1", "A", "D1", 9.0, 3.0, false)]);
        assert_eq!(rows[0].avg_price, 3.0);
        assert_eq!(rows[0].total_price, 9.0);
    }

    #[test]
    fn rounding_happens_after_averaging() {
        // unit prices 0.005 and 0.0 average to 0.0025; rounding each first
        // would have given 0.01
        let rows = compute_metrics(&[
            claim("c1", "A", "D1", 1.0, 200.0, false),
            claim("c2", "A", "D1", 0.0, 1.0, false),
        ]);
        assert_eq!(rows[0].avg_price, 0.0);
        assert_eq!(rows[0].total_price, 1.0);
    }

    #[test]
    fn rows_sorted_by_npi_then_ndc() {
        let rows = compute_metrics(&[
            claim("c1", "B", "D1", 1.0, 1.0, false),
            claim("c2", "A", "D2", 1.0, 1.0, false),
            claim("c3", "A", "D1", 1.0, 1.0, false),
            claim("c4", "B", "D1", 1.0, 1.0, true),
        ]);
        let keys: Vec<_> = rows.iter().map(|r| (r.npi.as_str(), r.ndc.as_str())).collect();
        assert_eq!(keys, vec![("A", "D1"), ("A", "D2"), ("B", "D1")]);
        assert_eq!(rows[2].fills, 2);
        assert_eq!(rows[2].reverted, 1);
    }

    #[test]
    fn empty_input_yields_no_rows() {
        assert!(compute_metrics(&[]).is_empty());
    }
}

//! # Vote Aggregation
//!
//! Buckets raw fixed-point weights by category.
//!
//! ## Implementation
//! - Weights are summed as raw `u128` integers (10^18 scale), so totals are exact
//!   and independent of record order
//! - Conversion to decimal units only happens when a total is read; past 28
//!   significant digits the least significant fractional digits are rounded
//! - Every record lands in exactly one bucket, so bucket counts always sum to the
//!   record count
//!
//! ## Support Codes
//! - 0: against, 1: for, 2: abstain
//! - Any other code accumulates under [`Support::Other`] instead of being dropped
use std::collections::BTreeMap;

use rust_decimal::Decimal;
use serde::Serialize;
use tracing::debug;

use crate::{
    error::{GovernanceError, Result},
    format::format_weight,
    queries::Vote,
};

pub const WEIGHT_DECIMALS: u32 = 18;
const WEIGHT_SCALE: u128 = 10u128.pow(WEIGHT_DECIMALS);

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Bucket {
    pub raw: u128,
    pub count: u64,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CategoryTotal<K> {
    buckets: BTreeMap<K, Bucket>,
    records: u64,
}

impl<K: Ord> Default for CategoryTotal<K> {
    fn default() -> Self {
        Self {
            buckets: BTreeMap::new(),
            records: 0,
        }
    }
}

impl<K: Ord> CategoryTotal<K> {
    pub fn add(&mut self, category: K, raw: u128) -> Result<()> {
        let bucket = self.buckets.entry(category).or_default();

        bucket.raw = bucket
            .raw
            .checked_add(raw)
            .ok_or_else(|| GovernanceError::InvalidWeight(format!("total overflow adding {raw}")))?;
        bucket.count += 1;
        self.records += 1;

        Ok(())
    }

    pub fn records(&self) -> u64 {
        self.records
    }

    pub fn bucket(&self, category: &K) -> Bucket {
        self.buckets.get(category).copied().unwrap_or_default()
    }

    /// Total for `category` in decimal units; zero for categories never seen.
    pub fn total(&self, category: &K) -> Decimal {
        to_units(self.bucket(category).raw)
    }

    pub fn buckets(&self) -> impl Iterator<Item = (&K, &Bucket)> {
        self.buckets.iter()
    }
}

pub fn aggregate<T, K, C, W>(records: &[T], category_of: C, weight_of: W) -> Result<CategoryTotal<K>>
where
    K: Ord,
    C: Fn(&T) -> K,
    W: Fn(&T) -> &str,
{
    let mut totals = CategoryTotal::default();

    for record in records {
        totals.add(category_of(record), parse_weight(weight_of(record))?)?;
    }

    Ok(totals)
}

pub fn parse_weight(raw: &str) -> Result<u128> {
    raw.trim()
        .parse()
        .map_err(|_| GovernanceError::InvalidWeight(raw.to_string()))
}

/// Raw fixed-point weight to decimal units.
pub fn to_units(raw: u128) -> Decimal {
    let whole = Decimal::from_i128_with_scale((raw / WEIGHT_SCALE) as i128, 0);
    let fraction = Decimal::from_i128_with_scale((raw % WEIGHT_SCALE) as i128, WEIGHT_DECIMALS);

    (whole + fraction).normalize()
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Support {
    Against,
    For,
    Abstain,
    Other,
}

impl Support {
    pub fn from_code(code: u32) -> Self {
        match code {
            0 => Support::Against,
            1 => Support::For,
            2 => Support::Abstain,
            _ => {
                debug!("Unknown support code {code}, counting as other");
                Support::Other
            }
        }
    }
}

#[derive(Serialize, Clone, Debug, PartialEq)]
pub struct SupportWeight {
    pub weight: Decimal,
    pub display: String,
    pub votes: u64,
}

#[derive(Serialize, Clone, Debug, PartialEq)]
pub struct VoteTally {
    pub against: SupportWeight,
    #[serde(rename = "for")]
    pub in_favor: SupportWeight,
    pub abstain: SupportWeight,
    pub other: SupportWeight,
    pub voters: u64,
}

impl VoteTally {
    pub fn from_votes(votes: &[Vote]) -> Result<Self> {
        let totals = aggregate(votes, |vote| Support::from_code(vote.support), |vote| vote.weight.as_str())?;

        Ok(Self::from_totals(&totals))
    }

    pub fn from_totals(totals: &CategoryTotal<Support>) -> Self {
        let weight = |support: Support| {
            let weight = totals.total(&support);

            SupportWeight {
                display: format_weight(weight),
                weight,
                votes: totals.bucket(&support).count,
            }
        };

        Self {
            against: weight(Support::Against),
            in_favor: weight(Support::For),
            abstain: weight(Support::Abstain),
            other: weight(Support::Other),
            voters: totals.records(),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use proptest::prelude::*;

    use super::*;

    fn vote(support: u32, weight: &str) -> Vote {
        Vote {
            voter: "0x0000000000000000000000000000000000000001".to_string(),
            weight: weight.to_string(),
            support,
        }
    }

    fn dec(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    #[test]
    fn weight_converts_to_units() {
        assert_eq!(to_units(parse_weight("2500000000000000000").unwrap()), dec("2.5"));
        assert_eq!(to_units(1), dec("0.000000000000000001"));
        assert_eq!(to_units(0), Decimal::ZERO);
    }

    #[test]
    fn large_totals_convert() {
        // 300 billion tokens, beyond what a 96-bit mantissa holds in raw form.
        let raw = 300_000_000_000u128 * WEIGHT_SCALE + WEIGHT_SCALE / 2;

        assert_eq!(to_units(raw), dec("300000000000.5"));
    }

    #[test]
    fn malformed_weight_is_an_error() {
        let err = VoteTally::from_votes(&[vote(1, "12.5")]).unwrap_err();

        assert!(matches!(err, GovernanceError::InvalidWeight(raw) if raw == "12.5"));
    }

    #[test]
    fn tally_buckets_by_support() {
        let votes = [
            vote(0, "1000000000000000000"),
            vote(1, "2500000000000000000"),
            vote(1, "500000000000000000"),
            vote(2, "4000000000000000000000"),
        ];

        let tally = VoteTally::from_votes(&votes).unwrap();

        assert_eq!(tally.against.weight, dec("1"));
        assert_eq!(tally.in_favor.weight, dec("3"));
        assert_eq!(tally.in_favor.votes, 2);
        assert_eq!(tally.abstain.display, "4.00K");
        assert_eq!(tally.voters, 4);
    }

    #[test]
    fn unknown_support_codes_count_as_other() {
        let votes = [vote(1, "1000000000000000000"), vote(7, "3000000000000000000")];

        let tally = VoteTally::from_votes(&votes).unwrap();

        assert_eq!(tally.other.weight, dec("3"));
        assert_eq!(tally.other.votes, 1);
        assert_eq!(tally.voters, 2);
    }

    #[test]
    fn empty_input_is_all_zero() {
        let tally = VoteTally::from_votes(&[]).unwrap();

        assert_eq!(tally.voters, 0);
        assert_eq!(tally.in_favor.weight, Decimal::ZERO);
        assert_eq!(tally.in_favor.display, "0.00");
    }

    proptest! {
        #[test]
        fn totals_ignore_record_order(
            records in prop::collection::vec((0u32..5, 0u64..u64::MAX), 0..64),
            seed in any::<u64>(),
        ) {
            let votes: Vec<Vote> = records
                .iter()
                .map(|(support, weight)| vote(*support, &weight.to_string()))
                .collect();

            let mut shuffled = votes.clone();
            // Deterministic permutation driven by the seed.
            let len = shuffled.len();
            let mut state = seed;
            for i in (1..len).rev() {
                state = state.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
                shuffled.swap(i, (state % (i as u64 + 1)) as usize);
            }

            let forward = aggregate(&votes, |v| Support::from_code(v.support), |v| v.weight.as_str()).unwrap();
            let permuted = aggregate(&shuffled, |v| Support::from_code(v.support), |v| v.weight.as_str()).unwrap();

            prop_assert_eq!(&forward, &permuted);
            prop_assert_eq!(forward.records(), votes.len() as u64);
            prop_assert_eq!(
                forward.buckets().map(|(_, bucket)| bucket.count).sum::<u64>(),
                forward.records()
            );
        }
    }
}

use rust_decimal::{Decimal, RoundingStrategy};

const SUFFIXES: [(i64, &str); 3] = [(1_000_000_000, "B"), (1_000_000, "M"), (1_000, "K")];

/// Abbreviates a token amount for display, e.g. `2.50B`, `3.40K`, `12.00`.
pub fn format_weight(weight: Decimal) -> String {
    for (threshold, suffix) in SUFFIXES {
        let threshold = Decimal::from(threshold);

        if weight >= threshold {
            return format!("{}{suffix}", two_places(weight / threshold));
        }
    }

    two_places(weight)
}

fn two_places(value: Decimal) -> String {
    let rounded = value.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero);

    format!("{rounded:.2}")
}

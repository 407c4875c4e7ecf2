//! C2 — Cost Calculator: pure USD cost computation from token counts and a price row.

use crate::pricing::PriceRow;
use rust_decimal::prelude::*;
use rust_decimal::Decimal;

/// Computes the USD cost of a call, rounding HALF_UP to 6 decimal places.
///
/// Pure function, no I/O, no logging — grounded on
/// `pricing.py::compute_cost_usd`. Cache discount applies to the input
/// portion only, and only when `cache_hit` is true and a discount is set.
pub fn compute_cost(
    price: &PriceRow,
    prompt_tokens: u32,
    completion_tokens: u32,
    reasoning_tokens: u32,
    cache_hit: bool,
) -> Decimal {
    let thousand = Decimal::from(1000);

    let mut input_cost = Decimal::from(prompt_tokens) / thousand * price.input_per_1k;
    let output_cost = Decimal::from(completion_tokens) / thousand * price.output_per_1k;
    let reasoning_cost = Decimal::from(reasoning_tokens) / thousand
        * price.reasoning_per_1k.unwrap_or(Decimal::ZERO);

    if cache_hit {
        if let Some(discount) = price.cache_discount {
            input_cost *= Decimal::ONE - discount;
        }
    }

    (input_cost + output_cost + reasoning_cost).round_dp_with_strategy(
        6,
        RoundingStrategy::MidpointAwayFromZero,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, Utc};
    use rust_decimal_macros::dec;

    fn price() -> PriceRow {
        PriceRow {
            provider: "openai".into(),
            model: "m1".into(),
            effective_from: DateTime::<Utc>::from_timestamp(0, 0).unwrap(),
            input_per_1k: dec!(0.05),
            output_per_1k: dec!(0.15),
            reasoning_per_1k: None,
            cache_discount: None,
        }
    }

    #[test]
    fn s1_normal_call_cost_matches_expected() {
        // spec.md S1: prompt=1000, completion=2000 -> cost_usd=0.350000
        let cost = compute_cost(&price(), 1000, 2000, 0, false);
        assert_eq!(cost, dec!(0.350000));
    }

    #[test]
    fn cache_discount_applies_only_to_input() {
        let mut p = price();
        p.cache_discount = Some(dec!(0.5));
        let cost_no_cache = compute_cost(&p, 1000, 1000, 0, false);
        let cost_cached = compute_cost(&p, 1000, 1000, 0, true);
        // input halves, output unchanged
        assert_eq!(cost_no_cache - cost_cached, dec!(0.025));
    }

    #[test]
    fn reasoning_tokens_add_cost_when_priced() {
        let mut p = price();
        p.reasoning_per_1k = Some(dec!(0.10));
        let cost = compute_cost(&p, 0, 0, 1000, false);
        assert_eq!(cost, dec!(0.100000));
    }

    #[test]
    fn rounds_half_up_to_six_places() {
        let mut p = price();
        p.input_per_1k = dec!(0.0000005);
        // 1 token / 1000 * 0.0000005 = 0.0000000000005, rounds to 0
        let cost = compute_cost(&p, 1, 0, 0, false);
        assert_eq!(cost.scale().min(6), cost.scale());
        assert_eq!(cost, dec!(0.000000));
    }

    #[test]
    fn is_pure_same_inputs_yield_identical_outputs() {
        let p = price();
        let a = compute_cost(&p, 500, 500, 0, false);
        let b = compute_cost(&p, 500, 500, 0, false);
        assert_eq!(a, b);
    }
}

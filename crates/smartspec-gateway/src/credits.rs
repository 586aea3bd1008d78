//! Credit arithmetic.
//!
//! One USD is exactly 1000 credits. Usage is billed at actual provider cost
//! rounded up to whole credits; markup applies only on top-up. Dollar
//! amounts arrive as f64, so every conversion rounds to micro-dollar
//! precision first to keep binary float noise from shifting a whole-credit
//! boundary (0.10 USD must be exactly 100 credits, never 101).

/// Credits per USD.
pub const CREDITS_PER_USD: i64 = 1000;

fn round_micro(value: f64) -> f64 {
    (value * 1_000_000.0).round() / 1_000_000.0
}

/// Usage debit: `ceil(raw_cost_usd * 1000)` credits.
#[must_use]
pub fn usd_to_credits_ceil(raw_cost_usd: f64) -> i64 {
    if raw_cost_usd <= 0.0 {
        return 0;
    }
    round_micro(raw_cost_usd * CREDITS_PER_USD as f64).ceil() as i64
}

/// Top-up grant: `floor(paid_usd * 1000 / (1 + markup))` credits.
#[must_use]
pub fn topup_credits(paid_usd: f64, markup_rate: f64) -> i64 {
    if paid_usd <= 0.0 {
        return 0;
    }
    round_micro(paid_usd * CREDITS_PER_USD as f64 / (1.0 + markup_rate)).floor() as i64
}

/// Revenue retained on a top-up, in USD.
#[must_use]
pub fn topup_revenue_usd(paid_usd: f64, markup_rate: f64) -> f64 {
    paid_usd - topup_credits(paid_usd, markup_rate) as f64 / CREDITS_PER_USD as f64
}

/// Pre-flight cost estimate in credits for a prospective call.
///
/// `price_in_per_1k` / `price_out_per_1k` are USD per 1000 tokens.
#[must_use]
pub fn estimate_credits(
    input_tokens: u64,
    expected_output_tokens: u64,
    price_in_per_1k: f64,
    price_out_per_1k: f64,
) -> i64 {
    let usd = input_tokens as f64 / 1000.0 * price_in_per_1k
        + expected_output_tokens as f64 / 1000.0 * price_out_per_1k;
    usd_to_credits_ceil(usd)
}

/// Rough token count for estimation when the caller has only text: four
/// bytes per token, rounded up.
#[must_use]
pub fn approximate_tokens(text: &str) -> u64 {
    (text.len() as u64).div_ceil(4)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn ten_cents_is_exactly_one_hundred_credits() {
        assert_eq!(usd_to_credits_ceil(0.10), 100);
    }

    #[test]
    fn fractional_credits_round_up() {
        assert_eq!(usd_to_credits_ceil(0.0001), 1);
        assert_eq!(usd_to_credits_ceil(0.001), 1);
        assert_eq!(usd_to_credits_ceil(0.0011), 2);
    }

    #[test]
    fn zero_and_negative_cost_is_zero_credits() {
        assert_eq!(usd_to_credits_ceil(0.0), 0);
        assert_eq!(usd_to_credits_ceil(-0.5), 0);
    }

    #[test]
    fn hundred_dollar_topup_at_default_markup() {
        assert_eq!(topup_credits(100.0, 0.15), 86_956);
    }

    #[test]
    fn zero_markup_topup_is_exact() {
        assert_eq!(topup_credits(5.0, 0.0), 5_000);
    }

    #[test]
    fn topup_revenue_is_the_remainder() {
        let revenue = topup_revenue_usd(100.0, 0.15);
        assert!((revenue - (100.0 - 86.956)).abs() < 1e-9, "got {revenue}");
    }

    #[test]
    fn estimate_combines_both_prices() {
        // 2000 in * $0.003/1k + 1000 out * $0.015/1k = 0.006 + 0.015 = $0.021
        assert_eq!(estimate_credits(2000, 1000, 0.003, 0.015), 21);
    }

    #[test]
    fn zero_token_estimate_is_zero() {
        assert_eq!(estimate_credits(0, 0, 0.003, 0.015), 0);
    }

    #[test]
    fn approximate_tokens_rounds_up() {
        assert_eq!(approximate_tokens(""), 0);
        assert_eq!(approximate_tokens("abcd"), 1);
        assert_eq!(approximate_tokens("abcde"), 2);
    }

    proptest! {
        /// Usage debits never lose money: credits/1000 covers the raw cost.
        #[test]
        fn ceil_never_undercharges(cost in 0.0f64..10_000.0) {
            let credits = usd_to_credits_ceil(cost);
            let charged_usd = credits as f64 / CREDITS_PER_USD as f64;
            prop_assert!(charged_usd >= round_micro(cost) - 1e-9);
            prop_assert!(charged_usd - cost < 0.001 + 1e-9);
        }

        /// Top-ups never grant more than the no-markup conversion.
        #[test]
        fn topup_never_overgrants(paid in 0.0f64..10_000.0, markup in 0.0f64..0.99) {
            let credits = topup_credits(paid, markup);
            prop_assert!(credits <= (round_micro(paid * 1000.0)) as i64);
            prop_assert!(credits >= 0);
        }
    }
}

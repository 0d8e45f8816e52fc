//! Opportunity discovery — the two-leg round-trip probe and the
//! profitability model.
//!
//! `find_opportunity` issues two chained quotes (base → middle, then
//! middle → base using the first leg's output) and accepts the pair only
//! when the estimated net profit clears the configured threshold.
//! `combine_legs` then folds both legs into the single synthetic route
//! that the instruction endpoint expects.
//!
//! The two-query probe is inherently racy against real price movement
//! between leg A and leg B; the aggregator's interface is point-to-point,
//! so that staleness risk is accepted rather than worked around.

use anyhow::Result;
use serde::Serialize;
use tracing::{debug, warn};

use crate::jupiter::{QuoteProvider, QuoteResponse};

/// Slippage tolerance used for both probe legs.
pub const QUOTE_SLIPPAGE_BPS: u16 = 100;

/// Flat allowance for the base transaction fee of both bundle legs.
pub const BASE_FEE_BUFFER_LAMPORTS: u64 = 10_000;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Probe parameters, copied out of the worker's config snapshot.
#[derive(Debug, Clone, Copy)]
pub struct ProbeParams {
    /// Static relay tip, subtracted from gross profit up front.
    pub tip_lamports: u64,
    /// Minimum net profit for an opportunity to be pursued.
    pub min_gain_lamports: u64,
}

/// A two-leg round trip whose estimated net profit cleared the threshold.
#[derive(Debug, Clone)]
pub struct Opportunity {
    pub leg_a: QuoteResponse,
    pub leg_b: QuoteResponse,
    /// Estimated profit after base fees and the relay tip, in lamports.
    pub net_profit: i64,
    pub tip_lamports: u64,
}

/// Synthetic combined route sent to the instruction endpoint.
///
/// `other_amount_threshold` and `price_impact_pct` are forced to zero:
/// the combined route only requests instruction construction, it is not
/// an execution guarantee.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CombinedRoute {
    pub in_amount: String,
    pub input_mint: String,
    pub other_amount_threshold: String,
    pub out_amount: String,
    pub output_mint: String,
    pub route_plan: Vec<serde_json::Value>,
    pub slippage_bps: u16,
    pub swap_mode: String,
    pub price_impact_pct: String,
}

// ---------------------------------------------------------------------------
// Probe
// ---------------------------------------------------------------------------

/// Probe one (base, middle, amount) triple for a profitable round trip.
///
/// A failed quote on either leg is a normal negative result — logged and
/// reported as `None`, never raised. Retry is the loop's job, not ours.
pub async fn find_opportunity(
    quotes: &dyn QuoteProvider,
    base_mint: &str,
    middle_mint: &str,
    amount_in: u64,
    params: &ProbeParams,
) -> Result<Option<Opportunity>> {
    let leg_a = match quotes
        .get_quote(base_mint, middle_mint, amount_in, QUOTE_SLIPPAGE_BPS)
        .await
    {
        Ok(q) => q,
        Err(e) => {
            warn!(error = %e, mint = middle_mint, "Leg A quote failed, skipping");
            return Ok(None);
        }
    };

    let leg_a_out = leg_a.out_amount_lamports()?;

    let leg_b = match quotes
        .get_quote(middle_mint, base_mint, leg_a_out, QUOTE_SLIPPAGE_BPS)
        .await
    {
        Ok(q) => q,
        Err(e) => {
            warn!(error = %e, mint = middle_mint, "Leg B quote failed, skipping");
            return Ok(None);
        }
    };

    let leg_b_out = leg_b.out_amount_lamports()?;

    let net_profit = net_profit_lamports(leg_b_out, amount_in, params.tip_lamports);

    if net_profit > params.min_gain_lamports as i64 {
        debug!(
            net_profit,
            amount_in,
            mint = middle_mint,
            "Opportunity found"
        );
        Ok(Some(Opportunity {
            leg_a,
            leg_b,
            net_profit,
            tip_lamports: params.tip_lamports,
        }))
    } else {
        Ok(None)
    }
}

/// Net profit of a round trip after the base-fee buffer and the tip.
/// Negative when the cycle loses money.
pub fn net_profit_lamports(round_trip_out: u64, amount_in: u64, tip_lamports: u64) -> i64 {
    round_trip_out as i64
        - amount_in as i64
        - BASE_FEE_BUFFER_LAMPORTS as i64
        - tip_lamports as i64
}

// ---------------------------------------------------------------------------
// Leg combination
// ---------------------------------------------------------------------------

/// Fold two quote legs into the synthetic round-trip route.
///
/// Pure: input side comes from leg A, output side from leg B, route
/// plans are concatenated in order.
pub fn combine_legs(leg_a: &QuoteResponse, leg_b: &QuoteResponse, slippage_bps: u16) -> CombinedRoute {
    let mut route_plan = leg_a.route_plan.clone();
    route_plan.extend(leg_b.route_plan.iter().cloned());

    CombinedRoute {
        in_amount: leg_a.in_amount.clone(),
        input_mint: leg_a.input_mint.clone(),
        other_amount_threshold: "0".to_string(),
        out_amount: leg_b.out_amount.clone(),
        output_mint: leg_b.output_mint.clone(),
        route_plan,
        slippage_bps,
        swap_mode: "ExactIn".to_string(),
        price_impact_pct: "0.0".to_string(),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jupiter::MockQuoteProvider;
    use serde_json::json;

    const BASE: &str = "So11111111111111111111111111111111111111112";
    const MIDDLE: &str = "EPjFWdd5AufqSSqeM2qN1xzybapC8G4wEGGkZwyTDt1v";

    fn quote(input: &str, output: &str, in_amount: u64, out_amount: u64, hops: usize) -> QuoteResponse {
        QuoteResponse {
            input_mint: input.to_string(),
            output_mint: output.to_string(),
            in_amount: in_amount.to_string(),
            out_amount: out_amount.to_string(),
            other_amount_threshold: "0".into(),
            swap_mode: "ExactIn".into(),
            slippage_bps: QUOTE_SLIPPAGE_BPS,
            price_impact_pct: "0.002".into(),
            route_plan: (0..hops).map(|i| json!({"hop": i})).collect(),
        }
    }

    fn params(tip: u64, min_gain: u64) -> ProbeParams {
        ProbeParams {
            tip_lamports: tip,
            min_gain_lamports: min_gain,
        }
    }

    // -- combine_legs ----------------------------------------------------

    #[test]
    fn test_combine_preserves_leg_endpoints() {
        let a = quote(BASE, MIDDLE, 1_000_000, 1_010_000, 2);
        let b = quote(MIDDLE, BASE, 1_010_000, 1_020_000, 3);
        let combined = combine_legs(&a, &b, 0);

        assert_eq!(combined.in_amount, "1000000");
        assert_eq!(combined.input_mint, BASE);
        assert_eq!(combined.out_amount, "1020000");
        assert_eq!(combined.output_mint, BASE);
    }

    #[test]
    fn test_combine_concatenates_route_plans() {
        let a = quote(BASE, MIDDLE, 1, 2, 2);
        let b = quote(MIDDLE, BASE, 2, 3, 3);
        let combined = combine_legs(&a, &b, 0);

        assert_eq!(combined.route_plan.len(), 5);
        // Leg A hops come first, in order.
        assert_eq!(combined.route_plan[0], json!({"hop": 0}));
        assert_eq!(combined.route_plan[2], json!({"hop": 0}));
    }

    #[test]
    fn test_combine_forces_zero_guardrails() {
        let a = quote(BASE, MIDDLE, 1, 2, 1);
        let b = quote(MIDDLE, BASE, 2, 3, 1);
        let combined = combine_legs(&a, &b, 50);

        assert_eq!(combined.other_amount_threshold, "0");
        assert_eq!(combined.price_impact_pct, "0.0");
        assert_eq!(combined.swap_mode, "ExactIn");
        assert_eq!(combined.slippage_bps, 50);
    }

    #[test]
    fn test_combined_route_serializes_camel_case() {
        let a = quote(BASE, MIDDLE, 1, 2, 0);
        let b = quote(MIDDLE, BASE, 2, 3, 0);
        let v = serde_json::to_value(combine_legs(&a, &b, 0)).unwrap();

        assert!(v.get("inAmount").is_some());
        assert!(v.get("otherAmountThreshold").is_some());
        assert!(v.get("routePlan").is_some());
        assert!(v.get("in_amount").is_none());
    }

    // -- profitability ---------------------------------------------------

    #[test]
    fn test_net_profit_arithmetic() {
        // Worked scenario: 1_020_000 out - 1_000_000 in - 10_000 - 5_000.
        assert_eq!(net_profit_lamports(1_020_000, 1_000_000, 5_000), 5_000);
        // Losing cycles go negative rather than underflowing.
        assert_eq!(net_profit_lamports(900_000, 1_000_000, 5_000), -115_000);
    }

    #[tokio::test]
    async fn test_profitable_round_trip_accepted() {
        let mut quotes = MockQuoteProvider::new();
        quotes
            .expect_get_quote()
            .withf(|i, o, amount, bps| {
                i == BASE && o == MIDDLE && *amount == 1_000_000 && *bps == QUOTE_SLIPPAGE_BPS
            })
            .times(1)
            .returning(|_, _, _, _| Ok(quote(BASE, MIDDLE, 1_000_000, 1_010_000, 1)));
        // Leg B must use leg A's output amount as its input amount.
        quotes
            .expect_get_quote()
            .withf(|i, o, amount, _| i == MIDDLE && o == BASE && *amount == 1_010_000)
            .times(1)
            .returning(|_, _, _, _| Ok(quote(MIDDLE, BASE, 1_010_000, 1_020_000, 1)));

        let opp = find_opportunity(&quotes, BASE, MIDDLE, 1_000_000, &params(5_000, 1_000))
            .await
            .unwrap()
            .expect("opportunity should clear the threshold");

        assert_eq!(opp.net_profit, 5_000);
        assert_eq!(opp.tip_lamports, 5_000);
        assert_eq!(opp.leg_a.out_amount, "1010000");
        assert_eq!(opp.leg_b.out_amount, "1020000");
    }

    #[tokio::test]
    async fn test_profit_below_threshold_rejected() {
        let mut quotes = MockQuoteProvider::new();
        quotes
            .expect_get_quote()
            .times(2)
            .returning(|i, o, amount, _| Ok(quote(i, o, amount, amount + 7_000, 1)));

        // Gross +7_000 on leg B, minus 10_000 buffer and 5_000 tip: deep red.
        let opp = find_opportunity(&quotes, BASE, MIDDLE, 1_000_000, &params(5_000, 1_000))
            .await
            .unwrap();
        assert!(opp.is_none());
    }

    #[tokio::test]
    async fn test_profit_exactly_at_threshold_rejected() {
        // net = 1_016_000 - 1_000_000 - 10_000 - 5_000 = 1_000 == min_gain,
        // and the gate is strict.
        let mut quotes = MockQuoteProvider::new();
        quotes
            .expect_get_quote()
            .withf(|i, _, _, _| i == BASE)
            .returning(|_, _, _, _| Ok(quote(BASE, MIDDLE, 1_000_000, 1_005_000, 1)));
        quotes
            .expect_get_quote()
            .withf(|i, _, _, _| i == MIDDLE)
            .returning(|_, _, _, _| Ok(quote(MIDDLE, BASE, 1_005_000, 1_016_000, 1)));

        let opp = find_opportunity(&quotes, BASE, MIDDLE, 1_000_000, &params(5_000, 1_000))
            .await
            .unwrap();
        assert!(opp.is_none());
    }

    #[tokio::test]
    async fn test_leg_a_failure_short_circuits() {
        let mut quotes = MockQuoteProvider::new();
        // Exactly one call: leg B must never be attempted.
        quotes
            .expect_get_quote()
            .times(1)
            .returning(|_, _, _, _| Err(anyhow::anyhow!("connection refused")));

        let opp = find_opportunity(&quotes, BASE, MIDDLE, 1_000_000, &params(5_000, 1_000))
            .await
            .unwrap();
        assert!(opp.is_none());
    }

    #[tokio::test]
    async fn test_leg_b_failure_is_no_opportunity() {
        let mut quotes = MockQuoteProvider::new();
        quotes
            .expect_get_quote()
            .withf(|i, _, _, _| i == BASE)
            .times(1)
            .returning(|_, _, _, _| Ok(quote(BASE, MIDDLE, 1_000_000, 1_010_000, 1)));
        quotes
            .expect_get_quote()
            .withf(|i, _, _, _| i == MIDDLE)
            .times(1)
            .returning(|_, _, _, _| Err(anyhow::anyhow!("timeout")));

        let opp = find_opportunity(&quotes, BASE, MIDDLE, 1_000_000, &params(5_000, 1_000))
            .await
            .unwrap();
        assert!(opp.is_none());
    }

    #[tokio::test]
    async fn test_malformed_out_amount_is_error() {
        // Unlike a failed leg, a leg that "succeeds" with garbage numbers
        // is an error the iteration boundary should see.
        let mut quotes = MockQuoteProvider::new();
        quotes.expect_get_quote().times(1).returning(|_, _, _, _| {
            let mut q = quote(BASE, MIDDLE, 1, 2, 1);
            q.out_amount = "garbage".into();
            Ok(q)
        });

        let result = find_opportunity(&quotes, BASE, MIDDLE, 1_000_000, &params(5_000, 1_000)).await;
        assert!(result.is_err());
    }
}

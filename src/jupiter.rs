//! Jupiter quote-aggregator client.
//!
//! Thin wrapper over the aggregator's `GET /quote` endpoint. One quote
//! call covers one directional leg; the round-trip probe lives in
//! `strategy`. No retry here — a failed call is the caller's problem.
//!
//! Every request carries an explicit timeout so a hung aggregator can
//! never stall a worker indefinitely.

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

/// Hard cap on a single quote request.
const QUOTE_TIMEOUT: Duration = Duration::from_secs(3);

// ---------------------------------------------------------------------------
// Wire types
// ---------------------------------------------------------------------------

/// One directional quote leg as returned by `GET /quote`.
///
/// Amounts are decimal strings on the wire (Jupiter convention); the
/// route plan is carried opaquely — it is only ever concatenated and
/// echoed back to the instruction endpoint, never interpreted.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuoteResponse {
    pub input_mint: String,
    pub output_mint: String,
    pub in_amount: String,
    pub out_amount: String,
    #[serde(default)]
    pub other_amount_threshold: String,
    #[serde(default)]
    pub swap_mode: String,
    #[serde(default)]
    pub slippage_bps: u16,
    #[serde(default)]
    pub price_impact_pct: String,
    #[serde(default)]
    pub route_plan: Vec<serde_json::Value>,
}

impl QuoteResponse {
    /// Parse the output amount string into lamports.
    pub fn out_amount_lamports(&self) -> Result<u64> {
        self.out_amount
            .parse::<u64>()
            .with_context(|| format!("Unparseable outAmount: {:?}", self.out_amount))
    }
}

// ---------------------------------------------------------------------------
// Quote provider seam
// ---------------------------------------------------------------------------

/// Abstraction over the quote service so the opportunity probe can be
/// tested without a live aggregator.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait QuoteProvider: Send + Sync {
    /// Fetch a single directional quote. Network, timeout, and
    /// malformed-response failures all surface as errors.
    async fn get_quote(
        &self,
        input_mint: &str,
        output_mint: &str,
        amount: u64,
        slippage_bps: u16,
    ) -> Result<QuoteResponse>;
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

/// HTTP client for a Jupiter-compatible quote aggregator.
pub struct JupiterClient {
    http: Client,
    base_url: String,
    only_direct_routes: bool,
}

impl JupiterClient {
    pub fn new(base_url: &str, only_direct_routes: bool) -> Result<Self> {
        let http = Client::builder()
            .timeout(QUOTE_TIMEOUT)
            .build()
            .context("Failed to build HTTP client for Jupiter")?;

        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            only_direct_routes,
        })
    }

    fn quote_url(&self, input_mint: &str, output_mint: &str, amount: u64, slippage_bps: u16) -> String {
        format!(
            "{}/quote?inputMint={}&outputMint={}&amount={}&slippageBps={}&onlyDirectRoutes={}",
            self.base_url, input_mint, output_mint, amount, slippage_bps, self.only_direct_routes,
        )
    }
}

#[async_trait]
impl QuoteProvider for JupiterClient {
    async fn get_quote(
        &self,
        input_mint: &str,
        output_mint: &str,
        amount: u64,
        slippage_bps: u16,
    ) -> Result<QuoteResponse> {
        let url = self.quote_url(input_mint, output_mint, amount, slippage_bps);
        debug!(url = %url, "Fetching quote");

        let resp = self
            .http
            .get(&url)
            .send()
            .await
            .context("Quote request failed")?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            anyhow::bail!("Quote service error {status}: {body}");
        }

        let quote: QuoteResponse = resp
            .json()
            .await
            .context("Failed to parse quote response")?;

        Ok(quote)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quote_url_shape() {
        let client = JupiterClient::new("http://127.0.0.1:18080/", true).unwrap();
        let url = client.quote_url("MintIn", "MintOut", 1_000_000, 100);
        assert_eq!(
            url,
            "http://127.0.0.1:18080/quote?inputMint=MintIn&outputMint=MintOut&amount=1000000&slippageBps=100&onlyDirectRoutes=true"
        );
    }

    #[test]
    fn test_deserialize_quote_response() {
        let json = r#"{
            "inputMint": "So11111111111111111111111111111111111111112",
            "outputMint": "EPjFWdd5AufqSSqeM2qN1xzybapC8G4wEGGkZwyTDt1v",
            "inAmount": "1000000",
            "outAmount": "1010000",
            "otherAmountThreshold": "999000",
            "swapMode": "ExactIn",
            "slippageBps": 100,
            "priceImpactPct": "0.01",
            "routePlan": [{"swapInfo": {"label": "Raydium"}, "percent": 100}]
        }"#;

        let quote: QuoteResponse = serde_json::from_str(json).unwrap();
        assert_eq!(quote.in_amount, "1000000");
        assert_eq!(quote.out_amount_lamports().unwrap(), 1_010_000);
        assert_eq!(quote.route_plan.len(), 1);
        assert_eq!(quote.slippage_bps, 100);
    }

    #[test]
    fn test_deserialize_minimal_response() {
        // Optional fields absent — must still parse.
        let json = r#"{
            "inputMint": "A",
            "outputMint": "B",
            "inAmount": "5",
            "outAmount": "6"
        }"#;
        let quote: QuoteResponse = serde_json::from_str(json).unwrap();
        assert!(quote.route_plan.is_empty());
        assert_eq!(quote.slippage_bps, 0);
    }

    #[test]
    fn test_out_amount_unparseable() {
        let quote = QuoteResponse {
            input_mint: "A".into(),
            output_mint: "B".into(),
            in_amount: "1".into(),
            out_amount: "not-a-number".into(),
            other_amount_threshold: String::new(),
            swap_mode: String::new(),
            slippage_bps: 0,
            price_impact_pct: String::new(),
            route_plan: Vec::new(),
        };
        assert!(quote.out_amount_lamports().is_err());
    }
}

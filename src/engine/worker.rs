//! A single arbitrage worker: one anchor refresher plus one sequential
//! probe→assemble→bundle→submit loop.
//!
//! Each iteration draws a random amount, middle mint, intermediary, and
//! tip account, probes for a round-trip opportunity, and — when one
//! clears the profit threshold — builds and races a bundle. Iterations
//! are stateless; nothing carries over except the shared anchor.
//!
//! Errors inside an iteration are caught at the loop boundary, logged
//! with the worker id, and followed by a fixed backoff. A quote leg that
//! fails is not an error, just a skipped iteration.

use anyhow::{Context, Result};
use rand::rngs::SmallRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use solana_client::nonblocking::rpc_client::RpcClient;
use solana_sdk::pubkey::Pubkey;
use solana_sdk::signature::{Keypair, Signer};
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::anchor::{self, AnchorWatch};
use crate::assembler::InstructionAssembler;
use crate::bundle::build_bundle;
use crate::config::Settings;
use crate::jito::JitoClient;
use crate::jupiter::JupiterClient;
use crate::strategy::{combine_legs, find_opportunity, ProbeParams};

/// Pause after an unexpected iteration failure before looping again.
const ITERATION_BACKOFF: Duration = Duration::from_secs(1);

// ---------------------------------------------------------------------------
// Context
// ---------------------------------------------------------------------------

/// Immutable per-worker snapshot handed out by the supervisor. The id
/// exists purely for log attribution — work is never partitioned by it.
#[derive(Debug, Clone)]
pub struct WorkerContext {
    pub worker_id: usize,
    pub settings: Settings,
    pub middle_mints: Vec<String>,
}

/// What one pass through the loop body accomplished.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IterationOutcome {
    NoOpportunity,
    Submitted,
}

// ---------------------------------------------------------------------------
// Worker
// ---------------------------------------------------------------------------

pub struct Worker {
    id: usize,
    jupiter: JupiterClient,
    assembler: InstructionAssembler,
    jito: JitoClient,
    rpc: Arc<RpcClient>,
    signer: Keypair,
    intermediaries: Vec<Keypair>,
    tip_accounts: Vec<Pubkey>,
    middle_mints: Vec<String>,
    base_mint: String,
    amount_in_min: u64,
    amount_in_max: u64,
    probe: ProbeParams,
    anchor: AnchorWatch,
    rng: SmallRng,
}

impl Worker {
    /// Build a worker from its config snapshot. Key or address parse
    /// failures here are configuration errors and are fatal for this
    /// worker.
    pub fn new(ctx: &WorkerContext) -> Result<Self> {
        let settings = &ctx.settings;
        anyhow::ensure!(!ctx.middle_mints.is_empty(), "No middle mints configured");
        anyhow::ensure!(
            settings.trade.amount_in_min <= settings.trade.amount_in_max,
            "amount_in_min must not exceed amount_in_max"
        );

        let signer = settings.wallet.signer()?;
        let intermediaries = settings.wallet.intermediaries()?;

        let tip_accounts = settings
            .relay
            .tip_accounts
            .iter()
            .map(|a| Pubkey::from_str(a).with_context(|| format!("Invalid tip account: {a}")))
            .collect::<Result<Vec<_>>>()?;
        anyhow::ensure!(!tip_accounts.is_empty(), "No tip accounts configured");

        let rpc = Arc::new(RpcClient::new(settings.rpc.url.clone()));
        let jupiter = JupiterClient::new(&settings.quote.base_url, settings.quote.only_direct_routes)?;
        let assembler = InstructionAssembler::new(&settings.quote.base_url, Arc::clone(&rpc))?;
        let jito = JitoClient::new(&settings.relay)?;

        // Placeholder watch; run() replaces it with the refresher's.
        let (_publisher, anchor) = anchor::channel();

        Ok(Self {
            id: ctx.worker_id,
            jupiter,
            assembler,
            jito,
            rpc,
            signer,
            intermediaries,
            tip_accounts,
            middle_mints: ctx.middle_mints.clone(),
            base_mint: settings.trade.base_mint.clone(),
            amount_in_min: settings.trade.amount_in_min,
            amount_in_max: settings.trade.amount_in_max,
            probe: ProbeParams {
                tip_lamports: settings.relay.static_tip_lamports,
                min_gain_lamports: settings.trade.min_gain_lamports,
            },
            anchor,
            rng: SmallRng::from_entropy(),
        })
    }

    /// Run the worker forever. Only configuration-level failures escape;
    /// everything transient is absorbed at the iteration boundary.
    pub async fn run(mut self) -> Result<()> {
        let (refresher, watch) = anchor::spawn_refresher(Arc::clone(&self.rpc), self.id);
        let _refresher = AbortOnDrop(refresher);
        self.anchor = watch;

        info!(worker = self.id, "Waiting for first anchor...");
        self.anchor.wait_ready().await?;
        info!(worker = self.id, "Worker loop started");

        loop {
            match self.iteration().await {
                Ok(IterationOutcome::Submitted) => {}
                Ok(IterationOutcome::NoOpportunity) => {}
                Err(e) => {
                    error!(worker = self.id, error = %e, "Iteration failed, backing off");
                    tokio::time::sleep(ITERATION_BACKOFF).await;
                }
            }
        }
    }

    /// One pass: random inputs → probe → assemble → bundle → submit.
    async fn iteration(&mut self) -> Result<IterationOutcome> {
        let amount_in = self.rng.gen_range(self.amount_in_min..=self.amount_in_max);
        let middle_mint = self
            .middle_mints
            .choose(&mut self.rng)
            .context("No middle mints configured")?
            .clone();

        let Some(opportunity) =
            find_opportunity(&self.jupiter, &self.base_mint, &middle_mint, amount_in, &self.probe)
                .await?
        else {
            return Ok(IterationOutcome::NoOpportunity);
        };

        let combined = combine_legs(&opportunity.leg_a, &opportunity.leg_b, 0);
        let assembled = self
            .assembler
            .assemble(&combined, &self.signer.pubkey())
            .await?;

        let anchor = self
            .anchor
            .snapshot()
            .context("Anchor unavailable after startup")?;

        let intermediary_idx = self.rng.gen_range(0..self.intermediaries.len());
        let intermediary = &self.intermediaries[intermediary_idx];
        let tip_account = *self
            .tip_accounts
            .choose(&mut self.rng)
            .context("No tip accounts configured")?;

        let bundle = build_bundle(
            &assembled,
            &self.signer,
            intermediary,
            tip_account,
            opportunity.tip_lamports,
            anchor,
        )?;

        info!(
            worker = self.id,
            profit = opportunity.net_profit,
            tip = opportunity.tip_lamports,
            mint = %middle_mint,
            amount_in,
            "Bundle built"
        );

        let result = self.jito.submit(&bundle, &mut self.rng).await;
        match &result.outcome {
            Ok(ack) => info!(
                worker = self.id,
                endpoint = %result.endpoint,
                egress = ?result.egress_ip,
                ack = %ack,
                "Bundle submitted"
            ),
            Err(e) => warn!(
                worker = self.id,
                endpoint = %result.endpoint,
                egress = ?result.egress_ip,
                error = %e,
                "Bundle submission failed"
            ),
        }
        debug!(worker = self.id, "Iteration complete");

        Ok(IterationOutcome::Submitted)
    }
}

/// Aborts the refresher task when the worker goes away, so a restarted
/// worker doesn't leak its predecessor's background task.
struct AbortOnDrop(JoinHandle<()>);

impl Drop for AbortOnDrop {
    fn drop(&mut self) {
        self.0.abort();
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn test_settings(keypair_env: &str) -> Settings {
        let toml = format!(
            r#"
            [rpc]
            url = "http://127.0.0.1:8899"

            [quote]
            base_url = "http://127.0.0.1:18080"

            [wallet]
            keypair_env = "{keypair_env}"
            intermediary_keys = ["{intermediary}"]

            [trade]
            base_mint = "So11111111111111111111111111111111111111112"
            amount_in_min = 1000000
            amount_in_max = 2000000
            min_gain_lamports = 1000
            middle_mints_file = "middle_mints.json"

            [relay]
            urls = ["https://relay.example/api/v1/bundles"]
            tip_accounts = ["96gYZGLnJYVFmbjzopPSU6QiEV5fGqZNyN9nmNhvrZU5"]
            static_tip_lamports = 5000

            [engine]
            worker_count = 1
            "#,
            intermediary = bs58::encode(Keypair::new().to_bytes()).into_string(),
        );
        Settings::from_toml(&toml).unwrap()
    }

    fn test_context(keypair_env: &str) -> WorkerContext {
        WorkerContext {
            worker_id: 7,
            settings: test_settings(keypair_env),
            middle_mints: vec!["MintA".into(), "MintB".into()],
        }
    }

    #[test]
    fn test_worker_construction() {
        let env = "SOLARB_TEST_WORKER_KP";
        std::env::set_var(env, bs58::encode(Keypair::new().to_bytes()).into_string());

        let worker = Worker::new(&test_context(env)).unwrap();
        assert_eq!(worker.id, 7);
        assert_eq!(worker.intermediaries.len(), 1);
        assert_eq!(worker.probe.tip_lamports, 5_000);
    }

    #[test]
    fn test_worker_rejects_missing_signer_env() {
        let ctx = test_context("SOLARB_TEST_WORKER_KP_UNSET");
        assert!(Worker::new(&ctx).is_err());
    }

    #[test]
    fn test_worker_rejects_empty_mints() {
        let env = "SOLARB_TEST_WORKER_KP2";
        std::env::set_var(env, bs58::encode(Keypair::new().to_bytes()).into_string());

        let mut ctx = test_context(env);
        ctx.middle_mints.clear();
        assert!(Worker::new(&ctx).is_err());
    }

    #[test]
    fn test_worker_rejects_inverted_amount_bounds() {
        let env = "SOLARB_TEST_WORKER_KP3";
        std::env::set_var(env, bs58::encode(Keypair::new().to_bytes()).into_string());

        let mut ctx = test_context(env);
        ctx.settings.trade.amount_in_min = 10;
        ctx.settings.trade.amount_in_max = 5;
        assert!(Worker::new(&ctx).is_err());
    }

    #[test]
    fn test_amount_draw_respects_bounds() {
        let mut rng = SmallRng::seed_from_u64(42);
        for _ in 0..10_000 {
            let amount = rng.gen_range(1_000_000u64..=2_000_000);
            assert!((1_000_000..=2_000_000).contains(&amount));
        }
    }

    #[test]
    fn test_selection_roughly_uniform() {
        // Same selection pattern the loop uses: SliceRandom::choose over
        // the configured pools. Over many draws every candidate should
        // land near 1/k of the picks.
        let candidates: Vec<String> = (0..5).map(|i| format!("mint-{i}")).collect();
        let mut rng = SmallRng::seed_from_u64(7);
        let mut counts: HashMap<&str, u32> = HashMap::new();

        let draws = 50_000;
        for _ in 0..draws {
            let pick = candidates.choose(&mut rng).unwrap();
            *counts.entry(pick.as_str()).or_default() += 1;
        }

        let expected = draws as f64 / candidates.len() as f64;
        for mint in &candidates {
            let n = counts[mint.as_str()] as f64;
            assert!(
                (n - expected).abs() < expected * 0.1,
                "{mint} drawn {n} times, expected ~{expected}"
            );
        }
    }
}

//! Worker supervisor.
//!
//! Spawns `worker_count` isolated workers, each with its own cloned
//! configuration snapshot and unique id. Workers are intentionally
//! uncoordinated — several may chase the same opportunity and race each
//! other at the relay; that throughput-over-efficiency trade-off is the
//! point.
//!
//! By default a worker that exits or crashes is restarted after a fixed
//! backoff. `restart_on_exit = false` restores the legacy observe-only
//! behavior where exits are logged and left alone.

use anyhow::Result;
use std::time::Duration;
use tracing::{error, info, warn};

use crate::config::Settings;
use crate::engine::worker::{Worker, WorkerContext};

/// Pause before restarting a failed worker.
const RESTART_BACKOFF: Duration = Duration::from_secs(2);

pub struct Supervisor {
    settings: Settings,
    middle_mints: Vec<String>,
}

impl Supervisor {
    pub fn new(settings: Settings, middle_mints: Vec<String>) -> Self {
        Self {
            settings,
            middle_mints,
        }
    }

    /// One immutable snapshot per worker; the id is log attribution only.
    fn contexts(&self) -> Vec<WorkerContext> {
        (0..self.settings.engine.worker_count)
            .map(|worker_id| WorkerContext {
                worker_id,
                settings: self.settings.clone(),
                middle_mints: self.middle_mints.clone(),
            })
            .collect()
    }

    /// Spawn every worker and observe their lifecycles. Returns only
    /// when all supervision tasks have finished — with restart enabled,
    /// effectively never.
    pub async fn run(self) -> Result<()> {
        anyhow::ensure!(
            self.settings.engine.worker_count > 0,
            "worker_count must be at least 1"
        );

        let restart = self.settings.engine.restart_on_exit;
        info!(
            workers = self.settings.engine.worker_count,
            restart_on_exit = restart,
            "Spawning worker pool"
        );

        let handles: Vec<_> = self
            .contexts()
            .into_iter()
            .map(|ctx| tokio::spawn(supervise_worker(ctx, restart)))
            .collect();

        futures::future::join_all(handles).await;
        warn!("All workers have stopped");
        Ok(())
    }
}

/// Lifecycle loop for one worker slot.
async fn supervise_worker(ctx: WorkerContext, restart: bool) {
    loop {
        let worker = match Worker::new(&ctx) {
            Ok(w) => w,
            Err(e) => {
                // A key or address that doesn't parse won't parse on the
                // next attempt either; restarting would loop hot.
                error!(
                    worker = ctx.worker_id,
                    error = %e,
                    "Worker construction failed — giving up on this slot"
                );
                return;
            }
        };

        info!(worker = ctx.worker_id, "Worker starting");

        // Spawned so a panic is contained and observable as a JoinError.
        match tokio::spawn(worker.run()).await {
            Ok(Ok(())) => info!(worker = ctx.worker_id, "Worker exited"),
            Ok(Err(e)) => error!(worker = ctx.worker_id, error = %e, "Worker failed"),
            Err(e) if e.is_panic() => {
                error!(worker = ctx.worker_id, "Worker panicked")
            }
            Err(_) => warn!(worker = ctx.worker_id, "Worker task cancelled"),
        }

        if !restart {
            info!(
                worker = ctx.worker_id,
                "Observe-only supervision: worker will not be restarted"
            );
            return;
        }

        tokio::time::sleep(RESTART_BACKOFF).await;
        info!(worker = ctx.worker_id, "Restarting worker");
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_settings(worker_count: usize) -> Settings {
        let toml = format!(
            r#"
            [rpc]
            url = "http://127.0.0.1:8899"

            [quote]
            base_url = "http://127.0.0.1:18080"

            [wallet]
            keypair_env = "SOLARB_KEYPAIR"
            intermediary_keys = ["key"]

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
            worker_count = {worker_count}
            "#
        );
        Settings::from_toml(&toml).unwrap()
    }

    #[test]
    fn test_contexts_get_unique_ids_and_full_snapshots() {
        let supervisor = Supervisor::new(sample_settings(4), vec!["MintA".into()]);
        let contexts = supervisor.contexts();

        assert_eq!(contexts.len(), 4);
        for (i, ctx) in contexts.iter().enumerate() {
            assert_eq!(ctx.worker_id, i);
            assert_eq!(ctx.middle_mints, vec!["MintA".to_string()]);
            // Each worker gets its own copy, not a shared reference.
            assert_eq!(ctx.settings.engine.worker_count, 4);
        }
    }

    #[tokio::test]
    async fn test_run_rejects_zero_workers() {
        let supervisor = Supervisor::new(sample_settings(0), vec!["MintA".into()]);
        assert!(supervisor.run().await.is_err());
    }

    #[tokio::test]
    async fn test_construction_failure_gives_up_slot_even_with_restart() {
        // The signer env var is unset, so construction fails and the
        // supervision loop must return instead of spinning, even though
        // restart-on-exit is enabled.
        let ctx = WorkerContext {
            worker_id: 0,
            settings: sample_settings(1),
            middle_mints: vec!["MintA".into()],
        };
        std::env::remove_var("SOLARB_KEYPAIR");

        tokio::time::timeout(Duration::from_secs(1), supervise_worker(ctx, true))
            .await
            .expect("supervise_worker should return promptly");
    }
}

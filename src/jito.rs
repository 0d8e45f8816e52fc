//! Submission router — races a signed bundle to the Jito relay.
//!
//! One `sendBundle` POST per iteration, bound to a randomly chosen
//! local egress address, with a short connect timeout and a low-seconds
//! request timeout. Transport and HTTP errors are captured in the
//! result and logged by the caller; a bundle is never retried, the
//! opportunity is assumed stale after one attempt.
//!
//! Routing policy is **primary-endpoint-only**: only `urls[0]` is used
//! unless `race_all_endpoints` is set, in which case the bundle goes to
//! every endpoint concurrently and the first acknowledgment wins.

use anyhow::{Context, Result};
use rand::seq::SliceRandom;
use rand::Rng;
use serde_json::{json, Value};
use std::net::IpAddr;
use std::time::Duration;
use tracing::debug;

use crate::bundle::Bundle;
use crate::config::RelaySettings;

/// Hard cap on establishing the relay connection.
const CONNECT_TIMEOUT: Duration = Duration::from_millis(500);

/// Overall cap on one submission request.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(5);

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Outcome of one submission attempt. Ephemeral — used only for logging.
#[derive(Debug)]
pub struct SubmissionResult {
    pub endpoint: String,
    pub egress_ip: Option<IpAddr>,
    pub outcome: Result<Value, String>,
}

pub struct JitoClient {
    endpoints: Vec<String>,
    egress_ips: Vec<IpAddr>,
    race_all_endpoints: bool,
}

// ---------------------------------------------------------------------------
// Payload
// ---------------------------------------------------------------------------

/// JSON-RPC `sendBundle` envelope for a two-transaction bundle.
pub fn bundle_payload(primary_b64: &str, secondary_b64: &str) -> Value {
    json!({
        "jsonrpc": "2.0",
        "id": 1,
        "method": "sendBundle",
        "params": [
            [primary_b64, secondary_b64],
            { "encoding": "base64" },
        ],
    })
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

impl JitoClient {
    pub fn new(relay: &RelaySettings) -> Result<Self> {
        anyhow::ensure!(!relay.urls.is_empty(), "At least one relay URL is required");

        let egress_ips = relay
            .egress_ips
            .iter()
            .map(|ip| {
                ip.parse::<IpAddr>()
                    .with_context(|| format!("Invalid egress IP: {ip}"))
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            endpoints: relay.urls.clone(),
            egress_ips,
            race_all_endpoints: relay.race_all_endpoints,
        })
    }

    /// Submit a bundle once. Never raises — failures come back inside
    /// the result.
    pub async fn submit<R: Rng>(&self, bundle: &Bundle, rng: &mut R) -> SubmissionResult {
        let payload = bundle_payload(&bundle.primary_b64, &bundle.secondary_b64);
        let egress_ip = self.egress_ips.choose(rng).copied();

        if self.race_all_endpoints {
            self.submit_racing(&payload, egress_ip).await
        } else {
            let endpoint = self.endpoints[0].clone();
            let outcome = Self::submit_to(&endpoint, &payload, egress_ip).await;
            SubmissionResult {
                endpoint,
                egress_ip,
                outcome,
            }
        }
    }

    /// Race the bundle across every configured endpoint; first
    /// acknowledgment wins, otherwise the last error is reported.
    async fn submit_racing(&self, payload: &Value, egress_ip: Option<IpAddr>) -> SubmissionResult {
        let attempts = self.endpoints.iter().map(|endpoint| async move {
            let outcome = Self::submit_to(endpoint, payload, egress_ip).await;
            (endpoint.clone(), outcome)
        });

        let results = futures::future::join_all(attempts).await;

        let mut last_failure = None;
        for (endpoint, outcome) in results {
            match outcome {
                Ok(ack) => {
                    return SubmissionResult {
                        endpoint,
                        egress_ip,
                        outcome: Ok(ack),
                    }
                }
                Err(e) => last_failure = Some((endpoint, e)),
            }
        }

        match last_failure {
            Some((endpoint, error)) => SubmissionResult {
                endpoint,
                egress_ip,
                outcome: Err(error),
            },
            // Unreachable with a validated config, but keep it total.
            None => SubmissionResult {
                endpoint: String::new(),
                egress_ip,
                outcome: Err("no relay endpoints configured".into()),
            },
        }
    }

    async fn submit_to(
        endpoint: &str,
        payload: &Value,
        egress_ip: Option<IpAddr>,
    ) -> Result<Value, String> {
        debug!(endpoint, egress = ?egress_ip, "Submitting bundle");

        let client = reqwest::Client::builder()
            .local_address(egress_ip)
            .connect_timeout(CONNECT_TIMEOUT)
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| format!("client build failed: {e}"))?;

        let resp = client
            .post(endpoint)
            .json(payload)
            .send()
            .await
            .map_err(|e| format!("request failed: {e}"))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(format!("relay returned {status}: {body}"));
        }

        resp.json::<Value>()
            .await
            .map_err(|e| format!("unparseable relay response: {e}"))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

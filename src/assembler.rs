//! Instruction assembly — turns an accepted round trip into ledger-native
//! instructions.
//!
//! Delegates construction to the aggregator's `POST /swap-instructions`
//! endpoint, decodes the returned payloads, filters setup instructions
//! down to the allow-listed ATA program, and resolves address lookup
//! tables over RPC.
//!
//! Lookup-table resolution is deliberately **best-effort**: entries that
//! are missing on chain or fail to deserialize are dropped rather than
//! aborting the iteration.

use anyhow::{Context, Result};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use solana_client::nonblocking::rpc_client::RpcClient;
use solana_sdk::address_lookup_table::state::AddressLookupTable;
use solana_sdk::address_lookup_table::AddressLookupTableAccount;
use solana_sdk::instruction::{AccountMeta, Instruction};
use solana_sdk::pubkey::Pubkey;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use crate::strategy::CombinedRoute;

/// Setup instructions from any program other than this one are discarded.
/// Third-party setup logic we did not ask for never makes it into a
/// transaction we sign.
pub const ALLOWED_SETUP_PROGRAM: &str = "ATokenGPvbdGVxr1b2hvZbsiqW5xWH25efTNsLJA8knL";

/// Hard cap on the instruction-construction request.
const INSTRUCTION_TIMEOUT: Duration = Duration::from_secs(5);

// ---------------------------------------------------------------------------
// Wire types
// ---------------------------------------------------------------------------

/// One instruction as returned by `/swap-instructions`: base58 keys,
/// base64 data.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InstructionPayload {
    pub program_id: String,
    pub accounts: Vec<AccountMetaPayload>,
    pub data: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountMetaPayload {
    pub pubkey: String,
    pub is_signer: bool,
    pub is_writable: bool,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SwapInstructionsResponse {
    pub swap_instruction: InstructionPayload,
    #[serde(default)]
    pub setup_instructions: Vec<InstructionPayload>,
    #[serde(default)]
    pub address_lookup_table_addresses: Vec<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SwapInstructionsRequest<'a> {
    quote_response: &'a CombinedRoute,
    user_public_key: String,
    use_shared_accounts: bool,
}

impl InstructionPayload {
    /// Decode into a ledger-native instruction.
    pub fn decode(&self) -> Result<Instruction> {
        use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};

        let program_id = Pubkey::from_str(&self.program_id)
            .with_context(|| format!("Invalid program id: {}", self.program_id))?;

        let accounts = self
            .accounts
            .iter()
            .map(|a| {
                let pubkey = Pubkey::from_str(&a.pubkey)
                    .with_context(|| format!("Invalid account key: {}", a.pubkey))?;
                Ok(if a.is_writable {
                    AccountMeta::new(pubkey, a.is_signer)
                } else {
                    AccountMeta::new_readonly(pubkey, a.is_signer)
                })
            })
            .collect::<Result<Vec<_>>>()?;

        let data = BASE64
            .decode(&self.data)
            .context("Instruction data is not valid base64")?;

        Ok(Instruction {
            program_id,
            accounts,
            data,
        })
    }
}

/// Keep only setup instructions belonging to the allow-listed program.
pub fn filter_setup_instructions(payloads: &[InstructionPayload]) -> Vec<&InstructionPayload> {
    payloads
        .iter()
        .filter(|p| p.program_id == ALLOWED_SETUP_PROGRAM)
        .collect()
}

// ---------------------------------------------------------------------------
// Assembler
// ---------------------------------------------------------------------------

/// Everything the bundle builder needs: decoded instructions plus
/// resolved lookup tables.
#[derive(Debug, Clone)]
pub struct AssembledInstructions {
    pub swap: Instruction,
    pub setup: Vec<Instruction>,
    pub lookup_tables: Vec<AddressLookupTableAccount>,
}

pub struct InstructionAssembler {
    http: Client,
    base_url: String,
    rpc: Arc<RpcClient>,
}

impl InstructionAssembler {
    pub fn new(base_url: &str, rpc: Arc<RpcClient>) -> Result<Self> {
        let http = Client::builder()
            .timeout(INSTRUCTION_TIMEOUT)
            .build()
            .context("Failed to build HTTP client for instruction service")?;

        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            rpc,
        })
    }

    /// Fetch, decode, filter, and resolve everything needed to build the
    /// primary transaction. Any failure means the caller skips the
    /// current iteration.
    pub async fn assemble(
        &self,
        combined: &CombinedRoute,
        user: &Pubkey,
    ) -> Result<AssembledInstructions> {
        let response = self.fetch_instructions(combined, user).await?;

        let swap = response
            .swap_instruction
            .decode()
            .context("Failed to decode swap instruction")?;

        let setup = filter_setup_instructions(&response.setup_instructions)
            .into_iter()
            .map(|p| p.decode().context("Failed to decode setup instruction"))
            .collect::<Result<Vec<_>>>()?;

        debug!(
            setup_total = response.setup_instructions.len(),
            setup_kept = setup.len(),
            tables = response.address_lookup_table_addresses.len(),
            "Instructions fetched"
        );

        let lookup_tables = self
            .resolve_lookup_tables(&response.address_lookup_table_addresses)
            .await?;

        Ok(AssembledInstructions {
            swap,
            setup,
            lookup_tables,
        })
    }

    async fn fetch_instructions(
        &self,
        combined: &CombinedRoute,
        user: &Pubkey,
    ) -> Result<SwapInstructionsResponse> {
        let body = SwapInstructionsRequest {
            quote_response: combined,
            user_public_key: user.to_string(),
            use_shared_accounts: false,
        };

        let resp = self
            .http
            .post(format!("{}/swap-instructions", self.base_url))
            .json(&body)
            .send()
            .await
            .context("Instruction request failed")?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            anyhow::bail!("Instruction service error {status}: {body}");
        }

        resp.json()
            .await
            .context("Failed to parse swap-instructions response")
    }

    /// Resolve lookup-table addresses to their decoded on-chain contents.
    ///
    /// Best-effort address resolution: unknown addresses, missing
    /// accounts, and undecodable table state are all dropped from the
    /// result. The v0 compiler simply falls back to full-size keys for
    /// anything not covered by a table.
    pub async fn resolve_lookup_tables(
        &self,
        addresses: &[String],
    ) -> Result<Vec<AddressLookupTableAccount>> {
        if addresses.is_empty() {
            return Ok(Vec::new());
        }

        let keys: Vec<Pubkey> = addresses
            .iter()
            .filter_map(|a| match Pubkey::from_str(a) {
                Ok(k) => Some(k),
                Err(_) => {
                    debug!(address = %a, "Skipping unparseable lookup-table address");
                    None
                }
            })
            .collect();

        let accounts = self
            .rpc
            .get_multiple_accounts(&keys)
            .await
            .context("Lookup-table account fetch failed")?;

        let mut tables = Vec::with_capacity(keys.len());
        for (key, account) in keys.iter().zip(accounts) {
            let Some(account) = account else {
                debug!(table = %key, "Lookup table missing on chain, dropped");
                continue;
            };
            match AddressLookupTable::deserialize(&account.data) {
                Ok(table) => tables.push(AddressLookupTableAccount {
                    key: *key,
                    addresses: table.addresses.to_vec(),
                }),
                Err(e) => {
                    warn!(table = %key, error = %e, "Undecodable lookup table, dropped");
                }
            }
        }

        Ok(tables)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

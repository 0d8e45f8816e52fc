//! Bundle construction — two correlated v0 transactions forming one
//! logical atomic unit.
//!
//! The primary transaction is signer-funded and carries the swap; the
//! secondary is funded by a disposable intermediary wallet and settles
//! the relay tip. Routing the tip through the intermediary decorrelates
//! the profit-capturing account from the tip-paying account, so the
//! relay can prioritize the bundle without seeing the primary wallet as
//! the tip payer.
//!
//! Both transactions must reference the same anchor blockhash; the
//! relay treats the pair as all-or-nothing.

use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use solana_sdk::compute_budget::ComputeBudgetInstruction;
use solana_sdk::hash::Hash;
use solana_sdk::instruction::Instruction;
use solana_sdk::message::{v0, VersionedMessage};
use solana_sdk::pubkey::Pubkey;
use solana_sdk::signature::{Keypair, Signer};
use solana_sdk::system_instruction;
use solana_sdk::transaction::VersionedTransaction;
use thiserror::Error;

use crate::assembler::AssembledInstructions;

/// Compute-unit ceiling for the swap transaction.
pub const SWAP_COMPUTE_UNIT_LIMIT: u32 = 200_000;

/// Compute-unit ceiling for the transfer-only tip transaction.
pub const TRANSFER_COMPUTE_UNIT_LIMIT: u32 = 500;

/// Lamports forwarded to the intermediary on top of the tip — covers the
/// tip leg plus margin for the intermediary's own transaction cost.
pub const INTERMEDIARY_FUNDING_LAMPORTS: u64 = 10_000_000;

/// Lamports refunded from the intermediary back to the signer. The
/// 5_000-lamport difference from the funding buffer stays behind to pay
/// the secondary transaction's network fee.
pub const INTERMEDIARY_REFUND_LAMPORTS: u64 = 9_995_000;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum BundleError {
    #[error("failed to compile transaction message: {0}")]
    Compile(#[from] solana_sdk::message::CompileError),
    #[error("failed to sign transaction: {0}")]
    Sign(#[from] solana_sdk::signer::SignerError),
    #[error("failed to serialize transaction: {0}")]
    Serialize(#[from] bincode::Error),
}

/// Two signed transactions plus their relay-ready serializations.
/// Built fresh every iteration and discarded after one submission
/// attempt.
#[derive(Debug, Clone)]
pub struct Bundle {
    pub primary: VersionedTransaction,
    pub secondary: VersionedTransaction,
    pub primary_b64: String,
    pub secondary_b64: String,
}

// ---------------------------------------------------------------------------
// Instruction layout
// ---------------------------------------------------------------------------

/// Primary transaction: compute limit, filtered setup, swap, then the
/// forward transfer funding the intermediary with `tip + buffer`.
pub fn primary_instructions(
    assembled: &AssembledInstructions,
    signer: &Pubkey,
    intermediary: &Pubkey,
    tip_lamports: u64,
) -> Vec<Instruction> {
    let mut ixs = Vec::with_capacity(assembled.setup.len() + 3);
    ixs.push(ComputeBudgetInstruction::set_compute_unit_limit(
        SWAP_COMPUTE_UNIT_LIMIT,
    ));
    ixs.extend(assembled.setup.iter().cloned());
    ixs.push(assembled.swap.clone());
    ixs.push(system_instruction::transfer(
        signer,
        intermediary,
        INTERMEDIARY_FUNDING_LAMPORTS + tip_lamports,
    ));
    ixs
}

/// Secondary transaction: minimal compute limit, tip transfer to the
/// relay account, refund of the unspent buffer back to the signer.
pub fn secondary_instructions(
    intermediary: &Pubkey,
    signer: &Pubkey,
    tip_account: &Pubkey,
    tip_lamports: u64,
) -> Vec<Instruction> {
    vec![
        ComputeBudgetInstruction::set_compute_unit_limit(TRANSFER_COMPUTE_UNIT_LIMIT),
        system_instruction::transfer(intermediary, tip_account, tip_lamports),
        system_instruction::transfer(intermediary, signer, INTERMEDIARY_REFUND_LAMPORTS),
    ]
}

// ---------------------------------------------------------------------------
// Builder
// ---------------------------------------------------------------------------

/// Compile and sign both bundle transactions against one anchor hash.
///
/// The primary compiles against the resolved lookup tables; the
/// secondary is transfers-only and needs none.
pub fn build_bundle(
    assembled: &AssembledInstructions,
    signer: &Keypair,
    intermediary: &Keypair,
    tip_account: Pubkey,
    tip_lamports: u64,
    anchor: Hash,
) -> Result<Bundle, BundleError> {
    let primary_ixs = primary_instructions(
        assembled,
        &signer.pubkey(),
        &intermediary.pubkey(),
        tip_lamports,
    );
    let primary_msg = v0::Message::try_compile(
        &signer.pubkey(),
        &primary_ixs,
        &assembled.lookup_tables,
        anchor,
    )?;
    let primary =
        VersionedTransaction::try_new(VersionedMessage::V0(primary_msg), &[signer])?;

    let secondary_ixs = secondary_instructions(
        &intermediary.pubkey(),
        &signer.pubkey(),
        &tip_account,
        tip_lamports,
    );
    let secondary_msg =
        v0::Message::try_compile(&intermediary.pubkey(), &secondary_ixs, &[], anchor)?;
    let secondary =
        VersionedTransaction::try_new(VersionedMessage::V0(secondary_msg), &[intermediary])?;

    let primary_b64 = BASE64.encode(bincode::serialize(&primary)?);
    let secondary_b64 = BASE64.encode(bincode::serialize(&secondary)?);

    Ok(Bundle {
        primary,
        secondary,
        primary_b64,
        secondary_b64,
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

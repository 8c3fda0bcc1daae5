//! Block validator (C7) — the five-step contract of §4.7.
//!
//! Each step is a pure, side-effect-free predicate over the block and
//! ambient context (quorum size, stored chain state). A rule failure is
//! reported through [`ValidationOutcome::Fail`], never propagated as a Rust
//! error — only malformed inputs raise [`ValidationError::MalformedBlock`]
//! past this API (§7).

use std::collections::HashSet;

use crate::block::types::Block;
use crate::consensus::pow;
use crate::crypto::{ed25519, vrf};
use crate::error::{ValidationError, ValidationOutcome};
use crate::score;
use crate::types::{Hash256, PubKey, Signature, Transaction};

/// Ambient context the validator needs beyond the block itself.
pub struct ValidationContext {
    pub super_node_count: u64,
    pub expected_height: u64,
    pub expected_previous_hash: Hash256,
    pub previous_timestamp: i64,
    pub epoch: u64,
    /// Nonce last committed for a given sender, used for strict-increase
    /// checks (invariant 9 / replay rejection, §8 scenario 5).
    pub sender_nonces: std::collections::HashMap<PubKey, u64>,
    pub now: i64,
}

/// Runs all five steps in order, short-circuiting on the first failure.
pub fn validate_block(block: &Block, ctx: &ValidationContext) -> ValidationOutcome {
    if let Err(outcome) = step0_structure(block, ctx) {
        return outcome;
    }
    if let Err(outcome) = step1_vrf_integrity(block, ctx) {
        return outcome;
    }
    if let Err(outcome) = step2_proposer_legitimacy(block) {
        return outcome;
    }
    if let Err(outcome) = step3_reward_distribution(block) {
        return outcome;
    }
    if let Err(outcome) = step4_pow(block) {
        return outcome;
    }
    if let Err(outcome) = step5_transactions(block, ctx) {
        return outcome;
    }
    ValidationOutcome::Ok
}

/// Structural sanity ahead of the five named steps: height/parent linkage
/// and timestamp monotonicity (invariant 10). A failure here is a malformed
/// block, not a rule violation of one of the five named steps.
fn step0_structure(block: &Block, ctx: &ValidationContext) -> Result<(), ValidationOutcome> {
    if block.header.height != ctx.expected_height {
        return Err(fail(
            ValidationError::MalformedBlock(format!(
                "height {} != expected {}",
                block.header.height, ctx.expected_height
            )),
            "height mismatch",
        ));
    }
    if block.header.previous_hash != ctx.expected_previous_hash {
        return Err(fail(
            ValidationError::MalformedBlock("previous_hash does not match chain tip".into()),
            "previous hash mismatch",
        ));
    }
    if block.header.timestamp < ctx.previous_timestamp {
        return Err(fail(
            ValidationError::MalformedBlock("timestamp regressed".into()),
            "non-monotonic timestamp",
        ));
    }
    Ok(())
}

/// Step 1 — VRF integrity.
fn step1_vrf_integrity(block: &Block, ctx: &ValidationContext) -> Result<(), ValidationOutcome> {
    let input = vrf::vrf_input(&block.header.previous_hash, block.header.round, ctx.epoch);
    let announcements = &block.header.all_vrf_announcements;

    let mut seen = HashSet::new();
    for ann in announcements {
        if !seen.insert(ann.public_key) {
            return Err(fail(ValidationError::VRFFailure, "duplicate announcement public key"));
        }
        if ann.round != block.header.round {
            return Err(fail(ValidationError::VRFFailure, "announcement round mismatch"));
        }
        if !(0.0..=1.0).contains(&ann.score) {
            return Err(fail(ValidationError::VRFFailure, "announcement score out of range"));
        }
        if ctx.now.saturating_sub(ann.timestamp) > crate::constants::consensus::VRF_ANNOUNCEMENT_MAX_AGE_MS {
            return Err(fail(ValidationError::VRFFailure, "announcement too old"));
        }
        match vrf::vrf_verify(&ann.public_key, &input, &ann.vrf_output, &ann.vrf_proof) {
            Ok(true) => {}
            _ => return Err(fail(ValidationError::VRFFailure, "VRF verification failed")),
        }
    }

    let quorum = crate::constants::consensus::quorum_threshold(ctx.super_node_count);
    if (announcements.len() as u64) < quorum {
        return Err(fail(ValidationError::VRFFailure, "quorum not met"));
    }
    Ok(())
}

/// Step 2 — proposer legitimacy.
fn step2_proposer_legitimacy(block: &Block) -> Result<(), ValidationOutcome> {
    let announcements = &block.header.all_vrf_announcements;
    let winner = match score::select_proposer(announcements) {
        Some(w) => w,
        None => return Err(fail(ValidationError::ProposerMismatch, "no announcements to elect from")),
    };
    if winner.public_key != block.header.proposer {
        return Err(fail(ValidationError::ProposerMismatch, "proposer is not top-scoring announcement"));
    }
    if winner.vrf_output != block.header.vrf_output || winner.vrf_proof != block.header.vrf_proof {
        return Err(fail(
            ValidationError::ProposerMismatch,
            "header VRF artifacts do not match winning announcement",
        ));
    }
    Ok(())
}

/// Step 3 — reward distribution.
fn step3_reward_distribution(block: &Block) -> Result<(), ValidationOutcome> {
    let expected_len = crate::constants::consensus::REWARDED_TOP_X;
    if block.header.rewarded_nodes.len() != expected_len {
        return Err(fail(
            ValidationError::RewardMismatch,
            format!("reward list length {} != {expected_len}", block.header.rewarded_nodes.len()),
        ));
    }

    let mut seen = HashSet::new();
    for pk in &block.header.rewarded_nodes {
        if !seen.insert(*pk) {
            return Err(fail(ValidationError::RewardMismatch, "duplicate rewarded node"));
        }
    }

    let announced: HashSet<PubKey> = block
        .header
        .all_vrf_announcements
        .iter()
        .map(|a| a.public_key)
        .collect();
    for pk in &block.header.rewarded_nodes {
        if !announced.contains(pk) {
            return Err(fail(ValidationError::RewardMismatch, "rewarded node has no announcement"));
        }
    }

    let expected = score::select_top_x(&block.header.all_vrf_announcements, expected_len);
    if expected != block.header.rewarded_nodes {
        return Err(fail(ValidationError::RewardMismatch, "reward list order/identity mismatch"));
    }
    Ok(())
}

/// Step 4 — PoW.
fn step4_pow(block: &Block) -> Result<(), ValidationOutcome> {
    if block.header.difficulty_target.is_zero() {
        return Err(fail(ValidationError::PoWFailure, "difficulty target is zero"));
    }
    if !pow::verify(block) {
        return Err(fail(ValidationError::PoWFailure, "header hash does not beat difficulty target"));
    }
    Ok(())
}

/// Step 5 — transactions.
fn step5_transactions(block: &Block, ctx: &ValidationContext) -> Result<(), ValidationOutcome> {
    if block.transactions.len() > crate::constants::consensus::MAX_TRANSACTIONS_PER_BLOCK_VALIDATION {
        return Err(fail(ValidationError::TxFailure, "too many transactions"));
    }

    let mut seen_hashes = HashSet::new();
    let mut per_sender_nonce: std::collections::HashMap<PubKey, u64> = ctx.sender_nonces.clone();

    for tx in &block.transactions {
        if !validate_transaction(tx, ctx, &mut seen_hashes, &mut per_sender_nonce) {
            return Err(fail(ValidationError::TxFailure, "transaction failed validation"));
        }
    }

    let recomputed = Block::compute_merkle_root(&block.transactions);
    if recomputed != block.header.merkle_root {
        return Err(fail(ValidationError::TxFailure, "merkle root mismatch"));
    }
    Ok(())
}

fn validate_transaction(
    tx: &Transaction,
    ctx: &ValidationContext,
    seen_hashes: &mut HashSet<Hash256>,
    per_sender_nonce: &mut std::collections::HashMap<PubKey, u64>,
) -> bool {
    let hash = tx.hash();
    if !seen_hashes.insert(hash) {
        return false;
    }
    if ctx.now.saturating_sub(tx.timestamp) > crate::constants::consensus::TRANSACTION_MAX_AGE_MS {
        return false;
    }
    let sig = Signature(tx.signature.0);
    if ed25519::verify(&tx.from, &tx.canonical_bytes_without_signature(), &sig).is_err() {
        return false;
    }

    let last_nonce = per_sender_nonce.get(&tx.from).copied();
    match last_nonce {
        Some(last) if tx.nonce <= last => return false,
        _ => {}
    }
    per_sender_nonce.insert(tx.from, tx.nonce);
    true
}

fn fail(kind: ValidationError, detail: impl Into<String>) -> ValidationOutcome {
    ValidationOutcome::Fail(kind, detail.into())
}

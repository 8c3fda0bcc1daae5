//! Proof-of-work engine (C5) — §4.4.
//!
//! A lightweight PoW layered on top of the VRF/PoS-elected block: the round
//! winner still has to find a nonce before the block is valid. Mining
//! checks the cancellation/timeout deadline every
//! [`crate::constants::pow::TIMEOUT_CHECK_INTERVAL`] iterations, the
//! suspension point named in §5.

use primitive_types::U256;
use tokio_util::sync::CancellationToken;

use crate::block::types::{Block, BlockHeader};
use crate::crypto::hash::sha256;
use crate::error::ConsensusError;

/// Mines `header` in place: tries `nonce = start_nonce, start_nonce+1, ...`
/// until the header hash is below `header.difficulty_target`, the deadline
/// elapses, or the round is cancelled.
pub fn mine(
    header: &mut BlockHeader,
    start_nonce: u64,
    timeout: std::time::Duration,
    cancel: &CancellationToken,
) -> Result<(), ConsensusError> {
    let deadline = std::time::Instant::now() + timeout;
    let target = header.difficulty_target;
    let mut nonce = start_nonce;

    loop {
        header.nonce = nonce;
        if header_hash_u256(header) < target {
            return Ok(());
        }

        nonce = nonce.wrapping_add(1);

        if nonce % crate::constants::pow::TIMEOUT_CHECK_INTERVAL == 0 {
            if cancel.is_cancelled() {
                return Err(ConsensusError::RoundAborted);
            }
            if std::time::Instant::now() >= deadline {
                return Err(ConsensusError::PoWTimeout {
                    timeout_secs: timeout.as_secs(),
                });
            }
        }
    }
}

/// §4.4 verification: recompute the header hash with the stored nonce,
/// assert it is below `difficulty_target`, and that the target itself is in
/// range.
pub fn verify(block: &Block) -> bool {
    let target = block.header.difficulty_target;
    if target.is_zero() {
        return false;
    }
    header_hash_u256(&block.header) < target
}

fn header_hash_u256(header: &BlockHeader) -> U256 {
    let block = Block {
        header: header.clone(),
        transactions: vec![],
        signatures: Default::default(),
    };
    U256::from_big_endian(&sha256(&block.canonical_header_bytes()))
}

/// Inputs to the per-block difficulty update (§4.4).
pub struct DifficultyInputs {
    pub prev_difficulty: U256,
    pub target_block_time_secs: f64,
    /// Seconds between the previous block and this one; `None` when the
    /// previous block's timestamp is unavailable (genesis), in which case
    /// the adjustment factor defaults to 1.0 (§9 Open Question #3).
    pub actual_block_time_secs: Option<f64>,
    pub vrf_count: u64,
    pub sig_count: u64,
    pub super_node_count: u64,
    pub empty_block: bool,
}

/// `new = prev * adjustment * penalty`, clamped to `[base/2, base*10]`.
pub fn adjust_difficulty(inputs: &DifficultyInputs, base: U256) -> U256 {
    let adjustment = match inputs.actual_block_time_secs {
        Some(actual) if actual > 0.0 => {
            (inputs.target_block_time_secs / actual).clamp(
                crate::constants::pow::ADJUSTMENT_MIN,
                crate::constants::pow::ADJUSTMENT_MAX,
            )
        }
        _ => 1.0,
    };

    let mut penalty = 1.0f64;
    let threshold = (inputs.super_node_count as f64) * crate::constants::pow::PARTICIPATION_THRESHOLD;
    if (inputs.vrf_count as f64) < threshold {
        penalty *= crate::constants::pow::LOW_VRF_PENALTY;
    }
    if (inputs.sig_count as f64) < threshold {
        penalty *= crate::constants::pow::LOW_SIG_PENALTY;
    }
    if inputs.empty_block {
        penalty *= crate::constants::pow::EMPTY_BLOCK_PENALTY;
    }

    let factor = adjustment * penalty;
    let new_difficulty = scale_u256(inputs.prev_difficulty, factor);

    let floor = base / U256::from(2u64);
    let ceiling = base * U256::from(10u64);
    new_difficulty.clamp(floor, ceiling)
}

/// Scales a `U256` by a floating-point factor via fixed-point arithmetic
/// (multiply by a scaled-up integer numerator, then divide back down) so the
/// whole 256-bit range stays exact without ever converting to `f64`.
fn scale_u256(value: U256, factor: f64) -> U256 {
    const SCALE: u64 = 1_000_000;
    let scaled_factor = (factor * SCALE as f64).round().max(0.0) as u64;
    (value * U256::from(scaled_factor)) / U256::from(SCALE)
}

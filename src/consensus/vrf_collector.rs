//! VRF collector (C4) — phase-1 gathering (§4.3).
//!
//! Owns the per-round announcement buffer exclusively; no other component
//! mutates it (§5). Dedup is first-seen-wins keyed by public key; filtering
//! happens both on ingest (so a flood of invalid announcements never grows
//! the buffer) and again at cutoff, to catch anything that was valid at
//! ingest time but has since aged out.

use std::collections::HashMap;
use std::time::Duration;

use ed25519_dalek::SigningKey;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::crypto::{ed25519, vrf};
use crate::error::ConsensusError;
use crate::network::NetworkHandle;
use crate::score;
use crate::types::{Hash256, PubKey, VRFAnnouncement};

/// Outcome of a completed phase-1 round.
#[derive(Debug, Clone)]
pub struct VRFRoundResult {
    pub winner: VRFAnnouncement,
    pub top_x: Vec<PubKey>,
    pub all_valid: Vec<VRFAnnouncement>,
}

/// Per-round announcement buffer and validation rules.
pub struct VRFCollector {
    round: u32,
    buffer: parking_lot::RwLock<HashMap<PubKey, VRFAnnouncement>>,
}

impl VRFCollector {
    pub fn new(round: u32) -> Self {
        Self {
            round,
            buffer: parking_lot::RwLock::new(HashMap::new()),
        }
    }

    /// Step 4 of §4.3: reject on verification failure, round mismatch,
    /// out-of-range score, or staleness. Returns `true` if the announcement
    /// was newly accepted (first-seen for this public key).
    pub fn try_ingest(&self, ann: &VRFAnnouncement, input: &Hash256, now: i64) -> bool {
        if ann.round != self.round {
            return false;
        }
        if !(0.0..=1.0).contains(&ann.score) {
            return false;
        }
        if now.saturating_sub(ann.timestamp) > crate::constants::consensus::VRF_ANNOUNCEMENT_MAX_AGE_MS {
            return false;
        }
        match vrf::vrf_verify(&ann.public_key, input, &ann.vrf_output, &ann.vrf_proof) {
            Ok(true) => {}
            _ => return false,
        }
        let mut buffer = self.buffer.write();
        if buffer.contains_key(&ann.public_key) {
            return false;
        }
        buffer.insert(ann.public_key, ann.clone());
        true
    }

    pub fn len(&self) -> usize {
        self.buffer.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Runs the full phase-1 contract: evaluate and broadcast the local VRF,
    /// accept announcements until `deadline = start + timeout_ms`, then pick
    /// the winner and top-X. Cancellation produces `RoundAborted` and
    /// discards whatever was collected so far (§4.3 suspension/cancellation).
    #[allow(clippy::too_many_arguments)]
    pub async fn collect(
        &self,
        local_sk: &SigningKey,
        prev_hash: &Hash256,
        epoch: u64,
        stake_weight: f64,
        decay: f64,
        perf: f64,
        now: i64,
        network: &dyn NetworkHandle,
        mut incoming: mpsc::UnboundedReceiver<VRFAnnouncement>,
        timeout_ms: u64,
        quorum_threshold: u64,
        cancel: &CancellationToken,
    ) -> Result<VRFRoundResult, ConsensusError> {
        let input = vrf::vrf_input(prev_hash, self.round, epoch);
        let local_pk = ed25519::public_key_of(local_sk);
        let (output, proof) = vrf::vrf_evaluate(local_sk, &input);
        let local_score = score::calc_score(output.as_bytes(), stake_weight, decay, perf)
            .map_err(|_| ConsensusError::InvalidParameter("local score out of range".into()))?;
        let local_ann = VRFAnnouncement {
            round: self.round,
            public_key: local_pk,
            vrf_output: output,
            vrf_proof: proof,
            score: local_score,
            timestamp: now,
        };
        self.try_ingest(&local_ann, &input, now);
        network.broadcast_vrf(&local_ann).await;

        let deadline = tokio::time::Instant::now() + Duration::from_millis(timeout_ms);
        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    return Err(ConsensusError::RoundAborted);
                }
                _ = tokio::time::sleep_until(deadline) => {
                    break;
                }
                maybe_ann = incoming.recv() => {
                    match maybe_ann {
                        Some(ann) => {
                            self.try_ingest(&ann, &input, now);
                        }
                        None => break,
                    }
                }
            }
        }

        let mut all_valid: Vec<VRFAnnouncement> = self.buffer.read().values().cloned().collect();
        // Re-check staleness at cutoff: an announcement valid at ingest may
        // have aged past the 30s window by the time the deadline fires.
        all_valid.retain(|ann| now.saturating_sub(ann.timestamp) <= crate::constants::consensus::VRF_ANNOUNCEMENT_MAX_AGE_MS);

        if (all_valid.len() as u64) < quorum_threshold {
            return Err(ConsensusError::InsufficientVRFs {
                got: all_valid.len(),
                need: quorum_threshold as usize,
            });
        }

        let winner = score::select_proposer(&all_valid)
            .cloned()
            .expect("non-empty after quorum check");
        let top_x = score::select_top_x(&all_valid, crate::constants::consensus::REWARDED_TOP_X);

        Ok(VRFRoundResult {
            winner,
            top_x,
            all_valid,
        })
    }
}

//! Score calculator (§4.2): ranks VRF announcements for proposer selection
//! and reward distribution.

#![allow(dead_code)]

use crate::constants::score as score_const;
use crate::error::ConsensusError;
use crate::types::{PubKey, VRFAnnouncement};

/// `base(vrf_output) = be_u64(vrf_output[0..8]) / 2^64`.
pub fn base_score(vrf_output: &[u8; 32]) -> f64 {
    let v = u64::from_be_bytes(vrf_output[0..8].try_into().unwrap());
    (v as f64) / (u64::MAX as f64 + 1.0)
}

/// `stake_weight = min(1.0, stake / average_stake)`.
pub fn stake_weight(stake: u64, average_stake: f64) -> f64 {
    if average_stake <= 0.0 {
        return 0.0;
    }
    (stake as f64 / average_stake).min(1.0)
}

/// `decay = max(0.5, 1.0 - 0.0025 * days_since_election)`.
pub fn decay(days_since_election: f64) -> f64 {
    (1.0 - score_const::DECAY_PER_DAY * days_since_election).max(score_const::DECAY_FLOOR)
}

/// Piecewise performance multiplier by uptime fraction.
pub fn perf_multiplier(uptime: f64) -> f64 {
    for &(min_uptime, multiplier) in score_const::PERF_TIERS.iter() {
        if uptime >= min_uptime {
            return multiplier;
        }
    }
    score_const::PERF_TIERS.last().unwrap().1
}

/// `score = base(vrf_output) * stake_weight * decay * perf`, clamped `[0, 1]`.
pub fn calc_score(
    vrf_output: &[u8; 32],
    stake_weight: f64,
    decay: f64,
    perf: f64,
) -> Result<f64, ConsensusError> {
    if !(0.0..=1.0).contains(&stake_weight) {
        return Err(ConsensusError::InvalidParameter(format!(
            "stake_weight {stake_weight} out of [0,1]"
        )));
    }
    if !(0.5..=1.0).contains(&decay) {
        return Err(ConsensusError::InvalidParameter(format!(
            "decay {decay} out of [0.5,1]"
        )));
    }
    if !(0.7..=1.0).contains(&perf) {
        return Err(ConsensusError::InvalidParameter(format!(
            "perf {perf} out of [0.7,1]"
        )));
    }
    let score = base_score(vrf_output) * stake_weight * decay * perf;
    Ok(score.clamp(0.0, 1.0))
}

/// Descending sort by score, ties broken by lexicographically smaller
/// `vrf_output` (smaller output sorts first among equal scores).
pub fn sort_by_score(announcements: &mut [VRFAnnouncement]) {
    announcements.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.vrf_output.cmp(&b.vrf_output))
    });
}

/// The round winner: highest score, tie-break by lexicographically smaller
/// `vrf_output`.
pub fn select_proposer(announcements: &[VRFAnnouncement]) -> Option<&VRFAnnouncement> {
    announcements.iter().min_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.vrf_output.cmp(&b.vrf_output))
    })
}

/// Top-`k` announcements by score, same tie-break, as public keys in rank order.
pub fn select_top_x(announcements: &[VRFAnnouncement], k: usize) -> Vec<PubKey> {
    let mut sorted = announcements.to_vec();
    sort_by_score(&mut sorted);
    sorted.into_iter().take(k).map(|a| a.public_key).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{VRFOutput, VRFProof};

    fn ann(score: f64, output_first_byte: u8, pk: u8) -> VRFAnnouncement {
        let mut out = [0u8; 32];
        out[0] = output_first_byte;
        VRFAnnouncement {
            round: 1,
            public_key: PubKey([pk; 32]),
            vrf_output: VRFOutput(out),
            vrf_proof: VRFProof([0u8; 64]),
            score,
            timestamp: 0,
        }
    }

    #[test]
    fn base_score_zero_for_zero_output() {
        assert_eq!(base_score(&[0u8; 32]), 0.0);
    }

    #[test]
    fn base_score_near_one_for_max_output() {
        assert!(base_score(&[0xFFu8; 32]) > 0.99);
    }

    #[test]
    fn stake_weight_caps_at_one() {
        assert_eq!(stake_weight(200, 100.0), 1.0);
        assert_eq!(stake_weight(50, 100.0), 0.5);
    }

    #[test]
    fn decay_floors_at_half() {
        assert_eq!(decay(1000.0), 0.5);
        assert!(decay(0.0) > 0.999);
    }

    #[test]
    fn perf_tiers_pick_correct_bucket() {
        assert_eq!(perf_multiplier(0.995), 1.0);
        assert_eq!(perf_multiplier(0.96), 0.95);
        assert_eq!(perf_multiplier(0.91), 0.85);
        assert_eq!(perf_multiplier(0.5), 0.70);
    }

    #[test]
    fn calc_score_rejects_out_of_range_inputs() {
        assert!(calc_score(&[1u8; 32], 1.5, 0.9, 0.9).is_err());
        assert!(calc_score(&[1u8; 32], 0.5, 0.1, 0.9).is_err());
        assert!(calc_score(&[1u8; 32], 0.5, 0.9, 0.5).is_err());
    }

    #[test]
    fn select_proposer_picks_highest_score() {
        let anns = vec![ann(0.3, 1, 1), ann(0.9, 2, 2), ann(0.5, 3, 3)];
        let winner = select_proposer(&anns).unwrap();
        assert_eq!(winner.public_key, PubKey([2; 32]));
    }

    #[test]
    fn select_proposer_tie_break_is_lexicographic_min_output() {
        let anns = vec![ann(0.5, 9, 1), ann(0.5, 2, 2)];
        let winner = select_proposer(&anns).unwrap();
        assert_eq!(winner.public_key, PubKey([2; 32]));
    }

    #[test]
    fn select_top_x_respects_k() {
        let anns = vec![ann(0.1, 1, 1), ann(0.9, 2, 2), ann(0.5, 3, 3), ann(0.7, 4, 4)];
        let top2 = select_top_x(&anns, 2);
        assert_eq!(top2, vec![PubKey([2; 32]), PubKey([4; 32])]);
    }
}

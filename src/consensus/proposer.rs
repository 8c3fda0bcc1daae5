//! Block proposer (C6) — §4.5. Operations exercised by the round winner
//! only: pick transactions, assemble the header, embed VRF evidence, run
//! PoW, and a pre-broadcast sanity check.

use std::collections::BTreeMap;
use std::time::Duration;

use primitive_types::U256;
use tokio_util::sync::CancellationToken;

use crate::block::types::{Block, BlockHeader};
use crate::consensus::pow;
use crate::consensus::vrf_collector::VRFRoundResult;
use crate::error::ConsensusError;
use crate::network::NetworkHandle;
use crate::types::{Hash256, PubKey, Transaction};

/// Greedily selects transactions by descending fee-rate (`fee /
/// estimated_size`) until either the count or byte cap is hit.
pub fn select_transactions(pool: &[Transaction], max_n: usize, max_bytes: usize) -> Vec<Transaction> {
    let mut candidates: Vec<&Transaction> = pool.iter().collect();
    candidates.sort_by(|a, b| {
        let rate_a = fee_rate(a);
        let rate_b = fee_rate(b);
        rate_b.partial_cmp(&rate_a).unwrap_or(std::cmp::Ordering::Equal)
    });

    let mut selected = Vec::new();
    let mut total_bytes = 0usize;
    for tx in candidates {
        let tx_bytes = crate::constants::block::ESTIMATED_TX_SIZE_BYTES as usize;
        if selected.len() >= max_n || total_bytes + tx_bytes > max_bytes {
            break;
        }
        selected.push(tx.clone());
        total_bytes += tx_bytes;
    }
    selected
}

fn fee_rate(tx: &Transaction) -> f64 {
    tx.fee as f64 / crate::constants::block::ESTIMATED_TX_SIZE_BYTES as f64
}

/// Assembles the candidate block: header fields per §3, `merkle_root` over
/// the selected transactions, both the full announcement set and the top-X
/// reward list embedded verbatim, then runs PoW.
#[allow(clippy::too_many_arguments)]
pub fn assemble(
    height: u64,
    round: u32,
    prev_hash: Hash256,
    timestamp: i64,
    vrf_result: &VRFRoundResult,
    transactions: Vec<Transaction>,
    difficulty_target: U256,
    mining_timeout: Duration,
    cancel: &CancellationToken,
) -> Result<Block, ConsensusError> {
    let merkle_root = Block::compute_merkle_root(&transactions);

    let mut header = BlockHeader {
        height,
        round,
        timestamp,
        previous_hash: prev_hash,
        proposer: vrf_result.winner.public_key,
        vrf_output: vrf_result.winner.vrf_output,
        vrf_proof: vrf_result.winner.vrf_proof,
        all_vrf_announcements: vrf_result.all_valid.clone(),
        rewarded_nodes: vrf_result.top_x.clone(),
        merkle_root,
        nonce: 0,
        difficulty_target,
    };

    pow::mine(&mut header, 0, mining_timeout, cancel)?;

    Ok(Block {
        header,
        transactions,
        signatures: BTreeMap::new(),
    })
}

/// Hands the assembled block to the network collaborator.
pub async fn broadcast(block: &Block, network: &dyn NetworkHandle) {
    network.broadcast_block(block).await;
}

/// Pre-broadcast self-check (§4.5): the block must match the round's
/// winner, announcement count, reward count, and its own PoW must verify.
/// This is a cheap sanity pass before handing the block to peers — it does
/// not replace the full five-step validator every other node will run.
pub fn validate_proposal(block: &Block, vrf_result: &VRFRoundResult) -> bool {
    if block.header.proposer != vrf_result.winner.public_key {
        return false;
    }
    if block.header.vrf_output != vrf_result.winner.vrf_output {
        return false;
    }
    if block.header.all_vrf_announcements.len() != vrf_result.all_valid.len() {
        return false;
    }
    if block.header.rewarded_nodes != vrf_result.top_x {
        return false;
    }
    pow::verify(block)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Signature, TxType, VRFAnnouncement, VRFOutput, VRFProof};

    fn tx(fee: u64, nonce: u64) -> Transaction {
        Transaction {
            from: PubKey([1u8; 32]),
            to: PubKey([2u8; 32]),
            amount: 1,
            fee,
            timestamp: 0,
            nonce,
            signature: Signature::default(),
            tx_type: TxType::Transfer,
        }
    }

    #[test]
    fn select_transactions_orders_by_fee_rate_descending() {
        let pool = vec![tx(1, 1), tx(10, 2), tx(5, 3)];
        let selected = select_transactions(&pool, 10, 10_000);
        assert_eq!(selected[0].fee, 10);
        assert_eq!(selected[1].fee, 5);
        assert_eq!(selected[2].fee, 1);
    }

    #[test]
    fn select_transactions_respects_count_cap() {
        let pool = vec![tx(1, 1), tx(2, 2), tx(3, 3)];
        let selected = select_transactions(&pool, 2, 10_000);
        assert_eq!(selected.len(), 2);
    }

    #[test]
    fn select_transactions_respects_byte_cap() {
        let pool = vec![tx(1, 1), tx(2, 2), tx(3, 3)];
        let per_tx = crate::constants::block::ESTIMATED_TX_SIZE_BYTES as usize;
        let selected = select_transactions(&pool, 10, per_tx * 2);
        assert_eq!(selected.len(), 2);
    }

    fn sample_result() -> VRFRoundResult {
        let winner = VRFAnnouncement {
            round: 1,
            public_key: PubKey([7u8; 32]),
            vrf_output: VRFOutput([9u8; 32]),
            vrf_proof: VRFProof([0u8; 64]),
            score: 0.9,
            timestamp: 0,
        };
        VRFRoundResult {
            winner: winner.clone(),
            top_x: vec![winner.public_key],
            all_valid: vec![winner],
        }
    }

    #[test]
    fn assemble_then_validate_proposal_succeeds() {
        let result = sample_result();
        let cancel = CancellationToken::new();
        let block = assemble(
            1,
            1,
            [0u8; 32],
            1000,
            &result,
            vec![],
            U256::MAX,
            Duration::from_secs(1),
            &cancel,
        )
        .unwrap();
        assert!(validate_proposal(&block, &result));
    }

    #[test]
    fn validate_proposal_rejects_proposer_mismatch() {
        let result = sample_result();
        let cancel = CancellationToken::new();
        let mut block = assemble(
            1,
            1,
            [0u8; 32],
            1000,
            &result,
            vec![],
            U256::MAX,
            Duration::from_secs(1),
            &cancel,
        )
        .unwrap();
        block.header.proposer = PubKey([99u8; 32]);
        assert!(!validate_proposal(&block, &result));
    }
}

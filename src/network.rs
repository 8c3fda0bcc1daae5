//! Network collaborator boundary (§6).
//!
//! The consensus core depends only on this trait, never on a concrete P2P
//! transport — real gossip, peer scoring, and TLS are out of scope (§1) and
//! live in a separate crate in production. `LoopbackNetwork` is the
//! in-memory implementation used by tests and single-node runs: it lets a
//! node "broadcast" to itself so the driver can exercise the full round
//! state machine without a real network.

use async_trait::async_trait;

use crate::block::types::Block;
use crate::types::{Transaction, VRFAnnouncement};

/// Outgoing broadcast operations the consensus core invokes.
///
/// Delivery is best-effort: the consensus must tolerate loss, duplication,
/// and reorder of anything sent through this trait (§6).
#[async_trait]
pub trait NetworkHandle: Send + Sync {
    async fn broadcast_block(&self, block: &Block);
    async fn broadcast_vrf(&self, announcement: &VRFAnnouncement);
    async fn broadcast_transaction(&self, tx: &Transaction);
}

/// Loopback implementation: every broadcast is queued locally and can be
/// drained by the driver's own receive loop. Useful for single-node
/// development and for deterministic tests that don't need real sockets.
pub struct LoopbackNetwork {
    blocks: parking_lot::Mutex<Vec<Block>>,
    vrfs: parking_lot::Mutex<Vec<VRFAnnouncement>>,
    transactions: parking_lot::Mutex<Vec<Transaction>>,
}

impl LoopbackNetwork {
    pub fn new() -> Self {
        Self {
            blocks: parking_lot::Mutex::new(Vec::new()),
            vrfs: parking_lot::Mutex::new(Vec::new()),
            transactions: parking_lot::Mutex::new(Vec::new()),
        }
    }

    pub fn drain_vrfs(&self) -> Vec<VRFAnnouncement> {
        std::mem::take(&mut self.vrfs.lock())
    }

    pub fn drain_blocks(&self) -> Vec<Block> {
        std::mem::take(&mut self.blocks.lock())
    }

    pub fn drain_transactions(&self) -> Vec<Transaction> {
        std::mem::take(&mut self.transactions.lock())
    }
}

impl Default for LoopbackNetwork {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl NetworkHandle for LoopbackNetwork {
    async fn broadcast_block(&self, block: &Block) {
        self.blocks.lock().push(block.clone());
    }

    async fn broadcast_vrf(&self, announcement: &VRFAnnouncement) {
        self.vrfs.lock().push(announcement.clone());
    }

    async fn broadcast_transaction(&self, tx: &Transaction) {
        self.transactions.lock().push(tx.clone());
    }
}

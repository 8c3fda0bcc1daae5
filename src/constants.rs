//! Global constants for the hybrid VRF/PoS/PoW consensus core.
//!
//! Centralizes the configuration defaults of the external interface contract
//! so every module references the same numbers instead of re-deriving them.

/// Consensus protocol constants.
pub mod consensus {
    /// N — size of the stake-weighted super-node committee.
    pub const SUPER_NODE_COUNT: u64 = 50;

    /// Target block cadence in seconds.
    pub const BLOCK_TIME_SECONDS: i64 = 3;

    /// Phase-1 (VRF collection) deadline in milliseconds.
    pub const VRF_COLLECTION_TIMEOUT_MS: u64 = 3_000;

    /// Phase-2 (block production) deadline in milliseconds.
    pub const BLOCK_PRODUCTION_TIMEOUT_MS: u64 = 5_000;

    /// Length of the per-round reward list ("top-X").
    pub const REWARDED_TOP_X: usize = 15;

    /// Maximum age of a VRF announcement before it is stale: 30 s (§4.3), expressed
    /// in milliseconds since every timestamp in this core (`now`, block/announcement/
    /// transaction timestamps) is producer wall-clock ms since Unix epoch (§3).
    pub const VRF_ANNOUNCEMENT_MAX_AGE_MS: i64 = 30_000;

    /// Maximum age of a transaction before the validator rejects it: 300 s (§4.7
    /// Step 5), in milliseconds for the same reason as above.
    pub const TRANSACTION_MAX_AGE_MS: i64 = 300_000;

    /// Maximum number of transactions the validator accepts per block.
    pub const MAX_TRANSACTIONS_PER_BLOCK_VALIDATION: usize = 10_000;

    /// `⌈2·N/3⌉` quorum threshold for the configured committee size.
    pub const fn quorum_threshold(super_node_count: u64) -> u64 {
        (2 * super_node_count).div_ceil(3)
    }
}

/// Proof-of-work engine constants.
pub mod pow {
    /// Base difficulty target (`pow_base_difficulty`).
    pub const BASE_DIFFICULTY: u64 = 2_500_000;

    /// Default mining timeout in seconds.
    pub const MINING_TIMEOUT_SECS: u64 = 3;

    /// Iterations between timeout checks in the mining loop.
    pub const TIMEOUT_CHECK_INTERVAL: u64 = 4_096;

    /// Lower clamp on the per-block adjustment factor.
    pub const ADJUSTMENT_MIN: f64 = 0.5;

    /// Upper clamp on the per-block adjustment factor.
    pub const ADJUSTMENT_MAX: f64 = 2.0;

    /// Penalty multiplier applied when VRF participation drops below 80% of N.
    pub const LOW_VRF_PENALTY: f64 = 1.5;

    /// Penalty multiplier applied when signature participation drops below 80% of N.
    pub const LOW_SIG_PENALTY: f64 = 1.2;

    /// Penalty multiplier applied to empty blocks.
    pub const EMPTY_BLOCK_PENALTY: f64 = 1.1;

    /// Fraction of N below which the VRF/signature penalties kick in.
    pub const PARTICIPATION_THRESHOLD: f64 = 0.8;
}

/// Block production / mempool constants.
pub mod block {
    /// Inclusion cap on transactions per proposed block.
    pub const MAX_TRANSACTIONS_PER_BLOCK: usize = 1_000;

    /// Maximum serialized block size in bytes (2 MiB).
    pub const MAX_BLOCK_SIZE_BYTES: usize = 2 * 1024 * 1024;

    /// Size estimate (bytes) used by the fee-rate transaction selector.
    pub const ESTIMATED_TX_SIZE_BYTES: u64 = 192;
}

/// Stake eligibility floors.
pub mod stake {
    /// Minimum stake to participate as a core (always-eligible) super-node.
    pub const MIN_STAKE_CORE: u64 = 100_000;

    /// Minimum stake to participate in committee rotation.
    pub const MIN_STAKE_ROTATE: u64 = 50_000;
}

/// Score calculator constants (§4.2).
pub mod score {
    /// Floor applied to the stake-age decay factor.
    pub const DECAY_FLOOR: f64 = 0.5;

    /// Per-day decay rate.
    pub const DECAY_PER_DAY: f64 = 0.0025;

    /// Days after which decay has fully saturated at its floor.
    pub const DECAY_FLOOR_DAYS: f64 = 200.0;

    /// Performance multiplier tiers, as (min_uptime_fraction, multiplier), checked
    /// in descending order.
    pub const PERF_TIERS: [(f64, f64); 4] = [(0.99, 1.0), (0.95, 0.95), (0.90, 0.85), (0.0, 0.70)];
}

//! End-to-end round scenarios driven through `ConsensusDriver` rather than
//! the individual C4/C6/C7 units, exercising the full VRF -> build/wait ->
//! verify -> commit cycle over the public crate API.

use std::sync::Arc;

use ed25519_dalek::SigningKey;
use rand::rngs::OsRng;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use timed::config::Config;
use timed::consensus::driver::{ConsensusDriver, RoundOutcome};
use timed::crypto::ed25519;
use timed::network::LoopbackNetwork;
use timed::network::NetworkHandle;
use timed::storage::{BlockStore, InMemoryKv, KvStore, StateStore, TransactionStore};
use timed::types::{AccountState, ChainState, PubKey, Transaction, TxType};

fn single_node_driver() -> ConsensusDriver {
    let (driver, _kv) = single_node_driver_with_kv();
    driver
}

/// Same single-node setup as `single_node_driver`, but also hands back the
/// underlying `KvStore` so a test can seed account state / inspect it with
/// its own `StateStore`/`TransactionStore` views after a round runs.
fn single_node_driver_with_kv() -> (ConsensusDriver, Arc<dyn KvStore>) {
    let mut config = Config::default();
    // A committee of one means the lone node's own VRF announcement already
    // satisfies quorum, so it always becomes the round's proposer.
    config.consensus.super_node_count = 1;
    config.consensus.vrf_collection_timeout_ms = 50;
    let config = Arc::new(config);
    let sk = SigningKey::generate(&mut OsRng);
    let network: Arc<dyn NetworkHandle> = Arc::new(LoopbackNetwork::new());
    let kv: Arc<dyn KvStore> = Arc::new(InMemoryKv::new());
    let driver = ConsensusDriver::new(
        config,
        sk,
        network,
        BlockStore::new(kv.clone()),
        TransactionStore::new(kv.clone()),
        StateStore::new(kv.clone()),
        &ChainState::default(),
    );
    (driver, kv)
}

#[tokio::test]
async fn single_node_round_commits_and_advances_height() {
    let driver = single_node_driver();
    let (_vrf_tx, vrf_rx) = mpsc::unbounded_channel();
    let (_block_tx, block_rx) = mpsc::unbounded_channel();
    let cancel = CancellationToken::new();

    let outcome = driver
        .run_round([0u8; 32], 1.0, 1.0, 1.0, 1_700_000_000, vrf_rx, block_rx, cancel)
        .await;

    match outcome {
        RoundOutcome::Committed(block) => {
            assert_eq!(block.header.height, 1);
            assert_eq!(driver.current_height(), 1);
        }
        other => panic!("expected a committed block, got {other:?}"),
    }
}

#[tokio::test]
async fn consecutive_rounds_chain_by_previous_hash() {
    let driver = single_node_driver();

    let (_vrf_tx, vrf_rx1) = mpsc::unbounded_channel();
    let (_block_tx, block_rx1) = mpsc::unbounded_channel();
    let first = driver
        .run_round([0u8; 32], 1.0, 1.0, 1.0, 1_700_000_000, vrf_rx1, block_rx1, CancellationToken::new())
        .await;
    let first_block = match first {
        RoundOutcome::Committed(b) => b,
        other => panic!("expected commit, got {other:?}"),
    };

    let (_vrf_tx, vrf_rx2) = mpsc::unbounded_channel();
    let (_block_tx, block_rx2) = mpsc::unbounded_channel();
    let second = driver
        .run_round(
            first_block.hash(),
            1.0,
            1.0,
            1.0,
            1_700_000_010,
            vrf_rx2,
            block_rx2,
            CancellationToken::new(),
        )
        .await;

    match second {
        RoundOutcome::Committed(block) => {
            assert_eq!(block.header.height, 2);
            assert_eq!(block.header.previous_hash, first_block.hash());
            assert_eq!(driver.current_height(), 2);
        }
        other => panic!("expected a committed block, got {other:?}"),
    }
}

#[tokio::test]
async fn round_retries_without_committing_when_quorum_is_unreachable() {
    let mut config = Config::default();
    config.consensus.super_node_count = 50; // lone node can never reach 2N/3
    config.consensus.vrf_collection_timeout_ms = 10;
    let config = Arc::new(config);
    let sk = SigningKey::generate(&mut OsRng);
    let network: Arc<dyn NetworkHandle> = Arc::new(LoopbackNetwork::new());
    let kv: Arc<dyn KvStore> = Arc::new(InMemoryKv::new());
    let driver = ConsensusDriver::new(
        config,
        sk,
        network,
        BlockStore::new(kv.clone()),
        TransactionStore::new(kv.clone()),
        StateStore::new(kv),
        &ChainState::default(),
    );

    let (_vrf_tx, vrf_rx) = mpsc::unbounded_channel();
    let (_block_tx, block_rx) = mpsc::unbounded_channel();
    let outcome = driver
        .run_round([0u8; 32], 1.0, 1.0, 1.0, 1_700_000_000, vrf_rx, block_rx, CancellationToken::new())
        .await;

    assert!(matches!(outcome, RoundOutcome::Retry));
    assert_eq!(driver.current_height(), 0, "height must not advance without a commit");
    assert_eq!(driver.current_round(), 1);
}

#[tokio::test]
async fn committed_transfer_updates_accounts_and_rejects_replay() {
    let (driver, kv) = single_node_driver_with_kv();
    let transactions = TransactionStore::new(kv.clone());
    let state = StateStore::new(kv);

    let sender_sk = SigningKey::generate(&mut OsRng);
    let sender_pk = ed25519::public_key_of(&sender_sk);
    let receiver_pk = PubKey([9u8; 32]);

    state
        .put_accounts(&[AccountState {
            public_key: sender_pk,
            balance: 1_000,
            nonce: 0,
            stake_amount: 0,
            updated_at: 0,
        }])
        .await
        .unwrap();

    let mut tx = Transaction {
        from: sender_pk,
        to: receiver_pk,
        amount: 100,
        fee: 1,
        timestamp: 1_700_000_000,
        nonce: 1,
        signature: Default::default(),
        tx_type: TxType::Transfer,
    };
    tx.signature = ed25519::sign(&sender_sk, &tx.canonical_bytes_without_signature());
    transactions.add_to_pool(&tx).await.unwrap();

    let (_vrf_tx, vrf_rx) = mpsc::unbounded_channel();
    let (_block_tx, block_rx) = mpsc::unbounded_channel();
    let first = driver
        .run_round([0u8; 32], 1.0, 1.0, 1.0, 1_700_000_000, vrf_rx, block_rx, CancellationToken::new())
        .await;
    let first_block = match first {
        RoundOutcome::Committed(block) => block,
        other => panic!("expected commit, got {other:?}"),
    };
    assert_eq!(first_block.transactions.len(), 1, "the pooled transfer must be included");

    let sender_after = state.get_account(&sender_pk).await.unwrap().expect("sender account persisted");
    assert_eq!(sender_after.balance, 1_000 - 100 - 1);
    assert_eq!(sender_after.nonce, 1);
    let receiver_after = state.get_account(&receiver_pk).await.unwrap().expect("receiver account persisted");
    assert_eq!(receiver_after.balance, 100);

    // Resubmitting the exact same transaction (same nonce) in the next round
    // is a replay: the validator must see the sender's committed nonce and
    // reject it, so the round retries instead of committing a second time.
    transactions.add_to_pool(&tx).await.unwrap();
    let (_vrf_tx2, vrf_rx2) = mpsc::unbounded_channel();
    let (_block_tx2, block_rx2) = mpsc::unbounded_channel();
    let second = driver
        .run_round(
            first_block.hash(),
            1.0,
            1.0,
            1.0,
            1_700_000_010,
            vrf_rx2,
            block_rx2,
            CancellationToken::new(),
        )
        .await;

    assert!(matches!(second, RoundOutcome::Retry), "a replayed nonce must not commit: {second:?}");
    assert_eq!(driver.current_height(), 1, "height must not advance on a rejected replay");
    let sender_unchanged = state.get_account(&sender_pk).await.unwrap().expect("sender account still present");
    assert_eq!(sender_unchanged.nonce, 1, "the replayed transaction must not be applied twice");
}

#[tokio::test]
async fn cancelled_round_aborts_without_retry_bookkeeping() {
    let driver = single_node_driver();
    let (_vrf_tx, vrf_rx) = mpsc::unbounded_channel();
    let (_block_tx, block_rx) = mpsc::unbounded_channel();
    let cancel = CancellationToken::new();
    cancel.cancel();

    let outcome = driver
        .run_round([0u8; 32], 1.0, 1.0, 1.0, 1_700_000_000, vrf_rx, block_rx, cancel)
        .await;

    assert!(matches!(outcome, RoundOutcome::Aborted));
    assert_eq!(driver.current_height(), 0);
    assert_eq!(driver.current_round(), 0, "an abort must not consume a round number");
}

//! Storage collaborator (§6) and the facades (C9) the consensus core uses
//! over it.
//!
//! The persistent key-value engine itself is an external collaborator (§1);
//! this module defines the `KvStore` boundary the core depends on plus two
//! concrete backends (`InMemoryKv` for tests, `SledKv` for a real node) and
//! the typed `BlockStore` / `TransactionStore` / `StateStore` facades built
//! on top, namespaced per §6's key scheme.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;
use tokio::task::spawn_blocking;

use crate::block::types::Block;
use crate::error::StorageError;
use crate::types::{AccountState, ChainState, Hash256, PubKey, Transaction};

/// The raw key-value contract (§6). Keys are UTF-8, values are the
/// canonical byte encoding of whatever entity they hold.
#[async_trait]
pub trait KvStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StorageError>;
    async fn put(&self, key: &str, value: Vec<u8>) -> Result<(), StorageError>;
    async fn delete(&self, key: &str) -> Result<(), StorageError>;
    async fn exists(&self, key: &str) -> Result<bool, StorageError>;
    async fn put_batch(&self, entries: Vec<(String, Vec<u8>)>) -> Result<(), StorageError>;
    async fn get_batch(&self, keys: &[String]) -> Result<HashMap<String, Vec<u8>>, StorageError>;
    async fn scan_namespace(&self, prefix: &str) -> Result<HashMap<String, Vec<u8>>, StorageError>;
}

/// In-process `KvStore`, a single `RwLock<BTreeMap<..>>`. Many-readers /
/// single-writer: reads take a shared lock, `put`/`delete`/`put_batch` take
/// the exclusive lock only for the duration of the mutation (§5).
pub struct InMemoryKv {
    map: RwLock<std::collections::BTreeMap<String, Vec<u8>>>,
}

impl InMemoryKv {
    pub fn new() -> Self {
        Self {
            map: RwLock::new(std::collections::BTreeMap::new()),
        }
    }
}

impl Default for InMemoryKv {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl KvStore for InMemoryKv {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StorageError> {
        Ok(self.map.read().get(key).cloned())
    }

    async fn put(&self, key: &str, value: Vec<u8>) -> Result<(), StorageError> {
        self.map.write().insert(key.to_string(), value);
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), StorageError> {
        self.map.write().remove(key);
        Ok(())
    }

    async fn exists(&self, key: &str) -> Result<bool, StorageError> {
        Ok(self.map.read().contains_key(key))
    }

    async fn put_batch(&self, entries: Vec<(String, Vec<u8>)>) -> Result<(), StorageError> {
        let mut guard = self.map.write();
        for (k, v) in entries {
            guard.insert(k, v);
        }
        Ok(())
    }

    async fn get_batch(&self, keys: &[String]) -> Result<HashMap<String, Vec<u8>>, StorageError> {
        let guard = self.map.read();
        Ok(keys
            .iter()
            .filter_map(|k| guard.get(k).map(|v| (k.clone(), v.clone())))
            .collect())
    }

    async fn scan_namespace(&self, prefix: &str) -> Result<HashMap<String, Vec<u8>>, StorageError> {
        let guard = self.map.read();
        Ok(guard
            .range(prefix.to_string()..)
            .take_while(|(k, _)| k.starts_with(prefix))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect())
    }
}

/// `sled`-backed `KvStore` for a real node. Blocking sled calls are wrapped
/// in `spawn_blocking` so they never stall the async runtime's executor
/// threads.
pub struct SledKv {
    db: sled::Db,
}

impl SledKv {
    pub fn open(path: &std::path::Path) -> Result<Self, StorageError> {
        let db = sled::open(path)?;
        Ok(Self { db })
    }
}

#[async_trait]
impl KvStore for SledKv {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StorageError> {
        let db = self.db.clone();
        let key = key.to_string();
        spawn_blocking(move || db.get(key.as_bytes()).map(|v| v.map(|v| v.to_vec())))
            .await?
            .map_err(StorageError::from)
    }

    async fn put(&self, key: &str, value: Vec<u8>) -> Result<(), StorageError> {
        let db = self.db.clone();
        let key = key.to_string();
        spawn_blocking(move || db.insert(key.as_bytes(), value).map(|_| ()))
            .await?
            .map_err(StorageError::from)
    }

    async fn delete(&self, key: &str) -> Result<(), StorageError> {
        let db = self.db.clone();
        let key = key.to_string();
        spawn_blocking(move || db.remove(key.as_bytes()).map(|_| ()))
            .await?
            .map_err(StorageError::from)
    }

    async fn exists(&self, key: &str) -> Result<bool, StorageError> {
        let db = self.db.clone();
        let key = key.to_string();
        spawn_blocking(move || db.contains_key(key.as_bytes()))
            .await?
            .map_err(StorageError::from)
    }

    async fn put_batch(&self, entries: Vec<(String, Vec<u8>)>) -> Result<(), StorageError> {
        let db = self.db.clone();
        spawn_blocking(move || {
            let mut batch = sled::Batch::default();
            for (k, v) in entries {
                batch.insert(k.as_bytes(), v);
            }
            db.apply_batch(batch)
        })
        .await?
        .map_err(StorageError::from)
    }

    async fn get_batch(&self, keys: &[String]) -> Result<HashMap<String, Vec<u8>>, StorageError> {
        let db = self.db.clone();
        let keys = keys.to_vec();
        spawn_blocking(move || {
            let mut out = HashMap::new();
            for k in keys {
                if let Some(v) = db.get(k.as_bytes())? {
                    out.insert(k, v.to_vec());
                }
            }
            Ok(out)
        })
        .await?
    }

    async fn scan_namespace(&self, prefix: &str) -> Result<HashMap<String, Vec<u8>>, StorageError> {
        let db = self.db.clone();
        let prefix = prefix.to_string();
        spawn_blocking(move || {
            let mut out = HashMap::new();
            for item in db.scan_prefix(prefix.as_bytes()) {
                let (k, v) = item?;
                out.insert(String::from_utf8_lossy(&k).into_owned(), v.to_vec());
            }
            Ok(out)
        })
        .await?
    }
}

fn block_key(height: u64) -> String {
    format!("block:{height}")
}

fn block_hash_key(hash: &Hash256) -> String {
    format!("block_hash:{}", hex::encode(hash))
}

fn tx_key(hash: &Hash256) -> String {
    format!("transaction:{}", hex::encode(hash))
}

fn tx_sender_key(pk: &PubKey, hash: &Hash256) -> String {
    format!("tx_sender:{}:{}", hex::encode(pk.0), hex::encode(hash))
}

fn tx_receiver_key(pk: &PubKey, hash: &Hash256) -> String {
    format!("tx_receiver:{}:{}", hex::encode(pk.0), hex::encode(hash))
}

fn tx_pool_key(hash: &Hash256) -> String {
    format!("tx_pool:{}", hex::encode(hash))
}

fn account_key(pk: &PubKey) -> String {
    format!("account:{}", hex::encode(pk.0))
}

const BLOCK_LATEST_KEY: &str = "block:latest";
const CHAIN_STATE_KEY: &str = "chain:state";

/// Typed view over `KvStore` for committed blocks.
pub struct BlockStore {
    kv: Arc<dyn KvStore>,
}

impl BlockStore {
    pub fn new(kv: Arc<dyn KvStore>) -> Self {
        Self { kv }
    }

    pub async fn get_by_height(&self, height: u64) -> Result<Option<Block>, StorageError> {
        match self.kv.get(&block_key(height)).await? {
            Some(bytes) => Ok(Some(bincode::deserialize(&bytes)?)),
            None => Ok(None),
        }
    }

    pub async fn get_by_hash(&self, hash: &Hash256) -> Result<Option<Block>, StorageError> {
        match self.kv.get(&block_hash_key(hash)).await? {
            Some(height_bytes) => {
                let height: u64 = bincode::deserialize(&height_bytes)?;
                self.get_by_height(height).await
            }
            None => Ok(None),
        }
    }

    pub async fn latest(&self) -> Result<Option<Block>, StorageError> {
        match self.kv.get(BLOCK_LATEST_KEY).await? {
            Some(bytes) => Ok(Some(bincode::deserialize(&bytes)?)),
            None => Ok(None),
        }
    }

    /// Commits a block atomically: the height index, hash index, and
    /// "latest" pointer land together or not at all (§5).
    pub async fn commit(&self, block: &Block) -> Result<(), StorageError> {
        let encoded = bincode::serialize(block)?;
        let hash = block.hash();
        let entries = vec![
            (block_key(block.header.height), encoded.clone()),
            (block_hash_key(&hash), bincode::serialize(&block.header.height)?),
            (BLOCK_LATEST_KEY.to_string(), encoded),
        ];
        self.kv.put_batch(entries).await
    }
}

/// Typed view over `KvStore` for transactions and the mempool.
pub struct TransactionStore {
    kv: Arc<dyn KvStore>,
}

impl TransactionStore {
    pub fn new(kv: Arc<dyn KvStore>) -> Self {
        Self { kv }
    }

    pub async fn get(&self, hash: &Hash256) -> Result<Option<Transaction>, StorageError> {
        match self.kv.get(&tx_key(hash)).await? {
            Some(bytes) => Ok(Some(bincode::deserialize(&bytes)?)),
            None => Ok(None),
        }
    }

    /// Indexes a confirmed transaction by hash, sender, and receiver, and
    /// drops it from the mempool.
    pub async fn confirm(&self, tx: &Transaction) -> Result<(), StorageError> {
        let hash = tx.hash();
        let encoded = bincode::serialize(tx)?;
        self.kv
            .put_batch(vec![
                (tx_key(&hash), encoded),
                (tx_sender_key(&tx.from, &hash), Vec::new()),
                (tx_receiver_key(&tx.to, &hash), Vec::new()),
            ])
            .await?;
        self.kv.delete(&tx_pool_key(&hash)).await
    }

    pub async fn add_to_pool(&self, tx: &Transaction) -> Result<(), StorageError> {
        let encoded = bincode::serialize(tx)?;
        self.kv.put(&tx_pool_key(&tx.hash()), encoded).await
    }

    pub async fn pool(&self) -> Result<Vec<Transaction>, StorageError> {
        let entries = self.kv.scan_namespace("tx_pool:").await?;
        entries
            .values()
            .map(|bytes| bincode::deserialize(bytes).map_err(StorageError::from))
            .collect()
    }

    pub async fn remove_from_pool(&self, hash: &Hash256) -> Result<(), StorageError> {
        self.kv.delete(&tx_pool_key(hash)).await
    }
}

/// Typed view over `KvStore` for account and chain-wide state.
pub struct StateStore {
    kv: Arc<dyn KvStore>,
}

impl StateStore {
    pub fn new(kv: Arc<dyn KvStore>) -> Self {
        Self { kv }
    }

    pub async fn get_account(&self, pk: &PubKey) -> Result<Option<AccountState>, StorageError> {
        match self.kv.get(&account_key(pk)).await? {
            Some(bytes) => Ok(Some(bincode::deserialize(&bytes)?)),
            None => Ok(None),
        }
    }

    pub async fn put_accounts(&self, accounts: &[AccountState]) -> Result<(), StorageError> {
        let mut entries = Vec::with_capacity(accounts.len());
        for acct in accounts {
            entries.push((account_key(&acct.public_key), bincode::serialize(acct)?));
        }
        self.kv.put_batch(entries).await
    }

    pub async fn get_chain_state(&self) -> Result<ChainState, StorageError> {
        match self.kv.get(CHAIN_STATE_KEY).await? {
            Some(bytes) => Ok(bincode::deserialize(&bytes)?),
            None => Ok(ChainState::default()),
        }
    }

    pub async fn put_chain_state(&self, state: &ChainState) -> Result<(), StorageError> {
        self.kv.put(CHAIN_STATE_KEY, bincode::serialize(state)?).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Signature, TxType};

    fn sample_tx() -> Transaction {
        Transaction {
            from: PubKey([1u8; 32]),
            to: PubKey([2u8; 32]),
            amount: 10,
            fee: 1,
            timestamp: 1,
            nonce: 1,
            signature: Signature::default(),
            tx_type: TxType::Transfer,
        }
    }

    #[tokio::test]
    async fn block_store_roundtrips_by_height_and_hash() {
        let kv: Arc<dyn KvStore> = Arc::new(InMemoryKv::new());
        let store = BlockStore::new(kv);
        let block = Block {
            header: crate::block::types::BlockHeader {
                height: 1,
                round: 1,
                timestamp: 0,
                previous_hash: [0u8; 32],
                proposer: PubKey([9u8; 32]),
                vrf_output: crate::types::VRFOutput([0u8; 32]),
                vrf_proof: crate::types::VRFProof([0u8; 64]),
                all_vrf_announcements: vec![],
                rewarded_nodes: vec![],
                merkle_root: [0u8; 32],
                nonce: 0,
                difficulty_target: primitive_types::U256::from(1_000_000u64),
            },
            transactions: vec![],
            signatures: Default::default(),
        };
        store.commit(&block).await.unwrap();
        let by_height = store.get_by_height(1).await.unwrap().unwrap();
        assert_eq!(by_height.hash(), block.hash());
        let by_hash = store.get_by_hash(&block.hash()).await.unwrap().unwrap();
        assert_eq!(by_hash.hash(), block.hash());
        assert_eq!(store.latest().await.unwrap().unwrap().hash(), block.hash());
    }

    #[tokio::test]
    async fn transaction_store_pool_then_confirm() {
        let kv: Arc<dyn KvStore> = Arc::new(InMemoryKv::new());
        let store = TransactionStore::new(kv);
        let tx = sample_tx();
        store.add_to_pool(&tx).await.unwrap();
        assert_eq!(store.pool().await.unwrap().len(), 1);
        store.confirm(&tx).await.unwrap();
        assert!(store.pool().await.unwrap().is_empty());
        assert_eq!(store.get(&tx.hash()).await.unwrap().unwrap(), tx);
    }

    #[tokio::test]
    async fn state_store_roundtrips_chain_state() {
        let kv: Arc<dyn KvStore> = Arc::new(InMemoryKv::new());
        let store = StateStore::new(kv);
        let state = ChainState {
            current_height: 5,
            ..Default::default()
        };
        store.put_chain_state(&state).await.unwrap();
        assert_eq!(store.get_chain_state().await.unwrap(), state);
    }
}

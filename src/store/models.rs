//! Ledger models

use crate::error::Result;
use crate::store::BlockDescriptor;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Parent hash recorded by the first block of a chain.
pub const GENESIS_PARENT: [u8; 32] = [0u8; 32];

// ============================================================================
// Transactions
// ============================================================================

/// Transaction waiting in (or drained from) the mempool
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    pub from: String,
    pub to: String,
    pub value: u64,
    pub tip: u64,
    pub nonce: u64,
    pub timestamp: DateTime<Utc>,
}

impl Transaction {
    pub fn new(from: &str, to: &str, value: u64, nonce: u64) -> Self {
        Self {
            from: from.to_string(),
            to: to.to_string(),
            value,
            tip: 0,
            nonce,
            timestamp: Utc::now(),
        }
    }

    /// Set the tip paid to the block writer
    pub fn with_tip(mut self, tip: u64) -> Self {
        self.tip = tip;
        self
    }
}

// ============================================================================
// Blocks
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockHeader {
    pub number: u64,
    #[serde(with = "hex_bytes")]
    pub prev_block: Vec<u8>,
    pub timestamp: DateTime<Utc>,
    #[serde(with = "hex_bytes")]
    pub tx_root: Vec<u8>,
    pub num_transactions: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block {
    pub header: BlockHeader,
    pub transactions: Vec<Transaction>,
}

impl Block {
    /// Assemble a block on top of `prev_block`
    pub fn new(number: u64, prev_block: Vec<u8>, transactions: Vec<Transaction>) -> Result<Self> {
        let tx_root = sha256(&serde_json::to_vec(&transactions)?);

        Ok(Self {
            header: BlockHeader {
                number,
                prev_block,
                timestamp: Utc::now(),
                tx_root,
                num_transactions: transactions.len(),
            },
            transactions,
        })
    }

    /// SHA-256 of the JSON-encoded header
    pub fn hash(&self) -> Result<Vec<u8>> {
        Ok(sha256(&serde_json::to_vec(&self.header)?))
    }
}

impl BlockDescriptor for Block {
    fn prev_block(&self) -> &[u8] {
        &self.header.prev_block
    }

    fn hash(&self) -> Result<Vec<u8>> {
        Block::hash(self)
    }

    fn item_count(&self) -> usize {
        self.transactions.len()
    }
}

fn sha256(data: &[u8]) -> Vec<u8> {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hasher.finalize().to_vec()
}

/// Hex encoding for byte fields in the journal
mod hex_bytes {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&hex::encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let s = String::deserialize(deserializer)?;
        hex::decode(s).map_err(serde::de::Error::custom)
    }
}

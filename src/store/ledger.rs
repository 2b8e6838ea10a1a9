//! In-memory ledger: a FIFO mempool plus the chain of written blocks

use crate::error::{Result, WriterError};
use crate::store::models::{Block, Transaction, GENESIS_PARENT};
use crate::store::BlockStore;
use std::collections::VecDeque;
use std::io::SeekFrom;
use std::path::{Path, PathBuf};
use tokio::fs::{File, OpenOptions};
use tokio::io::{AsyncReadExt, AsyncSeekExt, AsyncWriteExt};
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

#[derive(Debug, Default)]
struct LedgerState {
    mempool: VecDeque<Transaction>,
    chain: Vec<Block>,
}

/// Mempool and chain, optionally journaling each block as a JSON line
pub struct Ledger {
    state: Mutex<LedgerState>,
    max_block_transactions: usize,
    journal: Option<PathBuf>,
}

impl Ledger {
    /// Create a ledger without a journal
    pub fn new(max_block_transactions: usize) -> Self {
        Self {
            state: Mutex::new(LedgerState::default()),
            max_block_transactions: max_block_transactions.max(1),
            journal: None,
        }
    }

    /// Create a ledger appending every written block to `path`
    pub fn with_journal(max_block_transactions: usize, path: impl AsRef<Path>) -> Self {
        Self {
            journal: Some(path.as_ref().to_path_buf()),
            ..Self::new(max_block_transactions)
        }
    }

    pub fn journal_path(&self) -> Option<&Path> {
        self.journal.as_deref()
    }

    /// Add a transaction to the mempool
    pub async fn submit(&self, tx: Transaction) {
        let mut state = self.state.lock().await;
        debug!("Mempool accepted transaction {} -> {} ({})", tx.from, tx.to, tx.value);
        state.mempool.push_back(tx);
    }

    pub async fn mempool_len(&self) -> usize {
        self.state.lock().await.mempool.len()
    }

    pub async fn chain_len(&self) -> usize {
        self.state.lock().await.chain.len()
    }

    pub async fn latest_block(&self) -> Option<Block> {
        self.state.lock().await.chain.last().cloned()
    }

    /// Drain pending transactions into a new block and persist it
    pub async fn write_block(&self) -> Result<Block> {
        // Held across the journal write so blocks are appended in chain order.
        let mut state = self.state.lock().await;

        if state.mempool.is_empty() {
            return Err(WriterError::NoTransactions);
        }

        let (number, prev_block) = match state.chain.last() {
            Some(last) => (last.header.number + 1, last.hash()?),
            None => (1, GENESIS_PARENT.to_vec()),
        };

        let take = state.mempool.len().min(self.max_block_transactions);
        let transactions: Vec<Transaction> = state.mempool.drain(..take).collect();

        let block = match self.persist(number, prev_block, transactions.clone()).await {
            Ok(block) => block,
            Err(e) => {
                error!("Failed to write block {}: {}", number, e);
                for tx in transactions.into_iter().rev() {
                    state.mempool.push_front(tx);
                }
                return Err(e);
            }
        };

        info!(
            "Committed block {} with {} transactions ({} still pending)",
            number,
            block.transactions.len(),
            state.mempool.len()
        );
        state.chain.push(block.clone());

        Ok(block)
    }

    async fn persist(
        &self,
        number: u64,
        prev_block: Vec<u8>,
        transactions: Vec<Transaction>,
    ) -> Result<Block> {
        let block = Block::new(number, prev_block, transactions)?;

        if let Some(path) = &self.journal {
            let mut line = serde_json::to_vec(&block)?;
            line.push(b'\n');
            append_to_journal(path, &line).await?;
        }

        Ok(block)
    }
}

/// Append one line to the journal, leaving the file as it was on failure
async fn append_to_journal(path: &Path, line: &[u8]) -> Result<()> {
    let mut file = OpenOptions::new()
        .create(true)
        .read(true)
        .append(true)
        .open(path)
        .await?;

    let len = file.metadata().await?.len();
    let intact = intact_len(&mut file, len).await?;
    if intact < len {
        warn!(
            "Dropping {} bytes of torn journal tail in {}",
            len - intact,
            path.display()
        );
        file.set_len(intact).await?;
    }

    let written: std::io::Result<()> = async {
        file.write_all(line).await?;
        file.flush().await?;
        file.sync_data().await
    }
    .await;

    if let Err(e) = written {
        if let Err(truncate) = file.set_len(intact).await {
            error!(
                "Failed to roll back journal {} to {} bytes: {}",
                path.display(),
                intact,
                truncate
            );
        }
        return Err(e.into());
    }

    Ok(())
}

/// Length of the journal up to and including its last complete line
async fn intact_len(file: &mut File, len: u64) -> Result<u64> {
    if len == 0 {
        return Ok(0);
    }

    let mut last = [0u8; 1];
    file.seek(SeekFrom::Start(len - 1)).await?;
    file.read_exact(&mut last).await?;
    if last[0] == b'\n' {
        return Ok(len);
    }

    let mut contents = Vec::new();
    file.seek(SeekFrom::Start(0)).await?;
    file.read_to_end(&mut contents).await?;
    Ok(contents
        .iter()
        .rposition(|&b| b == b'\n')
        .map_or(0, |i| i as u64 + 1))
}

impl BlockStore for Ledger {
    type Block = Block;

    async fn create_block(&self) -> Result<Block> {
        self.write_block().await
    }
}

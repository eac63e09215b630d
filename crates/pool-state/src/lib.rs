//! per-pool in-memory aggregate.
//!
//! a `Pool` exclusively owns its accumulator, commitment map, nullifier
//! set, and memo log (spec.md §3 "Ownership"). Mutating methods are
//! `pub(crate)` — only this crate's indexer-facing API applies events;
//! everything public here is a read.

pub mod error;
pub mod events;
pub mod registry;

use std::collections::{HashMap, HashSet};

use chain_client::{Address, TxHash};
use field_hash::Fr;
use merkle_accum::{IncrementalTree, MerklePath};

pub use error::{PoolError, Result};
pub use events::{PoolEvent, ShieldEvent, SwapEvent, TransferEvent, UnshieldEvent};
pub use registry::PoolRegistry;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CommitmentKind {
    Shield,
    Transfer,
    Swap,
    /// change note minted by a partial unshield; reserved for the relay
    /// executor's optimistic bookkeeping — no chain event in spec.md §6
    /// carries a change commitment directly, only `LeafInserted`. See
    /// DESIGN.md.
    BatchUnshieldChange,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CommitmentMeta {
    pub leaf_index: u64,
    pub token: Address,
    pub amount: u128,
    pub timestamp: u64,
    pub block_number: u64,
    pub tx_hash: TxHash,
    pub kind: CommitmentKind,
}

/// one memo published alongside a Transfer or Swap, flattened for the
/// `get_memos` query (spec.md §4.3 `transferMemos`, one entry per output).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PublishedMemo {
    pub nullifier_hash: Fr,
    pub output_commitment: Fr,
    pub leaf_index: u64,
    pub memo: Vec<u8>,
    pub timestamp: u64,
    pub tx_hash: TxHash,
}

/// per-nullifier memo record, keyed the way spec.md §4.3 describes
/// (`transferMemos: mapping nullifierHash → {...}`).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MemoEntry {
    pub outputs: Vec<Fr>,
    pub memos: Vec<Vec<u8>>,
    pub leaf_indices: Vec<u64>,
    pub timestamp: u64,
    pub tx_hash: TxHash,
}

/// whether a pool's local tree is known to agree with the on-chain
/// accumulator. `get_path` refuses once a pool goes out of sync; spend
/// and balance queries keep working (spec.md §4.4 "Failure semantics").
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SyncStatus {
    Ok,
    OutOfSync(String),
}

/// `Clone` backs the indexer's reorg guard: a cheap-enough-in-practice
/// snapshot taken before applying each live-mode block, restored wholesale
/// if a later block's parent hash doesn't match (spec.md §9 "stash by
/// block hash and roll back on depth-1 orphans"). The accumulator itself
/// stays append-only; rollback replaces the whole `Pool`, it never
/// un-inserts a leaf.
#[derive(Clone)]
pub struct Pool {
    address: Address,
    supported_tokens: HashSet<Address>,
    tree: IncrementalTree,
    commitments: HashMap<Fr, CommitmentMeta>,
    nullifiers: HashSet<Fr>,
    transfer_memos: HashMap<Fr, MemoEntry>,
    published_memos: Vec<PublishedMemo>,
    total_shielded: HashMap<Address, i128>,
    last_sync_block: u64,
    sync_status: SyncStatus,
}

impl Pool {
    pub fn new(address: Address, supported_tokens: HashSet<Address>) -> Self {
        Self {
            address,
            supported_tokens,
            tree: IncrementalTree::production(),
            commitments: HashMap::new(),
            nullifiers: HashSet::new(),
            transfer_memos: HashMap::new(),
            published_memos: Vec::new(),
            total_shielded: HashMap::new(),
            last_sync_block: 0,
            sync_status: SyncStatus::Ok,
        }
    }

    pub fn address(&self) -> Address {
        self.address
    }

    pub fn last_sync_block(&self) -> u64 {
        self.last_sync_block
    }

    pub fn set_last_sync_block(&mut self, block: u64) {
        self.last_sync_block = block;
    }

    pub fn sync_status(&self) -> &SyncStatus {
        &self.sync_status
    }

    pub fn supports_token(&self, token: Address) -> bool {
        token.is_native() || self.supported_tokens.contains(&token)
    }

    fn mark_out_of_sync(&mut self, reason: impl Into<String>) {
        let reason = reason.into();
        tracing::error!(pool = %self.address, %reason, "pool marked out of sync");
        self.sync_status = SyncStatus::OutOfSync(reason);
    }

    fn adjust_balance(&mut self, token: Address, delta: i128) {
        let entry = self.total_shielded.entry(token).or_insert(0);
        *entry = entry.saturating_add(delta);
    }

    /// Shield{commitment, leafIndex, token, amount, timestamp}. Re-delivery
    /// of an already-known commitment is a no-op (tolerates at-least-once
    /// log delivery without violating P4 determinism).
    pub(crate) fn apply_shield(&mut self, event: ShieldEvent) -> Result<()> {
        if self.commitments.contains_key(&event.commitment) {
            return Ok(());
        }

        let actual = self.tree.insert(event.commitment)?;
        if actual != event.leaf_index {
            self.mark_out_of_sync(format!(
                "shield commitment landed at leaf {actual}, event declared {}",
                event.leaf_index
            ));
            return Err(PoolError::LeafIndexMismatch {
                expected: event.leaf_index,
                actual,
            });
        }

        self.commitments.insert(
            event.commitment,
            CommitmentMeta {
                leaf_index: actual,
                token: event.token,
                amount: event.amount,
                timestamp: event.timestamp,
                block_number: event.block_number,
                tx_hash: event.tx_hash,
                kind: CommitmentKind::Shield,
            },
        );
        self.adjust_balance(event.token, event.amount as i128);
        Ok(())
    }

    /// Transfer{nullifierHash, outputCommitment1/2, leafIndex1/2, memos}.
    pub(crate) fn apply_transfer(&mut self, event: TransferEvent) -> Result<()> {
        if self.nullifiers.contains(&event.nullifier_hash) {
            return Err(PoolError::NullifierAlreadySpent);
        }
        self.nullifiers.insert(event.nullifier_hash);

        let outputs = [
            (event.output_commitment_1, event.leaf_index_1, &event.encrypted_memo_1),
            (event.output_commitment_2, event.leaf_index_2, &event.encrypted_memo_2),
        ];

        let mut leaf_indices = Vec::with_capacity(2);
        for (commitment, expected_leaf, _) in outputs {
            if self.commitments.contains_key(&commitment) {
                leaf_indices.push(
                    self.commitments
                        .get(&commitment)
                        .expect("just checked contains_key")
                        .leaf_index,
                );
                continue;
            }
            let actual = self.tree.insert(commitment)?;
            if actual != expected_leaf {
                self.mark_out_of_sync(format!(
                    "transfer output landed at leaf {actual}, event declared {expected_leaf}"
                ));
                return Err(PoolError::LeafIndexMismatch {
                    expected: expected_leaf,
                    actual,
                });
            }
            self.commitments.insert(
                commitment,
                CommitmentMeta {
                    leaf_index: actual,
                    token: Address::NATIVE,
                    amount: 0,
                    timestamp: event.timestamp,
                    block_number: event.block_number,
                    tx_hash: event.tx_hash,
                    kind: CommitmentKind::Transfer,
                },
            );
            leaf_indices.push(actual);
        }

        for (i, (commitment, _, memo)) in outputs.into_iter().enumerate() {
            self.published_memos.push(PublishedMemo {
                nullifier_hash: event.nullifier_hash,
                output_commitment: commitment,
                leaf_index: leaf_indices[i],
                memo: memo.clone(),
                timestamp: event.timestamp,
                tx_hash: event.tx_hash,
            });
        }

        self.transfer_memos.insert(
            event.nullifier_hash,
            MemoEntry {
                outputs: vec![event.output_commitment_1, event.output_commitment_2],
                memos: vec![event.encrypted_memo_1, event.encrypted_memo_2],
                leaf_indices,
                timestamp: event.timestamp,
                tx_hash: event.tx_hash,
            },
        );
        Ok(())
    }

    /// Unshield{nullifierHash, recipient, token, amount, fee}.
    pub(crate) fn apply_unshield(&mut self, event: UnshieldEvent) -> Result<()> {
        if self.nullifiers.contains(&event.nullifier_hash) {
            return Err(PoolError::NullifierAlreadySpent);
        }
        self.nullifiers.insert(event.nullifier_hash);
        let total = event.amount.saturating_add(event.fee);
        self.adjust_balance(event.token, -(total as i128));
        Ok(())
    }

    /// Swap{inputNullifier, outputCommitment, tokenIn/Out, amountIn/Out}.
    pub(crate) fn apply_swap(&mut self, event: SwapEvent) -> Result<()> {
        if self.nullifiers.contains(&event.input_nullifier) {
            return Err(PoolError::NullifierAlreadySpent);
        }
        self.nullifiers.insert(event.input_nullifier);

        let leaf_index = if let Some(meta) = self.commitments.get(&event.output_commitment) {
            meta.leaf_index
        } else {
            let idx = self.tree.insert(event.output_commitment)?;
            self.commitments.insert(
                event.output_commitment,
                CommitmentMeta {
                    leaf_index: idx,
                    token: event.token_out,
                    amount: event.amount_out,
                    timestamp: event.timestamp,
                    block_number: event.block_number,
                    tx_hash: event.tx_hash,
                    kind: CommitmentKind::Swap,
                },
            );
            idx
        };

        self.adjust_balance(event.token_in, -(event.amount_in as i128));
        self.adjust_balance(event.token_out, event.amount_out as i128);

        self.published_memos.push(PublishedMemo {
            nullifier_hash: event.input_nullifier,
            output_commitment: event.output_commitment,
            leaf_index,
            memo: event.encrypted_memo,
            timestamp: event.timestamp,
            tx_hash: event.tx_hash,
        });
        Ok(())
    }

    /// dispatch a decoded event to the matching `apply_*` method.
    pub(crate) fn apply_event(&mut self, event: PoolEvent) -> Result<()> {
        match event {
            PoolEvent::Shield(e) => self.apply_shield(e),
            PoolEvent::Transfer(e) => self.apply_transfer(e),
            PoolEvent::Unshield(e) => self.apply_unshield(e),
            PoolEvent::Swap(e) => self.apply_swap(e),
        }
    }

    // --- read API (spec.md §4.3 "Query API") -------------------------------

    pub fn get_root(&self) -> (Fr, u64) {
        (self.tree.root(), self.tree.len())
    }

    pub fn get_path(&self, leaf_index: u64) -> Result<MerklePath> {
        if let SyncStatus::OutOfSync(reason) = &self.sync_status {
            return Err(PoolError::OutOfSync(reason.clone()));
        }
        Ok(self.tree.path(leaf_index)?)
    }

    /// memos with `timestamp >= since`, already in `(timestamp, insertion
    /// order)` order because events are applied in that order.
    pub fn get_memos(&self, since: Option<u64>) -> Vec<&PublishedMemo> {
        let floor = since.unwrap_or(0);
        self.published_memos
            .iter()
            .filter(|m| m.timestamp >= floor)
            .collect()
    }

    pub fn is_nullifier_spent(&self, nullifier: Fr) -> bool {
        self.nullifiers.contains(&nullifier)
    }

    pub fn commitment_meta(&self, commitment: Fr) -> Option<&CommitmentMeta> {
        self.commitments.get(&commitment)
    }

    pub fn is_known_root(&self, root: Fr) -> bool {
        self.tree.is_known_root(root)
    }

    pub fn stats(&self) -> PoolStats {
        PoolStats {
            total_commitments: self.commitments.len() as u64,
            total_nullifiers: self.nullifiers.len() as u64,
            shielded_balances: self.total_shielded.clone(),
            root: self.tree.root(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PoolStats {
    pub total_commitments: u64,
    pub total_nullifiers: u64,
    pub shielded_balances: HashMap<Address, i128>,
    pub root: Fr,
}

/// the single entry point the indexer uses to mutate a pool — keeps
/// `apply_*` crate-private while giving the indexer crate a typed,
/// ordered-application API.
pub fn apply_event(pool: &mut Pool, event: PoolEvent) -> Result<()> {
    pool.apply_event(event)
}

#[cfg(test)]
mod tests {
    use super::*;
    use field_hash::Fr;

    fn addr(n: u8) -> Address {
        Address([n; 20])
    }

    fn tx(n: u8) -> TxHash {
        TxHash([n; 32])
    }

    #[test]
    fn shield_inserts_commitment_and_credits_balance() {
        let mut pool = Pool::new(addr(1), HashSet::new());
        apply_event(
            &mut pool,
            PoolEvent::Shield(ShieldEvent {
                commitment: Fr::from_u64(100),
                leaf_index: 0,
                token: Address::NATIVE,
                amount: 1000,
                timestamp: 10,
                block_number: 1,
                log_index: 0,
                tx_hash: tx(1),
            }),
        )
        .unwrap();

        let (_, total) = pool.get_root();
        assert_eq!(total, 1);
        assert_eq!(pool.stats().shielded_balances[&Address::NATIVE], 1000);
    }

    #[test]
    fn shield_replay_is_idempotent() {
        let mut pool = Pool::new(addr(1), HashSet::new());
        let event = || {
            PoolEvent::Shield(ShieldEvent {
                commitment: Fr::from_u64(100),
                leaf_index: 0,
                token: Address::NATIVE,
                amount: 1000,
                timestamp: 10,
                block_number: 1,
                log_index: 0,
                tx_hash: tx(1),
            })
        };
        apply_event(&mut pool, event()).unwrap();
        apply_event(&mut pool, event()).unwrap();
        assert_eq!(pool.get_root().1, 1);
        assert_eq!(pool.stats().shielded_balances[&Address::NATIVE], 1000);
    }

    #[test]
    fn shield_leaf_mismatch_marks_out_of_sync() {
        let mut pool = Pool::new(addr(1), HashSet::new());
        let result = apply_event(
            &mut pool,
            PoolEvent::Shield(ShieldEvent {
                commitment: Fr::from_u64(1),
                leaf_index: 5,
                token: Address::NATIVE,
                amount: 1,
                timestamp: 1,
                block_number: 1,
                log_index: 0,
                tx_hash: tx(1),
            }),
        );
        assert!(result.is_err());
        assert!(matches!(pool.sync_status(), SyncStatus::OutOfSync(_)));
        assert!(pool.get_path(0).is_err());
    }

    #[test]
    fn double_spend_nullifier_is_rejected() {
        let mut pool = Pool::new(addr(1), HashSet::new());
        let unshield = |nf: u64| {
            PoolEvent::Unshield(UnshieldEvent {
                nullifier_hash: Fr::from_u64(nf),
                recipient: addr(2),
                token: Address::NATIVE,
                amount: 10,
                relayer: addr(3),
                fee: 1,
                timestamp: 1,
                block_number: 1,
                log_index: 0,
                tx_hash: tx(1),
            })
        };
        apply_event(&mut pool, unshield(7)).unwrap();
        assert!(pool.is_nullifier_spent(Fr::from_u64(7)));
        let err = apply_event(&mut pool, unshield(7)).unwrap_err();
        assert_eq!(err, PoolError::NullifierAlreadySpent);
    }

    #[test]
    fn transfer_publishes_two_memos_in_order() {
        let mut pool = Pool::new(addr(1), HashSet::new());
        apply_event(
            &mut pool,
            PoolEvent::Transfer(TransferEvent {
                nullifier_hash: Fr::from_u64(1),
                output_commitment_1: Fr::from_u64(2),
                output_commitment_2: Fr::from_u64(3),
                leaf_index_1: 0,
                leaf_index_2: 1,
                encrypted_memo_1: vec![0xaa],
                encrypted_memo_2: vec![0xbb],
                timestamp: 5,
                block_number: 1,
                log_index: 0,
                tx_hash: tx(1),
            }),
        )
        .unwrap();

        let memos = pool.get_memos(None);
        assert_eq!(memos.len(), 2);
        assert_eq!(memos[0].memo, vec![0xaa]);
        assert_eq!(memos[1].memo, vec![0xbb]);
    }

    #[test]
    fn get_memos_filters_by_since_timestamp() {
        let mut pool = Pool::new(addr(1), HashSet::new());
        for (nf, ts) in [(1u64, 10u64), (2, 20), (3, 30)] {
            apply_event(
                &mut pool,
                PoolEvent::Swap(SwapEvent {
                    input_nullifier: Fr::from_u64(nf),
                    output_commitment: Fr::from_u64(nf + 100),
                    token_in: Address::NATIVE,
                    token_out: addr(9),
                    amount_in: 1,
                    amount_out: 1,
                    encrypted_memo: vec![nf as u8],
                    timestamp: ts,
                    block_number: 1,
                    log_index: 0,
                    tx_hash: tx(1),
                }),
            )
            .unwrap();
        }
        let memos = pool.get_memos(Some(20));
        assert_eq!(memos.len(), 2);
    }
}

//! typed messages the indexer sends a pool. The pool owns its state; the
//! indexer never reaches into it directly (spec.md §9 "the pool owns its
//! state; the indexer sends it typed event messages").

use chain_client::{Address, TxHash};
use field_hash::Fr;

#[derive(Clone, Debug)]
pub struct ShieldEvent {
    pub commitment: Fr,
    pub leaf_index: u64,
    pub token: Address,
    pub amount: u128,
    pub timestamp: u64,
    pub block_number: u64,
    pub log_index: u64,
    pub tx_hash: TxHash,
}

#[derive(Clone, Debug)]
pub struct TransferEvent {
    pub nullifier_hash: Fr,
    pub output_commitment_1: Fr,
    pub output_commitment_2: Fr,
    pub leaf_index_1: u64,
    pub leaf_index_2: u64,
    pub encrypted_memo_1: Vec<u8>,
    pub encrypted_memo_2: Vec<u8>,
    pub timestamp: u64,
    pub block_number: u64,
    pub log_index: u64,
    pub tx_hash: TxHash,
}

#[derive(Clone, Debug)]
pub struct UnshieldEvent {
    pub nullifier_hash: Fr,
    pub recipient: Address,
    pub token: Address,
    pub amount: u128,
    pub relayer: Address,
    pub fee: u128,
    pub timestamp: u64,
    pub block_number: u64,
    pub log_index: u64,
    pub tx_hash: TxHash,
}

#[derive(Clone, Debug)]
pub struct SwapEvent {
    pub input_nullifier: Fr,
    pub output_commitment: Fr,
    pub token_in: Address,
    pub token_out: Address,
    pub amount_in: u128,
    pub amount_out: u128,
    pub encrypted_memo: Vec<u8>,
    pub timestamp: u64,
    pub block_number: u64,
    pub log_index: u64,
    pub tx_hash: TxHash,
}

/// the four chain events the indexer decodes, carrying enough to sort the
/// merged catch-up stream by `(block_number, log_index)` before dispatch.
#[derive(Clone, Debug)]
pub enum PoolEvent {
    Shield(ShieldEvent),
    Transfer(TransferEvent),
    Unshield(UnshieldEvent),
    Swap(SwapEvent),
}

impl PoolEvent {
    pub fn block_number(&self) -> u64 {
        match self {
            PoolEvent::Shield(e) => e.block_number,
            PoolEvent::Transfer(e) => e.block_number,
            PoolEvent::Unshield(e) => e.block_number,
            PoolEvent::Swap(e) => e.block_number,
        }
    }

    pub fn log_index(&self) -> u64 {
        match self {
            PoolEvent::Shield(e) => e.log_index,
            PoolEvent::Transfer(e) => e.log_index,
            PoolEvent::Unshield(e) => e.log_index,
            PoolEvent::Swap(e) => e.log_index,
        }
    }
}

//! validates, simulates and submits shielded-operation transactions.
//!
//! [`Executor`] is the single entry point: it runs the seven ordered
//! policy gates, simulates the dispatched call with `eth_call`, and only
//! then signs and submits. `simulate` and `submit` run the exact same
//! gates in the exact same order, so a client's dry-run and the relay's
//! own pre-submission check never diverge.

pub mod contract_errors;
pub mod dedup;
pub mod dispatch;
pub mod error;
pub mod nonce;
pub mod policy;
pub mod proof;
pub mod request;
pub mod signer;

use std::sync::Arc;
use std::time::Duration;

use chain_client::rpc::ChainClient;
use chain_client::{Address, ChainClientError, TxHash};
use pool_state::registry::PoolRegistry;

use crate::dedup::DedupRing;
use crate::error::{ContractRevert, RelayError, Result};
use crate::nonce::NonceManager;
use crate::policy::FeePolicy;
use crate::request::RelayRequest;

pub use crate::proof::{Proof, PublicInputs};
pub use crate::request::{
    BatchTransferRequest, BatchUnshieldRequest, SwapRequest, TransferMultiRequest, TransferRequest,
    UnshieldRequest,
};

/// a conservative fixed gas limit for every dispatch call. The pool's
/// functions are bounded-cost (one Merkle insert, a handful of set
/// operations, at most one external token transfer), so a single static
/// ceiling covers all of them without an `eth_estimateGas` round-trip.
pub const DEFAULT_GAS_LIMIT: u64 = 600_000;

/// how long `submit` waits for a receipt before returning the transaction
/// hash without one — the caller can still look the hash up later
/// (SPEC_FULL.md §5 "the relay always returns the transaction hash once a
/// submission succeeds").
pub const RECEIPT_WAIT_TIMEOUT: Duration = Duration::from_secs(30);
const RECEIPT_POLL_INTERVAL: Duration = Duration::from_millis(500);

#[derive(Clone, Debug)]
pub struct ExecutorConfig {
    pub relayer: Address,
    pub private_key: [u8; 32],
    pub chain_id: u64,
    pub gas_floor: u128,
    pub gas_limit: u64,
    pub fee_policy: FeePolicy,
}

/// the outcome of a successful submission: the transaction hash plus
/// whatever `LeafInserted` leaf indices the receipt's logs carried (absent
/// if the receipt wasn't observed before `RECEIPT_WAIT_TIMEOUT`).
#[derive(Clone, Debug)]
pub struct SubmissionOutcome {
    pub tx_hash: TxHash,
    pub leaf_indices: Vec<u64>,
    pub receipt_seen: bool,
    /// `true` when `tx_hash` is a prior submission returned from the dedup
    /// ring rather than a freshly submitted transaction (spec.md §4.5
    /// "Deduplication", §8 vector test 4).
    pub duplicate: bool,
    /// every transaction hash produced when `BatchUnshield` fell back to
    /// per-proof `unshieldNative`/`unshieldToken` calls, in submission
    /// order; empty unless `fallback` is set (spec.md §4.5 "All produced
    /// transaction hashes are returned", §8 vector test 6).
    pub individual_txs: Vec<TxHash>,
    /// `true` when this outcome is the result of the `batchUnshield`
    /// ABI-missing fallback (spec.md §8 vector test 6).
    pub fallback: bool,
}

/// the result of a `/relay/simulate` dry-run: either the call would
/// succeed, or it reverted with the given decoded reason.
#[derive(Clone, Debug)]
pub enum SimulationOutcome {
    Ok,
    Reverted(ContractRevert),
}

pub struct Executor<C: ChainClient> {
    chain: Arc<C>,
    pools: Arc<PoolRegistry>,
    nonce: NonceManager,
    dedup: DedupRing,
    config: ExecutorConfig,
}

impl<C: ChainClient> Executor<C> {
    pub async fn new(chain: Arc<C>, pools: Arc<PoolRegistry>, config: ExecutorConfig) -> Result<Self> {
        let nonce = NonceManager::new(chain.as_ref(), config.relayer).await?;
        Ok(Self {
            chain,
            pools,
            nonce,
            dedup: DedupRing::new(),
            config,
        })
    }

    pub fn relayer(&self) -> Address {
        self.config.relayer
    }

    pub fn fee_policy(&self) -> &FeePolicy {
        &self.config.fee_policy
    }

    pub async fn native_balance(&self) -> Result<u128> {
        Ok(self.chain.get_balance(self.config.relayer).await?)
    }

    /// `true` once the relayer keypair holds enough native balance to pay
    /// gas — surfaced directly by `/relay/info` (spec.md §6).
    pub async fn is_available(&self) -> bool {
        matches!(self.native_balance().await, Ok(balance) if balance >= self.config.gas_floor)
    }

    /// runs gates 1-7, in the order spec.md §4.5 lists them, against
    /// `request` without signing or submitting anything. Used both by
    /// `/relay/simulate` and as the first half of `submit`.
    pub async fn validate(&self, request: &RelayRequest) -> Result<()> {
        let balance = self.native_balance().await?;
        policy::gate_availability(balance, self.config.gas_floor)?;

        policy::gate_shape(request)?;
        policy::gate_public_inputs(request)?;

        policy::gate_root_known(self.chain.as_ref(), request.pool(), &request.roots()).await?;

        let pool_handle = self
            .pools
            .get(request.pool())
            .ok_or_else(|| RelayError::UnknownPool(request.pool().to_hex()))?;
        {
            let pool = pool_handle.read().await;
            policy::gate_nullifier_unspent(&pool, &request.nullifiers())?;
        }

        policy::gate_fee_sanity(request, &self.config.fee_policy)?;
        policy::gate_token_support(self.chain.as_ref(), request.pool(), &request.non_native_tokens()).await?;

        Ok(())
    }

    /// validates, then dry-runs the dispatched call via `eth_call` without
    /// submitting anything.
    pub async fn simulate(&self, request: &RelayRequest) -> Result<SimulationOutcome> {
        self.validate(request).await?;
        let call_data = dispatch::encode(request);
        self.simulate_call(request.pool(), &call_data).await
    }

    async fn simulate_call(&self, pool: Address, call_data: &[u8]) -> Result<SimulationOutcome> {
        match self.chain.call(pool, call_data).await {
            Ok(_) => Ok(SimulationOutcome::Ok),
            Err(ChainClientError::Rpc { data, .. }) => {
                let revert_bytes = data.unwrap_or_default();
                match contract_errors::selector_from_revert_data(&revert_bytes) {
                    Some(selector) => Ok(SimulationOutcome::Reverted(contract_errors::decode_revert(
                        selector,
                        &revert_bytes,
                    ))),
                    // no selector at all: either a plain require() revert string
                    // or (for batchUnshield) the function simply isn't
                    // implemented on this pool contract.
                    None => Ok(SimulationOutcome::Reverted(ContractRevert {
                        selector: [0u8; 4],
                        name: None,
                        explanation: "reverted with no recognizable selector".into(),
                    })),
                }
            }
            Err(e) => Err(e.into()),
        }
    }

    /// validates, simulates, signs and submits `request`, waiting up to
    /// [`RECEIPT_WAIT_TIMEOUT`] for a receipt to recover output leaf
    /// indices. A `BatchUnshield` whose simulated `batchUnshield` call
    /// reverts with no recognizable selector is assumed to be missing from
    /// the pool contract's ABI and is retried as one `unshieldNative`/
    /// `unshieldToken` call per proof (SPEC_FULL.md §4.5 dispatch table).
    pub async fn submit(&self, request: RelayRequest) -> Result<SubmissionOutcome> {
        let key = request.dedup_key();
        if let Some(prior) = self.dedup.check(&key).await {
            tracing::info!(tx_hash = %prior, "duplicate submission within dedup window, returning prior hash");
            return Ok(SubmissionOutcome {
                tx_hash: prior,
                leaf_indices: vec![],
                receipt_seen: false,
                duplicate: true,
                individual_txs: vec![],
                fallback: false,
            });
        }

        self.validate(&request).await?;

        if let RelayRequest::BatchUnshield(batch) = &request {
            let call_data = dispatch::encode_batch_unshield(batch);
            if let SimulationOutcome::Reverted(revert) = self.simulate_call(batch.pool, &call_data).await? {
                if revert.name.is_none() {
                    tracing::warn!(
                        pool = %batch.pool,
                        "batchUnshield unavailable on pool contract, falling back to per-proof unshield"
                    );
                    return self.submit_batch_unshield_fallback(batch, key).await;
                }
                return Err(RelayError::SimulationReverted(revert));
            }
            return self.sign_and_send(batch.pool, call_data, key).await;
        }

        let call_data = dispatch::encode(&request);
        if let SimulationOutcome::Reverted(revert) = self.simulate_call(request.pool(), &call_data).await? {
            return Err(RelayError::SimulationReverted(revert));
        }
        self.sign_and_send(request.pool(), call_data, key).await
    }

    /// splits `batch` into one `unshieldNative`/`unshieldToken` call per
    /// proof (spec.md §4.5 "the executor transparently degrades to a
    /// sequence of individual... calls"). Every produced hash is kept, in
    /// submission order, with the first designated primary (spec.md "All
    /// produced transaction hashes are returned; the first is designated
    /// primary").
    async fn submit_batch_unshield_fallback(
        &self,
        batch: &BatchUnshieldRequest,
        key: crate::request::DedupKey,
    ) -> Result<SubmissionOutcome> {
        let calls = dispatch::encode_batch_unshield_fallback(batch);
        let mut leaf_indices = Vec::new();
        let mut individual_txs = Vec::new();
        let mut all_receipts_seen = true;

        for call_data in calls {
            if let SimulationOutcome::Reverted(revert) = self.simulate_call(batch.pool, &call_data).await? {
                return Err(RelayError::SimulationReverted(revert));
            }
            let outcome = self.sign_and_send(batch.pool, call_data, key.clone()).await?;
            leaf_indices.extend(outcome.leaf_indices);
            all_receipts_seen &= outcome.receipt_seen;
            individual_txs.push(outcome.tx_hash);
        }

        let tx_hash = *individual_txs
            .first()
            .ok_or_else(|| RelayError::SubmissionFailed("empty batch".into()))?;
        Ok(SubmissionOutcome {
            tx_hash,
            leaf_indices,
            receipt_seen: all_receipts_seen,
            duplicate: false,
            individual_txs,
            fallback: true,
        })
    }

    async fn sign_and_send(
        &self,
        pool: Address,
        call_data: Vec<u8>,
        key: crate::request::DedupKey,
    ) -> Result<SubmissionOutcome> {
        let nonce = self.nonce.next_nonce();
        let gas_price = match self.chain.gas_price().await {
            Ok(p) => p,
            Err(e) => {
                self.nonce.release(nonce);
                return Err(e.into());
            }
        };

        let tx = signer::UnsignedTx {
            nonce,
            gas_price,
            gas_limit: self.config.gas_limit,
            to: pool,
            data: call_data,
            chain_id: self.config.chain_id,
        };
        let raw = match signer::sign(&tx, &self.config.private_key) {
            Ok(raw) => raw,
            Err(e) => {
                self.nonce.release(nonce);
                return Err(e);
            }
        };

        let tx_hash = match self.chain.send_raw_transaction(&raw).await {
            Ok(hash) => hash,
            Err(ChainClientError::Rpc { message, .. }) if message.contains("replacement transaction underpriced") => {
                // a concurrent resubmission of the same nonce already landed;
                // the dedup ring, not a fabricated error, is the source of
                // truth for what the caller should see.
                if let Some(prior) = self.dedup.check(&key).await {
                    return Ok(SubmissionOutcome {
                        tx_hash: prior,
                        leaf_indices: vec![],
                        receipt_seen: false,
                        duplicate: true,
                        individual_txs: vec![],
                        fallback: false,
                    });
                }
                self.nonce.release(nonce);
                return Err(RelayError::SubmissionFailed(
                    "replacement transaction underpriced and no prior submission on record".into(),
                ));
            }
            Err(e) => {
                self.nonce.release(nonce);
                return Err(e.into());
            }
        };

        self.dedup.record(key, tx_hash).await;

        let (leaf_indices, receipt_seen) = self.await_leaf_indices(pool, tx_hash).await;
        Ok(SubmissionOutcome {
            tx_hash,
            leaf_indices,
            receipt_seen,
            duplicate: false,
            individual_txs: vec![],
            fallback: false,
        })
    }

    /// polls for the receipt up to [`RECEIPT_WAIT_TIMEOUT`]; a timeout here
    /// cancels only the wait, never the submission itself.
    async fn await_leaf_indices(&self, pool: Address, tx_hash: TxHash) -> (Vec<u64>, bool) {
        let deadline = tokio::time::Instant::now() + RECEIPT_WAIT_TIMEOUT;
        loop {
            match self.chain.get_transaction_receipt(tx_hash).await {
                Ok(Some(receipt)) => {
                    return (leaf_indices_from_receipt(pool, &receipt), true);
                }
                Ok(None) => {}
                Err(e) => {
                    tracing::warn!(error = %e, %tx_hash, "error polling for receipt");
                }
            }
            if tokio::time::Instant::now() >= deadline {
                return (vec![], false);
            }
            tokio::time::sleep(RECEIPT_POLL_INTERVAL).await;
        }
    }
}

/// scans a receipt's logs for `LeafInserted(bytes32 commitment, uint256
/// leafIndex, bytes32 root)` entries emitted by `pool`, returning the leaf
/// indices in log order.
fn leaf_indices_from_receipt(pool: Address, receipt: &chain_client::TransactionReceipt) -> Vec<u64> {
    let topic0 = chain_client::topics::leaf_inserted();
    receipt
        .logs
        .iter()
        .filter(|log| log.address == pool && log.topics.first() == Some(&topic0))
        .filter_map(|log| log.data.get(32..64))
        .map(|word| u64::from_be_bytes(word[24..32].try_into().expect("8 bytes")))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chain_client::{BlockHeader, LogEntry, LogFilter, TransactionReceipt};
    use field_hash::Fr;
    use std::sync::Mutex;

    struct FakeChain {
        balance: u128,
        gas_price: u128,
        call_result: Mutex<Option<chain_client::Result<Vec<u8>>>>,
        send_result: Mutex<Option<chain_client::Result<TxHash>>>,
        receipt: Mutex<Option<TransactionReceipt>>,
    }

    impl Default for FakeChain {
        fn default() -> Self {
            Self {
                balance: u128::MAX,
                gas_price: 1,
                call_result: Mutex::new(Some(Ok(vec![1]))),
                send_result: Mutex::new(Some(Ok(TxHash([9u8; 32])))),
                receipt: Mutex::new(None),
            }
        }
    }

    #[async_trait::async_trait]
    impl ChainClient for FakeChain {
        async fn get_block_number(&self) -> chain_client::Result<u64> {
            Ok(0)
        }
        async fn get_logs(&self, _filter: &LogFilter) -> chain_client::Result<Vec<LogEntry>> {
            Ok(vec![])
        }
        async fn call(&self, _to: Address, _data: &[u8]) -> chain_client::Result<Vec<u8>> {
            self.call_result.lock().unwrap().take().unwrap_or(Ok(vec![1]))
        }
        async fn send_raw_transaction(&self, _raw: &[u8]) -> chain_client::Result<TxHash> {
            self.send_result.lock().unwrap().take().unwrap_or(Ok(TxHash([9u8; 32])))
        }
        async fn get_transaction_receipt(&self, _hash: TxHash) -> chain_client::Result<Option<TransactionReceipt>> {
            Ok(self.receipt.lock().unwrap().clone())
        }
        async fn get_transaction_count(&self, _address: Address) -> chain_client::Result<u64> {
            Ok(0)
        }
        async fn gas_price(&self) -> chain_client::Result<u128> {
            Ok(self.gas_price)
        }
        async fn get_block_header(&self, _number: u64) -> chain_client::Result<Option<BlockHeader>> {
            Ok(None)
        }
        async fn get_balance(&self, _address: Address) -> chain_client::Result<u128> {
            Ok(self.balance)
        }
    }

    fn config() -> ExecutorConfig {
        ExecutorConfig {
            relayer: Address([3u8; 20]),
            private_key: [7u8; 32],
            chain_id: 1,
            gas_floor: 1,
            gas_limit: DEFAULT_GAS_LIMIT,
            fee_policy: FeePolicy::default(),
        }
    }

    fn unshield_request(pool: Address) -> RelayRequest {
        RelayRequest::Unshield(UnshieldRequest {
            pool,
            proof: Proof([Fr::zero(); 8]),
            public_inputs: None,
            root: Fr::from_u64(1),
            nullifier_hash: Fr::from_u64(2),
            recipient: Address([2u8; 20]),
            token: Address::NATIVE,
            amount: 1000,
            change_commitment: Fr::zero(),
            relayer: Address([3u8; 20]),
            fee: Some(5),
        })
    }

    async fn executor_with_pool<C: ChainClient>(chain: C) -> (Executor<C>, Address) {
        let pool_addr = Address([1u8; 20]);
        let mut registry = PoolRegistry::new();
        registry.register(pool_addr, Default::default());
        let executor = Executor::new(Arc::new(chain), Arc::new(registry), config()).await.unwrap();
        (executor, pool_addr)
    }

    #[tokio::test]
    async fn validate_rejects_unregistered_pool() {
        let (executor, _) = executor_with_pool(FakeChain::default()).await;
        let request = unshield_request(Address([99u8; 20]));
        assert!(matches!(executor.validate(&request).await, Err(RelayError::UnknownPool(_))));
    }

    #[tokio::test]
    async fn submit_happy_path_returns_tx_hash() {
        let (executor, pool) = executor_with_pool(FakeChain::default()).await;
        let request = unshield_request(pool);
        let outcome = executor.submit(request).await.unwrap();
        assert_eq!(outcome.tx_hash, TxHash([9u8; 32]));
        assert!(!outcome.receipt_seen);
    }

    #[tokio::test]
    async fn submit_is_deduplicated_within_window() {
        let (executor, pool) = executor_with_pool(FakeChain::default()).await;
        let request = unshield_request(pool);
        let first = executor.submit(request.clone()).await.unwrap();
        let second = executor.submit(request).await.unwrap();
        assert_eq!(first.tx_hash, second.tx_hash);
        assert!(!first.duplicate);
        assert!(second.duplicate);
    }

    #[tokio::test]
    async fn simulate_reports_known_revert() {
        let chain = FakeChain::default();
        *chain.call_result.lock().unwrap() = Some(Err(ChainClientError::Rpc {
            code: 3,
            message: "execution reverted".into(),
            data: Some({
                let mut v = chain_client::abi::selector("NullifierAlreadySpent(bytes32)").to_vec();
                v.extend_from_slice(&[0u8; 32]);
                v
            }),
        }));
        let (executor, pool) = executor_with_pool(chain).await;
        let request = unshield_request(pool);
        match executor.simulate(&request).await.unwrap() {
            SimulationOutcome::Reverted(revert) => assert_eq!(revert.name, Some("NullifierAlreadySpent")),
            SimulationOutcome::Ok => panic!("expected a revert"),
        }
    }

    /// a chain whose `call`/`send_raw_transaction` results are queued in
    /// order, for scenarios that need more than one distinct `eth_call`
    /// response in a single `submit` (root checks, then the batch dispatch
    /// revert, then each per-proof fallback call).
    struct ScriptedChain {
        balance: u128,
        gas_price: u128,
        call_script: Mutex<std::collections::VecDeque<chain_client::Result<Vec<u8>>>>,
        send_script: Mutex<std::collections::VecDeque<chain_client::Result<TxHash>>>,
        receipt: Mutex<Option<TransactionReceipt>>,
    }

    #[async_trait::async_trait]
    impl ChainClient for ScriptedChain {
        async fn get_block_number(&self) -> chain_client::Result<u64> {
            Ok(0)
        }
        async fn get_logs(&self, _filter: &LogFilter) -> chain_client::Result<Vec<LogEntry>> {
            Ok(vec![])
        }
        async fn call(&self, _to: Address, _data: &[u8]) -> chain_client::Result<Vec<u8>> {
            self.call_script.lock().unwrap().pop_front().unwrap_or(Ok(vec![1]))
        }
        async fn send_raw_transaction(&self, _raw: &[u8]) -> chain_client::Result<TxHash> {
            self.send_script.lock().unwrap().pop_front().unwrap_or(Ok(TxHash([9u8; 32])))
        }
        async fn get_transaction_receipt(&self, _hash: TxHash) -> chain_client::Result<Option<TransactionReceipt>> {
            Ok(self.receipt.lock().unwrap().clone())
        }
        async fn get_transaction_count(&self, _address: Address) -> chain_client::Result<u64> {
            Ok(0)
        }
        async fn gas_price(&self) -> chain_client::Result<u128> {
            Ok(self.gas_price)
        }
        async fn get_block_header(&self, _number: u64) -> chain_client::Result<Option<BlockHeader>> {
            Ok(None)
        }
        async fn get_balance(&self, _address: Address) -> chain_client::Result<u128> {
            Ok(self.balance)
        }
    }

    fn batch_unshield_request(pool: Address) -> RelayRequest {
        RelayRequest::BatchUnshield(BatchUnshieldRequest {
            pool,
            proofs: vec![Proof([Fr::zero(); 8]), Proof([Fr::zero(); 8])],
            public_inputs: vec![None, None],
            roots: vec![Fr::from_u64(1), Fr::from_u64(2)],
            nullifiers: vec![Fr::from_u64(3), Fr::from_u64(4)],
            recipient: Address([2u8; 20]),
            token: Address::NATIVE,
            amounts: vec![100, 200],
            change_commitments: vec![Fr::zero(), Fr::zero()],
            relayer: Address([3u8; 20]),
            total_fee: Some(0),
        })
    }

    #[tokio::test]
    async fn submit_falls_back_to_individual_unshields_when_batch_unavailable() {
        let mut calls = std::collections::VecDeque::new();
        calls.push_back(Ok(vec![1])); // gate_root_known, root 1
        calls.push_back(Ok(vec![1])); // gate_root_known, root 2
        calls.push_back(Err(ChainClientError::Rpc {
            code: 3,
            message: "execution reverted".into(),
            data: None,
        })); // simulated batchUnshield dispatch: no recognizable selector
        calls.push_back(Ok(vec![1])); // per-proof simulate, proof 1
        calls.push_back(Ok(vec![1])); // per-proof simulate, proof 2

        let mut sends = std::collections::VecDeque::new();
        sends.push_back(Ok(TxHash([10u8; 32])));
        sends.push_back(Ok(TxHash([11u8; 32])));

        let chain = ScriptedChain {
            balance: u128::MAX,
            gas_price: 1,
            call_script: Mutex::new(calls),
            send_script: Mutex::new(sends),
            receipt: Mutex::new(Some(TransactionReceipt {
                success: true,
                block_number: 1,
                logs: vec![],
            })),
        };

        let (executor, pool) = executor_with_pool(chain).await;
        let request = batch_unshield_request(pool);
        let outcome = executor.submit(request).await.unwrap();

        assert!(outcome.fallback);
        assert_eq!(outcome.individual_txs, vec![TxHash([10u8; 32]), TxHash([11u8; 32])]);
        assert_eq!(outcome.tx_hash, TxHash([10u8; 32]));
        assert!(!outcome.duplicate);
    }

    #[test]
    fn leaf_indices_scan_filters_by_pool_and_topic() {
        let pool = Address([1u8; 20]);
        let other_pool = Address([2u8; 20]);
        let topic0 = chain_client::topics::leaf_inserted();
        let mut data = vec![0u8; 96];
        data[32..64].copy_from_slice(&{
            let mut w = [0u8; 32];
            w[24..].copy_from_slice(&7u64.to_be_bytes());
            w
        });
        let matching = LogEntry {
            address: pool,
            topics: vec![topic0],
            data,
            block_number: 1,
            log_index: 0,
            transaction_hash: TxHash([0u8; 32]),
            removed: false,
        };
        let mut ignored = matching.clone();
        ignored.address = other_pool;

        let receipt = TransactionReceipt {
            success: true,
            block_number: 1,
            logs: vec![matching, ignored],
        };
        assert_eq!(leaf_indices_from_receipt(pool, &receipt), vec![7]);
    }
}

//! serial nonce assignment for the relayer account (SPEC_FULL.md §5
//! "Shared resources" — nonce management is serialized per process).

use std::sync::atomic::{AtomicU64, Ordering};

use chain_client::rpc::ChainClient;
use chain_client::Address;

use crate::error::Result;

/// seeded once from `eth_getTransactionCount(pending)` at startup, then
/// incremented locally for every outbound submission — no further RPC
/// round-trips are needed to assign a nonce.
pub struct NonceManager {
    next: AtomicU64,
}

impl NonceManager {
    pub async fn new<C: ChainClient>(chain: &C, relayer: Address) -> Result<Self> {
        let seed = chain.get_transaction_count(relayer).await?;
        Ok(Self {
            next: AtomicU64::new(seed),
        })
    }

    pub fn from_seed(seed: u64) -> Self {
        Self {
            next: AtomicU64::new(seed),
        }
    }

    /// allocates the next nonce; submission order and allocation order are
    /// the same thing, there is no separate reservation/commit step.
    pub fn next_nonce(&self) -> u64 {
        self.next.fetch_add(1, Ordering::SeqCst)
    }

    /// resets the counter after a submission failure that never reached
    /// the mempool, so the allocated nonce isn't burned.
    pub fn release(&self, nonce: u64) {
        let _ = self
            .next
            .compare_exchange(nonce + 1, nonce, Ordering::SeqCst, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allocates_sequentially() {
        let mgr = NonceManager::from_seed(5);
        assert_eq!(mgr.next_nonce(), 5);
        assert_eq!(mgr.next_nonce(), 6);
        assert_eq!(mgr.next_nonce(), 7);
    }

    #[test]
    fn release_only_rewinds_the_immediate_allocation() {
        let mgr = NonceManager::from_seed(5);
        let n = mgr.next_nonce();
        mgr.next_nonce(); // a concurrent caller already took 6
        mgr.release(n);
        // 6 was already handed out, so the counter must not rewind past it
        assert_eq!(mgr.next_nonce(), 7);
    }
}

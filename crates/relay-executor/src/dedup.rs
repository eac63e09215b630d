//! a 30-second in-memory dedup ring keyed by a request's canonicalized
//! content (SPEC_FULL.md §4.5 "Dedup"). Guards against a client retrying
//! a submission it believes failed, and doubles as the recovery path for
//! a "replacement transaction underpriced" resubmission.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use tokio::sync::Mutex;

use chain_client::TxHash;

use crate::request::DedupKey;

pub const DEDUP_WINDOW: Duration = Duration::from_secs(30);

struct Entry {
    tx_hash: TxHash,
    submitted_at: Instant,
}

pub struct DedupRing {
    window: Duration,
    entries: Mutex<HashMap<DedupKey, Entry>>,
}

impl DedupRing {
    pub fn new() -> Self {
        Self::with_window(DEDUP_WINDOW)
    }

    pub fn with_window(window: Duration) -> Self {
        Self {
            window,
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// the prior tx hash if `key` was submitted within the window.
    pub async fn check(&self, key: &DedupKey) -> Option<TxHash> {
        let mut entries = self.entries.lock().await;
        self.sweep(&mut entries);
        entries.get(key).map(|e| e.tx_hash)
    }

    pub async fn record(&self, key: DedupKey, tx_hash: TxHash) {
        let mut entries = self.entries.lock().await;
        self.sweep(&mut entries);
        entries.insert(
            key,
            Entry {
                tx_hash,
                submitted_at: Instant::now(),
            },
        );
    }

    fn sweep(&self, entries: &mut HashMap<DedupKey, Entry>) {
        let window = self.window;
        entries.retain(|_, e| e.submitted_at.elapsed() < window);
    }
}

impl Default for DedupRing {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::proof::Proof;
    use crate::request::{RelayRequest, UnshieldRequest};
    use chain_client::Address;
    use field_hash::Fr;

    fn request() -> RelayRequest {
        RelayRequest::Unshield(UnshieldRequest {
            pool: Address([1u8; 20]),
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

    #[tokio::test]
    async fn repeat_within_window_returns_prior_hash() {
        let ring = DedupRing::new();
        let key = request().dedup_key();
        assert!(ring.check(&key).await.is_none());

        let tx = TxHash([7u8; 32]);
        ring.record(key.clone(), tx).await;
        assert_eq!(ring.check(&key).await, Some(tx));
    }

    #[tokio::test]
    async fn expired_entry_is_swept() {
        let ring = DedupRing::with_window(Duration::from_millis(10));
        let key = request().dedup_key();
        ring.record(key.clone(), TxHash([7u8; 32])).await;
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert!(ring.check(&key).await.is_none());
    }
}

//! log topic0 hashes for the four pool events plus `LeafInserted`, computed
//! once from the canonical event signatures in spec.md §6. A deviation here
//! would silently drop every event of that kind from catch-up and live
//! indexing, so these are derived from the signature string rather than
//! hand-copied hex literals.

use std::sync::OnceLock;

use sha3::{Digest, Keccak256};

fn topic0(signature: &str) -> [u8; 32] {
    let mut hasher = Keccak256::new();
    hasher.update(signature.as_bytes());
    hasher.finalize().into()
}

macro_rules! topic_const {
    ($name:ident, $sig:expr) => {
        pub fn $name() -> [u8; 32] {
            static TOPIC: OnceLock<[u8; 32]> = OnceLock::new();
            *TOPIC.get_or_init(|| topic0($sig))
        }
    };
}

topic_const!(
    shield,
    "Shield(bytes32,uint256,address,uint256,uint256)"
);
topic_const!(
    transfer,
    "Transfer(bytes32,bytes32,bytes32,uint256,uint256,bytes,bytes,uint256)"
);
topic_const!(
    unshield,
    "Unshield(bytes32,address,address,uint256,address,uint256,uint256)"
);
topic_const!(
    swap,
    "Swap(bytes32,bytes32,address,address,uint256,uint256,bytes,uint256)"
);
topic_const!(
    leaf_inserted,
    "LeafInserted(bytes32,uint256,bytes32)"
);

/// the four topics catch-up and live mode both filter on, in the order the
/// indexer merges and sorts decoded logs.
pub fn pool_event_topics() -> [[u8; 32]; 4] {
    [shield(), transfer(), unshield(), swap()]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn topics_are_distinct() {
        let mut all = pool_event_topics().to_vec();
        all.push(leaf_inserted());
        for i in 0..all.len() {
            for j in (i + 1)..all.len() {
                assert_ne!(all[i], all[j]);
            }
        }
    }

    #[test]
    fn topic_computation_is_deterministic() {
        assert_eq!(shield(), shield());
    }
}

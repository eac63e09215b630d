//! durable catch-up progress, following `zidecar::storage::Storage`'s
//! habit of a `sled::Db` keyed with a single-byte prefix per concern. Only
//! `last_sync_block` survives a restart — the accumulator, nullifier set
//! and memo log stay in-memory per spec.md §3 "Ownership" and are rebuilt
//! by replaying catch-up from the persisted height.

use chain_client::Address;

use crate::error::{IndexerError, Result};

const PREFIX_LAST_SYNC: u8 = b's';

fn key(prefix: u8, address: Address) -> Vec<u8> {
    let mut k = Vec::with_capacity(21);
    k.push(prefix);
    k.extend_from_slice(&address.0);
    k
}

pub struct SyncCache {
    db: sled::Db,
}

impl SyncCache {
    pub fn open(path: &str) -> Result<Self> {
        let db = sled::open(path).map_err(|e| IndexerError::Storage(e.to_string()))?;
        Ok(Self { db })
    }

    /// in-memory cache, useful for tests and for a process that opts out
    /// of durable catch-up progress.
    pub fn in_memory() -> Result<Self> {
        let db = sled::Config::new()
            .temporary(true)
            .open()
            .map_err(|e| IndexerError::Storage(e.to_string()))?;
        Ok(Self { db })
    }

    pub fn get_last_sync_block(&self, pool: Address) -> Result<Option<u64>> {
        match self.db.get(key(PREFIX_LAST_SYNC, pool)) {
            Ok(Some(bytes)) if bytes.len() == 8 => {
                Ok(Some(u64::from_le_bytes(bytes.as_ref().try_into().expect("8 bytes"))))
            }
            Ok(_) => Ok(None),
            Err(e) => Err(IndexerError::Storage(e.to_string())),
        }
    }

    pub fn set_last_sync_block(&self, pool: Address, block: u64) -> Result<()> {
        self.db
            .insert(key(PREFIX_LAST_SYNC, pool), &block.to_le_bytes())
            .map_err(|e| IndexerError::Storage(e.to_string()))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrips_last_sync_block() {
        let cache = SyncCache::in_memory().unwrap();
        let pool = Address([1u8; 20]);
        assert_eq!(cache.get_last_sync_block(pool).unwrap(), None);
        cache.set_last_sync_block(pool, 12345).unwrap();
        assert_eq!(cache.get_last_sync_block(pool).unwrap(), Some(12345));
    }

    #[test]
    fn pools_are_independent() {
        let cache = SyncCache::in_memory().unwrap();
        let a = Address([1u8; 20]);
        let b = Address([2u8; 20]);
        cache.set_last_sync_block(a, 10).unwrap();
        cache.set_last_sync_block(b, 20).unwrap();
        assert_eq!(cache.get_last_sync_block(a).unwrap(), Some(10));
        assert_eq!(cache.get_last_sync_block(b).unwrap(), Some(20));
    }
}

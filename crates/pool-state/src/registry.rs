//! per-pool writer exclusivity (spec.md §5): a `tokio::sync::RwLock` per
//! pool lets one indexer task hold the write lock while HTTP reads take
//! concurrent read locks. Cross-pool operations are independent since
//! each pool gets its own lock.

use std::collections::HashMap;
use std::collections::HashSet;
use std::sync::Arc;

use chain_client::Address;
use tokio::sync::RwLock;

use crate::Pool;

#[derive(Default)]
pub struct PoolRegistry {
    pools: HashMap<Address, Arc<RwLock<Pool>>>,
}

impl PoolRegistry {
    pub fn new() -> Self {
        Self {
            pools: HashMap::new(),
        }
    }

    pub fn register(&mut self, address: Address, supported_tokens: HashSet<Address>) -> Arc<RwLock<Pool>> {
        self.pools
            .entry(address)
            .or_insert_with(|| Arc::new(RwLock::new(Pool::new(address, supported_tokens))))
            .clone()
    }

    pub fn get(&self, address: Address) -> Option<Arc<RwLock<Pool>>> {
        self.pools.get(&address).cloned()
    }

    pub fn addresses(&self) -> impl Iterator<Item = &Address> {
        self.pools.keys()
    }
}

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PoolError {
    #[error("nullifier already spent")]
    NullifierAlreadySpent,

    #[error("commitment produced leafIndex {actual}, event declared {expected} — pool is now out of sync")]
    LeafIndexMismatch { expected: u64, actual: u64 },

    #[error("pool is out of sync: {0}")]
    OutOfSync(String),

    #[error(transparent)]
    Merkle(#[from] merkle_accum::MerkleError),
}

pub type Result<T> = std::result::Result<T, PoolError>;

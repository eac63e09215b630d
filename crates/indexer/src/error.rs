use thiserror::Error;

#[derive(Error, Debug)]
pub enum IndexerError {
    #[error(transparent)]
    Chain(#[from] chain_client::ChainClientError),

    #[error(transparent)]
    Pool(#[from] pool_state::PoolError),

    #[error("malformed log for event {event}: {reason}")]
    MalformedLog { event: &'static str, reason: String },

    #[error("log carries an unrecognized topic0 {0}")]
    UnknownTopic(String),

    #[error("pool {0} is not registered")]
    UnknownPool(String),

    #[error("persistence error: {0}")]
    Storage(String),

    #[error("reorg deeper than the journaled window ({0} blocks); pool quarantined")]
    UnrecoverableReorg(usize),
}

pub type Result<T> = std::result::Result<T, IndexerError>;

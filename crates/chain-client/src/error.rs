use thiserror::Error;

#[derive(Error, Debug)]
pub enum ChainClientError {
    #[error("rpc transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("rpc error {code}: {message}")]
    Rpc {
        code: i64,
        message: String,
        /// revert payload carried in the node's `error.data` field, when
        /// present (most nodes echo the revert bytes here for `eth_call`).
        data: Option<Vec<u8>>,
    },

    #[error("malformed rpc response: {0}")]
    Decode(String),

    #[error("request timed out after {0} retries")]
    Timeout(u32),
}

pub type Result<T> = std::result::Result<T, ChainClientError>;

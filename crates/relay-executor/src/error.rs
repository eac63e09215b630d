//! `RelayError` is the single taxonomy the seven policy gates, dispatch and
//! submission all report through (SPEC_FULL.md §7). `api::error::ApiError`
//! maps every variant onto one of the closed HTTP error codes.

use chain_client::Address;
use field_hash::Fr;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum RelayError {
    #[error("relayer unavailable: {0}")]
    RelayerUnavailable(String),

    #[error("proof must be exactly 8 field elements, got {0}")]
    ProofShape(usize),

    #[error("memo exceeds the 1024-byte limit ({0} bytes)")]
    MemoTooLarge(usize),

    #[error("batch size {0} outside the allowed range 1..=100")]
    BatchSizeOutOfRange(usize),

    #[error("per-proof arrays have mismatched lengths: {0}")]
    ArrayLengthMismatch(String),

    #[error("amount must be greater than zero")]
    InvalidAmount,

    #[error("a fee is required; implicit/default fees are not accepted")]
    MissingFee,

    #[error("fee {fee} outside the allowed range [{floor}, {ceiling}]")]
    FeeOutOfRange { fee: u128, floor: u128, ceiling: u128 },

    #[error("publicInputs[{index}] does not match the corresponding request field")]
    PublicInputsMismatch { index: usize },

    #[error("publicInputs has {got} elements, expected {expected}")]
    PublicInputsShape { got: usize, expected: usize },

    #[error("root {0} is not known to the pool")]
    UnknownRoot(Fr),

    #[error("nullifier {0} has already been spent")]
    NullifierAlreadySpent(Fr),

    #[error("token {0} is not supported by this pool")]
    UnsupportedToken(Address),

    #[error("pool {0} is not registered with this relayer")]
    UnknownPool(String),

    #[error(transparent)]
    Chain(#[from] chain_client::ChainClientError),

    #[error(transparent)]
    Pool(#[from] pool_state::PoolError),

    #[error("the chosen call reverted: {0}")]
    SimulationReverted(ContractRevert),

    #[error("submission failed: {0}")]
    SubmissionFailed(String),

    #[error("signing failed: {0}")]
    Signing(String),
}

/// a decoded (or undecoded) revert from a simulation or a failed submission.
#[derive(Debug, Clone)]
pub struct ContractRevert {
    pub selector: [u8; 4],
    pub name: Option<&'static str>,
    pub explanation: String,
}

impl std::fmt::Display for ContractRevert {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.name {
            Some(name) => write!(f, "{name}: {}", self.explanation),
            None => write!(f, "unrecognized selector 0x{}: {}", hex::encode(self.selector), self.explanation),
        }
    }
}

pub type Result<T> = std::result::Result<T, RelayError>;

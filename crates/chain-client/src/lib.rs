//! the EVM JSON-RPC boundary. Everything the indexer and relay executor
//! know about talking to a node lives here: log fetching, view/simulation
//! calls, transaction submission, and the ABI encoding those calls need.
//! Treat the chain as an oracle for state — this crate never interprets
//! contract semantics, only shapes bytes onto and off of the wire.

pub mod abi;
pub mod error;
pub mod rpc;
pub mod topics;
pub mod types;

pub use error::{ChainClientError, Result};
pub use rpc::{BlockHeader, EvmRpcClient, LogEntry, LogFilter, TransactionReceipt};
pub use types::{Address, TxHash};

//! C4: event-driven indexer. Replays `Shield`/`Transfer`/`Unshield`/`Swap`
//! logs into per-pool state, in two modes — bounded-range catch-up and
//! one-block-at-a-time live polling with a reorg guard — both funneled
//! through the same decode-then-apply path (spec.md §4.4, §9).

pub mod cache;
pub mod decode;
pub mod engine;
pub mod error;
mod reorg;

pub use cache::SyncCache;
pub use decode::decode_log;
pub use engine::{IndexerConfig, IndexerEngine, MAX_LOG_RANGE};
pub use error::{IndexerError, Result};

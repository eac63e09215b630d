//! live-mode reorg guard: a bounded ring of `(height, hash, pool snapshot
//! taken right after that height's events were applied)`. On a
//! parent-hash mismatch the guard walks the ring backward for the last
//! block whose hash the new block's ancestry actually agrees with and
//! resumes from its already-applied snapshot, discarding every entry
//! after it — real rollback, realized as "replace the whole `Pool`"
//! rather than "undo individual mutations", since the accumulator's
//! append-only invariant (I2/I3) rules out un-inserting a leaf in place
//! (spec.md §9).

use std::collections::VecDeque;

use pool_state::Pool;

use crate::error::{IndexerError, Result};

struct JournalEntry {
    height: u64,
    hash: [u8; 32],
    /// pool state immediately *after* this block's events were applied.
    pool_after: Pool,
}

/// bounded per-pool journal of recent blocks, used only in live mode.
/// Catch-up mode never journals: it only ever advances to a finalized
/// tip (`head - reorg_depth`), so there is nothing for it to roll back.
pub struct BlockJournal {
    depth: usize,
    entries: VecDeque<JournalEntry>,
}

impl BlockJournal {
    pub fn new(depth: usize) -> Self {
        Self {
            depth: depth.max(1),
            entries: VecDeque::with_capacity(depth + 1),
        }
    }

    /// record the pool snapshot taken right after applying `height`'s
    /// events, evicting the oldest entry once the journal exceeds its
    /// configured depth.
    pub fn record(&mut self, height: u64, hash: [u8; 32], pool_after: Pool) {
        if self.entries.len() == self.depth {
            self.entries.pop_front();
        }
        self.entries.push_back(JournalEntry {
            height,
            hash,
            pool_after,
        });
    }

    pub fn latest_hash(&self) -> Option<[u8; 32]> {
        self.entries.back().map(|e| e.hash)
    }

    /// does `parent_hash` match the journal's tip? `true` also when the
    /// journal is empty (nothing to contradict yet).
    pub fn extends_tip(&self, parent_hash: [u8; 32]) -> bool {
        match self.latest_hash() {
            Some(tip) => tip == parent_hash,
            None => true,
        }
    }

    /// roll back to the last entry whose hash the new block's claimed
    /// parent agrees with, returning that entry's post-apply pool
    /// snapshot and the height to resume fetching from (`entry.height +
    /// 1`). `Err(UnrecoverableReorg)` if no journaled ancestor matches —
    /// the divergence point lies outside the journaled window.
    pub fn roll_back(&mut self, new_parent_hash: [u8; 32]) -> Result<(Pool, u64)> {
        while let Some(entry) = self.entries.pop_back() {
            if entry.hash == new_parent_hash {
                let resume_height = entry.height + 1;
                let pool = entry.pool_after.clone();
                self.entries.push_back(entry);
                return Ok((pool, resume_height));
            }
        }
        Err(IndexerError::UnrecoverableReorg(self.depth))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chain_client::Address;
    use std::collections::HashSet;

    fn pool() -> Pool {
        Pool::new(Address([1u8; 20]), HashSet::new())
    }

    #[test]
    fn extends_tip_is_true_when_empty() {
        let journal = BlockJournal::new(3);
        assert!(journal.extends_tip([0u8; 32]));
    }

    #[test]
    fn detects_matching_tip() {
        let mut journal = BlockJournal::new(3);
        journal.record(10, [1u8; 32], pool());
        assert!(journal.extends_tip([1u8; 32]));
        assert!(!journal.extends_tip([9u8; 32]));
    }

    #[test]
    fn rolls_back_to_matching_ancestor() {
        let mut journal = BlockJournal::new(5);
        journal.record(10, [10u8; 32], pool());
        journal.record(11, [11u8; 32], pool());
        journal.record(12, [12u8; 32], pool());

        // a competing block 12' whose parent is actually block 11.
        let (_, resume_height) = journal.roll_back([11u8; 32]).unwrap();
        assert_eq!(resume_height, 12);
    }

    #[test]
    fn reorg_deeper_than_window_is_unrecoverable() {
        let mut journal = BlockJournal::new(2);
        journal.record(10, [10u8; 32], pool());
        journal.record(11, [11u8; 32], pool());
        assert!(matches!(
            journal.roll_back([0xffu8; 32]),
            Err(IndexerError::UnrecoverableReorg(2))
        ));
    }
}

//! Transaction index (spec §4.E): the global ordered map from txid to
//! commit descriptor, merged from per-file tables once generation bounds
//! are fixed. Readers (the record iterator, §4.B) consult it concurrently
//! with the single leader's writes, hence the reader-writer lock.

use std::collections::BTreeMap;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::error::ReplayError;
use crate::gentree::ReplayGeneration;
use crate::record::CommitDescriptor;
use crate::validate::ValidatedFile;
use crate::Result;

/// Merge every per-file commit table into the global index, resolving each
/// descriptor's target generation from the consolidated seqno intervals
/// (spec §4.E). Run once, single-threaded, by the elected leader, after
/// consolidation has fixed generation bounds.
pub fn merge_commit_tables(
    files: &[ValidatedFile],
    gens: &[Arc<ReplayGeneration>],
    index: &TxIndex,
) -> Result<()> {
    for file in files {
        for desc in file.commit_table.values() {
            let mut desc = *desc;
            if let Some(target) = gens.iter().find(|g| g.contains_seqno(desc.commit_seqno)) {
                desc.gen = target.gen;
            }
            index.insert(desc)?;
        }
    }
    Ok(())
}

pub struct TxIndex {
    inner: RwLock<BTreeMap<u64, CommitDescriptor>>,
}

impl TxIndex {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(BTreeMap::new()),
        }
    }

    /// Insert a commit descriptor, fatal on a txid collision (spec: "Duplicates
    /// across files (same txid observed twice) are fatal").
    pub fn insert(&self, desc: CommitDescriptor) -> Result<()> {
        let mut guard = self.inner.write();
        if guard.insert(desc.txid, desc).is_some() {
            return Err(ReplayError::DuplicateTxid { txid: desc.txid });
        }
        Ok(())
    }

    pub fn get(&self, txid: u64) -> Option<CommitDescriptor> {
        self.inner.read().get(&txid).copied()
    }

    pub fn len(&self) -> usize {
        self.inner.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for TxIndex {
    fn default() -> Self {
        Self::new()
    }
}

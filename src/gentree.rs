//! Replay ordering tree (spec §4.F): a per-generation ordered map keyed by
//! rid, ensuring replay visits records in their original issuance order,
//! plus the apply phase that walks it into the ingest layer.

use std::collections::BTreeMap;

use parking_lot::Mutex;

use crate::error::ReplayError;
use crate::ingest::IngestSink;
use crate::record::{MinMaxInfo, Op, Record};
use crate::Result;

/// Aggregates all records belonging to a single ingest generation (spec
/// §3 "Replay generation").
pub struct ReplayGeneration {
    pub gen: u64,
    pub info: MinMaxInfo,
    tree: Mutex<BTreeMap<u64, Record>>,
    applied_count: Mutex<u64>,
    max_seqno_applied: Mutex<u64>,
}

impl ReplayGeneration {
    pub fn new(gen: u64, info: MinMaxInfo) -> Self {
        Self {
            gen,
            info,
            tree: Mutex::new(BTreeMap::new()),
            applied_count: Mutex::new(0),
            max_seqno_applied: Mutex::new(0),
        }
    }

    /// `true` if `seqno` falls within this generation's consolidated
    /// interval (spec §4.E: used to resolve a commit descriptor's target
    /// generation).
    pub fn contains_seqno(&self, seqno: u64) -> bool {
        seqno >= self.info.min_seqno && seqno <= self.info.max_seqno
    }

    /// Insert a record keyed by rid. Fatal on a duplicate rid within the
    /// same generation (spec: "indicates torn duplicate framing").
    pub fn insert(&self, rec: Record) -> Result<()> {
        let mut tree = self.tree.lock();
        let rid = rec.rid;
        if tree.insert(rid, rec).is_some() {
            return Err(ReplayError::DuplicateRid { gen: self.gen, rid });
        }
        Ok(())
    }

    pub fn record_count(&self) -> usize {
        self.tree.lock().len()
    }

    pub fn applied_count(&self) -> u64 {
        *self.applied_count.lock()
    }

    pub fn max_seqno_applied(&self) -> u64 {
        *self.max_seqno_applied.lock()
    }

    /// Walk the tree in ascending rid order, dispatching each record to the
    /// matching ingest hook. On any ingest error, the remaining tree is
    /// dropped and the error propagated (spec §4.F, §7).
    pub fn apply(&self, ingest: &dyn IngestSink) -> Result<()> {
        let mut tree = self.tree.lock();
        while let Some((&rid, _)) = tree.iter().next() {
            let rec = tree.remove(&rid).expect("rid just observed in tree");
            let managed = true;
            let result = match rec.op {
                Op::Put => ingest.replay_put(
                    rec.cnid,
                    rec.seqno,
                    &rec.key,
                    rec.value.as_deref().unwrap_or(&[]),
                    managed,
                ),
                Op::Del => ingest.replay_del(rec.cnid, rec.seqno, &rec.key, managed),
                Op::PDel => ingest.replay_pdel(rec.cnid, rec.seqno, &rec.key, managed),
            };

            if let Err(e) = result {
                tree.clear();
                return Err(e);
            }

            let mut max_seqno = self.max_seqno_applied.lock();
            *max_seqno = (*max_seqno).max(rec.seqno);
            drop(max_seqno);
            *self.applied_count.lock() += 1;
        }
        Ok(())
    }
}

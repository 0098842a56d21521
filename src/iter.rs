//! Record iterator (spec §4.B): walks a memory-mapped file range record by
//! record, skipping internal/txn-meta records and resolving each tx record
//! against the global commit table.

use crate::error::ReplayError;
use crate::fileset::FileGroupInfo;
use crate::pool::Pool;
use crate::record::{self, Record};
use crate::txindex::TxIndex;
use crate::Result;

pub struct RecordIter<'a> {
    buf: &'a [u8],
    gen: u64,
    curoff: u64,
    end_off: u64,
    record_group_end: u64,
    size: u64,
    txindex: &'a TxIndex,
    /// Gates allocation of the next [`Record`]; a reached limit surfaces as
    /// sticky out-of-memory (spec §4.B). Released once the record is
    /// dropped (consumed as aborted/fragment) or handed off for apply.
    pool: &'a Pool<()>,
    done: bool,
}

impl<'a> RecordIter<'a> {
    pub fn new(info: &'a FileGroupInfo, end_off: u64, record_group_end: u64, txindex: &'a TxIndex, pool: &'a Pool<()>) -> Self {
        Self {
            buf: info.buf.bytes(),
            gen: info.gen,
            curoff: info.start_off,
            end_off,
            record_group_end,
            size: info.size(),
            txindex,
            pool,
            done: false,
        }
    }

    /// Advance to the next live mutation record, or `None` at end of
    /// iteration (or after a sticky error has already been returned once).
    #[allow(clippy::should_implement_trait)]
    pub fn next(&mut self) -> Option<Result<Record>> {
        loop {
            if self.done {
                return None;
            }

            if (self.end_off != 0 && self.curoff >= self.end_off) || self.curoff >= self.size {
                self.done = true;
                return None;
            }

            let window = &self.buf[self.curoff as usize..];
            let skip_nontx = self.curoff >= self.record_group_end;
            let reclen = record::reclen_total(window) as u64;
            if reclen == 0 {
                self.done = true;
                return Some(Err(ReplayError::BugAssertion(
                    "iterator encountered an unreadable record past validation",
                )));
            }
            self.curoff += reclen;

            if record::is_skip(window) || record::is_txmeta(window) {
                continue;
            }

            let Some(()) = self.pool.take_or_else(|| ()) else {
                self.done = true;
                return Some(Err(ReplayError::OutOfMemory("replay record")));
            };
            // Every exit below (error, dropped fragment, or handoff) frees
            // the slot back to the pool exactly once.
            let pool = self.pool;
            let _release = scopeguard::guard((), |()| pool.recycle(()));

            let mut rec = match record::unpack(window) {
                Ok(rec) => rec,
                Err(e) => {
                    self.done = true;
                    return Some(Err(e));
                }
            };

            if rec.is_tx {
                let Some(desc) = self.txindex.get(rec.txid) else {
                    // Aborted or never-committed transaction: drop silently.
                    continue;
                };
                if rec.rid > desc.final_rid {
                    self.done = true;
                    return Some(Err(ReplayError::BugAssertion(
                        "tx mutation rid exceeds its commit's final rid",
                    )));
                }
                rec.seqno = desc.commit_seqno;
                rec.gen = desc.gen;
            } else if skip_nontx {
                // Leftover fragment from a crashed in-flight batch, past
                // this file's record-group end.
                continue;
            }

            // The record now escapes the iterator's admission tracking;
            // its lifetime (and eventual free) is owned by the generation
            // tree's apply phase via normal Rust drop semantics.
            let _ = self.gen;
            return Some(Ok(rec));
        }
    }
}

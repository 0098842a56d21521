//! Validator (spec §4.C): first pass over each log file. Verifies record
//! framing, collects commit records into a per-file table, tracks
//! min/max seqno/gen/txid, and detects a torn tail.

use std::collections::BTreeMap;

use log::warn;

use crate::config::ReplayConfig;
use crate::error::ReplayError;
use crate::fileset::FileGroupInfo;
use crate::record::{self, CommitDescriptor, MinMaxInfo};
use crate::Result;

/// The result of validating a single file group: everything the
/// consolidator (§4.D) and the commit-index merge (§4.E) need.
#[derive(Clone, Debug)]
pub struct ValidatedFile {
    pub file_id: u32,
    pub gen: u64,
    pub start_off: u64,
    pub end_off: u64,
    pub record_group_end: u64,
    pub min_max: MinMaxInfo,
    /// Commit descriptors observed in this file, ordered by txid.
    pub commit_table: BTreeMap<u64, CommitDescriptor>,
    pub torn: bool,
}

/// Validate one file group, per spec §4.C steps 1-4 plus the post-loop
/// reconciliation of `end_off`.
pub fn validate_file(info: &FileGroupInfo, cfg: &ReplayConfig) -> Result<ValidatedFile> {
    let buf = info.buf.bytes();
    let size = info.size();

    let mut min_max = MinMaxInfo::empty();
    let mut commit_table = BTreeMap::new();
    let mut record_group_end = info.start_off;
    let mut curoff = info.start_off;
    let mut torn = false;

    loop {
        if info.end_off != 0 && curoff >= info.end_off {
            break;
        }
        if curoff >= size {
            break;
        }

        let window = &buf[curoff as usize..];
        let mut next_off = 0u64;
        let mut eorg = false;
        let valid = record::is_valid(
            window,
            curoff,
            size,
            &mut next_off,
            Some(&mut min_max),
            &mut eorg,
        );

        if !valid {
            if info.end_off != 0 {
                // The fileset manager asserted a trusted ending offset
                // past this point: a failure here is real corruption, not
                // a torn tail left by a crash.
                return Err(ReplayError::Corruption {
                    file_id: info.file_id,
                    offset: curoff,
                    reason: "framing or checksum invalid before known file end",
                });
            }
            torn = true;
            break;
        }

        if record::is_txcommit(window) {
            let accept = match cfg.txhorizon {
                None => true,
                Some(horizon) => {
                    let desc = record::unpack_tx_commit(window)?;
                    desc.txid >= horizon
                }
            };
            if accept {
                let desc = record::unpack_tx_commit(window)?;
                if commit_table.insert(desc.txid, desc).is_some() {
                    return Err(ReplayError::DuplicateTxid { txid: desc.txid });
                }
            }
        }

        if eorg {
            record_group_end = next_off;
        }

        curoff = next_off;
    }

    if info.end_off != 0 && info.end_off != record_group_end {
        warn!(
            "file {}: fileset-reported end_off={} disagrees with scanned record-group-end={}",
            info.file_id, info.end_off, record_group_end
        );
        return Err(ReplayError::Corruption {
            file_id: info.file_id,
            offset: record_group_end,
            reason: "trusted end offset disagrees with validator scan",
        });
    }

    let end_off = if info.end_off == 0 { curoff } else { info.end_off };
    debug_assert!(end_off >= record_group_end);

    Ok(ValidatedFile {
        file_id: info.file_id,
        gen: info.gen,
        start_off: info.start_off,
        end_off,
        record_group_end,
        min_max,
        commit_table,
        torn,
    })
}

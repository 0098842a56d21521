//! Coordinator / lifecycle (spec §4.H): the public entry point. Opens and
//! closes replay state, drives the concurrent validation/insertion phase
//! (§4.G), then the single-threaded apply pass, and propagates the first
//! error while always tearing down the fileset manager's mappings.

use log::info;

use crate::config::ReplayConfig;
use crate::driver::{self, WorkerStats};
use crate::fileset::{FilesetManager, ReplayOutcome};
use crate::ingest::{IngestSink, MetadataLog};
use crate::Result;

/// Summary returned on a successful replay, for the embedding crate's own
/// logging/metrics.
#[derive(Debug)]
pub struct ReplaySummary {
    pub generations_replayed: usize,
    pub max_seqno: u64,
    pub worker_stats: Vec<WorkerStats>,
}

/// Replay the write-ahead log. A no-op if the database is read-only or the
/// prior shutdown was clean (after which the metadata log must still be
/// replayed).
pub fn replay(
    mdc: &dyn MetadataLog,
    fileset: &dyn FilesetManager,
    ingest: &dyn IngestSink,
    cfg: &ReplayConfig,
) -> Result<ReplaySummary> {
    mdc.mdc_replay()?;

    if cfg.is_noop() {
        return Ok(ReplaySummary {
            generations_replayed: 0,
            max_seqno: 0,
            worker_stats: Vec::new(),
        });
    }

    let files = fileset.replay_enumerate()?;
    if files.is_empty() {
        return Ok(ReplaySummary {
            generations_replayed: 0,
            max_seqno: 0,
            worker_stats: Vec::new(),
        });
    }

    info!("replay: {} log file groups to process", files.len());

    let outcome = match driver::run(files, cfg) {
        Ok(outcome) => outcome,
        Err(e) => {
            let _ = fileset.replay_release(ReplayOutcome {
                failed: true,
                torn_files: Vec::new(),
            });
            return Err(e);
        }
    };

    match apply(&outcome.gens, ingest) {
        Ok(max_seqno) => {
            fileset.replay_release(ReplayOutcome {
                failed: false,
                torn_files: outcome.torn_files,
            })?;
            Ok(ReplaySummary {
                generations_replayed: outcome.gens.len(),
                max_seqno,
                worker_stats: outcome.worker_stats,
            })
        }
        Err(e) => {
            let _ = ingest.replay_disable();
            let _ = fileset.replay_release(ReplayOutcome {
                failed: true,
                torn_files: Vec::new(),
            });
            Err(e)
        }
    }
}

/// Drive the consolidated generations into the ingest layer in order,
/// syncing at every generation boundary except the last (spec §4.H).
fn apply(gens: &[std::sync::Arc<crate::gentree::ReplayGeneration>], ingest: &dyn IngestSink) -> Result<u64> {
    ingest.replay_enable()?;

    let mut max_seqno = 0u64;
    let last = gens.len().saturating_sub(1);
    for (i, gen) in gens.iter().enumerate() {
        ingest.replay_gen_set(gen.gen)?;

        if let Err(e) = gen.apply(ingest) {
            let _ = ingest.replay_disable();
            return Err(e);
        }

        info!(
            "replay: gen {} applied {} records, maxseqno {}",
            gen.gen,
            gen.applied_count(),
            gen.max_seqno_applied()
        );

        if i != last && gen.applied_count() > 0 {
            ingest.sync(true)?;
        }

        max_seqno = max_seqno.max(gen.max_seqno_applied());
    }

    ingest.replay_seqno_set(max_seqno)?;
    ingest.replay_disable()?;
    ingest.sync(false)?;

    Ok(max_seqno)
}

//! Replay driver (spec §4.G): across workers, run validation then record
//! insertion; a single elected leader runs consolidation and the
//! transaction-index merge in between. Two spin-and-yield barriers
//! separate the three phases (spec §5).

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use log::{debug, info};
use parking_lot::Mutex;

use crate::config::ReplayConfig;
use crate::consolidate;
use crate::error::ReplayError;
use crate::fileset::FileGroupInfo;
use crate::gentree::ReplayGeneration;
use crate::iter::RecordIter;
use crate::pool::Pool;
use crate::txindex::{self, TxIndex};
use crate::validate::{self, ValidatedFile};
use crate::Result;

/// Per-worker replay counts, surfaced for the embedding crate's own
/// observability (spec §9 supplement: "per-worker observability
/// counters").
#[derive(Clone, Debug, Default)]
pub struct WorkerStats {
    pub file_id: u32,
    pub nrecs: u64,
    pub ntxrecs: u64,
    pub nskipped: u64,
}

pub struct DriverOutcome {
    pub gens: Vec<Arc<ReplayGeneration>>,
    pub txindex: Arc<TxIndex>,
    pub worker_stats: Vec<WorkerStats>,
    pub torn_files: Vec<(u32, u64)>,
}

/// What the elected leader publishes for every other worker to read once
/// barrier 2 opens.
struct LeaderOutput {
    gens: Vec<Arc<ReplayGeneration>>,
    gen_index: HashMap<u64, Arc<ReplayGeneration>>,
    torn_files: Vec<(u32, u64)>,
}

/// Spin-and-yield until `done()` is true.
fn spin_until(done: impl Fn() -> bool) {
    while !done() {
        std::hint::spin_loop();
        std::thread::yield_now();
    }
}

pub fn run(files: Vec<FileGroupInfo>, cfg: &ReplayConfig) -> Result<DriverOutcome> {
    let n = files.len();
    if n == 0 {
        return Ok(DriverOutcome {
            gens: Vec::new(),
            txindex: Arc::new(TxIndex::new()),
            worker_stats: Vec::new(),
            torn_files: Vec::new(),
        });
    }
    let admission: Pool<()> = Pool::unbounded();
    let txindex = Arc::new(TxIndex::new());

    let validated: Mutex<Vec<Option<ValidatedFile>>> = Mutex::new((0..n).map(|_| None).collect());
    let vdone = AtomicUsize::new(0);
    let leader_claimed = AtomicBool::new(false);
    let arrived2 = AtomicUsize::new(0);
    let sticky_err: Mutex<Option<ReplayError>> = Mutex::new(None);
    let leader_output: Mutex<Option<LeaderOutput>> = Mutex::new(None);
    let worker_stats: Mutex<Vec<WorkerStats>> = Mutex::new(Vec::new());

    let latch = |e: ReplayError| {
        let mut guard = sticky_err.lock();
        if guard.is_none() {
            *guard = Some(e);
        }
    };

    // Every worker spins on two barriers waiting for its siblings, so the
    // pool must have at least one thread per file or a worker can starve
    // forever on a thread the scheduler never revisits (spec §5: "one task
    // per log file"). The global rayon pool defaults to the CPU count,
    // which can be smaller than the file count.
    let num_threads = cfg.worker_threads.unwrap_or(n).max(1);
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(num_threads)
        .build()
        .map_err(|_| ReplayError::BugAssertion("failed to build replay worker pool"))?;

    pool.scope(|scope| {
        for (idx, info) in files.iter().enumerate() {
            let validated = &validated;
            let vdone = &vdone;
            let leader_claimed = &leader_claimed;
            let arrived2 = &arrived2;
            let sticky_err = &sticky_err;
            let leader_output = &leader_output;
            let worker_stats = &worker_stats;
            let admission = &admission;
            let txindex = &txindex;
            let latch = &latch;

            scope.spawn(move |_| {
                // --- Phase 1: validate this worker's file (spec §4.C). ---
                match validate::validate_file(info, cfg) {
                    Ok(v) => validated.lock()[idx] = Some(v),
                    Err(e) => latch(e),
                }
                vdone.fetch_add(1, Ordering::Release);

                // --- Barrier 1: wait for every worker's validation pass. ---
                spin_until(|| vdone.load(Ordering::Acquire) >= n);

                // Every worker must still signal barrier 2 even when a
                // sticky error is already known, or a worker that observes
                // it here (skipping leader election) would leave the
                // others spinning on barrier 2 forever.
                let already_failed = sticky_err.lock().is_some();

                // --- Elect a leader to consolidate + merge the tx index
                // (spec §4.D, §4.E). The unique winner is the one whose
                // compare_exchange flips the flag false->true; the claim
                // is permanent, so a worker arriving after the leader has
                // already finished never mistakes the done-state for an
                // open claim. ---
                if !already_failed
                    && leader_claimed
                        .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
                        .is_ok()
                {
                    let files_v: Vec<ValidatedFile> = validated
                        .lock()
                        .iter()
                        .map(|slot| slot.clone().expect("every file validated by barrier 1"))
                        .collect();

                    debug!("replay info: {} file groups validated", files_v.len());
                    for f in &files_v {
                        debug!(
                            "file {} gen {} seqno [{},{}] end_off={} torn={}",
                            f.file_id, f.gen, f.min_max.min_seqno, f.min_max.max_seqno, f.end_off, f.torn
                        );
                    }

                    let torn_files: Vec<(u32, u64)> =
                        files_v.iter().filter(|f| f.torn).map(|f| (f.file_id, f.end_off)).collect();

                    let gens = consolidate::consolidate(&files_v);
                    for g in &gens {
                        debug!("replay generation {}: seqno [{}, {}]", g.gen, g.info.min_seqno, g.info.max_seqno);
                    }

                    match txindex::merge_commit_tables(&files_v, &gens, txindex) {
                        Ok(()) => {
                            let gen_index = gens.iter().map(|g| (g.gen, g.clone())).collect();
                            *leader_output.lock() = Some(LeaderOutput {
                                gens,
                                gen_index,
                                torn_files,
                            });
                        }
                        Err(e) => latch(e),
                    }
                }
                arrived2.fetch_add(1, Ordering::Release);

                // --- Barrier 2: wait for every worker (leader included) to
                // reach this point. ---
                spin_until(|| arrived2.load(Ordering::Acquire) >= n);

                if sticky_err.lock().is_some() {
                    return;
                }

                let my_file = validated.lock()[idx].clone().expect("validated by barrier 1");

                let output_guard = leader_output.lock();
                let gen_index = &output_guard.as_ref().expect("leader published before barrier 2 opens").gen_index;

                // --- Phase 2: iterate this file's records and insert live
                // ones into their target generation's tree (spec §4.B,
                // §4.F). ---
                let mut it = RecordIter::new(info, my_file.end_off, my_file.record_group_end, txindex, admission);
                let mut stats = WorkerStats {
                    file_id: info.file_id,
                    ..Default::default()
                };

                while let Some(next) = it.next() {
                    let rec = match next {
                        Ok(rec) => rec,
                        Err(e) => {
                            latch(e);
                            return;
                        }
                    };

                    if rec.seqno <= cfg.durable_seqno {
                        stats.nskipped += 1;
                        continue;
                    }

                    let Some(target) = gen_index.get(&rec.gen) else {
                        stats.nskipped += 1;
                        continue;
                    };

                    if rec.is_tx {
                        stats.ntxrecs += 1;
                    } else {
                        stats.nrecs += 1;
                    }

                    if let Err(e) = target.insert(rec) {
                        latch(e);
                        return;
                    }
                }

                worker_stats.lock().push(stats);
            });
        }
    });

    if let Some(e) = sticky_err.into_inner() {
        return Err(e);
    }

    let LeaderOutput { gens, torn_files, .. } = leader_output
        .into_inner()
        .expect("leader always runs to completion when there is no sticky error");
    let stats = worker_stats.into_inner();
    for s in &stats {
        info!(
            "replay worker file {} nrecs={} ntxrecs={} nskipped={}",
            s.file_id, s.nrecs, s.ntxrecs, s.nskipped
        );
    }

    Ok(DriverOutcome {
        gens,
        txindex,
        worker_stats: stats,
        torn_files,
    })
}

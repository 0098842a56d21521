//! End-to-end replay scenarios, one per spec-style fixture (S1-S6): build
//! synthetic log files in memory, drive them through the public API, and
//! assert on what the ingest collaborator observed.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use pretty_assertions::assert_eq;
use wal_replay::fileset::{FileGroupInfo, FilesetManager, ReplayOutcome};
use wal_replay::ingest::{IngestSink, MetadataLog};
use wal_replay::record::{encode_mutation, encode_skip, encode_txmeta, Op, TxMeta};
use wal_replay::{replay, ReplayConfig, ReplayError};

#[derive(Debug, Clone, PartialEq)]
enum Event {
    Put { seqno: u64, key: Vec<u8>, value: Vec<u8> },
    Del { seqno: u64, key: Vec<u8> },
    GenSet(u64),
    Sync(bool),
}

struct RecordingIngest {
    events: Mutex<Vec<Event>>,
    final_seqno: AtomicU64,
}

impl RecordingIngest {
    fn new() -> Self {
        Self {
            events: Mutex::new(Vec::new()),
            final_seqno: AtomicU64::new(0),
        }
    }

    fn events(&self) -> Vec<Event> {
        self.events.lock().unwrap().clone()
    }
}

impl IngestSink for RecordingIngest {
    fn replay_enable(&self) -> wal_replay::Result<()> {
        Ok(())
    }
    fn replay_disable(&self) -> wal_replay::Result<()> {
        Ok(())
    }
    fn replay_gen_set(&self, gen: u64) -> wal_replay::Result<()> {
        self.events.lock().unwrap().push(Event::GenSet(gen));
        Ok(())
    }
    fn replay_seqno_set(&self, seqno: u64) -> wal_replay::Result<()> {
        self.final_seqno.store(seqno, Ordering::SeqCst);
        Ok(())
    }
    fn replay_put(&self, _cnid: u64, seqno: u64, key: &[u8], value: &[u8], _managed: bool) -> wal_replay::Result<()> {
        self.events.lock().unwrap().push(Event::Put {
            seqno,
            key: key.to_vec(),
            value: value.to_vec(),
        });
        Ok(())
    }
    fn replay_del(&self, _cnid: u64, seqno: u64, key: &[u8], _managed: bool) -> wal_replay::Result<()> {
        self.events.lock().unwrap().push(Event::Del { seqno, key: key.to_vec() });
        Ok(())
    }
    fn replay_pdel(&self, cnid: u64, seqno: u64, key: &[u8], managed: bool) -> wal_replay::Result<()> {
        self.replay_del(cnid, seqno, key, managed)
    }
    fn sync(&self, async_mode: bool) -> wal_replay::Result<()> {
        self.events.lock().unwrap().push(Event::Sync(async_mode));
        Ok(())
    }
}

struct NoopMdc;

impl MetadataLog for NoopMdc {
    fn mdc_replay(&self) -> wal_replay::Result<()> {
        Ok(())
    }
}

struct MemFileset {
    groups: Mutex<Option<Vec<FileGroupInfo>>>,
    released: Mutex<Option<ReplayOutcome>>,
}

impl MemFileset {
    fn new(groups: Vec<FileGroupInfo>) -> Self {
        Self {
            groups: Mutex::new(Some(groups)),
            released: Mutex::new(None),
        }
    }
}

impl FilesetManager for MemFileset {
    fn replay_enumerate(&self) -> wal_replay::Result<Vec<FileGroupInfo>> {
        Ok(self.groups.lock().unwrap().take().expect("enumerated once"))
    }
    fn replay_release(&self, outcome: ReplayOutcome) -> wal_replay::Result<()> {
        *self.released.lock().unwrap() = Some(outcome);
        Ok(())
    }
}

fn enable_logging() {
    let _ = env_logger::builder()
        .filter_level(log::LevelFilter::Trace)
        .format_timestamp(None)
        .is_test(true)
        .try_init();
}

fn group(file_id: u32, gen: u64, buf: Vec<u8>) -> FileGroupInfo {
    FileGroupInfo {
        file_id,
        gen,
        buf: Arc::new(buf),
        start_off: 0,
        end_off: 0,
        record_group_end: 0,
        min_max: wal_replay::record::MinMaxInfo::empty(),
        stats_trusted: false,
    }
}

/// S1: non-tx, single file, single generation.
#[test]
fn s1_non_tx_single_file_single_gen() {
    enable_logging();
    let mut buf = Vec::new();
    encode_mutation(&mut buf, 1, 1, 0, 11, 1, Op::Put, b"a", Some(b"1"));
    encode_mutation(&mut buf, 2, 1, 0, 12, 1, Op::Del, b"b", None);
    encode_mutation(&mut buf, 3, 1, 0, 13, 1, Op::Put, b"c", Some(b"3"));
    encode_skip(&mut buf, 4, 1, 0, true);

    let fileset = MemFileset::new(vec![group(1, 1, buf)]);
    let ingest = RecordingIngest::new();
    let cfg = ReplayConfig {
        durable_seqno: 10,
        ..Default::default()
    };

    let summary = replay(&NoopMdc, &fileset, &ingest, &cfg).unwrap();
    assert_eq!(summary.max_seqno, 13);

    let events: Vec<Event> = ingest
        .events()
        .into_iter()
        .filter(|e| !matches!(e, Event::GenSet(_) | Event::Sync(_)))
        .collect();
    assert_eq!(
        events,
        vec![
            Event::Put { seqno: 11, key: b"a".to_vec(), value: b"1".to_vec() },
            Event::Del { seqno: 12, key: b"b".to_vec() },
            Event::Put { seqno: 13, key: b"c".to_vec(), value: b"3".to_vec() },
        ]
    );
}

/// S2: committed transaction applies at its commit seqno; aborted
/// (uncommitted) transaction is dropped; a commit with no mutations in its
/// own file still resolves other files' records.
#[test]
fn s2_committed_and_aborted_tx_across_files() {
    enable_logging();
    let mut f1 = Vec::new();
    encode_mutation(&mut f1, 1, 1, 0, 20, 1, Op::Put, b"x", Some(b"X"));
    encode_mutation(&mut f1, 2, 1, 100, 0, 1, Op::Put, b"y", Some(b"Y"));
    encode_mutation(&mut f1, 3, 1, 200, 0, 1, Op::Put, b"z", Some(b"Z"));
    encode_txmeta(&mut f1, TxMeta::Commit, 2, 1, 100, 21);
    encode_skip(&mut f1, 4, 1, 0, true);

    let mut f2 = Vec::new();
    encode_txmeta(&mut f2, TxMeta::Commit, 0, 1, 300, 22);

    let fileset = MemFileset::new(vec![group(1, 1, f1), group(2, 1, f2)]);
    let ingest = RecordingIngest::new();
    let cfg = ReplayConfig::default();

    replay(&NoopMdc, &fileset, &ingest, &cfg).unwrap();

    let events: Vec<Event> = ingest
        .events()
        .into_iter()
        .filter(|e| matches!(e, Event::Put { .. } | Event::Del { .. }))
        .collect();
    assert_eq!(
        events,
        vec![
            Event::Put { seqno: 20, key: b"x".to_vec(), value: b"X".to_vec() },
            Event::Put { seqno: 21, key: b"y".to_vec(), value: b"Y".to_vec() },
        ]
    );
}

/// S3: a torn tail truncates the last record; replay still succeeds and
/// applies everything before it.
#[test]
fn s3_torn_tail_is_not_fatal() {
    enable_logging();
    let mut buf = Vec::new();
    encode_mutation(&mut buf, 1, 1, 0, 11, 1, Op::Put, b"a", Some(b"1"));
    encode_mutation(&mut buf, 2, 1, 0, 12, 1, Op::Put, b"b", Some(b"2"));
    encode_skip(&mut buf, 99, 1, 0, true);
    let good_len = buf.len();
    encode_mutation(&mut buf, 3, 1, 0, 13, 1, Op::Put, b"c", Some(b"3"));
    buf.truncate(buf.len() - 5);

    let fileset = MemFileset::new(vec![group(1, 1, buf)]);
    let ingest = RecordingIngest::new();
    let cfg = ReplayConfig::default();

    let summary = replay(&NoopMdc, &fileset, &ingest, &cfg).unwrap();
    assert_eq!(summary.max_seqno, 12);

    let released = fileset.released.lock().unwrap().take().unwrap();
    assert!(!released.failed);
    assert_eq!(released.torn_files, vec![(1, good_len as u64)]);

    let events: Vec<Event> = ingest
        .events()
        .into_iter()
        .filter(|e| matches!(e, Event::Put { .. } | Event::Del { .. }))
        .collect();
    assert_eq!(events.len(), 2);
}

/// S4: two files on either side of a generation boundary; apply drives the
/// lower generation first, syncs, then the higher one.
#[test]
fn s4_generation_boundary_ordering() {
    enable_logging();
    let mut a = Vec::new();
    encode_mutation(&mut a, 1, 5, 0, 30, 1, Op::Put, b"a", Some(b"1"));
    encode_mutation(&mut a, 2, 5, 0, 35, 1, Op::Put, b"b", Some(b"2"));
    encode_skip(&mut a, 3, 5, 0, true);

    let mut b = Vec::new();
    encode_mutation(&mut b, 1, 6, 0, 36, 1, Op::Put, b"c", Some(b"3"));
    encode_mutation(&mut b, 2, 6, 0, 40, 1, Op::Put, b"d", Some(b"4"));
    encode_skip(&mut b, 3, 6, 0, true);

    let fileset = MemFileset::new(vec![group(1, 5, a), group(2, 6, b)]);
    let ingest = RecordingIngest::new();
    let cfg = ReplayConfig::default();

    let summary = replay(&NoopMdc, &fileset, &ingest, &cfg).unwrap();
    assert_eq!(summary.max_seqno, 40);
    assert_eq!(summary.generations_replayed, 2);

    let gen_sets: Vec<u64> = ingest
        .events()
        .into_iter()
        .filter_map(|e| match e {
            Event::GenSet(g) => Some(g),
            _ => None,
        })
        .collect();
    assert_eq!(gen_sets, vec![5, 6]);

    let syncs: Vec<bool> = ingest
        .events()
        .into_iter()
        .filter_map(|e| match e {
            Event::Sync(a) => Some(a),
            _ => None,
        })
        .collect();
    assert_eq!(syncs, vec![true, false]);
}

/// S5: overlapping seqno bounds across a generation boundary are
/// normalized by the consolidator; apply still succeeds end to end.
#[test]
fn s5_overlapping_bounds_consolidated() {
    enable_logging();
    let mut a = Vec::new();
    encode_mutation(&mut a, 1, 5, 0, 40, 1, Op::Put, b"a", Some(b"1"));
    encode_mutation(&mut a, 2, 5, 0, 50, 1, Op::Put, b"b", Some(b"2"));
    encode_skip(&mut a, 3, 5, 0, true);

    let mut b = Vec::new();
    encode_mutation(&mut b, 1, 6, 0, 49, 1, Op::Put, b"c", Some(b"3"));
    encode_mutation(&mut b, 2, 6, 0, 60, 1, Op::Put, b"d", Some(b"4"));
    encode_skip(&mut b, 3, 6, 0, true);

    let files = vec![group(1, 5, a), group(2, 6, b)];
    let cfg = ReplayConfig::default();
    let outcome = wal_replay::driver::run(files, &cfg).unwrap();

    assert_eq!(outcome.gens.len(), 2);
    assert!(outcome.gens[0].info.max_seqno < outcome.gens[1].info.min_seqno);
    assert_eq!(outcome.gens[1].info.min_seqno, 51);

    let ingest = RecordingIngest::new();
    for gen in &outcome.gens {
        gen.apply(&ingest).unwrap();
    }
    let applied: Vec<Event> = ingest
        .events()
        .into_iter()
        .filter(|e| matches!(e, Event::Put { .. }))
        .collect();
    assert_eq!(applied.len(), 4);
}

/// S6: the same txid committed in two different files is fatal; replay
/// (and so database open) fails.
#[test]
fn s6_duplicate_txid_across_files_is_fatal() {
    enable_logging();
    let mut f1 = Vec::new();
    encode_txmeta(&mut f1, TxMeta::Commit, 1, 1, 500, 21);

    let mut f2 = Vec::new();
    encode_txmeta(&mut f2, TxMeta::Commit, 1, 1, 500, 22);

    let fileset = MemFileset::new(vec![group(1, 1, f1), group(2, 1, f2)]);
    let ingest = RecordingIngest::new();
    let cfg = ReplayConfig::default();

    let err = replay(&NoopMdc, &fileset, &ingest, &cfg).unwrap_err();
    assert!(matches!(err, ReplayError::DuplicateTxid { txid: 500 }));

    let released = fileset.released.lock().unwrap().take().unwrap();
    assert!(released.failed);
}

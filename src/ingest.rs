//! The ingest-layer collaborator (spec §6): the small set of replay hooks
//! the in-memory structure exposes so the replay core can re-drive
//! mutations into it at controlled generation boundaries.

use crate::Result;

/// Replay hooks exposed by the ingest layer. During replay mode the
/// implementation must:
///
/// 1. accept externally imposed generation numbers (no implicit rollover),
/// 2. not bump its own internally reserved seqno counter,
/// 3. permit pinning keys/values into the memory mapping via `managed`
///    rather than copying, when asked.
pub trait IngestSink: Send + Sync {
    fn replay_enable(&self) -> Result<()>;
    fn replay_disable(&self) -> Result<()>;
    fn replay_gen_set(&self, gen: u64) -> Result<()>;
    fn replay_seqno_set(&self, seqno: u64) -> Result<()>;

    fn replay_put(&self, cnid: u64, seqno: u64, key: &[u8], value: &[u8], managed: bool) -> Result<()>;
    fn replay_del(&self, cnid: u64, seqno: u64, key: &[u8], managed: bool) -> Result<()>;
    fn replay_pdel(&self, cnid: u64, seqno: u64, key: &[u8], managed: bool) -> Result<()>;

    /// Force a generation boundary. `async_mode` mirrors the "async sync"
    /// used between replay generations; the final sync after the last
    /// generation is synchronous (`async_mode = false`).
    fn sync(&self, async_mode: bool) -> Result<()>;
}

/// The metadata change log collaborator: must be replayed before the WAL
/// itself (spec §4.H).
pub trait MetadataLog: Send + Sync {
    fn mdc_replay(&self) -> Result<()>;
}

//! Configuration inputs to replay (spec §6 "Configuration inputs to replay").

/// Tunables the coordinator needs from the database's checkpoint and open
/// options. An embedding crate builds this from its own config surface;
/// replay itself has no notion of files, CLI flags, or persistence layers
/// beyond what is passed here.
#[derive(Clone, Debug, Default)]
pub struct ReplayConfig {
    /// Drop records with `seqno <= durable_seqno`: already absorbed by the
    /// on-disk index at the time of the crash.
    pub durable_seqno: u64,
    /// Drop commit descriptors for txids below this (already absorbed).
    /// `None` means "accept all" (the `CNDB_INVAL_HORIZON` sentinel of the
    /// original implementation).
    pub txhorizon: Option<u64>,
    /// The prior shutdown was clean: replay is a no-op.
    pub clean_shutdown: bool,
    /// The database was opened read-only: replay is a no-op.
    pub read_only: bool,
    /// Worker threads to use for the concurrent phases (spec §5). Defaults
    /// to one per file group when `None`.
    pub worker_threads: Option<usize>,
}

impl ReplayConfig {
    pub fn is_noop(&self) -> bool {
        self.read_only || self.clean_shutdown
    }
}


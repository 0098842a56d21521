use std::io;

use thiserror::Error;

/// Error taxonomy for the replay core (spec §7).
///
/// A `Corruption` or `Conflict` error means the database must refuse to
/// open; a torn tail alone is not an error (see [`crate::validate`]).
#[derive(Debug, Error)]
pub enum ReplayError {
    #[error("invalid argument: {0}")]
    InvalidArgument(&'static str),

    #[error("out of memory allocating a {0}")]
    OutOfMemory(&'static str),

    #[error("corrupt record at file={file_id} offset={offset}: {reason}")]
    Corruption {
        file_id: u32,
        offset: u64,
        reason: &'static str,
    },

    #[error("duplicate txid {txid} observed across log files")]
    DuplicateTxid { txid: u64 },

    #[error("duplicate rid {rid} within generation {gen}")]
    DuplicateRid { gen: u64, rid: u64 },

    #[error("ingest layer rejected replayed record: {source}")]
    Ingest {
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("replay invariant violated: {0}")]
    BugAssertion(&'static str),

    #[error(transparent)]
    Io(#[from] io::Error),
}

pub type Result<T> = std::result::Result<T, ReplayError>;

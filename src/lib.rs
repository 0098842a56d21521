//! Write-ahead-log replay core for an embedded key-value database.
//!
//! This crate owns only the replay algorithm: record framing and
//! validation, transaction commit resolution, per-generation ordering, and
//! the concurrent-then-single-threaded apply pipeline described in the
//! module docs below. It knows nothing about how log files are written,
//! mapped, or truncated, nor about the shape of the in-memory structure
//! records are replayed into; those are the [`fileset`] and [`ingest`]
//! collaborator traits, implemented by the embedding database.

pub mod config;
pub mod consolidate;
pub mod driver;
pub mod error;
pub mod fileset;
pub mod gentree;
pub mod ingest;
pub mod iter;
pub mod pool;
pub mod record;
pub mod replay;
pub mod txindex;
pub mod validate;

pub use config::ReplayConfig;
pub use error::{ReplayError, Result};
pub use fileset::{FileGroupInfo, FilesetManager, MappedFile, ReplayOutcome};
pub use ingest::{IngestSink, MetadataLog};
pub use replay::{replay, ReplaySummary};

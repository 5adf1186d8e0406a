// Tablelog Kernel
//
// Transaction-log core of the table format: the action model and its
// wire codec, deterministic replay into table state, checkpoints, and
// the protocol gate that decides who may read or write a table.

pub mod actions;
pub mod config;
pub mod invariants;
pub mod log;
pub mod protocol;
pub mod replay;
pub mod snapshot;
pub mod state;

pub use actions::{Action, AddFile, Format, InvalidActionError, Metadata, Protocol, RemoveFile};
pub use config::KernelConfig;
pub use log::{decode, encode, InMemoryLogStore, LogStore, Version, VersionBatch};
pub use protocol::{check_protocol, SupportedVersions, UnsupportedProtocolError};
pub use replay::{replay, ReplayError, VersionGapError};
pub use snapshot::{commit, create_table, load_snapshot, SnapshotError};
pub use state::TableState;

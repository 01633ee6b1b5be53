//! Sync layer: numbered snapshots, diff baselines and acknowledgements.
//!
//! What travels over the wire is never a state, only a [`SyncMessage`]
//! carrying the diff between two numbered snapshots. The histories in
//! this module decide which baseline a diff is computed from and which
//! received diffs are applicable, duplicated or stale.

mod history;
mod message;

pub use history::{ApplyOutcome, ReceiverHistory, SenderHistory};
pub use message::SyncMessage;

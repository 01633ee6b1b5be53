//! # statesync
//!
//! Secure state synchronization over UDP datagrams.
//!
//! Instead of a byte stream, the two endpoints each publish a sequence
//! of numbered state snapshots and keep the peer's view current by
//! sending diffs between snapshots. Because only the latest state
//! matters, a lost datagram is never retransmitted verbatim at the
//! byte-stream level; the protocol simply sends a newer diff. It
//! provides:
//!
//! - **Security**: every datagram is sealed with XChaCha20-Poly1305
//!   under a pre-shared session key, with anti-replay filtering
//! - **Mobility**: the peer may change address mid-session (roaming);
//!   authenticated traffic from a new address is followed there
//! - **Liveness**: heartbeats, RTT-adaptive retransmission and a
//!   cooperative shutdown handshake
//! - **Generality**: any type implementing [`DiffableState`] can be
//!   synchronized
//!
//! ## Modules
//!
//! - [`core`]: the [`DiffableState`] trait, constants and error types
//! - [`crypto`]: datagram sealing, nonce discipline and replay defense
//! - [`sync`]: sync messages and the snapshot histories
//! - [`transport`]: fragmentation, timing and the [`Transport`] endpoint
//!
//! ## Example
//!
//! ```rust
//! use statesync::prelude::*;
//!
//! #[derive(Clone)]
//! struct Counter {
//!     value: u64,
//! }
//!
//! impl DiffableState for Counter {
//!     type Diff = i64;
//!
//!     fn diff_from(&self, old: &Self) -> i64 {
//!         self.value as i64 - old.value as i64
//!     }
//!
//!     fn apply_diff(&mut self, diff: &i64) -> Result<(), ApplyError> {
//!         self.value = self
//!             .value
//!             .checked_add_signed(*diff)
//!             .ok_or(ApplyError::Mismatch)?;
//!         Ok(())
//!     }
//!
//!     fn encode_diff(diff: &i64) -> Vec<u8> {
//!         diff.to_le_bytes().to_vec()
//!     }
//!
//!     fn decode_diff(data: &[u8]) -> Result<i64, DecodeError> {
//!         let bytes = data.try_into().map_err(|_| DecodeError::UnexpectedEof)?;
//!         Ok(i64::from_le_bytes(bytes))
//!     }
//! }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod core;
pub mod crypto;
pub mod sync;
pub mod transport;

/// Prelude module for convenient imports.
pub mod prelude {
    pub use crate::core::*;
    pub use crate::crypto::{CryptoSession, Role, SessionKey};
    pub use crate::sync::{ApplyOutcome, SyncMessage};
    pub use crate::transport::{RecvEvent, Transport, TransportConfig, TransportStats};
}

pub use crate::core::{ApplyError, DecodeError, DiffableState, TransportError};
pub use crate::crypto::{Role, SessionKey};
pub use crate::transport::{RecvEvent, Transport, TransportConfig};

//! Protocol constants and tunable defaults.
//!
//! Wire-format sizes are fixed by the protocol. The `DEFAULT_*` values
//! seed [`TransportConfig`](crate::transport::TransportConfig) and may be
//! overridden per session.

use std::time::Duration;

// =============================================================================
// WIRE FORMAT
// =============================================================================

/// Poly1305 authentication tag size.
pub const AEAD_TAG_SIZE: usize = 16;

/// XChaCha20 nonce size.
pub const AEAD_NONCE_SIZE: usize = 24;

/// Session key size (XChaCha20-Poly1305).
pub const SESSION_KEY_SIZE: usize = 32;

/// Cleartext datagram header: the per-direction sequence number (u64 BE).
pub const SEQ_HEADER_SIZE: usize = 8;

/// Fragment sub-header inside the plaintext: message id (8) + index (2) + count (2).
pub const FRAGMENT_HEADER_SIZE: usize = 12;

/// Sync message header inside a reassembled message.
///
/// `flags (1) + timestamp (4) + timestamp_echo (4) + base (8) + new (8) + acked (8) + diff_len (4)`
pub const SYNC_MESSAGE_HEADER_SIZE: usize = 37;

// =============================================================================
// MESSAGE FLAGS
// =============================================================================

/// Sender has requested session shutdown.
pub const FLAG_SHUTDOWN: u8 = 0x01;

// =============================================================================
// REPLAY PROTECTION
// =============================================================================

/// Sliding replay window size in bits.
///
/// Datagrams whose sequence number falls below `highest - REPLAY_WINDOW_SIZE`
/// are rejected outright.
pub const REPLAY_WINDOW_SIZE: usize = 1024;

// =============================================================================
// TUNABLE DEFAULTS
// =============================================================================

/// Default datagram size budget, conservative for mobile paths without PMTUD.
pub const DEFAULT_MTU: usize = 1280;

/// Default number of unacknowledged snapshots retained per direction.
pub const DEFAULT_HISTORY_DEPTH: usize = 32;

/// Default bound on simultaneously incomplete reassembly sets.
pub const DEFAULT_PENDING_MESSAGES: usize = 4;

/// Default heartbeat interval when no application state is flowing.
pub const DEFAULT_HEARTBEAT_INTERVAL: Duration = Duration::from_secs(3);

/// Retransmission timeout before the first RTT sample.
pub const DEFAULT_INITIAL_RTO: Duration = Duration::from_millis(1000);

/// Retransmission timeout floor.
pub const DEFAULT_MIN_RTO: Duration = Duration::from_millis(50);

/// Retransmission timeout ceiling.
pub const DEFAULT_MAX_RTO: Duration = Duration::from_millis(60_000);

/// Default number of shutdown-flagged sends before giving up on the peer.
pub const DEFAULT_SHUTDOWN_RETRIES: u32 = 8;

//! Error types for the statesync protocol.
//!
//! Only socket-level I/O errors are fatal to a transport; every
//! protocol-level anomaly (bad tag, replay, malformed fragment, stale
//! diff baseline) is recoverable and the embedding loop is expected to
//! drop the offending datagram and keep driving.

use thiserror::Error;

/// Errors that can occur when applying a diff to local state.
#[derive(Debug, Error, Clone)]
pub enum ApplyError {
    /// The diff does not fit the state it was applied to.
    #[error("diff does not match target state")]
    Mismatch,

    /// State corruption detected while applying.
    #[error("state corruption detected")]
    StateCorruption,
}

/// Errors that can occur when decoding a diff from the wire.
#[derive(Debug, Error, Clone)]
pub enum DecodeError {
    /// Invalid encoding.
    #[error("invalid encoding: {0}")]
    InvalidEncoding(String),

    /// Unexpected end of data.
    #[error("unexpected end of data")]
    UnexpectedEof,
}

/// Errors in the crypto layer.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CryptoError {
    /// AEAD tag verification failed; the datagram was tampered with or
    /// encrypted under a different key.
    #[error("authentication failed")]
    AuthenticationFailure,

    /// Sequence number already seen or below the replay window.
    #[error("replayed or out-of-order sequence number {0}")]
    ReplayOrOutOfOrder(u64),

    /// AEAD encryption failed.
    #[error("encryption failed")]
    EncryptionFailed,

    /// Send counter exhausted; the session key must not be reused.
    #[error("sequence counter exhausted")]
    CounterExhausted,
}

/// Errors in the fragment codec.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum FragmentError {
    /// Input shorter than the fragment header.
    #[error("fragment truncated: {0} bytes")]
    Truncated(usize),

    /// Fragment index not below the declared count.
    #[error("fragment index {index} out of range for count {count}")]
    IndexOutOfRange {
        /// Declared fragment index.
        index: u16,
        /// Declared fragment count.
        count: u16,
    },

    /// A fragment declared a different count than earlier fragments of
    /// the same message.
    #[error("fragment count mismatch for message {id}: expected {expected}, got {actual}")]
    CountMismatch {
        /// Message id the fragments belong to.
        id: u64,
        /// Count declared by the first fragment seen.
        expected: u16,
        /// Count declared by the offending fragment.
        actual: u16,
    },

    /// Declared fragment count was zero.
    #[error("fragment count is zero")]
    ZeroCount,

    /// Message needs more fragments than the count field can express.
    #[error("message too large: needs {fragments} fragments")]
    MessageTooLarge {
        /// Fragments the message would require.
        fragments: usize,
    },
}

/// Errors decoding a sync message.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum MessageError {
    /// Input data is shorter than required.
    #[error("message too short: expected {expected} bytes, got {actual}")]
    TooShort {
        /// Minimum bytes required.
        expected: usize,
        /// Actual bytes available.
        actual: usize,
    },
}

/// Top-level transport errors.
///
/// `recv()` and `tick()` return these; the caller branches on
/// [`is_fatal`](TransportError::is_fatal) rather than unwinding.
#[derive(Debug, Error)]
pub enum TransportError {
    /// Crypto-layer failure (drop the datagram and continue).
    #[error("crypto error: {0}")]
    Crypto(#[from] CryptoError),

    /// Fragment codec failure (drop the fragment and continue).
    #[error("fragment error: {0}")]
    Fragment(#[from] FragmentError),

    /// Sync message decoding failure.
    #[error("message error: {0}")]
    Message(#[from] MessageError),

    /// Diff decoding failure.
    #[error("diff decode error: {0}")]
    Decode(#[from] DecodeError),

    /// Diff application failure.
    #[error("diff apply error: {0}")]
    Apply(#[from] ApplyError),

    /// The diff's declared baseline is no longer retained; no state was
    /// mutated and no acknowledgement advances. The sender recovers by
    /// re-targeting an older baseline.
    #[error("stale diff baseline {baseline}")]
    StaleBaseline {
        /// State number the diff was computed against.
        baseline: u64,
    },

    /// Socket-level I/O failure. Fatal: process-lifetime decisions
    /// belong to the embedding application.
    #[error("socket error during {op}: {source}")]
    Socket {
        /// The socket operation that failed.
        op: &'static str,
        /// Underlying OS error.
        #[source]
        source: std::io::Error,
    },
}

impl TransportError {
    /// Whether the embedding loop must tear the transport down.
    ///
    /// Everything except socket I/O failures is self-healing: the
    /// datagram is dropped, no state changed, and synchronization
    /// continues with the next datagram.
    pub fn is_fatal(&self) -> bool {
        matches!(self, TransportError::Socket { .. })
    }
}

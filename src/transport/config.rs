//! Transport tuning knobs.

use std::time::Duration;

use crate::core::constants::*;

/// Configuration for a [`Transport`](super::Transport) endpoint.
///
/// The defaults suit interactive use over the open internet; the
/// builder methods exist mostly for tests, which shrink the timers to
/// keep scenarios fast.
#[derive(Debug, Clone)]
pub struct TransportConfig {
    /// Maximum datagram size put on the wire, headers included.
    pub mtu: usize,
    /// Snapshots retained per history before pruning.
    pub history_depth: usize,
    /// Partially reassembled messages kept before evicting the oldest.
    pub pending_messages: usize,
    /// Idle interval after which a heartbeat goes out.
    pub heartbeat_interval: Duration,
    /// Retransmission timeout before the first RTT sample.
    pub initial_rto: Duration,
    /// Floor for the retransmission timeout.
    pub min_rto: Duration,
    /// Ceiling for the retransmission timeout and its backoff.
    pub max_rto: Duration,
    /// Flagged sends allowed before a shutdown request is abandoned.
    pub shutdown_retries: u32,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            mtu: DEFAULT_MTU,
            history_depth: DEFAULT_HISTORY_DEPTH,
            pending_messages: DEFAULT_PENDING_MESSAGES,
            heartbeat_interval: DEFAULT_HEARTBEAT_INTERVAL,
            initial_rto: DEFAULT_INITIAL_RTO,
            min_rto: DEFAULT_MIN_RTO,
            max_rto: DEFAULT_MAX_RTO,
            shutdown_retries: DEFAULT_SHUTDOWN_RETRIES,
        }
    }
}

impl TransportConfig {
    /// Set the wire MTU.
    pub fn with_mtu(mut self, mtu: usize) -> Self {
        self.mtu = mtu;
        self
    }

    /// Set the history depth.
    pub fn with_history_depth(mut self, depth: usize) -> Self {
        self.history_depth = depth;
        self
    }

    /// Set the reassembly buffer bound.
    pub fn with_pending_messages(mut self, pending: usize) -> Self {
        self.pending_messages = pending;
        self
    }

    /// Set the heartbeat interval.
    pub fn with_heartbeat_interval(mut self, interval: Duration) -> Self {
        self.heartbeat_interval = interval;
        self
    }

    /// Set the pre-sample retransmission timeout.
    pub fn with_initial_rto(mut self, rto: Duration) -> Self {
        self.initial_rto = rto;
        self
    }

    /// Set the RTO floor.
    pub fn with_min_rto(mut self, rto: Duration) -> Self {
        self.min_rto = rto;
        self
    }

    /// Set the RTO ceiling.
    pub fn with_max_rto(mut self, rto: Duration) -> Self {
        self.max_rto = rto;
        self
    }

    /// Set the shutdown retry budget.
    pub fn with_shutdown_retries(mut self, retries: u32) -> Self {
        self.shutdown_retries = retries;
        self
    }

    /// Plaintext bytes available to each fragment after the sequence
    /// header, AEAD tag and fragment header are accounted for.
    pub fn payload_mtu(&self) -> usize {
        self.mtu
            .saturating_sub(SEQ_HEADER_SIZE + AEAD_TAG_SIZE + FRAGMENT_HEADER_SIZE)
    }
}

//! Cooperative shutdown handshake.
//!
//! Either side may request shutdown; the request rides as a flag on
//! ordinary sync messages. The peer mirrors the flag back, and a side
//! that has both sent and seen the flag considers the session closed.
//! A peer that never answers is abandoned after a bounded number of
//! flagged retransmissions.

/// Where the session stands in the shutdown exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownPhase {
    /// Normal operation, no shutdown in sight.
    Open,
    /// We requested shutdown and are waiting for the peer's flag.
    Requested,
    /// Both sides have flagged; the session may be torn down.
    Acknowledged,
    /// Torn down locally.
    Closed,
}

/// Tracks the shutdown handshake and its retry budget.
#[derive(Debug)]
pub struct ShutdownCoordinator {
    phase: ShutdownPhase,
    peer_initiated: bool,
    flagged_sends: u32,
    retry_budget: u32,
}

impl ShutdownCoordinator {
    /// New coordinator in the open phase.
    pub fn new(retry_budget: u32) -> Self {
        Self {
            phase: ShutdownPhase::Open,
            peer_initiated: false,
            flagged_sends: 0,
            retry_budget,
        }
    }

    /// Current phase.
    pub fn phase(&self) -> ShutdownPhase {
        self.phase
    }

    /// Whether outgoing messages should carry the shutdown flag.
    pub fn flag_outgoing(&self) -> bool {
        matches!(
            self.phase,
            ShutdownPhase::Requested | ShutdownPhase::Acknowledged
        )
    }

    /// Begin shutdown locally. Idempotent.
    pub fn start(&mut self) {
        if self.phase == ShutdownPhase::Open {
            self.phase = ShutdownPhase::Requested;
        }
    }

    /// The peer sent a flagged message.
    ///
    /// An unsolicited flag moves us straight to requested so our next
    /// send mirrors it; a flag answering our own request completes the
    /// handshake.
    pub fn on_peer_flag(&mut self) {
        match self.phase {
            ShutdownPhase::Open => {
                self.phase = ShutdownPhase::Requested;
                self.peer_initiated = true;
            }
            ShutdownPhase::Requested => self.phase = ShutdownPhase::Acknowledged,
            ShutdownPhase::Acknowledged | ShutdownPhase::Closed => {}
        }
    }

    /// A flagged message went out; consumes one unit of retry budget.
    pub fn on_flag_sent(&mut self) {
        self.flagged_sends = self.flagged_sends.saturating_add(1);
    }

    /// Flagged sends so far.
    pub fn flagged_sends(&self) -> u32 {
        self.flagged_sends
    }

    /// Flagged sends still allowed before giving up on the peer.
    pub fn retries_remaining(&self) -> u32 {
        self.retry_budget.saturating_sub(self.flagged_sends)
    }

    /// Whether the peer has answered our shutdown request.
    pub fn acknowledged(&self) -> bool {
        self.phase == ShutdownPhase::Acknowledged
    }

    /// Whether the shutdown was requested by the peer.
    pub fn peer_initiated(&self) -> bool {
        self.peer_initiated
    }

    /// Whether we have mirrored the flag back to at least one
    /// peer-initiated shutdown request. The passive side may tear down
    /// once this holds; no second inbound flag is needed.
    pub fn peer_request_acknowledged(&self) -> bool {
        self.peer_initiated && self.flagged_sends > 0
    }

    /// Whether we stopped waiting for an answer that never came.
    pub fn timed_out(&self) -> bool {
        self.phase == ShutdownPhase::Requested && self.flagged_sends >= self.retry_budget
    }

    /// Mark the session as fully closed.
    pub fn mark_closed(&mut self) {
        self.phase = ShutdownPhase::Closed;
    }
}

//! Numbered snapshot histories for both directions of a transport.
//!
//! The sender keeps every snapshot the peer might still need as a diff
//! baseline; the receiver keeps a shadow of recently applied remote
//! snapshots so a sender that retargets an older baseline can still be
//! followed. Both sides retain state number 0 (the initial state)
//! unconditionally: it is the re-anchor of last resort, so a diff from
//! 0 is always applicable no matter how much history was pruned.

use std::collections::VecDeque;

use crate::core::{DiffableState, TransportError};

/// A retained snapshot with its state number.
#[derive(Debug, Clone)]
struct HistoryEntry<S> {
    num: u64,
    snapshot: S,
}

/// Outcome of applying one received sync message to the remote shadow.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyOutcome {
    /// The diff produced a new remote state.
    Applied,
    /// The state number was already applied; nothing changed.
    Duplicate,
}

/// Snapshots of our own state, awaiting peer acknowledgement.
#[derive(Debug)]
pub struct SenderHistory<S: DiffableState> {
    entries: VecDeque<HistoryEntry<S>>,
    current_num: u64,
    peer_acked: u64,
    depth: usize,
}

impl<S: DiffableState> SenderHistory<S> {
    /// Start the history at state 0 with the agreed initial state.
    pub fn new(initial: S, depth: usize) -> Self {
        let mut entries = VecDeque::new();
        entries.push_back(HistoryEntry {
            num: 0,
            snapshot: initial,
        });
        Self {
            entries,
            current_num: 0,
            peer_acked: 0,
            depth: depth.max(2),
        }
    }

    /// Number of the newest recorded state.
    pub fn current_num(&self) -> u64 {
        self.current_num
    }

    /// Highest state of ours the peer has confirmed applying.
    pub fn peer_acked(&self) -> u64 {
        self.peer_acked
    }

    /// Whether the peer is behind the newest recorded state.
    pub fn has_unacked(&self) -> bool {
        self.current_num > self.peer_acked
    }

    /// The newest snapshot.
    pub fn current(&self) -> &S {
        // The deque is never empty: entry 0 is permanent.
        &self.entries.back().unwrap().snapshot
    }

    /// The diff baseline: the last snapshot the peer acknowledged, or
    /// state 0 if that was somehow lost.
    pub fn baseline(&self) -> (u64, &S) {
        let entry = self
            .entries
            .iter()
            .find(|e| e.num == self.peer_acked)
            .unwrap_or(&self.entries[0]);
        (entry.num, &entry.snapshot)
    }

    /// Record a new snapshot, assigning it the next state number.
    pub fn record(&mut self, snapshot: S) -> u64 {
        self.current_num += 1;
        self.entries.push_back(HistoryEntry {
            num: self.current_num,
            snapshot,
        });
        self.prune();
        self.current_num
    }

    /// Advance the acknowledgement cursor. Returns `true` if it moved.
    ///
    /// Acks never regress, and an ack for a state we never recorded is
    /// ignored rather than trusted.
    pub fn on_ack(&mut self, acked: u64) -> bool {
        if acked <= self.peer_acked || acked > self.current_num {
            return false;
        }
        self.peer_acked = acked;
        self.prune();
        true
    }

    /// Drop snapshots that can no longer serve as a baseline: anything
    /// older than the acknowledged state, then oldest-first down to the
    /// configured depth. Entry 0, the acknowledged entry and the newest
    /// entry are never dropped.
    fn prune(&mut self) {
        let acked = self.peer_acked;
        let newest = self.current_num;
        self.entries
            .retain(|e| e.num == 0 || e.num >= acked || e.num == newest);
        while self.entries.len() > self.depth {
            let Some(pos) = self
                .entries
                .iter()
                .position(|e| e.num != 0 && e.num != acked && e.num != newest)
            else {
                break;
            };
            self.entries.remove(pos);
        }
    }

    #[cfg(test)]
    fn retained(&self) -> Vec<u64> {
        self.entries.iter().map(|e| e.num).collect()
    }
}

/// Shadow of the peer's state, built by applying received diffs.
#[derive(Debug)]
pub struct ReceiverHistory<R: DiffableState> {
    entries: VecDeque<HistoryEntry<R>>,
    last_applied: u64,
    depth: usize,
}

impl<R: DiffableState> ReceiverHistory<R> {
    /// Start the shadow at state 0 with the agreed initial state.
    pub fn new(initial: R, depth: usize) -> Self {
        let mut entries = VecDeque::new();
        entries.push_back(HistoryEntry {
            num: 0,
            snapshot: initial,
        });
        Self {
            entries,
            last_applied: 0,
            depth: depth.max(2),
        }
    }

    /// Highest remote state number applied so far.
    pub fn last_applied(&self) -> u64 {
        self.last_applied
    }

    /// The newest reconstructed remote state.
    pub fn latest(&self) -> &R {
        &self.entries.back().unwrap().snapshot
    }

    /// Apply one received diff.
    ///
    /// A state number at or below the cursor is a no-op duplicate; a
    /// baseline we no longer retain is [`TransportError::StaleBaseline`]
    /// and mutates nothing, which withholds the acknowledgement the
    /// sender is waiting for.
    pub fn apply(
        &mut self,
        base_num: u64,
        new_num: u64,
        diff_bytes: &[u8],
    ) -> Result<ApplyOutcome, TransportError> {
        if new_num <= self.last_applied {
            return Ok(ApplyOutcome::Duplicate);
        }

        let base = self
            .entries
            .iter()
            .find(|e| e.num == base_num)
            .ok_or(TransportError::StaleBaseline { baseline: base_num })?;

        let mut next = base.snapshot.clone();
        if !diff_bytes.is_empty() {
            let diff = R::decode_diff(diff_bytes)?;
            next.apply_diff(&diff)?;
        }

        self.entries.push_back(HistoryEntry {
            num: new_num,
            snapshot: next,
        });
        self.last_applied = new_num;
        self.prune();
        Ok(ApplyOutcome::Applied)
    }

    /// Keep entry 0 and the newest `depth - 1` snapshots.
    fn prune(&mut self) {
        while self.entries.len() > self.depth {
            let Some(pos) = self
                .entries
                .iter()
                .position(|e| e.num != 0 && e.num != self.last_applied)
            else {
                break;
            };
            self.entries.remove(pos);
        }
    }

    #[cfg(test)]
    fn retained(&self) -> Vec<u64> {
        self.entries.iter().map(|e| e.num).collect()
    }
}

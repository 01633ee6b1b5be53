//! The transport endpoint: one side of a synchronized session.

use std::net::SocketAddr;
use std::time::{Duration, Instant};

use tracing::{debug, info, trace, warn};

use crate::core::{DiffableState, TransportError};
use crate::crypto::{CryptoSession, Role, SessionKey};
use crate::sync::{ApplyOutcome, ReceiverHistory, SenderHistory, SyncMessage};

use super::config::TransportConfig;
use super::fragment::{Fragment, FragmentAssembly, Fragmenter};
use super::frame::Datagram;
use super::shutdown::{ShutdownCoordinator, ShutdownPhase};
use super::socket::SspSocket;
use super::timing::TimingController;

/// What one non-blocking receive pass produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecvEvent {
    /// No datagram was queued on the socket.
    Empty,
    /// A fragment arrived but its message is not yet complete.
    Partial,
    /// An acknowledgement or heartbeat, carrying no new state.
    AckOnly,
    /// A diff was applied; the remote shadow now sits at this number.
    Applied(u64),
    /// A retransmission of state we already applied.
    Duplicate,
}

/// Counters for observability and tests.
#[derive(Debug, Clone, Copy, Default)]
pub struct TransportStats {
    /// Sync messages sent, heartbeats included.
    pub messages_sent: u64,
    /// Complete sync messages received and processed.
    pub messages_received: u64,
    /// Times the in-flight delta was retransmitted.
    pub retransmits: u64,
    /// Datagrams dropped because the outbound buffer was full.
    pub dropped_sends: u64,
}

/// The delta currently awaiting acknowledgement.
///
/// Retransmissions resend these exact bytes; the receiver applies a
/// given state number at most once, so resending a recomputed diff
/// would risk diverging if it landed after the original.
#[derive(Debug)]
struct PendingDelta {
    base: u64,
    target: u64,
    payload: Vec<u8>,
    sent_at: Instant,
    retransmits: u32,
}

/// One endpoint of a state-synchronization session.
///
/// `L` is the local state we publish; `R` is the remote state we
/// shadow. The endpoint never blocks: [`recv`](Self::recv) drains at
/// most one datagram, [`tick`](Self::tick) sends whatever is due, and
/// [`wait_time`](Self::wait_time) tells the embedding loop how long it
/// may sleep (gated on [`readable`](Self::readable)).
pub struct Transport<L: DiffableState, R: DiffableState> {
    socket: SspSocket,
    peer: SocketAddr,
    crypto: CryptoSession,
    fragmenter: Fragmenter,
    assembly: FragmentAssembly,
    sent: SenderHistory<L>,
    received: ReceiverHistory<R>,
    timing: TimingController,
    shutdown: ShutdownCoordinator,
    pending: Option<PendingDelta>,
    last_send: Instant,
    last_heard: Option<Instant>,
    needs_ack: bool,
    stats: TransportStats,
}

impl<L: DiffableState, R: DiffableState> Transport<L, R> {
    /// Build an endpoint over an already bound socket.
    ///
    /// Both sides must agree out of band on the key, on who is client
    /// and who is server, and on the two initial states (state 0 of
    /// each direction).
    pub fn new(
        socket: SspSocket,
        peer: SocketAddr,
        key: SessionKey,
        role: Role,
        initial_local: L,
        initial_remote: R,
        config: TransportConfig,
    ) -> Self {
        let now = Instant::now();
        Self {
            socket,
            peer,
            crypto: CryptoSession::new(key, role),
            fragmenter: Fragmenter::new(config.payload_mtu()),
            assembly: FragmentAssembly::new(config.pending_messages),
            sent: SenderHistory::new(initial_local, config.history_depth),
            received: ReceiverHistory::new(initial_remote, config.history_depth),
            timing: TimingController::new(
                config.initial_rto,
                config.min_rto,
                config.max_rto,
                config.heartbeat_interval,
            ),
            shutdown: ShutdownCoordinator::new(config.shutdown_retries),
            pending: None,
            last_send: now,
            last_heard: None,
            needs_ack: false,
            stats: TransportStats::default(),
        }
    }

    /// Bind a fresh socket and build an endpoint on it.
    pub async fn bind(
        local: SocketAddr,
        peer: SocketAddr,
        key: SessionKey,
        role: Role,
        initial_local: L,
        initial_remote: R,
        config: TransportConfig,
    ) -> Result<Self, TransportError> {
        let socket = SspSocket::bind(local).await?;
        Ok(Self::new(
            socket,
            peer,
            key,
            role,
            initial_local,
            initial_remote,
            config,
        ))
    }

    /// Drain at most one datagram from the socket.
    ///
    /// Errors other than [`TransportError::Socket`] describe a single
    /// bad datagram (forged, replayed, malformed) and leave the session
    /// healthy; callers typically log and carry on.
    pub fn recv(&mut self) -> Result<RecvEvent, TransportError> {
        let mut buf = [0u8; 65536];
        let Some((len, from)) = self.socket.try_recv_from(&mut buf)? else {
            return Ok(RecvEvent::Empty);
        };

        let datagram = Datagram::decode(&buf[..len])?;
        let newest = self
            .crypto
            .highest_recv_seq()
            .is_none_or(|h| datagram.seq > h);
        let plaintext = self.crypto.decrypt(datagram.seq, &datagram.body)?;

        // Authentication is what vouches for the source address; an
        // authenticated datagram from a new address means the peer
        // roamed, and replies must follow it there. Only the strictly
        // newest sequence number moves the address, so a delayed
        // datagram from before a roam cannot drag it backwards.
        self.last_heard = Some(Instant::now());
        if from != self.peer && newest {
            info!(old = %self.peer, new = %from, "peer address changed");
            self.peer = from;
        }

        let fragment = Fragment::from_bytes(&plaintext)?;
        let Some(message_bytes) = self.assembly.add(fragment)? else {
            return Ok(RecvEvent::Partial);
        };

        let message = SyncMessage::decode(&message_bytes)?;
        self.handle_message(message)
    }

    fn handle_message(&mut self, msg: SyncMessage) -> Result<RecvEvent, TransportError> {
        self.stats.messages_received += 1;

        if let Some(rtt) = self.timing.on_message(msg.timestamp, msg.timestamp_echo) {
            trace!(rtt_ms = rtt.as_millis() as u64, "rtt sample");
        }

        if self.sent.on_ack(msg.acked_state_num) {
            self.timing.on_ack();
        }
        // Drop the in-flight delta once it is acknowledged, and also
        // when the acknowledged baseline moved past its base: the next
        // tick then diffs from the newer baseline instead of repeating
        // a payload the receiver may no longer have an anchor for.
        let acked = self.sent.peer_acked();
        if self
            .pending
            .as_ref()
            .is_some_and(|p| p.target <= acked || p.base < acked)
        {
            self.pending = None;
        }

        if msg.has_shutdown_flag() {
            self.shutdown.on_peer_flag();
            // Answer the flag promptly rather than at heartbeat pace.
            self.needs_ack = true;
        }

        if msg.is_ack_only() {
            return Ok(RecvEvent::AckOnly);
        }

        match self
            .received
            .apply(msg.base_state_num, msg.new_state_num, &msg.diff)
        {
            Ok(ApplyOutcome::Applied) => {
                self.needs_ack = true;
                debug!(state = msg.new_state_num, "applied remote state");
                Ok(RecvEvent::Applied(msg.new_state_num))
            }
            Ok(ApplyOutcome::Duplicate) => {
                // Our ack may have been lost; repeat it.
                self.needs_ack = true;
                Ok(RecvEvent::Duplicate)
            }
            // Withholding the ack makes the sender fall back to an
            // older baseline, eventually state 0.
            Err(err) => Err(err),
        }
    }

    /// Publish a new local state snapshot; returns its state number.
    ///
    /// The snapshot is not sent here. The next [`tick`](Self::tick)
    /// computes the diff against whatever baseline the peer has
    /// acknowledged by then, so rapid updates collapse into one delta.
    pub fn set_current_state(&mut self, state: L) -> u64 {
        self.sent.record(state)
    }

    /// Send whatever the protocol owes the peer right now, if anything.
    pub fn tick(&mut self) -> Result<(), TransportError> {
        if self.shutdown.phase() == ShutdownPhase::Closed {
            return Ok(());
        }
        let now = Instant::now();

        // Newest state not yet in flight: cut a fresh delta.
        let fresh_due = match &self.pending {
            Some(p) => self.sent.current_num() > p.target,
            None => self.sent.has_unacked(),
        };
        if fresh_due {
            let target = self.sent.current_num();
            let (base_num, base) = self.sent.baseline();
            let diff = self.sent.current().diff_from(base);
            let payload = if L::is_diff_empty(&diff) {
                Vec::new()
            } else {
                L::encode_diff(&diff)
            };

            let msg = SyncMessage::new(
                base_num,
                target,
                self.received.last_applied(),
                payload.clone(),
            );
            self.pending = Some(PendingDelta {
                base: base_num,
                target,
                payload,
                sent_at: now,
                retransmits: 0,
            });
            self.needs_ack = false;
            let flagged = self.send_message(msg, now)?;
            if flagged {
                self.shutdown.on_flag_sent();
            }
            return Ok(());
        }

        // In-flight delta hit its timeout: resend the exact bytes.
        if let Some(p) = &self.pending {
            if self.timing.retransmit_due(p.sent_at, now) {
                let msg = SyncMessage::new(
                    p.base,
                    p.target,
                    self.received.last_applied(),
                    p.payload.clone(),
                );
                if let Some(p) = &mut self.pending {
                    p.sent_at = now;
                    p.retransmits += 1;
                }
                self.stats.retransmits += 1;
                self.timing.backoff();
                self.needs_ack = false;
                let flagged = self.send_message(msg, now)?;
                if flagged {
                    self.shutdown.on_flag_sent();
                }
                return Ok(());
            }
        }

        // Otherwise an ack, a shutdown (re)send or a heartbeat may be due.
        let shutdown_due = self.shutdown.phase() == ShutdownPhase::Requested
            && self.shutdown.retries_remaining() > 0
            && (self.shutdown.flagged_sends() == 0
                || now.duration_since(self.last_send) >= self.timing.rto());
        if self.needs_ack || shutdown_due || self.timing.heartbeat_due(self.last_send, now) {
            let msg = SyncMessage::ack_only(self.sent.current_num(), self.received.last_applied());
            self.needs_ack = false;
            let flagged = self.send_message(msg, now)?;
            if flagged {
                self.shutdown.on_flag_sent();
            }
        }
        Ok(())
    }

    /// How long the embedding loop may sleep before the next
    /// [`tick`](Self::tick), assuming no datagram arrives sooner.
    pub fn wait_time(&self) -> Duration {
        let now = Instant::now();

        if self.needs_ack {
            return Duration::ZERO;
        }
        let fresh_due = match &self.pending {
            Some(p) => self.sent.current_num() > p.target,
            None => self.sent.has_unacked(),
        };
        if fresh_due {
            return Duration::ZERO;
        }

        let shutdown_pacing = self.shutdown.phase() == ShutdownPhase::Requested
            && self.shutdown.retries_remaining() > 0;
        if shutdown_pacing && self.shutdown.flagged_sends() == 0 {
            return Duration::ZERO;
        }

        let mut wait = self.timing.time_until_next_action(
            self.pending.as_ref().map(|p| p.sent_at),
            self.last_send,
            now,
        );
        if shutdown_pacing {
            wait = wait.min((self.last_send + self.timing.rto()).saturating_duration_since(now));
        }
        wait
    }

    /// Stamp, flag, fragment, encrypt and put one message on the wire.
    /// Returns whether it carried the shutdown flag.
    fn send_message(&mut self, mut msg: SyncMessage, now: Instant) -> Result<bool, TransportError> {
        msg.timestamp = self.timing.now_ts();
        msg.timestamp_echo = self.timing.echo_ts();
        if self.shutdown.flag_outgoing() {
            msg.set_shutdown_flag();
        }
        let flagged = msg.has_shutdown_flag();

        let encoded = msg.encode();
        for fragment in self.fragmenter.fragment(&encoded)? {
            let (seq, body) = self.crypto.encrypt(&fragment.to_bytes())?;
            let wire = Datagram { seq, body }.encode();
            if !self.socket.try_send_to(&wire, self.peer)? {
                warn!(seq, "outbound buffer full, dropping datagram");
                self.stats.dropped_sends += 1;
            }
        }

        self.timing.on_send(msg.timestamp);
        self.last_send = now;
        self.stats.messages_sent += 1;
        Ok(flagged)
    }

    /// Begin the shutdown handshake.
    pub fn start_shutdown(&mut self) {
        self.shutdown.start();
    }

    /// Whether the peer has answered our shutdown request.
    pub fn shutdown_acknowledged(&self) -> bool {
        self.shutdown.acknowledged()
    }

    /// Whether we gave up waiting for a shutdown answer.
    pub fn shutdown_ack_timed_out(&self) -> bool {
        self.shutdown.timed_out()
    }

    /// Whether we have flagged at least one answer to a peer-initiated
    /// shutdown request. The passive side of the handshake exits on
    /// this, without waiting for any further inbound flag.
    pub fn shutdown_ack_sent(&self) -> bool {
        self.shutdown.peer_request_acknowledged()
    }

    /// Whether a shutdown is in progress or complete.
    pub fn shutdown_in_progress(&self) -> bool {
        self.shutdown.phase() != ShutdownPhase::Open
    }

    /// Tear the session down locally. [`tick`](Self::tick) becomes a
    /// no-op; [`recv`](Self::recv) still drains the socket. Call once
    /// the handshake acknowledged, answered or timed out.
    pub fn close(&mut self) {
        self.shutdown.mark_closed();
    }

    /// Whether [`close`](Self::close) has been called.
    pub fn is_closed(&self) -> bool {
        self.shutdown.phase() == ShutdownPhase::Closed
    }

    /// Wait until the socket has a datagram to read.
    pub async fn readable(&self) -> Result<(), TransportError> {
        self.socket.readable().await
    }

    /// Current peer address (may change when the peer roams).
    pub fn peer_addr(&self) -> SocketAddr {
        self.peer
    }

    /// Local address the socket is bound to.
    pub fn local_addr(&self) -> Result<SocketAddr, TransportError> {
        self.socket.local_addr()
    }

    /// Newest local state recorded.
    pub fn current_state(&self) -> &L {
        self.sent.current()
    }

    /// Number of the newest local state.
    pub fn current_state_num(&self) -> u64 {
        self.sent.current_num()
    }

    /// Highest local state number the peer has acknowledged.
    pub fn peer_acked_num(&self) -> u64 {
        self.sent.peer_acked()
    }

    /// Newest reconstructed remote state.
    pub fn remote_state(&self) -> &R {
        self.received.latest()
    }

    /// Number of the newest reconstructed remote state.
    pub fn remote_state_num(&self) -> u64 {
        self.received.last_applied()
    }

    /// Time since the last authenticated datagram, if any arrived.
    pub fn last_heard(&self) -> Option<Duration> {
        self.last_heard.map(|t| t.elapsed())
    }

    /// Current smoothed RTT estimate.
    pub fn srtt(&self) -> Duration {
        self.timing.srtt()
    }

    /// Traffic counters.
    pub fn stats(&self) -> TransportStats {
        self.stats
    }
}

//! RTT estimation, retransmission timeout and heartbeat scheduling.

use std::time::{Duration, Instant};

/// Smoothing constants per RFC 6298.
pub mod constants {
    /// Alpha for SRTT smoothing (1/8).
    pub const SRTT_ALPHA: f64 = 0.125;

    /// Beta for RTTVAR smoothing (1/4).
    pub const RTTVAR_BETA: f64 = 0.25;

    /// K multiplier for RTO calculation.
    pub const RTO_K: f64 = 4.0;

    /// Clock granularity floor for the variance term, in milliseconds.
    pub const RTO_GRANULARITY_MS: f64 = 50.0;
}

/// Smoothed RTT / variance estimator with a clamped, backoff-capable RTO.
#[derive(Debug, Clone)]
pub struct RttEstimator {
    srtt: f64,
    rttvar: f64,
    rto: Duration,
    min_rto: Duration,
    max_rto: Duration,
    initialized: bool,
}

impl RttEstimator {
    /// Create an estimator. `initial_rto` applies until the first sample.
    pub fn new(initial_rto: Duration, min_rto: Duration, max_rto: Duration) -> Self {
        Self {
            srtt: 0.0,
            rttvar: 0.0,
            rto: initial_rto,
            min_rto,
            max_rto,
            initialized: false,
        }
    }

    /// Feed one RTT sample.
    pub fn update(&mut self, sample: Duration) {
        let sample_ms = sample.as_secs_f64() * 1000.0;

        if !self.initialized {
            self.srtt = sample_ms;
            self.rttvar = sample_ms / 2.0;
            self.initialized = true;
        } else {
            self.rttvar = (1.0 - constants::RTTVAR_BETA) * self.rttvar
                + constants::RTTVAR_BETA * (self.srtt - sample_ms).abs();
            self.srtt =
                (1.0 - constants::SRTT_ALPHA) * self.srtt + constants::SRTT_ALPHA * sample_ms;
        }

        self.rto = self.clamped_rto();
    }

    fn clamped_rto(&self) -> Duration {
        let rto_ms = self.srtt
            + f64::max(constants::RTO_GRANULARITY_MS, constants::RTO_K * self.rttvar);
        let rto_ms = rto_ms.clamp(
            self.min_rto.as_millis() as f64,
            self.max_rto.as_millis() as f64,
        );
        Duration::from_millis(rto_ms as u64)
    }

    /// Current smoothed RTT.
    pub fn srtt(&self) -> Duration {
        Duration::from_secs_f64(self.srtt / 1000.0)
    }

    /// Current retransmission timeout.
    pub fn rto(&self) -> Duration {
        self.rto
    }

    /// Whether at least one sample has arrived.
    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    /// Double the RTO after a retransmission, up to the ceiling.
    pub fn backoff(&mut self) -> Duration {
        self.rto = (self.rto.saturating_mul(2)).min(self.max_rto);
        self.rto
    }

    /// Drop any accumulated backoff once an acknowledgement lands.
    pub fn reset_backoff(&mut self) {
        self.rto = if self.initialized {
            self.clamped_rto()
        } else {
            self.min_rto.max(self.rto.min(self.max_rto))
        };
    }
}

/// Millisecond timestamps exchanged for RTT measurement.
///
/// Every message carries our clock and echoes the latest value heard
/// from the peer; when our own value comes back we have one sample.
#[derive(Debug, Clone)]
pub struct TimestampTracker {
    session_start: Instant,
    last_peer_timestamp: u32,
    pending_timestamp: Option<u32>,
    pending_send_time: Option<Instant>,
}

impl TimestampTracker {
    /// Start the session clock now.
    pub fn new() -> Self {
        Self {
            session_start: Instant::now(),
            last_peer_timestamp: 0,
            pending_timestamp: None,
            pending_send_time: None,
        }
    }

    /// Current timestamp, milliseconds since session start.
    pub fn now(&self) -> u32 {
        self.session_start.elapsed().as_millis() as u32
    }

    /// Value to echo back to the peer.
    pub fn echo(&self) -> u32 {
        self.last_peer_timestamp
    }

    /// Note the timestamp we just sent, if none is already in flight.
    ///
    /// Keeping the oldest pending value biases samples toward the
    /// datagram that actually waited longest, which is the conservative
    /// choice for RTO.
    pub fn on_send(&mut self, timestamp: u32) {
        if self.pending_timestamp.is_none() {
            self.pending_timestamp = Some(timestamp);
            self.pending_send_time = Some(Instant::now());
        }
    }

    /// Process a received message's timestamps; returns an RTT sample
    /// when the echo matches our pending timestamp.
    pub fn on_receive(&mut self, peer_timestamp: u32, echo: u32) -> Option<Duration> {
        self.last_peer_timestamp = peer_timestamp;

        match (self.pending_timestamp, self.pending_send_time) {
            (Some(pending), Some(send_time)) if echo == pending => {
                self.pending_timestamp = None;
                self.pending_send_time = None;
                Some(send_time.elapsed())
            }
            _ => None,
        }
    }
}

impl Default for TimestampTracker {
    fn default() -> Self {
        Self::new()
    }
}

/// Owns the RTT estimator, the timestamp exchange and the heartbeat
/// schedule; answers "when must the event loop wake up next".
#[derive(Debug)]
pub struct TimingController {
    rtt: RttEstimator,
    timestamps: TimestampTracker,
    heartbeat_interval: Duration,
}

impl TimingController {
    /// Assemble the controller from configured bounds.
    pub fn new(
        initial_rto: Duration,
        min_rto: Duration,
        max_rto: Duration,
        heartbeat_interval: Duration,
    ) -> Self {
        Self {
            rtt: RttEstimator::new(initial_rto, min_rto, max_rto),
            timestamps: TimestampTracker::new(),
            heartbeat_interval,
        }
    }

    /// Timestamp for an outgoing message.
    pub fn now_ts(&self) -> u32 {
        self.timestamps.now()
    }

    /// Echo value for an outgoing message.
    pub fn echo_ts(&self) -> u32 {
        self.timestamps.echo()
    }

    /// Record an outgoing message's timestamp.
    pub fn on_send(&mut self, timestamp: u32) {
        self.timestamps.on_send(timestamp);
    }

    /// Digest an incoming message's timestamps; feeds the estimator and
    /// returns the sample, if the message closed the loop.
    pub fn on_message(&mut self, timestamp: u32, echo: u32) -> Option<Duration> {
        let sample = self.timestamps.on_receive(timestamp, echo)?;
        self.rtt.update(sample);
        Some(sample)
    }

    /// The sent state was acknowledged: shed retransmission backoff.
    pub fn on_ack(&mut self) {
        self.rtt.reset_backoff();
    }

    /// Double the RTO after an unacknowledged retransmission.
    pub fn backoff(&mut self) -> Duration {
        self.rtt.backoff()
    }

    /// Current retransmission timeout.
    pub fn rto(&self) -> Duration {
        self.rtt.rto()
    }

    /// Current smoothed RTT estimate.
    pub fn srtt(&self) -> Duration {
        self.rtt.srtt()
    }

    /// Heartbeat interval for idle liveness traffic.
    pub fn heartbeat_interval(&self) -> Duration {
        self.heartbeat_interval
    }

    /// Whether an unacknowledged send from `sent_at` has hit its RTO.
    pub fn retransmit_due(&self, sent_at: Instant, now: Instant) -> bool {
        now.duration_since(sent_at) >= self.rtt.rto()
    }

    /// Whether idle time since `last_send` calls for a heartbeat.
    pub fn heartbeat_due(&self, last_send: Instant, now: Instant) -> bool {
        now.duration_since(last_send) >= self.heartbeat_interval
    }

    /// Time until the next scheduled action: the earlier of the pending
    /// retransmission deadline and the heartbeat deadline.
    pub fn time_until_next_action(
        &self,
        pending_sent_at: Option<Instant>,
        last_send: Instant,
        now: Instant,
    ) -> Duration {
        let mut deadline = last_send + self.heartbeat_interval;
        if let Some(sent_at) = pending_sent_at {
            deadline = deadline.min(sent_at + self.rtt.rto());
        }
        deadline.saturating_duration_since(now)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn estimator() -> RttEstimator {
        RttEstimator::new(
            Duration::from_millis(1000),
            Duration::from_millis(50),
            Duration::from_millis(60_000),
        )
    }

    #[test]
    fn initial_rto_before_first_sample() {
        let est = estimator();
        assert!(!est.is_initialized());
        assert_eq!(est.rto(), Duration::from_millis(1000));
    }

    #[test]
    fn first_sample_seeds_srtt_and_variance() {
        let mut est = estimator();
        est.update(Duration::from_millis(100));
        assert!(est.is_initialized());
        assert_eq!(est.srtt(), Duration::from_millis(100));
        // RTO = SRTT + 4 * (sample/2) = 100 + 200
        assert_eq!(est.rto(), Duration::from_millis(300));
    }

    #[test]
    fn srtt_moves_toward_new_samples() {
        let mut est = estimator();
        est.update(Duration::from_millis(100));
        est.update(Duration::from_millis(200));
        let srtt = est.srtt();
        assert!(srtt > Duration::from_millis(100));
        assert!(srtt < Duration::from_millis(200));
    }

    #[test]
    fn rto_respects_floor_and_ceiling() {
        let mut est = RttEstimator::new(
            Duration::from_millis(100),
            Duration::from_millis(80),
            Duration::from_millis(400),
        );
        est.update(Duration::from_micros(100));
        assert!(est.rto() >= Duration::from_millis(80));

        est.update(Duration::from_secs(10));
        assert!(est.rto() <= Duration::from_millis(400));
    }

    #[test]
    fn backoff_doubles_and_ack_resets() {
        let mut est = estimator();
        est.update(Duration::from_millis(100));
        let base = est.rto();

        assert_eq!(est.backoff(), base * 2);
        assert_eq!(est.backoff(), base * 4);

        est.reset_backoff();
        assert_eq!(est.rto(), base);
    }

    #[test]
    fn backoff_caps_at_ceiling() {
        let mut est = estimator();
        est.update(Duration::from_millis(100));
        for _ in 0..20 {
            est.backoff();
        }
        assert_eq!(est.rto(), Duration::from_millis(60_000));
    }

    #[test]
    fn timestamp_echo_yields_sample() {
        let mut tracker = TimestampTracker::new();
        tracker.on_send(1000);
        std::thread::sleep(Duration::from_millis(10));
        let rtt = tracker.on_receive(2000, 1000).unwrap();
        assert!(rtt >= Duration::from_millis(10));
        assert_eq!(tracker.echo(), 2000);
    }

    #[test]
    fn mismatched_echo_is_not_a_sample() {
        let mut tracker = TimestampTracker::new();
        tracker.on_send(1000);
        assert!(tracker.on_receive(2000, 999).is_none());
        // The pending value is still waiting for its echo.
        assert!(tracker.on_receive(2001, 1000).is_some());
    }

    #[test]
    fn oldest_pending_timestamp_wins() {
        let mut tracker = TimestampTracker::new();
        tracker.on_send(10);
        tracker.on_send(20);
        // Echo of the newer value does not match; the older is pending.
        assert!(tracker.on_receive(1, 20).is_none());
        assert!(tracker.on_receive(2, 10).is_some());
    }

    #[test]
    fn next_action_is_earliest_deadline() {
        let ctl = TimingController::new(
            Duration::from_millis(200),
            Duration::from_millis(50),
            Duration::from_millis(60_000),
            Duration::from_millis(3000),
        );
        let now = Instant::now();

        // Idle: heartbeat bounds the wait.
        let wait = ctl.time_until_next_action(None, now, now);
        assert!(wait <= Duration::from_millis(3000));
        assert!(wait > Duration::from_millis(2900));

        // With an unacked send, the RTO deadline is sooner.
        let wait = ctl.time_until_next_action(Some(now), now, now);
        assert!(wait <= Duration::from_millis(200));

        // A deadline in the past means act immediately.
        let later = now + Duration::from_secs(10);
        assert_eq!(
            ctl.time_until_next_action(Some(now), now, later),
            Duration::ZERO
        );
    }
}

use std::sync::Arc;
use std::time::{Instant, SystemTime, UNIX_EPOCH};

use parking_lot::Mutex;

use super::SenderReport;

/// Default H.264 media clock (RFC 6184 §8.1).
pub const DEFAULT_CLOCK_RATE: u32 = 90_000;

/// Forward sequence gap still accepted as in-order (RFC 3550 A.1).
const MAX_DROPOUT: u16 = 3000;
/// Backward sequence gap treated as a late packet rather than a restart.
const MAX_MISORDER: u16 = 100;

/// Synchronization anchor and reception statistics for one stream.
///
/// Written by the RTCP path on each Sender Report and by the media path
/// on each packet; every update happens under one lock so readers never
/// see a half-applied anchor.
#[derive(Debug, Clone, Default)]
pub struct ClockState {
    /// Wall-clock time of the latest Sender Report, µs since the Unix epoch.
    pub latest_ntp_time_us: i64,
    /// RTP timestamp paired with `latest_ntp_time_us`.
    pub latest_rtp_timestamp: u32,
    /// Media clock used for the jitter estimate.
    pub clock_rate_hz: u32,
    /// Extended (cycle-counted) highest sequence number received.
    pub highest_sequence_seen: u32,
    /// RFC 3550 §6.4.1 interarrival jitter, in timestamp units.
    pub jitter_estimate: u32,
    /// SSRC of the camera, taken from its Sender Reports.
    pub sender_ssrc: u32,
    /// Middle 32 bits of the latest SR's NTP timestamp (LSR).
    pub last_sr_ntp: u32,
    /// Local instant the latest SR arrived.
    pub last_sr_received: Option<Instant>,
    packets_received: u64,
    max_sequence: u16,
    sequence_cycles: u16,
    bad_sequence: Option<u16>,
    jitter: f64,
    prev_arrival: Option<(Instant, u32)>,
}

impl ClockState {
    pub fn new(clock_rate_hz: u32) -> Self {
        Self {
            clock_rate_hz,
            ..Default::default()
        }
    }

    /// Whether at least one Sender Report has anchored the media clock.
    pub fn is_synchronized(&self) -> bool {
        self.last_sr_received.is_some()
    }

    /// Map an RTP timestamp to wall-clock µs using the latest anchor.
    ///
    /// `latest_ntp + (t - latest_rtp) * 1e6 / clock_rate`, truncated to whole
    /// microseconds. `clock_rate_hz` is the rate of the payload type the
    /// timestamp belongs to. The difference is taken without wraparound
    /// handling, so a 32-bit timestamp wrap between two Sender Reports
    /// yields a discontinuity until the next report re-anchors the clock.
    pub fn wall_clock_us(&self, rtp_timestamp: u32, clock_rate_hz: u32) -> Option<i64> {
        if !self.is_synchronized() || clock_rate_hz == 0 {
            return None;
        }
        let ticks = rtp_timestamp as i64 - self.latest_rtp_timestamp as i64;
        Some(self.latest_ntp_time_us + ticks * 1_000_000 / clock_rate_hz as i64)
    }

    /// Install a new synchronization anchor from a Sender Report.
    pub fn apply_sender_report(&mut self, sr: &SenderReport, received: Instant) {
        self.latest_ntp_time_us = sr.unix_time_us();
        self.latest_rtp_timestamp = sr.rtp_timestamp;
        self.sender_ssrc = sr.ssrc;
        self.last_sr_ntp = sr.ntp_middle_bits();
        self.last_sr_received = Some(received);
    }

    /// Record one media packet for the receiver-report statistics.
    ///
    /// Sequence numbers are extended as in RFC 3550 A.1: a small forward
    /// step advances the highest number (counting a cycle on wrap), a
    /// small backward step is a late packet and changes nothing. A large
    /// jump is accepted only once the packet after it follows on.
    pub fn record_arrival(&mut self, sequence: u16, rtp_timestamp: u32, arrival: Instant) {
        if self.packets_received == 0 {
            self.max_sequence = sequence;
        } else {
            let delta = sequence.wrapping_sub(self.max_sequence);
            if delta < MAX_DROPOUT {
                if sequence < self.max_sequence {
                    self.sequence_cycles = self.sequence_cycles.wrapping_add(1);
                }
                self.max_sequence = sequence;
                self.bad_sequence = None;
            } else if delta <= u16::MAX - MAX_MISORDER {
                if self.bad_sequence == Some(sequence) {
                    tracing::debug!(sequence, "sequence number jump accepted");
                    self.max_sequence = sequence;
                    self.bad_sequence = None;
                } else {
                    self.bad_sequence = Some(sequence.wrapping_add(1));
                }
            }
        }
        self.packets_received += 1;
        self.highest_sequence_seen =
            ((self.sequence_cycles as u32) << 16) | self.max_sequence as u32;

        if let Some((prev_instant, prev_ts)) = self.prev_arrival
            && self.clock_rate_hz != 0
        {
            let elapsed = arrival.saturating_duration_since(prev_instant);
            let arrival_ticks =
                (elapsed.as_micros() as i128 * self.clock_rate_hz as i128 / 1_000_000) as i64;
            let media_ticks = rtp_timestamp.wrapping_sub(prev_ts) as i32 as i64;
            let d = (arrival_ticks - media_ticks).unsigned_abs() as f64;
            self.jitter += (d - self.jitter) / 16.0;
            self.jitter_estimate = self.jitter as u32;
        }
        self.prev_arrival = Some((arrival, rtp_timestamp));
    }
}

/// Handle to the [`ClockState`] shared by the media and control paths.
///
/// Backed by `parking_lot::Mutex`: the RTCP path installs anchors, the
/// media path records arrivals and reads anchors, each under one lock.
#[derive(Debug, Clone)]
pub struct SharedClock {
    state: Arc<Mutex<ClockState>>,
}

impl SharedClock {
    pub fn new(clock_rate_hz: u32) -> Self {
        Self {
            state: Arc::new(Mutex::new(ClockState::new(clock_rate_hz))),
        }
    }

    /// Consistent copy of the current state.
    pub fn snapshot(&self) -> ClockState {
        self.state.lock().clone()
    }

    pub fn apply_sender_report(&self, sr: &SenderReport, received: Instant) {
        let mut state = self.state.lock();
        state.apply_sender_report(sr, received);
        tracing::debug!(
            ssrc = format_args!("{:#010X}", sr.ssrc),
            ntp_us = state.latest_ntp_time_us,
            rtp_ts = state.latest_rtp_timestamp,
            "clock anchored from sender report"
        );
    }

    pub fn record_arrival(&self, sequence: u16, rtp_timestamp: u32, arrival: Instant) {
        self.state
            .lock()
            .record_arrival(sequence, rtp_timestamp, arrival);
    }

    /// Wall-clock capture time for an RTP timestamp.
    ///
    /// Before the first Sender Report there is no anchor; the local receive
    /// time stands in.
    pub fn capture_time_us(&self, rtp_timestamp: u32, clock_rate_hz: u32) -> i64 {
        match self.state.lock().wall_clock_us(rtp_timestamp, clock_rate_hz) {
            Some(us) => us,
            None => now_us(),
        }
    }
}

/// Current system time in µs since the Unix epoch.
pub fn now_us() -> i64 {
    match SystemTime::now().duration_since(UNIX_EPOCH) {
        Ok(d) => d.as_micros() as i64,
        Err(e) => -(e.duration().as_micros() as i64),
    }
}

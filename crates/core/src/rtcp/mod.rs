//! RTCP clock synchronization (RFC 3550 §6).
//!
//! The camera's Sender Reports carry the only mapping between its RTP
//! media clock and wall-clock time. This module decodes them into the
//! shared [`ClockState`], and answers each one with a Receiver Report
//! chained to an SDES packet so the camera keeps streaming.
//!
//! ## Sender Report (PT=200)
//!
//! ```text
//!  0                   1                   2                   3
//!  0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |V=2|P|    RC   |   PT=SR=200   |             length            |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |                         SSRC of sender                        |
//! +=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+
//! |              NTP timestamp, most significant word             |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |             NTP timestamp, least significant word             |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |                         RTP timestamp                         |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |                     sender's packet count                     |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |                      sender's octet count                     |
//! +=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+
//! ```

pub mod clock;

use std::time::Instant;

use crate::error::{IngestError, Result};
pub use clock::{ClockState, SharedClock};

/// Seconds between the NTP epoch (1900-01-01) and the Unix epoch (1970-01-01).
pub const NTP_UNIX_OFFSET_SECS: u64 = 2_208_988_800;

pub const PT_SENDER_REPORT: u8 = 200;
pub const PT_RECEIVER_REPORT: u8 = 201;
pub const PT_SOURCE_DESCRIPTION: u8 = 202;

/// Length of the Receiver Report + SDES reply.
pub const RECEIVER_REPORT_LEN: usize = 48;

/// CNAME item carried in every SDES reply.
const CNAME: &[u8; 4] = b"h264";

const SENDER_REPORT_LEN: usize = 28;

/// A decoded RTCP Sender Report (RFC 3550 §6.4.1); report blocks are ignored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SenderReport {
    pub ssrc: u32,
    /// 64-bit fixed point, seconds since 1900-01-01.
    pub ntp_timestamp: u64,
    /// Media clock at the instant `ntp_timestamp` was sampled.
    pub rtp_timestamp: u32,
    pub packet_count: u32,
    pub octet_count: u32,
}

impl SenderReport {
    /// Parse a single SR packet, RTCP header included.
    pub fn parse(packet: &[u8]) -> Result<Self> {
        if packet.len() < SENDER_REPORT_LEN {
            return Err(IngestError::TruncatedPacket {
                needed: SENDER_REPORT_LEN,
                actual: packet.len(),
            });
        }
        let word = |at: usize| {
            u32::from_be_bytes([packet[at], packet[at + 1], packet[at + 2], packet[at + 3]])
        };
        Ok(Self {
            ssrc: word(4),
            ntp_timestamp: ((word(8) as u64) << 32) | word(12) as u64,
            rtp_timestamp: word(16),
            packet_count: word(20),
            octet_count: word(24),
        })
    }

    /// The NTP timestamp converted to µs since the Unix epoch.
    pub fn unix_time_us(&self) -> i64 {
        ntp_to_unix_us(self.ntp_timestamp)
    }

    /// Middle 32 bits of the NTP timestamp, echoed as LSR in receiver reports.
    pub fn ntp_middle_bits(&self) -> u32 {
        (self.ntp_timestamp >> 16) as u32
    }
}

/// Convert a 64-bit NTP timestamp to µs since the Unix epoch.
///
/// The fraction word is scaled as 32-bit fixed point and truncated to
/// whole microseconds.
pub fn ntp_to_unix_us(ntp: u64) -> i64 {
    let seconds = (ntp >> 32) as i64 - NTP_UNIX_OFFSET_SECS as i64;
    let fraction_us = ((ntp & 0xFFFF_FFFF) * 1_000_000) >> 32;
    seconds * 1_000_000 + fraction_us as i64
}

/// Find the first Sender Report in a (possibly compound) RTCP datagram.
///
/// Walks each packet by its length field. Non-SR packets are skipped;
/// `Ok(None)` means the datagram carried no SR.
pub fn find_sender_report(datagram: &[u8]) -> Result<Option<SenderReport>> {
    let mut offset = 0usize;
    while offset < datagram.len() {
        let rest = &datagram[offset..];
        if rest.len() < 4 {
            return Err(IngestError::TruncatedPacket {
                needed: offset + 4,
                actual: datagram.len(),
            });
        }
        let version = rest[0] >> 6;
        if version != 2 {
            return Err(IngestError::UnsupportedVersion(version));
        }
        let packet_type = rest[1];
        let len = (u16::from_be_bytes([rest[2], rest[3]]) as usize + 1) * 4;
        if rest.len() < len {
            return Err(IngestError::TruncatedPacket {
                needed: offset + len,
                actual: datagram.len(),
            });
        }
        if packet_type == PT_SENDER_REPORT {
            return SenderReport::parse(&rest[..len]).map(Some);
        }
        tracing::trace!(packet_type, len, "skipping RTCP packet");
        offset += len;
    }
    Ok(None)
}

/// Receiver Report with a single report block (RFC 3550 §6.4.2).
///
/// Loss accounting is not implemented: fraction lost and cumulative lost
/// are always zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReceiverReport {
    /// Our own SSRC.
    pub reporter_ssrc: u32,
    /// The camera's SSRC.
    pub reported_ssrc: u32,
    pub extended_highest_sequence: u32,
    pub jitter: u32,
    /// Middle 32 bits of the last SR's NTP timestamp.
    pub last_sr: u32,
    /// Delay since the last SR, in units of 1/65536 s.
    pub delay_since_last_sr: u32,
}

impl ReceiverReport {
    /// Build a report from the current clock state.
    pub fn from_state(reporter_ssrc: u32, state: &ClockState, now: Instant) -> Self {
        let delay_since_last_sr = match state.last_sr_received {
            Some(at) => {
                let elapsed = now.saturating_duration_since(at);
                (elapsed.as_micros() * 65_536 / 1_000_000).min(u32::MAX as u128) as u32
            }
            None => 0,
        };
        Self {
            reporter_ssrc,
            reported_ssrc: state.sender_ssrc,
            extended_highest_sequence: state.highest_sequence_seen,
            jitter: state.jitter_estimate,
            last_sr: state.last_sr_ntp,
            delay_since_last_sr,
        }
    }

    /// Serialize as RR (8 words) chained with SDES (4 words).
    ///
    /// ```text
    /// RR:   81 C9 00 07 | reporter SSRC | reported SSRC | lost (0)
    ///       | ext. highest seq | jitter | LSR | DLSR
    /// SDES: 81 CA 00 03 | reporter SSRC | CNAME item, null-padded
    /// ```
    pub fn to_bytes(&self) -> [u8; RECEIVER_REPORT_LEN] {
        let mut buf = [0u8; RECEIVER_REPORT_LEN];
        buf[0] = 0x81;
        buf[1] = PT_RECEIVER_REPORT;
        buf[2..4].copy_from_slice(&7u16.to_be_bytes());
        buf[4..8].copy_from_slice(&self.reporter_ssrc.to_be_bytes());
        buf[8..12].copy_from_slice(&self.reported_ssrc.to_be_bytes());
        // fraction lost + cumulative lost stay zero
        buf[16..20].copy_from_slice(&self.extended_highest_sequence.to_be_bytes());
        buf[20..24].copy_from_slice(&self.jitter.to_be_bytes());
        buf[24..28].copy_from_slice(&self.last_sr.to_be_bytes());
        buf[28..32].copy_from_slice(&self.delay_since_last_sr.to_be_bytes());

        buf[32] = 0x81;
        buf[33] = PT_SOURCE_DESCRIPTION;
        buf[34..36].copy_from_slice(&3u16.to_be_bytes());
        buf[36..40].copy_from_slice(&self.reporter_ssrc.to_be_bytes());
        buf[40] = 1; // CNAME
        buf[41] = CNAME.len() as u8;
        buf[42..46].copy_from_slice(CNAME);
        // buf[46..48]: end-of-list null + padding
        buf
    }
}

/// Control-path handler: turns SR datagrams into clock anchors and replies.
#[derive(Debug, Clone)]
pub struct RtcpSynchronizer {
    clock: SharedClock,
    reporter_ssrc: u32,
}

impl RtcpSynchronizer {
    pub fn new(clock: SharedClock, reporter_ssrc: u32) -> Self {
        Self {
            clock,
            reporter_ssrc,
        }
    }

    /// Synchronizer with a random reporter SSRC (RFC 3550 §8.1).
    pub fn with_random_ssrc(clock: SharedClock) -> Self {
        Self::new(clock, rand::random::<u32>())
    }

    pub fn reporter_ssrc(&self) -> u32 {
        self.reporter_ssrc
    }

    /// Handle one control datagram.
    ///
    /// On a Sender Report, installs the new anchor and returns the
    /// RR+SDES reply to send back; other RTCP packets yield `Ok(None)`.
    pub fn handle(
        &self,
        datagram: &[u8],
        received: Instant,
    ) -> Result<Option<[u8; RECEIVER_REPORT_LEN]>> {
        let Some(sr) = find_sender_report(datagram)? else {
            return Ok(None);
        };
        self.clock.apply_sender_report(&sr, received);

        let state = self.clock.snapshot();
        let report = ReceiverReport::from_state(self.reporter_ssrc, &state, Instant::now());
        tracing::trace!(
            highest_seq = report.extended_highest_sequence,
            jitter = report.jitter,
            dlsr = report.delay_since_last_sr,
            "receiver report composed"
        );
        Ok(Some(report.to_bytes()))
    }
}

//! RTP parsing and codec depacketization.
//!
//! This module provides the [`Depacketizer`] trait and codec-specific
//! implementations that turn received RTP packets back into decodable
//! access units.
//!
//! ## RTP overview (RFC 3550)
//!
//! Every RTP packet carries a 12-byte fixed header ([`rtp::RtpPacket`])
//! containing:
//!
//! - **Sequence number** (16-bit, wrapping): arrival bookkeeping for receiver reports.
//! - **Timestamp** (32-bit): media clock, 90 kHz for video, mapped to
//!   wall-clock time through RTCP Sender Reports.
//! - **SSRC** (32-bit): identifies the camera's stream.
//! - **Marker bit**: set on the last packet of an access unit.
//!
//! ## Supported codecs
//!
//! | Codec | Module | RFC | Modes |
//! |-------|--------|-----|-------|
//! | H.264 | [`h264`] | [RFC 6184](https://tools.ietf.org/html/rfc6184) | Single NAL unit, FU-A |

pub mod bits;
pub mod h264;
pub mod rtp;
pub mod sps;

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use crate::error::Result;
use rtp::RtpPacket;

/// A reconstructed access unit handed to a [`FrameSink`](crate::sink::FrameSink).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessUnit {
    /// FourCC of the bitstream, `"h264"`.
    pub codec: &'static str,
    pub width: u32,
    pub height: u32,
    /// Annex-B bytes: `00 00 00 01`-prefixed NAL units in transmission order.
    pub payload: Vec<u8>,
    /// Wall-clock capture time in microseconds since the Unix epoch.
    pub capture_time_us: i64,
    /// Identifier of the stream this unit came from.
    pub sender_id: u32,
}

impl AccessUnit {
    /// Capture time as a [`SystemTime`]; pre-epoch values clamp to the epoch.
    pub fn capture_time(&self) -> SystemTime {
        UNIX_EPOCH + Duration::from_micros(self.capture_time_us.max(0) as u64)
    }
}

/// Codec-specific RTP depacketizer.
///
/// Each supported codec implements this trait. Packets are fed strictly in
/// arrival order; the implementation owns whatever reassembly state the
/// codec needs and emits an [`AccessUnit`] whenever one completes.
///
/// Errors are per packet: the caller logs and drops them, and the
/// depacketizer must stay usable for the next packet.
pub trait Depacketizer: Send {
    /// Consume one parsed RTP packet.
    ///
    /// Returns `Ok(Some(unit))` when the packet completed an access unit,
    /// `Ok(None)` when more packets are needed.
    fn push(&mut self, packet: &RtpPacket<'_>) -> Result<Option<AccessUnit>>;

    /// FourCC reported in emitted access units (e.g. `"h264"`).
    fn codec_name(&self) -> &'static str;

    /// RTP payload type this depacketizer is bound to.
    fn payload_type(&self) -> u8;

    /// RTP clock rate in Hz, used to turn timestamps into wall-clock time.
    fn clock_rate(&self) -> u32;
}

use std::time::Instant;

use super::rtp::RtpPacket;
use super::sps::SpsParameters;
use super::{AccessUnit, Depacketizer};
use crate::error::{IngestError, Result, SpsErrorKind};
use crate::protocol::sdp::MediaFormat;
use crate::rtcp::SharedClock;

/// Annex-B start code prefixed to every emitted NAL unit.
pub const START_CODE: [u8; 4] = [0, 0, 0, 1];

/// FU-A fragmentation unit (RFC 6184 §5.8).
pub const NAL_TYPE_FU_A: u8 = 28;

/// Default cap on a reassembled access unit.
pub const DEFAULT_MAX_ACCESS_UNIT: usize = 4 * 1024 * 1024;

/// First byte of an H.264 RTP payload: `[F|NRI|Type]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NalHeader {
    pub forbidden: bool,
    pub nri: u8,
    pub nal_type: u8,
}

impl NalHeader {
    pub fn parse(byte: u8) -> Self {
        Self {
            forbidden: byte & 0x80 != 0,
            nri: (byte >> 5) & 0x03,
            nal_type: byte & 0x1f,
        }
    }
}

/// Second byte of an FU-A payload: `[S|E|R|Type]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FuHeader {
    pub start: bool,
    pub end: bool,
    /// Type of the fragmented NAL unit.
    pub nal_type: u8,
}

impl FuHeader {
    pub fn parse(byte: u8) -> Self {
        Self {
            start: byte & 0x80 != 0,
            end: byte & 0x40 != 0,
            nal_type: byte & 0x1f,
        }
    }
}

/// Growable FU-A accumulator with a hard size cap.
///
/// Bytes are only appended. `active` is set by a start fragment and
/// cleared by an end fragment, an overflow, or an interrupting single NAL.
#[derive(Debug)]
struct ReassemblyBuffer {
    accumulated: Vec<u8>,
    active: bool,
    limit: usize,
}

impl ReassemblyBuffer {
    fn new(limit: usize) -> Self {
        Self {
            accumulated: Vec::new(),
            active: false,
            limit,
        }
    }

    fn begin(&mut self) {
        self.accumulated.clear();
        self.active = true;
    }

    fn append(&mut self, bytes: &[u8]) -> Result<()> {
        let size = self.accumulated.len() + bytes.len();
        if size > self.limit {
            self.reset();
            return Err(IngestError::AccessUnitTooLarge {
                size,
                limit: self.limit,
            });
        }
        self.accumulated.extend_from_slice(bytes);
        Ok(())
    }

    fn take(&mut self) -> Vec<u8> {
        self.active = false;
        std::mem::take(&mut self.accumulated)
    }

    fn reset(&mut self) {
        self.active = false;
        self.accumulated.clear();
    }
}

/// H.264 RTP depacketizer (RFC 6184, packetization-mode 1).
///
/// Turns RTP payloads back into Annex-B access units:
///
/// - **Single NAL Unit** (types 1–23): emitted immediately as
///   `00 00 00 01` followed by the payload after its 1-byte header.
///
/// - **FU-A** (type 28): fragments are accumulated between the start
///   and end bits. A start fragment seeds the buffer with the
///   out-of-band SPS and PPS and a reconstructed NAL header
///   (`NRI << 5 | type`), so every reassembled unit decodes on its own:
///
///   ```text
///   00 00 00 01 SPS 00 00 00 01 PPS 00 00 00 01 [hdr] frag0 frag1 ... fragN
///   ```
///
/// Packet loss is passed through: a fragment seen without a start is
/// dropped as [`IngestError::DesynchronizedFragment`], and a second start
/// discards the unfinished unit. Every processed packet's sequence number
/// is recorded in the [`SharedClock`] for receiver reports, and every
/// emitted unit is stamped with the clock's wall-clock mapping at this
/// payload type's own clock rate.
#[derive(Debug)]
pub struct H264Depacketizer {
    payload_type: u8,
    clock_rate: u32,
    sps: Option<Vec<u8>>,
    pps: Option<Vec<u8>>,
    params: SpsParameters,
    sender_id: u32,
    clock: SharedClock,
    buffer: ReassemblyBuffer,
}

impl H264Depacketizer {
    /// Create with explicit parameter sets and frame geometry.
    pub fn new(
        payload_type: u8,
        sps: Option<Vec<u8>>,
        pps: Option<Vec<u8>>,
        params: SpsParameters,
        clock: SharedClock,
        sender_id: u32,
    ) -> Self {
        Self {
            payload_type,
            clock_rate: crate::rtcp::clock::DEFAULT_CLOCK_RATE,
            sps,
            pps,
            params,
            sender_id,
            clock,
            buffer: ReassemblyBuffer::new(DEFAULT_MAX_ACCESS_UNIT),
        }
    }

    /// Create from an SDP media format, decoding its SPS for the resolution.
    ///
    /// Fails with [`IngestError::SpsDecode`] when the format carries no SPS
    /// or the SPS does not decode: without a resolution the stream cannot
    /// be set up.
    pub fn from_format(format: &MediaFormat, clock: SharedClock, sender_id: u32) -> Result<Self> {
        let sps = format.sps.as_deref().ok_or(IngestError::SpsDecode {
            kind: SpsErrorKind::Missing,
        })?;
        let params = SpsParameters::parse(sps)?;
        tracing::info!(
            pt = format.payload_type,
            width = params.width,
            height = params.height,
            fps = ?params.fps,
            "H.264 stream parameters"
        );
        let mut depacketizer = Self::new(
            format.payload_type,
            format.sps.clone(),
            format.pps.clone(),
            params,
            clock,
            sender_id,
        );
        if format.clock_rate != 0 {
            depacketizer.clock_rate = format.clock_rate;
        }
        Ok(depacketizer)
    }

    /// Override the reassembly size cap.
    pub fn with_max_access_unit(mut self, limit: usize) -> Self {
        self.buffer.limit = limit;
        self
    }

    pub fn parameters(&self) -> SpsParameters {
        self.params
    }

    fn emit(&self, payload: Vec<u8>, rtp_timestamp: u32) -> AccessUnit {
        AccessUnit {
            codec: self.codec_name(),
            width: self.params.width,
            height: self.params.height,
            payload,
            capture_time_us: self.clock.capture_time_us(rtp_timestamp, self.clock_rate()),
            sender_id: self.sender_id,
        }
    }

    fn push_single(&mut self, payload: &[u8], rtp_timestamp: u32) -> AccessUnit {
        if self.buffer.active {
            tracing::debug!(
                discarded = self.buffer.accumulated.len(),
                "single NAL interrupted FU-A reassembly"
            );
            self.buffer.reset();
        }
        let mut out = Vec::with_capacity(START_CODE.len() + payload.len() - 1);
        out.extend_from_slice(&START_CODE);
        out.extend_from_slice(&payload[1..]);
        self.emit(out, rtp_timestamp)
    }

    fn push_fragment(
        &mut self,
        indicator: NalHeader,
        payload: &[u8],
        rtp_timestamp: u32,
    ) -> Result<Option<AccessUnit>> {
        let Some(&fu_byte) = payload.get(1) else {
            return Err(IngestError::TruncatedPacket {
                needed: 2,
                actual: payload.len(),
            });
        };
        let fu = FuHeader::parse(fu_byte);

        if fu.start {
            if self.buffer.active {
                tracing::debug!(
                    discarded = self.buffer.accumulated.len(),
                    "FU-A start without end, discarding partial unit"
                );
            }
            self.buffer.begin();
            for parameter_set in [&self.sps, &self.pps].into_iter().flatten() {
                self.buffer.append(&START_CODE)?;
                self.buffer.append(parameter_set)?;
            }
            self.buffer.append(&START_CODE)?;
            self.buffer.append(&[(indicator.nri << 5) | fu.nal_type])?;
        } else if !self.buffer.active {
            return Err(IngestError::DesynchronizedFragment);
        }

        self.buffer.append(&payload[2..])?;

        if fu.end {
            let unit = self.buffer.take();
            tracing::trace!(
                nal_type = fu.nal_type,
                bytes = unit.len(),
                "FU-A access unit reassembled"
            );
            return Ok(Some(self.emit(unit, rtp_timestamp)));
        }
        Ok(None)
    }
}

impl Depacketizer for H264Depacketizer {
    fn push(&mut self, packet: &RtpPacket<'_>) -> Result<Option<AccessUnit>> {
        if packet.payload_type != self.payload_type {
            return Err(IngestError::UnknownPayloadType(packet.payload_type));
        }
        self.clock
            .record_arrival(packet.sequence_number, packet.timestamp, Instant::now());

        let payload = packet.payload;
        let first = *payload.first().ok_or(IngestError::MalformedNalHeader)?;
        let header = NalHeader::parse(first);
        if header.forbidden {
            return Err(IngestError::MalformedNalHeader);
        }

        match header.nal_type {
            1..=23 => Ok(Some(self.push_single(payload, packet.timestamp))),
            NAL_TYPE_FU_A => self.push_fragment(header, payload, packet.timestamp),
            other => Err(IngestError::UnsupportedNalType(other)),
        }
    }

    fn codec_name(&self) -> &'static str {
        "h264"
    }

    fn payload_type(&self) -> u8 {
        self.payload_type
    }

    fn clock_rate(&self) -> u32 {
        self.clock_rate
    }
}

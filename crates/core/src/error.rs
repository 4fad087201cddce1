//! Error types for the ingest library.

use std::fmt;

/// Errors that can occur while ingesting an RTP camera stream.
///
/// Variants map to specific failure modes across the stack:
///
/// - **Wire**: [`TruncatedPacket`](Self::TruncatedPacket),
///   [`UnsupportedVersion`](Self::UnsupportedVersion): malformed RTP/RTCP datagrams.
/// - **H.264**: [`MalformedNalHeader`](Self::MalformedNalHeader),
///   [`UnsupportedNalType`](Self::UnsupportedNalType),
///   [`DesynchronizedFragment`](Self::DesynchronizedFragment),
///   [`AccessUnitTooLarge`](Self::AccessUnitTooLarge).
/// - **Routing**: [`UnknownPayloadType`](Self::UnknownPayloadType).
/// - **Stream setup**: [`SpsDecode`](Self::SpsDecode), [`Sdp`](Self::Sdp),
///   [`Rtsp`](Self::Rtsp), [`RtspStatus`](Self::RtspStatus).
/// - **Receiver**: [`Io`](Self::Io), [`NotStarted`](Self::NotStarted),
///   [`AlreadyRunning`](Self::AlreadyRunning).
///
/// Per-packet variants are dropped and logged by the receive loop; only
/// setup failures ever reach the caller of [`Receiver::start`](crate::Receiver::start).
#[derive(Debug, thiserror::Error)]
pub enum IngestError {
    /// Underlying I/O or socket error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Datagram shorter than the header it claims to carry.
    #[error("truncated packet: needed {needed} bytes, got {actual}")]
    TruncatedPacket { needed: usize, actual: usize },

    /// RTP/RTCP version field other than 2.
    #[error("unsupported RTP version {0}")]
    UnsupportedVersion(u8),

    /// H.264 payload header with the forbidden bit set, or an empty payload.
    #[error("malformed H.264 NAL header")]
    MalformedNalHeader,

    /// Payload type with no entry in the configured payload table.
    #[error("unknown RTP payload type {0}")]
    UnknownPayloadType(u8),

    /// NAL unit type that is neither a single NAL unit (1-23) nor FU-A (28).
    #[error("unsupported H.264 NAL unit type {0}")]
    UnsupportedNalType(u8),

    /// FU-A continuation or end fragment arrived without a preceding start.
    #[error("FU-A fragment received without a start fragment")]
    DesynchronizedFragment,

    /// Reassembled access unit exceeded the configured cap.
    #[error("access unit of {size} bytes exceeds limit of {limit}")]
    AccessUnitTooLarge { size: usize, limit: usize },

    /// The SPS could not be decoded into a resolution.
    #[error("SPS decode error: {kind}")]
    SpsDecode { kind: SpsErrorKind },

    /// The SDP session description is unusable.
    #[error("SDP error: {kind}")]
    Sdp { kind: SdpErrorKind },

    /// Failed to exchange or parse an RTSP message.
    #[error("RTSP error: {kind}")]
    Rtsp { kind: RtspErrorKind },

    /// The RTSP server answered with a non-2xx status.
    #[error("RTSP server replied {code} {reason}")]
    RtspStatus { code: u16, reason: String },

    /// [`Receiver::start`](crate::Receiver::start) has not been called yet.
    #[error("receiver not started")]
    NotStarted,

    /// [`Receiver::start`](crate::Receiver::start) was called while already running.
    #[error("receiver already running")]
    AlreadyRunning,
}

/// Specific kind of SPS decode failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SpsErrorKind {
    /// No SPS was supplied out of band.
    Missing,
    /// The leading NAL header is not a sequence parameter set (type 7).
    NotSps(u8),
    /// The bitstream ended before the resolution fields were complete.
    Exhausted,
    /// An Exp-Golomb code had more leading zeros than fit in 32 bits.
    CodeTooLong,
}

impl fmt::Display for SpsErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Missing => write!(f, "no SPS available"),
            Self::NotSps(t) => write!(f, "NAL type {} is not an SPS", t),
            Self::Exhausted => write!(f, "bitstream exhausted"),
            Self::CodeTooLong => write!(f, "Exp-Golomb code too long"),
        }
    }
}

/// Specific kind of SDP failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SdpErrorKind {
    /// A line did not have the `<type>=<value>` shape.
    InvalidLine,
    /// An `a=rtpmap` attribute could not be parsed.
    InvalidRtpmap,
    /// `sprop-parameter-sets` was not valid base64.
    InvalidParameterSets,
    /// No H.264 payload type was described.
    NoH264Media,
}

impl fmt::Display for SdpErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidLine => write!(f, "invalid line"),
            Self::InvalidRtpmap => write!(f, "invalid rtpmap attribute"),
            Self::InvalidParameterSets => write!(f, "invalid sprop-parameter-sets"),
            Self::NoH264Media => write!(f, "no H.264 media description"),
        }
    }
}

/// Specific kind of RTSP client failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RtspErrorKind {
    /// URL is not of the form `rtsp://host[:port][/path]`.
    InvalidUrl,
    /// Server closed the connection mid-response.
    ConnectionClosed,
    /// Status line did not have the expected `RTSP/1.0 <code> <reason>` format.
    InvalidStatusLine,
    /// A header line did not contain a colon separator.
    InvalidHeader,
    /// SETUP reply lacked a usable `Transport` or `Session` header.
    MissingTransport,
}

impl fmt::Display for RtspErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidUrl => write!(f, "invalid RTSP URL"),
            Self::ConnectionClosed => write!(f, "connection closed"),
            Self::InvalidStatusLine => write!(f, "invalid status line"),
            Self::InvalidHeader => write!(f, "invalid header"),
            Self::MissingTransport => write!(f, "missing transport or session in SETUP reply"),
        }
    }
}

/// Convenience alias for `Result<T, IngestError>`.
pub type Result<T> = std::result::Result<T, IngestError>;

//! SDP (Session Description Protocol) parsing (RFC 4566 / RFC 8866).
//!
//! Reads the body of a DESCRIBE response into a payload-type table. The
//! lines that matter to an H.264 receiver:
//!
//! ```text
//! m=video 0 RTP/AVP 96                          ← media description, payload types
//! a=rtpmap:96 H264/90000                        ← codec/clock rate
//! a=fmtp:96 packetization-mode=1;sprop-parameter-sets=Z0IAHpWo,aM48gA==
//! a=control:track1                              ← track control URL
//! ```
//!
//! Everything else (`o=`, `s=`, `t=`, `b=`, ...) is accepted and ignored.

use base64::prelude::{BASE64_STANDARD, Engine as _};

use crate::error::{IngestError, Result, SdpErrorKind};

const NAL_TYPE_SPS: u8 = 7;
const NAL_TYPE_PPS: u8 = 8;

/// Codec parameters for one RTP payload type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaFormat {
    pub payload_type: u8,
    /// Encoding name from `a=rtpmap`, e.g. `H264`. Empty when no rtpmap was given.
    pub encoding: String,
    pub clock_rate: u32,
    /// SPS NAL unit (header byte included) from `sprop-parameter-sets`.
    pub sps: Option<Vec<u8>>,
    /// PPS NAL unit (header byte included) from `sprop-parameter-sets`.
    pub pps: Option<Vec<u8>>,
    /// RFC 6184 `packetization-mode`; 0 when absent.
    pub packetization_mode: u8,
    /// Absolute control URI for SETUP.
    pub control: Option<String>,
}

impl MediaFormat {
    fn new(payload_type: u8) -> Self {
        Self {
            payload_type,
            encoding: String::new(),
            clock_rate: 0,
            sps: None,
            pps: None,
            packetization_mode: 0,
            control: None,
        }
    }

    pub fn is_h264(&self) -> bool {
        self.encoding.eq_ignore_ascii_case("H264")
    }
}

/// A parsed session description: every payload type of every media section.
#[derive(Debug, Clone)]
pub struct SessionDescription {
    /// URI relative controls are resolved against.
    pub base_uri: String,
    /// Session-level `a=control`, resolved.
    pub control: Option<String>,
    pub formats: Vec<MediaFormat>,
}

impl SessionDescription {
    /// Parse an SDP body.
    ///
    /// `base_uri` is the `Content-Base` of the DESCRIBE reply (or the request
    /// URI). Within a section the latest `a=control` wins; media-level
    /// control overrides session-level control. Fails with
    /// [`SdpErrorKind::NoH264Media`] when no payload type maps to H.264.
    pub fn parse(text: &str, base_uri: &str) -> Result<Self> {
        let mut formats: Vec<MediaFormat> = Vec::new();
        let mut session_control: Option<String> = None;
        // Formats belonging to the current `m=` section.
        let mut section: Option<std::ops::Range<usize>> = None;

        for line in text.lines() {
            let line = line.trim_end_matches('\r');
            if line.is_empty() {
                continue;
            }
            let (kind, value) = line.split_once('=').ok_or(sdp_error(SdpErrorKind::InvalidLine))?;
            if kind.len() != 1 {
                return Err(sdp_error(SdpErrorKind::InvalidLine));
            }

            match kind {
                "m" => {
                    let start = formats.len();
                    // m=<media> <port> <proto> <fmt> ...
                    for fmt in value.split_whitespace().skip(3) {
                        if let Ok(pt) = fmt.parse::<u8>() {
                            formats.push(MediaFormat::new(pt));
                        }
                    }
                    section = Some(start..formats.len());
                }
                "a" => {
                    let (name, arg) = value.split_once(':').unwrap_or((value, ""));
                    match (name, section.clone()) {
                        ("control", None) => session_control = Some(arg.trim().to_string()),
                        ("control", Some(range)) => {
                            for format in &mut formats[range] {
                                format.control = Some(arg.trim().to_string());
                            }
                        }
                        ("rtpmap", Some(range)) => apply_rtpmap(&mut formats[range], arg)?,
                        ("fmtp", Some(range)) => apply_fmtp(&mut formats[range], arg)?,
                        _ => {}
                    }
                }
                _ => {}
            }
        }

        let control = session_control.map(|c| resolve_control(base_uri, &c));
        for format in &mut formats {
            format.control = match format.control.take() {
                Some(c) => Some(resolve_control(base_uri, &c)),
                None => control.clone(),
            };
        }

        if !formats.iter().any(MediaFormat::is_h264) {
            return Err(sdp_error(SdpErrorKind::NoH264Media));
        }

        tracing::debug!(
            formats = formats.len(),
            control = ?control,
            "parsed session description"
        );

        Ok(Self {
            base_uri: base_uri.to_string(),
            control,
            formats,
        })
    }

    /// All H.264 payload types in description order.
    pub fn h264_formats(&self) -> impl Iterator<Item = &MediaFormat> {
        self.formats.iter().filter(|f| f.is_h264())
    }

    pub fn format(&self, payload_type: u8) -> Option<&MediaFormat> {
        self.formats.iter().find(|f| f.payload_type == payload_type)
    }
}

fn sdp_error(kind: SdpErrorKind) -> IngestError {
    IngestError::Sdp { kind }
}

fn find_format<'a>(formats: &'a mut [MediaFormat], pt: &str) -> Option<&'a mut MediaFormat> {
    let pt: u8 = pt.trim().parse().ok()?;
    formats.iter_mut().find(|f| f.payload_type == pt)
}

/// `a=rtpmap:<pt> <encoding>/<clock>[/<channels>]`
fn apply_rtpmap(formats: &mut [MediaFormat], arg: &str) -> Result<()> {
    let (pt, mapping) = arg
        .split_once(' ')
        .ok_or(sdp_error(SdpErrorKind::InvalidRtpmap))?;
    let mut parts = mapping.trim().split('/');
    let encoding = parts.next().unwrap_or_default();
    let clock_rate = parts
        .next()
        .and_then(|c| c.parse::<u32>().ok())
        .ok_or(sdp_error(SdpErrorKind::InvalidRtpmap))?;

    if let Some(format) = find_format(formats, pt) {
        format.encoding = encoding.to_string();
        format.clock_rate = clock_rate;
    }
    Ok(())
}

/// `a=fmtp:<pt> key=value;key=value`
fn apply_fmtp(formats: &mut [MediaFormat], arg: &str) -> Result<()> {
    let Some((pt, params)) = arg.split_once(' ') else {
        return Ok(());
    };
    let Some(format) = find_format(formats, pt) else {
        return Ok(());
    };

    for param in params.split(';') {
        let Some((key, value)) = param.trim().split_once('=') else {
            continue;
        };
        match key.trim() {
            "packetization-mode" => {
                format.packetization_mode = value.trim().parse().unwrap_or(0);
            }
            "sprop-parameter-sets" => {
                for encoded in value.trim().split(',').filter(|s| !s.is_empty()) {
                    let nal = BASE64_STANDARD
                        .decode(encoded)
                        .map_err(|_| sdp_error(SdpErrorKind::InvalidParameterSets))?;
                    match nal.first().map(|b| b & 0x1f) {
                        Some(NAL_TYPE_SPS) => format.sps = Some(nal),
                        Some(NAL_TYPE_PPS) => format.pps = Some(nal),
                        other => {
                            tracing::debug!(nal_type = ?other, "ignoring parameter set");
                        }
                    }
                }
            }
            _ => {}
        }
    }
    Ok(())
}

/// Resolve an `a=control` value against the base URI (RFC 2326 §C.1.1).
fn resolve_control(base_uri: &str, control: &str) -> String {
    if control == "*" {
        base_uri.to_string()
    } else if control.contains("://") {
        control.to_string()
    } else {
        format!(
            "{}/{}",
            base_uri.trim_end_matches('/'),
            control.trim_start_matches('/')
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const BASE: &str = "rtsp://192.168.1.10:554/stream1";

    fn camera_sdp() -> String {
        [
            "v=0",
            "o=- 1 1 IN IP4 192.168.1.10",
            "s=Camera",
            "t=0 0",
            "a=control:*",
            "m=video 0 RTP/AVP 96",
            "a=rtpmap:96 H264/90000",
            "a=fmtp:96 packetization-mode=1;profile-level-id=42c01e;sprop-parameter-sets=Z0LAHtoCgPZA,aM48gA==",
            "a=control:track1",
            "",
        ]
        .join("\r\n")
    }

    #[test]
    fn parses_h264_media() {
        let sdp = SessionDescription::parse(&camera_sdp(), BASE).unwrap();
        assert_eq!(sdp.formats.len(), 1);
        let format = sdp.format(96).unwrap();
        assert!(format.is_h264());
        assert_eq!(format.clock_rate, 90_000);
        assert_eq!(format.packetization_mode, 1);
        assert_eq!(
            format.sps.as_deref(),
            Some(&[0x67, 0x42, 0xC0, 0x1E, 0xDA, 0x02, 0x80, 0xF6, 0x40][..])
        );
        assert_eq!(format.pps.as_deref(), Some(&[0x68, 0xCE, 0x3C, 0x80][..]));
        assert_eq!(format.control.as_deref(), Some("rtsp://192.168.1.10:554/stream1/track1"));
        assert_eq!(sdp.control.as_deref(), Some(BASE));
    }

    #[test]
    fn latest_control_wins() {
        let text = "v=0\nm=video 0 RTP/AVP 96\na=rtpmap:96 H264/90000\na=control:a\na=control:b\n";
        let sdp = SessionDescription::parse(text, "rtsp://cam/").unwrap();
        assert_eq!(sdp.format(96).unwrap().control.as_deref(), Some("rtsp://cam/b"));
    }

    #[test]
    fn absolute_control_is_kept() {
        let text = "v=0\nm=video 0 RTP/AVP 96\na=rtpmap:96 H264/90000\na=control:rtsp://other/track\n";
        let sdp = SessionDescription::parse(text, BASE).unwrap();
        assert_eq!(sdp.format(96).unwrap().control.as_deref(), Some("rtsp://other/track"));
    }

    #[test]
    fn session_control_is_inherited() {
        let text = "v=0\na=control:live\nm=video 0 RTP/AVP 96\na=rtpmap:96 H264/90000\n";
        let sdp = SessionDescription::parse(text, "rtsp://cam").unwrap();
        assert_eq!(sdp.format(96).unwrap().control.as_deref(), Some("rtsp://cam/live"));
    }

    #[test]
    fn multiple_payload_types() {
        let text = "v=0\n\
                    m=audio 0 RTP/AVP 0\n\
                    a=rtpmap:0 PCMU/8000\n\
                    m=video 0 RTP/AVP 96 97\n\
                    a=rtpmap:96 H264/90000\n\
                    a=rtpmap:97 H264/90000\n";
        let sdp = SessionDescription::parse(text, BASE).unwrap();
        assert_eq!(sdp.formats.len(), 3);
        let h264: Vec<u8> = sdp.h264_formats().map(|f| f.payload_type).collect();
        assert_eq!(h264, vec![96, 97]);
        assert_eq!(sdp.format(0).unwrap().clock_rate, 8000);
    }

    #[test]
    fn rtpmap_only_applies_to_its_section() {
        let text = "v=0\n\
                    m=video 0 RTP/AVP 96\n\
                    a=rtpmap:96 H264/90000\n\
                    m=audio 0 RTP/AVP 96\n\
                    a=rtpmap:96 opus/48000/2\n";
        let sdp = SessionDescription::parse(text, BASE).unwrap();
        assert_eq!(sdp.formats[0].encoding, "H264");
        assert_eq!(sdp.formats[1].encoding, "opus");
        assert_eq!(sdp.formats[1].clock_rate, 48_000);
    }

    #[test]
    fn no_h264_is_error() {
        let text = "v=0\nm=audio 0 RTP/AVP 0\na=rtpmap:0 PCMU/8000\n";
        assert!(matches!(
            SessionDescription::parse(text, BASE),
            Err(IngestError::Sdp {
                kind: SdpErrorKind::NoH264Media
            })
        ));
    }

    #[test]
    fn bad_parameter_sets_are_error() {
        let text = "v=0\nm=video 0 RTP/AVP 96\na=rtpmap:96 H264/90000\n\
                    a=fmtp:96 sprop-parameter-sets=!!!,aM48gA==\n";
        assert!(matches!(
            SessionDescription::parse(text, BASE),
            Err(IngestError::Sdp {
                kind: SdpErrorKind::InvalidParameterSets
            })
        ));
    }

    #[test]
    fn bad_rtpmap_is_error() {
        let text = "v=0\nm=video 0 RTP/AVP 96\na=rtpmap:96 H264\n";
        assert!(matches!(
            SessionDescription::parse(text, BASE),
            Err(IngestError::Sdp {
                kind: SdpErrorKind::InvalidRtpmap
            })
        ));
    }

    #[test]
    fn garbage_line_is_error() {
        assert!(matches!(
            SessionDescription::parse("not sdp", BASE),
            Err(IngestError::Sdp {
                kind: SdpErrorKind::InvalidLine
            })
        ));
    }
}

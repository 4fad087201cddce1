use crate::error::{IngestError, Result};

/// Length of the RTP fixed header in bytes (RFC 3550 §5.1).
pub const RTP_HEADER_LEN: usize = 12;

/// A parsed RTP packet borrowing its payload from the received datagram.
///
/// ```text
///  0                   1                   2                   3
///  0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |V=2|P|X|  CC   |M|     PT      |       Sequence Number         |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |                           Timestamp                           |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |                             SSRC                              |
/// +=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+
/// |                  CSRC list (CC x 32 bits)                     |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// ```
///
/// The payload excludes the CSRC list, the header extension (when X is
/// set) and any trailing padding (when P is set).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RtpPacket<'a> {
    pub version: u8,
    pub padding: bool,
    pub extension: bool,
    pub csrc_count: u8,
    pub marker: bool,
    pub payload_type: u8,
    /// 16-bit, wraps mod 65536.
    pub sequence_number: u16,
    /// Media-clock ticks, wraps mod 2^32.
    pub timestamp: u32,
    pub ssrc: u32,
    pub payload: &'a [u8],
}

impl<'a> RtpPacket<'a> {
    /// Parse a received UDP datagram.
    ///
    /// Fails with [`IngestError::TruncatedPacket`] when the datagram is
    /// shorter than the fixed header, the CSRC list, the extension, or the
    /// padding it declares. A version other than 2 is logged and parsing
    /// continues with the RFC 3550 layout.
    pub fn parse(data: &'a [u8]) -> Result<Self> {
        if data.len() < RTP_HEADER_LEN {
            return Err(IngestError::TruncatedPacket {
                needed: RTP_HEADER_LEN,
                actual: data.len(),
            });
        }

        let b0 = data[0];
        let b1 = data[1];
        let version = b0 >> 6;
        let padding = b0 & 0x20 != 0;
        let extension = b0 & 0x10 != 0;
        let csrc_count = b0 & 0x0f;

        if version != 2 {
            tracing::warn!(version, "RTP packet with unexpected version");
        }

        let mut offset = RTP_HEADER_LEN + 4 * csrc_count as usize;
        if data.len() < offset {
            return Err(IngestError::TruncatedPacket {
                needed: offset,
                actual: data.len(),
            });
        }

        if extension {
            // 16-bit profile id + 16-bit length in 32-bit words (RFC 3550 §5.3.1)
            let ext_header_end = offset + 4;
            if data.len() < ext_header_end {
                return Err(IngestError::TruncatedPacket {
                    needed: ext_header_end,
                    actual: data.len(),
                });
            }
            let words = u16::from_be_bytes([data[offset + 2], data[offset + 3]]) as usize;
            offset = ext_header_end + 4 * words;
            if data.len() < offset {
                return Err(IngestError::TruncatedPacket {
                    needed: offset,
                    actual: data.len(),
                });
            }
        }

        let mut end = data.len();
        if padding {
            let padding_len = data[end - 1] as usize;
            if offset + padding_len > end {
                return Err(IngestError::TruncatedPacket {
                    needed: offset + padding_len,
                    actual: data.len(),
                });
            }
            end -= padding_len;
        }

        Ok(Self {
            version,
            padding,
            extension,
            csrc_count,
            marker: b1 & 0x80 != 0,
            payload_type: b1 & 0x7f,
            sequence_number: u16::from_be_bytes([data[2], data[3]]),
            timestamp: u32::from_be_bytes([data[4], data[5], data[6], data[7]]),
            ssrc: u32::from_be_bytes([data[8], data[9], data[10], data[11]]),
            payload: &data[offset..end],
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn header(pt: u8, seq: u16, ts: u32, ssrc: u32) -> Vec<u8> {
        let mut buf = vec![0x80, pt];
        buf.extend_from_slice(&seq.to_be_bytes());
        buf.extend_from_slice(&ts.to_be_bytes());
        buf.extend_from_slice(&ssrc.to_be_bytes());
        buf
    }

    #[test]
    fn parses_fixed_header_and_one_byte_payload() {
        let mut data = header(96, 1000, 50000, 12345);
        data.push(0x67);
        assert_eq!(data.len(), 13);

        let p = RtpPacket::parse(&data).unwrap();
        assert_eq!(p.version, 2);
        assert!(!p.padding);
        assert!(!p.extension);
        assert_eq!(p.csrc_count, 0);
        assert!(!p.marker);
        assert_eq!(p.payload_type, 96);
        assert_eq!(p.sequence_number, 1000);
        assert_eq!(p.timestamp, 50000);
        assert_eq!(p.ssrc, 12345);
        assert_eq!(p.payload, &[0x67]);
    }

    #[test]
    fn rejects_short_datagram() {
        let err = RtpPacket::parse(&[0x80; 11]).unwrap_err();
        assert!(matches!(
            err,
            IngestError::TruncatedPacket {
                needed: 12,
                actual: 11
            }
        ));
    }

    #[test]
    fn header_only_has_empty_payload() {
        let data = header(96, 1, 2, 3);
        assert!(RtpPacket::parse(&data).unwrap().payload.is_empty());
    }

    #[test]
    fn marker_bit() {
        let mut data = header(96, 1, 2, 3);
        data[1] |= 0x80;
        let p = RtpPacket::parse(&data).unwrap();
        assert!(p.marker);
        assert_eq!(p.payload_type, 96);
    }

    #[test]
    fn padding_is_excluded() {
        let mut data = header(96, 1, 2, 3);
        data[0] |= 0x20;
        data.extend_from_slice(&[0x65, 0xAA, 0x00, 0x00, 0x03]);
        let p = RtpPacket::parse(&data).unwrap();
        assert!(p.padding);
        assert_eq!(p.payload, &[0x65, 0xAA]);
    }

    #[test]
    fn padding_longer_than_payload_rejected() {
        let mut data = header(96, 1, 2, 3);
        data[0] |= 0x20;
        data.extend_from_slice(&[0x65, 0x09]);
        assert!(matches!(
            RtpPacket::parse(&data),
            Err(IngestError::TruncatedPacket { .. })
        ));
    }

    #[test]
    fn csrc_list_is_skipped() {
        let mut data = header(96, 1, 2, 3);
        data[0] |= 0x02;
        data.extend_from_slice(&[0, 0, 0, 1, 0, 0, 0, 2]);
        data.push(0x41);
        let p = RtpPacket::parse(&data).unwrap();
        assert_eq!(p.csrc_count, 2);
        assert_eq!(p.payload, &[0x41]);
    }

    #[test]
    fn truncated_csrc_list_rejected() {
        let mut data = header(96, 1, 2, 3);
        data[0] |= 0x03;
        data.extend_from_slice(&[0, 0, 0, 1]);
        assert!(matches!(
            RtpPacket::parse(&data),
            Err(IngestError::TruncatedPacket { needed: 24, .. })
        ));
    }

    #[test]
    fn extension_is_skipped() {
        let mut data = header(96, 1, 2, 3);
        data[0] |= 0x10;
        // profile 0xBEDE, one 32-bit word of extension data
        data.extend_from_slice(&[0xBE, 0xDE, 0x00, 0x01, 1, 2, 3, 4]);
        data.push(0x41);
        let p = RtpPacket::parse(&data).unwrap();
        assert!(p.extension);
        assert_eq!(p.payload, &[0x41]);
    }

    #[test]
    fn unexpected_version_still_parses() {
        let mut data = header(96, 7, 2, 3);
        data[0] = 0x40;
        let p = RtpPacket::parse(&data).unwrap();
        assert_eq!(p.version, 1);
        assert_eq!(p.sequence_number, 7);
    }
}

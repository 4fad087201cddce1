/// Parsed RTSP `Transport` header (RFC 2326 §12.39).
///
/// ## Wire format example
///
/// ```text
/// Client → Server:
///   Transport: RTP/AVP;unicast;client_port=33056-33057
///
/// Server → Client:
///   Transport: RTP/AVP;unicast;client_port=33056-33057;server_port=50000-50001;ssrc=1A2B3C4D
/// ```
///
/// Only `RTP/AVP;unicast` over UDP is supported; interleaved TCP and
/// multicast parameters are ignored.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransportHeader {
    /// Client's (RTP, RTCP) receive ports.
    pub client_port: Option<(u16, u16)>,
    /// Server's (RTP, RTCP) send ports.
    pub server_port: Option<(u16, u16)>,
    /// SSRC the server announced for the stream.
    pub ssrc: Option<u32>,
}

impl TransportHeader {
    /// Header value requesting unicast UDP delivery to a port pair.
    pub fn request(client_rtp_port: u16, client_rtcp_port: u16) -> String {
        format!("RTP/AVP;unicast;client_port={client_rtp_port}-{client_rtcp_port}")
    }

    /// Parse the `Transport` header value.
    ///
    /// ## Examples
    ///
    /// ```
    /// use rtp_ingest::protocol::transport::TransportHeader;
    ///
    /// let th = TransportHeader::parse("RTP/AVP;unicast;client_port=8000-8001;server_port=5000-5001");
    /// assert_eq!(th.client_port, Some((8000, 8001)));
    /// assert_eq!(th.server_port, Some((5000, 5001)));
    ///
    /// assert_eq!(TransportHeader::parse("RTP/AVP;unicast").server_port, None);
    /// ```
    pub fn parse(header: &str) -> Self {
        let mut parsed = Self::default();
        for part in header.split(';') {
            let part = part.trim();
            if let Some(ports) = part.strip_prefix("client_port=") {
                parsed.client_port = port_pair(ports);
            } else if let Some(ports) = part.strip_prefix("server_port=") {
                parsed.server_port = port_pair(ports);
            } else if let Some(ssrc) = part.strip_prefix("ssrc=") {
                parsed.ssrc = u32::from_str_radix(ssrc, 16).ok();
            }
        }
        parsed
    }
}

/// `RTP-RTCP`, or a single `RTP` port with RTCP on the next one.
fn port_pair(ports: &str) -> Option<(u16, u16)> {
    match ports.split_once('-') {
        Some((rtp, rtcp)) => Some((rtp.trim().parse().ok()?, rtcp.trim().parse().ok()?)),
        None => {
            let rtp: u16 = ports.trim().parse().ok()?;
            Some((rtp, rtp.checked_add(1)?))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_server_reply() {
        let th = TransportHeader::parse(
            "RTP/AVP;unicast;client_port=33056-33057;server_port=50000-50001;ssrc=1A2B3C4D;mode=\"play\"",
        );
        assert_eq!(th.client_port, Some((33056, 33057)));
        assert_eq!(th.server_port, Some((50000, 50001)));
        assert_eq!(th.ssrc, Some(0x1A2B3C4D));
    }

    #[test]
    fn single_port_implies_rtcp_pair() {
        let th = TransportHeader::parse("RTP/AVP;unicast;server_port=6970");
        assert_eq!(th.server_port, Some((6970, 6971)));
    }

    #[test]
    fn invalid_ports_are_ignored() {
        let th = TransportHeader::parse("RTP/AVP;unicast;server_port=abc-def");
        assert_eq!(th.server_port, None);
    }

    #[test]
    fn request_value() {
        assert_eq!(
            TransportHeader::request(33056, 33057),
            "RTP/AVP;unicast;client_port=33056-33057"
        );
    }
}

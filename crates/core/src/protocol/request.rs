/// An outgoing RTSP request (RFC 2326 §6).
///
/// Serializes to the standard text format:
///
/// ```text
/// SETUP rtsp://camera/stream1/track1 RTSP/1.0\r\n
/// CSeq: 3\r\n
/// Transport: RTP/AVP;unicast;client_port=33056-33057\r\n
/// \r\n
/// ```
///
/// Uses a builder pattern: chain [`add_header`](Self::add_header), then
/// call [`serialize`](Self::serialize). The client adds `CSeq`, `Session`
/// and `User-Agent` itself.
#[must_use]
#[derive(Debug, Clone)]
pub struct RtspRequest {
    /// RTSP method (OPTIONS, DESCRIBE, SETUP, PLAY, TEARDOWN).
    pub method: String,
    /// Request-URI (e.g. `rtsp://host:port/stream/track1`).
    pub uri: String,
    pub headers: Vec<(String, String)>,
}

/// Client identification string sent with every request (RFC 2326 §12.41).
pub const USER_AGENT: &str = "rtp-ingest/0.1";

impl RtspRequest {
    pub fn new(method: &str, uri: &str) -> Self {
        RtspRequest {
            method: method.to_string(),
            uri: uri.to_string(),
            headers: Vec::new(),
        }
    }

    pub fn options(uri: &str) -> Self {
        Self::new("OPTIONS", uri)
    }

    pub fn describe(uri: &str) -> Self {
        Self::new("DESCRIBE", uri).add_header("Accept", "application/sdp")
    }

    pub fn setup(uri: &str, transport: &str) -> Self {
        Self::new("SETUP", uri).add_header("Transport", transport)
    }

    /// PLAY from the start of the live stream.
    pub fn play(uri: &str) -> Self {
        Self::new("PLAY", uri).add_header("Range", "npt=0.000-")
    }

    pub fn teardown(uri: &str) -> Self {
        Self::new("TEARDOWN", uri)
    }

    pub fn add_header(mut self, name: &str, value: &str) -> Self {
        self.headers.push((name.to_string(), value.to_string()));
        self
    }

    /// Serialize to the RTSP text wire format.
    pub fn serialize(&self) -> String {
        let mut request = format!("{} {} RTSP/1.0\r\n", self.method, self.uri);
        for (name, value) in &self.headers {
            request.push_str(&format!("{}: {}\r\n", name, value));
        }
        request.push_str("\r\n");
        request
    }
}

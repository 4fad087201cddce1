use crate::error::{IngestError, RtspErrorKind};

/// A parsed RTSP response (RFC 2326 §7).
///
/// ```text
/// RTSP/1.0 200 OK CRLF
/// *(Header: Value CRLF)
/// CRLF
/// [body]
/// ```
///
/// Header lookup is case-insensitive per RFC 2326 §4.2.
#[derive(Debug, Clone)]
pub struct RtspResponse {
    pub version: String,
    pub status_code: u16,
    pub reason: String,
    /// Headers as ordered (name, value) pairs, names as received.
    pub headers: Vec<(String, String)>,
    pub body: String,
}

impl RtspResponse {
    /// Parse a response head (status line and headers) plus its body.
    pub fn parse(head: &str, body: String) -> crate::error::Result<Self> {
        let mut lines = head.lines();

        let status_line = lines.next().ok_or(IngestError::Rtsp {
            kind: RtspErrorKind::InvalidStatusLine,
        })?;

        let mut parts = status_line.splitn(3, ' ');
        let version = parts.next().unwrap_or_default().to_string();
        let status_code: u16 = parts
            .next()
            .and_then(|code| code.parse().ok())
            .ok_or(IngestError::Rtsp {
                kind: RtspErrorKind::InvalidStatusLine,
            })?;
        let reason = parts.next().unwrap_or_default().trim().to_string();

        if !version.starts_with("RTSP/") {
            return Err(IngestError::Rtsp {
                kind: RtspErrorKind::InvalidStatusLine,
            });
        }
        if version != "RTSP/1.0" {
            tracing::warn!(version, "server sent non-RTSP/1.0 version");
        }

        let mut headers = Vec::new();
        for line in lines {
            let line = line.trim_end_matches('\r');
            if line.is_empty() {
                break;
            }
            let (name, value) = line.split_once(':').ok_or(IngestError::Rtsp {
                kind: RtspErrorKind::InvalidHeader,
            })?;
            headers.push((name.trim().to_string(), value.trim().to_string()));
        }

        Ok(RtspResponse {
            version,
            status_code,
            reason,
            headers,
            body,
        })
    }

    /// Look up a header value by name (case-insensitive, per RFC 2326 §4.2).
    pub fn get_header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    pub fn cseq(&self) -> Option<u32> {
        self.get_header("CSeq")?.parse().ok()
    }

    pub fn content_length(&self) -> usize {
        self.get_header("Content-Length")
            .and_then(|v| v.parse().ok())
            .unwrap_or(0)
    }

    /// Session identifier without the `;timeout=` parameter (RFC 2326 §12.37).
    pub fn session(&self) -> Option<&str> {
        self.get_header("Session")
            .map(|v| v.split(';').next().unwrap_or(v).trim())
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status_code)
    }
}

//! RTSP control plane and SDP (RFC 2326, RFC 4566).
//!
//! The receiver itself only speaks RTP/RTCP; this module is the client side
//! of the signaling that sets a stream up and keeps it alive.
//!
//! ## RTSP message format (RFC 2326 §4)
//!
//! RTSP messages follow HTTP/1.1 syntax with a different method set:
//!
//! ```text
//! DESCRIBE rtsp://camera/stream1 RTSP/1.0\r\n
//! CSeq: 2\r\n
//! Accept: application/sdp\r\n
//! \r\n
//! ```
//!
//! ## Methods used
//!
//! | Method | RFC section | Purpose |
//! |--------|-------------|---------|
//! | OPTIONS | §10.1 | Capability discovery, session keep-alive |
//! | DESCRIBE | §10.2 | Retrieve SDP session description |
//! | SETUP | §10.4 | Negotiate transport (UDP ports) |
//! | PLAY | §10.5 | Start media delivery |
//! | TEARDOWN | §10.7 | Destroy session |

pub mod client;
pub mod request;
pub mod response;
pub mod sdp;
pub mod transport;

pub use client::RtspClient;
pub use request::RtspRequest;
pub use response::RtspResponse;

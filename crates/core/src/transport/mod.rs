//! Network transport for the media plane.
//!
//! A camera session uses a pair of UDP sockets on consecutive local ports:
//!
//! - **RTP** (even port): media packets from the camera.
//! - **RTCP** (odd port): Sender Reports in, Receiver Reports out.
//!
//! Both sockets punch a pinhole toward the camera's server ports before
//! PLAY and are then drained by one [`receive_loop`](udp::receive_loop)
//! thread each.

pub mod udp;

pub use udp::{PUNCH_DATAGRAM, UdpTransport};

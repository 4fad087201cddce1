pub mod error;
pub mod media;
pub mod protocol;
pub mod receiver;
pub mod rtcp;
pub mod sink;
pub mod transport;

pub use error::{IngestError, Result};
pub use media::{AccessUnit, Depacketizer};
pub use protocol::client::RtspClient;
pub use protocol::sdp::{MediaFormat, SessionDescription};
pub use receiver::{ControlPlane, Receiver, ReceiverConfig, ReceiverHandle};
pub use sink::{AnnexbWriter, FrameSink, LogSink};

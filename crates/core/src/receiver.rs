use std::collections::HashMap;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use crate::error::{IngestError, Result, SdpErrorKind};
use crate::media::Depacketizer;
use crate::media::h264::{DEFAULT_MAX_ACCESS_UNIT, H264Depacketizer};
use crate::media::rtp::RtpPacket;
use crate::protocol::sdp::SessionDescription;
use crate::rtcp::clock::DEFAULT_CLOCK_RATE;
use crate::rtcp::{RtcpSynchronizer, SharedClock};
use crate::sink::FrameSink;
use crate::transport::UdpTransport;
use crate::transport::udp::receive_loop;

/// Session control operations the receive loop needs from the RTSP side.
///
/// Implemented by [`RtspClient`](crate::protocol::client::RtspClient);
/// tests substitute a recording mock.
pub trait ControlPlane {
    /// Refresh the session so the camera does not time it out.
    fn keep_alive(&mut self) -> Result<()>;
    /// End the session; called once when the loop exits.
    fn teardown(&mut self) -> Result<()>;
}

/// Receiver-level configuration.
#[derive(Debug, Clone)]
pub struct ReceiverConfig {
    /// Local address both sockets bind to.
    pub bind_ip: IpAddr,
    /// Local RTP port. `0` picks an ephemeral port.
    pub media_port: u16,
    /// Local RTCP port. `0` picks an ephemeral port.
    pub control_port: u16,
    /// Camera address for punch datagrams and Receiver Reports.
    pub server_ip: IpAddr,
    pub server_media_port: u16,
    pub server_control_port: u16,
    /// Interval between [`ControlPlane::keep_alive`] calls.
    pub keepalive_interval: Duration,
    /// Sleep between liveness checks in [`Receiver::run`].
    pub poll_interval: Duration,
    /// Socket read timeout; bounds how long a receive thread takes to notice a stop.
    pub read_timeout: Duration,
    /// Stream identifier stamped on every access unit.
    pub sender_id: u32,
    /// Cap on one reassembled access unit.
    pub max_access_unit: usize,
    /// Datagram receive buffer size.
    pub recv_buffer_size: usize,
}

impl Default for ReceiverConfig {
    fn default() -> Self {
        Self {
            bind_ip: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            media_port: 33056,
            control_port: 33057,
            server_ip: IpAddr::V4(Ipv4Addr::LOCALHOST),
            server_media_port: 50000,
            server_control_port: 50001,
            keepalive_interval: Duration::from_secs(50),
            poll_interval: Duration::from_secs(1),
            read_timeout: Duration::from_millis(250),
            sender_id: 0,
            max_access_unit: DEFAULT_MAX_ACCESS_UNIT,
            recv_buffer_size: 65_536,
        }
    }
}

impl ReceiverConfig {
    pub fn server_media_addr(&self) -> SocketAddr {
        SocketAddr::new(self.server_ip, self.server_media_port)
    }

    pub fn server_control_addr(&self) -> SocketAddr {
        SocketAddr::new(self.server_ip, self.server_control_port)
    }
}

type DepacketizerTable = Arc<Mutex<HashMap<u8, Box<dyn Depacketizer>>>>;

/// Cloneable stop handle for a running [`Receiver`].
#[derive(Debug, Clone)]
pub struct ReceiverHandle {
    running: Arc<AtomicBool>,
}

impl ReceiverHandle {
    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }
}

/// Dual-channel RTP/RTCP receiver for one camera stream.
///
/// Owns the media and control sockets, one receive thread per socket, the
/// shared clock, and a depacketizer per H.264 payload type of the session.
/// Media datagrams flow RTP parser → depacketizer → [`FrameSink`]; control
/// datagrams flow into the [`RtcpSynchronizer`], whose Receiver Reports
/// go back out of the control socket.
pub struct Receiver {
    config: ReceiverConfig,
    running: Arc<AtomicBool>,
    clock: SharedClock,
    depacketizers: DepacketizerTable,
    synchronizer: RtcpSynchronizer,
    sink: Arc<dyn FrameSink>,
    local_addrs: Option<(SocketAddr, SocketAddr)>,
    threads: Vec<JoinHandle<()>>,
}

impl Receiver {
    /// Build a receiver for every H.264 payload type in `session`.
    ///
    /// Each payload type's SPS is decoded here: a missing or undecodable
    /// SPS fails construction, since the frame size is unknown without it.
    pub fn new(
        config: ReceiverConfig,
        session: &SessionDescription,
        sink: Arc<dyn FrameSink>,
    ) -> Result<Self> {
        // Jitter is measured at the first format's rate; capture times use
        // each payload type's own rate.
        let clock_rate = session
            .h264_formats()
            .map(|f| f.clock_rate)
            .find(|&rate| rate != 0)
            .unwrap_or(DEFAULT_CLOCK_RATE);
        let clock = SharedClock::new(clock_rate);

        let mut table: HashMap<u8, Box<dyn Depacketizer>> = HashMap::new();
        for format in session.h264_formats() {
            let depacketizer: Box<dyn Depacketizer> = Box::new(
                H264Depacketizer::from_format(format, clock.clone(), config.sender_id)?
                    .with_max_access_unit(config.max_access_unit),
            );
            tracing::debug!(
                pt = depacketizer.payload_type(),
                clock_rate = depacketizer.clock_rate(),
                codec = depacketizer.codec_name(),
                "depacketizer registered"
            );
            table.insert(depacketizer.payload_type(), depacketizer);
        }
        if table.is_empty() {
            return Err(IngestError::Sdp {
                kind: SdpErrorKind::NoH264Media,
            });
        }

        Ok(Self {
            config,
            running: Arc::new(AtomicBool::new(false)),
            synchronizer: RtcpSynchronizer::with_random_ssrc(clock.clone()),
            clock,
            depacketizers: Arc::new(Mutex::new(table)),
            sink,
            local_addrs: None,
            threads: Vec::new(),
        })
    }

    /// Bind both sockets, punch toward the camera and spawn the receive threads.
    ///
    /// Bind failures are returned before anything is spawned.
    pub fn start(&mut self) -> Result<()> {
        if self.running.load(Ordering::SeqCst) {
            return Err(IngestError::AlreadyRunning);
        }

        let media = UdpTransport::bind(
            SocketAddr::new(self.config.bind_ip, self.config.media_port),
            self.config.read_timeout,
        )?;
        let control = UdpTransport::bind(
            SocketAddr::new(self.config.bind_ip, self.config.control_port),
            self.config.read_timeout,
        )?;

        media.punch(self.config.server_media_addr())?;
        control.punch(self.config.server_control_addr())?;

        self.local_addrs = Some((media.local_addr(), control.local_addr()));
        self.running.store(true, Ordering::SeqCst);

        tracing::info!(
            media = %media.local_addr(),
            control = %control.local_addr(),
            server = %self.config.server_ip,
            "receiver listening"
        );

        let buffer_size = self.config.recv_buffer_size;

        let running = self.running.clone();
        let depacketizers = self.depacketizers.clone();
        let sink = self.sink.clone();
        self.threads.push(thread::spawn(move || {
            receive_loop(media, buffer_size, running, |datagram, _| {
                handle_media(datagram, &depacketizers, sink.as_ref());
            });
        }));

        let running = self.running.clone();
        let synchronizer = self.synchronizer.clone();
        let reply_to = self.config.server_control_addr();
        let reply_socket = control.clone();
        self.threads.push(thread::spawn(move || {
            receive_loop(control, buffer_size, running, |datagram, _| {
                handle_control(datagram, &synchronizer, &reply_socket, reply_to);
            });
        }));

        Ok(())
    }

    /// Drive the session until stopped.
    ///
    /// Sleeps one poll interval per iteration and calls
    /// [`ControlPlane::keep_alive`] whenever the keep-alive interval has
    /// elapsed. Once the running flag clears (via [`stop`](Self::stop) or a
    /// [`ReceiverHandle`]), tears the session down and joins both threads.
    pub fn run(&mut self, control: &mut dyn ControlPlane) -> Result<()> {
        if !self.running.load(Ordering::SeqCst) {
            return Err(IngestError::NotStarted);
        }

        let mut last_keepalive = Instant::now();
        while self.running.load(Ordering::SeqCst) {
            thread::sleep(self.config.poll_interval);
            if last_keepalive.elapsed() >= self.config.keepalive_interval {
                if let Err(e) = control.keep_alive() {
                    tracing::warn!(error = %e, "keep-alive failed");
                }
                last_keepalive = Instant::now();
            }
        }

        if let Err(e) = control.teardown() {
            tracing::warn!(error = %e, "teardown failed");
        }
        self.join();
        tracing::info!("receiver stopped");
        Ok(())
    }

    /// Clear the running flag and wait for both receive threads.
    pub fn stop(&mut self) {
        tracing::info!("receiver stopping");
        self.running.store(false, Ordering::SeqCst);
        self.join();
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    pub fn handle(&self) -> ReceiverHandle {
        ReceiverHandle {
            running: self.running.clone(),
        }
    }

    /// Shared clock, for inspecting synchronization and reception stats.
    pub fn clock(&self) -> &SharedClock {
        &self.clock
    }

    /// SSRC this receiver reports as in Receiver Reports.
    pub fn reporter_ssrc(&self) -> u32 {
        self.synchronizer.reporter_ssrc()
    }

    /// Bound (media, control) addresses once started.
    pub fn local_addrs(&self) -> Option<(SocketAddr, SocketAddr)> {
        self.local_addrs
    }

    fn join(&mut self) {
        for thread in self.threads.drain(..) {
            if thread.join().is_err() {
                tracing::error!("receive thread panicked");
            }
        }
    }
}

impl Drop for Receiver {
    fn drop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        self.join();
    }
}

/// Media path: parse, route by payload type, depacketize, emit.
fn handle_media(datagram: &[u8], depacketizers: &DepacketizerTable, sink: &dyn FrameSink) {
    let packet = match RtpPacket::parse(datagram) {
        Ok(packet) => packet,
        Err(e) => {
            tracing::warn!(error = %e, len = datagram.len(), "dropping RTP datagram");
            return;
        }
    };

    let unit = {
        let mut table = depacketizers.lock();
        let Some(depacketizer) = table.get_mut(&packet.payload_type) else {
            tracing::warn!(
                error = %IngestError::UnknownPayloadType(packet.payload_type),
                seq = packet.sequence_number,
                "dropping RTP packet"
            );
            return;
        };
        match depacketizer.push(&packet) {
            Ok(unit) => unit,
            Err(e) => {
                tracing::warn!(
                    error = %e,
                    pt = packet.payload_type,
                    seq = packet.sequence_number,
                    "dropping RTP packet"
                );
                return;
            }
        }
    };

    if let Some(unit) = unit {
        tracing::trace!(
            bytes = unit.payload.len(),
            capture_time_us = unit.capture_time_us,
            "access unit complete"
        );
        if let Err(e) = sink.emit(unit) {
            tracing::warn!(error = %e, "frame sink rejected access unit");
        }
    }
}

/// Control path: feed the synchronizer and answer Sender Reports.
fn handle_control(
    datagram: &[u8],
    synchronizer: &RtcpSynchronizer,
    socket: &UdpTransport,
    reply_to: SocketAddr,
) {
    match synchronizer.handle(datagram, Instant::now()) {
        Ok(Some(report)) => {
            if let Err(e) = socket.send_to(&report, reply_to) {
                tracing::warn!(error = %e, %reply_to, "failed to send receiver report");
            }
        }
        Ok(None) => {}
        Err(e) => {
            tracing::warn!(error = %e, len = datagram.len(), "dropping RTCP datagram");
        }
    }
}

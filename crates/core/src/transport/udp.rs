use std::io::ErrorKind;
use std::net::{SocketAddr, UdpSocket};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use crate::error::Result;

/// NAT/firewall pinhole datagram sent to each server port before PLAY.
pub const PUNCH_DATAGRAM: [u8; 4] = [0xCE, 0xFA, 0xED, 0xFE];

/// One bound UDP receive socket (RTP or RTCP).
///
/// Blocking reads are bounded by a read timeout so the owning loop can
/// observe its `running` flag between datagrams.
#[derive(Debug, Clone)]
pub struct UdpTransport {
    socket: Arc<UdpSocket>,
    local_addr: SocketAddr,
}

impl UdpTransport {
    /// Bind to `addr` with the given read timeout.
    pub fn bind(addr: SocketAddr, read_timeout: Duration) -> Result<Self> {
        let socket = UdpSocket::bind(addr)?;
        socket.set_read_timeout(Some(read_timeout))?;
        let local_addr = socket.local_addr()?;
        Ok(Self {
            socket: Arc::new(socket),
            local_addr,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Send the 4-byte punch datagram toward `server`. No reply is expected.
    pub fn punch(&self, server: SocketAddr) -> Result<()> {
        self.socket.send_to(&PUNCH_DATAGRAM, server)?;
        tracing::debug!(local = %self.local_addr, %server, "punch datagram sent");
        Ok(())
    }

    /// Send raw bytes to a specific socket address.
    pub fn send_to(&self, payload: &[u8], addr: SocketAddr) -> Result<usize> {
        Ok(self.socket.send_to(payload, addr)?)
    }

    /// Receive one datagram; `Ok(None)` when the read timeout elapsed.
    pub fn recv(&self, buf: &mut [u8]) -> Result<Option<(usize, SocketAddr)>> {
        match self.socket.recv_from(buf) {
            Ok(received) => Ok(Some(received)),
            Err(ref e) if matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) => {
                Ok(None)
            }
            Err(e) => Err(e.into()),
        }
    }
}

/// Blocking receive loop for one socket.
///
/// Hands each datagram to `handler` in arrival order and checks the
/// `running` flag whenever a datagram is handled or the read times out,
/// so stopping the receiver terminates it within one read timeout.
pub fn receive_loop<F>(
    transport: UdpTransport,
    buffer_size: usize,
    running: Arc<AtomicBool>,
    mut handler: F,
) where
    F: FnMut(&[u8], SocketAddr),
{
    let mut buf = vec![0u8; buffer_size];
    while running.load(Ordering::SeqCst) {
        match transport.recv(&mut buf) {
            Ok(Some((len, from))) => handler(&buf[..len], from),
            Ok(None) => {}
            Err(e) => {
                if running.load(Ordering::SeqCst) {
                    tracing::warn!(local = %transport.local_addr, error = %e, "UDP receive error");
                    // avoid spinning on a persistent socket error
                    std::thread::sleep(Duration::from_millis(50));
                }
            }
        }
    }
    tracing::debug!(local = %transport.local_addr, "receive loop exited");
}

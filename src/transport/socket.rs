//! Non-blocking UDP socket wrapper.

use std::io;
use std::net::SocketAddr;

use tokio::net::UdpSocket;

use crate::core::TransportError;

/// UDP socket used in a strictly non-blocking fashion.
///
/// The synchronization layer never parks inside the socket: reads and
/// writes either complete immediately or report that they would block,
/// and the embedding event loop decides when to wait via `readable`.
#[derive(Debug)]
pub struct SspSocket {
    inner: UdpSocket,
}

impl SspSocket {
    /// Bind to a local address.
    pub async fn bind(addr: SocketAddr) -> Result<Self, TransportError> {
        let inner = UdpSocket::bind(addr)
            .await
            .map_err(|source| TransportError::Socket { op: "bind", source })?;
        Ok(Self { inner })
    }

    /// Local address the socket is bound to.
    pub fn local_addr(&self) -> Result<SocketAddr, TransportError> {
        self.inner
            .local_addr()
            .map_err(|source| TransportError::Socket {
                op: "local_addr",
                source,
            })
    }

    /// Send one datagram without blocking. A full outbound buffer drops
    /// the datagram, which the protocol tolerates like any other loss.
    pub fn try_send_to(&self, buf: &[u8], target: SocketAddr) -> Result<bool, TransportError> {
        match self.inner.try_send_to(buf, target) {
            Ok(_) => Ok(true),
            Err(err) if err.kind() == io::ErrorKind::WouldBlock => Ok(false),
            Err(source) => Err(TransportError::Socket { op: "send", source }),
        }
    }

    /// Receive one datagram without blocking; `None` when nothing is
    /// queued.
    pub fn try_recv_from(
        &self,
        buf: &mut [u8],
    ) -> Result<Option<(usize, SocketAddr)>, TransportError> {
        match self.inner.try_recv_from(buf) {
            Ok((len, addr)) => Ok(Some((len, addr))),
            Err(err) if err.kind() == io::ErrorKind::WouldBlock => Ok(None),
            Err(source) => Err(TransportError::Socket { op: "recv", source }),
        }
    }

    /// Wait until the socket is readable.
    pub async fn readable(&self) -> Result<(), TransportError> {
        self.inner
            .readable()
            .await
            .map_err(|source| TransportError::Socket {
                op: "readable",
                source,
            })
    }
}

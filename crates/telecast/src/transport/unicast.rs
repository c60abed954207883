//! Unicast UDP transport.

use super::{check_datagram, check_written, Transport, TransportStats};
use crate::error::{TelecastError, TelecastResult};
use std::net::{Ipv4Addr, SocketAddrV4, UdpSocket};

/// Connectionless socket pre-associated with one IPv4 destination.
#[derive(Debug)]
pub struct UnicastTransport {
    socket: UdpSocket,
    destination: SocketAddrV4,
    stats: TransportStats,
}

impl UnicastTransport {
    /// Opens a socket on an ephemeral port and associates it with
    /// `destination`.
    ///
    /// `interface` selects the local source address; `None` lets the OS
    /// pick by route.
    ///
    /// # Errors
    ///
    /// [`TelecastError::TransportFailure`] if binding or associating fails.
    pub fn connect(destination: SocketAddrV4, interface: Option<Ipv4Addr>) -> TelecastResult<Self> {
        let local = SocketAddrV4::new(interface.unwrap_or(Ipv4Addr::UNSPECIFIED), 0);
        let socket = UdpSocket::bind(local).map_err(|e| TelecastError::transport(destination, &e))?;
        socket
            .connect(destination)
            .map_err(|e| TelecastError::transport(destination, &e))?;

        tracing::debug!("unicast transport {} -> {}", local, destination);

        Ok(Self {
            socket,
            destination,
            stats: TransportStats::default(),
        })
    }
}

impl Transport for UnicastTransport {
    fn send(&mut self, payload: &[u8]) -> TelecastResult<()> {
        let result = check_datagram(self.destination, payload).and_then(|()| {
            let written = self
                .socket
                .send(payload)
                .map_err(|e| TelecastError::transport(self.destination, &e))?;
            check_written(self.destination, written, payload.len())
        });
        self.stats.record(&result, payload.len());
        result
    }

    fn destination(&self) -> SocketAddrV4 {
        self.destination
    }

    fn stats(&self) -> TransportStats {
        self.stats
    }
}

//! Multicast UDP transport.

use super::{check_datagram, check_written, Transport, TransportStats};
use crate::error::{TelecastError, TelecastResult};
use socket2::{Domain, Protocol, SockAddr, Socket, Type};
use std::net::{Ipv4Addr, SocketAddrV4, UdpSocket};

/// Sender to an IPv4 multicast group.
///
/// Multicast loopback is disabled, so a process listening on the same group
/// does not hear its own telemetry.
#[derive(Debug)]
pub struct MulticastTransport {
    socket: UdpSocket,
    group: SocketAddrV4,
    stats: TransportStats,
}

impl MulticastTransport {
    /// Opens a sender for `group` with hop limit `ttl`.
    ///
    /// `interface` selects the outgoing interface by its IPv4 address.
    ///
    /// # Errors
    ///
    /// [`TelecastError::InvalidConfig`] if `group` is outside
    /// 224.0.0.0-239.255.255.255, [`TelecastError::TransportFailure`] if the
    /// socket cannot be configured.
    pub fn open(group: SocketAddrV4, ttl: u32, interface: Option<Ipv4Addr>) -> TelecastResult<Self> {
        if !group.ip().is_multicast() {
            return Err(TelecastError::InvalidConfig(format!(
                "{} is not an IPv4 multicast address (224.0.0.0-239.255.255.255)",
                group.ip()
            )));
        }

        let fail = |e: std::io::Error| TelecastError::transport(group, &e);

        let socket = Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::UDP)).map_err(fail)?;
        socket.set_multicast_ttl_v4(ttl).map_err(fail)?;
        socket.set_multicast_loop_v4(false).map_err(fail)?;
        if let Some(iface) = interface {
            socket.set_multicast_if_v4(&iface).map_err(fail)?;
        }

        let local = SocketAddrV4::new(interface.unwrap_or(Ipv4Addr::UNSPECIFIED), 0);
        socket.bind(&SockAddr::from(local)).map_err(fail)?;

        tracing::debug!("multicast transport {} -> {} (ttl {})", local, group, ttl);

        Ok(Self {
            socket: socket.into(),
            group,
            stats: TransportStats::default(),
        })
    }

    /// Hop limit currently set on the socket.
    ///
    /// # Errors
    ///
    /// [`TelecastError::TransportFailure`] if the option cannot be read.
    pub fn ttl(&self) -> TelecastResult<u32> {
        self.socket
            .multicast_ttl_v4()
            .map_err(|e| TelecastError::transport(self.group, &e))
    }

    /// Whether the socket loops its own datagrams back.
    ///
    /// # Errors
    ///
    /// [`TelecastError::TransportFailure`] if the option cannot be read.
    pub fn loopback(&self) -> TelecastResult<bool> {
        self.socket
            .multicast_loop_v4()
            .map_err(|e| TelecastError::transport(self.group, &e))
    }
}

impl Transport for MulticastTransport {
    fn send(&mut self, payload: &[u8]) -> TelecastResult<()> {
        let result = check_datagram(self.group, payload).and_then(|()| {
            let written = self
                .socket
                .send_to(payload, self.group)
                .map_err(|e| TelecastError::transport(self.group, &e))?;
            check_written(self.group, written, payload.len())
        });
        self.stats.record(&result, payload.len());
        result
    }

    fn destination(&self) -> SocketAddrV4 {
        self.group
    }

    fn stats(&self) -> TransportStats {
        self.stats
    }
}

//! # Transport Layer
//!
//! Fire-and-forget UDP senders.
//!
//! ## Design
//!
//! - One datagram per payload, no acknowledgement, no retry
//! - A transport owns its socket; dropping it closes the socket
//! - [`Connector`] is the factory seam keyed on the resolved mode
//!
//! ```text
//!   ResolvedEndpoint ──> Connector::connect ──┬──> UnicastTransport   (Localhost, Unicast)
//!                                             └──> MulticastTransport (Multicast)
//! ```

mod multicast;
mod unicast;

pub use multicast::MulticastTransport;
pub use unicast::UnicastTransport;

use crate::config::{DeliveryMode, ResolvedEndpoint};
use crate::error::{TelecastError, TelecastResult};
use crate::MAX_DATAGRAM_SIZE;
use std::net::SocketAddrV4;

/// Transport statistics.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TransportStats {
    /// Datagrams handed to the OS.
    pub datagrams_sent: u64,
    /// Bytes handed to the OS.
    pub bytes_sent: u64,
    /// Sends that failed.
    pub send_errors: u64,
}

impl TransportStats {
    /// Records the outcome of one send.
    pub(crate) fn record(&mut self, result: &TelecastResult<()>, len: usize) {
        match result {
            Ok(()) => {
                self.datagrams_sent += 1;
                self.bytes_sent += len as u64;
            }
            Err(_) => self.send_errors += 1,
        }
    }
}

/// Capability to deliver bytes to one configured destination.
///
/// Implementations are owned by exactly one pump and disposed when dropped.
pub trait Transport: Send {
    /// Sends `payload` as a single datagram.
    ///
    /// # Errors
    ///
    /// [`TelecastError::TransportFailure`] when the datagram did not leave
    /// the host in full. The payload is lost; callers do not retry.
    fn send(&mut self, payload: &[u8]) -> TelecastResult<()>;

    /// Where datagrams go.
    fn destination(&self) -> SocketAddrV4;

    /// Counters since construction.
    fn stats(&self) -> TransportStats;
}

/// Builds the transport for a resolved endpoint.
pub trait Connector: Send + Sync {
    /// Opens a transport for `endpoint`.
    ///
    /// # Errors
    ///
    /// [`TelecastError::InvalidConfig`] if the endpoint violates the mode's
    /// invariants, [`TelecastError::TransportFailure`] if the socket cannot
    /// be set up.
    fn connect(&self, endpoint: &ResolvedEndpoint) -> TelecastResult<Box<dyn Transport>>;
}

/// Production connector: real UDP sockets.
#[derive(Clone, Copy, Debug, Default)]
pub struct UdpConnector;

impl Connector for UdpConnector {
    fn connect(&self, endpoint: &ResolvedEndpoint) -> TelecastResult<Box<dyn Transport>> {
        match endpoint.mode {
            DeliveryMode::Localhost | DeliveryMode::Unicast => {
                Ok(Box::new(UnicastTransport::connect(endpoint.destination, endpoint.interface)?))
            }
            DeliveryMode::Multicast => Ok(Box::new(MulticastTransport::open(
                endpoint.destination,
                endpoint.ttl,
                endpoint.interface,
            )?)),
        }
    }
}

/// Rejects payloads that cannot fit one datagram before touching the socket.
fn check_datagram(destination: SocketAddrV4, payload: &[u8]) -> TelecastResult<()> {
    if payload.len() > MAX_DATAGRAM_SIZE {
        return Err(TelecastError::TransportFailure {
            destination: destination.to_string(),
            reason: format!("payload of {} bytes exceeds {MAX_DATAGRAM_SIZE}", payload.len()),
        });
    }
    Ok(())
}

/// Maps a short write to a failure.
fn check_written(destination: SocketAddrV4, written: usize, expected: usize) -> TelecastResult<()> {
    if written == expected {
        Ok(())
    } else {
        Err(TelecastError::TransportFailure {
            destination: destination.to_string(),
            reason: format!("short write: {written} of {expected} bytes"),
        })
    }
}

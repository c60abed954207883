//! # Endpoint Configuration
//!
//! The small record that decides where telemetry goes.
//!
//! An [`EndpointConfig`] is what the user edits and what the store persists.
//! Before anything touches a socket it is turned into a [`ResolvedEndpoint`]:
//! host resolved to IPv4, mode invariants checked, defaults applied.

use crate::error::{TelecastError, TelecastResult};
use crate::{DEFAULT_HOST, DEFAULT_MULTICAST_TTL, DEFAULT_PORT};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4, ToSocketAddrs};

/// How payloads leave the process.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeliveryMode {
    /// Unicast to the loopback address; the stored host is ignored.
    #[default]
    #[serde(alias = "Localhost", alias = "LOCALHOST")]
    Localhost,
    /// Unicast to one resolved IPv4 endpoint.
    #[serde(alias = "Unicast", alias = "UNICAST")]
    Unicast,
    /// Send to an IPv4 multicast group.
    #[serde(alias = "Multicast", alias = "MULTICAST")]
    Multicast,
}

impl DeliveryMode {
    /// Infers the mode from the shape of a resolved address.
    ///
    /// Loopback → `Localhost`, 224.0.0.0/4 → `Multicast`, anything else →
    /// `Unicast`.
    #[must_use]
    pub fn infer(addr: Ipv4Addr) -> Self {
        if addr.is_loopback() {
            Self::Localhost
        } else if addr.is_multicast() {
            Self::Multicast
        } else {
            Self::Unicast
        }
    }

    /// Lowercase name as written in the config file.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Localhost => "localhost",
            Self::Unicast => "unicast",
            Self::Multicast => "multicast",
        }
    }
}

impl fmt::Display for DeliveryMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

fn default_host() -> String {
    DEFAULT_HOST.to_string()
}

const fn default_port() -> u16 {
    DEFAULT_PORT
}

/// User-facing endpoint record.
///
/// Unknown keys are ignored when reading; missing keys take their defaults.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EndpointConfig {
    /// Delivery mode.
    #[serde(default)]
    pub mode: DeliveryMode,
    /// Destination host name or IPv4 literal.
    #[serde(default = "default_host")]
    pub host: String,
    /// Destination UDP port (1-65535).
    #[serde(default = "default_port")]
    pub port: u16,
    /// Multicast hop limit; [`DEFAULT_MULTICAST_TTL`] when absent.
    #[serde(default, alias = "multicastTtl", skip_serializing_if = "Option::is_none")]
    pub multicast_ttl: Option<u32>,
    /// Local IPv4 address to send from.
    #[serde(default, alias = "bindInterface", skip_serializing_if = "Option::is_none")]
    pub bind_interface: Option<String>,
    /// Whether `ensure_started` should reuse this record on the next run.
    #[serde(default)]
    pub remember: bool,
}

impl Default for EndpointConfig {
    fn default() -> Self {
        Self {
            mode: DeliveryMode::Localhost,
            host: default_host(),
            port: DEFAULT_PORT,
            multicast_ttl: None,
            bind_interface: None,
            remember: false,
        }
    }
}

impl EndpointConfig {
    /// Creates a record with no TTL override, no interface and `remember` off.
    #[must_use]
    pub fn new(mode: DeliveryMode, host: impl Into<String>, port: u16) -> Self {
        Self {
            mode,
            host: host.into(),
            port,
            ..Self::default()
        }
    }

    /// Sets the multicast hop limit.
    #[must_use]
    pub fn with_ttl(mut self, ttl: u32) -> Self {
        self.multicast_ttl = Some(ttl);
        self
    }

    /// Sets the local interface address.
    #[must_use]
    pub fn with_interface(mut self, interface: impl Into<String>) -> Self {
        self.bind_interface = Some(interface.into());
        self
    }

    /// Sets the remember flag.
    #[must_use]
    pub fn remembered(mut self, remember: bool) -> Self {
        self.remember = remember;
        self
    }

    /// Synthesizes a record for `host:port`, inferring the mode from the
    /// resolved address. `remember` is always `false`.
    ///
    /// # Errors
    ///
    /// Returns [`TelecastError::InvalidConfig`] if the host does not resolve
    /// to an IPv4 address or the port is zero.
    pub fn infer(host: &str, port: u16) -> TelecastResult<Self> {
        check_port(port)?;
        let addr = resolve_ipv4(host, port)?;
        Ok(Self::new(DeliveryMode::infer(addr), host, port))
    }

    /// Effective multicast hop limit.
    #[must_use]
    pub fn ttl(&self) -> u32 {
        self.multicast_ttl.unwrap_or(DEFAULT_MULTICAST_TTL)
    }

    /// Validates the record and resolves it to a concrete destination.
    ///
    /// # Errors
    ///
    /// Returns [`TelecastError::InvalidConfig`] when the port is zero, the
    /// host does not resolve to IPv4, the TTL exceeds 255, or a multicast
    /// record points outside 224.0.0.0/4.
    pub fn resolve(&self) -> TelecastResult<ResolvedEndpoint> {
        check_port(self.port)?;

        let ttl = self.ttl();
        if ttl > 255 {
            return Err(TelecastError::InvalidConfig(format!(
                "multicast ttl {ttl} out of range 0-255"
            )));
        }

        let ip = match self.mode {
            DeliveryMode::Localhost => Ipv4Addr::LOCALHOST,
            DeliveryMode::Unicast | DeliveryMode::Multicast => resolve_ipv4(&self.host, self.port)?,
        };

        if self.mode == DeliveryMode::Multicast && !ip.is_multicast() {
            return Err(TelecastError::InvalidConfig(format!(
                "{ip} is not an IPv4 multicast address (224.0.0.0-239.255.255.255)"
            )));
        }

        Ok(ResolvedEndpoint {
            mode: self.mode,
            destination: SocketAddrV4::new(ip, self.port),
            ttl,
            interface: self.interface_addr(),
        })
    }

    /// Parses `bind_interface` as an IPv4 literal.
    ///
    /// Interface names cannot be mapped portably to an address; they are
    /// logged and ignored.
    fn interface_addr(&self) -> Option<Ipv4Addr> {
        let raw = self.bind_interface.as_deref()?.trim();
        if raw.is_empty() {
            return None;
        }
        match raw.parse::<Ipv4Addr>() {
            Ok(addr) => Some(addr),
            Err(_) => {
                tracing::warn!("bind interface {:?} is not an IPv4 address, using default route", raw);
                None
            }
        }
    }
}

/// A validated endpoint, ready for transport construction.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ResolvedEndpoint {
    /// Delivery mode.
    pub mode: DeliveryMode,
    /// Destination socket address.
    pub destination: SocketAddrV4,
    /// Multicast hop limit (ignored for unicast).
    pub ttl: u32,
    /// Local source / outgoing multicast interface.
    pub interface: Option<Ipv4Addr>,
}

impl fmt::Display for ResolvedEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.mode, self.destination)?;
        if self.mode == DeliveryMode::Multicast {
            write!(f, " ttl={}", self.ttl)?;
        }
        if let Some(iface) = self.interface {
            write!(f, " via {iface}")?;
        }
        Ok(())
    }
}

fn check_port(port: u16) -> TelecastResult<()> {
    if port == 0 {
        return Err(TelecastError::InvalidConfig("port must be in 1-65535".to_string()));
    }
    Ok(())
}

/// Resolves `host` to its first IPv4 address.
fn resolve_ipv4(host: &str, port: u16) -> TelecastResult<Ipv4Addr> {
    let host = host.trim();
    if host.is_empty() {
        return Err(TelecastError::InvalidConfig("host is empty".to_string()));
    }
    if let Ok(ip) = host.parse::<Ipv4Addr>() {
        return Ok(ip);
    }

    let addrs = (host, port)
        .to_socket_addrs()
        .map_err(|e| TelecastError::InvalidConfig(format!("cannot resolve {host}: {e}")))?;

    addrs
        .filter_map(|addr| match addr {
            SocketAddr::V4(v4) => Some(*v4.ip()),
            SocketAddr::V6(_) => None,
        })
        .next()
        .ok_or_else(|| TelecastError::InvalidConfig(format!("{host} has no IPv4 address")))
}

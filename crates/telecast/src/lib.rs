//! # TELECAST - Outbound Telemetry Delivery
//!
//! Fire-and-forget delivery of small binary game-event payloads over UDP.
//!
//! ## Architecture
//!
//! ```text
//!   Producer 1 ──┐
//!   Producer 2 ──┼──> [Delivery Queue] ──> [Pump Thread] ──> [Transport] ──> UDP
//!   Producer N ──┘     (drop-oldest)       (single reader)   (unicast/multicast)
//!                            ▲
//!                            │ owns one session at a time
//!                     [Supervisor] <── configure_and_start / dispose
//!                            │
//!                     [Config Store] (per-user TOML record)
//! ```
//!
//! ## Guarantees
//!
//! - `enqueue` never blocks on the network and never returns an error
//! - FIFO delivery within a session, except entries evicted by drop-oldest
//! - Exactly one active session; replacement is atomic under one lock
//! - A failed send loses that payload only; the pump keeps running
//!
//! ## Example
//!
//! ```rust,ignore
//! use telecast::{DeliveryMode, EndpointConfig, Supervisor};
//!
//! let service = Supervisor::global();
//! let _exit = service.exit_guard();
//!
//! service.configure_and_start(
//!     Some(EndpointConfig::new(DeliveryMode::Multicast, "239.2.3.1", 6969)),
//!     false,
//! )?;
//!
//! service.enqueue(b"<event/>".to_vec());
//! ```

#![deny(missing_docs)]
#![deny(unsafe_code)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![deny(clippy::perf)]

pub mod config;
pub mod error;
pub mod pump;
pub mod queue;
pub mod store;
pub mod supervisor;
pub mod transport;

// Re-exports for convenience
pub use config::{DeliveryMode, EndpointConfig, ResolvedEndpoint};
pub use error::{TelecastError, TelecastResult};
pub use pump::{Pump, PumpReport};
pub use queue::{Admission, DeliveryQueue, Payload, QueueStats};
pub use store::ConfigStore;
pub use supervisor::{ExitGuard, SessionStats, Supervisor};
pub use transport::{Connector, MulticastTransport, Transport, TransportStats, UdpConnector, UnicastTransport};

use std::time::Duration;

/// Destination port used when nothing else is configured.
pub const DEFAULT_PORT: u16 = 4242;

/// Destination host used by `enqueue` when no session has been started.
pub const DEFAULT_HOST: &str = "127.0.0.1";

/// Multicast hop limit used when the record does not specify one.
pub const DEFAULT_MULTICAST_TTL: u32 = 1;

/// Capacity of each session's delivery queue.
///
/// At a few events per second per actor this is several seconds of
/// backlog; anything older is stale telemetry anyway.
pub const QUEUE_CAPACITY: usize = 256;

/// How long `enqueue` stops retrying a lazy start after one failed.
pub const LAZY_START_BACKOFF: Duration = Duration::from_secs(1);

/// Upper bound a teardown waits for the pump to finish in-flight work.
pub const TEARDOWN_TIMEOUT: Duration = Duration::from_secs(1);

/// Largest payload that fits a single IPv4 UDP datagram.
///
/// 65,535 - 20 (IPv4 header) - 8 (UDP header).
pub const MAX_DATAGRAM_SIZE: usize = 65_507;

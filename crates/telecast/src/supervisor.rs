//! # Service Supervisor
//!
//! Owns the one active delivery session and every transition between
//! sessions.
//!
//! ## Session Lifecycle
//!
//! ```text
//!            enqueue / ensure_started          configure_and_start
//!   (none) ─────────────────────────────> [A] ─────────────────────> [B]
//!     ▲                                                               │
//!     └───────────────────────── dispose / exit guard ────────────────┘
//! ```
//!
//! Every transition runs under one mutex:
//!
//! 1. Cancel the old pump and close its queue
//! 2. Wait up to [`TEARDOWN_TIMEOUT`] for the pump to dispose its transport
//! 3. Open the new transport, fresh queue, new pump
//!
//! Producers only take the lock long enough to grab the active queue; the
//! push itself happens outside it. A push that races a teardown lands in a
//! closed queue and is reported as "not delivered".
//!
//! Host names are resolved before the lock is taken. A lazy start that
//! fails is not retried by `enqueue` until [`LAZY_START_BACKOFF`] has passed.

use crate::config::{EndpointConfig, ResolvedEndpoint};
use crate::error::{TelecastError, TelecastResult};
use crate::pump::Pump;
use crate::queue::{DeliveryQueue, Payload, QueueStats};
use crate::store::ConfigStore;
use crate::transport::{Connector, UdpConnector};
use crate::{DEFAULT_HOST, DEFAULT_PORT, LAZY_START_BACKOFF, QUEUE_CAPACITY, TEARDOWN_TIMEOUT};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::Instant;

/// Process-wide instance behind [`Supervisor::global`].
static GLOBAL: OnceLock<Supervisor> = OnceLock::new();

/// Resources belonging to one configuration epoch.
struct Session {
    epoch: u64,
    endpoint: ResolvedEndpoint,
    queue: Arc<DeliveryQueue>,
    pump: Pump,
}

/// Snapshot of the active session.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SessionStats {
    /// Monotonic session number within this supervisor.
    pub epoch: u64,
    /// Where the session delivers.
    pub endpoint: ResolvedEndpoint,
    /// Queue counters.
    pub queue: QueueStats,
    /// Payloads the transport accepted.
    pub delivered: u64,
    /// Payloads whose send failed.
    pub failed: u64,
}

/// Owner of the delivery session.
pub struct Supervisor {
    session: Mutex<Option<Session>>,
    store: ConfigStore,
    connector: Box<dyn Connector>,
    queue_capacity: usize,
    epochs: AtomicU64,
    /// Armed while a session exists; consumed by [`ExitGuard`].
    exit_hook: AtomicBool,
    /// When the last lazy start from `enqueue` failed.
    last_start_failure: Mutex<Option<Instant>>,
}

impl Supervisor {
    /// Supervisor delivering over real UDP sockets.
    #[must_use]
    pub fn new(store: ConfigStore) -> Self {
        Self::with_connector(store, Box::new(UdpConnector))
    }

    /// Supervisor with an explicit transport factory.
    #[must_use]
    pub fn with_connector(store: ConfigStore, connector: Box<dyn Connector>) -> Self {
        Self {
            session: Mutex::new(None),
            store,
            connector,
            queue_capacity: QUEUE_CAPACITY,
            epochs: AtomicU64::new(0),
            exit_hook: AtomicBool::new(false),
            last_start_failure: Mutex::new(None),
        }
    }

    /// Overrides the per-session queue capacity.
    ///
    /// # Panics
    ///
    /// Panics if `capacity` is zero.
    #[must_use]
    pub fn with_queue_capacity(mut self, capacity: usize) -> Self {
        assert!(capacity > 0, "delivery queue capacity must be non-zero");
        self.queue_capacity = capacity;
        self
    }

    /// The process-wide supervisor, created on first use with the per-user
    /// config store.
    pub fn global() -> &'static Self {
        GLOBAL.get_or_init(|| Self::new(ConfigStore::per_user()))
    }

    /// The config store consulted by [`ensure_started`](Self::ensure_started).
    #[must_use]
    pub fn store(&self) -> &ConfigStore {
        &self.store
    }

    /// Starts a session if none is active.
    ///
    /// A remembered record in the store wins; otherwise the mode is inferred
    /// from `default_host` and the synthesized record is not persisted. A
    /// remembered record whose transport cannot be opened falls back to the
    /// defaults.
    ///
    /// # Errors
    ///
    /// [`TelecastError::InvalidConfig`] if neither a remembered record nor
    /// `default_host:default_port` resolves, or any session start failure.
    pub fn ensure_started(&self, default_host: &str, default_port: u16) -> TelecastResult<()> {
        if self.session.lock().is_some() {
            return Ok(());
        }

        // Resolution may block on DNS, so it stays outside the session lock
        let remembered = self.remembered_endpoint();
        let fallback = EndpointConfig::infer(default_host, default_port).and_then(|config| config.resolve());

        let mut active = self.session.lock();
        if active.is_some() {
            return Ok(());
        }

        if let Some(endpoint) = remembered {
            tracing::info!("starting from remembered endpoint {}", endpoint);
            match self.start_session(endpoint) {
                Ok(session) => {
                    *active = Some(session);
                    return Ok(());
                }
                Err(e) => {
                    tracing::warn!("remembered endpoint {} unavailable, falling back to defaults: {}", endpoint, e);
                }
            }
        }

        *active = Some(self.start_session(fallback?)?);
        Ok(())
    }

    /// Queues `payload` for delivery.
    ///
    /// Returns `true` once the payload is queued (possibly at the expense
    /// of the oldest queued payload). Returns `false` for empty payloads or
    /// when no session can take it. Never panics and never waits on the
    /// network.
    pub fn enqueue(&self, payload: impl Into<Payload>) -> bool {
        let payload = payload.into();
        if payload.is_empty() {
            tracing::trace!("ignoring empty payload");
            return false;
        }

        let Some(queue) = self.active_queue().or_else(|| self.lazy_start()) else {
            return false;
        };

        match queue.push(payload) {
            Ok(_) => true,
            Err(e) => {
                tracing::debug!("payload not queued: {}", e);
                false
            }
        }
    }

    /// Atomically replaces the active session with one built from `config`.
    ///
    /// The record is validated before the current session is touched, so a
    /// rejected record leaves delivery running as before. When `persist` is
    /// set and the record is marked `remember`, it is written to the store;
    /// a failed write is logged only.
    ///
    /// # Errors
    ///
    /// [`TelecastError::InvalidConfig`] for an absent or invalid record;
    /// [`TelecastError::TransportFailure`] or [`TelecastError::WorkerSpawn`]
    /// if the new session cannot be built, in which case no session is
    /// active afterwards.
    pub fn configure_and_start(&self, config: Option<EndpointConfig>, persist: bool) -> TelecastResult<()> {
        let config = config.ok_or_else(|| TelecastError::InvalidConfig("no endpoint configuration supplied".to_string()))?;
        let endpoint = config.resolve()?;

        let mut active = self.session.lock();
        if let Some(old) = active.take() {
            Self::teardown(old);
        }
        *active = Some(self.start_session(endpoint)?);
        *self.last_start_failure.lock() = None;

        if persist && config.remember {
            if let Err(e) = self.store.save(&config) {
                tracing::warn!("endpoint config not saved: {}", e);
            }
        }

        Ok(())
    }

    /// Tears down the active session, if any. Safe to call repeatedly.
    pub fn dispose(&self) {
        let mut active = self.session.lock();
        if let Some(old) = active.take() {
            Self::teardown(old);
        }
        self.exit_hook.store(false, Ordering::Release);
    }

    /// Whether a session is active.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.session.lock().is_some()
    }

    /// Endpoint of the active session.
    #[must_use]
    pub fn endpoint(&self) -> Option<ResolvedEndpoint> {
        self.session.lock().as_ref().map(|s| s.endpoint)
    }

    /// Counters of the active session.
    #[must_use]
    pub fn stats(&self) -> Option<SessionStats> {
        self.session.lock().as_ref().map(|s| SessionStats {
            epoch: s.epoch,
            endpoint: s.endpoint,
            queue: s.queue.stats(),
            delivered: s.pump.delivered(),
            failed: s.pump.failed(),
        })
    }

    /// Guard that tears the session down when dropped.
    ///
    /// Hold it in `main` so the active session is disposed on normal
    /// process exit. A guard whose hook was already consumed by
    /// [`dispose`](Self::dispose) does nothing.
    #[must_use = "the session is only torn down when the guard is dropped"]
    pub fn exit_guard(&self) -> ExitGuard<'_> {
        ExitGuard { supervisor: self }
    }

    /// Whether an exit teardown is pending.
    #[must_use]
    pub fn exit_hook_armed(&self) -> bool {
        self.exit_hook.load(Ordering::Acquire)
    }

    fn run_exit_hook(&self) {
        if self.exit_hook.swap(false, Ordering::AcqRel) {
            tracing::debug!("process exit, disposing delivery session");
            self.dispose();
        }
    }

    fn active_queue(&self) -> Option<Arc<DeliveryQueue>> {
        self.session.lock().as_ref().map(|s| Arc::clone(&s.queue))
    }

    /// Remembered record from the store, if it resolves.
    fn remembered_endpoint(&self) -> Option<ResolvedEndpoint> {
        let config = self.store.load().filter(|config| config.remember)?;
        match config.resolve() {
            Ok(endpoint) => Some(endpoint),
            Err(e) => {
                tracing::warn!("remembered endpoint unusable, falling back to defaults: {}", e);
                None
            }
        }
    }

    /// Starts the default session on behalf of `enqueue`, at most once per
    /// [`LAZY_START_BACKOFF`] after a failure.
    fn lazy_start(&self) -> Option<Arc<DeliveryQueue>> {
        if let Some(failed_at) = *self.last_start_failure.lock() {
            if failed_at.elapsed() < LAZY_START_BACKOFF {
                return None;
            }
        }

        match self.ensure_started(DEFAULT_HOST, DEFAULT_PORT) {
            Ok(()) => {
                *self.last_start_failure.lock() = None;
                self.active_queue()
            }
            Err(e) => {
                *self.last_start_failure.lock() = Some(Instant::now());
                tracing::warn!(
                    "cannot start delivery session, next attempt in {:?}: {}",
                    LAZY_START_BACKOFF,
                    e
                );
                None
            }
        }
    }

    /// Builds a session. Caller holds the session lock.
    fn start_session(&self, endpoint: ResolvedEndpoint) -> TelecastResult<Session> {
        let transport = self.connector.connect(&endpoint)?;
        let queue = Arc::new(DeliveryQueue::new(self.queue_capacity));
        let pump = Pump::spawn(Arc::clone(&queue), transport)?;
        let epoch = self.epochs.fetch_add(1, Ordering::Relaxed) + 1;

        self.exit_hook.store(true, Ordering::Release);
        tracing::info!("delivery session {} started: {}", epoch, endpoint);

        Ok(Session {
            epoch,
            endpoint,
            queue,
            pump,
        })
    }

    /// Stops a session's pump and disposes its transport. Caller holds the
    /// session lock.
    fn teardown(session: Session) {
        let Session {
            epoch,
            endpoint,
            queue,
            pump,
        } = session;

        match pump.stop(TEARDOWN_TIMEOUT) {
            Some(report) => tracing::info!(
                "delivery session {} ({}) stopped: {} delivered, {} failed, {} discarded, {} evicted, {} left queued",
                epoch,
                endpoint,
                report.delivered,
                report.failed,
                report.discarded,
                queue.stats().evicted,
                queue.len()
            ),
            None => tracing::warn!(
                "delivery session {} ({}) abandoned with a send in flight",
                epoch,
                endpoint
            ),
        }
    }
}

impl Drop for Supervisor {
    fn drop(&mut self) {
        self.dispose();
    }
}

impl std::fmt::Debug for Supervisor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Supervisor")
            .field("store", &self.store)
            .field("endpoint", &self.endpoint())
            .field("queue_capacity", &self.queue_capacity)
            .finish_non_exhaustive()
    }
}

/// Tears down the supervisor's session when dropped.
///
/// See [`Supervisor::exit_guard`].
#[derive(Debug)]
pub struct ExitGuard<'a> {
    supervisor: &'a Supervisor,
}

impl Drop for ExitGuard<'_> {
    fn drop(&mut self) {
        self.supervisor.run_exit_hook();
    }
}

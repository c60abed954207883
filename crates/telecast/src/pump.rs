//! # Delivery Pump
//!
//! The single background worker of a session.
//!
//! ```text
//!   loop {
//!       wait for entries  ← only suspension point (cancellation checked)
//!       for each entry (FIFO):
//!           cancelled? → stop
//!           transport.send(entry)   ← failure logged, loop continues
//!   }
//!   drop(transport)                 ← socket closed
//!   signal done                     ← teardown's bounded wait ends here
//! ```
//!
//! No lock is held while a datagram is being sent.

use crate::error::{TelecastError, TelecastResult};
use crate::queue::DeliveryQueue;
use crate::transport::{Transport, TransportStats};
use crossbeam_channel::{bounded, Receiver, RecvTimeoutError};
use std::net::SocketAddrV4;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// Final accounting of one pump.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PumpReport {
    /// Payloads the transport accepted.
    pub delivered: u64,
    /// Payloads whose send failed.
    pub failed: u64,
    /// Payloads dequeued but abandoned because the pump was cancelled.
    pub discarded: u64,
    /// Transport counters at shutdown.
    pub transport: TransportStats,
}

/// Counters shared with the owning session while the pump runs.
#[derive(Debug, Default)]
struct PumpCounters {
    delivered: AtomicU64,
    failed: AtomicU64,
}

/// Handle to a running pump thread.
pub struct Pump {
    queue: Arc<DeliveryQueue>,
    cancelled: Arc<AtomicBool>,
    counters: Arc<PumpCounters>,
    done_rx: Receiver<PumpReport>,
    handle: Option<JoinHandle<()>>,
    destination: SocketAddrV4,
}

impl Pump {
    /// Starts draining `queue` into `transport` on a new thread.
    ///
    /// # Errors
    ///
    /// [`TelecastError::WorkerSpawn`] if the OS refuses the thread.
    pub fn spawn(queue: Arc<DeliveryQueue>, transport: Box<dyn Transport>) -> TelecastResult<Self> {
        let cancelled = Arc::new(AtomicBool::new(false));
        let counters = Arc::new(PumpCounters::default());
        let (done_tx, done_rx) = bounded(1);
        let destination = transport.destination();

        let worker_queue = Arc::clone(&queue);
        let worker_cancelled = Arc::clone(&cancelled);
        let worker_counters = Arc::clone(&counters);

        let handle = thread::Builder::new()
            .name(format!("telecast-pump-{destination}"))
            .spawn(move || {
                let report = Self::run(&worker_queue, transport, &worker_cancelled, &worker_counters);
                // Receiver may be gone if the session was leaked; nothing to do then.
                let _ = done_tx.send(report);
            })
            .map_err(|e| TelecastError::WorkerSpawn(e.to_string()))?;

        Ok(Self {
            queue,
            cancelled,
            counters,
            done_rx,
            handle: Some(handle),
            destination,
        })
    }

    /// Pump thread main loop.
    fn run(
        queue: &DeliveryQueue,
        mut transport: Box<dyn Transport>,
        cancelled: &AtomicBool,
        counters: &PumpCounters,
    ) -> PumpReport {
        let destination = transport.destination();
        let mut batch = Vec::with_capacity(queue.capacity());
        let mut discarded = 0u64;

        tracing::debug!("pump for {} started", destination);

        'pump: while queue.wait_drain(&mut batch, cancelled) {
            let mut pending = batch.drain(..);
            while let Some(payload) = pending.next() {
                if cancelled.load(Ordering::Acquire) {
                    discarded += 1 + pending.len() as u64;
                    break 'pump;
                }
                match transport.send(payload.as_bytes()) {
                    Ok(()) => {
                        counters.delivered.fetch_add(1, Ordering::Relaxed);
                    }
                    Err(e) => {
                        counters.failed.fetch_add(1, Ordering::Relaxed);
                        tracing::warn!("dropped {}-byte payload: {}", payload.len(), e);
                    }
                }
            }
        }

        let report = PumpReport {
            delivered: counters.delivered.load(Ordering::Relaxed),
            failed: counters.failed.load(Ordering::Relaxed),
            discarded,
            transport: transport.stats(),
        };

        // Dispose the socket before signalling completion
        drop(transport);
        tracing::debug!("pump for {} stopped, transport disposed", destination);

        report
    }

    /// Destination of the transport this pump feeds.
    #[must_use]
    pub const fn destination(&self) -> SocketAddrV4 {
        self.destination
    }

    /// Payloads delivered so far.
    #[must_use]
    pub fn delivered(&self) -> u64 {
        self.counters.delivered.load(Ordering::Relaxed)
    }

    /// Sends that failed so far.
    #[must_use]
    pub fn failed(&self) -> u64 {
        self.counters.failed.load(Ordering::Relaxed)
    }

    /// Signals cancellation, closes the queue and waits up to `timeout` for
    /// the worker to dispose its transport.
    ///
    /// Returns `None` if the worker did not finish in time; it is then
    /// detached and disposes its transport whenever its current send returns.
    pub fn stop(mut self, timeout: Duration) -> Option<PumpReport> {
        self.cancelled.store(true, Ordering::Release);
        self.queue.close();
        self.finish(timeout)
    }

    /// Closes the queue and lets the worker deliver what is already queued,
    /// waiting up to `timeout`.
    #[cfg(test)]
    fn drain(mut self, timeout: Duration) -> Option<PumpReport> {
        self.queue.close();
        self.finish(timeout)
    }

    fn finish(&mut self, timeout: Duration) -> Option<PumpReport> {
        match self.done_rx.recv_timeout(timeout) {
            Ok(report) => {
                if let Some(handle) = self.handle.take() {
                    let _ = handle.join();
                }
                Some(report)
            }
            Err(RecvTimeoutError::Timeout) => {
                tracing::warn!(
                    "pump for {} did not stop within {:?}, detaching",
                    self.destination,
                    timeout
                );
                self.handle.take();
                None
            }
            Err(RecvTimeoutError::Disconnected) => {
                tracing::error!("pump for {} exited without a report", self.destination);
                if let Some(handle) = self.handle.take() {
                    let _ = handle.join();
                }
                None
            }
        }
    }
}

impl Drop for Pump {
    fn drop(&mut self) {
        if self.handle.is_some() {
            self.cancelled.store(true, Ordering::Release);
            self.queue.close();
        }
    }
}

impl std::fmt::Debug for Pump {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pump")
            .field("destination", &self.destination)
            .field("delivered", &self.delivered())
            .field("failed", &self.failed())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queue::Payload;
    use parking_lot::Mutex;
    use std::net::Ipv4Addr;

    /// Records every payload; optionally fails on every `fail_every`th send.
    struct RecordingTransport {
        sent: Arc<Mutex<Vec<Vec<u8>>>>,
        fail_every: Option<u64>,
        delay: Duration,
        calls: u64,
        stats: TransportStats,
    }

    impl RecordingTransport {
        fn new(sent: Arc<Mutex<Vec<Vec<u8>>>>) -> Self {
            Self {
                sent,
                fail_every: None,
                delay: Duration::ZERO,
                calls: 0,
                stats: TransportStats::default(),
            }
        }
    }

    impl Transport for RecordingTransport {
        fn send(&mut self, payload: &[u8]) -> TelecastResult<()> {
            self.calls += 1;
            if !self.delay.is_zero() {
                thread::sleep(self.delay);
            }
            let result = match self.fail_every {
                Some(n) if self.calls % n == 0 => Err(TelecastError::TransportFailure {
                    destination: "test".to_string(),
                    reason: "injected".to_string(),
                }),
                _ => {
                    self.sent.lock().push(payload.to_vec());
                    Ok(())
                }
            };
            self.stats.record(&result, payload.len());
            result
        }

        fn destination(&self) -> SocketAddrV4 {
            SocketAddrV4::new(Ipv4Addr::LOCALHOST, 4242)
        }

        fn stats(&self) -> TransportStats {
            self.stats
        }
    }

    #[test]
    fn test_pump_delivers_in_order() {
        let sent = Arc::new(Mutex::new(Vec::new()));
        let queue = Arc::new(DeliveryQueue::new(256));
        let pump = Pump::spawn(Arc::clone(&queue), Box::new(RecordingTransport::new(Arc::clone(&sent)))).unwrap();

        for i in 0..200u8 {
            queue.push(Payload::from(&[i])).unwrap();
        }

        let report = pump.drain(Duration::from_secs(5)).unwrap();
        assert_eq!(report.delivered, 200);
        assert_eq!(report.failed, 0);

        let order: Vec<u8> = sent.lock().iter().map(|p| p[0]).collect();
        assert_eq!(order, (0..200).collect::<Vec<_>>());
    }

    #[test]
    fn test_send_failures_are_isolated() {
        let sent = Arc::new(Mutex::new(Vec::new()));
        let queue = Arc::new(DeliveryQueue::new(64));
        let mut transport = RecordingTransport::new(Arc::clone(&sent));
        transport.fail_every = Some(3);
        let pump = Pump::spawn(Arc::clone(&queue), Box::new(transport)).unwrap();

        for i in 1..=30u8 {
            queue.push(Payload::from(&[i])).unwrap();
        }

        let report = pump.drain(Duration::from_secs(5)).unwrap();
        assert_eq!(report.failed, 10);
        assert_eq!(report.delivered, 20);
        assert_eq!(report.transport.send_errors, 10);

        // Every third payload is missing, everything else arrived in order
        let order: Vec<u8> = sent.lock().iter().map(|p| p[0]).collect();
        let expected: Vec<u8> = (1..=30u8).filter(|i| i % 3 != 0).collect();
        assert_eq!(order, expected);
    }

    #[test]
    fn test_stop_discards_backlog() {
        let sent = Arc::new(Mutex::new(Vec::new()));
        let queue = Arc::new(DeliveryQueue::new(64));
        let mut transport = RecordingTransport::new(Arc::clone(&sent));
        transport.delay = Duration::from_millis(20);
        let pump = Pump::spawn(Arc::clone(&queue), Box::new(transport)).unwrap();

        for i in 0..50u8 {
            queue.push(Payload::from(&[i])).unwrap();
        }
        thread::sleep(Duration::from_millis(30));

        let report = pump.stop(Duration::from_secs(1)).unwrap();
        assert!(report.delivered < 50);
        assert_eq!(report.delivered + report.failed + report.discarded + queue.len() as u64, 50);
        assert!(queue.is_closed());
    }

    #[test]
    fn test_stop_idle_pump_is_prompt() {
        let queue = Arc::new(DeliveryQueue::new(8));
        let pump = Pump::spawn(
            Arc::clone(&queue),
            Box::new(RecordingTransport::new(Arc::new(Mutex::new(Vec::new())))),
        )
        .unwrap();

        let start = std::time::Instant::now();
        let report = pump.stop(Duration::from_secs(1)).unwrap();
        assert_eq!(report, PumpReport::default());
        assert!(start.elapsed() < Duration::from_millis(500));
    }

    #[test]
    fn test_stop_times_out_on_stuck_send() {
        let queue = Arc::new(DeliveryQueue::new(8));
        let mut transport = RecordingTransport::new(Arc::new(Mutex::new(Vec::new())));
        transport.delay = Duration::from_millis(500);
        let pump = Pump::spawn(Arc::clone(&queue), Box::new(transport)).unwrap();

        queue.push(Payload::from(b"slow")).unwrap();
        thread::sleep(Duration::from_millis(50));

        // Worker is inside a 500ms send; a 50ms wait gives up and detaches
        assert!(pump.stop(Duration::from_millis(50)).is_none());
    }
}

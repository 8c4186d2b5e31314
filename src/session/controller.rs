//! Capture lifecycle and packet handling.

use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use tracing::{debug, error, info, warn};

use super::{lock, CaptureSession};
use crate::capture::CaptureBackend;
use crate::domain::{PacketObservation, StreamEndpoint};
use crate::error::CaptureError;
use crate::extractor::Extractor;

/// Tracing target for per-packet connection summaries.
pub const PACKET_LOG_TARGET: &str = "pushsniff::packet";

/// How long `stop` waits for capture threads to exit.
pub const DEFAULT_STOP_TIMEOUT: Duration = Duration::from_secs(1);

/// Handler invoked with `(server_address, stream_key)` once both are found.
pub type ResultCallback = Arc<dyn Fn(&str, &str) -> anyhow::Result<()> + Send + Sync>;

/// State shared by the controller and its capture threads.
struct Shared {
    extractor: Extractor,
    callbacks: Mutex<Vec<ResultCallback>>,
}

impl Shared {
    /// Handle one observed TCP segment.
    fn handle_packet(&self, session: &CaptureSession, packet: &PacketObservation) {
        if packet.payload.is_empty() {
            return;
        }

        info!(target: PACKET_LOG_TARGET, "{}", packet.summary());

        let payload = packet.decode_payload();
        if let Some(endpoint) = session.record(&self.extractor, &payload) {
            self.notify(&endpoint);
            session.request_stop();
            info!("Server address and stream key found, stopping capture");
        }
    }

    /// Invoke every callback in registration order.
    ///
    /// A failing or panicking callback is logged and skipped.
    fn notify(&self, endpoint: &StreamEndpoint) {
        let callbacks = lock(&self.callbacks).clone();

        for (index, callback) in callbacks.iter().enumerate() {
            let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
                callback(&endpoint.server_address, &endpoint.stream_key)
            }));

            match outcome {
                Ok(Ok(())) => {}
                Ok(Err(e)) => error!("Result callback #{} failed: {:#}", index, e),
                Err(_) => error!("Result callback #{} panicked", index),
            }
        }
    }
}

/// Owns capture threads and the current session.
///
/// All methods take `&self`; the controller can be shared behind an `Arc`
/// and driven from callbacks.
pub struct CaptureController {
    backend: Arc<dyn CaptureBackend>,
    shared: Arc<Shared>,
    session: Mutex<Option<Arc<CaptureSession>>>,
    workers: Mutex<Vec<JoinHandle<()>>>,
    stop_timeout: Duration,
}

impl CaptureController {
    /// Create a controller capturing through `backend`.
    pub fn new(backend: Arc<dyn CaptureBackend>, extractor: Extractor) -> Self {
        Self {
            backend,
            shared: Arc::new(Shared {
                extractor,
                callbacks: Mutex::new(Vec::new()),
            }),
            session: Mutex::new(None),
            workers: Mutex::new(Vec::new()),
            stop_timeout: DEFAULT_STOP_TIMEOUT,
        }
    }

    /// Set how long `stop` waits for capture threads.
    pub fn with_stop_timeout(mut self, timeout: Duration) -> Self {
        self.stop_timeout = timeout;
        self
    }

    /// Register a handler for the extraction result.
    pub fn add_callback<F>(&self, callback: F)
    where
        F: Fn(&str, &str) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        lock(&self.shared.callbacks).push(Arc::new(callback));
    }

    /// Start capturing on one interface.
    pub fn start(&self, interface: &str) {
        self.start_multi(&[interface]);
    }

    /// Start capturing on several interfaces, one thread each.
    ///
    /// Does nothing while a session is active. Otherwise a fresh session
    /// replaces the previous one, clearing discovered values. With no usable
    /// interface name that session is never started. An interface that
    /// cannot be opened only ends its own loop.
    pub fn start_multi<S: AsRef<str>>(&self, interfaces: &[S]) {
        let mut current = lock(&self.session);
        if current.as_ref().is_some_and(|session| session.is_active()) {
            debug!("Capture already running, ignoring start");
            return;
        }

        let mut targets: Vec<String> = Vec::new();
        for interface in interfaces {
            let interface = interface.as_ref().trim();
            if !interface.is_empty() && !targets.iter().any(|t| t == interface) {
                targets.push(interface.to_string());
            }
        }

        if targets.is_empty() {
            warn!("No interface to capture on");
            let session = CaptureSession::new(targets);
            session.request_stop();
            *current = Some(Arc::new(session));
            return;
        }

        let session = Arc::new(CaptureSession::new(targets.clone()));
        *current = Some(Arc::clone(&session));
        drop(current);

        let mut workers = lock(&self.workers);
        workers.retain(|handle| !handle.is_finished());

        for interface in targets {
            let backend = Arc::clone(&self.backend);
            let shared = Arc::clone(&self.shared);
            let loop_session = Arc::clone(&session);
            let thread_interface = interface.clone();

            let spawned = thread::Builder::new()
                .name(format!("capture-{}", interface))
                .spawn(move || run_capture_loop(backend, shared, loop_session, thread_interface));

            match spawned {
                Ok(handle) => {
                    workers.push(handle);
                    info!("Started capturing packets on interface {}", interface);
                }
                Err(e) => {
                    error!("Failed to spawn capture thread for {}: {}", interface, e);
                    session.loop_exited();
                }
            }
        }
    }

    /// Stop the current session.
    ///
    /// Sets the stop flag and, unless called from a capture thread, waits up
    /// to the stop timeout for the loops to notice. A loop blocked in a read
    /// exits after its next packet or read timeout; it is never killed.
    pub fn stop(&self) {
        let session = match lock(&self.session).clone() {
            Some(session) if session.is_active() => session,
            _ => return,
        };

        session.request_stop();

        let handles = std::mem::take(&mut *lock(&self.workers));
        let current = thread::current().id();
        let on_capture_thread = handles.iter().any(|h| h.thread().id() == current);

        if !on_capture_thread {
            let deadline = Instant::now() + self.stop_timeout;
            while handles.iter().any(|h| !h.is_finished()) && Instant::now() < deadline {
                thread::sleep(Duration::from_millis(10));
            }
        }

        let (finished, pending): (Vec<_>, Vec<_>) =
            handles.into_iter().partition(|h| h.is_finished());

        for handle in finished {
            if handle.join().is_err() {
                warn!("A capture thread panicked");
            }
        }

        if !pending.is_empty() && !on_capture_thread {
            warn!(
                "{} capture thread(s) still waiting for a packet after {:?}",
                pending.len(),
                self.stop_timeout
            );
        }
        lock(&self.workers).extend(pending);

        info!("Stopped capturing packets");
    }

    /// Whether a capture session is running.
    pub fn is_active(&self) -> bool {
        self.current_session()
            .is_some_and(|session| session.is_active())
    }

    /// The current (or most recent) session.
    pub fn current_session(&self) -> Option<Arc<CaptureSession>> {
        lock(&self.session).clone()
    }

    /// Server address discovered in the current or last session.
    pub fn server_address(&self) -> Option<String> {
        self.current_session()?.server_address()
    }

    /// Stream key discovered in the current or last session.
    pub fn stream_key(&self) -> Option<String> {
        self.current_session()?.stream_key()
    }

    /// Both values, if the current or last session found them.
    pub fn result(&self) -> Option<StreamEndpoint> {
        self.current_session()?.result()
    }
}

impl Drop for CaptureController {
    fn drop(&mut self) {
        let session = self
            .session
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner);
        if let Some(session) = session {
            session.request_stop();
        }
    }
}

/// Body of one capture thread.
fn run_capture_loop(
    backend: Arc<dyn CaptureBackend>,
    shared: Arc<Shared>,
    session: Arc<CaptureSession>,
    interface: String,
) {
    if let Err(e) = capture_interface(backend.as_ref(), &shared, &session, &interface) {
        error!("Capture on {} failed: {}", interface, e);
    }
    session.loop_exited();
    debug!("Capture loop on {} exited", interface);
}

fn capture_interface(
    backend: &dyn CaptureBackend,
    shared: &Shared,
    session: &CaptureSession,
    interface: &str,
) -> Result<(), CaptureError> {
    let mut source = backend.open(interface)?;
    debug!("Opened capture on {}", source.interface_name());
    let packets = source.capture_tcp_payloads(session.running_flag())?;

    for packet in packets {
        shared.handle_packet(session, &packet?);
        if !session.is_active() {
            break;
        }
    }

    Ok(())
}

//! Capture sessions and the controller that runs them.
//!
//! A `CaptureSession` is the only state shared between capture threads:
//! the active flag and the two discovered fields. The controller creates
//! one per `start` and hands it to every capture loop.

mod controller;

pub use controller::{CaptureController, ResultCallback, DEFAULT_STOP_TIMEOUT, PACKET_LOG_TARGET};

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::info;

use crate::domain::StreamEndpoint;
use crate::extractor::{Extraction, Extractor};

/// Lock a mutex, recovering the data if a holder panicked.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Discovered values, guarded by the session lock.
#[derive(Debug, Default)]
struct Discovered {
    found: Extraction,
    delivered: bool,
}

/// One start-to-stop capture lifecycle.
#[derive(Debug)]
pub struct CaptureSession {
    active: Arc<AtomicBool>,
    interfaces: Vec<String>,
    live_loops: AtomicUsize,
    discovered: Mutex<Discovered>,
}

impl CaptureSession {
    /// Create an active session with nothing discovered yet.
    pub fn new(interfaces: Vec<String>) -> Self {
        Self {
            active: Arc::new(AtomicBool::new(true)),
            live_loops: AtomicUsize::new(interfaces.len()),
            interfaces,
            discovered: Mutex::new(Discovered::default()),
        }
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    /// Ask every capture loop to exit at its next flag check.
    pub fn request_stop(&self) {
        self.active.store(false, Ordering::SeqCst);
    }

    /// The flag capture sources poll between reads.
    pub fn running_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.active)
    }

    /// Interfaces this session was started on.
    pub fn interfaces(&self) -> &[String] {
        &self.interfaces
    }

    pub fn server_address(&self) -> Option<String> {
        lock(&self.discovered).found.server_address.clone()
    }

    pub fn stream_key(&self) -> Option<String> {
        lock(&self.discovered).found.stream_key.clone()
    }

    /// Both values, once both have been found.
    pub fn result(&self) -> Option<StreamEndpoint> {
        let discovered = lock(&self.discovered);
        match (&discovered.found.server_address, &discovered.found.stream_key) {
            (Some(server), Some(key)) => Some(StreamEndpoint::new(server.clone(), key.clone())),
            _ => None,
        }
    }

    /// Run the extractor on a payload and record what it finds.
    ///
    /// Fields already set are never overwritten. Returns the endpoint only
    /// to the single caller that completes the pair; every later call
    /// returns `None`.
    pub fn record(&self, extractor: &Extractor, payload: &str) -> Option<StreamEndpoint> {
        let mut discovered = lock(&self.discovered);
        if discovered.delivered {
            return None;
        }

        let new = extractor.extract_missing(payload, &discovered.found);

        if let Some(server_address) = new.server_address {
            info!("Found server address: {}", server_address);
            discovered.found.server_address = Some(server_address);
        }
        if let Some(stream_key) = new.stream_key {
            info!("Found stream key: {}", stream_key);
            discovered.found.stream_key = Some(stream_key);
        }

        match (&discovered.found.server_address, &discovered.found.stream_key) {
            (Some(server), Some(key)) => {
                let endpoint = StreamEndpoint::new(server.clone(), key.clone());
                discovered.delivered = true;
                Some(endpoint)
            }
            _ => None,
        }
    }

    /// Register the exit of one capture loop.
    ///
    /// The session goes inactive once its last loop has exited, whatever
    /// the reason.
    pub(crate) fn loop_exited(&self) {
        if self.live_loops.fetch_sub(1, Ordering::SeqCst) == 1 {
            self.request_stop();
        }
    }

    /// Number of capture loops still running.
    pub fn live_loops(&self) -> usize {
        self.live_loops.load(Ordering::SeqCst)
    }
}

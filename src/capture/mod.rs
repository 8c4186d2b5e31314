//! Packet capture abstraction.
//!
//! `CaptureBackend` opens a `PacketSource` per interface. The controller
//! only depends on these traits, so tests can drive it with scripted
//! packets and the pnet implementation stays swappable.

mod directory;
mod pnet_capture;

pub use directory::{default_interface, list_interfaces, sort_by_activity};
pub use pnet_capture::{PnetBackend, PnetCapture};

use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use crate::domain::PacketObservation;
use crate::error::CaptureError;

/// Items produced by a running capture.
pub type PacketIter<'a> = Box<dyn Iterator<Item = Result<PacketObservation, CaptureError>> + 'a>;

/// A live capture bound to one interface.
pub trait PacketSource: Send {
    /// Start capturing and return an iterator over TCP segments that carry
    /// a payload.
    ///
    /// The iterator returns `None` once `running` reads false. The flag is
    /// checked between reads, so a blocked read finishes first. A receive
    /// failure is yielded as `Err` and the caller is expected to stop.
    fn capture_tcp_payloads(&mut self, running: Arc<AtomicBool>) -> Result<PacketIter<'_>, CaptureError>;

    /// Get the name of the interface being captured.
    fn interface_name(&self) -> &str;
}

/// Resolves interface identifiers to packet sources.
pub trait CaptureBackend: Send + Sync {
    /// Open a capture on the named interface.
    fn open(&self, interface: &str) -> Result<Box<dyn PacketSource>, CaptureError>;
}

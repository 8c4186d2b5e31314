//! Observed TCP segments.

use std::borrow::Cow;
use std::net::SocketAddr;

use chrono::{DateTime, Local};

/// A TCP segment with a payload, as seen on the wire.
///
/// Addresses are kept for logging only. Observations are not retained
/// after they have been handled.
#[derive(Debug, Clone)]
pub struct PacketObservation {
    /// When the frame was observed
    pub timestamp: DateTime<Local>,
    /// Sender address and port
    pub source: SocketAddr,
    /// Receiver address and port
    pub destination: SocketAddr,
    /// Application-layer bytes carried by the segment
    pub payload: Vec<u8>,
}

impl PacketObservation {
    /// Create an observation stamped with the current local time.
    pub fn new(source: SocketAddr, destination: SocketAddr, payload: Vec<u8>) -> Self {
        Self {
            timestamp: Local::now(),
            source,
            destination,
            payload,
        }
    }

    /// One-line connection summary: `[time] src:port -> dst:port`.
    pub fn summary(&self) -> String {
        format!(
            "[{}] {} -> {}",
            self.timestamp.format("%Y-%m-%d %H:%M:%S"),
            self.source,
            self.destination
        )
    }

    /// Decode the payload as text, dropping invalid UTF-8 sequences.
    ///
    /// RTMP chunk headers (e.g. `0xC3`) land inside long command messages;
    /// dropping them rejoins the text on either side.
    pub fn decode_payload(&self) -> Cow<'_, str> {
        match std::str::from_utf8(&self.payload) {
            Ok(text) => Cow::Borrowed(text),
            Err(_) => Cow::Owned(self.payload.utf8_chunks().map(|chunk| chunk.valid()).collect()),
        }
    }
}

//! The extraction result.

use std::fmt;

/// Ingest server address and stream key found during a capture session.
///
/// Built once per session, when both values are known, and handed to
/// every registered callback.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamEndpoint {
    /// e.g. `rtmp://push.example.com/live`
    pub server_address: String,
    /// e.g. `stream-42?token=abc&sig=99`
    pub stream_key: String,
}

impl StreamEndpoint {
    pub fn new(server_address: impl Into<String>, stream_key: impl Into<String>) -> Self {
        Self {
            server_address: server_address.into(),
            stream_key: stream_key.into(),
        }
    }

    /// Server address and stream key joined into a single publish URL.
    pub fn publish_url(&self) -> String {
        format!(
            "{}/{}",
            self.server_address.trim_end_matches('/'),
            self.stream_key
        )
    }
}

impl fmt::Display for StreamEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "server={} key={}", self.server_address, self.stream_key)
    }
}

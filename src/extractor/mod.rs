//! Field extraction from RTMP handshake payloads.
//!
//! The extractor knows nothing about sessions or packets: it takes one
//! decoded payload and reports what it found in it.

mod matcher;

pub use matcher::{Cleanup, FieldMatcher};

use crate::error::MatcherError;

/// Text marking RTMP's `connect` command.
pub const CONNECT_SIGNATURE: &str = "connect";
/// Server address: `rtmp://`, a hostname, `/` and one path segment.
pub const SERVER_PATTERN: &str = r"(rtmp://[a-zA-Z0-9\-\.]+/[^/]+)";

/// Text marking RTMP's `FCPublish` command.
pub const FCPUBLISH_SIGNATURE: &str = "FCPublish";
/// Stream key: `stream-<digits>?k=v[&k=v...]`.
pub const STREAM_KEY_PATTERN: &str =
    r"(stream-\d+\?[a-zA-Z0-9_]+=[a-zA-Z0-9\-]+(?:&[a-zA-Z0-9_]+=[a-zA-Z0-9\-]+)*)";
/// Artifact left after the stream key by the publishing client's framing.
pub const STREAM_KEY_ARTIFACT: char = 'C';

/// Signatures and patterns for both fields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractorConfig {
    pub server_signature: String,
    pub server_pattern: String,
    pub key_signature: String,
    pub key_pattern: String,
}

impl Default for ExtractorConfig {
    fn default() -> Self {
        Self {
            server_signature: CONNECT_SIGNATURE.to_string(),
            server_pattern: SERVER_PATTERN.to_string(),
            key_signature: FCPUBLISH_SIGNATURE.to_string(),
            key_pattern: STREAM_KEY_PATTERN.to_string(),
        }
    }
}

/// Values found in a single payload.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Extraction {
    pub server_address: Option<String>,
    pub stream_key: Option<String>,
}

impl Extraction {
    pub fn is_empty(&self) -> bool {
        self.server_address.is_none() && self.stream_key.is_none()
    }
}

/// Runs the server-address and stream-key matchers over payloads.
#[derive(Debug, Clone)]
pub struct Extractor {
    server: FieldMatcher,
    stream_key: FieldMatcher,
}

impl Extractor {
    /// Create an extractor from two matchers.
    pub fn new(server: FieldMatcher, stream_key: FieldMatcher) -> Self {
        Self { server, stream_key }
    }

    /// The built-in RTMP `connect` / `FCPublish` matchers.
    pub fn rtmp() -> Result<Self, MatcherError> {
        Self::from_config(&ExtractorConfig::default())
    }

    /// Build the matchers from configured signatures and patterns.
    ///
    /// Cleanup rules are fixed: the server address is cut at NUL and the
    /// stream key loses one trailing `C`.
    pub fn from_config(config: &ExtractorConfig) -> Result<Self, MatcherError> {
        let server = FieldMatcher::new(
            "server address",
            config.server_signature.as_str(),
            &config.server_pattern,
            Cleanup::TruncateAtNul,
        )?;
        let stream_key = FieldMatcher::new(
            "stream key",
            config.key_signature.as_str(),
            &config.key_pattern,
            Cleanup::StripTrailing(STREAM_KEY_ARTIFACT),
        )?;

        Ok(Self::new(server, stream_key))
    }

    pub fn server_matcher(&self) -> &FieldMatcher {
        &self.server
    }

    pub fn stream_key_matcher(&self) -> &FieldMatcher {
        &self.stream_key
    }

    /// Run both matchers on a payload.
    pub fn extract(&self, payload: &str) -> Extraction {
        self.extract_missing(payload, &Extraction::default())
    }

    /// Run only the matchers whose field is not yet in `known`.
    pub fn extract_missing(&self, payload: &str, known: &Extraction) -> Extraction {
        Extraction {
            server_address: match known.server_address {
                Some(_) => None,
                None => self.server.find(payload),
            },
            stream_key: match known.stream_key {
                Some(_) => None,
                None => self.stream_key.find(payload),
            },
        }
    }
}

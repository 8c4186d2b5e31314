//! Pushsniff - RTMP push listener
//!
//! Watches local traffic for the RTMP `connect` and `FCPublish` commands of
//! a streaming application and pulls out the ingest server address and the
//! stream key, without taking part in the stream.
//!
//! The capture side (`capture`) hands TCP payloads to a
//! `session::CaptureController`, which runs them through an
//! `extractor::Extractor` and reports the pair once both are known.

pub mod capture;
pub mod config;
pub mod domain;
pub mod error;
pub mod extractor;
pub mod reporter;
pub mod session;

pub use capture::{CaptureBackend, PacketSource, PnetBackend};
pub use config::SnifferConfig;
pub use domain::{InterfaceInfo, PacketObservation, StreamEndpoint};
pub use error::{CaptureError, ConfigError, MatcherError};
pub use extractor::{Cleanup, Extraction, Extractor, ExtractorConfig, FieldMatcher};
pub use session::{CaptureController, CaptureSession};

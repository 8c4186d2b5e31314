//! Reporting module for capture results.
//!
//! This module defines the `EventReporter` trait and a console
//! implementation used by the command-line tool.

mod console_reporter;

pub use console_reporter::ConsoleReporter;

use crate::domain::StreamEndpoint;

/// Presents capture progress and results to the user.
///
/// Kept minimal: it formats and prints, nothing else. The capture
/// controller reaches it through a result callback.
pub trait EventReporter: Send + Sync {
    /// Report the server address and stream key.
    fn report(&self, endpoint: &StreamEndpoint);

    /// Called when capture starts.
    fn on_start(&self, interfaces: &[String]);

    /// Called when capture ends, with the result if one was found.
    fn on_stop(&self, result: Option<&StreamEndpoint>);
}

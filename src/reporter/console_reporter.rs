//! Console-based result reporter.

use std::io::{self, Write};

use crate::domain::StreamEndpoint;
use crate::reporter::EventReporter;

/// Reports capture results on stdout.
///
/// Results go to stdout so they can be piped; logging stays on stderr.
pub struct ConsoleReporter {
    /// Whether to also print the combined publish URL
    verbose: bool,
}

impl ConsoleReporter {
    /// Create a new console reporter.
    pub fn new() -> Self {
        Self { verbose: false }
    }

    /// Enable or disable verbose output.
    pub fn with_verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    fn format_endpoint(&self, endpoint: &StreamEndpoint) -> String {
        let mut output = format!(
            "Server: {}\nStream key: {}",
            endpoint.server_address, endpoint.stream_key
        );

        if self.verbose {
            output.push_str(&format!("\nPublish URL: {}", endpoint.publish_url()));
        }

        output
    }
}

impl Default for ConsoleReporter {
    fn default() -> Self {
        Self::new()
    }
}

impl EventReporter for ConsoleReporter {
    fn report(&self, endpoint: &StreamEndpoint) {
        let output = self.format_endpoint(endpoint);
        let mut stdout = io::stdout().lock();
        let _ = writeln!(stdout, "{}", output);
    }

    fn on_start(&self, interfaces: &[String]) {
        println!("Listening for RTMP push on: {}", interfaces.join(", "));
        println!("Start streaming in your broadcasting app. Press Ctrl+C to stop.\n");
    }

    fn on_stop(&self, result: Option<&StreamEndpoint>) {
        if result.is_none() {
            println!("\nStopped without finding a server address and stream key.");
        }
    }
}

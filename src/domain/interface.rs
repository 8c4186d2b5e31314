//! Network interface metadata.

use std::net::IpAddr;

/// Longest description shown before it is truncated.
const MAX_DESCRIPTION_LEN: usize = 50;

/// Descriptive record for a capture-capable network interface.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InterfaceInfo {
    /// Identifier passed to the capture backend
    pub name: String,
    /// Human-readable description (may be empty)
    pub description: String,
    /// Assigned IP addresses
    pub ips: Vec<IpAddr>,
    pub is_up: bool,
    pub is_loopback: bool,
}

impl InterfaceInfo {
    /// An interface is active when it is up, not loopback and has an address.
    pub fn is_active(&self) -> bool {
        self.is_up && !self.is_loopback && !self.ips.is_empty()
    }

    /// Heuristic for wired Ethernet adapters.
    pub fn looks_like_ethernet(&self) -> bool {
        let name = self.name.to_lowercase();
        let description = self.description.to_lowercase();
        description.contains("ethernet")
            || name.starts_with("eth")
            || name.starts_with("enp")
            || name.starts_with("eno")
            || name.starts_with("ens")
    }

    /// `[UP] name - description`, with long descriptions shortened.
    pub fn display_name(&self) -> String {
        let status = if self.is_active() { "UP" } else { "DOWN" };
        let description = if self.description.chars().count() > MAX_DESCRIPTION_LEN {
            let short: String = self.description.chars().take(MAX_DESCRIPTION_LEN - 3).collect();
            format!("{}...", short)
        } else {
            self.description.clone()
        };

        if description.is_empty() {
            format!("[{}] {}", status, self.name)
        } else {
            format!("[{}] {} - {}", status, self.name, description)
        }
    }

    /// Comma-separated address list, or `no IP`.
    pub fn ips_display(&self) -> String {
        if self.ips.is_empty() {
            "no IP".to_string()
        } else {
            self.ips
                .iter()
                .map(|ip| ip.to_string())
                .collect::<Vec<_>>()
                .join(", ")
        }
    }
}

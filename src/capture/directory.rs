//! Interface directory backed by `pnet::datalink`.

use pnet::datalink::{self, NetworkInterface};

use crate::domain::InterfaceInfo;

impl From<&NetworkInterface> for InterfaceInfo {
    fn from(iface: &NetworkInterface) -> Self {
        Self {
            name: iface.name.clone(),
            description: iface.description.clone(),
            ips: iface.ips.iter().map(|network| network.ip()).collect(),
            is_up: iface.is_up(),
            is_loopback: iface.is_loopback(),
        }
    }
}

/// List all available network interfaces, in system order.
///
/// Queried on every call; nothing is cached.
pub fn list_interfaces() -> Vec<InterfaceInfo> {
    datalink::interfaces().iter().map(InterfaceInfo::from).collect()
}

/// Put active interfaces first, keeping the original order within each group.
pub fn sort_by_activity(mut interfaces: Vec<InterfaceInfo>) -> Vec<InterfaceInfo> {
    interfaces.sort_by_key(|iface| !iface.is_active());
    interfaces
}

/// Pick the interface to capture on when none is given.
///
/// Prefers an active Ethernet adapter, then any active interface.
pub fn default_interface(interfaces: &[InterfaceInfo]) -> Option<&InterfaceInfo> {
    interfaces
        .iter()
        .find(|iface| iface.is_active() && iface.looks_like_ethernet())
        .or_else(|| interfaces.iter().find(|iface| iface.is_active()))
}

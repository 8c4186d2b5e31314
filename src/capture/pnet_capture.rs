//! pnet-based packet capture implementation.

use std::net::{IpAddr, SocketAddr};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use pnet::datalink::{self, Channel, Config, NetworkInterface};
use pnet::packet::ethernet::{EtherTypes, EthernetPacket};
use pnet::packet::ip::{IpNextHeaderProtocol, IpNextHeaderProtocols};
use pnet::packet::ipv4::Ipv4Packet;
use pnet::packet::ipv6::Ipv6Packet;
use pnet::packet::tcp::TcpPacket;
use pnet::packet::Packet;

use super::{CaptureBackend, PacketIter, PacketSource};
use crate::domain::PacketObservation;
use crate::error::CaptureError;

/// How long a read blocks before the running flag is checked again.
const READ_TIMEOUT: Duration = Duration::from_millis(100);

/// Opens pnet captures by interface name.
#[derive(Debug, Default, Clone, Copy)]
pub struct PnetBackend;

impl CaptureBackend for PnetBackend {
    fn open(&self, interface: &str) -> Result<Box<dyn PacketSource>, CaptureError> {
        Ok(Box::new(PnetCapture::new(interface)?))
    }
}

/// Packet capture using the pnet library.
pub struct PnetCapture {
    interface: NetworkInterface,
}

impl PnetCapture {
    /// Create a new capture on the specified interface.
    pub fn new(interface_name: &str) -> Result<Self, CaptureError> {
        let interface = datalink::interfaces()
            .into_iter()
            .find(|iface| iface.name == interface_name)
            .ok_or_else(|| CaptureError::InterfaceNotFound(interface_name.to_string()))?;

        Ok(Self { interface })
    }
}

impl PacketSource for PnetCapture {
    fn capture_tcp_payloads(&mut self, running: Arc<AtomicBool>) -> Result<PacketIter<'_>, CaptureError> {
        let config = Config {
            read_timeout: Some(READ_TIMEOUT),
            promiscuous: true,
            ..Config::default()
        };

        let rx = match datalink::channel(&self.interface, config) {
            Ok(Channel::Ethernet(_tx, rx)) => rx,
            Ok(_) => {
                return Err(CaptureError::ChannelCreation(
                    "unsupported channel type".to_string(),
                ))
            }
            Err(e) => {
                let msg = e.to_string();
                if e.kind() == std::io::ErrorKind::PermissionDenied
                    || msg.contains("permission")
                    || msg.contains("Operation not permitted")
                {
                    return Err(CaptureError::InsufficientPermissions);
                }
                return Err(CaptureError::ChannelCreation(msg));
            }
        };

        Ok(Box::new(TcpPayloadIterator { rx, running }))
    }

    fn interface_name(&self) -> &str {
        &self.interface.name
    }
}

/// Iterator that yields TCP segments with a payload from the network.
struct TcpPayloadIterator {
    rx: Box<dyn datalink::DataLinkReceiver>,
    running: Arc<AtomicBool>,
}

impl Iterator for TcpPayloadIterator {
    type Item = Result<PacketObservation, CaptureError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if !self.running.load(Ordering::SeqCst) {
                return None;
            }

            match self.rx.next() {
                Ok(frame) => {
                    if let Some(observation) = extract_tcp_segment(frame) {
                        return Some(Ok(observation));
                    }
                    // Not TCP or no payload, keep listening
                }
                Err(e) => match e.kind() {
                    std::io::ErrorKind::TimedOut
                    | std::io::ErrorKind::WouldBlock
                    | std::io::ErrorKind::Interrupted => continue,
                    _ => return Some(Err(CaptureError::Receive(e))),
                },
            }
        }
    }
}

/// Extract the TCP payload from an Ethernet frame, if it carries one.
pub(crate) fn extract_tcp_segment(data: &[u8]) -> Option<PacketObservation> {
    let ethernet = EthernetPacket::new(data)?;

    match ethernet.get_ethertype() {
        EtherTypes::Ipv4 => {
            let ipv4 = Ipv4Packet::new(ethernet.payload())?;
            tcp_observation(
                IpAddr::V4(ipv4.get_source()),
                IpAddr::V4(ipv4.get_destination()),
                ipv4.get_next_level_protocol(),
                ipv4.payload(),
            )
        }
        EtherTypes::Ipv6 => {
            let ipv6 = Ipv6Packet::new(ethernet.payload())?;
            tcp_observation(
                IpAddr::V6(ipv6.get_source()),
                IpAddr::V6(ipv6.get_destination()),
                ipv6.get_next_header(),
                ipv6.payload(),
            )
        }
        _ => None,
    }
}

fn tcp_observation(
    src_ip: IpAddr,
    dst_ip: IpAddr,
    protocol: IpNextHeaderProtocol,
    ip_payload: &[u8],
) -> Option<PacketObservation> {
    if protocol != IpNextHeaderProtocols::Tcp {
        return None;
    }

    let tcp = TcpPacket::new(ip_payload)?;
    let payload = tcp.payload();
    if payload.is_empty() {
        return None;
    }

    Some(PacketObservation::new(
        SocketAddr::new(src_ip, tcp.get_source()),
        SocketAddr::new(dst_ip, tcp.get_destination()),
        payload.to_vec(),
    ))
}

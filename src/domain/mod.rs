//! Domain models for RTMP push listening.
//!
//! These types are independent of the capture backend and of how results
//! are presented.

mod endpoint;
mod interface;
mod packet;

pub use endpoint::StreamEndpoint;
pub use interface::InterfaceInfo;
pub use packet::PacketObservation;

//! Protocol plumbing for the Lodestar UPnP control point.
//!
//! This crate contains the wire-level pieces the control point is built
//! from:
//!
//! - [`http`] : a small HTTP/1.x message codec (UPnP messages are short,
//!   so the codec favors simplicity over throughput) and a blocking
//!   client transport with keep-alive pooling.
//! - [`ssdp`] : SSDP datagram parsing plus the two multicast UDP socket
//!   flavors a control point needs (search and notify).
//! - [`soap`] : SOAP envelope construction and response/fault parsing
//!   for UPnP action invocation.
//!
//! Nothing in here knows about devices or services; the entity model
//! lives in `lodecontrol`.

pub mod http;
pub mod soap;
pub mod ssdp;

/// User-Agent / Server token advertised in outgoing messages.
pub const SERVER_TOKEN: &str = "Lodestar/0.1 UPnP/1.1";

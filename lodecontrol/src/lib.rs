//! A UPnP control point.
//!
//! Discovers devices over SSDP, parses their description documents
//! into a typed Device/Service/Action graph, invokes actions over
//! SOAP, and keeps GENA event subscriptions alive.
//!
//! ```no_run
//! use std::sync::Arc;
//! use lodecontrol::{ControlPoint, ControlPointConfig, Device, DiscoveryListener};
//!
//! struct Printer;
//!
//! impl DiscoveryListener for Printer {
//!     fn on_discover(&self, device: &Arc<Device>) {
//!         println!("+ {} ({})", device.friendly_name(), device.udn());
//!     }
//!     fn on_lost(&self, device: &Arc<Device>) {
//!         println!("- {}", device.friendly_name());
//!     }
//! }
//!
//! let cp = ControlPoint::new(ControlPointConfig::default());
//! cp.add_discovery_listener(Arc::new(Printer));
//! cp.initialize()?;
//! cp.start()?;
//! cp.search()?;
//! # Ok::<(), lodecontrol::ControlPointError>(())
//! ```

mod action;
mod control_point;
mod description;
mod device;
mod discovery;
mod errors;
mod event_receiver;
mod interfaces;
mod registry;
mod service;
mod state_variable;
mod subscription;

pub use action::{Action, Argument, ArgumentBuilder, Direction};
pub use control_point::{
    ControlPoint, ControlPointConfig, DiscoveryListener, NotifyEventListener,
};
pub use device::{Device, Icon};
pub use errors::ControlPointError;
pub use interfaces::{usable_interfaces, NetworkInterface};
pub use service::{Service, Subscription};
pub use state_variable::{AllowedValueRange, StateVariable, StateVariableBuilder};

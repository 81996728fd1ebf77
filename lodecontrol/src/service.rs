//! Services of a device.

use std::collections::HashMap;
use std::net::Ipv4Addr;
use std::sync::{Arc, Mutex, Weak};
use std::time::{Duration, Instant};

use url::Url;

use crate::action::Action;
use crate::errors::ControlPointError;
use crate::state_variable::StateVariable;
use crate::subscription::GenaContext;

/// Live GENA subscription state of a service.
#[derive(Debug, Clone)]
pub struct Subscription {
    /// Subscription identifier issued by the device.
    pub sid: String,
    /// When the current lease was granted (or last renewed).
    pub started: Instant,
    /// Advertised lease duration; `None` means `infinite`.
    pub timeout: Option<Duration>,
}

/// One service of a device: its declared URLs, actions and state
/// variables, plus the subscription state the control point maintains
/// for it.
///
/// Everything but the subscription state is immutable after the
/// description parse. All URLs are absolute, resolved against URLBase
/// or the device's LOCATION during the build.
pub struct Service {
    udn: String,
    interface_addr: Ipv4Addr,
    service_type: String,
    service_id: String,
    scpd_url: Url,
    control_url: Url,
    event_sub_url: Url,
    actions: HashMap<String, Arc<Action>>,
    state_variables: HashMap<String, Arc<StateVariable>>,
    gena: Arc<GenaContext>,
    subscription: Mutex<Option<Subscription>>,
    /// Handle to the `Arc` this service lives in, needed to register
    /// the service in the SID index and the keeper.
    self_ref: Weak<Service>,
}

impl Service {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        udn: String,
        interface_addr: Ipv4Addr,
        service_type: String,
        service_id: String,
        scpd_url: Url,
        control_url: Url,
        event_sub_url: Url,
        actions: HashMap<String, Arc<Action>>,
        state_variables: HashMap<String, Arc<StateVariable>>,
        gena: Arc<GenaContext>,
        self_ref: Weak<Service>,
    ) -> Self {
        Self {
            udn,
            interface_addr,
            service_type,
            service_id,
            scpd_url,
            control_url,
            event_sub_url,
            actions,
            state_variables,
            gena,
            subscription: Mutex::new(None),
            self_ref,
        }
    }

    fn self_arc(&self) -> Result<Arc<Service>, ControlPointError> {
        self.self_ref
            .upgrade()
            .ok_or_else(|| ControlPointError::State("service is being torn down".into()))
    }

    /// UDN of the owning device.
    pub fn udn(&self) -> &str {
        &self.udn
    }

    /// Address of the interface the owning device was discovered on;
    /// event callbacks are served from it.
    pub fn interface_addr(&self) -> Ipv4Addr {
        self.interface_addr
    }

    pub fn service_type(&self) -> &str {
        &self.service_type
    }

    pub fn service_id(&self) -> &str {
        &self.service_id
    }

    pub fn scpd_url(&self) -> &Url {
        &self.scpd_url
    }

    pub fn control_url(&self) -> &Url {
        &self.control_url
    }

    pub fn event_sub_url(&self) -> &Url {
        &self.event_sub_url
    }

    pub fn find_action(&self, name: &str) -> Option<Arc<Action>> {
        self.actions.get(name).cloned()
    }

    pub fn actions(&self) -> impl Iterator<Item = &Arc<Action>> {
        self.actions.values()
    }

    pub fn find_state_variable(&self, name: &str) -> Option<Arc<StateVariable>> {
        self.state_variables.get(name).cloned()
    }

    pub fn state_variables(&self) -> impl Iterator<Item = &Arc<StateVariable>> {
        self.state_variables.values()
    }

    /// Snapshot of the current subscription, if any.
    pub fn subscription(&self) -> Option<Subscription> {
        self.subscription.lock().unwrap().clone()
    }

    pub fn is_subscribed(&self) -> bool {
        self.subscription.lock().unwrap().is_some()
    }

    /// Subscribes to this service's events. With `keep` set the
    /// subscription is renewed before it expires until
    /// [`unsubscribe`](Self::unsubscribe) or shutdown.
    ///
    /// Requires a started control point; the callback URL embeds the
    /// event receiver's port.
    pub fn subscribe(&self, keep: bool) -> Result<(), ControlPointError> {
        self.gena.subscribe(&self.self_arc()?, keep)
    }

    /// Renews the current subscription once.
    pub fn renew_subscription(&self) -> Result<(), ControlPointError> {
        self.gena.renew(&self.self_arc()?)
    }

    /// Cancels the current subscription.
    pub fn unsubscribe(&self) -> Result<(), ControlPointError> {
        self.gena.unsubscribe(&self.self_arc()?)
    }

    pub(crate) fn set_subscription(&self, subscription: Option<Subscription>) {
        *self.subscription.lock().unwrap() = subscription;
    }
}

impl std::fmt::Debug for Service {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Service")
            .field("udn", &self.udn)
            .field("service_type", &self.service_type)
            .field("service_id", &self.service_id)
            .field("actions", &self.actions.len())
            .field("subscribed", &self.is_subscribed())
            .finish()
    }
}

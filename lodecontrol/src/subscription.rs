//! GENA subscription management: the wire protocol and the keep-alive
//! keeper that renews subscriptions before they lapse.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU16, Ordering};
use std::sync::{Arc, Condvar, Mutex, Weak};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use lodeupnp::http::{HttpClient, HttpRequest};
use tracing::{debug, info, warn};

use crate::errors::ControlPointError;
use crate::service::{Service, Subscription};

/// Lease length requested from devices.
const SUBSCRIPTION_TIMEOUT_SECS: u64 = 300;

/// Renewals run this long before the lease lapses.
const MARGIN: Duration = Duration::from_secs(10);

/// Lower bound on keeper sleeps, against clock skew busy loops.
const MIN_INTERVAL: Duration = Duration::from_secs(1);

/// Shared state the GENA side of the control point hands to every
/// service: the one-shot HTTP client, the event receiver's port for
/// callback URLs, the SID index used to route incoming notifications,
/// and the keeper.
pub(crate) struct GenaContext {
    client: Arc<HttpClient>,
    event_port: AtomicU16,
    registry: Mutex<HashMap<String, Weak<Service>>>,
    keeper: SubscribeKeeper,
}

impl GenaContext {
    pub fn new(client: Arc<HttpClient>) -> Arc<Self> {
        Arc::new(Self {
            client,
            event_port: AtomicU16::new(0),
            registry: Mutex::new(HashMap::new()),
            keeper: SubscribeKeeper::new(),
        })
    }

    /// Called when the event receiver is (un)bound; 0 means eventing
    /// is unavailable.
    pub fn set_event_port(&self, port: u16) {
        self.event_port.store(port, Ordering::SeqCst);
    }

    pub fn start_keeper(&self) {
        self.keeper.start();
    }

    pub fn stop_keeper(&self) {
        self.keeper.shutdown();
    }

    /// Looks up the service a NOTIFY's SID belongs to.
    pub fn find_by_sid(&self, sid: &str) -> Option<Arc<Service>> {
        let mut registry = self.registry.lock().unwrap();
        match registry.get(sid) {
            Some(weak) => match weak.upgrade() {
                Some(service) => Some(service),
                None => {
                    registry.remove(sid);
                    None
                }
            },
            None => None,
        }
    }

    fn callback_header(&self, service: &Service) -> Result<String, ControlPointError> {
        let port = self.event_port.load(Ordering::SeqCst);
        if port == 0 {
            return Err(ControlPointError::State(
                "event receiver is not running; start the control point first".into(),
            ));
        }
        Ok(format!(
            "<http://{}:{}/{}/{}>",
            service.interface_addr(),
            port,
            service.udn(),
            service.service_id()
        ))
    }

    /// SUBSCRIBE. On success the lease is recorded on the service and
    /// the SID becomes routable; with `keep` the keeper takes over
    /// renewals.
    pub fn subscribe(&self, service: &Arc<Service>, keep: bool) -> Result<(), ControlPointError> {
        let callback = self.callback_header(service)?;
        let mut request = HttpRequest::new("SUBSCRIBE", service.event_sub_url().path());
        request.set_header("NT", "upnp:event");
        request.set_header("CALLBACK", &callback);
        request.set_header("TIMEOUT", &format!("Second-{}", SUBSCRIPTION_TIMEOUT_SECS));
        request.set_body(Vec::new(), true);

        let response = self.client.post(&request, service.event_sub_url())?;
        if response.status() != 200 {
            return Err(ControlPointError::protocol(format!(
                "SUBSCRIBE returned HTTP {} {}",
                response.status(),
                response.reason()
            )));
        }
        let sid = response
            .header("SID")
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .ok_or_else(|| ControlPointError::protocol("SUBSCRIBE response without SID"))?
            .to_string();
        let timeout = parse_timeout(response.header("TIMEOUT"))?;

        service.set_subscription(Some(Subscription {
            sid: sid.clone(),
            started: Instant::now(),
            timeout,
        }));
        self.registry
            .lock()
            .unwrap()
            .insert(sid.clone(), Arc::downgrade(service));

        info!(
            service = service.service_id(),
            sid = sid.as_str(),
            timeout = ?timeout,
            "subscribed"
        );

        // An infinite lease never needs renewing.
        if keep && timeout.is_some() {
            self.keeper.add(service);
        }
        Ok(())
    }

    /// Renews an existing subscription. The device must answer with
    /// the same SID; anything else fails the renewal.
    pub fn renew(&self, service: &Arc<Service>) -> Result<(), ControlPointError> {
        let current = service
            .subscription()
            .ok_or_else(|| ControlPointError::protocol("renew without a subscription"))?;

        let mut request = HttpRequest::new("SUBSCRIBE", service.event_sub_url().path());
        request.set_header("SID", &current.sid);
        request.set_header("TIMEOUT", &format!("Second-{}", SUBSCRIPTION_TIMEOUT_SECS));
        request.set_body(Vec::new(), true);

        let response = self.client.post(&request, service.event_sub_url())?;
        if response.status() != 200 {
            return Err(ControlPointError::protocol(format!(
                "SUBSCRIBE renewal returned HTTP {} {}",
                response.status(),
                response.reason()
            )));
        }
        let sid = response.header("SID").map(str::trim).unwrap_or("");
        if sid != current.sid {
            return Err(ControlPointError::protocol(format!(
                "renewal answered with SID {:?}, expected {:?}",
                sid, current.sid
            )));
        }
        let timeout = parse_timeout(response.header("TIMEOUT"))?;
        service.set_subscription(Some(Subscription {
            sid: current.sid,
            started: Instant::now(),
            timeout,
        }));
        debug!(service = service.service_id(), "subscription renewed");
        Ok(())
    }

    /// UNSUBSCRIBE. Local state is cleared unconditionally on a 200.
    pub fn unsubscribe(&self, service: &Arc<Service>) -> Result<(), ControlPointError> {
        let current = service
            .subscription()
            .ok_or_else(|| ControlPointError::protocol("unsubscribe without a subscription"))?;

        let mut request = HttpRequest::new("UNSUBSCRIBE", service.event_sub_url().path());
        request.set_header("SID", &current.sid);
        request.set_body(Vec::new(), true);

        let response = self.client.post(&request, service.event_sub_url())?;
        if response.status() != 200 {
            return Err(ControlPointError::protocol(format!(
                "UNSUBSCRIBE returned HTTP {} {}",
                response.status(),
                response.reason()
            )));
        }
        self.forget(service, &current.sid);
        debug!(service = service.service_id(), "unsubscribed");
        Ok(())
    }

    /// Drops a subscription without talking to the device. Used when a
    /// device expires or says byebye.
    pub fn expire(&self, service: &Arc<Service>) {
        if let Some(current) = service.subscription() {
            self.forget(service, &current.sid);
        }
    }

    /// Best-effort unsubscribe of everything still registered, for
    /// shutdown.
    pub fn unsubscribe_all(&self) {
        let services: Vec<Arc<Service>> = {
            let registry = self.registry.lock().unwrap();
            registry.values().filter_map(Weak::upgrade).collect()
        };
        for service in services {
            if let Err(e) = self.unsubscribe(&service) {
                debug!(
                    service = service.service_id(),
                    error = %e,
                    "unsubscribe on shutdown failed"
                );
                self.expire(&service);
            }
        }
        self.keeper.clear();
    }

    fn forget(&self, service: &Arc<Service>, sid: &str) {
        service.set_subscription(None);
        self.registry.lock().unwrap().remove(sid);
        self.keeper.remove(service);
    }
}

/// Parses a GENA `TIMEOUT` response header.
///
/// `Second-N` (case-insensitive) yields a duration, `infinite` yields
/// `None`; anything else, including zero, fails.
fn parse_timeout(raw: Option<&str>) -> Result<Option<Duration>, ControlPointError> {
    let value = raw
        .ok_or_else(|| ControlPointError::protocol("subscription response without TIMEOUT"))?;
    let lower = value.trim().to_ascii_lowercase();
    if lower.contains("infinite") {
        return Ok(None);
    }
    if let Some(idx) = lower.find("second-") {
        let seconds: u64 = lower[idx + "second-".len()..]
            .chars()
            .take_while(|c| c.is_ascii_digit())
            .collect::<String>()
            .parse()
            .map_err(|_| {
                ControlPointError::protocol(format!("unparsable TIMEOUT {:?}", value))
            })?;
        if seconds > 0 {
            return Ok(Some(Duration::from_secs(seconds)));
        }
    }
    Err(ControlPointError::protocol(format!(
        "unparsable TIMEOUT {:?}",
        value
    )))
}

/// When a subscription must be renewed:
/// `started + max(timeout − margin, timeout × 9/10)`, so short leases
/// keep a proportional head start instead of renewing almost
/// immediately. Infinite leases are never renewed.
fn renew_instant(subscription: &Subscription) -> Option<Instant> {
    let timeout = subscription.timeout?;
    let lead = std::cmp::max(timeout.saturating_sub(MARGIN), timeout * 9 / 10);
    Some(subscription.started + lead)
}

/// The keep-alive worker.
///
/// Keeps a list of kept services ordered by renewal time, sleeps until
/// the head is due, renews everything due, and goes back to sleep.
/// Adding, removing and shutdown wake it. A failed renewal is logged
/// and the service dropped from the list; the device-expiry sweep
/// reclaims the rest.
pub(crate) struct SubscribeKeeper {
    shared: Arc<KeeperShared>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

struct KeeperShared {
    state: Mutex<KeeperState>,
    wakeup: Condvar,
}

struct KeeperState {
    services: Vec<Weak<Service>>,
    shutdown: bool,
}

impl SubscribeKeeper {
    pub fn new() -> Self {
        Self {
            shared: Arc::new(KeeperShared {
                state: Mutex::new(KeeperState {
                    services: Vec::new(),
                    shutdown: false,
                }),
                wakeup: Condvar::new(),
            }),
            worker: Mutex::new(None),
        }
    }

    pub fn start(&self) {
        let mut worker = self.worker.lock().unwrap();
        if worker.is_some() {
            return;
        }
        self.shared.state.lock().unwrap().shutdown = false;
        let shared = Arc::clone(&self.shared);
        *worker = Some(
            thread::Builder::new()
                .name("subscribe-keeper".into())
                .spawn(move || run_keeper(shared))
                .expect("spawning subscribe keeper"),
        );
    }

    pub fn add(&self, service: &Arc<Service>) {
        let mut state = self.shared.state.lock().unwrap();
        let ptr = Arc::as_ptr(service);
        if !state.services.iter().any(|w| w.as_ptr() == ptr) {
            state.services.push(Arc::downgrade(service));
        }
        self.shared.wakeup.notify_all();
    }

    pub fn remove(&self, service: &Arc<Service>) {
        let mut state = self.shared.state.lock().unwrap();
        let ptr = Arc::as_ptr(service);
        state.services.retain(|w| w.as_ptr() != ptr);
        self.shared.wakeup.notify_all();
    }

    pub fn clear(&self) {
        self.shared.state.lock().unwrap().services.clear();
        self.shared.wakeup.notify_all();
    }

    pub fn shutdown(&self) {
        {
            let mut state = self.shared.state.lock().unwrap();
            state.shutdown = true;
            state.services.clear();
        }
        self.shared.wakeup.notify_all();
        if let Some(handle) = self.worker.lock().unwrap().take() {
            let _ = handle.join();
        }
    }
}

fn run_keeper(shared: Arc<KeeperShared>) {
    let mut state = shared.state.lock().unwrap();
    loop {
        if state.shutdown {
            return;
        }
        // Entries whose service is gone or no longer subscribed have
        // nothing left to renew.
        state
            .services
            .retain(|w| w.upgrade().is_some_and(|s| s.is_subscribed()));
        if state.services.is_empty() {
            state = shared.wakeup.wait(state).unwrap();
            continue;
        }

        let now = Instant::now();
        let mut due: Vec<Arc<Service>> = Vec::new();
        let mut next: Option<Instant> = None;
        for weak in &state.services {
            let Some(service) = weak.upgrade() else { continue };
            let Some(subscription) = service.subscription() else { continue };
            match renew_instant(&subscription) {
                Some(at) if at <= now => due.push(service),
                Some(at) => next = Some(next.map_or(at, |n| n.min(at))),
                None => {}
            }
        }

        if !due.is_empty() {
            drop(state);
            let mut failed = Vec::new();
            for service in due {
                if let Err(e) = service.renew_subscription() {
                    warn!(
                        service = service.service_id(),
                        error = %e,
                        "subscription renewal failed"
                    );
                    failed.push(service);
                }
            }
            state = shared.state.lock().unwrap();
            for service in failed {
                let ptr = Arc::as_ptr(&service);
                state.services.retain(|w| w.as_ptr() != ptr);
            }
            continue;
        }

        let sleep = match next {
            Some(at) => at.saturating_duration_since(now).max(MIN_INTERVAL),
            // Only unrenewable entries left; wait for a change.
            None => {
                state = shared.wakeup.wait(state).unwrap();
                continue;
            }
        };
        let (guard, _) = shared.wakeup.wait_timeout(state, sleep).unwrap();
        state = guard;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timeout_parsing() {
        assert_eq!(
            parse_timeout(Some("Second-300")).unwrap(),
            Some(Duration::from_secs(300))
        );
        assert_eq!(
            parse_timeout(Some("second-1800")).unwrap(),
            Some(Duration::from_secs(1800))
        );
        assert_eq!(parse_timeout(Some("infinite")).unwrap(), None);
        assert_eq!(parse_timeout(Some("Second-infinite")).unwrap(), None);
        assert!(parse_timeout(Some("Second-0")).is_err());
        assert!(parse_timeout(Some("whenever")).is_err());
        assert!(parse_timeout(None).is_err());
    }

    #[test]
    fn renewal_leads_the_lease_by_the_margin() {
        let started = Instant::now();
        let sub = Subscription {
            sid: "uuid:s1".into(),
            started,
            timeout: Some(Duration::from_secs(300)),
        };
        assert_eq!(
            renew_instant(&sub),
            Some(started + Duration::from_secs(290))
        );
    }

    #[test]
    fn short_leases_renew_at_nine_tenths() {
        let started = Instant::now();
        let sub = Subscription {
            sid: "uuid:s1".into(),
            started,
            timeout: Some(Duration::from_secs(5)),
        };
        assert_eq!(
            renew_instant(&sub),
            Some(started + Duration::from_millis(4500))
        );
    }

    #[test]
    fn infinite_leases_never_renew() {
        let sub = Subscription {
            sid: "uuid:s1".into(),
            started: Instant::now(),
            timeout: None,
        };
        assert_eq!(renew_instant(&sub), None);
    }

    #[test]
    fn renewal_window_is_within_spec_bounds() {
        // For any advertised timeout T the first renewal must fall in
        // [max(T-10s, 0.9T), T].
        for secs in [15u64, 60, 300, 1800] {
            let started = Instant::now();
            let timeout = Duration::from_secs(secs);
            let sub = Subscription {
                sid: "uuid:s1".into(),
                started,
                timeout: Some(timeout),
            };
            let at = renew_instant(&sub).unwrap();
            let lead = at - started;
            let floor = std::cmp::max(
                timeout.saturating_sub(Duration::from_secs(10)),
                timeout * 9 / 10,
            );
            assert!(lead >= floor, "timeout {}s renews too early", secs);
            assert!(lead <= timeout, "timeout {}s renews too late", secs);
        }
    }
}

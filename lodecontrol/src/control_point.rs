//! The control point orchestrator.

use std::net::Ipv4Addr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender};
use lodeupnp::http::HttpClient;
use lodeupnp::ssdp::{SsdpMessage, SsdpNotifySocket, SsdpSearchSocket};
use tracing::{debug, info, warn};

use crate::description::DeviceLoader;
use crate::device::Device;
use crate::discovery::DescriptionFetcher;
use crate::errors::ControlPointError;
use crate::event_receiver::{EventHandler, EventReceiver};
use crate::interfaces::{usable_interfaces, NetworkInterface};
use crate::registry::DeviceRegistry;
use crate::service::Service;
use crate::subscription::GenaContext;

/// Discovery callbacks.
///
/// Dispatch is synchronous on a control point worker thread. For one
/// device, `on_discover` strictly precedes `on_lost`; across devices
/// no ordering is guaranteed. Listeners must not call back into the
/// control point's lifecycle methods (`stop`, `terminate`) — doing so
/// deadlocks; lookups such as `get_device` are fine.
pub trait DiscoveryListener: Send + Sync {
    fn on_discover(&self, device: &Arc<Device>);
    fn on_lost(&self, device: &Arc<Device>);
}

/// State variable change callbacks, delivered once per property in
/// arrival order of the underlying NOTIFY requests. `seq` is the
/// device's event sequence number, passed through without reordering
/// or gap detection.
pub trait NotifyEventListener: Send + Sync {
    fn on_notify_event(&self, service: &Arc<Service>, seq: u64, variable: &str, value: &str);
}

#[derive(Debug, Clone)]
pub struct ControlPointConfig {
    /// Interface to discover on; `None` means every usable IPv4
    /// interface.
    pub interface: Option<NetworkInterface>,
    /// HTTP connection establishment timeout.
    pub connect_timeout: Duration,
    /// HTTP read timeout.
    pub read_timeout: Duration,
    /// Description fetch worker pool size.
    pub fetch_workers: usize,
    /// Capacity of the receiver → orchestrator message channel.
    pub channel_capacity: usize,
}

impl Default for ControlPointConfig {
    fn default() -> Self {
        Self {
            interface: None,
            connect_timeout: Duration::from_secs(30),
            read_timeout: Duration::from_secs(30),
            fetch_workers: 2,
            channel_capacity: 64,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Lifecycle {
    Uninitialized,
    Initialized,
    Started,
    Stopped,
    Terminated,
}

/// State shared with the worker threads.
struct Shared {
    registry: Mutex<DeviceRegistry>,
    discovery_listeners: Mutex<Vec<Arc<dyn DiscoveryListener>>>,
    notify_listeners: Mutex<Vec<Arc<dyn NotifyEventListener>>>,
    /// Serializes device-table mutation + listener dispatch so that
    /// `on_discover`/`on_lost` for one device cannot interleave.
    dispatch: Mutex<()>,
    /// Cleared on stop so that fetches still in flight cannot
    /// repopulate a table that was just emptied.
    accepting: AtomicBool,
    gena: Arc<GenaContext>,
}

impl Shared {
    fn fire_discover(&self, device: &Arc<Device>) {
        let listeners = self.discovery_listeners.lock().unwrap().clone();
        for listener in listeners {
            listener.on_discover(device);
        }
    }

    fn fire_lost(&self, device: &Arc<Device>) {
        for service in device.all_services() {
            self.gena.expire(&service);
        }
        let listeners = self.discovery_listeners.lock().unwrap().clone();
        for listener in listeners {
            listener.on_lost(device);
        }
    }
}

/// A UPnP control point.
///
/// Lifecycle: `new` → [`initialize`](Self::initialize) →
/// [`start`](Self::start) → [`stop`](Self::stop) (→ `start` again) →
/// [`terminate`](Self::terminate). Termination is one-shot; build a
/// fresh instance afterwards.
pub struct ControlPoint {
    config: ControlPointConfig,
    shared: Arc<Shared>,
    http: Arc<HttpClient>,
    soap: Arc<HttpClient>,
    state: Mutex<Lifecycle>,
    interfaces: Mutex<Vec<NetworkInterface>>,
    sockets: Mutex<Vec<(SsdpSearchSocket, SsdpNotifySocket)>>,
    event_receiver: Mutex<Option<EventReceiver>>,
    fetcher: Mutex<Option<Arc<DescriptionFetcher>>>,
    orchestrator: Mutex<Option<JoinHandle<()>>>,
}

impl ControlPoint {
    pub fn new(config: ControlPointConfig) -> Self {
        let http = Arc::new(HttpClient::with_timeouts(
            true,
            config.connect_timeout,
            config.read_timeout,
        ));
        let soap = Arc::new(HttpClient::with_timeouts(
            false,
            config.connect_timeout,
            config.read_timeout,
        ));
        let gena = GenaContext::new(Arc::clone(&soap));
        Self {
            config,
            shared: Arc::new(Shared {
                registry: Mutex::new(DeviceRegistry::new()),
                discovery_listeners: Mutex::new(Vec::new()),
                notify_listeners: Mutex::new(Vec::new()),
                dispatch: Mutex::new(()),
                accepting: AtomicBool::new(false),
                gena,
            }),
            http,
            soap,
            state: Mutex::new(Lifecycle::Uninitialized),
            interfaces: Mutex::new(Vec::new()),
            sockets: Mutex::new(Vec::new()),
            event_receiver: Mutex::new(None),
            fetcher: Mutex::new(None),
            orchestrator: Mutex::new(None),
        }
    }

    /// Enumerates interfaces and creates the per-interface sockets and
    /// the event receiver. Nothing is bound yet.
    pub fn initialize(&self) -> Result<(), ControlPointError> {
        let mut state = self.state.lock().unwrap();
        if *state != Lifecycle::Uninitialized {
            return Err(ControlPointError::State(format!(
                "initialize from {:?}",
                *state
            )));
        }
        let interfaces = match &self.config.interface {
            Some(interface) => vec![interface.clone()],
            None => usable_interfaces().map_err(|e| {
                ControlPointError::State(format!("cannot enumerate interfaces: {}", e))
            })?,
        };
        if interfaces.is_empty() {
            return Err(ControlPointError::State("no usable IPv4 interface".into()));
        }
        info!(count = interfaces.len(), "control point initialized");
        *self.interfaces.lock().unwrap() = interfaces;
        *self.event_receiver.lock().unwrap() = Some(EventReceiver::new(Ipv4Addr::UNSPECIFIED));
        *state = Lifecycle::Initialized;
        Ok(())
    }

    /// Opens sockets and starts every worker: the SSDP receivers, the
    /// event receiver, the description fetch pool, the keep-alive
    /// keeper and the orchestrator with its expiry sweep.
    pub fn start(&self) -> Result<(), ControlPointError> {
        let mut state = self.state.lock().unwrap();
        if *state != Lifecycle::Initialized && *state != Lifecycle::Stopped {
            return Err(ControlPointError::State(format!("start from {:?}", *state)));
        }

        // Event receiver first: its port goes into callback URLs.
        {
            let mut receiver_slot = self.event_receiver.lock().unwrap();
            let receiver = receiver_slot.get_or_insert_with(|| EventReceiver::new(Ipv4Addr::UNSPECIFIED));
            receiver
                .open()
                .map_err(|e| ControlPointError::Transport(e.into()))?;
            receiver
                .start(self.make_event_handler())
                .map_err(|e| ControlPointError::Transport(e.into()))?;
            self.shared.gena.set_event_port(receiver.port());
        }
        self.shared.gena.start_keeper();

        let (tx, rx) = bounded::<SsdpMessage>(self.config.channel_capacity);

        let loader = Arc::new(DeviceLoader::new(
            Arc::clone(&self.http),
            Arc::clone(&self.soap),
            Arc::clone(&self.shared.gena),
        ));
        let fetcher = Arc::new(DescriptionFetcher::new(
            self.config.fetch_workers,
            loader,
            self.make_built_handler(),
        ));
        *self.fetcher.lock().unwrap() = Some(Arc::clone(&fetcher));

        *self.orchestrator.lock().unwrap() = Some(
            thread::Builder::new()
                .name("controlpoint-orchestrator".into())
                .spawn({
                    let shared = Arc::clone(&self.shared);
                    move || run_orchestrator(rx, shared, fetcher)
                })
                .map_err(|e| ControlPointError::Transport(e.into()))?,
        );

        let mut sockets = Vec::new();
        for interface in self.interfaces.lock().unwrap().iter() {
            match open_interface_sockets(interface, &tx) {
                Ok(pair) => sockets.push(pair),
                Err(e) => {
                    warn!(
                        interface = interface.name.as_str(),
                        error = %e,
                        "skipping interface"
                    );
                }
            }
        }
        if sockets.is_empty() {
            drop(tx);
            self.stop_workers();
            return Err(ControlPointError::State(
                "no interface socket could be opened".into(),
            ));
        }
        *self.sockets.lock().unwrap() = sockets;
        // The remaining sender clones live inside the socket callbacks;
        // dropping ours lets the channel close when the sockets do.
        drop(tx);

        self.shared.accepting.store(true, Ordering::SeqCst);
        *state = Lifecycle::Started;
        info!("control point started");
        Ok(())
    }

    /// Quiesces all workers, unsubscribes everything (best effort) and
    /// clears the device table, firing `on_lost` for each entry.
    pub fn stop(&self) -> Result<(), ControlPointError> {
        let mut state = self.state.lock().unwrap();
        if *state != Lifecycle::Started {
            return Err(ControlPointError::State(format!("stop from {:?}", *state)));
        }
        self.stop_workers();
        *state = Lifecycle::Stopped;
        info!("control point stopped");
        Ok(())
    }

    /// One-shot teardown. A started control point is stopped first;
    /// once terminated the instance cannot be reused.
    pub fn terminate(&self) -> Result<(), ControlPointError> {
        let mut state = self.state.lock().unwrap();
        match *state {
            Lifecycle::Terminated => {
                return Err(ControlPointError::State("already terminated".into()))
            }
            Lifecycle::Started => self.stop_workers(),
            _ => {}
        }
        *self.event_receiver.lock().unwrap() = None;
        *state = Lifecycle::Terminated;
        info!("control point terminated");
        Ok(())
    }

    fn stop_workers(&self) {
        self.shared.accepting.store(false, Ordering::SeqCst);
        // Closing the sockets drops their callback closures and with
        // them the channel senders; the orchestrator then drains and
        // exits.
        {
            let mut sockets = self.sockets.lock().unwrap();
            for (search, notify) in sockets.iter_mut() {
                search.stop(true);
                notify.stop(true);
                search.close();
                notify.close();
            }
            sockets.clear();
        }
        if let Some(handle) = self.orchestrator.lock().unwrap().take() {
            let _ = handle.join();
        }
        if let Some(receiver) = self.event_receiver.lock().unwrap().as_mut() {
            receiver.close();
        }
        self.shared.gena.set_event_port(0);
        self.shared.gena.unsubscribe_all();
        self.shared.gena.stop_keeper();
        *self.fetcher.lock().unwrap() = None;

        let _guard = self.shared.dispatch.lock().unwrap();
        let cleared = self.shared.registry.lock().unwrap().clear();
        for device in cleared {
            self.shared.fire_lost(&device);
        }
    }

    /// Multicasts an `M-SEARCH` for `ssdp:all` on every interface.
    pub fn search(&self) -> Result<(), ControlPointError> {
        self.search_target(None)
    }

    /// Multicasts an `M-SEARCH` for the given search target.
    pub fn search_target(&self, st: Option<&str>) -> Result<(), ControlPointError> {
        if *self.state.lock().unwrap() != Lifecycle::Started {
            return Err(ControlPointError::State("search on a stopped control point".into()));
        }
        for (search, _) in self.sockets.lock().unwrap().iter() {
            search
                .search(st)
                .map_err(|e| ControlPointError::Transport(e.into()))?;
        }
        Ok(())
    }

    pub fn add_discovery_listener(&self, listener: Arc<dyn DiscoveryListener>) {
        self.shared.discovery_listeners.lock().unwrap().push(listener);
    }

    /// Removal takes effect from the next event; dispatch in flight
    /// works on a snapshot.
    pub fn remove_discovery_listener(&self, listener: &Arc<dyn DiscoveryListener>) {
        self.shared
            .discovery_listeners
            .lock()
            .unwrap()
            .retain(|l| !Arc::ptr_eq(l, listener));
    }

    pub fn add_notify_event_listener(&self, listener: Arc<dyn NotifyEventListener>) {
        self.shared.notify_listeners.lock().unwrap().push(listener);
    }

    pub fn remove_notify_event_listener(&self, listener: &Arc<dyn NotifyEventListener>) {
        self.shared
            .notify_listeners
            .lock()
            .unwrap()
            .retain(|l| !Arc::ptr_eq(l, listener));
    }

    pub fn get_device(&self, udn: &str) -> Option<Arc<Device>> {
        self.shared.registry.lock().unwrap().get(udn)
    }

    pub fn device_list(&self) -> Vec<Arc<Device>> {
        self.shared.registry.lock().unwrap().list()
    }

    /// Handler the event receiver runs for each NOTIFY: route by SID,
    /// dispatch one callback per property in document order.
    fn make_event_handler(&self) -> EventHandler {
        let shared = Arc::clone(&self.shared);
        Arc::new(move |sid, seq, properties| {
            let Some(service) = shared.gena.find_by_sid(sid) else {
                debug!(sid, "NOTIFY for unknown subscription");
                return false;
            };
            let listeners = shared.notify_listeners.lock().unwrap().clone();
            for (variable, value) in &properties {
                for listener in &listeners {
                    listener.on_notify_event(&service, seq, variable, value);
                }
            }
            true
        })
    }

    /// Handler the fetch pool runs for each successfully built device.
    fn make_built_handler(&self) -> Arc<dyn Fn(Arc<Device>) + Send + Sync> {
        let shared = Arc::clone(&self.shared);
        Arc::new(move |device| {
            let _guard = shared.dispatch.lock().unwrap();
            if !shared.accepting.load(Ordering::SeqCst) {
                return;
            }
            let replaced = shared.registry.lock().unwrap().insert(Arc::clone(&device));
            match replaced {
                None => shared.fire_discover(&device),
                Some(previous) => {
                    // A concurrent re-fetch of a known device is a
                    // refresh, not a new discovery.
                    debug!(udn = previous.udn(), "device description re-fetched");
                }
            }
        })
    }
}

impl Drop for ControlPoint {
    fn drop(&mut self) {
        if *self.state.lock().unwrap() == Lifecycle::Started {
            self.stop_workers();
        }
    }
}

fn open_interface_sockets(
    interface: &NetworkInterface,
    tx: &Sender<SsdpMessage>,
) -> std::io::Result<(SsdpSearchSocket, SsdpNotifySocket)> {
    let mut search = SsdpSearchSocket::new(interface.addr);
    search.open()?;
    search.start(make_socket_handler(tx.clone()))?;

    let mut notify = SsdpNotifySocket::new(interface.addr, interface.prefix_len);
    notify.open()?;
    notify.start(make_socket_handler(tx.clone()))?;

    Ok((search, notify))
}

fn make_socket_handler(tx: Sender<SsdpMessage>) -> Box<dyn Fn(SsdpMessage) + Send> {
    Box::new(move |message| {
        // Receivers never touch shared state; the orchestrator owns
        // the table.
        if tx.try_send(message).is_err() {
            debug!("orchestrator queue full, dropping SSDP message");
        }
    })
}

fn run_orchestrator(
    rx: Receiver<SsdpMessage>,
    shared: Arc<Shared>,
    fetcher: Arc<DescriptionFetcher>,
) {
    let sweep_interval = Duration::from_secs(1);
    let mut last_sweep = Instant::now();
    loop {
        match rx.recv_timeout(sweep_interval) {
            Ok(message) => handle_ssdp_message(&shared, &fetcher, message),
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => return,
        }
        if last_sweep.elapsed() >= sweep_interval {
            sweep_expired(&shared);
            last_sweep = Instant::now();
        }
    }
}

fn handle_ssdp_message(shared: &Shared, fetcher: &DescriptionFetcher, message: SsdpMessage) {
    let uuid = message.uuid().to_string();
    if uuid.is_empty() {
        return;
    }
    if message.is_byebye() {
        let _guard = shared.dispatch.lock().unwrap();
        let removed = shared.registry.lock().unwrap().remove(&uuid);
        if let Some(device) = removed {
            info!(udn = device.udn(), "device said byebye");
            shared.fire_lost(&device);
        }
        return;
    }
    let known = shared.registry.lock().unwrap().get(&uuid);
    match known {
        Some(device) => device.refresh(message),
        None => fetcher.enqueue(message),
    }
}

fn sweep_expired(shared: &Shared) {
    let _guard = shared.dispatch.lock().unwrap();
    let expired = shared.registry.lock().unwrap().sweep(Instant::now());
    for device in expired {
        info!(udn = device.udn(), "device advertisement expired");
        shared.fire_lost(&device);
    }
}

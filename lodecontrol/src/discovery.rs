//! Description fetch pool.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::thread;

use crossbeam_channel::{bounded, Sender, TrySendError};
use lodeupnp::ssdp::SsdpMessage;
use tracing::{debug, warn};

use crate::description::DeviceLoader;
use crate::device::Device;

/// Pending fetch tasks are bounded; a burst of advertisements beyond
/// this is dropped and retried on the next announcement.
const QUEUE_CAPACITY: usize = 16;

/// A small worker pool turning advertisement LOCATIONs into built
/// devices.
///
/// Fetches are de-duplicated by LOCATION: while one fetch for a URL is
/// queued or running, further advertisements pointing at it are
/// ignored. Dropping the fetcher closes the channel and lets the
/// workers drain and exit.
pub(crate) struct DescriptionFetcher {
    sender: Sender<SsdpMessage>,
    in_flight: Arc<Mutex<HashSet<String>>>,
}

impl DescriptionFetcher {
    pub fn new(
        workers: usize,
        loader: Arc<DeviceLoader>,
        on_built: Arc<dyn Fn(Arc<Device>) + Send + Sync>,
    ) -> Self {
        let (sender, receiver) = bounded::<SsdpMessage>(QUEUE_CAPACITY);
        let in_flight: Arc<Mutex<HashSet<String>>> = Arc::new(Mutex::new(HashSet::new()));

        for index in 0..workers.max(1) {
            let receiver = receiver.clone();
            let loader = Arc::clone(&loader);
            let on_built = Arc::clone(&on_built);
            let in_flight = Arc::clone(&in_flight);
            thread::Builder::new()
                .name(format!("description-fetch-{}", index))
                .spawn(move || {
                    while let Ok(message) = receiver.recv() {
                        let location = message.location().unwrap_or("").to_string();
                        let result = loader.load(&message);
                        in_flight.lock().unwrap().remove(&location);
                        match result {
                            Ok(device) => on_built(device),
                            Err(e) => {
                                // Passive path: a device with a broken
                                // description simply stays undiscovered.
                                debug!(location = location.as_str(), error = %e, "description fetch failed");
                            }
                        }
                    }
                })
                .expect("spawning description fetch worker");
        }

        Self { sender, in_flight }
    }

    /// Queues a fetch for the advertisement's LOCATION unless one is
    /// already pending.
    pub fn enqueue(&self, message: SsdpMessage) {
        let Some(location) = message.location().map(str::to_string) else {
            return;
        };
        if !self.in_flight.lock().unwrap().insert(location.clone()) {
            return;
        }
        match self.sender.try_send(message) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => {
                self.in_flight.lock().unwrap().remove(&location);
                warn!(location = location.as_str(), "fetch queue full, dropping advertisement");
            }
            Err(TrySendError::Disconnected(_)) => {}
        }
    }
}

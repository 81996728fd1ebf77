//! The device table.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use tracing::debug;

use crate::device::Device;

/// UDN-keyed table of discovered devices.
///
/// Mutated only by the orchestrator under its lock. Receivers never
/// touch it directly; they hand messages over a channel instead.
#[derive(Default)]
pub(crate) struct DeviceRegistry {
    devices: HashMap<String, Arc<Device>>,
}

impl DeviceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a freshly built device, returning the entry it
    /// replaced, if any.
    pub fn insert(&mut self, device: Arc<Device>) -> Option<Arc<Device>> {
        debug!(udn = device.udn(), name = device.friendly_name(), "device registered");
        self.devices.insert(device.udn().to_string(), device)
    }

    pub fn get(&self, udn: &str) -> Option<Arc<Device>> {
        self.devices.get(udn).cloned()
    }

    pub fn remove(&mut self, udn: &str) -> Option<Arc<Device>> {
        let removed = self.devices.remove(udn);
        if let Some(device) = &removed {
            debug!(udn = device.udn(), "device removed");
        }
        removed
    }

    pub fn list(&self) -> Vec<Arc<Device>> {
        self.devices.values().cloned().collect()
    }

    pub fn clear(&mut self) -> Vec<Arc<Device>> {
        self.devices.drain().map(|(_, d)| d).collect()
    }

    /// Removes and returns every device whose advertisement lease has
    /// lapsed.
    pub fn sweep(&mut self, now: Instant) -> Vec<Arc<Device>> {
        let expired: Vec<String> = self
            .devices
            .iter()
            .filter(|(_, d)| d.is_expired(now))
            .map(|(udn, _)| udn.clone())
            .collect();
        expired
            .iter()
            .filter_map(|udn| self.remove(udn))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::test_support::minimal_device;
    use std::time::Duration;

    #[test]
    fn insert_is_keyed_by_udn() {
        let mut registry = DeviceRegistry::new();
        let first = minimal_device("uuid:aaaa", 1800);
        let second = minimal_device("uuid:aaaa", 1800);
        assert!(registry.insert(first).is_none());
        assert!(registry.insert(second).is_some());
        assert_eq!(registry.list().len(), 1);
        assert!(registry.get("uuid:aaaa").is_some());
        assert!(registry.get("uuid:bbbb").is_none());
    }

    #[test]
    fn sweep_removes_only_expired_devices() {
        let mut registry = DeviceRegistry::new();
        registry.insert(minimal_device("uuid:stale", 10));
        registry.insert(minimal_device("uuid:fresh", 1800));

        let future = Instant::now() + Duration::from_secs(60);
        let removed = registry.sweep(future);
        assert_eq!(removed.len(), 1);
        assert_eq!(removed[0].udn(), "uuid:stale");
        assert_eq!(registry.list().len(), 1);
        assert!(registry.get("uuid:fresh").is_some());
    }

    #[test]
    fn sweep_before_expiry_removes_nothing() {
        let mut registry = DeviceRegistry::new();
        registry.insert(minimal_device("uuid:aaaa", 1800));
        assert!(registry.sweep(Instant::now()).is_empty());
        assert_eq!(registry.list().len(), 1);
    }
}

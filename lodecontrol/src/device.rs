//! Devices and their presence bookkeeping.

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use lodeupnp::ssdp::SsdpMessage;
use url::Url;

use crate::service::Service;

/// One `<icon>` entry of a device description.
#[derive(Debug, Clone)]
pub struct Icon {
    pub mime_type: String,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub depth: Option<u32>,
    pub url: Url,
}

/// Presence state refreshed by SSDP traffic.
#[derive(Debug)]
struct Presence {
    message: SsdpMessage,
    expires_at: Instant,
}

/// A discovered UPnP device.
///
/// The entity graph (services, actions, state variables, embedded
/// devices) is immutable once built from the description documents.
/// Only the presence state changes afterwards, refreshed by every
/// matching SSDP advertisement.
pub struct Device {
    udn: String,
    device_type: String,
    friendly_name: String,
    manufacturer: String,
    manufacturer_url: Option<String>,
    model_name: String,
    model_number: Option<String>,
    model_description: Option<String>,
    model_url: Option<String>,
    serial_number: Option<String>,
    upc: Option<String>,
    presentation_url: Option<String>,
    location: Url,
    url_base: Option<Url>,
    icons: Vec<Icon>,
    services: Vec<Arc<Service>>,
    embedded: Vec<Arc<Device>>,
    presence: Mutex<Presence>,
}

impl Device {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        fields: DeviceFields,
        location: Url,
        url_base: Option<Url>,
        icons: Vec<Icon>,
        services: Vec<Arc<Service>>,
        embedded: Vec<Arc<Device>>,
        message: SsdpMessage,
    ) -> Self {
        let expires_at = Instant::now() + Duration::from_secs(u64::from(message.max_age()));
        Self {
            udn: fields.udn,
            device_type: fields.device_type,
            friendly_name: fields.friendly_name,
            manufacturer: fields.manufacturer,
            manufacturer_url: fields.manufacturer_url,
            model_name: fields.model_name,
            model_number: fields.model_number,
            model_description: fields.model_description,
            model_url: fields.model_url,
            serial_number: fields.serial_number,
            upc: fields.upc,
            presentation_url: fields.presentation_url,
            location,
            url_base,
            icons,
            services,
            embedded,
            presence: Mutex::new(Presence {
                message,
                expires_at,
            }),
        }
    }

    /// Unique Device Name, `uuid:...`.
    pub fn udn(&self) -> &str {
        &self.udn
    }

    pub fn device_type(&self) -> &str {
        &self.device_type
    }

    pub fn friendly_name(&self) -> &str {
        &self.friendly_name
    }

    pub fn manufacturer(&self) -> &str {
        &self.manufacturer
    }

    pub fn manufacturer_url(&self) -> Option<&str> {
        self.manufacturer_url.as_deref()
    }

    pub fn model_name(&self) -> &str {
        &self.model_name
    }

    pub fn model_number(&self) -> Option<&str> {
        self.model_number.as_deref()
    }

    pub fn model_description(&self) -> Option<&str> {
        self.model_description.as_deref()
    }

    pub fn model_url(&self) -> Option<&str> {
        self.model_url.as_deref()
    }

    pub fn serial_number(&self) -> Option<&str> {
        self.serial_number.as_deref()
    }

    pub fn upc(&self) -> Option<&str> {
        self.upc.as_deref()
    }

    pub fn presentation_url(&self) -> Option<&str> {
        self.presentation_url.as_deref()
    }

    /// The description URL this device was fetched from.
    pub fn location(&self) -> &Url {
        &self.location
    }

    /// `URLBase` of the description document, when declared.
    pub fn url_base(&self) -> Option<&Url> {
        self.url_base.as_ref()
    }

    pub fn icons(&self) -> &[Icon] {
        &self.icons
    }

    pub fn services(&self) -> &[Arc<Service>] {
        &self.services
    }

    pub fn embedded_devices(&self) -> &[Arc<Device>] {
        &self.embedded
    }

    /// SERVER header of the advertisement that last refreshed this
    /// device.
    pub fn server(&self) -> Option<String> {
        self.presence
            .lock()
            .unwrap()
            .message
            .server()
            .map(str::to_string)
    }

    /// The SSDP message that most recently refreshed this device.
    pub fn ssdp_message(&self) -> SsdpMessage {
        self.presence.lock().unwrap().message.clone()
    }

    pub fn expires_at(&self) -> Instant {
        self.presence.lock().unwrap().expires_at
    }

    pub fn is_expired(&self, now: Instant) -> bool {
        self.expires_at() <= now
    }

    /// Refreshes presence from a new advertisement. The expiry
    /// timestamp never moves backwards.
    pub(crate) fn refresh(&self, message: SsdpMessage) {
        let expires_at = Instant::now() + Duration::from_secs(u64::from(message.max_age()));
        let mut presence = self.presence.lock().unwrap();
        presence.message = message;
        if expires_at > presence.expires_at {
            presence.expires_at = expires_at;
        }
    }

    /// Finds a service by serviceId, searching embedded devices depth
    /// first after this device's own list.
    pub fn find_service(&self, service_id: &str) -> Option<Arc<Service>> {
        self.services
            .iter()
            .find(|s| s.service_id() == service_id)
            .cloned()
            .or_else(|| {
                self.embedded
                    .iter()
                    .find_map(|d| d.find_service(service_id))
            })
    }

    /// Finds a service by serviceType, same search order as
    /// [`find_service`](Self::find_service).
    pub fn find_service_by_type(&self, service_type: &str) -> Option<Arc<Service>> {
        self.services
            .iter()
            .find(|s| s.service_type() == service_type)
            .cloned()
            .or_else(|| {
                self.embedded
                    .iter()
                    .find_map(|d| d.find_service_by_type(service_type))
            })
    }

    /// Every service of this device and its embedded devices.
    pub fn all_services(&self) -> Vec<Arc<Service>> {
        let mut services: Vec<Arc<Service>> = self.services.to_vec();
        for embedded in &self.embedded {
            services.extend(embedded.all_services());
        }
        services
    }
}

impl std::fmt::Debug for Device {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Device")
            .field("udn", &self.udn)
            .field("friendly_name", &self.friendly_name)
            .field("device_type", &self.device_type)
            .field("services", &self.services.len())
            .field("embedded", &self.embedded.len())
            .finish()
    }
}

/// Plain description fields of a device, separated out so the builder
/// call does not take a dozen string arguments.
#[derive(Debug, Default)]
pub(crate) struct DeviceFields {
    pub udn: String,
    pub device_type: String,
    pub friendly_name: String,
    pub manufacturer: String,
    pub manufacturer_url: Option<String>,
    pub model_name: String,
    pub model_number: Option<String>,
    pub model_description: Option<String>,
    pub model_url: Option<String>,
    pub serial_number: Option<String>,
    pub upc: Option<String>,
    pub presentation_url: Option<String>,
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use std::net::{Ipv4Addr, SocketAddr};

    /// Builds a service-less device for table and sweep tests.
    pub(crate) fn minimal_device(udn: &str, max_age: u32) -> Arc<Device> {
        let datagram = format!(
            "NOTIFY * HTTP/1.1\r\n\
             HOST: 239.255.255.250:1900\r\n\
             CACHE-CONTROL: max-age={}\r\n\
             LOCATION: http://192.0.2.10:2869/desc.xml\r\n\
             NT: upnp:rootdevice\r\n\
             NTS: ssdp:alive\r\n\
             USN: {}::upnp:rootdevice\r\n\
             \r\n",
            max_age, udn
        );
        let peer: SocketAddr = "192.0.2.10:1900".parse().unwrap();
        let message =
            SsdpMessage::parse(Ipv4Addr::new(192, 0, 2, 3), peer, datagram.as_bytes()).unwrap();
        let fields = DeviceFields {
            udn: udn.to_string(),
            device_type: "urn:schemas-upnp-org:device:Basic:1".to_string(),
            friendly_name: "Test Device".to_string(),
            ..Default::default()
        };
        Arc::new(Device::new(
            fields,
            Url::parse("http://192.0.2.10:2869/desc.xml").unwrap(),
            None,
            Vec::new(),
            Vec::new(),
            Vec::new(),
            message,
        ))
    }
}

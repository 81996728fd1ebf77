//! Subscribes to the first evented service of every discovered device
//! and prints the notifications.

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use lodecontrol::{
    ControlPoint, ControlPointConfig, Device, DiscoveryListener, NotifyEventListener, Service,
};

struct Subscriber;

impl DiscoveryListener for Subscriber {
    fn on_discover(&self, device: &Arc<Device>) {
        println!("+ {}", device.friendly_name());
        for service in device.all_services() {
            match service.subscribe(true) {
                Ok(()) => println!("  subscribed to {}", service.service_id()),
                Err(e) => println!("  cannot subscribe to {}: {}", service.service_id(), e),
            }
        }
    }

    fn on_lost(&self, device: &Arc<Device>) {
        println!("- {}", device.friendly_name());
    }
}

struct EventPrinter;

impl NotifyEventListener for EventPrinter {
    fn on_notify_event(&self, service: &Arc<Service>, seq: u64, variable: &str, value: &str) {
        println!(
            "[{}] #{} {} = {}",
            service.service_id(),
            seq,
            variable,
            value
        );
    }
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    let cp = ControlPoint::new(ControlPointConfig::default());
    cp.add_discovery_listener(Arc::new(Subscriber));
    cp.add_notify_event_listener(Arc::new(EventPrinter));
    cp.initialize()?;
    cp.start()?;
    cp.search()?;

    thread::sleep(Duration::from_secs(600));
    cp.stop()?;
    cp.terminate()?;
    Ok(())
}

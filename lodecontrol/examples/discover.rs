use std::sync::Arc;
use std::thread;
use std::time::Duration;

use lodecontrol::{ControlPoint, ControlPointConfig, Device, DiscoveryListener};

struct PrintListener;

impl DiscoveryListener for PrintListener {
    fn on_discover(&self, device: &Arc<Device>) {
        println!(
            "+ {} [{}] {} ({})",
            device.friendly_name(),
            device.device_type(),
            device.udn(),
            device.location()
        );
        for service in device.services() {
            println!("    service {}", service.service_type());
        }
    }

    fn on_lost(&self, device: &Arc<Device>) {
        println!("- {} ({})", device.friendly_name(), device.udn());
    }
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    let cp = ControlPoint::new(ControlPointConfig::default());
    cp.add_discovery_listener(Arc::new(PrintListener));
    cp.initialize()?;
    cp.start()?;
    cp.search()?;

    loop {
        thread::sleep(Duration::from_secs(10));
        println!("===== {} device(s) known =====", cp.device_list().len());
        cp.search()?;
    }
}

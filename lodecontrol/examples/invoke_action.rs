//! Browses the root container of the first ContentDirectory found.

use std::collections::HashMap;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use lodecontrol::{ControlPoint, ControlPointConfig};

const CONTENT_DIRECTORY: &str = "urn:schemas-upnp-org:service:ContentDirectory:1";

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    let cp = ControlPoint::new(ControlPointConfig::default());
    cp.initialize()?;
    cp.start()?;
    cp.search_target(Some("urn:schemas-upnp-org:device:MediaServer:1"))?;

    println!("waiting for media servers...");
    thread::sleep(Duration::from_secs(5));

    for device in cp.device_list() {
        let Some(service) = device.find_service_by_type(CONTENT_DIRECTORY) else {
            continue;
        };
        let Some(browse) = service.find_action("Browse") else {
            continue;
        };
        println!("browsing {} ...", device.friendly_name());

        let mut args = HashMap::new();
        args.insert("ObjectID".to_string(), "0".to_string());
        args.insert("BrowseFlag".to_string(), "BrowseDirectChildren".to_string());
        args.insert("Filter".to_string(), "*".to_string());
        args.insert("StartingIndex".to_string(), "0".to_string());
        args.insert("RequestedCount".to_string(), "0".to_string());
        args.insert("SortCriteria".to_string(), String::new());

        match browse.invoke(&args) {
            Ok(result) => {
                println!(
                    "  {} item(s), DIDL-Lite payload {} byte(s)",
                    result.get("NumberReturned").map(String::as_str).unwrap_or("?"),
                    result.get("Result").map(String::len).unwrap_or(0)
                );
            }
            Err(e) => println!("  Browse failed: {}", e),
        }
    }

    cp.stop()?;
    cp.terminate()?;
    Ok(())
}

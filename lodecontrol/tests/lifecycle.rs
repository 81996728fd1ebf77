//! Lifecycle state machine checks that need no network.

use std::net::Ipv4Addr;

use lodecontrol::{ControlPoint, ControlPointConfig, ControlPointError, NetworkInterface};

fn loopback_config() -> ControlPointConfig {
    ControlPointConfig {
        interface: Some(NetworkInterface {
            name: "lo".to_string(),
            addr: Ipv4Addr::LOCALHOST,
            prefix_len: 8,
        }),
        ..Default::default()
    }
}

#[test]
fn start_requires_initialize() {
    let cp = ControlPoint::new(loopback_config());
    assert!(matches!(cp.start(), Err(ControlPointError::State(_))));
}

#[test]
fn stop_requires_start() {
    let cp = ControlPoint::new(loopback_config());
    cp.initialize().unwrap();
    assert!(matches!(cp.stop(), Err(ControlPointError::State(_))));
}

#[test]
fn search_requires_start() {
    let cp = ControlPoint::new(loopback_config());
    cp.initialize().unwrap();
    assert!(matches!(cp.search(), Err(ControlPointError::State(_))));
}

#[test]
fn initialize_is_not_repeatable() {
    let cp = ControlPoint::new(loopback_config());
    cp.initialize().unwrap();
    assert!(matches!(cp.initialize(), Err(ControlPointError::State(_))));
}

#[test]
fn terminate_is_one_shot() {
    let cp = ControlPoint::new(loopback_config());
    cp.initialize().unwrap();
    cp.terminate().unwrap();
    assert!(matches!(cp.terminate(), Err(ControlPointError::State(_))));
    assert!(matches!(cp.initialize(), Err(ControlPointError::State(_))));
    assert!(matches!(cp.start(), Err(ControlPointError::State(_))));
}

#[test]
fn device_table_starts_empty() {
    let cp = ControlPoint::new(loopback_config());
    cp.initialize().unwrap();
    assert!(cp.device_list().is_empty());
    assert!(cp.get_device("uuid:nobody").is_none());
}

use std::{
    collections::HashMap,
    sync::Mutex,
};

use trackbee_engine::DeviceIdResolver;
use trackbee_types::DeviceId;

/// Resolver over the configured device table.
///
/// With `accept_unknown`, identifiers the table doesn't know are
/// auto-registered with sequential ids above the configured range —
/// useful for open test deployments; production configs enumerate their
/// fleet.
#[derive(Debug)]
pub struct ConfigResolver {
    devices: HashMap<String, DeviceId>,
    accept_unknown: bool,
    auto_registered: Mutex<HashMap<String, DeviceId>>,
    next_auto_id: Mutex<u64>,
}

impl ConfigResolver {
    pub fn new(devices: HashMap<String, u64>, accept_unknown: bool) -> Self {
        let next_auto_id = devices.values().copied().max().unwrap_or(0) + 1;
        Self {
            devices: devices
                .into_iter()
                .map(|(unique_id, id)| (unique_id, DeviceId(id)))
                .collect(),
            accept_unknown,
            auto_registered: Mutex::new(HashMap::new()),
            next_auto_id: Mutex::new(next_auto_id),
        }
    }
}

impl DeviceIdResolver for ConfigResolver {
    fn resolve(&self, protocol: &str, unique_id: &str) -> Option<DeviceId> {
        if let Some(device_id) = self.devices.get(unique_id) {
            return Some(*device_id);
        }

        if !self.accept_unknown {
            return None;
        }

        let mut auto_registered = self.auto_registered.lock().unwrap();
        if let Some(device_id) = auto_registered.get(unique_id) {
            return Some(*device_id);
        }

        let mut next = self.next_auto_id.lock().unwrap();
        let device_id = DeviceId(*next);
        *next += 1;
        auto_registered.insert(unique_id.to_owned(), device_id);
        tracing::info!(protocol, unique_id, %device_id, "auto-registered device");
        Some(device_id)
    }
}

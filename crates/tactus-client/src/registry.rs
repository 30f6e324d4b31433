//! Device registry and the latest-sensor-reading slot.
//!
//! Only the inbound dispatcher writes here. Everything public hands out
//! copies so a caller never holds a lock or a reference into the registry.

use std::sync::{PoisonError, RwLock};

use tactus_types::{CommandDescriptor, Device, DeviceIndex, SensorSnapshot, TactusError};
use tracing::{debug, info};

/// Ordered set of known devices, unique by id, in arrival order.
#[derive(Debug, Default)]
pub struct DeviceRegistry {
    devices: RwLock<Vec<Device>>,
}

impl DeviceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of every known device.
    pub fn snapshot(&self) -> Vec<Device> {
        self.read(|devices| devices.to_vec())
    }

    /// Position of device `id` in the registry's ordering.
    pub fn find_by_id(&self, id: DeviceIndex) -> Option<usize> {
        self.read(|devices| devices.iter().position(|d| d.id == id))
    }

    pub fn get(&self, id: DeviceIndex) -> Option<Device> {
        self.read(|devices| devices.iter().find(|d| d.id == id).cloned())
    }

    pub fn len(&self) -> usize {
        self.read(|devices| devices.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Descriptor list device `id` advertises for `command`.
    ///
    /// # Errors
    ///
    /// [`TactusError::UnknownDevice`] when `id` is not registered,
    /// [`TactusError::UnsupportedCommand`] when the device has no descriptor
    /// list for `command`.
    pub fn descriptors(&self, id: DeviceIndex, command: &str) -> Result<Vec<CommandDescriptor>, TactusError> {
        self.read(|devices| {
            let device = devices
                .iter()
                .find(|d| d.id == id)
                .ok_or(TactusError::UnknownDevice(id))?;
            device
                .descriptors(command)
                .map(<[CommandDescriptor]>::to_vec)
                .ok_or_else(|| TactusError::UnsupportedCommand {
                    device: id,
                    command: command.to_string(),
                })
        })
    }

    /// Replace the whole registry with a `DeviceList`. Duplicate ids keep the
    /// last occurrence at the first occurrence's position.
    pub(crate) fn replace_all(&self, incoming: Vec<Device>) {
        let mut devices: Vec<Device> = Vec::with_capacity(incoming.len());
        for device in incoming {
            match devices.iter_mut().find(|d| d.id == device.id) {
                Some(slot) => *slot = device,
                None => devices.push(device),
            }
        }
        let count = devices.len();
        *self.devices.write().unwrap_or_else(PoisonError::into_inner) = devices;
        info!(count, "device list replaced");
    }

    /// Insert `device`, overwriting any entry with the same id in place.
    pub(crate) fn upsert(&self, device: Device) {
        let mut devices = self.devices.write().unwrap_or_else(PoisonError::into_inner);
        match devices.iter_mut().find(|d| d.id == device.id) {
            Some(slot) => {
                debug!(device = device.id, "device replaced");
                *slot = device;
            }
            None => {
                info!(device = device.id, name = %device.name, "device added");
                devices.push(device);
            }
        }
    }

    /// Remove device `id`. Unknown ids are a no-op.
    /// Forget every device, e.g. when the session that announced them ends.
    pub(crate) fn clear(&self) {
        let mut devices = self.devices.write().unwrap_or_else(PoisonError::into_inner);
        if !devices.is_empty() {
            debug!(count = devices.len(), "registry cleared");
            devices.clear();
        }
    }

    pub(crate) fn remove(&self, id: DeviceIndex) -> Option<Device> {
        let mut devices = self.devices.write().unwrap_or_else(PoisonError::into_inner);
        let pos = devices.iter().position(|d| d.id == id)?;
        info!(device = id, "device removed");
        Some(devices.remove(pos))
    }

    fn read<T>(&self, f: impl FnOnce(&[Device]) -> T) -> T {
        let devices = self.devices.read().unwrap_or_else(PoisonError::into_inner);
        f(&devices)
    }
}

/// Holds the most recent `SensorReading`.
#[derive(Debug, Default)]
pub struct SensorSlot {
    latest: RwLock<Option<SensorSnapshot>>,
}

impl SensorSlot {
    pub fn snapshot(&self) -> Option<SensorSnapshot> {
        self.latest.read().unwrap_or_else(PoisonError::into_inner).clone()
    }

    pub(crate) fn store(&self, reading: SensorSnapshot) {
        *self.latest.write().unwrap_or_else(PoisonError::into_inner) = Some(reading);
    }

    pub(crate) fn clear(&self) {
        *self.latest.write().unwrap_or_else(PoisonError::into_inner) = None;
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;
    use tactus_types::command_type;

    fn device(id: DeviceIndex, name: &str, scalars: usize) -> Device {
        let mut command_attributes = BTreeMap::new();
        let mut command_types = vec![command_type::STOP_DEVICE.to_string()];
        if scalars > 0 {
            command_types.insert(0, command_type::SCALAR.to_string());
            command_attributes.insert(
                command_type::SCALAR.to_string(),
                (0..scalars)
                    .map(|_| CommandDescriptor {
                        actuator_type: "Vibrate".to_string(),
                        step_count: 20,
                        ..Default::default()
                    })
                    .collect(),
            );
        }
        Device {
            id,
            name: name.to_string(),
            command_types,
            command_attributes,
            ..Default::default()
        }
    }

    #[test]
    fn upsert_overwrites_in_place() {
        let reg = DeviceRegistry::new();
        reg.upsert(device(1, "a", 1));
        reg.upsert(device(2, "b", 1));
        reg.upsert(device(1, "a2", 2));
        let ids: Vec<_> = reg.snapshot().iter().map(|d| (d.id, d.name.clone())).collect();
        assert_eq!(ids, vec![(1, "a2".to_string()), (2, "b".to_string())]);
        assert_eq!(reg.find_by_id(2), Some(1));
    }

    #[test]
    fn replace_all_dedups_and_drops_stale_entries() {
        let reg = DeviceRegistry::new();
        reg.upsert(device(9, "stale", 1));
        reg.replace_all(vec![device(1, "a", 1), device(2, "b", 1), device(1, "a-again", 1)]);
        let snap = reg.snapshot();
        assert_eq!(snap.len(), 2);
        assert_eq!(snap[0].name, "a-again");
        assert!(reg.get(9).is_none());
    }

    #[test]
    fn remove_unknown_is_noop() {
        let reg = DeviceRegistry::new();
        reg.upsert(device(7, "x", 1));
        assert!(reg.remove(8).is_none());
        assert!(reg.remove(7).is_some());
        assert!(reg.is_empty());
    }

    #[test]
    fn snapshots_are_independent_copies() {
        let reg = DeviceRegistry::new();
        reg.upsert(device(1, "a", 1));
        let mut snap = reg.snapshot();
        snap[0].name = "mutated".to_string();
        assert_eq!(reg.get(1).unwrap().name, "a");
    }

    #[test]
    fn descriptor_lookup_errors() {
        let reg = DeviceRegistry::new();
        reg.upsert(device(1, "a", 3));
        reg.upsert(device(2, "stop-only", 0));
        assert_eq!(reg.descriptors(1, command_type::SCALAR).unwrap().len(), 3);
        assert_eq!(reg.descriptors(5, command_type::SCALAR), Err(TactusError::UnknownDevice(5)));
        assert!(matches!(
            reg.descriptors(2, command_type::SCALAR),
            Err(TactusError::UnsupportedCommand { device: 2, .. })
        ));
    }

    #[test]
    fn sensor_slot_keeps_latest() {
        let slot = SensorSlot::default();
        assert!(slot.snapshot().is_none());
        slot.store(SensorSnapshot { device_id: 1, data: vec![1], ..Default::default() });
        slot.store(SensorSnapshot { device_id: 1, data: vec![2], ..Default::default() });
        assert_eq!(slot.snapshot().unwrap().data, vec![2]);
        slot.clear();
        assert!(slot.snapshot().is_none());
    }

    #[test]
    fn clear_empties_the_registry() {
        let reg = DeviceRegistry::new();
        reg.upsert(device(1, "a", 1));
        reg.upsert(device(2, "b", 0));
        reg.clear();
        assert!(reg.is_empty());
        assert_eq!(reg.descriptors(1, command_type::SCALAR), Err(TactusError::UnknownDevice(1)));
    }
}

//! Turns high-level device commands into wire messages.
//!
//! The router consults the registry for the device's descriptor list and
//! emits one entry per addressed actuator, using the descriptor's position as
//! the wire index. Messages leave with id `0`; the send path stamps the real
//! correlation id.

use std::collections::BTreeMap;

use tactus_protocol::{
    Bare, ClientMessage, LinearCmd, LinearVector, RotateCmd, Rotation, Scalar, ScalarCmd,
    SensorCmd, StopDeviceCmd,
};
use tactus_types::{command_type, CommandDescriptor, DeviceIndex, TactusError};

use crate::registry::DeviceRegistry;

/// Values addressed to a device's actuators.
#[derive(Debug, Clone, PartialEq)]
pub enum Actuation<T> {
    /// Same value on every actuator of the command type, indices `0..N`.
    Uniform(T),
    /// One value per listed actuator index. Indices beyond the descriptor
    /// list are skipped and reported.
    PerActuator(BTreeMap<u32, T>),
}

impl<T> Actuation<T> {
    pub fn uniform(value: T) -> Self {
        Actuation::Uniform(value)
    }

    pub fn per_actuator(values: impl IntoIterator<Item = (u32, T)>) -> Self {
        Actuation::PerActuator(values.into_iter().collect())
    }
}

/// Target of a linear actuator.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LinearTarget {
    pub duration_ms: u32,
    pub position: f64,
}

/// Target of a rotating actuator.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RotateTarget {
    pub speed: f64,
    pub clockwise: bool,
}

pub type ScalarCommand = Actuation<f64>;
pub type LinearCommand = Actuation<LinearTarget>;
pub type RotateCommand = Actuation<RotateTarget>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SensorAction {
    Read,
    Subscribe,
    Unsubscribe,
}

/// A routed message plus the actuator indices that were left out of it.
#[derive(Debug, Clone, PartialEq)]
pub struct Routed {
    pub message: ClientMessage,
    pub skipped: Vec<u32>,
}

impl Routed {
    fn complete(message: ClientMessage) -> Self {
        Self { message, skipped: Vec::new() }
    }
}

/// Outcome of a routed send.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutcome {
    /// Correlation id the message went out with.
    pub id: u32,
    /// Per-actuator indices dropped because the device has no such actuator.
    pub skipped: Vec<u32>,
}

pub struct CommandRouter<'a> {
    registry: &'a DeviceRegistry,
}

struct Plan<'v, T> {
    entries: Vec<(u32, CommandDescriptor, &'v T)>,
    skipped: Vec<u32>,
}

impl<'a> CommandRouter<'a> {
    pub fn new(registry: &'a DeviceRegistry) -> Self {
        Self { registry }
    }

    pub fn scalar(&self, device: DeviceIndex, command: &ScalarCommand) -> Result<Routed, TactusError> {
        let plan = self.plan(device, command_type::SCALAR, command)?;
        let scalars = plan
            .entries
            .into_iter()
            .map(|(index, descriptor, &scalar)| Scalar {
                index,
                scalar,
                actuator_type: descriptor.actuator_type,
            })
            .collect();
        Ok(Routed {
            message: ClientMessage::ScalarCmd(ScalarCmd { id: 0, device_index: device, scalars }),
            skipped: plan.skipped,
        })
    }

    pub fn linear(&self, device: DeviceIndex, command: &LinearCommand) -> Result<Routed, TactusError> {
        let plan = self.plan(device, command_type::LINEAR, command)?;
        let vectors = plan
            .entries
            .into_iter()
            .map(|(index, _, target)| LinearVector {
                index,
                duration: target.duration_ms,
                position: target.position,
            })
            .collect();
        Ok(Routed {
            message: ClientMessage::LinearCmd(LinearCmd { id: 0, device_index: device, vectors }),
            skipped: plan.skipped,
        })
    }

    pub fn rotate(&self, device: DeviceIndex, command: &RotateCommand) -> Result<Routed, TactusError> {
        let plan = self.plan(device, command_type::ROTATE, command)?;
        let rotations = plan
            .entries
            .into_iter()
            .map(|(index, _, target)| Rotation {
                index,
                speed: target.speed,
                clockwise: target.clockwise,
            })
            .collect();
        Ok(Routed {
            message: ClientMessage::RotateCmd(RotateCmd { id: 0, device_index: device, rotations }),
            skipped: plan.skipped,
        })
    }

    /// Read, subscribe to, or unsubscribe from sensor `sensor_index`.
    ///
    /// Subscriptions use the device's `SensorSubscribeCmd` descriptors when it
    /// advertises them and fall back to `SensorReadCmd` otherwise.
    pub fn sensor(&self, device: DeviceIndex, sensor_index: u32, action: SensorAction) -> Result<Routed, TactusError> {
        let descriptors = match action {
            SensorAction::Read => self.registry.descriptors(device, command_type::SENSOR_READ)?,
            SensorAction::Subscribe | SensorAction::Unsubscribe => {
                match self.registry.descriptors(device, command_type::SENSOR_SUBSCRIBE) {
                    Err(TactusError::UnsupportedCommand { .. }) => {
                        self.registry.descriptors(device, command_type::SENSOR_READ)?
                    }
                    other => other?,
                }
            }
        };
        let descriptor = descriptors.get(sensor_index as usize).ok_or(
            TactusError::ActuatorIndexOutOfRange {
                device,
                index: sensor_index,
                count: descriptors.len(),
            },
        )?;
        let payload = SensorCmd {
            id: 0,
            device_index: device,
            sensor_index,
            sensor_type: descriptor.sensor_type.clone(),
        };
        let message = match action {
            SensorAction::Read => ClientMessage::SensorReadCmd(payload),
            SensorAction::Subscribe => ClientMessage::SensorSubscribeCmd(payload),
            SensorAction::Unsubscribe => ClientMessage::SensorUnsubscribeCmd(payload),
        };
        Ok(Routed::complete(message))
    }

    /// `StopDeviceCmd` for a registered device.
    pub fn stop_device(&self, device: DeviceIndex) -> Result<Routed, TactusError> {
        if self.registry.find_by_id(device).is_none() {
            return Err(TactusError::UnknownDevice(device));
        }
        Ok(Routed::complete(ClientMessage::StopDeviceCmd(StopDeviceCmd {
            id: 0,
            device_index: device,
        })))
    }

    pub fn stop_all() -> Routed {
        Routed::complete(ClientMessage::StopAllDevices(Bare::default()))
    }

    fn plan<'v, T>(&self, device: DeviceIndex, command: &str, actuation: &'v Actuation<T>) -> Result<Plan<'v, T>, TactusError> {
        let descriptors = self.registry.descriptors(device, command)?;
        let count = descriptors.len();
        let mut plan = Plan { entries: Vec::new(), skipped: Vec::new() };
        match actuation {
            Actuation::Uniform(value) => {
                plan.entries = descriptors
                    .into_iter()
                    .enumerate()
                    .map(|(i, d)| (i as u32, d, value))
                    .collect();
            }
            Actuation::PerActuator(values) => {
                for (&index, value) in values {
                    match descriptors.get(index as usize) {
                        Some(d) => plan.entries.push((index, d.clone(), value)),
                        None => plan.skipped.push(index),
                    }
                }
            }
        }
        if plan.entries.is_empty() {
            return Err(match plan.skipped.first() {
                Some(&index) => TactusError::ActuatorIndexOutOfRange { device, index, count },
                None => TactusError::EmptyCommand { device },
            });
        }
        Ok(plan)
    }
}

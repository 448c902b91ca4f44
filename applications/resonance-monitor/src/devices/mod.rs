//! Connected devices. Mutated only by direct user toggles; the alert loop
//! never reads from here.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceKind {
    Lamp,
    Tv,
    Charger,
    Speaker,
    Generic,
}

/// Name fragment -> kind, checked in order
const KIND_BY_NAME: &[(&str, DeviceKind)] = &[
    ("Lamp", DeviceKind::Lamp),
    ("TV", DeviceKind::Tv),
    ("Charger", DeviceKind::Charger),
    ("Sonos", DeviceKind::Speaker),
    ("Speaker", DeviceKind::Speaker),
];

impl DeviceKind {
    pub fn from_name(name: &str) -> Self {
        KIND_BY_NAME
            .iter()
            .find(|(fragment, _)| name.contains(fragment))
            .map(|(_, kind)| *kind)
            .unwrap_or(DeviceKind::Generic)
    }

    pub fn icon(&self) -> &'static str {
        match self {
            DeviceKind::Lamp => "lamp",
            DeviceKind::Tv => "tv",
            DeviceKind::Charger => "car",
            DeviceKind::Speaker => "speaker",
            DeviceKind::Generic => "zap",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Connectivity {
    Optimal,
    Disconnected,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Device {
    pub id: String,
    pub name: String,
    pub room: String,
    pub is_on: bool,
    pub consumption_kw: f64,
    pub status: Connectivity,
    pub priority: bool,
    pub custom_voltage: u32,
    pub max_voltage: u32,
    pub kind: DeviceKind,
}

impl Device {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        id: &str,
        name: &str,
        room: &str,
        is_on: bool,
        consumption_kw: f64,
        status: Connectivity,
        priority: bool,
        custom_voltage: u32,
        max_voltage: u32,
    ) -> Self {
        Self {
            id: id.to_string(),
            name: name.to_string(),
            room: room.to_string(),
            is_on,
            consumption_kw,
            status,
            priority,
            custom_voltage,
            max_voltage,
            kind: DeviceKind::from_name(name),
        }
    }

    /// Voltage above the device maximum is allowed but flagged
    pub fn voltage_warning(&self) -> bool {
        self.custom_voltage > self.max_voltage
    }
}

/// Result of a voltage change: always applied, possibly flagged
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VoltageCheck {
    WithinLimit,
    OverLimit { max_voltage: u32 },
}

#[derive(Debug, Clone)]
pub struct DeviceRegistry {
    devices: Vec<Device>,
}

impl Default for DeviceRegistry {
    fn default() -> Self {
        Self::new(vec![
            Device::new("1", "Bedroom Lamp", "Bedroom", true, 0.1, Connectivity::Optimal, false, 220, 230),
            Device::new("2", "Living Room TV", "Living Room", true, 0.3, Connectivity::Optimal, true, 240, 240),
            Device::new("3", "Tesla Charger", "Garage", false, 7.2, Connectivity::Optimal, false, 240, 250),
            Device::new("4", "Sonos", "Kitchen", true, 0.05, Connectivity::Disconnected, false, 220, 220),
        ])
    }
}

impl DeviceRegistry {
    pub fn new(devices: Vec<Device>) -> Self {
        Self { devices }
    }

    pub fn devices(&self) -> &[Device] {
        &self.devices
    }

    pub fn get(&self, id: &str) -> Option<&Device> {
        self.devices.iter().find(|d| d.id == id)
    }

    fn get_mut(&mut self, id: &str) -> Option<&mut Device> {
        self.devices.iter_mut().find(|d| d.id == id)
    }

    /// Flip a device on/off; returns the new state, `None` for an unknown id
    pub fn toggle(&mut self, id: &str) -> Option<bool> {
        let device = self.get_mut(id)?;
        device.is_on = !device.is_on;
        Some(device.is_on)
    }

    pub fn toggle_priority(&mut self, id: &str) -> Option<bool> {
        let device = self.get_mut(id)?;
        device.priority = !device.priority;
        Some(device.priority)
    }

    pub fn all_off(&mut self) {
        for device in &mut self.devices {
            device.is_on = false;
        }
    }

    pub fn set_voltage(&mut self, id: &str, voltage: u32) -> Option<VoltageCheck> {
        let device = self.get_mut(id)?;
        device.custom_voltage = voltage;

        if device.voltage_warning() {
            tracing::warn!(
                device = %device.name,
                voltage,
                max_voltage = device.max_voltage,
                "voltage above device safety maximum"
            );
            Some(VoltageCheck::OverLimit {
                max_voltage: device.max_voltage,
            })
        } else {
            Some(VoltageCheck::WithinLimit)
        }
    }

    /// Sum of consumption over devices that are switched on
    pub fn active_consumption_kw(&self) -> f64 {
        self.devices
            .iter()
            .filter(|d| d.is_on)
            .map(|d| d.consumption_kw)
            .sum()
    }

    pub fn by_room(&self, room: &str) -> Vec<&Device> {
        self.devices.iter().filter(|d| d.room == room).collect()
    }
}

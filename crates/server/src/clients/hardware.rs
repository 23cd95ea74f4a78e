//! Discovery of serial ports that a board can be attached to. Reading the
//! board itself happens outside the relay.

use anyhow::{Context, Result};
use serde::Serialize;
use serialport::{SerialPortInfo, SerialPortType};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PortInfo {
    pub device: String,
    pub description: String,
    pub manufacturer: Option<String>,
}

pub trait PortDirectory: Send + Sync {
    fn list_ports(&self) -> Result<Vec<PortInfo>>;
}

/// The serial ports the operating system reports.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemPorts;

impl PortDirectory for SystemPorts {
    fn list_ports(&self) -> Result<Vec<PortInfo>> {
        let mut ports: Vec<PortInfo> = serialport::available_ports()
            .context("Failed to enumerate serial ports")?
            .into_iter()
            .map(PortInfo::from)
            .collect();
        ports.sort_by(|a, b| a.device.cmp(&b.device));
        Ok(ports)
    }
}

impl From<SerialPortInfo> for PortInfo {
    fn from(info: SerialPortInfo) -> Self {
        let (description, manufacturer) = match info.port_type {
            SerialPortType::UsbPort(usb) => {
                let description = usb
                    .product
                    .unwrap_or_else(|| format!("USB serial device {:04x}:{:04x}", usb.vid, usb.pid));
                (description, usb.manufacturer)
            }
            SerialPortType::BluetoothPort => ("Bluetooth serial link".to_string(), None),
            SerialPortType::PciPort => ("PCI serial port".to_string(), None),
            SerialPortType::Unknown => ("n/a".to_string(), None),
        };
        Self {
            device: info.port_name,
            description,
            manufacturer,
        }
    }
}

//! Modem port-layout definitions.
//!
//! USB modems expose several serial interfaces; which one answers AT
//! commands and which one carries PPP data differs per product. The table
//! maps `vendor:product` to indexes into the sorted tty list of the
//! enumerated modem record.

use std::path::{Path, PathBuf};

use crate::system::devices::{IfType, InterfaceRecord};

/// Static port layout for one modem product.
#[derive(Debug, Clone, Copy)]
pub struct ModemDef {
    /// `vendor:product` as reported by the USB descriptors.
    pub usbid: &'static str,
    /// Human-readable product description.
    pub desc: &'static str,
    /// Index of the AT control port in the sorted tty list.
    pub control: usize,
    /// Index of the PPP data port in the sorted tty list.
    pub data: usize,
}

/// Known modems.
pub const MODEM_DEFS: &[ModemDef] = &[
    ModemDef {
        usbid: "12d1:1001",
        desc: "Huawei E1550/E173",
        control: 2,
        data: 0,
    },
    ModemDef {
        usbid: "12d1:1436",
        desc: "Huawei E173",
        control: 2,
        data: 0,
    },
    ModemDef {
        usbid: "12d1:1506",
        desc: "Huawei E3372",
        control: 2,
        data: 0,
    },
    ModemDef {
        usbid: "19d2:0117",
        desc: "ZTE MF190",
        control: 1,
        data: 2,
    },
    ModemDef {
        usbid: "1bc7:0021",
        desc: "Telit HE910",
        control: 1,
        data: 0,
    },
];

/// A concrete, usable modem: resolved device nodes for both ports.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Modem {
    /// `vendor:product` identifier.
    pub usbid: String,
    /// All serial ports of the device, sorted.
    pub ports: Vec<String>,
    /// Product description from the definition table.
    pub model: &'static str,
    /// Device node answering AT commands.
    pub port_control: PathBuf,
    /// Device node used for the PPP dial.
    pub port_data: PathBuf,
}

/// Resolve an enumerated modem record against the definition table.
///
/// Returns `None` for unknown products and for records with fewer ports
/// than the layout needs.
pub fn resolve(record: &InterfaceRecord, dev_dir: &Path) -> Option<Modem> {
    if record.iftype != IfType::GsmModem {
        return None;
    }
    let usbid = record.usbid.as_deref()?;
    let def = MODEM_DEFS.iter().find(|d| d.usbid == usbid)?;

    let ports = &record.ttys;
    // E3372h firmware 21.326.62.00.55 enumerates only two serial ports
    let (control, data) = if usbid == "12d1:1506" && ports.len() == 2 {
        (0, 1)
    } else if ports.len() < def.control + 1 || ports.len() < def.data + 1 {
        return None;
    } else {
        (def.control, def.data)
    };

    Some(Modem {
        usbid: usbid.to_string(),
        ports: ports.clone(),
        model: def.desc,
        port_control: dev_dir.join(&ports[control]),
        port_data: dev_dir.join(&ports[data]),
    })
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use crate::system::devices::Bus;

    use super::*;

    fn modem_record(usbid: &str, ttys: &[&str]) -> InterfaceRecord {
        InterfaceRecord {
            ifname: Some("ppp".to_string()),
            mac: None,
            iftype: IfType::GsmModem,
            bus: Bus::Usb,
            port: Some("1-1:1.0".to_string()),
            usbid: Some(usbid.to_string()),
            ttys: ttys.iter().map(|t| (*t).to_string()).collect(),
        }
    }

    #[test]
    fn resolves_known_modem() {
        let record = modem_record("12d1:1001", &["ttyUSB0", "ttyUSB1", "ttyUSB2"]);

        let modem = resolve(&record, Path::new("/dev")).unwrap();

        assert_eq!(modem.port_control, PathBuf::from("/dev/ttyUSB2"));
        assert_eq!(modem.port_data, PathBuf::from("/dev/ttyUSB0"));
        assert_eq!(modem.model, "Huawei E1550/E173");
    }

    #[test]
    fn e3372_two_port_firmware_special_case() {
        let record = modem_record("12d1:1506", &["ttyUSB0", "ttyUSB1"]);

        let modem = resolve(&record, Path::new("/dev")).unwrap();

        assert_eq!(modem.port_control, PathBuf::from("/dev/ttyUSB0"));
        assert_eq!(modem.port_data, PathBuf::from("/dev/ttyUSB1"));
    }

    #[test]
    fn too_few_ports_is_unusable() {
        let record = modem_record("12d1:1001", &["ttyUSB0"]);

        assert_eq!(resolve(&record, Path::new("/dev")), None);
    }

    #[test]
    fn unknown_product_is_unusable() {
        let record = modem_record("ffff:0000", &["ttyUSB0", "ttyUSB1", "ttyUSB2"]);

        assert_eq!(resolve(&record, Path::new("/dev")), None);
    }
}

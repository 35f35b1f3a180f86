//! Network interface enumeration.
//!
//! Walks the USB device tree and `/sys/class/net`, producing one record per
//! physically distinct interface. GSM modems usually enumerate as a bundle
//! of serial ports without a network interface; those collapse into a
//! pseudo-record with `ifname = "ppp"` carrying the tty list.
//!
//! Records are produced on demand and never cached: hot-plug is expected.

use std::fs;
use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::config::Settings;

/// Physical interface kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IfType {
    /// Wired ethernet.
    Wired,
    /// 802.11 wireless.
    Wifi,
    /// Serial-attached GSM modem.
    GsmModem,
}

/// Bus the interface hangs off.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Bus {
    /// USB-attached device.
    Usb,
    /// Board-level device.
    Builtin,
}

/// One enumerated network interface.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InterfaceRecord {
    /// Kernel interface name, or `"ppp"` for modem pseudo-records.
    pub ifname: Option<String>,
    /// Hardware address as read from sysfs.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mac: Option<String>,
    /// Interface kind.
    pub iftype: IfType,
    /// Bus location.
    pub bus: Bus,
    /// USB interface directory name (topology position).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub port: Option<String>,
    /// `vendor:product` identifier.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub usbid: Option<String>,
    /// Serial device nodes, sorted; only populated on modem records.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub ttys: Vec<String>,
}

/// Interface selected for a link configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectedIface {
    /// Kernel interface name.
    pub ifname: String,
    /// Hardware address.
    pub mac: String,
}

/// Enumerates interfaces from configurable sysfs roots.
#[derive(Debug, Clone)]
pub struct DeviceEnumerator {
    sys_usb: PathBuf,
    sys_net: PathBuf,
}

impl DeviceEnumerator {
    /// Enumerator over the configured sysfs roots.
    pub fn new(settings: &Settings) -> Self {
        Self {
            sys_usb: settings.sys_usb_devices.clone(),
            sys_net: settings.sys_class_net.clone(),
        }
    }

    /// Enumerator over explicit roots, used by tests.
    #[cfg(test)]
    pub(crate) fn with_roots(sys_usb: PathBuf, sys_net: PathBuf) -> Self {
        Self { sys_usb, sys_net }
    }

    /// All currently visible interfaces, USB first, in discovery order.
    pub fn interfaces(&self) -> Vec<InterfaceRecord> {
        let mut records = Vec::new();
        self.walk_usb(&mut records);

        // merge '/sys/class/net' interfaces not already discovered on USB
        for rec in self.class_net() {
            if !records.iter().any(|r| r.ifname == rec.ifname) {
                records.push(rec);
            }
        }
        records
    }

    /// Resolve a link configuration's interface selector.
    ///
    /// Records lacking a name or MAC are skipped; the first enumerated
    /// match wins.
    pub fn select(
        &self,
        name: Option<&str>,
        mac: Option<&str>,
        usb_port: Option<&str>,
    ) -> Option<SelectedIface> {
        for rec in self.interfaces() {
            let (Some(ifname), Some(rec_mac)) = (&rec.ifname, &rec.mac) else {
                continue;
            };
            let matched = name.is_some_and(|n| n == ifname.as_str())
                || mac.is_some_and(|m| m.eq_ignore_ascii_case(rec_mac))
                || usb_port.is_some_and(|p| rec.port.as_deref() == Some(p));
            if matched {
                return Some(SelectedIface {
                    ifname: ifname.clone(),
                    mac: rec_mac.clone(),
                });
            }
        }
        None
    }

    fn walk_usb(&self, records: &mut Vec<InterfaceRecord>) {
        let Ok(read) = fs::read_dir(&self.sys_usb) else {
            return;
        };
        let mut entries: Vec<PathBuf> = read.filter_map(|e| e.ok().map(|e| e.path())).collect();
        entries.sort();

        for iface_dir in entries {
            let Some(iface_name) = iface_dir.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            // interface directories look like `1-1.2:1.0`
            let Some((dev_name, _)) = iface_name.split_once(':') else {
                continue;
            };
            let Some(usbid) = self.usb_id(dev_name) else {
                continue;
            };

            if iface_dir.join("net").is_dir() {
                records.push(self.usb_net_record(&iface_dir, iface_name, &usbid));
            } else {
                for tty in ttys_of(&iface_dir) {
                    self.attach_tty(records, iface_name, &usbid, tty);
                }
            }
        }
    }

    fn usb_id(&self, dev_name: &str) -> Option<String> {
        let dev_dir = self.sys_usb.join(dev_name);
        let vendor = read_trimmed(&dev_dir.join("idVendor"))?;
        let product = read_trimmed(&dev_dir.join("idProduct"))?;
        Some(format!("{vendor}:{product}"))
    }

    fn usb_net_record(&self, iface_dir: &Path, port: &str, usbid: &str) -> InterfaceRecord {
        let mut ifname = None;
        if let Ok(read) = fs::read_dir(iface_dir.join("net")) {
            let mut names: Vec<String> = read
                .filter_map(|e| e.ok().and_then(|e| e.file_name().into_string().ok()))
                .collect();
            names.sort();
            ifname = names.pop();
        }

        let mut iftype = IfType::Wired;
        let mut mac = None;
        if let Some(name) = &ifname {
            let sysnet = self.sys_net.join(name);
            if sysnet.join("wireless").is_dir() {
                iftype = IfType::Wifi;
            }
            mac = read_trimmed(&sysnet.join("address"));
        }

        InterfaceRecord {
            ifname,
            mac,
            iftype,
            bus: Bus::Usb,
            port: Some(port.to_string()),
            usbid: Some(usbid.to_string()),
            ttys: Vec::new(),
        }
    }

    fn attach_tty(
        &self,
        records: &mut Vec<InterfaceRecord>,
        port: &str,
        usbid: &str,
        tty: String,
    ) {
        for rec in records.iter_mut() {
            if rec.iftype == IfType::GsmModem && rec.usbid.as_deref() == Some(usbid) {
                rec.ttys.push(tty);
                rec.ttys.sort();
                return;
            }
        }
        records.push(InterfaceRecord {
            ifname: Some("ppp".to_string()),
            mac: None,
            iftype: IfType::GsmModem,
            bus: Bus::Usb,
            port: Some(port.to_string()),
            usbid: Some(usbid.to_string()),
            ttys: vec![tty],
        });
    }

    fn class_net(&self) -> Vec<InterfaceRecord> {
        let mut records = Vec::new();
        let Ok(read) = fs::read_dir(&self.sys_net) else {
            return records;
        };
        let mut entries: Vec<PathBuf> = read.filter_map(|e| e.ok().map(|e| e.path())).collect();
        entries.sort();

        for dir in entries {
            let Some(name) = dir.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            let iftype = if dir.join("wireless").is_dir() {
                IfType::Wifi
            } else {
                IfType::Wired
            };
            records.push(InterfaceRecord {
                ifname: Some(name.to_string()),
                mac: read_trimmed(&dir.join("address")),
                iftype,
                bus: Bus::Builtin,
                port: None,
                usbid: None,
                ttys: Vec::new(),
            });
        }
        records
    }
}

/// Serial device names exposed by a USB interface directory.
///
/// usb-serial adapters place `ttyUSB*` directly in the interface directory;
/// cdc-acm devices nest `ttyACM*` under a `tty/` subdirectory.
fn ttys_of(iface_dir: &Path) -> Vec<String> {
    let mut ttys = Vec::new();

    let mut scan = |dir: &Path| {
        if let Ok(read) = fs::read_dir(dir) {
            for entry in read.filter_map(std::result::Result::ok) {
                if let Ok(name) = entry.file_name().into_string() {
                    if name.starts_with("ttyUSB") || name.starts_with("ttyACM") {
                        ttys.push(name);
                    }
                }
            }
        }
    };

    scan(iface_dir);
    scan(&iface_dir.join("tty"));
    ttys.sort();
    ttys
}

fn read_trimmed(path: &Path) -> Option<String> {
    fs::read_to_string(path).ok().map(|s| s.trim().to_string())
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use std::fs;

    use tempfile::TempDir;

    use super::*;

    struct FakeSysfs {
        root: TempDir,
    }

    impl FakeSysfs {
        fn new() -> Self {
            let root = TempDir::new().unwrap();
            fs::create_dir_all(root.path().join("usb")).unwrap();
            fs::create_dir_all(root.path().join("net")).unwrap();
            Self { root }
        }

        fn enumerator(&self) -> DeviceEnumerator {
            DeviceEnumerator::with_roots(
                self.root.path().join("usb"),
                self.root.path().join("net"),
            )
        }

        fn add_usb_device(&self, name: &str, vendor: &str, product: &str) {
            let dev = self.root.path().join("usb").join(name);
            fs::create_dir_all(&dev).unwrap();
            fs::write(dev.join("idVendor"), format!("{vendor}\n")).unwrap();
            fs::write(dev.join("idProduct"), format!("{product}\n")).unwrap();
        }

        fn add_usb_net_iface(&self, name: &str, ifname: &str) {
            let iface = self.root.path().join("usb").join(name);
            fs::create_dir_all(iface.join("net").join(ifname)).unwrap();
        }

        fn add_usb_tty_iface(&self, name: &str, tty: &str) {
            let iface = self.root.path().join("usb").join(name);
            fs::create_dir_all(iface.join(tty)).unwrap();
        }

        fn add_net(&self, ifname: &str, mac: &str, wireless: bool) {
            let dir = self.root.path().join("net").join(ifname);
            fs::create_dir_all(&dir).unwrap();
            fs::write(dir.join("address"), format!("{mac}\n")).unwrap();
            if wireless {
                fs::create_dir_all(dir.join("wireless")).unwrap();
            }
        }
    }

    #[test]
    fn modem_ttys_collapse_into_one_record() {
        let sysfs = FakeSysfs::new();
        sysfs.add_usb_device("1-1", "12d1", "1001");
        sysfs.add_usb_tty_iface("1-1:1.0", "ttyUSB0");
        sysfs.add_usb_tty_iface("1-1:1.1", "ttyUSB1");
        sysfs.add_usb_tty_iface("1-1:1.2", "ttyUSB2");

        let records = sysfs.enumerator().interfaces();

        let modem: Vec<_> = records
            .iter()
            .filter(|r| r.iftype == IfType::GsmModem)
            .collect();
        assert_eq!(modem.len(), 1);
        assert_eq!(modem[0].ifname.as_deref(), Some("ppp"));
        assert_eq!(modem[0].usbid.as_deref(), Some("12d1:1001"));
        assert_eq!(modem[0].ttys, vec!["ttyUSB0", "ttyUSB1", "ttyUSB2"]);
    }

    #[test]
    fn usb_net_interface_reads_mac_and_wireless_flag() {
        let sysfs = FakeSysfs::new();
        sysfs.add_usb_device("2-1", "0bda", "8153");
        sysfs.add_usb_net_iface("2-1:1.0", "wlan0");
        sysfs.add_net("wlan0", "aa:bb:cc:dd:ee:ff", true);

        let records = sysfs.enumerator().interfaces();

        let rec = records
            .iter()
            .find(|r| r.ifname.as_deref() == Some("wlan0"))
            .unwrap();
        assert_eq!(rec.iftype, IfType::Wifi);
        assert_eq!(rec.bus, Bus::Usb);
        assert_eq!(rec.mac.as_deref(), Some("aa:bb:cc:dd:ee:ff"));
    }

    #[test]
    fn class_net_merge_skips_usb_duplicates() {
        let sysfs = FakeSysfs::new();
        sysfs.add_usb_device("2-1", "0bda", "8153");
        sysfs.add_usb_net_iface("2-1:1.0", "eth1");
        sysfs.add_net("eth1", "00:11:22:33:44:55", false);
        sysfs.add_net("eth0", "66:77:88:99:aa:bb", false);

        let records = sysfs.enumerator().interfaces();

        let eth1: Vec<_> = records
            .iter()
            .filter(|r| r.ifname.as_deref() == Some("eth1"))
            .collect();
        assert_eq!(eth1.len(), 1);
        assert_eq!(eth1[0].bus, Bus::Usb);

        let eth0 = records
            .iter()
            .find(|r| r.ifname.as_deref() == Some("eth0"))
            .unwrap();
        assert_eq!(eth0.bus, Bus::Builtin);
        assert_eq!(eth0.iftype, IfType::Wired);
    }

    #[test]
    fn select_matches_name_mac_and_port() {
        let sysfs = FakeSysfs::new();
        sysfs.add_usb_device("2-1", "0bda", "8153");
        sysfs.add_usb_net_iface("2-1:1.0", "eth1");
        sysfs.add_net("eth1", "00:11:22:33:44:55", false);
        sysfs.add_net("eth0", "66:77:88:99:aa:bb", false);
        let enumerator = sysfs.enumerator();

        let by_name = enumerator.select(Some("eth0"), None, None).unwrap();
        assert_eq!(by_name.ifname, "eth0");

        let by_mac = enumerator
            .select(None, Some("00:11:22:33:44:55"), None)
            .unwrap();
        assert_eq!(by_mac.ifname, "eth1");

        let by_port = enumerator.select(None, None, Some("2-1:1.0")).unwrap();
        assert_eq!(by_port.ifname, "eth1");

        assert!(enumerator.select(Some("wlan9"), None, None).is_none());
    }
}

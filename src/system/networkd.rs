//! Declarative network file generation.
//!
//! Each link kind owns one file `netconnect_<kind>.network` in the
//! configured directory. Content is deterministic from the inputs and only
//! written when it differs from what is on disk, so the caller can restart
//! the host network service exactly when something changed.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use crate::services::common::types::Ipv4Config;

/// Default metric when the caller does not pass one.
pub const DEFAULT_METRIC: u32 = 128;

const DEFAULT_STATIC_IP: &str = "169.254.255.254";
const DEFAULT_NETMASK: &str = "255.255.255.0";

/// Renders and maintains declarative network files in one directory.
#[derive(Debug, Clone)]
pub struct NetworkdWriter {
    dir: PathBuf,
}

impl NetworkdWriter {
    /// Writer over the given directory.
    pub fn new(dir: PathBuf) -> Self {
        Self { dir }
    }

    fn file(&self, name: &str) -> PathBuf {
        self.dir.join(format!("netconnect_{name}.network"))
    }

    /// Render the configuration and write it if it differs from the
    /// existing file. Returns whether the file changed; any `true` must be
    /// followed by a restart of the host network service.
    ///
    /// # Errors
    /// Returns an IO error when the directory cannot be created or the file
    /// cannot be written.
    pub fn write(
        &self,
        name: &str,
        ipv4: &Ipv4Config,
        mac: Option<&str>,
        ifname: Option<&str>,
        metric: u32,
        dhcp_server: bool,
    ) -> io::Result<bool> {
        fs::create_dir_all(&self.dir)?;

        let content = render(ipv4, mac, ifname, metric, dhcp_server);
        write_if_changed(&self.file(name), &content)
    }

    /// Delete the file; returns whether it existed.
    pub fn remove(&self, name: &str) -> bool {
        fs::remove_file(self.file(name)).is_ok()
    }
}

fn render(
    ipv4: &Ipv4Config,
    mac: Option<&str>,
    ifname: Option<&str>,
    metric: u32,
    dhcp_server: bool,
) -> String {
    let mut content = String::new();
    content.push_str("[Match]\n");
    if let Some(mac) = mac {
        content.push_str(&format!("MACAddress={mac}\n"));
    }
    if let Some(ifname) = ifname {
        content.push_str(&format!("Name={ifname}\n"));
    }

    content.push_str("[Network]\n");
    if ipv4.dhcp {
        content.push_str("DHCP=ipv4\n");
        content.push_str("[DHCP]\n");
        content.push_str(&format!("RouteMetric={metric}\n"));
    } else {
        let ip = ipv4.ip.as_deref().unwrap_or(DEFAULT_STATIC_IP);
        let mask = ipv4.netmask.as_deref().unwrap_or(DEFAULT_NETMASK);
        content.push_str(&format!("Address={ip}/{}\n", mask2prefix(mask)));
        content.push_str(&format!("Metric={metric}\n"));
        if let Some(gw) = &ipv4.gw {
            content.push_str(&format!("Gateway={gw}\n"));
        }
        if let Some(dns) = &ipv4.dns {
            for server in dns {
                content.push_str(&format!("DNS={server}\n"));
            }
        }
    }

    if dhcp_server {
        content.push_str("DHCPServer=yes\n");
    }

    content
}

/// Write content to the file only when it differs; returns whether the
/// file was written.
///
/// # Errors
/// Returns an IO error when the file cannot be written.
pub fn write_if_changed(path: &Path, content: &str) -> io::Result<bool> {
    if let Ok(existing) = fs::read_to_string(path) {
        if existing == content {
            return Ok(false);
        }
    }
    fs::write(path, content)?;
    Ok(true)
}

/// Prefix length from a dotted netmask; parse failures default to 24.
pub fn mask2prefix(mask: &str) -> u32 {
    let octets: Option<Vec<u8>> = mask.split('.').map(|o| o.parse().ok()).collect();
    match octets {
        Some(octets) if octets.len() == 4 => octets.iter().map(|o| o.count_ones()).sum(),
        _ => 24,
    }
}

/// Dotted netmask from a prefix length.
pub fn prefix2mask(prefix: u32) -> String {
    let prefix = prefix.min(32);
    let mask: u32 = if prefix == 0 {
        0
    } else {
        u32::MAX << (32 - prefix)
    };
    format!(
        "{}.{}.{}.{}",
        (mask >> 24) & 0xff,
        (mask >> 16) & 0xff,
        (mask >> 8) & 0xff,
        mask & 0xff
    )
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use tempfile::TempDir;

    use super::*;

    fn dhcp_cfg() -> Ipv4Config {
        Ipv4Config {
            dhcp: true,
            ..Ipv4Config::default()
        }
    }

    #[test]
    fn dhcp_content() {
        let dir = TempDir::new().unwrap();
        let writer = NetworkdWriter::new(dir.path().to_path_buf());

        let changed = writer
            .write("lan", &dhcp_cfg(), Some("aa:bb:cc:dd:ee:ff"), None, 1024, false)
            .unwrap();
        assert!(changed);

        let content = fs::read_to_string(dir.path().join("netconnect_lan.network")).unwrap();
        assert_eq!(
            content,
            "[Match]\nMACAddress=aa:bb:cc:dd:ee:ff\n[Network]\nDHCP=ipv4\n[DHCP]\nRouteMetric=1024\n"
        );
    }

    #[test]
    fn static_content_with_gateway_and_dns() {
        let dir = TempDir::new().unwrap();
        let writer = NetworkdWriter::new(dir.path().to_path_buf());

        let cfg = Ipv4Config {
            dhcp: false,
            ip: Some("192.168.1.10".into()),
            netmask: Some("255.255.255.0".into()),
            gw: Some("192.168.1.1".into()),
            dns: Some(vec!["1.1.1.1".into(), "8.8.8.8".into()]),
        };
        writer
            .write("wifi_ap", &cfg, None, Some("wlan0"), DEFAULT_METRIC, true)
            .unwrap();

        let content = fs::read_to_string(dir.path().join("netconnect_wifi_ap.network")).unwrap();
        assert_eq!(
            content,
            "[Match]\nName=wlan0\n[Network]\nAddress=192.168.1.10/24\nMetric=128\n\
             Gateway=192.168.1.1\nDNS=1.1.1.1\nDNS=8.8.8.8\nDHCPServer=yes\n"
        );
    }

    #[test]
    fn rewrite_only_on_change() {
        let dir = TempDir::new().unwrap();
        let writer = NetworkdWriter::new(dir.path().to_path_buf());

        assert!(writer.write("lan", &dhcp_cfg(), None, None, 1024, false).unwrap());
        assert!(!writer.write("lan", &dhcp_cfg(), None, None, 1024, false).unwrap());
        assert!(writer.write("lan", &dhcp_cfg(), None, None, 512, false).unwrap());
    }

    #[test]
    fn remove_reports_existence() {
        let dir = TempDir::new().unwrap();
        let writer = NetworkdWriter::new(dir.path().to_path_buf());

        assert!(!writer.remove("lan"));
        writer.write("lan", &dhcp_cfg(), None, None, 1024, false).unwrap();
        assert!(writer.remove("lan"));
        assert!(!dir.path().join("netconnect_lan.network").exists());
    }

    #[test]
    fn mask_prefix_roundtrip() {
        for prefix in 0..=32 {
            assert_eq!(mask2prefix(&prefix2mask(prefix)), prefix);
        }
    }

    #[test]
    fn bad_mask_defaults_to_24() {
        assert_eq!(mask2prefix("garbage"), 24);
        assert_eq!(mask2prefix("255.255"), 24);
    }
}

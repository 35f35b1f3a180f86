//! Daemon configuration.
//!
//! Every filesystem path and tunable the daemon touches lives in a single
//! [`Settings`] record handed to components at construction time. Defaults
//! match a stock embedded deployment; a TOML file can override any field.

use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::core::{NetconnectError, Result};

/// Daemon-wide paths and tunables.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Settings {
    /// Directory for generated declarative network files.
    pub networkd_dir: PathBuf,
    /// Managed resolv.conf location.
    pub resolv_conf: PathBuf,
    /// Request/reply endpoint socket.
    pub socket_path: PathBuf,
    /// Host used by the online probe.
    pub test_host: String,
    /// Seconds between online probes while online.
    pub check_online_period: u64,
    /// Generated wpa_supplicant configuration file.
    pub wpa_supplicant_conf: PathBuf,
    /// wpa_supplicant control socket directory.
    pub wpa_supplicant_ctrl: PathBuf,
    /// Generated hostapd configuration file.
    pub hostapd_conf: PathBuf,
    /// Generated PPP chat script.
    pub chatscript: PathBuf,
    /// PPP dialer output log.
    pub ppp_log: PathBuf,
    /// pppd binary.
    pub pppd_bin: PathBuf,
    /// chat binary.
    pub chat_bin: PathBuf,
    /// wpa_supplicant binary.
    pub wpa_supplicant_bin: PathBuf,
    /// wpa_cli binary.
    pub wpa_cli_bin: PathBuf,
    /// hostapd binary.
    pub hostapd_bin: PathBuf,
    /// networkctl binary.
    pub networkctl_bin: PathBuf,
    /// fping binary.
    pub fping_bin: PathBuf,
    /// sysfs network class directory.
    pub sys_class_net: PathBuf,
    /// sysfs USB device tree.
    pub sys_usb_devices: PathBuf,
    /// Device node directory for modem ttys.
    pub dev_dir: PathBuf,
    /// Log file directory.
    pub log_dir: PathBuf,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            networkd_dir: "/run/systemd/network".into(),
            resolv_conf: "/run/netconnect/resolv.conf".into(),
            socket_path: "/run/netconnect/netconnect-interface.sock".into(),
            test_host: "www.google.com".into(),
            check_online_period: 1800,
            wpa_supplicant_conf: "/tmp/netconnect_wpa_supplicant.conf".into(),
            wpa_supplicant_ctrl: "/tmp/netconnect_wpa_supplicant.ctrl".into(),
            hostapd_conf: "/tmp/netconnect_hostapd.conf".into(),
            chatscript: "/tmp/gsm-keeper.chat".into(),
            ppp_log: "/tmp/netconnect-pppd.log".into(),
            pppd_bin: "/usr/sbin/pppd".into(),
            chat_bin: "/usr/sbin/chat".into(),
            wpa_supplicant_bin: "/sbin/wpa_supplicant".into(),
            wpa_cli_bin: "/sbin/wpa_cli".into(),
            hostapd_bin: "/usr/sbin/hostapd".into(),
            networkctl_bin: "/bin/networkctl".into(),
            fping_bin: "/usr/bin/fping".into(),
            sys_class_net: "/sys/class/net".into(),
            sys_usb_devices: "/sys/bus/usb/devices".into(),
            dev_dir: "/dev".into(),
            log_dir: "/var/log/netconnect".into(),
        }
    }
}

impl Settings {
    /// Load settings from a TOML file, falling back to defaults for
    /// absent fields.
    ///
    /// # Errors
    /// Returns [`NetconnectError::Config`] if the file cannot be read or
    /// parsed.
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .map_err(|e| NetconnectError::Config(format!("cannot read {}: {e}", path.display())))?;
        toml::from_str(&content)
            .map_err(|e| NetconnectError::Config(format!("cannot parse {}: {e}", path.display())))
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use std::io::Write;

    use super::*;

    #[test]
    fn defaults_match_deployment_paths() {
        let settings = Settings::default();

        assert_eq!(settings.networkd_dir, PathBuf::from("/run/systemd/network"));
        assert_eq!(settings.test_host, "www.google.com");
        assert_eq!(settings.check_online_period, 1800);
    }

    #[test]
    fn load_overrides_selected_fields() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "test_host = \"example.org\"").unwrap();
        writeln!(file, "networkd_dir = \"/tmp/netconnect-test\"").unwrap();

        let settings = Settings::load(file.path()).unwrap();

        assert_eq!(settings.test_host, "example.org");
        assert_eq!(settings.networkd_dir, PathBuf::from("/tmp/netconnect-test"));
        assert_eq!(settings.resolv_conf, Settings::default().resolv_conf);
    }

    #[test]
    fn load_rejects_unknown_fields() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "no_such_field = 1").unwrap();

        assert!(Settings::load(file.path()).is_err());
    }
}

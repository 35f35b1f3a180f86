//! Link configuration and published status types.
//!
//! Field and value spellings match the wire format consumed by the
//! front-end process, so these types serialize directly into replies.

use serde::{Deserialize, Serialize};

/// Error string published when the configured hardware is absent.
pub const NO_DEVICE_DETECTED: &str = "NO_DEVICE_DETECTED";

/// Link kinds the daemon supervises.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LinkKind {
    /// Wired ethernet uplink.
    Lan,
    /// Wi-Fi station uplink.
    WifiClient,
    /// Local Wi-Fi access point.
    WifiAp,
    /// LTE modem over PPP.
    Lte,
}

impl LinkKind {
    /// Wire and file-name spelling of the kind.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Lan => "lan",
            Self::WifiClient => "wifi_client",
            Self::WifiAp => "wifi_ap",
            Self::Lte => "lte",
        }
    }
}

impl std::fmt::Display for LinkKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Connection state of one link.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LinkState {
    /// No reconcile worker is running.
    #[default]
    Inactive,
    /// Worker running, link not up.
    NotConnected,
    /// Configuration applied, waiting for the link to come up.
    Connecting,
    /// Link verified up.
    Connected,
}

/// IPv4 addressing for a link.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct Ipv4Config {
    /// Use DHCP instead of static addressing.
    #[serde(default)]
    pub dhcp: bool,
    /// Static address.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ip: Option<String>,
    /// Static netmask in dotted form.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub netmask: Option<String>,
    /// Static gateway.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gw: Option<String>,
    /// Static DNS servers, in order.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dns: Option<Vec<String>>,
}

/// Wi-Fi station parameters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct WifiClientConfig {
    /// Network name to join.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ssid: Option<String>,
    /// Pre-shared key; tried as WPA-PSK and WEP.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
}

/// Wi-Fi access point parameters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct WifiApConfig {
    /// Network name to announce.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ssid: Option<String>,
    /// 2.4 GHz channel number.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channel: Option<u32>,
    /// WPA passphrase; open network when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
}

/// LTE dial parameters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LteConfig {
    /// Access point name.
    pub apn: String,
    /// Dial string.
    pub number: String,
    /// Authentication user.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,
    /// Authentication password.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
}

/// Configuration asserted for one link.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct LinkConfig {
    /// Bind to this interface name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Bind to the interface with this MAC.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mac: Option<String>,
    /// Bind to the interface at this USB topology position.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usb_port: Option<String>,
    /// IPv4 addressing.
    #[serde(default)]
    pub ipv4: Ipv4Config,
    /// Station parameters, Wi-Fi client links only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub wifi_client: Option<WifiClientConfig>,
    /// AP parameters, Wi-Fi AP links only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub wifi_ap: Option<WifiApConfig>,
    /// Dial parameters, LTE links only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lte: Option<LteConfig>,
}

impl LinkConfig {
    /// Interface selector triple used by the device enumerator.
    pub fn selectors(&self) -> (Option<&str>, Option<&str>, Option<&str>) {
        (
            self.name.as_deref(),
            self.mac.as_deref(),
            self.usb_port.as_deref(),
        )
    }
}

/// Published state of one link, readable concurrently with the worker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Default)]
pub struct LinkStatus {
    /// Connection state.
    pub status: LinkState,
    /// Last error, cleared on recovery.
    pub error: Option<String>,
    /// Currently asserted configuration; absent when disabled.
    pub config: Option<LinkConfig>,
    /// Interface the link is bound to, once located.
    pub ifname: Option<String>,
    /// Name servers learned from the link (LTE only).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dns: Option<Vec<String>>,
}

/// Manager-scope status published next to the per-link records.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ManagerStatus {
    /// Result of the last online probe.
    pub online: bool,
    /// Epoch seconds of the last probe.
    pub last_online_check: u64,
    /// Host the probe resolves and contacts.
    pub test_host: String,
    /// Name servers currently written to resolv.conf.
    pub dns: Vec<String>,
}

/// One network found by a Wi-Fi scan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WifiScanEntry {
    /// Network name; empty for hidden networks.
    pub ssid: String,
    /// Channel (frequency field as reported by the scan).
    pub channel: String,
    /// Whether the network is encrypted.
    pub enc: bool,
    /// Signal level.
    pub signal: i64,
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;

    #[test]
    fn link_state_wire_spelling() {
        assert_eq!(
            serde_json::to_string(&LinkState::NotConnected).unwrap(),
            "\"NOT_CONNECTED\""
        );
        assert_eq!(
            serde_json::to_string(&LinkState::Inactive).unwrap(),
            "\"INACTIVE\""
        );
    }

    #[test]
    fn link_config_from_wire_json() {
        let cfg: LinkConfig = serde_json::from_str(
            r#"{"name": "wlan0",
                "ipv4": {"dhcp": true},
                "wifi_client": {"ssid": "net", "key": "secret12"}}"#,
        )
        .unwrap();

        assert_eq!(cfg.name.as_deref(), Some("wlan0"));
        assert!(cfg.ipv4.dhcp);
        assert_eq!(
            cfg.wifi_client.unwrap().ssid.as_deref(),
            Some("net")
        );
    }

    #[test]
    fn lte_config_requires_apn_and_number() {
        let bad: std::result::Result<LteConfig, _> =
            serde_json::from_str(r#"{"apn": "internet"}"#);
        assert!(bad.is_err());

        let good: LteConfig =
            serde_json::from_str(r#"{"apn": "internet", "number": "*99#"}"#).unwrap();
        assert_eq!(good.user, None);
    }

    #[test]
    fn status_serializes_null_error_and_config() {
        let status = LinkStatus::default();
        let value = serde_json::to_value(&status).unwrap();

        assert_eq!(value["status"], "INACTIVE");
        assert!(value["error"].is_null());
        assert!(value["config"].is_null());
        assert!(value.get("dns").is_none());
    }
}

//! Wi-Fi client supervisor.
//!
//! Drives a private wpa_supplicant instance. The generated configuration
//! lists WPA-PSK, WEP and open network blocks against the same SSID, so
//! whichever scheme the AP accepts wins without the caller declaring one.

mod control;

pub use control::{WifiLinkStatus, WpaControl};

use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;
use tokio::process::{Child, Command};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::config::Settings;
use crate::services::common::types::{
    LinkConfig, LinkKind, LinkState, NO_DEVICE_DETECTED, WifiClientConfig, WifiScanEntry,
};
use crate::services::common::{LinkDriver, LinkShared};
use crate::system::devices::DeviceEnumerator;
use crate::system::networkd::NetworkdWriter;
use crate::system::{netlink, networkd, process, systemd};

const ROUTE_METRIC: u32 = 512;
const LOOP_DELAY: Duration = Duration::from_secs(5);
const SUPPLICANT_KILL_TIMEOUT: Duration = Duration::from_secs(4);

/// Reconcile driver for the Wi-Fi station uplink.
pub struct WifiClientDriver {
    settings: Arc<Settings>,
    enumerator: DeviceEnumerator,
    networkd: NetworkdWriter,
    control: WpaControl,
}

impl WifiClientDriver {
    /// Driver over the configured paths.
    pub fn new(settings: &Arc<Settings>) -> Self {
        Self {
            settings: Arc::clone(settings),
            enumerator: DeviceEnumerator::new(settings),
            networkd: NetworkdWriter::new(settings.networkd_dir.clone()),
            control: WpaControl::new(settings),
        }
    }

    /// Scan for networks on the currently bound interface.
    ///
    /// Without a located interface (or a running supplicant) the result is
    /// empty.
    pub async fn scan(&self, link: &LinkShared) -> Vec<WifiScanEntry> {
        match link.snapshot().ifname {
            Some(ifname) => self.control.scan(&ifname).await,
            None => Vec::new(),
        }
    }

    fn write_supplicant_conf(&self, cfg: Option<&WifiClientConfig>) -> std::io::Result<bool> {
        let content = supplicant_conf(cfg, &self.settings.wpa_supplicant_ctrl);
        networkd::write_if_changed(&self.settings.wpa_supplicant_conf, &content)
    }

    fn spawn_supplicant(&self, ifname: &str) -> std::io::Result<Child> {
        Command::new(&self.settings.wpa_supplicant_bin)
            .arg("-Dwext")
            .arg("-i")
            .arg(ifname)
            .arg("-c")
            .arg(&self.settings.wpa_supplicant_conf)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
    }
}

#[async_trait]
impl LinkDriver for WifiClientDriver {
    fn kind(&self) -> LinkKind {
        LinkKind::WifiClient
    }

    async fn run(&self, cfg: LinkConfig, link: LinkShared, cancel: CancellationToken) {
        link.update(|s| s.status = LinkState::NotConnected);
        let mut child: Option<Child> = None;
        let mut link_status: Option<WifiLinkStatus> = None;
        let mut error_status: Option<String> = None;

        loop {
            let (name, mac, usb_port) = cfg.selectors();
            match self.enumerator.select(name, mac, usb_port) {
                Some(iface) => {
                    link.update(|s| s.ifname = Some(iface.ifname.clone()));

                    match self.networkd.write(
                        self.kind().as_str(),
                        &cfg.ipv4,
                        Some(&iface.mac),
                        None,
                        ROUTE_METRIC,
                        false,
                    ) {
                        Ok(true) => {
                            link.update(|s| s.status = LinkState::Connecting);
                            systemd::restart_networkd().await;
                            info!(
                                "Created network configuration for {} ({})",
                                iface.ifname, iface.mac
                            );
                        }
                        Ok(false) => {}
                        Err(e) => warn!("Cannot write network configuration: {e}"),
                    }

                    match self.write_supplicant_conf(cfg.wifi_client.as_ref()) {
                        Ok(true) => {
                            link.update(|s| s.status = LinkState::Connecting);
                            info!(
                                "Created wpa_supplicant configuration: {}",
                                self.settings.wpa_supplicant_conf.display()
                            );
                        }
                        Ok(false) => {}
                        Err(e) => warn!("Cannot write wpa_supplicant configuration: {e}"),
                    }

                    if child.is_none() {
                        link.update(|s| s.status = LinkState::Connecting);
                        info!("Starting wpa_supplicant");
                        process::terminate_by_name_wait("wpa_supplicant", SUPPLICANT_KILL_TIMEOUT)
                            .await;
                        match self.spawn_supplicant(&iface.ifname) {
                            Ok(spawned) => child = Some(spawned),
                            Err(e) => warn!("Cannot start wpa_supplicant: {e}"),
                        }
                    }

                    if let Some(status) = self.control.status(&iface.ifname).await {
                        if status.status == "COMPLETED" {
                            link.update(|s| s.status = LinkState::Connected);
                        }
                    }

                    link.update(|s| s.error = None);
                }
                None => {
                    link.update(|s| {
                        s.error = Some(NO_DEVICE_DETECTED.to_string());
                        s.ifname = None;
                    });

                    if self.networkd.remove(self.kind().as_str()) {
                        systemd::restart_networkd().await;
                        info!("Removed network configuration");
                        link.signal();
                    }

                    if let Some(mut spawned) = child.take() {
                        info!("Terminating wpa_supplicant process");
                        process::terminate_child(&mut spawned).await;
                    }
                }
            }

            if let Some(spawned) = child.as_mut() {
                if matches!(spawned.try_wait(), Ok(Some(_))) {
                    // supplicant died underneath us; respawn next iteration
                    link.update(|s| s.status = LinkState::NotConnected);
                    child = None;
                }
            }

            if let Some(ifname) = link.snapshot().ifname {
                if let Some(current) = self.control.status(&ifname).await {
                    if link_status.as_ref() != Some(&current) {
                        let previous = link_status.as_ref().map(|s| s.status.as_str());
                        if previous != Some(current.status.as_str()) {
                            info!(
                                "Status: {} <{}> ({} dbm)",
                                current.status, current.ssid, current.rssi
                            );
                        }
                        if current.status == "COMPLETED" && previous != Some("COMPLETED") {
                            link.signal();
                        }
                        if current.status != "COMPLETED" && previous == Some("COMPLETED") {
                            link.signal();
                        }
                        link_status = Some(current);
                    }
                }
            }

            let error = link.snapshot().error;
            if error_status != error {
                if let Some(error) = &error {
                    info!("Error: {error}");
                }
                error_status = error;
            }

            tokio::select! {
                () = cancel.cancelled() => return,
                () = tokio::time::sleep(LOOP_DELAY) => {}
            }
        }
    }

    async fn clean(&self, link: &LinkShared) {
        if self.networkd.remove(self.kind().as_str()) {
            systemd::restart_networkd().await;
        }
        process::terminate_by_name_wait("wpa_supplicant", SUPPLICANT_KILL_TIMEOUT).await;
        if let Some(ifname) = link.snapshot().ifname {
            netlink::iface_down(&ifname).await;
        }
    }

    async fn info(&self, link: &LinkShared) -> serde_json::Value {
        let snapshot = link.snapshot();
        let (address, ifstate, wireless) = match &snapshot.ifname {
            Some(name) => (
                netlink::address(name).await,
                netlink::operstate(name).await,
                self.control.status(name).await,
            ),
            None => (None, None, None),
        };

        json!({
            "status": snapshot.status,
            "wireless_status": wireless.map(|w| json!({
                "status": w.status,
                "ssid": w.ssid,
                "rssi": w.rssi,
            })),
            "address": address,
            "ifstate": ifstate,
            "ifname": snapshot.ifname,
        })
    }
}

/// Render the three-block supplicant configuration.
///
/// WPA keys shorter than eight characters are replaced with a dummy so the
/// supplicant still parses the file and the WEP/open blocks stay usable.
fn supplicant_conf(cfg: Option<&WifiClientConfig>, ctrl: &std::path::Path) -> String {
    let empty = WifiClientConfig::default();
    let cfg = cfg.unwrap_or(&empty);

    let ssid = cfg.ssid.as_deref().unwrap_or("UNKNOWN");
    let wep = cfg.key.as_deref().unwrap_or("UNKNOWN");
    let mut wpa = wep;
    if wpa.len() < 8 {
        wpa = "dummy123";
    }

    format!(
        "\n\
         # WPA/WPA2\n\
         network={{\n\
         \x20   ssid=\"{ssid}\"\n\
         \x20   key_mgmt=WPA-PSK\n\
         \x20   psk=\"{wpa}\"\n\
         }}\n\
         # WEP\n\
         network={{\n\
         \x20   ssid=\"{ssid}\"\n\
         \x20   key_mgmt=NONE\n\
         \x20   wep_key0=\"{wep}\"\n\
         \x20   wep_tx_keyidx=0\n\
         }}\n\
         #OPEN\n\
         network={{\n\
         \x20   ssid=\"{ssid}\"\n\
         \x20   key_mgmt=NONE\n\
         }}\n\
         ctrl_interface={}\n",
        ctrl.display()
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn supplicant_conf_lists_three_network_blocks() {
        let cfg = WifiClientConfig {
            ssid: Some("MyNet".into()),
            key: Some("longenough".into()),
        };

        let conf = supplicant_conf(Some(&cfg), std::path::Path::new("/tmp/ctrl"));

        assert_eq!(conf.matches("network={").count(), 3);
        assert_eq!(conf.matches("ssid=\"MyNet\"").count(), 3);
        assert!(conf.contains("psk=\"longenough\""));
        assert!(conf.contains("wep_key0=\"longenough\""));
        let wpa_pos = conf.find("key_mgmt=WPA-PSK");
        let wep_pos = conf.find("wep_key0");
        let ctrl_pos = conf.find("ctrl_interface=/tmp/ctrl");
        assert!(wpa_pos < wep_pos && wep_pos < ctrl_pos);
    }

    #[test]
    fn short_wpa_key_is_padded_with_dummy() {
        let cfg = WifiClientConfig {
            ssid: Some("X".into()),
            key: Some("bad".into()),
        };

        let conf = supplicant_conf(Some(&cfg), std::path::Path::new("/tmp/ctrl"));

        assert!(conf.contains("psk=\"dummy123\""));
        assert!(conf.contains("wep_key0=\"bad\""));
    }

    #[test]
    fn missing_config_falls_back_to_placeholders() {
        let conf = supplicant_conf(None, std::path::Path::new("/tmp/ctrl"));

        assert!(conf.contains("ssid=\"UNKNOWN\""));
        assert!(conf.contains("psk=\"dummy123\""));
    }
}

//! Wi-Fi access point supervisor.
//!
//! Runs hostapd against a generated configuration. The declarative file
//! also turns on the DHCP server so stations get leases from this box.

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
    LinkConfig, LinkKind, LinkState, NO_DEVICE_DETECTED, WifiApConfig,
};
use crate::services::common::{LinkDriver, LinkShared};
use crate::system::devices::{DeviceEnumerator, SelectedIface};
use crate::system::networkd::{DEFAULT_METRIC, NetworkdWriter};
use crate::system::{netlink, networkd, process, systemd};

const LOOP_DELAY: Duration = Duration::from_secs(5);
const HOSTAPD_KILL_TIMEOUT: Duration = Duration::from_secs(4);
/// hostapd exits within this window when the configuration is unusable.
const STARTUP_GRACE: Duration = Duration::from_secs(1);

/// Reconcile driver for the local access point.
pub struct WifiApDriver {
    settings: Arc<Settings>,
    enumerator: DeviceEnumerator,
    networkd: NetworkdWriter,
}

impl WifiApDriver {
    /// Driver over the configured paths.
    pub fn new(settings: &Arc<Settings>) -> Self {
        Self {
            settings: Arc::clone(settings),
            enumerator: DeviceEnumerator::new(settings),
            networkd: NetworkdWriter::new(settings.networkd_dir.clone()),
        }
    }

    fn write_hostapd_conf(&self, ifname: &str, cfg: Option<&WifiApConfig>) -> std::io::Result<bool> {
        let content = hostapd_conf(ifname, cfg);
        networkd::write_if_changed(&self.settings.hostapd_conf, &content)
    }

    fn spawn_hostapd(&self) -> std::io::Result<Child> {
        Command::new(&self.settings.hostapd_bin)
            .arg(&self.settings.hostapd_conf)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
    }
}

#[async_trait]
impl LinkDriver for WifiApDriver {
    fn kind(&self) -> LinkKind {
        LinkKind::WifiAp
    }

    async fn run(&self, cfg: LinkConfig, link: LinkShared, cancel: CancellationToken) {
        link.update(|s| s.status = LinkState::NotConnected);
        let mut child: Option<Child> = None;
        let mut iface: Option<SelectedIface> = None;

        loop {
            // hostapd holds the interface; only re-locate while not up
            if link.snapshot().status != LinkState::Connected {
                let (name, mac, usb_port) = cfg.selectors();
                iface = self.enumerator.select(name, mac, usb_port);
            }

            match &iface {
                Some(iface) => {
                    link.update(|s| {
                        s.ifname = Some(iface.ifname.clone());
                        s.error = None;
                    });

                    match self.networkd.write(
                        self.kind().as_str(),
                        &cfg.ipv4,
                        Some(&iface.mac),
                        None,
                        DEFAULT_METRIC,
                        true,
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

                    match self.write_hostapd_conf(&iface.ifname, cfg.wifi_ap.as_ref()) {
                        Ok(true) => {
                            link.update(|s| s.status = LinkState::Connecting);
                            info!(
                                "Created hostapd configuration: {}",
                                self.settings.hostapd_conf.display()
                            );
                        }
                        Ok(false) => {}
                        Err(e) => warn!("Cannot write hostapd configuration: {e}"),
                    }

                    if child.is_none() {
                        link.update(|s| s.status = LinkState::Connecting);
                        process::terminate_by_name_wait("hostapd", HOSTAPD_KILL_TIMEOUT).await;
                        match self.spawn_hostapd() {
                            Ok(spawned) => child = Some(spawned),
                            Err(e) => warn!("Cannot start hostapd: {e}"),
                        }
                    }

                    tokio::time::sleep(STARTUP_GRACE).await;
                    if let Some(spawned) = child.as_mut() {
                        if matches!(spawned.try_wait(), Ok(None)) {
                            link.update(|s| s.status = LinkState::Connected);
                        }
                    }
                }
                None => {
                    link.update(|s| {
                        s.error = Some(NO_DEVICE_DETECTED.to_string());
                        s.ifname = None;
                    });

                    if self.networkd.remove(self.kind().as_str()) {
                        systemd::restart_networkd().await;
                        info!("Removed network configuration");
                    }

                    if let Some(mut spawned) = child.take() {
                        info!("Terminating hostapd process");
                        process::terminate_child(&mut spawned).await;
                    }
                }
            }

            if let Some(spawned) = child.as_mut() {
                if matches!(spawned.try_wait(), Ok(Some(_))) {
                    // hostapd died; respawn next iteration
                    link.update(|s| s.status = LinkState::NotConnected);
                    child = None;
                }
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
        process::terminate_by_name_wait("hostapd", HOSTAPD_KILL_TIMEOUT).await;
        if let Some(ifname) = link.snapshot().ifname {
            netlink::iface_down(&ifname).await;
        }
    }

    async fn info(&self, link: &LinkShared) -> serde_json::Value {
        let snapshot = link.snapshot();
        let (address, ifstate) = match &snapshot.ifname {
            Some(name) => (netlink::address(name).await, netlink::operstate(name).await),
            None => (None, None),
        };

        json!({
            "status": snapshot.status,
            "address": address,
            "ifstate": ifstate,
            "ifname": snapshot.ifname,
        })
    }
}

/// Render the hostapd configuration for the given interface.
fn hostapd_conf(ifname: &str, cfg: Option<&WifiApConfig>) -> String {
    let empty = WifiApConfig::default();
    let cfg = cfg.unwrap_or(&empty);

    let ssid = cfg.ssid.as_deref().unwrap_or("NetconnectAP");
    let channel = cfg.channel.unwrap_or(5);

    let mut content = format!(
        "\ninterface={ifname}\nieee80211n=1\nhw_mode=g\nssid={ssid}\nchannel={channel}\n"
    );
    if let Some(key) = &cfg.key {
        content.push_str(&format!(
            "\nwpa=1\nwpa_passphrase={key}\nwpa_key_mgmt=WPA-PSK\nwpa_pairwise=TKIP CCMP\n"
        ));
    }
    content
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn open_ap_has_no_wpa_block() {
        let cfg = WifiApConfig {
            ssid: Some("TestAP".into()),
            channel: Some(11),
            key: None,
        };

        let conf = hostapd_conf("wlan0", Some(&cfg));

        assert!(conf.contains("interface=wlan0\n"));
        assert!(conf.contains("ssid=TestAP\n"));
        assert!(conf.contains("channel=11\n"));
        assert!(!conf.contains("wpa="));
    }

    #[test]
    fn keyed_ap_appends_wpa_block() {
        let cfg = WifiApConfig {
            ssid: Some("TestAP".into()),
            channel: None,
            key: Some("passphrase".into()),
        };

        let conf = hostapd_conf("wlan0", Some(&cfg));

        assert!(conf.contains("channel=5\n"));
        assert!(conf.contains("wpa=1\n"));
        assert!(conf.contains("wpa_passphrase=passphrase\n"));
        assert!(conf.contains("wpa_pairwise=TKIP CCMP\n"));
    }

    #[test]
    fn defaults_without_config() {
        let conf = hostapd_conf("wlan1", None);

        assert!(conf.contains("ssid=NetconnectAP\n"));
        assert!(conf.contains("channel=5\n"));
    }
}

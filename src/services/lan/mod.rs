//! Wired LAN supervisor.
//!
//! The simplest reconcile loop: locate the configured interface, keep its
//! declarative file current, and report CONNECTED while the kernel says the
//! link is operationally up.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::config::Settings;
use crate::services::common::types::{
    LinkConfig, LinkKind, LinkState, LinkStatus, NO_DEVICE_DETECTED,
};
use crate::services::common::{LinkDriver, LinkShared};
use crate::system::devices::DeviceEnumerator;
use crate::system::networkd::NetworkdWriter;
use crate::system::{netlink, systemd};

const ROUTE_METRIC: u32 = 1024;
const LOOP_DELAY: Duration = Duration::from_secs(5);

/// Reconcile driver for the wired uplink.
pub struct LanDriver {
    enumerator: DeviceEnumerator,
    networkd: NetworkdWriter,
}

impl LanDriver {
    /// Driver over the configured sysfs roots and networkd directory.
    pub fn new(settings: &Arc<Settings>) -> Self {
        Self {
            enumerator: DeviceEnumerator::new(settings),
            networkd: NetworkdWriter::new(settings.networkd_dir.clone()),
        }
    }
}

#[async_trait]
impl LinkDriver for LanDriver {
    fn kind(&self) -> LinkKind {
        LinkKind::Lan
    }

    async fn run(&self, cfg: LinkConfig, link: LinkShared, cancel: CancellationToken) {
        link.update(|s| s.status = LinkState::NotConnected);
        let mut operstate: Option<String> = None;

        loop {
            let (name, mac, usb_port) = cfg.selectors();
            match self.enumerator.select(name, mac, usb_port) {
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
                        Err(e) => link.update(|s| s.error = Some(e.to_string())),
                    }

                    if netlink::operstate(&iface.ifname).await.as_deref() == Some("UP") {
                        link.update(|s| s.status = LinkState::Connected);
                    }
                }
                None => {
                    link.update(|s| {
                        s.error = Some(NO_DEVICE_DETECTED.to_string());
                        s.ifname = None;
                        if s.status == LinkState::Connected {
                            s.status = LinkState::NotConnected;
                        }
                    });

                    if self.networkd.remove(self.kind().as_str()) {
                        systemd::restart_networkd().await;
                        info!("Removed network configuration");
                        link.signal();
                    }
                }
            }

            let current = match link.snapshot().ifname {
                Some(ifname) => netlink::operstate(&ifname).await,
                None => None,
            };
            if current.as_deref() == Some("UP") && operstate.as_deref() != Some("UP") {
                info!("Link UP");
                link.signal();
            }
            if current.as_deref() != Some("UP") && operstate.as_deref() == Some("UP") {
                info!("Link DOWN");
                link.signal();
            }
            operstate = current;

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
        if let Some(ifname) = link.snapshot().ifname {
            netlink::iface_down(&ifname).await;
        }
    }

    async fn info(&self, link: &LinkShared) -> serde_json::Value {
        let LinkStatus { status, ifname, .. } = link.snapshot();
        let (address, ifstate) = match &ifname {
            Some(name) => (netlink::address(name).await, netlink::operstate(name).await),
            None => (None, None),
        };

        json!({
            "status": status,
            "address": address,
            "ifstate": ifstate,
            "ifname": ifname,
        })
    }
}

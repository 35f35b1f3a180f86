//! Connection manager.
//!
//! Owns one supervisor per link kind, arbitrates DNS for the current
//! default route, runs the online probe and dispatches the request/reply
//! operations.

/// Online reachability probe.
pub mod probe;
/// Managed resolv.conf writer.
pub mod resolv;

use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use serde_json::{Value, json};
use tokio::sync::Notify;
use tokio::time::Instant;
use tracing::{error, info};

use crate::config::Settings;
use crate::ipc::server::Dispatch;
use crate::services::common::Property;
use crate::services::common::Supervisor;
use crate::services::common::types::{LinkConfig, ManagerStatus, WifiScanEntry};
use crate::services::lan::LanDriver;
use crate::services::lte::LteDriver;
use crate::services::wifi_ap::WifiApDriver;
use crate::services::wifi_client::WifiClientDriver;
use crate::system::devices::{DeviceEnumerator, InterfaceRecord};
use crate::system::{netlink, systemd};

/// Name servers used when nothing better is known.
pub const FALLBACK_DNS: [&str; 2] = ["8.8.8.8", "8.8.4.4"];

const LOOP_TICK: Duration = Duration::from_secs(1);
const EVENT_WAIT: Duration = Duration::from_secs(10);

/// Aggregates the link supervisors and the manager-scope state.
pub struct ConnectionManager {
    settings: Arc<Settings>,
    lan: Supervisor<LanDriver>,
    wifi_client: Supervisor<WifiClientDriver>,
    wifi_ap: Supervisor<WifiApDriver>,
    lte: Supervisor<LteDriver>,
    ncstatus: Property<ManagerStatus>,
    conn_event: Arc<Notify>,
    enumerator: DeviceEnumerator,
}

impl ConnectionManager {
    /// Build the supervisors and start the manager loop.
    pub fn new(settings: Arc<Settings>) -> Arc<Self> {
        let conn_event = Arc::new(Notify::new());

        let manager = Arc::new(Self {
            lan: Supervisor::new(LanDriver::new(&settings), Arc::clone(&conn_event)),
            wifi_client: Supervisor::new(
                WifiClientDriver::new(&settings),
                Arc::clone(&conn_event),
            ),
            wifi_ap: Supervisor::new(WifiApDriver::new(&settings), Arc::clone(&conn_event)),
            lte: Supervisor::new(LteDriver::new(&settings), Arc::clone(&conn_event)),
            ncstatus: Property::new(ManagerStatus {
                online: false,
                last_online_check: epoch_secs(),
                test_host: settings.test_host.clone(),
                dns: Vec::new(),
            }),
            conn_event,
            enumerator: DeviceEnumerator::new(&settings),
            settings,
        });

        tokio::spawn(Arc::clone(&manager).run_loop());
        manager
    }

    async fn run_loop(self: Arc<Self>) {
        let period = Duration::from_secs(self.settings.check_online_period);
        // empty = probe as soon as a default route appears
        let mut last_ok: Option<Instant> = None;

        loop {
            tokio::time::sleep(LOOP_TICK).await;

            let dns = self.set_nameservers().await;
            self.ncstatus.update(|s| s.dns = dns);

            if netlink::default_route().await.ifname.is_none() {
                // no default route, we cannot be online anyway
                self.ncstatus.update(|s| s.online = false);
                continue;
            }

            let event_fired = tokio::time::timeout(EVENT_WAIT, self.conn_event.notified())
                .await
                .is_ok();
            if event_fired {
                last_ok = None;
            }

            let due = match last_ok {
                None => true,
                Some(t) => t.elapsed() >= period,
            };
            if !due {
                continue;
            }

            let test_host = self.ncstatus.get().test_host;
            let online = probe::test_online(&test_host, &self.settings.fping_bin).await;
            match (online, last_ok.is_some()) {
                (true, false) => info!("Online"),
                (false, true) => info!("Offline"),
                _ => {}
            }
            last_ok = online.then(Instant::now);
            self.ncstatus.update(|s| {
                s.online = online;
                s.last_online_check = epoch_secs();
            });
        }
    }

    /// Recompute name servers for the current default route, write them to
    /// resolv.conf, and return them.
    async fn set_nameservers(&self) -> Vec<String> {
        let gw = netlink::default_route().await;

        let chosen = match &gw.ifname {
            None => fallback_dns(),
            Some(ifname) if ifname.starts_with("ppp") => {
                choose_ppp_dns(self.lte.status().dns)
            }
            Some(ifname) => {
                choose_iface_dns(
                    systemd::networkctl_dns(&self.settings.networkctl_bin, ifname).await,
                )
            }
        };

        self.write_dns(&chosen);
        chosen
    }

    fn write_dns(&self, dns: &[String]) {
        match resolv::write_resolvconf(&self.settings.resolv_conf, dns) {
            Ok(true) => info!(
                "New nameservers set in {}: {dns:?}",
                self.settings.resolv_conf.display()
            ),
            Ok(false) => {}
            Err(e) => error!("Cannot set nameservers {dns:?}: {e}"),
        }
    }

    /// Forward each present sub-configuration to its supervisor; an
    /// explicit `null` disables the link.
    ///
    /// # Errors
    /// Returns a message when the envelope or a sub-configuration does not
    /// parse; supervisors already reconfigured keep their new state.
    pub async fn connect(&self, config: &Value) -> Result<(), String> {
        let object = config
            .as_object()
            .ok_or_else(|| "Configuration must be an object".to_string())?;

        if let Some(cfg) = parse_link(object.get("lte"))? {
            self.lte.connect(cfg).await;
        }
        if let Some(cfg) = parse_link(object.get("wifi_client"))? {
            self.wifi_client.connect(cfg).await;
        }
        if let Some(cfg) = parse_link(object.get("wifi_ap"))? {
            self.wifi_ap.connect(cfg).await;
        }
        if let Some(cfg) = parse_link(object.get("lan"))? {
            self.lan.connect(cfg).await;
        }
        Ok(())
    }

    /// Aggregate link statuses, manager status and the default route.
    pub async fn status(&self) -> Value {
        json!({
            "lte": self.lte.status(),
            "wifi_client": self.wifi_client.status(),
            "wifi_ap": self.wifi_ap.status(),
            "lan": self.lan.status(),
            "ncstatus": self.ncstatus.get(),
            "gw": netlink::default_route().await,
        })
    }

    /// Live info for one link kind; `None` for unknown kinds.
    pub async fn connection_info(&self, kind: &str) -> Option<Value> {
        match kind {
            "lte" => Some(self.lte.info().await),
            "wifi_client" => Some(self.wifi_client.info().await),
            "wifi_ap" => Some(self.wifi_ap.info().await),
            "lan" => Some(self.lan.info().await),
            _ => None,
        }
    }

    /// Scan for Wi-Fi networks via the client supervisor.
    pub async fn wifi_scan(&self) -> Vec<WifiScanEntry> {
        self.wifi_client
            .driver()
            .scan(self.wifi_client.shared())
            .await
    }

    /// Currently enumerable network interfaces.
    pub fn interfaces(&self) -> Vec<InterfaceRecord> {
        self.enumerator.interfaces()
    }

    /// Ask the manager loop to re-probe online status at once.
    pub fn online_check(&self) {
        self.conn_event.notify_one();
    }

    /// Update manager-scope configuration. Absent fields stay unchanged.
    pub fn config(&self, config: &Value) {
        if let Some(test_host) = config.get("test_host").and_then(Value::as_str) {
            self.ncstatus
                .update(|s| s.test_host = test_host.to_string());
        }
    }
}

#[async_trait]
impl Dispatch for ConnectionManager {
    async fn dispatch(&self, func: &str, params: &[Value]) -> Result<Value, String> {
        match func {
            "echo" => match params {
                [a, b] => Ok(json!([a, b])),
                _ => Err("echo expects two parameters".to_string()),
            },
            "status" => Ok(self.status().await),
            "connect" => {
                let config = params.first().ok_or("connect expects a configuration")?;
                self.connect(config).await?;
                Ok(json!({}))
            }
            "connection_info" => {
                let kind = params
                    .first()
                    .and_then(Value::as_str)
                    .ok_or("connection_info expects a connection name")?;
                self.connection_info(kind)
                    .await
                    .ok_or_else(|| format!("Unknown connection {kind}"))
            }
            "wifi_scan" => Ok(json!(self.wifi_scan().await)),
            "interfaces" => Ok(json!(self.interfaces())),
            "online_check" => {
                self.online_check();
                Ok(json!({}))
            }
            "config" => {
                let config = params.first().ok_or("config expects a configuration")?;
                self.config(config);
                Ok(json!({}))
            }
            _ => Err(format!("Function {func} is not implemented.")),
        }
    }
}

fn parse_link(value: Option<&Value>) -> Result<Option<Option<LinkConfig>>, String> {
    match value {
        None => Ok(None),
        Some(Value::Null) => Ok(Some(None)),
        Some(value) => serde_json::from_value(value.clone())
            .map(|cfg| Some(Some(cfg)))
            .map_err(|e| format!("Invalid link configuration: {e}")),
    }
}

fn fallback_dns() -> Vec<String> {
    FALLBACK_DNS.iter().map(|s| (*s).to_string()).collect()
}

/// DNS for a PPP default route: what the LTE link negotiated, else the
/// fallback list.
fn choose_ppp_dns(lte_dns: Option<Vec<String>>) -> Vec<String> {
    match lte_dns {
        Some(dns) if !dns.is_empty() => dns,
        _ => fallback_dns(),
    }
}

/// DNS for an ordinary default route: what the host network service
/// reports, else the fallback list.
fn choose_iface_dns(reported: Option<Vec<String>>) -> Vec<String> {
    match reported {
        Some(dns) if !dns.is_empty() => dns,
        _ => fallback_dns(),
    }
}

fn epoch_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;

    #[test]
    fn ppp_route_prefers_link_dns() {
        let lte = vec!["10.11.12.13".to_string()];

        assert_eq!(choose_ppp_dns(Some(lte.clone())), lte);
        assert_eq!(choose_ppp_dns(Some(Vec::new())), fallback_dns());
        assert_eq!(choose_ppp_dns(None), fallback_dns());
    }

    #[test]
    fn iface_route_prefers_reported_dns() {
        let reported = vec!["192.168.1.1".to_string()];

        assert_eq!(choose_iface_dns(Some(reported.clone())), reported);
        assert_eq!(choose_iface_dns(None), fallback_dns());
    }

    #[test]
    fn fallback_list_is_stable() {
        assert_eq!(fallback_dns(), vec!["8.8.8.8", "8.8.4.4"]);
    }

    #[test]
    fn parse_link_distinguishes_absent_null_and_config() {
        assert_eq!(parse_link(None).unwrap(), None);
        assert_eq!(parse_link(Some(&Value::Null)).unwrap(), Some(None));

        let cfg = parse_link(Some(&json!({"name": "eth0", "ipv4": {"dhcp": true}})))
            .unwrap()
            .unwrap()
            .unwrap();
        assert_eq!(cfg.name.as_deref(), Some("eth0"));

        assert!(parse_link(Some(&json!({"ipv4": {"dhcp": "yes"}}))).is_err());
    }
}

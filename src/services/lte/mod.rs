//! LTE supervisor.
//!
//! Finds the modem among the enumerated USB devices, waits for network
//! registration on the control port, then dials with pppd over the data
//! port. While the link is up the loop polls the PPP session health and
//! falls back to redialing when it degrades.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::config::Settings;
use crate::modem::defs::{self, Modem};
use crate::modem::ppp::{PppError, chat_script, pppd_args};
use crate::modem::{AtModem, PppSession};
use crate::services::common::types::{
    LinkConfig, LinkKind, LinkState, LteConfig, NO_DEVICE_DETECTED,
};
use crate::services::common::{LinkDriver, LinkShared};
use crate::system::devices::DeviceEnumerator;
use crate::system::{netlink, process};

const LOOP_DELAY: Duration = Duration::from_secs(10);
/// Name of the PPP network interface once the link is up.
const PPP_IFNAME: &str = "ppp0";
/// How much pppd output is appended to published errors.
const ERROR_OUTPUT_TAIL: usize = 500;

/// Reconcile driver for the LTE uplink.
pub struct LteDriver {
    settings: Arc<Settings>,
    enumerator: DeviceEnumerator,
    at: AtModem,
}

impl LteDriver {
    /// Driver over the configured paths.
    pub fn new(settings: &Arc<Settings>) -> Self {
        Self {
            settings: Arc::clone(settings),
            enumerator: DeviceEnumerator::new(settings),
            at: AtModem::new(),
        }
    }

    /// The first enumerated modem with a known port layout.
    fn find_modem(&self) -> Option<Modem> {
        self.enumerator
            .interfaces()
            .iter()
            .find(|r| r.ifname.as_deref() == Some("ppp"))
            .and_then(|record| defs::resolve(record, &self.settings.dev_dir))
    }

    async fn dial(&self, lte: &LteConfig, modem: &Modem) -> Result<PppSession, PppError> {
        std::fs::write(
            &self.settings.chatscript,
            chat_script(&lte.apn, &lte.number),
        )?;

        let args = pppd_args(
            &modem.port_data,
            &self.settings.chat_bin,
            &self.settings.chatscript,
            lte.user.as_deref(),
            lte.password.as_deref(),
        );

        // no two pppd instances may share the modem
        process::terminate_by_name("ppp");
        tokio::time::sleep(Duration::from_secs(1)).await;

        PppSession::connect(&self.settings.pppd_bin, &args, &self.settings.ppp_log).await
    }

    async fn log_modem_state(&self, modem: &Modem) {
        info!(
            "Network info: {:?}",
            self.at.network_info(&modem.port_control).await
        );
        info!("Signal: {:?}", self.at.signal(&modem.port_control).await);
    }
}

#[async_trait]
impl LinkDriver for LteDriver {
    fn kind(&self) -> LinkKind {
        LinkKind::Lte
    }

    async fn run(&self, cfg: LinkConfig, link: LinkShared, cancel: CancellationToken) {
        link.update(|s| s.status = LinkState::NotConnected);
        let mut session: Option<PppSession> = None;
        let mut error_status: Option<String> = None;

        loop {
            let mut modem = None;

            if link.snapshot().status != LinkState::Connected {
                link.update(|s| s.ifname = None);
                modem = self.find_modem();

                let registered = match &modem {
                    Some(m) => self.at.registered(&m.port_control).await == Some(true),
                    None => false,
                };

                match (&cfg.lte, &modem) {
                    (Some(lte), Some(m)) if registered => {
                        link.update(|s| s.status = LinkState::Connecting);

                        match self.dial(lte, m).await {
                            Ok(dialed) => {
                                info!("Link layer of LTE connected");
                                self.log_modem_state(m).await;
                                let dns = dialed.dns();
                                link.update(|s| {
                                    s.status = LinkState::Connected;
                                    s.error = None;
                                    s.ifname = Some(PPP_IFNAME.to_string());
                                    s.dns = Some(dns);
                                });
                                link.signal();
                                session = Some(dialed);
                            }
                            Err(e) => {
                                link.update(|s| s.error = Some(dial_error(&e)));
                            }
                        }
                    }
                    (None, _) => {
                        link.update(|s| s.error = Some("Missing lte configuration".to_string()));
                    }
                    _ => {
                        link.update(|s| s.error = Some(NO_DEVICE_DETECTED.to_string()));
                    }
                }
            }

            if link.snapshot().status == LinkState::Connected {
                if let Some(active) = session.as_mut() {
                    match active.connected() {
                        Ok(true) => link.update(|s| s.error = None),
                        Ok(false) => link.update(|s| {
                            s.error = Some("Connection interrupted".to_string());
                            s.status = LinkState::NotConnected;
                        }),
                        Err(e) => {
                            let message = format!("Connection interrupted: {e}");
                            let message = append_output_tail(message, &e);
                            link.update(|s| {
                                s.error = Some(message);
                                s.status = LinkState::NotConnected;
                            });
                        }
                    }
                }
            }

            let error = link.snapshot().error;
            if error_status != error {
                if let Some(error) = &error {
                    info!("Error: {error}");
                    link.signal();
                }
                error_status = error;
                if let Some(m) = &modem {
                    self.log_modem_state(m).await;
                }
            }

            tokio::select! {
                () = cancel.cancelled() => return,
                () = tokio::time::sleep(LOOP_DELAY) => {}
            }
        }
    }

    async fn clean(&self, _link: &LinkShared) {
        process::terminate_by_name("ppp");
    }

    async fn info(&self, link: &LinkShared) -> serde_json::Value {
        let snapshot = link.snapshot();
        let mut result = json!({ "status": snapshot.status });

        let Some(modem) = self.find_modem() else {
            return result;
        };

        let control = &modem.port_control;
        result["modem_signal"] = json!(self.at.signal(control).await);
        result["modem_info"] = json!(self.at.model(control).await);
        result["operator_info"] = json!(self.at.operator(control).await);
        result["network_info"] = json!(self.at.network_info(control).await);
        result["address"] = json!(netlink::address(PPP_IFNAME).await);
        result["ifstate"] = json!(netlink::operstate(PPP_IFNAME).await);
        result["ifname"] = json!(PPP_IFNAME);
        result
    }
}

fn dial_error(error: &PppError) -> String {
    append_output_tail(format!("Cannot connect: {error}"), error)
}

fn append_output_tail(mut message: String, error: &PppError) -> String {
    if let Some(output) = error.output() {
        if !output.is_empty() {
            let mut start = output.len().saturating_sub(ERROR_OUTPUT_TAIL);
            while !output.is_char_boundary(start) {
                start -= 1;
            }
            message.push_str(" pppd output: ");
            message.push_str(&output[start..]);
        }
    }
    message
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dial_error_appends_bounded_output_tail() {
        let error = PppError::Exited {
            code: 8,
            output: "x".repeat(600),
        };

        let message = dial_error(&error);

        assert!(message.starts_with("Cannot connect: Connect script failed"));
        assert!(message.contains(" pppd output: "));
        let tail = message.rsplit("pppd output: ").next().unwrap_or("");
        assert_eq!(tail.len(), ERROR_OUTPUT_TAIL);
    }

    #[test]
    fn spawn_error_has_no_output_tail() {
        let error = PppError::Spawn(std::io::Error::other("missing"));

        let message = dial_error(&error);

        assert_eq!(message, "Cannot connect: cannot spawn pppd: missing");
    }
}

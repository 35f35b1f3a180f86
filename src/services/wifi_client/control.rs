//! wpa_supplicant control-channel access.
//!
//! All control calls go through `wpa_cli` against the daemon-private
//! control socket, serialized behind a mutex and bounded by a one second
//! timeout so a wedged supplicant cannot stall the reconcile loop.

use std::path::PathBuf;
use std::time::Duration;

use tokio::process::Command;
use tokio::sync::Mutex;

use crate::config::Settings;
use crate::services::common::types::WifiScanEntry;

const COMMAND_TIMEOUT: Duration = Duration::from_secs(1);
const SCAN_SETTLE: Duration = Duration::from_secs(3);

/// Link state as reported over the control channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WifiLinkStatus {
    /// `wpa_state` value (`DISCONNECTED`, `SCANNING`, `COMPLETED`, ...).
    pub status: String,
    /// Associated SSID, empty when not associated.
    pub ssid: String,
    /// Signal level in dBm from `signal_poll`.
    pub rssi: i64,
}

impl Default for WifiLinkStatus {
    fn default() -> Self {
        Self {
            status: "DISCONNECTED".to_string(),
            ssid: String::new(),
            rssi: -99,
        }
    }
}

/// Serialized wpa_cli access.
#[derive(Debug)]
pub struct WpaControl {
    cli: PathBuf,
    ctrl: PathBuf,
    lock: Mutex<()>,
}

impl WpaControl {
    /// Control handle over the configured wpa_cli binary and socket.
    pub fn new(settings: &Settings) -> Self {
        Self {
            cli: settings.wpa_cli_bin.clone(),
            ctrl: settings.wpa_supplicant_ctrl.clone(),
            lock: Mutex::new(()),
        }
    }

    /// Run one wpa_cli command; `None` on failure or timeout.
    pub async fn command(&self, ifname: &str, command: &str) -> Option<String> {
        let _guard = self.lock.lock().await;

        let result = tokio::time::timeout(
            COMMAND_TIMEOUT,
            Command::new(&self.cli)
                .arg("-p")
                .arg(&self.ctrl)
                .arg("-i")
                .arg(ifname)
                .arg(command)
                .output(),
        )
        .await;

        let output = result.ok()?.ok()?;
        if !output.status.success() {
            return None;
        }
        Some(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    /// Current association state, or `None` when the supplicant does not
    /// answer.
    pub async fn status(&self, ifname: &str) -> Option<WifiLinkStatus> {
        let mut result = WifiLinkStatus::default();

        let status = self.command(ifname, "status").await?;
        for line in status.lines() {
            if let Some(value) = line.strip_prefix("wpa_state=") {
                result.status = value.trim().to_string();
            }
            if let Some(value) = line.strip_prefix("ssid=") {
                result.ssid = value.trim().to_string();
            }
        }

        if let Some(poll) = self.command(ifname, "signal_poll").await {
            for line in poll.lines() {
                if let Some(value) = line.strip_prefix("RSSI=") {
                    if let Ok(rssi) = value.trim().parse() {
                        result.rssi = rssi;
                    }
                    break;
                }
            }
        }

        Some(result)
    }

    /// Trigger a scan, wait for it to settle, and collect the results.
    /// Failures yield an empty list.
    pub async fn scan(&self, ifname: &str) -> Vec<WifiScanEntry> {
        if self.command(ifname, "scan").await.is_none() {
            return Vec::new();
        }
        tokio::time::sleep(SCAN_SETTLE).await;

        match self.command(ifname, "scan_result").await {
            Some(output) => parse_scan_results(&output),
            None => Vec::new(),
        }
    }
}

fn parse_scan_results(output: &str) -> Vec<WifiScanEntry> {
    let mut results = Vec::new();
    for line in output.lines() {
        if line.starts_with("bssid") || line.trim().is_empty() {
            continue;
        }
        let row: Vec<&str> = line.split_whitespace().collect();
        if row.len() < 4 {
            continue;
        }

        let ssid = if row.len() < 5 {
            String::new()
        } else {
            row[4..].join(" ")
        };
        let signal = row[2].parse::<i64>().map(|s| s / 2 - 100).unwrap_or(-100);

        results.push(WifiScanEntry {
            ssid,
            channel: row[1].to_string(),
            enc: row[3] != "[ESS]",
            signal,
        });
    }
    results
}

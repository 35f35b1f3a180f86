//! systemd service control and networkctl queries.

use std::net::IpAddr;
use std::path::Path;

use tokio::process::Command;
use tracing::warn;
use zbus::proxy;
use zbus::zvariant::OwnedObjectPath;

/// The systemd manager interface, reduced to what the daemon needs.
#[proxy(
    default_service = "org.freedesktop.systemd1",
    interface = "org.freedesktop.systemd1.Manager",
    default_path = "/org/freedesktop/systemd1"
)]
pub trait SystemdManager {
    /// Restart the unit, starting it if it is not running.
    fn restart_unit(&self, name: &str, mode: &str) -> zbus::Result<OwnedObjectPath>;
}

/// Restart `systemd-networkd` so it picks up changed declarative files.
///
/// Failures are logged and swallowed; the next reconcile iteration will
/// rewrite and retry.
pub async fn restart_networkd() {
    if let Err(e) = restart_unit("systemd-networkd.service").await {
        warn!("Cannot restart systemd-networkd: {e}");
    }
}

async fn restart_unit(unit: &str) -> zbus::Result<()> {
    let connection = zbus::Connection::system().await?;
    let manager = SystemdManagerProxy::new(&connection).await?;
    manager.restart_unit(unit, "replace").await?;
    Ok(())
}

/// DNS servers `networkctl status <ifname>` reports for the interface.
///
/// Scans the whitespace-tokenized output for the `DNS:` marker and collects
/// following tokens while they parse as addresses. Returns `None` when the
/// tool fails or reports no DNS section.
pub async fn networkctl_dns(networkctl: &Path, ifname: &str) -> Option<Vec<String>> {
    let output = Command::new(networkctl)
        .args(["status", ifname, "--no-page"])
        .output()
        .await
        .ok()?;

    let stdout = String::from_utf8_lossy(&output.stdout);
    parse_networkctl_dns(&stdout)
}

fn parse_networkctl_dns(output: &str) -> Option<Vec<String>> {
    let tokens: Vec<&str> = output.split_whitespace().collect();
    let start = tokens.iter().position(|t| *t == "DNS:")? + 1;

    let mut dns = Vec::new();
    for token in &tokens[start..] {
        if token.parse::<IpAddr>().is_ok() {
            dns.push((*token).to_string());
        } else {
            break;
        }
    }
    Some(dns)
}

//! Online reachability probe.
//!
//! Two phases: bounded DNS resolution with growing timeouts, then a
//! combined reachability test where either a short ICMP burst or an HTTPS
//! HEAD is enough. Only both phases passing counts as online.

use std::path::Path;
use std::time::Duration;

use tokio::net::lookup_host;
use tokio::process::Command;
use tracing::debug;

const DNS_ATTEMPTS: u64 = 3;
const REACHABILITY_ATTEMPTS: u32 = 2;
const HTTP_TIMEOUT: Duration = Duration::from_secs(3);

/// Probe the test host; `true` means DNS and at least one reachability
/// check succeeded.
pub async fn test_online(host: &str, fping_bin: &Path) -> bool {
    if !resolve_with_backoff(host).await {
        debug!("Cannot resolve {host}");
        return false;
    }

    for _ in 0..REACHABILITY_ATTEMPTS {
        if ping_test(fping_bin, host).await || http_test(host).await {
            return true;
        }
    }
    false
}

async fn resolve_with_backoff(host: &str) -> bool {
    for attempt in 1..=DNS_ATTEMPTS {
        let lookup = tokio::time::timeout(
            Duration::from_secs(attempt),
            lookup_host((host, 443u16)),
        )
        .await;
        if let Ok(Ok(mut addrs)) = lookup {
            if addrs.next().is_some() {
                return true;
            }
        }
    }
    false
}

/// Short ICMP burst; fping prints a summary line containing a comma iff
/// any packet made it.
async fn ping_test(fping_bin: &Path, host: &str) -> bool {
    let output = Command::new(fping_bin)
        .args(["-q", "-c", "5", "-p", "10", "-t", "3000", host])
        .output()
        .await;

    match output {
        Ok(output) => output.stderr.contains(&b','),
        Err(_) => false,
    }
}

/// HTTPS HEAD against the host root; any completed exchange counts,
/// whatever the status code.
async fn http_test(host: &str) -> bool {
    let Ok(client) = reqwest::Client::builder().timeout(HTTP_TIMEOUT).build() else {
        return false;
    };
    client
        .head(format!("https://{host}/"))
        .send()
        .await
        .is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn unresolvable_host_is_offline() {
        // RFC 2606 reserves .invalid; resolution always fails
        let online = test_online("netconnect.invalid", Path::new("/usr/bin/fping")).await;

        assert!(!online);
    }

    #[tokio::test]
    async fn missing_fping_binary_fails_ping_phase() {
        assert!(!ping_test(Path::new("/nonexistent/fping"), "localhost").await);
    }
}

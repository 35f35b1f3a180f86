//! AT command client.
//!
//! One [`AtModem`] serializes every AT transaction behind a mutex: at most
//! one outstanding command per process, which matches the one-modem
//! deployments this daemon targets. The serial exchange itself is blocking
//! and runs on the blocking pool.

use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use std::time::Duration;

use regex::Regex;
use serde::Serialize;
use serialport::{DataBits, FlowControl, Parity, StopBits};
use tokio::sync::Mutex;

use super::parser::AtParser;

const BAUD_RATE: u32 = 115_200;
const READ_TIMEOUT: Duration = Duration::from_millis(500);
const MAX_RESPONSE_BYTES: usize = 100;

#[allow(clippy::expect_used)]
static CSQ_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\+CSQ: (?P<rssi>[0-9]{1,3}),(?P<ber>[0-9]{1,3})").expect("static pattern")
});
#[allow(clippy::expect_used)]
static CREG_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\+CREG: (?P<n>[0-9]),(?P<stat>[0-9])").expect("static pattern")
});
#[allow(clippy::expect_used)]
static COPS_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"\+COPS:.*?,.*?,"(?P<operator>.*)""#).expect("static pattern"));

/// GSM signal quality derived from `AT+CSQ`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SignalInfo {
    /// Received signal strength in dBm, clamped to -113 for out-of-range
    /// raw values.
    pub rssi: i32,
    /// Raw bit error rate field.
    pub ber: String,
    /// Quality bucket on a 0..=3 scale, paired with the scale maximum.
    pub level: (u8, u8),
}

/// Registration and SIM state from `AT+CREG?` / `AT+CPIN?`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct NetworkInfo {
    /// Registered on the home network or roaming.
    pub registered: bool,
    /// SIM answered `READY`.
    pub sim_ready: bool,
}

/// Modem identity from `AT+CGMI` / `AT+CGMM` / `ATI`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ModelInfo {
    /// Manufacturer name.
    pub vendor: String,
    /// Product name.
    pub product: String,
    /// Firmware revision, empty when not reported.
    pub rev: String,
}

/// Serialized AT command access to a serial modem.
#[derive(Debug, Default)]
pub struct AtModem {
    lock: Mutex<()>,
}

impl AtModem {
    /// New client; holds no resources until a command is sent.
    pub fn new() -> Self {
        Self::default()
    }

    /// Send one AT command and collect the parsed response lines.
    ///
    /// Returns `None` on open/write/read errors, on timeout, and (when
    /// `expect_ok` is set) on any final result other than `OK`.
    pub async fn send(&self, dev: &Path, cmd: &str, expect_ok: bool) -> Option<Vec<String>> {
        let _guard = self.lock.lock().await;
        let dev: PathBuf = dev.to_path_buf();
        let cmd = format!("{cmd}\r");

        tokio::task::spawn_blocking(move || transaction(&dev, &cmd, expect_ok))
            .await
            .ok()
            .flatten()
    }

    /// Signal quality, or `None` when the modem does not answer.
    pub async fn signal(&self, dev: &Path) -> Option<SignalInfo> {
        let response = self.send(dev, "AT+CSQ", true).await?;
        parse_signal(response.first()?)
    }

    /// Whether the modem is registered on a network.
    pub async fn registered(&self, dev: &Path) -> Option<bool> {
        let response = self.send(dev, "AT+CREG?", true).await?;
        parse_registered(response.first()?)
    }

    /// Registration plus SIM readiness. The SIM is only interrogated when
    /// the modem is not registered.
    pub async fn network_info(&self, dev: &Path) -> Option<NetworkInfo> {
        let response = self.send(dev, "AT+CREG?", true).await?;
        let registered = parse_registered(response.first()?)?;

        let mut sim_ready = true;
        if !registered {
            sim_ready = match self.send(dev, "AT+CPIN?", false).await {
                Some(lines) => lines
                    .first()
                    .is_some_and(|l| l.starts_with("+CPIN: READY")),
                None => false,
            };
        }

        Some(NetworkInfo {
            registered,
            sim_ready,
        })
    }

    /// Vendor, product and firmware revision.
    pub async fn model(&self, dev: &Path) -> Option<ModelInfo> {
        let vendor = self.send(dev, "AT+CGMI", true).await?;
        let product = self.send(dev, "AT+CGMM", true).await?;

        let mut rev = String::new();
        if let Some(lines) = self.send(dev, "ATI", true).await {
            rev = lines
                .iter()
                .find_map(|l| l.strip_prefix("Revision: "))
                .unwrap_or_default()
                .to_string();
        }

        Some(ModelInfo {
            vendor: title_case(vendor.first()?),
            product: product.first()?.clone(),
            rev,
        })
    }

    /// Long-format operator name.
    pub async fn operator(&self, dev: &Path) -> Option<String> {
        self.send(dev, "AT+COPS=3,0", true).await?;
        let response = self.send(dev, "AT+COPS?", true).await?;
        parse_operator(response.first()?)
    }

    /// Bring up an NDIS data connection on the given APN.
    pub async fn ndis_connect(&self, dev: &Path, apn: &str) {
        let _ = self.send(dev, &format!(r#"AT^NDISDUP=1,1,"{apn}""#), true).await;
    }

    /// Tear down the NDIS data connection.
    pub async fn ndis_disconnect(&self, dev: &Path) {
        let _ = self.send(dev, "AT^NDISDUP=1,0", true).await;
    }

    /// Whether the NDIS data connection is up or coming up.
    pub async fn ndis_connected(&self, dev: &Path) -> Option<bool> {
        let response = self.send(dev, "AT^NDISSTATQRY?", false).await?;
        parse_ndis_connected(response.first()?)
    }
}

fn transaction(dev: &Path, cmd: &str, expect_ok: bool) -> Option<Vec<String>> {
    let mut port = serialport::new(dev.to_string_lossy(), BAUD_RATE)
        .data_bits(DataBits::Eight)
        .parity(Parity::None)
        .stop_bits(StopBits::One)
        .flow_control(FlowControl::Hardware)
        .timeout(READ_TIMEOUT)
        .open()
        .ok()?;

    port.write_all(cmd.as_bytes()).ok()?;

    let mut parser = AtParser::new();
    let mut byte = [0u8; 1];
    for _ in 0..MAX_RESPONSE_BYTES {
        match port.read(&mut byte) {
            Ok(1) => parser.feed(byte[0]),
            _ => break,
        }
        if parser.response().is_some() {
            break;
        }
    }

    let response = parser.response()?.to_vec();
    if expect_ok && response.last().map(String::as_str) != Some("OK") {
        return None;
    }
    Some(response)
}

pub(crate) fn parse_signal(line: &str) -> Option<SignalInfo> {
    let caps = CSQ_RE.captures(line)?;
    let raw: i32 = caps.name("rssi")?.as_str().parse().ok()?;
    let ber = caps.name("ber")?.as_str().to_string();

    let rssi = if (2..=30).contains(&raw) {
        -(113 - raw * 2)
    } else {
        -113
    };
    let level = if rssi <= -95 {
        0
    } else if rssi <= -85 {
        1
    } else if rssi <= -75 {
        2
    } else {
        3
    };

    Some(SignalInfo {
        rssi,
        ber,
        level: (level, 3),
    })
}

pub(crate) fn parse_registered(line: &str) -> Option<bool> {
    let caps = CREG_RE.captures(line)?;
    let stat = caps.name("stat")?.as_str();
    Some(stat == "1" || stat == "5")
}

pub(crate) fn parse_operator(line: &str) -> Option<String> {
    let caps = COPS_RE.captures(line)?;
    Some(caps.name("operator")?.as_str().to_string())
}

pub(crate) fn parse_ndis_connected(line: &str) -> Option<bool> {
    // ^NDISSTATQRY: 0 disconnected, 1 connected, 2 in connection
    let state = line.strip_prefix("^NDISSTATQRY: ")?.chars().next()?;
    Some(state == '1' || state == '2')
}

fn title_case(text: &str) -> String {
    text.split(' ')
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => {
                    first.to_uppercase().collect::<String>() + &chars.as_str().to_lowercase()
                }
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signal_mapping_reference_points() {
        assert_eq!(parse_signal("+CSQ: 2,0").map(|s| s.rssi), Some(-109));
        assert_eq!(parse_signal("+CSQ: 15,0").map(|s| s.rssi), Some(-83));
        assert_eq!(parse_signal("+CSQ: 30,0").map(|s| s.rssi), Some(-53));
    }

    #[test]
    fn signal_out_of_range_clamps() {
        for raw in ["0", "1", "31", "99"] {
            let info = parse_signal(&format!("+CSQ: {raw},0"));
            assert_eq!(info.map(|s| s.rssi), Some(-113), "raw {raw}");
        }
    }

    #[test]
    fn signal_level_buckets() {
        assert_eq!(parse_signal("+CSQ: 7,0").map(|s| s.level), Some((0, 3))); // -99 dBm
        assert_eq!(parse_signal("+CSQ: 12,0").map(|s| s.level), Some((1, 3))); // -89 dBm
        assert_eq!(parse_signal("+CSQ: 17,0").map(|s| s.level), Some((2, 3))); // -79 dBm
        assert_eq!(parse_signal("+CSQ: 22,0").map(|s| s.level), Some((3, 3))); // -69 dBm
    }

    #[test]
    fn registration_states() {
        assert_eq!(parse_registered("+CREG: 0,1"), Some(true));
        assert_eq!(parse_registered("+CREG: 0,5"), Some(true));
        assert_eq!(parse_registered("+CREG: 0,2"), Some(false));
        assert_eq!(parse_registered("+CSQ: 17,0"), None);
    }

    #[test]
    fn operator_extraction() {
        assert_eq!(
            parse_operator("+COPS: 0,0,\"Vodafone CZ\",7"),
            Some("Vodafone CZ".to_string())
        );
        assert_eq!(parse_operator("+COPS: 0"), None);
    }

    #[test]
    fn ndis_state() {
        assert_eq!(parse_ndis_connected("^NDISSTATQRY: 1,,,\"IPV4\""), Some(true));
        assert_eq!(parse_ndis_connected("^NDISSTATQRY: 2,,,\"IPV4\""), Some(true));
        assert_eq!(parse_ndis_connected("^NDISSTATQRY: 0,,,\"IPV4\""), Some(false));
    }

    #[test]
    fn vendor_title_casing() {
        assert_eq!(title_case("huawei"), "Huawei");
        assert_eq!(title_case("SIERRA WIRELESS"), "Sierra Wireless");
    }
}

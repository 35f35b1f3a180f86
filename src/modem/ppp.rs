//! PPP dial session.
//!
//! pppd runs as a child in its own process group with `nodetach`, so the
//! whole dial chain (pppd + chat) can be torn down with one group signal.
//! Its merged stdout/stderr is scraped for the `ip-up finished` marker,
//! negotiated addresses and DNS servers.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::{Arc, LazyLock, Mutex, PoisonError};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use nix::sys::signal::{Signal, killpg};
use nix::unistd::Pid;
use regex::Regex;
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, Command};
use tokio::time::{Instant, sleep};

/// How long the dial may take before the session is torn down.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);
/// Marker pppd prints once the ip-up script has completed.
const READY_TOKEN: &str = "ip-up finished";
/// Synthetic exit code for a dial that hit [`CONNECT_TIMEOUT`].
pub const TIMEOUT_CODE: i32 = 100;

#[allow(clippy::expect_used)]
static DNS_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"DNS address (.*)\n").expect("static pattern"));
#[allow(clippy::expect_used)]
static LOCAL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"local  IP address ([\d.]+)").expect("static pattern"));
#[allow(clippy::expect_used)]
static REMOTE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"remote IP address ([\d.]+)").expect("static pattern"));

/// Dial failure.
#[derive(Debug, Error)]
pub enum PppError {
    /// pppd could not be spawned at all.
    #[error("cannot spawn pppd: {0}")]
    Spawn(#[from] std::io::Error),

    /// pppd exited (or timed out, code [`TIMEOUT_CODE`]).
    #[error("{}", return_code_text(*.code))]
    Exited {
        /// pppd exit code; negative for signal deaths.
        code: i32,
        /// Accumulated pppd output at the time of failure.
        output: String,
    },
}

impl PppError {
    /// Accumulated pppd output, when the failure produced any.
    pub fn output(&self) -> Option<&str> {
        match self {
            Self::Spawn(_) => None,
            Self::Exited { output, .. } => Some(output),
        }
    }
}

/// Human strings for documented pppd exit codes.
fn return_code_text(code: i32) -> &'static str {
    match code {
        1 => "Fatal error occured",
        2 => "Error processing options",
        3 => "Not executed as root or setuid-root",
        4 => "No kernel support, PPP kernel driver not loaded",
        5 => "Received SIGINT, SIGTERM or SIGHUP",
        6 => "Modem could not be locked",
        7 => "Modem could not be opened",
        8 => "Connect script failed",
        9 => "pty argument command could not be run",
        10 => "PPP negotiation failed",
        11 => "Peer failed (or refused) to authenticate",
        12 => "The link was terminated because it was idle",
        13 => "The link was terminated because the connection time limit was reached",
        14 => "Callback negotiated",
        15 => "The link was terminated because the peer was not responding to echo requests",
        16 => "The link was terminated by the modem hanging up",
        17 => "PPP negotiation failed because serial loopback was detected",
        18 => "Init script failed",
        19 => "Failed to authenticate to the peer",
        TIMEOUT_CODE => "Timeout",
        _ => "Undocumented error occured",
    }
}

/// A running (or completed) pppd dial.
#[derive(Debug)]
pub struct PppSession {
    child: Child,
    pgid: Option<i32>,
    output: Arc<Mutex<String>>,
    log_path: PathBuf,
}

impl PppSession {
    /// Spawn pppd and block until the link is up or the dial failed.
    ///
    /// Waits up to 30 seconds for the ready marker; on timeout the process
    /// group is sent SIGHUP then SIGTERM and the session reports
    /// [`TIMEOUT_CODE`].
    ///
    /// # Errors
    /// [`PppError::Spawn`] when pppd cannot be started,
    /// [`PppError::Exited`] when it dies or times out before the link is up.
    pub async fn connect(
        pppd_bin: &Path,
        args: &[String],
        log_path: &Path,
    ) -> Result<Self, PppError> {
        let mut command = Command::new(pppd_bin);
        command
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .process_group(0);

        let mut child = command.spawn()?;
        let pgid = child.id().map(|pid| pid as i32);

        let output = Arc::new(Mutex::new(String::new()));
        spawn_reader(child.stdout.take(), &output);
        spawn_reader(child.stderr.take(), &output);

        let mut session = Self {
            child,
            pgid,
            output,
            log_path: log_path.to_path_buf(),
        };
        session.wait_ready().await?;
        Ok(session)
    }

    async fn wait_ready(&mut self) -> Result<(), PppError> {
        let deadline = Instant::now() + CONNECT_TIMEOUT;
        loop {
            if self.output().contains(READY_TOKEN) {
                self.write_log();
                return Ok(());
            }
            if let Ok(Some(status)) = self.child.try_wait() {
                self.write_log();
                return Err(PppError::Exited {
                    code: exit_code(status),
                    output: self.output(),
                });
            }
            if Instant::now() >= deadline {
                self.write_log();
                self.kill_group();
                return Err(PppError::Exited {
                    code: TIMEOUT_CODE,
                    output: self.output(),
                });
            }
            sleep(Duration::from_millis(500)).await;
        }
    }

    /// Current ready-and-alive state.
    ///
    /// # Errors
    /// [`PppError::Exited`] when the child has exited with anything but a
    /// clean code (0) or an operator-initiated signal (5).
    pub fn connected(&mut self) -> Result<bool, PppError> {
        if let Ok(Some(status)) = self.child.try_wait() {
            let code = exit_code(status);
            if code != 0 && code != 5 {
                return Err(PppError::Exited {
                    code,
                    output: self.output(),
                });
            }
            return Ok(false);
        }
        Ok(self.output().contains(READY_TOKEN))
    }

    /// Negotiated DNS servers mined from the pppd output.
    pub fn dns(&self) -> Vec<String> {
        DNS_RE
            .captures_iter(&self.output())
            .filter_map(|c| c.get(1).map(|m| m.as_str().trim().to_string()))
            .collect()
    }

    /// Local end of the PPP link.
    pub fn local_addr(&self) -> Option<String> {
        first_capture(&LOCAL_RE, &self.output())
    }

    /// Remote end of the PPP link.
    pub fn remote_addr(&self) -> Option<String> {
        first_capture(&REMOTE_RE, &self.output())
    }

    /// Tear down the dial if it is still connected.
    pub fn disconnect(&mut self) {
        if matches!(self.connected(), Ok(true)) {
            self.kill_group();
        }
    }

    /// Signal the whole dial process group.
    pub fn kill_group(&self) {
        if let Some(pgid) = self.pgid {
            let pgid = Pid::from_raw(pgid);
            let _ = killpg(pgid, Signal::SIGHUP);
            let _ = killpg(pgid, Signal::SIGTERM);
        }
    }

    fn output(&self) -> String {
        self.output
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn write_log(&self) {
        let stamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or_default();
        let _ = std::fs::write(&self.log_path, format!("{stamp}\n{}", self.output()));
    }
}

fn spawn_reader<R>(stream: Option<R>, output: &Arc<Mutex<String>>)
where
    R: tokio::io::AsyncRead + Unpin + Send + 'static,
{
    let Some(stream) = stream else {
        return;
    };
    let output = Arc::clone(output);
    tokio::spawn(async move {
        let mut lines = BufReader::new(stream).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            let mut buffer = output.lock().unwrap_or_else(PoisonError::into_inner);
            buffer.push_str(&line);
            buffer.push('\n');
        }
    });
}

fn exit_code(status: std::process::ExitStatus) -> i32 {
    use std::os::unix::process::ExitStatusExt;

    status
        .code()
        .or_else(|| status.signal().map(|s| -s))
        .unwrap_or(-1)
}

fn first_capture(re: &Regex, text: &str) -> Option<String> {
    re.captures(text)
        .and_then(|c| c.get(1).map(|m| m.as_str().to_string()))
}

/// pppd argument list for a chat-scripted dial on the given data port.
pub fn pppd_args(
    data_port: &Path,
    chat_bin: &Path,
    chatscript: &Path,
    user: Option<&str>,
    password: Option<&str>,
) -> Vec<String> {
    let mut args: Vec<String> = vec![
        data_port.to_string_lossy().into_owned(),
        "921600".into(),
        "lock".into(),
        "passive".into(),
        "defaultroute".into(),
        "noipdefault".into(),
        "usepeerdns".into(),
        "hide-password".into(),
        "replacedefaultroute".into(),
        "nodetach".into(),
        "lcp-echo-failure".into(),
        "0".into(),
        "lcp-echo-interval".into(),
        "0".into(),
        "connect".into(),
        format!(
            "{} -v -t 20 -f {}",
            chat_bin.to_string_lossy(),
            chatscript.to_string_lossy()
        ),
    ];

    match user {
        Some(user) if !user.is_empty() => {
            args.push("user".into());
            args.push(user.to_string());
            if let Some(password) = password {
                args.push("password".into());
                args.push(password.to_string());
            }
        }
        _ => args.push("noauth".into()),
    }

    args
}

/// Chat script dialing the given APN and number.
pub fn chat_script(apn: &str, number: &str) -> String {
    format!(
        "ABORT 'BUSY'\n\
         ABORT 'NO CARRIER'\n\
         ABORT 'VOICE'\n\
         ABORT 'NO DIALTONE'\n\
         ABORT 'NO DIAL TONE'\n\
         ABORT 'NO ANSWER'\n\
         ABORT 'DELAYED'\n\
         REPORT CONNECT\n\
         TIMEOUT 6\n\
         '' 'ATQ0'\n\
         'OK-AT-OK' 'ATZ'\n\
         TIMEOUT 3\n\
         'OK\\d-AT-OK' 'ATI'\n\
         'OK' 'ATZ'\n\
         'OK' 'AT+CFUN=1'\n\
         'OK' 'ATQ0 V1 E1 S0=0 &C1 &D2 +FCLASS=0'\n\
         'OK-AT-OK' AT+CGDCONT=1,\"IP\",\"{apn}\"\n\
         'OK' 'ATDT{number}'\n\
         TIMEOUT 30\n\
         CONNECT ''\n"
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE_OUTPUT: &str = "\
        Serial connection established.\n\
        Using interface ppp0\n\
        Connect: ppp0 <--> /dev/ttyUSB0\n\
        local  IP address 10.132.77.2\n\
        remote IP address 10.64.64.64\n\
        primary   DNS address 212.51.110.1\n\
        secondary DNS address 212.51.110.10\n\
        Script /etc/ppp/ip-up finished (pid 4621), status = 0x0\n";

    #[test]
    fn return_codes_map_to_documented_strings() {
        assert_eq!(return_code_text(8), "Connect script failed");
        assert_eq!(return_code_text(TIMEOUT_CODE), "Timeout");
        assert_eq!(return_code_text(42), "Undocumented error occured");
    }

    #[test]
    fn addresses_and_dns_are_mined_from_output() {
        assert_eq!(
            first_capture(&LOCAL_RE, SAMPLE_OUTPUT),
            Some("10.132.77.2".to_string())
        );
        assert_eq!(
            first_capture(&REMOTE_RE, SAMPLE_OUTPUT),
            Some("10.64.64.64".to_string())
        );

        let dns: Vec<String> = DNS_RE
            .captures_iter(SAMPLE_OUTPUT)
            .filter_map(|c| c.get(1).map(|m| m.as_str().trim().to_string()))
            .collect();
        assert_eq!(dns, vec!["212.51.110.1", "212.51.110.10"]);
    }

    #[test]
    fn args_with_auth() {
        let args = pppd_args(
            Path::new("/dev/ttyUSB0"),
            Path::new("/usr/sbin/chat"),
            Path::new("/tmp/gsm-keeper.chat"),
            Some("user1"),
            Some("secret"),
        );

        assert_eq!(args[0], "/dev/ttyUSB0");
        assert_eq!(args[1], "921600");
        assert!(args.contains(&"replacedefaultroute".to_string()));
        assert_eq!(
            args[args.len() - 5],
            "/usr/sbin/chat -v -t 20 -f /tmp/gsm-keeper.chat"
        );
        assert_eq!(&args[args.len() - 4..], ["user", "user1", "password", "secret"]);
    }

    #[test]
    fn args_without_auth_request_noauth() {
        let args = pppd_args(
            Path::new("/dev/ttyUSB0"),
            Path::new("/usr/sbin/chat"),
            Path::new("/tmp/gsm-keeper.chat"),
            None,
            None,
        );

        assert_eq!(args.last().map(String::as_str), Some("noauth"));
    }

    #[test]
    fn chat_script_substitutes_apn_and_number() {
        let script = chat_script("internet", "*99#");

        assert!(script.contains("AT+CGDCONT=1,\"IP\",\"internet\""));
        assert!(script.contains("'ATDT*99#'"));
        assert!(script.starts_with("ABORT 'BUSY'\n"));
        assert!(script.ends_with("CONNECT ''\n"));
    }
}

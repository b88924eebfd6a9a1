//! Native-messaging-driven process supervisor: starts, stops, and
//! health-checks the `proxy` subprocess. Owns the PID file exclusively
//! - the data-plane process never touches it.

use loggy_core::config::LoggyConfig;
use serde_json::{json, Value};
use std::io;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::process::Command;
use tracing::warn;

const PID_FILE_NAME: &str = ".proxy.pid";

/// Candidate browser binaries tried, in order, for the best-effort
/// auto-launch after a successful `startProxy`.
const CANDIDATE_BROWSERS: &[&str] = &[
    "google-chrome",
    "google-chrome-stable",
    "chromium",
    "chromium-browser",
    "/Applications/Google Chrome.app/Contents/MacOS/Google Chrome",
];

pub struct Supervisor {
    config: LoggyConfig,
    data_dir: PathBuf,
}

impl Supervisor {
    pub fn new(config: LoggyConfig) -> Self {
        let data_dir = config.resolved_data_dir();
        Self { config, data_dir }
    }

    #[cfg(test)]
    fn with_data_dir(config: LoggyConfig, data_dir: PathBuf) -> Self {
        Self { config, data_dir }
    }

    fn pid_file(&self) -> PathBuf {
        self.data_dir.join(PID_FILE_NAME)
    }

    pub fn ping(&self) -> Value {
        json!({"success": true})
    }

    pub async fn get_status(&self) -> Value {
        match self.read_pid_file() {
            Some(pid) if process_alive(pid) => json!({"success": true, "running": true, "pid": pid}),
            _ => json!({"success": true, "running": false, "pid": 0}),
        }
    }

    /// Kills whatever already holds the proxy port (best effort), spawns
    /// a detached `proxy` child in its own session, probes the port, and
    /// on success kicks off the asynchronous trust-install + browser
    /// launch without blocking the response.
    pub async fn start_proxy(&self) -> Value {
        if self.port_in_use(self.config.proxy.port).await {
            if let Some(pid) = self.read_pid_file() {
                warn!(pid, "a process already appears to be listening on the proxy port, terminating it");
                send_signal(pid, libc::SIGTERM);
            }
        }

        let exe = match std::env::current_exe() {
            Ok(path) => path,
            Err(e) => {
                return json!({"success": false, "error": format!("could not resolve own executable path: {e}")})
            }
        };

        let mut command = Command::new(exe);
        command
            .arg("proxy")
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null());
        detach(&mut command);

        let mut child = match command.spawn() {
            Ok(child) => child,
            Err(e) => return json!({"success": false, "error": format!("failed to spawn proxy process: {e}")}),
        };
        let pid = child.id().unwrap_or(0) as i32;

        if let Err(e) = self.write_pid_file(pid) {
            warn!(error = %e, "failed to write pid file");
        }

        // The child is detached and long-running; reap it in the
        // background instead of leaving a zombie behind once it exits.
        tokio::spawn(async move {
            let _ = child.wait().await;
        });

        tokio::time::sleep(Duration::from_millis(self.config.control.start_probe_ms)).await;

        if !self.port_in_use(self.config.proxy.port).await {
            return json!({"success": false, "error": "Proxy failed to start"});
        }

        let data_dir = self.data_dir.clone();
        let proxy_port = self.config.proxy.port;
        tokio::spawn(async move {
            let cert_path = loggy_ca::certs_dir(&data_dir).join("ca.pem");
            let _ = tokio::task::spawn_blocking(move || loggy_ca::trust_root(&cert_path)).await;
            launch_browser(proxy_port);
        });

        json!({"success": true, "pid": pid, "autoLaunched": true})
    }

    pub async fn stop_proxy(&self) -> Value {
        let Some(pid) = self.read_pid_file() else {
            return json!({"success": false, "error": "proxy is not running"});
        };
        if !process_alive(pid) {
            let _ = std::fs::remove_file(self.pid_file());
            return json!({"success": false, "error": "proxy is not running"});
        }

        send_signal(pid, libc::SIGTERM);
        tokio::time::sleep(Duration::from_millis(self.config.control.stop_wait_ms)).await;

        let stopped = !self.port_in_use(self.config.proxy.port).await;
        let _ = std::fs::remove_file(self.pid_file());

        if stopped {
            json!({"success": true})
        } else {
            json!({"success": false, "error": "proxy did not stop within the wait window"})
        }
    }

    fn read_pid_file(&self) -> Option<i32> {
        std::fs::read_to_string(self.pid_file())
            .ok()
            .and_then(|contents| contents.trim().parse().ok())
    }

    fn write_pid_file(&self, pid: i32) -> io::Result<()> {
        std::fs::create_dir_all(&self.data_dir)?;
        std::fs::write(self.pid_file(), pid.to_string())
    }

    async fn port_in_use(&self, port: u16) -> bool {
        let addr = format!("127.0.0.1:{port}");
        tokio::time::timeout(Duration::from_millis(200), TcpStream::connect(&addr))
            .await
            .map(|result| result.is_ok())
            .unwrap_or(false)
    }
}

fn send_signal(pid: i32, signal: i32) -> bool {
    unsafe { libc::kill(pid, signal) == 0 }
}

fn process_alive(pid: i32) -> bool {
    send_signal(pid, 0)
}

/// Put the child in its own process group so it outlives the
/// native-messaging host process's group.
fn detach(command: &mut Command) {
    command.process_group(0);
}

fn launch_browser(proxy_port: u16) {
    let profile_dir = std::env::temp_dir().join(format!("loggy-proxy-profile-{proxy_port}"));
    let proxy_flag = format!("--proxy-server=http://127.0.0.1:{proxy_port}");
    let profile_flag = format!("--user-data-dir={}", profile_dir.display());

    for browser in CANDIDATE_BROWSERS {
        if std::process::Command::new(browser)
            .args([proxy_flag.as_str(), profile_flag.as_str(), "--no-first-run"])
            .spawn()
            .is_ok()
        {
            return;
        }
    }
    warn!("no known browser binary found for auto-launch");
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scratch_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("loggy-control-test-{name}-{}", std::process::id()));
        let _ = std::fs::remove_dir_all(&dir);
        dir
    }

    #[tokio::test]
    async fn status_is_not_running_without_a_pid_file() {
        let supervisor = Supervisor::with_data_dir(LoggyConfig::default(), scratch_dir("no-pid"));
        let status = supervisor.get_status().await;
        assert_eq!(status["running"], false);
    }

    #[test]
    fn pid_file_round_trips() {
        let data_dir = scratch_dir("pid-roundtrip");
        let supervisor = Supervisor::with_data_dir(LoggyConfig::default(), data_dir);
        supervisor.write_pid_file(4242).unwrap();
        assert_eq!(supervisor.read_pid_file(), Some(4242));
    }

    #[test]
    fn ping_always_succeeds() {
        let supervisor = Supervisor::with_data_dir(LoggyConfig::default(), scratch_dir("ping"));
        assert_eq!(supervisor.ping(), json!({"success": true}));
    }
}

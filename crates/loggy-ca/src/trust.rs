//! Best-effort installation of the root CA into the platform trust
//! store, so intercepted TLS validates without a manual browser
//! import. Shaped after the trust-store commands the local-logger
//! `certificate_manager` module logs for the operator; this trait adds
//! the adapter seam that module lacks, since it only ever printed the
//! command rather than running it.
//!
//! Never fatal: a failure here is logged and the proxy still
//! functions for any client that imports `ca.pem` manually.

use std::path::Path;
use std::process::Command;
use tracing::{info, warn};

pub trait TrustStore: Send + Sync {
    /// Attempt to install `cert_path` as a trusted root. Returns
    /// `Ok(true)` if installed, `Ok(false)` if this platform has no
    /// automatic path and the caller should print manual instructions.
    fn install(&self, cert_path: &Path) -> std::io::Result<bool>;
}

/// `security add-trusted-cert -d -r trustRoot -k /Library/Keychains/System.keychain`.
pub struct MacOsTrustStore;

impl TrustStore for MacOsTrustStore {
    fn install(&self, cert_path: &Path) -> std::io::Result<bool> {
        let status = Command::new("security")
            .args([
                "add-trusted-cert",
                "-d",
                "-r",
                "trustRoot",
                "-k",
                "/Library/Keychains/System.keychain",
            ])
            .arg(cert_path)
            .status()?;
        Ok(status.success())
    }
}

/// Copies into `/usr/local/share/ca-certificates/` and runs
/// `update-ca-certificates`, matching the Debian/Ubuntu family path.
pub struct LinuxTrustStore;

impl TrustStore for LinuxTrustStore {
    fn install(&self, cert_path: &Path) -> std::io::Result<bool> {
        let dest = Path::new("/usr/local/share/ca-certificates/loggy-proxy-ca.crt");
        std::fs::copy(cert_path, dest)?;
        let status = Command::new("update-ca-certificates").status()?;
        Ok(status.success())
    }
}

/// No automatic path is known for this platform; always reports
/// "not installed" so the caller falls back to manual instructions.
pub struct NoopTrustStore;

impl TrustStore for NoopTrustStore {
    fn install(&self, _cert_path: &Path) -> std::io::Result<bool> {
        Ok(false)
    }
}

/// Picks the trust store adapter for the running platform.
pub fn platform_trust_store() -> Box<dyn TrustStore> {
    if cfg!(target_os = "macos") {
        Box::new(MacOsTrustStore)
    } else if cfg!(target_os = "linux") {
        Box::new(LinuxTrustStore)
    } else {
        Box::new(NoopTrustStore)
    }
}

/// Best-effort attempt to trust the root CA, per spec: never fatal to
/// proxy operation. Logs manual fallback instructions on failure.
pub fn trust_root(cert_path: &Path) {
    let store = platform_trust_store();
    match store.install(cert_path) {
        Ok(true) => info!("installed root CA into the system trust store"),
        Ok(false) => warn_manual_install(cert_path),
        Err(err) => {
            warn!("failed to install root CA automatically: {}", err);
            warn_manual_install(cert_path);
        }
    }
}

fn warn_manual_install(cert_path: &Path) {
    warn!("install the root CA certificate manually to trust HTTPS interception:");
    warn!(
        "  macOS: sudo security add-trusted-cert -d -r trustRoot -k /Library/Keychains/System.keychain {}",
        cert_path.display()
    );
    warn!(
        "  Linux: sudo cp {} /usr/local/share/ca-certificates/ && sudo update-ca-certificates",
        cert_path.display()
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn noop_store_reports_not_installed() {
        let store = NoopTrustStore;
        assert_eq!(store.install(Path::new("/tmp/does-not-matter.pem")).unwrap(), false);
    }
}

//! Native-messaging host manifest installer for the `install`
//! subcommand.
//!
//! Writes a thin wrapper script that `exec`s the real binary, then a
//! host-manifest JSON file whose `path` points at that wrapper rather
//! than the binary directly - required because some host browsers
//! sanitize argv when launching native-messaging hosts, so the
//! manifest can't just point at `loggy` with no arguments and expect
//! the supervisor mode to be reached reliably.

use loggy_core::error::StartupError;
use serde::Serialize;
use std::io::Write as _;
use std::path::{Path, PathBuf};

const HOST_NAME: &str = "dev.loggy_proxy.loggy";

#[derive(Serialize)]
struct HostManifest {
    name: String,
    description: String,
    path: String,
    #[serde(rename = "type")]
    kind: String,
    allowed_origins: Vec<String>,
}

/// Resolve the platform's native-messaging-hosts directory for Chrome-
/// family browsers. Returns `None` on platforms with no known
/// convention, so the caller can fall back to a directory under the
/// proxy's own data dir.
fn platform_hosts_dir() -> Option<PathBuf> {
    let home = directories::BaseDirs::new()?.home_dir().to_path_buf();
    if cfg!(target_os = "macos") {
        Some(home.join("Library/Application Support/Google/Chrome/NativeMessagingHosts"))
    } else if cfg!(target_os = "linux") {
        Some(home.join(".config/google-chrome/NativeMessagingHosts"))
    } else {
        None
    }
}

/// Write the wrapper script and host manifest for `extension_id`,
/// resolving platform-appropriate directories. `data_dir` is used for
/// the wrapper script and as a fallback manifest location on
/// platforms `platform_hosts_dir` doesn't recognize.
pub fn install_host_manifest(
    extension_id: &str,
    binary_path: &Path,
    data_dir: &Path,
) -> Result<PathBuf, StartupError> {
    let hosts_dir = platform_hosts_dir().unwrap_or_else(|| data_dir.join("native-messaging-hosts"));
    let wrapper_dir = data_dir.join("bin");
    install_into(extension_id, binary_path, &hosts_dir, &wrapper_dir)
}

fn install_into(
    extension_id: &str,
    binary_path: &Path,
    hosts_dir: &Path,
    wrapper_dir: &Path,
) -> Result<PathBuf, StartupError> {
    let wrapper_path = write_wrapper_script(binary_path, wrapper_dir)
        .map_err(StartupError::ManifestWriteFailed)?;

    let manifest = HostManifest {
        name: HOST_NAME.to_string(),
        description: "Loggy analytics proxy lifecycle bridge".to_string(),
        path: wrapper_path.to_string_lossy().into_owned(),
        kind: "stdio".to_string(),
        allowed_origins: vec![format!("chrome-extension://{extension_id}/")],
    };

    std::fs::create_dir_all(hosts_dir).map_err(StartupError::ManifestWriteFailed)?;
    let manifest_path = hosts_dir.join(format!("{HOST_NAME}.json"));
    let json = serde_json::to_string_pretty(&manifest)
        .map_err(|e| StartupError::ManifestWriteFailed(std::io::Error::new(std::io::ErrorKind::Other, e)))?;
    std::fs::write(&manifest_path, json).map_err(StartupError::ManifestWriteFailed)?;

    Ok(manifest_path)
}

/// A POSIX shell wrapper that `exec`s the real binary with no
/// arguments, so the native-messaging host always lands in supervisor
/// mode regardless of how the browser invokes it.
fn write_wrapper_script(binary_path: &Path, wrapper_dir: &Path) -> std::io::Result<PathBuf> {
    std::fs::create_dir_all(wrapper_dir)?;
    let wrapper_path = wrapper_dir.join("loggy-wrapper.sh");

    let mut file = std::fs::File::create(&wrapper_path)?;
    writeln!(file, "#!/bin/sh")?;
    writeln!(file, "exec \"{}\" \"$@\"", binary_path.display())?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(&wrapper_path, std::fs::Permissions::from_mode(0o755))?;
    }

    Ok(wrapper_path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn writes_manifest_with_extension_origin() {
        let hosts_dir = TempDir::new().unwrap();
        let wrapper_dir = TempDir::new().unwrap();
        let binary = PathBuf::from("/usr/local/bin/loggy");

        let manifest_path = install_into("abcdefgh", &binary, hosts_dir.path(), wrapper_dir.path()).unwrap();
        let contents = std::fs::read_to_string(&manifest_path).unwrap();
        let json: serde_json::Value = serde_json::from_str(&contents).unwrap();

        assert_eq!(json["type"], "stdio");
        assert_eq!(json["allowed_origins"][0], "chrome-extension://abcdefgh/");
        assert_eq!(json["name"], HOST_NAME);
    }

    #[test]
    fn manifest_path_points_at_wrapper_not_the_real_binary() {
        let hosts_dir = TempDir::new().unwrap();
        let wrapper_dir = TempDir::new().unwrap();
        let binary = PathBuf::from("/usr/local/bin/loggy");

        let manifest_path = install_into("ext", &binary, hosts_dir.path(), wrapper_dir.path()).unwrap();
        let contents = std::fs::read_to_string(&manifest_path).unwrap();
        let json: serde_json::Value = serde_json::from_str(&contents).unwrap();

        let wrapper_path = json["path"].as_str().unwrap();
        assert!(wrapper_path.contains("loggy-wrapper.sh"));
        assert!(std::path::Path::new(wrapper_path).exists());
    }

    #[cfg(unix)]
    #[test]
    fn wrapper_script_is_executable() {
        use std::os::unix::fs::PermissionsExt;
        let hosts_dir = TempDir::new().unwrap();
        let wrapper_dir = TempDir::new().unwrap();
        let wrapper_path = write_wrapper_script(&PathBuf::from("/usr/local/bin/loggy"), wrapper_dir.path()).unwrap();
        let mode = std::fs::metadata(&wrapper_path).unwrap().permissions().mode() & 0o777;
        assert_eq!(mode, 0o755);
        let _ = hosts_dir;
    }
}

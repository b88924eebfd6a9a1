//! Root CA lifecycle and per-host leaf certificate minting (C1).
//!
//! Shaped after `oisp-redirector::windows_main::tls_mitm`'s MITM
//! certificate authority: same load-or-create shape, same per-host
//! `RwLock<HashMap<_, Arc<_>>>` cache, same rcgen 0.13
//! `CertificateParams`/`self_signed`/`signed_by` calls. The validity
//! window, path length and root CommonName are this proxy's own
//! defaults, not copied from elsewhere.

use crate::error::{CaError, CaResult};
use rand::RngCore;
use rcgen::{
    BasicConstraints, Certificate, CertificateParams, DistinguishedName, DnType,
    ExtendedKeyUsagePurpose, IsCa, KeyPair, KeyUsagePurpose, SanType, SerialNumber,
};
use rsa::pkcs1::{DecodeRsaPrivateKey, EncodeRsaPrivateKey};
use rsa::pkcs8::{DecodePrivateKey, EncodePrivateKey};
use std::collections::HashMap;
use std::fs;
use std::io::Write as _;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use time::{Duration, OffsetDateTime};
use tokio::sync::RwLock;
use tracing::{debug, info};

const ROOT_COMMON_NAME: &str = "Loggy Proxy CA";
const ROOT_ORGANIZATION: &str = "Loggy Proxy";
/// Root is valid for 10 years; leaves mint for 825 days, the practical
/// maximum most clients still accept for a non-CA leaf.
const LEAF_VALIDITY_DAYS: i64 = 825;
const ROOT_CERT_FILENAME: &str = "ca.pem";
const ROOT_KEY_FILENAME: &str = "ca-key.pem";

/// A leaf certificate minted and signed by the root, cached per
/// hostname for the lifetime of the proxy process.
pub struct CachedLeaf {
    pub cert_der: Vec<u8>,
    pub key_der: Vec<u8>,
}

/// Owns the root CA key material and mints per-host leaves on demand.
pub struct CertificateAuthority {
    root_cert: Certificate,
    root_keypair: KeyPair,
    root_cert_pem: String,
    cache: RwLock<HashMap<String, Arc<CachedLeaf>>>,
}

impl CertificateAuthority {
    /// Load the root CA from `data_dir/certs`, generating and
    /// persisting a new one if absent. Idempotent across restarts -
    /// the same root is reused so previously-installed trust survives.
    pub fn ensure_root(data_dir: &Path) -> CaResult<Self> {
        let certs_dir = data_dir.join("certs");
        fs::create_dir_all(&certs_dir).map_err(CaError::CreateDir)?;

        let cert_path = certs_dir.join(ROOT_CERT_FILENAME);
        let key_path = certs_dir.join(ROOT_KEY_FILENAME);

        if cert_path.exists() && key_path.exists() {
            info!("loading existing root CA from {}", cert_path.display());
            Self::load(&cert_path, &key_path)
        } else {
            info!("generating new root CA in {}", certs_dir.display());
            let authority = Self::generate()?;
            authority.persist(&cert_path, &key_path)?;
            Ok(authority)
        }
    }

    fn generate() -> CaResult<Self> {
        let root_keypair = KeyPair::generate_for(&rcgen::PKCS_RSA_SHA256)?;

        let mut params = CertificateParams::default();

        let mut dn = DistinguishedName::new();
        dn.push(DnType::CommonName, ROOT_COMMON_NAME);
        dn.push(DnType::OrganizationName, ROOT_ORGANIZATION);
        params.distinguished_name = dn;

        let now = OffsetDateTime::now_utc();
        params.not_before = now - Duration::days(1);
        params.not_after = now + Duration::days(3650);

        params.is_ca = IsCa::Ca(BasicConstraints::Constrained(2));
        params.key_usages = vec![
            KeyUsagePurpose::KeyCertSign,
            KeyUsagePurpose::CrlSign,
            KeyUsagePurpose::DigitalSignature,
        ];

        let mut serial = [0u8; 16];
        rand::thread_rng().fill_bytes(&mut serial);
        params.serial_number = Some(SerialNumber::from_slice(&serial));

        let root_cert = params.self_signed(&root_keypair)?;
        let root_cert_pem = root_cert.pem();

        Ok(Self {
            root_cert,
            root_keypair,
            root_cert_pem,
            cache: RwLock::new(HashMap::new()),
        })
    }

    fn persist(&self, cert_path: &Path, key_path: &Path) -> CaResult<()> {
        let mut cert_file = fs::File::create(cert_path).map_err(CaError::Write)?;
        cert_file
            .write_all(self.root_cert_pem.as_bytes())
            .map_err(CaError::Write)?;

        let key_pem = pkcs8_to_pkcs1_pem(&self.root_keypair)?;
        let mut key_file = fs::File::create(key_path).map_err(CaError::Write)?;
        key_file.write_all(key_pem.as_bytes()).map_err(CaError::Write)?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(cert_path, fs::Permissions::from_mode(0o644))
                .map_err(CaError::Permissions)?;
            fs::set_permissions(key_path, fs::Permissions::from_mode(0o600))
                .map_err(CaError::Permissions)?;
        }

        Ok(())
    }

    fn load(cert_path: &Path, key_path: &Path) -> CaResult<Self> {
        let root_cert_pem = fs::read_to_string(cert_path).map_err(CaError::Read)?;
        let root_key_pem = fs::read_to_string(key_path).map_err(CaError::Read)?;

        let root_keypair = keypair_from_pkcs1_pem(&root_key_pem)?;
        let params = CertificateParams::from_ca_cert_pem(&root_cert_pem)?;
        let root_cert = params.self_signed(&root_keypair)?;

        Ok(Self {
            root_cert,
            root_keypair,
            root_cert_pem,
            cache: RwLock::new(HashMap::new()),
        })
    }

    /// Root certificate in PEM, for distribution to the system trust
    /// store or a browser download endpoint.
    pub fn root_cert_pem(&self) -> &str {
        &self.root_cert_pem
    }

    /// Get or mint a leaf certificate for `hostname`, signed by the
    /// root and cached for the process lifetime.
    pub async fn mint_leaf(&self, hostname: &str) -> CaResult<Arc<CachedLeaf>> {
        {
            let cache = self.cache.read().await;
            if let Some(leaf) = cache.get(hostname) {
                debug!("using cached leaf certificate for {}", hostname);
                return Ok(leaf.clone());
            }
        }

        debug!("minting leaf certificate for {}", hostname);
        let leaf = Arc::new(self.generate_leaf(hostname)?);

        let mut cache = self.cache.write().await;
        cache.insert(hostname.to_string(), leaf.clone());
        Ok(leaf)
    }

    fn generate_leaf(&self, hostname: &str) -> CaResult<CachedLeaf> {
        let leaf_keypair = KeyPair::generate_for(&rcgen::PKCS_RSA_SHA256)?;

        let mut params = CertificateParams::default();

        let mut dn = DistinguishedName::new();
        dn.push(DnType::CommonName, hostname);
        params.distinguished_name = dn;

        let saned_name = hostname
            .to_string()
            .try_into()
            .map_err(|_| CaError::InvalidHostname(hostname.to_string()))?;
        params.subject_alt_names = vec![SanType::DnsName(saned_name)];

        let now = OffsetDateTime::now_utc();
        params.not_before = now - Duration::days(1);
        params.not_after = now + Duration::days(LEAF_VALIDITY_DAYS);

        params.is_ca = IsCa::NoCa;
        params.key_usages = vec![
            KeyUsagePurpose::DigitalSignature,
            KeyUsagePurpose::KeyEncipherment,
        ];
        params.extended_key_usages = vec![ExtendedKeyUsagePurpose::ServerAuth];

        let leaf_cert = params.signed_by(&leaf_keypair, &self.root_cert, &self.root_keypair)?;

        Ok(CachedLeaf {
            cert_der: leaf_cert.der().to_vec(),
            key_der: leaf_keypair.serialize_der(),
        })
    }

    /// Number of leaf certificates currently cached, for diagnostics.
    pub async fn cached_leaf_count(&self) -> usize {
        self.cache.read().await.len()
    }
}

/// Resolve the `certs/` subdirectory under a data directory, matching
/// the layout `ensure_root` writes to.
pub fn certs_dir(data_dir: &Path) -> PathBuf {
    data_dir.join("certs")
}

/// rcgen keypairs serialize as PKCS#8; the on-disk root key is PKCS#1
/// `RSA PRIVATE KEY` so it opens the same way in tools expecting a
/// bare OpenSSL-style RSA key.
fn pkcs8_to_pkcs1_pem(keypair: &KeyPair) -> CaResult<String> {
    let pkcs8_der = keypair.serialize_der();
    let rsa_key = rsa::RsaPrivateKey::from_pkcs8_der(&pkcs8_der)
        .map_err(|e| CaError::KeyEncoding(e.to_string()))?;
    rsa_key
        .to_pkcs1_pem(rsa::pkcs1::LineEnding::LF)
        .map(|pem| pem.to_string())
        .map_err(|e| CaError::KeyEncoding(e.to_string()))
}

fn keypair_from_pkcs1_pem(pem: &str) -> CaResult<KeyPair> {
    let rsa_key = rsa::RsaPrivateKey::from_pkcs1_pem(pem)
        .map_err(|e| CaError::KeyEncoding(e.to_string()))?;
    let pkcs8_der = rsa_key
        .to_pkcs8_der()
        .map_err(|e| CaError::KeyEncoding(e.to_string()))?;
    KeyPair::from_der(pkcs8_der.as_bytes()).map_err(CaError::from)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn generate_produces_valid_pem() {
        let ca = CertificateAuthority::generate().unwrap();
        assert!(ca.root_cert_pem().contains("BEGIN CERTIFICATE"));
    }

    #[test]
    fn ensure_root_persists_and_reloads() {
        let dir = TempDir::new().unwrap();
        let first = CertificateAuthority::ensure_root(dir.path()).unwrap();
        let second = CertificateAuthority::ensure_root(dir.path()).unwrap();
        assert_eq!(first.root_cert_pem(), second.root_cert_pem());
    }

    #[test]
    fn persisted_root_key_is_pkcs1() {
        let dir = TempDir::new().unwrap();
        CertificateAuthority::ensure_root(dir.path()).unwrap();
        let key_path = certs_dir(dir.path()).join(ROOT_KEY_FILENAME);
        let key_pem = fs::read_to_string(&key_path).unwrap();
        assert!(key_pem.contains("BEGIN RSA PRIVATE KEY"));
    }

    #[test]
    fn ensure_root_sets_key_permissions() {
        let dir = TempDir::new().unwrap();
        CertificateAuthority::ensure_root(dir.path()).unwrap();
        let key_path = certs_dir(dir.path()).join(ROOT_KEY_FILENAME);
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mode = fs::metadata(&key_path).unwrap().permissions().mode() & 0o777;
            assert_eq!(mode, 0o600);
        }
    }

    #[tokio::test]
    async fn mint_leaf_is_cached() {
        let dir = TempDir::new().unwrap();
        let ca = CertificateAuthority::ensure_root(dir.path()).unwrap();
        let first = ca.mint_leaf("example.com").await.unwrap();
        let second = ca.mint_leaf("example.com").await.unwrap();
        assert_eq!(first.cert_der, second.cert_der);
        assert_eq!(ca.cached_leaf_count().await, 1);
    }

    #[tokio::test]
    async fn mint_leaf_differs_per_host() {
        let dir = TempDir::new().unwrap();
        let ca = CertificateAuthority::ensure_root(dir.path()).unwrap();
        let a = ca.mint_leaf("a.example.com").await.unwrap();
        let b = ca.mint_leaf("b.example.com").await.unwrap();
        assert_ne!(a.cert_der, b.cert_der);
        assert_eq!(ca.cached_leaf_count().await, 2);
    }
}

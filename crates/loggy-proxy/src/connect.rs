//! TLS setup for one MITM'd CONNECT tunnel.
//!
//! Shaped after `oisp-redirector::windows_main::tls_mitm`: same
//! `ServerConfig`/`ClientConfig` construction from DER bytes via
//! `tokio_rustls`, same root store seeded from `webpki-roots`. That
//! module builds one root store per handler; here it's built once and
//! shared, since it never changes for the life of the process.

use loggy_ca::CachedLeaf;
use rustls::pki_types::{CertificateDer, PrivateKeyDer, PrivatePkcs8KeyDer, ServerName};
use rustls::{ClientConfig, RootCertStore, ServerConfig};
use std::sync::Arc;

/// Parse a CONNECT target of the form `host:port`, defaulting to 443
/// when the port is missing or unparsable.
pub fn parse_connect_target(target: &str) -> (String, u16) {
    match target.rsplit_once(':') {
        Some((host, port)) => match port.parse::<u16>() {
            Ok(port) => (host.to_string(), port),
            Err(_) => (target.to_string(), 443),
        },
        None => (target.to_string(), 443),
    }
}

pub fn upstream_root_store() -> Arc<RootCertStore> {
    let mut store = RootCertStore::empty();
    store.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
    Arc::new(store)
}

pub fn server_config_for_leaf(leaf: &CachedLeaf) -> Result<ServerConfig, rustls::Error> {
    let cert_chain = vec![CertificateDer::from(leaf.cert_der.clone())];
    let key = PrivateKeyDer::from(PrivatePkcs8KeyDer::from(leaf.key_der.clone()));
    ServerConfig::builder()
        .with_no_client_auth()
        .with_single_cert(cert_chain, key)
}

pub fn client_config(root_store: Arc<RootCertStore>) -> ClientConfig {
    ClientConfig::builder()
        .with_root_certificates((*root_store).clone())
        .with_no_client_auth()
}

pub fn server_name(host: &str) -> ServerName<'static> {
    ServerName::try_from(host.to_string()).unwrap_or_else(|_| {
        ServerName::try_from("localhost".to_string()).expect("\"localhost\" is a valid ServerName")
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_host_and_port() {
        assert_eq!(parse_connect_target("api.example.com:443"), ("api.example.com".to_string(), 443));
        assert_eq!(parse_connect_target("api.example.com:8443"), ("api.example.com".to_string(), 8443));
    }

    #[test]
    fn defaults_to_443_without_port() {
        assert_eq!(parse_connect_target("api.example.com"), ("api.example.com".to_string(), 443));
    }
}

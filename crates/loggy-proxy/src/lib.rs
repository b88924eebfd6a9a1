//! MITM Proxy (C2): the forward-proxy listener that terminates client
//! TLS with a minted leaf certificate, relays to the real upstream,
//! and tees request bodies to the extractor.
//!
//! Shaped after `oisp-redirector::windows_main`'s proxy: same
//! per-connection task model and TLS accept/connect shape as
//! `tls_mitm::TlsMitmHandler::handle_connection`, generalized from a
//! transparent-redirect target (`SO_ORIGINAL_DST`) to an HTTP CONNECT
//! target, since this proxy is a conventional forward proxy rather
//! than a kernel-level redirect.

mod compress;
mod connect;
mod http_message;
mod relay;

use http_message::ParsedMessage;
use loggy_ca::CertificateAuthority;
use loggy_core::config::ProxySettings;
use loggy_core::error::StartupError;
use loggy_core::event::EventRingBuffer;
use loggy_registry::SourceRegistry;
use rustls::RootCertStore;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{watch, Mutex};
use tokio_rustls::{TlsAcceptor, TlsConnector};
use tracing::{debug, info, warn};

/// State machine per CONNECT connection: terminal states always lead
/// to `Closed`, logged here purely for observability.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ConnectionState {
    Accepted,
    Handshaking,
    Mitming,
    ClientEof,
    UpstreamEof,
    Error,
    Closed,
}

/// Owns the listening socket and the shared state every connection
/// task needs: the CA (for leaf minting), the source registry, and the
/// event ring buffer.
#[derive(Clone)]
pub struct ProxyServer {
    ca: Arc<CertificateAuthority>,
    registry: Arc<SourceRegistry>,
    buffer: Arc<Mutex<EventRingBuffer>>,
    settings: ProxySettings,
    root_store: Arc<RootCertStore>,
}

impl ProxyServer {
    pub fn new(
        ca: Arc<CertificateAuthority>,
        registry: Arc<SourceRegistry>,
        buffer: Arc<Mutex<EventRingBuffer>>,
        settings: ProxySettings,
    ) -> Self {
        Self {
            ca,
            registry,
            buffer,
            settings,
            root_store: connect::upstream_root_store(),
        }
    }

    /// Accept connections until `shutdown` is signaled. Each
    /// connection runs on its own task; a per-connection error never
    /// stops the listener - per-connection failures are isolated.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) -> Result<(), StartupError> {
        let addr = format!("{}:{}", self.settings.bind_host, self.settings.port);
        let listener = TcpListener::bind(&addr).await.map_err(StartupError::PortInUse)?;
        info!("MITM proxy listening on {addr}");

        loop {
            tokio::select! {
                accepted = listener.accept() => {
                    match accepted {
                        Ok((stream, peer)) => {
                            let server = self.clone();
                            tokio::spawn(async move {
                                server.handle_connection(stream, peer).await;
                            });
                        }
                        Err(e) => warn!("failed to accept connection: {e}"),
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        info!("proxy listener shutting down");
                        return Ok(());
                    }
                }
            }
        }
    }

    async fn handle_connection(&self, stream: TcpStream, peer: SocketAddr) {
        let mut state = ConnectionState::Accepted;
        debug!(%peer, ?state, "connection accepted");

        let idle_timeout = Duration::from_secs(self.settings.idle_timeout_secs);
        let mut client = BufReader::new(stream);

        let first = match tokio::time::timeout(
            idle_timeout,
            http_message::read_message(&mut client, true, self.settings.max_body_bytes),
        )
        .await
        {
            Ok(Ok(Some(msg))) => msg,
            Ok(Ok(None)) => {
                state = ConnectionState::ClientEof;
                debug!(%peer, ?state, "client closed before sending a request");
                return;
            }
            Ok(Err(e)) => {
                state = ConnectionState::Error;
                debug!(%peer, ?state, error = %e, "failed to read initial request");
                return;
            }
            Err(_) => {
                state = ConnectionState::ClientEof;
                debug!(%peer, ?state, "idle connection timed out before any request");
                return;
            }
        };

        let result = if first.method.as_deref() == Some("CONNECT") {
            state = ConnectionState::Handshaking;
            self.handle_connect(client, first, peer, &mut state).await
        } else {
            state = ConnectionState::Mitming;
            self.handle_plain_http(client, first, peer, idle_timeout).await
        };

        match result {
            Ok(relay::CloseReason::ClientEof) => state = ConnectionState::ClientEof,
            Ok(relay::CloseReason::UpstreamEof) => state = ConnectionState::UpstreamEof,
            Ok(relay::CloseReason::Done) => {}
            Err(e) => {
                state = ConnectionState::Error;
                debug!(%peer, ?state, error = %e, "connection ended with an error");
            }
        }
        debug!(%peer, terminal = ?state, "connection closed");
    }

    async fn handle_connect(
        &self,
        mut client: BufReader<TcpStream>,
        request: ParsedMessage,
        peer: SocketAddr,
        state: &mut ConnectionState,
    ) -> std::io::Result<relay::CloseReason> {
        let target = request.path.clone().unwrap_or_default();
        let (host, port) = connect::parse_connect_target(&target);
        debug!(%peer, %host, port, "CONNECT target");

        client
            .write_all(b"HTTP/1.1 200 Connection Established\r\n\r\n")
            .await?;
        client.flush().await?;

        let leaf = self.ca.mint_leaf(&host).await.map_err(|e| {
            std::io::Error::new(std::io::ErrorKind::Other, format!("leaf cert mint failed: {e}"))
        })?;
        let server_config = connect::server_config_for_leaf(&leaf)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e.to_string()))?;
        let acceptor = TlsAcceptor::from(Arc::new(server_config));
        let tls_client = acceptor.accept(client).await?;
        debug!(%peer, %host, "TLS handshake with client complete");

        let upstream_tcp = TcpStream::connect((host.as_str(), port)).await?;
        let client_config = connect::client_config(self.root_store.clone());
        let connector = TlsConnector::from(Arc::new(client_config));
        let server_name = connect::server_name(&host);
        let tls_upstream = connector.connect(server_name, upstream_tcp).await?;
        debug!(%peer, %host, "TLS handshake with upstream complete");

        *state = ConnectionState::Mitming;
        debug!(%peer, ?state, "entering MITM relay loop");

        let ctx = relay::RelayContext {
            registry: self.registry.clone(),
            buffer: self.buffer.clone(),
            max_body_bytes: self.settings.max_body_bytes,
            idle_timeout: Duration::from_secs(self.settings.idle_timeout_secs),
            scheme: "https",
            default_host: Some(host),
        };
        relay::relay(tls_client, tls_upstream, &ctx).await
    }

    async fn handle_plain_http(
        &self,
        client: BufReader<TcpStream>,
        first: ParsedMessage,
        peer: SocketAddr,
        idle_timeout: Duration,
    ) -> std::io::Result<relay::CloseReason> {
        let (host, port) = plain_http_target(&first).ok_or_else(|| {
            std::io::Error::new(std::io::ErrorKind::InvalidData, "no target host for plain HTTP proxy request")
        })?;
        debug!(%peer, %host, port, "plain HTTP proxy target");

        let upstream = TcpStream::connect((host.as_str(), port)).await?;

        let ctx = relay::RelayContext {
            registry: self.registry.clone(),
            buffer: self.buffer.clone(),
            max_body_bytes: self.settings.max_body_bytes,
            idle_timeout,
            scheme: "http",
            default_host: Some(host),
        };
        relay::relay_with_first(client, upstream, &ctx, first).await
    }
}

fn plain_http_target(request: &ParsedMessage) -> Option<(String, u16)> {
    let path = request.path.as_deref()?;
    if let Ok(url) = url::Url::parse(path) {
        if url.scheme() == "http" {
            let host = url.host_str()?.to_string();
            let port = url.port().unwrap_or(80);
            return Some((host, port));
        }
    }
    let host_header = request.header("host")?;
    match host_header.rsplit_once(':') {
        Some((host, port)) => port.parse::<u16>().ok().map(|p| (host.to_string(), p)),
        None => Some((host_header.to_string(), 80)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_target_from_absolute_uri() {
        let msg = ParsedMessage {
            raw: Vec::new(),
            method: Some("GET".into()),
            path: Some("http://example.com:8080/x".into()),
            status: None,
            headers: Vec::new(),
            decoded_body: Vec::new(),
            body_truncated: false,
        };
        assert_eq!(plain_http_target(&msg), Some(("example.com".to_string(), 8080)));
    }

    #[test]
    fn plain_target_from_host_header() {
        let msg = ParsedMessage {
            raw: Vec::new(),
            method: Some("GET".into()),
            path: Some("/x".into()),
            status: None,
            headers: vec![("Host".to_string(), "example.com".to_string())],
            decoded_body: Vec::new(),
            body_truncated: false,
        };
        assert_eq!(plain_http_target(&msg), Some(("example.com".to_string(), 80)));
    }
}

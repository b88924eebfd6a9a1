//! Error taxonomy, grouped by the point in the system where a failure
//! is visible: fatal/startup, per-connection, per-request, and
//! control-plane. Per-request errors never propagate past the
//! extractor - they are logged and the request proceeds unchanged.

use thiserror::Error;

/// Fatal at proxy startup: the process exits nonzero and never starts
/// listening.
#[derive(Debug, Error)]
pub enum StartupError {
    #[error("CA material unavailable: {0}")]
    CaUnavailable(String),
    #[error("port already in use: {0}")]
    PortInUse(std::io::Error),
    #[error("failed to write native-messaging host manifest: {0}")]
    ManifestWriteFailed(std::io::Error),
}

/// Per-connection failures. The listener keeps running; only the
/// affected connection is torn down.
#[derive(Debug, Error)]
pub enum ProxyConnectionError {
    #[error("TLS handshake failed: {0}")]
    TlsHandshake(String),
    #[error("upstream host unreachable: {0}")]
    UpstreamUnreachable(std::io::Error),
    #[error("request body exceeded the configured maximum size")]
    BodyTooLarge,
    #[error("failed to decompress body with content-encoding {encoding}: {source}")]
    DecompressionFailed {
        encoding: String,
        source: std::io::Error,
    },
}

/// Per-request failures inside the extractor. Always swallowed into
/// logs and an empty event list - never surfaced to the proxied
/// client.
#[derive(Debug, Error)]
pub enum RequestError {
    #[error("body could not be parsed as JSON or form data")]
    UnparseableBody,
    #[error("path `{0}` did not resolve against the payload")]
    PathResolutionMiss(String),
    #[error("no events could be extracted from the payload")]
    NoEventsExtracted,
}

/// Control-plane failures, surfaced in the `error` field of an RPC
/// response or as an HTTP error body. Never crash the supervisor.
#[derive(Debug, Error)]
pub enum ControlError {
    #[error("unknown action: {0}")]
    UnknownAction(String),
    #[error("proxy is not running")]
    ProxyNotRunning,
    #[error("proxy is already running")]
    AlreadyRunning,
    #[error("trust store unavailable: {0}")]
    TrustStoreUnavailable(String),
    #[error("proxy failed to start")]
    StartFailed,
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

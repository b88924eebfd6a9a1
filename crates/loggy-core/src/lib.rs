//! Loggy Core - shared types for the Loggy analytics proxy
//!
//! - **path**: the dotted/bracket JSON path resolver (`events[0].name`)
//!   used by the source registry and event extractor. Payloads are
//!   represented with `serde_json::Value`, which is already the
//!   `{null, bool, number, string, array, object}` variant this system
//!   needs, so the resolver is the only parser required on top of it.
//! - **source**: the declarative source-rule type shared between the
//!   registry and the extractor.
//! - **event**: the normalized captured-event record.
//! - **config**: TOML-backed process configuration.
//! - **error**: the fatal/per-connection/per-request/control-plane
//!   error taxonomy.

pub mod config;
pub mod error;
pub mod event;
pub mod path;
pub mod source;
pub mod time;

pub use config::LoggyConfig;
pub use error::{ControlError, ProxyConnectionError, RequestError, StartupError};
pub use event::CapturedEvent;
pub use source::{FieldMappings, Source, SourceStats};

/// Loggy proxy version (also reported by the control API if ever needed).
pub const LOGGY_VERSION: &str = env!("CARGO_PKG_VERSION");

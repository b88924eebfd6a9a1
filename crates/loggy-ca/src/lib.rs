//! CA store (C1): root certificate lifecycle, per-host leaf minting,
//! and best-effort trust store installation.

mod authority;
mod error;
mod trust;

pub use authority::{certs_dir, CachedLeaf, CertificateAuthority};
pub use error::{CaError, CaResult};
pub use trust::{platform_trust_store, trust_root, LinuxTrustStore, MacOsTrustStore, NoopTrustStore, TrustStore};

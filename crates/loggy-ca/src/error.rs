use thiserror::Error;

#[derive(Debug, Error)]
pub enum CaError {
    #[error("failed to create CA directory: {0}")]
    CreateDir(std::io::Error),
    #[error("failed to read CA material: {0}")]
    Read(std::io::Error),
    #[error("failed to write CA material: {0}")]
    Write(std::io::Error),
    #[error("failed to set permissions on CA key: {0}")]
    Permissions(std::io::Error),
    #[error("certificate generation failed: {0}")]
    Generation(rcgen::Error),
    #[error("invalid hostname for SAN: {0}")]
    InvalidHostname(String),
    #[error("failed to re-encode root key as PKCS#1: {0}")]
    KeyEncoding(String),
}

impl From<rcgen::Error> for CaError {
    fn from(e: rcgen::Error) -> Self {
        CaError::Generation(e)
    }
}

pub type CaResult<T> = Result<T, CaError>;

//! Error taxonomy for the CA core.
//!
//! Cryptographic and I/O failures propagate unmodified; there is no retry
//! anywhere in the core. Authentication failures belong to the HTTP layer
//! and are deliberately absent here.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum PkiError {
    /// Malformed PEM/key/certificate input. A local bug or corrupted
    /// storage, never retried.
    #[error("codec error: {0}")]
    Codec(String),

    /// An expected artifact is absent from durable storage.
    #[error("{0} not found")]
    NotFound(&'static str),

    /// CA bootstrap could not produce usable CA material.
    #[error("issuing CA unavailable: {0}")]
    CaUnavailable(String),

    #[error("crypto error: {0}")]
    Crypto(#[from] openssl::error::ErrorStack),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, PkiError>;

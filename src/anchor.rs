//! Server trust-anchor retrieval.
//!
//! Read-only path over pre-provisioned artifacts: a privately-operated
//! server CA certificate in the PKI volume, or a full certificate chain in
//! the broker volume. This never touches the issuing CA.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use crate::configs::CertMode;
use crate::error::{PkiError, Result};

/// Bundle/download name for the private server CA certificate.
pub const SERVER_CA_FILE_NAME: &str = "server_ca.crt";
/// Bundle/download name for the publicly-trusted full chain.
pub const SERVER_FULLCHAIN_FILE_NAME: &str = "server_fullchain.crt";

/// On-disk name of the full chain inside the broker volume.
const FULL_CHAIN_SOURCE_FILE: &str = "server.crt";

pub struct TrustAnchors {
    server_ca_path: PathBuf,
    full_chain_path: PathBuf,
}

impl TrustAnchors {
    pub fn new(pki_dir: &Path, mqtt_dir: &Path) -> Self {
        Self {
            server_ca_path: pki_dir.join(SERVER_CA_FILE_NAME),
            full_chain_path: mqtt_dir.join(FULL_CHAIN_SOURCE_FILE),
        }
    }

    /// Whether any server trust anchor can be served, for connection
    /// metadata.
    pub fn available(&self) -> bool {
        self.server_ca_path.exists() || self.full_chain_path.exists()
    }

    /// Fetch the server trust anchor for direct download. Prefers the
    /// private server CA; falls back to the full chain.
    pub fn download(&self) -> Result<(&'static str, Vec<u8>)> {
        if let Some(bytes) = read_optional(&self.server_ca_path)? {
            return Ok((SERVER_CA_FILE_NAME, bytes));
        }
        if let Some(bytes) = read_optional(&self.full_chain_path)? {
            return Ok((SERVER_FULLCHAIN_FILE_NAME, bytes));
        }
        Err(PkiError::NotFound("server CA/chain"))
    }

    /// Fetch the mode-appropriate optional artifact for credential bundles.
    /// Absence is not an error; the bundle is simply smaller.
    pub fn bundle_anchor(&self, mode: CertMode) -> Result<Option<(&'static str, Vec<u8>)>> {
        let (name, path) = match mode {
            CertMode::Private => (SERVER_CA_FILE_NAME, &self.server_ca_path),
            CertMode::Public => (SERVER_FULLCHAIN_FILE_NAME, &self.full_chain_path),
        };
        Ok(read_optional(path)?.map(|bytes| (name, bytes)))
    }
}

fn read_optional(path: &Path) -> Result<Option<Vec<u8>>> {
    match fs::read(path) {
        Ok(bytes) => Ok(Some(bytes)),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

//! On-disk store for the issuing CA key/certificate pair.
//!
//! The pair lives at a fixed pair of paths inside the PKI volume. The key
//! file is owner-readable only; the certificate is world-readable. Writes go
//! through a temporary file and an atomic rename so a concurrent reader
//! never observes a partially written artifact, and a crash between the two
//! writes leaves a pair that [`CaStore::exists`] reports as absent.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use openssl::pkey::{PKey, Private};
use openssl::x509::X509;
use tempfile::NamedTempFile;

use crate::codec;
use crate::error::{PkiError, Result};

pub const CA_KEY_FILE_NAME: &str = "issuing_ca.key";
pub const CA_CERT_FILE_NAME: &str = "issuing_ca.crt";

const KEY_FILE_MODE: u32 = 0o600;
const CERT_FILE_MODE: u32 = 0o644;

/// The issuing CA's private key and self-signed certificate.
pub struct IssuingCa {
    pub key: PKey<Private>,
    pub cert: X509,
}

/// Manages the durable location and existence state of the issuing CA pair.
pub struct CaStore {
    key_path: PathBuf,
    cert_path: PathBuf,
}

impl CaStore {
    pub fn new(pki_dir: &Path) -> Self {
        Self {
            key_path: pki_dir.join(CA_KEY_FILE_NAME),
            cert_path: pki_dir.join(CA_CERT_FILE_NAME),
        }
    }

    /// True iff both artifacts are present and individually non-empty.
    ///
    /// A zero-length file counts as absent so an interrupted bootstrap is
    /// re-run rather than trusted.
    pub fn exists(&self) -> bool {
        file_non_empty(&self.key_path) && file_non_empty(&self.cert_path)
    }

    /// Load the CA pair from durable storage.
    pub fn load(&self) -> Result<IssuingCa> {
        let key_pem = read_artifact(&self.key_path, "issuing CA key")?;
        let cert_pem = read_artifact(&self.cert_path, "issuing CA certificate")?;

        Ok(IssuingCa {
            key: codec::decode_private_key(&key_pem)?,
            cert: codec::decode_certificate(&cert_pem)?,
        })
    }

    /// Persist the CA pair. Key 0600, certificate 0644, each written to a
    /// temporary file in the target directory and renamed into place.
    pub fn save(&self, ca: &IssuingCa) -> Result<()> {
        if let Some(dir) = self.key_path.parent() {
            fs::create_dir_all(dir)?;
        }

        let key_pem = codec::encode_private_key_pkcs8(&ca.key)?;
        let cert_pem = codec::encode_certificate(&ca.cert)?;

        write_atomic(&self.key_path, &key_pem, KEY_FILE_MODE)?;
        write_atomic(&self.cert_path, &cert_pem, CERT_FILE_MODE)?;
        Ok(())
    }
}

fn file_non_empty(path: &Path) -> bool {
    fs::metadata(path).map(|m| m.len() > 0).unwrap_or(false)
}

fn read_artifact(path: &Path, what: &'static str) -> Result<Vec<u8>> {
    match fs::read(path) {
        Ok(bytes) if !bytes.is_empty() => Ok(bytes),
        Ok(_) => Err(PkiError::NotFound(what)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(PkiError::NotFound(what)),
        Err(e) => Err(e.into()),
    }
}

fn write_atomic(path: &Path, contents: &[u8], mode: u32) -> Result<()> {
    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    let mut tmp = NamedTempFile::new_in(dir)?;
    tmp.write_all(contents)?;
    tmp.as_file().sync_all()?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        tmp.as_file()
            .set_permissions(fs::Permissions::from_mode(mode))?;
    }
    #[cfg(not(unix))]
    let _ = mode;

    tmp.persist(path).map_err(|e| PkiError::Io(e.error))?;
    Ok(())
}

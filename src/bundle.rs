//! Trust bundle assembly and packaging.
//!
//! [`TrustBundle::assemble`] is pure artifact selection and naming; it
//! performs no I/O and no cryptography. Packaging into a downloadable
//! archive is a separate step so the issuance path stays testable without
//! any archive format in the loop.

use std::io::Write;

use flate2::write::GzEncoder;
use flate2::Compression;

use crate::error::Result;

pub const CLIENT_CERT_NAME: &str = "client.crt";
pub const CLIENT_KEY_NAME: &str = "client_pkcs8.key";
pub const CA_CERT_NAME: &str = "ca.crt";

/// An ephemeral, in-memory collection of named byte artifacts assembled
/// for exactly one response.
pub struct TrustBundle {
    entries: Vec<(&'static str, Vec<u8>)>,
}

impl TrustBundle {
    /// Collect the artifacts an issued client needs: its certificate, its
    /// PKCS#8 key, the issuing CA certificate, and optionally a server
    /// trust anchor under the name the anchor lookup resolved for it.
    pub fn assemble(
        client_cert_pem: Vec<u8>,
        client_key_pem: Vec<u8>,
        ca_cert_pem: Vec<u8>,
        server_anchor: Option<(&'static str, Vec<u8>)>,
    ) -> Self {
        let mut entries = vec![
            (CLIENT_CERT_NAME, client_cert_pem),
            (CLIENT_KEY_NAME, client_key_pem),
            (CA_CERT_NAME, ca_cert_pem),
        ];
        if let Some((name, bytes)) = server_anchor {
            entries.push((name, bytes));
        }
        Self { entries }
    }

    pub fn entries(&self) -> &[(&'static str, Vec<u8>)] {
        &self.entries
    }

    /// Package the bundle as a deflate-compressed tar archive.
    pub fn to_tar_gz(&self) -> Result<Vec<u8>> {
        let encoder = GzEncoder::new(Vec::new(), Compression::default());
        let mut archive = tar::Builder::new(encoder);

        for (name, data) in &self.entries {
            let mut header = tar::Header::new_gnu();
            header.set_size(data.len() as u64);
            header.set_mode(0o644);
            header.set_cksum();
            archive.append_data(&mut header, name, data.as_slice())?;
        }

        let mut encoder = archive.into_inner()?;
        encoder.flush()?;
        Ok(encoder.finish()?)
    }
}

/// Download file name for a connector credential archive.
pub fn archive_file_name(common_name: &str) -> String {
    format!("connector-creds-{}.tar.gz", common_name)
}

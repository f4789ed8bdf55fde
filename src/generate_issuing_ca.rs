//! Issuing CA Certificate Generation Module
//!
//! Generates the self-signed issuing CA that anchors every connector
//! credential this service hands out.
//!
//! # Certificate Properties
//! - **Self-signed**: issuer and subject are the same single-CN name
//! - **Basic Constraints**: CA=true, pathlen=0 (signs leaves only), critical
//! - **Key Usage**: keyCertSign, cRLSign, critical
//! - **Key Size**: RSA 4096-bit
//! - **Signature Algorithm**: SHA-256 with RSA
//! - **Validity**: backdated one day to tolerate verifier clock skew,
//!   expiring ten years out
//!
//! # Example
//! ```rust,no_run
//! # use edge_ca::generate_issuing_ca::RsaIssuingCaBuilder;
//! # fn example() -> edge_ca::error::Result<()> {
//! let (ca_key, ca_cert) = RsaIssuingCaBuilder::new()
//!     .subject_common_name("Edge Issuing CA".to_string())
//!     .build()?;
//! # Ok(())
//! # }
//! ```

use std::io;
use std::time::{SystemTime, UNIX_EPOCH};

use openssl::asn1::Asn1Time;
use openssl::bn::{BigNum, MsbOption};
use openssl::hash::MessageDigest;
use openssl::pkey::{PKey, Private};
use openssl::x509::extension::{BasicConstraints, KeyUsage};
use openssl::x509::{X509Name, X509};

use crate::error::Result;

const X509_VERSION_3: i32 = 2; // X509 version 3 is represented by 2
const CA_RSA_KEY_SIZE: u32 = 4096;
const CA_PATH_LENGTH: u32 = 0;
const CA_VALIDITY_DAYS: u32 = 3650;
const CA_BACKDATE_SECS: i64 = 24 * 60 * 60;

/// Builder for the self-signed issuing CA key pair and certificate.
///
/// The issuing CA signs end-entity connector certificates directly, so its
/// path length constraint is 0 and its key usage is restricted to
/// certificate and CRL signing. The private key never leaves the process
/// except through [`CaStore::save`](crate::store::CaStore::save).
pub struct RsaIssuingCaBuilder {
    subject_common_name: String,
    validity_days: u32,
}

impl RsaIssuingCaBuilder {
    pub fn new() -> Self {
        Self {
            subject_common_name: String::new(),
            validity_days: CA_VALIDITY_DAYS,
        }
    }

    /// Set the common name (CN), the only attribute in the CA's subject.
    pub fn subject_common_name(mut self, cn: String) -> Self {
        self.subject_common_name = cn;
        self
    }

    /// Set validity period in days (default: 3650).
    pub fn validity_days(mut self, days: u32) -> Self {
        self.validity_days = days;
        self
    }

    /// Build the RSA-4096 key pair and self-signed issuing CA certificate.
    ///
    /// # Errors
    /// Returns `PkiError::Crypto` if key generation, extension construction
    /// or signing fails.
    pub fn build(self) -> Result<(PKey<Private>, X509)> {
        let rsa = openssl::rsa::Rsa::generate(CA_RSA_KEY_SIZE)?;
        let private_key = PKey::from_rsa(rsa)?;

        let mut builder = X509::builder()?;
        builder.set_version(X509_VERSION_3)?;

        // Random 128-bit serial number
        let mut serial = BigNum::new()?;
        serial.rand(128, MsbOption::MAYBE_ZERO, false)?;
        let serial = serial.to_asn1_integer()?;
        builder.set_serial_number(&serial)?;

        let mut name_builder = X509Name::builder()?;
        name_builder.append_entry_by_nid(openssl::nid::Nid::COMMONNAME, &self.subject_common_name)?;
        let name = name_builder.build();

        builder.set_subject_name(&name)?;
        builder.set_issuer_name(&name)?;

        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_err(io::Error::other)?
            .as_secs() as i64;
        let not_before = Asn1Time::from_unix(now - CA_BACKDATE_SECS)?;
        builder.set_not_before(&not_before)?;
        let not_after = Asn1Time::days_from_now(self.validity_days)?;
        builder.set_not_after(&not_after)?;

        builder.set_pubkey(&private_key)?;

        let mut bc = BasicConstraints::new();
        bc.critical().ca().pathlen(CA_PATH_LENGTH);
        builder.append_extension(bc.build()?)?;

        // keyCertSign + cRLSign only; the CA key never enciphers or signs
        // application data
        let mut ku = KeyUsage::new();
        ku.critical();
        ku.key_cert_sign();
        ku.crl_sign();
        builder.append_extension(ku.build()?)?;

        builder.sign(&private_key, MessageDigest::sha256())?;
        Ok((private_key, builder.build()))
    }
}

impl Default for RsaIssuingCaBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ca_certificate_is_self_signed() {
        let (key, cert) = RsaIssuingCaBuilder::new()
            .subject_common_name("Test Issuing CA".to_string())
            .build()
            .unwrap();

        assert!(cert.verify(&key).unwrap());
        assert_eq!(
            cert.subject_name().try_cmp(cert.issuer_name()).unwrap(),
            std::cmp::Ordering::Equal
        );
    }

    #[test]
    fn test_ca_certificate_extensions() {
        let (_, cert) = RsaIssuingCaBuilder::new()
            .subject_common_name("Test Issuing CA".to_string())
            .build()
            .unwrap();

        let text = String::from_utf8(cert.to_text().unwrap()).unwrap();
        assert!(text.contains("CA:TRUE"), "missing CA:TRUE: {}", text);
        assert!(text.contains("pathlen:0"), "missing pathlen:0: {}", text);
        assert!(
            text.contains("Certificate Sign, CRL Sign"),
            "unexpected key usage: {}",
            text
        );
        assert!(!text.contains("Key Encipherment"));
    }

    #[test]
    fn test_ca_not_before_is_backdated() {
        let (_, cert) = RsaIssuingCaBuilder::new()
            .subject_common_name("Test Issuing CA".to_string())
            .build()
            .unwrap();

        let now = Asn1Time::days_from_now(0).unwrap();
        // not_before lies in the past
        let diff = cert.not_before().diff(&now).unwrap();
        assert!(diff.days > 0 || diff.secs > 0);
    }
}

//! Connector Client Certificate Generation Module
//!
//! Generates end-entity client-auth certificates signed by the issuing CA.
//! A fresh RSA-2048 key pair is generated per request, wrapped in a CSR
//! signed by that key, and the CSR's subject and public key are signed into
//! a leaf certificate by the CA.
//!
//! # Certificate Properties
//! - **Basic Constraints**: CA=false, critical
//! - **Key Usage**: digitalSignature, keyEncipherment, critical
//! - **Extended Key Usage**: clientAuth
//! - **Signature Algorithm**: SHA-256 with RSA
//! - **Validity**: backdated one hour, expiring one year out

use std::io;
use std::time::{SystemTime, UNIX_EPOCH};

use openssl::asn1::Asn1Time;
use openssl::bn::{BigNum, MsbOption};
use openssl::hash::MessageDigest;
use openssl::pkey::{PKey, Private};
use openssl::x509::extension::{BasicConstraints, ExtendedKeyUsage, KeyUsage};
use openssl::x509::{X509Name, X509Req, X509};

use crate::error::Result;

const X509_VERSION_3: i32 = 2; // X509 version 3 is represented by 2
const CLIENT_RSA_KEY_SIZE: u32 = 2048;
const CLIENT_VALIDITY_DAYS: u32 = 365;
const CLIENT_BACKDATE_SECS: i64 = 60 * 60;

/// Builder for RSA key pairs and client-auth certificates signed by the
/// issuing CA.
pub struct RsaClientCertBuilder {
    subject_common_name: String,
    validity_days: u32,
    signing_key: PKey<Private>,
    signing_cert: X509,
}

impl RsaClientCertBuilder {
    /// # Arguments
    /// * `ca_key` - issuing CA's private key for signing
    /// * `ca_cert` - issuing CA's certificate (issuer information)
    pub fn new(ca_key: PKey<Private>, ca_cert: X509) -> Self {
        Self {
            subject_common_name: String::new(),
            validity_days: CLIENT_VALIDITY_DAYS,
            signing_key: ca_key,
            signing_cert: ca_cert,
        }
    }

    /// Set the common name (CN) identifying the connector.
    pub fn subject_common_name(mut self, cn: String) -> Self {
        self.subject_common_name = cn;
        self
    }

    /// Set validity period in days (default: 365).
    pub fn validity_days(mut self, days: u32) -> Self {
        self.validity_days = days;
        self
    }

    /// Build the key pair and CA-signed client certificate.
    ///
    /// The certificate's subject comes from an intermediate CSR signed with
    /// the fresh private key, so the issued identity is exactly what a
    /// standalone enrollment flow would have requested.
    pub fn build(self) -> Result<(PKey<Private>, X509)> {
        let rsa = openssl::rsa::Rsa::generate(CLIENT_RSA_KEY_SIZE)?;
        let private_key = PKey::from_rsa(rsa)?;

        let csr = self.build_csr(&private_key)?;

        let mut builder = X509::builder()?;
        builder.set_version(X509_VERSION_3)?;

        // Random 128-bit serial number
        let mut serial = BigNum::new()?;
        serial.rand(128, MsbOption::MAYBE_ZERO, false)?;
        let serial = serial.to_asn1_integer()?;
        builder.set_serial_number(&serial)?;

        builder.set_subject_name(csr.subject_name())?;
        builder.set_issuer_name(self.signing_cert.subject_name())?;

        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_err(io::Error::other)?
            .as_secs() as i64;
        let not_before = Asn1Time::from_unix(now - CLIENT_BACKDATE_SECS)?;
        builder.set_not_before(&not_before)?;
        let not_after = Asn1Time::days_from_now(self.validity_days)?;
        builder.set_not_after(&not_after)?;

        builder.set_pubkey(&private_key)?;

        // CA=false, no pathlen: end-entity certificate
        let mut bc = BasicConstraints::new();
        bc.critical();
        builder.append_extension(bc.build()?)?;

        let mut ku = KeyUsage::new();
        ku.critical();
        ku.digital_signature();
        ku.key_encipherment();
        builder.append_extension(ku.build()?)?;

        let mut eku = ExtendedKeyUsage::new();
        eku.client_auth();
        builder.append_extension(eku.build()?)?;

        builder.sign(&self.signing_key, MessageDigest::sha256())?;

        Ok((private_key, builder.build()))
    }

    fn build_csr(&self, key: &PKey<Private>) -> Result<X509Req> {
        let mut name_builder = X509Name::builder()?;
        name_builder.append_entry_by_nid(openssl::nid::Nid::COMMONNAME, &self.subject_common_name)?;
        let subject = name_builder.build();

        let mut req_builder = X509Req::builder()?;
        req_builder.set_subject_name(&subject)?;
        req_builder.set_pubkey(key)?;
        req_builder.sign(key, MessageDigest::sha256())?;
        Ok(req_builder.build())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generate_issuing_ca::RsaIssuingCaBuilder;

    fn test_ca() -> (PKey<Private>, X509) {
        RsaIssuingCaBuilder::new()
            .subject_common_name("Test Issuing CA".to_string())
            .build()
            .unwrap()
    }

    #[test]
    fn test_client_certificate_verifies_against_ca() {
        let (ca_key, ca_cert) = test_ca();
        let (_, cert) = RsaClientCertBuilder::new(ca_key, ca_cert.clone())
            .subject_common_name("connector-1".to_string())
            .build()
            .unwrap();

        assert!(cert.verify(&ca_cert.public_key().unwrap()).unwrap());
        assert_eq!(
            cert.issuer_name().try_cmp(ca_cert.subject_name()).unwrap(),
            std::cmp::Ordering::Equal
        );
    }

    #[test]
    fn test_client_certificate_extensions() {
        let (ca_key, ca_cert) = test_ca();
        let (_, cert) = RsaClientCertBuilder::new(ca_key, ca_cert)
            .subject_common_name("connector-1".to_string())
            .build()
            .unwrap();

        let text = String::from_utf8(cert.to_text().unwrap()).unwrap();
        assert!(text.contains("CA:FALSE"), "missing CA:FALSE: {}", text);
        assert!(
            text.contains("Digital Signature, Key Encipherment"),
            "unexpected key usage: {}",
            text
        );
        assert!(
            text.contains("TLS Web Client Authentication"),
            "missing clientAuth EKU: {}",
            text
        );
    }

    #[test]
    fn test_certificate_public_key_matches_private_key() {
        let (ca_key, ca_cert) = test_ca();
        let (key, cert) = RsaClientCertBuilder::new(ca_key, ca_cert)
            .subject_common_name("connector-1".to_string())
            .build()
            .unwrap();

        assert_eq!(
            cert.public_key().unwrap().public_key_to_pem().unwrap(),
            key.public_key_to_pem().unwrap()
        );
    }

    #[test]
    fn test_serial_numbers_are_unique() {
        let (ca_key, ca_cert) = test_ca();
        let (_, a) = RsaClientCertBuilder::new(ca_key.clone(), ca_cert.clone())
            .subject_common_name("connector-a".to_string())
            .build()
            .unwrap();
        let (_, b) = RsaClientCertBuilder::new(ca_key, ca_cert)
            .subject_common_name("connector-b".to_string())
            .build()
            .unwrap();

        let serial_a = a.serial_number().to_bn().unwrap();
        let serial_b = b.serial_number().to_bn().unwrap();
        assert_ne!(serial_a.to_vec(), serial_b.to_vec());
    }
}

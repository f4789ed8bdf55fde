//! CA bootstrap and certificate issuance engine.
//!
//! [`Issuer::ensure_ca`] is the only writer of CA material. Once the pair
//! exists on disk it is immutable for the process lifetime, so the dominant
//! steady-state path is a lock-free read. First-time bootstrap runs under a
//! process-wide mutex with a second existence check after acquisition, so
//! concurrent first requests converge on a single persisted CA.

use std::io;
use std::path::Path;
use std::sync::Mutex;
use std::time::{SystemTime, UNIX_EPOCH};

use openssl::pkey::{PKey, Private};
use openssl::x509::X509;

use crate::error::{PkiError, Result};
use crate::generate_client_cert::RsaClientCertBuilder;
use crate::generate_issuing_ca::RsaIssuingCaBuilder;
use crate::store::{CaStore, IssuingCa};

const SYNTHESIZED_CN_PREFIX: &str = "connector";

pub struct Issuer {
    store: CaStore,
    ca_common_name: String,
    bootstrap_lock: Mutex<()>,
}

impl Issuer {
    pub fn new(pki_dir: &Path, ca_common_name: String) -> Self {
        Self {
            store: CaStore::new(pki_dir),
            ca_common_name,
            bootstrap_lock: Mutex::new(()),
        }
    }

    /// Return the issuing CA, creating and persisting it first if absent.
    ///
    /// Existence is the sole reuse gate: regenerating a CA whose file pair
    /// is still present would silently invalidate every certificate it has
    /// signed, so an existing pair is returned unchanged without touching
    /// the private key material beyond the read.
    pub fn ensure_ca(&self) -> Result<IssuingCa> {
        if self.store.exists() {
            return self.store.load();
        }

        let _guard = self
            .bootstrap_lock
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        // another request may have won the race while we waited on the lock
        if self.store.exists() {
            return self.store.load();
        }

        tracing::info!(common_name = %self.ca_common_name, "bootstrapping issuing CA");
        let (key, cert) = RsaIssuingCaBuilder::new()
            .subject_common_name(self.ca_common_name.clone())
            .build()?;
        let ca = IssuingCa { key, cert };
        self.store.save(&ca)?;
        tracing::info!("issuing CA persisted");
        Ok(ca)
    }

    /// Issue a client-auth certificate for `common_name`, synthesizing a
    /// per-request name when none is given.
    ///
    /// Returns the leaf certificate and its private key; neither is
    /// retained after the response is assembled.
    pub fn issue(&self, common_name: Option<&str>) -> Result<(X509, PKey<Private>)> {
        let ca = self
            .ensure_ca()
            .map_err(|e| PkiError::CaUnavailable(e.to_string()))?;

        let cn = match common_name {
            Some(cn) => cn.to_string(),
            None => format!("{}-{}", SYNTHESIZED_CN_PREFIX, unix_now()?),
        };

        let (key, cert) = RsaClientCertBuilder::new(ca.key, ca.cert)
            .subject_common_name(cn.clone())
            .build()?;
        tracing::info!(common_name = %cn, "issued connector certificate");
        Ok((cert, key))
    }
}

fn unix_now() -> Result<u64> {
    Ok(SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_err(io::Error::other)?
        .as_secs())
}

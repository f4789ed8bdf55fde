//! Edge CA - Issuing Certificate Authority Microservice
//!
//! A minimal certificate-authority service: it bootstraps a self-signed
//! issuing CA on first use, signs client-auth certificates for MQTT
//! connectors on demand, and packages the resulting key material into a
//! downloadable archive.
//!
//! # Architecture
//!
//! ```text
//! issuance request
//!   └── Issuer::ensure_ca()   (CaStore: pki/issuing_ca.{key,crt})
//!         └── Issuer::issue() (RsaClientCertBuilder, signed by the CA)
//!               └── TrustBundle::assemble() → tar.gz response
//! ```
//!
//! The issuing CA is created exactly once per deployment: existence of the
//! on-disk key/certificate pair is the sole reuse gate, and first-time
//! creation runs under a process-wide lock so concurrent requests converge
//! on a single CA. A separate read path serves a pre-provisioned server
//! trust anchor without ever touching the issuing CA.
//!
//! # Module Overview
//!
//! - [`codec`]: PEM encode/decode for keys and certificates
//! - [`store`]: durable, atomically-written CA key/certificate pair
//! - [`issuer`]: CA bootstrap and client certificate issuance
//! - [`generate_issuing_ca`] / [`generate_client_cert`]: certificate builders
//! - [`anchor`]: server trust-anchor read path
//! - [`bundle`]: trust bundle assembly and archive packaging
//! - [`webserver`]: axum HTTP surface (auth, CORS, status mapping)
//! - [`configs`]: environment-derived application configuration

pub mod anchor;
pub mod bundle;
pub mod codec;
pub mod configs;
pub mod error;
pub mod generate_client_cert;
pub mod generate_issuing_ca;
pub mod issuer;
pub mod store;
pub mod webserver;

//! TLS upgrade and leaf certificate validation
//!
//! # Module Organization
//!
//! - `probe` - In-place TLS handshake over a negotiated plaintext socket
//! - `certificate` - Leaf certificate parsing and TLSA digest validation
//!
//! # Example
//!
//! ```rust,ignore
//! use danepulse::tls::{leaf_certificate, upgrade, validate};
//!
//! let tls_stream = upgrade(stream, "mx.example.org").await?;
//! let cert = leaf_certificate(&tls_stream)?;
//! let validation = validate(&cert, &tlsa.digest, chrono::Utc::now());
//! ```

pub mod certificate;
pub mod probe;

// Re-export commonly used types
pub use certificate::{NegotiatedCertificate, Validation, spki_digest, validate, verify};
pub use probe::{ensure_crypto_provider, leaf_certificate, upgrade};

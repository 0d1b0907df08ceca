//! Synthetic monitoring probe for DANE pinned mail servers.
//!
//! Each probe resolves the TLSA record, upgrades SMTP and IMAP connections
//! with STARTTLS over IPv4 and IPv6, and compares the SHA-256 digest of the
//! negotiated leaf certificate's public key against the pinned value.

pub mod check;
pub mod cli;
pub mod config;
pub mod dns;
pub mod error;
pub mod metrics;
pub mod negotiate;
pub mod pulse;
pub mod tls;

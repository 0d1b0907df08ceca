use std::{io, time::Duration};
use thiserror::Error;

/// Failure classes of a single TLSA fetch or protocol check.
///
/// None of these escape the probe: the resolver and the orchestrator turn
/// each one into a structured result, the variant only drives logging.
#[derive(Debug, Error)]
pub enum CheckError {
    #[error("TLSA lookup for {name} failed: {reason}")]
    Resolution { name: String, reason: String },

    #[error("operation did not complete within {}ms", .0.as_millis())]
    Timeout(Duration),

    #[error("connection failed: {0}")]
    Connection(#[from] io::Error),

    #[error("no {family} address found for {host}")]
    NoAddress { host: String, family: &'static str },

    #[error("TLS handshake failed: {0}")]
    Handshake(io::Error),

    #[error("server closed the connection before the TLS upgrade")]
    Closed,

    #[error("peer certificate unusable: {0}")]
    Certificate(String),

    #[error("certificate not valid at {now} (valid from {not_before} until {not_after})")]
    CertificateDate {
        now: String,
        not_before: String,
        not_after: String,
    },

    #[error("certificate digest {observed} does not match TLSA digest {expected}")]
    DigestMismatch { observed: String, expected: String },
}

impl CheckError {
    /// Stable label for the failure class, used in log events
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Resolution { .. } => "resolution",
            Self::Timeout(_) => "timeout",
            Self::Connection(_) | Self::NoAddress { .. } | Self::Handshake(_) | Self::Closed => {
                "connection"
            }
            Self::Certificate(_) => "certificate",
            Self::CertificateDate { .. } => "certificate_date",
            Self::DigestMismatch { .. } => "digest_mismatch",
        }
    }

    /// Whether the server was reached and completed the TLS handshake
    #[must_use]
    pub const fn is_reachable(&self) -> bool {
        matches!(
            self,
            Self::Certificate(_) | Self::CertificateDate { .. } | Self::DigestMismatch { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_labels() {
        let err = CheckError::Timeout(Duration::from_millis(1500));
        assert_eq!(err.kind(), "timeout");
        assert_eq!(err.to_string(), "operation did not complete within 1500ms");

        let err = CheckError::from(io::Error::from(io::ErrorKind::ConnectionRefused));
        assert_eq!(err.kind(), "connection");

        assert_eq!(CheckError::Closed.kind(), "connection");
        assert_eq!(
            CheckError::NoAddress {
                host: "mx.example.org".to_string(),
                family: "IPv6",
            }
            .to_string(),
            "no IPv6 address found for mx.example.org"
        );
    }

    #[test]
    fn test_reachable_classes() {
        assert!(!CheckError::Closed.is_reachable());
        assert!(!CheckError::Timeout(Duration::from_secs(1)).is_reachable());
        assert!(
            CheckError::DigestMismatch {
                observed: "aa".to_string(),
                expected: "bb".to_string(),
            }
            .is_reachable()
        );
        assert!(
            CheckError::CertificateDate {
                now: String::new(),
                not_before: String::new(),
                not_after: String::new(),
            }
            .is_reachable()
        );
        assert!(CheckError::Certificate("no certificate".to_string()).is_reachable());
    }
}

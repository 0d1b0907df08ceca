use crate::error::CheckError;
use chrono::{DateTime, SecondsFormat, Utc};
use sha2::{Digest, Sha256};
use x509_parser::{
    prelude::{FromDer, X509Certificate},
    time::ASN1Time,
};

/// Leaf certificate presented by the server during the TLS upgrade
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NegotiatedCertificate {
    pub not_before: DateTime<Utc>,
    pub not_after: DateTime<Utc>,
    /// Lowercase hex SHA-256 of the DER encoded `SubjectPublicKeyInfo`
    pub public_key_digest: String,
}

/// Outcome of [`validate`]
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Validation {
    pub valid: bool,
    /// Observed SPKI digest, empty when the validity window check failed
    pub digest: String,
}

impl NegotiatedCertificate {
    /// Parse a DER encoded X.509 certificate
    ///
    /// # Errors
    ///
    /// Returns [`CheckError::Certificate`] if the certificate cannot be parsed
    /// or carries a validity timestamp outside the representable range.
    pub fn from_der(der: &[u8]) -> Result<Self, CheckError> {
        let (_, cert) = X509Certificate::from_der(der)
            .map_err(|e| CheckError::Certificate(format!("failed to parse certificate: {e}")))?;
        let validity = cert.validity();

        Ok(Self {
            not_before: asn1_to_utc(&validity.not_before)?,
            not_after: asn1_to_utc(&validity.not_after)?,
            public_key_digest: spki_digest(cert.public_key().raw),
        })
    }

    /// `not_before <= now < not_after`
    #[must_use]
    pub fn is_current(&self, now: DateTime<Utc>) -> bool {
        now >= self.not_before && now < self.not_after
    }
}

fn asn1_to_utc(time: &ASN1Time) -> Result<DateTime<Utc>, CheckError> {
    let raw = time.to_datetime();
    DateTime::<Utc>::from_timestamp(raw.unix_timestamp(), raw.nanosecond())
        .ok_or_else(|| CheckError::Certificate("invalid certificate validity timestamp".into()))
}

/// SHA-256 over the given `SubjectPublicKeyInfo` DER, as lowercase hex
#[must_use]
pub fn spki_digest(spki_der: &[u8]) -> String {
    hex::encode(Sha256::digest(spki_der))
}

/// Check the validity window first, then compare digests.
///
/// A date failure withholds the digest; a mismatch reports it.
///
/// # Errors
///
/// Returns [`CheckError::CertificateDate`] or [`CheckError::DigestMismatch`].
pub fn verify(
    cert: &NegotiatedCertificate,
    expected_digest: &str,
    now: DateTime<Utc>,
) -> Result<String, CheckError> {
    if !cert.is_current(now) {
        return Err(CheckError::CertificateDate {
            now: now.to_rfc3339_opts(SecondsFormat::Secs, true),
            not_before: cert.not_before.to_rfc3339_opts(SecondsFormat::Secs, true),
            not_after: cert.not_after.to_rfc3339_opts(SecondsFormat::Secs, true),
        });
    }

    // exact, case-sensitive hex comparison
    if cert.public_key_digest != expected_digest {
        return Err(CheckError::DigestMismatch {
            observed: cert.public_key_digest.clone(),
            expected: expected_digest.to_string(),
        });
    }

    Ok(cert.public_key_digest.clone())
}

/// Validate a negotiated certificate against the pinned TLSA digest
#[must_use]
pub fn validate(
    cert: &NegotiatedCertificate,
    expected_digest: &str,
    now: DateTime<Utc>,
) -> Validation {
    Validation::from(verify(cert, expected_digest, now))
}

impl From<Result<String, CheckError>> for Validation {
    /// Only a digest mismatch keeps the observed digest among the failures
    fn from(outcome: Result<String, CheckError>) -> Self {
        match outcome {
            Ok(digest) => Self {
                valid: true,
                digest,
            },
            Err(CheckError::DigestMismatch { observed, .. }) => Self {
                valid: false,
                digest: observed,
            },
            Err(_) => Self::default(),
        }
    }
}

use crate::error::CheckError;
use hickory_resolver::{
    TokioResolver,
    proto::rr::{RData, RecordType},
};
use serde::Serialize;
use std::{
    future::Future,
    time::{Duration, Instant},
};
use tokio::time;
use tracing::{debug, info, warn};

/// TLSA selector value for `SubjectPublicKeyInfo`
pub const SELECTOR_SPKI: u8 = 1;
/// TLSA matching type value for SHA-256
pub const MATCHING_SHA256: u8 = 1;

/// Pinned expectation fetched from DNS, immutable once built
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TlsaRecord {
    /// Lowercase hex of the first record's association data, empty when unresolved
    pub digest: String,
    pub source_name: String,
    pub resolved: bool,
    pub fetch_seconds: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cert_usage: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub selector: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub matching_type: Option<u8>,
}

impl TlsaRecord {
    fn unresolved(source_name: &str, fetch_seconds: f64) -> Self {
        Self {
            source_name: source_name.to_string(),
            fetch_seconds,
            ..Default::default()
        }
    }
}

/// Fields of a single TLSA resource record
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TlsaData {
    pub cert_usage: u8,
    pub selector: u8,
    pub matching_type: u8,
    pub association_data: Vec<u8>,
}

impl TlsaData {
    /// The digest comparison always hashes the SPKI with SHA-256
    #[must_use]
    pub const fn is_spki_sha256(&self) -> bool {
        self.selector == SELECTOR_SPKI && self.matching_type == MATCHING_SHA256
    }
}

/// Source of TLSA records
pub trait TlsaLookup: Sync + Send {
    /// Return the first TLSA record published at `name`
    fn lookup_tlsa(&self, name: &str) -> impl Future<Output = Result<TlsaData, CheckError>> + Send;
}

/// Lookup through the system resolver configuration (`/etc/resolv.conf`)
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemResolver;

impl TlsaLookup for SystemResolver {
    async fn lookup_tlsa(&self, name: &str) -> Result<TlsaData, CheckError> {
        let resolution = |reason: String| CheckError::Resolution {
            name: name.to_string(),
            reason,
        };

        let resolver = TokioResolver::builder_tokio()
            .map_err(|e| resolution(format!("failed to create resolver: {e}")))?
            .build();

        let lookup = resolver
            .lookup(fully_qualified(name), RecordType::TLSA)
            .await
            .map_err(|e| resolution(e.to_string()))?;

        lookup
            .iter()
            .find_map(|rdata| match rdata {
                RData::TLSA(tlsa) => Some(TlsaData {
                    cert_usage: u8::from(tlsa.cert_usage()),
                    selector: u8::from(tlsa.selector()),
                    matching_type: u8::from(tlsa.matching()),
                    association_data: tlsa.cert_data().to_vec(),
                }),
                _ => None,
            })
            .ok_or_else(|| resolution("response contains no TLSA record".to_string()))
    }
}

/// Absolute form of `name`, so the resolver never appends search domains
fn fully_qualified(name: &str) -> String {
    if name.ends_with('.') {
        name.to_string()
    } else {
        format!("{name}.")
    }
}

/// `_<port>._tcp.<host>`
#[must_use]
pub fn default_record_name(port: u16, host: &str) -> String {
    format!("_{port}._tcp.{host}")
}

/// Resolve `record_name` within `timeout`.
///
/// Never fails: lookup errors and timeouts produce an unresolved record. On
/// timeout the lookup future is dropped, so a late answer cannot be observed.
pub async fn fetch<L: TlsaLookup>(lookup: &L, record_name: &str, timeout: Duration) -> TlsaRecord {
    let start = Instant::now();
    let outcome = time::timeout(timeout, lookup.lookup_tlsa(record_name)).await;
    let elapsed = start.elapsed().as_secs_f64();

    let data = match outcome {
        Ok(Ok(data)) if !data.association_data.is_empty() => data,
        Ok(Ok(_)) => {
            let err = CheckError::Resolution {
                name: record_name.to_string(),
                reason: "empty association data".to_string(),
            };
            warn!(record = record_name, kind = err.kind(), "{err}");
            return TlsaRecord::unresolved(record_name, elapsed);
        }
        Ok(Err(err)) => {
            warn!(record = record_name, kind = err.kind(), "{err}");
            return TlsaRecord::unresolved(record_name, elapsed);
        }
        Err(_) => {
            let err = CheckError::Timeout(timeout);
            warn!(record = record_name, kind = err.kind(), "TLSA lookup: {err}");
            return TlsaRecord::unresolved(record_name, timeout.as_secs_f64());
        }
    };

    if !data.is_spki_sha256() {
        warn!(
            record = record_name,
            selector = data.selector,
            matching_type = data.matching_type,
            "TLSA record is not selector SPKI / matching SHA-256, digests will not match"
        );
    }

    let digest = hex::encode(&data.association_data);
    debug!(record = record_name, usage = data.cert_usage, "TLSA record resolved");
    info!(record = record_name, digest = %digest, seconds = elapsed, "TLSA fetch ok");

    TlsaRecord {
        digest,
        source_name: record_name.to_string(),
        resolved: true,
        fetch_seconds: elapsed,
        cert_usage: Some(data.cert_usage),
        selector: Some(data.selector),
        matching_type: Some(data.matching_type),
    }
}

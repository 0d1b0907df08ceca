use crate::check::{CheckResult, ProbeReport};
use prometheus::{
    Encoder, GaugeVec, IntGaugeVec, Registry, opts, register_gauge_vec_with_registry,
    register_int_gauge_vec_with_registry,
};

const CHECK_LABELS: &[&str] = &["protocol", "ip_family", "tlsa_digest", "cert_digest"];

/// Gauges for one probe, registered on a registry owned by the scrape
pub struct ProbeMetrics {
    tlsa_up: IntGaugeVec,
    tlsa_fetch_seconds: GaugeVec,
    reachable: IntGaugeVec,
    cert_valid: IntGaugeVec,
    check_duration: GaugeVec,
}

impl ProbeMetrics {
    /// Register the probe gauges on `registry`
    ///
    /// # Errors
    ///
    /// Returns an error if a metric is already registered on `registry`
    pub fn register(registry: &Registry) -> prometheus::Result<Self> {
        Ok(Self {
            tlsa_up: register_int_gauge_vec_with_registry!(
                opts!("danepulse_tlsa_up", "1 if the TLSA record resolved, 0 otherwise"),
                &["digest"],
                registry
            )?,
            tlsa_fetch_seconds: register_gauge_vec_with_registry!(
                opts!(
                    "danepulse_tlsa_fetch_seconds",
                    "Time spent resolving the TLSA record"
                ),
                &["digest"],
                registry
            )?,
            reachable: register_int_gauge_vec_with_registry!(
                opts!(
                    "danepulse_reachable",
                    "1 if the STARTTLS upgrade and TLS handshake completed"
                ),
                CHECK_LABELS,
                registry
            )?,
            cert_valid: register_int_gauge_vec_with_registry!(
                opts!(
                    "danepulse_cert_valid",
                    "1 if the certificate is current and matches the TLSA digest"
                ),
                CHECK_LABELS,
                registry
            )?,
            check_duration: register_gauge_vec_with_registry!(
                opts!(
                    "danepulse_check_duration_seconds",
                    "Duration of the protocol check in seconds"
                ),
                CHECK_LABELS,
                registry
            )?,
        })
    }

    /// Set every gauge from a probe report
    pub fn observe(&self, report: &ProbeReport) {
        let digest = report.tlsa.digest.as_str();

        self.tlsa_up
            .with_label_values(&[digest])
            .set(i64::from(report.tlsa.resolved));
        self.tlsa_fetch_seconds
            .with_label_values(&[digest])
            .set(report.tlsa.fetch_seconds);

        for check in &report.checks {
            self.observe_check(digest, check);
        }
    }

    fn observe_check(&self, tlsa_digest: &str, check: &CheckResult) {
        let labels = [
            check.protocol.as_str(),
            check.ip_family.as_str(),
            tlsa_digest,
            check.observed_digest.as_str(),
        ];

        self.reachable
            .with_label_values(&labels)
            .set(i64::from(check.reachable));
        self.cert_valid
            .with_label_values(&labels)
            .set(i64::from(check.certificate_valid));
        self.check_duration
            .with_label_values(&labels)
            .set(check.duration_seconds);
    }
}

/// Build a fresh registry holding the gauges for `report`
///
/// # Errors
///
/// Returns an error if a collector cannot be registered
pub fn registry_for(report: &ProbeReport) -> prometheus::Result<Registry> {
    let registry = Registry::new();

    #[cfg(target_os = "linux")]
    registry.register(Box::new(
        prometheus::process_collector::ProcessCollector::for_self(),
    ))?;

    ProbeMetrics::register(&registry)?.observe(report);

    Ok(registry)
}

/// Encode a probe report in the Prometheus text format
///
/// # Errors
///
/// Returns an error if metrics registration or encoding fails
pub fn encode_report(report: &ProbeReport) -> Result<Vec<u8>, String> {
    let registry =
        registry_for(report).map_err(|e| format!("could not register probe metrics: {e}"))?;

    let mut buffer = Vec::new();
    let encoder = prometheus::TextEncoder::new();

    encoder
        .encode(&registry.gather(), &mut buffer)
        .map_err(|e| format!("could not encode probe metrics: {e}"))?;

    Ok(buffer)
}

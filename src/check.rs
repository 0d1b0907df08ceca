use crate::{
    config::{IpFamily, ProbeConfig, Protocol},
    dns::{self, TlsaLookup, TlsaRecord},
    error::CheckError,
    negotiate::{ImapNegotiator, SmtpNegotiator, negotiate},
    tls::{self, NegotiatedCertificate, Validation},
};
use chrono::Utc;
use futures::future::join_all;
use serde::Serialize;
use std::{
    net::SocketAddr,
    time::{Duration, Instant},
};
use tokio::{
    net::{TcpStream, lookup_host},
    time,
};
use tracing::{info, warn};

/// Outcome of one protocol check over one IP family
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CheckResult {
    pub protocol: Protocol,
    pub ip_family: IpFamily,
    pub reachable: bool,
    pub certificate_valid: bool,
    pub observed_digest: String,
    pub duration_seconds: f64,
}

/// Everything one probe invocation produced
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProbeReport {
    pub tlsa: TlsaRecord,
    pub checks: Vec<CheckResult>,
}

/// A single STARTTLS + DANE check
#[derive(Debug, Clone)]
pub struct Check<'a> {
    pub protocol: Protocol,
    pub host: &'a str,
    pub port: u16,
    pub family: IpFamily,
    pub expected_digest: &'a str,
    pub timeout: Duration,
    pub ehlo_name: &'a str,
}

impl Check<'_> {
    /// Connect, upgrade, and validate the leaf certificate.
    ///
    /// Connecting, the plaintext exchange and the TLS handshake all race the
    /// same timeout. When the timeout wins the in-flight future is dropped,
    /// which closes the socket and discards anything it would have produced.
    pub async fn run(&self) -> CheckResult {
        let start = Instant::now();
        let outcome = time::timeout(self.timeout, self.upgrade()).await;
        let elapsed = start.elapsed().as_secs_f64();

        match outcome {
            Ok(Ok(cert)) => {
                let verified = tls::verify(&cert, self.expected_digest, Utc::now());
                if let Err(err) = &verified {
                    self.log_failure(err);
                }
                let validation = Validation::from(verified);
                let result = self.result(true, validation.valid, validation.digest, elapsed);
                info!(
                    protocol = %self.protocol,
                    family = %self.family,
                    host = self.host,
                    valid = result.certificate_valid,
                    digest = %result.observed_digest,
                    seconds = elapsed,
                    "check completed"
                );
                result
            }
            Ok(Err(err)) => {
                self.log_failure(&err);
                self.result(err.is_reachable(), false, String::new(), elapsed)
            }
            Err(_) => {
                self.log_failure(&CheckError::Timeout(self.timeout));
                self.result(false, false, String::new(), self.timeout.as_secs_f64())
            }
        }
    }

    async fn upgrade(&self) -> Result<NegotiatedCertificate, CheckError> {
        let addr = resolve_address(self.host, self.port, self.family).await?;
        let mut stream = TcpStream::connect(addr).await?;

        match self.protocol {
            Protocol::Smtp => {
                negotiate(&mut stream, &mut SmtpNegotiator::new(self.ehlo_name)).await?;
            }
            Protocol::Imap => negotiate(&mut stream, &mut ImapNegotiator::new()).await?,
        }

        let tls_stream = tls::upgrade(stream, self.host).await?;
        tls::leaf_certificate(&tls_stream)
    }

    fn result(
        &self,
        reachable: bool,
        certificate_valid: bool,
        observed_digest: String,
        duration_seconds: f64,
    ) -> CheckResult {
        CheckResult {
            protocol: self.protocol,
            ip_family: self.family,
            reachable,
            certificate_valid,
            observed_digest,
            duration_seconds,
        }
    }

    fn log_failure(&self, err: &CheckError) {
        warn!(
            protocol = %self.protocol,
            family = %self.family,
            host = self.host,
            port = self.port,
            kind = err.kind(),
            "{err}"
        );
    }
}

/// First address of `host` in the requested family
async fn resolve_address(host: &str, port: u16, family: IpFamily) -> Result<SocketAddr, CheckError> {
    lookup_host((host, port))
        .await?
        .find(|addr| match family {
            IpFamily::V4 => addr.is_ipv4(),
            IpFamily::V6 => addr.is_ipv6(),
        })
        .ok_or_else(|| CheckError::NoAddress {
            host: host.to_string(),
            family: family.label(),
        })
}

/// Run one probe: fetch the TLSA record, then every enabled check.
///
/// The checks run concurrently, each on its own socket; results keep the
/// configuration order (SMTP before IMAP, IPv4 before IPv6).
pub async fn probe<L: TlsaLookup>(config: &ProbeConfig, lookup: &L) -> ProbeReport {
    let tlsa = dns::fetch(lookup, &config.tlsa_record, config.timeout).await;

    let checks = {
        let digest = tlsa.digest.as_str();
        let pending: Vec<Check<'_>> = config
            .endpoints()
            .into_iter()
            .flat_map(|(protocol, endpoint)| {
                config.families().into_iter().map(move |family| Check {
                    protocol,
                    host: endpoint.host.as_str(),
                    port: endpoint.port,
                    family,
                    expected_digest: digest,
                    timeout: config.timeout,
                    ehlo_name: config.ehlo_name.as_str(),
                })
            })
            .collect();

        join_all(pending.iter().map(Check::run)).await
    };

    ProbeReport { tlsa, checks }
}

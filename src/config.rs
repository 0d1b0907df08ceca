use crate::dns::default_record_name;
use anyhow::{Result, bail};
use serde::Serialize;
use std::{fmt, time::Duration};

pub const DEFAULT_SMTP_PORT: u16 = 25;
pub const DEFAULT_IMAP_PORT: u16 = 143;
pub const DEFAULT_TIMEOUT_MS: u64 = 5000;

/// Mail protocol upgraded with STARTTLS
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    Smtp,
    Imap,
}

impl Protocol {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Smtp => "smtp",
            Self::Imap => "imap",
        }
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Address family a check is restricted to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum IpFamily {
    V4,
    V6,
}

impl IpFamily {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::V4 => "v4",
            Self::V6 => "v6",
        }
    }

    #[must_use]
    pub const fn label(&self) -> &'static str {
        match self {
            Self::V4 => "IPv4",
            Self::V6 => "IPv6",
        }
    }
}

impl fmt::Display for IpFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Host and port of one mail service
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    pub host: String,
    pub port: u16,
}

impl Endpoint {
    #[must_use]
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }
}

/// Probe configuration, built once at startup and never mutated
#[derive(Debug, Clone)]
pub struct ProbeConfig {
    pub smtp: Option<Endpoint>,
    pub imap: Option<Endpoint>,
    pub tlsa_record: String,
    pub timeout: Duration,
    pub ipv4: bool,
    pub ipv6: bool,
    pub ehlo_name: String,
}

impl ProbeConfig {
    /// Validate the options and derive the TLSA record name
    ///
    /// # Errors
    ///
    /// Returns an error if there is nothing to check or no way to find the
    /// TLSA record.
    pub fn new(
        smtp: Option<Endpoint>,
        imap: Option<Endpoint>,
        tlsa_record: Option<String>,
        timeout: Duration,
        ipv4: bool,
        ipv6: bool,
        ehlo_name: String,
    ) -> Result<Self> {
        let tlsa_record = match (tlsa_record, &smtp) {
            (Some(record), _) if !record.trim().is_empty() => record.trim().to_string(),
            (_, Some(endpoint)) => default_record_name(DEFAULT_SMTP_PORT, &endpoint.host),
            _ => bail!("either a TLSA record or an SMTP host must be configured"),
        };

        if smtp.is_none() && imap.is_none() {
            bail!("at least one of SMTP host or IMAP host must be configured");
        }

        if timeout.is_zero() {
            bail!("timeout must be greater than zero");
        }

        if !ipv4 && !ipv6 {
            bail!("at least one of IPv4 or IPv6 must be enabled");
        }

        if ehlo_name.trim().is_empty() {
            bail!("EHLO name must not be empty");
        }

        Ok(Self {
            smtp,
            imap,
            tlsa_record,
            timeout,
            ipv4,
            ipv6,
            ehlo_name,
        })
    }

    /// Enabled IP families, IPv4 first
    #[must_use]
    pub fn families(&self) -> Vec<IpFamily> {
        [(self.ipv4, IpFamily::V4), (self.ipv6, IpFamily::V6)]
            .into_iter()
            .filter_map(|(enabled, family)| enabled.then_some(family))
            .collect()
    }

    /// Configured endpoints, SMTP first
    #[must_use]
    pub fn endpoints(&self) -> Vec<(Protocol, &Endpoint)> {
        [(Protocol::Smtp, &self.smtp), (Protocol::Imap, &self.imap)]
            .into_iter()
            .filter_map(|(protocol, endpoint)| endpoint.as_ref().map(|e| (protocol, e)))
            .collect()
    }
}

use crate::{
    cli::actions::Action,
    config::{DEFAULT_IMAP_PORT, DEFAULT_SMTP_PORT, DEFAULT_TIMEOUT_MS, Endpoint, ProbeConfig},
};
use anyhow::{Context, Result};
use clap::ArgMatches;
use std::{net::IpAddr, time::Duration};

/// Pair an optional host with its port
fn endpoint(matches: &ArgMatches, host: &str, port: &str, default_port: u16) -> Option<Endpoint> {
    matches
        .get_one::<String>(host)
        .map(String::as_str)
        .map(str::trim)
        .filter(|h| !h.is_empty())
        .map(|h| {
            let port = matches
                .get_one::<u16>(port)
                .copied()
                .unwrap_or(default_port);
            Endpoint::new(h, port)
        })
}

/// Build the probe configuration from the parsed arguments
///
/// # Errors
///
/// Returns an error if the options describe nothing to check
pub fn probe_config(matches: &ArgMatches) -> Result<ProbeConfig> {
    let smtp = endpoint(matches, "smtp-host", "smtp-port", DEFAULT_SMTP_PORT);
    let imap = endpoint(matches, "imap-host", "imap-port", DEFAULT_IMAP_PORT);

    let tlsa_record = matches.get_one::<String>("tlsa-record").cloned();

    let timeout = Duration::from_millis(
        matches
            .get_one::<u64>("timeout")
            .copied()
            .unwrap_or(DEFAULT_TIMEOUT_MS),
    );

    let ipv4 = matches.get_one::<bool>("ipv4").copied().unwrap_or(true);
    let ipv6 = matches.get_one::<bool>("ipv6").copied().unwrap_or(true);

    let ehlo_name = matches
        .get_one::<String>("ehlo-name")
        .cloned()
        .unwrap_or_else(|| env!("CARGO_PKG_NAME").to_string());

    ProbeConfig::new(smtp, imap, tlsa_record, timeout, ipv4, ipv6, ehlo_name)
        .context("invalid configuration")
}

/// Convert `ArgMatches` into typed Action enum with validation
///
/// # Errors
///
/// Returns an error if the configuration or the listen address is invalid
pub fn dispatch(matches: &ArgMatches) -> Result<Action> {
    let config = probe_config(matches)?;

    if matches.get_flag("once") {
        return Ok(Action::Check { config });
    }

    // Extract and validate listen address
    let listen = matches
        .get_one::<String>("listen")
        .map(|addr| {
            addr.parse::<IpAddr>()
                .with_context(|| format!("Invalid IP address: {addr}"))
        })
        .transpose()?;

    let port = matches.get_one::<u16>("port").copied().unwrap_or(9325);

    Ok(Action::Serve {
        config,
        listen,
        port,
    })
}

use clap::{
    Arg, ArgAction, ColorChoice, Command,
    builder::styling::{AnsiColor, Effects, Styles},
};

/// Pure clap command definitions with zero business logic
#[must_use]
#[allow(clippy::too_many_lines)]
pub fn new() -> Command {
    let styles = Styles::styled()
        .header(AnsiColor::Yellow.on_default() | Effects::BOLD)
        .usage(AnsiColor::Green.on_default() | Effects::BOLD)
        .literal(AnsiColor::Blue.on_default() | Effects::BOLD)
        .placeholder(AnsiColor::Green.on_default());

    Command::new(env!("CARGO_PKG_NAME"))
        .about(env!("CARGO_PKG_DESCRIPTION"))
        .version(env!("CARGO_PKG_VERSION"))
        .color(ColorChoice::Auto)
        .styles(styles)
        .arg(
            Arg::new("smtp-host")
                .env("DANEPULSE_SMTP_HOST")
                .help("SMTP server to check, omit to disable SMTP checks")
                .long("smtp-host")
                .short('s')
                .value_name("HOST"),
        )
        .arg(
            Arg::new("smtp-port")
                .default_value("25")
                .env("DANEPULSE_SMTP_PORT")
                .help("SMTP port")
                .long("smtp-port")
                .value_parser(clap::value_parser!(u16)),
        )
        .arg(
            Arg::new("imap-host")
                .env("DANEPULSE_IMAP_HOST")
                .help("IMAP server to check, omit to disable IMAP checks")
                .long("imap-host")
                .short('i')
                .value_name("HOST"),
        )
        .arg(
            Arg::new("imap-port")
                .default_value("143")
                .env("DANEPULSE_IMAP_PORT")
                .help("IMAP port")
                .long("imap-port")
                .value_parser(clap::value_parser!(u16)),
        )
        .arg(
            Arg::new("tlsa-record")
                .env("DANEPULSE_TLSA_RECORD")
                .help("TLSA record holding the pinned digest (default: _25._tcp.<smtp-host>)")
                .long("tlsa-record")
                .long_help(
                    "DNS name of the TLSA record holding the pinned public key digest.\n\
                    Defaults to _25._tcp.<smtp-host> and is required when only IMAP is checked.\n\n\
                    The record must use selector 1 (SubjectPublicKeyInfo) and matching\n\
                    type 1 (SHA-256), e.g. '3 1 1 4a5b...'"
                )
                .short('t')
                .value_name("NAME"),
        )
        .arg(
            Arg::new("timeout")
                .default_value("5000")
                .env("DANEPULSE_TIMEOUT")
                .help("timeout in milliseconds for the TLSA lookup and for each check")
                .long("timeout")
                .value_parser(clap::value_parser!(u64)),
        )
        .arg(
            Arg::new("ipv4")
                .default_value("true")
                .default_missing_value("true")
                .env("DANEPULSE_IPV4")
                .help("check over IPv4")
                .long("ipv4")
                .num_args(0..=1)
                .value_name("BOOL")
                .value_parser(clap::value_parser!(bool)),
        )
        .arg(
            Arg::new("ipv6")
                .default_value("true")
                .default_missing_value("true")
                .env("DANEPULSE_IPV6")
                .help("check over IPv6")
                .long("ipv6")
                .num_args(0..=1)
                .value_name("BOOL")
                .value_parser(clap::value_parser!(bool)),
        )
        .arg(
            Arg::new("ehlo-name")
                .default_value("danepulse")
                .env("DANEPULSE_EHLO_NAME")
                .help("name announced in the SMTP EHLO command")
                .long("ehlo-name")
                .value_name("NAME"),
        )
        .arg(
            Arg::new("listen")
                .env("DANEPULSE_LISTEN")
                .help("IP address to bind to (default: [::]:port, accepts both IPv6 and IPv4)")
                .long("listen")
                .long_help(
                    "IP address to bind to:\n\
                    Not specified (default) binds to [::]:port which accepts both IPv6 and IPv4 connections.\n\
                    Falls back to 0.0.0.0:port if IPv6 is unavailable.\n\n\
                    Specific IPv4 examples: '0.0.0.0', '127.0.0.1'\n\
                    Specific IPv6: '::', '::1'"
                )
                .short('l')
                .value_name("IP"),
        )
        .arg(
            Arg::new("port")
                .default_value("9325")
                .env("DANEPULSE_PORT")
                .help("listening port for /metrics")
                .long("port")
                .short('p')
                .value_parser(clap::value_parser!(u16)),
        )
        .arg(
            Arg::new("once")
                .action(ArgAction::SetTrue)
                .help("run a single probe, print the report as JSON and exit")
                .long("once"),
        )
        .arg(
            Arg::new("verbose")
                .action(ArgAction::Count)
                .help("increase log verbosity (-v info, -vv debug, -vvv trace)")
                .long("verbose")
                .short('v'),
        )
}

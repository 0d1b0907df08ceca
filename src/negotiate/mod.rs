//! Minimal plaintext exchanges that bring a mail protocol connection to the
//! point where the server expects a TLS `ClientHello`.
//!
//! Each protocol is an explicit state machine: a pure `transition` function
//! takes the current state and the next chunk of server output and returns
//! the next state plus the bytes to send, if any. Chunks that do not match
//! what the current state waits for are discarded; the caller's timeout is
//! what ends a negotiation that never progresses.

pub mod imap;
pub mod smtp;

use crate::error::CheckError;
use std::fmt::Debug;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::{debug, trace};

pub use imap::{ImapNegotiator, ImapState};
pub use smtp::{SmtpNegotiator, SmtpState};

const READ_BUFFER_SIZE: usize = 4096;

/// Next state and optional outbound bytes produced by one input chunk
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transition<S> {
    pub next: S,
    pub outbound: Option<Vec<u8>>,
}

impl<S> Transition<S> {
    /// Move to `next` without sending anything
    #[must_use]
    pub const fn to(next: S) -> Self {
        Self {
            next,
            outbound: None,
        }
    }

    /// Move to `next` and send `line`
    #[must_use]
    pub fn send(next: S, line: impl Into<Vec<u8>>) -> Self {
        Self {
            next,
            outbound: Some(line.into()),
        }
    }
}

/// A protocol state machine driven by chunks of server output
pub trait Negotiator {
    type State: Copy + Debug + PartialEq;

    /// Protocol name used in log events
    const PROTOCOL: &'static str;

    fn state(&self) -> Self::State;

    /// Consume one chunk, advancing the state; returns bytes to send back
    fn feed(&mut self, chunk: &[u8]) -> Option<Vec<u8>>;

    /// True once the server accepted the upgrade and TLS may begin
    fn is_upgraded(&self) -> bool;
}

/// Drive `negotiator` over `stream` until it is ready for the TLS handshake.
///
/// Reads unbuffered so no byte of the TLS handshake is consumed here.
///
/// # Errors
///
/// Returns [`CheckError::Connection`] on read or write failures and
/// [`CheckError::Closed`] if the server closes the connection first.
pub async fn negotiate<S, N>(stream: &mut S, negotiator: &mut N) -> Result<(), CheckError>
where
    S: AsyncRead + AsyncWrite + Unpin,
    N: Negotiator,
{
    let mut buf = vec![0u8; READ_BUFFER_SIZE];

    while !negotiator.is_upgraded() {
        let read = stream.read(&mut buf).await?;
        if read == 0 {
            return Err(CheckError::Closed);
        }
        let chunk = buf.get(..read).unwrap_or_default();
        trace!(
            protocol = N::PROTOCOL,
            chunk = %String::from_utf8_lossy(chunk).trim_end(),
            "server output"
        );

        let before = negotiator.state();
        let outbound = negotiator.feed(chunk);

        if let Some(bytes) = outbound {
            stream.write_all(&bytes).await?;
            stream.flush().await?;
        }

        let after = negotiator.state();
        if before != after {
            debug!(protocol = N::PROTOCOL, from = ?before, to = ?after, "state transition");
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

    use super::*;
    use tokio::io::{AsyncBufReadExt, BufReader, duplex};

    #[tokio::test]
    async fn test_negotiate_smtp_over_duplex() {
        let (mut client, server) = duplex(1024);

        let server = tokio::spawn(async move {
            let (read_half, mut write_half) = tokio::io::split(server);
            let mut lines = BufReader::new(read_half).lines();

            write_half
                .write_all(b"220 mx.example.org ESMTP Postfix\r\n")
                .await
                .unwrap();
            assert_eq!(lines.next_line().await.unwrap().unwrap(), "EHLO probe");

            write_half
                .write_all(b"250-mx.example.org\r\n250-PIPELINING\r\n250-STARTTLS\r\n250 8BITMIME\r\n")
                .await
                .unwrap();
            assert_eq!(lines.next_line().await.unwrap().unwrap(), "STARTTLS");

            write_half
                .write_all(b"220 2.0.0 Ready to start TLS\r\n")
                .await
                .unwrap();
        });

        let mut negotiator = SmtpNegotiator::new("probe");
        negotiate(&mut client, &mut negotiator).await.unwrap();
        assert_eq!(negotiator.state(), SmtpState::TlsUp);
        server.await.unwrap();
    }

    #[tokio::test]
    async fn test_negotiate_imap_over_duplex() {
        let (mut client, server) = duplex(1024);

        let server = tokio::spawn(async move {
            let (read_half, mut write_half) = tokio::io::split(server);
            let mut lines = BufReader::new(read_half).lines();

            write_half
                .write_all(b"* OK [CAPABILITY IMAP4rev1 STARTTLS LOGINDISABLED] ready\r\n")
                .await
                .unwrap();
            assert_eq!(lines.next_line().await.unwrap().unwrap(), ". STARTTLS");

            write_half
                .write_all(b". OK Begin TLS negotiation now\r\n")
                .await
                .unwrap();
        });

        let mut negotiator = ImapNegotiator::new();
        negotiate(&mut client, &mut negotiator).await.unwrap();
        assert_eq!(negotiator.state(), ImapState::TlsUp);
        server.await.unwrap();
    }

    #[tokio::test]
    async fn test_negotiate_server_closes() {
        let (mut client, mut server) = duplex(1024);

        server
            .write_all(b"220 mx.example.org ESMTP\r\n")
            .await
            .unwrap();
        drop(server);

        let mut negotiator = SmtpNegotiator::new("probe");
        let err = negotiate(&mut client, &mut negotiator).await.unwrap_err();
        assert!(matches!(err, CheckError::Closed | CheckError::Connection(_)));
        assert!(!err.is_reachable());
    }

    #[tokio::test]
    async fn test_negotiate_ignores_unexpected_output() {
        let (mut client, mut server) = duplex(1024);

        server
            .write_all(b"554 no SMTP service here\r\n")
            .await
            .unwrap();

        let mut negotiator = SmtpNegotiator::new("probe");
        let result = tokio::time::timeout(
            std::time::Duration::from_millis(100),
            negotiate(&mut client, &mut negotiator),
        )
        .await;

        // still waiting, never errors on its own
        assert!(result.is_err());
        assert_eq!(negotiator.state(), SmtpState::Init);
    }
}

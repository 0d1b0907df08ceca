#![allow(dead_code, clippy::unwrap_used, clippy::expect_used, clippy::panic)]

use chrono::{Datelike, Utc};
use danepulse::{
    dns::{MATCHING_SHA256, SELECTOR_SPKI, TlsaData, TlsaLookup},
    error::CheckError,
    tls::ensure_crypto_provider,
};
use rcgen::PublicKeyData;
use rustls::{
    ServerConfig,
    pki_types::{CertificateDer, PrivateKeyDer, PrivatePkcs8KeyDer},
};
use sha2::{Digest, Sha256};
use std::{io, net::SocketAddr, sync::Arc};
use tokio::{
    io::{AsyncRead, AsyncReadExt, AsyncWriteExt},
    net::{TcpListener, TcpStream},
    sync::mpsc,
    time::{Duration, timeout},
};
use tokio_rustls::TlsAcceptor;

pub const SERVER_NAME: &str = "mx.danepulse.test";

/// Self-signed certificate plus the digest a TLSA `3 1 1` record would pin
pub struct TestCert {
    pub der: CertificateDer<'static>,
    key: Vec<u8>,
    pub spki_digest: String,
}

impl TestCert {
    pub fn generate(not_before: (i32, u8, u8), not_after: (i32, u8, u8)) -> Self {
        let mut params = rcgen::CertificateParams::new(vec![SERVER_NAME.to_string()]).unwrap();
        params.not_before = rcgen::date_time_ymd(not_before.0, not_before.1, not_before.2);
        params.not_after = rcgen::date_time_ymd(not_after.0, not_after.1, not_after.2);

        let key_pair = rcgen::KeyPair::generate().unwrap();
        let cert = params.self_signed(&key_pair).unwrap();

        Self {
            der: cert.der().clone(),
            key: key_pair.serialize_der(),
            spki_digest: hex::encode(Sha256::digest(key_pair.subject_public_key_info())),
        }
    }

    /// Valid from last year until five years from now
    pub fn current() -> Self {
        let year = Utc::now().year();
        Self::generate((year - 1, 1, 1), (year + 5, 1, 1))
    }

    pub fn expired() -> Self {
        Self::generate((2020, 1, 1), (2021, 1, 1))
    }

    pub fn acceptor(&self) -> TlsAcceptor {
        ensure_crypto_provider();

        let key = PrivateKeyDer::Pkcs8(PrivatePkcs8KeyDer::from(self.key.clone()));
        let config = ServerConfig::builder()
            .with_no_client_auth()
            .with_single_cert(vec![self.der.clone()], key)
            .unwrap();

        TlsAcceptor::from(Arc::new(config))
    }
}

/// TLSA lookup answering with a fixed digest
pub struct PinnedLookup(pub String);

impl TlsaLookup for PinnedLookup {
    async fn lookup_tlsa(&self, _name: &str) -> Result<TlsaData, CheckError> {
        Ok(TlsaData {
            cert_usage: 3,
            selector: SELECTOR_SPKI,
            matching_type: MATCHING_SHA256,
            association_data: hex::decode(&self.0).unwrap(),
        })
    }
}

/// Server behaviour for one accepted connection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Script {
    Smtp,
    Imap,
    /// IMAP banner without the STARTTLS capability
    ImapWithoutStarttls,
    /// Accept and never say anything
    Silent,
    /// SMTP up to `220` for STARTTLS, then plaintext instead of a ServerHello
    BadTls,
}

/// How a server session ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEnd {
    TlsEstablished,
    PeerClosed,
    Failed(String),
}

/// Scripted mail server bound to an ephemeral port
pub struct ScriptedServer {
    pub addr: SocketAddr,
    sessions: mpsc::UnboundedReceiver<SessionEnd>,
}

impl ScriptedServer {
    pub async fn start(bind: &str, script: Script, cert: &TestCert) -> io::Result<Self> {
        let listener = TcpListener::bind(bind).await?;
        let addr = listener.local_addr()?;
        let acceptor = cert.acceptor();
        let (tx, sessions) = mpsc::unbounded_channel();

        tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                let acceptor = acceptor.clone();
                let tx = tx.clone();
                tokio::spawn(async move {
                    let end = session(stream, script, acceptor)
                        .await
                        .unwrap_or_else(|e| SessionEnd::Failed(e.to_string()));
                    let _ = tx.send(end);
                });
            }
        });

        Ok(Self { addr, sessions })
    }

    pub fn port(&self) -> u16 {
        self.addr.port()
    }

    /// Wait for the next session to finish
    pub async fn next_session(&mut self) -> SessionEnd {
        timeout(Duration::from_secs(5), self.sessions.recv())
            .await
            .expect("session did not finish")
            .expect("server stopped")
    }
}

async fn session(mut stream: TcpStream, script: Script, acceptor: TlsAcceptor) -> io::Result<SessionEnd> {
    match script {
        Script::Smtp => {
            stream.write_all(b"220 mx.danepulse.test ESMTP ready\r\n").await?;
            let ehlo = read_line(&mut stream).await?;
            if !ehlo.starts_with("EHLO ") {
                return Ok(SessionEnd::Failed(format!("unexpected command: {ehlo}")));
            }
            stream
                .write_all(b"250-mx.danepulse.test\r\n250-STARTTLS\r\n250 SIZE 10240000\r\n")
                .await?;
            let starttls = read_line(&mut stream).await?;
            if starttls != "STARTTLS" {
                return Ok(SessionEnd::Failed(format!("unexpected command: {starttls}")));
            }
            stream.write_all(b"220 2.0.0 Ready to start TLS\r\n").await?;
            handshake(stream, acceptor).await
        }
        Script::Imap => {
            stream
                .write_all(b"* OK [CAPABILITY IMAP4rev1 STARTTLS LOGINDISABLED] ready\r\n")
                .await?;
            let starttls = read_line(&mut stream).await?;
            if starttls != ". STARTTLS" {
                return Ok(SessionEnd::Failed(format!("unexpected command: {starttls}")));
            }
            stream.write_all(b". OK Begin TLS negotiation now\r\n").await?;
            handshake(stream, acceptor).await
        }
        Script::ImapWithoutStarttls => {
            stream
                .write_all(b"* OK [CAPABILITY IMAP4rev1 AUTH=PLAIN] ready\r\n")
                .await?;
            wait_for_close(&mut stream).await
        }
        Script::Silent => wait_for_close(&mut stream).await,
        Script::BadTls => {
            stream.write_all(b"220 mx.danepulse.test ESMTP ready\r\n").await?;
            read_line(&mut stream).await?;
            stream
                .write_all(b"250-mx.danepulse.test\r\n250-STARTTLS\r\n250 SIZE 10240000\r\n")
                .await?;
            read_line(&mut stream).await?;
            stream.write_all(b"220 2.0.0 Ready to start TLS\r\n").await?;
            stream
                .write_all(b"this is not a TLS record, goodbye\r\n")
                .await?;
            stream.shutdown().await?;
            wait_for_close(&mut stream).await
        }
    }
}

async fn handshake(stream: TcpStream, acceptor: TlsAcceptor) -> io::Result<SessionEnd> {
    let mut tls = acceptor.accept(stream).await?;
    // drain until the client goes away
    let mut buf = [0u8; 512];
    while matches!(tls.read(&mut buf).await, Ok(n) if n > 0) {}
    Ok(SessionEnd::TlsEstablished)
}

async fn wait_for_close<S: AsyncRead + Unpin>(stream: &mut S) -> io::Result<SessionEnd> {
    let mut buf = [0u8; 512];
    loop {
        match stream.read(&mut buf).await {
            Ok(0) => return Ok(SessionEnd::PeerClosed),
            Ok(_) => {}
            Err(e) if e.kind() == io::ErrorKind::ConnectionReset => {
                return Ok(SessionEnd::PeerClosed);
            }
            Err(e) => return Err(e),
        }
    }
}

/// Read one CRLF terminated line byte by byte, leaving later bytes unread
async fn read_line(stream: &mut TcpStream) -> io::Result<String> {
    let mut line = Vec::new();
    loop {
        let byte = stream.read_u8().await?;
        if byte == b'\n' {
            break;
        }
        line.push(byte);
    }
    Ok(String::from_utf8_lossy(&line).trim_end().to_string())
}

/// True when the loopback interface has IPv6
pub async fn ipv6_available() -> bool {
    TcpListener::bind("[::1]:0").await.is_ok()
}

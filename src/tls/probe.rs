use super::certificate::NegotiatedCertificate;
use crate::error::CheckError;
use rustls::{
    ClientConfig, DigitallySignedStruct, SignatureScheme,
    client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier},
    pki_types::{CertificateDer, ServerName, UnixTime},
};
use std::{
    io,
    net::IpAddr,
    sync::{Arc, OnceLock},
};
use tokio::net::TcpStream;
use tokio_rustls::{TlsConnector, client::TlsStream};

static CRYPTO_PROVIDER_INIT: OnceLock<()> = OnceLock::new();

/// Ensure the rustls crypto provider is initialized
///
/// This should be called before any TLS operations. It's safe to call
/// multiple times as initialization only happens once.
pub fn ensure_crypto_provider() {
    CRYPTO_PROVIDER_INIT.get_or_init(|| {
        if let Err(err) = rustls::crypto::ring::default_provider().install_default() {
            // another provider was installed first, rustls keeps using that one
            tracing::debug!("ring crypto provider not installed: {err:?}");
        }
    });
}

/// Upgrade an already negotiated plaintext connection to TLS in place.
///
/// The server certificate is not verified here: trust comes from the TLSA
/// digest comparison, not from a CA chain.
///
/// # Errors
///
/// Returns [`CheckError::Handshake`] if the host is not a valid server name or
/// the TLS handshake fails.
pub async fn upgrade(stream: TcpStream, host: &str) -> Result<TlsStream<TcpStream>, CheckError> {
    let server_name = server_name_from_host(host).map_err(CheckError::Handshake)?;

    build_tls_connector()
        .connect(server_name, stream)
        .await
        .map_err(CheckError::Handshake)
}

/// Extract the leaf certificate the server presented during the handshake
///
/// # Errors
///
/// Returns [`CheckError::Certificate`] if no certificate was presented or it
/// cannot be parsed.
pub fn leaf_certificate(stream: &TlsStream<TcpStream>) -> Result<NegotiatedCertificate, CheckError> {
    let (_, connection) = stream.get_ref();
    let leaf = connection
        .peer_certificates()
        .and_then(|certs| certs.first())
        .ok_or_else(|| CheckError::Certificate("server presented no certificate".into()))?;

    NegotiatedCertificate::from_der(leaf.as_ref())
}

fn build_tls_connector() -> TlsConnector {
    ensure_crypto_provider();

    let config = ClientConfig::builder()
        .dangerous()
        .with_custom_certificate_verifier(Arc::new(NoVerifier))
        .with_no_client_auth();

    TlsConnector::from(Arc::new(config))
}

fn server_name_from_host(host: &str) -> io::Result<ServerName<'static>> {
    host.parse::<IpAddr>().map_or_else(
        |_| {
            ServerName::try_from(host.to_string()).map_err(|_| {
                io::Error::new(
                    io::ErrorKind::InvalidInput,
                    format!("invalid server name: {host}"),
                )
            })
        },
        |ip| Ok(ServerName::from(ip).to_owned()),
    )
}

/// Certificate verifier that accepts any certificate.
///
/// DANE replaces CA validation for this probe: the leaf's SPKI digest is
/// compared against the TLSA record and its validity window is checked by
/// [`super::certificate::validate`] after the handshake completes.
#[derive(Debug)]
struct NoVerifier;

impl ServerCertVerifier for NoVerifier {
    fn verify_server_cert(
        &self,
        _end_entity: &CertificateDer<'_>,
        _intermediates: &[CertificateDer<'_>],
        _server_name: &ServerName<'_>,
        _ocsp_response: &[u8],
        _now: UnixTime,
    ) -> Result<ServerCertVerified, rustls::Error> {
        Ok(ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        _message: &[u8],
        _cert: &CertificateDer<'_>,
        _dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        Ok(HandshakeSignatureValid::assertion())
    }

    fn verify_tls13_signature(
        &self,
        _message: &[u8],
        _cert: &CertificateDer<'_>,
        _dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        Ok(HandshakeSignatureValid::assertion())
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        vec![
            SignatureScheme::RSA_PKCS1_SHA256,
            SignatureScheme::RSA_PKCS1_SHA384,
            SignatureScheme::RSA_PKCS1_SHA512,
            SignatureScheme::ECDSA_NISTP256_SHA256,
            SignatureScheme::ECDSA_NISTP384_SHA384,
            SignatureScheme::ECDSA_NISTP521_SHA512,
            SignatureScheme::RSA_PSS_SHA256,
            SignatureScheme::RSA_PSS_SHA384,
            SignatureScheme::RSA_PSS_SHA512,
            SignatureScheme::ED25519,
        ]
    }
}

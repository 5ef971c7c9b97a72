use super::link::{timed_out, Link};
use crate::config::{CertPool, TlsIdentity};
use crate::error::Error;
use async_trait::async_trait;
use log::{error, warn};
use std::io;
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::{timeout, timeout_at, Duration, Instant};
use tokio_rustls::rustls::client::danger::HandshakeSignatureValid;
use tokio_rustls::rustls::crypto::{
    aws_lc_rs, verify_tls12_signature, verify_tls13_signature, CryptoProvider,
};
use tokio_rustls::rustls::pki_types::{CertificateDer, ServerName, UnixTime};
use tokio_rustls::rustls::server::danger::{ClientCertVerified, ClientCertVerifier};
use tokio_rustls::rustls::server::WebPkiClientVerifier;
use tokio_rustls::rustls::{
    CertificateError, ClientConfig, DigitallySignedStruct, DistinguishedName, Error as TlsError,
    RootCertStore, ServerConfig, SignatureScheme,
};
use tokio_rustls::{TlsAcceptor, TlsConnector, TlsStream};

/// Modbus Role extension (UTF8String under the Modbus Organization arc).
pub const MODBUS_ROLE_OID: &str = "1.3.6.1.4.1.50316.802.1";

const CONNECT_TIMEOUT: Duration = Duration::from_secs(15);
const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(30);

/// TLS stream as a byte channel.
///
/// A write cut short by the deadline leaves a half-sent TLS record behind,
/// and the session cannot be trusted after that. The link closes the
/// connection on the spot so follow-up calls report a closed connection
/// instead of repeating a timeout that looks transient.
pub struct TlsLink {
    stream: Option<TlsStream<TcpStream>>,
    deadline: Instant,
}

impl TlsLink {
    pub fn new(stream: impl Into<TlsStream<TcpStream>>) -> TlsLink {
        TlsLink {
            stream: Some(stream.into()),
            deadline: Instant::now() + super::FOREVER,
        }
    }

    fn closed() -> io::Error {
        io::Error::new(io::ErrorKind::NotConnected, "connection closed")
    }
}

#[async_trait]
impl Link for TlsLink {
    async fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let Some(stream) = self.stream.as_mut() else {
            return Err(TlsLink::closed());
        };
        match timeout_at(self.deadline, stream.read(buf)).await {
            Ok(result) => result,
            Err(_) => Err(timed_out()),
        }
    }

    async fn write_all(&mut self, buf: &[u8]) -> io::Result<()> {
        let Some(stream) = self.stream.as_mut() else {
            return Err(TlsLink::closed());
        };
        match timeout_at(self.deadline, stream.write_all(buf)).await {
            Ok(result) => result,
            Err(_) => {
                warn!("tls write deadline reached, closing the connection");
                self.stream = None;
                Err(timed_out())
            }
        }
    }

    fn set_deadline(&mut self, deadline: Instant) {
        self.deadline = deadline;
    }

    async fn close(&mut self) -> io::Result<()> {
        match self.stream.take() {
            Some(mut stream) => stream.shutdown().await,
            None => Ok(()),
        }
    }
}

/// Client-side TLS configuration: mutual auth with the given identity,
/// servers validated against the root store. rustls speaks TLS 1.2 and
/// newer only, which is exactly the MBAPS floor.
pub fn client_config(identity: TlsIdentity, roots: RootCertStore) -> Result<ClientConfig, Error> {
    ClientConfig::builder()
        .with_root_certificates(roots)
        .with_client_auth_cert(identity.certs, identity.key)
        .map_err(|err| {
            error!("tls client configuration: {}", err);
            Error::Configuration
        })
}

/// Server-side TLS configuration with mandatory verified client certs.
///
/// The trust store is the live pool, not a snapshot: certificates added to
/// the pool while the server runs apply to the next handshake. The pool may
/// start out empty, in which case every client is turned away at
/// certificate verification until it is populated.
pub fn server_config(identity: TlsIdentity, client_cas: CertPool) -> Result<ServerConfig, Error> {
    let verifier = Arc::new(LivePoolVerifier {
        pool: client_cas,
        provider: Arc::new(aws_lc_rs::default_provider()),
    });

    ServerConfig::builder()
        .with_client_cert_verifier(verifier)
        .with_single_cert(identity.certs, identity.key)
        .map_err(|err| {
            error!("tls server configuration: {}", err);
            Error::Configuration
        })
}

/// Checks client certificates against the pool as it is at handshake time.
#[derive(Debug)]
struct LivePoolVerifier {
    pool: CertPool,
    provider: Arc<CryptoProvider>,
}

impl ClientCertVerifier for LivePoolVerifier {
    fn root_hint_subjects(&self) -> &[DistinguishedName] {
        &[]
    }

    fn verify_client_cert(
        &self,
        end_entity: &CertificateDer<'_>,
        intermediates: &[CertificateDer<'_>],
        now: UnixTime,
    ) -> Result<ClientCertVerified, TlsError> {
        let store = self.pool.snapshot();
        if store.is_empty() {
            // nothing can verify against an empty pool; the handshake dies
            // here and the peer sees a TLS error on its next read
            return Err(TlsError::InvalidCertificate(
                CertificateError::UnknownIssuer,
            ));
        }

        WebPkiClientVerifier::builder_with_provider(Arc::new(store), self.provider.clone())
            .build()
            .map_err(|err| TlsError::General(err.to_string()))?
            .verify_client_cert(end_entity, intermediates, now)
    }

    fn verify_tls12_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, TlsError> {
        verify_tls12_signature(
            message,
            cert,
            dss,
            &self.provider.signature_verification_algorithms,
        )
    }

    fn verify_tls13_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, TlsError> {
        verify_tls13_signature(
            message,
            cert,
            dss,
            &self.provider.signature_verification_algorithms,
        )
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        self.provider
            .signature_verification_algorithms
            .supported_schemes()
    }
}

/// Dials `target` and completes the TLS handshake within one 15 second
/// deadline.
pub async fn connect(target: &str, config: Arc<ClientConfig>) -> Result<TlsLink, Error> {
    let host = target.rsplit_once(':').map_or(target, |(host, _)| host);
    let server_name = ServerName::try_from(host.to_owned()).map_err(|_| Error::Configuration)?;

    let handshake = async {
        let stream = TcpStream::connect(target).await?;
        TlsConnector::from(config).connect(server_name, stream).await
    };

    match timeout(CONNECT_TIMEOUT, handshake).await {
        Ok(Ok(stream)) => Ok(TlsLink::new(stream)),
        Ok(Err(err)) => Err(err.into()),
        Err(_) => Err(Error::RequestTimedOut),
    }
}

/// Server-side handshake on an accepted connection. Returns the link and the
/// role carried by the client certificate ("" when absent or malformed).
pub async fn accept(stream: TcpStream, acceptor: TlsAcceptor) -> io::Result<(TlsLink, String)> {
    match timeout(HANDSHAKE_TIMEOUT, acceptor.accept(stream)).await {
        Ok(Ok(tls)) => {
            let role = tls
                .get_ref()
                .1
                .peer_certificates()
                .and_then(|certs| certs.first())
                .map(|leaf| extract_role(leaf.as_ref()))
                .unwrap_or_default();
            Ok((TlsLink::new(tls), role))
        }
        Ok(Err(err)) => Err(err),
        Err(_) => Err(timed_out()),
    }
}

/// Pulls the Modbus Role out of a client certificate (DER).
///
/// Exactly one role extension is accepted; a certificate presenting several
/// gets the empty (unprivileged) role, as does anything that fails to parse.
pub fn extract_role(cert_der: &[u8]) -> String {
    use x509_parser::prelude::*;

    let Ok((_, cert)) = X509Certificate::from_der(cert_der) else {
        return String::new();
    };

    let values: Vec<&[u8]> = cert
        .extensions()
        .iter()
        .filter(|ext| ext.oid.to_id_string() == MODBUS_ROLE_OID)
        .map(|ext| ext.value)
        .collect();

    role_from_extensions(&values)
}

fn role_from_extensions(values: &[&[u8]]) -> String {
    if values.len() != 1 {
        return String::new();
    }
    parse_role_value(values[0]).unwrap_or_default()
}

/// Decodes the extension value as an ASN.1 UTF8String TLV. The payload must
/// fill the announced length exactly.
fn parse_role_value(bytes: &[u8]) -> Option<String> {
    const UTF8_STRING_TAG: u8 = 0x0C;

    if bytes.len() < 2 || bytes[0] != UTF8_STRING_TAG {
        return None;
    }

    let (length, header) = match bytes[1] {
        short if short < 0x80 => (short as usize, 2),
        0x81 => (*bytes.get(2)? as usize, 3),
        0x82 => {
            let hi = *bytes.get(2)? as usize;
            let lo = *bytes.get(3)? as usize;
            (hi << 8 | lo, 4)
        }
        _ => return None,
    };

    if bytes.len() - header != length {
        return None;
    }

    std::str::from_utf8(&bytes[header..])
        .ok()
        .map(str::to_owned)
}

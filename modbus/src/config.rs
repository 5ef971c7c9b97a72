use crate::error::Error;
use log::error;
use std::fs;
use std::sync::{Arc, RwLock};
use tokio::time::Duration;
use tokio_rustls::rustls::pki_types::{CertificateDer, PrivateKeyDer};
use tokio_rustls::rustls::RootCertStore;
pub use tokio_serial::{DataBits, Parity, StopBits};

/// Transport selection, parsed from the URL scheme.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum Scheme {
    Rtu,
    RtuOverTcp,
    RtuOverUdp,
    Tcp,
    TcpTls,
    Udp,
}

/// Splits `scheme://target` and applies the default port where the scheme
/// defines one (502 for tcp, 802 for tcp+tls).
pub fn parse_url(url: &str) -> Result<(Scheme, String), Error> {
    let Some((scheme, target)) = url.split_once("://") else {
        error!("missing client type in URL '{}'", url);
        return Err(Error::Configuration);
    };

    if target.is_empty() {
        error!("missing target in URL '{}'", url);
        return Err(Error::Configuration);
    }

    let scheme = match scheme {
        "rtu" => Scheme::Rtu,
        "rtuovertcp" => Scheme::RtuOverTcp,
        "rtuoverudp" => Scheme::RtuOverUdp,
        "tcp" => Scheme::Tcp,
        "tcp+tls" => Scheme::TcpTls,
        "udp" => Scheme::Udp,
        unknown => {
            error!("unsupported client type '{}'", unknown);
            return Err(Error::Configuration);
        }
    };

    let target = match scheme {
        Scheme::Tcp if !target.contains(':') => format!("{}:502", target),
        Scheme::TcpTls if !target.contains(':') => format!("{}:802", target),
        _ => target.to_owned(),
    };

    Ok((scheme, target))
}

/// Certificate chain plus matching private key, both DER, as loaded from PEM
/// files.
pub struct TlsIdentity {
    pub certs: Vec<CertificateDer<'static>>,
    pub key: PrivateKeyDer<'static>,
}

impl TlsIdentity {
    pub fn load(cert_path: &str, key_path: &str) -> Result<TlsIdentity, Error> {
        let cert_pem = fs::read(cert_path).map_err(|err| {
            error!("{}: {}", cert_path, err);
            Error::Configuration
        })?;
        let certs = rustls_pemfile::certs(&mut cert_pem.as_slice())
            .collect::<Result<Vec<_>, _>>()
            .map_err(|err| {
                error!("{}: {}", cert_path, err);
                Error::Configuration
            })?;
        if certs.is_empty() {
            error!("{}: no certificate found", cert_path);
            return Err(Error::Configuration);
        }

        let key_pem = fs::read(key_path).map_err(|err| {
            error!("{}: {}", key_path, err);
            Error::Configuration
        })?;
        let key = rustls_pemfile::private_key(&mut key_pem.as_slice())
            .ok()
            .flatten()
            .ok_or_else(|| {
                error!("{}: no private key found", key_path);
                Error::Configuration
            })?;

        Ok(TlsIdentity { certs, key })
    }
}

/// Loads a certificate store from a PEM file, which may hold one or more CA
/// or leaf certificates.
pub fn load_cert_pool(path: &str) -> Result<RootCertStore, Error> {
    let pem = fs::read(path).map_err(|err| {
        error!("{}: {}", path, err);
        Error::Configuration
    })?;
    if pem.is_empty() {
        error!("{}: empty file", path);
        return Err(Error::Configuration);
    }

    let mut pool = RootCertStore::empty();
    for cert in rustls_pemfile::certs(&mut pem.as_slice()) {
        let cert = cert.map_err(|err| {
            error!("{}: {}", path, err);
            Error::Configuration
        })?;
        pool.add(cert).map_err(|err| {
            error!("{}: {}", path, err);
            Error::Configuration
        })?;
    }

    if pool.is_empty() {
        error!("{}: no certificate found", path);
        return Err(Error::Configuration);
    }

    Ok(pool)
}

/// Client certificate trust store shared with a running server.
///
/// The pool is cheap to clone and every clone sees the same certificates, so
/// the embedding application can keep one handle and add certificates while
/// the server keeps accepting connections: each TLS handshake consults the
/// pool as it is at that moment. A server holding an empty pool still
/// accepts connections, but rejects every client at certificate
/// verification time.
#[derive(Debug, Clone)]
pub struct CertPool {
    store: Arc<RwLock<RootCertStore>>,
}

impl Default for CertPool {
    fn default() -> CertPool {
        CertPool::from(RootCertStore::empty())
    }
}

impl CertPool {
    pub fn new() -> CertPool {
        CertPool::default()
    }

    /// Loads the pool from a PEM file holding one or more CA or leaf
    /// certificates.
    pub fn load(path: &str) -> Result<CertPool, Error> {
        Ok(CertPool::from(load_cert_pool(path)?))
    }

    /// Adds a single DER certificate.
    pub fn add(&self, cert: CertificateDer<'static>) -> Result<(), Error> {
        self.store.write().unwrap().add(cert).map_err(|err| {
            error!("rejected certificate: {}", err);
            Error::Configuration
        })
    }

    /// Adds every certificate found in a PEM string.
    pub fn add_pem(&self, pem: &str) -> Result<(), Error> {
        let mut added = 0;
        for cert in rustls_pemfile::certs(&mut pem.as_bytes()) {
            let cert = cert.map_err(|err| {
                error!("malformed PEM certificate: {}", err);
                Error::Configuration
            })?;
            self.add(cert)?;
            added += 1;
        }
        if added == 0 {
            error!("no certificate found in PEM input");
            return Err(Error::Configuration);
        }
        Ok(())
    }

    pub fn is_empty(&self) -> bool {
        self.store.read().unwrap().is_empty()
    }

    /// Copy of the pool contents, taken at handshake time.
    pub(crate) fn snapshot(&self) -> RootCertStore {
        self.store.read().unwrap().clone()
    }
}

impl From<RootCertStore> for CertPool {
    fn from(store: RootCertStore) -> CertPool {
        CertPool {
            store: Arc::new(RwLock::new(store)),
        }
    }
}

pub struct ClientConfig {
    /// `<scheme>://<serial device or host:port>`, e.g. `tcp://plc:502`
    pub url: String,
    /// serial link speed in bauds (rtu family only), 19200 when left at 0
    pub speed: u32,
    /// bits per serial character, 8 when unset
    pub data_bits: Option<DataBits>,
    pub parity: Parity,
    /// derived from the parity when unset: two stop bits without parity,
    /// one with (per the modbus-over-serial-line spec)
    pub stop_bits: Option<StopBits>,
    /// per-request timeout; 300 ms on serial links, 1 s elsewhere when unset
    pub timeout: Option<Duration>,
    /// client identity, mandatory for tcp+tls
    pub tls_client_cert: Option<TlsIdentity>,
    /// CAs (or pinned leafs) used to authenticate the server, mandatory for
    /// tcp+tls
    pub tls_root_cas: Option<RootCertStore>,
}

impl Default for ClientConfig {
    fn default() -> ClientConfig {
        ClientConfig {
            url: String::new(),
            speed: 0,
            data_bits: None,
            parity: Parity::None,
            stop_bits: None,
            timeout: None,
            tls_client_cert: None,
            tls_root_cas: None,
        }
    }
}

impl ClientConfig {
    pub(crate) fn effective_data_bits(&self) -> DataBits {
        self.data_bits.unwrap_or(DataBits::Eight)
    }

    pub(crate) fn effective_stop_bits(&self) -> StopBits {
        self.stop_bits.unwrap_or(match self.parity {
            Parity::None => StopBits::Two,
            _ => StopBits::One,
        })
    }
}

pub struct ServerConfig {
    /// `tcp://host:port` or `tcp+tls://host:port`
    pub url: String,
    /// idle session timeout, 30 s when unset
    pub timeout: Option<Duration>,
    /// maximum concurrent client connections, 0 for unlimited
    pub max_clients: u32,
    /// server identity, mandatory for tcp+tls
    pub tls_server_cert: Option<TlsIdentity>,
    /// CAs (or pinned leafs) used to authenticate clients, mandatory for
    /// tcp+tls. The pool may start empty and be filled while the server
    /// runs; keep a clone to do so.
    pub tls_client_cas: Option<CertPool>,
}

impl Default for ServerConfig {
    fn default() -> ServerConfig {
        ServerConfig {
            url: String::new(),
            timeout: None,
            max_clients: 0,
            tls_server_cert: None,
            tls_client_cas: None,
        }
    }
}

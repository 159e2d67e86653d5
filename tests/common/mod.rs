//! Shared fixtures for integration tests: a throwaway PKI, echo backends, TLS clients
//! and a reporter that records session outcomes.

#![allow(dead_code)]

use openssl::asn1::{Asn1Integer, Asn1Time};
use openssl::bn::{BigNum, MsbOption};
use openssl::ec::{EcGroup, EcKey};
use openssl::hash::MessageDigest;
use openssl::nid::Nid;
use openssl::pkey::{PKey, Private};
use openssl::ssl::{Ssl, SslAcceptor, SslConnector, SslMethod, SslVerifyMode};
use openssl::x509::extension::{
    BasicConstraints, ExtendedKeyUsage, KeyUsage, SubjectAlternativeName, SubjectKeyIdentifier,
};
use openssl::x509::store::X509StoreBuilder;
use openssl::x509::{X509Builder, X509NameBuilder, X509};
use std::fs;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tempfile::TempDir;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio_openssl::SslStream;

use rproxy::common::ProxyError;
use rproxy::config::ProxyConfig;
use rproxy::proxy::{RelayStats, SessionReporter};
use rproxy::Proxy;

pub const SERVER_NAME: &str = "testapp-server";
pub const IO_TIMEOUT: Duration = Duration::from_secs(10);

fn new_key() -> PKey<Private> {
    let group = EcGroup::from_curve_name(Nid::X9_62_PRIME256V1).unwrap();
    PKey::from_ec_key(EcKey::generate(&group).unwrap()).unwrap()
}

fn serial() -> Asn1Integer {
    let mut bn = BigNum::new().unwrap();
    bn.rand(64, MsbOption::MAYBE_ZERO, false).unwrap();
    bn.to_asn1_integer().unwrap()
}

fn unix_now() -> i64 {
    SystemTime::now().duration_since(UNIX_EPOCH).unwrap().as_secs() as i64
}

/// Self-signed CA certificate and key
pub fn make_ca(cn: &str) -> (X509, PKey<Private>) {
    let key = new_key();

    let mut name = X509NameBuilder::new().unwrap();
    name.append_entry_by_nid(Nid::COMMONNAME, cn).unwrap();
    let name = name.build();

    let mut builder = X509Builder::new().unwrap();
    builder.set_version(2).unwrap();
    builder.set_serial_number(&serial()).unwrap();
    builder.set_subject_name(&name).unwrap();
    builder.set_issuer_name(&name).unwrap();
    builder.set_pubkey(&key).unwrap();
    builder.set_not_before(&Asn1Time::days_from_now(0).unwrap()).unwrap();
    builder.set_not_after(&Asn1Time::days_from_now(365).unwrap()).unwrap();
    builder
        .append_extension(BasicConstraints::new().critical().ca().build().unwrap())
        .unwrap();
    builder
        .append_extension(
            KeyUsage::new()
                .critical()
                .key_cert_sign()
                .crl_sign()
                .build()
                .unwrap(),
        )
        .unwrap();
    let ski = SubjectKeyIdentifier::new()
        .build(&builder.x509v3_context(None, None))
        .unwrap();
    builder.append_extension(ski).unwrap();
    builder.sign(&key, MessageDigest::sha256()).unwrap();

    (builder.build(), key)
}

/// Leaf certificate signed by `ca`, valid for client and server auth
pub fn make_leaf(
    ca: &X509,
    ca_key: &PKey<Private>,
    cn: &str,
    not_before: Asn1Time,
    not_after: Asn1Time,
) -> (X509, PKey<Private>) {
    let key = new_key();

    let mut name = X509NameBuilder::new().unwrap();
    name.append_entry_by_nid(Nid::COMMONNAME, cn).unwrap();
    let name = name.build();

    let mut builder = X509Builder::new().unwrap();
    builder.set_version(2).unwrap();
    builder.set_serial_number(&serial()).unwrap();
    builder.set_subject_name(&name).unwrap();
    builder.set_issuer_name(ca.subject_name()).unwrap();
    builder.set_pubkey(&key).unwrap();
    builder.set_not_before(&not_before).unwrap();
    builder.set_not_after(&not_after).unwrap();
    builder
        .append_extension(BasicConstraints::new().build().unwrap())
        .unwrap();
    builder
        .append_extension(KeyUsage::new().critical().digital_signature().build().unwrap())
        .unwrap();
    builder
        .append_extension(
            ExtendedKeyUsage::new()
                .server_auth()
                .client_auth()
                .build()
                .unwrap(),
        )
        .unwrap();
    let san = SubjectAlternativeName::new()
        .dns(cn)
        .dns("localhost")
        .ip("127.0.0.1")
        .build(&builder.x509v3_context(Some(&**ca), None))
        .unwrap();
    builder.append_extension(san).unwrap();
    builder.sign(ca_key, MessageDigest::sha256()).unwrap();

    (builder.build(), key)
}

fn valid_window() -> (Asn1Time, Asn1Time) {
    (
        Asn1Time::days_from_now(0).unwrap(),
        Asn1Time::days_from_now(30).unwrap(),
    )
}

/// Certificates and keys written to a temporary directory
pub struct TestPki {
    _dir: TempDir,
    pub root: X509,
    pub root_cert: PathBuf,
    pub server_cert: PathBuf,
    pub server_key: PathBuf,
    pub client_cert: PathBuf,
    pub client_key: PathBuf,
    /// Signed by a different CA
    pub rogue_cert: PathBuf,
    pub rogue_key: PathBuf,
    /// Signed by the root but no longer valid
    pub expired_cert: PathBuf,
    pub expired_key: PathBuf,
}

fn write_pair(dir: &Path, stem: &str, cert: &X509, key: &PKey<Private>) -> (PathBuf, PathBuf) {
    let cert_path = dir.join(format!("{stem}_cert.pem"));
    let key_path = dir.join(format!("{stem}_key.pem"));
    fs::write(&cert_path, cert.to_pem().unwrap()).unwrap();
    fs::write(&key_path, key.private_key_to_pem_pkcs8().unwrap()).unwrap();
    (cert_path, key_path)
}

impl TestPki {
    pub fn generate() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let (root, root_key) = make_ca("rproxy test root");
        let (rogue_ca, rogue_ca_key) = make_ca("rproxy rogue root");

        let root_cert = dir.path().join("root_cert.pem");
        fs::write(&root_cert, root.to_pem().unwrap()).unwrap();

        let (nb, na) = valid_window();
        let (cert, key) = make_leaf(&root, &root_key, SERVER_NAME, nb, na);
        let (server_cert, server_key) = write_pair(dir.path(), "server", &cert, &key);

        let (nb, na) = valid_window();
        let (cert, key) = make_leaf(&root, &root_key, "testapp-client", nb, na);
        let (client_cert, client_key) = write_pair(dir.path(), "client", &cert, &key);

        let (nb, na) = valid_window();
        let (cert, key) = make_leaf(&rogue_ca, &rogue_ca_key, "intruder", nb, na);
        let (rogue_cert, rogue_key) = write_pair(dir.path(), "rogue", &cert, &key);

        let now = unix_now();
        let (cert, key) = make_leaf(
            &root,
            &root_key,
            "expired-client",
            Asn1Time::from_unix(now - 10 * 86_400).unwrap(),
            Asn1Time::from_unix(now - 86_400).unwrap(),
        );
        let (expired_cert, expired_key) = write_pair(dir.path(), "expired", &cert, &key);

        Self {
            _dir: dir,
            root,
            root_cert,
            server_cert,
            server_key,
            client_cert,
            client_key,
            rogue_cert,
            rogue_key,
            expired_cert,
            expired_key,
        }
    }

    /// Connector trusting only the test root, optionally presenting an identity
    pub fn connector(&self, identity: Option<(&PathBuf, &PathBuf)>) -> SslConnector {
        let mut builder = SslConnector::builder(SslMethod::tls()).unwrap();

        let mut store = X509StoreBuilder::new().unwrap();
        store.add_cert(self.root.clone()).unwrap();
        builder.set_cert_store(store.build());

        if let Some((cert, key)) = identity {
            builder.set_certificate_file(cert, openssl::ssl::SslFiletype::PEM).unwrap();
            builder.set_private_key_file(key, openssl::ssl::SslFiletype::PEM).unwrap();
        }

        builder.build()
    }

    /// Acceptor requiring a client certificate chaining to the test root
    pub fn acceptor(&self) -> SslAcceptor {
        self.acceptor_with(&self.server_cert, &self.server_key)
    }

    /// Same as [`TestPki::acceptor`] but presenting the given identity
    pub fn acceptor_with(&self, cert: &Path, key: &Path) -> SslAcceptor {
        let mut builder = SslAcceptor::mozilla_intermediate_v5(SslMethod::tls()).unwrap();

        let mut store = X509StoreBuilder::new().unwrap();
        store.add_cert(self.root.clone()).unwrap();
        builder.set_cert_store(store.build());

        builder
            .set_certificate_file(cert, openssl::ssl::SslFiletype::PEM)
            .unwrap();
        builder
            .set_private_key_file(key, openssl::ssl::SslFiletype::PEM)
            .unwrap();
        builder.set_verify(SslVerifyMode::PEER | SslVerifyMode::FAIL_IF_NO_PEER_CERT);
        builder.build()
    }
}

/// TLS client connection to `addr`, verifying the server as `localhost`
pub async fn tls_connect(
    connector: &SslConnector,
    addr: SocketAddr,
) -> Result<SslStream<TcpStream>, String> {
    let tcp = TcpStream::connect(addr).await.map_err(|e| e.to_string())?;
    let ssl = connector
        .configure()
        .and_then(|c| c.into_ssl("localhost"))
        .map_err(|e| e.to_string())?;
    let mut stream = SslStream::new(ssl, tcp).map_err(|e| e.to_string())?;
    Pin::new(&mut stream)
        .connect()
        .await
        .map_err(|e| e.to_string())?;
    Ok(stream)
}

/// Echo server counting accepted connections
pub struct EchoBackend {
    pub addr: SocketAddr,
    accepted: Arc<AtomicUsize>,
}

impl EchoBackend {
    pub fn accepted(&self) -> usize {
        self.accepted.load(Ordering::SeqCst)
    }
}

async fn echo<S: AsyncRead + AsyncWrite + Unpin>(stream: S) {
    let (mut reader, mut writer) = tokio::io::split(stream);
    let _ = tokio::io::copy(&mut reader, &mut writer).await;
    let _ = writer.shutdown().await;
}

/// Plain TCP echo backend
pub async fn spawn_tcp_echo() -> EchoBackend {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let accepted = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&accepted);

    tokio::spawn(async move {
        while let Ok((stream, _)) = listener.accept().await {
            counter.fetch_add(1, Ordering::SeqCst);
            tokio::spawn(echo(stream));
        }
    });

    EchoBackend { addr, accepted }
}

/// Mutual-TLS echo backend using the PKI's server identity
pub async fn spawn_tls_echo(pki: &TestPki) -> EchoBackend {
    spawn_tls_echo_with(pki.acceptor()).await
}

/// Mutual-TLS echo backend using `acceptor`
pub async fn spawn_tls_echo_with(acceptor: SslAcceptor) -> EchoBackend {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let accepted = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&accepted);

    tokio::spawn(async move {
        while let Ok((tcp, _)) = listener.accept().await {
            counter.fetch_add(1, Ordering::SeqCst);
            let ssl = Ssl::new(acceptor.context()).unwrap();
            tokio::spawn(async move {
                let mut stream = SslStream::new(ssl, tcp).unwrap();
                if Pin::new(&mut stream).accept().await.is_ok() {
                    echo(stream).await;
                }
            });
        }
    });

    EchoBackend { addr, accepted }
}

/// Backend that accepts TCP connections and then never sends a byte
pub async fn spawn_silent_backend() -> EchoBackend {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let accepted = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&accepted);

    tokio::spawn(async move {
        let mut held = Vec::new();
        while let Ok((stream, _)) = listener.accept().await {
            counter.fetch_add(1, Ordering::SeqCst);
            held.push(stream);
        }
    });

    EchoBackend { addr, accepted }
}

/// Address that refuses connections
pub async fn closed_port() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    listener.local_addr().unwrap()
}

/// Session outcome seen by the reporter
#[derive(Debug)]
pub enum Event {
    Closed(RelayStats),
    Failed(ProxyError),
}

/// Reporter forwarding every outcome to a channel
pub struct ChannelReporter {
    tx: mpsc::UnboundedSender<Event>,
}

impl SessionReporter for ChannelReporter {
    fn accept_failed(&self, _error: &ProxyError) {}

    fn session_failed(&self, _peer: SocketAddr, error: &ProxyError) {
        // ProxyError is not Clone; keep the parts the tests look at
        let copy = match error {
            ProxyError::TlsHandshake(m) => ProxyError::TlsHandshake(m.clone()),
            ProxyError::BackendUnreachable { addr, reason } => ProxyError::BackendUnreachable {
                addr: addr.clone(),
                reason: reason.clone(),
            },
            ProxyError::BackendAuth { addr, reason } => ProxyError::BackendAuth {
                addr: addr.clone(),
                reason: reason.clone(),
            },
            other => ProxyError::Certificate(other.to_string()),
        };
        let _ = self.tx.send(Event::Failed(copy));
    }

    fn session_closed(&self, _peer: SocketAddr, stats: &RelayStats) {
        let _ = self.tx.send(Event::Closed(*stats));
    }
}

/// Running proxy on an ephemeral loopback port
pub struct TestProxy {
    pub addr: SocketAddr,
    pub events: mpsc::UnboundedReceiver<Event>,
    task: tokio::task::JoinHandle<()>,
}

impl TestProxy {
    /// Wait for the next session outcome
    pub async fn next_event(&mut self) -> Event {
        tokio::time::timeout(IO_TIMEOUT, self.events.recv())
            .await
            .expect("timed out waiting for a session event")
            .expect("reporter channel closed")
    }
}

impl Drop for TestProxy {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// Start a proxy; `config.listen` should use port 0
pub async fn start_proxy(config: ProxyConfig) -> TestProxy {
    let (tx, events) = mpsc::unbounded_channel();
    let proxy = Proxy::new(config)
        .expect("valid proxy config")
        .with_reporter(Arc::new(ChannelReporter { tx }));

    let listener = proxy.bind().await.expect("bind proxy");
    let addr = listener.local_addr().unwrap();

    let task = tokio::spawn(async move {
        let _ = proxy.serve(listener).await;
    });

    TestProxy { addr, events, task }
}

/// Send `payload` and read the same number of bytes back
pub async fn round_trip<S: AsyncRead + AsyncWrite + Unpin>(
    stream: &mut S,
    payload: &[u8],
) -> Vec<u8> {
    stream.write_all(payload).await.unwrap();
    stream.flush().await.unwrap();

    let mut received = vec![0u8; payload.len()];
    tokio::time::timeout(IO_TIMEOUT, stream.read_exact(&mut received))
        .await
        .expect("timed out reading echo")
        .unwrap();
    received
}

/// True once the stream reports EOF or an error
pub async fn is_closed<S: AsyncRead + Unpin>(stream: &mut S) -> bool {
    let mut buf = [0u8; 64];
    match tokio::time::timeout(IO_TIMEOUT, stream.read(&mut buf)).await {
        Ok(Ok(0)) | Ok(Err(_)) => true,
        Ok(Ok(_)) => false,
        Err(_) => false,
    }
}

//! Trust context construction
//!
//! Both roles trust exactly the configured root anchor; the system store is never
//! consulted. Contexts are built once at startup and shared read-only by all sessions.

use log::{debug, info};
use openssl::pkey::{PKey, Private};
use openssl::ssl::{SslAcceptor, SslConnector, SslMethod, SslVerifyMode};
use openssl::x509::store::{X509Store, X509StoreBuilder};
use openssl::x509::X509;
use std::path::Path;

use crate::common::{read_file, ProxyError, Result};

/// Server-role TLS configuration: presents the local identity and requires a client
/// certificate chaining to the root
#[derive(Clone)]
pub struct ServerTrust {
    acceptor: SslAcceptor,
}

impl ServerTrust {
    /// The underlying OpenSSL acceptor
    pub fn acceptor(&self) -> &SslAcceptor {
        &self.acceptor
    }
}

/// Client-role TLS configuration: presents the local identity and verifies the backend
/// against the root and `server_name`
#[derive(Clone)]
pub struct ClientTrust {
    connector: SslConnector,
    server_name: String,
}

impl ClientTrust {
    /// The underlying OpenSSL connector
    pub fn connector(&self) -> &SslConnector {
        &self.connector
    }

    /// Identity the backend certificate must match
    pub fn server_name(&self) -> &str {
        &self.server_name
    }
}

/// Local certificate chain (leaf first) and its private key
struct Identity {
    leaf: X509,
    chain: Vec<X509>,
    key: PKey<Private>,
}

fn trust_err(path: &Path, reason: impl ToString) -> ProxyError {
    ProxyError::TrustLoad {
        path: path.to_path_buf(),
        reason: reason.to_string(),
    }
}

fn identity_err(cert: &Path, key: &Path, reason: impl ToString) -> ProxyError {
    ProxyError::IdentityLoad {
        cert: cert.to_path_buf(),
        key: key.to_path_buf(),
        reason: reason.to_string(),
    }
}

/// Load every certificate of a PEM root file
fn load_roots(root_path: &Path) -> Result<Vec<X509>> {
    let pem = read_file(root_path).map_err(|e| trust_err(root_path, e))?;
    let roots = X509::stack_from_pem(&pem).map_err(|e| trust_err(root_path, e))?;

    if roots.is_empty() {
        return Err(trust_err(root_path, "no PEM certificate found"));
    }

    debug!("Loaded {} root certificate(s) from {}", roots.len(), root_path.display());
    Ok(roots)
}

fn build_store(root_path: &Path, roots: &[X509]) -> Result<X509Store> {
    let mut store = X509StoreBuilder::new().map_err(|e| trust_err(root_path, e))?;
    for root in roots {
        store
            .add_cert(root.clone())
            .map_err(|e| trust_err(root_path, e))?;
    }
    Ok(store.build())
}

fn load_identity(cert_path: &Path, key_path: &Path) -> Result<Identity> {
    let cert_pem = read_file(cert_path).map_err(|e| identity_err(cert_path, key_path, e))?;
    let mut certs =
        X509::stack_from_pem(&cert_pem).map_err(|e| identity_err(cert_path, key_path, e))?;

    if certs.is_empty() {
        return Err(identity_err(cert_path, key_path, "no PEM certificate found"));
    }
    let leaf = certs.remove(0);

    let key_pem = read_file(key_path).map_err(|e| identity_err(cert_path, key_path, e))?;
    let key = PKey::private_key_from_pem(&key_pem)
        .map_err(|e| identity_err(cert_path, key_path, e))?;

    let leaf_key = leaf
        .public_key()
        .map_err(|e| identity_err(cert_path, key_path, e))?;
    if !leaf_key.public_eq(&key) {
        return Err(identity_err(
            cert_path,
            key_path,
            "private key does not match certificate",
        ));
    }

    Ok(Identity {
        leaf,
        chain: certs,
        key,
    })
}

/// Build the server-role context used by an encrypted listener
///
/// # Errors
///
/// `ProxyError::TrustLoad` if the root cannot be loaded, `ProxyError::IdentityLoad` if the
/// certificate/key pair cannot be loaded or does not match.
pub fn build_server_context(
    root_cert: &Path,
    server_cert: &Path,
    server_key: &Path,
) -> Result<ServerTrust> {
    let roots = load_roots(root_cert)?;
    let identity = load_identity(server_cert, server_key)?;

    let mut builder = SslAcceptor::mozilla_intermediate_v5(SslMethod::tls())?;

    builder.set_cert_store(build_store(root_cert, &roots)?);
    for root in &roots {
        builder
            .add_client_ca(root)
            .map_err(|e| trust_err(root_cert, e))?;
    }

    apply_identity(&mut builder, &identity, server_cert, server_key)?;

    builder.set_verify(SslVerifyMode::PEER | SslVerifyMode::FAIL_IF_NO_PEER_CERT);

    info!(
        "Server TLS context ready (identity {}, client certificates required)",
        server_cert.display()
    );

    Ok(ServerTrust {
        acceptor: builder.build(),
    })
}

/// Build the client-role context used to dial an encrypted backend
///
/// # Errors
///
/// Same as [`build_server_context`].
pub fn build_client_context(
    root_cert: &Path,
    client_cert: &Path,
    client_key: &Path,
    expected_peer_name: &str,
) -> Result<ClientTrust> {
    let roots = load_roots(root_cert)?;
    let identity = load_identity(client_cert, client_key)?;

    let mut builder = SslConnector::builder(SslMethod::tls())?;

    builder.set_cert_store(build_store(root_cert, &roots)?);
    apply_identity(&mut builder, &identity, client_cert, client_key)?;
    builder.set_verify(SslVerifyMode::PEER);

    info!(
        "Client TLS context ready (identity {}, backend must be '{}')",
        client_cert.display(),
        expected_peer_name
    );

    Ok(ClientTrust {
        connector: builder.build(),
        server_name: expected_peer_name.to_string(),
    })
}

fn apply_identity(
    builder: &mut openssl::ssl::SslContextBuilder,
    identity: &Identity,
    cert_path: &Path,
    key_path: &Path,
) -> Result<()> {
    let map = |e: openssl::error::ErrorStack| identity_err(cert_path, key_path, e);

    builder.set_certificate(&identity.leaf).map_err(map)?;
    for cert in &identity.chain {
        builder.add_extra_chain_cert(cert.clone()).map_err(map)?;
    }
    builder.set_private_key(&identity.key).map_err(map)?;
    builder.check_private_key().map_err(map)?;

    Ok(())
}

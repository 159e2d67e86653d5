//! Certificate inspection
//!
//! Used to log which identities the proxy is running with and which peers connect.

use openssl::hash::MessageDigest;
use openssl::x509::{X509NameRef, X509Ref, X509};
use std::fmt;
use std::path::Path;

use crate::common::{read_file, ProxyError, Result};

/// Summary of a certificate
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CertificateInfo {
    /// Subject, e.g. `CN=testapp-server, O=Example`
    pub subject: String,
    /// Issuer in the same format as `subject`
    pub issuer: String,
    /// SHA-256 fingerprint as colon separated lowercase hex
    pub fingerprint: String,
    /// Expiry as printed by OpenSSL
    pub not_after: String,
}

impl fmt::Display for CertificateInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "subject=[{}] issuer=[{}] sha256={} expires={}",
            self.subject, self.issuer, self.fingerprint, self.not_after
        )
    }
}

/// Render a distinguished name as `SN=value, ...`
pub fn name_to_string(name: &X509NameRef) -> String {
    name.entries()
        .map(|entry| {
            let key = entry.object().nid().short_name().unwrap_or("?");
            let value = entry
                .data()
                .as_utf8()
                .map(|s| s.to_string())
                .unwrap_or_default();
            format!("{}={}", key, value)
        })
        .collect::<Vec<_>>()
        .join(", ")
}

/// Summarize an already parsed certificate
pub fn certificate_info(cert: &X509Ref) -> Result<CertificateInfo> {
    let digest = cert
        .digest(MessageDigest::sha256())
        .map_err(|e| ProxyError::Certificate(format!("Failed to calculate fingerprint: {}", e)))?;

    let fingerprint = digest
        .iter()
        .map(|b| format!("{:02x}", b))
        .collect::<Vec<_>>()
        .join(":");

    Ok(CertificateInfo {
        subject: name_to_string(cert.subject_name()),
        issuer: name_to_string(cert.issuer_name()),
        fingerprint,
        not_after: cert.not_after().to_string(),
    })
}

/// Summarize the first certificate of a PEM file
pub fn describe_certificate(cert_path: &Path) -> Result<CertificateInfo> {
    let data = read_file(cert_path).map_err(|e| {
        ProxyError::Certificate(format!("Failed to read {}: {}", cert_path.display(), e))
    })?;

    let cert = X509::from_pem(&data).map_err(|e| {
        ProxyError::Certificate(format!("Failed to parse {}: {}", cert_path.display(), e))
    })?;

    certificate_info(&cert)
}

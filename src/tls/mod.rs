//! TLS handling module
//!
//! Builds the server-role and client-role trust contexts and inspects certificates.

mod cert;
mod context;

pub use cert::{certificate_info, describe_certificate, name_to_string, CertificateInfo};
pub use context::{build_client_context, build_server_context, ClientTrust, ServerTrust};

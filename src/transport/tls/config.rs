//! `tokio_rustls` configuration for a peer-to-peer setting.
//! Client side authentication is requested, but neither side validates a certificate chain,
//! as both use single self-signed certificates.

use lazy_static::lazy_static;
use std::net::{IpAddr, Ipv4Addr};
use std::{sync::Arc, time::SystemTime};
use tokio_rustls::rustls::{
    self, client::ServerCertVerifier, server::ClientCertVerifier, Certificate, ClientConfig,
    ServerConfig, ServerName,
};

lazy_static! {
    /// Name passed to the connector; never checked against the presented certificate.
    pub static ref PEER_SERVER_NAME: ServerName =
        ServerName::IpAddress(IpAddr::V4(Ipv4Addr::UNSPECIFIED));
}

/// Client verification: require a certificate to be present
struct PeerClientCertVerifier;

impl ClientCertVerifier for PeerClientCertVerifier {
    fn verify_client_cert(
        &self,
        _end_entity: &Certificate,
        _intermediates: &[Certificate],
        _now: SystemTime,
    ) -> Result<rustls::server::ClientCertVerified, rustls::Error> {
        Ok(rustls::server::ClientCertVerified::assertion())
    }

    fn client_auth_root_subjects(&self) -> Option<rustls::DistinguishedNames> {
        Some(vec![])
    }

    fn offer_client_auth(&self) -> bool {
        true
    }

    fn client_auth_mandatory(&self) -> Option<bool> {
        Some(true)
    }
}

/// Server verification: don't check certificate chain and domain name
struct PeerServerCertVerifier;

impl ServerCertVerifier for PeerServerCertVerifier {
    fn verify_server_cert(
        &self,
        _end_entity: &Certificate,
        _intermediates: &[Certificate],
        _server_name: &ServerName,
        _scts: &mut dyn Iterator<Item = &[u8]>,
        _ocsp_response: &[u8],
        _now: SystemTime,
    ) -> Result<rustls::client::ServerCertVerified, rustls::Error> {
        Ok(rustls::client::ServerCertVerified::assertion())
    }
}

pub fn client_tls_config(
    raw_certificate: &[u8],
    raw_private_key: &[u8],
) -> Result<ClientConfig, rustls::Error> {
    let cert_vec = vec![rustls::Certificate(Vec::from(raw_certificate))];
    let pk = rustls::PrivateKey(Vec::from(raw_private_key));
    ClientConfig::builder()
        .with_safe_defaults()
        .with_custom_certificate_verifier(Arc::new(PeerServerCertVerifier))
        .with_single_cert(cert_vec, pk)
}

pub fn server_tls_config(
    raw_certificate: &[u8],
    raw_private_key: &[u8],
) -> Result<ServerConfig, rustls::Error> {
    let cert_vec = vec![rustls::Certificate(Vec::from(raw_certificate))];
    let pk = rustls::PrivateKey(Vec::from(raw_private_key));
    ServerConfig::builder()
        .with_safe_defaults()
        .with_client_cert_verifier(Arc::new(PeerClientCertVerifier))
        .with_single_cert(cert_vec, pk)
}

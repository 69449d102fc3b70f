use derive_more::{Display, Error, From};
use pem::Pem;
use pem::PemError;
use rcgen::RcgenError;
use rcgen::{Certificate, CertificateParams, KeyIdMethod, KeyPair, PKCS_ED25519};
use std::{fs, path::Path};
use x509_parser::certificate::X509Certificate;
use x509_parser::error::X509Error;
use x509_parser::prelude::FromDer;

const CERT_FILE: &str = "node.crt";
const KEY_FILE: &str = "node.key";

/// Loads the certificate and key from `dir`, generating and persisting them on first use.
pub fn load_or_generate(dir: &Path) -> Result<(Vec<u8>, Vec<u8>)> {
    fs::create_dir_all(dir)?;
    get_node_cert(&dir.join(CERT_FILE), &dir.join(KEY_FILE))
}

/// Checks and returns the certificate and key found at `cert_file` and `priv_key_file`,
/// otherwise generates them and writes both to the supplied paths
pub fn get_node_cert(cert_file: &Path, priv_key_file: &Path) -> Result<(Vec<u8>, Vec<u8>)> {
    if cert_file.exists() && priv_key_file.exists() {
        let cert: Vec<u8> = pem::parse(fs::read(cert_file)?)?.contents;
        let key = pem::parse(fs::read(priv_key_file)?)?.contents;
        // Quick check if certificate just loaded is a valid one
        let (_rest, _cert) = X509Certificate::from_der(&cert)?;
        Ok((cert, key))
    } else {
        let (cert, priv_key) = generate_node_cert()?;
        fs::write(cert_file, der_to_pem(&cert, "CERTIFICATE"))?;
        fs::write(priv_key_file, der_to_pem(&priv_key, "PRIVATE KEY"))?;
        Ok((cert, priv_key))
    }
}

/// Generate a self signed ed25519 X.509 certificate
pub fn generate_node_cert() -> Result<(Vec<u8>, Vec<u8>)> {
    let alg = &PKCS_ED25519;
    let key_pair = KeyPair::generate(alg)?;
    let mut params = CertificateParams::new(vec!["tradenet-node".to_owned()]);
    params.alg = alg;
    params.key_pair = Some(key_pair);
    params.key_identifier_method = KeyIdMethod::Sha256;

    let cert = Certificate::from_params(params)?;
    let private_key = cert.serialize_private_key_der();
    let cert = cert.serialize_der()?;
    Ok((cert, private_key))
}

#[inline]
fn der_to_pem(contents: &[u8], tag: &str) -> String {
    let pem = Pem { tag: String::from(tag), contents: contents.to_owned() };
    pem::encode(&pem)
}

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug, Display, From)]
pub enum Error {
    IoError(std::io::Error),
    CertificateGenError(RcgenError),
    CertificateReadError(PemError),
    CertificateParseError(x509_parser::nom::Err<X509Error>),
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::id::Id;
    use std::env::temp_dir;

    #[actix_rt::test]
    async fn persisted_cert_is_reused() {
        let dir = temp_dir().join(format!("tradenet-tls-{}", Id::generate()));
        let first = load_or_generate(&dir).unwrap();
        let second = load_or_generate(&dir).unwrap();
        assert_eq!(first, second);
        let _ = fs::remove_dir_all(&dir);
    }

    #[actix_rt::test]
    async fn corrupt_cert_is_an_error() {
        let dir = temp_dir().join(format!("tradenet-tls-{}", Id::generate()));
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join(CERT_FILE), "not a pem").unwrap();
        fs::write(dir.join(KEY_FILE), "not a pem").unwrap();
        assert!(matches!(load_or_generate(&dir), Err(Error::CertificateReadError(_))));
        let _ = fs::remove_dir_all(&dir);
    }
}

//! rustls configuration for the QUIC transport.
//!
//! QUIC mandates TLS 1.3, so both builders pin the protocol version and the
//! `ring` provider.

use std::path::Path;
use std::sync::Arc;

use rustls::pki_types::{CertificateDer, PrivateKeyDer};
use rustls_pemfile::{certs, ec_private_keys, pkcs8_private_keys, rsa_private_keys};

use super::ALPN_PROTOCOL;
use crate::error::CsiError;

fn provider() -> Arc<rustls::crypto::CryptoProvider> {
    Arc::new(rustls::crypto::ring::default_provider())
}

/// Server configuration presenting `cert_chain` without client
/// authentication.
pub fn server_config(
    cert_chain: Vec<CertificateDer<'static>>,
    key: PrivateKeyDer<'static>,
) -> Result<rustls::ServerConfig, CsiError> {
    let mut config = rustls::ServerConfig::builder_with_provider(provider())
        .with_protocol_versions(&[&rustls::version::TLS13])
        .map_err(CsiError::transport)?
        .with_no_client_auth()
        .with_single_cert(cert_chain, key)
        .map_err(|e| CsiError::TransportError(format!("invalid certificate or key: {e}")))?;
    config.alpn_protocols = vec![ALPN_PROTOCOL.to_vec()];
    Ok(config)
}

/// Client configuration trusting exactly `roots`.
pub fn client_config(
    roots: Vec<CertificateDer<'static>>,
) -> Result<rustls::ClientConfig, CsiError> {
    let mut store = rustls::RootCertStore::empty();
    for cert in roots {
        store.add(cert).map_err(CsiError::transport)?;
    }
    let mut config = rustls::ClientConfig::builder_with_provider(provider())
        .with_protocol_versions(&[&rustls::version::TLS13])
        .map_err(CsiError::transport)?
        .with_root_certificates(store)
        .with_no_client_auth();
    config.alpn_protocols = vec![ALPN_PROTOCOL.to_vec()];
    Ok(config)
}

/// Build a server configuration from PEM files.
pub fn load_server_config(
    cert_path: &Path,
    key_path: &Path,
) -> Result<rustls::ServerConfig, CsiError> {
    let chain = load_certs(cert_path)?;
    let key = load_private_key(key_path)?;
    server_config(chain, key)
}

/// Build a client configuration trusting the certificates of a PEM bundle.
pub fn load_client_config(ca_path: &Path) -> Result<rustls::ClientConfig, CsiError> {
    client_config(load_certs(ca_path)?)
}

pub fn load_certs(path: &Path) -> Result<Vec<CertificateDer<'static>>, CsiError> {
    let pem = read(path)?;
    parse_certs(&pem).map_err(|e| CsiError::TransportError(format!("{}: {e}", path.display())))
}

pub fn load_private_key(path: &Path) -> Result<PrivateKeyDer<'static>, CsiError> {
    let pem = read(path)?;
    parse_private_key(&pem)
        .map_err(|e| CsiError::TransportError(format!("{}: {e}", path.display())))
}

fn read(path: &Path) -> Result<Vec<u8>, CsiError> {
    std::fs::read(path)
        .map_err(|e| CsiError::TransportError(format!("failed to read {}: {e}", path.display())))
}

fn parse_certs(mut pem: &[u8]) -> Result<Vec<CertificateDer<'static>>, String> {
    let chain = certs(&mut pem)
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| e.to_string())?;
    if chain.is_empty() {
        return Err("no certificates found".to_owned());
    }
    Ok(chain)
}

/// PKCS#8 first, then PKCS#1 (RSA), then SEC1 (EC).
fn parse_private_key(pem: &[u8]) -> Result<PrivateKeyDer<'static>, String> {
    let mut reader = pem;
    if let Some(key) = pkcs8_private_keys(&mut reader).find_map(Result::ok) {
        return Ok(PrivateKeyDer::Pkcs8(key));
    }
    let mut reader = pem;
    if let Some(key) = rsa_private_keys(&mut reader).find_map(Result::ok) {
        return Ok(PrivateKeyDer::Pkcs1(key));
    }
    let mut reader = pem;
    if let Some(key) = ec_private_keys(&mut reader).find_map(Result::ok) {
        return Ok(PrivateKeyDer::Sec1(key));
    }
    Err("no private key found".to_owned())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn self_signed() -> rcgen::CertifiedKey {
        rcgen::generate_simple_self_signed(vec!["localhost".to_owned()]).unwrap()
    }

    #[test]
    fn loads_pem_files_into_configs() {
        let dir = tempfile::tempdir().unwrap();
        let cert_path = dir.path().join("tls.crt");
        let key_path = dir.path().join("tls.key");
        let generated = self_signed();
        std::fs::write(&cert_path, generated.cert.pem()).unwrap();
        std::fs::write(&key_path, generated.key_pair.serialize_pem()).unwrap();

        let server = load_server_config(&cert_path, &key_path).unwrap();
        assert_eq!(server.alpn_protocols, vec![ALPN_PROTOCOL.to_vec()]);

        let client = load_client_config(&cert_path).unwrap();
        assert_eq!(client.alpn_protocols, vec![ALPN_PROTOCOL.to_vec()]);
    }

    #[test]
    fn rejects_missing_or_empty_pem() {
        let dir = tempfile::tempdir().unwrap();
        let empty = dir.path().join("empty.pem");
        std::fs::write(&empty, "").unwrap();

        assert!(load_certs(&empty).is_err());
        assert!(load_private_key(&empty).is_err());
        assert!(load_certs(&dir.path().join("missing.pem")).is_err());
    }
}

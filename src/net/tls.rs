//! TLS client configuration and handshake.

use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use std::sync::{Arc, OnceLock};

use rustls::pki_types::ServerName;
use rustls::{ClientConfig, RootCertStore};
use tokio_rustls::client::TlsStream;
use tokio_rustls::TlsConnector;

use crate::error::TransportError;
use crate::net::connection::BoxIo;

/// Client config trusting the bundled webpki roots.
pub fn default_client_config() -> Arc<ClientConfig> {
    static DEFAULT: OnceLock<Arc<ClientConfig>> = OnceLock::new();
    Arc::clone(DEFAULT.get_or_init(|| Arc::new(build_client_config(webpki_root_store()))))
}

/// Client config trusting the webpki roots plus every certificate in the
/// given PEM bundles.
pub fn client_config<P: AsRef<Path>>(extra_roots: &[P]) -> Result<Arc<ClientConfig>, std::io::Error> {
    let mut roots = webpki_root_store();
    for path in extra_roots {
        let path = path.as_ref();
        if !path.exists() {
            return Err(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("Certificate file not found: {:?}", path),
            ));
        }
        let mut reader = BufReader::new(File::open(path)?);
        for cert in rustls_pemfile::certs(&mut reader) {
            roots
                .add(cert?)
                .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        }
    }
    Ok(Arc::new(build_client_config(roots)))
}

fn webpki_root_store() -> RootCertStore {
    let mut roots = RootCertStore::empty();
    roots.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
    roots
}

fn build_client_config(roots: RootCertStore) -> ClientConfig {
    ClientConfig::builder()
        .with_root_certificates(roots)
        .with_no_client_auth()
}

/// Run the client handshake over `io`, then check the leaf certificate
/// against `host` explicitly.
///
/// On failure `io` is dropped, which closes the connection.
pub async fn handshake(
    connector: &TlsConnector,
    io: BoxIo,
    host: &str,
) -> Result<TlsStream<BoxIo>, TransportError> {
    let server_name = ServerName::try_from(host.to_owned())
        .map_err(|_| TransportError::InvalidServerName(host.to_owned()))?;

    let stream = connector
        .connect(server_name.clone(), io)
        .await
        .map_err(|source| TransportError::Handshake {
            host: host.to_owned(),
            source,
        })?;

    verify_hostname(&stream, &server_name, host)?;
    tracing::trace!(host, "TLS handshake complete");
    Ok(stream)
}

fn verify_hostname(
    stream: &TlsStream<BoxIo>,
    server_name: &ServerName<'_>,
    host: &str,
) -> Result<(), TransportError> {
    let mismatch = |reason: String| TransportError::HostnameMismatch {
        host: host.to_owned(),
        reason,
    };

    let (_, session) = stream.get_ref();
    let leaf = session
        .peer_certificates()
        .and_then(|certs| certs.first())
        .ok_or_else(|| mismatch("peer presented no certificate".into()))?;
    let cert = webpki::EndEntityCert::try_from(leaf).map_err(|e| mismatch(format!("{e:?}")))?;
    cert.verify_is_valid_for_subject_name(server_name)
        .map_err(|e| mismatch(format!("{e:?}")))
}

//! Transport security for broker connections.
//!
//! Turns the `kafka.auth.tls` section into either a plaintext transport or a
//! validated TLS transport. All certificate material is loaded and checked
//! here, before any client exists, so a broken CA bundle or a half-configured
//! client identity stops startup instead of surfacing as a handshake failure
//! later on.

use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use rdkafka::ClientConfig;
use rustls::client::ResolvesClientCert;
use rustls::crypto::{CryptoProvider, KeyProvider};
use rustls::pki_types::{CertificateDer, PrivateKeyDer};
use rustls::sign::{CertifiedKey, SigningKey};
use rustls::{RootCertStore, SignatureScheme};
use tracing::{debug, info};

use crate::config::TlsConfig;
use crate::{Error, Result};

/// Timeout for establishing a broker connection, TLS handshake included.
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Lets librdkafka search the usual system locations for CA bundles.
const SYSTEM_CA_LOCATION: &str = "probe";

#[derive(Debug, Clone, PartialEq)]
pub enum TransportSecurity {
    Plaintext { connect_timeout: Duration },
    Tls(TlsTransport),
}

/// Where trusted roots come from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CaSource {
    File(PathBuf),
    System,
}

/// Certificate and key presented for mutual TLS.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientIdentity {
    pub cert_path: PathBuf,
    pub key_path: PathBuf,
}

/// A TLS transport whose certificate material has been loaded and checked.
///
/// librdkafka performs the handshake itself from the file locations, so the
/// rustls context kept here only records that the material is usable. It is
/// never used to dial a broker.
#[derive(Debug, Clone)]
pub struct TlsTransport {
    pub ca: CaSource,
    pub identity: Option<ClientIdentity>,
    pub connect_timeout: Duration,
    context: Arc<rustls::ClientConfig>,
}

// The context is derived entirely from the paths.
impl PartialEq for TlsTransport {
    fn eq(&self, other: &Self) -> bool {
        self.ca == other.ca
            && self.identity == other.identity
            && self.connect_timeout == other.connect_timeout
    }
}

impl TransportSecurity {
    pub fn from_config(config: &TlsConfig) -> Result<Self> {
        if !config.enabled {
            return Ok(Self::Plaintext {
                connect_timeout: CONNECT_TIMEOUT,
            });
        }

        let (ca, roots) = match &config.ca_path {
            Some(path) => (CaSource::File(path.clone()), load_root_store(path)?),
            None => {
                debug!("No CA path configured, using default trust roots");
                let roots = RootCertStore {
                    roots: webpki_roots::TLS_SERVER_ROOTS.to_vec(),
                };
                (CaSource::System, roots)
            }
        };

        let identity = match (&config.cert_path, &config.key_path) {
            (None, None) => None,
            (Some(cert_path), Some(key_path)) => Some(ClientIdentity {
                cert_path: cert_path.clone(),
                key_path: key_path.clone(),
            }),
            _ => {
                return Err(Error::Config(
                    "both kafka cert and key path must be specified".to_string(),
                ))
            }
        };

        let provider = Arc::new(rustls::crypto::ring::default_provider());
        let certified = match &identity {
            Some(identity) => Some(load_identity(&provider, identity)?),
            None => None,
        };

        let builder = rustls::ClientConfig::builder_with_provider(provider)
            .with_protocol_versions(&[&rustls::version::TLS12, &rustls::version::TLS13])?
            .with_root_certificates(roots);

        let context = match certified {
            Some(certified) => {
                builder.with_client_cert_resolver(Arc::new(StaticIdentity(certified)))
            }
            None => builder.with_no_client_auth(),
        };

        info!(
            ca = ?ca,
            mutual_tls = identity.is_some(),
            "TLS enabled for broker connections"
        );

        Ok(Self::Tls(TlsTransport {
            ca,
            identity,
            connect_timeout: CONNECT_TIMEOUT,
            context: Arc::new(context),
        }))
    }

    pub fn is_tls(&self) -> bool {
        matches!(self, Self::Tls(_))
    }

    pub fn connect_timeout(&self) -> Duration {
        match self {
            Self::Plaintext { connect_timeout } => *connect_timeout,
            Self::Tls(tls) => tls.connect_timeout,
        }
    }

    /// Writes the dialer properties onto a client configuration.
    ///
    /// `security.protocol` is left to the caller since it also depends on
    /// SASL.
    pub fn apply(&self, client_config: &mut ClientConfig) {
        client_config.set(
            "socket.connection.setup.timeout.ms",
            self.connect_timeout().as_millis().to_string(),
        );

        if let Self::Tls(tls) = self {
            match &tls.ca {
                CaSource::File(path) => {
                    client_config.set("ssl.ca.location", path_str(path));
                }
                CaSource::System => {
                    client_config.set("ssl.ca.location", SYSTEM_CA_LOCATION);
                }
            }
            if let Some(identity) = &tls.identity {
                client_config
                    .set("ssl.certificate.location", path_str(&identity.cert_path))
                    .set("ssl.key.location", path_str(&identity.key_path));
            }
        }
    }
}

fn path_str(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

fn tls_error(path: &Path, reason: impl ToString) -> Error {
    Error::Tls {
        path: path.to_path_buf(),
        reason: reason.to_string(),
    }
}

fn open(path: &Path) -> Result<BufReader<File>> {
    File::open(path)
        .map(BufReader::new)
        .map_err(|e| tls_error(path, format!("unable to read: {}", e)))
}

fn load_certs(path: &Path) -> Result<Vec<CertificateDer<'static>>> {
    let mut reader = open(path)?;
    let certs = rustls_pemfile::certs(&mut reader)
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(|e| tls_error(path, format!("unable to parse PEM: {}", e)))?;

    if certs.is_empty() {
        return Err(tls_error(path, "no certificates found"));
    }

    debug!("Loaded {} certificates from {}", certs.len(), path.display());
    Ok(certs)
}

fn load_root_store(path: &Path) -> Result<RootCertStore> {
    let certs = load_certs(path)?;
    let mut roots = RootCertStore::empty();
    let (added, ignored) = roots.add_parsable_certificates(certs);

    if added == 0 {
        return Err(tls_error(path, "unable to append CA: no usable certificates"));
    }
    if ignored > 0 {
        debug!("Ignored {} unparsable CA certificates in {}", ignored, path.display());
    }

    Ok(roots)
}

fn load_private_key(path: &Path) -> Result<PrivateKeyDer<'static>> {
    let mut reader = open(path)?;
    rustls_pemfile::private_key(&mut reader)
        .map_err(|e| tls_error(path, format!("unable to parse PEM: {}", e)))?
        .ok_or_else(|| tls_error(path, "no private key found"))
}

/// Loads the client certificate chain and its key, and checks they belong
/// together.
///
/// The leaf is not run through webpki: X.509 v1 client certificates are
/// accepted by librdkafka and must be accepted here too.
fn load_identity(provider: &CryptoProvider, identity: &ClientIdentity) -> Result<Arc<CertifiedKey>> {
    let chain = load_certs(&identity.cert_path)?;
    let key_der = load_private_key(&identity.key_path)?;
    let key = provider
        .key_provider
        .load_private_key(key_der)
        .map_err(|e| tls_error(&identity.key_path, format!("unusable private key: {}", e)))?;

    // The leaf embeds its SubjectPublicKeyInfo verbatim, so a matching key
    // renders to a byte run inside the certificate.
    match key.public_key() {
        Some(spki) if !contains(chain[0].as_ref(), spki.as_ref()) => {
            return Err(tls_error(
                &identity.cert_path,
                format!(
                    "certificate does not match private key {}",
                    identity.key_path.display()
                ),
            ));
        }
        Some(_) => {}
        None => debug!("Key type cannot export its public key, skipping match check"),
    }

    Ok(Arc::new(CertifiedKey::new(chain, key)))
}

fn contains(haystack: &[u8], needle: &[u8]) -> bool {
    !needle.is_empty() && haystack.windows(needle.len()).any(|w| w == needle)
}

/// Always presents the one configured client identity.
#[derive(Debug)]
struct StaticIdentity(Arc<CertifiedKey>);

impl ResolvesClientCert for StaticIdentity {
    fn resolve(
        &self,
        _root_hint_subjects: &[&[u8]],
        _sigschemes: &[SignatureScheme],
    ) -> Option<Arc<CertifiedKey>> {
        Some(Arc::clone(&self.0))
    }

    fn has_certs(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn fixture(name: &str) -> PathBuf {
        Path::new(env!("CARGO_MANIFEST_DIR"))
            .join("tests/fixtures")
            .join(name)
    }

    fn fixture_str(name: &str) -> String {
        fixture(name).to_string_lossy().into_owned()
    }

    fn pem_file(contents: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    fn tls_config(ca: Option<PathBuf>, cert: Option<PathBuf>, key: Option<PathBuf>) -> TlsConfig {
        TlsConfig {
            enabled: true,
            ca_path: ca,
            cert_path: cert,
            key_path: key,
        }
    }

    #[test]
    fn test_disabled_is_plaintext_and_ignores_paths() {
        let config = TlsConfig {
            enabled: false,
            ca_path: Some(PathBuf::from("/does/not/exist.pem")),
            cert_path: Some(PathBuf::from("/does/not/exist.crt")),
            key_path: None,
        };

        let transport = TransportSecurity::from_config(&config).unwrap();
        assert_eq!(
            transport,
            TransportSecurity::Plaintext {
                connect_timeout: Duration::from_secs(10)
            }
        );

        let mut client_config = ClientConfig::new();
        transport.apply(&mut client_config);
        assert_eq!(client_config.get("socket.connection.setup.timeout.ms"), Some("10000"));
        assert_eq!(client_config.get("ssl.ca.location"), None);
    }

    #[test]
    fn test_ca_file_without_identity() {
        let config = tls_config(Some(fixture("ca.pem")), None, None);
        let transport = TransportSecurity::from_config(&config).unwrap();

        let TransportSecurity::Tls(tls) = &transport else {
            panic!("expected TLS transport");
        };
        assert_eq!(tls.ca, CaSource::File(fixture("ca.pem")));
        assert!(tls.identity.is_none());
        assert!(!tls.context.client_auth_cert_resolver.has_certs());
        assert_eq!(tls.connect_timeout, CONNECT_TIMEOUT);

        let mut client_config = ClientConfig::new();
        transport.apply(&mut client_config);
        assert_eq!(
            client_config.get("ssl.ca.location"),
            Some(fixture_str("ca.pem").as_str())
        );
        assert_eq!(client_config.get("ssl.certificate.location"), None);
        assert_eq!(client_config.get("ssl.key.location"), None);
    }

    #[test]
    fn test_system_roots_when_no_ca() {
        let config = tls_config(None, None, None);
        let transport = TransportSecurity::from_config(&config).unwrap();

        let TransportSecurity::Tls(tls) = &transport else {
            panic!("expected TLS transport");
        };
        assert_eq!(tls.ca, CaSource::System);

        let mut client_config = ClientConfig::new();
        transport.apply(&mut client_config);
        assert_eq!(client_config.get("ssl.ca.location"), Some("probe"));
    }

    #[test]
    fn test_mutual_tls_identity() {
        let config = tls_config(
            Some(fixture("ca.pem")),
            Some(fixture("client.pem")),
            Some(fixture("client.key")),
        );
        let transport = TransportSecurity::from_config(&config).unwrap();

        let TransportSecurity::Tls(tls) = &transport else {
            panic!("expected TLS transport");
        };
        assert!(tls.context.client_auth_cert_resolver.has_certs());

        let mut client_config = ClientConfig::new();
        transport.apply(&mut client_config);
        assert_eq!(
            client_config.get("ssl.certificate.location"),
            Some(fixture_str("client.pem").as_str())
        );
        assert_eq!(
            client_config.get("ssl.key.location"),
            Some(fixture_str("client.key").as_str())
        );
    }

    #[test]
    fn test_mutual_tls_with_v3_certificate() {
        let config = tls_config(
            Some(fixture("ca.pem")),
            Some(fixture("client-v3.pem")),
            Some(fixture("client-v3.key")),
        );
        let transport = TransportSecurity::from_config(&config).unwrap();

        let TransportSecurity::Tls(tls) = &transport else {
            panic!("expected TLS transport");
        };
        assert!(tls.context.client_auth_cert_resolver.has_certs());
        assert_eq!(
            tls.identity,
            Some(ClientIdentity {
                cert_path: fixture("client-v3.pem"),
                key_path: fixture("client-v3.key"),
            })
        );
    }

    #[test]
    fn test_mismatched_key_is_fatal() {
        for cert in ["client.pem", "client-v3.pem"] {
            let config = tls_config(None, Some(fixture(cert)), Some(fixture("other.key")));
            let err = TransportSecurity::from_config(&config).unwrap_err();
            assert!(
                matches!(&err, Error::Tls { path, reason } if path == &fixture(cert) && reason.contains("does not match")),
                "{} gave {:?}",
                cert,
                err
            );
        }

        // Each certificate only pairs with its own key.
        let crossed = tls_config(None, Some(fixture("client.pem")), Some(fixture("client-v3.key")));
        assert!(TransportSecurity::from_config(&crossed).is_err());
    }

    #[test]
    fn test_unreadable_key_is_fatal() {
        let config = tls_config(
            None,
            Some(fixture("client.pem")),
            Some(PathBuf::from("/nonexistent/client.key")),
        );
        let err = TransportSecurity::from_config(&config).unwrap_err();
        assert!(matches!(
            err,
            Error::Tls { path, reason }
                if path == Path::new("/nonexistent/client.key") && reason.contains("unable to read")
        ));
    }

    #[test]
    fn test_half_configured_identity_is_fatal() {
        let cert_only = tls_config(None, Some(fixture("client.pem")), None);
        let err = TransportSecurity::from_config(&cert_only).unwrap_err();
        assert!(matches!(err, Error::Config(msg) if msg.contains("cert and key")));

        let key_only = tls_config(None, None, Some(fixture("client.key")));
        assert!(matches!(
            TransportSecurity::from_config(&key_only),
            Err(Error::Config(_))
        ));
    }

    #[test]
    fn test_unreadable_ca_is_fatal() {
        let config = tls_config(Some(PathBuf::from("/nonexistent/ca.pem")), None, None);
        let err = TransportSecurity::from_config(&config).unwrap_err();
        assert!(matches!(err, Error::Tls { reason, .. } if reason.contains("unable to read")));
    }

    #[test]
    fn test_invalid_pem_block_is_fatal() {
        let file = pem_file("-----BEGIN CERTIFICATE-----\n!!not base64!!\n-----END CERTIFICATE-----\n");
        let config = tls_config(Some(file.path().to_path_buf()), None, None);
        assert!(matches!(
            TransportSecurity::from_config(&config),
            Err(Error::Tls { .. })
        ));
    }

    #[test]
    fn test_ca_file_without_certificates_is_fatal() {
        let file = pem_file("just some text, no PEM here\n");
        let config = tls_config(Some(file.path().to_path_buf()), None, None);
        let err = TransportSecurity::from_config(&config).unwrap_err();
        assert!(matches!(err, Error::Tls { reason, .. } if reason.contains("no certificates")));
    }

    #[test]
    fn test_ca_pool_rejecting_every_certificate_is_fatal() {
        // Well-formed PEM wrapping bytes that are not a certificate.
        let file = pem_file("-----BEGIN CERTIFICATE-----\naGVsbG8gd29ybGQ=\n-----END CERTIFICATE-----\n");
        let config = tls_config(Some(file.path().to_path_buf()), None, None);
        let err = TransportSecurity::from_config(&config).unwrap_err();
        assert!(matches!(err, Error::Tls { reason, .. } if reason.contains("unable to append CA")));
    }

    #[test]
    fn test_key_file_without_key_is_fatal() {
        let config = tls_config(None, Some(fixture("client.pem")), Some(fixture("client.pem")));
        let err = TransportSecurity::from_config(&config).unwrap_err();
        assert!(matches!(err, Error::Tls { reason, .. } if reason.contains("no private key")));
    }
}

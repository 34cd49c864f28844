/// TLS context construction for ingress connections
///
/// With neither store configured the platform default context is used:
/// platform trust anchors, no client identity. Otherwise trust material and
/// client identity are each taken from their store when present and the
/// absent side falls back to its default.
pub mod store;
pub mod verifier;

pub use store::{load_key_store, load_trust_store, platform_roots, ClientIdentity};
pub use verifier::IngressServerVerifier;

use crate::config::{StoreConfig, TlsSection};
use crate::error::{PasarelaError, PasarelaResult};
use rustls::ClientConfig;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio_rustls::TlsConnector;

/// A key store or trust store location and its optional password
#[derive(Clone, PartialEq, Eq)]
pub struct StoreRef {
    pub path: PathBuf,
    pub password: Option<String>,
}

impl StoreRef {
    pub fn new<P: Into<PathBuf>>(path: P, password: Option<String>) -> Self {
        Self {
            path: path.into(),
            password,
        }
    }

    fn from_config(config: &StoreConfig) -> Option<Self> {
        config
            .configured_path()
            .map(|path| Self::new(path, config.password.clone()))
    }
}

impl fmt::Debug for StoreRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StoreRef")
            .field("path", &self.path)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

/// TLS inputs for a session
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TlsSettings {
    pub keystore: Option<StoreRef>,
    pub truststore: Option<StoreRef>,
    pub hostname_validation: bool,
}

impl TlsSettings {
    pub fn from_section(section: &TlsSection) -> Self {
        Self {
            keystore: section.keystore.as_ref().and_then(StoreRef::from_config),
            truststore: section.truststore.as_ref().and_then(StoreRef::from_config),
            hostname_validation: section.hostname_validation,
        }
    }

    /// Whether any store is configured
    pub fn has_stores(&self) -> bool {
        self.keystore.is_some() || self.truststore.is_some()
    }
}

/// Where the context's trust anchors came from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TrustSource {
    Platform,
    Store(PathBuf),
}

/// Immutable client TLS context, shared by every connection of a session
#[derive(Clone)]
pub struct TlsContext {
    config: Arc<ClientConfig>,
    trust: TrustSource,
    has_identity: bool,
}

impl TlsContext {
    pub fn build(settings: &TlsSettings) -> PasarelaResult<Self> {
        build_tls_context(settings)
    }

    pub fn connector(&self) -> TlsConnector {
        TlsConnector::from(self.config.clone())
    }

    pub fn trust(&self) -> &TrustSource {
        &self.trust
    }

    pub fn trust_store_path(&self) -> Option<&Path> {
        match &self.trust {
            TrustSource::Store(path) => Some(path),
            TrustSource::Platform => None,
        }
    }

    /// Whether a client certificate is presented (mutual TLS)
    pub fn has_client_identity(&self) -> bool {
        self.has_identity
    }
}

impl fmt::Debug for TlsContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TlsContext")
            .field("trust", &self.trust)
            .field("has_identity", &self.has_identity)
            .finish()
    }
}

/// Build the client TLS context from the configured stores
pub fn build_tls_context(settings: &TlsSettings) -> PasarelaResult<TlsContext> {
    let provider = Arc::new(rustls::crypto::ring::default_provider());

    if !settings.has_stores() {
        log::debug!("No key store or trust store configured, using platform defaults");
    }

    let (roots, trust) = match &settings.truststore {
        Some(store) => (load_trust_store(store)?, TrustSource::Store(store.path.clone())),
        None => (platform_roots(), TrustSource::Platform),
    };

    let identity = settings.keystore.as_ref().map(load_key_store).transpose()?;

    let verifier = IngressServerVerifier::new(roots, provider.clone(), settings.hostname_validation)
        .map_err(|e| PasarelaError::tls_init(format!("cannot build certificate verifier: {e}")))?;

    let builder = ClientConfig::builder_with_provider(provider)
        .with_safe_default_protocol_versions()
        .map_err(|e| PasarelaError::tls_init(format!("unsupported protocol versions: {e}")))?
        .dangerous()
        .with_custom_certificate_verifier(Arc::new(verifier));

    let has_identity = identity.is_some();
    let config = match identity {
        Some(ClientIdentity { chain, key }) => builder
            .with_client_auth_cert(chain, key)
            .map_err(|e| PasarelaError::tls_init(format!("invalid client identity: {e}")))?,
        None => builder.with_no_client_auth(),
    };

    log::info!(
        "TLS context ready (trust: {}, client certificate: {})",
        match &trust {
            TrustSource::Platform => "platform".to_string(),
            TrustSource::Store(path) => path.display().to_string(),
        },
        if has_identity { "yes" } else { "no" }
    );

    Ok(TlsContext {
        config: Arc::new(config),
        trust,
        has_identity,
    })
}

#[cfg(test)]
mod tests {
    use super::store::test_support::{encrypted_key_pem, self_signed, write_temp};
    use super::*;

    #[test]
    fn test_platform_defaults() {
        let context = build_tls_context(&TlsSettings::default()).unwrap();
        assert_eq!(context.trust(), &TrustSource::Platform);
        assert!(!context.has_client_identity());
        assert!(context.trust_store_path().is_none());
    }

    #[test]
    fn test_trust_store_only() {
        let (ca_pem, _, _) = self_signed(&["ca.local"]);
        let ca = write_temp(&ca_pem);

        let settings = TlsSettings {
            truststore: Some(StoreRef::new(ca.path(), Some("changeit".to_string()))),
            ..Default::default()
        };
        let context = build_tls_context(&settings).unwrap();

        assert_eq!(context.trust_store_path(), Some(ca.path()));
        assert!(!context.has_client_identity());
    }

    #[test]
    fn test_key_store_only_uses_platform_trust() {
        let (cert_pem, key_pem, _) = self_signed(&["client.local"]);
        let keystore = write_temp(&format!("{cert_pem}{key_pem}"));

        let settings = TlsSettings {
            keystore: Some(StoreRef::new(keystore.path(), None)),
            ..Default::default()
        };
        let context = build_tls_context(&settings).unwrap();

        assert_eq!(context.trust(), &TrustSource::Platform);
        assert!(context.has_client_identity());
    }

    #[test]
    fn test_mutual_tls_with_encrypted_key() {
        let (ca_pem, _, _) = self_signed(&["ca.local"]);
        let (cert_pem, _, key_der) = self_signed(&["client.local"]);
        let ca = write_temp(&ca_pem);
        let keystore = write_temp(&format!("{cert_pem}{}", encrypted_key_pem(&key_der, "s3cret")));

        let settings = TlsSettings {
            keystore: Some(StoreRef::new(keystore.path(), Some("s3cret".to_string()))),
            truststore: Some(StoreRef::new(ca.path(), None)),
            hostname_validation: false,
        };
        let context = build_tls_context(&settings).unwrap();
        assert!(context.has_client_identity());
        assert!(matches!(context.trust(), TrustSource::Store(_)));

        let wrong = TlsSettings {
            keystore: Some(StoreRef::new(keystore.path(), Some("nope".to_string()))),
            ..settings
        };
        assert!(matches!(
            build_tls_context(&wrong),
            Err(PasarelaError::TlsInit { .. })
        ));
    }

    #[test]
    fn test_unreadable_store_fails() {
        let settings = TlsSettings {
            truststore: Some(StoreRef::new("/nonexistent/truststore.pem", None)),
            ..Default::default()
        };
        let err = build_tls_context(&settings).unwrap_err();
        assert!(matches!(err, PasarelaError::TlsInit { .. }));
        assert!(err.is_bootstrap_failure());
    }

    #[test]
    fn test_settings_from_section() {
        let section = TlsSection {
            hostname_validation: true,
            keystore: Some(StoreConfig {
                path: Some(PathBuf::from("/etc/pasarela/client.pem")),
                password: Some("pw".to_string()),
            }),
            truststore: Some(StoreConfig {
                path: Some(PathBuf::new()),
                password: None,
            }),
        };

        let settings = TlsSettings::from_section(&section);
        assert!(settings.hostname_validation);
        assert_eq!(
            settings.keystore,
            Some(StoreRef::new("/etc/pasarela/client.pem", Some("pw".to_string())))
        );
        // an empty path counts as unset
        assert!(settings.truststore.is_none());
    }

    #[test]
    fn test_store_password_not_in_debug_output() {
        let store = StoreRef::new("/tmp/ks.pem", Some("hunter2".to_string()));
        let debug = format!("{store:?}");
        assert!(!debug.contains("hunter2"));
        assert!(debug.contains("<redacted>"));
    }
}

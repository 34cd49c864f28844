/// Configuration management for pasarela
///
/// One TOML file per deployment topology. Keys are validated once at load
/// time; which keys are required depends on the connection mode and is
/// checked by the bootstrap layer.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Main pasarela configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Driver session configuration
    #[serde(default)]
    pub session: SessionConfig,
    /// Kubernetes ingress configuration
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ingress: Option<IngressSection>,
    /// TLS store references
    #[serde(default)]
    pub tls: TlsSection,
    /// Plain-text authentication credentials
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auth: Option<AuthConfig>,
    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Driver session configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Contact points used in direct mode (`host:port`)
    pub contact_points: Vec<String>,
    /// Native transport port advertised members listen on
    pub native_port: u16,
    /// Connection (and handshake) timeout in milliseconds
    pub connect_timeout_ms: u64,
    /// Request timeout in milliseconds
    pub request_timeout_ms: u64,
}

/// `[ingress]` table
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IngressSection {
    /// Externally reachable ingress host
    pub address: Option<String>,
    /// Ingress port
    pub port: Option<i64>,
    /// Expected routing tokens (host ids) used as SNI contact points
    #[serde(default)]
    pub endpoints: Vec<String>,
}

/// `[tls]` table
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TlsSection {
    /// Check the server certificate against the dialed server name
    #[serde(default)]
    pub hostname_validation: bool,
    /// Client identity store (PEM certificate chain + private key)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub keystore: Option<StoreConfig>,
    /// Trust store (PEM bundle of CA certificates)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub truststore: Option<StoreConfig>,
}

/// A key store or trust store reference
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StoreConfig {
    pub path: Option<PathBuf>,
    pub password: Option<String>,
}

/// Plain-text authenticator credentials
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    pub username: String,
    pub password: String,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (error, warn, info, debug, trace)
    pub level: String,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            contact_points: Vec::new(),
            native_port: 9042,
            connect_timeout_ms: 5000,
            request_timeout_ms: 12000,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl StoreConfig {
    /// Store path, if one is configured and non-empty
    pub fn configured_path(&self) -> Option<&Path> {
        self.path
            .as_deref()
            .filter(|path| !path.as_os_str().is_empty())
    }
}

impl TlsSection {
    pub fn keystore_path(&self) -> Option<&Path> {
        self.keystore.as_ref().and_then(StoreConfig::configured_path)
    }

    pub fn truststore_path(&self) -> Option<&Path> {
        self.truststore.as_ref().and_then(StoreConfig::configured_path)
    }
}

impl Config {
    /// Load configuration from TOML file
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path)
            .map_err(|e| ConfigError::IoError(e.to_string()))?;

        Self::from_toml_str(&content)
    }

    /// Parse and validate configuration from a TOML string
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: Config = toml::from_str(content)
            .map_err(|e| ConfigError::ParseError(e.to_string()))?;

        config.validate()?;
        Ok(config)
    }

    /// Save configuration to TOML file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| ConfigError::SerializeError(e.to_string()))?;

        fs::write(path, content)
            .map_err(|e| ConfigError::IoError(e.to_string()))?;

        Ok(())
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.session.native_port == 0 {
            return Err(ConfigError::ValidationError(
                "session.native_port must be greater than 0".to_string(),
            ));
        }

        if self.session.connect_timeout_ms == 0 {
            return Err(ConfigError::ValidationError(
                "session.connect_timeout_ms must be greater than 0".to_string(),
            ));
        }

        if self.session.request_timeout_ms == 0 {
            return Err(ConfigError::ValidationError(
                "session.request_timeout_ms must be greater than 0".to_string(),
            ));
        }

        if let Some(auth) = &self.auth {
            if auth.username.is_empty() {
                return Err(ConfigError::ValidationError(
                    "auth.username cannot be empty".to_string(),
                ));
            }
        }

        match self.logging.level.as_str() {
            "error" | "warn" | "info" | "debug" | "trace" => {}
            _ => return Err(ConfigError::ValidationError(
                format!("Invalid log level: {}", self.logging.level)
            )),
        }

        Ok(())
    }

    /// Create example configuration file for a connection mode
    pub fn create_example_config<P: AsRef<Path>>(path: P, mode: &str) -> Result<(), ConfigError> {
        let ingress = IngressSection {
            address: Some("traefik.k3s.local".to_string()),
            port: Some(9042),
            endpoints: vec![
                "ec448e83-8b83-407b-b342-13ce0250001c".to_string(),
            ],
        };

        let config = match mode {
            "direct" => Config {
                session: SessionConfig {
                    contact_points: vec!["127.0.0.1:9042".to_string()],
                    ..Default::default()
                },
                ..Default::default()
            },
            "ingress" => Config {
                ingress: Some(IngressSection {
                    endpoints: Vec::new(),
                    ..ingress
                }),
                ..Default::default()
            },
            "sni-ingress" => Config {
                ingress: Some(ingress),
                tls: TlsSection {
                    truststore: Some(StoreConfig {
                        path: Some(PathBuf::from("config/certs/ca.pem")),
                        password: None,
                    }),
                    ..Default::default()
                },
                ..Default::default()
            },
            "mtls-sni-ingress" => Config {
                ingress: Some(ingress),
                tls: TlsSection {
                    hostname_validation: false,
                    keystore: Some(StoreConfig {
                        path: Some(PathBuf::from("config/certs/client.pem")),
                        password: Some("changeit".to_string()),
                    }),
                    truststore: Some(StoreConfig {
                        path: Some(PathBuf::from("config/certs/ca.pem")),
                        password: None,
                    }),
                },
                ..Default::default()
            },
            _ => return Err(ConfigError::ValidationError(
                "Mode must be one of 'direct', 'ingress', 'sni-ingress', 'mtls-sni-ingress'".to_string(),
            )),
        };

        config.save_to_file(path)
    }
}

/// Configuration error types
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    IoError(String),

    #[error("Parse error: {0}")]
    ParseError(String),

    #[error("Serialize error: {0}")]
    SerializeError(String),

    #[error("Validation error: {0}")]
    ValidationError(String),
}

//! Declarative configuration loading from YAML, TOML and environment variables.
//!
//! [`FileConfig`] mirrors [`ClientConfig`](crate::config::ClientConfig) with
//! serde-friendly types and converts into it through the builder API, so the
//! same validation applies to every source.
//!
//! # Supported Sources
//!
//! - **YAML** (requires `config-file` feature): `ClientConfig::from_yaml("orientdb.yaml")`
//! - **TOML** (requires `config-file` feature): `ClientConfig::from_toml("orientdb.toml")`
//! - **Environment Variables** (always available): `ClientConfig::from_env()`
//!
//! # Example TOML
//!
//! ```toml
//! [network]
//! address = "10.0.0.1:2424"
//! connection-timeout-ms = 10000
//! handshake-timeout-ms = 2000
//! session-wait-ms = 500
//! tcp-nodelay = true
//!
//! [protocol]
//! min-version = 24
//! max-version = 28
//! serialization-format = "ORecordSerializerBinary"
//! client-id = "reporting-1"
//! ```

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::config::{ClientConfig, ClientConfigBuilder, ConfigError};

/// Top-level file-based configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case", default)]
pub struct FileConfig {
    /// Network configuration.
    pub network: Option<FileNetworkConfig>,
    /// Protocol configuration.
    pub protocol: Option<FileProtocolConfig>,
}

/// File-based network configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case", default)]
pub struct FileNetworkConfig {
    /// Server address, `host:port`.
    pub address: Option<String>,
    /// Connection timeout in milliseconds.
    pub connection_timeout_ms: Option<u64>,
    /// Handshake timeout in milliseconds.
    pub handshake_timeout_ms: Option<u64>,
    /// Time a session has to accept its response, in milliseconds.
    pub session_wait_ms: Option<u64>,
    /// Enable TCP_NODELAY.
    pub tcp_nodelay: Option<bool>,
}

/// File-based protocol configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case", default)]
pub struct FileProtocolConfig {
    /// Lowest accepted server protocol version.
    pub min_version: Option<i16>,
    /// Highest protocol version to speak.
    pub max_version: Option<i16>,
    /// Lowest server version the binary record format is used with.
    pub min_binary_serializer_version: Option<i16>,
    /// Record serializer name.
    pub serialization_format: Option<String>,
    /// Driver name reported to the server.
    pub driver_name: Option<String>,
    /// Driver version reported to the server.
    pub driver_version: Option<String>,
    /// Client id reported to the server.
    pub client_id: Option<String>,
}

impl TryFrom<FileConfig> for ClientConfig {
    type Error = ConfigError;

    fn try_from(file: FileConfig) -> Result<Self, Self::Error> {
        let mut builder = ClientConfigBuilder::new();

        if let Some(net) = file.network {
            builder = builder.network(|mut n| {
                if let Some(address) = net.address {
                    n = n.address(address);
                }
                if let Some(ms) = net.connection_timeout_ms {
                    n = n.connection_timeout(Duration::from_millis(ms));
                }
                if let Some(ms) = net.handshake_timeout_ms {
                    n = n.handshake_timeout(Duration::from_millis(ms));
                }
                if let Some(ms) = net.session_wait_ms {
                    n = n.session_wait(Duration::from_millis(ms));
                }
                if let Some(v) = net.tcp_nodelay {
                    n = n.tcp_nodelay(v);
                }
                n
            });
        }

        if let Some(proto) = file.protocol {
            builder = builder.protocol(|mut p| {
                if proto.min_version.is_some() || proto.max_version.is_some() {
                    let defaults = crate::config::ProtocolConfig::default();
                    p = p.version_range(
                        proto.min_version.unwrap_or(defaults.min_version()),
                        proto.max_version.unwrap_or(defaults.max_version()),
                    );
                }
                if let Some(v) = proto.min_binary_serializer_version {
                    p = p.min_binary_serializer_version(v);
                }
                if let Some(name) = proto.serialization_format {
                    p = p.serialization_format(name);
                }
                if proto.driver_name.is_some() || proto.driver_version.is_some() {
                    let defaults = crate::config::ProtocolConfig::default();
                    p = p.driver(
                        proto
                            .driver_name
                            .unwrap_or_else(|| defaults.driver_name().to_string()),
                        proto
                            .driver_version
                            .unwrap_or_else(|| defaults.driver_version().to_string()),
                    );
                }
                if let Some(id) = proto.client_id {
                    p = p.client_id(id);
                }
                p
            });
        }

        builder.build()
    }
}

impl ClientConfig {
    /// Loads configuration from a YAML file.
    ///
    /// Requires the `config-file` feature.
    #[cfg(feature = "config-file")]
    pub fn from_yaml<P: AsRef<std::path::Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref())
            .map_err(|e| ConfigError::new(format!("failed to read YAML config file: {e}")))?;
        Self::from_yaml_str(&content)
    }

    /// Parses configuration from YAML text.
    ///
    /// Requires the `config-file` feature.
    #[cfg(feature = "config-file")]
    pub fn from_yaml_str(content: &str) -> Result<Self, ConfigError> {
        let file_config: FileConfig = serde_yaml::from_str(content)
            .map_err(|e| ConfigError::new(format!("failed to parse YAML config: {e}")))?;
        file_config.try_into()
    }

    /// Loads configuration from a TOML file.
    ///
    /// Requires the `config-file` feature.
    ///
    /// # Example
    ///
    /// ```ignore
    /// let config = ClientConfig::from_toml("orientdb.toml")?;
    /// let client = OrientClient::connect(config).await?;
    /// ```
    #[cfg(feature = "config-file")]
    pub fn from_toml<P: AsRef<std::path::Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref())
            .map_err(|e| ConfigError::new(format!("failed to read TOML config file: {e}")))?;
        Self::from_toml_str(&content)
    }

    /// Parses configuration from TOML text.
    ///
    /// Requires the `config-file` feature.
    #[cfg(feature = "config-file")]
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let file_config: FileConfig = toml::from_str(content)
            .map_err(|e| ConfigError::new(format!("failed to parse TOML config: {e}")))?;
        file_config.try_into()
    }

    /// Loads configuration from environment variables.
    ///
    /// This method is always available (no feature flag required).
    ///
    /// | Variable | Maps to |
    /// |----------|---------|
    /// | `ORIENTDB_ADDRESS` | Server address, `host:port` |
    /// | `ORIENTDB_CONNECTION_TIMEOUT_MS` | Connection timeout in milliseconds |
    /// | `ORIENTDB_HANDSHAKE_TIMEOUT_MS` | Handshake timeout in milliseconds |
    /// | `ORIENTDB_SESSION_WAIT_MS` | Session accept window in milliseconds |
    /// | `ORIENTDB_CLIENT_ID` | Client id reported to the server |
    ///
    /// Unparseable numeric values are ignored.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_vars(|key| std::env::var(key).ok())
    }

    fn from_vars(var: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut file_config = FileConfig::default();

        if let Some(val) = var("ORIENTDB_ADDRESS") {
            file_config.network.get_or_insert_with(Default::default).address = Some(val);
        }

        let millis = |key: &str| var(key).and_then(|v| v.trim().parse::<u64>().ok());

        if let Some(ms) = millis("ORIENTDB_CONNECTION_TIMEOUT_MS") {
            file_config
                .network
                .get_or_insert_with(Default::default)
                .connection_timeout_ms = Some(ms);
        }

        if let Some(ms) = millis("ORIENTDB_HANDSHAKE_TIMEOUT_MS") {
            file_config
                .network
                .get_or_insert_with(Default::default)
                .handshake_timeout_ms = Some(ms);
        }

        if let Some(ms) = millis("ORIENTDB_SESSION_WAIT_MS") {
            file_config
                .network
                .get_or_insert_with(Default::default)
                .session_wait_ms = Some(ms);
        }

        if let Some(val) = var("ORIENTDB_CLIENT_ID") {
            file_config.protocol.get_or_insert_with(Default::default).client_id = Some(val);
        }

        file_config.try_into()
    }
}

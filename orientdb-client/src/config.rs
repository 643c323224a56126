//! Client configuration types and builders.

use std::time::Duration;

use orientdb_core::protocol::{
    BINARY_SERIALIZER_NAME, MAX_PROTOCOL_VERSION, MIN_BINARY_SERIALIZER_VERSION,
    MIN_PROTOCOL_VERSION,
};
use orientdb_core::OrientError;

/// Default server address.
const DEFAULT_ADDRESS: &str = "127.0.0.1:2424";
/// Default connection timeout.
const DEFAULT_CONNECTION_TIMEOUT: Duration = Duration::from_secs(5);
/// Default bound on reading the server's protocol version.
const DEFAULT_HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(5);
/// Default time a session has to accept a response before the connection is aborted.
const DEFAULT_SESSION_WAIT: Duration = Duration::from_secs(1);
/// Default driver name reported to the server.
const DEFAULT_DRIVER_NAME: &str = "OrientDB Rust Client";

/// Configuration error returned when validation fails.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigError {
    message: String,
}

impl ConfigError {
    pub(crate) fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "configuration error: {}", self.message)
    }
}

impl std::error::Error for ConfigError {}

impl From<ConfigError> for OrientError {
    fn from(e: ConfigError) -> Self {
        OrientError::Configuration(e.message)
    }
}

/// Network configuration for the server connection.
#[derive(Debug, Clone)]
pub struct NetworkConfig {
    address: String,
    connection_timeout: Duration,
    handshake_timeout: Duration,
    session_wait: Duration,
    tcp_nodelay: bool,
}

impl NetworkConfig {
    /// Returns the server address, `host:port`.
    pub fn address(&self) -> &str {
        &self.address
    }

    /// Returns the TCP connect timeout.
    pub fn connection_timeout(&self) -> Duration {
        self.connection_timeout
    }

    /// Returns the bound on reading the server's protocol version.
    pub fn handshake_timeout(&self) -> Duration {
        self.handshake_timeout
    }

    /// Returns how long a session may take to accept a response addressed to it.
    pub fn session_wait(&self) -> Duration {
        self.session_wait
    }

    /// Returns whether Nagle's algorithm is disabled.
    pub fn tcp_nodelay(&self) -> bool {
        self.tcp_nodelay
    }
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            address: DEFAULT_ADDRESS.to_string(),
            connection_timeout: DEFAULT_CONNECTION_TIMEOUT,
            handshake_timeout: DEFAULT_HANDSHAKE_TIMEOUT,
            session_wait: DEFAULT_SESSION_WAIT,
            tcp_nodelay: true,
        }
    }
}

/// Builder for `NetworkConfig`.
#[derive(Debug, Clone, Default)]
pub struct NetworkConfigBuilder {
    address: Option<String>,
    connection_timeout: Option<Duration>,
    handshake_timeout: Option<Duration>,
    session_wait: Option<Duration>,
    tcp_nodelay: Option<bool>,
}

impl NetworkConfigBuilder {
    /// Creates a new network configuration builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the server address, `host:port`.
    pub fn address(mut self, address: impl Into<String>) -> Self {
        self.address = Some(address.into());
        self
    }

    /// Sets the TCP connect timeout.
    pub fn connection_timeout(mut self, timeout: Duration) -> Self {
        self.connection_timeout = Some(timeout);
        self
    }

    /// Sets the bound on reading the server's protocol version.
    pub fn handshake_timeout(mut self, timeout: Duration) -> Self {
        self.handshake_timeout = Some(timeout);
        self
    }

    /// Sets how long a session may take to accept a response addressed to it.
    pub fn session_wait(mut self, wait: Duration) -> Self {
        self.session_wait = Some(wait);
        self
    }

    /// Enables or disables `TCP_NODELAY`.
    pub fn tcp_nodelay(mut self, nodelay: bool) -> Self {
        self.tcp_nodelay = Some(nodelay);
        self
    }

    /// Builds the network configuration.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if the address is empty or any timeout is zero.
    pub fn build(self) -> Result<NetworkConfig, ConfigError> {
        let defaults = NetworkConfig::default();
        let address = self.address.unwrap_or(defaults.address);
        if address.trim().is_empty() {
            return Err(ConfigError::new("address must not be empty"));
        }

        let config = NetworkConfig {
            address,
            connection_timeout: self.connection_timeout.unwrap_or(defaults.connection_timeout),
            handshake_timeout: self.handshake_timeout.unwrap_or(defaults.handshake_timeout),
            session_wait: self.session_wait.unwrap_or(defaults.session_wait),
            tcp_nodelay: self.tcp_nodelay.unwrap_or(defaults.tcp_nodelay),
        };

        for (name, value) in [
            ("connection_timeout", config.connection_timeout),
            ("handshake_timeout", config.handshake_timeout),
            ("session_wait", config.session_wait),
        ] {
            if value.is_zero() {
                return Err(ConfigError::new(format!("{} must be greater than zero", name)));
            }
        }

        Ok(config)
    }
}

/// Protocol negotiation settings.
#[derive(Debug, Clone)]
pub struct ProtocolConfig {
    min_version: i16,
    max_version: i16,
    min_binary_serializer_version: i16,
    serialization_format: String,
    driver_name: String,
    driver_version: String,
    client_id: Option<String>,
}

impl ProtocolConfig {
    /// Returns the lowest accepted server protocol version.
    pub fn min_version(&self) -> i16 {
        self.min_version
    }

    /// Returns the highest protocol version spoken by this client.
    pub fn max_version(&self) -> i16 {
        self.max_version
    }

    /// Returns the lowest server version the binary record format is used with.
    pub fn min_binary_serializer_version(&self) -> i16 {
        self.min_binary_serializer_version
    }

    /// Returns the record serializer name requested from the server.
    pub fn serialization_format(&self) -> &str {
        &self.serialization_format
    }

    /// Returns the driver name reported to the server.
    pub fn driver_name(&self) -> &str {
        &self.driver_name
    }

    /// Returns the driver version reported to the server.
    pub fn driver_version(&self) -> &str {
        &self.driver_version
    }

    /// Returns the client id reported to the server, if any.
    pub fn client_id(&self) -> Option<&str> {
        self.client_id.as_deref()
    }
}

impl Default for ProtocolConfig {
    fn default() -> Self {
        Self {
            min_version: MIN_PROTOCOL_VERSION,
            max_version: MAX_PROTOCOL_VERSION,
            min_binary_serializer_version: MIN_BINARY_SERIALIZER_VERSION,
            serialization_format: BINARY_SERIALIZER_NAME.to_string(),
            driver_name: DEFAULT_DRIVER_NAME.to_string(),
            driver_version: env!("CARGO_PKG_VERSION").to_string(),
            client_id: None,
        }
    }
}

/// Builder for `ProtocolConfig`.
#[derive(Debug, Clone, Default)]
pub struct ProtocolConfigBuilder {
    min_version: Option<i16>,
    max_version: Option<i16>,
    min_binary_serializer_version: Option<i16>,
    serialization_format: Option<String>,
    driver_name: Option<String>,
    driver_version: Option<String>,
    client_id: Option<String>,
}

impl ProtocolConfigBuilder {
    /// Creates a new protocol configuration builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the accepted server protocol version range.
    pub fn version_range(mut self, min: i16, max: i16) -> Self {
        self.min_version = Some(min);
        self.max_version = Some(max);
        self
    }

    /// Sets the lowest server version the binary record format is used with.
    pub fn min_binary_serializer_version(mut self, version: i16) -> Self {
        self.min_binary_serializer_version = Some(version);
        self
    }

    /// Sets the record serializer name requested from the server.
    pub fn serialization_format(mut self, name: impl Into<String>) -> Self {
        self.serialization_format = Some(name.into());
        self
    }

    /// Sets the driver name and version reported to the server.
    pub fn driver(mut self, name: impl Into<String>, version: impl Into<String>) -> Self {
        self.driver_name = Some(name.into());
        self.driver_version = Some(version.into());
        self
    }

    /// Sets the client id reported to the server.
    pub fn client_id(mut self, id: impl Into<String>) -> Self {
        self.client_id = Some(id.into());
        self
    }

    /// Builds the protocol configuration.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if:
    /// - the version range is empty or exceeds what this client speaks
    /// - the binary serializer minimum lies outside the range
    /// - the serialization format name is empty
    pub fn build(self) -> Result<ProtocolConfig, ConfigError> {
        let defaults = ProtocolConfig::default();
        let min_version = self.min_version.unwrap_or(defaults.min_version);
        let max_version = self.max_version.unwrap_or(defaults.max_version);
        let min_binary_serializer_version = self
            .min_binary_serializer_version
            .unwrap_or(defaults.min_binary_serializer_version);

        if min_version > max_version {
            return Err(ConfigError::new(
                "min protocol version must not exceed max protocol version",
            ));
        }
        if min_version < MIN_PROTOCOL_VERSION || max_version > MAX_PROTOCOL_VERSION {
            return Err(ConfigError::new(format!(
                "protocol versions must lie within {}..={}",
                MIN_PROTOCOL_VERSION, MAX_PROTOCOL_VERSION
            )));
        }
        if min_binary_serializer_version > max_version {
            return Err(ConfigError::new(
                "binary serializer minimum exceeds max protocol version",
            ));
        }

        let serialization_format = self
            .serialization_format
            .unwrap_or(defaults.serialization_format);
        if serialization_format.is_empty() {
            return Err(ConfigError::new("serialization format must not be empty"));
        }

        Ok(ProtocolConfig {
            min_version,
            max_version,
            min_binary_serializer_version,
            serialization_format,
            driver_name: self.driver_name.unwrap_or(defaults.driver_name),
            driver_version: self.driver_version.unwrap_or(defaults.driver_version),
            client_id: self.client_id,
        })
    }
}

/// Main client configuration.
#[derive(Debug, Clone, Default)]
pub struct ClientConfig {
    network: NetworkConfig,
    protocol: ProtocolConfig,
}

impl ClientConfig {
    /// Creates a new client configuration builder.
    pub fn builder() -> ClientConfigBuilder {
        ClientConfigBuilder::new()
    }

    /// Returns the network configuration.
    pub fn network(&self) -> &NetworkConfig {
        &self.network
    }

    /// Returns the protocol configuration.
    pub fn protocol(&self) -> &ProtocolConfig {
        &self.protocol
    }
}

/// Builder for `ClientConfig`.
#[derive(Debug, Clone, Default)]
pub struct ClientConfigBuilder {
    network: NetworkConfigBuilder,
    protocol: ProtocolConfigBuilder,
}

impl ClientConfigBuilder {
    /// Creates a new client configuration builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Configures network settings using a builder function.
    pub fn network<F>(mut self, f: F) -> Self
    where
        F: FnOnce(NetworkConfigBuilder) -> NetworkConfigBuilder,
    {
        self.network = f(self.network);
        self
    }

    /// Configures protocol settings using a builder function.
    pub fn protocol<F>(mut self, f: F) -> Self
    where
        F: FnOnce(ProtocolConfigBuilder) -> ProtocolConfigBuilder,
    {
        self.protocol = f(self.protocol);
        self
    }

    /// Sets the server address.
    pub fn address(mut self, address: impl Into<String>) -> Self {
        self.network = self.network.address(address);
        self
    }

    /// Sets the connection timeout.
    pub fn connection_timeout(mut self, timeout: Duration) -> Self {
        self.network = self.network.connection_timeout(timeout);
        self
    }

    /// Builds the client configuration, returning an error if validation fails.
    pub fn build(self) -> Result<ClientConfig, ConfigError> {
        Ok(ClientConfig {
            network: self.network.build()?,
            protocol: self.protocol.build()?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_client_config() {
        let config = ClientConfig::default();
        assert_eq!(config.network().address(), "127.0.0.1:2424");
        assert_eq!(config.network().handshake_timeout(), Duration::from_secs(5));
        assert_eq!(config.network().session_wait(), Duration::from_secs(1));
        assert!(config.network().tcp_nodelay());
        assert_eq!(config.protocol().min_version(), 21);
        assert_eq!(config.protocol().max_version(), 28);
        assert_eq!(config.protocol().min_binary_serializer_version(), 22);
        assert_eq!(
            config.protocol().serialization_format(),
            "ORecordSerializerBinary"
        );
    }

    #[test]
    fn test_builder_overrides() {
        let config = ClientConfig::builder()
            .address("db.internal:2424")
            .connection_timeout(Duration::from_secs(2))
            .network(|n| n.session_wait(Duration::from_millis(250)).tcp_nodelay(false))
            .protocol(|p| p.driver("custom", "9.9").client_id("worker-1"))
            .build()
            .unwrap();

        assert_eq!(config.network().address(), "db.internal:2424");
        assert_eq!(config.network().connection_timeout(), Duration::from_secs(2));
        assert_eq!(config.network().session_wait(), Duration::from_millis(250));
        assert!(!config.network().tcp_nodelay());
        assert_eq!(config.protocol().driver_name(), "custom");
        assert_eq!(config.protocol().driver_version(), "9.9");
        assert_eq!(config.protocol().client_id(), Some("worker-1"));
    }

    #[test]
    fn test_empty_address_fails() {
        let result = ClientConfig::builder().address("  ").build();
        assert!(result
            .unwrap_err()
            .to_string()
            .contains("address must not be empty"));
    }

    #[test]
    fn test_zero_timeout_fails() {
        let result = ClientConfig::builder()
            .network(|n| n.handshake_timeout(Duration::ZERO))
            .build();
        assert!(result.unwrap_err().to_string().contains("handshake_timeout"));
    }

    #[test]
    fn test_inverted_version_range_fails() {
        let result = ClientConfig::builder()
            .protocol(|p| p.version_range(27, 24))
            .build();
        assert!(result.is_err());
    }

    #[test]
    fn test_version_range_beyond_client_fails() {
        let result = ClientConfig::builder()
            .protocol(|p| p.version_range(21, 37))
            .build();
        assert!(result.is_err());
    }

    #[test]
    fn test_narrowed_version_range() {
        let config = ClientConfig::builder()
            .protocol(|p| p.version_range(24, 26))
            .build()
            .unwrap();
        assert_eq!(config.protocol().min_version(), 24);
        assert_eq!(config.protocol().max_version(), 26);
    }

    #[test]
    fn test_config_error_converts() {
        let err: OrientError = ConfigError::new("bad").into();
        assert!(matches!(err, OrientError::Configuration(m) if m == "bad"));
    }

    #[test]
    fn test_config_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<ClientConfig>();
    }
}

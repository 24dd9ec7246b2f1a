use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// File name looked up in `$HOME` when no config file is given.
pub const DEFAULT_CONFIG_FILE: &str = ".kir.yaml";

/// etcd connection settings.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Endpoint URLs
    pub endpoints: Vec<String>,

    /// Prefix applied to every key
    pub prefix: String,

    /// Connection establishment timeout in seconds
    pub dial_timeout_secs: u64,

    /// Per-operation timeout in seconds
    pub command_timeout_secs: u64,

    /// CA bundle used to verify servers
    pub cacert: Option<PathBuf>,

    /// Client certificate
    pub cert: Option<PathBuf>,

    /// Client key
    pub key: Option<PathBuf>,

    /// `username` or `username:password`
    pub user: Option<String>,

    /// Password used when `user` carries none
    pub password: Option<String>,

    /// Disable transport security when no TLS files are given
    pub insecure_transport: bool,

    /// Skip server certificate verification
    pub insecure_skip_tls_verify: bool,
}

impl StoreConfig {
    pub fn dial_timeout(&self) -> Duration {
        Duration::from_secs(self.dial_timeout_secs)
    }

    pub fn command_timeout(&self) -> Duration {
        Duration::from_secs(self.command_timeout_secs)
    }

    /// Username and password, if authentication is configured.
    pub fn credentials(&self) -> Option<(String, String)> {
        let user = self.user.as_deref().filter(|u| !u.is_empty())?;

        match user.split_once(':') {
            Some((name, password)) => Some((name.to_string(), password.to_string())),
            None => Some((user.to_string(), self.password.clone().unwrap_or_default())),
        }
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        StoreConfig {
            endpoints: vec!["http://localhost:2379".to_string()],
            prefix: "/kir/".to_string(),
            dial_timeout_secs: 2,
            command_timeout_secs: 5,
            cacert: None,
            cert: None,
            key: None,
            user: None,
            password: None,
            insecure_transport: true,
            insecure_skip_tls_verify: false,
        }
    }
}

/// HTTP server settings.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Listen address
    pub listen: String,

    /// Enable graceful shutdown
    pub graceful_shutdown: bool,

    /// HTTPS listener settings
    pub tls: ServerTlsConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfig {
            listen: "0.0.0.0:8080".to_string(),
            graceful_shutdown: true,
            tls: ServerTlsConfig::default(),
        }
    }
}

/// HTTPS listener settings.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ServerTlsConfig {
    /// Serve HTTPS instead of plain HTTP
    pub enabled: bool,

    /// PEM certificate chain presented to clients
    pub cert_file: PathBuf,

    /// PEM private key for `cert_file`
    pub key_file: PathBuf,

    /// PEM bundle of CAs trusted to sign client certificates
    pub cacert_file: Option<PathBuf>,

    /// Reject clients that do not present a certificate signed by `cacert_file`
    pub require_and_verify_client_cert: bool,
}

impl Default for ServerTlsConfig {
    fn default() -> Self {
        ServerTlsConfig {
            enabled: false,
            cert_file: PathBuf::from("cert.pem"),
            key_file: PathBuf::from("key.pem"),
            cacert_file: None,
            require_and_verify_client_cert: false,
        }
    }
}

/// Settings read from the config file and `KIR__` environment variables.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub etcd: StoreConfig,
    pub server: ServerConfig,
}

impl Settings {
    /// Load settings.
    ///
    /// An explicit `path` must exist. Without one, `$HOME/.kir.yaml` is read
    /// if present. Environment variables such as `KIR__ETCD__PREFIX` override
    /// file values.
    pub fn load(path: Option<&Path>) -> Result<Self, ::config::ConfigError> {
        let mut builder = ::config::Config::builder();

        match path {
            Some(path) => {
                builder = builder.add_source(
                    ::config::File::new(&path.to_string_lossy(), ::config::FileFormat::Yaml)
                        .required(true),
                );
            }
            None => {
                if let Some(home) = std::env::var_os("HOME") {
                    let default_path = PathBuf::from(home).join(DEFAULT_CONFIG_FILE);
                    builder = builder.add_source(
                        ::config::File::new(
                            &default_path.to_string_lossy(),
                            ::config::FileFormat::Yaml,
                        )
                        .required(false),
                    );
                }
            }
        }

        builder = builder.add_source(
            ::config::Environment::with_prefix("KIR")
                .prefix_separator("__")
                .separator("__")
                .list_separator(",")
                .with_list_parse_key("etcd.endpoints")
                .try_parsing(true),
        );

        builder.build()?.try_deserialize()
    }
}

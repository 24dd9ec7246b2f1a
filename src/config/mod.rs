pub mod settings;

pub use settings::{ServerConfig, ServerTlsConfig, Settings, StoreConfig};

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

/// Number of rules `get` shows unless `--show-all` is given.
pub const DEFAULT_GET_LIMIT: u64 = 20;

/// Command line interface.
#[derive(Debug, Clone, Parser)]
#[command(name = "kir")]
#[command(version, about = "Image admission review backed by rules stored in etcd")]
pub struct Cli {
    /// Config file (default is $HOME/.kir.yaml)
    #[arg(long, global = true, env = "KIR_CONFIG")]
    pub config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, global = true, default_value = "info", env = "RUST_LOG")]
    pub log_level: String,

    /// Emit logs as JSON
    #[arg(long, global = true, env = "KIR_LOG_JSON")]
    pub log_json: bool,

    #[command(flatten)]
    pub store: StoreArgs,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Clone, Subcommand)]
pub enum Command {
    /// Run the review server
    Server(ServerArgs),

    /// Add a new rule
    Add(AddArgs),

    /// Show one rule or list rules
    Get(GetArgs),

    /// Delete a rule
    Delete(DeleteArgs),
}

/// etcd flags. Anything left unset falls back to the config file.
#[derive(Debug, Clone, Default, Args)]
pub struct StoreArgs {
    /// etcd endpoint URLs (comma separated)
    #[arg(long, global = true, value_delimiter = ',', env = "KIR_ETCD_ENDPOINTS")]
    pub etcd_endpoints: Option<Vec<String>>,

    /// Prefix for every key
    #[arg(long, global = true, env = "KIR_ETCD_PREFIX")]
    pub etcd_prefix: Option<String>,

    /// Dial timeout for client connections in seconds
    #[arg(long, global = true, env = "KIR_ETCD_DIAL_TIMEOUT_SECS")]
    pub etcd_dial_timeout_secs: Option<u64>,

    /// Timeout for a single store operation in seconds
    #[arg(long, global = true, env = "KIR_ETCD_COMMAND_TIMEOUT_SECS")]
    pub etcd_command_timeout_secs: Option<u64>,

    /// Verify certificates of TLS-enabled servers using this CA bundle
    #[arg(long, global = true, env = "KIR_ETCD_CACERT")]
    pub etcd_cacert: Option<PathBuf>,

    /// Identify the client using this TLS certificate file
    #[arg(long, global = true, env = "KIR_ETCD_CERT")]
    pub etcd_cert: Option<PathBuf>,

    /// Identify the client using this TLS key file
    #[arg(long, global = true, env = "KIR_ETCD_KEY")]
    pub etcd_key: Option<PathBuf>,

    /// username[:password] for authentication
    #[arg(long, global = true, env = "KIR_ETCD_USER")]
    pub etcd_user: Option<String>,

    /// Password, when not given inline with --etcd-user
    #[arg(long, global = true, env = "KIR_ETCD_PASSWORD", hide_env_values = true)]
    pub etcd_password: Option<String>,

    /// Disable transport security for client connections
    #[arg(
        long,
        global = true,
        num_args = 0..=1,
        require_equals = true,
        default_missing_value = "true"
    )]
    pub etcd_insecure_transport: Option<bool>,

    /// Skip server certificate verification
    #[arg(
        long,
        global = true,
        num_args = 0..=1,
        require_equals = true,
        default_missing_value = "true"
    )]
    pub etcd_insecure_skip_tls_verify: Option<bool>,
}

impl StoreArgs {
    /// Overlay explicitly given flags on top of file settings.
    pub fn apply(&self, mut config: StoreConfig) -> StoreConfig {
        if let Some(endpoints) = &self.etcd_endpoints {
            config.endpoints = endpoints.clone();
        }
        if let Some(prefix) = &self.etcd_prefix {
            config.prefix = prefix.clone();
        }
        if let Some(secs) = self.etcd_dial_timeout_secs {
            config.dial_timeout_secs = secs;
        }
        if let Some(secs) = self.etcd_command_timeout_secs {
            config.command_timeout_secs = secs;
        }
        if let Some(path) = &self.etcd_cacert {
            config.cacert = Some(path.clone());
        }
        if let Some(path) = &self.etcd_cert {
            config.cert = Some(path.clone());
        }
        if let Some(path) = &self.etcd_key {
            config.key = Some(path.clone());
        }
        if let Some(user) = &self.etcd_user {
            config.user = Some(user.clone());
        }
        if let Some(password) = &self.etcd_password {
            config.password = Some(password.clone());
        }
        if let Some(insecure) = self.etcd_insecure_transport {
            config.insecure_transport = insecure;
        }
        if let Some(skip) = self.etcd_insecure_skip_tls_verify {
            config.insecure_skip_tls_verify = skip;
        }
        config
    }
}

#[derive(Debug, Clone, Args)]
pub struct ServerArgs {
    /// Address the server listens on (address:port)
    #[arg(short, long, env = "KIR_LISTEN")]
    pub listen: Option<String>,

    /// Serve rules from an in-memory store instead of etcd
    #[arg(long)]
    pub memory: bool,

    /// Serve HTTPS
    #[arg(long, env = "KIR_TLS_ENABLED")]
    pub tls_enabled: bool,

    /// Path to the server certificate file
    #[arg(long, env = "KIR_TLS_CERT_FILE")]
    pub tls_cert_file: Option<PathBuf>,

    /// Path to the server key file
    #[arg(long, env = "KIR_TLS_KEY_FILE")]
    pub tls_key_file: Option<PathBuf>,

    /// Path to the CA bundle used to verify client certificates
    #[arg(long, env = "KIR_TLS_CACERT_FILE")]
    pub tls_cacert_file: Option<PathBuf>,

    /// Require clients to present a certificate signed by the CA bundle
    #[arg(long, env = "KIR_TLS_REQUIRE_AND_VERIFY_CLIENT_CERT")]
    pub tls_require_and_verify_client_cert: bool,
}

impl ServerArgs {
    pub fn apply(&self, mut config: ServerConfig) -> ServerConfig {
        if let Some(listen) = &self.listen {
            config.listen = listen.clone();
        }
        if self.tls_enabled {
            config.tls.enabled = true;
        }
        if let Some(path) = &self.tls_cert_file {
            config.tls.cert_file = path.clone();
        }
        if let Some(path) = &self.tls_key_file {
            config.tls.key_file = path.clone();
        }
        if let Some(path) = &self.tls_cacert_file {
            config.tls.cacert_file = Some(path.clone());
        }
        if self.tls_require_and_verify_client_cert {
            config.tls.require_and_verify_client_cert = true;
        }
        config
    }
}

#[derive(Debug, Clone, Args)]
pub struct AddArgs {
    /// Rule name
    #[arg(long)]
    pub name: Option<String>,

    /// Container image pattern (repeatable or comma separated)
    #[arg(long = "image", value_delimiter = ',')]
    pub images: Vec<String>,

    /// Annotation pattern as key=value (repeatable or comma separated)
    #[arg(long = "annotation", visible_alias = "annotations", value_delimiter = ',')]
    pub annotations: Vec<String>,

    /// Namespace pattern
    #[arg(long)]
    pub namespace: Option<String>,

    /// Reason returned when the rule matches
    #[arg(long, default_value = "")]
    pub reason: String,

    /// Allow images matching this rule
    #[arg(long)]
    pub allowed: bool,

    /// Replace an existing rule
    #[arg(long = "override")]
    pub override_existing: bool,

    /// Read the rule from a YAML file instead of flags
    #[arg(short, long)]
    pub file: Option<PathBuf>,
}

#[derive(Debug, Clone, Args)]
pub struct GetArgs {
    /// Rule name; lists rules when omitted
    pub name: Option<String>,

    /// Output format for a single rule (yaml)
    #[arg(short, long)]
    pub output: Option<String>,

    /// Show all rules
    #[arg(short = 'a', long)]
    pub show_all: bool,

    /// Number of rules listed without --show-all
    #[arg(long, default_value_t = DEFAULT_GET_LIMIT)]
    pub limit: u64,
}

impl GetArgs {
    /// Listing limit, 0 meaning unbounded.
    pub fn effective_limit(&self) -> u64 {
        if self.show_all {
            0
        } else {
            self.limit
        }
    }
}

#[derive(Debug, Clone, Args)]
pub struct DeleteArgs {
    /// Rule name
    pub name: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_add() {
        let cli = Cli::try_parse_from([
            "kir",
            "add",
            "--name",
            "my_rule",
            "--image",
            "^nginx:1.[0-9],^httpd",
            "--annotation",
            "team=web",
            "--namespace",
            "^default$",
            "--allowed",
        ])
        .unwrap();

        match cli.command {
            Command::Add(args) => {
                assert_eq!(args.name.as_deref(), Some("my_rule"));
                assert_eq!(args.images.len(), 2);
                assert_eq!(args.annotations, vec!["team=web".to_string()]);
                assert!(args.allowed);
                assert!(!args.override_existing);
            }
            other => panic!("Expected add command, got {:?}", other),
        }
    }

    #[test]
    fn test_flags_override_file_settings() {
        let cli = Cli::try_parse_from([
            "kir",
            "--etcd-endpoints",
            "http://a:2379,http://b:2379",
            "--etcd-insecure-transport=false",
            "delete",
            "r1",
        ])
        .unwrap();

        let base = StoreConfig {
            prefix: "/from-file/".to_string(),
            ..Default::default()
        };
        let config = cli.store.apply(base);

        assert_eq!(config.endpoints.len(), 2);
        assert_eq!(config.prefix, "/from-file/");
        assert!(!config.insecure_transport);
    }

    #[test]
    fn test_get_limit() {
        let cli = Cli::try_parse_from(["kir", "get"]).unwrap();
        let Command::Get(args) = cli.command else {
            panic!("Expected get command");
        };
        assert_eq!(args.effective_limit(), DEFAULT_GET_LIMIT);

        let cli = Cli::try_parse_from(["kir", "get", "--show-all"]).unwrap();
        let Command::Get(args) = cli.command else {
            panic!("Expected get command");
        };
        assert_eq!(args.effective_limit(), 0);
    }

    #[test]
    fn test_server_tls_flags() {
        let cli = Cli::try_parse_from([
            "kir",
            "server",
            "--listen",
            "0.0.0.0:8443",
            "--tls-enabled",
            "--tls-cert-file",
            "/tls/server.crt",
            "--tls-cacert-file",
            "/tls/ca.crt",
            "--tls-require-and-verify-client-cert",
        ])
        .unwrap();
        let Command::Server(args) = cli.command else {
            panic!("Expected server command");
        };

        let config = args.apply(ServerConfig::default());

        assert_eq!(config.listen, "0.0.0.0:8443");
        assert!(config.tls.enabled);
        assert_eq!(config.tls.cert_file, PathBuf::from("/tls/server.crt"));
        assert_eq!(config.tls.key_file, PathBuf::from("key.pem"));
        assert_eq!(config.tls.cacert_file, Some(PathBuf::from("/tls/ca.crt")));
        assert!(config.tls.require_and_verify_client_cert);
    }

    #[test]
    fn test_bare_insecure_flag() {
        let cli = Cli::try_parse_from(["kir", "--etcd-insecure-skip-tls-verify", "get"]).unwrap();
        assert_eq!(cli.store.etcd_insecure_skip_tls_verify, Some(true));
    }
}

use serde::Deserialize;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("missing required env var: {0}")]
    MissingEnv(String),
    #[error("invalid value for {field}: {value}")]
    Invalid { field: &'static str, value: String },
}

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub chain: ChainConfig,
    #[serde(default)]
    pub account: AccountConfig,
    #[serde(default)]
    pub scanner: ScannerConfig,
    #[serde(default)]
    pub notifications: NotificationConfig,
    #[serde(default)]
    pub valkey: ValkeyConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChainConfig {
    /// HTTP JSON-RPC endpoint used for contract reads and transactions.
    #[serde(default = "default_rpc_url")]
    pub rpc_url: String,
    /// WebSocket endpoint used for stream subscriptions.
    #[serde(default = "default_ws_url")]
    pub ws_url: String,
    #[serde(default = "default_chain_id")]
    pub chain_id: u64,
    /// SecureFlow escrow contract.
    #[serde(default = "default_escrow_address")]
    pub escrow_address: String,
    /// Data streams protocol contract. Loaded from env SOMNIA_STREAMS_ADDRESS.
    #[serde(default)]
    pub streams_address: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AccountConfig {
    /// Wallet address to watch - loaded from env SECUREFLOW_ACCOUNT
    #[serde(default)]
    pub address: String,
    /// Signing key for state-changing calls - loaded from env PRIVATE_KEY
    #[serde(default)]
    pub private_key: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ScannerConfig {
    /// Applications requested per getApplicationsPage call.
    #[serde(default = "default_page_size")]
    pub page_size: u64,
    /// How often the watcher rescans escrows for new ids.
    #[serde(default = "default_refresh_interval_secs")]
    pub refresh_interval_secs: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StoreBackend {
    File,
    Valkey,
    Memory,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NotificationConfig {
    #[serde(default = "default_backend")]
    pub backend: StoreBackend,
    /// Directory holding one JSON file per address (file backend).
    #[serde(default = "default_store_dir")]
    pub dir: PathBuf,
    /// Oldest notifications beyond this count are dropped.
    #[serde(default = "default_max_per_account")]
    pub max_per_account: usize,
    /// Capacity of each de-duplication key set.
    #[serde(default = "default_dedup_capacity")]
    pub dedup_capacity: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ValkeyConfig {
    #[serde(default = "default_valkey_url")]
    pub url: String,
    #[serde(default = "default_valkey_prefix")]
    pub prefix: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default)]
    pub json: bool,
}

fn default_rpc_url() -> String {
    "https://dream-rpc.somnia.network".to_string()
}
fn default_ws_url() -> String {
    "wss://dream-rpc.somnia.network/ws".to_string()
}
fn default_chain_id() -> u64 {
    50312
}
fn default_escrow_address() -> String {
    "0x3f00dB811A4Ab36e7a953a9C9bC841499fC2EAF6".to_string()
}
fn default_page_size() -> u64 {
    10
}
fn default_refresh_interval_secs() -> u64 {
    30
}
fn default_backend() -> StoreBackend {
    StoreBackend::File
}
fn default_store_dir() -> PathBuf {
    PathBuf::from("notifications")
}
fn default_max_per_account() -> usize {
    200
}
fn default_dedup_capacity() -> usize {
    4096
}
fn default_valkey_url() -> String {
    "redis://127.0.0.1:6379".to_string()
}
fn default_valkey_prefix() -> String {
    "secureflow".to_string()
}
fn default_log_level() -> String {
    "info".to_string()
}

impl Default for ChainConfig {
    fn default() -> Self {
        Self {
            rpc_url: default_rpc_url(),
            ws_url: default_ws_url(),
            chain_id: default_chain_id(),
            escrow_address: default_escrow_address(),
            streams_address: String::new(),
        }
    }
}

impl Default for ScannerConfig {
    fn default() -> Self {
        Self {
            page_size: default_page_size(),
            refresh_interval_secs: default_refresh_interval_secs(),
        }
    }
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            backend: default_backend(),
            dir: default_store_dir(),
            max_per_account: default_max_per_account(),
            dedup_capacity: default_dedup_capacity(),
        }
    }
}

impl Default for ValkeyConfig {
    fn default() -> Self {
        Self {
            url: default_valkey_url(),
            prefix: default_valkey_prefix(),
        }
    }
}

impl LoggingConfig {
    /// Install the global subscriber. `RUST_LOG` wins over `level`.
    pub fn init(&self) {
        let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&self.level));

        if self.json {
            tracing_subscriber::fmt()
                .json()
                .with_env_filter(env_filter)
                .init();
        } else {
            tracing_subscriber::fmt()
                .with_env_filter(env_filter)
                .init();
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

impl Config {
    /// Load config from a TOML file, then overlay environment variables for secrets.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        let mut config: Config = toml::from_str(&contents)?;
        config.apply_env();
        Ok(config)
    }

    /// Load a default config with env-only overrides (no file needed).
    pub fn from_env() -> Self {
        let mut config = Config {
            chain: ChainConfig::default(),
            account: AccountConfig::default(),
            scanner: ScannerConfig::default(),
            notifications: NotificationConfig::default(),
            valkey: ValkeyConfig::default(),
            logging: LoggingConfig::default(),
        };
        config.apply_env();
        config
    }

    /// Load `secureflow.toml` when present, otherwise fall back to env only.
    pub fn discover() -> Result<Self, ConfigError> {
        let path = Path::new("secureflow.toml");
        if path.exists() {
            Self::load(path)
        } else {
            Ok(Self::from_env())
        }
    }

    // Secrets and per-deployment endpoints never need to live in the file.
    fn apply_env(&mut self) {
        if let Ok(url) = std::env::var("SECUREFLOW_RPC_URL") {
            self.chain.rpc_url = url;
        }
        if let Ok(url) = std::env::var("SECUREFLOW_WS_URL") {
            self.chain.ws_url = url;
        }
        if let Ok(addr) = std::env::var("SECUREFLOW_ESCROW_ADDRESS") {
            self.chain.escrow_address = addr;
        }
        if let Ok(addr) = std::env::var("SOMNIA_STREAMS_ADDRESS") {
            self.chain.streams_address = addr;
        }
        if let Ok(account) = std::env::var("SECUREFLOW_ACCOUNT") {
            self.account.address = account;
        }
        if let Ok(key) = std::env::var("PRIVATE_KEY") {
            self.account.private_key = key;
        }
        if let Ok(url) = std::env::var("VALKEY_URL") {
            self.valkey.url = url;
        }
    }

    pub fn has_signer(&self) -> bool {
        !self.account.private_key.is_empty()
    }

    /// The account to watch, or an error naming the env var to set.
    /// Falls back to the signer's address when only a key is configured.
    pub fn account_address(&self) -> Result<alloy::primitives::Address, ConfigError> {
        if self.account.address.is_empty() && self.has_signer() {
            let signer: alloy::signers::local::PrivateKeySigner =
                self.account.private_key.trim().parse().map_err(|_| ConfigError::Invalid {
                    field: "account.private_key",
                    value: "<redacted>".to_string(),
                })?;
            return Ok(signer.address());
        }
        parse_address("account.address", "SECUREFLOW_ACCOUNT", &self.account.address)
    }

    pub fn escrow_address(&self) -> Result<alloy::primitives::Address, ConfigError> {
        parse_address(
            "chain.escrow_address",
            "SECUREFLOW_ESCROW_ADDRESS",
            &self.chain.escrow_address,
        )
    }

    pub fn streams_address(&self) -> Result<alloy::primitives::Address, ConfigError> {
        parse_address(
            "chain.streams_address",
            "SOMNIA_STREAMS_ADDRESS",
            &self.chain.streams_address,
        )
    }
}

fn parse_address(
    field: &'static str,
    env: &str,
    value: &str,
) -> Result<alloy::primitives::Address, ConfigError> {
    if value.is_empty() {
        return Err(ConfigError::MissingEnv(env.to_string()));
    }
    value.parse().map_err(|_| ConfigError::Invalid {
        field,
        value: value.to_string(),
    })
}

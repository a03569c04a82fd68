use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::info;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub general: GeneralConfig,

    pub server: ServerConfig,

    pub wireguard: WireguardConfig,

    pub wg_easy: WgEasySettings,

    pub security: SecurityConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    pub database_path: String,

    pub log_level: String,

    /// Number of tokio worker threads (default: 2)
    /// Set to 0 to use the number of CPU cores
    pub worker_threads: usize,

    /// Maximum database connections (default: 5)
    pub max_db_connections: u32,

    /// Minimum database connections (default: 1)
    pub min_db_connections: u32,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            database_path: "sqlite:data/burrow.db".to_string(),
            log_level: "info".to_string(),
            worker_threads: 2,
            max_db_connections: 5,
            min_db_connections: 1,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub port: u16,

    pub cors_allowed_origins: Vec<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: 6780,
            cors_allowed_origins: vec![
                "http://localhost:6780".to_string(),
                "http://127.0.0.1:6780".to_string(),
            ],
        }
    }
}

/// Where and how peer key material is produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum KeyPolicy {
    /// Generate the keypair locally and store it in the database.
    Db,
    /// Generate the keypair on the WireGuard host via the gen-key script.
    Host,
    /// Delegate client creation to a wg-easy control-plane.
    WgEasy,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WireguardConfig {
    pub key_policy: KeyPolicy,

    pub interface: String,

    /// Client subnet used for deterministic address allocation.
    pub subnet: String,

    /// The server's own public key, embedded in synthesized client configs.
    pub server_public_key: String,

    pub endpoint: String,

    pub dns: String,

    /// When false, host-side apply/remove/gen-key are no-ops that report
    /// "not attempted". The database remains authoritative either way.
    pub apply_enabled: bool,

    /// Remote execution target (`user@host`). When set, host scripts run
    /// over ssh instead of locally.
    pub ssh_target: Option<String>,

    pub apply_script: String,

    pub remove_script: String,

    pub genkey_script: String,

    /// Directory on the host where generated private keys are written.
    pub keys_dir: String,

    /// Timeout for host script invocations (default: 30)
    pub script_timeout_seconds: u64,
}

impl Default for WireguardConfig {
    fn default() -> Self {
        Self {
            key_policy: KeyPolicy::Db,
            interface: "wg0".to_string(),
            subnet: "10.8.0.0/24".to_string(),
            server_public_key: String::new(),
            endpoint: "vpn.example.com:51820".to_string(),
            dns: "1.1.1.1".to_string(),
            apply_enabled: false,
            ssh_target: None,
            apply_script: "/srv/burrow/scripts/wg_apply.sh".to_string(),
            remove_script: "/srv/burrow/scripts/wg_remove.sh".to_string(),
            genkey_script: "/srv/burrow/scripts/wg_gen_key.sh".to_string(),
            keys_dir: "/etc/wg-keys".to_string(),
            script_timeout_seconds: 30,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WgEasySettings {
    pub enabled: bool,

    pub url: String,

    pub password: String,

    /// Optional API key sent as the raw `Authorization` header value on the
    /// HTTP fallback path. When unset, the session password is sent instead.
    pub api_key: Option<String>,
}

impl Default for WgEasySettings {
    fn default() -> Self {
        Self {
            enabled: false,
            url: "http://localhost:51821".to_string(),
            password: "change-me".to_string(),
            api_key: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct SecurityConfig {
    /// Base64-encoded 32-byte key used to encrypt stored client configs.
    /// Required for config storage and retrieval; peers can still be
    /// provisioned without it.
    pub config_encryption_key: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            general: GeneralConfig::default(),
            server: ServerConfig::default(),
            wireguard: WireguardConfig::default(),
            wg_easy: WgEasySettings::default(),
            security: SecurityConfig::default(),
        }
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        let paths = Self::config_paths();

        for path in &paths {
            if path.exists() {
                info!("Loading config from: {}", path.display());
                let mut config = Self::load_from_path(path)?;
                config.apply_env_overrides();
                return Ok(config);
            }
        }

        info!("No config file found, using defaults");
        let mut config = Self::default();
        config.apply_env_overrides();
        Ok(config)
    }

    pub fn load_from_path(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Self = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(config)
    }

    /// Secrets may be supplied via the environment instead of the config
    /// file; the environment wins when both are present.
    fn apply_env_overrides(&mut self) {
        if let Ok(key) = std::env::var("BURROW_ENCRYPTION_KEY")
            && !key.is_empty()
        {
            self.security.config_encryption_key = Some(key);
        }
        if let Ok(password) = std::env::var("BURROW_WG_EASY_PASSWORD")
            && !password.is_empty()
        {
            self.wg_easy.password = password;
        }
        if let Ok(api_key) = std::env::var("BURROW_WG_EASY_API_KEY")
            && !api_key.is_empty()
        {
            self.wg_easy.api_key = Some(api_key);
        }
    }

    pub fn save_to_path(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        info!("Config saved to: {}", path.display());
        Ok(())
    }

    fn config_paths() -> Vec<PathBuf> {
        let mut paths = vec![];

        paths.push(PathBuf::from("config.toml"));

        if let Some(config_dir) = dirs::config_dir() {
            paths.push(config_dir.join("burrow").join("config.toml"));
        }

        if let Some(home) = dirs::home_dir() {
            paths.push(home.join(".burrow").join("config.toml"));
        }

        paths
    }

    pub fn validate(&self) -> Result<()> {
        if self.wireguard.key_policy == KeyPolicy::WgEasy && !self.wg_easy.enabled {
            anyhow::bail!("key_policy = \"wg-easy\" requires the [wg_easy] section to be enabled");
        }

        if self.wg_easy.enabled && self.wg_easy.url.is_empty() {
            anyhow::bail!("wg-easy URL cannot be empty when enabled");
        }

        if crate::wireguard::allocate_address(&self.wireguard.subnet, 0).is_none() {
            anyhow::bail!(
                "wireguard subnet '{}' is not a valid IPv4 CIDR",
                self.wireguard.subnet
            );
        }

        if let Some(key) = &self.security.config_encryption_key {
            crate::crypto::SecretBox::new(key).context("invalid config_encryption_key")?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.wireguard.key_policy, KeyPolicy::Db);
        assert_eq!(config.wireguard.interface, "wg0");
        assert!(!config.wireguard.apply_enabled);
        assert_eq!(config.wg_easy.url, "http://localhost:51821");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_serialization() {
        let config = Config::default();
        let toml_str = toml::to_string_pretty(&config).unwrap();
        assert!(toml_str.contains("[general]"));
        assert!(toml_str.contains("[wireguard]"));
        assert!(toml_str.contains("[wg_easy]"));
    }

    #[test]
    fn test_config_deserialization() {
        let toml_str = r#"
            [general]
            log_level = "debug"

            [wireguard]
            key_policy = "wg-easy"
            interface = "wg1"
        "#;

        let config: Config = toml::from_str(toml_str).unwrap();
        assert_eq!(config.general.log_level, "debug");
        assert_eq!(config.wireguard.key_policy, KeyPolicy::WgEasy);
        assert_eq!(config.wireguard.interface, "wg1");

        assert_eq!(config.wg_easy.password, "change-me");
    }

    #[test]
    fn test_validate_rejects_wg_easy_policy_without_section() {
        let mut config = Config::default();
        config.wireguard.key_policy = KeyPolicy::WgEasy;
        assert!(config.validate().is_err());

        config.wg_easy.enabled = true;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_bad_subnet() {
        let mut config = Config::default();
        config.wireguard.subnet = "banana".to_string();
        assert!(config.validate().is_err());
    }
}

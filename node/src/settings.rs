//! Node configuration: defaults, optional TOML file, `SHARELOCK_*` environment.

use anyhow::{anyhow, Result};
use config::{Config, File as ConfigFile};
use sharelock_crypto::EncryptionSecret;
use sharelock_gateway::UploadPolicy;
use std::path::{Path, PathBuf};

pub const DEFAULT_CONFIG_PATH: &str = "config/sharelock.toml";
const ENV_PREFIX: &str = "SHARELOCK";
const LEGACY_SECRET_VAR: &str = "ENCRYPTION_KEY";

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub config_path: Option<PathBuf>,

    // HTTP
    pub rpc_host: String,
    pub rpc_port: u16,

    // Storage
    pub data_dir: PathBuf,
    pub uploads_dir: Option<PathBuf>,
    pub registry_path: Option<PathBuf>,
    pub public_dir: Option<PathBuf>,

    // Uploads
    pub max_upload_bytes: u64,
    pub allowed_content_types: Vec<String>,

    // Credentials
    pub encryption_secret: Option<EncryptionSecret>,

    // Observability
    pub prometheus_enabled: bool,
    pub log_level: String,
    pub log_format: String,

    // Development
    pub dev_mode: bool,
}

impl Default for AppConfig {
    fn default() -> Self {
        let policy = UploadPolicy::default();
        Self {
            config_path: None,
            rpc_host: "127.0.0.1".to_string(),
            rpc_port: 3000,
            data_dir: PathBuf::from("./data"),
            uploads_dir: None,
            registry_path: None,
            public_dir: None,
            max_upload_bytes: policy.max_bytes,
            allowed_content_types: policy.allowed_content_types,
            encryption_secret: None,
            prometheus_enabled: true,
            log_level: "info".to_string(),
            log_format: "pretty".to_string(),
            dev_mode: false,
        }
    }
}

impl AppConfig {
    /// Load from the config file (explicit or default location), the
    /// `SHARELOCK_` environment and the legacy `ENCRYPTION_KEY` variable.
    pub fn load(config_path_override: Option<&str>) -> Result<Self> {
        let resolved_path = if let Some(path) = config_path_override {
            let path = PathBuf::from(path);
            if !path.exists() {
                anyhow::bail!(
                    "Configuration file {} not found (specified via --config)",
                    path.display()
                );
            }
            Some(path)
        } else {
            let path = PathBuf::from(DEFAULT_CONFIG_PATH);
            path.exists().then_some(path)
        };

        let mut builder = Config::builder();
        if let Some(path) = &resolved_path {
            builder = builder.add_source(ConfigFile::from(path.as_path()));
        }
        builder = builder.add_source(config::Environment::with_prefix(ENV_PREFIX));
        let config = builder.build()?;

        let legacy_secret = std::env::var(LEGACY_SECRET_VAR).ok();
        Self::from_config(&config, resolved_path, legacy_secret)
    }

    /// Build from an already assembled source stack.
    pub fn from_config(
        config: &Config,
        config_path: Option<PathBuf>,
        legacy_secret: Option<String>,
    ) -> Result<Self> {
        let mut app = AppConfig {
            config_path,
            ..AppConfig::default()
        };

        if let Some(host) = get_string_value(config, &["rpc_host", "RPC_HOST"]) {
            app.rpc_host = host;
        }
        if let Some(port) = get_u64_value(config, &["rpc_port", "RPC_PORT"])? {
            app.rpc_port =
                u16::try_from(port).map_err(|_| anyhow!("rpc_port {} is out of range", port))?;
        }
        if let Some(dir) = get_string_value(config, &["data_dir", "DATA_DIR"]) {
            app.data_dir = PathBuf::from(dir);
        }
        app.uploads_dir = get_string_value(config, &["uploads_dir", "UPLOADS_DIR"]).map(PathBuf::from);
        app.registry_path =
            get_string_value(config, &["registry_path", "REGISTRY_PATH"]).map(PathBuf::from);
        app.public_dir = get_string_value(config, &["public_dir", "PUBLIC_DIR"])
            .map(PathBuf::from)
            .or_else(|| {
                let fallback = PathBuf::from("./public");
                fallback.is_dir().then_some(fallback)
            });

        if let Some(max) = get_u64_value(config, &["max_upload_bytes", "MAX_UPLOAD_BYTES"])? {
            app.max_upload_bytes = max;
        }
        if let Some(types) =
            get_list_value(config, &["allowed_content_types", "ALLOWED_CONTENT_TYPES"])
        {
            app.allowed_content_types = types;
        }

        let secret = get_string_value(config, &["encryption_key", "ENCRYPTION_KEY"])
            .or(legacy_secret);
        app.encryption_secret = EncryptionSecret::from_optional(secret);

        app.prometheus_enabled = get_bool_value(
            config,
            &["prometheus_enabled", "PROMETHEUS_ENABLED"],
            app.prometheus_enabled,
        );
        if let Some(level) = get_string_value(config, &["log_level", "LOG_LEVEL"]) {
            app.log_level = level;
        }
        if let Some(format) = get_string_value(config, &["log_format", "LOG_FORMAT"]) {
            app.log_format = format.to_lowercase();
        }
        app.dev_mode = get_bool_value(config, &["dev_mode", "DEV_MODE"], false);

        Ok(app)
    }

    pub fn validate(&self) -> Result<()> {
        if self.rpc_host.trim().is_empty() {
            anyhow::bail!("rpc_host must not be empty");
        }
        if self.rpc_port == 0 {
            anyhow::bail!("rpc_port must be greater than zero");
        }
        if self.max_upload_bytes == 0 {
            anyhow::bail!("max_upload_bytes must be greater than zero");
        }
        if self.allowed_content_types.is_empty() {
            anyhow::bail!("allowed_content_types must list at least one content type");
        }
        if self.log_format != "pretty" && self.log_format != "json" {
            anyhow::bail!(
                "Invalid log_format '{}'; expected 'pretty' or 'json'",
                self.log_format
            );
        }
        Ok(())
    }

    pub fn uploads_dir(&self) -> PathBuf {
        self.uploads_dir
            .clone()
            .unwrap_or_else(|| self.data_dir.join("uploads"))
    }

    pub fn registry_path(&self) -> PathBuf {
        self.registry_path
            .clone()
            .unwrap_or_else(|| self.data_dir.join("registry.json"))
    }

    pub fn upload_policy(&self) -> UploadPolicy {
        UploadPolicy::new(self.max_upload_bytes, self.allowed_content_types.clone())
    }

    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.rpc_host, self.rpc_port)
    }

    pub fn config_path(&self) -> Option<&Path> {
        self.config_path.as_deref()
    }
}

fn get_string_value(config: &Config, keys: &[&str]) -> Option<String> {
    keys.iter().find_map(|key| {
        config
            .get_string(key)
            .ok()
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
    })
}

fn get_u64_value(config: &Config, keys: &[&str]) -> Result<Option<u64>> {
    match get_string_value(config, keys) {
        Some(raw) => raw
            .parse::<u64>()
            .map(Some)
            .map_err(|err| anyhow!("Invalid value '{}' for {}: {}", raw, keys[0], err)),
        None => Ok(None),
    }
}

fn get_bool_value(config: &Config, keys: &[&str], default: bool) -> bool {
    for key in keys {
        if let Ok(value) = config.get_bool(key) {
            return value;
        }
        if let Ok(raw) = config.get_string(key) {
            if let Ok(parsed) = raw.parse::<bool>() {
                return parsed;
            }
        }
    }
    default
}

/// A TOML array or a comma separated string.
fn get_list_value(config: &Config, keys: &[&str]) -> Option<Vec<String>> {
    for key in keys {
        if let Ok(values) = config.get_array(key) {
            let items: Vec<String> = values
                .into_iter()
                .filter_map(|v| v.into_string().ok())
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect();
            return Some(items);
        }
        if let Ok(raw) = config.get_string(key) {
            let items: Vec<String> = raw
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect();
            return Some(items);
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use config::FileFormat;

    fn from_toml(toml: &str, legacy_secret: Option<&str>) -> AppConfig {
        let config = Config::builder()
            .add_source(ConfigFile::from_str(toml, FileFormat::Toml))
            .build()
            .unwrap();
        AppConfig::from_config(&config, None, legacy_secret.map(str::to_string)).unwrap()
    }

    #[test]
    fn defaults_load() {
        let config = from_toml("", None);
        assert_eq!(config.rpc_host, "127.0.0.1");
        assert_eq!(config.rpc_port, 3000);
        assert_eq!(config.data_dir, PathBuf::from("./data"));
        assert_eq!(config.uploads_dir(), PathBuf::from("./data/uploads"));
        assert_eq!(config.registry_path(), PathBuf::from("./data/registry.json"));
        assert_eq!(config.max_upload_bytes, 10_485_760);
        assert_eq!(
            config.allowed_content_types,
            vec!["image/jpeg", "image/png", "application/pdf"]
        );
        assert!(config.prometheus_enabled);
        assert_eq!(config.log_format, "pretty");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn missing_secret_is_none() {
        let config = from_toml("encryption_key = \"   \"", None);
        assert!(config.encryption_secret.is_none());
    }

    #[test]
    fn file_values_override_defaults() {
        let config = from_toml(
            r#"
            rpc_host = "0.0.0.0"
            rpc_port = 8088
            data_dir = "/var/lib/sharelock"
            registry_path = "/etc/sharelock/registry.json"
            max_upload_bytes = 2048
            allowed_content_types = ["image/png"]
            encryption_key = "file-secret"
            prometheus_enabled = false
            log_format = "JSON"
            "#,
            None,
        );
        assert_eq!(config.listen_addr(), "0.0.0.0:8088");
        assert_eq!(
            config.uploads_dir(),
            PathBuf::from("/var/lib/sharelock/uploads")
        );
        assert_eq!(
            config.registry_path(),
            PathBuf::from("/etc/sharelock/registry.json")
        );
        assert_eq!(config.upload_policy(), UploadPolicy::new(2048, vec!["image/png".into()]));
        assert!(config.encryption_secret.is_some());
        assert!(!config.prometheus_enabled);
        assert_eq!(config.log_format, "json");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn legacy_secret_is_honoured() {
        let config = from_toml("", Some("legacy"));
        assert!(config.encryption_secret.is_some());
    }

    #[test]
    fn comma_separated_content_types() {
        let config = from_toml("allowed_content_types = \"image/png, application/pdf\"", None);
        assert_eq!(
            config.allowed_content_types,
            vec!["image/png", "application/pdf"]
        );
    }

    #[test]
    fn validation_rejects_port_zero() {
        let config = from_toml("rpc_port = 0", None);
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("rpc_port"), "unexpected error: {err}");
    }

    #[test]
    fn validation_rejects_empty_allow_list_and_zero_limit() {
        let config = from_toml("allowed_content_types = []", None);
        assert!(config.validate().is_err());

        let config = from_toml("max_upload_bytes = 0", None);
        assert!(config.validate().is_err());
    }

    #[test]
    fn invalid_port_is_an_error() {
        let config = Config::builder()
            .add_source(ConfigFile::from_str("rpc_port = \"many\"", FileFormat::Toml))
            .build()
            .unwrap();
        assert!(AppConfig::from_config(&config, None, None).is_err());
        let config = Config::builder()
            .add_source(ConfigFile::from_str("rpc_port = 70000", FileFormat::Toml))
            .build()
            .unwrap();
        assert!(AppConfig::from_config(&config, None, None).is_err());
    }
}

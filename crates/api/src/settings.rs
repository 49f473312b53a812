//! Service configuration
//!
//! Layered with the `config` crate: built-in defaults, then an optional TOML
//! file, then `FOOD_VISION__*` environment variables.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use ::config::{Config, Environment, File};
use axum::http::{HeaderValue, Method};
use food_classifier::{DevicePreference, DEFAULT_TOP_K};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};

/// Environment variable naming the config file
pub const CONFIG_PATH_ENV: &str = "FOOD_VISION_CONFIG";

/// Config file read when `FOOD_VISION_CONFIG` is unset
pub const DEFAULT_CONFIG_PATH: &str = "food-vision.toml";

const ENV_PREFIX: &str = "FOOD_VISION";

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to load configuration: {0}")]
    Load(#[from] ::config::ConfigError),
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// HTTP listener settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Verbose logging
    pub debug: bool,
    /// Origins allowed to make cross-origin requests; `*` allows any
    pub cors_origins: Vec<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8000,
            debug: true,
            cors_origins: vec![
                "http://localhost:3000".to_string(),
                "http://127.0.0.1:3000".to_string(),
                "https://foodvisionai.onrender.com".to_string(),
            ],
        }
    }
}

/// Upload limits
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UploadConfig {
    /// Maximum accepted file size in bytes
    pub max_bytes: usize,
    /// Accepted filename extensions, lowercase without the dot
    pub allowed_extensions: Vec<String>,
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            max_bytes: 10 * 1024 * 1024,
            allowed_extensions: ["png", "jpg", "jpeg", "gif", "webp"]
                .iter()
                .map(|ext| ext.to_string())
                .collect(),
        }
    }
}

/// Model selection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelConfig {
    /// Model identifier, a directory or a name under `root`
    pub id: String,
    /// Directory model identifiers are resolved against
    pub root: PathBuf,
    /// Predictions returned when the request does not ask for a count
    pub top_k: usize,
    pub device: DevicePreference,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            id: "nateraw/food".to_string(),
            root: PathBuf::from("models"),
            top_k: DEFAULT_TOP_K,
            device: DevicePreference::Auto,
        }
    }
}

/// Complete service configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub upload: UploadConfig,
    pub model: ModelConfig,
}

impl AppConfig {
    /// Load from the file named by `FOOD_VISION_CONFIG` (or
    /// `food-vision.toml`) and the process environment
    pub fn load() -> Result<Self, ConfigError> {
        let path = std::env::var(CONFIG_PATH_ENV).unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
        Self::from_sources(Some(Path::new(&path)), None)
    }

    /// Build from an optional file and an environment map.
    ///
    /// A missing file is skipped. `env = None` reads the process
    /// environment.
    pub fn from_sources(
        file: Option<&Path>,
        env: Option<HashMap<String, String>>,
    ) -> Result<Self, ConfigError> {
        let mut builder = Config::builder().add_source(Config::try_from(&AppConfig::default())?);

        if let Some(path) = file {
            builder = builder.add_source(File::from(path).required(false));
        }

        let environment = Environment::with_prefix(ENV_PREFIX)
            .prefix_separator("__")
            .separator("__")
            .list_separator(",")
            .with_list_parse_key("server.cors_origins")
            .with_list_parse_key("upload.allowed_extensions")
            .try_parsing(true)
            .source(env);

        let mut config: AppConfig = builder.add_source(environment).build()?.try_deserialize()?;
        config.normalize();
        config.validate()?;
        Ok(config)
    }

    fn normalize(&mut self) {
        self.upload.allowed_extensions = self
            .upload
            .allowed_extensions
            .iter()
            .map(|ext| ext.trim().trim_start_matches('.').to_lowercase())
            .filter(|ext| !ext.is_empty())
            .collect();
        self.server.cors_origins = self
            .server
            .cors_origins
            .iter()
            .map(|origin| origin.trim().to_string())
            .filter(|origin| !origin.is_empty())
            .collect();
    }

    /// Reject settings the service cannot run with
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.server.port == 0 {
            return Err(ConfigError::Invalid("server.port must be non-zero".into()));
        }
        if self.upload.max_bytes == 0 {
            return Err(ConfigError::Invalid("upload.max_bytes must be non-zero".into()));
        }
        if self.upload.allowed_extensions.is_empty() {
            return Err(ConfigError::Invalid(
                "upload.allowed_extensions must not be empty".into(),
            ));
        }
        if self.model.id.trim().is_empty() {
            return Err(ConfigError::Invalid("model.id must not be empty".into()));
        }
        if self.model.top_k == 0 {
            return Err(ConfigError::Invalid("model.top_k must be at least 1".into()));
        }
        Ok(())
    }

    /// `host:port` listen address
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}

/// CORS layer for the configured origins
pub fn cors_layer(origins: &[String]) -> Result<CorsLayer, ConfigError> {
    let allow_origin = if origins.iter().any(|o| o == "*") {
        AllowOrigin::any()
    } else {
        let values = origins
            .iter()
            .map(|o| {
                HeaderValue::from_str(o)
                    .map_err(|_| ConfigError::Invalid(format!("invalid CORS origin '{}'", o)))
            })
            .collect::<Result<Vec<_>, _>>()?;
        AllowOrigin::list(values)
    };

    Ok(CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers(Any))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn env(pairs: &[(&str, &str)]) -> Option<HashMap<String, String>> {
        Some(
            pairs
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        )
    }

    #[test]
    fn test_defaults() {
        let config = AppConfig::from_sources(None, env(&[])).unwrap();
        assert_eq!(config, AppConfig::default());
        assert_eq!(config.upload.max_bytes, 10_485_760);
        assert_eq!(config.model.top_k, 5);
        assert_eq!(config.bind_addr(), "0.0.0.0:8000");
    }

    #[test]
    fn test_missing_file_is_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("absent.toml");
        let config = AppConfig::from_sources(Some(&path), env(&[])).unwrap();
        assert_eq!(config, AppConfig::default());
    }

    #[test]
    fn test_file_overrides() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("food-vision.toml");
        std::fs::write(
            &path,
            r#"
[server]
port = 9100
debug = false

[upload]
allowed_extensions = [".PNG", "jpg"]

[model]
id = "/srv/models/food"
device = "cpu"
"#,
        )
        .unwrap();

        let config = AppConfig::from_sources(Some(&path), env(&[])).unwrap();
        assert_eq!(config.server.port, 9100);
        assert!(!config.server.debug);
        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.upload.allowed_extensions, vec!["png", "jpg"]);
        assert_eq!(config.model.id, "/srv/models/food");
        assert_eq!(config.model.device, DevicePreference::Cpu);
    }

    #[test]
    fn test_env_overrides() {
        let config = AppConfig::from_sources(
            None,
            env(&[
                ("FOOD_VISION__SERVER__PORT", "9200"),
                ("FOOD_VISION__SERVER__CORS_ORIGINS", "https://a.example,https://b.example"),
                ("FOOD_VISION__MODEL__TOP_K", "3"),
            ]),
        )
        .unwrap();

        assert_eq!(config.server.port, 9200);
        assert_eq!(
            config.server.cors_origins,
            vec!["https://a.example", "https://b.example"]
        );
        assert_eq!(config.model.top_k, 3);
    }

    #[test]
    fn test_invalid_values() {
        let result = AppConfig::from_sources(None, env(&[("FOOD_VISION__MODEL__TOP_K", "0")]));
        assert!(matches!(result, Err(ConfigError::Invalid(_))));

        let result = AppConfig::from_sources(None, env(&[("FOOD_VISION__SERVER__PORT", "0")]));
        assert!(matches!(result, Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_cors_layer() {
        let origins = AppConfig::default().server.cors_origins;
        assert!(cors_layer(&origins).is_ok());
        assert!(cors_layer(&["*".to_string()]).is_ok());
        assert!(matches!(
            cors_layer(&["bad\norigin".to_string()]),
            Err(ConfigError::Invalid(_))
        ));
    }
}

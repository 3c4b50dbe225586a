use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::interpret::ClassList;

const DEFAULT_REGION: &str = "us-central1";
const DEFAULT_TIMEOUT_SECS: u64 = 30;
const DEFAULT_MAX_UPLOAD_BYTES: usize = 10 * 1024 * 1024;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("missing required environment variable {0}")]
    Missing(&'static str),
    #[error("invalid value for {key}: {reason}")]
    Invalid { key: &'static str, reason: String },
    #[error("failed to read {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse {}: {source}", .path.display())]
    Yaml {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },
}

/// Where the remote model lives. Fixed for the lifetime of the process.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelPath {
    pub project: String,
    pub region: String,
    pub model: String,
    pub version: Option<String>,
}

impl ModelPath {
    /// Resource name understood by the prediction API, e.g.
    /// `projects/p/models/m` or `projects/p/models/m/versions/v`.
    pub fn resource_name(&self) -> String {
        match &self.version {
            Some(version) => format!(
                "projects/{}/models/{}/versions/{}",
                self.project, self.model, version
            ),
            None => format!("projects/{}/models/{}", self.project, self.model),
        }
    }

    pub fn regional_endpoint(&self) -> String {
        format!("https://{}-ml.googleapis.com", self.region)
    }
}

#[derive(Debug, Clone)]
pub enum Credentials {
    ServiceAccountFile(PathBuf),
    StaticToken(String),
}

#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub host: String,
    pub port: u16,
    pub model_path: ModelPath,
    pub credentials: Credentials,
    pub endpoint: String,
    pub timeout: Duration,
    pub max_upload_bytes: usize,
    pub model_config_path: PathBuf,
}

impl GatewayConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds the config from any key lookup; `from_env` passes the process environment.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let require = |key: &'static str| get(key).ok_or(ConfigError::Missing(key));

        let port = match get("PORT") {
            Some(raw) => raw.parse::<u16>().map_err(|e| ConfigError::Invalid {
                key: "PORT",
                reason: e.to_string(),
            })?,
            None => 3000,
        };

        let model_path = ModelPath {
            project: require("GCP_PROJECT")?,
            region: get("GCP_REGION").unwrap_or_else(|| DEFAULT_REGION.to_string()),
            model: require("MODEL_NAME")?,
            version: get("MODEL_VERSION"),
        };

        let credentials = match (get("GCP_ACCESS_TOKEN"), get("GOOGLE_APPLICATION_CREDENTIALS")) {
            (Some(token), _) => Credentials::StaticToken(token),
            (None, Some(path)) => Credentials::ServiceAccountFile(PathBuf::from(path)),
            (None, None) => return Err(ConfigError::Missing("GOOGLE_APPLICATION_CREDENTIALS")),
        };

        let endpoint = get("PREDICT_ENDPOINT")
            .map(|e| e.trim_end_matches('/').to_string())
            .unwrap_or_else(|| model_path.regional_endpoint());
        url::Url::parse(&endpoint).map_err(|e| ConfigError::Invalid {
            key: "PREDICT_ENDPOINT",
            reason: e.to_string(),
        })?;

        let timeout_secs = parse_positive(&get, "PREDICT_TIMEOUT_SECS", DEFAULT_TIMEOUT_SECS)?;
        let max_upload_bytes =
            parse_positive(&get, "MAX_UPLOAD_BYTES", DEFAULT_MAX_UPLOAD_BYTES as u64)? as usize;

        let model_config_path = get("MODEL_CONFIG_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|| match get("CARGO_MANIFEST_DIR") {
                Some(manifest_dir) => PathBuf::from(format!("{}/../config/model.yaml", manifest_dir)),
                None => PathBuf::from("config/model.yaml"),
            });

        Ok(Self {
            host: get("HOST").unwrap_or_else(|| "0.0.0.0".to_string()),
            port,
            model_path,
            credentials,
            endpoint,
            timeout: Duration::from_secs(timeout_secs),
            max_upload_bytes,
            model_config_path,
        })
    }
}

fn parse_positive<G>(get: &G, key: &'static str, default: u64) -> Result<u64, ConfigError>
where
    G: Fn(&str) -> Option<String>,
{
    let Some(raw) = get(key) else {
        return Ok(default);
    };
    match raw.parse::<u64>() {
        Ok(0) => Err(ConfigError::Invalid {
            key,
            reason: "must be greater than zero".to_string(),
        }),
        Ok(value) => Ok(value),
        Err(e) => Err(ConfigError::Invalid {
            key,
            reason: e.to_string(),
        }),
    }
}

/// Model description shipped alongside the gateway (`config/model.yaml`).
#[derive(Debug, Serialize, Deserialize)]
pub struct ModelConfig {
    pub version: u32,
    pub classes: Vec<String>,
}

impl ModelConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let config_str = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_yaml(&config_str).map_err(|source| ConfigError::Yaml {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn from_yaml(raw: &str) -> Result<Self, serde_yaml::Error> {
        serde_yaml::from_str(raw)
    }

    pub fn class_list(&self) -> Result<ClassList, ConfigError> {
        if self.classes.is_empty() {
            return Err(ConfigError::Invalid {
                key: "classes",
                reason: "class list is empty".to_string(),
            });
        }

        let mut seen = HashSet::new();
        for name in &self.classes {
            if !seen.insert(name.as_str()) {
                return Err(ConfigError::Invalid {
                    key: "classes",
                    reason: format!("duplicate class name {:?}", name),
                });
            }
        }

        Ok(ClassList::new(self.classes.clone()))
    }
}

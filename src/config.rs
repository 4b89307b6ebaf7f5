use crate::log_debug;

use anyhow::{Context, Result, anyhow};
use dirs::config_dir;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Project configuration filename, looked up in the working directory
pub const PROJECT_CONFIG_FILENAME: &str = "schema-mock.toml";

/// Configuration structure for schema-mock
#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq)]
pub struct Config {
    /// LLM service settings
    #[serde(default)]
    pub llm: LlmConfig,
    /// HTTP server settings
    #[serde(default)]
    pub server: ServerConfig,
    /// Flag indicating if this config is from a project file
    #[serde(skip)]
    pub is_project_config: bool,
}

/// Where generation requests go
#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
pub struct LlmConfig {
    /// Base URL of the Ollama-compatible service
    #[serde(default = "default_llm_host")]
    pub host: String,
    /// Model name sent with every request
    #[serde(default = "default_model")]
    pub model: String,
    /// Request timeout; unset leaves the HTTP client default
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_secs: Option<u64>,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            host: default_llm_host(),
            model: default_model(),
            timeout_secs: None,
        }
    }
}

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
pub struct ServerConfig {
    #[serde(default = "default_server_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Directory holding endpoint schema files
    #[serde(default = "default_schemas_dir")]
    pub schemas_dir: PathBuf,
    /// Directory served for non-mock paths (the browser UI)
    #[serde(default = "default_static_dir")]
    pub static_dir: PathBuf,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_server_host(),
            port: default_port(),
            schemas_dir: default_schemas_dir(),
            static_dir: default_static_dir(),
        }
    }
}

fn default_llm_host() -> String {
    "http://localhost:11434".to_string()
}

fn default_model() -> String {
    "llama3".to_string()
}

fn default_server_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    3000
}

fn default_schemas_dir() -> PathBuf {
    PathBuf::from("schemas")
}

fn default_static_dir() -> PathBuf {
    PathBuf::from("public")
}

/// Overrides that can be layered on top of a loaded config
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub llm_host: Option<String>,
    pub model: Option<String>,
    pub timeout_secs: Option<u64>,
    pub host: Option<String>,
    pub port: Option<u16>,
    pub schemas_dir: Option<PathBuf>,
    pub static_dir: Option<PathBuf>,
}

impl Config {
    /// Load the personal configuration, then merge the project file over it
    pub fn load() -> Result<Self> {
        let config_path = Self::get_config_path()?;
        let mut config = if config_path.exists() {
            Self::from_file(&config_path)?
        } else {
            Self::default()
        };

        let project_path = Path::new(PROJECT_CONFIG_FILENAME);
        if project_path.exists() {
            let project_config = Self::load_project_config(project_path)?;
            config.merge_with_project_config(project_config);
        }

        log_debug!("Configuration loaded: {:?}", config);
        Ok(config)
    }

    /// Parse a TOML configuration file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        toml::from_str(&content)
            .with_context(|| format!("Invalid configuration in {}", path.display()))
    }

    /// Load project-specific configuration
    pub fn load_project_config(path: &Path) -> Result<Self> {
        let mut config = Self::from_file(path).map_err(|e| {
            anyhow!(
                "{e:#}. Please check your {} file for syntax errors.",
                PROJECT_CONFIG_FILENAME
            )
        })?;
        config.is_project_config = true;
        Ok(config)
    }

    /// Merge project config over this one; project values that differ from
    /// the defaults win
    pub fn merge_with_project_config(&mut self, project_config: Self) {
        log_debug!("Merging with project configuration");
        let defaults = Self::default();

        if project_config.llm.host != defaults.llm.host {
            self.llm.host = project_config.llm.host;
        }
        if project_config.llm.model != defaults.llm.model {
            self.llm.model = project_config.llm.model;
        }
        if project_config.llm.timeout_secs.is_some() {
            self.llm.timeout_secs = project_config.llm.timeout_secs;
        }

        if project_config.server.host != defaults.server.host {
            self.server.host = project_config.server.host;
        }
        if project_config.server.port != defaults.server.port {
            self.server.port = project_config.server.port;
        }
        if project_config.server.schemas_dir != defaults.server.schemas_dir {
            self.server.schemas_dir = project_config.server.schemas_dir;
        }
        if project_config.server.static_dir != defaults.server.static_dir {
            self.server.static_dir = project_config.server.static_dir;
        }
    }

    /// Apply command-line overrides
    pub fn apply_overrides(&mut self, overrides: &ConfigOverrides) {
        if let Some(host) = &overrides.llm_host {
            self.llm.host.clone_from(host);
        }
        if let Some(model) = &overrides.model {
            self.llm.model.clone_from(model);
        }
        if let Some(timeout) = overrides.timeout_secs {
            self.llm.timeout_secs = Some(timeout);
        }
        if let Some(host) = &overrides.host {
            self.server.host.clone_from(host);
        }
        if let Some(port) = overrides.port {
            self.server.port = port;
        }
        if let Some(dir) = &overrides.schemas_dir {
            self.server.schemas_dir.clone_from(dir);
        }
        if let Some(dir) = &overrides.static_dir {
            self.server.static_dir.clone_from(dir);
        }
    }

    /// Save the configuration to the personal config file
    pub fn save(&self) -> Result<()> {
        // Don't save project configs to personal config file
        if self.is_project_config {
            return Ok(());
        }

        let config_path = Self::get_config_path()?;
        self.save_to(&config_path)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        let config_content = toml::to_string_pretty(self)?;
        fs::write(path, config_content)
            .with_context(|| format!("Failed to write config file {}", path.display()))?;
        log_debug!("Configuration saved: {:?}", self);
        Ok(())
    }

    /// Get the path to the configuration file
    pub fn get_config_path() -> Result<PathBuf> {
        let mut path =
            config_dir().ok_or_else(|| anyhow!("Unable to determine config directory"))?;
        path.push("schema-mock");
        fs::create_dir_all(&path)?;
        path.push("config.toml");
        Ok(path)
    }

    /// Socket address string the server binds to
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}

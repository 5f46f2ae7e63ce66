//! Configuration management for companyfinder
//!
//! All configuration is loaded from `./config/companyfinder.toml` (or a path
//! given on the command line). Defaults live in the config template only.

use serde::Deserialize;
use std::fs;
use std::io::{self, IsTerminal, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Configuration file path relative to working directory
pub const CONFIG_PATH: &str = "./config/companyfinder.toml";

/// Default configuration file content - the only place defaults exist
pub const DEFAULT_CONFIG: &str = include_str!("../config/companyfinder.toml");

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Configuration file not found at {0}")]
    FileNotFound(PathBuf),

    #[error("Failed to read configuration file: {0}")]
    IoError(#[from] io::Error),

    #[error("Failed to parse configuration file: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("Configuration field '{field}' cannot be empty")]
    EmptyRequired { field: String },

    #[error("Invalid value for '{field}': {reason}")]
    InvalidValue { field: String, reason: String },
}

/// Root configuration structure
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub resolution: ResolutionConfig,
    pub search: SearchConfig,
    pub names: NamesConfig,
    pub homepage: HomepageConfig,
    pub registry: RegistryConfig,
    pub maps: MapsConfig,
    pub http: HttpConfig,
    #[serde(default)]
    pub proxy: ProxyConfig,
}

/// Early-stop threshold and comparison weights
#[derive(Debug, Clone, Deserialize)]
pub struct ResolutionConfig {
    pub minimum_confidence: u32,
    pub domain_word_weight: u32,
    pub domain_char_weight: u32,
    pub title_word_weight: u32,
    pub title_char_weight: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SearchConfig {
    pub search_url: String,
    pub maximum_search_results: usize,
    #[serde(default)]
    pub user_avoid_patterns: Vec<String>,
    #[serde(default)]
    pub user_avoid_domains: Vec<String>,
    #[serde(default)]
    pub requests_per_minute: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NamesConfig {
    /// Comma-separated location tokens
    #[serde(default)]
    pub ignore_in_company_name: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct HomepageConfig {
    pub url_template: String,
    pub timeout_secs: u64,
    pub parked_phrases: Vec<String>,
}

impl HomepageConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn url_for(&self, domain: &str) -> String {
        self.url_template.replace("{domain}", domain)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct RegistryConfig {
    /// Registry domain used in `site:` queries
    pub site: String,
    /// Base URL of the registry's own company search
    pub search_url: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MapsConfig {
    pub api_url: String,
    pub api_key_env: String,
    pub maximum_results: usize,
    pub max_pages: usize,
    pub not_ready_attempts: u32,
    pub not_ready_delay_ms: u64,
    pub page_delay_ms: u64,
}

/// HTTP client configuration
#[derive(Debug, Clone, Deserialize)]
pub struct HttpConfig {
    pub user_agent: String,
    pub request_timeout_secs: u64,
}

impl HttpConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProxyConfig {
    #[serde(default)]
    pub proxies: Vec<String>,
}

impl AppConfig {
    /// Load configuration from the default path
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from_path(Path::new(CONFIG_PATH))
    }

    /// Load configuration from a specific path
    pub fn load_from_path(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Err(ConfigError::FileNotFound(path.to_path_buf()));
        }

        let content = fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    /// Parse and validate configuration text
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: AppConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// The embedded template, parsed
    pub fn default_template() -> Result<Self, ConfigError> {
        Self::from_toml(DEFAULT_CONFIG)
    }

    /// Validate all configuration values
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.http.user_agent.is_empty() {
            return Err(ConfigError::EmptyRequired {
                field: "http.user_agent".to_string(),
            });
        }
        if self.http.request_timeout_secs == 0 {
            return Err(ConfigError::EmptyRequired {
                field: "http.request_timeout_secs".to_string(),
            });
        }
        if self.homepage.timeout_secs == 0 {
            return Err(ConfigError::EmptyRequired {
                field: "homepage.timeout_secs".to_string(),
            });
        }

        for (field, value) in [
            ("search.search_url", &self.search.search_url),
            ("registry.search_url", &self.registry.search_url),
            ("maps.api_url", &self.maps.api_url),
        ] {
            if !value.starts_with("http://") && !value.starts_with("https://") {
                return Err(ConfigError::InvalidValue {
                    field: field.to_string(),
                    reason: format!("'{}' is not an http(s) URL", value),
                });
            }
        }

        if !self.homepage.url_template.contains("{domain}") {
            return Err(ConfigError::InvalidValue {
                field: "homepage.url_template".to_string(),
                reason: "must contain the {domain} placeholder".to_string(),
            });
        }

        if self.registry.site.trim().is_empty() {
            return Err(ConfigError::EmptyRequired {
                field: "registry.site".to_string(),
            });
        }
        if self.search.maximum_search_results == 0 {
            return Err(ConfigError::InvalidValue {
                field: "search.maximum_search_results".to_string(),
                reason: "must be at least 1".to_string(),
            });
        }
        if self.maps.max_pages == 0 {
            return Err(ConfigError::InvalidValue {
                field: "maps.max_pages".to_string(),
                reason: "must be at least 1".to_string(),
            });
        }

        let weights = &self.resolution;
        if weights.domain_word_weight
            + weights.domain_char_weight
            + weights.title_word_weight
            + weights.title_char_weight
            == 0
        {
            return Err(ConfigError::InvalidValue {
                field: "resolution".to_string(),
                reason: "at least one test weight must be non-zero".to_string(),
            });
        }

        Ok(())
    }

    /// Create default configuration file at the given location
    pub fn create_default_config_at(path: &Path) -> Result<PathBuf, ConfigError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let mut file = fs::File::create(path)?;
        file.write_all(DEFAULT_CONFIG.as_bytes())?;

        Ok(path.to_path_buf())
    }

    /// Create default configuration file at the standard location
    pub fn create_default_config() -> Result<PathBuf, ConfigError> {
        Self::create_default_config_at(Path::new(CONFIG_PATH))
    }

    /// Prompt user to create default config (only in interactive mode)
    pub fn prompt_create_config() -> Result<Option<PathBuf>, ConfigError> {
        if !io::stdin().is_terminal() {
            return Ok(None);
        }

        print!("Configuration file not found. Create default config? [Y/n] ");
        io::stdout().flush()?;

        let mut input = String::new();
        io::stdin().read_line(&mut input)?;
        let input = input.trim().to_lowercase();

        if input.is_empty() || input == "y" || input == "yes" {
            let path = Self::create_default_config()?;
            Ok(Some(path))
        } else {
            Ok(None)
        }
    }
}

//! Configuration management using Figment
//!
//! Configuration is loaded from multiple sources with the following precedence (highest to lowest):
//! 1. Environment variables (prefix: `QUIRE_`, nested keys separated by `__`)
//! 2. Current working directory: ./config.toml
//! 3. System directory: /etc/quire/{service_name}/config.toml
//! 4. Default values
//!
//! ```toml
//! [service]
//! name = "blog"
//! port = 8080
//! default_layout = "application"
//!
//! [[templates]]
//! name = "blog"
//! paths = ["app/views"]
//!
//! [session]
//! cookie_name = "blog_session"
//! expiry_secs = 3600
//! ```

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::{error::Result, session::SessionConfig, templates::TemplateSearchSpec};

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Service configuration
    #[serde(default)]
    pub service: ServiceConfig,

    /// Template search paths, one entry per application
    #[serde(default)]
    pub templates: Vec<TemplateSearchSpec>,

    /// Session configuration
    #[serde(default)]
    pub session: SessionConfig,
}

/// Service-level settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceConfig {
    /// Service name, also the application whose templates are served
    #[serde(default = "default_name")]
    pub name: String,

    /// HTTP port
    #[serde(default = "default_port")]
    pub port: u16,

    /// Log filter directive
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Layout applied when a handler does not pick one; empty for none
    #[serde(default)]
    pub default_layout: String,

    /// Whether to install the access-log hook
    #[serde(default = "default_true")]
    pub access_log: bool,

    /// Whether to install the session hook
    #[serde(default = "default_true")]
    pub sessions: bool,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            name: default_name(),
            port: default_port(),
            log_level: default_log_level(),
            default_layout: String::new(),
            access_log: true,
            sessions: true,
        }
    }
}

fn default_name() -> String {
    "quire".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_true() -> bool {
    true
}

const ENV_PREFIX: &str = "QUIRE_";

impl Config {
    /// Load configuration from all sources
    ///
    /// The service name is inferred from the binary name.
    pub fn load() -> Result<Self> {
        let service_name = std::env::current_exe()
            .ok()
            .and_then(|p| p.file_stem().map(|s| s.to_string_lossy().into_owned()))
            .unwrap_or_else(default_name);

        Self::load_for_service(&service_name)
    }

    /// Load configuration for a specific service name
    pub fn load_for_service(service_name: &str) -> Result<Self> {
        let config_paths = Self::find_config_paths(service_name);

        tracing::debug!("Searching for config files in order:");
        for path in &config_paths {
            tracing::debug!("  - {}", path.display());
        }

        let mut figment = Figment::new().merge(Serialized::defaults(Config::default()));

        // Lowest priority first so later files override earlier ones
        for path in config_paths.iter().rev() {
            if path.exists() {
                tracing::info!("Loading configuration from: {}", path.display());
                figment = figment.merge(Toml::file(path));
            }
        }

        figment = figment.merge(Env::prefixed(ENV_PREFIX).split("__"));

        Ok(figment.extract()?)
    }

    /// Load configuration from a specific file, still honouring environment overrides.
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self> {
        let config = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Toml::file(path.as_ref()))
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
            .extract()?;

        Ok(config)
    }

    /// Config file paths for a service, highest priority first.
    fn find_config_paths(service_name: &str) -> Vec<PathBuf> {
        vec![
            PathBuf::from("config.toml"),
            PathBuf::from("/etc/quire")
                .join(service_name)
                .join("config.toml"),
        ]
    }

    /// Template spec for the service's own application, if configured
    pub fn service_templates(&self) -> Option<&TemplateSearchSpec> {
        self.templates.iter().find(|t| t.name == self.service.name)
    }
}

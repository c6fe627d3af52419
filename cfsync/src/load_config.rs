/// `load_config` module: loads the YAML config file and injects API keys from the environment.
///
/// This module is the only place where untrusted YAML is parsed and mapped to typed structs.
///
/// # Responsibilities
/// - Parse the user's YAML file into [`CliConfig`]
/// - Resolve each instance's `api_key_env` into the actual key, so no secret has to live in the file
/// - Reject configs the pipeline cannot run with (duplicate instance names or base URLs, non-HTTP base URLs)
///
/// # Errors
/// All errors use `anyhow::Error` and surface at the CLI boundary.
use anyhow::Result;
use cfsync_core::cache::normalise_base_url;
use cfsync_core::config::SyncConfig;
use serde::Deserialize;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{error, info};

fn default_cache_dir() -> PathBuf {
    PathBuf::from(".cfsync-cache")
}

fn default_concurrency() -> usize {
    cfsync_core::persister::DEFAULT_CONCURRENCY
}

#[derive(Debug, Deserialize)]
pub struct CliConfig {
    /// Directories holding the guide's custom format JSON files.
    pub guide_paths: Vec<PathBuf>,
    #[serde(default = "default_cache_dir")]
    pub cache_dir: PathBuf,
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
    #[serde(default)]
    pub instances: Vec<InstanceSection>,
}

#[derive(Debug, Deserialize)]
pub struct InstanceSection {
    pub name: String,
    pub base_url: String,
    /// Name of the environment variable holding this instance's API key.
    pub api_key_env: String,
    #[serde(skip)]
    pub api_key: ApiKey,
    #[serde(flatten)]
    pub sync: SyncConfig,
}

/// An API key that never shows up in logs.
#[derive(Clone, Default)]
pub struct ApiKey(String);

impl ApiKey {
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for ApiKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ApiKey(len={})", self.0.len())
    }
}

/// Loads a YAML config file (no secrets) and injects API keys from the environment.
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<CliConfig> {
    let mut config = read_config(path)?;

    for instance in &mut config.instances {
        match std::env::var(&instance.api_key_env) {
            Ok(key) if !key.is_empty() => {
                info!(instance = %instance.name, env = %instance.api_key_env, "API key found in env");
                instance.api_key = ApiKey(key);
            }
            _ => {
                error!(instance = %instance.name, env = %instance.api_key_env, "API key environment variable not set");
                anyhow::bail!(
                    "{} environment variable not set (API key for instance {})",
                    instance.api_key_env,
                    instance.name
                );
            }
        }
    }

    info!(
        instances = config.instances.len(),
        guide_paths = config.guide_paths.len(),
        cache_dir = %config.cache_dir.display(),
        "Config loaded and merged successfully"
    );
    Ok(config)
}

/// Parses and validates the YAML config file without touching the environment.
pub fn read_config<P: AsRef<Path>>(path: P) -> Result<CliConfig> {
    let path_ref = path.as_ref();
    info!(config_path = ?path_ref, "Loading configuration from file");

    let config_content = match fs::read_to_string(path_ref) {
        Ok(content) => {
            info!(config_path = ?path_ref, "Config file read successfully");
            content
        }
        Err(e) => {
            error!(error = ?e, config_path = ?path_ref, "Failed to read config file");
            return Err(anyhow::anyhow!(
                "Failed to read config file {:?}: {}",
                path_ref,
                e
            ));
        }
    };

    let config: CliConfig = match serde_yaml::from_str(&config_content) {
        Ok(conf) => {
            info!(config_path = ?path_ref, "Parsed config YAML successfully");
            conf
        }
        Err(e) => {
            error!(error = ?e, config_path = ?path_ref, "Failed to parse config YAML");
            return Err(anyhow::anyhow!("Failed to parse config YAML: {e}"));
        }
    };

    if config.concurrency == 0 {
        anyhow::bail!("concurrency must be at least 1");
    }

    let mut seen = HashSet::new();
    let mut urls = HashMap::new();
    for instance in &config.instances {
        if !seen.insert(instance.name.clone()) {
            error!(instance = %instance.name, "Duplicate instance name in config");
            anyhow::bail!("Duplicate instance name: {}", instance.name);
        }
        // Instances on one base URL would share a remote and a cache file.
        if let Some(other) = urls.insert(normalise_base_url(&instance.base_url), &instance.name) {
            error!(instance = %instance.name, other = %other, base_url = %instance.base_url, "Duplicate base_url in config");
            anyhow::bail!(
                "Instances {} and {} share the base_url {}",
                other,
                instance.name,
                instance.base_url
            );
        }
        if !(instance.base_url.starts_with("http://") || instance.base_url.starts_with("https://"))
        {
            error!(instance = %instance.name, base_url = %instance.base_url, "Unsupported base_url");
            anyhow::bail!(
                "Instance {} has an invalid base_url (expected http:// or https://): {}",
                instance.name,
                instance.base_url
            );
        }
    }

    Ok(config)
}

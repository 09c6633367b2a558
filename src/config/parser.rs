use crate::config::types::{Config, ConfigOverrides};
use crate::config::validation::validate;
use crate::ConfigError;
use sha2::{Digest, Sha256};
use std::path::Path;

/// Loads and parses a configuration file from the given path
///
/// # Arguments
///
/// * `path` - Path to the TOML configuration file
///
/// # Returns
///
/// * `Ok(Config)` - Successfully loaded and validated configuration
/// * `Err(ConfigError)` - Failed to load, parse, or validate the configuration
///
/// # Example
///
/// ```no_run
/// use std::path::Path;
/// use metacrawl::config::load_config;
///
/// let config = load_config(Path::new("metacrawl.toml")).unwrap();
/// println!("Budget: {}", config.crawler.document_budget);
/// ```
pub fn load_config(path: &Path) -> Result<Config, ConfigError> {
    let config = parse_config(path)?;
    validate(&config)?;
    Ok(config)
}

/// Reads and parses a configuration file without validating it
///
/// Used where only part of the configuration matters, such as locating the
/// database for `--stats`.
pub fn parse_config(path: &Path) -> Result<Config, ConfigError> {
    let content = std::fs::read_to_string(path)?;
    let config: Config = toml::from_str(&content)?;
    Ok(config)
}

/// Computes a SHA-256 hash of the configuration file content
///
/// This is used to detect if the configuration has changed between crawl sessions.
///
/// # Returns
///
/// * `Ok(String)` - Hex-encoded SHA-256 hash of the file content
/// * `Err(ConfigError)` - Failed to read the file
pub fn compute_config_hash(path: &Path) -> Result<String, ConfigError> {
    let content = std::fs::read_to_string(path)?;
    Ok(hash_text(&content))
}

/// Loads a configuration and returns both the config and its hash
pub fn load_config_with_hash(path: &Path) -> Result<(Config, String), ConfigError> {
    let config = load_config(path)?;
    let hash = compute_config_hash(path)?;
    Ok((config, hash))
}

/// Builds the effective configuration from an optional file and CLI values
///
/// Without a file the defaults are used. Overrides are applied before
/// validation, so a file may omit the seeds that the command line provides.
/// The returned hash covers the file content and the overrides.
pub fn resolve_config(
    path: Option<&Path>,
    overrides: ConfigOverrides,
) -> Result<(Config, String), ConfigError> {
    let (mut config, file_content) = match path {
        Some(path) => (parse_config(path)?, std::fs::read_to_string(path)?),
        None => (Config::default(), String::new()),
    };

    let fingerprint = format!("{}\n{:?}", file_content, overrides);
    config.apply_overrides(overrides);
    validate(&config)?;

    Ok((config, hash_text(&fingerprint)))
}

fn hash_text(text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    hex::encode(hasher.finalize())
}

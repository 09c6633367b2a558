use crate::config::types::{Config, CrawlerConfig, OutputConfig, ScopeConfig, UserAgentConfig};
use crate::url::parse_seed;
use crate::ConfigError;
use url::{Host, Url};

/// Validates the entire configuration
pub fn validate(config: &Config) -> Result<(), ConfigError> {
    validate_crawler_config(&config.crawler)?;
    validate_user_agent_config(&config.user_agent)?;
    validate_output_config(&config.output)?;
    validate_scope_config(&config.scope)?;
    Ok(())
}

/// Validates crawler configuration
fn validate_crawler_config(config: &CrawlerConfig) -> Result<(), ConfigError> {
    if config.document_budget < 1 {
        return Err(ConfigError::Validation(
            "document_budget must be >= 1".to_string(),
        ));
    }

    if config.workers < 1 || config.workers > 100 {
        return Err(ConfigError::Validation(format!(
            "workers must be between 1 and 100, got {}",
            config.workers
        )));
    }

    if config.max_attempts < 1 || config.max_attempts > 20 {
        return Err(ConfigError::Validation(format!(
            "max_attempts must be between 1 and 20, got {}",
            config.max_attempts
        )));
    }

    if config.attempt_timeout_ms < 100 {
        return Err(ConfigError::Validation(format!(
            "attempt_timeout_ms must be >= 100ms, got {}ms",
            config.attempt_timeout_ms
        )));
    }

    if config.stale_threshold_secs < 1 {
        return Err(ConfigError::Validation(
            "stale_threshold_secs must be >= 1".to_string(),
        ));
    }

    // A live claim must never look stale, or a second worker takes it over
    let longest_claim_ms = u64::from(config.max_attempts)
        .saturating_mul(config.attempt_timeout_ms.saturating_add(config.retry_backoff_ms));
    if config.stale_threshold_secs.saturating_mul(1000) <= longest_claim_ms {
        return Err(ConfigError::Validation(format!(
            "stale_threshold_secs ({}s) must exceed max_attempts * (attempt_timeout_ms + retry_backoff_ms) ({}ms)",
            config.stale_threshold_secs, longest_claim_ms
        )));
    }

    if config.idle_backoff_ms < 1 {
        return Err(ConfigError::Validation(
            "idle_backoff_ms must be >= 1ms".to_string(),
        ));
    }

    Ok(())
}

/// Validates user agent configuration
fn validate_user_agent_config(config: &UserAgentConfig) -> Result<(), ConfigError> {
    if config.crawler_name.is_empty() {
        return Err(ConfigError::Validation(
            "crawler_name cannot be empty".to_string(),
        ));
    }

    if !config
        .crawler_name
        .chars()
        .all(|c| c.is_alphanumeric() || c == '-')
    {
        return Err(ConfigError::Validation(format!(
            "crawler_name must contain only alphanumeric characters and hyphens, got '{}'",
            config.crawler_name
        )));
    }

    Url::parse(&config.contact_url)
        .map_err(|e| ConfigError::InvalidUrl(format!("Invalid contact_url: {}", e)))?;

    validate_email(&config.contact_email)?;

    Ok(())
}

/// Validates output configuration
fn validate_output_config(config: &OutputConfig) -> Result<(), ConfigError> {
    if config.database_path.is_empty() {
        return Err(ConfigError::Validation(
            "database_path cannot be empty".to_string(),
        ));
    }

    if matches!(config.raw_content_dir.as_deref(), Some("")) {
        return Err(ConfigError::Validation(
            "raw_content_dir cannot be empty when set".to_string(),
        ));
    }

    Ok(())
}

/// Validates the seeds and the optional domain scope
fn validate_scope_config(config: &ScopeConfig) -> Result<(), ConfigError> {
    if config.seeds.is_empty() {
        return Err(ConfigError::Validation(
            "at least one seed URL is required".to_string(),
        ));
    }

    for seed in &config.seeds {
        parse_seed(seed)
            .map_err(|e| ConfigError::InvalidUrl(format!("Invalid seed URL '{}': {}", seed, e)))?;
    }

    if let Some(domain) = &config.domain {
        validate_domain_string(domain)?;
    }

    Ok(())
}

/// Validates a host name used as domain scope
///
/// The scope is compared with URL hosts exactly, so it must be a bare host:
/// no scheme, port, path or wildcard.
fn validate_domain_string(domain: &str) -> Result<(), ConfigError> {
    if domain.is_empty() {
        return Err(ConfigError::InvalidPattern(
            "Domain cannot be empty".to_string(),
        ));
    }

    if domain.contains(|c: char| matches!(c, '*' | '/' | ':' | '@') || c.is_whitespace()) {
        return Err(ConfigError::InvalidPattern(format!(
            "Domain '{}' must be a bare host name",
            domain
        )));
    }

    if domain.starts_with('.') || domain.ends_with('.') || domain.contains("..") {
        return Err(ConfigError::InvalidPattern(format!(
            "Domain '{}' has an empty label",
            domain
        )));
    }

    Host::parse(domain)
        .map(|_| ())
        .map_err(|e| ConfigError::InvalidPattern(format!("Domain '{}': {}", domain, e)))
}

/// Basic email validation: one `@` with a dotted domain after it
fn validate_email(email: &str) -> Result<(), ConfigError> {
    let Some((local, domain)) = email.split_once('@') else {
        return Err(ConfigError::Validation(format!(
            "contact_email must be an email address, got '{}'",
            email
        )));
    };

    if local.is_empty() || domain.is_empty() || domain.contains('@') || !domain.contains('.') {
        return Err(ConfigError::Validation(format!(
            "Invalid contact_email: '{}'",
            email
        )));
    }

    Ok(())
}

use crate::config::types::{Config, RetryPolicy, ScrapeMode, ScraperConfig, UserAgentConfig};
use crate::ConfigError;
use url::Url;

/// Upper bound on the worker pool size
const MAX_CONCURRENCY: usize = 256;

/// Validates the entire configuration, including the seed list
pub fn validate(config: &Config) -> Result<(), ConfigError> {
    validate_scraper_config(&config.scraper)?;
    validate_user_agent_config(&config.user_agent)?;
    validate_seeds(&config.seeds)?;
    Ok(())
}

/// Validates a run configuration snapshot
///
/// This is called by the engine before any fetch happens, so an invalid
/// snapshot never starts a run.
pub fn validate_scraper_config(config: &ScraperConfig) -> Result<(), ConfigError> {
    if config.concurrency_limit < 1 || config.concurrency_limit > MAX_CONCURRENCY {
        return Err(ConfigError::Validation(format!(
            "concurrency_limit must be between 1 and {}, got {}",
            MAX_CONCURRENCY, config.concurrency_limit
        )));
    }

    if !config.rate_limit.is_finite() || config.rate_limit <= 0.0 {
        return Err(ConfigError::Validation(format!(
            "rate_limit must be a positive number of requests per second, got {}",
            config.rate_limit
        )));
    }

    if config.rate_limit_burst < 1 {
        return Err(ConfigError::Validation(
            "rate_limit_burst must be >= 1".to_string(),
        ));
    }

    if config.timeout_ms < 1 {
        return Err(ConfigError::Validation(
            "timeout_ms must be >= 1".to_string(),
        ));
    }

    if config.max_pages == Some(0) {
        return Err(ConfigError::Validation(
            "max_pages must be >= 1 when set".to_string(),
        ));
    }

    if config.deadline_secs == Some(0) {
        return Err(ConfigError::Validation(
            "deadline_secs must be >= 1 when set".to_string(),
        ));
    }

    if config.mode == ScrapeMode::Sitemap && config.max_depth < 1 {
        return Err(ConfigError::Validation(
            "sitemap mode places entries at depth 1, so max_depth must be >= 1".to_string(),
        ));
    }

    if config.output_buffer < 1 {
        return Err(ConfigError::Validation(
            "output_buffer must be >= 1".to_string(),
        ));
    }

    validate_retry_policy(&config.retry)?;

    for pattern in &config.allowed_domains {
        validate_domain_pattern(pattern)?;
    }

    config.header_map()?;

    Ok(())
}

/// Validates retry settings
fn validate_retry_policy(policy: &RetryPolicy) -> Result<(), ConfigError> {
    if policy.max_attempts < 1 {
        return Err(ConfigError::Validation(
            "retry.max_attempts must be >= 1".to_string(),
        ));
    }

    if policy.base_delay_ms > policy.max_delay_ms {
        return Err(ConfigError::Validation(format!(
            "retry.base_delay_ms ({}) cannot exceed retry.max_delay_ms ({})",
            policy.base_delay_ms, policy.max_delay_ms
        )));
    }

    if !(0.0..=1.0).contains(&policy.jitter) {
        return Err(ConfigError::Validation(format!(
            "retry.jitter must be within [0, 1], got {}",
            policy.jitter
        )));
    }

    if let Some(statuses) = &policy.retryable_statuses {
        if let Some(bad) = statuses.iter().find(|s| !(100..=599).contains(*s)) {
            return Err(ConfigError::Validation(format!(
                "retry.retryable_statuses contains invalid status {}",
                bad
            )));
        }
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

/// Validates seed URLs: at least one, all absolute http(s)
pub fn validate_seeds<S: AsRef<str>>(seeds: &[S]) -> Result<(), ConfigError> {
    if seeds.is_empty() {
        return Err(ConfigError::Validation(
            "at least one seed URL is required".to_string(),
        ));
    }

    for seed in seeds {
        let seed = seed.as_ref();
        let url = Url::parse(seed)
            .map_err(|e| ConfigError::InvalidUrl(format!("Invalid seed URL '{}': {}", seed, e)))?;

        if url.scheme() != "http" && url.scheme() != "https" {
            return Err(ConfigError::Validation(format!(
                "Seed URL '{}' must use http or https",
                seed
            )));
        }
    }

    Ok(())
}

/// Validates a domain pattern (supports wildcards)
fn validate_domain_pattern(pattern: &str) -> Result<(), ConfigError> {
    if pattern.is_empty() {
        return Err(ConfigError::InvalidPattern(
            "Domain pattern cannot be empty".to_string(),
        ));
    }

    match pattern.strip_prefix("*.") {
        Some(domain) => validate_domain_string(domain),
        None => validate_domain_string(pattern),
    }
}

/// Validates a domain string (without wildcard prefix)
fn validate_domain_string(domain: &str) -> Result<(), ConfigError> {
    if domain.is_empty() {
        return Err(ConfigError::InvalidPattern(
            "Domain cannot be empty".to_string(),
        ));
    }

    if !domain
        .chars()
        .all(|c| c.is_alphanumeric() || c == '.' || c == '-')
    {
        return Err(ConfigError::InvalidPattern(format!(
            "Domain '{}' contains invalid characters",
            domain
        )));
    }

    if domain.starts_with('.')
        || domain.ends_with('.')
        || domain.starts_with('-')
        || domain.ends_with('-')
    {
        return Err(ConfigError::InvalidPattern(format!(
            "Domain '{}' cannot start or end with '.' or '-'",
            domain
        )));
    }

    if domain.contains("..") {
        return Err(ConfigError::InvalidPattern(format!(
            "Domain '{}' cannot contain consecutive dots",
            domain
        )));
    }

    // "localhost" is the one dotless host allowed
    if !domain.contains('.') && domain != "localhost" {
        return Err(ConfigError::InvalidPattern(format!(
            "Domain '{}' must contain at least one dot (e.g., 'example.com')",
            domain
        )));
    }

    Ok(())
}

/// Basic email validation
fn validate_email(email: &str) -> Result<(), ConfigError> {
    if email.is_empty() {
        return Err(ConfigError::Validation(
            "contact_email cannot be empty".to_string(),
        ));
    }

    let parts: Vec<&str> = email.split('@').collect();
    if parts.len() != 2 || parts[0].is_empty() || parts[1].is_empty() {
        return Err(ConfigError::Validation(format!(
            "Invalid email format: '{}'",
            email
        )));
    }

    if !parts[1].contains('.') {
        return Err(ConfigError::Validation(format!(
            "Invalid email domain: '{}'",
            email
        )));
    }

    Ok(())
}

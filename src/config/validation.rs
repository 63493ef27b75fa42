use crate::config::types::{
    Config, HarvestConfig, RetryConfig, SeriesEntry, SourceEntry, StorageConfig,
};
use crate::model::EpisodeKey;
use crate::ConfigError;
use regex::Regex;
use scraper::Selector;
use std::collections::HashSet;
use url::Url;

/// Validates the entire configuration
pub fn validate(config: &Config) -> Result<(), ConfigError> {
    validate_harvest_config(&config.harvest)?;
    validate_retry_config(&config.retry)?;
    validate_storage_config(&config.storage)?;
    validate_sources(&config.sources)?;
    validate_series(config)?;
    Ok(())
}

/// Validates engine concurrency ceilings
fn validate_harvest_config(config: &HarvestConfig) -> Result<(), ConfigError> {
    if config.page_concurrency < 1 || config.page_concurrency > 32 {
        return Err(ConfigError::Validation(format!(
            "page_concurrency must be between 1 and 32, got {}",
            config.page_concurrency
        )));
    }

    if config.series_concurrency < 1 || config.series_concurrency > 16 {
        return Err(ConfigError::Validation(format!(
            "series_concurrency must be between 1 and 16, got {}",
            config.series_concurrency
        )));
    }

    Ok(())
}

/// Validates retry policy bounds
fn validate_retry_config(config: &RetryConfig) -> Result<(), ConfigError> {
    if config.max_attempts < 1 {
        return Err(ConfigError::Validation(format!(
            "max_attempts must be >= 1, got {}",
            config.max_attempts
        )));
    }

    if config.max_backoff_ms < config.initial_backoff_ms {
        return Err(ConfigError::Validation(format!(
            "max_backoff_ms ({}) must be >= initial_backoff_ms ({})",
            config.max_backoff_ms, config.initial_backoff_ms
        )));
    }

    Ok(())
}

/// Validates storage locations
fn validate_storage_config(config: &StorageConfig) -> Result<(), ConfigError> {
    if config.database_path.is_empty() {
        return Err(ConfigError::Validation(
            "database_path cannot be empty".to_string(),
        ));
    }

    if config.library_root.is_empty() {
        return Err(ConfigError::Validation(
            "library_root cannot be empty".to_string(),
        ));
    }

    Ok(())
}

/// Validates source adapters: unique domains, parseable selectors and patterns
fn validate_sources(sources: &[SourceEntry]) -> Result<(), ConfigError> {
    let mut seen = HashSet::new();

    for source in sources {
        validate_domain_string(&source.domain)?;

        if !seen.insert(source.domain.to_ascii_lowercase()) {
            return Err(ConfigError::Validation(format!(
                "Source domain '{}' is declared more than once",
                source.domain
            )));
        }

        validate_selector(&source.page_selector)?;
        if let Some(next) = &source.next_selector {
            validate_selector(next)?;
        }

        if source.page_attribute.trim().is_empty() {
            return Err(ConfigError::Validation(format!(
                "page_attribute of source '{}' cannot be empty",
                source.domain
            )));
        }

        validate_episode_pattern(&source.episode_pattern)?;
    }

    Ok(())
}

/// Validates series subscriptions against the declared sources
fn validate_series(config: &Config) -> Result<(), ConfigError> {
    let mut seen = HashSet::new();

    for series in &config.series {
        validate_series_name(&series.name)?;

        if !seen.insert(series.name.as_str()) {
            return Err(ConfigError::Validation(format!(
                "Series '{}' is declared more than once",
                series.name
            )));
        }

        if config.source_for(&series.domain).is_none() {
            return Err(ConfigError::Validation(format!(
                "Series '{}' uses domain '{}' which has no [[source]] entry",
                series.name, series.domain
            )));
        }

        validate_start(series)?;
    }

    Ok(())
}

/// Checks that a series can be renamed from `old` to `new`
///
/// The configuration must already declare the series under its new name.
/// Otherwise the next run would subscribe `old` again from its start URL and
/// harvest the whole chain a second time.
pub fn validate_rename(config: &Config, old: &str, new: &str) -> Result<(), ConfigError> {
    validate_series_name(new)?;

    if old == new {
        return Err(ConfigError::Validation(format!(
            "Series '{}' already has that name",
            old
        )));
    }

    if config.series.iter().any(|s| s.name == old) {
        return Err(ConfigError::Validation(format!(
            "Rename the [[series]] entry '{}' to '{}' in the configuration first",
            old, new
        )));
    }

    Ok(())
}

/// Series names become directory names, so they must be a single path segment
fn validate_series_name(name: &str) -> Result<(), ConfigError> {
    if name.trim().is_empty() {
        return Err(ConfigError::Validation(
            "Series name cannot be empty".to_string(),
        ));
    }

    if name == "." || name == ".." || name.contains(['/', '\\', '\0']) {
        return Err(ConfigError::Validation(format!(
            "Series name '{}' must be a plain directory name",
            name
        )));
    }

    Ok(())
}

fn validate_start(series: &SeriesEntry) -> Result<(), ConfigError> {
    let url = Url::parse(&series.start_url).map_err(|e| {
        ConfigError::InvalidUrl(format!(
            "Invalid start_url '{}' for series '{}': {}",
            series.start_url, series.name, e
        ))
    })?;

    if url.scheme() != "http" && url.scheme() != "https" {
        return Err(ConfigError::InvalidUrl(format!(
            "start_url '{}' must use http or https",
            series.start_url
        )));
    }

    if EpisodeKey::parse(&series.start_episode).is_none() {
        return Err(ConfigError::Validation(format!(
            "Invalid start_episode '{}' for series '{}'",
            series.start_episode, series.name
        )));
    }

    Ok(())
}

fn validate_selector(selector: &str) -> Result<(), ConfigError> {
    Selector::parse(selector)
        .map(|_| ())
        .map_err(|e| ConfigError::InvalidSelector(format!("'{}': {}", selector, e)))
}

fn validate_episode_pattern(pattern: &str) -> Result<(), ConfigError> {
    let regex = Regex::new(pattern)
        .map_err(|e| ConfigError::InvalidPattern(format!("'{}': {}", pattern, e)))?;

    // captures_len counts the implicit whole-match group
    if regex.captures_len() < 2 {
        return Err(ConfigError::InvalidPattern(format!(
            "'{}' must contain a capture group for the episode marker",
            pattern
        )));
    }

    Ok(())
}

/// Validates a host name
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

    Ok(())
}

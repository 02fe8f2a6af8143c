use std::path::Path;

use crate::config::schema::Config;
use crate::error::ConfigError;
use crate::extraction::StrategyLadder;

pub fn load_config<P: AsRef<Path>>(path: P) -> Result<Config, ConfigError> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadFile {
        path: path.to_path_buf(),
        source: e,
    })?;

    load_config_from_str(&content)
}

pub fn load_config_from_str(content: &str) -> Result<Config, ConfigError> {
    let config: Config = serde_json::from_str(content)?;

    validate_config(&config)?;

    Ok(config)
}

pub fn validate_config(config: &Config) -> Result<(), ConfigError> {
    if config.cache.ttl_secs == 0 {
        return Err(invalid("cache.ttl_secs must be greater than zero"));
    }

    if config.cache.sweep_interval_secs == 0 {
        return Err(invalid("cache.sweep_interval_secs must be greater than zero"));
    }

    if config.extraction.attempt_timeout_secs == 0 {
        return Err(invalid(
            "extraction.attempt_timeout_secs must be greater than zero",
        ));
    }

    // An artifact must not become eligible for sweeping while the ladder
    // that produces it can still be running.
    let rungs = StrategyLadder::from_config(&config.extraction).len() as u64;
    let max_extraction_secs = config.extraction.attempt_timeout_secs.saturating_mul(rungs);
    if config.cache.ttl_secs <= max_extraction_secs {
        return Err(invalid(format!(
            "cache.ttl_secs ({}) must exceed the longest extraction, {} attempts of {}s ({}s)",
            config.cache.ttl_secs,
            rungs,
            config.extraction.attempt_timeout_secs,
            max_extraction_secs
        )));
    }

    if config.extraction.binary.trim().is_empty() {
        return Err(invalid("extraction.binary must not be empty"));
    }

    for (tier, tuning) in [
        ("primary", &config.extraction.primary),
        ("fallback", &config.extraction.fallback),
    ] {
        if tuning.format_selector.trim().is_empty() {
            return Err(invalid(format!(
                "extraction.{}.format_selector must not be empty",
                tier
            )));
        }
    }

    if let Some(browser) = &config.extraction.primary_browser {
        if browser.trim().is_empty() {
            return Err(invalid("extraction.primary_browser must not be empty"));
        }
    }

    let mut seen = std::collections::HashSet::new();
    for browser in &config.extraction.fallback_browsers {
        if browser.trim().is_empty() {
            return Err(invalid("extraction.fallback_browsers contains an empty name"));
        }
        if !seen.insert(browser.to_ascii_lowercase()) {
            return Err(invalid(format!(
                "extraction.fallback_browsers lists '{}' twice",
                browser
            )));
        }
    }

    if config.jobs.max_concurrent_extractions == 0 {
        return Err(invalid("jobs.max_concurrent_extractions must be at least 1"));
    }

    if config.jobs.retention_secs == 0 {
        return Err(invalid("jobs.retention_secs must be greater than zero"));
    }

    if config.logging.level.trim().is_empty() {
        return Err(invalid("logging.level must not be empty"));
    }

    Ok(())
}

fn invalid(message: impl Into<String>) -> ConfigError {
    ConfigError::Validation {
        message: message.into(),
    }
}

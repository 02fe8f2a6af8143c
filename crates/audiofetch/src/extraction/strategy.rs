use std::path::PathBuf;
use std::time::Duration;

use crate::config::{ExtractionConfig, TuningConfig};

/// Where the downloader gets authentication cookies from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CredentialSource {
    /// Read the cookie store of a locally installed browser.
    Browser(String),
    /// Read an exported Netscape cookie file.
    CookieFile(PathBuf),
}

/// One rung of the ladder: the full set of options for a single attempt.
#[derive(Debug, Clone, PartialEq)]
pub struct ExtractionStrategy {
    pub name: String,
    pub format_selector: String,
    pub credentials: Option<CredentialSource>,
    pub socket_timeout: Duration,
    pub retries: u32,
    pub force_ipv4: bool,
}

impl ExtractionStrategy {
    fn from_tuning(
        name: impl Into<String>,
        tuning: &TuningConfig,
        credentials: Option<CredentialSource>,
        force_ipv4: bool,
    ) -> Self {
        Self {
            name: name.into(),
            format_selector: tuning.format_selector.clone(),
            credentials,
            socket_timeout: tuning.socket_timeout(),
            retries: tuning.retries,
            force_ipv4,
        }
    }
}

/// Ordered, finite list of strategies tried until one succeeds.
#[derive(Debug, Clone)]
pub struct StrategyLadder {
    steps: Vec<ExtractionStrategy>,
}

impl StrategyLadder {
    pub fn new(steps: Vec<ExtractionStrategy>) -> Self {
        Self { steps }
    }

    /// Primary strategy first, then one step per fallback browser, then an
    /// anonymous step when enabled.
    pub fn from_config(config: &ExtractionConfig) -> Self {
        let primary_credentials = match (&config.cookies_file, &config.primary_browser) {
            (Some(file), _) => Some(CredentialSource::CookieFile(file.clone())),
            (None, Some(browser)) => Some(CredentialSource::Browser(browser.clone())),
            (None, None) => None,
        };

        let mut steps = vec![ExtractionStrategy::from_tuning(
            "primary",
            &config.primary,
            primary_credentials.clone(),
            config.force_ipv4,
        )];

        for browser in &config.fallback_browsers {
            let credentials = Some(CredentialSource::Browser(browser.clone()));
            // Skip a rung that would repeat the primary credentials.
            if credentials == primary_credentials && config.fallback == config.primary {
                continue;
            }
            steps.push(ExtractionStrategy::from_tuning(
                format!("browser:{}", browser),
                &config.fallback,
                credentials,
                config.force_ipv4,
            ));
        }

        if config.anonymous_fallback {
            steps.push(ExtractionStrategy::from_tuning(
                "anonymous",
                &config.fallback,
                None,
                config.force_ipv4,
            ));
        }

        Self { steps }
    }

    pub fn steps(&self) -> &[ExtractionStrategy] {
        &self.steps
    }

    pub fn iter(&self) -> std::slice::Iter<'_, ExtractionStrategy> {
        self.steps.iter()
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_ladder_order() {
        let ladder = StrategyLadder::from_config(&ExtractionConfig::default());
        let names: Vec<&str> = ladder.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(
            names,
            vec![
                "primary",
                "browser:firefox",
                "browser:edge",
                "browser:safari",
                "browser:brave",
                "browser:opera",
                "anonymous",
            ]
        );
    }

    #[test]
    fn test_primary_uses_primary_tuning() {
        let config = ExtractionConfig::default();
        let ladder = StrategyLadder::from_config(&config);
        let primary = &ladder.steps()[0];
        assert_eq!(primary.format_selector, config.primary.format_selector);
        assert_eq!(primary.retries, config.primary.retries);
        assert_eq!(
            primary.credentials,
            Some(CredentialSource::Browser("chrome".to_string()))
        );
    }

    #[test]
    fn test_fallbacks_use_relaxed_tuning() {
        let config = ExtractionConfig::default();
        let ladder = StrategyLadder::from_config(&config);
        for step in &ladder.steps()[1..] {
            assert_eq!(step.format_selector, config.fallback.format_selector);
            assert_eq!(step.socket_timeout, config.fallback.socket_timeout());
            assert_eq!(step.retries, config.fallback.retries);
        }
        assert_eq!(ladder.steps().last().unwrap().credentials, None);
    }

    #[test]
    fn test_cookie_file_overrides_primary_browser() {
        let config = ExtractionConfig {
            cookies_file: Some(PathBuf::from("/etc/cookies.txt")),
            ..ExtractionConfig::default()
        };
        let ladder = StrategyLadder::from_config(&config);
        assert_eq!(
            ladder.steps()[0].credentials,
            Some(CredentialSource::CookieFile(PathBuf::from("/etc/cookies.txt")))
        );
    }

    #[test]
    fn test_without_fallbacks() {
        let config = ExtractionConfig {
            fallback_browsers: Vec::new(),
            anonymous_fallback: false,
            ..ExtractionConfig::default()
        };
        let ladder = StrategyLadder::from_config(&config);
        assert_eq!(ladder.len(), 1);
        assert!(!ladder.is_empty());
    }
}

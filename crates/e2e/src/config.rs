//! Runner configuration

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::E2eResult;

/// Top-level runner configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RunnerConfig {
    /// Directory that receives `test-report-*.json` files
    pub output_dir: PathBuf,

    /// Scenario file to run; the bundled scenario when unset
    pub scenario: Option<PathBuf>,

    /// Readiness cascade budgets
    pub readiness: ReadinessConfig,

    /// Browser bridge settings
    pub playwright: PlaywrightConfig,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("test-results"),
            scenario: None,
            readiness: ReadinessConfig::default(),
            playwright: PlaywrightConfig::default(),
        }
    }
}

impl RunnerConfig {
    /// Load configuration from file, falling back to defaults when absent
    pub fn load(path: &Path) -> E2eResult<Self> {
        if path.exists() {
            let content = std::fs::read_to_string(path)?;
            let config: Self = toml::from_str(&content)?;
            Ok(config)
        } else {
            Ok(Self::default())
        }
    }
}

/// Budgets for the readiness cascade, in milliseconds
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReadinessConfig {
    /// Overall ceiling used when a step does not name its own
    pub max_timeout_ms: u64,

    /// Cap for the `domcontentloaded` stage
    pub dom_content_timeout_ms: u64,

    /// Cap for the `networkidle` stage
    pub network_idle_timeout_ms: u64,

    /// Floor used when halving the remaining budget for the fallback poll
    pub min_fallback_ms: u64,

    /// Cap for the trailing settle sleep
    pub settle_cap_ms: u64,

    /// Expression polled by the fallback stage
    pub ready_expression: String,
}

impl Default for ReadinessConfig {
    fn default() -> Self {
        Self {
            max_timeout_ms: 100_000,
            dom_content_timeout_ms: 30_000,
            network_idle_timeout_ms: 20_000,
            min_fallback_ms: 10_000,
            settle_cap_ms: 5_000,
            ready_expression:
                "document.readyState === 'complete' || document.readyState === 'interactive'"
                    .to_string(),
        }
    }
}

impl ReadinessConfig {
    pub fn max_timeout(&self) -> Duration {
        Duration::from_millis(self.max_timeout_ms)
    }
}

/// Which Node library hosts the page
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    /// Stagehand on top of Playwright; supports observe/act
    #[default]
    Stagehand,
    /// Bare Playwright; observe/act are unavailable
    Playwright,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Browser {
    #[default]
    Chromium,
    Firefox,
    Webkit,
}

impl Browser {
    pub fn as_str(&self) -> &'static str {
        match self {
            Browser::Chromium => "chromium",
            Browser::Firefox => "firefox",
            Browser::Webkit => "webkit",
        }
    }
}

/// Configuration for the Playwright bridge process
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PlaywrightConfig {
    pub node_binary: PathBuf,
    pub backend: Backend,
    pub browser: Browser,
    pub headless: bool,
    pub viewport_width: u32,
    pub viewport_height: u32,

    /// Stagehand DOM settle timeout
    pub dom_settle_timeout_ms: u64,

    /// Model used by Stagehand for observe/act
    pub model_name: String,

    /// Environment variable holding the model API key
    pub api_key_env: String,

    /// How long to wait for the bridge to report ready
    pub startup_timeout_ms: u64,

    /// Extra time granted on top of each request's own timeout
    pub request_grace_ms: u64,
}

impl Default for PlaywrightConfig {
    fn default() -> Self {
        Self {
            node_binary: PathBuf::from("node"),
            backend: Backend::Stagehand,
            browser: Browser::Chromium,
            headless: false,
            viewport_width: 1024,
            viewport_height: 768,
            dom_settle_timeout_ms: 60_000,
            model_name: "anthropic/claude-3-7-sonnet-20250219".to_string(),
            api_key_env: "ANTHROPIC_API_KEY".to_string(),
            startup_timeout_ms: 60_000,
            request_grace_ms: 5_000,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = RunnerConfig::load(&dir.path().join("absent.toml")).unwrap();
        assert_eq!(config.readiness.max_timeout_ms, 100_000);
        assert_eq!(config.output_dir, PathBuf::from("test-results"));
        assert!(config.scenario.is_none());
    }

    #[test]
    fn test_partial_file_keeps_other_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pagerun.toml");
        std::fs::write(
            &path,
            r#"
output_dir = "reports"
scenario = "flows/checkout.yaml"

[readiness]
network_idle_timeout_ms = 5000

[playwright]
backend = "playwright"
headless = true
"#,
        )
        .unwrap();

        let config = RunnerConfig::load(&path).unwrap();
        assert_eq!(config.output_dir, PathBuf::from("reports"));
        assert_eq!(config.scenario, Some(PathBuf::from("flows/checkout.yaml")));
        assert_eq!(config.readiness.network_idle_timeout_ms, 5_000);
        assert_eq!(config.readiness.dom_content_timeout_ms, 30_000);
        assert_eq!(config.playwright.backend, Backend::Playwright);
        assert!(config.playwright.headless);
        assert_eq!(config.playwright.viewport_width, 1024);
    }

    #[test]
    fn test_malformed_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.toml");
        std::fs::write(&path, "readiness = 3").unwrap();
        assert!(RunnerConfig::load(&path).is_err());
    }
}

//! Declarative YAML scenario specification

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::browser::{LoadState, Locator, WaitState};
use crate::error::{E2eError, E2eResult};

/// A complete scenario parsed from YAML
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Scenario {
    /// Name recorded as the report's test name
    pub name: String,

    /// Target page, recorded in the report
    #[serde(default)]
    pub url: Option<String>,

    /// Human-readable description
    #[serde(default)]
    pub description: String,

    /// Steps to execute in order
    pub steps: Vec<ScenarioStep>,
}

/// A single scripted step
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum ScenarioStep {
    /// Navigate to a URL
    Navigate {
        url: String,
        #[serde(default)]
        wait_until: LoadState,
        #[serde(default = "default_navigate_timeout")]
        timeout_ms: u64,
    },

    /// Resolve a natural-language instruction into an action, without performing it
    Observe { instruction: String },

    /// Perform the last observed action (or resolve `instruction` first)
    Act {
        #[serde(default)]
        instruction: Option<String>,
    },

    /// Run the readiness cascade
    AwaitReady {
        #[serde(default)]
        timeout_ms: Option<u64>,
    },

    /// Wait for an element to reach a state
    WaitFor {
        selector: String,
        #[serde(default)]
        frame: Option<String>,
        #[serde(default)]
        state: WaitState,
        #[serde(default = "default_element_timeout")]
        timeout_ms: u64,
    },

    /// Fill an input field
    Fill {
        selector: String,
        #[serde(default)]
        frame: Option<String>,
        value: String,
        #[serde(default = "default_element_timeout")]
        timeout_ms: u64,
    },

    /// Wait for a fixed amount of time (use sparingly)
    Sleep { ms: u64 },

    /// Log a message
    Log { message: String },
}

fn default_navigate_timeout() -> u64 {
    60_000
}

fn default_element_timeout() -> u64 {
    30_000
}

impl ScenarioStep {
    /// Description recorded for this step in the report
    pub fn describe(&self) -> String {
        match self {
            ScenarioStep::Navigate { url, .. } => format!("Navigate to {}", url),
            ScenarioStep::Observe { instruction } => format!("Observe: {}", instruction),
            ScenarioStep::Act { instruction: Some(i) } => format!("Act: {}", i),
            ScenarioStep::Act { instruction: None } => "Act on observed action".to_string(),
            ScenarioStep::AwaitReady { .. } => "Wait for page readiness".to_string(),
            ScenarioStep::WaitFor { selector, frame, state, .. } => {
                format!("Wait for {} to be {}", locator(selector, frame), state.as_str())
            }
            ScenarioStep::Fill { selector, frame, .. } => {
                format!("Fill {}", locator(selector, frame))
            }
            ScenarioStep::Sleep { ms } => format!("Sleep {}ms", ms),
            ScenarioStep::Log { message } => {
                format!("Log: {}", message.chars().take(30).collect::<String>())
            }
        }
    }
}

pub(crate) fn locator(selector: &str, frame: &Option<String>) -> Locator {
    let locator = Locator::new(selector);
    match frame {
        Some(f) => locator.in_frame(f.clone()),
        None => locator,
    }
}

/// The iframe practice flow shipped with the binary.
pub const BUNDLED_SCENARIO: &str = include_str!("../scenarios/iframe_practice.yaml");

impl Scenario {
    /// Parse a scenario from YAML string
    pub fn from_yaml(yaml: &str) -> E2eResult<Self> {
        let scenario: Self = serde_yaml::from_str(yaml)?;
        scenario.validate()?;
        Ok(scenario)
    }

    /// Parse a scenario from a YAML file
    pub fn from_file(path: &Path) -> E2eResult<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    pub fn bundled() -> E2eResult<Self> {
        Self::from_yaml(BUNDLED_SCENARIO)
    }

    /// Load `path` when given, otherwise the bundled scenario.
    pub fn load(path: Option<&Path>) -> E2eResult<Self> {
        match path {
            Some(path) => Self::from_file(path),
            None => Self::bundled(),
        }
    }

    fn validate(&self) -> E2eResult<()> {
        if self.name.trim().is_empty() {
            return Err(E2eError::SpecParse("scenario name is empty".into()));
        }
        if self.steps.is_empty() {
            return Err(E2eError::SpecParse(format!("scenario '{}' has no steps", self.name)));
        }
        Ok(())
    }
}

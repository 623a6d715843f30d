//! Collaborator interface to the browser session
//!
//! The runner never automates a browser itself. Everything it needs from the
//! live page goes through the traits in this module:
//!
//! - [`PageHandle`]: load-state primitives the readiness cascade consumes
//! - [`BrowserDriver`]: navigation, element lookup and typed input
//! - [`ActionResolver`]: natural-language instruction to replayable action
//!
//! [`crate::playwright::PlaywrightSession`] implements all three.

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::E2eResult;

/// Page load signals, named the way Playwright names them.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LoadState {
    Load,
    #[default]
    DomContentLoaded,
    NetworkIdle,
}

impl LoadState {
    pub fn as_str(&self) -> &'static str {
        match self {
            LoadState::Load => "load",
            LoadState::DomContentLoaded => "domcontentloaded",
            LoadState::NetworkIdle => "networkidle",
        }
    }
}

impl fmt::Display for LoadState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Element state to wait for when locating.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WaitState {
    #[default]
    Visible,
    Hidden,
    Attached,
    Detached,
}

impl WaitState {
    pub fn as_str(&self) -> &'static str {
        match self {
            WaitState::Visible => "visible",
            WaitState::Hidden => "hidden",
            WaitState::Attached => "attached",
            WaitState::Detached => "detached",
        }
    }
}

/// Options for [`BrowserDriver::navigate`].
#[derive(Debug, Clone, Copy)]
pub struct NavigateOptions {
    pub wait_until: LoadState,
    pub timeout: Duration,
}

impl Default for NavigateOptions {
    fn default() -> Self {
        Self {
            wait_until: LoadState::DomContentLoaded,
            timeout: Duration::from_secs(60),
        }
    }
}

/// A selector, optionally scoped to an iframe.
///
/// `frame` is itself a selector for the `<iframe>` element; the target
/// selector is then resolved inside that frame's document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Locator {
    pub selector: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub frame: Option<String>,
}

impl Locator {
    pub fn new(selector: impl Into<String>) -> Self {
        Self {
            selector: selector.into(),
            frame: None,
        }
    }

    pub fn in_frame(mut self, frame: impl Into<String>) -> Self {
        self.frame = Some(frame.into());
        self
    }
}

impl fmt::Display for Locator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.frame {
            Some(frame) => write!(f, "{} >> {}", frame, self.selector),
            None => f.write_str(&self.selector),
        }
    }
}

/// Opaque reference to an element the driver located.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ElementHandle {
    id: String,
    locator: Locator,
}

impl ElementHandle {
    pub fn new(id: impl Into<String>, locator: Locator) -> Self {
        Self {
            id: id.into(),
            locator,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn locator(&self) -> &Locator {
        &self.locator
    }
}

/// A concrete, replayable action resolved from a natural-language
/// instruction. Performing it involves no further inference.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionDescriptor {
    pub description: String,
    pub method: String,
    pub selector: String,
    #[serde(default)]
    pub arguments: Vec<String>,
}

/// Load-state primitives of a live page.
#[async_trait]
pub trait PageHandle: Send + Sync {
    /// Resolve once the page has reached `state`, or fail after `timeout`.
    async fn wait_for_load_state(&self, state: LoadState, timeout: Duration) -> E2eResult<()>;

    /// Poll a JavaScript expression in the page until it is truthy.
    async fn wait_for_function(&self, expression: &str, timeout: Duration) -> E2eResult<()>;

    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// Navigation and element interaction.
#[async_trait]
pub trait BrowserDriver: PageHandle {
    async fn navigate(&self, url: &str, options: NavigateOptions) -> E2eResult<()>;

    async fn locate_and_wait(
        &self,
        locator: &Locator,
        state: WaitState,
        timeout: Duration,
    ) -> E2eResult<ElementHandle>;

    async fn fill_field(&self, locator: &Locator, value: &str, timeout: Duration) -> E2eResult<()>;
}

/// AI-assisted element resolution.
#[async_trait]
pub trait ActionResolver: Send + Sync {
    /// Resolve an instruction into a descriptor without performing it.
    async fn resolve_and_preview(&self, instruction: &str) -> E2eResult<ActionDescriptor>;

    /// Execute a previously resolved descriptor.
    async fn perform_action(&self, action: &ActionDescriptor) -> E2eResult<()>;
}

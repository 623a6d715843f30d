//! In-memory browser double for driving scenarios without a real browser

use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use pagerun_e2e::browser::{
    ActionDescriptor, ActionResolver, BrowserDriver, ElementHandle, LoadState, Locator,
    NavigateOptions, PageHandle, WaitState,
};
use pagerun_e2e::{E2eError, E2eResult};

/// Records every collaborator call and fails the `fail_at`-th action call.
///
/// Readiness primitives succeed immediately and are not counted.
#[derive(Default)]
pub struct ScriptedBrowser {
    calls: Mutex<Vec<String>>,
    fail_at: Option<usize>,
}

impl ScriptedBrowser {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing_at(call: usize) -> Self {
        Self {
            fail_at: Some(call),
            ..Self::default()
        }
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    fn record(&self, call: String) -> E2eResult<()> {
        let mut calls = self.calls.lock().unwrap();
        let index = calls.len();
        calls.push(call.clone());
        if self.fail_at == Some(index) {
            return Err(E2eError::timeout(call, Duration::from_secs(60)));
        }
        Ok(())
    }
}

#[async_trait]
impl PageHandle for ScriptedBrowser {
    async fn wait_for_load_state(&self, _state: LoadState, _timeout: Duration) -> E2eResult<()> {
        Ok(())
    }

    async fn wait_for_function(&self, _expression: &str, _timeout: Duration) -> E2eResult<()> {
        Ok(())
    }
}

#[async_trait]
impl BrowserDriver for ScriptedBrowser {
    async fn navigate(&self, url: &str, _options: NavigateOptions) -> E2eResult<()> {
        self.record(format!("navigate {}", url))
    }

    async fn locate_and_wait(
        &self,
        locator: &Locator,
        _state: WaitState,
        _timeout: Duration,
    ) -> E2eResult<ElementHandle> {
        self.record(format!("locate {}", locator))?;
        Ok(ElementHandle::new("element-1", locator.clone()))
    }

    async fn fill_field(&self, locator: &Locator, value: &str, _timeout: Duration) -> E2eResult<()> {
        self.record(format!("fill {} = {}", locator, value))
    }
}

#[async_trait]
impl ActionResolver for ScriptedBrowser {
    async fn resolve_and_preview(&self, instruction: &str) -> E2eResult<ActionDescriptor> {
        self.record(format!("observe {}", instruction))?;
        Ok(ActionDescriptor {
            description: "The iframe practice link".to_string(),
            method: "click".to_string(),
            selector: "/html/body/div[1]/div[1]/a".to_string(),
            arguments: vec![],
        })
    }

    async fn perform_action(&self, action: &ActionDescriptor) -> E2eResult<()> {
        self.record(format!("act {} {}", action.method, action.selector))
    }
}

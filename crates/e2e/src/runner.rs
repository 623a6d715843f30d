//! Scenario driver: runs scripted steps and reports on every exit path

use std::path::PathBuf;
use std::time::Duration;

use tracing::{debug, error, info, warn};

use crate::browser::{ActionDescriptor, ActionResolver, BrowserDriver, NavigateOptions};
use crate::error::{E2eError, E2eResult};
use crate::readiness::ReadinessProbe;
use crate::report::{RunReport, Status, StepOutcome};
use crate::sink::ReportSink;
use crate::spec::{locator, Scenario, ScenarioStep};

/// A run that reached the end of its script.
#[derive(Debug)]
pub struct CompletedRun {
    pub report: RunReport,

    /// Where the report landed. A sink failure does not change the verdict.
    pub saved: E2eResult<PathBuf>,
}

/// Owns a running report and guarantees it is finalized and persisted once.
///
/// Dropping the scope before [`RunScope::finish`] (a panic, or the run future
/// being cancelled) finalizes the report as `error` and saves it.
pub struct RunScope<'a> {
    report: RunReport,
    sink: &'a ReportSink,
}

impl<'a> RunScope<'a> {
    pub fn open(report: RunReport, sink: &'a ReportSink) -> Self {
        Self { report, sink }
    }

    pub fn report(&self) -> &RunReport {
        &self.report
    }

    pub fn report_mut(&mut self) -> &mut RunReport {
        &mut self.report
    }

    /// Finalize the run and hand it to the sink.
    pub fn finish(&mut self, status: Status, summary: Option<String>) -> E2eResult<PathBuf> {
        self.report.complete(status, summary)?;
        self.sink.save_report(&self.report)
    }
}

impl Drop for RunScope<'_> {
    fn drop(&mut self) {
        if self.report.is_terminal() {
            return;
        }
        warn!(test = %self.report.test_name(), "Run ended without completion, recording as error");
        if self
            .report
            .complete(Status::Error, Some("Run aborted before completion".to_string()))
            .is_ok()
        {
            if let Err(e) = self.sink.save_report(&self.report) {
                error!(error = %e, "Failed to persist aborted run");
            }
        }
    }
}

/// Drives one scenario against a browser session.
pub struct ScenarioDriver<B> {
    browser: B,
    probe: ReadinessProbe,
    sink: ReportSink,
}

impl<B> ScenarioDriver<B>
where
    B: BrowserDriver + ActionResolver,
{
    pub fn new(browser: B, probe: ReadinessProbe, sink: ReportSink) -> Self {
        Self { browser, probe, sink }
    }

    pub fn browser(&self) -> &B {
        &self.browser
    }

    pub fn into_browser(self) -> B {
        self.browser
    }

    /// Run every step in order.
    ///
    /// The first failing step aborts the run: it is recorded as `error`, the
    /// run is finalized as `error`, the partial report is saved, and the
    /// step's error is returned.
    pub async fn run(&self, scenario: &Scenario) -> E2eResult<CompletedRun> {
        info!("Running scenario '{}' ({} steps)", scenario.name, scenario.steps.len());

        let mut scope = RunScope::open(
            RunReport::new(scenario.name.clone(), scenario.url.clone()),
            &self.sink,
        );

        match self.execute_steps(scenario, scope.report_mut()).await {
            Ok(()) => {
                let summary = format!("All {} steps completed successfully", scenario.steps.len());
                let saved = scope.finish(Status::Success, Some(summary));
                info!("✓ {} ({} ms)", scenario.name, scope.report().duration_ms().unwrap_or(0));
                Ok(CompletedRun {
                    report: scope.report().clone(),
                    saved,
                })
            }
            Err(e) => {
                error!("✗ {} - {}", scenario.name, e);
                if let Err(sink_err) = scope.finish(Status::Error, Some(format!("Test failed: {}", e))) {
                    error!(error = %sink_err, "Failed to persist report");
                }
                Err(e)
            }
        }
    }

    async fn execute_steps(&self, scenario: &Scenario, report: &mut RunReport) -> E2eResult<()> {
        let mut pending: Option<ActionDescriptor> = None;

        for step in &scenario.steps {
            let handle = report.add_step(step.describe());
            debug!("Executing step: {}", step.describe());

            match self.execute_step(step, &mut pending).await {
                Ok(details) => {
                    let outcome = match details {
                        Some(d) => StepOutcome::success().with_details(d),
                        None => StepOutcome::success(),
                    };
                    report.complete_step(handle, outcome);
                }
                Err(e) => {
                    report.complete_step(handle, StepOutcome::error(e.to_string()));
                    return Err(e);
                }
            }
        }
        Ok(())
    }

    async fn execute_step(
        &self,
        step: &ScenarioStep,
        pending: &mut Option<ActionDescriptor>,
    ) -> E2eResult<Option<String>> {
        match step {
            ScenarioStep::Navigate { url, wait_until, timeout_ms } => {
                let options = NavigateOptions {
                    wait_until: *wait_until,
                    timeout: Duration::from_millis(*timeout_ms),
                };
                self.browser.navigate(url, options).await?;
                Ok(None)
            }
            ScenarioStep::Observe { instruction } => {
                let action = self.browser.resolve_and_preview(instruction).await?;
                info!(method = %action.method, selector = %action.selector, "Observed: {}", action.description);
                let details = serde_json::to_string(&action)?;
                *pending = Some(action);
                Ok(Some(details))
            }
            ScenarioStep::Act { instruction } => {
                let action = match instruction {
                    Some(instruction) => self.browser.resolve_and_preview(instruction).await?,
                    None => pending.take().ok_or(E2eError::NoPendingAction)?,
                };
                self.browser.perform_action(&action).await?;
                Ok(Some(action.description))
            }
            ScenarioStep::AwaitReady { timeout_ms } => {
                let max = timeout_ms
                    .map(Duration::from_millis)
                    .unwrap_or_else(|| self.probe.default_timeout());
                let outcome = self.probe.await_ready(&self.browser, max).await;
                Ok(Some(format!(
                    "{:?} after {} ms",
                    outcome.stage,
                    outcome.elapsed.as_millis()
                )))
            }
            ScenarioStep::WaitFor { selector, frame, state, timeout_ms } => {
                let element = self
                    .browser
                    .locate_and_wait(&locator(selector, frame), *state, Duration::from_millis(*timeout_ms))
                    .await?;
                Ok(Some(format!("element {}", element.id())))
            }
            ScenarioStep::Fill { selector, frame, value, timeout_ms } => {
                self.browser
                    .fill_field(&locator(selector, frame), value, Duration::from_millis(*timeout_ms))
                    .await?;
                Ok(None)
            }
            ScenarioStep::Sleep { ms } => {
                tokio::time::sleep(Duration::from_millis(*ms)).await;
                Ok(None)
            }
            ScenarioStep::Log { message } => {
                info!("[SCENARIO] {}", message);
                Ok(None)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dropped_scope_persists_error_report() {
        let dir = tempfile::tempdir().unwrap();
        let sink = ReportSink::new(dir.path()).quiet();

        {
            let mut scope = RunScope::open(RunReport::new("aborted", None), &sink);
            scope.report_mut().add_step("navigate");
        }

        let entry = std::fs::read_dir(dir.path()).unwrap().next().unwrap().unwrap();
        let report: RunReport =
            serde_json::from_str(&std::fs::read_to_string(entry.path()).unwrap()).unwrap();
        assert_eq!(report.status(), Status::Error);
        assert_eq!(report.summary(), Some("Run aborted before completion"));
        assert_eq!(report.steps()[0].status, Status::Running);
    }

    #[test]
    fn test_panicking_run_persists_error_report() {
        let dir = tempfile::tempdir().unwrap();
        let sink = ReportSink::new(dir.path()).quiet();

        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let mut scope = RunScope::open(RunReport::new("panicked", None), &sink);
            scope.report_mut().add_step("fill");
            panic!("step blew up");
        }));
        assert!(result.is_err());

        let entry = std::fs::read_dir(dir.path()).unwrap().next().unwrap().unwrap();
        let report: RunReport =
            serde_json::from_str(&std::fs::read_to_string(entry.path()).unwrap()).unwrap();
        assert_eq!(report.status(), Status::Error);
        assert_eq!(report.steps()[0].status, Status::Running);
    }

    #[test]
    fn test_release_profile_unwinds_on_panic() {
        let manifest = concat!(env!("CARGO_MANIFEST_DIR"), "/../../Cargo.toml");
        let workspace: toml::Value = toml::from_str(&std::fs::read_to_string(manifest).unwrap()).unwrap();
        let panic = workspace
            .get("profile")
            .and_then(|p| p.get("release"))
            .and_then(|r| r.get("panic"))
            .and_then(|v| v.as_str());
        assert_ne!(panic, Some("abort"));
    }

    #[test]
    fn test_finished_scope_saves_once() {
        let dir = tempfile::tempdir().unwrap();
        let sink = ReportSink::new(dir.path()).quiet();

        {
            let mut scope = RunScope::open(RunReport::new("done", None), &sink);
            scope.finish(Status::Success, None).unwrap();
            assert!(scope.finish(Status::Error, None).is_err());
        }

        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 1);
    }
}

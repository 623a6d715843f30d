//! Run and step records

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, SubsecRound, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{E2eError, E2eResult};

/// Current UTC time, truncated to whole milliseconds so that serialized
/// timestamps and computed durations agree exactly.
pub fn now_millis() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(3)
}

/// Status shared by runs and steps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Running,
    Success,
    Failed,
    Error,
}

impl Status {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Status::Running)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Status::Running => "running",
            Status::Success => "success",
            Status::Failed => "failed",
            Status::Error => "error",
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

static NEXT_REPORT_ID: AtomicU64 = AtomicU64::new(1);

fn next_report_id() -> u64 {
    NEXT_REPORT_ID.fetch_add(1, Ordering::Relaxed)
}

/// Identifies a step by its insertion position in the report that issued it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StepHandle {
    report: u64,
    index: usize,
}

impl StepHandle {
    pub fn index(&self) -> usize {
        self.index
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StepRecord {
    pub step: String,
    pub start_time: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_time: Option<DateTime<Utc>>,
    /// Milliseconds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<i64>,
    pub status: Status,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl StepRecord {
    fn started(step: String, at: DateTime<Utc>) -> Self {
        Self {
            step,
            start_time: at,
            end_time: None,
            duration: None,
            status: Status::Running,
            details: None,
            error: None,
        }
    }
}

/// Terminal outcome handed to [`RunReport::complete_step`].
#[derive(Debug, Clone, PartialEq)]
pub struct StepOutcome {
    pub status: Status,
    pub details: Option<String>,
    pub error: Option<String>,
}

impl StepOutcome {
    pub fn success() -> Self {
        Self {
            status: Status::Success,
            details: None,
            error: None,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            status: Status::Error,
            details: None,
            error: Some(message.into()),
        }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            status: Status::Failed,
            details: None,
            error: Some(message.into()),
        }
    }

    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }
}

/// Everything recorded about one run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunReport {
    /// Process-local identity; a loaded report gets a fresh one.
    #[serde(skip, default = "next_report_id")]
    id: u64,
    test_name: String,
    start_time: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    end_time: Option<DateTime<Utc>>,
    /// Milliseconds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    duration: Option<i64>,
    status: Status,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    summary: Option<String>,
    steps: Vec<StepRecord>,
}

impl RunReport {
    pub fn new(test_name: impl Into<String>, url: Option<String>) -> Self {
        Self::started_at(test_name, url, now_millis())
    }

    pub fn started_at(test_name: impl Into<String>, url: Option<String>, at: DateTime<Utc>) -> Self {
        Self {
            id: next_report_id(),
            test_name: test_name.into(),
            start_time: at,
            end_time: None,
            duration: None,
            status: Status::Running,
            url,
            summary: None,
            steps: Vec::new(),
        }
    }

    /// Append a running step and return its handle.
    pub fn add_step(&mut self, description: impl Into<String>) -> StepHandle {
        self.add_step_at(description, now_millis())
    }

    pub fn add_step_at(&mut self, description: impl Into<String>, at: DateTime<Utc>) -> StepHandle {
        self.steps.push(StepRecord::started(description.into(), at));
        StepHandle {
            report: self.id,
            index: self.steps.len() - 1,
        }
    }

    /// Record the terminal outcome of a step.
    ///
    /// Returns `false` without touching the report when the handle does not
    /// resolve to a running step.
    pub fn complete_step(&mut self, handle: StepHandle, outcome: StepOutcome) -> bool {
        self.complete_step_at(handle, outcome, now_millis())
    }

    pub fn complete_step_at(&mut self, handle: StepHandle, outcome: StepOutcome, at: DateTime<Utc>) -> bool {
        if handle.report != self.id {
            warn!(test = %self.test_name, "Ignoring step handle issued by another report");
            return false;
        }
        let Some(record) = self.steps.get_mut(handle.index) else {
            return false;
        };
        if record.status.is_terminal() || !outcome.status.is_terminal() {
            warn!(
                step = %record.step,
                current = %record.status,
                requested = %outcome.status,
                "Ignoring step completion"
            );
            return false;
        }

        record.end_time = Some(at);
        record.duration = Some((at - record.start_time).num_milliseconds());
        record.status = outcome.status;
        record.details = outcome.details;
        record.error = outcome.error;
        true
    }

    /// Move the run to a terminal status. Allowed once.
    pub fn complete(&mut self, status: Status, summary: Option<String>) -> E2eResult<()> {
        self.complete_at(status, summary, now_millis())
    }

    pub fn complete_at(&mut self, status: Status, summary: Option<String>, at: DateTime<Utc>) -> E2eResult<()> {
        if self.status.is_terminal() || !status.is_terminal() {
            return Err(E2eError::InvalidStateTransition {
                from: self.status.to_string(),
                to: status.to_string(),
            });
        }

        self.end_time = Some(at);
        self.duration = Some((at - self.start_time).num_milliseconds());
        self.status = status;
        self.summary = summary;
        Ok(())
    }

    pub fn test_name(&self) -> &str {
        &self.test_name
    }

    pub fn url(&self) -> Option<&str> {
        self.url.as_deref()
    }

    pub fn status(&self) -> Status {
        self.status
    }

    pub fn summary(&self) -> Option<&str> {
        self.summary.as_deref()
    }

    pub fn start_time(&self) -> DateTime<Utc> {
        self.start_time
    }

    pub fn end_time(&self) -> Option<DateTime<Utc>> {
        self.end_time
    }

    pub fn duration_ms(&self) -> Option<i64> {
        self.duration
    }

    pub fn steps(&self) -> &[StepRecord] {
        &self.steps
    }

    pub fn step(&self, handle: StepHandle) -> Option<&StepRecord> {
        if handle.report != self.id {
            return None;
        }
        self.steps.get(handle.index)
    }

    pub fn step_count(&self) -> usize {
        self.steps.len()
    }

    pub fn success_count(&self) -> usize {
        self.steps.iter().filter(|s| s.status == Status::Success).count()
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap()
    }

    fn ms(n: i64) -> DateTime<Utc> {
        t0() + Duration::milliseconds(n)
    }

    #[test]
    fn test_new_report_is_running() {
        let report = RunReport::new("iframe-practice", Some("https://example.com".into()));
        assert_eq!(report.status(), Status::Running);
        assert!(report.end_time().is_none());
        assert!(report.duration_ms().is_none());
        assert!(report.summary().is_none());
        assert_eq!(report.step_count(), 0);
    }

    #[test]
    fn test_step_duration_uses_its_own_start() {
        let mut report = RunReport::started_at("t", None, t0());
        let first = report.add_step_at("navigate", ms(10));
        let second = report.add_step_at("fill", ms(250));

        assert!(report.complete_step_at(second, StepOutcome::success(), ms(400)));
        assert!(report.complete_step_at(first, StepOutcome::success(), ms(1_010)));

        assert_eq!(report.steps()[0].duration, Some(1_000));
        assert_eq!(report.steps()[1].duration, Some(150));
        // Order is insertion order, not completion order.
        assert_eq!(report.steps()[0].step, "navigate");
        assert_eq!(report.steps()[1].step, "fill");
    }

    #[test]
    fn test_unknown_handle_is_noop() {
        let mut other = RunReport::started_at("other", None, t0());
        other.add_step_at("a", t0());
        let stray = other.add_step_at("b", t0());

        let mut report = RunReport::started_at("t", None, t0());
        report.add_step_at("only", t0());

        assert!(!report.complete_step_at(stray, StepOutcome::error("boom"), ms(5)));
        assert_eq!(report.step_count(), 1);
        assert_eq!(report.steps()[0].status, Status::Running);
    }

    #[test]
    fn test_handle_from_another_report_is_rejected() {
        let mut other = RunReport::started_at("other", None, t0());
        let foreign = other.add_step_at("a", t0());

        let mut report = RunReport::started_at("t", None, t0());
        let own = report.add_step_at("only", t0());
        assert_eq!(foreign.index(), own.index());

        assert!(!report.complete_step_at(foreign, StepOutcome::error("from another report"), ms(5)));
        assert!(report.step(foreign).is_none());
        assert_eq!(report.steps()[0].status, Status::Running);
        assert_eq!(report.steps()[0].error, None);

        assert!(report.complete_step_at(own, StepOutcome::success(), ms(5)));
        assert_eq!(report.step(own).map(|s| s.status), Some(Status::Success));
    }

    #[test]
    fn test_step_completes_once() {
        let mut report = RunReport::started_at("t", None, t0());
        let step = report.add_step_at("act", t0());

        assert!(report.complete_step_at(step, StepOutcome::error("timeout"), ms(20)));
        assert!(!report.complete_step_at(step, StepOutcome::success(), ms(40)));

        let record = report.step(step).unwrap();
        assert_eq!(record.status, Status::Error);
        assert_eq!(record.error.as_deref(), Some("timeout"));
        assert_eq!(record.duration, Some(20));
    }

    #[test]
    fn test_completing_with_running_is_ignored() {
        let mut report = RunReport::started_at("t", None, t0());
        let step = report.add_step_at("act", t0());
        let running = StepOutcome {
            status: Status::Running,
            details: None,
            error: None,
        };
        assert!(!report.complete_step_at(step, running, ms(1)));
        assert!(report.step(step).unwrap().end_time.is_none());
    }

    #[test]
    fn test_complete_sets_all_terminal_fields() {
        let mut report = RunReport::started_at("t", None, t0());
        report
            .complete_at(Status::Success, Some("done".into()), ms(1_234))
            .unwrap();

        assert_eq!(report.status(), Status::Success);
        assert_eq!(report.end_time(), Some(ms(1_234)));
        assert_eq!(report.duration_ms(), Some(1_234));
        assert_eq!(report.summary(), Some("done"));
    }

    #[test]
    fn test_complete_twice_is_rejected() {
        let mut report = RunReport::started_at("t", None, t0());
        report.complete_at(Status::Failed, None, ms(5)).unwrap();

        let err = report.complete_at(Status::Success, None, ms(9)).unwrap_err();
        assert!(matches!(err, E2eError::InvalidStateTransition { .. }));
        assert_eq!(report.status(), Status::Failed);
        assert_eq!(report.duration_ms(), Some(5));
    }

    #[test]
    fn test_cannot_complete_to_running() {
        let mut report = RunReport::started_at("t", None, t0());
        assert!(report.complete_at(Status::Running, None, ms(1)).is_err());
        assert!(!report.is_terminal());
    }

    #[test]
    fn test_partially_completed_run_serializes() {
        let mut report = RunReport::started_at("iframe-practice", Some("https://a.test".into()), t0());
        let nav = report.add_step_at("navigate", ms(0));
        report.complete_step_at(nav, StepOutcome::success(), ms(100));

        let s0 = report.add_step_at("observe", ms(100));
        let s1 = report.add_step_at("act", ms(200));
        report.add_step_at("fill", ms(300));
        report.complete_step_at(s0, StepOutcome::success(), ms(150));
        report.complete_step_at(s1, StepOutcome::error("timeout"), ms(400));
        report
            .complete_at(Status::Error, Some("Test failed: timeout".into()), ms(500))
            .unwrap();

        let json: serde_json::Value = serde_json::to_value(&report).unwrap();
        assert_eq!(json["testName"], "iframe-practice");
        assert_eq!(json["status"], "error");
        assert_eq!(json["duration"], 500);
        assert_eq!(json["steps"][2]["status"], "error");
        assert_eq!(json["steps"][2]["error"], "timeout");
        assert_eq!(json["steps"][3]["status"], "running");
        assert!(json["steps"][3].get("endTime").is_none());
    }

    #[test]
    fn test_success_count() {
        let mut report = RunReport::started_at("t", None, t0());
        let a = report.add_step_at("a", t0());
        let b = report.add_step_at("b", t0());
        report.add_step_at("c", t0());
        report.complete_step_at(a, StepOutcome::success(), ms(1));
        report.complete_step_at(b, StepOutcome::failed("nope"), ms(1));

        assert_eq!(report.step_count(), 3);
        assert_eq!(report.success_count(), 1);
    }
}

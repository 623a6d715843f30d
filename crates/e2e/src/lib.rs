//! pagerun: single-scenario browser test runner
//!
//! Drives one browser session through a scripted scenario, decides when the
//! page is ready enough to act on, and writes a timestamped report of every
//! step whether the run passes or not.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │  ScenarioDriver                                             │
//! │    ├── RunScope (report finalized + saved on every exit)    │
//! │    ├── per step: add_step → collaborator → complete_step    │
//! │    └── await_ready → ReadinessProbe                         │
//! ├─────────────────────────────────────────────────────────────┤
//! │  ReadinessProbe                                             │
//! │    domcontentloaded → networkidle → readyState → settle     │
//! │    (one shared Deadline)                                    │
//! ├─────────────────────────────────────────────────────────────┤
//! │  RunReport / StepRecord ──▶ ReportSink                      │
//! │                             test-report-<timestamp>.json    │
//! ├─────────────────────────────────────────────────────────────┤
//! │  BrowserDriver + ActionResolver + PageHandle (traits)       │
//! │    └── PlaywrightSession (Node bridge, JSON lines)          │
//! └─────────────────────────────────────────────────────────────┘
//! ```

pub mod browser;
pub mod config;
pub mod error;
pub mod playwright;
pub mod readiness;
pub mod report;
pub mod runner;
pub mod sink;
pub mod spec;

pub use error::{E2eError, E2eResult};
pub use readiness::{Deadline, ReadinessOutcome, ReadinessProbe, ReadyStage};
pub use report::{RunReport, Status, StepHandle, StepOutcome, StepRecord};
pub use runner::{CompletedRun, RunScope, ScenarioDriver};
pub use sink::ReportSink;
pub use spec::{Scenario, ScenarioStep};

//! Readiness cascade
//!
//! Load events are unreliable on pages that long-poll or stream, so "ready"
//! is decided by a cascade of progressively weaker signals:
//!
//! ```text
//! domcontentloaded (≤30s) ──ok──▶ networkidle (≤20s) ──ok──────────────┐
//!        │ timeout/err                 │ timeout/err                   │
//!        └──────────────┬──────────────┘                               │
//!                       ▼                                              │
//!      poll document.readyState for max(10s, remaining)/2              │
//!                       │                                              │
//!                       └─────────────▶ settle: sleep min(5s, remaining) ◀┘
//! ```
//!
//! Every stage draws on one [`Deadline`], so the whole cascade is bounded by
//! the caller's ceiling plus at most one settle increment. Nothing here
//! returns an error: the next real action surfaces true unreadiness.

use std::future::Future;
use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::browser::{LoadState, PageHandle};
use crate::config::ReadinessConfig;
use crate::error::{E2eError, E2eResult};

/// A shared time budget that stages consume from.
#[derive(Debug, Clone, Copy)]
pub struct Deadline {
    start: Instant,
    budget: Duration,
}

impl Deadline {
    /// A deadline `budget` from now.
    pub fn after(budget: Duration) -> Self {
        Self::starting_at(Instant::now(), budget)
    }

    pub fn starting_at(start: Instant, budget: Duration) -> Self {
        Self { start, budget }
    }

    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }

    /// `max(0, deadline - now)`
    pub fn remaining_at(&self, now: Instant) -> Duration {
        (self.start + self.budget).saturating_duration_since(now)
    }

    pub fn remaining(&self) -> Duration {
        self.remaining_at(Instant::now())
    }

    pub fn is_expired(&self) -> bool {
        self.remaining().is_zero()
    }
}

/// The strongest signal that confirmed readiness.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadyStage {
    NetworkIdle,
    DomContentLoaded,
    ReadyState,
    Unconfirmed,
}

#[derive(Debug, Clone, Copy)]
pub struct ReadinessOutcome {
    pub stage: ReadyStage,
    pub elapsed: Duration,
}

/// Decides when a page is ready enough to act on.
#[derive(Debug, Clone, Default)]
pub struct ReadinessProbe {
    config: ReadinessConfig,
}

impl ReadinessProbe {
    pub fn new(config: ReadinessConfig) -> Self {
        Self { config }
    }

    pub fn default_timeout(&self) -> Duration {
        self.config.max_timeout()
    }

    /// Run the cascade against `page` within `max_timeout`.
    pub async fn await_ready(&self, page: &dyn PageHandle, max_timeout: Duration) -> ReadinessOutcome {
        let deadline = Deadline::after(max_timeout);
        let mut stage = ReadyStage::Unconfirmed;
        let mut fall_back = false;

        info!(budget_ms = max_timeout.as_millis() as u64, "Waiting for page readiness");

        let dom_budget = deadline
            .remaining()
            .min(Duration::from_millis(self.config.dom_content_timeout_ms));
        match bounded(
            "domcontentloaded",
            dom_budget,
            page.wait_for_load_state(LoadState::DomContentLoaded, dom_budget),
        )
        .await
        {
            Ok(()) => {
                debug!(elapsed_ms = deadline.elapsed().as_millis() as u64, "DOM content loaded");
                stage = ReadyStage::DomContentLoaded;

                let idle_budget = deadline
                    .remaining()
                    .min(Duration::from_millis(self.config.network_idle_timeout_ms));
                match bounded(
                    "networkidle",
                    idle_budget,
                    page.wait_for_load_state(LoadState::NetworkIdle, idle_budget),
                )
                .await
                {
                    Ok(()) => {
                        debug!(elapsed_ms = deadline.elapsed().as_millis() as u64, "Network idle");
                        stage = ReadyStage::NetworkIdle;
                    }
                    Err(e) => {
                        warn!(error = %e, "Network did not settle, falling back to readyState");
                        fall_back = true;
                    }
                }
            }
            Err(e) => {
                warn!(error = %e, "DOM content not loaded, falling back to readyState");
                fall_back = true;
            }
        }

        if fall_back {
            let poll_budget = deadline
                .remaining()
                .max(Duration::from_millis(self.config.min_fallback_ms))
                / 2;
            match bounded(
                "document.readyState",
                poll_budget,
                page.wait_for_function(&self.config.ready_expression, poll_budget),
            )
            .await
            {
                Ok(()) => {
                    debug!(elapsed_ms = deadline.elapsed().as_millis() as u64, "readyState reached");
                    if stage == ReadyStage::Unconfirmed {
                        stage = ReadyStage::ReadyState;
                    }
                }
                Err(e) => warn!(error = %e, "readyState poll failed, proceeding anyway"),
            }
        }

        let settle = deadline
            .remaining()
            .min(Duration::from_millis(self.config.settle_cap_ms));
        if !settle.is_zero() {
            debug!(settle_ms = settle.as_millis() as u64, "Settling");
            // The settle window elapsing is the expected outcome.
            tokio::time::timeout(settle, page.sleep(settle)).await.ok();
        }

        let elapsed = deadline.elapsed();
        info!(stage = ?stage, elapsed_ms = elapsed.as_millis() as u64, "Page readiness decided");
        ReadinessOutcome { stage, elapsed }
    }
}

/// Run one stage under its own timer; a zero budget fails without calling.
async fn bounded<F>(what: &str, budget: Duration, stage: F) -> E2eResult<()>
where
    F: Future<Output = E2eResult<()>>,
{
    if budget.is_zero() {
        return Err(E2eError::timeout(what, budget));
    }
    match tokio::time::timeout(budget, stage).await {
        Ok(result) => result,
        Err(_) => Err(E2eError::timeout(what, budget)),
    }
}

//! Readiness gate.
//!
//! Decides whether a region is usable without blocking indefinitely. A
//! timeout is the normal way a bookmaker says "this market is not offered",
//! so the gate reports it as [`Readiness::NotFound`] instead of an error.

use tracing::{debug, info, warn};

use super::dom::{Locator, Page, Region, WaitState};
use crate::config::Timing;

/// Outcome of a bounded wait.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[must_use]
pub enum Readiness {
    Ready,
    NotFound,
}

impl Readiness {
    pub fn is_ready(self) -> bool {
        self == Readiness::Ready
    }
}

/// Wait for `region` to reach `state` within `timeout`. Never fails.
pub async fn await_ready(region: &Region<'_>, state: WaitState, timeout: std::time::Duration) -> Readiness {
    match region.wait_for(state, timeout).await {
        Ok(()) => Readiness::Ready,
        Err(e) => {
            debug!("{}", e);
            Readiness::NotFound
        }
    }
}

/// Bookmaker-specific action run once when the primary beacon is missing.
#[derive(Debug, Clone, Default)]
pub struct Recovery {
    /// Reload the page before the clicks.
    pub reload: bool,
    /// Elements clicked in order after the reload, e.g. a language switch.
    pub clicks: Vec<Locator>,
}

impl Recovery {
    pub fn reload() -> Self {
        Self {
            reload: true,
            clicks: Vec::new(),
        }
    }

    /// Clicks only, no reload.
    pub fn clicks(clicks: Vec<Locator>) -> Self {
        Self { reload: false, clicks }
    }

    pub fn then_click(mut self, locator: Locator) -> Self {
        self.clicks.push(locator);
        self
    }

    /// Perform the action. Failed clicks are logged and skipped.
    pub async fn run(&self, page: &dyn Page, timing: &Timing) {
        if self.reload {
            if let Err(e) = page.reload().await {
                warn!("Reload during recovery failed: {}", e);
            }
        }
        for locator in &self.clicks {
            let region = Region::new(page, locator.clone());
            if let Err(e) = region.click(timing.primary()).await {
                info!("Recovery click on {} failed: {}", locator, e);
            }
            tokio::time::sleep(timing.settle()).await;
        }
    }
}

/// Primary "is this page loaded" check with a single recovery cycle.
///
/// Waits `timing.primary()` for the beacon. On failure: pause for
/// `timing.recovery_delay()`, run `recovery`, then re-check with the longer
/// `timing.retry_primary()`.
pub async fn await_page(
    page: &dyn Page,
    beacon: &Locator,
    state: WaitState,
    recovery: &Recovery,
    timing: &Timing,
) -> Readiness {
    let region = Region::new(page, beacon.clone());
    if await_ready(&region, state, timing.primary()).await.is_ready() {
        return Readiness::Ready;
    }

    let url = page.url().await.unwrap_or_default();
    info!("Page beacon {} not ready on {}, recovering", beacon, url);

    tokio::time::sleep(timing.recovery_delay()).await;
    recovery.run(page, timing).await;

    let readiness = await_ready(&region, state, timing.retry_primary()).await;
    if !readiness.is_ready() {
        info!("Page beacon still missing after recovery on {}", url);
    }
    readiness
}

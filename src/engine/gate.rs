// Authentication gate: holds the pipeline until the operator clears login/verification pages.

use std::time::Duration;

use tokio::time::{sleep, Instant};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::bounded;
use super::progress::Reporter;
use crate::driver::PageDriver;
use crate::error::{HarvestError, HarvestResult};
use crate::locate::LocationGuard;

pub struct AuthGate<'a> {
    pub driver: &'a dyn PageDriver,
    pub guard: &'a dyn LocationGuard,
    pub timeout: Duration,
    pub poll_interval: Duration,
    pub navigation_timeout: Duration,
}

impl AuthGate<'_> {
    /// Navigate to `start_location` and wait until it is reachable without
    /// landing on a blocked page. A cleared login is confirmed by navigating to
    /// the start location once more, since verification steps may follow it.
    pub async fn wait_until_unblocked(
        &self,
        start_location: &str,
        cancel: &CancellationToken,
        reporter: &Reporter,
    ) -> HarvestResult<()> {
        reporter.info(
            "Please log in in the browser window and complete any additional verification...",
        );
        let deadline = Instant::now() + self.timeout;

        if let Err(e) = bounded(self.navigation_timeout, self.driver.navigate(start_location)).await {
            debug!("initial navigation to {} failed: {:#}", start_location, e);
        }

        let mut last_location = String::new();
        loop {
            if cancel.is_cancelled() {
                return Err(HarvestError::Cancelled);
            }

            match self.driver.current_location().await {
                Ok(location) => {
                    if !self.guard.is_blocked(&location) && self.confirm(start_location).await {
                        reporter.info("Login confirmed, proceeding to album...");
                        return Ok(());
                    }
                    last_location = location;
                }
                Err(e) => debug!("reading location failed: {:#}", e),
            }

            if Instant::now() >= deadline {
                reporter.error(
                    "Login timeout. Please ensure you completed all login steps and verification.",
                );
                return Err(HarvestError::BlockedLocation {
                    location: last_location,
                });
            }

            tokio::select! {
                _ = sleep(self.poll_interval) => {}
                _ = cancel.cancelled() => return Err(HarvestError::Cancelled),
            }
        }
    }

    async fn confirm(&self, start_location: &str) -> bool {
        if let Err(e) = bounded(self.navigation_timeout, self.driver.navigate(start_location)).await {
            debug!("confirming navigation failed: {:#}", e);
            return false;
        }
        match self.driver.current_location().await {
            Ok(location) if !self.guard.is_blocked(&location) => true,
            Ok(location) => {
                debug!("additional verification required at {}", location);
                false
            }
            Err(_) => false,
        }
    }
}

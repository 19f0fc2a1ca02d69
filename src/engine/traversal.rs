// Traversal state machine: walks the gallery item by item into the collection store.

use std::path::PathBuf;
use std::sync::Arc;

use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::bounded;
use super::progress::Reporter;
use super::record::MediaRecord;
use super::store::{AppendOutcome, CollectionStore};
use crate::config::EngineConfig;
use crate::driver::{Key, PageDriver};
use crate::error::{HarvestError, HarvestResult};
use crate::locate::{LocationGuard, MediaLocator};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TraversalPhase {
    Init,
    Positioned,
    Collecting,
    Stalled,
    Recovering,
    Finished,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TraversalOutcome {
    /// The store holds `item_cap` records.
    CapReached,
    /// No media left after a retried reload.
    Completed,
    Cancelled,
    /// Recoveries kept failing to advance; the partial store is returned.
    Aborted,
    /// Neither the resume anchor nor a first item could be reached.
    NotPositioned,
    /// The album page showed a login or verification location.
    Blocked,
}

#[derive(Debug, Clone)]
pub struct TraversalRequest {
    pub start_location: String,
    pub item_cap: usize,
    /// Checkpoint to resume from and write to; `None` keeps records in memory.
    pub checkpoint: Option<PathBuf>,
    /// Canonical URL of a previously reached item to reposition at.
    pub resume_anchor: Option<String>,
}

#[derive(Debug, Clone)]
pub struct CollectionResult {
    pub records: Vec<MediaRecord>,
    pub outcome: TraversalOutcome,
    /// Records added during this run.
    pub appended: usize,
    pub duplicates: usize,
    pub misses: usize,
    pub recoveries: u32,
    pub failed_recoveries: u32,
    /// Location that ended the run with `TraversalOutcome::Blocked`.
    pub blocked_at: Option<String>,
}

impl CollectionResult {
    /// The fatal condition that ended the run, if any.
    pub fn fatal_error(&self) -> Option<HarvestError> {
        match self.outcome {
            TraversalOutcome::Aborted => Some(HarvestError::StallExhaustion {
                failed_recoveries: self.failed_recoveries,
            }),
            TraversalOutcome::Blocked => Some(HarvestError::BlockedLocation {
                location: self.blocked_at.clone().unwrap_or_default(),
            }),
            _ => None,
        }
    }
}

/// Result of trying to put the viewer on an item.
enum Positioning {
    Positioned,
    NotFound,
    Blocked(String),
}

enum Recovery {
    Resumed,
    Exhausted,
    Blocked(String),
}

/// Run-length stall accounting and recovery bookkeeping.
struct StallState {
    /// Iterations in a row that added nothing.
    consecutive: u32,
    failed_recoveries: u32,
    /// A recovery repositioned the page and has not yet produced an append.
    recovery_pending: bool,
    threshold: u32,
    max_failed_recoveries: u32,
}

impl StallState {
    fn new(threshold: u32, max_failed_recoveries: u32) -> Self {
        Self {
            consecutive: 0,
            failed_recoveries: 0,
            recovery_pending: false,
            threshold: threshold.max(1),
            max_failed_recoveries: max_failed_recoveries.max(1),
        }
    }

    fn record_progress(&mut self) {
        self.consecutive = 0;
        self.failed_recoveries = 0;
        self.recovery_pending = false;
    }

    fn record_stall(&mut self) {
        self.consecutive += 1;
    }

    fn is_stalled(&self) -> bool {
        self.consecutive >= self.threshold
    }

    /// Charge the previous recovery if it did not lead to an append.
    /// Returns whether another recovery may be attempted.
    fn begin_recovery(&mut self) -> bool {
        if self.recovery_pending {
            self.failed_recoveries += 1;
            self.recovery_pending = false;
        }
        self.failed_recoveries < self.max_failed_recoveries
    }

    fn recovery_succeeded(&mut self) {
        self.consecutive = 0;
        self.recovery_pending = true;
    }

    fn recovery_failed(&mut self) -> bool {
        self.failed_recoveries += 1;
        self.failed_recoveries < self.max_failed_recoveries
    }
}

struct Run {
    store: CollectionStore,
    stall: StallState,
    cap: usize,
    appended: usize,
    duplicates: usize,
    misses: usize,
    recoveries: u32,
    unsaved: bool,
    blocked_at: Option<String>,
}

pub struct TraversalEngine {
    driver: Arc<dyn PageDriver>,
    locator: MediaLocator,
    guard: Arc<dyn LocationGuard>,
    config: EngineConfig,
    cancel: CancellationToken,
    reporter: Reporter,
}

impl TraversalEngine {
    pub fn new(
        driver: Arc<dyn PageDriver>,
        config: EngineConfig,
        cancel: CancellationToken,
        reporter: Reporter,
    ) -> Self {
        let locator = MediaLocator::new(
            driver.clone(),
            config.profile.clone(),
            config.min_media_dimension,
        );
        let guard = Arc::new(config.profile.blocked_patterns.clone());
        Self {
            driver,
            locator,
            guard,
            config,
            cancel,
            reporter,
        }
    }

    /// Replace the blocked-location predicate taken from the profile.
    pub fn with_guard(mut self, guard: Arc<dyn LocationGuard>) -> Self {
        self.guard = guard;
        self
    }

    /// Walk the gallery from `request.start_location` (or the resume anchor)
    /// until the cap, the end of the gallery, cancellation or stall exhaustion.
    ///
    /// Only an unreadable checkpoint is returned as an error. Every other
    /// ending, a blocked location included, yields the records collected so far.
    pub async fn collect(&self, request: &TraversalRequest) -> HarvestResult<CollectionResult> {
        let store = match &request.checkpoint {
            Some(path) => CollectionStore::open(path)
                .map_err(|e| HarvestError::Persistence(format!("{:#}", e)))?,
            None => CollectionStore::in_memory(),
        };
        let cap = request.item_cap;
        let mut run = Run {
            store,
            stall: StallState::new(self.config.stall_threshold, self.config.max_failed_recoveries),
            cap,
            appended: 0,
            duplicates: 0,
            misses: 0,
            recoveries: 0,
            unsaved: false,
            blocked_at: None,
        };
        self.enter(TraversalPhase::Init);

        self.reporter
            .info(format!("Collecting up to {} media URLs (images and videos)...", cap));
        self.reporter
            .progress(run.store.len(), cap, "Collecting media URLs...");

        if run.store.len() >= cap {
            return Ok(self.finish(run, TraversalOutcome::CapReached));
        }
        if self.cancel.is_cancelled() {
            return Ok(self.finish(run, TraversalOutcome::Cancelled));
        }

        match self
            .position(&request.start_location, request.resume_anchor.as_deref())
            .await
        {
            Positioning::Positioned => {}
            Positioning::NotFound => {
                self.reporter.error("Could not find first media");
                return Ok(self.finish(run, TraversalOutcome::NotPositioned));
            }
            Positioning::Blocked(location) => {
                return Ok(self.blocked(run, location));
            }
        }
        self.enter(TraversalPhase::Positioned);
        self.enter(TraversalPhase::Collecting);

        let outcome = loop {
            if self.cancel.is_cancelled() {
                self.reporter.warn("URL collection stopped by user");
                break TraversalOutcome::Cancelled;
            }
            if run.store.len() >= cap {
                break TraversalOutcome::CapReached;
            }

            self.collect_step(&mut run).await;
            if run.store.len() >= cap {
                continue;
            }

            if run.stall.is_stalled() {
                match self.recover(&mut run, request).await {
                    Recovery::Resumed => continue,
                    Recovery::Exhausted => break TraversalOutcome::Aborted,
                    Recovery::Blocked(location) => return Ok(self.blocked(run, location)),
                }
            }

            if let Err(e) = bounded(
                self.config.navigation_timeout(),
                self.driver.press_key(Key::ArrowRight),
            )
            .await
            {
                self.reporter
                    .warn(format!("Failed to navigate to next media, retrying... ({:#})", e));
                run.stall.record_stall();
                continue;
            }
            self.pause().await;
            if self.cancel.is_cancelled() {
                continue;
            }

            if !self.locator.media_present().await && self.confirm_end().await {
                self.reporter.info("Reached end of album");
                break TraversalOutcome::Completed;
            }
        };

        Ok(self.finish(run, outcome))
    }

    /// Locate the current item and append it. Anything but a new record
    /// counts toward the stall run.
    async fn collect_step(&self, run: &mut Run) {
        match self.locator.locate(None).await {
            Ok(Some(record)) => {
                let kind = record.kind;
                let canonical = record.canonical_url.clone();
                let payload = record.payload_url.clone();
                match run.store.append(record) {
                    AppendOutcome::Duplicate => {
                        run.duplicates += 1;
                        run.stall.record_stall();
                        self.reporter
                            .info(format!("Skipped duplicate media URL: {}", canonical));
                    }
                    outcome => {
                        if let AppendOutcome::AppendedUnsaved(err) = outcome {
                            run.unsaved = true;
                            self.reporter.error(err.to_string());
                        }
                        run.appended += 1;
                        run.stall.record_progress();
                        let len = run.store.len();
                        self.reporter.info(format!(
                            "Collected {} URL {}/{}: {}",
                            kind.label(),
                            len,
                            run.cap,
                            payload
                        ));
                        self.reporter
                            .progress(len, run.cap, format!("Collected {} URLs", len));
                    }
                }
            }
            Ok(None) => {
                run.misses += 1;
                run.stall.record_stall();
                self.reporter.warn(HarvestError::LocatorMiss.to_string());
            }
            Err(e) => {
                run.misses += 1;
                run.stall.record_stall();
                self.reporter
                    .warn(format!("Error during URL collection: {:#}", e));
            }
        }
    }

    /// Reload and reposition until traversal moves again or recoveries run out.
    async fn recover(&self, run: &mut Run, request: &TraversalRequest) -> Recovery {
        self.enter(TraversalPhase::Stalled);
        self.reporter.warn(format!(
            "Stuck at {} URLs, reloading page...",
            run.store.len()
        ));

        if !run.stall.begin_recovery() {
            self.reporter
                .error("Reloading did not get traversal moving again, stopping URL collection");
            return Recovery::Exhausted;
        }

        let anchor = run
            .store
            .last()
            .map(|r| r.canonical_url.clone())
            .or_else(|| request.resume_anchor.clone());

        loop {
            run.recoveries += 1;
            self.enter(TraversalPhase::Recovering);

            let positioning =
                match bounded(self.config.navigation_timeout(), self.driver.reload()).await {
                    Ok(()) => {
                        self.pause().await;
                        self.position(&request.start_location, anchor.as_deref())
                            .await
                    }
                    Err(e) => {
                        self.reporter.warn(format!("Reload failed: {:#}", e));
                        Positioning::NotFound
                    }
                };

            match positioning {
                Positioning::Positioned => {
                    run.stall.recovery_succeeded();
                    self.enter(TraversalPhase::Collecting);
                    return Recovery::Resumed;
                }
                Positioning::Blocked(location) => return Recovery::Blocked(location),
                Positioning::NotFound => {}
            }

            self.reporter.error("Failed to reselect media after reload");
            if !run.stall.recovery_failed() {
                return Recovery::Exhausted;
            }
            self.pause().await;
            // The loop head observes cancellation.
            if self.cancel.is_cancelled() {
                return Recovery::Resumed;
            }
        }
    }

    /// Anchor first, then first-item selection on the start location.
    async fn position(&self, start_location: &str, anchor: Option<&str>) -> Positioning {
        if let Some(anchor) = anchor {
            self.reporter.info(format!("Resuming from URL: {}", anchor));
            if self.navigate_to_item(anchor).await {
                return Positioning::Positioned;
            }
            self.reporter
                .warn("Failed to resume from last URL, starting from album");
        }
        self.select_first(start_location).await
    }

    async fn navigate_to_item(&self, target: &str) -> bool {
        if let Err(e) = bounded(self.config.navigation_timeout(), self.driver.navigate(target)).await {
            self.reporter
                .error(format!("Failed to navigate to media URL: {:#}", e));
            return false;
        }
        self.pause().await;
        match self.driver.current_location().await {
            Ok(location) if self.guard.is_blocked(&location) => {
                self.reporter
                    .error("Login or verification required after navigating to media URL");
                false
            }
            Ok(_) => {
                self.reporter.info(format!("Navigated to media URL: {}", target));
                true
            }
            Err(e) => {
                self.reporter
                    .error(format!("Failed to read location after navigation: {:#}", e));
                false
            }
        }
    }

    async fn select_first(&self, start_location: &str) -> Positioning {
        if let Err(e) = bounded(
            self.config.navigation_timeout(),
            self.driver.navigate(start_location),
        )
        .await
        {
            self.reporter
                .error(format!("Failed to open album {}: {:#}", start_location, e));
            return Positioning::NotFound;
        }
        self.pause().await;

        match self.driver.current_location().await {
            Ok(location) if self.guard.is_blocked(&location) => {
                return Positioning::Blocked(location);
            }
            Ok(_) => {}
            Err(e) => {
                self.reporter
                    .warn(format!("Failed to read location after opening album: {:#}", e));
                return Positioning::NotFound;
            }
        }

        match self.locator.select_first_item(start_location).await {
            Ok(true) => {
                self.reporter.info("Selected first media (image or video)");
                self.pause().await;
                Positioning::Positioned
            }
            Ok(false) => Positioning::NotFound,
            Err(e) => {
                self.reporter
                    .error(format!("Error selecting first media: {:#}", e));
                Positioning::NotFound
            }
        }
    }

    /// Second look after a pause and a reload before declaring the gallery exhausted.
    async fn confirm_end(&self) -> bool {
        self.reporter
            .warn("No media elements found, attempting to detect end of album...");
        self.pause().await;
        if let Err(e) = bounded(self.config.navigation_timeout(), self.driver.reload()).await {
            debug!("reload before end check failed: {:#}", e);
        }
        self.pause().await;
        !self.locator.media_present().await
    }

    async fn pause(&self) {
        tokio::select! {
            _ = sleep(self.config.grab_delay()) => {}
            _ = self.cancel.cancelled() => {}
        }
    }

    fn enter(&self, phase: TraversalPhase) {
        debug!("traversal phase -> {:?}", phase);
    }

    fn blocked(&self, mut run: Run, location: String) -> CollectionResult {
        self.reporter.error(format!(
            "Login or verification required while positioning: {}",
            location
        ));
        run.blocked_at = Some(location);
        self.finish(run, TraversalOutcome::Blocked)
    }

    fn finish(&self, run: Run, outcome: TraversalOutcome) -> CollectionResult {
        self.enter(TraversalPhase::Finished);
        if run.unsaved {
            if let Err(e) = run.store.persist() {
                self.reporter
                    .error(HarvestError::Persistence(format!("{:#}", e)).to_string());
            }
        }
        self.reporter.info(format!(
            "Finished collecting {} media URLs ({:?})",
            run.store.len(),
            outcome
        ));

        CollectionResult {
            outcome,
            appended: run.appended,
            duplicates: run.duplicates,
            misses: run.misses,
            recoveries: run.recoveries,
            failed_recoveries: run.stall.failed_recoveries,
            blocked_at: run.blocked_at,
            records: run.store.into_records(),
        }
    }
}

/*!
 * Submission engine.
 *
 * Drives one synchronization run through
 * `Init -> Authenticating -> WalkingPages -> (SubmittingUnit)* -> AdvancingPage -> ... -> Done | Aborted`.
 *
 * Unit failures are recorded and the walk continues; load, auth and fatal
 * pagination errors abort the run with partial counts kept.
 */

use indicatif::ProgressBar;
use log::{debug, error, info, warn};
use std::collections::HashSet;
use std::time::Duration;
use tokio::time::Instant;
use uuid::Uuid;

use crate::app_config::{Config, RemoteConfig};
use crate::errors::{AuthError, DriverError, LoadError, PaginationError, SyncError, UnitError};
use crate::game::GameInfo;
use crate::providers::FormDriver;
use crate::retry::{CancelToken, RetryPolicy, RetryState};
use crate::session::SessionManager;

use super::extractor::{renew_session, ContentExtractor};
use super::memory::TranslationMemory;
use super::models::{EngineState, PageCursor, SyncResult, TranslationUnit};
use super::{with_timeout, ListingSource, MemorySource, SyncJob};

/// Behaviour switches of a run
#[derive(Debug, Clone)]
pub struct EngineOptions {
    /// Match units without writing
    pub dry_run: bool,
    /// Deadline for each driver operation
    pub operation_timeout: Duration,
    /// Endpoints used to build the listing URL from game metadata
    pub remote: RemoteConfig,
}

impl EngineOptions {
    /// Options from the application configuration
    pub fn from_config(config: &Config) -> Self {
        Self {
            dry_run: config.dry_run,
            operation_timeout: Duration::from_secs(config.remote.timeout_secs),
            remote: config.remote.clone(),
        }
    }
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

/// Why a unit could not be written
enum WriteFailure {
    /// Retries exhausted or permanent fault; the run goes on
    Unit(UnitError),
    /// Re-login failed; the run must stop
    SessionLost(AuthError),
    /// Cancelled while waiting to retry
    Cancelled,
}

/// The synchronization state machine
pub struct SubmissionEngine<D: FormDriver> {
    driver: D,
    sessions: SessionManager,
    policy: RetryPolicy,
    options: EngineOptions,
    cancel: CancelToken,
    progress: ProgressBar,
    state: EngineState,
    /// Units handled during the current run
    seen: HashSet<String>,
}

impl<D: FormDriver> SubmissionEngine<D> {
    /// Create a new engine
    pub fn new(driver: D, sessions: SessionManager, policy: RetryPolicy, options: EngineOptions) -> Self {
        let mut engine = Self {
            driver,
            sessions,
            policy,
            options,
            cancel: CancelToken::new(),
            progress: ProgressBar::hidden(),
            state: EngineState::Init,
            seen: HashSet::new(),
        };
        engine.sessions.set_cancel(engine.cancel.clone());
        engine
    }

    /// Share a cancellation token with the owner of the engine
    pub fn with_cancel(mut self, cancel: CancelToken) -> Self {
        self.sessions.set_cancel(cancel.clone());
        self.cancel = cancel;
        self
    }

    /// Report progress on this bar
    pub fn with_progress(mut self, progress: ProgressBar) -> Self {
        self.progress = progress;
        self
    }

    /// Current state
    pub fn state(&self) -> EngineState {
        self.state
    }

    /// The form driver
    pub fn driver(&self) -> &D {
        &self.driver
    }

    /// The session manager
    pub fn sessions(&self) -> &SessionManager {
        &self.sessions
    }

    /// Token that stops the run
    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    /// Run one synchronization to completion
    pub async fn run(&mut self, job: SyncJob) -> SyncResult {
        let started = Instant::now();
        let mut result = SyncResult::new(Uuid::new_v4().to_string());
        self.seen.clear();
        self.state = EngineState::Init;

        info!(
            "Starting synchronization run {}{}",
            result.run_id,
            if self.options.dry_run { " (dry run)" } else { "" }
        );

        let outcome = self.drive(job, &mut result).await;
        self.finish(result, outcome, started)
    }

    async fn drive(&mut self, job: SyncJob, result: &mut SyncResult) -> Result<(), SyncError> {
        let (memory, start) = self.prepare(job)?;
        self.check_cancelled()?;

        self.transition(EngineState::Authenticating);
        let session = self.sessions.acquire().await?;
        with_timeout(self.options.operation_timeout, self.driver.attach_session(&session)).await?;

        let mut extractor = ContentExtractor::new(
            PageCursor::At(start),
            self.policy,
            self.options.operation_timeout,
            self.cancel.clone(),
        )
        .with_login_paths(login_paths(&self.options.remote));

        loop {
            self.check_cancelled()?;
            self.transition(EngineState::WalkingPages);

            let page = match extractor.next_page(&mut self.driver, &mut self.sessions).await {
                Ok(Some(page)) => page,
                Ok(None) => break,
                Err(PaginationError::Cancelled) => return Err(SyncError::Cancelled),
                Err(e) => {
                    result.page_errors.push(e.clone());
                    return Err(e.into());
                }
            };
            result.pages_visited += 1;
            if let Some(warning) = page.warning.clone() {
                result.page_errors.push(warning);
            }
            self.progress
                .set_message(format!("page {} ({} units)", page.number, page.units.len()));

            for unit in &page.units {
                self.check_cancelled()?;
                self.transition(EngineState::SubmittingUnit);
                self.process_unit(unit, &page.cursor, &memory, result).await?;
                self.progress.inc(1);
            }

            self.transition(EngineState::AdvancingPage);
            if page.next.is_terminal() {
                break;
            }
        }

        Ok(())
    }

    /// Load the memory and work out where the listing starts
    fn prepare(&mut self, job: SyncJob) -> Result<(TranslationMemory, String), LoadError> {
        let memory = match job.memory {
            MemorySource::Table(path) => TranslationMemory::load(path)?,
            MemorySource::Loaded(memory) => memory,
        };

        let start = match job.listing {
            ListingSource::Url(url) => url,
            ListingSource::GameMetadata(path) => {
                let info = GameInfo::load(&path)?;
                let module_id = info.require_module_id(&path)?;
                self.options
                    .remote
                    .untranslated_listing_url(module_id)
                    .map_err(|e| LoadError::Malformed {
                        path: path.clone(),
                        message: e.to_string(),
                    })?
                    .to_string()
            }
        };

        info!("{} translations loaded, listing starts at {}", memory.len(), start);
        Ok((memory, start))
    }

    async fn process_unit(
        &mut self,
        unit: &TranslationUnit,
        cursor: &PageCursor,
        memory: &TranslationMemory,
        result: &mut SyncResult,
    ) -> Result<(), SyncError> {
        result.units_seen += 1;

        if self.seen.contains(&unit.id) {
            debug!("Unit {} already handled in this run", unit.id);
            result.skipped_duplicate += 1;
            return Ok(());
        }

        let Some(translation) = memory.lookup(&unit.source_text) else {
            debug!("No translation for unit {}: {:?}", unit.id, unit.source_text);
            result.skipped_no_match += 1;
            return Ok(());
        };
        result.matched += 1;

        if unit.current_translation == translation {
            debug!("Unit {} already holds the translation", unit.id);
            result.already_current += 1;
            self.seen.insert(unit.id.clone());
            return Ok(());
        }

        if self.options.dry_run {
            info!("[dry run] Would submit unit {}: {:?} -> {:?}", unit.id, unit.source_text, translation);
            result.would_submit += 1;
            self.seen.insert(unit.id.clone());
            return Ok(());
        }

        match self.write_unit(unit, translation, cursor).await {
            Ok(attempts) => {
                info!("Submitted unit {} (attempt {})", unit.id, attempts);
                result.submitted += 1;
                self.seen.insert(unit.id.clone());
                Ok(())
            }
            Err(WriteFailure::Unit(e)) => {
                error!("{} (page {})", e, e.cursor);
                result.unit_errors.push(e);
                Ok(())
            }
            Err(WriteFailure::SessionLost(e)) => Err(e.into()),
            Err(WriteFailure::Cancelled) => Err(SyncError::Cancelled),
        }
    }

    /// Write and verify one unit; returns the number of attempts used
    async fn write_unit(
        &mut self,
        unit: &TranslationUnit,
        translation: &str,
        cursor: &PageCursor,
    ) -> Result<u32, WriteFailure> {
        let field_id = unit.target_field_id();
        let mut state = RetryState::new(format!("unit {}", unit.id));
        let mut renewed = false;

        loop {
            let fault = match self.write_and_verify(&field_id, translation).await {
                Ok(()) => return Ok(state.attempts() + 1),
                Err(e) => e,
            };

            if fault.is_auth_rejection() {
                self.sessions.invalidate();
                if renewed {
                    error!("Session rejected again while writing unit {}: {}", unit.id, fault);
                    return Err(WriteFailure::SessionLost(AuthError::SessionRejected(fault.to_string())));
                }
                warn!("Session rejected while writing unit {} ({}), logging in again", unit.id, fault);
                renewed = true;
                renew_session(&mut self.driver, &mut self.sessions)
                    .await
                    .map_err(WriteFailure::SessionLost)?;
                // The field lives on the page; reload it under the new session
                if let Some(url) = cursor.url() {
                    if let Err(e) = self.reload(url).await {
                        warn!("Failed to reload {} after login: {}", url, e);
                    }
                }
                continue;
            }

            let attempt = state.record_attempt();
            warn!(
                "Failed to write unit {} on {}: {} - attempt {}/{}",
                unit.id, cursor, fault, attempt, self.policy.max_attempts
            );

            if !fault.is_transient() || state.exhausted(&self.policy) {
                return Err(WriteFailure::Unit(UnitError {
                    unit_id: unit.id.clone(),
                    cursor: cursor.to_string(),
                    attempts: attempt,
                    message: fault.to_string(),
                }));
            }

            let hint = fault.retry_after_secs().map(Duration::from_secs);
            state
                .backoff(&self.policy, hint, &self.cancel)
                .await
                .map_err(|_| WriteFailure::Cancelled)?;
        }
    }

    async fn write_and_verify(&mut self, field_id: &str, text: &str) -> Result<(), DriverError> {
        let limit = self.options.operation_timeout;
        with_timeout(limit, self.driver.locate_and_fill(field_id, text)).await?;
        with_timeout(limit, self.driver.wait_for_idle()).await?;

        let found = with_timeout(limit, self.driver.field_value(field_id)).await?;
        if found.as_deref() != Some(text) {
            return Err(DriverError::VerificationFailed {
                field_id: field_id.to_string(),
                expected: text.to_string(),
                found,
            });
        }
        Ok(())
    }

    async fn reload(&mut self, url: &str) -> Result<(), DriverError> {
        let limit = self.options.operation_timeout;
        with_timeout(limit, self.driver.navigate(url)).await?;
        with_timeout(limit, self.driver.wait_for_idle()).await
    }

    fn check_cancelled(&self) -> Result<(), SyncError> {
        if self.cancel.is_cancelled() {
            return Err(SyncError::Cancelled);
        }
        Ok(())
    }

    fn transition(&mut self, next: EngineState) {
        if self.state != next {
            debug!("{} -> {}", self.state, next);
            self.state = next;
        }
    }

    fn finish(&mut self, mut result: SyncResult, outcome: Result<(), SyncError>, started: Instant) -> SyncResult {
        match outcome {
            Ok(()) => {
                self.transition(EngineState::Done);
                info!("Synchronization {} finished: {}", result.run_id, result.summary());
            }
            Err(e) => {
                self.transition(EngineState::Aborted);
                result.aborted = true;
                result.cancelled = matches!(
                    e,
                    SyncError::Cancelled
                        | SyncError::Auth(AuthError::Cancelled)
                        | SyncError::Pagination(PaginationError::Cancelled)
                );
                if result.cancelled {
                    warn!("Synchronization {} cancelled: {}", result.run_id, result.summary());
                } else {
                    error!("Synchronization {} aborted: {} ({})", result.run_id, e, result.summary());
                }
                result.abort_reason = Some(e.to_string());
            }
        }
        result.final_state = self.state;
        result.elapsed = started.elapsed();
        self.progress.finish_and_clear();
        result
    }
}

fn login_paths(remote: &RemoteConfig) -> Vec<String> {
    vec![remote.entry_path.clone()]
}

/*!
 * Session manager for the login handshake.
 *
 * This module handles:
 * - Scraping the anti-forgery request token from the entry page
 * - Posting credentials and interpreting the structured response
 * - Sitting out server-imposed rate limits
 * - Invalidating and re-acquiring the session
 */

use log::{debug, error, info, warn};
use once_cell::sync::Lazy;
use rand::Rng;
use regex::Regex;
use std::sync::Arc;
use std::time::Duration;

use crate::errors::AuthError;
use crate::providers::AuthTransport;
use crate::retry::{CancelToken, RetryPolicy, RetryState};

use super::models::{Credentials, LoginForm, LoginOutcome, Session, SessionOptions};

/// Source of the current unix time in seconds
pub type UnixClock = Arc<dyn Fn() -> i64 + Send + Sync>;

// Tried in order, first match wins
static TOKEN_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    [
        r#"(?i)requestToken:\s*["']([^"']+)["']"#,
        r#"(?i)requestToken:\s*([^"'\s,}]+)"#,
        r#"(?i)bgaConfig\s*=\s*\{[^}]*requestToken:\s*["']([^"']+)["']"#,
        r#"(?i)request_token:\s*["']([^"']+)["']"#,
        r#"(?i)request_token:\s*([^"'\s,}]+)"#,
        r#"(?i)bgaConfig\s*=\s*\{[^}]*request_token:\s*["']([^"']+)["']"#,
    ]
    .iter()
    .filter_map(|pattern| Regex::new(pattern).ok())
    .collect()
});

/// Find the request token embedded in the entry page
pub fn extract_request_token(page: &str) -> Option<String> {
    TOKEN_PATTERNS.iter().find_map(|pattern| {
        pattern
            .captures(page)
            .and_then(|caps| caps.get(1))
            .map(|m| m.as_str().to_string())
            .filter(|token| !token.is_empty())
    })
}

/// Owns the single authenticated session of an engine
pub struct SessionManager {
    /// HTTP surface for the handshake
    transport: Box<dyn AuthTransport>,
    credentials: Credentials,
    policy: RetryPolicy,
    options: SessionOptions,
    cancel: CancelToken,
    clock: UnixClock,
    session: Option<Session>,
    /// Sessions established so far
    generation: u32,
    /// Login posts made so far, rate-limited ones included
    login_attempts: u32,
}

impl SessionManager {
    /// Create a new session manager
    pub fn new(
        transport: Box<dyn AuthTransport>,
        credentials: Credentials,
        policy: RetryPolicy,
        options: SessionOptions,
    ) -> Self {
        Self {
            transport,
            credentials,
            policy,
            options,
            cancel: CancelToken::new(),
            clock: Arc::new(|| chrono::Utc::now().timestamp()),
            session: None,
            generation: 0,
            login_attempts: 0,
        }
    }

    /// Use the given cancellation token for every wait
    pub fn with_cancel(mut self, cancel: CancelToken) -> Self {
        self.set_cancel(cancel);
        self
    }

    /// Replace the cancellation token in place
    pub fn set_cancel(&mut self, cancel: CancelToken) {
        self.cancel = cancel;
    }

    /// Replace the clock used to interpret `wait_until` timestamps
    pub fn with_clock(mut self, clock: UnixClock) -> Self {
        self.clock = clock;
        self
    }

    /// Whether a usable session is held
    pub fn is_valid(&self) -> bool {
        self.session.as_ref().is_some_and(Session::is_valid)
    }

    /// The current session, if still valid
    pub fn session(&self) -> Option<&Session> {
        self.session.as_ref().filter(|s| s.is_valid())
    }

    /// Login posts made so far
    pub fn login_attempts(&self) -> u32 {
        self.login_attempts
    }

    /// Sessions established so far
    pub fn generation(&self) -> u32 {
        self.generation
    }

    /// Mark the current session as unusable
    pub fn invalidate(&mut self) {
        if let Some(session) = self.session.as_mut() {
            if session.is_valid() {
                warn!("Invalidating session #{}", session.generation());
            }
            session.invalidate();
        }
    }

    /// Return the current session or establish a new one
    pub async fn acquire(&mut self) -> Result<Session, AuthError> {
        if let Some(session) = self.session() {
            return Ok(session.clone());
        }

        let token = self.fetch_request_token().await?;

        if self.options.verify_username {
            self.check_username(&token).await?;
        } else {
            debug!("Skipping username check for {}", self.credentials.principal());
        }

        self.login(token).await
    }

    /// Drop the current session and log in again
    pub async fn reauthenticate(&mut self) -> Result<Session, AuthError> {
        self.invalidate();
        self.acquire().await
    }

    async fn fetch_request_token(&mut self) -> Result<String, AuthError> {
        let mut state = RetryState::new("request token");

        loop {
            let attempt = state.record_attempt();
            let last_fault: Option<String>;
            self.pause_before_request().await?;

            debug!("Fetching entry page (attempt {}/{})", attempt, self.policy.max_attempts);
            match self.transport.fetch_entry_page().await {
                Ok(page) => match extract_request_token(&page) {
                    Some(token) => {
                        debug!("Request token found on attempt {}", attempt);
                        return Ok(token);
                    }
                    None => {
                        warn!(
                            "Request token not found on entry page (attempt {}/{}, {} bytes)",
                            attempt,
                            self.policy.max_attempts,
                            page.len()
                        );
                        last_fault = None;
                    }
                },
                Err(e) => {
                    warn!(
                        "Failed to fetch entry page: {} - attempt {}/{}",
                        e, attempt, self.policy.max_attempts
                    );
                    last_fault = Some(e.to_string());
                }
            }

            if state.exhausted(&self.policy) {
                error!("Giving up on the request token after {} attempts", attempt);
                return Err(match last_fault {
                    Some(last_error) => AuthError::RetriesExhausted { attempts: attempt, last_error },
                    None => AuthError::TokenNotFound { attempts: attempt },
                });
            }

            state
                .backoff(&self.policy, None, &self.cancel)
                .await
                .map_err(|_| AuthError::Cancelled)?;
        }
    }

    async fn check_username(&mut self, request_token: &str) -> Result<(), AuthError> {
        let mut state = RetryState::new("username check");

        loop {
            let attempt = state.record_attempt();
            let fault = match self
                .transport
                .check_username(self.credentials.principal(), request_token)
                .await
            {
                Ok(body) => match LoginOutcome::parse(&body) {
                    LoginOutcome::Success => {
                        debug!("Username {} accepted", self.credentials.principal());
                        return Ok(());
                    }
                    LoginOutcome::Rejected { message } | LoginOutcome::RateLimited { message, .. } => {
                        return Err(AuthError::UsernameCheck(message));
                    }
                    LoginOutcome::Malformed(message) => message,
                },
                Err(e) => e.to_string(),
            };

            warn!("Username check failed: {} - attempt {}/{}", fault, attempt, self.policy.max_attempts);
            if state.exhausted(&self.policy) {
                return Err(AuthError::RetriesExhausted { attempts: attempt, last_error: fault });
            }
            state
                .backoff(&self.policy, None, &self.cancel)
                .await
                .map_err(|_| AuthError::Cancelled)?;
        }
    }

    async fn login(&mut self, request_token: String) -> Result<Session, AuthError> {
        let form = LoginForm {
            username: self.credentials.principal().to_string(),
            password: self.credentials.secret().to_string(),
            remember_me: self.options.remember_me,
            request_token,
        };
        let mut state = RetryState::new("login");
        let mut rate_limit_waits = 0u32;

        loop {
            if self.cancel.is_cancelled() {
                return Err(AuthError::Cancelled);
            }
            self.pause_before_request().await?;

            self.login_attempts += 1;
            let attempt = state.attempts() + 1;
            info!(
                "Logging in as {} (attempt {}/{})",
                form.username, attempt, self.policy.max_attempts
            );

            let outcome = match self.transport.submit_login(&form).await {
                Ok(body) => LoginOutcome::parse(&body),
                Err(e) => LoginOutcome::Malformed(e.to_string()),
            };

            match outcome {
                LoginOutcome::Success => {
                    self.generation += 1;
                    let session = Session::new(form.request_token.clone(), self.generation);
                    self.session = Some(session.clone());
                    info!("Login successful, session #{} established", self.generation);
                    return Ok(session);
                }
                LoginOutcome::RateLimited { wait_until, message }
                    if rate_limit_waits < self.options.max_rate_limit_waits =>
                {
                    rate_limit_waits += 1;
                    let hint = RetryPolicy::hint_until(wait_until, (self.clock)());
                    let wait = self.policy.next_delay(state.attempts(), Some(hint));
                    warn!(
                        "Login rate limited ({}), waiting {:?} ({}/{})",
                        message, wait, rate_limit_waits, self.options.max_rate_limit_waits
                    );
                    state
                        .pause(wait, &self.cancel)
                        .await
                        .map_err(|_| AuthError::Cancelled)?;
                    continue;
                }
                LoginOutcome::RateLimited { message, .. } => {
                    error!("Still rate limited after {} waits: {}", rate_limit_waits, message);
                    return Err(AuthError::RetriesExhausted {
                        attempts: state.attempts() + rate_limit_waits + 1,
                        last_error: message,
                    });
                }
                LoginOutcome::Rejected { message } => {
                    let attempt = state.record_attempt();
                    warn!("Login rejected: {} - attempt {}/{}", message, attempt, self.policy.max_attempts);
                    if state.exhausted(&self.policy) {
                        error!("Login rejected {} times, giving up", attempt);
                        return Err(AuthError::Rejected { message });
                    }
                }
                LoginOutcome::Malformed(message) => {
                    let attempt = state.record_attempt();
                    warn!(
                        "Unusable login response: {} - attempt {}/{}",
                        message, attempt, self.policy.max_attempts
                    );
                    if state.exhausted(&self.policy) {
                        error!("Login failed after {} attempts", attempt);
                        return Err(AuthError::RetriesExhausted { attempts: attempt, last_error: message });
                    }
                }
            }

            state
                .backoff(&self.policy, None, &self.cancel)
                .await
                .map_err(|_| AuthError::Cancelled)?;
        }
    }

    // Spread requests out a little; the site flags perfectly regular clients
    async fn pause_before_request(&self) -> Result<(), AuthError> {
        let max_ms = self.options.request_jitter.as_millis() as u64;
        if max_ms == 0 {
            return Ok(());
        }
        let jitter_ms = rand::rng().random_range(0..=max_ms);
        self.cancel
            .sleep(Duration::from_millis(jitter_ms))
            .await
            .map_err(|_| AuthError::Cancelled)
    }
}

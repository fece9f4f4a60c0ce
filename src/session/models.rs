/*!
 * Session-specific models.
 *
 * Credentials, the live session handle, the login form and the decoded
 * login response used by the session manager.
 */

use chrono::{DateTime, Utc};
use serde_json::Value;
use std::fmt;
use std::time::Duration;

use crate::app_config::{AuthConfig, RetryConfig};
use crate::errors::AuthError;

/// Immutable login credentials
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    principal: String,
    secret: String,
}

impl Credentials {
    /// Create credentials from a username/email and password
    pub fn new(principal: impl Into<String>, secret: impl Into<String>) -> Self {
        Self {
            principal: principal.into(),
            secret: secret.into(),
        }
    }

    /// Read credentials from the environment variables named in the config
    pub fn from_env(auth: &AuthConfig) -> Result<Self, AuthError> {
        let principal = std::env::var(&auth.username_env).unwrap_or_default();
        let secret = std::env::var(&auth.password_env).unwrap_or_default();
        if principal.trim().is_empty() || secret.is_empty() {
            return Err(AuthError::MissingCredentials(format!(
                "set {} and {}",
                auth.username_env, auth.password_env
            )));
        }
        Ok(Self::new(principal.trim(), secret))
    }

    /// Username or email
    pub fn principal(&self) -> &str {
        &self.principal
    }

    /// Password
    pub fn secret(&self) -> &str {
        &self.secret
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("principal", &self.principal)
            .field("secret", &"<redacted>")
            .finish()
    }
}

/// Authenticated session handle
#[derive(Debug, Clone, PartialEq)]
pub struct Session {
    token: String,
    valid: bool,
    generation: u32,
    acquired_at: DateTime<Utc>,
}

impl Session {
    /// Create a valid session from a request token
    pub fn new(token: impl Into<String>, generation: u32) -> Self {
        Self {
            token: token.into(),
            valid: true,
            generation,
            acquired_at: Utc::now(),
        }
    }

    /// Request token sent with authenticated requests
    pub fn token(&self) -> &str {
        &self.token
    }

    /// Whether the session may still be used
    pub fn is_valid(&self) -> bool {
        self.valid
    }

    /// How many sessions the manager had established, this one included
    pub fn generation(&self) -> u32 {
        self.generation
    }

    /// When the session was established
    pub fn acquired_at(&self) -> DateTime<Utc> {
        self.acquired_at
    }

    pub(crate) fn invalidate(&mut self) {
        self.valid = false;
    }
}

/// Behaviour switches for the login flow
#[derive(Debug, Clone)]
pub struct SessionOptions {
    /// Run the username check before the password login
    pub verify_username: bool,
    /// Ask the site to keep the session alive
    pub remember_me: bool,
    /// How many rate-limit waits a single acquire may sit through
    pub max_rate_limit_waits: u32,
    /// Upper bound of the random pause before each login request
    pub request_jitter: Duration,
}

impl SessionOptions {
    /// Build options from the config sections
    pub fn from_config(auth: &AuthConfig, retry: &RetryConfig) -> Self {
        Self {
            verify_username: auth.verify_username,
            remember_me: auth.remember_me,
            max_rate_limit_waits: retry.max_rate_limit_waits,
            request_jitter: Duration::from_millis(retry.request_jitter_ms),
        }
    }
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self::from_config(&AuthConfig::default(), &RetryConfig::default())
    }
}

/// Form submitted to the password login endpoint
#[derive(Debug, Clone)]
pub struct LoginForm {
    /// Username or email
    pub username: String,
    /// Password
    pub password: String,
    /// Keep the session alive
    pub remember_me: bool,
    /// Anti-forgery token scraped from the entry page
    pub request_token: String,
}

impl LoginForm {
    /// Form fields in submission order
    pub fn to_pairs(&self) -> Vec<(&'static str, String)> {
        vec![
            ("username", self.username.clone()),
            ("password", self.password.clone()),
            ("remember_me", self.remember_me.to_string()),
            ("request_token", self.request_token.clone()),
        ]
    }
}

/// Decoded login endpoint response
#[derive(Debug, Clone, PartialEq)]
pub enum LoginOutcome {
    /// Credentials accepted
    Success,
    /// Refused until the given unix timestamp
    RateLimited {
        /// Unix timestamp (seconds) before which we must not retry
        wait_until: i64,
        /// Error message from the site
        message: String,
    },
    /// Refused without a wait hint
    Rejected {
        /// Error message from the site
        message: String,
    },
    /// Response could not be interpreted
    Malformed(String),
}

impl LoginOutcome {
    /// Interpret a raw login response body.
    ///
    /// The site answers `{"status": 1}` on success and
    /// `{"status": 0, "error": "...", "wait_until": <unix>}` on failure.
    pub fn parse(body: &str) -> Self {
        let value: Value = match serde_json::from_str(body) {
            Ok(value) => value,
            Err(e) => return Self::Malformed(format!("invalid JSON: {}", e)),
        };

        let status = value.get("status").and_then(json_int);
        let success_flag = value.get("success").and_then(Value::as_bool);
        let message = value
            .get("error")
            .and_then(Value::as_str)
            .unwrap_or("unknown error")
            .to_string();

        match (status, success_flag) {
            (Some(1), _) | (None, Some(true)) => Self::Success,
            (Some(0), _) | (None, Some(false)) => {
                match value.get("wait_until").and_then(json_int) {
                    Some(wait_until) => Self::RateLimited { wait_until, message },
                    None => Self::Rejected { message },
                }
            }
            _ => Self::Malformed(format!("unexpected status in response: {}", truncate(body, 200))),
        }
    }
}

// The site is inconsistent about quoting numbers
fn json_int(value: &Value) -> Option<i64> {
    value
        .as_i64()
        .or_else(|| value.as_str().and_then(|s| s.trim().parse().ok()))
}

fn truncate(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        text.to_string()
    } else {
        format!("{}...", text.chars().take(max_chars).collect::<String>())
    }
}

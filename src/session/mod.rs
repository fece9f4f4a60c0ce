/*!
 * Session management for the remote translation site.
 *
 * This module provides:
 * - Credentials and the live session handle
 * - The login handshake with retry and rate-limit handling
 * - Invalidation and re-acquisition of the session
 */

pub mod manager;
pub mod models;

// Re-export main types
pub use manager::{extract_request_token, SessionManager, UnixClock};
pub use models::{Credentials, LoginForm, LoginOutcome, Session, SessionOptions};

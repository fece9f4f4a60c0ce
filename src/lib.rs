/*!
 * # bgasync - translation synchronization for Board Game Arena
 *
 * A Rust library that pushes locally maintained game translations into the
 * Board Game Arena translation interface.
 *
 * ## Features
 *
 * - Log in with the site's token handshake, sitting out rate limits
 * - Load a source-text to translation table from a Markdown pipe table
 * - Walk the paginated listing of untranslated strings
 * - Fill in and verify every string the table knows, at most once per run
 * - Linear retry backoff with cooperative cancellation
 * - Dry-run mode reporting what would be written
 *
 * ## Architecture
 *
 * The library is organized in these main modules:
 * - `app_config`: Configuration management
 * - `session`: Credentials, sessions and the login handshake
 * - `sync`: Translation memory, page extraction and the submission engine
 * - `providers`: Remote surface traits and their implementations:
 *   - `providers::bga`: reqwest client for the live site
 *   - `providers::mock`: scripted in-memory site for tests
 * - `retry`: Retry policy and cancellable waits
 * - `game`: Per-game data directory layout
 * - `file_utils`: File system operations
 * - `app_controller`: Main application controller
 * - `language_utils`: Locale code utilities
 * - `errors`: Custom error types for the application
 *
 * ## License
 *
 * This project is licensed under the MIT License
 */

// Global lints configuration
// These lints will be allowed but not auto-fixed
#![allow(clippy::uninlined_format_args)]
#![allow(clippy::redundant_closure_for_method_calls)]

// Public modules
pub mod app_config;
pub mod app_controller;
pub mod errors;
pub mod file_utils;
pub mod game;
pub mod language_utils;
pub mod providers;
pub mod retry;
pub mod session;
pub mod sync;

// Re-export main types for easier usage
pub use app_config::Config;
pub use app_controller::Controller;
pub use errors::{AuthError, DriverError, LoadError, PaginationError, SyncError, UnitError};
pub use retry::{CancelToken, RetryPolicy, RetryState};
pub use session::{Credentials, Session, SessionManager};
pub use sync::{EngineState, SubmissionEngine, SyncJob, SyncResult, TranslationMemory, TranslationUnit};

/*!
 * Translation synchronization.
 *
 * This module provides:
 * - `memory`: the local source-text to translation table
 * - `extractor`: lazy walk over the remote listing pages
 * - `engine`: the submission state machine tying everything together
 * - `html`: markup scanning helpers
 * - `models`: units, cursors, pages and the run summary
 */

pub mod engine;
pub mod extractor;
pub mod html;
pub mod memory;
pub mod models;

use std::future::Future;
use std::path::PathBuf;
use std::time::Duration;

use crate::errors::DriverError;

// Re-export main types
pub use engine::{EngineOptions, SubmissionEngine};
pub use extractor::ContentExtractor;
pub use memory::TranslationMemory;
pub use models::{EngineState, Page, PageCursor, SyncResult, TranslationUnit};

/// Where the translation memory comes from
#[derive(Debug, Clone)]
pub enum MemorySource {
    /// A pipe table on disk
    Table(PathBuf),
    /// An already built memory
    Loaded(TranslationMemory),
}

/// Where the listing walk starts
#[derive(Debug, Clone)]
pub enum ListingSource {
    /// Build the untranslated listing URL from a game metadata file
    GameMetadata(PathBuf),
    /// Start at this URL
    Url(String),
}

/// Inputs of one synchronization run
#[derive(Debug, Clone)]
pub struct SyncJob {
    /// Translation memory
    pub memory: MemorySource,
    /// First listing page
    pub listing: ListingSource,
}

impl SyncJob {
    /// A job over files on disk
    pub fn from_files(table: impl Into<PathBuf>, metadata: impl Into<PathBuf>) -> Self {
        Self {
            memory: MemorySource::Table(table.into()),
            listing: ListingSource::GameMetadata(metadata.into()),
        }
    }

    /// A job over an in-memory table and a known start URL
    pub fn in_memory(memory: TranslationMemory, start_url: impl Into<String>) -> Self {
        Self {
            memory: MemorySource::Loaded(memory),
            listing: ListingSource::Url(start_url.into()),
        }
    }
}

/// Run a driver operation under a deadline; overruns become `DriverError::Timeout`
pub(crate) async fn with_timeout<T, F>(limit: Duration, operation: F) -> Result<T, DriverError>
where
    F: Future<Output = Result<T, DriverError>>,
{
    match tokio::time::timeout(limit, operation).await {
        Ok(result) => result,
        Err(_) => Err(DriverError::Timeout(limit.as_millis() as u64)),
    }
}

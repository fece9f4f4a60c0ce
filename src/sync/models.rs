/*!
 * Data types shared by the extractor and the submission engine.
 */

use std::fmt;
use std::time::Duration;

use crate::errors::{PaginationError, UnitError};

/// Id prefix of the read-only textarea holding the source text
pub const SOURCE_FIELD_PREFIX: &str = "toTranslate_";

/// Id prefix of the editable textarea receiving the translation
pub const TARGET_FIELD_PREFIX: &str = "translated_";

/// A translatable string as found on a listing page
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TranslationUnit {
    /// Remote identifier, unique within a run
    pub id: String,
    /// Source text, exactly as displayed
    pub source_text: String,
    /// Context shown next to the string, if any
    pub context: Option<String>,
    /// Translation already stored remotely; empty when untranslated
    pub current_translation: String,
}

impl TranslationUnit {
    /// Create an untranslated unit
    pub fn new(id: impl Into<String>, source_text: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            source_text: source_text.into(),
            context: None,
            current_translation: String::new(),
        }
    }

    /// Id of the field the translation is written to
    pub fn target_field_id(&self) -> String {
        format!("{}{}", TARGET_FIELD_PREFIX, self.id)
    }
}

/// Position in the paginated listing
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PageCursor {
    /// A page still to be fetched
    At(String),
    /// No more pages
    End,
}

impl PageCursor {
    /// Whether the listing is exhausted
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::End)
    }

    /// URL of the page, if any
    pub fn url(&self) -> Option<&str> {
        match self {
            Self::At(url) => Some(url),
            Self::End => None,
        }
    }
}

impl fmt::Display for PageCursor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::At(url) => f.write_str(url),
            Self::End => f.write_str("<end>"),
        }
    }
}

/// One fetched listing page
#[derive(Debug, Clone, PartialEq)]
pub struct Page {
    /// 1-based position in the walk
    pub number: usize,
    /// Cursor the page was fetched from
    pub cursor: PageCursor,
    /// Units in document order, deduplicated by id
    pub units: Vec<TranslationUnit>,
    /// Where the pagination control leads
    pub next: PageCursor,
    /// Non-fatal pagination problem noticed on this page
    pub warning: Option<PaginationError>,
}

/// States of the submission engine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    /// Loading local inputs
    Init,
    /// Establishing the session
    Authenticating,
    /// Fetching the page at the cursor
    WalkingPages,
    /// Matching and writing a unit
    SubmittingUnit,
    /// Moving the cursor forward
    AdvancingPage,
    /// Terminal: listing exhausted
    Done,
    /// Terminal: fatal error or cancellation
    Aborted,
}

impl EngineState {
    /// Whether no further transition can happen
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done | Self::Aborted)
    }
}

impl fmt::Display for EngineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Init => "Init",
            Self::Authenticating => "Authenticating",
            Self::WalkingPages => "WalkingPages",
            Self::SubmittingUnit => "SubmittingUnit",
            Self::AdvancingPage => "AdvancingPage",
            Self::Done => "Done",
            Self::Aborted => "Aborted",
        };
        f.write_str(name)
    }
}

/// Outcome of one synchronization run
#[derive(Debug, Clone)]
pub struct SyncResult {
    /// Identifier used in log lines of this run
    pub run_id: String,
    /// Pages fetched
    pub pages_visited: usize,
    /// Units encountered, duplicates included
    pub units_seen: usize,
    /// Units whose source text had a translation
    pub matched: usize,
    /// Units written and verified
    pub submitted: usize,
    /// Units that would have been written in dry-run mode
    pub would_submit: usize,
    /// Units whose remote translation already matched
    pub already_current: usize,
    /// Units without a translation in the memory
    pub skipped_no_match: usize,
    /// Units already handled earlier in the run
    pub skipped_duplicate: usize,
    /// Units that could not be written
    pub unit_errors: Vec<UnitError>,
    /// Pagination problems, fatal or not
    pub page_errors: Vec<PaginationError>,
    /// Whether the run stopped early
    pub aborted: bool,
    /// Why the run stopped early
    pub abort_reason: Option<String>,
    /// Whether the stop was a cancellation
    pub cancelled: bool,
    /// State the engine ended in
    pub final_state: EngineState,
    /// Wall time of the run
    pub elapsed: Duration,
}

impl SyncResult {
    /// An empty result for a new run
    pub fn new(run_id: impl Into<String>) -> Self {
        Self {
            run_id: run_id.into(),
            pages_visited: 0,
            units_seen: 0,
            matched: 0,
            submitted: 0,
            would_submit: 0,
            already_current: 0,
            skipped_no_match: 0,
            skipped_duplicate: 0,
            unit_errors: Vec::new(),
            page_errors: Vec::new(),
            aborted: false,
            abort_reason: None,
            cancelled: false,
            final_state: EngineState::Init,
            elapsed: Duration::ZERO,
        }
    }

    /// Units that failed
    pub fn failed(&self) -> usize {
        self.unit_errors.len()
    }

    /// Whether the listing was walked to the end
    pub fn completed(&self) -> bool {
        self.final_state == EngineState::Done && !self.aborted
    }

    /// One-line summary for logs
    pub fn summary(&self) -> String {
        format!(
            "pages={} seen={} matched={} submitted={} would_submit={} current={} no_match={} duplicate={} failed={}",
            self.pages_visited,
            self.units_seen,
            self.matched,
            self.submitted,
            self.would_submit,
            self.already_current,
            self.skipped_no_match,
            self.skipped_duplicate,
            self.failed()
        )
    }
}

impl fmt::Display for SyncResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {} in {:.1?}", self.final_state, self.summary(), self.elapsed)?;
        if let Some(reason) = &self.abort_reason {
            write!(f, " ({})", reason)?;
        }
        Ok(())
    }
}

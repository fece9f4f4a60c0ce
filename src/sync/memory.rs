/*!
 * Translation memory loaded from a pipe-delimited table.
 *
 * The table looks like
 *
 * ```text
 * | 原文 | 上下文 | 译文 |
 * |------|--------|------|
 * | Move 3 spaces | Movement | 移动3格 |
 * ```
 *
 * Column 2 is the source text and column 4 the translation. Later rows win
 * over earlier ones; rows with an empty source or translation are ignored.
 */

use log::{debug, info, warn};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use crate::errors::LoadError;

const SOURCE_LABELS: &[&str] = &["原文", "source", "source text", "original", "english"];
const TRANSLATION_LABELS: &[&str] = &["译文", "translation", "translated", "chinese"];

/// Immutable source-text to translation map
#[derive(Debug, Clone, Default)]
pub struct TranslationMemory {
    entries: HashMap<String, String>,
    /// File the entries were loaded from
    source: Option<PathBuf>,
    /// Data rows accepted, duplicates included
    rows_accepted: usize,
    /// Data rows ignored for an empty cell
    rows_dropped: usize,
}

impl TranslationMemory {
    /// Load a table file; an unreadable file or a table without a single
    /// usable row is an error
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, LoadError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|source| LoadError::Io {
            path: path.to_path_buf(),
            source,
        })?;

        let mut memory = Self::parse(&content);
        memory.source = Some(path.to_path_buf());

        if memory.is_empty() {
            warn!("No usable rows in {:?}", path);
            return Err(LoadError::EmptyTable(path.to_path_buf()));
        }

        info!(
            "Loaded {} translations from {:?} ({} rows, {} dropped)",
            memory.len(),
            path,
            memory.rows_accepted,
            memory.rows_dropped
        );
        Ok(memory)
    }

    /// Parse table text
    pub fn parse(content: &str) -> Self {
        let mut memory = Self::default();
        let lines: Vec<&str> = content.lines().collect();

        for (index, line) in lines.iter().enumerate() {
            if !is_table_row(line) || is_separator_row(line) {
                continue;
            }
            let next_is_separator = lines.get(index + 1).is_some_and(|next| is_separator_row(next));
            let cells: Vec<&str> = line.split('|').map(str::trim).collect();
            if next_is_separator || is_header_cells(&cells) {
                debug!("Skipping header row {}", index + 1);
                continue;
            }

            let (key, value) = (cells[1], cells[3]);
            if key.is_empty() || value.is_empty() {
                memory.rows_dropped += 1;
                continue;
            }
            memory.entries.insert(key.to_string(), value.to_string());
            memory.rows_accepted += 1;
        }

        memory
    }

    /// Build a memory from pairs, applying the same empty-cell rule as tables
    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let mut memory = Self::default();
        for (key, value) in pairs {
            let (key, value) = (key.into(), value.into());
            if key.is_empty() || value.is_empty() {
                memory.rows_dropped += 1;
                continue;
            }
            memory.entries.insert(key, value);
            memory.rows_accepted += 1;
        }
        memory
    }

    /// Exact, untrimmed lookup
    pub fn lookup(&self, source_text: &str) -> Option<&str> {
        self.entries.get(source_text).map(String::as_str)
    }

    /// Number of distinct source texts
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether no translation is known
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// File the memory came from
    pub fn source(&self) -> Option<&Path> {
        self.source.as_deref()
    }

    /// Rows ignored for an empty source or translation
    pub fn rows_dropped(&self) -> usize {
        self.rows_dropped
    }
}

fn is_table_row(line: &str) -> bool {
    line.matches('|').count() >= 3
}

fn is_separator_row(line: &str) -> bool {
    let trimmed = line.trim();
    trimmed.contains('-') && trimmed.chars().all(|c| matches!(c, '|' | '-' | ':' | ' ' | '\t'))
}

fn is_header_cells(cells: &[&str]) -> bool {
    let matches_any = |cell: &str, labels: &[&str]| labels.iter().any(|label| cell.eq_ignore_ascii_case(label));
    matches_any(cells[1], SOURCE_LABELS) && matches_any(cells[3], TRANSLATION_LABELS)
}

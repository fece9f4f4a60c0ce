/*!
 * Per-game data directory.
 *
 * Each game lives under `<data_dir>/<game>/`:
 *
 * ```text
 * rules/extracted.md
 * translations/untranslated.md     <- table read by the engine
 * translations/bga_translations.md
 * translations/my_translations.md
 * metadata/game_info.json          <- carries the remote module id
 * ```
 */

use anyhow::{anyhow, Context, Result};
use chrono::Local;
use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::errors::LoadError;
use crate::file_utils::FileManager;
use crate::sync::SyncJob;

const TABLE_HEADER: &str = "| 原文 | 上下文 | 译文 |\n|------|--------|------|\n";

/// Module id as stored in metadata, either quoted or not
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
enum RawModuleId {
    Number(u64),
    Text(String),
}

/// Content of `metadata/game_info.json`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GameInfo {
    /// Game name
    #[serde(default)]
    pub name: String,

    /// Remote module id
    #[serde(default, alias = "moduleId", alias = "module_id", skip_serializing_if = "Option::is_none")]
    id: Option<RawModuleId>,

    /// Lifecycle marker
    #[serde(default)]
    pub status: String,

    /// When the directory was created
    #[serde(default)]
    pub created_at: String,

    /// When the metadata was last touched
    #[serde(default)]
    pub last_updated: String,
}

impl GameInfo {
    /// Fresh metadata for a new game
    pub fn initialized(name: &str) -> Self {
        let now = Local::now().format("%Y-%m-%d %H:%M:%S").to_string();
        Self {
            name: name.to_string(),
            id: None,
            status: "initialized".to_string(),
            created_at: now.clone(),
            last_updated: now,
        }
    }

    /// Read metadata from disk
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, LoadError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| LoadError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&content).map_err(|e| LoadError::Malformed {
            path: path.to_path_buf(),
            message: e.to_string(),
        })
    }

    /// Set the remote module id
    pub fn set_module_id(&mut self, module_id: u64) {
        self.id = Some(RawModuleId::Number(module_id));
    }

    /// Remote module id, if known and numeric
    pub fn module_id(&self) -> Option<u64> {
        match self.id.as_ref()? {
            RawModuleId::Number(id) => Some(*id),
            RawModuleId::Text(text) => text.trim().parse().ok(),
        }
    }

    /// Remote module id or a load error naming the file
    pub fn require_module_id(&self, path: &Path) -> Result<u64, LoadError> {
        self.module_id().ok_or_else(|| LoadError::Malformed {
            path: path.to_path_buf(),
            message: "missing or non-numeric module id (expected \"id\")".to_string(),
        })
    }
}

/// Directory layout of one game
#[derive(Debug, Clone)]
pub struct GameWorkspace {
    name: String,
    root: PathBuf,
}

impl GameWorkspace {
    /// Workspace of `name` under `data_dir`
    pub fn new<P: AsRef<Path>>(data_dir: P, name: &str) -> Result<Self> {
        let trimmed = name.trim();
        if trimmed.is_empty() || trimmed == "." || trimmed == ".." || trimmed.contains(['/', '\\']) {
            return Err(anyhow!("Invalid game name: {:?}", name));
        }
        Ok(Self {
            name: trimmed.to_string(),
            root: data_dir.as_ref().join(trimmed),
        })
    }

    /// Game name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Game directory
    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn rules_dir(&self) -> PathBuf {
        self.root.join("rules")
    }

    pub fn translations_dir(&self) -> PathBuf {
        self.root.join("translations")
    }

    pub fn metadata_dir(&self) -> PathBuf {
        self.root.join("metadata")
    }

    /// Table consumed by the engine
    pub fn translation_table_path(&self) -> PathBuf {
        self.translations_dir().join("untranslated.md")
    }

    pub fn metadata_path(&self) -> PathBuf {
        self.metadata_dir().join("game_info.json")
    }

    /// Whether the game directory exists
    pub fn exists(&self) -> bool {
        FileManager::dir_exists(&self.root)
    }

    /// Inputs of a synchronization run for this game
    pub fn sync_job(&self) -> SyncJob {
        SyncJob::from_files(self.translation_table_path(), self.metadata_path())
    }

    /// Create the directory skeleton; returns false when the game already exists
    pub fn init(&self) -> Result<bool> {
        if self.exists() {
            warn!("Game directory already exists: {:?}", self.root);
            return Ok(false);
        }

        for dir in [self.rules_dir(), self.translations_dir(), self.metadata_dir()] {
            FileManager::ensure_dir(&dir)?;
            info!("Created directory {:?}", dir);
        }

        let info = GameInfo::initialized(&self.name);
        let json = serde_json::to_string_pretty(&info).context("Failed to serialize game metadata")?;
        FileManager::write_to_file(self.metadata_path(), &json)?;

        FileManager::write_if_missing(self.translation_table_path(), TABLE_HEADER)?;
        for file_name in ["bga_translations.md", "my_translations.md"] {
            FileManager::write_if_missing(self.translations_dir().join(file_name), "# 翻译内容\n\n")?;
        }
        FileManager::write_if_missing(self.rules_dir().join("extracted.md"), "# 规则书文本\n\n")?;

        info!("Initialized game directory {:?}", self.root);
        Ok(true)
    }
}

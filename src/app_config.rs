use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::default::Default;
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use url::Url;

/// Application configuration module
/// This module handles the application configuration including loading,
/// validating and saving configuration settings.
/// Represents the application configuration
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Config {
    /// Remote translation site settings
    #[serde(default)]
    pub remote: RemoteConfig,

    /// Retry and rate limiting settings
    #[serde(default)]
    pub retry: RetryConfig,

    /// Login settings
    #[serde(default)]
    pub auth: AuthConfig,

    /// Root directory holding one folder per game
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    /// Match units without writing anything back
    #[serde(default)]
    pub dry_run: bool,

    /// Log level
    #[serde(default)]
    pub log_level: LogLevel,
}

/// Remote translation site configuration
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct RemoteConfig {
    // @field: Site root
    #[serde(default = "default_base_url")]
    pub base_url: String,

    // @field: Page exposing the request token
    #[serde(default = "default_entry_path")]
    pub entry_path: String,

    // @field: Password login endpoint
    #[serde(default = "default_login_path")]
    pub login_path: String,

    // @field: Username check endpoint
    #[serde(default = "default_check_username_path")]
    pub check_username_path: String,

    // @field: Translation listing page
    #[serde(default = "default_translation_path")]
    pub translation_path: String,

    // @field: Endpoint receiving a single translation
    #[serde(default = "default_save_path")]
    pub save_path: String,

    // @field: Locale of the source strings
    #[serde(default = "default_source_locale")]
    pub source_locale: String,

    // @field: Locale we translate into
    #[serde(default = "default_dest_locale")]
    pub dest_locale: String,

    // @field: User agent sent with every request
    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    // @field: Timeout seconds per network operation
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            entry_path: default_entry_path(),
            login_path: default_login_path(),
            check_username_path: default_check_username_path(),
            translation_path: default_translation_path(),
            save_path: default_save_path(),
            source_locale: default_source_locale(),
            dest_locale: default_dest_locale(),
            user_agent: default_user_agent(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl RemoteConfig {
    /// Join a site-relative path onto the base URL
    pub fn url_for(&self, path: &str) -> String {
        format!("{}/{}", self.base_url.trim_end_matches('/'), path.trim_start_matches('/'))
    }

    /// Listing of untranslated strings for a game module
    pub fn untranslated_listing_url(&self, module_id: u64) -> Result<Url> {
        let base = self.url_for(&self.translation_path);
        Url::parse_with_params(
            &base,
            &[
                ("module_id", module_id.to_string()),
                ("source_locale", self.source_locale.clone()),
                ("dest_locale", self.dest_locale.clone()),
                ("findtype", "untranslated".to_string()),
            ],
        )
        .with_context(|| format!("Invalid translation URL: {}", base))
    }
}

/// Retry and rate limiting configuration
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct RetryConfig {
    /// Attempt ceiling shared by login, page fetches and unit writes
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Base delay in milliseconds, multiplied by the attempt number
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,

    /// Ceiling for server-imposed waits, in seconds
    #[serde(default = "default_max_wait_secs")]
    pub max_wait_secs: u64,

    /// How many rate-limit waits a single login may sit through
    #[serde(default = "default_max_rate_limit_waits")]
    pub max_rate_limit_waits: u32,

    /// Random pause before each login request, upper bound in milliseconds
    #[serde(default = "default_request_jitter_ms")]
    pub request_jitter_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            base_delay_ms: default_base_delay_ms(),
            max_wait_secs: default_max_wait_secs(),
            max_rate_limit_waits: default_max_rate_limit_waits(),
            request_jitter_ms: default_request_jitter_ms(),
        }
    }
}

/// Login configuration
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct AuthConfig {
    /// Environment variable holding the username
    #[serde(default = "default_username_env")]
    pub username_env: String,

    /// Environment variable holding the password
    #[serde(default = "default_password_env")]
    pub password_env: String,

    /// Ask the site to keep the session alive
    #[serde(default)]
    pub remember_me: bool,

    /// Run the username check before the password login
    #[serde(default)]
    pub verify_username: bool,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            username_env: default_username_env(),
            password_env: default_password_env(),
            remember_me: false,
            verify_username: false,
        }
    }
}

/// Log verbosity level
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Error,
    Warn,
    #[default]
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    // @returns: Matching filter for the log facade
    pub fn to_level_filter(&self) -> log::LevelFilter {
        match self {
            LogLevel::Error => log::LevelFilter::Error,
            LogLevel::Warn => log::LevelFilter::Warn,
            LogLevel::Info => log::LevelFilter::Info,
            LogLevel::Debug => log::LevelFilter::Debug,
            LogLevel::Trace => log::LevelFilter::Trace,
        }
    }
}

fn default_base_url() -> String {
    "https://boardgamearena.com".to_string()
}

fn default_entry_path() -> String {
    "/welcome".to_string()
}

fn default_login_path() -> String {
    "/account/auth/loginUserWithPassword.html".to_string()
}

fn default_check_username_path() -> String {
    "/account/auth/checkUsername.html".to_string()
}

fn default_translation_path() -> String {
    "/translation".to_string()
}

fn default_save_path() -> String {
    "/translation/translation/saveTranslation.html".to_string()
}

fn default_source_locale() -> String {
    "en_US".to_string()
}

fn default_dest_locale() -> String {
    "zh_CN".to_string()
}

fn default_user_agent() -> String {
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/122.0.0.0 Safari/537.36".to_string()
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_max_attempts() -> u32 {
    3
}

fn default_base_delay_ms() -> u64 {
    60_000 // the site punishes fast retries, one minute per attempt step
}

fn default_max_wait_secs() -> u64 {
    300
}

fn default_max_rate_limit_waits() -> u32 {
    5
}

fn default_request_jitter_ms() -> u64 {
    1000
}

fn default_username_env() -> String {
    "BGA_USERNAME".to_string()
}

fn default_password_env() -> String {
    "BGA_PASSWORD".to_string()
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("data/games")
}

impl Config {
    /// Load the configuration from a JSON file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path)
            .with_context(|| format!("Failed to open config file: {}", path.display()))?;
        let reader = BufReader::new(file);
        let config: Config = serde_json::from_reader(reader)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;
        Ok(config)
    }

    /// Load the configuration, writing a default one first if it does not exist
    pub fn load_or_create<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if path.exists() {
            return Self::load(path);
        }

        log::warn!("Config file not found at '{}', creating default config.", path.display());
        let config = Config::default();
        let config_json = serde_json::to_string_pretty(&config)
            .context("Failed to serialize default config to JSON")?;
        std::fs::write(path, config_json)
            .with_context(|| format!("Failed to write default config to file: {}", path.display()))?;
        Ok(config)
    }

    /// Validate the configuration for consistency and required values
    pub fn validate(&self) -> Result<()> {
        Url::parse(&self.remote.base_url)
            .with_context(|| format!("Invalid base URL: '{}'", self.remote.base_url))?;

        crate::language_utils::validate_locale(&self.remote.source_locale)?;
        crate::language_utils::validate_locale(&self.remote.dest_locale)?;
        if crate::language_utils::locales_share_language(&self.remote.source_locale, &self.remote.dest_locale) {
            return Err(anyhow!(
                "Source and destination locales share a language: {} / {}",
                self.remote.source_locale,
                self.remote.dest_locale
            ));
        }

        if self.retry.max_attempts == 0 {
            return Err(anyhow!("retry.max_attempts must be at least 1"));
        }

        if self.remote.timeout_secs == 0 {
            return Err(anyhow!("remote.timeout_secs must be greater than 0"));
        }

        if self.auth.username_env.is_empty() || self.auth.password_env.is_empty() {
            return Err(anyhow!("auth.username_env and auth.password_env must name environment variables"));
        }

        Ok(())
    }
}

/// Default implementation for Config
impl Default for Config {
    fn default() -> Self {
        Config {
            remote: RemoteConfig::default(),
            retry: RetryConfig::default(),
            auth: AuthConfig::default(),
            data_dir: default_data_dir(),
            dry_run: false,
            log_level: LogLevel::default(),
        }
    }
}

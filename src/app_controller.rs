use anyhow::{anyhow, Context, Result};
use indicatif::{ProgressBar, ProgressStyle};
use log::{error, info, warn};
use std::time::Duration;

use crate::app_config::Config;
use crate::game::GameWorkspace;
use crate::language_utils::get_language_name;
use crate::providers::bga::BgaClient;
use crate::providers::FormDriver;
use crate::retry::{CancelToken, RetryPolicy};
use crate::session::{Credentials, SessionManager, SessionOptions};
use crate::sync::{EngineOptions, SubmissionEngine, SyncJob, SyncResult};

// @module: Application controller for translation synchronization

/// Main application controller
pub struct Controller {
    // @field: App configuration
    config: Config,
}

impl Controller {
    /// Create a new controller for test purposes with default configuration
    pub fn new_for_test() -> Result<Self> {
        Self::with_config(Config::default())
    }

    // @method: Create a new controller with the given configuration
    pub fn with_config(config: Config) -> Result<Self> {
        config.validate().context("Invalid configuration")?;
        Ok(Self { config })
    }

    /// Configuration in use
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Create the directory skeleton of a new game
    pub fn init_game(&self, game: &str) -> Result<bool> {
        let workspace = GameWorkspace::new(&self.config.data_dir, game)?;
        let created = workspace.init()?;
        if created {
            info!("Game {} initialized at {:?}", workspace.name(), workspace.root());
            info!(
                "Fill in {:?} and the \"id\" field of {:?} before submitting",
                workspace.translation_table_path(),
                workspace.metadata_path()
            );
        }
        Ok(created)
    }

    /// Submit the translations of a game to the live site
    pub async fn submit(&self, game: &str) -> Result<SyncResult> {
        let workspace = GameWorkspace::new(&self.config.data_dir, game)?;
        if !workspace.exists() {
            return Err(anyhow!(
                "Game directory {:?} not found, run `init-game {}` first",
                workspace.root(),
                workspace.name()
            ));
        }

        let credentials = Credentials::from_env(&self.config.auth).context("Cannot log in")?;
        let language = get_language_name(&self.config.remote.dest_locale)?;
        info!(
            "Submitting {} translations of {} as {}",
            language,
            workspace.name(),
            credentials.principal()
        );
        let client = BgaClient::new(self.config.remote.clone())?;
        let policy = RetryPolicy::from_config(&self.config.retry);
        let sessions = SessionManager::new(
            Box::new(client.clone()),
            credentials,
            policy,
            SessionOptions::from_config(&self.config.auth, &self.config.retry),
        );

        let cancel = CancelToken::new();
        let mut engine = SubmissionEngine::new(client, sessions, policy, EngineOptions::from_config(&self.config))
            .with_cancel(cancel.clone())
            .with_progress(Self::spinner(workspace.name()));

        let result = Self::run_until_interrupted(&mut engine, workspace.sync_job(), cancel).await;
        Self::summarize(result)
    }

    /// Run an engine, cancelling it on Ctrl-C
    pub async fn run_until_interrupted<D: FormDriver>(
        engine: &mut SubmissionEngine<D>,
        job: SyncJob,
        cancel: CancelToken,
    ) -> SyncResult {
        let watcher = tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("Interrupt received, stopping after the current unit");
                cancel.cancel();
            }
        });

        let result = engine.run(job).await;
        watcher.abort();
        result
    }

    /// Log the run summary and turn an aborted run into an error
    pub fn summarize(result: SyncResult) -> Result<SyncResult> {
        info!("{}", result);
        for unit_error in &result.unit_errors {
            warn!("  unit {} on {}: {}", unit_error.unit_id, unit_error.cursor, unit_error.message);
        }

        if result.aborted {
            let reason = result.abort_reason.clone().unwrap_or_else(|| "unknown reason".to_string());
            error!("Run {} aborted: {}", result.run_id, reason);
            return Err(anyhow!("Synchronization aborted: {}", reason));
        }
        Ok(result)
    }

    fn spinner(game: &str) -> ProgressBar {
        let spinner = ProgressBar::new_spinner();
        let style = ProgressStyle::default_spinner()
            .template("{spinner:.green} [{elapsed_precise}] {prefix} {pos} units {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner());
        spinner.set_style(style);
        spinner.set_prefix(game.to_string());
        spinner.enable_steady_tick(Duration::from_millis(120));
        spinner
    }
}

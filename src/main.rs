// Module-specific lints configuration
#![allow(clippy::uninlined_format_args)]

use anyhow::Result;
use clap::{Args, CommandFactory, Parser, Subcommand, ValueEnum};
use clap_complete::{generate, Shell};
use log::{info, Level, LevelFilter, Log, Metadata, Record, SetLoggerError};
use std::io::Write;
use std::path::PathBuf;

use bgasync::app_config::{self, Config};
use bgasync::app_controller::Controller;

/// CLI Wrapper for LogLevel to implement ValueEnum
#[derive(Debug, Clone, ValueEnum)]
enum CliLogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl From<CliLogLevel> for app_config::LogLevel {
    fn from(cli_level: CliLogLevel) -> Self {
        match cli_level {
            CliLogLevel::Error => app_config::LogLevel::Error,
            CliLogLevel::Warn => app_config::LogLevel::Warn,
            CliLogLevel::Info => app_config::LogLevel::Info,
            CliLogLevel::Debug => app_config::LogLevel::Debug,
            CliLogLevel::Trace => app_config::LogLevel::Trace,
        }
    }
}

/// Options shared by every command touching game data
#[derive(Args, Debug)]
struct CommonArgs {
    /// Configuration file path
    #[arg(short, long, default_value = "conf.json")]
    config: PathBuf,

    /// Set logging level
    #[arg(short, long, value_enum)]
    log_level: Option<CliLogLevel>,

    /// Root directory holding one folder per game
    #[arg(short, long)]
    data_dir: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Submit a game's translations to the translation site
    #[command(alias = "sync")]
    Submit {
        /// Game directory name under the data directory
        #[arg(value_name = "GAME")]
        game: String,

        /// Match units and report what would be written, without writing
        #[arg(long, env = "BGASYNC_DRY_RUN")]
        dry_run: bool,

        #[command(flatten)]
        common: CommonArgs,
    },

    /// Create the directory skeleton for a new game
    InitGame {
        /// Game directory name under the data directory
        #[arg(value_name = "GAME")]
        game: String,

        #[command(flatten)]
        common: CommonArgs,
    },

    /// Generate shell completions for bgasync
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

/// bgasync - push local translations to Board Game Arena
///
/// Reads a game's translation table, logs in, walks the untranslated
/// listing page by page and fills in every string the table knows.
#[derive(Parser, Debug)]
#[command(name = "bgasync")]
#[command(version)]
#[command(about = "Synchronize local game translations with Board Game Arena")]
#[command(long_about = "bgasync walks the untranslated strings of a game module and submits the
translations found in the game's local table.

EXAMPLES:
    bgasync init-game azul                 # Create data/games/azul/
    bgasync submit azul                    # Submit translations for azul
    bgasync submit azul --dry-run          # Only report what would be submitted
    bgasync sync azul --log-level debug    # Same as submit, verbose
    bgasync completions bash > bgasync.bash

CONFIGURATION:
    Configuration is stored in conf.json by default. You can specify a different
    config file with --config. If the config file doesn't exist, a default one
    will be created automatically.

CREDENTIALS:
    Read from the BGA_USERNAME and BGA_PASSWORD environment variables unless
    the config names other variables.")]
struct CommandLineOptions {
    #[command(subcommand)]
    command: Commands,
}

// @struct: Custom logger implementation
struct CustomLogger {
    level: LevelFilter,
}

impl CustomLogger {
    // @creates: New logger with specified level
    fn new(level: LevelFilter) -> Self {
        CustomLogger { level }
    }

    // @initializes: Global logger
    fn init(level: LevelFilter) -> Result<(), SetLoggerError> {
        // The logger itself lets everything through; the max level does the filtering
        let logger = Box::new(CustomLogger::new(LevelFilter::Trace));
        log::set_boxed_logger(logger)?;
        log::set_max_level(level);
        Ok(())
    }

    // @returns: Emoji for log level
    fn get_emoji_for_level(level: Level) -> &'static str {
        match level {
            Level::Error => "❌ ",
            Level::Warn => "🚧 ",
            Level::Info => " ",
            Level::Debug => "🔍 ",
            Level::Trace => "📋 ",
        }
    }

    // @returns: ANSI colour for log level
    fn get_color_for_level(level: Level) -> &'static str {
        match level {
            Level::Error => "\x1B[1;31m",
            Level::Warn => "\x1B[1;33m",
            Level::Info => "\x1B[1;32m",
            Level::Debug => "\x1B[1;36m",
            Level::Trace => "\x1B[1;35m",
        }
    }
}

impl Log for CustomLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= self.level
    }

    fn log(&self, record: &Record) {
        if self.enabled(record.metadata()) {
            let now = chrono::Local::now().format("%H:%M:%S.%3f");
            let mut stderr = std::io::stderr();
            let _ = writeln!(
                stderr,
                "{}{} {} {}\x1B[0m",
                Self::get_color_for_level(record.level()),
                now,
                Self::get_emoji_for_level(record.level()),
                record.args()
            );
        }
    }

    fn flush(&self) {
        let _ = std::io::stderr().flush();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize the logger once with info level by default
    // We'll update the level after loading the config if needed
    CustomLogger::init(LevelFilter::Info)?;

    let cli = CommandLineOptions::parse();

    match cli.command {
        Commands::Completions { shell } => {
            let mut cmd = CommandLineOptions::command();
            generate(shell, &mut cmd, "bgasync", &mut std::io::stdout());
            Ok(())
        }
        Commands::InitGame { game, common } => {
            let config = load_config(&common)?;
            let controller = Controller::with_config(config)?;
            if !controller.init_game(&game)? {
                info!("Nothing to do, {} already exists", game);
            }
            Ok(())
        }
        Commands::Submit { game, dry_run, common } => {
            let mut config = load_config(&common)?;
            if dry_run {
                config.dry_run = true;
            }
            let controller = Controller::with_config(config)?;
            controller.submit(&game).await?;
            Ok(())
        }
    }
}

/// Load or create the configuration and apply command line overrides
fn load_config(common: &CommonArgs) -> Result<Config> {
    // If log level is set via command line, apply it immediately
    if let Some(level) = &common.log_level {
        let level: app_config::LogLevel = level.clone().into();
        log::set_max_level(level.to_level_filter());
    }

    let mut config = Config::load_or_create(&common.config)?;

    if let Some(data_dir) = &common.data_dir {
        config.data_dir = data_dir.clone();
    }

    match &common.log_level {
        Some(level) => config.log_level = level.clone().into(),
        // Just update the max level without reinitializing the logger
        None => log::set_max_level(config.log_level.to_level_filter()),
    }

    Ok(config)
}

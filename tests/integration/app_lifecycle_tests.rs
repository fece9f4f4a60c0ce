/*!
 * Integration tests for application lifecycle
 */

use anyhow::Result;
use bgasync::app_config::Config;
use bgasync::app_controller::Controller;
use bgasync::providers::mock::{MockAuth, MockRemote, MockUnit};
use bgasync::retry::CancelToken;
use bgasync::sync::{EngineState, SyncJob, SyncResult, TranslationMemory};

use crate::common;

fn config_in(data_dir: &std::path::Path) -> Config {
    let mut config = Config::default();
    config.data_dir = data_dir.to_path_buf();
    config.auth.username_env = "BGASYNC_TEST_UNSET_USER".to_string();
    config.auth.password_env = "BGASYNC_TEST_UNSET_PASSWORD".to_string();
    config
}

/// Test the controller initialization with default config
#[test]
fn test_controller_initialization_withDefaultConfig_shouldSucceed() -> Result<()> {
    let controller = Controller::new_for_test()?;
    assert_eq!(controller.config().remote.dest_locale, "zh_CN");
    Ok(())
}

/// Test that an invalid configuration is refused
#[test]
fn test_controller_withInvalidConfig_shouldFail() {
    let mut config = Config::default();
    config.remote.dest_locale = "en_US".to_string();
    assert!(Controller::with_config(config).is_err());
}

/// Test game initialization through the controller
#[test]
fn test_initGame_withTempDataDir_shouldCreateOnce() -> Result<()> {
    let temp_dir = common::create_temp_dir()?;
    let controller = Controller::with_config(config_in(temp_dir.path()))?;

    assert!(controller.init_game("azul")?);
    assert!(!controller.init_game("azul")?);
    assert!(temp_dir.path().join("azul/metadata/game_info.json").is_file());
    assert!(controller.init_game("../azul").is_err());
    Ok(())
}

/// Test submitting a game that was never initialized
#[test]
fn test_submit_withUnknownGame_shouldFail() -> Result<()> {
    let temp_dir = common::create_temp_dir()?;
    let controller = Controller::with_config(config_in(temp_dir.path()))?;

    let result = tokio_test::block_on(controller.submit("missing"));

    let message = format!("{:#}", result.unwrap_err());
    assert!(message.contains("init-game"), "{}", message);
    Ok(())
}

/// Test submitting without credentials in the environment
#[test]
fn test_submit_withoutCredentials_shouldFailBeforeNetwork() -> Result<()> {
    let temp_dir = common::create_temp_dir()?;
    let controller = Controller::with_config(config_in(temp_dir.path()))?;
    controller.init_game("azul")?;

    let result = tokio_test::block_on(controller.submit("azul"));

    let message = format!("{:#}", result.unwrap_err());
    assert!(message.contains("BGASYNC_TEST_UNSET_USER"), "{}", message);
    Ok(())
}

/// Test that an aborted run becomes an error and a finished one does not
#[test]
fn test_summarize_withAbortedAndFinishedRuns_shouldMapToResult() {
    let mut aborted = SyncResult::new("run-1");
    aborted.aborted = true;
    aborted.final_state = EngineState::Aborted;
    aborted.abort_reason = Some("Authentication error: Login rejected".to_string());
    let error = Controller::summarize(aborted).unwrap_err();
    assert!(error.to_string().contains("Login rejected"));

    let mut finished = SyncResult::new("run-2");
    finished.submitted = 4;
    finished.final_state = EngineState::Done;
    let finished = Controller::summarize(finished).unwrap();
    assert_eq!(finished.submitted, 4);
}

/// Test the interrupt-aware runner against the mock site
#[tokio::test]
async fn test_runUntilInterrupted_withMockSite_shouldCompleteRun() {
    let remote = MockRemote::paged(common::LISTING, vec![vec![MockUnit::new("1", "Pass")]]);
    let auth = MockAuth::accepting();
    let cancel = CancelToken::new();
    let mut engine = common::build_engine(&remote, &auth).with_cancel(cancel.clone());
    let memory = TranslationMemory::from_pairs([("Pass", "跳过")]);

    let result =
        Controller::run_until_interrupted(&mut engine, SyncJob::in_memory(memory, common::page_url(1)), cancel)
            .await;

    let result = Controller::summarize(result).unwrap();
    assert_eq!(result.submitted, 1);
    assert_eq!(remote.translation_of("1").as_deref(), Some("跳过"));
}

/*!
 * End-to-end synchronization runs against the mock site
 */

use std::time::Duration;
use tokio::time::Instant;

use bgasync::errors::{DriverError, PaginationError};
use bgasync::game::GameWorkspace;
use bgasync::providers::mock::{MockAuth, MockNext, MockRemote, MockUnit};
use bgasync::sync::{EngineState, SyncJob, TranslationMemory};

use crate::common;

/// A known string is written to its field
#[tokio::test]
async fn test_run_withMatchingUnit_shouldSubmitTranslation() {
    common::init_test_logging();
    let remote = MockRemote::paged(common::LISTING, vec![vec![MockUnit::new("101", "Move 3 spaces")]]);
    let auth = MockAuth::accepting();
    let memory = TranslationMemory::from_pairs([("Move 3 spaces", "移动3格")]);
    let mut engine = common::build_engine(&remote, &auth);

    let result = engine.run(SyncJob::in_memory(memory, common::page_url(1))).await;

    assert!(result.completed(), "{:?}", result.abort_reason);
    assert_eq!(result.final_state, EngineState::Done);
    assert_eq!(engine.state(), EngineState::Done);
    assert_eq!(result.pages_visited, 1);
    assert_eq!(result.units_seen, 1);
    assert_eq!(result.matched, 1);
    assert_eq!(result.submitted, 1);
    assert_eq!(result.skipped_no_match, 0);
    assert!(result.unit_errors.is_empty());
    assert_eq!(
        remote.written(),
        vec![("translated_101".to_string(), "移动3格".to_string())]
    );
    assert_eq!(remote.translation_of("101").as_deref(), Some("移动3格"));
}

/// An unknown string is left alone
#[tokio::test]
async fn test_run_withUnknownUnit_shouldSkipWithoutWriting() {
    let remote = MockRemote::paged(common::LISTING, vec![vec![MockUnit::new("102", "Draw a card")]]);
    let auth = MockAuth::accepting();
    let memory = TranslationMemory::from_pairs([("Move 3 spaces", "移动3格")]);
    let mut engine = common::build_engine(&remote, &auth);

    let result = engine.run(SyncJob::in_memory(memory, common::page_url(1))).await;

    assert!(result.completed());
    assert_eq!(result.units_seen, 1);
    assert_eq!(result.matched, 0);
    assert_eq!(result.skipped_no_match, 1);
    assert_eq!(result.submitted, 0);
    assert_eq!(remote.write_count(), 0);
}

/// Lookups are exact: case and surrounding whitespace matter
#[tokio::test]
async fn test_run_withNearMatches_shouldNotSubmit() {
    let remote = MockRemote::paged(
        common::LISTING,
        vec![vec![
            MockUnit::new("1", "move 3 spaces"),
            MockUnit::new("2", "Move 3 spaces."),
        ]],
    );
    let auth = MockAuth::accepting();
    let memory = TranslationMemory::from_pairs([("Move 3 spaces", "移动3格")]);
    let mut engine = common::build_engine(&remote, &auth);

    let result = engine.run(SyncJob::in_memory(memory, common::page_url(1))).await;

    assert_eq!(result.skipped_no_match, 2);
    assert_eq!(remote.write_count(), 0);
}

/// A multi-page walk with a mix of outcomes
#[tokio::test]
async fn test_run_withSeveralPages_shouldCountEveryUnit() {
    let remote = MockRemote::paged(
        common::LISTING,
        vec![
            vec![MockUnit::new("1", "Move 3 spaces"), MockUnit::new("2", "Draw a card")],
            vec![],
            vec![MockUnit::new("3", "Pass").translated("跳过"), MockUnit::new("4", "End turn")],
        ],
    );
    let auth = MockAuth::accepting();
    let memory = TranslationMemory::from_pairs([
        ("Move 3 spaces", "移动3格"),
        ("Pass", "跳过"),
        ("End turn", "结束回合"),
    ]);
    let mut engine = common::build_engine(&remote, &auth);

    let result = engine.run(SyncJob::in_memory(memory, common::page_url(1))).await;

    assert!(result.completed());
    assert_eq!(result.pages_visited, 3);
    assert_eq!(result.units_seen, 4);
    assert_eq!(result.matched, 3);
    assert_eq!(result.submitted, 2);
    assert_eq!(result.already_current, 1);
    assert_eq!(result.skipped_no_match, 1);
    assert_eq!(auth.login_requests(), 1);
    assert!(result.summary().contains("submitted=2"));
}

/// Dry runs count what would be written and touch nothing
#[tokio::test]
async fn test_run_inDryRun_shouldNotWrite() {
    let remote = MockRemote::paged(common::LISTING, vec![vec![MockUnit::new("1", "Move 3 spaces")]]);
    let auth = MockAuth::accepting();
    let memory = TranslationMemory::from_pairs([("Move 3 spaces", "移动3格")]);
    let mut engine = bgasync::sync::SubmissionEngine::new(
        remote.driver(),
        common::session_manager(&auth),
        common::test_policy(),
        common::engine_options(true),
    );

    let result = engine.run(SyncJob::in_memory(memory, common::page_url(1))).await;

    assert!(result.completed());
    assert_eq!(result.would_submit, 1);
    assert_eq!(result.submitted, 0);
    assert_eq!(remote.write_count(), 0);
    assert_eq!(remote.translation_of("1").as_deref(), Some(""));
}

/// Transient page faults are retried with growing waits
#[tokio::test(start_paused = true)]
async fn test_run_withTwoPageFaults_shouldRecover() {
    common::init_test_logging();
    let remote = MockRemote::paged(common::LISTING, vec![vec![MockUnit::new("1", "Move 3 spaces")]]);
    remote.fail_navigations([
        DriverError::Timeout(30_000),
        DriverError::Timeout(30_000),
    ]);
    let auth = MockAuth::accepting();
    let memory = TranslationMemory::from_pairs([("Move 3 spaces", "移动3格")]);
    let mut engine = common::build_engine(&remote, &auth);

    let start = Instant::now();
    let result = engine.run(SyncJob::in_memory(memory, common::page_url(1))).await;

    assert!(result.completed());
    assert_eq!(result.submitted, 1);
    assert!(result.page_errors.is_empty());
    // 1s after the first failure, 2s after the second
    assert!(start.elapsed() >= Duration::from_secs(3));
}

/// A page that never loads aborts the run and keeps the partial counts
#[tokio::test(start_paused = true)]
async fn test_run_withUnreachablePage_shouldAbortWithPartialCounts() {
    let remote = MockRemote::new();
    remote.add_page(
        &common::page_url(1),
        vec![MockUnit::new("1", "Move 3 spaces")],
        MockNext::Link(common::page_url(2)),
    );
    let auth = MockAuth::accepting();
    let memory = TranslationMemory::from_pairs([("Move 3 spaces", "移动3格")]);
    let mut engine = common::build_engine(&remote, &auth);

    let result = engine.run(SyncJob::in_memory(memory, common::page_url(1))).await;

    assert!(result.aborted);
    assert!(!result.cancelled);
    assert_eq!(result.final_state, EngineState::Aborted);
    assert_eq!(result.pages_visited, 1);
    assert_eq!(result.submitted, 1);
    assert!(matches!(
        result.page_errors.last(),
        Some(PaginationError::FetchFailed { attempts: 3, .. })
    ));
    assert_eq!(remote.navigations().len(), 4);
    assert!(result.abort_reason.unwrap().contains(&common::page_url(2)));
}

/// Rejected credentials abort the run before any page is visited
#[tokio::test(start_paused = true)]
async fn test_run_withRejectedLogin_shouldAbortBeforeWalking() {
    let remote = MockRemote::paged(common::LISTING, vec![vec![MockUnit::new("1", "Pass")]]);
    let auth = MockAuth::rejecting("Invalid password");
    let memory = TranslationMemory::from_pairs([("Pass", "跳过")]);
    let mut engine = common::build_engine(&remote, &auth);

    let result = engine.run(SyncJob::in_memory(memory, common::page_url(1))).await;

    assert!(result.aborted);
    assert_eq!(result.pages_visited, 0);
    assert!(remote.navigations().is_empty());
    assert!(result.abort_reason.unwrap().contains("Invalid password"));
}

/// The files-on-disk path: table plus game metadata
#[tokio::test]
async fn test_run_withGameWorkspace_shouldBuildListingFromMetadata() {
    let temp_dir = common::create_temp_dir().unwrap();
    let workspace = GameWorkspace::new(temp_dir.path(), "azul").unwrap();
    workspace.init().unwrap();
    std::fs::write(
        workspace.translation_table_path(),
        common::table(&[("Move 3 spaces", "移动3格")]),
    )
    .unwrap();
    std::fs::write(workspace.metadata_path(), r#"{"name": "azul", "id": 42}"#).unwrap();

    let listing = common::mock_remote_config()
        .untranslated_listing_url(42)
        .unwrap()
        .to_string();
    let remote = MockRemote::new();
    remote.add_page(
        &listing,
        vec![MockUnit::new("7", "Move 3 spaces")],
        MockNext::Disabled,
    );
    let auth = MockAuth::accepting();
    let mut engine = common::build_engine(&remote, &auth);

    let result = engine.run(workspace.sync_job()).await;

    assert!(result.completed(), "{:?}", result.abort_reason);
    assert_eq!(result.submitted, 1);
    assert_eq!(remote.navigations(), vec![listing]);
}

/// Metadata without a module id aborts before login
#[tokio::test]
async fn test_run_withoutModuleId_shouldAbortBeforeLogin() {
    let temp_dir = common::create_temp_dir().unwrap();
    let workspace = GameWorkspace::new(temp_dir.path(), "azul").unwrap();
    workspace.init().unwrap();
    std::fs::write(workspace.translation_table_path(), common::table(&[("Pass", "跳过")])).unwrap();

    let remote = MockRemote::new();
    let auth = MockAuth::accepting();
    let mut engine = common::build_engine(&remote, &auth);

    let result = engine.run(workspace.sync_job()).await;

    assert!(result.aborted);
    assert_eq!(auth.login_requests(), 0);
    assert!(result.abort_reason.unwrap().contains("module id"));
}

/*!
 * Tests for the listing walk
 */

use std::time::Duration;

use bgasync::errors::{AuthError, DriverError, PaginationError};
use bgasync::providers::mock::{MockAuth, MockDriver, MockNext, MockRemote, MockUnit};
use bgasync::retry::CancelToken;
use bgasync::session::SessionManager;
use bgasync::sync::{ContentExtractor, Page, PageCursor};

use crate::common;

fn extractor_at(url: &str) -> ContentExtractor {
    ContentExtractor::new(
        PageCursor::At(url.to_string()),
        common::test_policy(),
        Duration::from_secs(5),
        CancelToken::new(),
    )
}

async fn walk(
    extractor: &mut ContentExtractor,
    driver: &mut MockDriver,
    sessions: &mut SessionManager,
) -> Result<Vec<Page>, PaginationError> {
    let mut pages = Vec::new();
    while let Some(page) = extractor.next_page(driver, sessions).await? {
        pages.push(page);
    }
    Ok(pages)
}

/// Test that every page of a chain is visited exactly once, in order
#[tokio::test]
async fn test_nextPage_withThreePages_shouldVisitEachOnce() {
    common::init_test_logging();
    let remote = MockRemote::paged(
        common::LISTING,
        vec![
            vec![MockUnit::new("1", "Move 3 spaces")],
            vec![MockUnit::new("2", "Draw a card"), MockUnit::new("3", "Pass")],
            vec![MockUnit::new("4", "End turn")],
        ],
    );
    let auth = MockAuth::accepting();
    let mut sessions = common::session_manager(&auth);
    let mut driver = remote.driver();
    let mut extractor = extractor_at(&common::page_url(1));

    let pages = walk(&mut extractor, &mut driver, &mut sessions).await.unwrap();

    assert_eq!(pages.len(), 3);
    assert_eq!(
        pages.iter().map(|p| p.number).collect::<Vec<_>>(),
        vec![1, 2, 3]
    );
    assert_eq!(pages[1].units.len(), 2);
    assert_eq!(pages[2].next, PageCursor::End);
    assert_eq!(
        remote.navigations(),
        vec![common::page_url(1), common::page_url(2), common::page_url(3)]
    );
    assert!(extractor.is_exhausted());
    assert_eq!(extractor.pages_fetched(), 3);
    assert_eq!(auth.login_requests(), 1);
}

/// Test that the walk logs in lazily when no session is held
#[tokio::test]
async fn test_nextPage_withoutSession_shouldLogInFirst() {
    let remote = MockRemote::paged(common::LISTING, vec![vec![MockUnit::new("1", "Pass")]]);
    let auth = MockAuth::accepting();
    let mut sessions = common::session_manager(&auth);
    let mut driver = remote.driver();
    let mut extractor = extractor_at(&common::page_url(1));

    let page = extractor.next_page(&mut driver, &mut sessions).await.unwrap().unwrap();

    assert_eq!(page.units[0].source_text, "Pass");
    assert!(sessions.is_valid());
    assert_eq!(remote.navigations().len(), 1);
}

/// Test that an empty page does not end the walk while a next link exists
#[tokio::test]
async fn test_nextPage_withEmptyMiddlePage_shouldKeepWalking() {
    let remote = MockRemote::paged(
        common::LISTING,
        vec![vec![], vec![MockUnit::new("9", "Roll the dice")]],
    );
    let auth = MockAuth::accepting();
    let mut sessions = common::session_manager(&auth);
    let mut driver = remote.driver();
    let mut extractor = extractor_at(&common::page_url(1));

    let pages = walk(&mut extractor, &mut driver, &mut sessions).await.unwrap();

    assert_eq!(pages.len(), 2);
    assert!(pages[0].units.is_empty());
    assert_eq!(pages[1].units[0].id, "9");
}

/// Test that a missing pagination control ends the walk
#[tokio::test]
async fn test_nextPage_withoutControl_shouldStop() {
    let remote = MockRemote::new();
    remote.add_page(&common::page_url(1), vec![MockUnit::new("1", "Pass")], MockNext::Missing);
    let auth = MockAuth::accepting();
    let mut sessions = common::session_manager(&auth);
    let mut driver = remote.driver();
    let mut extractor = extractor_at(&common::page_url(1));

    let pages = walk(&mut extractor, &mut driver, &mut sessions).await.unwrap();

    assert_eq!(pages.len(), 1);
    assert!(pages[0].warning.is_none());
}

/// Test relative next links
#[tokio::test]
async fn test_nextPage_withRelativeLink_shouldResolveAgainstCurrentPage() {
    let remote = MockRemote::new();
    remote.add_page(
        &common::page_url(1),
        vec![MockUnit::new("1", "Pass")],
        MockNext::Link("?module_id=42&page=2".to_string()),
    );
    remote.add_page(&common::page_url(2), vec![MockUnit::new("2", "End turn")], MockNext::Disabled);
    let auth = MockAuth::accepting();
    let mut sessions = common::session_manager(&auth);
    let mut driver = remote.driver();
    let mut extractor = extractor_at(&common::page_url(1));

    let pages = walk(&mut extractor, &mut driver, &mut sessions).await.unwrap();

    assert_eq!(pages.len(), 2);
    assert_eq!(pages[0].next, PageCursor::At(common::page_url(2)));
}

/// Test that a control pointing back at a visited page ends the walk with a warning
#[tokio::test]
async fn test_nextPage_withSelfLink_shouldStopWithInconsistentWarning() {
    let remote = MockRemote::new();
    remote.add_page(
        &common::page_url(1),
        vec![MockUnit::new("1", "Pass")],
        MockNext::Link(common::page_url(1)),
    );
    let auth = MockAuth::accepting();
    let mut sessions = common::session_manager(&auth);
    let mut driver = remote.driver();
    let mut extractor = extractor_at(&common::page_url(1));

    let pages = walk(&mut extractor, &mut driver, &mut sessions).await.unwrap();

    assert_eq!(pages.len(), 1);
    assert!(matches!(pages[0].warning, Some(PaginationError::Inconsistent { .. })));
    assert_eq!(remote.navigations().len(), 1);
}

/// Test units, contexts and duplicate ids on one page
#[tokio::test]
async fn test_nextPage_withDuplicateIds_shouldKeepFirstOccurrence() {
    let remote = MockRemote::paged(
        common::LISTING,
        vec![vec![
            MockUnit::new("1", "Move 3 spaces").with_context("Movement"),
            MockUnit::new("2", "Rock & Roll <3"),
            MockUnit::new("1", "Move 3 spaces"),
        ]],
    );
    let auth = MockAuth::accepting();
    let mut sessions = common::session_manager(&auth);
    let mut driver = remote.driver();
    let mut extractor = extractor_at(&common::page_url(1));

    let page = extractor.next_page(&mut driver, &mut sessions).await.unwrap().unwrap();

    assert_eq!(page.units.len(), 2);
    assert_eq!(page.units[0].context.as_deref(), Some("Movement"));
    assert_eq!(page.units[1].source_text, "Rock & Roll <3");
    assert_eq!(page.units[1].target_field_id(), "translated_2");
}

/// Test re-login when the site bounces us to the login page mid-walk
#[tokio::test]
async fn test_nextPage_afterSessionExpiry_shouldReauthenticateOnce() {
    common::init_test_logging();
    let remote = MockRemote::paged(
        common::LISTING,
        vec![vec![MockUnit::new("1", "Pass")], vec![MockUnit::new("2", "End turn")]],
    );
    let auth = MockAuth::accepting();
    let mut sessions = common::session_manager(&auth);
    let mut driver = remote.driver();
    let mut extractor = extractor_at(&common::page_url(1));

    extractor.next_page(&mut driver, &mut sessions).await.unwrap().unwrap();
    remote.expire_session();
    let page = extractor.next_page(&mut driver, &mut sessions).await.unwrap().unwrap();

    assert_eq!(page.units[0].id, "2");
    assert_eq!(sessions.generation(), 2);
    assert_eq!(auth.login_requests(), 2);
    assert_eq!(
        remote.navigations(),
        vec![common::page_url(1), common::page_url(2), common::page_url(2)]
    );
}

/// Test that a failing re-login surfaces as a lost session
#[tokio::test(start_paused = true)]
async fn test_nextPage_withFailingReauthentication_shouldReportSessionLost() {
    let remote = MockRemote::paged(common::LISTING, vec![vec![], vec![]]);
    let auth = MockAuth::accepting();
    let mut sessions = common::session_manager(&auth);
    let mut driver = remote.driver();
    let mut extractor = extractor_at(&common::page_url(1));

    extractor.next_page(&mut driver, &mut sessions).await.unwrap();
    remote.expire_session();
    for _ in 0..3 {
        auth.push_entry_page(Err(DriverError::ConnectionError("down".to_string())));
    }

    let result = extractor.next_page(&mut driver, &mut sessions).await;

    assert!(matches!(result, Err(PaginationError::SessionLost { .. })));
}

/// Test that a page rejecting a fresh session ends the walk with the session invalidated
#[tokio::test(start_paused = true)]
async fn test_nextPage_withRejectionAfterRenewal_shouldInvalidateAndReportSessionLost() {
    let remote = MockRemote::paged(common::LISTING, vec![vec![MockUnit::new("1", "Pass")]]);
    remote.fail_navigations([
        DriverError::AuthenticationError("not logged in".to_string()),
        DriverError::AuthenticationError("not logged in".to_string()),
    ]);
    let auth = MockAuth::accepting();
    let mut sessions = common::session_manager(&auth);
    let mut driver = remote.driver();
    let mut extractor = extractor_at(&common::page_url(1));

    let result = extractor.next_page(&mut driver, &mut sessions).await;

    assert!(
        matches!(
            result,
            Err(PaginationError::SessionLost { source: AuthError::SessionRejected(_), .. })
        ),
        "{:?}",
        result
    );
    assert!(!sessions.is_valid());
    assert_eq!(remote.navigations().len(), 2);
}

/// Test recovery from transient navigation faults
#[tokio::test(start_paused = true)]
async fn test_nextPage_withTwoTransientFaults_shouldSucceedOnThirdAttempt() {
    let remote = MockRemote::paged(common::LISTING, vec![vec![MockUnit::new("1", "Pass")]]);
    remote.fail_navigations([
        DriverError::Timeout(30_000),
        DriverError::ConnectionError("reset".to_string()),
    ]);
    let auth = MockAuth::accepting();
    let mut sessions = common::session_manager(&auth);
    let mut driver = remote.driver();
    let mut extractor = extractor_at(&common::page_url(1));

    let page = extractor.next_page(&mut driver, &mut sessions).await.unwrap().unwrap();

    assert_eq!(page.units.len(), 1);
    assert_eq!(remote.navigations().len(), 3);
}

/// Test that persistent faults exhaust the retry budget
#[tokio::test(start_paused = true)]
async fn test_nextPage_withPersistentFaults_shouldFailAfterMaxAttempts() {
    let remote = MockRemote::paged(common::LISTING, vec![vec![MockUnit::new("1", "Pass")]]);
    remote.fail_navigations((0..3).map(|_| DriverError::ConnectionError("unreachable".to_string())));
    let auth = MockAuth::accepting();
    let mut sessions = common::session_manager(&auth);
    let mut driver = remote.driver();
    let mut extractor = extractor_at(&common::page_url(1));

    let result = extractor.next_page(&mut driver, &mut sessions).await;

    match result {
        Err(PaginationError::FetchFailed { cursor, attempts, message }) => {
            assert_eq!(cursor, common::page_url(1));
            assert_eq!(attempts, 3);
            assert!(message.contains("unreachable"));
        }
        other => panic!("expected FetchFailed, got {:?}", other),
    }
    assert!(!extractor.is_exhausted());
}

/// Test the per-operation deadline
#[tokio::test(start_paused = true)]
async fn test_nextPage_withSlowNavigation_shouldTimeOut() {
    let remote = MockRemote::paged(common::LISTING, vec![vec![]]);
    remote.set_navigate_delay(Duration::from_secs(60));
    let auth = MockAuth::accepting();
    let mut sessions = common::session_manager(&auth);
    let mut driver = remote.driver();
    let mut extractor = extractor_at(&common::page_url(1));

    let result = extractor.next_page(&mut driver, &mut sessions).await;

    match result {
        Err(PaginationError::FetchFailed { message, .. }) => assert!(message.contains("timed out")),
        other => panic!("expected FetchFailed, got {:?}", other),
    }
}

/// Test that a cancelled walk stops before fetching
#[tokio::test]
async fn test_nextPage_whenCancelled_shouldReturnCancelled() {
    let remote = MockRemote::paged(common::LISTING, vec![vec![]]);
    let auth = MockAuth::accepting();
    let mut sessions = common::session_manager(&auth);
    let mut driver = remote.driver();
    let cancel = CancelToken::new();
    let mut extractor = ContentExtractor::new(
        PageCursor::At(common::page_url(1)),
        common::test_policy(),
        Duration::from_secs(5),
        cancel.clone(),
    );
    cancel.cancel();

    let result = extractor.next_page(&mut driver, &mut sessions).await;

    assert_eq!(result, Err(PaginationError::Cancelled));
    assert!(remote.navigations().is_empty());
}

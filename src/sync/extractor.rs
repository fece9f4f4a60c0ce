/*!
 * Walks the paginated listing of untranslated strings.
 *
 * The extractor is a lazy, finite, non-restartable sequence of pages. Each
 * fetch runs under the retry policy and a per-operation timeout; an
 * authentication rejection triggers one re-login before the fetch is
 * retried.
 */

use log::{debug, error, info, warn};
use std::collections::HashSet;
use std::time::Duration;
use url::Url;

use crate::errors::{AuthError, DriverError, PaginationError};
use crate::providers::FormDriver;
use crate::retry::{CancelToken, RetryPolicy, RetryState};
use crate::session::{Session, SessionManager};

use super::html;
use super::models::{Page, PageCursor, TranslationUnit, SOURCE_FIELD_PREFIX, TARGET_FIELD_PREFIX};
use super::with_timeout;

/// Class of the link leading to the next page
const NEXT_CONTROL_CLASS: &str = "pagination_next";

/// Path prefixes meaning we were bounced to the login flow
const DEFAULT_LOGIN_PATHS: &[&str] = &["/account", "/welcome", "/login"];

struct LoadedPage {
    url: String,
    html: String,
}

/// Lazy page sequence over the listing
#[derive(Debug)]
pub struct ContentExtractor {
    cursor: PageCursor,
    visited: HashSet<String>,
    pages_fetched: usize,
    policy: RetryPolicy,
    timeout: Duration,
    cancel: CancelToken,
    login_paths: Vec<String>,
}

impl ContentExtractor {
    /// Start a walk at `start`
    pub fn new(start: PageCursor, policy: RetryPolicy, timeout: Duration, cancel: CancelToken) -> Self {
        Self {
            cursor: start,
            visited: HashSet::new(),
            pages_fetched: 0,
            policy,
            timeout,
            cancel,
            login_paths: DEFAULT_LOGIN_PATHS.iter().map(|p| p.to_string()).collect(),
        }
    }

    /// Also treat landing on any of these path prefixes as a lost session
    pub fn with_login_paths(mut self, paths: Vec<String>) -> Self {
        for path in paths {
            if !path.is_empty() && path != "/" && !self.login_paths.contains(&path) {
                self.login_paths.push(path);
            }
        }
        self
    }

    /// Path prefixes that mean the site sent us to log in
    pub fn login_paths(&self) -> &[String] {
        &self.login_paths
    }

    /// Cursor of the next page to fetch
    pub fn cursor(&self) -> &PageCursor {
        &self.cursor
    }

    /// Pages fetched so far
    pub fn pages_fetched(&self) -> usize {
        self.pages_fetched
    }

    /// Whether the walk has reached the end
    pub fn is_exhausted(&self) -> bool {
        self.cursor.is_terminal()
    }

    /// Fetch the page at the cursor and advance; `None` once exhausted
    pub async fn next_page<D>(
        &mut self,
        driver: &mut D,
        sessions: &mut SessionManager,
    ) -> Result<Option<Page>, PaginationError>
    where
        D: FormDriver + ?Sized,
    {
        let url = match &self.cursor {
            PageCursor::End => return Ok(None),
            PageCursor::At(url) => url.clone(),
        };

        // Never fetch with a session we know to be dead
        if !sessions.is_valid() {
            renew_session(driver, sessions)
                .await
                .map_err(|source| PaginationError::SessionLost { cursor: url.clone(), source })?;
        }

        let loaded = self.fetch_page(driver, sessions, &url).await?;
        self.visited.insert(url.clone());
        self.visited.insert(loaded.url.clone());
        self.pages_fetched += 1;

        let units = parse_units(&loaded.html);
        let (next, warning) = self.next_cursor(&loaded);
        if let Some(warning) = &warning {
            warn!("{}", warning);
        }

        info!(
            "Page {}: {} units, next {}",
            self.pages_fetched,
            units.len(),
            next
        );

        self.cursor = next.clone();
        Ok(Some(Page {
            number: self.pages_fetched,
            cursor: PageCursor::At(url),
            units,
            next,
            warning,
        }))
    }

    async fn fetch_page<D>(
        &mut self,
        driver: &mut D,
        sessions: &mut SessionManager,
        url: &str,
    ) -> Result<LoadedPage, PaginationError>
    where
        D: FormDriver + ?Sized,
    {
        let mut state = RetryState::new(format!("page {}", url));
        let mut renewed = false;

        loop {
            if self.cancel.is_cancelled() {
                return Err(PaginationError::Cancelled);
            }

            let fault = match self.load(driver, url).await {
                Ok(loaded) if !self.is_login_page(&loaded.url) => return Ok(loaded),
                Ok(loaded) => DriverError::AuthenticationError(format!("redirected to {}", loaded.url)),
                Err(e) => e,
            };

            if fault.is_auth_rejection() {
                sessions.invalidate();
                if renewed {
                    error!("Session rejected again while fetching {}: {}", url, fault);
                    return Err(PaginationError::SessionLost {
                        cursor: url.to_string(),
                        source: AuthError::SessionRejected(fault.to_string()),
                    });
                }
                warn!("Session rejected while fetching {} ({}), logging in again", url, fault);
                renewed = true;
                renew_session(driver, sessions)
                    .await
                    .map_err(|source| PaginationError::SessionLost { cursor: url.to_string(), source })?;
                continue;
            }

            let attempt = state.record_attempt();
            warn!(
                "Failed to fetch {}: {} - attempt {}/{}",
                url, fault, attempt, self.policy.max_attempts
            );
            if state.exhausted(&self.policy) {
                error!("Giving up on {} after {} attempts", url, attempt);
                return Err(PaginationError::FetchFailed {
                    cursor: url.to_string(),
                    attempts: attempt,
                    message: fault.to_string(),
                });
            }

            let hint = fault.retry_after_secs().map(Duration::from_secs);
            state
                .backoff(&self.policy, hint, &self.cancel)
                .await
                .map_err(|_| PaginationError::Cancelled)?;
        }
    }

    async fn load<D>(&self, driver: &mut D, url: &str) -> Result<LoadedPage, DriverError>
    where
        D: FormDriver + ?Sized,
    {
        with_timeout(self.timeout, driver.navigate(url)).await?;
        with_timeout(self.timeout, driver.wait_for_idle()).await?;
        let html = with_timeout(self.timeout, driver.page_content()).await?;
        Ok(LoadedPage {
            url: driver.current_url(),
            html,
        })
    }

    fn is_login_page(&self, landed: &str) -> bool {
        let Ok(parsed) = Url::parse(landed) else {
            return false;
        };
        let path = parsed.path();
        self.login_paths.iter().any(|prefix| path.starts_with(prefix.as_str()))
    }

    fn next_cursor(&self, loaded: &LoadedPage) -> (PageCursor, Option<PaginationError>) {
        let Some(anchor) = html::find_anchor_with_class(&loaded.html, NEXT_CONTROL_CLASS) else {
            debug!("No pagination control on {}", loaded.url);
            return (PageCursor::End, None);
        };
        if anchor.is_inert() {
            debug!("Pagination control on {} is disabled", loaded.url);
            return (PageCursor::End, None);
        }

        let href = anchor.href.unwrap_or_default();
        let resolved = match Url::parse(&loaded.url).and_then(|base| base.join(href.trim())) {
            Ok(url) => url.to_string(),
            Err(e) => {
                return (
                    PageCursor::End,
                    Some(PaginationError::Inconsistent {
                        cursor: loaded.url.clone(),
                        message: format!("cannot resolve next link {:?}: {}", href, e),
                    }),
                );
            }
        };

        if self.visited.contains(&resolved) {
            return (
                PageCursor::End,
                Some(PaginationError::Inconsistent {
                    cursor: loaded.url.clone(),
                    message: format!("next link points back to visited page {}", resolved),
                }),
            );
        }
        (PageCursor::At(resolved), None)
    }
}

/// Re-establish the session and hand it to the driver
pub(crate) async fn renew_session<D>(driver: &mut D, sessions: &mut SessionManager) -> Result<Session, AuthError>
where
    D: FormDriver + ?Sized,
{
    let session = sessions.acquire().await?;
    if let Err(e) = driver.attach_session(&session).await {
        sessions.invalidate();
        return Err(AuthError::RetriesExhausted {
            attempts: 1,
            last_error: format!("could not attach session: {}", e),
        });
    }
    Ok(session)
}

/// Units of a listing page in document order
fn parse_units(page: &str) -> Vec<TranslationUnit> {
    let fields = html::textarea_values(page);
    let contexts = html::context_texts(page);
    let mut seen = HashSet::new();
    let mut units = Vec::new();

    for (field_id, source_text) in &fields {
        let Some(id) = field_id.strip_prefix(SOURCE_FIELD_PREFIX) else {
            continue;
        };
        if source_text.is_empty() {
            debug!("Dropping unit {} with empty source text", id);
            continue;
        }
        if !seen.insert(id.to_string()) {
            debug!("Unit {} listed twice on the same page", id);
            continue;
        }

        let target_id = format!("{}{}", TARGET_FIELD_PREFIX, id);
        let current_translation = fields
            .iter()
            .find(|(fid, _)| *fid == target_id)
            .map(|(_, value)| value.clone())
            .unwrap_or_default();

        units.push(TranslationUnit {
            id: id.to_string(),
            source_text: source_text.clone(),
            context: contexts.get(id).cloned().filter(|c| !c.is_empty()),
            current_translation,
        });
    }
    units
}

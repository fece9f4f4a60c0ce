/*!
 * Mock remote implementations for testing.
 *
 * This module provides an in-memory translation site:
 * - `MockAuth` - scripted login surface (entry page, username check, login)
 * - `MockRemote` - paginated listing shared by every driver it hands out
 * - `MockDriver` - `FormDriver` over a `MockRemote`
 *
 * Faults are scripted per call so retry paths can be exercised
 * deterministically.
 */

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use crate::errors::DriverError;
use crate::providers::{AuthTransport, FormDriver};
use crate::session::{LoginForm, Session};
use crate::sync::html::{escape_html, textarea_values};
use crate::sync::models::TARGET_FIELD_PREFIX;

/// Entry page exposing `mock-token`
pub const MOCK_ENTRY_PAGE: &str =
    r#"<html><head><script>var bgaConfig = { requestToken: 'mock-token', locale: 'en' };</script></head></html>"#;

/// Successful login response body
pub const LOGIN_OK: &str = r#"{"status":1,"data":{"infomsg":""}}"#;

#[derive(Debug)]
struct AuthScript {
    entry_pages: VecDeque<Result<String, DriverError>>,
    default_entry_page: String,
    login_responses: VecDeque<Result<String, DriverError>>,
    default_login_response: String,
    username_response: String,
    entry_requests: usize,
    username_requests: usize,
    login_forms: Vec<LoginForm>,
}

/// Scripted login surface
///
/// Queued responses are served first; once a queue is empty the default
/// response is returned forever.
#[derive(Debug, Clone)]
pub struct MockAuth {
    script: Arc<Mutex<AuthScript>>,
}

impl MockAuth {
    /// A site that serves a token and accepts any credentials
    pub fn accepting() -> Self {
        Self {
            script: Arc::new(Mutex::new(AuthScript {
                entry_pages: VecDeque::new(),
                default_entry_page: MOCK_ENTRY_PAGE.to_string(),
                login_responses: VecDeque::new(),
                default_login_response: LOGIN_OK.to_string(),
                username_response: LOGIN_OK.to_string(),
                entry_requests: 0,
                username_requests: 0,
                login_forms: Vec::new(),
            })),
        }
    }

    /// A site that refuses every login with `message`
    pub fn rejecting(message: &str) -> Self {
        let auth = Self::accepting();
        auth.script.lock().default_login_response = serde_json::json!({ "status": 0, "error": message }).to_string();
        auth
    }

    /// A site whose entry page never carries a token
    pub fn without_token() -> Self {
        let auth = Self::accepting();
        auth.script.lock().default_entry_page = "<html><body>maintenance</body></html>".to_string();
        auth
    }

    /// Queue an entry page response
    pub fn push_entry_page(&self, response: Result<String, DriverError>) {
        self.script.lock().entry_pages.push_back(response);
    }

    /// Queue a raw login response body
    pub fn push_login_response(&self, body: impl Into<String>) {
        self.script.lock().login_responses.push_back(Ok(body.into()));
    }

    /// Queue a rate-limit refusal lasting until `wait_until`
    pub fn push_rate_limit(&self, wait_until: i64) {
        let body = serde_json::json!({
            "status": 0,
            "error": "You have made too many login attempts",
            "wait_until": wait_until,
        });
        self.push_login_response(body.to_string());
    }

    /// Queue a transport fault for the next login post
    pub fn push_login_fault(&self, error: DriverError) {
        self.script.lock().login_responses.push_back(Err(error));
    }

    /// Set the username check response
    pub fn set_username_response(&self, body: impl Into<String>) {
        self.script.lock().username_response = body.into();
    }

    /// Entry page fetches so far
    pub fn entry_requests(&self) -> usize {
        self.script.lock().entry_requests
    }

    /// Username checks so far
    pub fn username_requests(&self) -> usize {
        self.script.lock().username_requests
    }

    /// Login posts so far
    pub fn login_requests(&self) -> usize {
        self.script.lock().login_forms.len()
    }

    /// The most recent login form
    pub fn last_login_form(&self) -> Option<LoginForm> {
        self.script.lock().login_forms.last().cloned()
    }
}

#[async_trait]
impl AuthTransport for MockAuth {
    async fn fetch_entry_page(&self) -> Result<String, DriverError> {
        let mut script = self.script.lock();
        script.entry_requests += 1;
        match script.entry_pages.pop_front() {
            Some(response) => response,
            None => Ok(script.default_entry_page.clone()),
        }
    }

    async fn check_username(&self, _username: &str, _request_token: &str) -> Result<String, DriverError> {
        let mut script = self.script.lock();
        script.username_requests += 1;
        Ok(script.username_response.clone())
    }

    async fn submit_login(&self, form: &LoginForm) -> Result<String, DriverError> {
        let mut script = self.script.lock();
        script.login_forms.push(form.clone());
        match script.login_responses.pop_front() {
            Some(response) => response,
            None => Ok(script.default_login_response.clone()),
        }
    }
}

/// A translatable string as the mock site stores it
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MockUnit {
    /// Remote identifier
    pub id: String,
    /// Source text
    pub source_text: String,
    /// Optional context shown next to the string
    pub context: Option<String>,
    /// Translation currently stored
    pub current_translation: String,
}

impl MockUnit {
    /// An untranslated unit
    pub fn new(id: impl Into<String>, source_text: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            source_text: source_text.into(),
            ..Self::default()
        }
    }

    /// Set the stored translation
    pub fn translated(mut self, text: impl Into<String>) -> Self {
        self.current_translation = text.into();
        self
    }

    /// Set the context
    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context = Some(context.into());
        self
    }
}

/// Pagination control rendered at the bottom of a page
#[derive(Debug, Clone, PartialEq)]
pub enum MockNext {
    /// No control at all
    Missing,
    /// Control present but disabled
    Disabled,
    /// Control pointing at `href`
    Link(String),
}

#[derive(Debug, Clone)]
struct MockPage {
    units: Vec<MockUnit>,
    next: MockNext,
}

#[derive(Debug)]
struct RemoteState {
    pages: HashMap<String, MockPage>,
    login_url: String,
    hide_translated: bool,
    navigate_faults: VecDeque<DriverError>,
    navigate_delay: Option<Duration>,
    fill_faults: HashMap<String, VecDeque<DriverError>>,
    broken_fields: HashMap<String, DriverError>,
    lossy_fields: Vec<String>,
    min_generation: u32,
    last_attached: u32,
    expire_after_writes: Option<usize>,
    navigations: Vec<String>,
    written: Vec<(String, String)>,
}

/// In-memory translation site
#[derive(Debug, Clone)]
pub struct MockRemote {
    state: Arc<Mutex<RemoteState>>,
}

impl Default for MockRemote {
    fn default() -> Self {
        Self::new()
    }
}

impl MockRemote {
    /// An empty site
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(RemoteState {
                pages: HashMap::new(),
                login_url: "https://bga.test/account?redirect=translation".to_string(),
                hide_translated: false,
                navigate_faults: VecDeque::new(),
                navigate_delay: None,
                fill_faults: HashMap::new(),
                broken_fields: HashMap::new(),
                lossy_fields: Vec::new(),
                min_generation: 1,
                last_attached: 0,
                expire_after_writes: None,
                navigations: Vec::new(),
                written: Vec::new(),
            })),
        }
    }

    /// Build a chain of pages `<base>&page=1..=n`, each linking to the next
    pub fn paged(base: &str, pages: Vec<Vec<MockUnit>>) -> Self {
        let remote = Self::new();
        let count = pages.len();
        for (i, units) in pages.into_iter().enumerate() {
            let next = if i + 1 < count {
                MockNext::Link(Self::page_url(base, i + 2))
            } else {
                MockNext::Disabled
            };
            remote.add_page(&Self::page_url(base, i + 1), units, next);
        }
        remote
    }

    /// URL of page `number` in a chain built by `paged`
    pub fn page_url(base: &str, number: usize) -> String {
        format!("{}&page={}", base, number)
    }

    /// Add or replace the page served at `url`
    pub fn add_page(&self, url: &str, units: Vec<MockUnit>, next: MockNext) {
        self.state.lock().pages.insert(url.to_string(), MockPage { units, next });
    }

    /// Leave units with a stored translation out of the listing
    pub fn hide_translated(&self) {
        self.state.lock().hide_translated = true;
    }

    /// Fail the next navigations with the given faults, in order
    pub fn fail_navigations(&self, faults: impl IntoIterator<Item = DriverError>) {
        self.state.lock().navigate_faults.extend(faults);
    }

    /// Make every navigation take `delay`
    pub fn set_navigate_delay(&self, delay: Duration) {
        self.state.lock().navigate_delay = Some(delay);
    }

    /// Fail the next writes to `field_id` with the given faults, in order
    pub fn fail_field(&self, field_id: &str, faults: impl IntoIterator<Item = DriverError>) {
        self.state
            .lock()
            .fill_faults
            .entry(field_id.to_string())
            .or_default()
            .extend(faults);
    }

    /// Fail every write to `field_id`
    pub fn break_field(&self, field_id: &str, fault: DriverError) {
        self.state.lock().broken_fields.insert(field_id.to_string(), fault);
    }

    /// Accept writes to `field_id` without storing them
    pub fn make_lossy(&self, field_id: &str) {
        self.state.lock().lossy_fields.push(field_id.to_string());
    }

    /// Reject every session attached so far
    pub fn expire_session(&self) {
        let mut state = self.state.lock();
        state.min_generation = state.last_attached + 1;
    }

    /// Reject the current session once `writes` writes have been stored
    pub fn expire_session_after_writes(&self, writes: usize) {
        self.state.lock().expire_after_writes = Some(writes);
    }

    /// URLs navigated to, in order
    pub fn navigations(&self) -> Vec<String> {
        self.state.lock().navigations.clone()
    }

    /// Stored writes as `(field_id, text)`, in order
    pub fn written(&self) -> Vec<(String, String)> {
        self.state.lock().written.clone()
    }

    /// Number of stored writes
    pub fn write_count(&self) -> usize {
        self.state.lock().written.len()
    }

    /// Translation currently stored for a unit
    pub fn translation_of(&self, unit_id: &str) -> Option<String> {
        let state = self.state.lock();
        state
            .pages
            .values()
            .flat_map(|page| page.units.iter())
            .find(|unit| unit.id == unit_id)
            .map(|unit| unit.current_translation.clone())
    }

    /// A fresh driver over this site
    pub fn driver(&self) -> MockDriver {
        MockDriver {
            remote: self.clone(),
            generation: 0,
            current_url: String::new(),
            content: String::new(),
            fields: HashMap::new(),
        }
    }

    fn render(page: &MockPage, hide_translated: bool) -> String {
        let mut html = String::from("<html><body><div id=\"translation_list\">\n");
        for unit in page
            .units
            .iter()
            .filter(|u| !hide_translated || u.current_translation.is_empty())
        {
            html.push_str("<div class=\"translation_item\">\n");
            if let Some(context) = &unit.context {
                html.push_str(&format!("<div id=\"context_{}\">{}</div>\n", unit.id, escape_html(context)));
            }
            html.push_str(&format!(
                "<textarea id=\"toTranslate_{}\" readonly>{}</textarea>\n",
                unit.id,
                escape_html(&unit.source_text)
            ));
            html.push_str(&format!(
                "<textarea id=\"translated_{}\">{}</textarea>\n</div>\n",
                unit.id,
                escape_html(&unit.current_translation)
            ));
        }
        html.push_str("</div>\n<div class=\"pagination\">\n");
        match &page.next {
            MockNext::Missing => {}
            MockNext::Disabled => html.push_str("<a class=\"pagination_next disabled\" href=\"#\">Next</a>\n"),
            MockNext::Link(href) => html.push_str(&format!(
                "<a class=\"pagination_next\" href=\"{}\">Next</a>\n",
                escape_html(href)
            )),
        }
        html.push_str("</div></body></html>");
        html
    }
}

/// Form driver over a `MockRemote`
#[derive(Debug)]
pub struct MockDriver {
    remote: MockRemote,
    generation: u32,
    current_url: String,
    content: String,
    fields: HashMap<String, String>,
}

impl MockDriver {
    /// The site this driver talks to
    pub fn remote(&self) -> &MockRemote {
        &self.remote
    }
}

#[async_trait]
impl FormDriver for MockDriver {
    async fn attach_session(&mut self, session: &Session) -> Result<(), DriverError> {
        self.generation = session.generation();
        let mut state = self.remote.state.lock();
        state.last_attached = state.last_attached.max(session.generation());
        Ok(())
    }

    async fn navigate(&mut self, url: &str) -> Result<(), DriverError> {
        let delay = {
            let mut state = self.remote.state.lock();
            state.navigations.push(url.to_string());
            if let Some(fault) = state.navigate_faults.pop_front() {
                return Err(fault);
            }
            state.navigate_delay
        };
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let state = self.remote.state.lock();
        if self.generation < state.min_generation {
            self.current_url = state.login_url.clone();
            self.content = "<html><body><form id=\"login\"></form></body></html>".to_string();
            self.fields.clear();
            return Ok(());
        }

        let page = state
            .pages
            .get(url)
            .ok_or_else(|| DriverError::ApiError {
                status_code: 404,
                message: format!("no page at {}", url),
            })?;
        self.content = MockRemote::render(page, state.hide_translated);
        self.fields = textarea_values(&self.content).into_iter().collect();
        self.current_url = url.to_string();
        Ok(())
    }

    async fn wait_for_idle(&mut self) -> Result<(), DriverError> {
        Ok(())
    }

    fn current_url(&self) -> String {
        self.current_url.clone()
    }

    async fn page_content(&mut self) -> Result<String, DriverError> {
        Ok(self.content.clone())
    }

    async fn locate_and_fill(&mut self, field_id: &str, text: &str) -> Result<(), DriverError> {
        let mut state = self.remote.state.lock();
        if self.generation < state.min_generation {
            return Err(DriverError::AuthenticationError("not logged in".to_string()));
        }
        if let Some(fault) = state.fill_faults.get_mut(field_id).and_then(VecDeque::pop_front) {
            return Err(fault);
        }
        if let Some(fault) = state.broken_fields.get(field_id) {
            return Err(fault.clone());
        }
        if !self.fields.contains_key(field_id) {
            return Err(DriverError::FieldNotFound(field_id.to_string()));
        }
        if state.lossy_fields.iter().any(|f| f == field_id) {
            return Ok(());
        }

        let unit_id = field_id.strip_prefix(TARGET_FIELD_PREFIX).unwrap_or(field_id);
        for unit in state.pages.values_mut().flat_map(|page| page.units.iter_mut()) {
            if unit.id == unit_id {
                unit.current_translation = text.to_string();
            }
        }
        state.written.push((field_id.to_string(), text.to_string()));
        self.fields.insert(field_id.to_string(), text.to_string());

        if state.expire_after_writes == Some(state.written.len()) {
            state.expire_after_writes = None;
            state.min_generation = state.last_attached + 1;
        }
        Ok(())
    }

    async fn field_value(&mut self, field_id: &str) -> Result<Option<String>, DriverError> {
        Ok(self.fields.get(field_id).cloned())
    }
}

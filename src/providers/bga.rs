use anyhow::{Context, Result};
use async_trait::async_trait;
use log::{debug, error, warn};
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, ACCEPT_LANGUAGE, RETRY_AFTER};
use reqwest::{Client, Response, StatusCode};
use std::collections::HashMap;
use std::time::Duration;

use crate::app_config::RemoteConfig;
use crate::errors::DriverError;
use crate::session::{LoginForm, LoginOutcome, Session};
use crate::sync::html;
use crate::sync::models::TARGET_FIELD_PREFIX;

use super::{AuthTransport, FormDriver};

/// Header carrying the anti-forgery token on authenticated requests
const REQUEST_TOKEN_HEADER: &str = "x-request-token";

/// HTTP client for the live translation site
///
/// Clones share the connection pool and the cookie jar, so one clone can
/// serve as the login transport while another drives the pages.
#[derive(Debug, Clone)]
pub struct BgaClient {
    /// HTTP client for making requests
    client: Client,
    /// Site endpoints and locales
    remote: RemoteConfig,
    /// Per-request deadline
    timeout: Duration,
    /// Token of the attached session
    request_token: Option<String>,
    /// URL of the last loaded page, after redirects
    current_url: String,
    /// Markup of the last loaded page
    content: String,
    /// Textarea values of the last loaded page
    fields: HashMap<String, String>,
    /// A save went through since the page was loaded
    stale: bool,
}

impl BgaClient {
    /// Create a new client with a fresh cookie jar
    pub fn new(remote: RemoteConfig) -> Result<Self> {
        let timeout = Duration::from_secs(remote.timeout_secs);

        let mut headers = HeaderMap::new();
        headers.insert(
            ACCEPT,
            HeaderValue::from_static("text/html,application/xhtml+xml,application/json;q=0.9,*/*;q=0.8"),
        );
        headers.insert(ACCEPT_LANGUAGE, HeaderValue::from_static("en-US,en;q=0.9"));

        let client = Client::builder()
            .cookie_store(true)
            .user_agent(remote.user_agent.clone())
            .default_headers(headers)
            .timeout(timeout)
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            client,
            remote,
            timeout,
            request_token: None,
            current_url: String::new(),
            content: String::new(),
            fields: HashMap::new(),
            stale: false,
        })
    }

    /// Endpoints this client talks to
    pub fn remote(&self) -> &RemoteConfig {
        &self.remote
    }

    fn map_send_error(&self, e: reqwest::Error) -> DriverError {
        if e.is_timeout() {
            DriverError::Timeout(self.timeout.as_millis() as u64)
        } else if e.is_connect() {
            DriverError::ConnectionError(e.to_string())
        } else {
            DriverError::RequestFailed(e.to_string())
        }
    }

    fn authorized(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.request_token {
            Some(token) => request.header(REQUEST_TOKEN_HEADER, token),
            None => request,
        }
    }

    /// Read a response into its final URL and body, mapping error statuses
    async fn read_body(response: Response) -> Result<(String, String), DriverError> {
        let status = response.status();
        let url = response.url().to_string();
        let retry_after_secs = response
            .headers()
            .get(RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse::<u64>().ok());

        let body = response
            .text()
            .await
            .map_err(|e| DriverError::ParseError(format!("Failed to read response body: {}", e)))?;

        if status == StatusCode::TOO_MANY_REQUESTS {
            warn!("Rate limited by {} (retry after {:?}s)", url, retry_after_secs);
            return Err(DriverError::RateLimitExceeded {
                message: snippet(&body),
                retry_after_secs,
            });
        }
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            return Err(DriverError::AuthenticationError(format!("{} from {}", status, url)));
        }
        if !status.is_success() {
            error!("Remote error ({}) from {}: {}", status, url, snippet(&body));
            return Err(DriverError::ApiError {
                status_code: status.as_u16(),
                message: snippet(&body),
            });
        }
        Ok((url, body))
    }

    async fn post_form(&self, path: &str, form: &[(&str, String)]) -> Result<String, DriverError> {
        let url = self.remote.url_for(path);
        let request = self
            .client
            .post(&url)
            .header("X-Requested-With", "XMLHttpRequest")
            .form(form);
        let response = self
            .authorized(request)
            .send()
            .await
            .map_err(|e| self.map_send_error(e))?;
        Self::read_body(response).await.map(|(_, body)| body)
    }
}

#[async_trait]
impl AuthTransport for BgaClient {
    async fn fetch_entry_page(&self) -> Result<String, DriverError> {
        let url = self.remote.url_for(&self.remote.entry_path);
        debug!("GET {}", url);
        let response = self.client.get(&url).send().await.map_err(|e| self.map_send_error(e))?;
        Self::read_body(response).await.map(|(_, body)| body)
    }

    async fn check_username(&self, username: &str, request_token: &str) -> Result<String, DriverError> {
        let url = self.remote.url_for(&self.remote.check_username_path);
        debug!("POST {}", url);
        let response = self
            .client
            .post(&url)
            .header(REQUEST_TOKEN_HEADER, request_token)
            .header("X-Requested-With", "XMLHttpRequest")
            .form(&[("username", username), ("request_token", request_token)])
            .send()
            .await
            .map_err(|e| self.map_send_error(e))?;
        Self::read_body(response).await.map(|(_, body)| body)
    }

    async fn submit_login(&self, form: &LoginForm) -> Result<String, DriverError> {
        let url = self.remote.url_for(&self.remote.login_path);
        debug!("POST {} as {}", url, form.username);
        let response = self
            .client
            .post(&url)
            .header(REQUEST_TOKEN_HEADER, form.request_token.as_str())
            .header("X-Requested-With", "XMLHttpRequest")
            .form(&form.to_pairs())
            .send()
            .await
            .map_err(|e| self.map_send_error(e))?;
        Self::read_body(response).await.map(|(_, body)| body)
    }
}

#[async_trait]
impl FormDriver for BgaClient {
    async fn attach_session(&mut self, session: &Session) -> Result<(), DriverError> {
        if !session.is_valid() {
            return Err(DriverError::AuthenticationError(format!(
                "session #{} is no longer valid",
                session.generation()
            )));
        }
        self.request_token = Some(session.token().to_string());
        Ok(())
    }

    async fn navigate(&mut self, url: &str) -> Result<(), DriverError> {
        debug!("GET {}", url);
        let request = self.authorized(self.client.get(url));
        let response = request.send().await.map_err(|e| self.map_send_error(e))?;
        let (final_url, body) = Self::read_body(response).await?;

        self.fields = html::textarea_values(&body).into_iter().collect();
        self.current_url = final_url;
        self.content = body;
        self.stale = false;
        Ok(())
    }

    async fn wait_for_idle(&mut self) -> Result<(), DriverError> {
        // A plain HTTP response is complete once read
        Ok(())
    }

    fn current_url(&self) -> String {
        self.current_url.clone()
    }

    async fn page_content(&mut self) -> Result<String, DriverError> {
        Ok(self.content.clone())
    }

    async fn locate_and_fill(&mut self, field_id: &str, text: &str) -> Result<(), DriverError> {
        if !self.fields.contains_key(field_id) {
            return Err(DriverError::FieldNotFound(field_id.to_string()));
        }
        let unit_id = field_id.strip_prefix(TARGET_FIELD_PREFIX).unwrap_or(field_id);

        let form = [
            ("id", unit_id.to_string()),
            ("translation", text.to_string()),
            ("source_locale", self.remote.source_locale.clone()),
            ("dest_locale", self.remote.dest_locale.clone()),
        ];
        let body = self.post_form(&self.remote.save_path, &form).await?;

        // The save endpoint answers with the same envelope as the login
        match LoginOutcome::parse(&body) {
            LoginOutcome::Success => {
                self.stale = true;
                Ok(())
            }
            LoginOutcome::RateLimited { wait_until, message } => {
                let now = chrono::Utc::now().timestamp();
                Err(DriverError::RateLimitExceeded {
                    message,
                    retry_after_secs: Some(wait_until.saturating_sub(now).max(0) as u64),
                })
            }
            LoginOutcome::Rejected { message } if mentions_login(&message) => {
                Err(DriverError::AuthenticationError(message))
            }
            LoginOutcome::Rejected { message } => {
                warn!("Save of {} refused: {}", field_id, message);
                Err(DriverError::ApiError {
                    status_code: StatusCode::BAD_REQUEST.as_u16(),
                    message,
                })
            }
            LoginOutcome::Malformed(message) => Err(DriverError::ParseError(message)),
        }
    }

    async fn field_value(&mut self, field_id: &str) -> Result<Option<String>, DriverError> {
        // Read what the server kept, not what we sent
        if self.stale && !self.current_url.is_empty() {
            let url = self.current_url.clone();
            self.navigate(&url).await?;
        }
        Ok(self.fields.get(field_id).cloned())
    }
}

fn mentions_login(message: &str) -> bool {
    let lower = message.to_lowercase();
    ["login", "log in", "logged", "session", "not connected"]
        .iter()
        .any(|needle| lower.contains(needle))
}

fn snippet(body: &str) -> String {
    const MAX_CHARS: usize = 200;
    let trimmed = body.trim();
    if trimmed.chars().count() <= MAX_CHARS {
        trimmed.to_string()
    } else {
        format!("{}...", trimmed.chars().take(MAX_CHARS).collect::<String>())
    }
}

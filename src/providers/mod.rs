/*!
 * Remote surface abstractions.
 *
 * The engine never talks to the network directly. It goes through two
 * capabilities:
 * - `AuthTransport`: the plain HTTP surface the login handshake runs over
 * - `FormDriver`: navigation and field filling on the translation pages
 *
 * Implementations:
 * - `bga`: reqwest client for the live site, implements both
 * - `mock`: scripted in-memory remote for tests
 */

use async_trait::async_trait;
use std::fmt::Debug;

use crate::errors::DriverError;
use crate::session::{LoginForm, Session};

/// HTTP surface used by the session manager
///
/// Every method returns the raw response body; interpreting it is the
/// caller's job so that the handshake logic stays independent of transport.
#[async_trait]
pub trait AuthTransport: Send + Sync + Debug {
    /// Fetch the entry page that embeds the request token
    async fn fetch_entry_page(&self) -> Result<String, DriverError>;

    /// Ask the site whether the username exists
    async fn check_username(&self, username: &str, request_token: &str) -> Result<String, DriverError>;

    /// Post the password login form
    async fn submit_login(&self, form: &LoginForm) -> Result<String, DriverError>;
}

/// Remote form driver
///
/// Models a stateful page: navigate somewhere, wait until the page settles,
/// then read it or fill fields on it. The engine makes no assumption about
/// the technology behind it.
#[async_trait]
pub trait FormDriver: Send + Debug {
    /// Bind the credentials of an authenticated session to later requests
    async fn attach_session(&mut self, session: &Session) -> Result<(), DriverError>;

    /// Load the page at `url`
    async fn navigate(&mut self, url: &str) -> Result<(), DriverError>;

    /// Wait until the current page has settled
    async fn wait_for_idle(&mut self) -> Result<(), DriverError>;

    /// URL of the current page, after redirects
    fn current_url(&self) -> String;

    /// Markup of the current page
    async fn page_content(&mut self) -> Result<String, DriverError>;

    /// Locate a field on the current page and set its value
    async fn locate_and_fill(&mut self, field_id: &str, text: &str) -> Result<(), DriverError>;

    /// Read a field value back from the current page
    async fn field_value(&mut self, field_id: &str) -> Result<Option<String>, DriverError>;
}

pub mod bga;
pub mod mock;

//! Operator session management
//!
//! Every call starts with a detect step on the home page: the console shows
//! either a "Not Logged In" marker or a "Logout" button. A session this
//! manager established for the same operator is reused as is; any other
//! logged-in state is logged out first so the scenario starts from a known
//! login.

use tracing::{debug, info};

use crate::assertions::Expect;
use crate::browser::{Browser, Cookie, Locator, Role};
use crate::config::{Credentials, Timeouts};
use crate::error::{E2eError, E2eResult};

const LOGGED_OUT_MARKER: &str = "Not Logged In";
const LOGIN_PATH: &str = "/auth/login";
const LOGIN_TITLE: &str = "Lochness - WebUI";

/// An authenticated browser session
#[derive(Debug, Clone)]
pub struct Session {
    pub email: String,
    pub cookies: Vec<Cookie>,
}

impl Session {
    /// Render the session cookies as a `Cookie` request header.
    pub fn cookie_header(&self) -> Option<String> {
        if self.cookies.is_empty() {
            return None;
        }
        Some(
            self.cookies
                .iter()
                .map(|c| format!("{}={}", c.name, c.value))
                .collect::<Vec<_>>()
                .join("; "),
        )
    }
}

/// Authentication state observed by the detect step
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthState {
    LoggedOut,
    LoggedIn,
}

pub struct SessionManager {
    base_url: String,
    timeouts: Timeouts,
    current: Option<Session>,
}

impl SessionManager {
    pub fn new(base_url: impl Into<String>, timeouts: Timeouts) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            timeouts,
            current: None,
        }
    }

    pub fn current(&self) -> Option<&Session> {
        self.current.as_ref()
    }

    /// Forget the cached session so the next call performs a full logout/login.
    pub fn invalidate(&mut self) {
        if self.current.take().is_some() {
            debug!("Session invalidated");
        }
    }

    /// Make sure the browser is logged in as `credentials`.
    pub async fn ensure_authenticated(
        &mut self,
        browser: &mut dyn Browser,
        credentials: &Credentials,
    ) -> E2eResult<Session> {
        credentials.validate()?;

        let state = self.detect(browser).await?;

        if state == AuthState::LoggedIn {
            if let Some(session) = &self.current {
                if session.email == credentials.email() {
                    debug!("Reusing session for {}", session.email);
                    return Ok(session.clone());
                }
            }
            self.logout(browser).await?;
        }

        self.current = None;
        let session = self.login(browser, credentials).await?;
        self.current = Some(session.clone());
        Ok(session)
    }

    /// Probe the home page for the logged-out marker or the logout control.
    pub async fn detect(&self, browser: &mut dyn Browser) -> E2eResult<AuthState> {
        browser.goto(&self.base_url, self.timeouts.navigation()).await?;

        let markers = [Locator::text(LOGGED_OUT_MARKER), Locator::button("Logout")];
        let found = Expect::new(browser, &self.timeouts)
            .first_visible(&markers, self.timeouts.element())
            .await?;

        match found {
            Some(0) => Ok(AuthState::LoggedOut),
            Some(_) => Ok(AuthState::LoggedIn),
            None => Err(E2eError::AuthTimeout(format!(
                "neither '{}' nor a Logout button appeared within {:?}",
                LOGGED_OUT_MARKER,
                self.timeouts.element()
            ))),
        }
    }

    async fn logout(&mut self, browser: &mut dyn Browser) -> E2eResult<()> {
        info!("Logging out existing session");
        browser
            .click(&Locator::button("Logout"), self.timeouts.element())
            .await?;
        Expect::new(browser, &self.timeouts)
            .url_within(&format!("**{}", LOGIN_PATH), self.timeouts.login())
            .await
            .map_err(|e| E2eError::AuthTimeout(format!("logout did not settle: {}", e)))?;
        self.current = None;
        Ok(())
    }

    async fn login(
        &self,
        browser: &mut dyn Browser,
        credentials: &Credentials,
    ) -> E2eResult<Session> {
        info!("Logging in as {}", credentials.email());
        let element = self.timeouts.element();

        browser
            .goto(&format!("{}{}", self.base_url, LOGIN_PATH), self.timeouts.navigation())
            .await?;
        Expect::new(browser, &self.timeouts)
            .title(&regex::escape(LOGIN_TITLE))
            .await?;

        browser
            .fill(&Locator::label("Email"), credentials.email(), element)
            .await?;
        browser
            .fill(&Locator::label("Password"), credentials.password(), element)
            .await?;
        browser
            .click(&Locator::role_exact(Role::Button, "Login"), element)
            .await?;

        Expect::new(browser, &self.timeouts)
            .url_within(&self.base_url, self.timeouts.login())
            .await
            .map_err(|e| E2eError::AuthTimeout(format!("login did not settle: {}", e)))?;

        let cookies = browser.cookies().await?;
        Ok(Session {
            email: credentials.email().to_string(),
            cookies,
        })
    }
}

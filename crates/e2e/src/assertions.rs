//! Bounded-wait assertions over a [`Browser`]
//!
//! Every check polls until its condition holds or its budget runs out. A
//! missed condition is an `AssertionFailed` error carrying the last observed
//! value; browser errors during a poll propagate unchanged.

use std::time::Duration;

use regex::Regex;
use tokio::time::Instant;

use crate::browser::{Browser, Locator};
use crate::config::Timeouts;
use crate::error::{E2eError, E2eResult};

/// Outcome of a negative-capable probe
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Presence {
    Found,
    NotFound,
}

impl Presence {
    pub fn is_found(&self) -> bool {
        matches!(self, Presence::Found)
    }
}

/// Upper bound on a polling loop
#[derive(Debug, Clone, Copy)]
pub struct Deadline {
    end: Instant,
    poll: Duration,
}

impl Deadline {
    pub fn after(budget: Duration, poll: Duration) -> Self {
        Self {
            end: Instant::now() + budget,
            poll,
        }
    }

    pub fn expired(&self) -> bool {
        Instant::now() >= self.end
    }

    /// Sleep one poll interval, clamped to the deadline. Returns false once
    /// the deadline has passed, so callers can do a final check and stop.
    pub async fn tick(&self) -> bool {
        let now = Instant::now();
        if now >= self.end {
            return false;
        }
        tokio::time::sleep(self.poll.min(self.end - now)).await;
        true
    }
}

/// Playwright-style URL glob: `**` spans path separators, `*` does not.
#[derive(Debug, Clone)]
pub struct UrlPattern {
    raw: String,
    regex: Regex,
}

impl UrlPattern {
    pub fn glob(pattern: &str) -> E2eResult<Self> {
        let mut expr = String::from("^");
        let mut chars = pattern.chars().peekable();
        while let Some(c) = chars.next() {
            match c {
                '*' if chars.peek() == Some(&'*') => {
                    chars.next();
                    expr.push_str(".*");
                }
                '*' => expr.push_str("[^/]*"),
                other => expr.push_str(&regex::escape(&other.to_string())),
            }
        }
        expr.push('$');

        let regex = Regex::new(&expr)
            .map_err(|e| E2eError::Configuration(format!("bad URL pattern '{}': {}", pattern, e)))?;
        Ok(Self {
            raw: pattern.to_string(),
            regex,
        })
    }

    /// Match the full URL. A single trailing slash on the URL is ignored.
    pub fn matches(&self, url: &str) -> bool {
        self.regex.is_match(url)
            || url
                .strip_suffix('/')
                .map(|trimmed| self.regex.is_match(trimmed))
                .unwrap_or(false)
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }
}

/// Assertion helper bound to one page
pub struct Expect<'a> {
    browser: &'a mut dyn Browser,
    timeouts: &'a Timeouts,
}

impl<'a> Expect<'a> {
    pub fn new(browser: &'a mut dyn Browser, timeouts: &'a Timeouts) -> Self {
        Self { browser, timeouts }
    }

    fn deadline(&self, budget: Duration) -> Deadline {
        Deadline::after(budget, self.timeouts.poll_interval())
    }

    pub async fn visible(&mut self, locator: &Locator) -> E2eResult<()> {
        self.visible_within(locator, self.timeouts.element()).await
    }

    pub async fn visible_within(&mut self, locator: &Locator, budget: Duration) -> E2eResult<()> {
        match self.probe(locator, budget).await? {
            Presence::Found => Ok(()),
            Presence::NotFound => Err(E2eError::AssertionFailed(format!(
                "{} not visible within {:?}",
                locator, budget
            ))),
        }
    }

    /// Wait for the element to be absent or hidden.
    pub async fn hidden(&mut self, locator: &Locator) -> E2eResult<()> {
        let budget = self.timeouts.element();
        let deadline = self.deadline(budget);
        loop {
            if !self.browser.is_visible(locator).await? {
                return Ok(());
            }
            if !deadline.tick().await {
                return Err(E2eError::AssertionFailed(format!(
                    "{} still visible after {:?}",
                    locator, budget
                )));
            }
        }
    }

    /// Poll for visibility without failing; absence is an ordinary outcome.
    pub async fn probe(&mut self, locator: &Locator, budget: Duration) -> E2eResult<Presence> {
        let deadline = self.deadline(budget);
        loop {
            if self.browser.is_visible(locator).await? {
                return Ok(Presence::Found);
            }
            if !deadline.tick().await {
                return Ok(Presence::NotFound);
            }
        }
    }

    /// Index of the first of `locators` to become visible, if any does in time.
    pub async fn first_visible(
        &mut self,
        locators: &[Locator],
        budget: Duration,
    ) -> E2eResult<Option<usize>> {
        let deadline = self.deadline(budget);
        loop {
            for (i, locator) in locators.iter().enumerate() {
                if self.browser.is_visible(locator).await? {
                    return Ok(Some(i));
                }
            }
            if !deadline.tick().await {
                return Ok(None);
            }
        }
    }

    /// Wait for the page URL to match a glob; returns the matching URL.
    pub async fn url(&mut self, pattern: &str) -> E2eResult<String> {
        self.url_within(pattern, self.timeouts.navigation()).await
    }

    pub async fn url_within(&mut self, pattern: &str, budget: Duration) -> E2eResult<String> {
        let pattern = UrlPattern::glob(pattern)?;
        let deadline = self.deadline(budget);
        loop {
            let current = self.browser.current_url().await?;
            if pattern.matches(&current) {
                return Ok(current);
            }
            if !deadline.tick().await {
                return Err(E2eError::AssertionFailed(format!(
                    "URL did not match '{}' within {:?}; last seen '{}'",
                    pattern.as_str(),
                    budget,
                    current
                )));
            }
        }
    }

    /// Wait for the element's trimmed text to equal `expected`.
    pub async fn text(&mut self, locator: &Locator, expected: &str) -> E2eResult<()> {
        let budget = self.timeouts.element();
        let deadline = self.deadline(budget);
        loop {
            let seen = self.browser.text_of(locator).await?;
            if seen.as_deref().map(str::trim) == Some(expected) {
                return Ok(());
            }
            if !deadline.tick().await {
                return Err(E2eError::AssertionFailed(format!(
                    "{} text was {:?}, expected '{}'",
                    locator, seen, expected
                )));
            }
        }
    }

    pub async fn field_value(&mut self, locator: &Locator, expected: &str) -> E2eResult<()> {
        let budget = self.timeouts.element();
        let deadline = self.deadline(budget);
        loop {
            let seen = self.browser.input_value(locator).await?;
            if seen.as_deref() == Some(expected) {
                return Ok(());
            }
            if !deadline.tick().await {
                return Err(E2eError::AssertionFailed(format!(
                    "{} value was {:?}, expected '{}'",
                    locator, seen, expected
                )));
            }
        }
    }

    /// Wait for the document title to match a regular expression.
    pub async fn title(&mut self, pattern: &str) -> E2eResult<()> {
        let regex = Regex::new(pattern).map_err(|e| {
            E2eError::Configuration(format!("bad title pattern '{}': {}", pattern, e))
        })?;
        let budget = self.timeouts.element();
        let deadline = self.deadline(budget);
        loop {
            let title = self.browser.title().await?;
            if regex.is_match(&title) {
                return Ok(());
            }
            if !deadline.tick().await {
                return Err(E2eError::AssertionFailed(format!(
                    "title '{}' does not match /{}/",
                    title, pattern
                )));
            }
        }
    }
}

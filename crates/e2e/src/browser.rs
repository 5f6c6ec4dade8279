//! Browser seam
//!
//! The harness talks to the page only through [`Browser`]. Queries are
//! instantaneous snapshots; every bounded wait is polled by the caller (see
//! [`crate::assertions`]), so the wait policy is the same whatever drives the
//! page. Actions take an explicit actionability budget.

use std::fmt;
use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::E2eResult;

/// ARIA roles the console's controls are located by
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Button,
    Link,
    Heading,
    Tab,
    Checkbox,
    Textbox,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Button => "button",
            Role::Link => "link",
            Role::Heading => "heading",
            Role::Tab => "tab",
            Role::Checkbox => "checkbox",
            Role::Textbox => "textbox",
        }
    }
}

/// How to find an element. Prefer labels and roles; CSS is for the few
/// controls the console renders without an accessible name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "by", rename_all = "snake_case")]
pub enum Locator {
    Label { text: String },
    Role { role: Role, name: String, exact: bool },
    Text { text: String, exact: bool },
    Css { selector: String },
}

impl Locator {
    pub fn label(text: impl Into<String>) -> Self {
        Locator::Label { text: text.into() }
    }

    pub fn role(role: Role, name: impl Into<String>) -> Self {
        Locator::Role {
            role,
            name: name.into(),
            exact: false,
        }
    }

    pub fn role_exact(role: Role, name: impl Into<String>) -> Self {
        Locator::Role {
            role,
            name: name.into(),
            exact: true,
        }
    }

    pub fn button(name: impl Into<String>) -> Self {
        Self::role(Role::Button, name)
    }

    pub fn link(name: impl Into<String>) -> Self {
        Self::role(Role::Link, name)
    }

    pub fn heading(name: impl Into<String>) -> Self {
        Self::role(Role::Heading, name)
    }

    pub fn tab(name: impl Into<String>) -> Self {
        Self::role(Role::Tab, name)
    }

    /// Substring match on rendered text
    pub fn text(text: impl Into<String>) -> Self {
        Locator::Text {
            text: text.into(),
            exact: false,
        }
    }

    /// Whole-text match on rendered text
    pub fn text_exact(text: impl Into<String>) -> Self {
        Locator::Text {
            text: text.into(),
            exact: true,
        }
    }

    pub fn css(selector: impl Into<String>) -> Self {
        Locator::Css {
            selector: selector.into(),
        }
    }
}

impl fmt::Display for Locator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Locator::Label { text } => write!(f, "label '{}'", text),
            Locator::Role { role, name, exact } => {
                write!(f, "{} '{}'{}", role.as_str(), name, if *exact { " (exact)" } else { "" })
            }
            Locator::Text { text, exact } => {
                write!(f, "text '{}'{}", text, if *exact { " (exact)" } else { "" })
            }
            Locator::Css { selector } => write!(f, "css '{}'", selector),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cookie {
    pub name: String,
    pub value: String,
    #[serde(default)]
    pub domain: String,
    #[serde(default)]
    pub path: String,
}

/// One browser page driven by a scenario
#[async_trait]
pub trait Browser: Send {
    /// Navigate and wait for the load event, bounded by `timeout`.
    async fn goto(&mut self, url: &str, timeout: Duration) -> E2eResult<()>;

    async fn current_url(&mut self) -> E2eResult<String>;

    async fn title(&mut self) -> E2eResult<String>;

    /// Whether the first match is currently visible.
    async fn is_visible(&mut self, locator: &Locator) -> E2eResult<bool>;

    /// Text content of the first match, if any.
    async fn text_of(&mut self, locator: &Locator) -> E2eResult<Option<String>>;

    /// Current value of the first matching form control, if any.
    async fn input_value(&mut self, locator: &Locator) -> E2eResult<Option<String>>;

    async fn fill(&mut self, locator: &Locator, value: &str, timeout: Duration) -> E2eResult<()>;

    async fn check(&mut self, locator: &Locator, timeout: Duration) -> E2eResult<()>;

    async fn click(&mut self, locator: &Locator, timeout: Duration) -> E2eResult<()>;

    /// Accept the next confirm/alert dialog instead of dismissing it.
    async fn accept_next_dialog(&mut self) -> E2eResult<()>;

    async fn screenshot(&mut self, path: &Path) -> E2eResult<()>;

    async fn cookies(&mut self) -> E2eResult<Vec<Cookie>>;

    /// Release the underlying browser.
    async fn close(&mut self) -> E2eResult<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_locator_wire_format() {
        let json = serde_json::to_value(Locator::role_exact(Role::Button, "Login")).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"by": "role", "role": "button", "name": "Login", "exact": true})
        );
        let json = serde_json::to_value(Locator::label("Project ID")).unwrap();
        assert_eq!(json, serde_json::json!({"by": "label", "text": "Project ID"}));
    }

    #[test]
    fn test_locator_display() {
        assert_eq!(Locator::link("Add Site").to_string(), "link 'Add Site'");
        assert_eq!(Locator::text_exact("X").to_string(), "text 'X' (exact)");
    }
}

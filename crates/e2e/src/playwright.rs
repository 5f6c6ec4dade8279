//! Playwright browser automation
//!
//! A single Node.js process runs an embedded bridge script that owns one
//! browser context and page. Commands go over stdin as JSON lines and each
//! reply comes back on stdout tagged with the command id, so page state
//! (cookies, current URL, open dialogs) persists across the whole scenario.

use std::path::Path;
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tempfile::TempDir;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tracing::{debug, info, warn};

use crate::browser::{Browser, Cookie, Locator};
use crate::config::BrowserConfig;
use crate::error::{E2eError, E2eResult};

/// Budget for commands that only read page state
const QUERY_BUDGET: Duration = Duration::from_secs(5);

/// Slack on top of a command's own timeout before the bridge is presumed stuck
const BRIDGE_GRACE: Duration = Duration::from_secs(5);

const BRIDGE_SCRIPT: &str = r#"
const readline = require('readline');
const playwright = require('playwright');

const config = JSON.parse(process.env.LOCHNESS_E2E_BRIDGE_CONFIG || '{}');

function reply(message) {
  process.stdout.write(JSON.stringify(message) + '\n');
}

function describe(error) {
  return String((error && error.message) || error);
}

function locate(page, loc) {
  switch (loc.by) {
    case 'label': return page.getByLabel(loc.text);
    case 'role': return page.getByRole(loc.role, { name: loc.name, exact: !!loc.exact });
    case 'text': return page.getByText(loc.text, { exact: !!loc.exact });
    case 'css': return page.locator(loc.selector);
    default: throw new Error('unknown locator ' + JSON.stringify(loc));
  }
}

async function main() {
  const browser = await playwright[config.browser].launch({ headless: config.headless });
  const context = await browser.newContext({
    viewport: { width: config.viewport_width, height: config.viewport_height },
  });
  const page = await context.newPage();

  let acceptNextDialog = false;
  page.on('dialog', (dialog) => {
    const accept = acceptNextDialog;
    acceptNextDialog = false;
    (accept ? dialog.accept() : dialog.dismiss()).catch(() => {});
  });

  const ops = {
    goto: (c) => page.goto(c.url, { timeout: c.timeout_ms }).then(() => null),
    url: async () => page.url(),
    title: () => page.title(),
    visible: (c) => locate(page, c.locator).first().isVisible(),
    text: async (c) => {
      const el = locate(page, c.locator).first();
      return (await el.count()) > 0 ? el.textContent({ timeout: 1000 }) : null;
    },
    input_value: async (c) => {
      const el = locate(page, c.locator).first();
      return (await el.count()) > 0 ? el.inputValue({ timeout: 1000 }) : null;
    },
    fill: (c) => locate(page, c.locator).fill(c.value, { timeout: c.timeout_ms }).then(() => null),
    check: (c) => locate(page, c.locator).check({ timeout: c.timeout_ms }).then(() => null),
    click: (c) => locate(page, c.locator).click({ timeout: c.timeout_ms }).then(() => null),
    accept_dialog: async () => { acceptNextDialog = true; return null; },
    screenshot: (c) => page.screenshot({ path: c.path, fullPage: true }).then(() => null),
    cookies: () => context.cookies(),
  };

  reply({ id: 0, ok: true, value: 'ready' });

  const lines = readline.createInterface({ input: process.stdin, crlfDelay: Infinity });
  for await (const line of lines) {
    if (!line.trim()) continue;
    let command;
    try { command = JSON.parse(line); } catch (e) { continue; }
    if (command.op === 'close') {
      reply({ id: command.id, ok: true, value: null });
      break;
    }
    try {
      const op = ops[command.op];
      if (!op) throw new Error('unknown op ' + command.op);
      const value = await op(command);
      reply({ id: command.id, ok: true, value: value === undefined ? null : value });
    } catch (error) {
      reply({
        id: command.id,
        ok: false,
        error: describe(error),
        timeout: !!error && error.name === 'TimeoutError',
      });
    }
  }
  await browser.close();
}

main().catch((error) => {
  reply({ id: 0, ok: false, error: describe(error), timeout: false });
  process.exit(1);
});
"#;

#[derive(Debug, Serialize)]
#[serde(tag = "op", rename_all = "snake_case")]
enum BridgeCommand<'a> {
    Goto { url: &'a str, timeout_ms: u64 },
    Url,
    Title,
    Visible { locator: &'a Locator },
    Text { locator: &'a Locator },
    InputValue { locator: &'a Locator },
    Fill { locator: &'a Locator, value: &'a str, timeout_ms: u64 },
    Check { locator: &'a Locator, timeout_ms: u64 },
    Click { locator: &'a Locator, timeout_ms: u64 },
    AcceptDialog,
    Screenshot { path: String },
    Cookies,
    Close,
}

impl BridgeCommand<'_> {
    fn describe(&self) -> String {
        match self {
            BridgeCommand::Goto { url, .. } => format!("navigate:{}", url),
            BridgeCommand::Url => "url".to_string(),
            BridgeCommand::Title => "title".to_string(),
            BridgeCommand::Visible { locator } => format!("visible:{}", locator),
            BridgeCommand::Text { locator } => format!("text:{}", locator),
            BridgeCommand::InputValue { locator } => format!("value:{}", locator),
            BridgeCommand::Fill { locator, .. } => format!("fill:{}", locator),
            BridgeCommand::Check { locator, .. } => format!("check:{}", locator),
            BridgeCommand::Click { locator, .. } => format!("click:{}", locator),
            BridgeCommand::AcceptDialog => "accept-dialog".to_string(),
            BridgeCommand::Screenshot { path } => format!("screenshot:{}", path),
            BridgeCommand::Cookies => "cookies".to_string(),
            BridgeCommand::Close => "close".to_string(),
        }
    }
}

#[derive(Debug, Serialize)]
struct Envelope<'a> {
    id: u64,
    #[serde(flatten)]
    command: &'a BridgeCommand<'a>,
}

#[derive(Debug, Deserialize)]
struct BridgeReply {
    id: u64,
    ok: bool,
    #[serde(default)]
    value: serde_json::Value,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    timeout: bool,
}

#[derive(Debug, Serialize)]
struct BridgeLaunch<'a> {
    browser: &'a str,
    headless: bool,
    viewport_width: u32,
    viewport_height: u32,
}

/// Playwright browser handle
pub struct PlaywrightHandle {
    child: Child,
    stdin: ChildStdin,
    stdout: Lines<BufReader<ChildStdout>>,
    next_id: u64,
    closed: bool,

    /// Keeps the staged bridge script alive for the life of the process
    _script_dir: TempDir,
}

impl PlaywrightHandle {
    /// Launch a browser behind a fresh bridge process.
    pub async fn launch(config: &BrowserConfig, launch_timeout: Duration) -> E2eResult<Self> {
        let node_modules = config.node_project_dir.join("node_modules");
        Self::check_playwright_installed(&node_modules).await?;

        let script_dir = tempfile::tempdir()?;
        let script_path = script_dir.path().join("bridge.js");
        std::fs::write(&script_path, BRIDGE_SCRIPT)?;

        let launch = serde_json::to_string(&BridgeLaunch {
            browser: config.kind.as_str(),
            headless: config.headless,
            viewport_width: config.viewport_width,
            viewport_height: config.viewport_height,
        })?;

        info!("Launching {} via Playwright bridge", config.kind.as_str());

        let mut child = Command::new("node")
            .arg(&script_path)
            .current_dir(&config.node_project_dir)
            .env("NODE_PATH", &node_modules)
            .env("LOCHNESS_E2E_BRIDGE_CONFIG", launch)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| E2eError::Playwright(format!("Failed to spawn node: {}", e)))?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| E2eError::Playwright("bridge stdin unavailable".into()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| E2eError::Playwright("bridge stdout unavailable".into()))?;

        let mut handle = Self {
            child,
            stdin,
            stdout: BufReader::new(stdout).lines(),
            next_id: 0,
            closed: false,
            _script_dir: script_dir,
        };

        handle.await_reply(0, "launch", launch_timeout).await?;
        debug!("Playwright bridge ready");
        Ok(handle)
    }

    /// Check that node can resolve the playwright package
    async fn check_playwright_installed(node_modules: &Path) -> E2eResult<()> {
        let status = Command::new("node")
            .args(["-e", "require.resolve('playwright')"])
            .env("NODE_PATH", node_modules)
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await;

        match status {
            Ok(status) if status.success() => Ok(()),
            _ => Err(E2eError::PlaywrightNotFound),
        }
    }

    async fn send(
        &mut self,
        command: BridgeCommand<'_>,
        budget: Duration,
    ) -> E2eResult<serde_json::Value> {
        if self.closed {
            return Err(E2eError::Playwright("bridge already closed".into()));
        }

        self.next_id += 1;
        let id = self.next_id;
        let step = command.describe();

        let envelope = Envelope {
            id,
            command: &command,
        };
        let mut line = serde_json::to_string(&envelope)?;
        line.push('\n');
        self.stdin.write_all(line.as_bytes()).await?;
        self.stdin.flush().await?;

        self.await_reply(id, &step, budget + BRIDGE_GRACE).await
    }

    async fn await_reply(
        &mut self,
        id: u64,
        step: &str,
        budget: Duration,
    ) -> E2eResult<serde_json::Value> {
        let read = async {
            loop {
                let Some(line) = self.stdout.next_line().await? else {
                    return Err(E2eError::Playwright(format!(
                        "bridge exited while waiting for {}",
                        step
                    )));
                };
                match serde_json::from_str::<BridgeReply>(&line) {
                    Ok(reply) if reply.id == id => return Ok(reply),
                    Ok(reply) => debug!("Discarding stale bridge reply {}", reply.id),
                    Err(_) => debug!("[bridge] {}", line),
                }
            }
        };

        let reply = tokio::time::timeout(budget, read)
            .await
            .map_err(|_| E2eError::Timeout(format!("{} (bridge unresponsive)", step)))??;

        if reply.ok {
            return Ok(reply.value);
        }

        let message = reply.error.unwrap_or_else(|| "unknown bridge error".to_string());
        if reply.timeout {
            Err(E2eError::Timeout(format!("{}: {}", step, message)))
        } else {
            Err(E2eError::Playwright(format!("{}: {}", step, message)))
        }
    }

    fn budget_ms(timeout: Duration) -> u64 {
        timeout.as_millis() as u64
    }
}

fn optional_string(value: serde_json::Value) -> Option<String> {
    match value {
        serde_json::Value::String(s) => Some(s),
        _ => None,
    }
}

#[async_trait]
impl Browser for PlaywrightHandle {
    async fn goto(&mut self, url: &str, timeout: Duration) -> E2eResult<()> {
        let timeout_ms = Self::budget_ms(timeout);
        self.send(BridgeCommand::Goto { url, timeout_ms }, timeout).await?;
        Ok(())
    }

    async fn current_url(&mut self) -> E2eResult<String> {
        let value = self.send(BridgeCommand::Url, QUERY_BUDGET).await?;
        Ok(optional_string(value).unwrap_or_default())
    }

    async fn title(&mut self) -> E2eResult<String> {
        let value = self.send(BridgeCommand::Title, QUERY_BUDGET).await?;
        Ok(optional_string(value).unwrap_or_default())
    }

    async fn is_visible(&mut self, locator: &Locator) -> E2eResult<bool> {
        let value = self.send(BridgeCommand::Visible { locator }, QUERY_BUDGET).await?;
        Ok(value.as_bool().unwrap_or(false))
    }

    async fn text_of(&mut self, locator: &Locator) -> E2eResult<Option<String>> {
        let value = self.send(BridgeCommand::Text { locator }, QUERY_BUDGET).await?;
        Ok(optional_string(value))
    }

    async fn input_value(&mut self, locator: &Locator) -> E2eResult<Option<String>> {
        let value = self.send(BridgeCommand::InputValue { locator }, QUERY_BUDGET).await?;
        Ok(optional_string(value))
    }

    async fn fill(&mut self, locator: &Locator, value: &str, timeout: Duration) -> E2eResult<()> {
        let timeout_ms = Self::budget_ms(timeout);
        let command = BridgeCommand::Fill {
            locator,
            value,
            timeout_ms,
        };
        self.send(command, timeout).await?;
        Ok(())
    }

    async fn check(&mut self, locator: &Locator, timeout: Duration) -> E2eResult<()> {
        let timeout_ms = Self::budget_ms(timeout);
        let command = BridgeCommand::Check {
            locator,
            timeout_ms,
        };
        self.send(command, timeout).await?;
        Ok(())
    }

    async fn click(&mut self, locator: &Locator, timeout: Duration) -> E2eResult<()> {
        let timeout_ms = Self::budget_ms(timeout);
        let command = BridgeCommand::Click {
            locator,
            timeout_ms,
        };
        self.send(command, timeout).await?;
        Ok(())
    }

    async fn accept_next_dialog(&mut self) -> E2eResult<()> {
        self.send(BridgeCommand::AcceptDialog, QUERY_BUDGET).await?;
        Ok(())
    }

    async fn screenshot(&mut self, path: &Path) -> E2eResult<()> {
        let path = path.to_string_lossy().to_string();
        self.send(BridgeCommand::Screenshot { path }, QUERY_BUDGET * 3).await?;
        Ok(())
    }

    async fn cookies(&mut self) -> E2eResult<Vec<Cookie>> {
        let value = self.send(BridgeCommand::Cookies, QUERY_BUDGET).await?;
        Ok(serde_json::from_value(value)?)
    }

    async fn close(&mut self) -> E2eResult<()> {
        if self.closed {
            return Ok(());
        }
        if let Err(e) = self.send(BridgeCommand::Close, QUERY_BUDGET).await {
            warn!("Bridge did not close cleanly: {}", e);
        }
        self.closed = true;

        match tokio::time::timeout(QUERY_BUDGET, self.child.wait()).await {
            Ok(_) => {}
            Err(_) => {
                warn!("Bridge still running after close, killing it");
                let _ = self.child.kill().await;
            }
        }
        Ok(())
    }
}

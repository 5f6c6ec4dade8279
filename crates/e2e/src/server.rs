//! WebUI readiness - waiting for a running console or launching one

use std::process::{Child, Command, Stdio};
use std::time::Duration;
use tokio::time::sleep;
use tracing::{info, warn};

use crate::config::AppConfig;
use crate::error::{E2eError, E2eResult};

/// Handle to the WebUI under test
pub struct AppServer {
    child: Option<Child>,
    base_url: String,
}

impl AppServer {
    /// Wait for an already running WebUI to answer.
    pub async fn connect(base_url: &str, timeout: Duration) -> E2eResult<Self> {
        let server = AppServer {
            child: None,
            base_url: base_url.trim_end_matches('/').to_string(),
        };
        server.wait_for_ready(timeout).await?;
        info!("WebUI is reachable at {}", server.base_url);
        Ok(server)
    }

    /// Launch the WebUI from its checkout and wait for it to answer.
    pub async fn spawn(app: &AppConfig, base_url: &str) -> E2eResult<Self> {
        info!("Launching WebUI: {} {}", app.program, app.args.join(" "));

        let mut cmd = Command::new(&app.program);
        cmd.args(&app.args)
            .current_dir(&app.working_dir)
            .stdout(Stdio::null())
            .stderr(Stdio::inherit());

        let child = cmd.spawn().map_err(|e| {
            E2eError::ServerStartup(format!(
                "Failed to spawn {} in {}: {}",
                app.program,
                app.working_dir.display(),
                e
            ))
        })?;

        let server = AppServer {
            child: Some(child),
            base_url: base_url.trim_end_matches('/').to_string(),
        };

        // Dropping `server` on failure stops the child
        server
            .wait_for_ready(Duration::from_millis(app.startup_timeout_ms))
            .await?;

        info!("WebUI is up at {}", server.base_url);
        Ok(server)
    }

    /// Poll the home page until it answers with anything but a server error
    async fn wait_for_ready(&self, timeout_duration: Duration) -> E2eResult<()> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(2))
            .build()?;

        let start = std::time::Instant::now();
        let mut attempts = 0;

        while start.elapsed() < timeout_duration {
            attempts += 1;

            match client.get(&self.base_url).send().await {
                Ok(resp) if !resp.status().is_server_error() => {
                    return Ok(());
                }
                Ok(resp) => {
                    warn!("WebUI returned {}", resp.status());
                }
                Err(e) => {
                    if attempts == 1 {
                        info!("Waiting for WebUI at {}...", self.base_url);
                    }
                    // Connection refused is expected while the app is starting
                    if !e.is_connect() {
                        warn!("Readiness check error: {}", e);
                    }
                }
            }

            sleep(Duration::from_millis(250)).await;
        }

        Err(E2eError::ServerHealthCheck(attempts))
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Stop the WebUI if it was launched here
    pub fn stop(&mut self) -> E2eResult<()> {
        let Some(mut child) = self.child.take() else {
            return Ok(());
        };
        info!("Stopping WebUI (pid: {})", child.id());

        #[cfg(unix)]
        {
            use nix::sys::signal::{kill, Signal};
            use nix::unistd::Pid;

            let pid = Pid::from_raw(child.id() as i32);
            if kill(pid, Signal::SIGTERM).is_ok() {
                std::thread::sleep(Duration::from_millis(500));
            }
        }

        let _ = child.kill();
        let _ = child.wait();

        Ok(())
    }
}

impl Drop for AppServer {
    fn drop(&mut self) {
        let _ = self.stop();
    }
}

use anyhow::{anyhow, Context, Result};
use chatbuilder_integrations::handshake::{AuthWindow, PopupFeatures, PopupOpener};
use chatbuilder_integrations::WindowId;
use std::process::Stdio;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tokio::process::Command;
use tracing::{debug, info, warn};
use url::Url;

/// Opens authorization pages in the system browser.
///
/// A terminal cannot see whether a browser tab is still open, so a window
/// counts as closed once the operator says so (see [`BrowserOpener::mark_closed`])
/// or when the browser could not be launched.
#[derive(Clone, Default)]
pub struct BrowserOpener {
    command: Option<String>,
    current: Arc<Mutex<Option<Arc<AtomicBool>>>>,
    next_id: Arc<AtomicU64>,
}

struct BrowserWindow {
    id: WindowId,
    closed: Arc<AtomicBool>,
}

impl AuthWindow for BrowserWindow {
    fn id(&self) -> WindowId {
        self.id
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    fn close(&mut self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}

impl BrowserOpener {
    pub fn new(command: &str) -> Self {
        let command = command.trim();
        Self {
            command: (!command.is_empty()).then(|| command.to_string()),
            ..Self::default()
        }
    }

    /// Marks the current authorization window as closed by the user.
    pub fn mark_closed(&self) -> bool {
        let current = self.current.lock().ok().and_then(|c| c.clone());
        match current {
            Some(flag) => !flag.swap(true, Ordering::SeqCst),
            None => false,
        }
    }

    pub fn has_open_window(&self) -> bool {
        self.current
            .lock()
            .ok()
            .and_then(|c| c.as_ref().map(|f| !f.load(Ordering::SeqCst)))
            .unwrap_or(false)
    }

    /// Opens a page that is not part of a handshake.
    pub fn open_page(&self, url: &str) -> Result<()> {
        self.launch(url).map(|_| ())
    }

    fn launch(&self, url: &str) -> Result<tokio::process::Child> {
        let mut command = match self.command {
            Some(ref program) => {
                let mut parts = program.split_whitespace();
                let bin = parts.next().ok_or_else(|| anyhow!("empty browser command"))?;
                let mut command = Command::new(bin);
                command.args(parts);
                command
            }
            None => platform_command(),
        };
        command
            .arg(url)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(false)
            .spawn()
            .context("launching browser")
    }
}

#[cfg(target_os = "macos")]
fn platform_command() -> Command {
    Command::new("open")
}

#[cfg(target_os = "windows")]
fn platform_command() -> Command {
    let mut command = Command::new("cmd");
    command.args(["/C", "start", ""]);
    command
}

#[cfg(not(any(target_os = "macos", target_os = "windows")))]
fn platform_command() -> Command {
    Command::new("xdg-open")
}

impl PopupOpener for BrowserOpener {
    fn open(&self, url: &Url, features: &PopupFeatures) -> Result<Box<dyn AuthWindow>> {
        let id = WindowId(self.next_id.fetch_add(1, Ordering::SeqCst) + 1);
        debug!("Opening {:?} with {}", id, features.to_feature_string());

        let closed = Arc::new(AtomicBool::new(false));
        let mut child = self.launch(url.as_str())?;
        info!("Authorization page opened in browser");

        // Launchers like xdg-open exit straight away; only a failed exit
        // means the page never opened.
        let launch_failed = closed.clone();
        tokio::spawn(async move {
            match child.wait().await {
                Ok(status) if !status.success() => {
                    warn!("Browser launcher exited with {}", status);
                    launch_failed.store(true, Ordering::SeqCst);
                }
                Ok(_) => {}
                Err(e) => warn!("Could not wait on browser launcher: {}", e),
            }
        });

        if let Ok(mut current) = self.current.lock() {
            if let Some(previous) = current.replace(closed.clone()) {
                previous.store(true, Ordering::SeqCst);
            }
        }

        Ok(Box::new(BrowserWindow { id, closed }))
    }
}

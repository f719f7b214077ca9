use crate::ui::theme::ThemeName;
use anyhow::{Context, Result};
use chatbuilder_integrations::Provider;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use url::Url;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub backend: BackendConfig,
    pub integration: IntegrationConfig,
    pub popup: PopupConfig,
    pub callback: CallbackConfig,
    pub ui: UiConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BackendConfig {
    pub base_url: String,
    pub session_token: String,
    pub timeout_seconds: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IntegrationConfig {
    pub provider: Provider,
    pub application_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PopupConfig {
    pub width: u32,
    pub height: u32,
    pub screen_width: u32,
    pub screen_height: u32,
    pub poll_interval_ms: u64,
    /// Extra origins trusted to post the completion message.
    pub allowed_origins: Vec<String>,
    /// Empty means the platform default (`xdg-open`, `open`, `start`).
    pub browser_command: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CallbackConfig {
    pub port: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct UiConfig {
    pub theme: ThemeName,
    pub toast_seconds: u64,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:3000".to_string(),
            session_token: String::new(),
            timeout_seconds: 20,
        }
    }
}

impl Default for IntegrationConfig {
    fn default() -> Self {
        Self {
            provider: Provider::slack(),
            application_id: String::new(),
        }
    }
}

impl Default for PopupConfig {
    fn default() -> Self {
        Self {
            width: 600,
            height: 700,
            screen_width: 1440,
            screen_height: 900,
            poll_interval_ms: 500,
            allowed_origins: Vec::new(),
            browser_command: String::new(),
        }
    }
}

impl Default for CallbackConfig {
    fn default() -> Self {
        Self { port: 8765 }
    }
}

impl Default for UiConfig {
    fn default() -> Self {
        Self {
            theme: ThemeName::Dark,
            toast_seconds: 4,
        }
    }
}

impl Config {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?;
        let config: Config =
            toml::from_str(&content).with_context(|| format!("parsing {}", path.display()))?;
        Ok(config)
    }

    pub fn load_or_default(path: &Path) -> Self {
        if !path.exists() {
            return Self::default();
        }
        Self::load(path).unwrap_or_else(|e| {
            tracing::warn!("Ignoring config file: {:#}", e);
            Self::default()
        })
    }

    /// Environment variables win over the file.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(v) = lookup("CHATBUILDER_BASE_URL") {
            self.backend.base_url = v;
        }
        if let Some(v) = lookup("CHATBUILDER_SESSION_TOKEN") {
            self.backend.session_token = v;
        }
        if let Some(v) = lookup("CHATBUILDER_APPLICATION_ID") {
            self.integration.application_id = v;
        }
        if let Some(provider) = lookup("CHATBUILDER_PROVIDER").and_then(|v| v.parse().ok()) {
            self.integration.provider = provider;
        }
    }

    pub fn base_url(&self) -> Result<Url> {
        Url::parse(&self.backend.base_url)
            .with_context(|| format!("invalid backend.base_url {:?}", self.backend.base_url))
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.backend.timeout_seconds.max(1))
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.popup.poll_interval_ms.max(50))
    }

    pub fn extra_origins(&self) -> Vec<Url> {
        self.popup
            .allowed_origins
            .iter()
            .filter_map(|o| match Url::parse(o) {
                Ok(url) => Some(url),
                Err(e) => {
                    tracing::warn!("Skipping allowed origin {:?}: {}", o, e);
                    None
                }
            })
            .collect()
    }
}

use crate::error::CredentialsError;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::OnceLock;
use url::Url;

pub const OAUTH_COMPLETE: &str = "oauth-complete";

const SLACK_APP_CONSOLE: &str = "https://api.slack.com/apps";
const SLACK_BOT_SCOPES: &[&str] = &[
    "app_mentions:read",
    "channels:history",
    "channels:read",
    "chat:write",
    "groups:history",
    "im:history",
    "im:read",
    "im:write",
    "users:read",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum WizardStep {
    Loading,
    CreateApp,
    Credentials,
    Install,
    Connected,
}

impl WizardStep {
    pub fn as_str(&self) -> &'static str {
        match self {
            WizardStep::Loading => "loading",
            WizardStep::CreateApp => "create-app",
            WizardStep::Credentials => "credentials",
            WizardStep::Install => "install",
            WizardStep::Connected => "connected",
        }
    }

    pub fn title(&self) -> &'static str {
        match self {
            WizardStep::Loading => "Checking connection",
            WizardStep::CreateApp => "Create an app",
            WizardStep::Credentials => "App credentials",
            WizardStep::Install => "Install to workspace",
            WizardStep::Connected => "Connected",
        }
    }
}

impl fmt::Display for WizardStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CredentialField {
    ClientId,
    ClientSecret,
    SigningSecret,
}

impl CredentialField {
    pub const ALL: [CredentialField; 3] = [
        CredentialField::ClientId,
        CredentialField::ClientSecret,
        CredentialField::SigningSecret,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            CredentialField::ClientId => "Client ID",
            CredentialField::ClientSecret => "Client Secret",
            CredentialField::SigningSecret => "Signing Secret",
        }
    }

    pub fn is_secret(&self) -> bool {
        !matches!(self, CredentialField::ClientId)
    }

    pub fn next(&self) -> Self {
        match self {
            CredentialField::ClientId => CredentialField::ClientSecret,
            CredentialField::ClientSecret => CredentialField::SigningSecret,
            CredentialField::SigningSecret => CredentialField::ClientId,
        }
    }

    pub fn previous(&self) -> Self {
        match self {
            CredentialField::ClientId => CredentialField::SigningSecret,
            CredentialField::ClientSecret => CredentialField::ClientId,
            CredentialField::SigningSecret => CredentialField::ClientSecret,
        }
    }
}

#[derive(Clone, Default, PartialEq, Eq)]
pub struct CredentialsForm {
    pub client_id: String,
    pub client_secret: String,
    pub signing_secret: String,
}

// Secrets stay out of logs and panics.
impl fmt::Debug for CredentialsForm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialsForm")
            .field("client_id", &self.client_id)
            .field("client_secret", &"[REDACTED]")
            .field("signing_secret", &"[REDACTED]")
            .finish()
    }
}

impl CredentialsForm {
    pub fn field(&self, field: CredentialField) -> &str {
        match field {
            CredentialField::ClientId => &self.client_id,
            CredentialField::ClientSecret => &self.client_secret,
            CredentialField::SigningSecret => &self.signing_secret,
        }
    }

    pub fn field_mut(&mut self, field: CredentialField) -> &mut String {
        match field {
            CredentialField::ClientId => &mut self.client_id,
            CredentialField::ClientSecret => &mut self.client_secret,
            CredentialField::SigningSecret => &mut self.signing_secret,
        }
    }

    pub fn missing_fields(&self) -> Vec<CredentialField> {
        CredentialField::ALL
            .into_iter()
            .filter(|f| self.field(*f).trim().is_empty())
            .collect()
    }

    pub fn validate(&self) -> Result<(), CredentialsError> {
        let missing = self.missing_fields();
        if missing.is_empty() {
            Ok(())
        } else {
            Err(CredentialsError::MissingFields(missing))
        }
    }

    pub fn trimmed(&self) -> Self {
        Self {
            client_id: self.client_id.trim().to_string(),
            client_secret: self.client_secret.trim().to_string(),
            signing_secret: self.signing_secret.trim().to_string(),
        }
    }

    pub fn clear(&mut self) {
        self.client_id.clear();
        self.client_secret.clear();
        self.signing_secret.clear();
    }

    pub fn is_empty(&self) -> bool {
        CredentialField::ALL
            .iter()
            .all(|f| self.field(*f).is_empty())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionStatus {
    pub connected: bool,
    #[serde(default)]
    pub workspace_name: Option<String>,
    #[serde(default)]
    pub has_credentials: Option<bool>,
}

impl ConnectionStatus {
    /// Step the wizard resumes at for this status.
    pub fn resume_step(&self) -> WizardStep {
        if self.connected {
            WizardStep::Connected
        } else if self.has_credentials.unwrap_or(false) {
            WizardStep::Install
        } else {
            WizardStep::CreateApp
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SaveCredentialsRequest<'a> {
    pub application_id: &'a str,
    pub client_id: &'a str,
    pub client_secret: &'a str,
    pub signing_secret: &'a str,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OAuthUrlResponse {
    pub oauth_url: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OAuthHandshakeResult {
    pub success: bool,
    #[serde(default)]
    pub workspace_name: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
}

/// Payloads a popup may post back to its opener.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum WindowPayload {
    #[serde(rename = "oauth-complete")]
    OAuthComplete(OAuthHandshakeResult),
}

impl WindowPayload {
    pub fn parse(data: &serde_json::Value) -> Option<Self> {
        serde_json::from_value(data.clone()).ok()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct WindowId(pub u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AttemptId(pub u64);

impl fmt::Display for AttemptId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// A message delivered over the cross-window channel.
#[derive(Debug, Clone, PartialEq)]
pub struct WindowMessage {
    pub origin: String,
    pub source: Option<WindowId>,
    pub data: serde_json::Value,
}

impl WindowMessage {
    pub fn new(origin: impl Into<String>, data: serde_json::Value) -> Self {
        Self {
            origin: origin.into(),
            source: None,
            data,
        }
    }

    pub fn from_window(mut self, source: WindowId) -> Self {
        self.source = Some(source);
        self
    }
}

fn provider_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^[a-z0-9][a-z0-9-]*$").unwrap())
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Provider(String);

impl Provider {
    pub fn slack() -> Self {
        Self("slack".to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn display_name(&self) -> String {
        match self.0.as_str() {
            "slack" => "Slack".to_string(),
            other => {
                let mut chars = other.chars();
                match chars.next() {
                    Some(first) => first.to_uppercase().chain(chars).collect(),
                    None => String::new(),
                }
            }
        }
    }

    pub fn guide(&self, base_url: &Url) -> ProviderGuide {
        let redirect_url = base_url
            .join(&format!("api/integrations/{}/oauth-callback", self.0))
            .map(|u| u.to_string())
            .unwrap_or_default();
        match self.0.as_str() {
            "slack" => ProviderGuide {
                console_url: Some(SLACK_APP_CONSOLE.to_string()),
                redirect_url,
                scopes: SLACK_BOT_SCOPES.iter().map(|s| s.to_string()).collect(),
            },
            _ => ProviderGuide {
                console_url: None,
                redirect_url,
                scopes: Vec::new(),
            },
        }
    }
}

impl Default for Provider {
    fn default() -> Self {
        Self::slack()
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for Provider {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_lowercase();
        if provider_pattern().is_match(&normalized) {
            Ok(Self(normalized))
        } else {
            Err(format!("invalid provider name: {s:?}"))
        }
    }
}

impl TryFrom<String> for Provider {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Provider> for String {
    fn from(value: Provider) -> Self {
        value.0
    }
}

/// Setup hints for the app-creation step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderGuide {
    pub console_url: Option<String>,
    pub redirect_url: String,
    pub scopes: Vec<String>,
}

use crate::browser::BrowserOpener;
use crate::keybinds::Keybinds;
use crate::ui::layout::DialogLayout;
use crate::ui::theme;
use crate::Config;
use anyhow::Result;
use chatbuilder_integrations::handshake::PopupFeatures;
use chatbuilder_integrations::notify::ChannelSink;
use chatbuilder_integrations::{
    Authorizer, CredentialField, IntegrationApi, IntegrationWizard, MessageBus, Notification,
    NotificationLevel, OriginPolicy, ProviderGuide, WizardEvent, WizardStep,
};
use chrono::Utc;
use ratatui::crossterm::event::{Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use ratatui::layout::Rect;
use ratatui::Frame;
use std::collections::VecDeque;
use std::sync::Arc;
use tokio::sync::mpsc;
use url::Url;

mod actions;
mod effects;
mod input;
mod render;
mod state;
mod types;

pub use state::{App, SetupController};
pub use types::LoggedEvent;

const MAX_TOASTS: usize = 5;
const MAX_LOGGED_EVENTS: usize = 20;

impl App {
    pub(super) fn report_error(&mut self, context: &str, error: impl std::fmt::Display) {
        let message = format!("{context}: {}", self.redact_sensitive(&error.to_string()));
        self.last_error = Some(message.clone());
        tracing::warn!("{message}");
    }

    pub(super) fn clear_error(&mut self) {
        self.last_error = None;
    }

    fn redact_sensitive(&self, input: &str) -> String {
        let mut output = input.replace("Bearer ", "Bearer [REDACTED] ");
        let token = self.config.backend.session_token.trim();
        if !token.is_empty() {
            output = output.replace(token, "[REDACTED]");
        }
        let form = self.wizard.state().form();
        for secret in [&form.client_secret, &form.signing_secret] {
            let secret = secret.trim();
            if secret.len() >= 4 {
                output = output.replace(secret, "[REDACTED]");
            }
        }
        output
    }
}

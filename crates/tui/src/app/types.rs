use chatbuilder_integrations::WizardEvent;
use chrono::{DateTime, Utc};

/// An outward wizard event as the hosting page saw it.
#[derive(Debug, Clone)]
pub struct LoggedEvent {
    pub event: WizardEvent,
    pub at: DateTime<Utc>,
}

impl LoggedEvent {
    pub fn describe(&self) -> String {
        let what = match self.event {
            WizardEvent::Connected {
                workspace_name: Some(ref name),
            } => format!("connected ({name})"),
            WizardEvent::Connected {
                workspace_name: None,
            } => "connected".to_string(),
            WizardEvent::Disconnected => "disconnected".to_string(),
            WizardEvent::Close => "close".to_string(),
        };
        format!("{} {}", self.at.format("%H:%M:%S"), what)
    }
}

pub mod api;
pub mod controller;
pub mod error;
pub mod handshake;
pub mod notify;
pub mod types;
pub mod wizard;

pub use api::{IntegrationApi, IntegrationBackend};
pub use controller::IntegrationWizard;
pub use error::{ApiError, ApiResult, CredentialsError};
pub use handshake::{Authorizer, HandshakeHandle, HandshakeOutcome, MessageBus, OriginPolicy};
pub use notify::{Notification, NotificationLevel, NotificationSink};
pub use types::*;
pub use wizard::{Effect, SetupWizard, WizardEvent, WizardMsg};

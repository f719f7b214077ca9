use crate::error::ApiResult;
use crate::handshake::HandshakeOutcome;
use crate::notify::{Notification, NotificationSink};
use crate::types::{AttemptId, ConnectionStatus, CredentialsForm, Provider, WizardStep};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use url::Url;

/// Events the hosting page observes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WizardEvent {
    Connected { workspace_name: Option<String> },
    Disconnected,
    Close,
}

/// Work the wizard asks its driver to perform.
#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    CheckStatus,
    SaveCredentials(CredentialsForm),
    FetchAuthorizationUrl { attempt: AttemptId },
    OpenPopup { attempt: AttemptId, url: Url },
    CancelAuthorization,
    Disconnect,
}

/// Completions delivered back to the wizard.
#[derive(Debug)]
pub enum WizardMsg {
    StatusLoaded(ApiResult<ConnectionStatus>),
    CredentialsSaved(ApiResult<()>),
    AuthorizationUrl {
        attempt: AttemptId,
        result: ApiResult<Url>,
    },
    PopupFailed {
        attempt: AttemptId,
        reason: String,
    },
    Handshake {
        attempt: AttemptId,
        outcome: HandshakeOutcome,
    },
    Disconnected(ApiResult<()>),
}

/// The setup flow for one integration dialog. Pure state: every operation
/// returns the effect the driver should run, and completions come back via
/// [`SetupWizard::update`].
pub struct SetupWizard {
    provider: Provider,
    step: WizardStep,
    form: CredentialsForm,
    workspace_name: Option<String>,
    error: Option<String>,
    status_pending: bool,
    saving: bool,
    authorizing: Option<AttemptId>,
    last_attempt: u64,
    confirming_disconnect: bool,
    disconnecting: bool,
    closed: bool,
    events: mpsc::UnboundedSender<WizardEvent>,
    notifier: Arc<dyn NotificationSink>,
}

impl SetupWizard {
    pub fn new(
        provider: Provider,
        events: mpsc::UnboundedSender<WizardEvent>,
        notifier: Arc<dyn NotificationSink>,
    ) -> Self {
        Self {
            provider,
            step: WizardStep::Loading,
            form: CredentialsForm::default(),
            workspace_name: None,
            error: None,
            status_pending: false,
            saving: false,
            authorizing: None,
            last_attempt: 0,
            confirming_disconnect: false,
            disconnecting: false,
            closed: false,
            events,
            notifier,
        }
    }

    pub fn provider(&self) -> &Provider {
        &self.provider
    }

    pub fn step(&self) -> WizardStep {
        self.step
    }

    pub fn form(&self) -> &CredentialsForm {
        &self.form
    }

    pub fn form_mut(&mut self) -> &mut CredentialsForm {
        &mut self.form
    }

    pub fn workspace_name(&self) -> Option<&str> {
        self.workspace_name.as_deref()
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn clear_error(&mut self) {
        self.error = None;
    }

    pub fn is_loading(&self) -> bool {
        self.status_pending
    }

    pub fn is_saving(&self) -> bool {
        self.saving
    }

    pub fn is_authorizing(&self) -> bool {
        self.authorizing.is_some()
    }

    pub fn pending_attempt(&self) -> Option<AttemptId> {
        self.authorizing
    }

    pub fn is_confirming_disconnect(&self) -> bool {
        self.confirming_disconnect
    }

    pub fn is_disconnecting(&self) -> bool {
        self.disconnecting
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Whether the primary action of the current step should be disabled.
    pub fn is_busy(&self) -> bool {
        self.status_pending || self.saving || self.disconnecting
    }

    pub fn open(&mut self) -> Option<Effect> {
        if self.closed {
            return None;
        }
        if let Some(attempt) = self.authorizing.take() {
            debug!("Authorization {} dropped on reopen", attempt);
        }
        self.step = WizardStep::Loading;
        self.error = None;
        self.saving = false;
        self.disconnecting = false;
        self.confirming_disconnect = false;
        self.status_pending = true;
        Some(Effect::CheckStatus)
    }

    pub fn confirm_app_created(&mut self) {
        if self.step == WizardStep::CreateApp && !self.closed {
            self.error = None;
            self.step = WizardStep::Credentials;
        }
    }

    pub fn back(&mut self) {
        if self.closed || self.saving {
            return;
        }
        match self.step {
            WizardStep::Credentials => {
                self.error = None;
                self.step = WizardStep::CreateApp;
            }
            WizardStep::Install if self.authorizing.is_none() => {
                self.error = None;
                self.step = WizardStep::Credentials;
            }
            _ => {}
        }
    }

    pub fn submit_credentials(&mut self) -> Option<Effect> {
        if self.closed || self.step != WizardStep::Credentials || self.saving {
            return None;
        }
        if let Err(e) = self.form.validate() {
            self.error = Some(e.to_string());
            return None;
        }
        self.error = None;
        self.saving = true;
        Some(Effect::SaveCredentials(self.form.trimmed()))
    }

    /// Begins a new authorization attempt, superseding any pending one.
    pub fn start_authorization(&mut self) -> Option<Effect> {
        if self.closed || self.step != WizardStep::Install {
            return None;
        }
        if let Some(previous) = self.authorizing {
            debug!("Authorization {} superseded", previous);
        }
        self.last_attempt += 1;
        let attempt = AttemptId(self.last_attempt);
        self.authorizing = Some(attempt);
        self.error = None;
        Some(Effect::FetchAuthorizationUrl { attempt })
    }

    /// The user gave up on the pending attempt from the opener side.
    pub fn abandon_authorization(&mut self) -> Option<Effect> {
        self.authorizing.take()?;
        Some(Effect::CancelAuthorization)
    }

    pub fn request_disconnect(&mut self) {
        if self.step == WizardStep::Connected && !self.disconnecting && !self.closed {
            self.error = None;
            self.confirming_disconnect = true;
        }
    }

    pub fn cancel_disconnect(&mut self) {
        self.confirming_disconnect = false;
    }

    pub fn confirm_disconnect(&mut self) -> Option<Effect> {
        if !self.confirming_disconnect || self.closed || self.step != WizardStep::Connected {
            return None;
        }
        self.confirming_disconnect = false;
        self.disconnecting = true;
        Some(Effect::Disconnect)
    }

    pub fn close(&mut self) -> Option<Effect> {
        if self.closed {
            return None;
        }
        self.closed = true;
        self.confirming_disconnect = false;
        let _ = self.events.send(WizardEvent::Close);
        self.authorizing.take().map(|_| Effect::CancelAuthorization)
    }

    pub fn update(&mut self, msg: WizardMsg) -> Option<Effect> {
        if self.closed {
            debug!("Dropping completion for a closed wizard: {:?}", msg);
            return None;
        }
        match msg {
            WizardMsg::StatusLoaded(result) => {
                if !self.status_pending {
                    return None;
                }
                self.status_pending = false;
                match result {
                    Ok(status) => {
                        self.step = status.resume_step();
                        if self.step == WizardStep::Connected {
                            self.workspace_name = status.workspace_name;
                        }
                    }
                    Err(e) => {
                        warn!("Status check failed, starting from scratch: {}", e);
                        self.step = WizardStep::CreateApp;
                    }
                }
                info!("{} setup resumed at {}", self.provider, self.step);
                None
            }
            WizardMsg::CredentialsSaved(result) => {
                if !self.saving {
                    return None;
                }
                self.saving = false;
                match result {
                    Ok(()) => {
                        if self.step == WizardStep::Credentials {
                            self.step = WizardStep::Install;
                        }
                    }
                    Err(e) => self.error = Some(e.user_message()),
                }
                None
            }
            WizardMsg::AuthorizationUrl { attempt, result } => {
                if self.authorizing != Some(attempt) {
                    debug!("Ignoring authorization URL for stale attempt {}", attempt);
                    return None;
                }
                match result {
                    Ok(url) => Some(Effect::OpenPopup { attempt, url }),
                    Err(e) => {
                        self.authorizing = None;
                        self.error = Some(e.user_message());
                        None
                    }
                }
            }
            WizardMsg::PopupFailed { attempt, reason } => {
                if self.authorizing != Some(attempt) {
                    return None;
                }
                warn!("Could not open authorization window: {}", reason);
                self.authorizing = None;
                self.error = Some(
                    "Could not open the authorization window. Allow popups and try again."
                        .to_string(),
                );
                None
            }
            WizardMsg::Handshake { attempt, outcome } => {
                if self.authorizing != Some(attempt) {
                    debug!("Ignoring handshake outcome for stale attempt {}", attempt);
                    return None;
                }
                self.authorizing = None;
                match outcome {
                    HandshakeOutcome::Completed(result) if result.success => {
                        self.step = WizardStep::Connected;
                        self.workspace_name = result.workspace_name;
                        self.error = None;
                        info!("{} connected", self.provider);
                        let message = match self.workspace_name {
                            Some(ref name) => format!("Connected to {name}"),
                            None => format!("Connected to {}", self.provider.display_name()),
                        };
                        self.notifier.notify(Notification::success(message));
                        let _ = self.events.send(WizardEvent::Connected {
                            workspace_name: self.workspace_name.clone(),
                        });
                    }
                    HandshakeOutcome::Completed(result) => {
                        self.error = Some(
                            result
                                .error
                                .filter(|e| !e.trim().is_empty())
                                .unwrap_or_else(|| "Authorization failed".to_string()),
                        );
                    }
                    HandshakeOutcome::PopupClosed => {
                        debug!("Authorization window closed before completing");
                    }
                }
                None
            }
            WizardMsg::Disconnected(result) => {
                if !self.disconnecting {
                    return None;
                }
                self.disconnecting = false;
                match result {
                    Ok(()) => {
                        self.step = WizardStep::CreateApp;
                        self.form.clear();
                        self.workspace_name = None;
                        info!("{} disconnected", self.provider);
                        self.notifier.notify(Notification::info(format!(
                            "{} disconnected",
                            self.provider.display_name()
                        )));
                        let _ = self.events.send(WizardEvent::Disconnected);
                    }
                    Err(e) => self.error = Some(e.user_message()),
                }
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ApiError;
    use crate::notify::ChannelSink;
    use crate::types::OAuthHandshakeResult;

    struct Harness {
        wizard: SetupWizard,
        events: mpsc::UnboundedReceiver<WizardEvent>,
        toasts: mpsc::UnboundedReceiver<Notification>,
    }

    fn harness() -> Harness {
        let (tx, events) = mpsc::unbounded_channel();
        let (sink, toasts) = ChannelSink::new();
        Harness {
            wizard: SetupWizard::new(Provider::slack(), tx, Arc::new(sink)),
            events,
            toasts,
        }
    }

    fn remote_error() -> ApiError {
        ApiError::Remote {
            status: 500,
            message: "backend exploded".to_string(),
        }
    }

    fn filled_form() -> CredentialsForm {
        CredentialsForm {
            client_id: " 123.456 ".to_string(),
            client_secret: "secret".to_string(),
            signing_secret: "signing".to_string(),
        }
    }

    fn at_step(step: WizardStep) -> Harness {
        let mut h = harness();
        h.wizard.open();
        let status = match step {
            WizardStep::Connected => ConnectionStatus {
                connected: true,
                workspace_name: Some("Acme".to_string()),
                has_credentials: Some(true),
            },
            WizardStep::Install => ConnectionStatus {
                connected: false,
                workspace_name: None,
                has_credentials: Some(true),
            },
            _ => ConnectionStatus::default(),
        };
        h.wizard.update(WizardMsg::StatusLoaded(Ok(status)));
        if step == WizardStep::Credentials {
            h.wizard.confirm_app_created();
        }
        assert_eq!(h.wizard.step(), step);
        h
    }

    fn start(h: &mut Harness) -> AttemptId {
        match h.wizard.start_authorization() {
            Some(Effect::FetchAuthorizationUrl { attempt }) => attempt,
            other => panic!("unexpected effect {other:?}"),
        }
    }

    #[test]
    fn opening_checks_status() {
        let mut h = harness();
        assert_eq!(h.wizard.step(), WizardStep::Loading);
        assert_eq!(h.wizard.open(), Some(Effect::CheckStatus));
        assert!(h.wizard.is_loading());
    }

    #[test]
    fn status_decides_the_landing_step() {
        for (connected, has_credentials) in [
            (true, Some(true)),
            (true, None),
            (false, Some(true)),
            (false, Some(false)),
            (false, None),
        ] {
            let mut h = harness();
            h.wizard.open();
            h.wizard.update(WizardMsg::StatusLoaded(Ok(ConnectionStatus {
                connected,
                workspace_name: Some("Acme".to_string()),
                has_credentials,
            })));
            let expected = if connected {
                WizardStep::Connected
            } else if has_credentials == Some(true) {
                WizardStep::Install
            } else {
                WizardStep::CreateApp
            };
            assert_eq!(h.wizard.step(), expected);
            assert!(!h.wizard.is_loading());
        }
    }

    #[test]
    fn failed_status_check_fails_open() {
        let mut h = harness();
        h.wizard.open();
        h.wizard.update(WizardMsg::StatusLoaded(Err(remote_error())));
        assert_eq!(h.wizard.step(), WizardStep::CreateApp);
        assert_eq!(h.wizard.error(), None);
    }

    #[test]
    fn connected_status_records_workspace() {
        let h = at_step(WizardStep::Connected);
        assert_eq!(h.wizard.workspace_name(), Some("Acme"));
    }

    #[test]
    fn blank_field_blocks_submission() {
        let mut h = at_step(WizardStep::Credentials);
        *h.wizard.form_mut() = CredentialsForm {
            signing_secret: "   ".to_string(),
            ..filled_form()
        };

        assert_eq!(h.wizard.submit_credentials(), None);
        assert_eq!(h.wizard.step(), WizardStep::Credentials);
        assert!(!h.wizard.is_saving());
        assert_eq!(h.wizard.error(), Some("Signing Secret is required"));
    }

    #[test]
    fn valid_submission_saves_trimmed_values_once() {
        let mut h = at_step(WizardStep::Credentials);
        *h.wizard.form_mut() = filled_form();

        match h.wizard.submit_credentials() {
            Some(Effect::SaveCredentials(form)) => assert_eq!(form.client_id, "123.456"),
            other => panic!("unexpected effect {other:?}"),
        }
        assert_eq!(h.wizard.submit_credentials(), None, "second submit while saving");

        h.wizard.update(WizardMsg::CredentialsSaved(Ok(())));
        assert_eq!(h.wizard.step(), WizardStep::Install);
        assert!(!h.wizard.is_saving());
    }

    #[test]
    fn failed_save_stays_on_credentials() {
        let mut h = at_step(WizardStep::Credentials);
        *h.wizard.form_mut() = filled_form();
        h.wizard.submit_credentials();

        h.wizard.update(WizardMsg::CredentialsSaved(Err(remote_error())));

        assert_eq!(h.wizard.step(), WizardStep::Credentials);
        assert_eq!(h.wizard.error(), Some("backend exploded"));
        assert!(h.wizard.submit_credentials().is_some(), "user may retry");
    }

    #[test]
    fn successful_handshake_connects_and_notifies() {
        let mut h = at_step(WizardStep::Install);
        let attempt = start(&mut h);
        let url = Url::parse("https://slack.com/oauth/v2/authorize").unwrap();
        assert_eq!(
            h.wizard.update(WizardMsg::AuthorizationUrl {
                attempt,
                result: Ok(url.clone())
            }),
            Some(Effect::OpenPopup { attempt, url })
        );

        h.wizard.update(WizardMsg::Handshake {
            attempt,
            outcome: HandshakeOutcome::Completed(OAuthHandshakeResult {
                success: true,
                workspace_name: Some("Acme".to_string()),
                error: None,
            }),
        });

        assert_eq!(h.wizard.step(), WizardStep::Connected);
        assert_eq!(h.wizard.workspace_name(), Some("Acme"));
        assert!(!h.wizard.is_authorizing());
        assert_eq!(
            h.events.try_recv().ok(),
            Some(WizardEvent::Connected {
                workspace_name: Some("Acme".to_string())
            })
        );
        assert_eq!(h.toasts.try_recv().map(|n| n.message).ok().as_deref(), Some("Connected to Acme"));
    }

    #[test]
    fn failed_handshake_surfaces_error_and_keeps_step() {
        let mut h = at_step(WizardStep::Install);
        let attempt = start(&mut h);

        h.wizard.update(WizardMsg::Handshake {
            attempt,
            outcome: HandshakeOutcome::Completed(OAuthHandshakeResult {
                success: false,
                workspace_name: None,
                error: Some("access_denied".to_string()),
            }),
        });

        assert_eq!(h.wizard.step(), WizardStep::Install);
        assert_eq!(h.wizard.error(), Some("access_denied"));
        assert!(!h.wizard.is_authorizing());
        assert!(h.events.try_recv().is_err());
    }

    #[test]
    fn closed_popup_clears_pending_without_error() {
        let mut h = at_step(WizardStep::Install);
        let attempt = start(&mut h);

        h.wizard.update(WizardMsg::Handshake {
            attempt,
            outcome: HandshakeOutcome::PopupClosed,
        });

        assert_eq!(h.wizard.step(), WizardStep::Install);
        assert_eq!(h.wizard.error(), None);
        assert!(!h.wizard.is_authorizing());
    }

    #[test]
    fn stale_attempt_cannot_touch_the_current_one() {
        let mut h = at_step(WizardStep::Install);
        let first = start(&mut h);
        let second = start(&mut h);
        assert_ne!(first, second);

        let stale_url = Url::parse("https://slack.com/stale").unwrap();
        assert_eq!(
            h.wizard.update(WizardMsg::AuthorizationUrl {
                attempt: first,
                result: Ok(stale_url)
            }),
            None
        );
        h.wizard.update(WizardMsg::Handshake {
            attempt: first,
            outcome: HandshakeOutcome::Completed(OAuthHandshakeResult {
                success: false,
                workspace_name: None,
                error: Some("late".to_string()),
            }),
        });

        assert_eq!(h.wizard.pending_attempt(), Some(second));
        assert_eq!(h.wizard.error(), None);
    }

    #[test]
    fn url_fetch_failure_stays_on_install() {
        let mut h = at_step(WizardStep::Install);
        let attempt = start(&mut h);

        h.wizard.update(WizardMsg::AuthorizationUrl {
            attempt,
            result: Err(remote_error()),
        });

        assert_eq!(h.wizard.step(), WizardStep::Install);
        assert!(!h.wizard.is_authorizing());
        assert_eq!(h.wizard.error(), Some("backend exploded"));
    }

    #[test]
    fn disconnect_requires_confirmation() {
        let mut h = at_step(WizardStep::Connected);
        assert_eq!(h.wizard.confirm_disconnect(), None);

        h.wizard.request_disconnect();
        h.wizard.cancel_disconnect();
        assert_eq!(h.wizard.confirm_disconnect(), None);

        h.wizard.request_disconnect();
        assert_eq!(h.wizard.confirm_disconnect(), Some(Effect::Disconnect));
        assert_eq!(h.wizard.confirm_disconnect(), None);
    }

    #[test]
    fn reopening_drops_pending_work() {
        let mut h = at_step(WizardStep::Connected);
        h.wizard.request_disconnect();

        assert_eq!(h.wizard.open(), Some(Effect::CheckStatus));
        assert!(!h.wizard.is_confirming_disconnect());
        assert_eq!(h.wizard.confirm_disconnect(), None);

        let mut h = at_step(WizardStep::Install);
        let attempt = start(&mut h);
        h.wizard.open();
        assert_eq!(h.wizard.pending_attempt(), None);
        h.wizard.update(WizardMsg::Handshake {
            attempt,
            outcome: HandshakeOutcome::PopupClosed,
        });
        assert_eq!(h.wizard.step(), WizardStep::Loading);

        let mut h = at_step(WizardStep::Credentials);
        *h.wizard.form_mut() = filled_form();
        h.wizard.submit_credentials();
        h.wizard.open();
        assert!(!h.wizard.is_saving());
        h.wizard.update(WizardMsg::CredentialsSaved(Ok(())));
        assert_eq!(h.wizard.step(), WizardStep::Loading);
    }

    #[test]
    fn disconnect_resets_to_create_app_and_clears_form() {
        let mut h = at_step(WizardStep::Connected);
        *h.wizard.form_mut() = filled_form();
        h.wizard.request_disconnect();
        h.wizard.confirm_disconnect();

        h.wizard.update(WizardMsg::Disconnected(Ok(())));

        assert_eq!(h.wizard.step(), WizardStep::CreateApp);
        assert!(h.wizard.form().is_empty());
        assert_eq!(h.wizard.workspace_name(), None);
        assert_eq!(h.events.try_recv().ok(), Some(WizardEvent::Disconnected));
    }

    #[test]
    fn failed_disconnect_keeps_connection() {
        let mut h = at_step(WizardStep::Connected);
        h.wizard.request_disconnect();
        h.wizard.confirm_disconnect();

        h.wizard.update(WizardMsg::Disconnected(Err(remote_error())));

        assert_eq!(h.wizard.step(), WizardStep::Connected);
        assert_eq!(h.wizard.error(), Some("backend exploded"));
        assert!(h.events.try_recv().is_err());
    }

    #[test]
    fn back_navigation_respects_pending_authorization() {
        let mut h = at_step(WizardStep::Install);
        start(&mut h);
        h.wizard.back();
        assert_eq!(h.wizard.step(), WizardStep::Install);

        assert_eq!(h.wizard.abandon_authorization(), Some(Effect::CancelAuthorization));
        h.wizard.back();
        assert_eq!(h.wizard.step(), WizardStep::Credentials);
        h.wizard.back();
        assert_eq!(h.wizard.step(), WizardStep::CreateApp);
    }

    #[test]
    fn close_cancels_and_goes_inert() {
        let mut h = at_step(WizardStep::Install);
        let attempt = start(&mut h);

        assert_eq!(h.wizard.close(), Some(Effect::CancelAuthorization));
        assert_eq!(h.events.try_recv().ok(), Some(WizardEvent::Close));
        assert_eq!(h.wizard.close(), None);

        h.wizard.update(WizardMsg::Handshake {
            attempt,
            outcome: HandshakeOutcome::Completed(OAuthHandshakeResult {
                success: true,
                workspace_name: Some("Acme".to_string()),
                error: None,
            }),
        });
        assert_eq!(h.wizard.step(), WizardStep::Install);
        assert!(h.events.try_recv().is_err());
    }
}

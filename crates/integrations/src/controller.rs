use crate::api::IntegrationBackend;
use crate::handshake::{Authorizer, HandshakeHandle, PopupOpener};
use crate::notify::NotificationSink;
use crate::types::{AttemptId, CredentialsForm, Provider};
use crate::wizard::{Effect, SetupWizard, WizardEvent, WizardMsg};
use rand::distributions::Alphanumeric;
use rand::Rng;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::debug;
use url::Url;

const STATE_LEN: usize = 32;

/// A [`SetupWizard`] wired to a backend and a popup authorizer.
///
/// Operations return immediately; remote calls run on the tokio runtime and
/// their completions are applied by [`IntegrationWizard::pump`] (from an
/// event-loop tick) or [`IntegrationWizard::next`] (from async code). Must be
/// used from within a tokio runtime.
pub struct IntegrationWizard<B, O> {
    state: SetupWizard,
    backend: Arc<B>,
    authorizer: Authorizer<O>,
    application_id: String,
    msg_tx: mpsc::UnboundedSender<WizardMsg>,
    msg_rx: mpsc::UnboundedReceiver<WizardMsg>,
    handshake: Option<HandshakeHandle>,
    return_to: Option<Url>,
    pending_state: Option<(AttemptId, String)>,
}

impl<B: IntegrationBackend, O: PopupOpener> IntegrationWizard<B, O> {
    pub fn new(
        provider: Provider,
        application_id: impl Into<String>,
        backend: Arc<B>,
        authorizer: Authorizer<O>,
        events: mpsc::UnboundedSender<WizardEvent>,
        notifier: Arc<dyn NotificationSink>,
    ) -> Self {
        let (msg_tx, msg_rx) = mpsc::unbounded_channel();
        Self {
            state: SetupWizard::new(provider, events, notifier),
            backend,
            authorizer,
            application_id: application_id.into(),
            msg_tx,
            msg_rx,
            handshake: None,
            return_to: None,
            pending_state: None,
        }
    }

    /// Where the authorization page reports back. Each attempt appends its
    /// own `state` token, and only a completion echoing it is accepted.
    pub fn with_return_url(mut self, url: Url) -> Self {
        self.return_to = Some(url);
        self
    }

    pub fn state(&self) -> &SetupWizard {
        &self.state
    }

    pub fn form_mut(&mut self) -> &mut CredentialsForm {
        self.state.form_mut()
    }

    pub fn authorizer(&self) -> &Authorizer<O> {
        &self.authorizer
    }

    pub fn application_id(&self) -> &str {
        &self.application_id
    }

    pub fn live_attempt(&self) -> Option<AttemptId> {
        self.handshake
            .as_ref()
            .filter(|h| !h.is_cancelled())
            .map(HandshakeHandle::attempt)
    }

    pub fn open(&mut self) {
        self.cancel_handshake();
        let effect = self.state.open();
        self.run(effect);
    }

    pub fn confirm_app_created(&mut self) {
        self.state.confirm_app_created();
    }

    pub fn back(&mut self) {
        self.state.back();
    }

    pub fn dismiss_error(&mut self) {
        self.state.clear_error();
    }

    pub fn submit_credentials(&mut self) {
        let effect = self.state.submit_credentials();
        self.run(effect);
    }

    pub fn start_authorization(&mut self) {
        let effect = self.state.start_authorization();
        self.run(effect);
    }

    pub fn abandon_authorization(&mut self) {
        let effect = self.state.abandon_authorization();
        self.run(effect);
    }

    pub fn request_disconnect(&mut self) {
        self.state.request_disconnect();
    }

    pub fn cancel_disconnect(&mut self) {
        self.state.cancel_disconnect();
    }

    pub fn confirm_disconnect(&mut self) {
        let effect = self.state.confirm_disconnect();
        self.run(effect);
    }

    pub fn close(&mut self) {
        let effect = self.state.close();
        self.run(effect);
        self.cancel_handshake();
    }

    /// Applies every completion that has already arrived. Returns how many.
    pub fn pump(&mut self) -> usize {
        let mut applied = 0;
        while let Ok(msg) = self.msg_rx.try_recv() {
            self.apply(msg);
            applied += 1;
        }
        applied
    }

    /// Waits for the next completion and applies it. Returns `false` only if
    /// the completion channel is gone, which cannot happen while `self` lives.
    pub async fn next(&mut self) -> bool {
        match self.msg_rx.recv().await {
            Some(msg) => {
                self.apply(msg);
                true
            }
            None => false,
        }
    }

    fn apply(&mut self, msg: WizardMsg) {
        if let WizardMsg::Handshake { attempt, .. } = msg {
            if self.live_attempt() == Some(attempt) {
                self.handshake = None;
            }
        }
        let effect = self.state.update(msg);
        self.run(effect);
    }

    fn cancel_handshake(&mut self) {
        if let Some(handle) = self.handshake.take() {
            debug!("Cancelling authorization {}", handle.attempt());
            handle.cancel();
        }
    }

    fn spawn<F>(&self, future: F)
    where
        F: Future<Output = WizardMsg> + Send + 'static,
    {
        let tx = self.msg_tx.clone();
        tokio::spawn(async move {
            let msg = future.await;
            let _ = tx.send(msg);
        });
    }

    fn run(&mut self, effect: Option<Effect>) {
        let Some(effect) = effect else {
            return;
        };
        let backend = self.backend.clone();
        let application_id = self.application_id.clone();
        match effect {
            Effect::CheckStatus => self.spawn(async move {
                WizardMsg::StatusLoaded(backend.status(&application_id).await)
            }),
            Effect::SaveCredentials(form) => self.spawn(async move {
                WizardMsg::CredentialsSaved(backend.save_credentials(&application_id, &form).await)
            }),
            Effect::FetchAuthorizationUrl { attempt } => {
                self.cancel_handshake();
                let return_to = match self.return_to {
                    Some(ref base) => {
                        let state = attempt_state();
                        let mut url = base.clone();
                        url.query_pairs_mut().append_pair("state", &state);
                        self.pending_state = Some((attempt, state));
                        Some(url)
                    }
                    None => None,
                };
                self.spawn(async move {
                    let result = backend.oauth_url(&application_id, return_to.as_ref()).await;
                    WizardMsg::AuthorizationUrl { attempt, result }
                });
            }
            Effect::OpenPopup { attempt, url } => self.open_popup(attempt, &url),
            Effect::CancelAuthorization => self.cancel_handshake(),
            Effect::Disconnect => self.spawn(async move {
                WizardMsg::Disconnected(backend.disconnect(&application_id).await)
            }),
        }
    }

    fn open_popup(&mut self, attempt: AttemptId, url: &Url) {
        self.cancel_handshake();
        let state = match self.pending_state.take() {
            Some((pending, state)) if pending == attempt => Some(state),
            _ if self.return_to.is_some() => {
                self.apply(WizardMsg::PopupFailed {
                    attempt,
                    reason: format!("no state token for attempt {attempt}"),
                });
                return;
            }
            _ => None,
        };
        let tx = self.msg_tx.clone();
        let started = self.authorizer.start(attempt, url, state, move |outcome| {
            let _ = tx.send(WizardMsg::Handshake { attempt, outcome });
        });
        match started {
            Ok(handle) => self.handshake = Some(handle),
            Err(e) => self.apply(WizardMsg::PopupFailed {
                attempt,
                reason: e.to_string(),
            }),
        }
    }
}

fn attempt_state() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(STATE_LEN)
        .map(char::from)
        .collect()
}

impl<B, O> Drop for IntegrationWizard<B, O> {
    fn drop(&mut self) {
        if let Some(handle) = self.handshake.take() {
            handle.cancel();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{ApiError, ApiResult};
    use crate::handshake::testing::*;
    use crate::handshake::MessageBus;
    use crate::notify::NullSink;
    use crate::types::{ConnectionStatus, WizardStep};
    use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;

    #[derive(Default)]
    struct FakeBackend {
        status: Mutex<Option<ConnectionStatus>>,
        fail_save: AtomicBool,
        status_calls: AtomicU32,
        save_calls: AtomicU32,
        url_calls: AtomicU32,
        disconnect_calls: AtomicU32,
        return_to: Mutex<Option<Url>>,
    }

    fn boom() -> ApiError {
        ApiError::Remote {
            status: 503,
            message: "unavailable".to_string(),
        }
    }

    impl IntegrationBackend for FakeBackend {
        async fn status(&self, _application_id: &str) -> ApiResult<ConnectionStatus> {
            self.status_calls.fetch_add(1, Ordering::SeqCst);
            self.status.lock().unwrap().clone().ok_or_else(boom)
        }

        async fn save_credentials(&self, _application_id: &str, _form: &CredentialsForm) -> ApiResult<()> {
            self.save_calls.fetch_add(1, Ordering::SeqCst);
            if self.fail_save.load(Ordering::SeqCst) {
                Err(boom())
            } else {
                Ok(())
            }
        }

        async fn oauth_url(&self, _application_id: &str, return_to: Option<&Url>) -> ApiResult<Url> {
            *self.return_to.lock().unwrap() = return_to.cloned();
            let n = self.url_calls.fetch_add(1, Ordering::SeqCst);
            Ok(Url::parse(&format!("https://slack.com/oauth/v2/authorize?state={n}")).unwrap())
        }

        async fn disconnect(&self, _application_id: &str) -> ApiResult<()> {
            self.disconnect_calls.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    struct Fixture {
        wizard: IntegrationWizard<FakeBackend, FakeOpener>,
        backend: Arc<FakeBackend>,
        opener: FakeOpener,
        bus: MessageBus,
        events: mpsc::UnboundedReceiver<WizardEvent>,
    }

    fn fixture(status: Option<ConnectionStatus>) -> Fixture {
        let backend = Arc::new(FakeBackend::default());
        *backend.status.lock().unwrap() = status;
        let opener = FakeOpener::default();
        let bus = MessageBus::new();
        let authorizer = Authorizer::new(opener.clone(), bus.clone(), trusted_policy())
            .with_poll_interval(Duration::from_millis(10));
        let (events_tx, events) = mpsc::unbounded_channel();
        let wizard = IntegrationWizard::new(
            Provider::slack(),
            "app_1",
            backend.clone(),
            authorizer,
            events_tx,
            Arc::new(NullSink),
        );
        Fixture {
            wizard,
            backend,
            opener,
            bus,
            events,
        }
    }

    async fn settle(wizard: &mut IntegrationWizard<FakeBackend, FakeOpener>) {
        tokio::time::timeout(Duration::from_secs(2), wizard.next())
            .await
            .expect("completion arrives");
    }

    fn install_status() -> Option<ConnectionStatus> {
        Some(ConnectionStatus {
            connected: false,
            workspace_name: None,
            has_credentials: Some(true),
        })
    }

    async fn popup_open(f: &mut Fixture) {
        f.wizard.start_authorization();
        settle(&mut f.wizard).await;
        assert!(f.wizard.live_attempt().is_some());
    }

    #[tokio::test]
    async fn unreachable_backend_lands_on_create_app() {
        let mut f = fixture(None);
        f.wizard.open();
        settle(&mut f.wizard).await;

        assert_eq!(f.wizard.state().step(), WizardStep::CreateApp);
        assert_eq!(f.backend.status_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn stored_credentials_resume_at_install() {
        let mut f = fixture(install_status());
        f.wizard.open();
        settle(&mut f.wizard).await;
        assert_eq!(f.wizard.state().step(), WizardStep::Install);
    }

    #[tokio::test]
    async fn blank_credentials_never_reach_the_backend() {
        let mut f = fixture(Some(ConnectionStatus::default()));
        f.wizard.open();
        settle(&mut f.wizard).await;
        f.wizard.confirm_app_created();
        f.wizard.form_mut().client_id = "123".to_string();

        f.wizard.submit_credentials();
        tokio::time::sleep(Duration::from_millis(20)).await;

        assert_eq!(f.wizard.pump(), 0);
        assert_eq!(f.backend.save_calls.load(Ordering::SeqCst), 0);
        assert_eq!(f.wizard.state().step(), WizardStep::Credentials);
        assert!(f.wizard.state().error().is_some());
    }

    #[tokio::test]
    async fn credentials_are_saved_exactly_once() {
        let mut f = fixture(Some(ConnectionStatus::default()));
        f.wizard.open();
        settle(&mut f.wizard).await;
        f.wizard.confirm_app_created();
        *f.wizard.form_mut() = CredentialsForm {
            client_id: "1".to_string(),
            client_secret: "2".to_string(),
            signing_secret: "3".to_string(),
        };

        f.wizard.submit_credentials();
        f.wizard.submit_credentials();
        settle(&mut f.wizard).await;

        assert_eq!(f.backend.save_calls.load(Ordering::SeqCst), 1);
        assert_eq!(f.wizard.state().step(), WizardStep::Install);
    }

    #[tokio::test]
    async fn failed_save_keeps_the_user_on_credentials() {
        let mut f = fixture(Some(ConnectionStatus::default()));
        f.backend.fail_save.store(true, Ordering::SeqCst);
        f.wizard.open();
        settle(&mut f.wizard).await;
        f.wizard.confirm_app_created();
        *f.wizard.form_mut() = CredentialsForm {
            client_id: "1".to_string(),
            client_secret: "2".to_string(),
            signing_secret: "3".to_string(),
        };

        f.wizard.submit_credentials();
        settle(&mut f.wizard).await;

        assert_eq!(f.wizard.state().step(), WizardStep::Credentials);
        assert_eq!(f.wizard.state().error(), Some("unavailable"));
    }

    #[tokio::test]
    async fn handshake_message_connects() {
        let mut f = fixture(install_status());
        f.wizard.open();
        settle(&mut f.wizard).await;
        popup_open(&mut f).await;

        f.bus.post(completion(true, Some("Acme"), None));
        settle(&mut f.wizard).await;

        assert_eq!(f.wizard.state().step(), WizardStep::Connected);
        assert_eq!(f.wizard.state().workspace_name(), Some("Acme"));
        assert_eq!(
            f.events.try_recv().ok(),
            Some(WizardEvent::Connected {
                workspace_name: Some("Acme".to_string())
            })
        );
        assert_eq!(f.wizard.live_attempt(), None);
        wait_until(|| f.bus.listener_count() == 0).await;
    }

    #[tokio::test]
    async fn return_url_binds_completion_to_the_attempt() {
        let base = fixture(install_status());
        let mut f = Fixture {
            wizard: base
                .wizard
                .with_return_url(Url::parse("http://127.0.0.1:8765/oauth-complete").unwrap()),
            ..base
        };
        f.wizard.open();
        settle(&mut f.wizard).await;
        popup_open(&mut f).await;

        let sent = f.backend.return_to.lock().unwrap().clone().unwrap();
        assert_eq!(sent.path(), "/oauth-complete");
        let state = sent
            .query_pairs()
            .find(|(k, _)| k == "state")
            .map(|(_, v)| v.into_owned())
            .unwrap();
        assert_eq!(state.len(), STATE_LEN);

        f.bus.post(completion(true, Some("Evil"), None));
        let mut forged = completion(true, Some("Evil"), None);
        forged.data["state"] = "guessed".into();
        f.bus.post(forged);
        tokio::time::sleep(Duration::from_millis(30)).await;
        f.wizard.pump();
        assert_eq!(f.wizard.state().step(), WizardStep::Install);
        assert!(f.wizard.state().is_authorizing());

        let mut genuine = completion(true, Some("Acme"), None);
        genuine.data["state"] = state.into();
        f.bus.post(genuine);
        settle(&mut f.wizard).await;
        assert_eq!(f.wizard.state().workspace_name(), Some("Acme"));
    }

    #[tokio::test]
    async fn reopening_tears_down_a_live_popup() {
        let mut f = fixture(install_status());
        f.wizard.open();
        settle(&mut f.wizard).await;
        popup_open(&mut f).await;

        f.wizard.open();

        assert_eq!(f.wizard.live_attempt(), None);
        wait_until(|| f.bus.listener_count() == 0).await;
        wait_until(|| f.opener.window(0).is_closed()).await;
    }

    #[tokio::test]
    async fn restarting_keeps_a_single_popup_and_listener() {
        let mut f = fixture(install_status());
        f.wizard.open();
        settle(&mut f.wizard).await;
        popup_open(&mut f).await;
        let first = f.opener.window(0);

        popup_open(&mut f).await;

        wait_until(|| first.is_closed()).await;
        wait_until(|| f.bus.listener_count() == 1).await;
        assert_eq!(f.opener.opened(), 2);
        assert_eq!(f.opener.open_windows(), 1);

        f.bus.post(completion(true, Some("Second"), None));
        settle(&mut f.wizard).await;
        assert_eq!(f.wizard.state().workspace_name(), Some("Second"));
    }

    #[tokio::test]
    async fn rapid_double_start_opens_one_popup() {
        let mut f = fixture(install_status());
        f.wizard.open();
        settle(&mut f.wizard).await;

        f.wizard.start_authorization();
        f.wizard.start_authorization();
        settle(&mut f.wizard).await;
        settle(&mut f.wizard).await;

        assert_eq!(f.opener.opened(), 1);
        assert_eq!(f.bus.listener_count(), 1);
        assert_eq!(f.wizard.live_attempt(), f.wizard.state().pending_attempt());
    }

    #[tokio::test]
    async fn user_closing_the_popup_ends_pending_quietly() {
        let mut f = fixture(install_status());
        f.wizard.open();
        settle(&mut f.wizard).await;
        popup_open(&mut f).await;

        f.opener.window(0).user_closes();
        settle(&mut f.wizard).await;

        assert!(!f.wizard.state().is_authorizing());
        assert_eq!(f.wizard.state().step(), WizardStep::Install);
        assert_eq!(f.wizard.state().error(), None);
        wait_until(|| f.bus.listener_count() == 0).await;
    }

    #[tokio::test]
    async fn blocked_popup_surfaces_error() {
        let mut f = fixture(install_status());
        f.opener.blocked.store(true, Ordering::SeqCst);
        f.wizard.open();
        settle(&mut f.wizard).await;

        f.wizard.start_authorization();
        settle(&mut f.wizard).await;

        assert!(!f.wizard.state().is_authorizing());
        assert!(f.wizard.state().error().is_some());
        assert_eq!(f.bus.listener_count(), 0);
    }

    #[tokio::test]
    async fn disconnect_needs_confirmation_and_calls_once() {
        let mut f = fixture(Some(ConnectionStatus {
            connected: true,
            workspace_name: Some("Acme".to_string()),
            has_credentials: Some(true),
        }));
        f.wizard.open();
        settle(&mut f.wizard).await;

        f.wizard.confirm_disconnect();
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(f.backend.disconnect_calls.load(Ordering::SeqCst), 0);

        f.wizard.request_disconnect();
        f.wizard.confirm_disconnect();
        f.wizard.confirm_disconnect();
        settle(&mut f.wizard).await;

        assert_eq!(f.backend.disconnect_calls.load(Ordering::SeqCst), 1);
        assert_eq!(f.wizard.state().step(), WizardStep::CreateApp);
        assert!(f.wizard.state().form().is_empty());
        assert_eq!(f.events.try_recv().ok(), Some(WizardEvent::Disconnected));
    }

    #[tokio::test]
    async fn closing_or_dropping_releases_the_listener() {
        let mut f = fixture(install_status());
        f.wizard.open();
        settle(&mut f.wizard).await;
        popup_open(&mut f).await;

        f.wizard.close();
        wait_until(|| f.bus.listener_count() == 0).await;
        assert_eq!(f.events.try_recv().ok(), Some(WizardEvent::Close));

        let mut g = fixture(install_status());
        g.wizard.open();
        settle(&mut g.wizard).await;
        popup_open(&mut g).await;
        let Fixture { wizard, bus, opener, .. } = g;

        drop(wizard);
        wait_until(|| bus.listener_count() == 0).await;
        assert_eq!(opener.open_windows(), 0);
    }
}

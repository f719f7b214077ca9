use super::*;

pub type SetupController = IntegrationWizard<IntegrationApi, BrowserOpener>;

pub struct App {
    pub should_quit: bool,
    pub config: Config,
    pub wizard: SetupController,
    pub opener: BrowserOpener,
    pub guide: ProviderGuide,
    pub keybinds: Keybinds,
    pub focused_field: CredentialField,
    pub reveal_secrets: bool,
    pub show_help: bool,
    pub event_rx: mpsc::UnboundedReceiver<WizardEvent>,
    pub toast_rx: mpsc::UnboundedReceiver<Notification>,
    pub toasts: VecDeque<Notification>,
    pub event_log: VecDeque<LoggedEvent>,
    pub last_error: Option<String>,
    pub return_url: Option<Url>,
}

impl App {
    /// `return_url` is the loopback address the authorization page reports
    /// back to. Its origin is trusted alongside the backend, and each attempt
    /// still has to echo its own state token.
    pub fn new(config: Config, bus: MessageBus, return_url: Option<&Url>) -> Result<Self> {
        let base_url = config.base_url()?;
        let provider = config.integration.provider.clone();

        let api = IntegrationApi::builder(base_url.clone(), provider.clone())
            .session_token(config.backend.session_token.clone())
            .timeout(config.timeout())
            .build()?;

        let mut policy = OriginPolicy::new().allow(&base_url);
        if let Some(url) = return_url {
            policy = policy.allow(url);
        }
        for origin in config.extra_origins() {
            policy = policy.allow(&origin);
        }

        let opener = BrowserOpener::new(&config.popup.browser_command);
        let features = PopupFeatures::centered(
            config.popup.width,
            config.popup.height,
            config.popup.screen_width,
            config.popup.screen_height,
        );
        let authorizer = Authorizer::new(opener.clone(), bus, policy)
            .with_features(features)
            .with_poll_interval(config.poll_interval());

        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let (sink, toast_rx) = ChannelSink::new();
        let mut wizard = IntegrationWizard::new(
            provider.clone(),
            config.integration.application_id.clone(),
            Arc::new(api),
            authorizer,
            event_tx,
            Arc::new(sink),
        );
        if let Some(url) = return_url {
            wizard = wizard.with_return_url(url.clone());
        }

        Ok(Self {
            should_quit: false,
            guide: provider.guide(&base_url),
            config,
            wizard,
            opener,
            keybinds: Keybinds,
            focused_field: CredentialField::ClientId,
            reveal_secrets: false,
            show_help: false,
            event_rx,
            toast_rx,
            toasts: VecDeque::new(),
            event_log: VecDeque::new(),
            last_error: None,
            return_url: return_url.cloned(),
        })
    }

    pub fn step(&self) -> WizardStep {
        self.wizard.state().step()
    }
}

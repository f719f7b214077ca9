//! The popup side of authorization: open a window at the backend-issued URL,
//! listen for its completion message and watch for the user closing it.
//! Each attempt runs as one task behind a [`HandshakeHandle`].

use crate::types::{AttemptId, OAuthHandshakeResult, WindowId, WindowMessage, WindowPayload};
use anyhow::Result;
use std::time::Duration;
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use url::{Origin, Url};

pub const POLL_INTERVAL: Duration = Duration::from_millis(500);
pub const POPUP_WIDTH: u32 = 600;
pub const POPUP_HEIGHT: u32 = 700;
const BUS_CAPACITY: usize = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PopupFeatures {
    pub width: u32,
    pub height: u32,
    pub left: u32,
    pub top: u32,
}

impl PopupFeatures {
    pub fn centered(width: u32, height: u32, screen_width: u32, screen_height: u32) -> Self {
        Self {
            width,
            height,
            left: screen_width.saturating_sub(width) / 2,
            top: screen_height.saturating_sub(height) / 2,
        }
    }

    pub fn to_feature_string(&self) -> String {
        format!(
            "width={},height={},left={},top={}",
            self.width, self.height, self.left, self.top
        )
    }
}

impl Default for PopupFeatures {
    fn default() -> Self {
        Self::centered(POPUP_WIDTH, POPUP_HEIGHT, 1440, 900)
    }
}

pub trait AuthWindow: Send {
    fn id(&self) -> WindowId;
    fn is_closed(&self) -> bool;
    /// Must tolerate being called on an already closed window.
    fn close(&mut self);
}

pub trait PopupOpener: Send + Sync + 'static {
    fn open(&self, url: &Url, features: &PopupFeatures) -> Result<Box<dyn AuthWindow>>;
}

/// The opener's cross-window message channel.
#[derive(Clone)]
pub struct MessageBus {
    tx: broadcast::Sender<WindowMessage>,
}

impl Default for MessageBus {
    fn default() -> Self {
        Self::new()
    }
}

impl MessageBus {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(BUS_CAPACITY);
        Self { tx }
    }

    /// Returns how many listeners saw the message.
    pub fn post(&self, message: WindowMessage) -> usize {
        self.tx.send(message).unwrap_or(0)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<WindowMessage> {
        self.tx.subscribe()
    }

    pub fn listener_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

#[derive(Debug, Clone, Default)]
pub struct OriginPolicy {
    allowed: Vec<Origin>,
}

impl OriginPolicy {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn allow(mut self, url: &Url) -> Self {
        let origin = url.origin();
        if origin.is_tuple() && !self.allowed.contains(&origin) {
            self.allowed.push(origin);
        }
        self
    }

    pub fn allows(&self, origin: &str) -> bool {
        Url::parse(origin)
            .map(|u| self.allowed.contains(&u.origin()))
            .unwrap_or(false)
    }

    /// Returns the handshake result if the message is a completion event
    /// from a trusted origin that does not name some other window. When the
    /// attempt carries a `state` token the message must echo it.
    pub fn accept(
        &self,
        message: &WindowMessage,
        window: WindowId,
        state: Option<&str>,
    ) -> Option<OAuthHandshakeResult> {
        if !self.allows(&message.origin) {
            debug!("Ignoring window message from untrusted origin {}", message.origin);
            return None;
        }
        if message.source.is_some_and(|source| source != window) {
            debug!("Ignoring window message from another window");
            return None;
        }
        if let Some(expected) = state {
            if message.data.get("state").and_then(|v| v.as_str()) != Some(expected) {
                debug!("Ignoring window message without the attempt's state");
                return None;
            }
        }
        match WindowPayload::parse(&message.data)? {
            WindowPayload::OAuthComplete(result) => Some(result),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HandshakeOutcome {
    Completed(OAuthHandshakeResult),
    /// The popup went away before reporting back.
    PopupClosed,
}

/// One live authorization attempt. Cancelling (or dropping) the handle
/// tears down the listener, the poll timer and the popup.
pub struct HandshakeHandle {
    attempt: AttemptId,
    token: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl HandshakeHandle {
    pub fn attempt(&self) -> AttemptId {
        self.attempt
    }

    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    pub fn is_finished(&self) -> bool {
        self.task.as_ref().map_or(true, JoinHandle::is_finished)
    }

    /// Cancels and waits until teardown has run.
    pub async fn shutdown(mut self) {
        self.cancel();
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
    }
}

impl Drop for HandshakeHandle {
    fn drop(&mut self) {
        self.token.cancel();
    }
}

pub struct Authorizer<O> {
    opener: O,
    bus: MessageBus,
    policy: OriginPolicy,
    features: PopupFeatures,
    poll_interval: Duration,
}

impl<O: PopupOpener> Authorizer<O> {
    pub fn new(opener: O, bus: MessageBus, policy: OriginPolicy) -> Self {
        Self {
            opener,
            bus,
            policy,
            features: PopupFeatures::default(),
            poll_interval: POLL_INTERVAL,
        }
    }

    pub fn with_features(mut self, features: PopupFeatures) -> Self {
        self.features = features;
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn bus(&self) -> &MessageBus {
        &self.bus
    }

    /// Opens the popup and starts watching it. `on_finish` runs once with the
    /// first terminal event and never runs if the attempt is cancelled.
    pub fn start<F>(
        &self,
        attempt: AttemptId,
        url: &Url,
        state: Option<String>,
        on_finish: F,
    ) -> Result<HandshakeHandle>
    where
        F: FnOnce(HandshakeOutcome) + Send + 'static,
    {
        let mut listener = self.bus.subscribe();
        let mut window = self.opener.open(url, &self.features)?;
        let window_id = window.id();
        info!("Authorization {} opened popup {:?}", attempt, window_id);

        let token = CancellationToken::new();
        let cancelled = token.clone();
        let policy = self.policy.clone();
        let poll_interval = self.poll_interval;

        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(poll_interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            let mut listening = true;

            let outcome = loop {
                tokio::select! {
                    biased;
                    _ = cancelled.cancelled() => break None,
                    received = listener.recv(), if listening => match received {
                        Ok(message) => {
                            if let Some(result) = policy.accept(&message, window_id, state.as_deref()) {
                                break Some(HandshakeOutcome::Completed(result));
                            }
                        }
                        Err(RecvError::Lagged(skipped)) => {
                            warn!("Authorization {} missed {} window messages", attempt, skipped);
                        }
                        Err(RecvError::Closed) => {
                            warn!("Message channel closed during authorization {}", attempt);
                            listening = false;
                        }
                    },
                    _ = ticker.tick() => {
                        if window.is_closed() {
                            break Some(HandshakeOutcome::PopupClosed);
                        }
                    }
                }
            };

            drop(listener);
            window.close();

            match outcome {
                Some(outcome) => {
                    debug!("Authorization {} finished: {:?}", attempt, outcome);
                    on_finish(outcome);
                }
                None => debug!("Authorization {} cancelled", attempt),
            }
        });

        Ok(HandshakeHandle {
            attempt,
            token,
            task: Some(task),
        })
    }
}

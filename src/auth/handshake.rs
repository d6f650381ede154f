//! Popup login handshake.
//!
//! Opens the auth endpoint in a popup and races three signals: the popup
//! posting a credential back, the user closing the popup, and a timeout. Each
//! call owns a fresh `Handshake` state object; the signal sources only hold
//! weak references to it, and the first one to settle it retires the others.

use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;

use bon::Builder;
use reqwest::Url;
use strum::{Display, EnumString};
use tokio::sync::oneshot;
use tokio::time::{Instant, MissedTickBehavior};
use uuid::Uuid;

use super::error::HandshakeError;
use super::message::{MessageListener, MessageSource, Subscription, WindowMessage};
use super::popup::{PopupGeometry, PopupOpener, PopupWindow};
use super::token::Credential;

pub const DEFAULT_PROVIDER_PATH: &str = "hack_club";
pub const DEFAULT_WINDOW_NAME: &str = "hca_auth";
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(500);
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5 * 60);
/// Floor for [`PopupAuthConfig::poll_interval`]; tokio intervals cannot be zero.
pub const MIN_POLL_INTERVAL: Duration = Duration::from_millis(1);

/// Payload field carrying the per-handshake nonce.
pub const NONCE_FIELD: &str = "nonce";

/// How strictly incoming credentials must echo the handshake nonce.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Display, EnumString)]
#[strum(serialize_all = "snake_case")]
pub enum Correlation {
    /// The payload must carry the nonce of this handshake.
    #[default]
    Required,
    /// A payload without a nonce is accepted; a different nonce is not.
    IfPresent,
}

/// Tunables for [`PopupAuth`].
#[derive(Debug, Clone, Builder)]
pub struct PopupAuthConfig {
    #[builder(into, default = DEFAULT_PROVIDER_PATH.to_string())]
    pub provider_path: String,
    #[builder(into, default = DEFAULT_WINDOW_NAME.to_string())]
    pub window_name: String,
    /// How often the popup is checked for closure; raised to
    /// [`MIN_POLL_INTERVAL`] when smaller.
    #[builder(default = DEFAULT_POLL_INTERVAL)]
    pub poll_interval: Duration,
    #[builder(default = DEFAULT_TIMEOUT)]
    pub timeout: Duration,
    #[builder(default)]
    pub correlation: Correlation,
}

impl Default for PopupAuthConfig {
    fn default() -> Self {
        Self::builder().build()
    }
}

/// Lifecycle of one handshake.
#[derive(Debug, Clone, PartialEq, Eq)]
enum HandshakeState {
    Pending,
    Resolved,
    Rejected(HandshakeError),
}

enum Signal {
    Message(Credential),
    PopupClosed,
    TimedOut(Duration),
    Abandoned,
}

type Reply = oneshot::Sender<Result<Credential, HandshakeError>>;

/// Resolution context of a single in-flight handshake.
struct Handshake {
    nonce: Uuid,
    popup: Box<dyn PopupWindow>,
    inner: Mutex<Inner>,
}

struct Inner {
    state: HandshakeState,
    disposers: Vec<Subscription>,
    reply: Option<Reply>,
}

impl Handshake {
    fn new(nonce: Uuid, popup: Box<dyn PopupWindow>, reply: Reply) -> Self {
        Self {
            nonce,
            popup,
            inner: Mutex::new(Inner {
                state: HandshakeState::Pending,
                disposers: Vec::new(),
                reply: Some(reply),
            }),
        }
    }

    fn inner(&self) -> std::sync::MutexGuard<'_, Inner> {
        self.inner
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn state(&self) -> HandshakeState {
        self.inner().state.clone()
    }

    fn is_pending(&self) -> bool {
        self.inner().state == HandshakeState::Pending
    }

    /// Keep `subscription` until settlement. Disposed right away if the
    /// handshake already settled.
    fn retain(&self, subscription: Subscription) {
        let mut inner = self.inner();
        if inner.state == HandshakeState::Pending {
            inner.disposers.push(subscription);
        } else {
            drop(inner);
            subscription.dispose();
        }
    }

    /// Move to a terminal state. Only the first call has any effect.
    fn settle(&self, signal: Signal) -> bool {
        let (disposers, reply, outcome, close_popup) = {
            let mut inner = self.inner();
            if inner.state != HandshakeState::Pending {
                return false;
            }
            let (state, outcome, close_popup) = match signal {
                Signal::Message(credential) => (HandshakeState::Resolved, Ok(credential), true),
                Signal::PopupClosed => {
                    let err = HandshakeError::PopupClosed;
                    (HandshakeState::Rejected(err.clone()), Err(err), false)
                }
                Signal::TimedOut(after) => {
                    let err = HandshakeError::Timeout(after);
                    (HandshakeState::Rejected(err.clone()), Err(err), true)
                }
                Signal::Abandoned => {
                    let err = HandshakeError::Cancelled;
                    (HandshakeState::Rejected(err.clone()), Err(err), true)
                }
            };
            tracing::debug!(handshake = %self.nonce, state = ?state, "handshake settled");
            inner.state = state;
            (
                std::mem::take(&mut inner.disposers),
                inner.reply.take(),
                outcome,
                close_popup,
            )
        };

        for disposer in disposers {
            disposer.dispose();
        }
        if close_popup {
            if let Err(err) = self.popup.close() {
                tracing::debug!(handshake = %self.nonce, error = %err, "ignoring popup close failure");
            }
        }
        if let Some(reply) = reply {
            let _ = reply.send(outcome);
        }
        true
    }
}

impl std::fmt::Debug for Handshake {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Handshake")
            .field("nonce", &self.nonce)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

/// Settles the handshake as cancelled if the awaiting future goes away first.
struct AbandonOnDrop(Arc<Handshake>);

impl Drop for AbandonOnDrop {
    fn drop(&mut self) {
        if self.0.settle(Signal::Abandoned) {
            tracing::debug!(handshake = %self.0.nonce, "handshake abandoned by caller");
        }
    }
}

/// Decides whether a window message is this handshake's credential.
#[derive(Debug, Clone)]
struct MessageMatcher {
    origin: String,
    nonce: String,
    correlation: Correlation,
}

impl MessageMatcher {
    fn accept(&self, message: &WindowMessage) -> Option<Credential> {
        if message.origin.trim_end_matches('/') != self.origin {
            return None;
        }
        let credential = Credential::from_payload(&message.data)?;
        let echoed = credential.extra.get(NONCE_FIELD);
        let correlated = match (echoed, self.correlation) {
            (Some(value), _) => value.as_str() == Some(self.nonce.as_str()),
            (None, Correlation::IfPresent) => true,
            (None, Correlation::Required) => false,
        };
        correlated.then_some(credential)
    }
}

/// Popup login against `{base_url}/auth/{provider_path}`.
///
/// # Example
/// ```no_run
/// use std::sync::Arc;
/// use popauth::auth::{MessageBus, PopupAuth, PopupOpener};
///
/// # async fn example(opener: Arc<dyn PopupOpener>) -> Result<(), Box<dyn std::error::Error>> {
/// let messages = MessageBus::new();
/// let auth = PopupAuth::new("https://api.example.com", opener, Arc::new(messages))?;
/// let credential = auth.begin().await?;
/// println!("signed in ({} byte token)", credential.access_token.len());
/// # Ok(())
/// # }
/// ```
pub struct PopupAuth {
    base_url: Url,
    origin: String,
    opener: Arc<dyn PopupOpener>,
    messages: Arc<dyn MessageSource>,
    config: PopupAuthConfig,
}

impl PopupAuth {
    pub fn new(
        base_url: &str,
        opener: Arc<dyn PopupOpener>,
        messages: Arc<dyn MessageSource>,
    ) -> Result<Self, HandshakeError> {
        let trimmed = base_url.trim().trim_end_matches('/');
        let base_url = Url::parse(trimmed)
            .map_err(|err| HandshakeError::InvalidUrl(format!("{trimmed}: {err}")))?;
        if base_url.cannot_be_a_base() {
            return Err(HandshakeError::InvalidUrl(trimmed.to_string()));
        }
        let origin = base_url.origin().ascii_serialization();
        Ok(Self {
            base_url,
            origin,
            opener,
            messages,
            config: PopupAuthConfig::default(),
        })
    }

    pub fn with_config(mut self, config: PopupAuthConfig) -> Self {
        self.config = config;
        self
    }

    pub fn config(&self) -> &PopupAuthConfig {
        &self.config
    }

    /// Origin the credential message must come from.
    pub fn origin(&self) -> &str {
        &self.origin
    }

    /// Popup target for a handshake with the given nonce.
    pub fn auth_url(&self, nonce: &Uuid) -> String {
        let mut url = self.base_url.clone();
        if let Ok(mut segments) = url.path_segments_mut() {
            segments
                .pop_if_empty()
                .push("auth")
                .push(&self.config.provider_path);
        }
        url.query_pairs_mut()
            .append_pair(NONCE_FIELD, &nonce.to_string());
        url.to_string()
    }

    /// Run one handshake to completion.
    ///
    /// Dropping the returned future before it completes cancels the handshake
    /// and closes the popup.
    pub async fn begin(&self) -> Result<Credential, HandshakeError> {
        let nonce = Uuid::new_v4();
        let url = self.auth_url(&nonce);
        let geometry = PopupGeometry::centered_on(self.opener.owner_rect());

        let Some(popup) = self
            .opener
            .open(&url, &self.config.window_name, geometry)
        else {
            tracing::warn!(handshake = %nonce, "auth popup blocked");
            return Err(HandshakeError::PopupBlocked);
        };
        tracing::debug!(handshake = %nonce, url = %url, "auth popup opened");

        let (reply, outcome) = oneshot::channel();
        let handshake = Arc::new(Handshake::new(nonce, popup, reply));
        let guard = AbandonOnDrop(handshake.clone());

        handshake.retain(self.listen(&handshake));
        handshake.retain(self.watch_closed(&handshake));
        handshake.retain(self.arm_timeout(&handshake));

        let result = outcome.await.unwrap_or(Err(HandshakeError::Cancelled));
        drop(guard);
        result
    }

    fn listen(&self, handshake: &Arc<Handshake>) -> Subscription {
        let matcher = MessageMatcher {
            origin: self.origin.clone(),
            nonce: handshake.nonce.to_string(),
            correlation: self.config.correlation,
        };
        let weak: Weak<Handshake> = Arc::downgrade(handshake);
        let listener: MessageListener = Arc::new(move |message: &WindowMessage| {
            let Some(credential) = matcher.accept(message) else {
                tracing::trace!(origin = %message.origin, "ignoring window message");
                return;
            };
            if let Some(handshake) = weak.upgrade() {
                handshake.settle(Signal::Message(credential));
            }
        });
        self.messages.subscribe(listener)
    }

    fn watch_closed(&self, handshake: &Arc<Handshake>) -> Subscription {
        let every = self.config.poll_interval.max(MIN_POLL_INTERVAL);
        let weak = Arc::downgrade(handshake);
        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(Instant::now() + every, every);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                let Some(handshake) = weak.upgrade() else {
                    break;
                };
                if !handshake.is_pending() {
                    break;
                }
                if handshake.popup.is_closed() {
                    tracing::debug!(handshake = %handshake.nonce, "auth popup closed by user");
                    handshake.settle(Signal::PopupClosed);
                    break;
                }
            }
        });
        Subscription::from_task(task.abort_handle())
    }

    fn arm_timeout(&self, handshake: &Arc<Handshake>) -> Subscription {
        let after = self.config.timeout;
        let weak = Arc::downgrade(handshake);
        let task = tokio::spawn(async move {
            tokio::time::sleep(after).await;
            if let Some(handshake) = weak.upgrade() {
                if handshake.settle(Signal::TimedOut(after)) {
                    tracing::warn!(handshake = %handshake.nonce, "auth popup timed out");
                }
            }
        });
        Subscription::from_task(task.abort_handle())
    }
}

impl std::fmt::Debug for PopupAuth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PopupAuth")
            .field("base_url", &self.base_url.as_str())
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

/// One-shot form of [`PopupAuth::begin`] with default settings.
pub async fn begin_popup_auth(
    base_url: &str,
    opener: Arc<dyn PopupOpener>,
    messages: Arc<dyn MessageSource>,
) -> Result<Credential, HandshakeError> {
    PopupAuth::new(base_url, opener, messages)?.begin().await
}

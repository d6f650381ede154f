#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use popauth::auth::{
    CloseError, Credential, CredentialSource, HandshakeError, MessageBus, PopupGeometry,
    PopupOpener, PopupWindow, ScreenRect, WindowMessage,
};
use serde_json::json;

pub const AUTH_BASE: &str = "https://api.example.com";

#[derive(Default)]
struct PopupFlags {
    closed: AtomicBool,
    fail_close: AtomicBool,
    close_calls: AtomicUsize,
    released: AtomicBool,
}

/// Popup whose closed flag the test controls.
#[derive(Clone, Default)]
pub struct FakePopup {
    flags: Arc<PopupFlags>,
}

impl FakePopup {
    /// Simulate the user closing the window.
    pub fn user_close(&self) {
        self.flags.closed.store(true, Ordering::SeqCst);
    }

    pub fn fail_close(&self) {
        self.flags.fail_close.store(true, Ordering::SeqCst);
    }

    pub fn close_calls(&self) -> usize {
        self.flags.close_calls.load(Ordering::SeqCst)
    }

    /// Whether the handle given to the handshake has been dropped.
    pub fn released(&self) -> bool {
        self.flags.released.load(Ordering::SeqCst)
    }
}

/// The handle the opener hands out; records when its owner lets go of it.
struct HeldPopup(FakePopup);

impl Drop for HeldPopup {
    fn drop(&mut self) {
        self.0.flags.released.store(true, Ordering::SeqCst);
    }
}

impl PopupWindow for HeldPopup {
    fn is_closed(&self) -> bool {
        self.0.is_closed()
    }

    fn close(&self) -> Result<(), CloseError> {
        self.0.close()
    }
}

impl PopupWindow for FakePopup {
    fn is_closed(&self) -> bool {
        self.flags.closed.load(Ordering::SeqCst)
    }

    fn close(&self) -> Result<(), CloseError> {
        self.flags.close_calls.fetch_add(1, Ordering::SeqCst);
        if self.flags.fail_close.load(Ordering::SeqCst) {
            return Err(CloseError("cross-origin window".to_string()));
        }
        self.flags.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}

#[derive(Clone)]
pub struct OpenedPopup {
    pub url: String,
    pub window_name: String,
    pub geometry: PopupGeometry,
    pub popup: FakePopup,
}

impl OpenedPopup {
    /// Nonce query parameter of the popup URL.
    pub fn nonce(&self) -> String {
        let url = reqwest::Url::parse(&self.url).expect("popup url");
        url.query_pairs()
            .find(|(k, _)| k == "nonce")
            .map(|(_, v)| v.into_owned())
            .expect("nonce in popup url")
    }
}

pub struct FakeOpener {
    rect: ScreenRect,
    blocked: bool,
    opened: Mutex<Vec<OpenedPopup>>,
}

impl FakeOpener {
    pub fn new() -> Self {
        Self {
            rect: ScreenRect {
                x: 100.0,
                y: 50.0,
                outer_width: 1300.0,
                outer_height: 900.0,
            },
            blocked: false,
            opened: Mutex::new(Vec::new()),
        }
    }

    pub fn blocking() -> Self {
        Self {
            blocked: true,
            ..Self::new()
        }
    }

    pub fn opened(&self) -> Vec<OpenedPopup> {
        self.opened.lock().expect("opener lock").clone()
    }

    pub fn last(&self) -> OpenedPopup {
        self.opened().last().cloned().expect("a popup was opened")
    }
}

impl PopupOpener for FakeOpener {
    fn owner_rect(&self) -> ScreenRect {
        self.rect
    }

    fn open(
        &self,
        url: &str,
        window_name: &str,
        geometry: PopupGeometry,
    ) -> Option<Box<dyn PopupWindow>> {
        if self.blocked {
            return None;
        }
        let popup = FakePopup::default();
        self.opened.lock().expect("opener lock").push(OpenedPopup {
            url: url.to_string(),
            window_name: window_name.to_string(),
            geometry,
            popup: popup.clone(),
        });
        Some(Box::new(HeldPopup(popup)))
    }
}

/// Yield until `count` popups are open and listening on `bus`.
pub async fn wait_for_popups(opener: &FakeOpener, bus: &MessageBus, count: usize) {
    while opener.opened().len() < count || bus.listener_count() < count {
        tokio::task::yield_now().await;
    }
}

/// Yield until only the test's own task is left on the runtime.
pub async fn settle_runtime() -> usize {
    let metrics = tokio::runtime::Handle::current().metrics();
    for _ in 0..1000 {
        if metrics.num_alive_tasks() == 0 {
            break;
        }
        tokio::task::yield_now().await;
    }
    metrics.num_alive_tasks()
}

/// Message the callback page posts after a successful login.
pub fn credential_message(nonce: &str, access: &str, refresh: &str) -> WindowMessage {
    WindowMessage::new(
        AUTH_BASE,
        json!({ "jwt": access, "refresh_token": refresh, "nonce": nonce }),
    )
}

/// Credential source returning a canned outcome.
pub struct StaticSource {
    outcome: Result<Credential, HandshakeError>,
    calls: AtomicUsize,
}

impl StaticSource {
    pub fn ok(access: &str, refresh: &str) -> Self {
        Self {
            outcome: Ok(Credential::new(access, refresh)),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn failing(error: HandshakeError) -> Self {
        Self {
            outcome: Err(error),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CredentialSource for StaticSource {
    async fn obtain(&self) -> Result<Credential, HandshakeError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.outcome.clone()
    }
}

mod auth_support;

use std::sync::Arc;
use std::time::Duration;

use popauth::auth::{
    begin_popup_auth, Correlation, HandshakeError, MessageBus, PopupAuth, PopupAuthConfig,
    WindowMessage,
};
use pretty_assertions::assert_eq;
use serde_json::json;

use auth_support::{
    credential_message, settle_runtime, wait_for_popups, FakeOpener, AUTH_BASE,
};

fn popup_auth(opener: &Arc<FakeOpener>, bus: &MessageBus) -> PopupAuth {
    PopupAuth::new(AUTH_BASE, opener.clone(), Arc::new(bus.clone())).expect("valid base url")
}

#[tokio::test(start_paused = true)]
async fn credential_message_resolves_and_cleans_up() {
    let bus = MessageBus::new();
    let opener = Arc::new(FakeOpener::new());
    let auth = popup_auth(&opener, &bus);
    let task = tokio::spawn(async move { auth.begin().await });

    wait_for_popups(&opener, &bus, 1).await;
    let opened = opener.last();
    bus.post(credential_message(&opened.nonce(), "A", "B"));

    let credential = task.await.unwrap().expect("handshake succeeds");
    assert_eq!(credential.access_token, "A");
    assert_eq!(credential.refresh_token, "B");
    assert_eq!(bus.listener_count(), 0);
    assert_eq!(opened.popup.close_calls(), 1);

    // The handshake state is freed and the poll and timeout tasks are gone.
    assert!(opened.popup.released());
    assert_eq!(settle_runtime().await, 0);
    tokio::time::sleep(Duration::from_secs(600)).await;
    assert_eq!(opened.popup.close_calls(), 1);
}

#[tokio::test(start_paused = true)]
async fn user_close_also_stops_timer_and_frees_state() {
    let bus = MessageBus::new();
    let opener = Arc::new(FakeOpener::new());
    let auth = popup_auth(&opener, &bus);
    let task = tokio::spawn(async move { auth.begin().await });

    wait_for_popups(&opener, &bus, 1).await;
    let opened = opener.last();
    opened.popup.user_close();

    assert_eq!(task.await.unwrap().unwrap_err(), HandshakeError::PopupClosed);
    assert!(opened.popup.released());
    assert_eq!(settle_runtime().await, 0);
}

async fn resolve_with_payload(
    payload: serde_json::Value,
) -> Result<popauth::auth::Credential, HandshakeError> {
    let bus = MessageBus::new();
    let opener = Arc::new(FakeOpener::new());
    let auth = popup_auth(&opener, &bus);
    let task = tokio::spawn(async move { auth.begin().await });

    wait_for_popups(&opener, &bus, 1).await;
    let mut payload = payload;
    payload["nonce"] = json!(opener.last().nonce());
    bus.post(WindowMessage::new(AUTH_BASE, payload));
    assert_eq!(bus.listener_count(), 0, "a truthy jwt settles immediately");
    task.await.unwrap()
}

#[tokio::test(start_paused = true)]
async fn null_refresh_token_still_resolves() {
    let credential = resolve_with_payload(json!({ "jwt": "A", "refresh_token": null }))
        .await
        .unwrap();
    assert_eq!(credential.access_token, "A");
    assert_eq!(credential.refresh_token, "");
}

#[tokio::test(start_paused = true)]
async fn non_string_refresh_token_still_resolves() {
    let credential = resolve_with_payload(json!({ "jwt": "A", "refresh_token": { "v": 1 } }))
        .await
        .unwrap();
    assert_eq!(credential.refresh_token, "");
}

#[tokio::test(start_paused = true)]
async fn both_refresh_spellings_still_resolve() {
    let credential = resolve_with_payload(json!({
        "jwt": "A",
        "refresh_token": "snake",
        "refreshToken": "camel"
    }))
    .await
    .unwrap();
    assert_eq!(credential.refresh_token, "snake");
}

#[tokio::test(start_paused = true)]
async fn camel_case_refresh_token_resolves() {
    let credential = resolve_with_payload(json!({ "jwt": "A", "refreshToken": "camel" }))
        .await
        .unwrap();
    assert_eq!(credential.refresh_token, "camel");
}

#[tokio::test(start_paused = true)]
async fn zero_poll_interval_still_detects_user_close() {
    let bus = MessageBus::new();
    let opener = Arc::new(FakeOpener::new());
    let auth = popup_auth(&opener, &bus).with_config(
        PopupAuthConfig::builder()
            .poll_interval(Duration::ZERO)
            .build(),
    );
    let started = tokio::time::Instant::now();
    let task = tokio::spawn(async move { auth.begin().await });

    wait_for_popups(&opener, &bus, 1).await;
    opener.last().popup.user_close();

    assert_eq!(task.await.unwrap().unwrap_err(), HandshakeError::PopupClosed);
    assert!(started.elapsed() < Duration::from_secs(1));
}

#[tokio::test(start_paused = true)]
async fn popup_opens_centered_with_nonce_url() {
    let bus = MessageBus::new();
    let opener = Arc::new(FakeOpener::new());
    let auth = popup_auth(&opener, &bus);
    let task = tokio::spawn(async move { auth.begin().await });

    wait_for_popups(&opener, &bus, 1).await;
    let opened = opener.last();
    assert!(opened
        .url
        .starts_with("https://api.example.com/auth/hack_club?nonce="));
    assert_eq!(opened.window_name, "hca_auth");
    assert_eq!(
        opened.geometry.features(),
        "width=500,height=700,left=500,top=150"
    );

    opened.popup.user_close();
    let _ = task.await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn blocked_popup_fails_without_listening() {
    let bus = MessageBus::new();
    let opener = Arc::new(FakeOpener::blocking());
    let result = begin_popup_auth(AUTH_BASE, opener.clone(), Arc::new(bus.clone())).await;

    assert_eq!(result.unwrap_err(), HandshakeError::PopupBlocked);
    assert_eq!(bus.listener_count(), 0);
    assert!(opener.opened().is_empty());
}

#[tokio::test(start_paused = true)]
async fn user_closing_popup_rejects_with_popup_closed() {
    let bus = MessageBus::new();
    let opener = Arc::new(FakeOpener::new());
    let auth = popup_auth(&opener, &bus);
    let task = tokio::spawn(async move { auth.begin().await });

    wait_for_popups(&opener, &bus, 1).await;
    let opened = opener.last();
    opened.popup.user_close();

    let err = task.await.unwrap().unwrap_err();
    assert_eq!(err, HandshakeError::PopupClosed);
    assert_eq!(bus.listener_count(), 0);
    // The user already closed it; no forced close on this path.
    assert_eq!(opened.popup.close_calls(), 0);

    // A credential arriving afterwards changes nothing.
    bus.post(credential_message(&opened.nonce(), "late", "late"));
    assert_eq!(bus.listener_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn message_after_close_but_before_poll_tick_wins() {
    let bus = MessageBus::new();
    let opener = Arc::new(FakeOpener::new());
    let auth = popup_auth(&opener, &bus);
    let task = tokio::spawn(async move { auth.begin().await });

    wait_for_popups(&opener, &bus, 1).await;
    let opened = opener.last();
    opened.popup.user_close();
    bus.post(credential_message(&opened.nonce(), "A", "B"));

    tokio::time::sleep(Duration::from_secs(2)).await;
    let credential = task.await.unwrap().expect("message settles first");
    assert_eq!(credential.access_token, "A");
}

#[tokio::test(start_paused = true)]
async fn no_signal_times_out_and_force_closes_popup() {
    let bus = MessageBus::new();
    let opener = Arc::new(FakeOpener::new());
    let auth = popup_auth(&opener, &bus);
    let started = tokio::time::Instant::now();
    let task = tokio::spawn(async move { auth.begin().await });

    wait_for_popups(&opener, &bus, 1).await;
    let opened = opener.last();

    let err = task.await.unwrap().unwrap_err();
    assert_eq!(err, HandshakeError::Timeout(Duration::from_secs(300)));
    assert!(started.elapsed() >= Duration::from_secs(300));
    assert_eq!(opened.popup.close_calls(), 1);
    assert_eq!(bus.listener_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn custom_timeout_is_honored() {
    let bus = MessageBus::new();
    let opener = Arc::new(FakeOpener::new());
    let auth = popup_auth(&opener, &bus).with_config(
        PopupAuthConfig::builder()
            .timeout(Duration::from_secs(3))
            .build(),
    );
    let task = tokio::spawn(async move { auth.begin().await });

    let err = task.await.unwrap().unwrap_err();
    assert_eq!(err, HandshakeError::Timeout(Duration::from_secs(3)));
}

#[tokio::test(start_paused = true)]
async fn unrelated_messages_are_ignored() {
    let bus = MessageBus::new();
    let opener = Arc::new(FakeOpener::new());
    let auth = popup_auth(&opener, &bus);
    let task = tokio::spawn(async move { auth.begin().await });

    wait_for_popups(&opener, &bus, 1).await;
    let nonce = opener.last().nonce();

    bus.post(WindowMessage::new(AUTH_BASE, json!({ "type": "ready" })));
    bus.post(WindowMessage::new(AUTH_BASE, json!({ "jwt": "", "nonce": nonce })));
    bus.post(WindowMessage::new(
        "https://evil.example.com",
        json!({ "jwt": "stolen", "nonce": nonce }),
    ));
    bus.post(credential_message("some-other-nonce", "wrong", "wrong"));
    assert_eq!(bus.listener_count(), 1);

    bus.post(credential_message(&nonce, "right", "rt"));
    let credential = task.await.unwrap().unwrap();
    assert_eq!(credential.access_token, "right");
}

#[tokio::test(start_paused = true)]
async fn concurrent_handshakes_only_accept_their_own_nonce() {
    let bus = MessageBus::new();
    let opener = Arc::new(FakeOpener::new());
    let first = popup_auth(&opener, &bus);
    let second = popup_auth(&opener, &bus);
    let first_task = tokio::spawn(async move { first.begin().await });
    wait_for_popups(&opener, &bus, 1).await;
    let second_task = tokio::spawn(async move { second.begin().await });
    wait_for_popups(&opener, &bus, 2).await;

    let opened = opener.opened();
    bus.post(credential_message(&opened[1].nonce(), "second", "r2"));
    assert_eq!(bus.listener_count(), 1);
    assert!(!first_task.is_finished());

    bus.post(credential_message(&opened[0].nonce(), "first", "r1"));
    assert_eq!(first_task.await.unwrap().unwrap().access_token, "first");
    assert_eq!(second_task.await.unwrap().unwrap().access_token, "second");
}

#[tokio::test(start_paused = true)]
async fn lenient_correlation_accepts_payload_without_nonce() {
    let bus = MessageBus::new();
    let opener = Arc::new(FakeOpener::new());
    let auth = popup_auth(&opener, &bus).with_config(
        PopupAuthConfig::builder()
            .correlation(Correlation::IfPresent)
            .build(),
    );
    let task = tokio::spawn(async move { auth.begin().await });

    wait_for_popups(&opener, &bus, 1).await;
    bus.post(WindowMessage::new(
        AUTH_BASE,
        json!({ "jwt": "A", "refresh_token": "B" }),
    ));
    assert_eq!(task.await.unwrap().unwrap().refresh_token, "B");
}

#[tokio::test(start_paused = true)]
async fn popup_close_failure_is_swallowed() {
    let bus = MessageBus::new();
    let opener = Arc::new(FakeOpener::new());
    let auth = popup_auth(&opener, &bus);
    let task = tokio::spawn(async move { auth.begin().await });

    wait_for_popups(&opener, &bus, 1).await;
    let opened = opener.last();
    opened.popup.fail_close();
    bus.post(credential_message(&opened.nonce(), "A", "B"));

    assert!(task.await.unwrap().is_ok());
    assert_eq!(opened.popup.close_calls(), 1);
}

#[tokio::test(start_paused = true)]
async fn dropping_the_handshake_closes_popup_and_unsubscribes() {
    let bus = MessageBus::new();
    let opener = Arc::new(FakeOpener::new());
    let auth = popup_auth(&opener, &bus);
    let task = tokio::spawn(async move { auth.begin().await });

    wait_for_popups(&opener, &bus, 1).await;
    let opened = opener.last();
    task.abort();
    assert!(task.await.unwrap_err().is_cancelled());

    assert_eq!(opened.popup.close_calls(), 1);
    assert_eq!(bus.listener_count(), 0);
}

#[test]
fn invalid_base_url_is_rejected() {
    let bus = MessageBus::new();
    let opener = Arc::new(FakeOpener::new());
    let err = PopupAuth::new("not a url", opener, Arc::new(bus)).unwrap_err();
    assert!(matches!(err, HandshakeError::InvalidUrl(_)));
}

#[test]
fn auth_url_keeps_base_path_and_provider() {
    let bus = MessageBus::new();
    let opener = Arc::new(FakeOpener::new());
    let auth = PopupAuth::new("http://localhost:8000/api/", opener, Arc::new(bus))
        .unwrap()
        .with_config(PopupAuthConfig::builder().provider_path("github").build());
    let nonce = uuid::Uuid::nil();
    assert_eq!(
        auth.auth_url(&nonce),
        "http://localhost:8000/api/auth/github?nonce=00000000-0000-0000-0000-000000000000"
    );
    assert_eq!(auth.origin(), "http://localhost:8000");
}

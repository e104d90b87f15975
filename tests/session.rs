//! End-to-end tests for a referrer session running against `FakePlatform`.
//!
//! These cover provider selection, the connect lifecycle, decode outcomes,
//! disconnect races, timeouts and teardown.

use std::sync::Arc;
use std::time::Duration;

use installreferrer::testing::{FakePlatform, FakeReply};
use installreferrer::{
    ConnectionState, OutcomeError, RawResponse, ReferrerConfig, ReferrerError, ReferrerRecord,
    SessionNotification,
};
use rstest::{fixture, rstest};
use tokio::sync::mpsc;
use tokio::time::timeout;

const PACKAGE: &str = "com.example.app";

#[fixture]
fn config() -> ReferrerConfig {
    let mut config = ReferrerConfig::new(PACKAGE);
    config.providers = vec!["store.a".into(), "store.b".into(), "store.c".into()];
    config
}

fn success_reply() -> RawResponse {
    RawResponse::new()
        .with("result_code", 0)
        .with("install_referrer", "utm_source=launch")
        .with("onestore_pid", "PID-1")
        .with("referrer_click_timestamp_seconds", 1_700_000_000)
        .with("install_begin_timestamp_seconds", 1_700_000_060)
}

fn platform_with(reply: FakeReply) -> Arc<FakePlatform> {
    Arc::new(FakePlatform::new().offer("store.b", 70000).reply(reply))
}

#[rstest]
#[tokio::test]
async fn fetch_decodes_record_from_first_offering_provider(config: ReferrerConfig) {
    let platform = Arc::new(
        FakePlatform::new()
            .offer("store.b", 70000)
            .offer("store.c", 70000)
            .reply(FakeReply::Respond(Some(success_reply()))),
    );
    let session = installreferrer::start(config, platform.clone()).await.unwrap();
    let client = session.client();

    let record = client.fetch().await.unwrap();
    assert_eq!(
        record,
        ReferrerRecord {
            install_referrer: "utm_source=launch".into(),
            onestore_pid: "PID-1".into(),
            referrer_click_timestamp_seconds: 1_700_000_000,
            install_begin_timestamp_seconds: 1_700_000_060,
        }
    );
    assert_eq!(platform.probes(), ["store.a", "store.b"]);
    assert_eq!(platform.requests(), [PACKAGE]);
    assert_eq!(client.connection_state().await.unwrap(), ConnectionState::Connected);

    session.shutdown().await.unwrap();
    assert_eq!(platform.disconnect_count(), 1);
}

#[rstest]
#[tokio::test]
async fn no_provider_means_no_connect(config: ReferrerConfig) {
    let platform = Arc::new(FakePlatform::new());
    let session = installreferrer::start(config, platform.clone()).await.unwrap();

    let err = session.client().fetch().await.unwrap_err();
    assert_eq!(err, ReferrerError::NoProviderFound { probed: 3 });
    assert_eq!(platform.connect_count(), 0);
    assert_eq!(
        session.client().connection_state().await.unwrap(),
        ConnectionState::Idle
    );
    session.shutdown().await.unwrap();
    assert_eq!(platform.disconnect_count(), 0);
}

#[rstest]
#[tokio::test]
async fn outdated_provider_is_rejected_before_connect(config: ReferrerConfig) {
    let platform = Arc::new(FakePlatform::new().offer_unversioned("store.a").offer("store.b", 70000));
    let err = installreferrer::fetch_install_referrer(config, platform.clone())
        .await
        .unwrap()
        .unwrap_err();
    assert_eq!(
        err,
        ReferrerError::IncompatibleProvider {
            provider: "store.a".into(),
            version: None,
            required: 60700,
        }
    );
    assert_eq!(platform.probes(), ["store.a"]);
    assert_eq!(platform.connect_count(), 0);
}

#[rstest]
#[tokio::test]
async fn refused_connect_is_surfaced(config: ReferrerConfig) {
    let platform = Arc::new(FakePlatform::new().offer("store.a", 70000).refuse_connections());
    let err = installreferrer::fetch_install_referrer(config, platform.clone())
        .await
        .unwrap()
        .unwrap_err();
    assert_eq!(err, ReferrerError::ConnectFailed("store.a".into()));
    assert!(platform.requests().is_empty());
}

#[rstest]
#[case(
    RawResponse::new().with("result_code", -3).with("description", "blocked"),
    OutcomeError::NotAllowed("blocked".into())
)]
#[case(
    RawResponse::new().with("result_code", -2),
    OutcomeError::ReferrerNotFound("NOT_FOUND_REFERRER".into())
)]
#[case(
    RawResponse::new(),
    OutcomeError::Unknown { code: -10, description: "resultCode is -10".into() }
)]
#[tokio::test]
async fn failure_codes_surface_as_outcomes(
    config: ReferrerConfig,
    #[case] reply: RawResponse,
    #[case] expected: OutcomeError,
) {
    let platform = platform_with(FakeReply::Respond(Some(reply)));
    let outcome = installreferrer::fetch_install_referrer(config, platform)
        .await
        .unwrap();
    assert_eq!(outcome, Err(ReferrerError::Outcome(expected)));
}

#[rstest]
#[tokio::test]
async fn empty_reply_is_no_response(config: ReferrerConfig) {
    let platform = platform_with(FakeReply::Respond(None));
    let outcome = installreferrer::fetch_install_referrer(config, platform)
        .await
        .unwrap();
    assert_eq!(outcome, Err(ReferrerError::NoResponse));
}

#[rstest]
#[tokio::test]
async fn transport_fault_is_not_swallowed(config: ReferrerConfig) {
    let platform = platform_with(FakeReply::Fault("remote aborted".into()));
    let outcome = installreferrer::fetch_install_referrer(config, platform.clone())
        .await
        .unwrap();
    assert_eq!(
        outcome,
        Err(ReferrerError::TransportFault("remote aborted".into()))
    );
    assert_eq!(platform.disconnect_count(), 1);
}

#[rstest]
#[tokio::test(start_paused = true)]
async fn unresponsive_provider_times_out(mut config: ReferrerConfig) {
    config.call_timeout_ms = 50;
    let platform = platform_with(FakeReply::Hang);
    let outcome = installreferrer::fetch_install_referrer(config, platform)
        .await
        .unwrap();
    assert_eq!(outcome, Err(ReferrerError::Timeout(50)));
}

#[rstest]
#[tokio::test]
async fn disconnect_during_call_loses_connection(config: ReferrerConfig) {
    let platform = platform_with(FakeReply::Hang);
    let session = installreferrer::start(config, platform.clone()).await.unwrap();
    let client = session.client();
    let pending = tokio::spawn(async move { client.fetch().await });

    platform.wait_for_request().await;
    assert!(platform.fire_disconnected());

    assert_eq!(pending.await.unwrap(), Err(ReferrerError::ConnectionLost));
    assert_eq!(
        session.client().connection_state().await.unwrap(),
        ConnectionState::Disconnected
    );
    session.shutdown().await.unwrap();
}

#[rstest]
#[tokio::test]
async fn shutdown_unbinds_after_provider_disconnect(config: ReferrerConfig) {
    let platform = platform_with(FakeReply::Hang);
    let session = installreferrer::start(config, platform.clone()).await.unwrap();
    let client = session.client();
    let pending = tokio::spawn(async move { client.fetch().await });

    platform.wait_for_request().await;
    platform.fire_disconnected();
    assert_eq!(pending.await.unwrap(), Err(ReferrerError::ConnectionLost));
    assert_eq!(platform.disconnect_count(), 0);

    session.shutdown().await.unwrap();
    assert_eq!(platform.connect_count(), 1);
    assert_eq!(platform.disconnect_count(), 1);
}

#[rstest]
#[tokio::test(start_paused = true)]
async fn late_reply_after_disconnect_is_discarded(config: ReferrerConfig) {
    let platform = platform_with(FakeReply::Delay(
        Duration::from_millis(100),
        Some(success_reply()),
    ));
    let session = installreferrer::start(config, platform.clone()).await.unwrap();
    let client = session.client();
    let pending = tokio::spawn({
        let client = client.clone();
        async move { client.fetch().await }
    });

    platform.wait_for_request().await;
    platform.fire_disconnected();
    assert_eq!(pending.await.unwrap(), Err(ReferrerError::ConnectionLost));

    tokio::time::sleep(Duration::from_millis(500)).await;
    assert_eq!(
        client.last_outcome().await.unwrap(),
        Some(Err(ReferrerError::ConnectionLost))
    );
    session.shutdown().await.unwrap();
}

#[rstest]
#[tokio::test]
async fn disconnect_before_connected_fails_pending_fetch(config: ReferrerConfig) {
    let platform = Arc::new(FakePlatform::new().offer("store.a", 70000).manual_connect());
    let session = installreferrer::start(config, platform.clone()).await.unwrap();
    let client = session.client();
    let pending = tokio::spawn(async move { client.fetch().await });

    while platform.connect_count() == 0 {
        tokio::task::yield_now().await;
    }
    assert_eq!(
        session.client().connection_state().await.unwrap(),
        ConnectionState::Connecting
    );
    platform.fire_disconnected();

    assert_eq!(pending.await.unwrap(), Err(ReferrerError::ConnectionLost));
    assert!(platform.requests().is_empty());
    session.shutdown().await.unwrap();
}

#[rstest]
#[tokio::test]
async fn second_fetch_reuses_outcome(config: ReferrerConfig) {
    let platform = platform_with(FakeReply::Respond(Some(success_reply())));
    let session = installreferrer::start(config, platform.clone()).await.unwrap();
    let client = session.client();

    let first = client.fetch().await;
    let second = client.fetch().await;
    assert!(first.is_ok());
    assert_eq!(first, second);
    assert_eq!(platform.requests().len(), 1);
    assert_eq!(platform.connect_count(), 1);
    session.shutdown().await.unwrap();
}

#[rstest]
#[tokio::test]
async fn concurrent_fetch_is_rejected(config: ReferrerConfig) {
    let platform = platform_with(FakeReply::Hang);
    let session = installreferrer::start(config, platform.clone()).await.unwrap();
    let client = session.client();
    let first = tokio::spawn({
        let client = client.clone();
        async move { client.fetch().await }
    });

    platform.wait_for_request().await;
    assert_eq!(client.fetch().await, Err(ReferrerError::RequestInFlight));

    session.shutdown().await.unwrap();
    assert_eq!(first.await.unwrap(), Err(ReferrerError::Cancelled));
}

#[rstest]
#[tokio::test]
async fn shutdown_releases_binding_and_cancels(config: ReferrerConfig) {
    let platform = platform_with(FakeReply::Hang);
    let session = installreferrer::start(config, platform.clone()).await.unwrap();
    let client = session.client();
    let pending = tokio::spawn({
        let client = client.clone();
        async move { client.fetch().await }
    });

    platform.wait_for_request().await;
    session.shutdown().await.unwrap();

    assert_eq!(pending.await.unwrap(), Err(ReferrerError::Cancelled));
    assert_eq!(platform.disconnect_count(), 1);
    assert!(client.fetch().await.is_err());
}

#[rstest]
#[tokio::test]
async fn shutdown_aborts_hung_call(config: ReferrerConfig) {
    let platform = platform_with(FakeReply::Hang);
    let session = installreferrer::start(config, platform.clone()).await.unwrap();
    let client = session.client();
    let pending = tokio::spawn(async move { client.fetch().await });

    platform.wait_for_request().await;
    assert_eq!(platform.in_flight_requests(), 1);
    session.shutdown().await.unwrap();
    assert_eq!(pending.await.unwrap(), Err(ReferrerError::Cancelled));

    timeout(Duration::from_secs(1), async {
        while platform.in_flight_requests() > 0 {
            tokio::task::yield_now().await;
        }
    })
    .await
    .expect("call task still running after shutdown");
}

#[rstest]
#[tokio::test]
async fn completed_is_delivered_through_a_full_channel(config: ReferrerConfig) {
    let platform = platform_with(FakeReply::Respond(Some(success_reply())));
    let (tx, mut rx) = mpsc::channel(1);
    let session = installreferrer::start_with_notifier(config, platform, tx)
        .await
        .unwrap();
    session.client().fetch().await.unwrap();

    let first = timeout(Duration::from_secs(1), rx.recv()).await.unwrap();
    assert!(matches!(first, Some(SessionNotification::Connected { .. })));
    let second = timeout(Duration::from_secs(1), rx.recv()).await.unwrap();
    match second {
        Some(SessionNotification::Completed { outcome }) => assert!(outcome.is_ok()),
        other => panic!("expected Completed, got {other:?}"),
    }
    session.shutdown().await.unwrap();
}

#[rstest]
#[tokio::test]
async fn notifications_follow_the_lifecycle(config: ReferrerConfig) {
    let platform = platform_with(FakeReply::Respond(Some(success_reply())));
    let (tx, mut rx) = mpsc::channel(8);
    let session = installreferrer::start_with_notifier(config, platform, tx)
        .await
        .unwrap();
    session.client().fetch().await.unwrap();

    match rx.recv().await {
        Some(SessionNotification::Connected { provider }) => assert_eq!(provider, "store.b"),
        other => panic!("expected Connected, got {other:?}"),
    }
    match rx.recv().await {
        Some(SessionNotification::Completed { outcome }) => assert!(outcome.is_ok()),
        other => panic!("expected Completed, got {other:?}"),
    }
    session.shutdown().await.unwrap();
}

#[rstest]
#[tokio::test]
async fn invalid_config_is_rejected_at_start(mut config: ReferrerConfig) {
    config.package_name = String::new();
    let result = installreferrer::start(config, Arc::new(FakePlatform::new())).await;
    assert!(result.is_err());
}

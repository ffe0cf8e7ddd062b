mod support;

use std::time::Duration;

use ordered_ws::core::{PushError, ReconnectPolicy, ReorderPolicy};
use ordered_ws::{Category, ConnectionState, PushConfig};
use support::{Recorder, WAIT, connect_open, fast_config, mock_client, send_seq};

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn reconnect_starts_a_fresh_sequence_epoch() {
    let (client, _transport, mut listener) = mock_client(fast_config());
    let recorder = Recorder::default();
    let _sub = client.subscribe(Category::UploadUpdate, recorder.handler());

    let mut first = connect_open(&client, &mut listener).await;
    send_seq(&first, Category::UploadUpdate, 500);
    recorder.wait_for_len(1, WAIT).await;
    assert_eq!(client.snapshot().epoch, 1);

    first.drop_socket();
    let second = listener
        .accept_timeout(WAIT)
        .await
        .expect("automatic reconnect");
    let snapshot = client
        .wait_for(WAIT, |s| s.is_connected() && s.epoch == 2)
        .await
        .expect("second epoch open");
    assert_eq!(snapshot.reconnect_attempts, 0);

    send_seq(&second, Category::UploadUpdate, 0);
    send_seq(&second, Category::UploadUpdate, 1);
    assert_eq!(
        recorder.wait_for_len(3, WAIT).await,
        vec![Some(500), Some(0), Some(1)]
    );

    let stats = client.stats().await.expect("stats");
    assert_eq!(stats.reconnects, 1);
    assert_eq!(stats.stale_dropped, 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn parked_envelopes_do_not_survive_a_reconnect() {
    let (client, _transport, mut listener) = mock_client(fast_config().with_reorder(
        ordered_ws::core::ReorderPolicy {
            buffer_timeout: Duration::from_secs(60),
            max_buffer_depth: 10,
            sweep_interval: Duration::from_millis(10),
        },
    ));
    let recorder = Recorder::default();
    let _sub = client.subscribe(Category::UploadUpdate, recorder.handler());

    let mut first = connect_open(&client, &mut listener).await;
    send_seq(&first, Category::UploadUpdate, 0);
    send_seq(&first, Category::UploadUpdate, 2);
    recorder.wait_for_len(1, WAIT).await;

    first.close(1001).expect("server close");
    let second = listener.accept_timeout(WAIT).await.expect("reconnect");
    client
        .wait_for(WAIT, |s| s.is_connected() && s.epoch == 2)
        .await
        .expect("second epoch open");

    send_seq(&second, Category::UploadUpdate, 7);
    assert_eq!(
        recorder.wait_for_len(2, WAIT).await,
        vec![Some(0), Some(7)]
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn read_errors_trigger_reconnect() {
    let (client, transport, mut listener) = mock_client(fast_config());
    let mut first = connect_open(&client, &mut listener).await;

    first.fail_read("connection reset").expect("inject read error");
    let _second = listener.accept_timeout(WAIT).await.expect("reconnect");
    client
        .wait_for(WAIT, |s| s.is_connected() && s.epoch == 2)
        .await
        .expect("second epoch open");
    assert_eq!(transport.connect_attempts(), 2);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn reconnect_gives_up_after_attempt_budget() {
    let config = fast_config().with_reconnect(ReconnectPolicy {
        base_delay: Duration::from_millis(5),
        max_attempts: 3,
    });
    let (client, transport, mut listener) = mock_client(config);
    transport.fail_next_connects(4);

    client.connect().await.expect("connect accepted");
    let snapshot = client
        .wait_for(WAIT, |s| s.reconnect_exhausted)
        .await
        .expect("exhaustion published");
    assert_eq!(snapshot.state, ConnectionState::Closed);
    assert_eq!(snapshot.reconnect_attempts, 3);
    assert_eq!(transport.connect_attempts(), 4);

    // No further automatic attempt.
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(transport.connect_attempts(), 4);
    assert!(listener.try_accept().is_none());

    // An explicit connect tries again and a success resets the budget.
    client.connect().await.expect("connect accepted");
    let _server = listener.accept_timeout(WAIT).await.expect("connection accepted");
    let snapshot = client
        .wait_for(WAIT, |s| s.is_connected())
        .await
        .expect("open");
    assert_eq!(snapshot.reconnect_attempts, 0);
    assert!(!snapshot.reconnect_exhausted);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn handshake_failures_back_off_and_then_connect() {
    let (client, transport, mut listener) = mock_client(fast_config());
    transport.fail_next_connects(2);

    client.connect().await.expect("connect accepted");
    let _server = listener
        .accept_timeout(WAIT)
        .await
        .expect("third attempt accepted");
    let snapshot = client
        .wait_for(WAIT, |s| s.is_connected())
        .await
        .expect("open");
    assert_eq!(snapshot.epoch, 1);
    assert_eq!(transport.connect_attempts(), 3);
    assert_eq!(transport.last_url().as_deref(), Some("ws://mock/api/ws/status"));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn disconnect_cancels_pending_back_off() {
    let config = fast_config().with_reconnect(ReconnectPolicy {
        base_delay: Duration::from_millis(200),
        max_attempts: 5,
    });
    let (client, transport, mut listener) = mock_client(config);
    let mut server = connect_open(&client, &mut listener).await;

    server.drop_socket();
    client
        .wait_for(WAIT, |s| s.state == ConnectionState::Closed && s.reconnect_attempts == 1)
        .await
        .expect("reconnect scheduled");

    client.disconnect().await.expect("disconnect");
    tokio::time::sleep(Duration::from_millis(400)).await;

    assert_eq!(transport.connect_attempts(), 1);
    assert!(listener.try_accept().is_none());
    assert_eq!(client.snapshot().state, ConnectionState::Closed);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn disconnect_halts_delivery_and_closes_socket() {
    let (client, _transport, mut listener) = mock_client(fast_config());
    let recorder = Recorder::default();
    let _sub = client.subscribe(Category::UploadUpdate, recorder.handler());

    let mut server = connect_open(&client, &mut listener).await;
    send_seq(&server, Category::UploadUpdate, 0);
    recorder.wait_for_len(1, WAIT).await;

    client.disconnect().await.expect("disconnect");
    assert!(!client.is_connected());
    assert_eq!(client.snapshot().state, ConnectionState::Closed);

    match server.recv_outbound_timeout(WAIT).await {
        Some(ordered_ws::core::WsFrame::Close(Some(close))) => assert_eq!(close.code, 1000),
        other => panic!("expected close frame, got {other:?}"),
    }

    let _ = server.send_envelope(&ordered_ws::Envelope::sequenced(Category::UploadUpdate, 1));
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(recorder.seqs(), vec![Some(0)]);
    assert!(server.is_client_closed());

    // No automatic reconnect after an explicit disconnect.
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(listener.try_accept().is_none());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn disconnect_before_connect_stays_idle() {
    let (client, transport, _listener) = mock_client(fast_config());
    client.disconnect().await.expect("disconnect");
    assert_eq!(client.snapshot().state, ConnectionState::Idle);
    assert_eq!(transport.connect_attempts(), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn connect_after_disconnect_opens_a_new_epoch() {
    let (client, _transport, mut listener) = mock_client(fast_config());
    let recorder = Recorder::default();
    let _sub = client.subscribe(Category::Initial, recorder.handler());

    let first = connect_open(&client, &mut listener).await;
    send_seq(&first, Category::Initial, 9);
    recorder.wait_for_len(1, WAIT).await;
    client.disconnect().await.expect("disconnect");

    let second = connect_open(&client, &mut listener).await;
    assert_eq!(client.snapshot().epoch, 2);
    send_seq(&second, Category::Initial, 0);
    assert_eq!(recorder.wait_for_len(2, WAIT).await, vec![Some(9), Some(0)]);
}

#[tokio::test(start_paused = true)]
async fn default_back_off_doubles_from_one_second_and_stops_after_five_retries() {
    let (client, transport, _listener) = mock_client(PushConfig::new("ws://mock/api/ws/status"));
    transport.fail_next_connects(10);

    let start = tokio::time::Instant::now();
    client.connect().await.expect("connect accepted");

    // Retry k fires at the sum of 1000, 2000, 4000, 8000, 16000 ms up to k.
    let mut expected = 1;
    for retry_at_ms in [1000u64, 3000, 7000, 15000, 31000] {
        tokio::time::sleep_until(start + Duration::from_millis(retry_at_ms - 1)).await;
        assert_eq!(transport.connect_attempts(), expected, "just before {retry_at_ms}ms");
        tokio::time::sleep_until(start + Duration::from_millis(retry_at_ms + 1)).await;
        expected += 1;
        assert_eq!(transport.connect_attempts(), expected, "just after {retry_at_ms}ms");
    }

    let snapshot = client.snapshot();
    assert!(snapshot.reconnect_exhausted);
    assert_eq!(snapshot.state, ConnectionState::Closed);
    assert_eq!(snapshot.reconnect_attempts, 5);

    // No sixth retry, however long we wait.
    tokio::time::sleep(Duration::from_secs(600)).await;
    assert_eq!(transport.connect_attempts(), 6);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn zero_timer_periods_are_rejected_on_connect() {
    let zero_sweep = fast_config().with_reorder(ReorderPolicy {
        buffer_timeout: Duration::from_millis(50),
        max_buffer_depth: 10,
        sweep_interval: Duration::ZERO,
    });
    let zero_heartbeat = fast_config().with_heartbeat_interval(Duration::ZERO);

    for config in [zero_sweep, zero_heartbeat] {
        let (client, transport, mut listener) = mock_client(config);
        let err = client.connect().await.expect_err("zero period rejected");
        assert!(matches!(err, PushError::InvalidState(_)), "{err:?}");

        // The actor survives the rejection and never dialled.
        assert_eq!(client.snapshot().state, ConnectionState::Idle);
        assert_eq!(transport.connect_attempts(), 0);
        assert!(listener.try_accept().is_none());
        client.stats().await.expect("actor still running");
    }
}

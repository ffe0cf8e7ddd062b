mod support;

use std::time::{Duration, Instant};

use ordered_ws::testing::frame_text;
use ordered_ws::{Category, Envelope};
use support::{Recorder, WAIT, connect_open, fast_config, mock_client};

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn sends_json_ping_every_interval_while_open() {
    let config = fast_config().with_heartbeat_interval(Duration::from_millis(40));
    let (client, _transport, mut listener) = mock_client(config);
    let mut server = connect_open(&client, &mut listener).await;

    let opened = Instant::now();
    for _ in 0..2 {
        let frame = server
            .recv_outbound_timeout(WAIT)
            .await
            .expect("heartbeat frame");
        assert_eq!(frame_text(&frame), Some(r#"{"type":"ping"}"#));
    }
    // First tick is one interval after open, not immediately.
    assert!(opened.elapsed() >= Duration::from_millis(70));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn pong_reply_is_delivered_and_sampled() {
    let config = fast_config().with_heartbeat_interval(Duration::from_millis(30));
    let (client, _transport, mut listener) = mock_client(config);
    let pongs = Recorder::default();
    let _sub = client.subscribe(Category::Pong, pongs.handler());

    let mut server = connect_open(&client, &mut listener).await;
    server
        .recv_outbound_timeout(WAIT)
        .await
        .expect("heartbeat frame");
    server
        .send_envelope(&Envelope::new(Category::Pong))
        .expect("server send");

    assert_eq!(pongs.wait_for_len(1, WAIT).await, vec![None]);
    let stats = client.stats().await.expect("stats");
    assert_eq!(stats.heartbeat_samples, 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn heartbeats_stop_after_disconnect() {
    let config = fast_config().with_heartbeat_interval(Duration::from_millis(20));
    let (client, _transport, mut listener) = mock_client(config);
    let mut server = connect_open(&client, &mut listener).await;

    server
        .recv_outbound_timeout(WAIT)
        .await
        .expect("heartbeat frame");
    client.disconnect().await.expect("disconnect");

    // Drain whatever was written before the close frame, then expect silence.
    loop {
        match server.recv_outbound_timeout(Duration::from_millis(100)).await {
            Some(ordered_ws::core::WsFrame::Close(_)) => break,
            Some(_) => continue,
            None => panic!("close frame not written"),
        }
    }
    assert!(
        server
            .recv_outbound_timeout(Duration::from_millis(100))
            .await
            .is_none()
    );
}

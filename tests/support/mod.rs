#![allow(dead_code)]

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use ordered_ws::core::{ReconnectPolicy, ReorderPolicy};
use ordered_ws::testing::{MockListener, MockServer, MockTransport};
use ordered_ws::{Category, Envelope, HandlerResult, PushClient, PushConfig};

pub const WAIT: Duration = Duration::from_secs(2);

/// Short timers so tests run in milliseconds; heartbeats effectively off.
pub fn fast_config() -> PushConfig {
    PushConfig::new("ws://mock/api/ws/status")
        .with_heartbeat_interval(Duration::from_secs(3600))
        .with_reorder(ReorderPolicy {
            buffer_timeout: Duration::from_millis(50),
            max_buffer_depth: 10,
            sweep_interval: Duration::from_millis(10),
        })
        .with_reconnect(ReconnectPolicy {
            base_delay: Duration::from_millis(20),
            max_attempts: 5,
        })
}

pub fn mock_client(config: PushConfig) -> (PushClient<MockTransport>, MockTransport, MockListener) {
    let (transport, listener) = MockTransport::new();
    let client = PushClient::spawn(config, transport.clone());
    (client, transport, listener)
}

/// Connect and return the server side of the first connection once the client reports `Open`.
pub async fn connect_open(
    client: &PushClient<MockTransport>,
    listener: &mut MockListener,
) -> MockServer {
    client.connect().await.expect("connect accepted");
    let server = listener.accept_timeout(WAIT).await.expect("connection accepted");
    client
        .wait_for(WAIT, |s| s.is_connected())
        .await
        .expect("client open");
    server
}

/// Records every delivered envelope as `(category, seq)`.
#[derive(Clone, Default)]
pub struct Recorder {
    seen: Arc<Mutex<Vec<(Category, Option<u64>)>>>,
}

impl Recorder {
    pub fn handler(&self) -> impl Fn(&Envelope) -> HandlerResult + Send + Sync + 'static {
        let seen = Arc::clone(&self.seen);
        move |envelope: &Envelope| {
            seen.lock().unwrap().push((envelope.category, envelope.seq));
            Ok(())
        }
    }

    pub fn seqs(&self) -> Vec<Option<u64>> {
        self.seen.lock().unwrap().iter().map(|(_, seq)| *seq).collect()
    }

    pub fn categories(&self) -> Vec<Category> {
        self.seen.lock().unwrap().iter().map(|(c, _)| *c).collect()
    }

    pub fn len(&self) -> usize {
        self.seen.lock().unwrap().len()
    }

    pub async fn wait_for_len(&self, len: usize, timeout: Duration) -> Vec<Option<u64>> {
        let deadline = Instant::now() + timeout;
        loop {
            if self.len() >= len {
                return self.seqs();
            }
            if Instant::now() >= deadline {
                panic!(
                    "timed out waiting for {len} deliveries; got {:?}",
                    self.seqs()
                );
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }
}

pub fn send_seq(server: &MockServer, category: Category, seq: u64) {
    server
        .send_envelope(&Envelope::sequenced(category, seq))
        .expect("server send");
}

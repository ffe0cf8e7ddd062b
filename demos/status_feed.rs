use std::time::Duration;

use ordered_ws::core::Category;
use ordered_ws::{PushClient, PushConfig};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main(flavor = "current_thread")]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,ordered_ws=debug")),
        )
        .init();

    let config = match std::env::var("PUSH_WS_URL") {
        Ok(url) => PushConfig::new(url),
        Err(_) => {
            let origin = std::env::var("PUSH_WS_ORIGIN")
                .unwrap_or_else(|_| "http://127.0.0.1:8080".to_string());
            match PushConfig::for_origin(&origin) {
                Ok(config) => config,
                Err(err) => {
                    eprintln!("invalid origin {origin}: {err}");
                    return;
                }
            }
        }
    };
    let run_for = std::env::var("PUSH_WS_RUN_SECS")
        .ok()
        .and_then(|v| v.parse().ok())
        .map(Duration::from_secs)
        .unwrap_or(Duration::from_secs(60));

    info!(url = %config.url, "connecting to status feed");
    let client = PushClient::new(config);
    let _subs = client.subscribe_many(&Category::ALL, |envelope| {
        info!(
            category = %envelope.category,
            seq = ?envelope.seq,
            data = ?envelope.data,
            message = ?envelope.message,
            "status event"
        );
        Ok(())
    });

    if let Err(err) = client.connect().await {
        eprintln!("connect error: {err}");
        return;
    }

    let mut state = client.watch_state();
    let watcher = tokio::spawn(async move {
        while state.changed().await.is_ok() {
            let snapshot = *state.borrow_and_update();
            if snapshot.reconnect_exhausted {
                warn!(?snapshot, "gave up reconnecting");
            } else {
                info!(?snapshot, "connection state");
            }
        }
    });

    tokio::select! {
        _ = tokio::signal::ctrl_c() => info!("interrupted"),
        _ = tokio::time::sleep(run_for) => info!("run time elapsed"),
    }

    match client.stats().await {
        Ok(stats) => println!("stats: {stats:?}"),
        Err(err) => eprintln!("stats error: {err:?}"),
    }
    if let Err(err) = client.shutdown().await {
        eprintln!("shutdown error: {err}");
    }
    watcher.abort();
}

//! Facade handed to the rendering layer.

use std::time::Duration;

use kameo::error::SendError;
use kameo::prelude::{Actor, ActorRef};
use tokio::sync::watch;

use crate::core::{
    Category, ConnectionSnapshot, DeliveryStats, Envelope, HandlerResult, PushConfig, PushError,
    PushResult, Subscription, SubscriptionRegistry, WsHeartbeatStrategy, WsReconnectStrategy,
};
use crate::transport::WsTransport;
use crate::transport::tungstenite::TungsteniteTransport;
use crate::ws::{
    ExponentialBackoffReconnect, GetDeliveryStats, JsonHeartbeat, PushActor, PushActorArgs,
    PushEvent,
};

fn actor_error<M, E: std::fmt::Display>(err: SendError<M, E>) -> PushError {
    PushError::ActorError(err.to_string())
}

/// Handle to one push connection: subscriptions, lifecycle and diagnostics.
///
/// Cloning is cheap; all clones drive the same actor.
pub struct PushClient<T = TungsteniteTransport, R = ExponentialBackoffReconnect, P = JsonHeartbeat>
where
    T: WsTransport,
    R: WsReconnectStrategy,
    P: WsHeartbeatStrategy,
{
    actor: ActorRef<PushActor<T, R, P>>,
    registry: SubscriptionRegistry,
    state_rx: watch::Receiver<ConnectionSnapshot>,
}

impl<T, R, P> Clone for PushClient<T, R, P>
where
    T: WsTransport,
    R: WsReconnectStrategy,
    P: WsHeartbeatStrategy,
{
    fn clone(&self) -> Self {
        Self {
            actor: self.actor.clone(),
            registry: self.registry.clone(),
            state_rx: self.state_rx.clone(),
        }
    }
}

impl PushClient {
    /// Spawn a client over tokio-tungstenite. Must be called inside a tokio runtime.
    pub fn new(config: PushConfig) -> Self {
        Self::spawn(config, TungsteniteTransport::default())
    }
}

impl<T: WsTransport> PushClient<T> {
    /// Spawn a client over `transport` with the default back-off and heartbeat strategies.
    pub fn spawn(config: PushConfig, transport: T) -> Self {
        let (state_tx, _) = watch::channel(ConnectionSnapshot::default());
        Self::spawn_with(PushActorArgs::new(
            config,
            transport,
            SubscriptionRegistry::new(),
            state_tx,
        ))
    }
}

impl<T, R, P> PushClient<T, R, P>
where
    T: WsTransport,
    R: WsReconnectStrategy,
    P: WsHeartbeatStrategy,
{
    /// Spawn a client from fully specified actor arguments.
    pub fn spawn_with(args: PushActorArgs<T, R, P>) -> Self {
        let registry = args.registry.clone();
        let state_rx = args.state_tx.subscribe();
        let actor = PushActor::spawn(args);
        Self {
            actor,
            registry,
            state_rx,
        }
    }

    /// Register `handler` for every envelope delivered on `category`.
    ///
    /// Dropping the returned [`Subscription`] unsubscribes; call [`Subscription::detach`] to keep
    /// the handler for the life of the client.
    pub fn subscribe<F>(&self, category: Category, handler: F) -> Subscription
    where
        F: Fn(&Envelope) -> HandlerResult + Send + Sync + 'static,
    {
        self.registry.subscribe(category, handler)
    }

    /// Register one handler for several categories.
    pub fn subscribe_many<F>(&self, categories: &[Category], handler: F) -> Vec<Subscription>
    where
        F: Fn(&Envelope) -> HandlerResult + Send + Sync + 'static,
    {
        self.registry.subscribe_many(categories, handler)
    }

    pub fn registry(&self) -> &SubscriptionRegistry {
        &self.registry
    }

    /// Open the connection (no-op while open or connecting) and re-enable automatic reconnection.
    pub async fn connect(&self) -> PushResult<()> {
        self.actor
            .ask(PushEvent::Connect)
            .await
            .map_err(|err| match err {
                SendError::HandlerError(err) => err,
                other => actor_error(other),
            })
    }

    /// Close the connection and stop reconnecting.
    ///
    /// When this returns, no subscriber callback runs until the next `connect`.
    pub async fn disconnect(&self) -> PushResult<()> {
        self.actor
            .ask(PushEvent::Disconnect)
            .await
            .map_err(|err| match err {
                SendError::HandlerError(err) => err,
                other => actor_error(other),
            })
    }

    #[inline]
    pub fn is_connected(&self) -> bool {
        self.state_rx.borrow().is_connected()
    }

    pub fn snapshot(&self) -> ConnectionSnapshot {
        *self.state_rx.borrow()
    }

    /// Receiver notified on every connection state transition.
    pub fn watch_state(&self) -> watch::Receiver<ConnectionSnapshot> {
        self.state_rx.clone()
    }

    /// Wait until the published snapshot satisfies `predicate`.
    pub async fn wait_for<F>(
        &self,
        timeout: Duration,
        predicate: F,
    ) -> PushResult<ConnectionSnapshot>
    where
        F: FnMut(&ConnectionSnapshot) -> bool,
    {
        let mut rx = self.state_rx.clone();
        match tokio::time::timeout(timeout, rx.wait_for(predicate)).await {
            Ok(Ok(snapshot)) => Ok(*snapshot),
            Ok(Err(_)) => Err(PushError::ActorError("push actor stopped".to_string())),
            Err(_) => Err(PushError::InvalidState(format!(
                "connection state not reached within {timeout:?}: {:?}",
                *self.state_rx.borrow()
            ))),
        }
    }

    pub async fn stats(&self) -> PushResult<DeliveryStats> {
        self.actor
            .ask(GetDeliveryStats)
            .await
            .map_err(|err| match err {
                SendError::HandlerError(err) => err,
                other => actor_error(other),
            })
    }

    /// Disconnect and stop the actor.
    pub async fn shutdown(self) -> PushResult<()> {
        self.disconnect().await?;
        self.actor.stop_gracefully().await.map_err(actor_error)?;
        self.actor.wait_for_shutdown().await;
        Ok(())
    }
}

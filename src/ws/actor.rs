//! Push-channel actor.
//!
//! Socket IO runs in plain tokio tasks; the actor owns every piece of delivery state (ordering
//! buffers, connection epoch, reconnect attempts) and receives frames, timer ticks and handshake
//! results as messages. Each task message carries the epoch or connect token it was started for,
//! so anything that outlives its connection is discarded on arrival.

use std::mem;
use std::ops::ControlFlow;
use std::time::{Duration, Instant};

use bytes::Bytes;
use futures_util::StreamExt;
use kameo::actor::{ActorId, ActorRef, WeakActorRef};
use kameo::error::ActorStopReason;
use kameo::prelude::{Actor, Context, Message as KameoMessage};
use tokio::{task::JoinHandle, time::MissedTickBehavior};
use tracing::{debug, info, warn};

use super::writer::{WriterWrite, WsWriterActor};
use crate::core::{
    AdmitOutcome, Category, ConnectionSnapshot, ConnectionState, DeliveryHealth, DeliveryStats,
    DisconnectCause, Envelope, ExponentialBackoffReconnect, GapSkip, JsonHeartbeat, PushConfig,
    PushError, PushResult, ReorderPolicy, SequenceTracker, SubscriptionRegistry,
    WebSocketBufferConfig, WsCloseFrame, WsFrame, WsHeartbeatStrategy, WsReconnectStrategy,
    WsTlsConfig,
};
use crate::transport::WsTransport;
use crate::transport::tungstenite::TungsteniteTransport;

/// How long `disconnect` waits for the close frame to be written.
const CLOSE_FRAME_TIMEOUT: Duration = Duration::from_secs(1);

/// Arguments passed when constructing a push actor instance.
pub struct PushActorArgs<
    T = TungsteniteTransport,
    R = ExponentialBackoffReconnect,
    P = JsonHeartbeat,
> where
    T: WsTransport,
    R: WsReconnectStrategy,
    P: WsHeartbeatStrategy,
{
    pub config: PushConfig,
    pub transport: T,
    pub reconnect_strategy: R,
    pub heartbeat: P,
    pub registry: SubscriptionRegistry,
    pub state_tx: tokio::sync::watch::Sender<ConnectionSnapshot>,
}

impl<T: WsTransport> PushActorArgs<T> {
    /// Default back-off and heartbeat strategies derived from `config`.
    pub fn new(
        config: PushConfig,
        transport: T,
        registry: SubscriptionRegistry,
        state_tx: tokio::sync::watch::Sender<ConnectionSnapshot>,
    ) -> Self {
        Self {
            reconnect_strategy: ExponentialBackoffReconnect::from_policy(config.reconnect),
            heartbeat: JsonHeartbeat::new(config.heartbeat_interval),
            config,
            transport,
            registry,
            state_tx,
        }
    }
}

/// Owns the single logical push connection and its ordered delivery state.
pub struct PushActor<T = TungsteniteTransport, R = ExponentialBackoffReconnect, P = JsonHeartbeat>
where
    T: WsTransport,
    R: WsReconnectStrategy,
    P: WsHeartbeatStrategy,
{
    url: String,
    tls: WsTlsConfig,
    buffers: WebSocketBufferConfig,
    reorder: ReorderPolicy,
    transport: T,
    reconnect: R,
    heartbeat: P,
    registry: SubscriptionRegistry,
    actor_ref: ActorRef<Self>,
    tracker: SequenceTracker,
    health: DeliveryHealth,
    snapshot: ConnectionSnapshot,
    state_tx: tokio::sync::watch::Sender<ConnectionSnapshot>,
    should_reconnect: bool,
    connect_token: u64,
    reconnect_generation: u64,
    writer_ref: Option<ActorRef<WsWriterActor<T::Writer>>>,
    reader_task: Option<JoinHandle<()>>,
    heartbeat_task: Option<JoinHandle<()>>,
    sweep_task: Option<JoinHandle<()>>,
    reconnect_task: Option<JoinHandle<()>>,
    released: Vec<Envelope>,
}

impl<T, R, P> Actor for PushActor<T, R, P>
where
    T: WsTransport,
    R: WsReconnectStrategy,
    P: WsHeartbeatStrategy,
{
    type Args = PushActorArgs<T, R, P>;
    type Error = PushError;

    fn name() -> &'static str {
        "PushActor"
    }

    async fn on_start(args: Self::Args, ctx: ActorRef<Self>) -> PushResult<Self> {
        let PushActorArgs {
            config,
            transport,
            reconnect_strategy,
            heartbeat,
            registry,
            state_tx,
        } = args;

        let snapshot = ConnectionSnapshot::default();
        state_tx.send_replace(snapshot);

        Ok(Self {
            url: config.url,
            tls: config.tls,
            buffers: config.buffers,
            reorder: config.reorder,
            transport,
            reconnect: reconnect_strategy,
            heartbeat,
            registry,
            actor_ref: ctx,
            tracker: SequenceTracker::new(),
            health: DeliveryHealth::new(),
            snapshot,
            state_tx,
            should_reconnect: false,
            connect_token: 0,
            reconnect_generation: 0,
            writer_ref: None,
            reader_task: None,
            heartbeat_task: None,
            sweep_task: None,
            reconnect_task: None,
            released: Vec::with_capacity(16),
        })
    }

    async fn on_stop(
        &mut self,
        _ctx: WeakActorRef<Self>,
        _reason: ActorStopReason,
    ) -> PushResult<()> {
        self.should_reconnect = false;
        Self::abort_task(&mut self.reconnect_task);
        self.stop_io_tasks();
        self.teardown_writer().await;
        Ok(())
    }

    fn on_panic(
        &mut self,
        _actor_ref: WeakActorRef<Self>,
        err: kameo::prelude::PanicError,
    ) -> impl std::future::Future<Output = Result<ControlFlow<ActorStopReason>, Self::Error>> + Send
    {
        async move {
            tracing::error!(connection = %self.url, error = ?err, "PushActor panicked");
            Ok(ControlFlow::Break(ActorStopReason::Panicked(err)))
        }
    }

    fn on_link_died(
        &mut self,
        _actor_ref: WeakActorRef<Self>,
        id: ActorId,
        reason: ActorStopReason,
    ) -> impl std::future::Future<Output = Result<ControlFlow<ActorStopReason>, Self::Error>> + Send
    {
        async move {
            let is_current_writer = self
                .writer_ref
                .as_ref()
                .is_some_and(|writer| writer.id() == id);
            if is_current_writer && self.snapshot.state == ConnectionState::Open {
                // The writer is already gone; nothing to unlink or stop.
                self.writer_ref = None;
                let cause = DisconnectCause::WriterFailed {
                    error: format!("{reason:?}"),
                };
                self.handle_transport_loss(cause).await;
            }
            Ok(ControlFlow::Continue(()))
        }
    }
}

/// Public lifecycle commands. Both are idempotent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushEvent {
    Connect,
    /// Close the connection and disable automatic reconnection. Replies after teardown.
    Disconnect,
}

impl<T, R, P> KameoMessage<PushEvent> for PushActor<T, R, P>
where
    T: WsTransport,
    R: WsReconnectStrategy,
    P: WsHeartbeatStrategy,
{
    type Reply = PushResult<()>;

    async fn handle(
        &mut self,
        event: PushEvent,
        _ctx: &mut Context<Self, Self::Reply>,
    ) -> Self::Reply {
        match event {
            PushEvent::Connect => self.handle_connect(),
            PushEvent::Disconnect => {
                self.handle_disconnect().await;
                Ok(())
            }
        }
    }
}

/// A decoded envelope read on connection `epoch`.
#[derive(Debug)]
pub(crate) struct Inbound {
    pub(crate) epoch: u64,
    pub(crate) envelope: Envelope,
}

#[derive(Debug)]
pub(crate) struct DecodeFailed {
    pub(crate) epoch: u64,
    pub(crate) error: PushError,
}

#[derive(Debug)]
pub(crate) struct TransportClosed {
    pub(crate) epoch: u64,
    pub(crate) cause: DisconnectCause,
}

#[derive(Debug, Clone, Copy)]
pub(crate) struct HeartbeatTick {
    pub(crate) epoch: u64,
}

#[derive(Debug, Clone, Copy)]
pub(crate) struct SweepTick {
    pub(crate) epoch: u64,
}

#[derive(Debug, Clone, Copy)]
pub(crate) struct ReconnectDue {
    pub(crate) generation: u64,
}

pub(crate) struct ConnectionEstablished<TR: WsTransport> {
    pub(crate) token: u64,
    pub(crate) reader: TR::Reader,
    pub(crate) writer: TR::Writer,
}

pub(crate) struct ConnectionFailed {
    pub(crate) token: u64,
    pub(crate) error: PushError,
}

impl<T, R, P> KameoMessage<Inbound> for PushActor<T, R, P>
where
    T: WsTransport,
    R: WsReconnectStrategy,
    P: WsHeartbeatStrategy,
{
    type Reply = ();

    async fn handle(
        &mut self,
        msg: Inbound,
        _ctx: &mut Context<Self, Self::Reply>,
    ) -> Self::Reply {
        if !self.is_current(msg.epoch) {
            return;
        }
        self.process_inbound(msg.envelope);
    }
}

impl<T, R, P> KameoMessage<DecodeFailed> for PushActor<T, R, P>
where
    T: WsTransport,
    R: WsReconnectStrategy,
    P: WsHeartbeatStrategy,
{
    type Reply = ();

    async fn handle(
        &mut self,
        msg: DecodeFailed,
        _ctx: &mut Context<Self, Self::Reply>,
    ) -> Self::Reply {
        if !self.is_current(msg.epoch) {
            return;
        }
        self.health.record_frame();
        self.health.record_decode_failure();
        warn!(
            connection = %self.url,
            epoch = msg.epoch,
            error = %msg.error,
            "dropping undecodable frame"
        );
    }
}

impl<T, R, P> KameoMessage<TransportClosed> for PushActor<T, R, P>
where
    T: WsTransport,
    R: WsReconnectStrategy,
    P: WsHeartbeatStrategy,
{
    type Reply = ();

    async fn handle(
        &mut self,
        msg: TransportClosed,
        _ctx: &mut Context<Self, Self::Reply>,
    ) -> Self::Reply {
        if !self.is_current(msg.epoch) {
            return;
        }
        self.handle_transport_loss(msg.cause).await;
    }
}

impl<T, R, P> KameoMessage<HeartbeatTick> for PushActor<T, R, P>
where
    T: WsTransport,
    R: WsReconnectStrategy,
    P: WsHeartbeatStrategy,
{
    type Reply = ();

    async fn handle(
        &mut self,
        msg: HeartbeatTick,
        _ctx: &mut Context<Self, Self::Reply>,
    ) -> Self::Reply {
        if !self.is_current(msg.epoch) {
            return;
        }
        self.emit_heartbeat().await;
    }
}

impl<T, R, P> KameoMessage<SweepTick> for PushActor<T, R, P>
where
    T: WsTransport,
    R: WsReconnectStrategy,
    P: WsHeartbeatStrategy,
{
    type Reply = ();

    async fn handle(
        &mut self,
        msg: SweepTick,
        _ctx: &mut Context<Self, Self::Reply>,
    ) -> Self::Reply {
        if !self.is_current(msg.epoch) || self.tracker.total_pending() == 0 {
            return;
        }
        self.sweep_gaps(Instant::now());
    }
}

impl<T, R, P> KameoMessage<ReconnectDue> for PushActor<T, R, P>
where
    T: WsTransport,
    R: WsReconnectStrategy,
    P: WsHeartbeatStrategy,
{
    type Reply = ();

    async fn handle(
        &mut self,
        msg: ReconnectDue,
        _ctx: &mut Context<Self, Self::Reply>,
    ) -> Self::Reply {
        if msg.generation != self.reconnect_generation || !self.should_reconnect {
            return;
        }
        self.reconnect_task = None;
        if matches!(
            self.snapshot.state,
            ConnectionState::Open | ConnectionState::Connecting
        ) {
            return;
        }
        info!(
            connection = %self.url,
            attempt = self.snapshot.reconnect_attempts,
            "reconnecting"
        );
        self.start_connect_attempt();
    }
}

impl<T, R, P> KameoMessage<ConnectionEstablished<T>> for PushActor<T, R, P>
where
    T: WsTransport,
    R: WsReconnectStrategy,
    P: WsHeartbeatStrategy,
{
    type Reply = ();

    async fn handle(
        &mut self,
        msg: ConnectionEstablished<T>,
        _ctx: &mut Context<Self, Self::Reply>,
    ) -> Self::Reply {
        if msg.token != self.connect_token || self.snapshot.state != ConnectionState::Connecting {
            // Superseded attempt; dropping the halves closes the socket.
            debug!(connection = %self.url, token = msg.token, "discarding stale connection");
            return;
        }
        self.on_connection_established(msg.reader, msg.writer).await;
    }
}

impl<T, R, P> KameoMessage<ConnectionFailed> for PushActor<T, R, P>
where
    T: WsTransport,
    R: WsReconnectStrategy,
    P: WsHeartbeatStrategy,
{
    type Reply = ();

    async fn handle(
        &mut self,
        msg: ConnectionFailed,
        _ctx: &mut Context<Self, Self::Reply>,
    ) -> Self::Reply {
        if msg.token != self.connect_token || self.snapshot.state != ConnectionState::Connecting {
            return;
        }
        let cause = DisconnectCause::HandshakeFailed {
            error: msg.error.to_string(),
        };
        self.handle_transport_loss(cause).await;
    }
}

pub struct GetDeliveryStats;

impl<T, R, P> KameoMessage<GetDeliveryStats> for PushActor<T, R, P>
where
    T: WsTransport,
    R: WsReconnectStrategy,
    P: WsHeartbeatStrategy,
{
    type Reply = PushResult<DeliveryStats>;

    async fn handle(
        &mut self,
        _msg: GetDeliveryStats,
        _ctx: &mut Context<Self, Self::Reply>,
    ) -> Self::Reply {
        Ok(self.health.get_stats())
    }
}

impl<T, R, P> PushActor<T, R, P>
where
    T: WsTransport,
    R: WsReconnectStrategy,
    P: WsHeartbeatStrategy,
{
    #[inline]
    fn is_current(&self, epoch: u64) -> bool {
        self.snapshot.state == ConnectionState::Open && epoch == self.snapshot.epoch
    }

    fn publish(&self) {
        self.state_tx.send_replace(self.snapshot);
    }

    fn set_state(&mut self, state: ConnectionState) {
        self.snapshot.state = state;
        self.publish();
    }

    fn abort_task(handle: &mut Option<JoinHandle<()>>) {
        if let Some(handle) = handle.take() {
            handle.abort();
        }
    }

    /// Aborted, never joined: a task may be parked on a full mailbox while the actor is here.
    fn stop_io_tasks(&mut self) {
        Self::abort_task(&mut self.reader_task);
        Self::abort_task(&mut self.heartbeat_task);
        Self::abort_task(&mut self.sweep_task);
    }

    fn cancel_reconnect_timer(&mut self) {
        self.reconnect_generation = self.reconnect_generation.wrapping_add(1);
        Self::abort_task(&mut self.reconnect_task);
    }

    async fn teardown_writer(&mut self) {
        if let Some(writer) = self.writer_ref.take() {
            writer.unlink(&self.actor_ref).await;
            let _ = writer.stop_gracefully().await;
        }
    }

    fn handle_connect(&mut self) -> PushResult<()> {
        if matches!(
            self.snapshot.state,
            ConnectionState::Open | ConnectionState::Connecting
        ) {
            debug!(connection = %self.url, state = ?self.snapshot.state, "connect ignored");
            return Ok(());
        }
        // Tickers cannot run with a zero period.
        if self.reorder.sweep_interval.is_zero() {
            return Err(PushError::InvalidState(
                "reorder sweep interval must be non-zero".to_string(),
            ));
        }
        if self.heartbeat.interval().is_zero() {
            return Err(PushError::InvalidState(
                "heartbeat interval must be non-zero".to_string(),
            ));
        }
        self.should_reconnect = true;
        self.snapshot.reconnect_exhausted = false;
        self.cancel_reconnect_timer();
        self.start_connect_attempt();
        Ok(())
    }

    fn start_connect_attempt(&mut self) {
        self.connect_token = self.connect_token.wrapping_add(1);
        let token = self.connect_token;
        self.set_state(ConnectionState::Connecting);
        info!(connection = %self.url, token, "opening push connection");

        let self_ref = self.actor_ref.clone();
        let url = self.url.clone();
        let buffers = self.buffers;
        let tls = self.tls;
        let transport = self.transport.clone();

        tokio::spawn(async move {
            match transport.connect(url, buffers, tls).await {
                Ok((reader, writer)) => {
                    let _ = self_ref
                        .tell(ConnectionEstablished::<T> {
                            token,
                            reader,
                            writer,
                        })
                        .send()
                        .await;
                }
                Err(error) => {
                    let _ = self_ref
                        .tell(ConnectionFailed { token, error })
                        .send()
                        .await;
                }
            }
        });
    }

    async fn on_connection_established(&mut self, reader: T::Reader, writer: T::Writer) {
        // The server restarts its counters on every connection.
        self.tracker.reset();
        self.reconnect.reset();
        self.heartbeat.reset();
        self.health.reset_connection();

        let writer = WsWriterActor::spawn(WsWriterActor::new(writer));
        writer.link(&self.actor_ref).await;
        self.writer_ref = Some(writer);

        self.snapshot.epoch = self.snapshot.epoch.wrapping_add(1);
        self.snapshot.reconnect_attempts = 0;
        self.snapshot.reconnect_exhausted = false;
        self.set_state(ConnectionState::Open);

        let epoch = self.snapshot.epoch;
        info!(connection = %self.url, epoch, "push connection open");

        self.reader_task = Some(Self::spawn_reader(
            self.actor_ref.clone(),
            self.url.clone(),
            epoch,
            reader,
        ));
        self.heartbeat_task = Some(Self::spawn_ticker(
            self.actor_ref.clone(),
            self.heartbeat.interval(),
            move || HeartbeatTick { epoch },
        ));
        self.sweep_task = Some(Self::spawn_ticker(
            self.actor_ref.clone(),
            self.reorder.sweep_interval,
            move || SweepTick { epoch },
        ));
    }

    fn spawn_reader(
        actor_ref: ActorRef<Self>,
        connection: String,
        epoch: u64,
        mut read: T::Reader,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            let cause = loop {
                match read.next().await {
                    Some(Ok(WsFrame::Close(frame))) => {
                        info!(
                            connection = %connection,
                            close = ?frame,
                            "received websocket close frame"
                        );
                        break DisconnectCause::RemoteClosed {
                            code: frame.as_ref().map(|f| f.code),
                            reason: frame
                                .as_ref()
                                .map(WsCloseFrame::reason_lossy)
                                .unwrap_or_default(),
                        };
                    }
                    Some(Ok(frame)) => {
                        // Protocol-level ping/pong frames are answered by the transport.
                        let Some(payload) = frame.data_payload() else {
                            continue;
                        };
                        let delivered = match Envelope::decode(payload) {
                            Ok(envelope) => {
                                actor_ref.tell(Inbound { epoch, envelope }).send().await.is_ok()
                            }
                            Err(error) => {
                                actor_ref.tell(DecodeFailed { epoch, error }).send().await.is_ok()
                            }
                        };
                        if !delivered {
                            return;
                        }
                    }
                    Some(Err(err)) => {
                        break DisconnectCause::ReadFailure {
                            error: err.to_string(),
                        };
                    }
                    None => break DisconnectCause::StreamEnded,
                }
            };
            let _ = actor_ref.tell(TransportClosed { epoch, cause }).send().await;
        })
    }

    /// First tick fires one `period` after start.
    fn spawn_ticker<M, F>(actor_ref: ActorRef<Self>, period: Duration, make: F) -> JoinHandle<()>
    where
        M: Send + 'static,
        F: Fn() -> M + Send + 'static,
        Self: KameoMessage<M, Reply = ()>,
    {
        tokio::spawn(async move {
            let start = tokio::time::Instant::now() + period;
            let mut ticker = tokio::time::interval_at(start, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                if actor_ref.tell(make()).send().await.is_err() {
                    break;
                }
            }
        })
    }

    fn process_inbound(&mut self, envelope: Envelope) {
        self.health.record_frame();
        if envelope.category == Category::Pong {
            if let Some(rtt) = self.heartbeat.on_reply() {
                debug!(connection = %self.url, rtt_us = rtt.as_micros() as u64, "heartbeat reply");
                self.health.record_heartbeat_rtt(rtt);
            }
        }

        let category = envelope.category;
        let seq = envelope.seq;
        let mut released = mem::take(&mut self.released);
        let outcome = self.tracker.admit(envelope, Instant::now(), &mut released);
        self.health.record_admission(outcome);
        match outcome {
            AdmitOutcome::Stale { expected } => debug!(
                connection = %self.url,
                category = %category,
                seq = ?seq,
                expected,
                "dropping stale envelope"
            ),
            AdmitOutcome::Duplicate => debug!(
                connection = %self.url,
                category = %category,
                seq = ?seq,
                "dropping duplicate envelope"
            ),
            AdmitOutcome::Unordered
            | AdmitOutcome::Baseline
            | AdmitOutcome::InOrder
            | AdmitOutcome::Buffered => {}
        }
        self.deliver(&mut released);
        self.released = released;
    }

    fn sweep_gaps(&mut self, now: Instant) {
        let mut released = mem::take(&mut self.released);
        let mut skips: Vec<GapSkip> = Vec::new();
        self.tracker
            .sweep(now, &self.reorder, &mut released, &mut skips);
        for skip in skips {
            warn!(
                connection = %self.url,
                category = %skip.category,
                skipped_from = skip.skipped.start,
                skipped_to = skip.skipped.end,
                reason = ?skip.reason,
                pending = skip.pending,
                "sequence gap skipped"
            );
            self.health.record_gap_skip(skip);
        }
        self.deliver(&mut released);
        self.released = released;
    }

    fn deliver(&mut self, released: &mut Vec<Envelope>) {
        for envelope in released.drain(..) {
            let report = self.registry.dispatch(&envelope);
            self.health.record_delivered(report.failed);
        }
    }

    async fn emit_heartbeat(&mut self) {
        let Some(writer) = self.writer_ref.clone() else {
            return;
        };
        let Some(frame) = self.heartbeat.create_ping() else {
            return;
        };
        debug!(connection = %self.url, epoch = self.snapshot.epoch, "sending heartbeat");
        // A failed write stops the writer; its link reports the loss.
        if let Err(err) = writer.tell(WriterWrite { frame }).send().await {
            let cause = DisconnectCause::WriterFailed {
                error: err.to_string(),
            };
            self.handle_transport_loss(cause).await;
        }
    }

    async fn handle_transport_loss(&mut self, cause: DisconnectCause) {
        self.stop_io_tasks();
        self.teardown_writer().await;
        self.tracker.reset();
        self.heartbeat.reset();
        self.snapshot.state = ConnectionState::Closed;
        self.schedule_reconnect(&cause);
        self.publish();
    }

    fn schedule_reconnect(&mut self, cause: &DisconnectCause) {
        if !self.should_reconnect {
            debug!(connection = %self.url, cause = ?cause, "connection lost; reconnect disabled");
            return;
        }

        let Some(delay) = self.reconnect.next_delay() else {
            self.snapshot.reconnect_exhausted = true;
            let exhausted = PushError::ReconnectExhausted {
                attempts: self.reconnect.attempts(),
            };
            warn!(
                connection = %self.url,
                cause = ?cause,
                error = %exhausted,
                "reconnection exhausted"
            );
            return;
        };

        let attempt = self.reconnect.attempts();
        self.snapshot.reconnect_attempts = attempt;
        self.health.increment_reconnect();
        warn!(
            connection = %self.url,
            cause = ?cause,
            attempt,
            delay_ms = delay.as_millis() as u64,
            "websocket reconnect plan"
        );

        self.cancel_reconnect_timer();
        let generation = self.reconnect_generation;
        let actor_ref = self.actor_ref.clone();
        self.reconnect_task = Some(tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = actor_ref.tell(ReconnectDue { generation }).send().await;
        }));
    }

    async fn handle_disconnect(&mut self) {
        self.should_reconnect = false;
        self.cancel_reconnect_timer();
        // Invalidate any handshake still in flight.
        self.connect_token = self.connect_token.wrapping_add(1);

        if self.snapshot.state == ConnectionState::Idle {
            return;
        }

        if self.snapshot.state == ConnectionState::Open {
            self.set_state(ConnectionState::Closing);
        }
        self.stop_io_tasks();

        if let Some(writer) = self.writer_ref.as_ref() {
            let frame = WsFrame::close(
                WsCloseFrame::NORMAL,
                Bytes::from_static(b"client disconnect"),
            );
            let close = writer.ask(WriterWrite { frame });
            if let Ok(Err(err)) = tokio::time::timeout(CLOSE_FRAME_TIMEOUT, close).await {
                debug!(connection = %self.url, error = %err, "close frame not delivered");
            }
        }
        self.teardown_writer().await;
        self.tracker.reset();
        self.heartbeat.reset();
        self.set_state(ConnectionState::Closed);
        info!(connection = %self.url, epoch = self.snapshot.epoch, "push connection closed");
    }
}

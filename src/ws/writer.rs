use futures_util::{Sink, SinkExt};
use kameo::prelude::{Actor, ActorRef, Context, Message as KameoMessage};
use tracing::debug;

use crate::core::{PushError, PushResult, WsFrame};

/// Owns the transport writer half and serializes outbound frames.
///
/// One writer lives per connection epoch. It is linked to the push actor, so a failed write that
/// stops the writer is observed as a transport loss.
pub struct WsWriterActor<W>
where
    W: Sink<WsFrame, Error = PushError> + Send + Sync + Unpin + 'static,
{
    writer: W,
    closed: bool,
}

impl<W> WsWriterActor<W>
where
    W: Sink<WsFrame, Error = PushError> + Send + Sync + Unpin + 'static,
{
    pub fn new(writer: W) -> Self {
        Self {
            writer,
            closed: false,
        }
    }
}

impl<W> Actor for WsWriterActor<W>
where
    W: Sink<WsFrame, Error = PushError> + Send + Sync + Unpin + 'static,
{
    type Args = Self;
    type Error = PushError;

    fn name() -> &'static str {
        "WsWriterActor"
    }

    async fn on_start(args: Self::Args, _ctx: ActorRef<Self>) -> Result<Self, Self::Error> {
        Ok(args)
    }

    fn on_panic(
        &mut self,
        _actor_ref: kameo::actor::WeakActorRef<Self>,
        err: kameo::prelude::PanicError,
    ) -> impl std::future::Future<
        Output = Result<std::ops::ControlFlow<kameo::prelude::ActorStopReason>, Self::Error>,
    > + Send {
        async move {
            tracing::error!(error = ?err, "WsWriterActor panicked");
            Ok(std::ops::ControlFlow::Break(
                kameo::prelude::ActorStopReason::Panicked(err),
            ))
        }
    }
}

/// Write one frame and flush it.
#[derive(Clone, Debug)]
pub struct WriterWrite {
    pub frame: WsFrame,
}

impl<W> KameoMessage<WriterWrite> for WsWriterActor<W>
where
    W: Sink<WsFrame, Error = PushError> + Send + Sync + Unpin + 'static,
{
    type Reply = PushResult<()>;

    async fn handle(
        &mut self,
        msg: WriterWrite,
        _ctx: &mut Context<Self, Self::Reply>,
    ) -> Self::Reply {
        if self.closed {
            return Err(PushError::InvalidState("writer closed".to_string()));
        }
        let closing = matches!(msg.frame, WsFrame::Close(_));
        debug!(target: "ordered-ws-writer", closing, "sending websocket frame to wire");
        self.writer.send(msg.frame).await?;
        if closing {
            self.closed = true;
            self.writer.close().await?;
        }
        Ok(())
    }
}

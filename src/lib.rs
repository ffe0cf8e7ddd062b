//! Kameo-based ordered delivery of server-pushed websocket events.

pub mod client;
pub mod core;
pub mod testing;
pub mod transport;
pub mod ws;

pub use client::PushClient;
pub use core::{
    Category, ConnectionSnapshot, ConnectionState, DeliveryStats, Envelope, HandlerResult,
    PushConfig, PushError, PushResult, Subscription,
};
pub use ws::{PushActor, PushActorArgs, PushEvent, WriterWrite, WsWriterActor};

pub mod config;
pub mod envelope;
pub mod frame;
pub mod health;
pub mod ping;
pub mod reconnect;
pub mod registry;
pub mod reorder;
pub mod types;

pub use config::*;
pub use envelope::*;
pub use frame::*;
pub use health::*;
pub use ping::*;
pub use reconnect::*;
pub use registry::*;
pub use reorder::*;
pub use types::*;

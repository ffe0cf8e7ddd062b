pub mod actor;
pub mod writer;

pub use crate::core::*;

pub use actor::*;
pub use writer::*;

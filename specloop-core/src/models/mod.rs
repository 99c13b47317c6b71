//! Data models for specloop

pub mod configuration;
pub mod session;
pub mod workflow;

pub use configuration::*;
pub use session::*;
pub use workflow::*;

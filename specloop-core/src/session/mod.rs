//! Conversational sessions and their link to workflow runs

pub mod listener;
pub mod store;

pub use listener::*;
pub use store::*;

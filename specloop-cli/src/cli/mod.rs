//! CLI command handling

pub mod approval;
pub mod context;
pub mod handlers;
pub mod session;
pub mod session_handlers;
pub mod steps;
pub mod workflow_handlers;

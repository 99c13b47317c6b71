//! Workflow orchestration module

pub mod approval;
pub mod engine;
pub mod handler;
pub mod listener;
pub mod persistence;
pub mod progress;
pub mod registry;
pub mod shell_handler;
pub mod validator;

pub use approval::*;
pub use engine::*;
pub use handler::*;
pub use listener::*;
pub use persistence::*;
pub use progress::*;
pub use registry::*;
pub use shell_handler::*;
pub use validator::*;

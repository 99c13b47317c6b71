//! # specloop Core Library
//!
//! Workflow orchestration for spec-driven coding: a step engine with approval
//! gates and resumable snapshots, plus the conversational session store that
//! tracks each workflow run.

pub mod error;
pub mod models;
pub mod services;
pub mod session;
pub mod tasks;
pub mod workflow;

pub use error::{ApprovalError, PersistenceError, WorkflowError};

//! Deploy pipeline
//!
//! `orchestrator` drives the conversation, `executor` runs the blocking
//! work, `sync` commits and pushes over any shell.

pub mod archive;
pub mod cancel;
pub mod classify;
pub mod executor;
pub mod fsm;
pub mod git;
pub mod orchestrator;
pub mod render;
pub mod session;
pub mod sync;

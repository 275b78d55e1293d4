//! repodeck library
//!
//! Core modules for the repodeck control panel backend.

pub mod app;
pub mod cache;
pub mod deploy;
pub mod errors;
pub mod filesys;
pub mod github;
pub mod logs;
pub mod notifications;
pub mod profiles;
pub mod server;
pub mod ssh;
pub mod storage;
pub mod utils;
pub mod vault;
pub mod workers;

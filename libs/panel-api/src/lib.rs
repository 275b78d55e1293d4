//! repodeck control API models

pub mod models;

//! GitHub REST API models

pub mod models;

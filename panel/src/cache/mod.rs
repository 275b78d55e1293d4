//! In-memory caches

pub mod response;

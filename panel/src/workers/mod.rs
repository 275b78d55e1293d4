//! Background workers

pub mod blocking;
pub mod janitor;

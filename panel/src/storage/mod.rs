//! Persistent state

pub mod accounts;
pub mod layout;
pub mod profiles;
pub mod records;
pub mod settings;
pub mod subscriptions;

pub use records::UserId;

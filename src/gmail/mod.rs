//! Gmail API module
//!
//! Contains types, credential storage, authentication, and the client for
//! interacting with the Gmail API.

pub mod auth;
pub mod client;
pub mod consent;
pub mod store;
pub mod types;
pub mod utils;

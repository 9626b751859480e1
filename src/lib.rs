//! Gmail Reader MCP Server Library
//!
//! A Model Context Protocol (MCP) server that lets an AI assistant read the
//! Gmail inbox and prepare drafts. Nothing is ever sent; every outgoing
//! message is left as a draft for the user to review.

pub mod config;
pub mod error;
pub mod gmail;
pub mod mcp;

pub use config::Config;
pub use error::{ErrorKind, GmailMcpError, Result};

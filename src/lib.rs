//! tinyftp library
//!
//! Minimal authenticated file transfer over a fixed 12-byte header protocol:
//! a synchronous client and a thread-per-connection server.

pub mod auth;
pub mod cli;
pub mod client;
pub mod config;
pub mod error;
pub mod fs_enum;
pub mod logger;
pub mod net;
pub mod protocol;
pub mod protocol_core;
pub mod server;
pub mod shell;
pub mod store;
pub mod transfer;

pub use client::{Client, ClientState};
pub use error::{FtpError, Result};
pub use server::{Server, ServerContext, Session, SessionState};

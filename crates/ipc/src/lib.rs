//! Local-socket IPC: a small text protocol with `VALUE` data frames, the
//! accept loop serving it, and a client.

pub mod client;
pub mod protocol;
pub mod server;

pub use client::Client;
pub use protocol::{parse_command, Command, Reply, Status, Value};
pub use server::{serve_connection, KeyHandler, Router, Server};

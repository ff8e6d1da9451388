//! IPC module for webhook front end to daemon communication

mod protocol;
mod server;

pub use server::Server;

//! Client side of the job control socket, used by the job process and the tools it spawns.
mod client;
pub use client::Client;

mod config;
pub use config::ClientConfig;

mod errors;
pub use errors::ClientError;

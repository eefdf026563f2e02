mod error;
pub use error::{ApiError, ServerError};

mod handler;
pub use handler::ApiHandler;

mod adapter;
pub use adapter::EnvStoreAdapter;

mod http;
pub use http::HttpApi;

#[cfg(unix)]
mod server;

#[cfg(unix)]
pub use server::{JobApiServer, socket_path_in};

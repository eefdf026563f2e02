pub mod diff;

pub mod error;
pub use error::CoreError;

pub mod protected;
pub use protected::ProtectedKeys;

pub mod store;
pub use store::EnvStore;

pub mod token;
pub use token::SessionToken;

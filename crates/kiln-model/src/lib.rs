mod domain;
pub use domain::*;

mod wire;
pub use wire::*;

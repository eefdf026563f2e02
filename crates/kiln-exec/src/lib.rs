mod error;
pub use error::{ExecError, ExecResult};

mod util;

pub mod job;
pub use job::{JobSession, JobSpec, JobStep, SessionConfig, run_job};

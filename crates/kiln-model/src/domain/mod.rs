mod job_env;
pub use job_env::JobEnv;

mod constants;
pub use constants::{ENV_PATH, JOB_API_SOCKET_ENV, JOB_API_TOKEN_ENV};

mod report;
pub use report::MutationReport;

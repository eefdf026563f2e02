use std::path::PathBuf;

use kiln_core::ProtectedKeys;
use kiln_model::JobEnv;

mod run;
pub use run::run_job;

mod session;
pub use session::JobSession;

/// One process of a job.
#[derive(Clone, Debug, Default)]
pub struct JobStep {
    pub program: String,
    pub args: Vec<String>,
    pub cwd: Option<PathBuf>,
}

impl JobStep {
    pub fn new<I, S>(program: impl Into<String>, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            program: program.into(),
            args: args.into_iter().map(Into::into).collect(),
            cwd: None,
        }
    }

    pub fn in_dir(mut self, cwd: impl Into<PathBuf>) -> Self {
        self.cwd = Some(cwd.into());
        self
    }
}

/// How the per-job control socket is set up.
#[derive(Clone, Debug)]
pub struct SessionConfig {
    /// Directory the job's socket is created in.
    pub socket_dir: PathBuf,
    pub protected: ProtectedKeys,
    /// Log every control request.
    pub debug: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            socket_dir: std::env::temp_dir(),
            protected: ProtectedKeys::agent_defaults(),
            debug: false,
        }
    }
}

/// A whole job: steps run in order against one environment.
#[derive(Clone, Debug, Default)]
pub struct JobSpec {
    pub steps: Vec<JobStep>,
    pub env: JobEnv,
    pub session: SessionConfig,
}

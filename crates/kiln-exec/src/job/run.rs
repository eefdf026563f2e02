use kiln_model::JobEnv;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::{
    error::ExecResult,
    job::{JobSession, JobSpec},
};

/// Run every step of `spec` in order under one control session.
///
/// Stops at the first failing step. The session is closed either way; the job's final environment is returned on success.
pub async fn run_job(spec: JobSpec, cancel: CancellationToken) -> ExecResult<JobEnv> {
    let session = JobSession::open(&spec.session, spec.env).await?;
    info!(
        target: "kiln.exec.job",
        socket = %session.socket_path().display(),
        steps = spec.steps.len(),
        "job started"
    );

    let mut outcome = Ok(());
    for (idx, step) in spec.steps.iter().enumerate() {
        if let Err(e) = session.run_step(step, &cancel).await {
            warn!(
                target: "kiln.exec.job",
                step = idx,
                program = %step.program,
                error = %e,
                "step failed"
            );
            outcome = Err(e);
            break;
        }
    }

    let env = session.store().snapshot();
    let closed = session.close().await;
    outcome?;
    closed?;

    info!(target: "kiln.exec.job", vars = env.len(), "job finished");
    Ok(env)
}

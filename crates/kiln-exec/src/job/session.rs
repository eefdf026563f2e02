use std::{collections::BTreeMap, path::Path, process::Stdio, time::Duration};

use kiln_api::{JobApiServer, socket_path_in};
use kiln_core::EnvStore;
use kiln_model::JobEnv;
use tokio::{
    io::{AsyncBufReadExt, AsyncRead, BufReader},
    task::JoinHandle,
    time::Instant,
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace};

use crate::{
    error::{ExecError, ExecResult},
    job::{JobStep, SessionConfig},
    util::{cmd_program, kill_graceful},
};

/// Time a cancelled step gets between SIGTERM and SIGKILL.
const KILL_GRACE: Duration = Duration::from_secs(10);

/// How long output is still collected after a step exits.
/// Background processes it left behind may hold its pipes open indefinitely.
const OUTPUT_DRAIN: Duration = Duration::from_secs(2);

/// A running job: its environment plus the control server that exposes it.
pub struct JobSession {
    server: JobApiServer,
}

impl JobSession {
    /// Create the job's store and start serving it on a fresh socket.
    pub async fn open(cfg: &SessionConfig, env: JobEnv) -> ExecResult<Self> {
        let store = EnvStore::new(env, cfg.protected.clone());
        let mut server =
            JobApiServer::new(socket_path_in(&cfg.socket_dir), store)?.with_debug(cfg.debug);
        server.start().await?;
        Ok(Self { server })
    }

    pub fn store(&self) -> &EnvStore {
        self.server.store()
    }

    pub fn socket_path(&self) -> &Path {
        self.server.socket_path()
    }

    /// Environment for the next step: the job's variables plus where and how to reach the control socket.
    pub fn child_env(&self) -> BTreeMap<String, String> {
        let mut env = self.server.store().dump();
        for (k, v) in self.server.job_env() {
            env.insert(k.to_owned(), v);
        }
        env
    }

    /// Run one step to completion with exactly [`JobSession::child_env`] as its environment.
    pub async fn run_step(&self, step: &JobStep, cancel: &CancellationToken) -> ExecResult<()> {
        if step.program.is_empty() {
            return Err(ExecError::MissingProgram);
        }

        let mut cmd = cmd_program(&step.program, &step.args);
        if let Some(cwd) = &step.cwd {
            cmd.current_dir(cwd);
        }
        cmd.env_clear()
            .envs(self.child_env())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        trace!(target: "kiln.exec.job", program = %step.program, args = ?step.args, "spawn");
        let mut child = cmd
            .spawn()
            .map_err(|e| ExecError::Spawn(format!("{}: {e}", step.program)))?;

        let readers = [
            child.stdout.take().map(|out| forward(out, "stdout")),
            child.stderr.take().map(|err| forward(err, "stderr")),
        ];

        tokio::select! {
            status = child.wait() => {
                let status = status?;
                drain(readers, cancel).await;

                if status.success() {
                    debug!(target: "kiln.exec.job", program = %step.program, "exit success");
                    return Ok(());
                }
                match status.code() {
                    Some(code) => Err(ExecError::NonZeroExit { code }),
                    None => Err(ExecError::KilledBySignal),
                }
            }
            _ = cancel.cancelled() => {
                debug!(
                    target: "kiln.exec.job",
                    program = %step.program,
                    "cancelled; killing child"
                );
                kill_graceful(&mut child, KILL_GRACE).await?;
                for reader in readers.into_iter().flatten() {
                    reader.abort();
                }
                Err(ExecError::Cancelled)
            }
        }
    }

    /// Stop the control server and remove its socket.
    pub async fn close(mut self) -> ExecResult<()> {
        self.server.stop().await?;
        Ok(())
    }
}

/// Wait for the output readers of an exited step, bounded by [`OUTPUT_DRAIN`] and `cancel`.
async fn drain(readers: [Option<JoinHandle<()>>; 2], cancel: &CancellationToken) {
    let deadline = Instant::now() + OUTPUT_DRAIN;
    for mut reader in readers.into_iter().flatten() {
        tokio::select! {
            joined = &mut reader => {
                if let Err(e) = joined {
                    debug!(target: "kiln.exec.job", error = %e, "output reader failed");
                }
            }
            _ = tokio::time::sleep_until(deadline) => {
                debug!(target: "kiln.exec.job", "output still open after exit; detaching");
                reader.abort();
            }
            _ = cancel.cancelled() => reader.abort(),
        }
    }
}

fn forward<R>(reader: R, stream: &'static str) -> JoinHandle<()>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut lines = BufReader::new(reader).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            info!(target: "kiln.exec.job", stream, "{line}");
        }
    })
}

use std::{collections::BTreeMap, process::ExitCode};

use anyhow::Context;
use kiln_client::Client;
use kiln_core::ProtectedKeys;
use kiln_exec::{ExecError, JobSpec, JobStep, SessionConfig, run_job};
use kiln_model::JobEnv;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::cli::{EnvCommand, RunArgs};

/// Run one step as a job and mirror its exit status.
pub async fn run(args: RunArgs, debug: bool) -> anyhow::Result<ExitCode> {
    let mut session = SessionConfig {
        protected: ProtectedKeys::agent_defaults().with_keys(args.protect),
        debug,
        ..SessionConfig::default()
    };
    let inherited: Vec<(String, String)> = if args.no_inherit_env {
        Vec::new()
    } else {
        // Variables that are not valid UTF-8 cannot be served over JSON.
        std::env::vars_os()
            .filter_map(|(k, v)| Some((k.into_string().ok()?, v.into_string().ok()?)))
            .collect()
    };
    let env = seed_env(inherited, &session.protected, args.env);
    if let Some(dir) = args.sockets_path {
        session.socket_dir = dir;
    }

    let mut argv = args.argv.into_iter();
    let program = argv.next().context("missing program")?;
    let step = JobStep {
        program,
        args: argv.collect(),
        cwd: args.cwd,
    };
    let spec = JobSpec {
        steps: vec![step],
        env,
        session,
    };

    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("interrupt received, cancelling job");
            on_signal.cancel();
        }
    });

    match run_job(spec, cancel).await {
        Ok(env) => {
            info!(vars = env.len(), "job succeeded");
            Ok(ExitCode::SUCCESS)
        }
        Err(ExecError::NonZeroExit { code }) => {
            warn!(code, "job failed");
            Ok(ExitCode::from(exit_status(code)))
        }
        Err(ExecError::Cancelled) => Ok(ExitCode::from(130)),
        Err(e) => Err(e).context("running job"),
    }
}

/// Talk to the control socket of the job this process belongs to.
pub async fn env(cmd: EnvCommand) -> anyhow::Result<()> {
    let client = Client::from_env().context("not running inside a job")?;

    let out = match cmd {
        EnvCommand::Get => serde_json::to_string_pretty(&client.env_get().await?)?,
        EnvCommand::Set { pairs } => {
            let changes: BTreeMap<String, String> = pairs.into_iter().collect();
            serde_json::to_string_pretty(&client.env_update(changes).await?)?
        }
        EnvCommand::Unset { keys } => {
            serde_json::to_string_pretty(&client.env_delete(keys).await?)?
        }
    };
    println!("{out}");
    Ok(())
}

/// Job environment: the agent's variables minus protected ones, then `--env` on top.
///
/// Explicit `--env` values are taken as given; the control API still refuses to change protected names later.
fn seed_env<I, O>(inherited: I, protected: &ProtectedKeys, overrides: O) -> JobEnv
where
    I: IntoIterator<Item = (String, String)>,
    O: IntoIterator<Item = (String, String)>,
{
    let mut env: JobEnv = inherited
        .into_iter()
        .filter(|(k, _)| !protected.is_protected(k))
        .collect();
    env.extend(overrides);
    env
}

/// Exit codes outside a byte collapse to 1.
fn exit_status(code: i32) -> u8 {
    u8::try_from(code).unwrap_or(1)
}

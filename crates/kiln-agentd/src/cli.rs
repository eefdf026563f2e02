use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use kiln_observe::LoggerFormat;

/// Build agent with a per-job control socket.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None, name = "kiln-agentd")]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalArgs,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Args, Debug)]
pub struct GlobalArgs {
    /// Log filter, e.g. `info` or `info,kiln.api=trace`
    #[arg(long, global = true, env = "KILN_LOG_LEVEL", default_value = "info")]
    pub log_level: String,

    /// Log output format (text, json, journald)
    #[arg(long, global = true, env = "KILN_LOG_FORMAT", default_value = "text")]
    pub log_format: LoggerFormat,

    /// Log every control request and raise agent logs to debug
    #[arg(long, global = true, env = "KILN_AGENT_DEBUG")]
    pub debug: bool,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run one job step under a fresh control socket
    Run(RunArgs),
    /// Read or change the environment of the job this process runs in
    #[command(subcommand)]
    Env(EnvCommand),
}

#[derive(Args, Debug)]
pub struct RunArgs {
    /// Directory the job's control socket is created in
    #[arg(long, env = "KILN_SOCKETS_PATH")]
    pub sockets_path: Option<PathBuf>,

    /// Extra variable the job may not modify (repeatable)
    #[arg(long = "protect", value_name = "NAME")]
    pub protect: Vec<String>,

    /// Start the job from an empty environment instead of the agent's own
    #[arg(long)]
    pub no_inherit_env: bool,

    /// Seed the job environment (repeatable)
    #[arg(long = "env", value_name = "K=V", value_parser = parse_pair)]
    pub env: Vec<(String, String)>,

    /// Working directory of the step
    #[arg(long)]
    pub cwd: Option<PathBuf>,

    /// Program to run, followed by its arguments
    #[arg(last = true, required = true, num_args = 1..)]
    pub argv: Vec<String>,
}

#[derive(Subcommand, Debug)]
pub enum EnvCommand {
    /// Print the job environment as JSON
    Get,
    /// Set variables and print which were added or updated
    Set {
        #[arg(required = true, value_name = "K=V", value_parser = parse_pair)]
        pairs: Vec<(String, String)>,
    },
    /// Remove variables and print which existed
    Unset {
        #[arg(required = true, value_name = "K")]
        keys: Vec<String>,
    },
}

/// Split `K=V` at the first `=`; the value may be empty or contain more `=`.
pub fn parse_pair(s: &str) -> Result<(String, String), String> {
    match s.split_once('=') {
        Some((k, v)) if !k.is_empty() => Ok((k.to_owned(), v.to_owned())),
        Some(_) => Err(format!("empty variable name in {s:?}")),
        None => Err(format!("expected K=V, got {s:?}")),
    }
}

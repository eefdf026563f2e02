use std::{io, time::Duration};

use tokio::process::{Child, Command};

pub fn cmd_program(program: &str, args: &[String]) -> Command {
    let mut cmd = Command::new(program);
    cmd.args(args.iter().map(|s| s.as_str()));
    cmd
}

/// SIGTERM, wait up to `grace`, then SIGKILL.
#[cfg(unix)]
pub async fn kill_graceful(child: &mut Child, grace: Duration) -> io::Result<()> {
    use nix::sys::signal::{Signal, kill};
    use nix::unistd::Pid;

    if let Some(id) = child.id() {
        if kill(Pid::from_raw(id as i32), Signal::SIGTERM).is_ok() {
            if let Ok(status) = tokio::time::timeout(grace, child.wait()).await {
                return status.map(|_| ());
            }
        }
    }
    child.kill().await
}

#[cfg(not(unix))]
pub async fn kill_graceful(child: &mut Child, _grace: Duration) -> io::Result<()> {
    child.kill().await
}

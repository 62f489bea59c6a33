use std::{
    env,
    path::Path,
    process::{Command, Stdio},
};

use anyhow::{anyhow, Result};
use sysinfo::{get_current_pid, Signal, System};
use tracing::info;

use super::daemon_path::to_daemon_path;

/// Terminates every running process started from `executable`. Returns how many were stopped.
pub fn kill_running_daemons(executable: &Path) -> Result<usize> {
    let system = System::new_all();
    let current_id = get_current_pid().map_err(|e| anyhow!("Can't get own pid: {e}"))?;
    let mut killed = 0;
    for (pid, process) in system.processes().iter() {
        if *pid == current_id {
            continue;
        }

        if process
            .exe()
            .filter(|v| v.exists())
            .filter(|v| executable == *v)
            .is_some()
        {
            // SIGTERM lets the daemon flush its last interval. Windows only has the hard kill.
            if process.kill_with(Signal::Term).is_none() {
                process.kill();
            }
            process.wait();
            info!("Stopped daemon {pid}");
            killed += 1;
        }
    }
    Ok(killed)
}

/// Stops a running daemon and starts a new one for `app_dir`. The daemon binary detaches
/// itself.
pub fn restart_daemon(app_dir: &Path) -> Result<()> {
    let daemon = to_daemon_path(env::current_exe()?);
    if !daemon.exists() {
        return Err(anyhow!("Daemon executable {daemon:?} is missing"));
    }
    kill_running_daemons(&daemon)?;

    let mut command = Command::new(&daemon);
    command.arg("--dir").arg(app_dir);
    command.stdin(Stdio::null());
    command.stdout(Stdio::null());

    #[cfg(unix)]
    {
        use std::os::unix::process::CommandExt;
        command.process_group(0);
    }

    println!("Spawning {daemon:?}");
    #[allow(clippy::zombie_processes)]
    let _ = command.spawn()?;
    println!("Success");
    Ok(())
}

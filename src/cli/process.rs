use std::{
    env,
    path::Path,
    process::{Command, Stdio},
};

use anyhow::{anyhow, Result};
use sysinfo::{get_current_pid, Signal, System};
use tracing::info;

/// Terminates every other process started from the `name` executable, except children of this
/// process.
pub fn kill_previous_servers(name: &Path) -> Result<()> {
    let system = System::new_all();
    let current_id = get_current_pid().map_err(|e| anyhow!("Can't get current pid {e}"))?;
    for (pid, process) in system.processes().iter() {
        if *pid == current_id {
            continue;
        }
        if matches!(process.parent(), Some(p) if p == current_id) {
            continue;
        }

        if process
            .exe()
            .filter(|v| v.exists())
            .filter(|v| name == *v)
            .is_some()
        {
            info!("Stopping daemon {pid}");
            // This will forcefully terminate the process on Windows, skipping the final flush.
            if process.kill_with(Signal::Term).is_none() {
                process.kill();
            }
            process.wait();
        }
    }
    Ok(())
}

/// Shuts down previous daemons and starts a new one as a detached `serve` process writing into
/// `app_dir`.
pub fn restart_server(app_dir: &Path, interval_seconds: u32) -> Result<()> {
    let process_name = env::current_exe()?;
    kill_previous_servers(&process_name)?;
    let mut command = serve_command(&process_name, app_dir, interval_seconds);

    #[cfg(feature = "win")]
    {
        use std::os::windows::process::CommandExt;
        use windows::Win32::System::Threading::DETACHED_PROCESS;
        command.creation_flags(DETACHED_PROCESS.0);
    }
    #[cfg(unix)]
    {
        use std::os::unix::process::CommandExt;
        command.process_group(0);
        command.stdin(Stdio::null());
        command.stdout(Stdio::null());
    }

    #[allow(clippy::zombie_processes)]
    let child = command.spawn()?;
    info!("Spawned daemon {}", child.id());
    println!("Started daemon writing into {}", app_dir.display());
    Ok(())
}

fn serve_command(executable: &Path, app_dir: &Path, interval_seconds: u32) -> Command {
    let mut command = Command::new(executable);
    command
        .arg("serve")
        .arg("--dir")
        .arg(app_dir)
        .arg("--interval")
        .arg(interval_seconds.to_string());
    command
}

use std::{
    env,
    path::Path,
    process::{Command, Stdio},
};

use anyhow::{anyhow, Result};
use sysinfo::{get_current_pid, Signal, System};
use tracing::info;

use crate::daemon::args::DaemonConfig;

use super::daemon_path::to_daemon_path;

/// Terminates every other process started from `name`. Daemons flush their counts on SIGTERM, so
/// this waits for each of them to exit.
pub fn kill_previous_servers(name: &Path) -> Result<usize> {
    let system = System::new_all();
    let current_id = get_current_pid().map_err(|e| anyhow!("Failed to get current pid {e}"))?;
    let mut stopped = 0;
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
            info!("Stopping {pid} {:?}", name);
            // This will forcefully terminate the process on Windows.
            if process.kill_with(Signal::Term).is_none() {
                process.kill();
            }
            process.wait();
            stopped += 1;
        }
    }
    Ok(stopped)
}

/// Stops the daemon and anything running `serve`.
pub fn stop_servers() -> Result<usize> {
    let process_name = env::current_exe()?;
    let daemons = kill_previous_servers(&to_daemon_path(process_name.clone()))?;
    let served = kill_previous_servers(&process_name)?;
    Ok(daemons + served)
}

/// Shuts down the previous daemon and starts a new one. On unix the daemon detaches itself.
pub fn restart_server(dir: &Path, config: DaemonConfig) -> Result<()> {
    stop_servers()?;

    let daemon = to_daemon_path(env::current_exe()?);
    let mut command = Command::new(&daemon);
    command.args(daemon_arguments(dir, config));

    #[cfg(unix)]
    {
        use std::os::unix::process::CommandExt;
        command.process_group(0);
    }
    command.stdin(Stdio::null());
    command.stdout(Stdio::null());

    info!("Spawning {:?}", daemon);
    #[allow(clippy::zombie_processes)]
    let _ = command.spawn()?;
    println!("Started daemon, counts are saved into {}", dir.display());
    Ok(())
}

fn daemon_arguments(dir: &Path, config: DaemonConfig) -> Vec<String> {
    vec![
        "--dir".into(),
        dir.display().to_string(),
        "--flush-every".into(),
        config.flush_every.to_string(),
    ]
}

#[cfg(test)]
mod tests {
    use std::{num::NonZeroU32, path::Path};

    use clap::Parser;

    use crate::daemon::args::{DaemonArgs, DaemonConfig};

    use super::daemon_arguments;

    #[test]
    fn test_daemon_arguments_are_accepted_by_daemon() {
        let config = DaemonConfig {
            flush_every: NonZeroU32::new(7).unwrap(),
        };
        let mut args = vec!["keytally-daemon".to_string()];
        args.extend(daemon_arguments(Path::new("/tmp/keytally"), config));

        let parsed = DaemonArgs::parse_from(args);
        assert_eq!(parsed.config, config);
        assert_eq!(parsed.dir.as_deref(), Some(Path::new("/tmp/keytally")));
        assert!(!parsed.force);
    }
}

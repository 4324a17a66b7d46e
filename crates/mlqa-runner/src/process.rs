//! Subprocess spawning, liveness and the exit barrier
//!
//! Every spawned child is owned by a [`ProcessGuard`]: dropping the guard
//! without waiting kills and reaps the child, so no orphan outlives a run.

use std::env;
use std::path::Path;
use std::process::{Child, Command, ExitStatus, Stdio};
use std::sync::{Condvar, Mutex, PoisonError};
use std::thread;
use std::time::Duration;

use crate::error::{Error, Result};

/// Environment variable naming the interpreter used by [`start_script`]
pub const INTERPRETER_ENV: &str = "MLQA_INTERPRETER";

/// Interpreter used when [`INTERPRETER_ENV`] is unset
pub const DEFAULT_INTERPRETER: &str = "python3";

/// RAII guard that kills and reaps its child on drop
#[derive(Debug)]
pub struct ProcessGuard {
    child: Option<Child>,
    pid: u32,
}

impl ProcessGuard {
    /// Take ownership of a spawned child
    #[must_use]
    pub fn new(child: Child) -> Self {
        let pid = child.id();
        Self {
            child: Some(child),
            pid,
        }
    }

    /// Wait for the child to exit
    ///
    /// # Errors
    ///
    /// Returns an error if the child was already consumed or wait fails.
    pub fn wait(&mut self) -> std::io::Result<ExitStatus> {
        let status = self.child.as_mut().map_or_else(
            || Err(std::io::Error::other("Process already consumed")),
            Child::wait,
        )?;
        self.child = None;
        Ok(status)
    }

    /// Release the child without killing it
    #[must_use]
    pub fn take(mut self) -> Option<Child> {
        self.child.take()
    }

    /// Process id
    #[must_use]
    pub const fn pid(&self) -> u32 {
        self.pid
    }
}

impl Drop for ProcessGuard {
    fn drop(&mut self) {
        if let Some(ref mut child) = self.child {
            tracing::warn!(pid = self.pid, "cleaning up child process");
            let _ = child.kill();
            let _ = child.wait();
        }
    }
}

/// Spawn `argv[0]` with the remaining arguments, output discarded
///
/// # Errors
///
/// Returns [`Error::Spawn`] if `argv` is empty or the program cannot start.
pub fn spawn(argv: &[String]) -> Result<ProcessGuard> {
    let command_line = argv.join(" ");
    let (program, args) = argv.split_first().ok_or_else(|| Error::Spawn {
        command: command_line.clone(),
        reason: "empty command line".to_string(),
    })?;
    let child = Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()
        .map_err(|e| Error::Spawn {
            command: command_line.clone(),
            reason: e.to_string(),
        })?;
    tracing::info!(pid = child.id(), command = %command_line, "spawned process");
    Ok(ProcessGuard::new(child))
}

/// Interpreter for [`start_script`]
#[must_use]
pub fn interpreter() -> String {
    env::var(INTERPRETER_ENV)
        .ok()
        .filter(|v| !v.trim().is_empty())
        .unwrap_or_else(|| DEFAULT_INTERPRETER.to_string())
}

/// Run a program in the background and return its pid
///
/// A detached reaper thread waits on the child so that it does not linger
/// as a zombie once it exits.
///
/// # Errors
///
/// Returns [`Error::Spawn`] if the program cannot start.
pub fn start_process(argv: &[String]) -> Result<u32> {
    let guard = spawn(argv)?;
    let pid = guard.pid();
    if let Some(mut child) = guard.take() {
        thread::spawn(move || {
            let status = child.wait();
            tracing::debug!(pid, ?status, "background process exited");
        });
    }
    Ok(pid)
}

/// Run a script with the configured interpreter and return its pid
///
/// # Errors
///
/// Returns [`Error::Spawn`] if the interpreter cannot start.
pub fn start_script(argv: &[String]) -> Result<u32> {
    start_process(&script_command(argv))
}

/// Prefix a script command line with the interpreter
#[must_use]
pub fn script_command(argv: &[String]) -> Vec<String> {
    std::iter::once(interpreter()).chain(argv.iter().cloned()).collect()
}

/// Whether `pid` names a running (non-zombie) process
#[must_use]
pub fn process_alive(pid: u32) -> bool {
    let proc_root = Path::new("/proc");
    if proc_root.is_dir() {
        return std::fs::read_to_string(proc_root.join(pid.to_string()).join("stat"))
            .ok()
            .and_then(|stat| proc_state(&stat))
            .is_some_and(|state| !matches!(state, 'Z' | 'X'));
    }
    Command::new("ps")
        .args(["-p", &pid.to_string(), "-o", "stat="])
        .output()
        .ok()
        .filter(|out| out.status.success())
        .and_then(|out| String::from_utf8_lossy(&out.stdout).trim().chars().next())
        .is_some_and(|state| state != 'Z')
}

/// State letter from a `/proc/<pid>/stat` line
fn proc_state(stat: &str) -> Option<char> {
    let (_, rest) = stat.rsplit_once(')')?;
    rest.trim_start().chars().next()
}

/// One-shot barrier set when the monitored process exits
///
/// Monitors sleep on it between samples so they wake as soon as the
/// process is gone.
#[derive(Debug, Default)]
pub struct ExitSignal {
    exited: Mutex<bool>,
    cond: Condvar,
}

impl ExitSignal {
    /// Unset signal
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark the process as exited and wake every waiter
    pub fn notify(&self) {
        let mut exited = self.exited.lock().unwrap_or_else(PoisonError::into_inner);
        *exited = true;
        self.cond.notify_all();
    }

    /// Whether the process has exited
    #[must_use]
    pub fn is_set(&self) -> bool {
        *self.exited.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Sleep up to `timeout`, returning early on exit. Returns the flag.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        let guard = self.exited.lock().unwrap_or_else(PoisonError::into_inner);
        let (guard, _) = self
            .cond
            .wait_timeout_while(guard, timeout, |exited| !*exited)
            .unwrap_or_else(PoisonError::into_inner);
        *guard
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Instant;

    fn argv(items: &[&str]) -> Vec<String> {
        items.iter().map(ToString::to_string).collect()
    }

    #[test]
    fn test_spawn_empty_command() {
        let err = spawn(&[]).unwrap_err();
        assert!(matches!(err, Error::Spawn { .. }));
    }

    #[test]
    fn test_spawn_missing_program() {
        let err = spawn(&argv(&["/nonexistent/mlqa-binary"])).unwrap_err();
        assert_eq!(err.kind_name(), "SpawnError");
    }

    #[cfg(unix)]
    #[test]
    fn test_guard_wait() {
        let mut guard = spawn(&argv(&["true"])).expect("spawn");
        let status = guard.wait().expect("wait");
        assert!(status.success());
        assert!(guard.wait().is_err());
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn test_guard_drop_kills() {
        let guard = spawn(&argv(&["sleep", "60"])).expect("spawn");
        let pid = guard.pid();
        assert!(process_alive(pid));
        drop(guard);
        assert!(!process_alive(pid));
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn test_start_process_is_reaped() {
        let pid = start_process(&argv(&["true"])).expect("start");
        let deadline = Instant::now() + Duration::from_secs(5);
        while process_alive(pid) && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(20));
        }
        assert!(!process_alive(pid));
    }

    #[test]
    fn test_script_command_prefixes_interpreter() {
        let cmd = script_command(&argv(&["train.py", "--epochs", "1"]));
        assert_eq!(cmd.len(), 4);
        assert_eq!(cmd[1], "train.py");
    }

    #[test]
    fn test_proc_state_parsing() {
        assert_eq!(proc_state("42 (my (odd) name) S 1 2 3"), Some('S'));
        assert_eq!(proc_state("42 (x) Z 1"), Some('Z'));
        assert_eq!(proc_state("garbage"), None);
    }

    #[test]
    fn test_exit_signal_wakes_waiter() {
        let signal = Arc::new(ExitSignal::new());
        assert!(!signal.is_set());
        let waiter = {
            let signal = Arc::clone(&signal);
            thread::spawn(move || {
                let start = Instant::now();
                let set = signal.wait_timeout(Duration::from_secs(30));
                (set, start.elapsed())
            })
        };
        thread::sleep(Duration::from_millis(50));
        signal.notify();
        let (set, elapsed) = waiter.join().expect("join");
        assert!(set);
        assert!(elapsed < Duration::from_secs(30));
    }

    #[test]
    fn test_exit_signal_times_out() {
        let signal = ExitSignal::new();
        assert!(!signal.wait_timeout(Duration::from_millis(10)));
    }
}

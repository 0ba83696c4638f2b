// src/scoring/executable.rs

//! Executable scoring: run submitted code followed by the reference test
//! code as one throwaway program.

use std::ffi::OsString;
use std::io::Write;
use std::os::unix::process::ExitStatusExt;
use std::path::PathBuf;
use std::process::{ExitStatus, Stdio};

use anyhow::Context;
use nix::errno::Errno;
use nix::sys::signal::{Signal, killpg};
use nix::unistd::Pid;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::ConfigFile;
use crate::errors::Result;

/// How scoring programs are launched.
#[derive(Debug, Clone)]
pub struct ProgramSpec {
    pub program: String,
    pub args: Vec<String>,
    /// Environment variable extended with `search_paths`; empty to skip.
    pub search_path_var: String,
    pub search_paths: Vec<PathBuf>,
    pub temp_dir: Option<PathBuf>,
    pub file_suffix: String,
}

impl ProgramSpec {
    /// Relative search paths are resolved against the current directory.
    pub fn from_config(cfg: &ConfigFile) -> Self {
        let cwd = std::env::current_dir().ok();
        let search_paths = cfg
            .scoring
            .search_paths
            .iter()
            .map(|p| match &cwd {
                Some(cwd) if p.is_relative() => cwd.join(p),
                _ => p.clone(),
            })
            .collect();

        Self {
            program: cfg.scoring.program.clone(),
            args: cfg.scoring.args.clone(),
            search_path_var: cfg.scoring.search_path_var.clone(),
            search_paths,
            temp_dir: cfg
                .scoring
                .temp_dir
                .clone()
                .filter(|dir| !dir.as_os_str().is_empty()),
            file_suffix: cfg.scoring.file_suffix.clone(),
        }
    }

    /// `sh` with no search path handling.
    pub fn shell() -> Self {
        Self {
            program: "sh".to_string(),
            args: Vec::new(),
            search_path_var: String::new(),
            search_paths: Vec::new(),
            temp_dir: None,
            file_suffix: ".sh".to_string(),
        }
    }

    /// Configured paths first, then whatever the variable already held.
    fn search_path_value(&self) -> Option<OsString> {
        if self.search_path_var.is_empty() {
            return None;
        }
        let mut paths = self.search_paths.clone();
        if let Some(inherited) = std::env::var_os(&self.search_path_var) {
            paths.extend(std::env::split_paths(&inherited));
        }
        match std::env::join_paths(paths) {
            Ok(value) => Some(value),
            Err(e) => {
                warn!(var = %self.search_path_var, error = %e, "cannot build search path; leaving it unchanged");
                None
            }
        }
    }
}

/// How the scoring process ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProgramExit {
    Success,
    /// Non-zero exit, or death by a signal other than SIGKILL.
    Failed(Option<i32>),
    /// Cancelled by us, or SIGKILLed from outside.
    Killed,
}

#[derive(Debug, Clone)]
pub struct ProgramOutput {
    pub exit: ProgramExit,
    pub stdout: String,
    pub stderr: String,
}

fn classify(status: ExitStatus) -> ProgramExit {
    if status.success() {
        ProgramExit::Success
    } else if status.signal() == Some(Signal::SIGKILL as i32) {
        ProgramExit::Killed
    } else {
        ProgramExit::Failed(status.code())
    }
}

fn drain<R>(reader: Option<R>) -> JoinHandle<Vec<u8>>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut buf = Vec::new();
        if let Some(mut reader) = reader {
            if let Err(e) = reader.read_to_end(&mut buf).await {
                debug!(error = %e, "scoring output stream ended with error");
            }
        }
        buf
    })
}

/// Resolves with the bytes read, or empty if the reader task was aborted.
async fn join_drain(handle: JoinHandle<Vec<u8>>) -> Vec<u8> {
    match handle.await {
        Ok(buf) => buf,
        Err(e) => {
            debug!(error = %e, "scoring output reader did not finish");
            Vec::new()
        }
    }
}

/// SIGKILL every process left in the program's group.
fn kill_group(pid: Option<u32>) {
    let Some(pid) = pid else {
        return;
    };
    match killpg(Pid::from_raw(pid as i32), Signal::SIGKILL) {
        Ok(()) | Err(Errno::ESRCH) => {}
        Err(e) => debug!(pid, error = %e, "killpg failed"),
    }
}

/// Write `source` to a temporary file and run it to completion, or until
/// `cancel` fires.
///
/// The program runs in its own process group. Once the program exits, or on
/// cancellation, the whole group is SIGKILLed, so background processes it
/// started cannot hold its output open. A cancel that arrives while output
/// is still being drained ends the run as [`ProgramExit::Killed`]. The
/// temporary file is removed when this function returns.
pub async fn run_program(
    spec: &ProgramSpec,
    source: &str,
    cancel: &mut oneshot::Receiver<()>,
) -> Result<ProgramOutput> {
    let mut builder = tempfile::Builder::new();
    builder.prefix("kernelgate-score-").suffix(&spec.file_suffix);
    let mut file = match &spec.temp_dir {
        Some(dir) => builder.tempfile_in(dir),
        None => builder.tempfile(),
    }
    .context("creating scoring program file")?;
    file.write_all(source.as_bytes())
        .and_then(|_| file.flush())
        .context("writing scoring program file")?;

    let mut cmd = Command::new(&spec.program);
    cmd.args(&spec.args)
        .arg(file.path())
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .process_group(0)
        .kill_on_drop(true);
    if let Some(value) = spec.search_path_value() {
        cmd.env(&spec.search_path_var, value);
    }

    let mut child = cmd
        .spawn()
        .with_context(|| format!("spawning scoring program '{}'", spec.program))?;
    let pid = child.id();
    info!(program = %spec.program, pid, "scoring process started");

    let stdout = drain(child.stdout.take());
    let stderr = drain(child.stderr.take());
    let aborts = [stdout.abort_handle(), stderr.abort_handle()];

    // A dropped sender is not a cancellation.
    let cancelled = async {
        if cancel.await.is_err() {
            std::future::pending::<()>().await;
        }
    };
    tokio::pin!(cancelled);

    let reaped = tokio::select! {
        status = child.wait() => Some(status.context("waiting for scoring process")?),
        () = &mut cancelled => None,
    };

    let (exit, output) = match reaped {
        Some(status) => {
            // Leftover background processes would keep the pipes open.
            kill_group(pid);
            tokio::select! {
                output = async { (join_drain(stdout).await, join_drain(stderr).await) } => {
                    (classify(status), Some(output))
                }
                () = &mut cancelled => {
                    info!(pid, "cancellation requested while output was still open");
                    (ProgramExit::Killed, None)
                }
            }
        }
        None => {
            info!(pid, "cancellation requested; killing scoring process group");
            kill_group(pid);
            if let Err(e) = child.kill().await {
                debug!(error = %e, "kill after killpg failed");
            }
            (ProgramExit::Killed, None)
        }
    };

    let (stdout, stderr) = match output {
        Some(output) => output,
        None => {
            // Pipes may be held by a process outside the group; stop reading.
            for abort in &aborts {
                abort.abort();
            }
            (Vec::new(), Vec::new())
        }
    };
    debug!(?exit, stdout_len = stdout.len(), stderr_len = stderr.len(), "scoring process finished");

    Ok(ProgramOutput {
        exit,
        stdout: String::from_utf8_lossy(&stdout).into_owned(),
        stderr: String::from_utf8_lossy(&stderr).into_owned(),
    })
}

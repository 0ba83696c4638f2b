// src/kernel/session.rs

//! A single persistent kernel process and its output channel.

use std::process::Stdio;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use anyhow::{Context, anyhow};
use chrono::{DateTime, Utc};
use nix::errno::Errno;
use nix::sys::signal::{Signal, killpg};
use nix::unistd::Pid;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin, Command};
use tokio::sync::{Mutex, OwnedMutexGuard, mpsc};
use tracing::{debug, info, warn};

use crate::config::ConfigFile;
use crate::errors::Result;
use crate::kernel::dialect::KernelLine;
use crate::kernel::event::{EventContent, ExecutionEvent, ExecutionState, StreamName};
use crate::types::{KernelDialect, SessionId};

/// How long a fresh kernel may take to answer its first (empty) submission.
const READY_TIMEOUT: Duration = Duration::from_secs(30);

/// Receiving half of one submission's event stream.
pub type EventStream = mpsc::Receiver<ExecutionEvent>;

/// How to launch a kernel process.
#[derive(Debug, Clone)]
pub struct KernelSpec {
    pub dialect: KernelDialect,
    pub program: String,
    pub args: Vec<String>,
    pub interrupt_signal: Signal,
}

impl KernelSpec {
    pub fn from_config(cfg: &ConfigFile) -> Self {
        Self {
            dialect: cfg.kernel.dialect,
            program: cfg.kernel.effective_program(),
            args: cfg.kernel.args.clone(),
            interrupt_signal: cfg.interrupt_signal,
        }
    }

    /// A plain `sh` kernel.
    pub fn shell() -> Self {
        Self {
            dialect: KernelDialect::Shell,
            program: "sh".to_string(),
            args: Vec::new(),
            interrupt_signal: Signal::SIGINT,
        }
    }
}

/// Stdin plus merged output lines. Holding the lock is what makes a session
/// busy: whoever owns the guard owns the kernel until it reports idle.
struct KernelIo {
    stdin: ChildStdin,
    lines: mpsc::Receiver<(StreamName, String)>,
}

/// A persistent interpreter process accepting one submission at a time.
///
/// Concurrent `submit` calls queue FIFO on the I/O lock, so output of two
/// submissions never interleaves.
pub struct ExecutionSession {
    id: SessionId,
    dialect: KernelDialect,
    interrupt_signal: Signal,
    created_at: DateTime<Utc>,
    pid: Option<u32>,
    child: Mutex<Child>,
    io: Arc<Mutex<KernelIo>>,
    busy: Arc<AtomicBool>,
    execution_count: AtomicU64,
}

impl std::fmt::Debug for ExecutionSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecutionSession")
            .field("id", &self.id)
            .field("dialect", &self.dialect)
            .field("pid", &self.pid)
            .field("created_at", &self.created_at)
            .finish_non_exhaustive()
    }
}

impl ExecutionSession {
    /// Spawn the kernel process and start draining its output.
    pub async fn spawn(id: SessionId, spec: &KernelSpec) -> Result<Self> {
        info!(session = %id, program = %spec.program, dialect = ?spec.dialect, "starting kernel");

        let mut cmd = Command::new(&spec.program);
        cmd.args(&spec.args)
            .args(spec.dialect.spawn_args())
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            // Own process group, so interrupts reach whatever the kernel runs.
            .process_group(0)
            .kill_on_drop(true);

        let mut child = cmd
            .spawn()
            .with_context(|| format!("spawning kernel '{}' for session '{}'", spec.program, id))?;

        let mut stdin = child.stdin.take().context("kernel stdin not captured")?;
        let stdout = child.stdout.take().context("kernel stdout not captured")?;
        let stderr = child.stderr.take().context("kernel stderr not captured")?;

        let (line_tx, lines) = mpsc::channel(256);
        spawn_line_reader(id.clone(), StreamName::Stdout, stdout, line_tx.clone());
        spawn_line_reader(id.clone(), StreamName::Stderr, stderr, line_tx);

        if let Some(preamble) = spec.dialect.preamble() {
            stdin
                .write_all(preamble.as_bytes())
                .await
                .with_context(|| format!("initialising kernel for session '{id}'"))?;
            stdin.flush().await?;
        }

        let mut io = KernelIo { stdin, lines };
        wait_ready(&id, spec.dialect, &mut io).await?;
        debug!(session = %id, "kernel ready");

        Ok(Self {
            pid: child.id(),
            id,
            dialect: spec.dialect,
            interrupt_signal: spec.interrupt_signal,
            created_at: Utc::now(),
            child: Mutex::new(child),
            io: Arc::new(Mutex::new(io)),
            busy: Arc::new(AtomicBool::new(false)),
            execution_count: AtomicU64::new(0),
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// True while a submission is between its busy and idle events.
    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::SeqCst)
    }

    /// Whether the kernel process is still running. Never fails.
    pub async fn is_alive(&self) -> bool {
        let mut child = self.child.lock().await;
        matches!(child.try_wait(), Ok(None))
    }

    /// Submit code and get its event stream.
    ///
    /// Waits (FIFO) while another submission is running. The stream ends
    /// with exactly one idle status event, even if the kernel dies.
    pub async fn submit(&self, code: &str) -> Result<EventStream> {
        let mut io = Arc::clone(&self.io).lock_owned().await;
        let count = self.execution_count.fetch_add(1, Ordering::SeqCst) + 1;
        let marker = format!("__kernelgate_{}__", uuid::Uuid::new_v4().simple());
        let (tx, rx) = mpsc::channel(64);

        self.busy.store(true, Ordering::SeqCst);
        debug!(session = %self.id, execution_count = count, "submitting code");

        let payload = self.dialect.frame(code, &marker);
        let written = async {
            io.stdin.write_all(payload.as_bytes()).await?;
            io.stdin.flush().await
        }
        .await;

        let run = Submission {
            session: self.id.clone(),
            dialect: self.dialect,
            marker,
            count,
            tx,
            busy: Arc::clone(&self.busy),
        };

        match written {
            Ok(()) => {
                tokio::spawn(run.stream_until_idle(io));
            }
            Err(e) => {
                warn!(session = %self.id, error = %e, "kernel stdin closed; reporting dead kernel");
                tokio::spawn(run.report_dead(e.to_string(), io));
            }
        }

        Ok(rx)
    }

    /// Deliver the interrupt signal to the kernel's process group.
    pub fn interrupt(&self) -> Result<()> {
        let Some(pid) = self.pid else {
            return Ok(());
        };
        match killpg(Pid::from_raw(pid as i32), self.interrupt_signal) {
            Ok(()) => {
                info!(session = %self.id, signal = %self.interrupt_signal, "kernel interrupted");
                Ok(())
            }
            Err(Errno::ESRCH) => {
                debug!(session = %self.id, "interrupt: kernel process group already gone");
                Ok(())
            }
            Err(e) => Err(std::io::Error::from(e).into()),
        }
    }

    /// Kill the kernel (and anything it started) and reap it.
    pub async fn shutdown(&self) {
        let mut child = self.child.lock().await;
        if let Some(pid) = self.pid {
            if let Err(e) = killpg(Pid::from_raw(pid as i32), Signal::SIGKILL) {
                debug!(session = %self.id, error = %e, "killpg on shutdown failed");
            }
        }
        if let Err(e) = child.kill().await {
            debug!(session = %self.id, error = %e, "kernel already exited");
        }
        info!(session = %self.id, "kernel stopped");
    }
}

/// Submit empty code and wait for its completion markers, so a session is
/// only handed out once its kernel answers. Startup output is discarded.
async fn wait_ready(id: &str, dialect: KernelDialect, io: &mut KernelIo) -> Result<()> {
    let marker = format!("__kernelgate_{}__", uuid::Uuid::new_v4().simple());
    io.stdin
        .write_all(dialect.frame("", &marker).as_bytes())
        .await
        .with_context(|| format!("kernel for session '{id}' closed its input during startup"))?;
    io.stdin.flush().await?;

    let lines = &mut io.lines;
    let handshake = async {
        let mut remaining = dialect.markers_expected();
        while remaining > 0 {
            let (source, line) = lines
                .recv()
                .await
                .ok_or_else(|| anyhow!("kernel for session '{id}' exited during startup"))?;
            for item in dialect.parse_line(source, &line, &marker) {
                match item {
                    KernelLine::Done { .. } => remaining -= 1,
                    KernelLine::Output(content) => {
                        debug!(session = %id, ?content, "discarding kernel startup output")
                    }
                }
            }
        }
        Ok::<(), anyhow::Error>(())
    };

    tokio::time::timeout(READY_TIMEOUT, handshake)
        .await
        .map_err(|_| anyhow!("kernel for session '{id}' not ready after {READY_TIMEOUT:?}"))??;
    Ok(())
}

fn spawn_line_reader<R>(
    session: SessionId,
    name: StreamName,
    pipe: R,
    tx: mpsc::Sender<(StreamName, String)>,
) where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut lines = BufReader::new(pipe).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            if tx.send((name, line)).await.is_err() {
                break;
            }
        }
        debug!(session = %session, stream = ?name, "kernel output closed");
    });
}

/// State of one in-flight submission.
struct Submission {
    session: SessionId,
    dialect: KernelDialect,
    marker: String,
    count: u64,
    tx: mpsc::Sender<ExecutionEvent>,
    busy: Arc<AtomicBool>,
}

impl Submission {
    async fn emit(&self, content: EventContent) {
        // A departed listener must not stop the drain, or the next
        // submission would read this one's output.
        let _ = self.tx.send(ExecutionEvent::new(self.count, content)).await;
    }

    async fn stream_until_idle(self, mut io: OwnedMutexGuard<KernelIo>) {
        self.emit(EventContent::Status {
            execution_state: ExecutionState::Busy,
        })
        .await;

        let mut remaining = self.dialect.markers_expected();
        let mut exit_status = None;
        let mut stderr_text = String::new();

        while remaining > 0 {
            let Some((source, line)) = io.lines.recv().await else {
                warn!(session = %self.session, "kernel exited during execution");
                self.emit(kernel_died("kernel exited during execution")).await;
                break;
            };

            for item in self.dialect.parse_line(source, &line, &self.marker) {
                match item {
                    KernelLine::Output(content) => {
                        if let EventContent::Stream {
                            name: StreamName::Stderr,
                            text,
                        } = &content
                        {
                            stderr_text.push_str(text);
                        }
                        self.emit(content).await;
                    }
                    KernelLine::Done { status } => {
                        remaining = remaining.saturating_sub(1);
                        if status.is_some() {
                            exit_status = status;
                        }
                    }
                }
            }
        }

        if let Some(error) = self.dialect.finish(exit_status, &stderr_text) {
            self.emit(error).await;
        }
        self.finish(io).await;
    }

    async fn report_dead(self, reason: String, io: OwnedMutexGuard<KernelIo>) {
        self.emit(EventContent::Status {
            execution_state: ExecutionState::Busy,
        })
        .await;
        self.emit(kernel_died(&reason)).await;
        self.finish(io).await;
    }

    async fn finish(self, io: OwnedMutexGuard<KernelIo>) {
        self.busy.store(false, Ordering::SeqCst);
        debug!(session = %self.session, execution_count = self.count, "kernel idle");
        self.emit(EventContent::Status {
            execution_state: ExecutionState::Idle,
        })
        .await;
        // Release the kernel only after the terminal event is queued.
        drop(io);
    }
}

fn kernel_died(reason: &str) -> EventContent {
    EventContent::Error {
        ename: "KernelDied".to_string(),
        evalue: reason.to_string(),
        traceback: Vec::new(),
    }
}

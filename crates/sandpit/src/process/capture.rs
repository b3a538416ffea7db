//! Spawning children under wall clock and output limits
//!
//! Each child gets its own process group on unix so a timeout or an output
//! overflow tears down everything it started, not just the direct child.

use std::process::{ExitStatus, Stdio};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::{Child, Command};
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tracing::{debug, instrument, warn};

use crate::process::ProcessError;
use crate::types::ResourceLimits;

const READ_CHUNK: usize = 8 * 1024;

/// How long to wait for pipes to drain and for a killed child to be reaped
const REAP_GRACE: Duration = Duration::from_millis(500);

/// Limits enforced on a single child process
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CaptureLimits {
    pub wall_time: Duration,
    /// Byte cap applied to each of stdout and stderr
    pub max_output: usize,
}

impl From<&ResourceLimits> for CaptureLimits {
    fn from(limits: &ResourceLimits) -> Self {
        Self {
            wall_time: limits.wall_time(),
            max_output: limits.max_output_bytes(),
        }
    }
}

/// Why the child stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Termination {
    Exited(ExitStatus),
    TimedOut,
    OutputExceeded,
}

/// Output of a finished child
#[derive(Debug, Clone)]
pub struct CapturedOutput {
    pub termination: Termination,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
    pub elapsed: Duration,
}

impl CapturedOutput {
    pub fn stdout_lossy(&self) -> String {
        String::from_utf8_lossy(&self.stdout).into_owned()
    }

    pub fn stderr_lossy(&self) -> String {
        String::from_utf8_lossy(&self.stderr).into_owned()
    }

    /// Exit code if the child exited on its own
    pub fn exit_code(&self) -> Option<i32> {
        match self.termination {
            Termination::Exited(status) => status.code(),
            _ => None,
        }
    }
}

/// Bytes read from one pipe
#[derive(Debug, Default)]
struct Stream {
    bytes: Vec<u8>,
    truncated: bool,
}

/// A pipe reader whose buffer survives the task being aborted
struct Reader {
    stream: Arc<Mutex<Stream>>,
    task: JoinHandle<()>,
}

impl Reader {
    fn spawn<R>(pipe: R, cap: usize, overflow: Arc<Notify>) -> Self
    where
        R: AsyncRead + Unpin + Send + 'static,
    {
        let stream = Arc::new(Mutex::new(Stream::default()));
        let task = tokio::spawn(read_capped(pipe, cap, overflow, stream.clone()));
        Self { stream, task }
    }
}

fn lock(stream: &Mutex<Stream>) -> MutexGuard<'_, Stream> {
    stream.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Spawn `command` and collect its output
///
/// Stdin is closed, stdout and stderr are captured up to
/// [`CaptureLimits::max_output`] bytes each. The child is killed when the
/// wall time elapses or either stream overflows; in both cases the captured
/// prefix is still returned.
#[instrument(skip(command), fields(program = ?command.as_std().get_program()))]
pub async fn run_captured(
    mut command: Command,
    limits: &CaptureLimits,
) -> Result<CapturedOutput, ProcessError> {
    command
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    #[cfg(unix)]
    command.process_group(0);

    let start = Instant::now();
    let mut child = command.spawn().map_err(ProcessError::Spawn)?;
    // The group id equals the child's pid; `Child::id` is gone once reaped
    let pgid = child.id();
    debug!(pid = pgid, "spawned child");

    let overflow = Arc::new(Notify::new());
    let stdout = child
        .stdout
        .take()
        .map(|pipe| Reader::spawn(pipe, limits.max_output, overflow.clone()));
    let stderr = child
        .stderr
        .take()
        .map(|pipe| Reader::spawn(pipe, limits.max_output, overflow.clone()));

    let termination = tokio::select! {
        status = child.wait() => Termination::Exited(status.map_err(ProcessError::Wait)?),
        () = tokio::time::sleep(limits.wall_time) => Termination::TimedOut,
        () = overflow.notified() => Termination::OutputExceeded,
    };
    let elapsed = start.elapsed();

    match termination {
        // Reap anything the child left running in its group
        Termination::Exited(_) => kill_group(pgid),
        Termination::TimedOut | Termination::OutputExceeded => {
            debug!(?termination, "killing child");
            kill(&mut child, pgid).await;
        }
    }

    let stdout = collect(stdout).await;
    let stderr = collect(stderr).await;

    let termination = match termination {
        Termination::Exited(_) if stdout.truncated || stderr.truncated => {
            Termination::OutputExceeded
        }
        other => other,
    };

    debug!(
        ?termination,
        elapsed_ms = elapsed.as_millis() as u64,
        stdout_len = stdout.bytes.len(),
        stderr_len = stderr.bytes.len(),
        "child finished"
    );

    Ok(CapturedOutput {
        termination,
        stdout: stdout.bytes,
        stderr: stderr.bytes,
        elapsed,
    })
}

/// Read `pipe` to EOF into `stream`, keeping at most `cap` bytes
///
/// Stops reading and signals `overflow` as soon as the cap is crossed.
async fn read_capped<R>(
    mut pipe: R,
    cap: usize,
    overflow: Arc<Notify>,
    stream: Arc<Mutex<Stream>>,
) where
    R: AsyncRead + Unpin,
{
    let mut chunk = [0u8; READ_CHUNK];
    loop {
        match pipe.read(&mut chunk).await {
            Ok(0) => return,
            Ok(n) => {
                let mut buffer = lock(&stream);
                let room = cap.saturating_sub(buffer.bytes.len());
                if n > room {
                    buffer.bytes.extend_from_slice(&chunk[..room]);
                    buffer.truncated = true;
                    overflow.notify_one();
                    return;
                }
                buffer.bytes.extend_from_slice(&chunk[..n]);
            }
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(e) => {
                debug!(error = %e, "failed to read child output");
                return;
            }
        }
    }
}

/// Wait briefly for a reader to hit EOF, then take whatever it has read
async fn collect(reader: Option<Reader>) -> Stream {
    let Some(mut reader) = reader else {
        return Stream::default();
    };
    match tokio::time::timeout(REAP_GRACE, &mut reader.task).await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => warn!(error = %e, "output reader task failed"),
        Err(_) => {
            // A descendant outside the process group still holds the pipe open
            reader.task.abort();
            warn!("output reader did not finish after the child exited");
        }
    }
    std::mem::take(&mut *lock(&reader.stream))
}

async fn kill(child: &mut Child, pgid: Option<u32>) {
    kill_group(pgid);
    if let Err(e) = child.start_kill() {
        debug!(error = %e, "start_kill failed");
    }
    match tokio::time::timeout(REAP_GRACE, child.wait()).await {
        Ok(Ok(status)) => debug!(?status, "child reaped"),
        Ok(Err(e)) => warn!(error = %e, "failed to reap killed child"),
        Err(_) => warn!(pid = pgid, "killed child was not reaped in time"),
    }
}

#[cfg(unix)]
fn kill_group(pgid: Option<u32>) {
    let Some(pgid) = pgid.and_then(|pid| libc::pid_t::try_from(pid).ok()) else {
        return;
    };
    // SAFETY: kill(2) has no memory-safety preconditions; a negative pid
    // addresses the process group created by `process_group(0)`.
    let rc = unsafe { libc::kill(-pgid, libc::SIGKILL) };
    if rc != 0 {
        debug!(pgid, error = %std::io::Error::last_os_error(), "process group already gone");
    }
}

#[cfg(not(unix))]
fn kill_group(_pgid: Option<u32>) {}

//! In-process JavaScript execution
//!
//! Every run gets a brand new V8 isolate on its own OS thread. The only
//! capability injected into the isolate is a `console` that records lines;
//! no ops are registered, so user code has no filesystem, network, process
//! or timer access.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use deno_core::{JsRuntime, PollEventLoopOptions, RuntimeOptions, v8};
use tracing::{debug, instrument, warn};

use crate::runner::SandboxError;
use crate::types::{ExecutionResult, LimitExceeded, ResourceLimits};

/// Installs the recording `console` and hides the embedder's globals.
/// Evaluates to the array that collects output lines.
const BOOTSTRAP: &str = r#"
((globalThis) => {
    const lines = [];
    const apply = Reflect.apply;
    const join = Array.prototype.join;
    const push = Array.prototype.push;
    const record = (...args) => {
        apply(push, lines, [apply(join, args, [' '])]);
    };
    Object.defineProperty(globalThis, 'console', {
        value: Object.freeze({
            log: record,
            info: record,
            warn: record,
            error: record,
            debug: record,
        }),
        writable: false,
        configurable: false,
        enumerable: false,
    });
    delete globalThis.Deno;
    return lines;
})(globalThis);
"#;

const ERROR_PREFIX: &str = "JavaScript execution error";

/// Runs JavaScript source in a fresh, capability-free V8 isolate
#[derive(Debug, Clone, Copy, Default)]
pub struct JavaScriptSandbox;

impl JavaScriptSandbox {
    pub fn new() -> Self {
        Self
    }

    /// Evaluate `source` under `limits`
    ///
    /// Exceptions, timeouts and heap exhaustion are reported through the
    /// returned [`ExecutionResult`]. An error is returned only when the
    /// isolate thread cannot be started or dies.
    #[instrument(skip(self, source, limits), fields(len = source.len()))]
    pub async fn run(
        &self,
        source: String,
        limits: &ResourceLimits,
    ) -> Result<ExecutionResult, SandboxError> {
        let limits = IsolateLimits::from(limits);
        let (tx, rx) = tokio::sync::oneshot::channel();

        std::thread::Builder::new()
            .name("sandpit-js".to_owned())
            .spawn(move || {
                let result = evaluate(&source, limits);
                if tx.send(result).is_err() {
                    warn!("javascript result receiver dropped");
                }
            })?;

        rx.await
            .map_err(|_| SandboxError::Internal("javascript thread panicked".to_owned()))?
    }
}

#[derive(Debug, Clone, Copy)]
struct IsolateLimits {
    wall_time: Duration,
    max_heap: usize,
    max_output: usize,
}

impl From<&ResourceLimits> for IsolateLimits {
    fn from(limits: &ResourceLimits) -> Self {
        Self {
            wall_time: limits.wall_time(),
            max_heap: limits.memory_bytes(),
            max_output: limits.max_output_bytes(),
        }
    }
}

/// Run one isolate to completion on the current thread
fn evaluate(source: &str, limits: IsolateLimits) -> Result<ExecutionResult, SandboxError> {
    let rt = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;
    rt.block_on(evaluate_in_isolate(source, limits))
}

/// State for the near-heap-limit callback
struct HeapLimitState {
    handle: v8::IsolateHandle,
    triggered: AtomicBool,
}

/// Terminates execution the first time the heap limit is approached and
/// grants 1 MB so the termination can unwind.
extern "C" fn near_heap_limit_callback(
    data: *mut std::ffi::c_void,
    current_heap_limit: usize,
    _initial_heap_limit: usize,
) -> usize {
    // SAFETY: `data` points to the `HeapLimitState` boxed in
    // `evaluate_in_isolate`, which outlives the isolate and removes this
    // callback before dropping it.
    let state = unsafe { &*(data as *const HeapLimitState) };
    if !state.triggered.swap(true, Ordering::SeqCst) {
        state.handle.terminate_execution();
    }
    current_heap_limit + 1024 * 1024
}

/// Terminates the isolate when the wall clock limit elapses
struct Watchdog {
    stop: mpsc::Sender<()>,
    fired: Arc<AtomicBool>,
    thread: JoinHandle<()>,
}

impl Watchdog {
    fn start(handle: v8::IsolateHandle, limit: Duration) -> std::io::Result<Self> {
        let (cancel, cancelled) = mpsc::channel::<()>();
        let fired = Arc::new(AtomicBool::new(false));
        let flag = fired.clone();

        let thread = std::thread::Builder::new()
            .name("sandpit-js-watchdog".to_owned())
            .spawn(move || {
                let expired = match Instant::now().checked_add(limit) {
                    Some(_) => matches!(
                        cancelled.recv_timeout(limit),
                        Err(RecvTimeoutError::Timeout)
                    ),
                    // Deadline not representable, so the limit never fires
                    None => false,
                };
                if expired {
                    flag.store(true, Ordering::SeqCst);
                    handle.terminate_execution();
                }
            })?;

        Ok(Self {
            stop: cancel,
            fired,
            thread,
        })
    }

    /// Stop the watchdog and report whether it terminated the isolate
    fn cancel(self) -> bool {
        // The thread may already have exited after firing
        let _ = self.stop.send(());
        if self.thread.join().is_err() {
            warn!("javascript watchdog panicked");
        }
        self.fired.load(Ordering::SeqCst)
    }
}

async fn evaluate_in_isolate(
    source: &str,
    limits: IsolateLimits,
) -> Result<ExecutionResult, SandboxError> {
    let start = Instant::now();
    let mut runtime = JsRuntime::new(RuntimeOptions {
        create_params: Some(v8::CreateParams::default().heap_limits(0, limits.max_heap)),
        ..Default::default()
    });

    let heap_state = Box::new(HeapLimitState {
        handle: runtime.v8_isolate().thread_safe_handle(),
        triggered: AtomicBool::new(false),
    });
    runtime.v8_isolate().add_near_heap_limit_callback(
        near_heap_limit_callback,
        &*heap_state as *const HeapLimitState as *mut std::ffi::c_void,
    );

    let run = run_main(&mut runtime, source, limits.wall_time).await;
    let elapsed = start.elapsed();

    runtime
        .v8_isolate()
        .remove_near_heap_limit_callback(near_heap_limit_callback, 0);
    let heap_exceeded = heap_state.triggered.load(Ordering::SeqCst);
    drop(runtime);
    drop(heap_state);

    let (output, timed_out) = run?;
    let result = if heap_exceeded {
        warn!(max_heap = limits.max_heap, "javascript heap limit reached");
        ExecutionResult {
            limit_exceeded: LimitExceeded::Memory,
            ..ExecutionResult::runtime_error(format!(
                "{ERROR_PREFIX}: memory limit of {} KB exceeded",
                limits.max_heap / 1024
            ))
        }
    } else if timed_out {
        warn!(limit = ?limits.wall_time, "javascript timed out");
        ExecutionResult::timeout(limits.wall_time)
    } else {
        match output {
            Ok(text) => truncate_output(text, limits.max_output),
            Err(message) => {
                debug!(%message, "javascript threw");
                ExecutionResult::runtime_error(format!(
                    "{ERROR_PREFIX}: {}",
                    error_message(&message)
                ))
            }
        }
    };

    Ok(result.with_wall_time(elapsed))
}

/// Bootstrap the isolate and run `source` under the watchdog
///
/// Returns the captured output (or the engine's error text) and whether the
/// watchdog fired.
async fn run_main(
    runtime: &mut JsRuntime,
    source: &str,
    wall_time: Duration,
) -> Result<(Result<String, String>, bool), SandboxError> {
    let lines = runtime
        .execute_script("[sandpit:bootstrap]", BOOTSTRAP)
        .map_err(|e| SandboxError::Internal(format!("isolate bootstrap failed: {e}")))?;

    let watchdog = Watchdog::start(runtime.v8_isolate().thread_safe_handle(), wall_time)?;

    let outcome = match runtime.execute_script("[sandpit:main]", source.to_owned()) {
        Ok(completion) => match runtime
            .run_event_loop(PollEventLoopOptions::default())
            .await
        {
            Ok(()) => Ok(completion),
            Err(e) => Err(e.to_string()),
        },
        Err(e) => Err(e.to_string()),
    };

    // Reading output can call back into user code (toString), so it happens
    // while the watchdog is still armed
    let output = outcome.map(|completion| read_output(runtime, &lines, &completion));
    let timed_out = watchdog.cancel();
    Ok((output, timed_out))
}

/// Recorded console lines, or the completion value when nothing was logged
fn read_output(
    runtime: &mut JsRuntime,
    lines: &v8::Global<v8::Value>,
    completion: &v8::Global<v8::Value>,
) -> String {
    let scope = &mut runtime.handle_scope();

    let lines = v8::Local::new(scope, lines);
    let recorded: Vec<String> = match v8::Local::<v8::Array>::try_from(lines) {
        Ok(array) => (0..array.length())
            .filter_map(|i| array.get_index(scope, i))
            .map(|line| line.to_rust_string_lossy(scope))
            .collect(),
        Err(_) => Vec::new(),
    };
    if !recorded.is_empty() {
        return recorded.join("\n");
    }

    let completion = v8::Local::new(scope, completion);
    if completion.is_undefined() {
        String::new()
    } else {
        completion.to_rust_string_lossy(scope)
    }
}

fn truncate_output(mut text: String, max_output: usize) -> ExecutionResult {
    if text.len() <= max_output {
        return ExecutionResult::completed(text);
    }
    let mut cut = max_output;
    while !text.is_char_boundary(cut) {
        cut -= 1;
    }
    text.truncate(cut);
    ExecutionResult {
        limit_exceeded: LimitExceeded::Output,
        ..ExecutionResult::completed(text)
    }
}

/// First line of an engine error without the `Uncaught ` marker
fn error_message(raw: &str) -> &str {
    let first = raw.lines().next().unwrap_or(raw).trim();
    first.strip_prefix("Uncaught ").unwrap_or(first)
}

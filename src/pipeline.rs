//! Engine child-process management for ascii-recorder.
//!
//! This module handles spawning, monitoring, and terminating the ffmpeg
//! processes used for decoding the source and encoding the recording.

use std::io::{BufRead, BufReader};
#[cfg(unix)]
use std::os::unix::process::CommandExt;
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStdin, ChildStdout, Command, ExitStatus, Stdio};
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

/// How long `shutdown` waits for a graceful exit before killing.
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(2);

/// Errors that can occur during pipeline operations
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    /// Engine executable not found
    #[error("Engine binary '{}' not found", .0.display())]
    EngineNotFound(PathBuf),

    /// Failed to spawn the process
    #[error("Failed to spawn engine: {0}")]
    SpawnFailed(#[source] std::io::Error),

    /// Process exited with non-zero status
    #[error("Engine exited with code {exit_code:?}\n{stderr}")]
    ProcessFailed {
        exit_code: Option<i32>,
        stderr: String,
    },

    /// I/O error during pipeline operation
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Stdio wiring for a spawned pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipeMode {
    /// Read the process's stdout (decoding).
    Output,
    /// Write the process's stdin and read its stdout (encoding).
    Duplex,
}

/// Represents a running engine process
pub struct Pipeline {
    /// The child process
    child: Child,
    /// Short name used as a log prefix
    label: &'static str,
    /// Handle for the stderr reader thread
    stderr_thread: Option<JoinHandle<Vec<String>>>,
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("label", &self.label)
            .field("pid", &self.child.id())
            .finish_non_exhaustive()
    }
}

impl Pipeline {
    /// Spawn an engine process with the given arguments.
    ///
    /// stderr is drained on a background thread and logged at debug level;
    /// the collected lines are available through `take_stderr_output`.
    ///
    /// On unix the child gets its own process group, so a Ctrl+C in the
    /// terminal reaches only this program, which then stops its children.
    ///
    /// # Arguments
    /// * `binary` - Path of the engine executable
    /// * `args` - Command-line arguments (excluding the executable itself)
    /// * `mode` - Which standard streams are piped
    /// * `label` - Log prefix, e.g. `"decoder"`
    pub fn spawn(
        binary: &Path,
        args: &[String],
        mode: PipeMode,
        label: &'static str,
    ) -> Result<Self, PipelineError> {
        let mut cmd = Command::new(binary);
        cmd.args(args)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .stdin(match mode {
                PipeMode::Output => Stdio::null(),
                PipeMode::Duplex => Stdio::piped(),
            });
        #[cfg(unix)]
        cmd.process_group(0);

        let mut child = cmd.spawn().map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                PipelineError::EngineNotFound(binary.to_path_buf())
            } else {
                PipelineError::SpawnFailed(e)
            }
        })?;

        log::debug!("[{}] spawned pid {}: {:?}", label, child.id(), args);

        let stderr = child.stderr.take();
        let stderr_thread = stderr.map(|stderr| {
            thread::spawn(move || {
                let reader = BufReader::new(stderr);
                let mut lines = Vec::new();
                for line in reader.lines() {
                    match line {
                        Ok(l) => {
                            log::debug!("[{}] {}", label, l);
                            lines.push(l);
                        }
                        Err(_) => break,
                    }
                }
                lines
            })
        });

        Ok(Pipeline {
            child,
            label,
            stderr_thread,
        })
    }

    /// Take the stdin pipe (only present in `PipeMode::Duplex`).
    pub fn take_stdin(&mut self) -> Option<ChildStdin> {
        self.child.stdin.take()
    }

    /// Take the stdout pipe.
    pub fn take_stdout(&mut self) -> Option<ChildStdout> {
        self.child.stdout.take()
    }

    /// Check if the process is still running.
    pub fn is_running(&mut self) -> bool {
        matches!(self.child.try_wait(), Ok(None))
    }

    /// Wait for the process to complete and return the exit status.
    pub fn wait(&mut self) -> Result<ExitStatus, PipelineError> {
        self.child.wait().map_err(PipelineError::Io)
    }

    /// Wait for the process and turn a non-zero exit into `ProcessFailed`.
    pub fn wait_success(&mut self) -> Result<(), PipelineError> {
        let status = self.wait()?;
        if status.success() {
            return Ok(());
        }
        Err(PipelineError::ProcessFailed {
            exit_code: status.code(),
            stderr: self.take_stderr_output().join("\n"),
        })
    }

    /// Suspend the process (SIGSTOP). No-op on non-unix targets.
    pub fn pause(&self) {
        self.signal(Signal::Stop);
    }

    /// Resume a suspended process (SIGCONT). No-op on non-unix targets.
    pub fn resume(&self) {
        self.signal(Signal::Continue);
    }

    /// Request a graceful shutdown of the process.
    ///
    /// Sends SIGINT (equivalent to Ctrl+C) and waits for exit. If the
    /// process doesn't exit within the timeout, it is killed.
    pub fn shutdown(&mut self) -> Result<ExitStatus, PipelineError> {
        // A stopped process cannot handle SIGINT
        self.signal(Signal::Continue);
        self.signal(Signal::Interrupt);

        #[cfg(not(unix))]
        {
            let _ = self.child.kill();
        }

        let start = Instant::now();
        loop {
            match self.child.try_wait() {
                Ok(Some(status)) => return Ok(status),
                Ok(None) => {
                    if start.elapsed() > SHUTDOWN_TIMEOUT {
                        log::warn!("[{}] did not exit after SIGINT, killing", self.label);
                        let _ = self.child.kill();
                        return self.child.wait().map_err(PipelineError::Io);
                    }
                    thread::sleep(Duration::from_millis(50));
                }
                Err(e) => return Err(PipelineError::Io(e)),
            }
        }
    }

    /// Get the collected stderr output after the process has finished.
    pub fn take_stderr_output(&mut self) -> Vec<String> {
        self.stderr_thread
            .take()
            .and_then(|h| h.join().ok())
            .unwrap_or_default()
    }

    #[cfg(unix)]
    fn signal(&self, signal: Signal) {
        let sig = match signal {
            Signal::Stop => libc::SIGSTOP,
            Signal::Continue => libc::SIGCONT,
            Signal::Interrupt => libc::SIGINT,
        };
        // SAFETY: kill(2) with a pid we own; errors (e.g. ESRCH) are ignored.
        unsafe {
            libc::kill(self.child.id() as libc::pid_t, sig);
        }
    }

    #[cfg(not(unix))]
    fn signal(&self, _signal: Signal) {}
}

#[derive(Clone, Copy)]
enum Signal {
    Stop,
    Continue,
    Interrupt,
}

impl Drop for Pipeline {
    fn drop(&mut self) {
        // Ensure the process is terminated when Pipeline is dropped
        if self.is_running() {
            let _ = self.shutdown();
        }
    }
}

/// Global flag for handling Ctrl+C across the application
static CTRLC_RECEIVED: AtomicBool = AtomicBool::new(false);

/// Check if Ctrl+C has been received.
pub fn ctrlc_received() -> bool {
    CTRLC_RECEIVED.load(Ordering::SeqCst)
}

/// Set up the Ctrl+C handler.
///
/// This should be called once at program startup.
pub fn setup_ctrlc_handler() -> Result<(), ctrlc::Error> {
    ctrlc::set_handler(move || {
        CTRLC_RECEIVED.store(true, Ordering::SeqCst);
        eprintln!("\nReceived Ctrl+C, stopping recording...");
    })
}

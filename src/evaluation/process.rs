//! Single-attempt child process execution with an optional deadline.

use std::io::Read;
use std::process::{Child, Command, ExitStatus, Stdio};
use std::sync::{Arc, Mutex, mpsc};
use std::thread;
use std::time::{Duration, Instant};

use crate::error::{BenchError, Result};

const POLL_INTERVAL: Duration = Duration::from_millis(50);
/// How long the pipes may stay open after the child is gone. Grandchildren
/// that inherited them can otherwise hold the caller forever.
const DRAIN_GRACE: Duration = Duration::from_secs(2);

#[derive(Debug, Clone)]
pub struct ProcessOutput {
    pub status: Option<ExitStatus>,
    pub stdout: String,
    pub stderr: String,
    pub timed_out: bool,
}

impl ProcessOutput {
    pub fn success(&self) -> bool {
        !self.timed_out && self.status.is_some_and(|s| s.success())
    }
}

/// Runs `command` to completion, killing it once `timeout` elapses.
/// Failing to spawn is an error; a non-zero exit is not.
pub fn run(mut command: Command, timeout: Option<Duration>) -> Result<ProcessOutput> {
    let program = command.get_program().to_string_lossy().into_owned();
    let mut child = command
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|e| BenchError::Evaluator(format!("failed to start {program}: {e}")))?;

    // drain both pipes concurrently so a chatty child cannot block on a full pipe
    let stdout = Drain::spawn(child.stdout.take());
    let stderr = Drain::spawn(child.stderr.take());

    let (status, timed_out) = wait(&mut child, timeout)
        .map_err(|e| BenchError::Evaluator(format!("waiting for {program}: {e}")))?;

    Ok(ProcessOutput {
        status,
        stdout: stdout.finish(DRAIN_GRACE),
        stderr: stderr.finish(DRAIN_GRACE),
        timed_out,
    })
}

fn wait(child: &mut Child, timeout: Option<Duration>) -> std::io::Result<(Option<ExitStatus>, bool)> {
    let Some(timeout) = timeout else {
        return child.wait().map(|s| (Some(s), false));
    };
    let deadline = Instant::now() + timeout;
    loop {
        if let Some(status) = child.try_wait()? {
            return Ok((Some(status), false));
        }
        if Instant::now() >= deadline {
            child.kill()?;
            child.wait()?;
            return Ok((None, true));
        }
        thread::sleep(POLL_INTERVAL);
    }
}

/// Pipe reader on its own thread. Output is buffered as it arrives so a
/// reader that never sees EOF still yields what was written.
struct Drain {
    buf: Arc<Mutex<Vec<u8>>>,
    /// Disconnects when the reader thread exits
    done: mpsc::Receiver<()>,
}

impl Drain {
    fn spawn<R: Read + Send + 'static>(pipe: Option<R>) -> Self {
        let buf = Arc::new(Mutex::new(Vec::new()));
        let (done_tx, done) = mpsc::channel::<()>();
        let sink = Arc::clone(&buf);
        thread::spawn(move || {
            let _done = done_tx;
            let Some(mut pipe) = pipe else { return };
            let mut chunk = [0u8; 8192];
            loop {
                match pipe.read(&mut chunk) {
                    Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
                    Ok(0) | Err(_) => break,
                    Ok(n) => match sink.lock() {
                        Ok(mut buf) => buf.extend_from_slice(&chunk[..n]),
                        Err(_) => break,
                    },
                }
            }
        });
        Self { buf, done }
    }

    /// Waits up to `grace` for EOF, then returns whatever was read.
    fn finish(self, grace: Duration) -> String {
        let _ = self.done.recv_timeout(grace);
        self.buf
            .lock()
            .map(|buf| String::from_utf8_lossy(&buf).into_owned())
            .unwrap_or_default()
    }
}

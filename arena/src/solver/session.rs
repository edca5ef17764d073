//! Process-backed engine session speaking to a long-lived SWI-Prolog child.
//!
//! The child runs the bundled request shim (`rules/shim.pl`): each request is
//! one goal line on stdin, each reply a sentinel-framed block on stdout ending
//! in `@end`. Stderr is drained by a dedicated thread into a shared buffer so
//! warnings emitted asynchronously during consults can be inspected later.
//! Because stderr is a separate pipe, the shim writes an `@sync` line to it
//! per request and a reply is not complete until the reader thread has seen
//! that sentinel; draining the buffer after a reply therefore observes every
//! warning the request produced, and nothing from requests still in flight.

use std::io::{BufRead, BufReader, Write};
use std::path::Path;
use std::process::{Child, ChildStdin, Command, Stdio};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use tempfile::NamedTempFile;
use tracing::{debug, instrument, warn};
use wait_timeout::ChildExt;

use crate::config::EngineConfig;
use crate::solver::engine::{Engine, EngineFactory, QueryResult};

const SHIM: &str = include_str!("../../rules/shim.pl");

/// One live SWI-Prolog session.
pub struct SwiplSession {
    child: Option<Child>,
    stdin: Option<ChildStdin>,
    lines: Receiver<String>,
    // One `()` per request, sent once the stderr reader has consumed the
    // request's `@sync` sentinel and everything before it.
    stderr_sync: Receiver<()>,
    diagnostics: Arc<Mutex<String>>,
    query_timeout: Duration,
    shutdown_timeout: Duration,
    // Keeps the shim file on disk for the child's lifetime.
    _shim: NamedTempFile,
}

impl SwiplSession {
    /// Spawn a fresh engine process and wait for it to answer a ping.
    #[instrument(skip_all, fields(command = %config.command.join(" ")))]
    pub fn spawn(config: &EngineConfig) -> Result<Self> {
        let shim = write_shim()?;

        let program = config
            .command
            .first()
            .ok_or_else(|| anyhow!("engine command is empty"))?;
        let mut cmd = Command::new(program);
        cmd.args(&config.command[1..])
            .arg("-q")
            .arg("--no-tty")
            .arg("-g")
            .arg("serve")
            .arg(shim.path())
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        debug!("spawning engine process");
        let mut child = cmd.spawn().context("spawn engine process")?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| anyhow!("stdin was not piped"))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| anyhow!("stdout was not piped"))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| anyhow!("stderr was not piped"))?;

        let (tx, rx) = mpsc::channel();
        thread::spawn(move || {
            let reader = BufReader::new(stdout);
            for line in reader.lines() {
                let Ok(line) = line else { break };
                if tx.send(line).is_err() {
                    break;
                }
            }
        });

        let diagnostics = Arc::new(Mutex::new(String::new()));
        let buffer = diagnostics.clone();
        let limit = config.diagnostics_limit_bytes;
        let (sync_tx, sync_rx) = mpsc::channel();
        thread::spawn(move || {
            let reader = BufReader::new(stderr);
            for line in reader.lines() {
                let Ok(line) = line else { break };
                if line == "@sync" {
                    if sync_tx.send(()).is_err() {
                        break;
                    }
                    continue;
                }
                if let Ok(mut buf) = buffer.lock()
                    && buf.len() < limit
                {
                    buf.push_str(&line);
                    buf.push('\n');
                }
            }
        });

        let mut session = Self {
            child: Some(child),
            stdin: Some(stdin),
            lines: rx,
            stderr_sync: sync_rx,
            diagnostics,
            query_timeout: Duration::from_secs(config.query_timeout_secs),
            shutdown_timeout: Duration::from_secs(config.shutdown_timeout_secs),
            _shim: shim,
        };

        // Fail fast if the engine binary is present but the shim never came up.
        let ping = session.exchange("true.", Duration::from_secs(config.startup_timeout_secs));
        if !ping.success {
            let error = ping.error.unwrap_or_else(|| "no reply".to_string());
            session.stop();
            return Err(anyhow!("engine did not answer startup ping: {error}"));
        }

        Ok(session)
    }

    /// Build a factory producing fresh sessions from one configuration.
    pub fn factory(config: EngineConfig) -> EngineFactory {
        Arc::new(move || {
            let session = SwiplSession::spawn(&config)?;
            Ok(Box::new(session) as Box<dyn Engine>)
        })
    }

    /// Send one goal line and collect the sentinel-framed reply.
    fn exchange(&mut self, goal: &str, timeout: Duration) -> QueryResult {
        let Some(stdin) = self.stdin.as_mut() else {
            return QueryResult::fail("engine session is stopped");
        };
        if let Err(err) = writeln!(stdin, "{goal}").and_then(|()| stdin.flush()) {
            return QueryResult::fail(format!("write goal: {err}"));
        }

        let mut values = Vec::new();
        let mut success = false;
        let mut error: Option<String> = None;
        loop {
            match self.lines.recv_timeout(timeout) {
                Ok(line) => {
                    if let Some(value) = line.strip_prefix("@sol ") {
                        values.push(value.to_string());
                    } else if line == "@yes" {
                        success = true;
                    } else if line == "@no" {
                        success = false;
                    } else if let Some(message) = line.strip_prefix("@err ") {
                        error = Some(message.to_string());
                    } else if line == "@end" {
                        break;
                    }
                    // Anything else is stray engine output; ignore it.
                }
                Err(RecvTimeoutError::Timeout) => {
                    warn!(timeout_secs = timeout.as_secs(), goal, "goal timed out");
                    // The reply stream can no longer be resynchronized.
                    self.stop();
                    return QueryResult::fail(format!(
                        "goal timed out after {}s: {goal}",
                        timeout.as_secs()
                    ));
                }
                Err(RecvTimeoutError::Disconnected) => {
                    return QueryResult::fail("engine process exited");
                }
            }
        }

        // Wait for the request's stderr sentinel, so a later diagnostic
        // drain cannot miss a warning this request wrote. A disconnect
        // means the reader thread exited with stderr fully consumed.
        match self.stderr_sync.recv_timeout(timeout) {
            Ok(()) | Err(RecvTimeoutError::Disconnected) => {}
            Err(RecvTimeoutError::Timeout) => {
                warn!(goal, "stderr never synchronized after reply");
                self.stop();
                return QueryResult::fail(format!(
                    "stderr never synchronized after goal {goal}"
                ));
            }
        }

        if success {
            QueryResult::ok(values)
        } else {
            QueryResult::fail(error.unwrap_or_else(|| format!("no solutions for goal {goal}")))
        }
    }
}

impl Engine for SwiplSession {
    fn consult(&mut self, path: &Path) -> QueryResult {
        // Prolog wants forward slashes and a quoted atom.
        let path = path.display().to_string().replace('\\', "/");
        if path.contains('\'') {
            return QueryResult::fail(format!("consult path contains a quote: {path}"));
        }
        let result = self.exchange(&format!("consult('{path}')."), self.query_timeout);
        if !result.success {
            debug!(path, error = ?result.error, "consult failed");
        }
        result
    }

    fn query(&mut self, goal: &str, limit: Option<usize>) -> QueryResult {
        let mut result = self.exchange(goal, self.query_timeout);
        if let Some(limit) = limit {
            result.values.truncate(limit);
        }
        result
    }

    fn stop(&mut self) {
        let Some(mut child) = self.child.take() else {
            return;
        };
        // Closing stdin makes the shim read end_of_file and halt.
        drop(self.stdin.take());
        match child.wait_timeout(self.shutdown_timeout) {
            Ok(Some(status)) => debug!(exit_code = ?status.code(), "engine stopped"),
            Ok(None) => {
                warn!("engine did not exit in time, killing");
                if let Err(err) = child.kill() {
                    warn!(err = %err, "failed to kill engine");
                }
                if let Err(err) = child.wait() {
                    warn!(err = %err, "failed to reap engine");
                }
            }
            Err(err) => warn!(err = %err, "failed to wait for engine"),
        }
    }

    fn drain_diagnostics(&mut self) -> String {
        match self.diagnostics.lock() {
            Ok(mut buf) => std::mem::take(&mut *buf),
            Err(_) => String::new(),
        }
    }
}

impl Drop for SwiplSession {
    fn drop(&mut self) {
        self.stop();
    }
}

fn write_shim() -> Result<NamedTempFile> {
    let mut shim = tempfile::Builder::new()
        .prefix("arena-shim-")
        .suffix(".pl")
        .tempfile()
        .context("create shim file")?;
    shim.write_all(SHIM.as_bytes()).context("write shim")?;
    shim.flush().context("flush shim")?;
    Ok(shim)
}

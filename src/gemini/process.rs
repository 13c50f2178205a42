use crate::error::ClauditError;
use anyhow::Result;
use std::io::{Read, Write};
use std::process::{Child, Command, Stdio};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

/// Removed from the child env: with it set the tool tries service-account
/// auth and hangs.
pub const SCRUBBED_ENV_VAR: &str = "GOOGLE_APPLICATION_CREDENTIALS";

const POLL_INTERVAL: Duration = Duration::from_millis(50);

#[derive(Debug, Clone)]
pub struct ToolInvocation {
    pub bin: String,
    pub args: Vec<String>,
    pub stdin: String,
    pub timeout: Duration,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ToolOutcome {
    Exited {
        code: Option<i32>,
        stdout: String,
        stderr: String,
    },
    /// Stdout is discarded; stderr holds whatever arrived before the kill.
    TimedOut { stderr: String },
}

pub trait ToolRunner {
    fn run(&self, invocation: &ToolInvocation) -> Result<ToolOutcome>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct ProcessRunner;

type SharedBuf = Arc<Mutex<Vec<u8>>>;

fn drain<R: Read + Send + 'static>(mut reader: R) -> (SharedBuf, JoinHandle<()>) {
    let buf: SharedBuf = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&buf);
    let handle = thread::spawn(move || {
        let mut chunk = [0u8; 8192];
        loop {
            match reader.read(&mut chunk) {
                Ok(0) | Err(_) => break,
                Ok(n) => match sink.lock() {
                    Ok(mut guard) => guard.extend_from_slice(&chunk[..n]),
                    Err(_) => break,
                },
            }
        }
    });
    (buf, handle)
}

fn snapshot(buf: &Option<SharedBuf>) -> String {
    buf.as_ref()
        .and_then(|b| b.lock().ok().map(|g| String::from_utf8_lossy(&g).into_owned()))
        .unwrap_or_default()
}

#[cfg(unix)]
fn detach_group(cmd: &mut Command) {
    use std::os::unix::process::CommandExt;
    cmd.process_group(0);
}

#[cfg(not(unix))]
fn detach_group(_cmd: &mut Command) {}

fn kill_tree(child: &mut Child) {
    #[cfg(unix)]
    {
        let _ = Command::new("kill")
            .arg("-KILL")
            .arg("--")
            .arg(format!("-{}", child.id()))
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status();
    }
    let _ = child.kill();
    let _ = child.wait();
}

fn wait_with_deadline(child: &mut Child, timeout: Duration) -> Result<Option<Option<i32>>> {
    let started = Instant::now();
    loop {
        if let Some(status) = child.try_wait()? {
            return Ok(Some(status.code()));
        }
        if started.elapsed() >= timeout {
            kill_tree(child);
            return Ok(None);
        }
        thread::sleep(POLL_INTERVAL);
    }
}

impl ToolRunner for ProcessRunner {
    fn run(&self, invocation: &ToolInvocation) -> Result<ToolOutcome> {
        let mut cmd = Command::new(&invocation.bin);
        cmd.args(&invocation.args)
            .env_remove(SCRUBBED_ENV_VAR)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        detach_group(&mut cmd);
        let mut child = cmd.spawn().map_err(|err| ClauditError::ToolSpawn {
            tool: invocation.bin.clone(),
            reason: err.to_string(),
        })?;

        // readers first, so a chatty child never blocks on a full pipe
        let (out_buf, out_handle) = match child.stdout.take().map(drain) {
            Some((buf, handle)) => (Some(buf), Some(handle)),
            None => (None, None),
        };
        let (err_buf, err_handle) = match child.stderr.take().map(drain) {
            Some((buf, handle)) => (Some(buf), Some(handle)),
            None => (None, None),
        };

        let writer = child.stdin.take().map(|mut stdin| {
            let payload = invocation.stdin.clone().into_bytes();
            thread::spawn(move || {
                // broken pipe when the child exits early
                let _ = stdin.write_all(&payload);
            })
        });

        let Some(code) = wait_with_deadline(&mut child, invocation.timeout)? else {
            // helper threads stay detached; a descendant may still hold a pipe
            return Ok(ToolOutcome::TimedOut {
                stderr: snapshot(&err_buf),
            });
        };

        for handle in [writer, out_handle, err_handle].into_iter().flatten() {
            let _ = handle.join();
        }
        Ok(ToolOutcome::Exited {
            code,
            stdout: snapshot(&out_buf),
            stderr: snapshot(&err_buf),
        })
    }
}

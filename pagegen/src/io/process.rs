//! Helpers for running child processes with line-streamed output.

use std::io::{BufRead, BufReader, Read, Write};
use std::process::{Command, ExitStatus, Stdio};
use std::sync::mpsc;
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{Context, Result, anyhow};
use tracing::{debug, error, instrument, warn};
use wait_timeout::ChildExt;

/// Captured child process output.
#[derive(Debug)]
pub struct CommandOutput {
    pub status: ExitStatus,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
    pub stdout_truncated: usize,
    pub stderr_truncated: usize,
    pub timed_out: bool,
}

impl CommandOutput {
    pub fn truncated_notice(&self, label: &str) -> String {
        let mut buf = String::new();
        if self.stdout_truncated > 0 {
            buf.push_str(&format!(
                "\n[{label} stdout truncated {} bytes]\n",
                self.stdout_truncated
            ));
        }
        if self.stderr_truncated > 0 {
            buf.push_str(&format!(
                "\n[{label} stderr truncated {} bytes]\n",
                self.stderr_truncated
            ));
        }
        buf
    }
}

/// Run a command, invoking `on_line` for every line the child writes to
/// stdout, as it arrives.
///
/// Output is read concurrently while the child runs; `output_limit_bytes`
/// bounds the stdout/stderr retained in memory (bytes beyond the limit are
/// discarded while still draining the pipes). When `timeout` is `None` the
/// wait is unbounded; otherwise the child is killed at the deadline and the
/// result is marked `timed_out`.
#[instrument(skip_all, fields(timeout_secs = timeout.map(|t| t.as_secs()), output_limit_bytes))]
pub fn run_command_streaming(
    mut cmd: Command,
    stdin: Option<&[u8]>,
    timeout: Option<Duration>,
    output_limit_bytes: usize,
    on_line: &mut dyn FnMut(&str),
) -> Result<CommandOutput> {
    if stdin.is_some() {
        cmd.stdin(Stdio::piped());
    } else {
        cmd.stdin(Stdio::null());
    }
    cmd.stdout(Stdio::piped()).stderr(Stdio::piped());

    debug!("spawning child process");
    let mut child = match cmd.spawn() {
        Ok(c) => c,
        Err(e) => {
            error!(err = %e, "failed to spawn command");
            return Err(e).context("spawn command");
        }
    };

    if let Some(input) = stdin {
        let mut child_stdin = child
            .stdin
            .take()
            .ok_or_else(|| anyhow!("stdin was not piped"))?;
        child_stdin.write_all(input).context("write stdin")?;
    }

    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| anyhow!("stdout was not piped"))?;
    let stderr = child
        .stderr
        .take()
        .ok_or_else(|| anyhow!("stderr was not piped"))?;

    // Lines cross a channel so the caller's callback runs on this thread.
    let (line_tx, line_rx) = mpsc::channel::<Vec<u8>>();
    let stdout_handle =
        thread::spawn(move || read_lines_limited(stdout, output_limit_bytes, &line_tx));
    let stderr_handle = thread::spawn(move || read_stream_limited(stderr, output_limit_bytes));

    let deadline = timeout.map(|t| Instant::now() + t);
    let mut timed_out = false;
    loop {
        let line = match deadline {
            Some(d) => {
                let Some(remaining) = d.checked_duration_since(Instant::now()) else {
                    timed_out = true;
                    break;
                };
                match line_rx.recv_timeout(remaining) {
                    Ok(line) => Some(line),
                    Err(mpsc::RecvTimeoutError::Timeout) => {
                        timed_out = true;
                        break;
                    }
                    Err(mpsc::RecvTimeoutError::Disconnected) => None,
                }
            }
            None => line_rx.recv().ok(),
        };
        let Some(line) = line else { break };
        let text = String::from_utf8_lossy(&line);
        on_line(text.trim_end_matches(['\n', '\r']));
    }

    let status = if timed_out {
        warn!(timeout_secs = timeout.map(|t| t.as_secs()), "command timed out, killing");
        child.kill().context("kill command")?;
        child.wait().context("wait command after kill")?
    } else if let Some(d) = deadline {
        // Stdout hit EOF; give the child the rest of the budget to exit.
        let remaining = d
            .checked_duration_since(Instant::now())
            .unwrap_or(Duration::from_millis(1));
        match child.wait_timeout(remaining).context("wait for command")? {
            Some(status) => status,
            None => {
                warn!("command closed stdout but did not exit before the deadline, killing");
                timed_out = true;
                child.kill().context("kill command")?;
                child.wait().context("wait command after kill")?
            }
        }
    } else {
        child.wait().context("wait for command")?
    };

    let (stdout, stdout_truncated) = join_output(stdout_handle).context("join stdout")?;
    let (stderr, stderr_truncated) = join_output(stderr_handle).context("join stderr")?;

    if stdout_truncated > 0 || stderr_truncated > 0 {
        warn!(stdout_truncated, stderr_truncated, "output truncated");
    }

    debug!(exit_code = ?status.code(), timed_out, "command finished");
    Ok(CommandOutput {
        status,
        stdout,
        stderr,
        stdout_truncated,
        stderr_truncated,
        timed_out,
    })
}

fn join_output(handle: thread::JoinHandle<Result<(Vec<u8>, usize)>>) -> Result<(Vec<u8>, usize)> {
    match handle.join() {
        Ok(result) => result,
        Err(_) => Err(anyhow!("output reader thread panicked")),
    }
}

/// Read a stream line by line, forwarding each line over the channel and
/// collecting up to `limit` bytes.
fn read_lines_limited<R: Read>(
    reader: R,
    limit: usize,
    lines: &mpsc::Sender<Vec<u8>>,
) -> Result<(Vec<u8>, usize)> {
    let mut buf_reader = BufReader::new(reader);
    let mut collected = Vec::new();
    let mut truncated = 0usize;

    loop {
        let mut line = Vec::new();
        let n = buf_reader
            .read_until(b'\n', &mut line)
            .context("read line")?;
        if n == 0 {
            break;
        }

        // The receiver may be gone after a timeout kill; keep draining.
        let _ = lines.send(line.clone());

        let remaining = limit.saturating_sub(collected.len());
        if remaining > 0 {
            let keep = n.min(remaining);
            collected.extend_from_slice(&line[..keep]);
            truncated += n.saturating_sub(keep);
        } else {
            truncated += n;
        }
    }

    Ok((collected, truncated))
}

fn read_stream_limited<R: Read>(mut reader: R, limit: usize) -> Result<(Vec<u8>, usize)> {
    let mut buf = Vec::new();
    let mut truncated = 0usize;
    let mut chunk = [0u8; 8192];

    loop {
        let n = reader.read(&mut chunk).context("read output")?;
        if n == 0 {
            break;
        }
        let remaining = limit.saturating_sub(buf.len());
        if remaining > 0 {
            let keep = n.min(remaining);
            buf.extend_from_slice(&chunk[..keep]);
            truncated += n.saturating_sub(keep);
        } else {
            truncated += n;
        }
    }

    Ok((buf, truncated))
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    fn sh(script: &str) -> Command {
        let mut cmd = Command::new("sh");
        cmd.arg("-c").arg(script);
        cmd
    }

    #[test]
    fn streams_each_stdout_line_to_the_callback() {
        let mut lines = Vec::new();
        let output = run_command_streaming(
            sh("printf 'one\\ntwo\\n'"),
            None,
            None,
            10_000,
            &mut |line| lines.push(line.to_string()),
        )
        .expect("run");

        assert!(output.status.success());
        assert!(!output.timed_out);
        assert_eq!(lines, vec!["one", "two"]);
        assert_eq!(String::from_utf8_lossy(&output.stdout), "one\ntwo\n");
    }

    #[test]
    fn forwards_stdin_and_captures_stderr() {
        let mut lines = Vec::new();
        let output = run_command_streaming(
            sh("cat; echo oops >&2"),
            Some(b"from stdin\n"),
            None,
            10_000,
            &mut |line| lines.push(line.to_string()),
        )
        .expect("run");

        assert_eq!(lines, vec!["from stdin"]);
        assert_eq!(String::from_utf8_lossy(&output.stderr), "oops\n");
    }

    #[test]
    fn bounds_captured_output() {
        let output = run_command_streaming(
            sh("printf 'aaaaaaaaaaaaaaaa\\n'"),
            None,
            None,
            4,
            &mut |_| {},
        )
        .expect("run");

        assert_eq!(output.stdout.len(), 4);
        assert!(output.stdout_truncated > 0);
    }

    #[test]
    fn kills_the_child_at_the_deadline() {
        let mut lines = 0u32;
        let output = run_command_streaming(
            sh("sleep 5"),
            None,
            Some(Duration::from_millis(100)),
            10_000,
            &mut |_| lines += 1,
        )
        .expect("run");

        assert!(output.timed_out);
        assert_eq!(lines, 0);
    }
}

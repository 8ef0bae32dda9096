//! Command execution for shell-based providers.
//!
//! Commands run as child processes. Their output is reported line by line
//! on an [`EventStream`], which [`collect_output`] folds into a
//! [`CommandOutput`].

use std::collections::BTreeMap;
use std::process::Stdio;

use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, ChildStderr, ChildStdout, Command};
use tokio_stream::StreamExt;
use tracing::{debug, warn};

use crate::config::{Config, ShellConfig};
use crate::error::{ProviderError, ProviderResult};
use crate::stream::{create_stream, EventSender, EventStream};
use crate::value::Value;

/// Progress of a running command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandEvent {
    Stdout(String),
    Stderr(String),
    /// The process exited; `None` when it was terminated by a signal
    Exited(Option<i32>),
}

/// A program and its arguments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    pub program: String,
    pub args: Vec<String>,
}

impl CommandSpec {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }
}

/// Collected result of a command.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    pub status: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    /// True when the command exited with status 0.
    pub fn success(&self) -> bool {
        self.status == Some(0)
    }

    /// Encode as an operation result.
    pub fn to_value(&self) -> Value {
        let mut map = BTreeMap::new();
        map.insert("status".to_string(), Value::from(self.status.map(i64::from)));
        map.insert("stdout".to_string(), Value::from(self.stdout.as_str()));
        map.insert("stderr".to_string(), Value::from(self.stderr.as_str()));
        Value::Map(map)
    }

    /// Decode an operation result produced by [`CommandOutput::to_value`].
    pub fn from_value(value: &Value) -> ProviderResult<Self> {
        let map = value
            .as_map()
            .ok_or_else(|| ProviderError::ExecutionFailed(format!("expected command output, got {}", value)))?;
        let text = |key: &str| {
            map.get(key)
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string()
        };

        Ok(Self {
            status: map
                .get("status")
                .and_then(Value::as_int)
                .and_then(|s| i32::try_from(s).ok()),
            stdout: text("stdout"),
            stderr: text("stderr"),
        })
    }
}

/// Quote `word` for use as a single POSIX shell word.
pub fn shell_quote(word: &str) -> String {
    format!("'{}'", word.replace('\'', r"'\''"))
}

/// Spawn a command and stream its output.
///
/// Must be called from within a tokio runtime. Output is split on newlines
/// and bytes that are not valid UTF-8 are replaced. Dropping the stream
/// kills the process.
pub fn spawn_command(spec: &CommandSpec, buffer_size: usize) -> ProviderResult<EventStream<CommandEvent>> {
    let mut child = Command::new(&spec.program)
        .args(&spec.args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()?;

    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| ProviderError::ExecutionFailed("stdout not captured".to_string()))?;
    let stderr = child
        .stderr
        .take()
        .ok_or_else(|| ProviderError::ExecutionFailed("stderr not captured".to_string()))?;

    debug!(program = %spec.program, args = ?spec.args, "Spawned command");

    let (sender, stream) = create_stream(buffer_size);
    let program = spec.program.clone();
    tokio::spawn(async move {
        let finished = tokio::select! {
            status = drive_command(&mut child, stdout, stderr, &sender) => Some(status),
            _ = sender.closed() => None,
        };

        match finished {
            Some(status) => {
                let _ = sender.send(CommandEvent::Exited(status)).await;
            }
            None => {
                debug!(program = %program, "Output stream dropped, killing command");
                if let Err(err) = child.kill().await {
                    warn!(program = %program, error = %err, "Failed to kill command");
                }
            }
        }
    });

    Ok(stream)
}

/// Forward both output pipes until they close, then reap the process.
async fn drive_command(
    child: &mut Child,
    stdout: ChildStdout,
    stderr: ChildStderr,
    sender: &EventSender<CommandEvent>,
) -> Option<i32> {
    tokio::join!(
        forward_lines(stdout, sender, CommandEvent::Stdout),
        forward_lines(stderr, sender, CommandEvent::Stderr),
    );

    match child.wait().await {
        Ok(status) => status.code(),
        Err(err) => {
            warn!(error = %err, "Failed to wait for command");
            None
        }
    }
}

async fn forward_lines<R>(reader: R, sender: &EventSender<CommandEvent>, event: fn(String) -> CommandEvent)
where
    R: AsyncRead + Unpin,
{
    let mut segments = BufReader::new(reader).split(b'\n');
    loop {
        match segments.next_segment().await {
            Ok(Some(bytes)) => {
                let line = String::from_utf8_lossy(&bytes).into_owned();
                if sender.send(event(line)).await.is_err() {
                    return;
                }
            }
            Ok(None) => return,
            Err(err) => {
                warn!(error = %err, "Failed to read command output");
                return;
            }
        }
    }
}

/// Drain a command event stream.
pub async fn collect_output(mut stream: EventStream<CommandEvent>) -> CommandOutput {
    let mut stdout = Vec::new();
    let mut stderr = Vec::new();
    let mut status = None;

    while let Some(event) = stream.next().await {
        match event {
            CommandEvent::Stdout(line) => stdout.push(line),
            CommandEvent::Stderr(line) => stderr.push(line),
            CommandEvent::Exited(code) => status = code,
        }
    }

    CommandOutput {
        status,
        stdout: stdout.join("\n"),
        stderr: stderr.join("\n"),
    }
}

/// Run a command to completion, honoring the configured timeout.
///
/// On timeout the process is killed.
pub async fn run_command(spec: &CommandSpec, config: &ShellConfig) -> ProviderResult<CommandOutput> {
    let stream = spawn_command(spec, config.buffer_size)?;

    let output = match config.timeout() {
        Some(limit) => tokio::time::timeout(limit, collect_output(stream))
            .await
            .map_err(|_| ProviderError::Timeout(limit.as_millis() as u64))?,
        None => collect_output(stream).await,
    };

    if config.is_verbose() {
        debug!(program = %spec.program, status = ?output.status, "Command finished");
    }
    Ok(output)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sh(command: &str) -> CommandSpec {
        CommandSpec::new("/bin/sh").arg("-c").arg(command)
    }

    #[tokio::test]
    async fn test_run_command_collects_output() {
        let output = run_command(&sh("echo one; echo two; echo oops >&2"), &ShellConfig::new())
            .await
            .unwrap();

        assert!(output.success());
        assert_eq!(output.stdout, "one\ntwo");
        assert_eq!(output.stderr, "oops");
    }

    #[tokio::test]
    async fn test_exit_status_reported() {
        let output = run_command(&sh("exit 3"), &ShellConfig::new()).await.unwrap();
        assert_eq!(output.status, Some(3));
        assert!(!output.success());
    }

    #[tokio::test]
    async fn test_stream_ends_with_exit_event() {
        let stream = spawn_command(&sh("echo hi"), 8).unwrap();
        let events: Vec<CommandEvent> = stream.collect().await;

        assert_eq!(
            events,
            vec![
                CommandEvent::Stdout("hi".to_string()),
                CommandEvent::Exited(Some(0)),
            ]
        );
    }

    #[tokio::test]
    async fn test_timeout() {
        let config = ShellConfig::new().with_timeout_ms(50);
        let err = run_command(&sh("sleep 5"), &config).await.unwrap_err();
        assert!(matches!(err, ProviderError::Timeout(50)));
    }

    async fn process_alive(pid: &str) -> bool {
        Command::new("/bin/sh")
            .arg("-c")
            .arg(format!("kill -0 {} 2>/dev/null", pid))
            .status()
            .await
            .map(|s| s.success())
            .unwrap_or(false)
    }

    async fn wait_for_exit(pid: &str) -> bool {
        for _ in 0..40 {
            if !process_alive(pid).await {
                return true;
            }
            tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        }
        false
    }

    #[tokio::test]
    async fn test_invalid_utf8_does_not_end_output() {
        let output = run_command(&sh(r"printf 'ok\n\377\nafter\n'"), &ShellConfig::new())
            .await
            .unwrap();

        assert!(output.success());
        assert_eq!(output.stdout, "ok\n\u{FFFD}\nafter");
    }

    #[tokio::test]
    async fn test_dropping_stream_kills_process() {
        let mut stream = spawn_command(&sh("echo $$; exec sleep 30"), 8).unwrap();
        let pid = match stream.next().await {
            Some(CommandEvent::Stdout(pid)) => pid,
            other => panic!("unexpected event: {:?}", other),
        };

        drop(stream);
        assert!(wait_for_exit(&pid).await, "process {} still running", pid);
    }

    #[tokio::test]
    async fn test_timeout_kills_silent_process() {
        let pid_file = std::env::temp_dir().join(format!("rustadmin-timeout-{}", std::process::id()));
        let command = format!("echo $$ > {}; exec sleep 30", pid_file.display());
        let config = ShellConfig::new().with_timeout_ms(500);

        let err = run_command(&sh(&command), &config).await.unwrap_err();
        assert!(matches!(err, ProviderError::Timeout(500)));

        let pid = std::fs::read_to_string(&pid_file).unwrap();
        let _ = std::fs::remove_file(&pid_file);
        assert!(wait_for_exit(pid.trim()).await, "process {} survived timeout", pid.trim());
    }

    #[tokio::test]
    async fn test_missing_program() {
        let err = run_command(&CommandSpec::new("/nonexistent/program"), &ShellConfig::new())
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::IoError(_)));
    }

    #[test]
    fn test_shell_quote() {
        assert_eq!(shell_quote("nginx"), "'nginx'");
        assert_eq!(shell_quote("a b;rm -rf /"), "'a b;rm -rf /'");
        assert_eq!(shell_quote("it's"), r"'it'\''s'");
    }

    #[tokio::test]
    async fn test_shell_quote_round_trips_through_shell() {
        let word = "x'; echo injected; '";
        let output = run_command(&sh(&format!("printf %s {}", shell_quote(word))), &ShellConfig::new())
            .await
            .unwrap();
        assert_eq!(output.stdout, word);
    }

    #[test]
    fn test_output_value_encoding() {
        let output = CommandOutput {
            status: Some(0),
            stdout: "ok".to_string(),
            stderr: String::new(),
        };
        assert_eq!(CommandOutput::from_value(&output.to_value()).unwrap(), output);
        assert!(CommandOutput::from_value(&Value::Null).is_err());
    }
}

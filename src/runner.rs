use crate::env::Environment;
use crate::error::{RctfError, Result};
use regex::Regex;
use std::fmt;
use std::path::PathBuf;
use std::process::{ExitStatus, Stdio};
use std::sync::OnceLock;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::{Child, Command};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

/// Prompt in front of every line of subprocess output.
pub const DATA_PROMPT: &str = " *  ";
/// Prompt of the separator bars framing a command's output.
pub const BAR_PROMPT: &str = " *--";
const BAR_WIDTH: usize = 80;
const READ_CHUNK: usize = 8192;

/// Exit status that usually just means "something failed" but is also what docker-compose
/// returns when it cannot reach the daemon socket.
const GENERIC_FAILURE: i32 = 1;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShellCommand {
    /// Executed directly, no shell involved.
    Argv(Vec<String>),
    /// Handed to the system shell as `-c <string>`.
    Shell(String),
}

impl ShellCommand {
    pub fn argv<I, S>(args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        ShellCommand::Argv(args.into_iter().map(Into::into).collect())
    }

    #[cfg(unix)]
    fn program_and_args(&self) -> (String, Vec<String>) {
        match self {
            ShellCommand::Argv(argv) => split_argv(argv),
            ShellCommand::Shell(line) => {
                ("/bin/sh".to_string(), vec!["-c".to_string(), line.clone()])
            }
        }
    }

    #[cfg(not(unix))]
    fn program_and_args(&self) -> (String, Vec<String>) {
        match self {
            ShellCommand::Argv(argv) => split_argv(argv),
            ShellCommand::Shell(line) => ("cmd".to_string(), vec!["/C".to_string(), line.clone()]),
        }
    }
}

fn split_argv(argv: &[String]) -> (String, Vec<String>) {
    match argv.split_first() {
        Some((program, rest)) => (program.clone(), rest.to_vec()),
        None => (String::new(), Vec::new()),
    }
}

impl fmt::Display for ShellCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ShellCommand::Argv(argv) => f.write_str(&argv.join(" ")),
            ShellCommand::Shell(line) => f.write_str(line),
        }
    }
}

impl From<&str> for ShellCommand {
    fn from(line: &str) -> Self {
        ShellCommand::Shell(line.to_string())
    }
}

impl From<String> for ShellCommand {
    fn from(line: String) -> Self {
        ShellCommand::Shell(line)
    }
}

impl From<Vec<String>> for ShellCommand {
    fn from(argv: Vec<String>) -> Self {
        ShellCommand::Argv(argv)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamKind {
    Stdout,
    Stderr,
}

impl StreamKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            StreamKind::Stdout => "stdout",
            StreamKind::Stderr => "stderr",
        }
    }
}

/// What the runner shows for a command while it runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutputEvent {
    Separator,
    Chunk { stream: StreamKind, text: String },
}

/// Launches commands and streams their output through the log.
#[derive(Debug, Clone)]
pub struct Runner {
    cwd: Option<PathBuf>,
    privileged: bool,
    invocation: String,
}

impl Default for Runner {
    fn default() -> Self {
        Self::new()
    }
}

impl Runner {
    pub fn new() -> Self {
        Runner {
            cwd: None,
            privileged: verify_privileges(),
            invocation: std::env::args().collect::<Vec<_>>().join(" "),
        }
    }

    pub fn current_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cwd = Some(dir.into());
        self
    }

    /// Override the detected privilege level used by the permission heuristic.
    pub fn privileged(mut self, privileged: bool) -> Self {
        self.privileged = privileged;
        self
    }

    /// Run `command` and log its output; `Ok(true)` iff it exited with status 0.
    ///
    /// Without `env`, or with an empty one, the child inherits this process's environment.
    /// Otherwise it sees exactly `env`. A status of 1 from an unprivileged caller is reported as
    /// [`RctfError::Permission`].
    pub async fn run(
        &self,
        command: impl Into<ShellCommand>,
        env: Option<&Environment>,
    ) -> Result<bool> {
        self.run_with(command, env, log_output).await
    }

    /// Same as [`Runner::run`] with output events handed to `sink` instead of the log.
    pub async fn run_with<F>(
        &self,
        command: impl Into<ShellCommand>,
        env: Option<&Environment>,
        mut sink: F,
    ) -> Result<bool>
    where
        F: FnMut(OutputEvent),
    {
        let command = command.into();
        debug!("Executing {command}...");

        let mut child = self.spawn(&command, env)?;
        let mut rx = stream_output(&mut child);

        let mut framed = false;
        while let Some((stream, raw)) = rx.recv().await {
            let text = frame_chunk(&raw);
            if text.is_empty() {
                continue;
            }
            if !framed {
                sink(OutputEvent::Separator);
                framed = true;
            }
            sink(OutputEvent::Chunk { stream, text });
        }

        let code = exit_code(child.wait().await?);

        if framed {
            sink(OutputEvent::Separator);
        }

        if code != 0 {
            error!("Command failed to execute; exited with status code {code}.");
        }

        if code == GENERIC_FAILURE && !self.privileged {
            warn!(
                "Possible permission denied error? Try running as root.\n\n    {}\n",
                self.invocation
            );
            return Err(RctfError::Permission {
                invocation: self.invocation.clone(),
            });
        }

        Ok(code == 0)
    }

    fn spawn(&self, command: &ShellCommand, env: Option<&Environment>) -> Result<Child> {
        let (program, args) = command.program_and_args();

        let mut c = Command::new(program);
        c.args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        if let Some(env) = env.filter(|env| !env.is_empty()) {
            c.env_clear().envs(env);
        }
        if let Some(cwd) = &self.cwd {
            c.current_dir(cwd);
        }

        Ok(c.spawn()?)
    }
}

/// Forward both pipes into one channel. It closes once both streams hit end-of-file.
fn stream_output(child: &mut Child) -> mpsc::UnboundedReceiver<(StreamKind, String)> {
    let (tx, rx) = mpsc::unbounded_channel();

    if let Some(stdout) = child.stdout.take() {
        forward(stdout, StreamKind::Stdout, tx.clone());
    }
    if let Some(stderr) = child.stderr.take() {
        forward(stderr, StreamKind::Stderr, tx);
    }

    rx
}

/// Read `reader` until end-of-file, sending decoded text. A multibyte character split across
/// two reads is held back until its remaining bytes arrive.
fn forward<R>(mut reader: R, stream: StreamKind, tx: mpsc::UnboundedSender<(StreamKind, String)>)
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut buf = vec![0u8; READ_CHUNK];
        let mut pending = Vec::new();
        loop {
            match reader.read(&mut buf).await {
                Ok(0) => break,
                Ok(n) => {
                    pending.extend_from_slice(&buf[..n]);
                    let text = take_complete_utf8(&mut pending);
                    if !text.is_empty() && tx.send((stream, text)).is_err() {
                        return;
                    }
                }
                Err(e) => {
                    warn!("Reading child {} failed: {e}", stream.as_str());
                    break;
                }
            }
        }
        if !pending.is_empty() {
            let _ = tx.send((stream, String::from_utf8_lossy(&pending).into_owned()));
        }
    });
}

/// Drain and decode everything in `pending` except an incomplete character at its end.
/// Invalid sequences elsewhere become U+FFFD.
fn take_complete_utf8(pending: &mut Vec<u8>) -> String {
    let keep_from = match std::str::from_utf8(pending) {
        Ok(_) => pending.len(),
        Err(e) if e.error_len().is_none() => e.valid_up_to(),
        Err(_) => incomplete_tail_start(pending),
    };
    let tail = pending.split_off(keep_from);
    let head = std::mem::replace(pending, tail);
    String::from_utf8_lossy(&head).into_owned()
}

/// Start of a trailing multibyte sequence that still lacks bytes, or `bytes.len()` if none.
fn incomplete_tail_start(bytes: &[u8]) -> usize {
    let len = bytes.len();
    for back in 1..=len.min(3) {
        let byte = bytes[len - back];
        if byte & 0xC0 == 0x80 {
            continue;
        }
        let width = match byte {
            0xC0..=0xDF => 2,
            0xE0..=0xEF => 3,
            0xF0..=0xF7 => 4,
            _ => 1,
        };
        return if width > back { len - back } else { len };
    }
    len
}

fn log_output(event: OutputEvent) {
    match event {
        OutputEvent::Separator => info!(prompt = BAR_PROMPT, "{}", "-".repeat(BAR_WIDTH)),
        OutputEvent::Chunk { stream, text } => {
            info!(prompt = DATA_PROMPT, stream = stream.as_str(), "{text}")
        }
    }
}

/// Trim a chunk, drop escape sequences and prefix every continuation line with the data prompt.
pub fn frame_chunk(raw: &str) -> String {
    let clean = strip_ansi(raw.trim());
    clean
        .lines()
        .collect::<Vec<_>>()
        .join(&format!("\n{DATA_PROMPT}"))
}

pub fn strip_ansi(text: &str) -> String {
    static ANSI_RE: OnceLock<Regex> = OnceLock::new();
    let re = ANSI_RE.get_or_init(|| {
        Regex::new(r"\x1B(?:\[[0-?]*[ -/]*[@-~]|\][^\x07\x1B]*(?:\x07|\x1B\\)|[@-Z\\-_])")
            .expect("ANSI escape pattern is valid")
    });
    re.replace_all(text, "").into_owned()
}

fn exit_code(status: ExitStatus) -> i32 {
    if let Some(code) = status.code() {
        return code;
    }
    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(signal) = status.signal() {
            return -signal;
        }
    }
    if status.success() {
        0
    } else {
        GENERIC_FAILURE
    }
}

#[cfg(unix)]
pub fn verify_privileges() -> bool {
    nix::unistd::geteuid().is_root()
}

#[cfg(not(unix))]
pub fn verify_privileges() -> bool {
    false
}

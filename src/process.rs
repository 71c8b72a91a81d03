//! Child process invocations.
//!
//! Every external tool is started through an [`Invocation`]: an explicit
//! program and argument vector, never a shell string. Output is streamed line
//! by line to stdout behind a colored prefix and captured at the same time so
//! failures can carry it.

use std::fmt;
use std::io::Write;
use std::path::PathBuf;
use std::process::{ExitStatus, Stdio};

use colored::ColoredString;
use futures::future::try_join;
use itertools::Itertools;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;

#[derive(Debug)]
pub struct ProcessOutput {
    pub status: ExitStatus,
    pub stdout: String,
    pub stderr: String,
}

impl ProcessOutput {
    pub fn success(&self) -> bool {
        self.status.success()
    }

    /// Both captured streams, stdout first.
    pub fn combined(&self) -> String {
        let mut combined = self.stdout.clone();
        combined.push_str(&self.stderr);
        combined
    }
}

#[derive(Clone, PartialEq, Eq)]
pub struct Invocation {
    pub program: PathBuf,
    pub args: Vec<String>,
    /// Extra environment for the child. Values are never displayed.
    envs: Vec<(String, String)>,
}

impl Invocation {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: vec![],
            envs: vec![],
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.envs.push((key.into(), value.into()));
        self
    }

    pub fn env_keys(&self) -> impl Iterator<Item = &str> {
        self.envs.iter().map(|(key, _)| key.as_str())
    }

    /// Runs the invocation to completion.
    ///
    /// Each output line is printed as `<label> <line>` unless `quiet` is set.
    /// A non-zero exit is not an error here; callers decide what it means.
    pub async fn run(&self, label: &ColoredString, quiet: bool) -> std::io::Result<ProcessOutput> {
        let mut child = Command::new(&self.program)
            .args(&self.args)
            .envs(self.envs.iter().map(|(k, v)| (k, v)))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()?;
        let (Some(stdout), Some(stderr)) = (child.stdout.take(), child.stderr.take()) else {
            return Err(std::io::Error::new(
                std::io::ErrorKind::Other,
                format!("output of '{}' was not captured", self),
            ));
        };
        let (stdout, stderr) =
            try_join(stream(label, stdout, quiet), stream(label, stderr, quiet)).await?;
        let status = child.wait().await?;
        Ok(ProcessOutput {
            status,
            stdout,
            stderr,
        })
    }
}

impl fmt::Display for Invocation {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "{}",
            std::iter::once(shell_quote(&self.program.to_string_lossy()))
                .chain(self.args.iter().map(|arg| shell_quote(arg)))
                .join(" ")
        )
    }
}

impl fmt::Debug for Invocation {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("Invocation")
            .field("program", &self.program)
            .field("args", &self.args)
            .field("envs", &self.env_keys().collect::<Vec<_>>())
            .finish()
    }
}

/// Quotes `arg` for a POSIX shell. Plain words are left alone.
pub fn shell_quote(arg: &str) -> String {
    let plain = !arg.is_empty()
        && arg
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b"_-./=:@,+%".contains(&b));
    if plain {
        arg.to_string()
    } else {
        format!("'{}'", arg.replace('\'', r"'\''"))
    }
}

async fn stream<B: AsyncRead + Unpin>(
    label: &ColoredString,
    stream: B,
    quiet: bool,
) -> std::io::Result<String> {
    let mut reader = BufReader::new(stream);
    let mut buf = Vec::with_capacity(reader.buffer().len());
    let mut captured = String::new();
    loop {
        buf.clear();
        // Read into the buffer until either \r or \n is met.
        read_until2(&mut reader, b'\r', b'\n', &mut buf).await?;
        // An empty buffer means that EOF was reached.
        if buf.is_empty() {
            break;
        }
        let decoded = String::from_utf8_lossy(&buf);
        let line = decoded.trim_end_matches(|c| c == '\r' || c == '\n');
        if line.is_empty() {
            continue;
        }
        if !quiet {
            // Without the lock, lines from different nodes get mixed.
            let stdout = std::io::stdout();
            let mut guard = stdout.lock();
            // A closed stdout must not fail the remote command.
            let _ = writeln!(guard, "{} {}", label, line);
        }
        captured.push_str(line);
        captured.push('\n');
    }
    Ok(captured)
}

async fn read_until2<B: AsyncRead + Unpin>(
    reader: &mut BufReader<B>,
    delimiter1: u8,
    delimiter2: u8,
    buf: &mut Vec<u8>,
) -> std::io::Result<()> {
    loop {
        let (done, used) = {
            let available = reader.fill_buf().await?;
            if let Some(i) = memchr::memchr2(delimiter1, delimiter2, available) {
                buf.extend_from_slice(&available[..=i]);
                (true, i + 1)
            } else {
                buf.extend_from_slice(available);
                (false, available.len())
            }
        };
        reader.consume(used);
        if done || used == 0 {
            return Ok(());
        }
    }
}

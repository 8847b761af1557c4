//! Child process supervision
//!
//! Runs a command with its stdout and stderr piped through one
//! [`RedactingWriter`] each. Both streams are pumped by independent tasks;
//! the child's exit status is only awaited after both pumps have drained
//! their pipe and closed their writer, so trailing output is never lost.

use std::fmt;
use std::process::{ExitStatus, Stdio};
use std::sync::Arc;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite};
use tokio::process::Command;
use tokio::task::JoinHandle;
use tracing::{debug, error, warn};

use crate::error::PumpError;
use crate::writer::{RedactingWriter, Redactor};

const READ_CHUNK: usize = 8 * 1024;

/// Which output channel of the child a pump serves
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamKind {
    Stdout,
    Stderr,
}

impl StreamKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Stdout => "stdout",
            Self::Stderr => "stderr",
        }
    }
}

impl fmt::Display for StreamKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Copy `source` into `writer` until end of data, then close the writer
///
/// A read error ends the stream like EOF does; whatever was already accepted
/// is still sanitized and delivered. After a destination failure the rest of
/// `source` is drained and dropped, then the failure is returned.
pub async fn pump<R, W>(
    stream: StreamKind,
    mut source: R,
    mut writer: RedactingWriter<W>,
) -> Result<W, PumpError>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut chunk = vec![0u8; READ_CHUNK];

    loop {
        let n = match source.read(&mut chunk).await {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(e) => {
                warn!("reading {}: {}", stream, e);
                break;
            }
        };

        if let Err(e) = writer.write(&chunk[..n]).await {
            warn!("{} destination failed, discarding the rest of the stream", stream);
            discard(stream, &mut source).await;
            return Err(PumpError::Redact { stream, source: e });
        }
    }

    writer
        .close()
        .await
        .map_err(|source| PumpError::Redact { stream, source })?;

    debug!("{} drained", stream);
    Ok(writer.into_inner())
}

/// Read `source` to its end without forwarding anything, so the child
/// never writes into a closed pipe
async fn discard<R>(stream: StreamKind, source: &mut R)
where
    R: AsyncRead + Unpin,
{
    match tokio::io::copy(source, &mut tokio::io::sink()).await {
        Ok(n) => debug!("{}: discarded {} bytes", stream, n),
        Err(e) => warn!("reading {}: {}", stream, e),
    }
}

/// Result of a supervised run
#[derive(Debug)]
pub struct RunOutcome<O, E> {
    pub status: ExitStatus,
    pub stdout: Result<O, PumpError>,
    pub stderr: Result<E, PumpError>,
}

/// Spawn `command` with redacted stdout/stderr and wait for it
///
/// Stdout and stderr of `command` are overridden with pipes; everything else
/// (args, env, stdin, cwd) is left as the caller configured it. Pump failures
/// are logged and reported in the outcome; they never stop the other stream
/// or the child.
pub async fn run_redacted<O, E>(
    mut command: Command,
    redactor: Arc<Redactor>,
    stdout: O,
    stderr: E,
) -> std::io::Result<RunOutcome<O, E>>
where
    O: AsyncWrite + Unpin + Send + 'static,
    E: AsyncWrite + Unpin + Send + 'static,
{
    command.stdout(Stdio::piped()).stderr(Stdio::piped());

    let mut child = command.spawn()?;

    let child_stdout = child
        .stdout
        .take()
        .ok_or_else(|| std::io::Error::other("child stdout was not piped"))?;
    let child_stderr = child
        .stderr
        .take()
        .ok_or_else(|| std::io::Error::other("child stderr was not piped"))?;

    let out_task = tokio::spawn(pump(
        StreamKind::Stdout,
        child_stdout,
        RedactingWriter::new(stdout, Arc::clone(&redactor)),
    ));
    let err_task = tokio::spawn(pump(
        StreamKind::Stderr,
        child_stderr,
        RedactingWriter::new(stderr, redactor),
    ));

    let (stdout, stderr) = tokio::join!(
        join_pump(StreamKind::Stdout, out_task),
        join_pump(StreamKind::Stderr, err_task)
    );

    let status = child.wait().await?;
    debug!("child exited with {}", status);

    Ok(RunOutcome {
        status,
        stdout,
        stderr,
    })
}

async fn join_pump<W>(
    stream: StreamKind,
    handle: JoinHandle<Result<W, PumpError>>,
) -> Result<W, PumpError> {
    let result = match handle.await {
        Ok(result) => result,
        Err(e) => Err(PumpError::Aborted {
            stream,
            reason: e.to_string(),
        }),
    };

    if let Err(e) = &result {
        error!("obfuscating {}: {}", stream, e);
    }

    result
}

/// Exit code to report for a finished child
///
/// Signals map to `128 + signal` the way shells report them.
pub fn exit_code(status: &ExitStatus) -> i32 {
    if let Some(code) = status.code() {
        return code;
    }

    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(signal) = status.signal() {
            return 128 + signal;
        }
    }

    1
}

//! Child processes as tubes.
//!
//! The child's stdout and stderr are merged into the tube's input, so both show
//! up in `recv_*`. Stderr is also echoed to our own stderr as it arrives unless
//! [`TubeConfig::echo_stderr`] is off.

use std::ffi::OsStr;
use std::ops::{Deref, DerefMut};
use std::process::{ExitStatus, Stdio};
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, DuplexStream};
use tokio::process::{Child, Command};
use tokio::sync::mpsc;

use crate::config::TubeConfig;
use crate::error::{Result, TubeError};
use crate::tube::{Closer, Sink, Tube};

const MERGE_BUFFER_SIZE: usize = 64 * 1024;

/// How a child ended when its tube was closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Termination {
    /// Exited on its own within the grace period.
    Exited(ExitStatus),
    /// Still running at the deadline and killed.
    Killed,
}

impl Termination {
    pub fn was_killed(&self) -> bool {
        matches!(self, Self::Killed)
    }
}

/// Owns the child handle and applies the grace-then-kill close policy.
#[derive(Debug)]
pub struct Reaper {
    child: Child,
    grace: Duration,
    termination: Option<Termination>,
}

impl Reaper {
    /// Waits up to the grace period for the child to exit, then kills it.
    ///
    /// Later calls report the outcome of the first one.
    pub async fn terminate(&mut self) -> Result<Termination> {
        if let Some(termination) = self.termination {
            return Ok(termination);
        }
        let termination = self.wait_or_kill().await?;
        self.termination = Some(termination);
        Ok(termination)
    }

    async fn wait_or_kill(&mut self) -> Result<Termination> {
        match tokio::time::timeout(self.grace, self.child.wait()).await {
            Ok(status) => {
                let status = status?;
                log::debug!("process: pid {:?} exited with {status}", self.child.id());
                Ok(Termination::Exited(status))
            }
            Err(_) => {
                log::debug!(
                    "process: pid {:?} still running after {:?}, killing",
                    self.child.id(),
                    self.grace
                );
                self.child.kill().await?;
                Ok(Termination::Killed)
            }
        }
    }
}

#[async_trait]
impl Closer for Reaper {
    async fn close(&mut self, _sink: &mut Sink) -> Result<()> {
        self.terminate().await.map(|_| ())
    }
}

/// A spawned program wrapped as a tube.
///
/// Dereferences to [`Tube`], so every receive and send operation is available
/// directly on the process.
#[derive(Debug)]
pub struct Process {
    tube: Tube<Reaper>,
    program: String,
    pid: Option<u32>,
}

impl Process {
    /// Spawns `argv[0]` with the remaining items as arguments.
    ///
    /// Must be called from within a tokio runtime.
    pub fn spawn<I, S>(argv: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        Self::spawn_with(argv, &TubeConfig::default())
    }

    pub fn spawn_with<I, S>(argv: I, config: &TubeConfig) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        let mut argv = argv.into_iter();
        let program = argv.next().ok_or(TubeError::EmptyCommand)?;
        let program_name = program.as_ref().to_string_lossy().into_owned();

        let mut child = Command::new(program.as_ref())
            .args(argv)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| TubeError::Spawn { program: program_name.clone(), source })?;

        let stdin = child.stdin.take().ok_or(TubeError::MissingPipe("stdin"))?;
        let stdout = child.stdout.take().ok_or(TubeError::MissingPipe("stdout"))?;
        let stderr = child.stderr.take().ok_or(TubeError::MissingPipe("stderr"))?;

        let (merged, tap) = tokio::io::duplex(MERGE_BUFFER_SIZE);
        let (err_tx, err_rx) = mpsc::unbounded_channel();
        let echo = config.echo_stderr.then(tokio::io::stderr);
        tokio::spawn(forward_stderr(stderr, echo, Some(err_tx), config.read_chunk));
        tokio::spawn(merge_output(stdout, err_rx, tap, config.read_chunk));

        let pid = child.id();
        log::debug!("process: spawned {program_name} (pid {pid:?})");

        let reaper = Reaper { child, grace: config.close_grace(), termination: None };
        let tube = Tube::from_parts(Box::new(merged), Box::new(stdin), reaper, config);
        Ok(Self { tube, program: program_name, pid })
    }

    /// OS process id, if the child was still running when spawned.
    pub fn id(&self) -> Option<u32> {
        self.pid
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    /// Waits for the child to exit, killing it once the grace period runs out.
    ///
    /// If the child was already reaped (interactive mode closes the tube when
    /// terminal input ends) the earlier outcome is returned.
    pub async fn close(mut self) -> Result<Termination> {
        self.tube.flush_output().await;
        self.tube.closer_mut().terminate().await
    }
}

impl Deref for Process {
    type Target = Tube<Reaper>;

    fn deref(&self) -> &Self::Target {
        &self.tube
    }
}

impl DerefMut for Process {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.tube
    }
}

/// Forwards the child's stderr: echoed to `echo` as it arrives and handed to
/// the merge task over `merged`.
///
/// Runs until the child closes stderr. Neither a full tube nor a dropped one
/// holds up the echo.
async fn forward_stderr<R, W>(
    mut stderr: R,
    mut echo: Option<W>,
    mut merged: Option<mpsc::UnboundedSender<Vec<u8>>>,
    chunk: usize,
) where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut buf = vec![0u8; chunk.max(1)];
    loop {
        let n = match stderr.read(&mut buf).await {
            Ok(0) => break,
            Ok(n) => n,
            Err(err) => {
                log::warn!("process: stderr read failed: {err}");
                break;
            }
        };

        if let Some(host) = echo.as_mut() {
            if let Err(err) = echo_chunk(host, &buf[..n]).await {
                log::warn!("process: stopped echoing stderr: {err}");
                echo = None;
            }
        }
        if merged.as_ref().is_some_and(|tx| tx.send(buf[..n].to_vec()).is_err()) {
            merged = None;
        }
    }
}

/// Copies stdout and forwarded stderr chunks into one stream.
///
/// Ends once stdout is closed and the stderr forwarder is done, or the tube is gone.
async fn merge_output<R>(
    mut stdout: R,
    mut stderr: mpsc::UnboundedReceiver<Vec<u8>>,
    mut merged: DuplexStream,
    chunk: usize,
) where
    R: AsyncRead + Unpin,
{
    let mut out_buf = vec![0u8; chunk.max(1)];
    let (mut out_open, mut err_open) = (true, true);

    while out_open || err_open {
        let written = tokio::select! {
            read = stdout.read(&mut out_buf), if out_open => match read {
                Ok(0) => { out_open = false; continue; }
                Ok(n) => merged.write_all(&out_buf[..n]).await,
                Err(err) => {
                    log::warn!("process: stdout read failed: {err}");
                    out_open = false;
                    continue;
                }
            },
            data = stderr.recv(), if err_open => match data {
                Some(data) => merged.write_all(&data).await,
                None => { err_open = false; continue; }
            },
        };
        if written.is_err() {
            log::debug!("process: tube dropped, output merge stopped");
            return;
        }
    }
}

async fn echo_chunk<W: AsyncWrite + Unpin>(host: &mut W, data: &[u8]) -> std::io::Result<()> {
    host.write_all(data).await?;
    host.flush().await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn empty_argv_is_rejected() {
        let err = Process::spawn(Vec::<String>::new()).unwrap_err();
        assert!(matches!(err, TubeError::EmptyCommand));
    }

    #[tokio::test]
    async fn missing_program_is_a_spawn_error() {
        let err = Process::spawn(["does", "not", "exist"]).unwrap_err();
        match err {
            TubeError::Spawn { program, .. } => assert_eq!(program, "does"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn stderr_echo_does_not_wait_for_the_tube() {
        let (mut child_out, stdout) = tokio::io::duplex(1024);
        let (mut child_err, stderr) = tokio::io::duplex(1024);
        let (mut host, echo) = tokio::io::duplex(1024);
        // Kept open and never read, so the merge stalls once it is full.
        let (_tube, tap) = tokio::io::duplex(64);
        let (err_tx, err_rx) = mpsc::unbounded_channel();
        tokio::spawn(forward_stderr(stderr, Some(echo), Some(err_tx), 256));
        tokio::spawn(merge_output(stdout, err_rx, tap, 256));

        let flood = tokio::spawn(async move {
            let _ = child_out.write_all(&[0u8; 64 * 1024]).await;
        });
        tokio::time::sleep(Duration::from_millis(50)).await;
        child_err.write_all(b"diag\n").await.unwrap();

        let mut echoed = [0u8; 5];
        tokio::time::timeout(Duration::from_secs(2), host.read_exact(&mut echoed))
            .await
            .expect("stderr echo stalled behind the unread tube")
            .unwrap();
        assert_eq!(&echoed, b"diag\n");
        flood.abort();
    }

    #[tokio::test]
    async fn stderr_is_still_echoed_after_the_tube_is_gone() {
        let (mut child_err, stderr) = tokio::io::duplex(1024);
        let (mut host, echo) = tokio::io::duplex(1024);
        let (err_tx, err_rx) = mpsc::unbounded_channel();
        drop(err_rx);
        tokio::spawn(forward_stderr(stderr, Some(echo), Some(err_tx), 256));

        child_err.write_all(b"one\n").await.unwrap();
        child_err.write_all(b"two\n").await.unwrap();
        drop(child_err);

        let mut echoed = Vec::new();
        host.read_to_end(&mut echoed).await.unwrap();
        assert_eq!(echoed, b"one\ntwo\n");
    }

    #[test]
    fn killed_flag() {
        assert!(Termination::Killed.was_killed());
    }
}

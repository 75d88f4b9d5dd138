use std::{io, path::Path, process::Stdio};

use async_trait::async_trait;
use tokio::process::{Child, ChildStderr, ChildStdout, Command};

use crate::error::TranscodeError;

/// The operations the supervisor needs from a running transcoder.
#[async_trait]
pub trait ChildControl: Send {
    /// Waits for exit; `None` when the process was ended by a signal.
    async fn wait(&mut self) -> io::Result<Option<i32>>;

    /// Asks the process to exit on its own.
    fn terminate(&mut self) -> io::Result<()>;

    /// Starts a forced kill; completion is observed through `wait`.
    fn kill(&mut self) -> io::Result<()>;
}

/// A spawned transcoder with its diagnostic pipes still attached.
pub struct SpawnedChild {
    pub child: TranscoderChild,
    pub stdout: Option<ChildStdout>,
    pub stderr: Option<ChildStderr>,
}

pub fn spawn(program: &Path, args: &[String]) -> Result<SpawnedChild, TranscodeError> {
    let mut command = Command::new(program);
    command.args(args);
    command.stdin(Stdio::null());
    command.stdout(Stdio::piped());
    command.stderr(Stdio::piped());
    command.kill_on_drop(true);

    let mut child = command
        .spawn()
        .map_err(|err| TranscodeError::spawn(program, err))?;

    let stdout = child.stdout.take();
    let stderr = child.stderr.take();

    Ok(SpawnedChild {
        child: TranscoderChild { inner: child },
        stdout,
        stderr,
    })
}

pub struct TranscoderChild {
    inner: Child,
}

impl TranscoderChild {
    pub fn id(&self) -> Option<u32> {
        self.inner.id()
    }
}

#[async_trait]
impl ChildControl for TranscoderChild {
    async fn wait(&mut self) -> io::Result<Option<i32>> {
        let status = self.inner.wait().await?;
        Ok(status.code())
    }

    #[cfg(unix)]
    fn terminate(&mut self) -> io::Result<()> {
        use nix::{
            errno::Errno,
            sys::signal::{Signal, kill},
            unistd::Pid,
        };

        let Some(id) = self.inner.id() else {
            return Ok(());
        };
        let pid = i32::try_from(id).map_err(|err| io::Error::new(io::ErrorKind::InvalidInput, err))?;
        match kill(Pid::from_raw(pid), Signal::SIGTERM) {
            Ok(()) | Err(Errno::ESRCH) => Ok(()),
            Err(errno) => Err(io::Error::from(errno)),
        }
    }

    // No polite stop signal exists here, so termination is the kill.
    #[cfg(not(unix))]
    fn terminate(&mut self) -> io::Result<()> {
        self.inner.start_kill()
    }

    fn kill(&mut self) -> io::Result<()> {
        match self.inner.start_kill() {
            Err(err) if err.kind() == io::ErrorKind::InvalidInput => Ok(()),
            other => other,
        }
    }
}

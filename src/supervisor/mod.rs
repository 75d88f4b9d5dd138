mod child;
mod classify;
mod drain;

use std::{fmt, path::PathBuf, time::Duration};

use serde::Serialize;
use tokio::{io::AsyncRead, sync::mpsc, task::JoinHandle};
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, error, info, warn};
use uuid::Uuid;

use crate::error::TranscodeError;

pub use child::{ChildControl, SpawnedChild, TranscoderChild, spawn};
pub use classify::{ClassifierConfig, LineClass, LineClassifier};
pub use drain::{DrainReport, drain_lines};

pub const DEFAULT_PROGRAM: &str = "ffmpeg";
pub const GRACEFUL_TIMEOUT: Duration = Duration::from_secs(10);
pub const DRAIN_JOIN_TIMEOUT: Duration = Duration::from_secs(1);

const STDOUT_LABEL: &str = "ffmpeg_stdout";
const STDERR_LABEL: &str = "ffmpeg_stderr";

#[derive(Clone, Debug)]
pub struct SupervisorConfig {
    pub program: PathBuf,
    pub graceful_timeout: Duration,
    pub drain_join_timeout: Duration,
    pub classifier: ClassifierConfig,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            program: PathBuf::from(DEFAULT_PROGRAM),
            graceful_timeout: GRACEFUL_TIMEOUT,
            drain_join_timeout: DRAIN_JOIN_TIMEOUT,
            classifier: ClassifierConfig::default(),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SupervisorState {
    Idle,
    Starting,
    Running,
    Stopping,
    Exited,
}

impl fmt::Display for SupervisorState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Idle => "idle",
            Self::Starting => "starting",
            Self::Running => "running",
            Self::Stopping => "stopping",
            Self::Exited => "exited",
        };
        f.write_str(label)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ExitReason {
    /// The transcoder exited without being asked to.
    Natural,
    /// An external interrupt drove the stop sequence.
    Interrupted,
}

#[derive(Clone, Debug, Serialize)]
pub struct RunOutcome {
    pub run_id: Uuid,
    /// `None` when the process was ended by a signal.
    pub exit_code: Option<i32>,
    pub reason: ExitReason,
    pub forced_kill: bool,
    /// Reports of the drain tasks that finished before the join timeout.
    pub reports: Vec<DrainReport>,
}

impl RunOutcome {
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }
}

enum RunEvent {
    Exited(std::io::Result<Option<i32>>),
    Interrupted,
    DrainFault,
}

enum StopEvent {
    Exited(std::io::Result<Option<i32>>),
    TimedOut,
    Escalated,
}

/// Owns one transcoder process from spawn to teardown.
pub struct Supervisor {
    config: SupervisorConfig,
    state: SupervisorState,
    run_id: Uuid,
}

impl Supervisor {
    pub fn new(config: SupervisorConfig) -> Self {
        Self {
            config,
            state: SupervisorState::Idle,
            run_id: Uuid::new_v4(),
        }
    }

    pub fn state(&self) -> SupervisorState {
        self.state
    }

    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    pub fn config(&self) -> &SupervisorConfig {
        &self.config
    }

    /// Spawns the transcoder with `args` and supervises it until it exits.
    ///
    /// Each message on `interrupts` is one external stop request: the first
    /// starts the graceful stop, a later one skips straight to the kill.
    pub async fn run(
        &mut self,
        args: &[String],
        interrupts: &mut mpsc::Receiver<()>,
    ) -> Result<RunOutcome, TranscodeError> {
        self.run_id = Uuid::new_v4();
        self.transition(SupervisorState::Starting);

        let program = self.config.program.clone();
        debug!(run_id = %self.run_id, command = %args.join(" "), "spawning transcoder");

        let spawned = match spawn(&program, args) {
            Ok(spawned) => spawned,
            Err(err) => {
                error!(run_id = %self.run_id, program = %program.display(), error = %err, "could not start transcoder");
                self.transition(SupervisorState::Exited);
                return Err(err);
            }
        };

        info!(
            run_id = %self.run_id,
            pid = ?spawned.child.id(),
            "transcoder running, press Ctrl+C to stop"
        );

        self.supervise(spawned.child, spawned.stdout, spawned.stderr, interrupts)
            .await
    }

    /// Drives an already started child through running, stopping and teardown.
    pub async fn supervise<C, O, E>(
        &mut self,
        mut child: C,
        stdout: Option<O>,
        stderr: Option<E>,
        interrupts: &mut mpsc::Receiver<()>,
    ) -> Result<RunOutcome, TranscodeError>
    where
        C: ChildControl,
        O: AsyncRead + Unpin + Send + 'static,
        E: AsyncRead + Unpin + Send + 'static,
    {
        let span = tracing::info_span!("supervise", run_id = %self.run_id);
        async move {
            if self.state == SupervisorState::Idle {
                self.transition(SupervisorState::Starting);
            }
            self.transition(SupervisorState::Running);

            let fault = CancellationToken::new();
            let classifier = LineClassifier::new(&self.config.classifier);
            let mut drains = Vec::with_capacity(2);
            if let Some(stdout) = stdout {
                drains.push(spawn_drain(stdout, STDOUT_LABEL, &classifier, &fault));
            }
            if let Some(stderr) = stderr {
                drains.push(spawn_drain(stderr, STDERR_LABEL, &classifier, &fault));
            }

            let event = tokio::select! {
                result = child.wait() => RunEvent::Exited(result),
                Some(()) = interrupts.recv() => RunEvent::Interrupted,
                _ = fault.cancelled() => RunEvent::DrainFault,
            };

            let mut reason = ExitReason::Natural;
            let mut forced_kill = false;
            let exit = match event {
                RunEvent::Exited(Ok(code)) => Ok(code),
                RunEvent::Exited(Err(err)) => {
                    error!(error = %err, "lost track of transcoder, killing it");
                    forced_kill = true;
                    self.force_kill(&mut child).await.ok();
                    Err(TranscodeError::Wait(err))
                }
                RunEvent::Interrupted => {
                    info!("interrupt received, stopping transcoder");
                    reason = ExitReason::Interrupted;
                    let (exit, forced) = self.stop(&mut child, interrupts).await;
                    forced_kill = forced;
                    exit
                }
                RunEvent::DrainFault => {
                    error!("transcoder output could not be read, killing it");
                    forced_kill = true;
                    self.force_kill(&mut child).await
                }
            };

            self.transition(SupervisorState::Exited);
            let (reports, drain_error) = self.join_drains(drains).await;

            let exit_code = exit?;
            match exit_code {
                Some(0) => info!(exit_code = 0, "transcoder exited"),
                Some(code) => warn!(exit_code = code, "transcoder exited with failure"),
                None => warn!(forced_kill, "transcoder terminated by signal"),
            }

            if let Some(err) = drain_error {
                return Err(err);
            }

            Ok(RunOutcome {
                run_id: self.run_id,
                exit_code,
                reason,
                forced_kill,
                reports,
            })
        }
        .instrument(span)
        .await
    }

    // Returns the exit result and whether a forced kill was needed.
    async fn stop<C: ChildControl>(
        &mut self,
        child: &mut C,
        interrupts: &mut mpsc::Receiver<()>,
    ) -> (Result<Option<i32>, TranscodeError>, bool) {
        self.transition(SupervisorState::Stopping);

        if let Err(err) = child.terminate() {
            warn!(error = %err, "termination request failed, killing transcoder");
            return (self.force_kill(child).await, true);
        }

        let timeout = self.config.graceful_timeout;
        let event = tokio::select! {
            result = tokio::time::timeout(timeout, child.wait()) => match result {
                Ok(exit) => StopEvent::Exited(exit),
                Err(_) => StopEvent::TimedOut,
            },
            Some(()) = interrupts.recv() => StopEvent::Escalated,
        };

        match event {
            StopEvent::Exited(Ok(code)) => (Ok(code), false),
            StopEvent::Exited(Err(err)) => {
                error!(error = %err, "waiting for graceful exit failed, killing transcoder");
                self.force_kill(child).await.ok();
                (Err(TranscodeError::Wait(err)), true)
            }
            StopEvent::TimedOut => {
                warn!(
                    timeout_secs = timeout.as_secs_f64(),
                    "transcoder ignored termination request, killing it"
                );
                (self.force_kill(child).await, true)
            }
            StopEvent::Escalated => {
                warn!("second interrupt received, killing transcoder");
                (self.force_kill(child).await, true)
            }
        }
    }

    async fn force_kill<C: ChildControl>(
        &self,
        child: &mut C,
    ) -> Result<Option<i32>, TranscodeError> {
        if let Err(err) = child.kill() {
            error!(error = %err, "failed to kill transcoder");
        }
        child.wait().await.map_err(TranscodeError::Wait)
    }

    async fn join_drains(
        &self,
        drains: Vec<JoinHandle<Result<DrainReport, TranscodeError>>>,
    ) -> (Vec<DrainReport>, Option<TranscodeError>) {
        let mut reports = Vec::with_capacity(drains.len());
        let mut first_error = None;

        for mut handle in drains {
            match tokio::time::timeout(self.config.drain_join_timeout, &mut handle).await {
                Ok(Ok(Ok(report))) => reports.push(report),
                Ok(Ok(Err(err))) => {
                    first_error.get_or_insert(err);
                }
                Ok(Err(join_err)) => {
                    warn!(error = %join_err, "transcoder output task failed");
                }
                Err(_) => {
                    handle.abort();
                    warn!(
                        timeout_ms = self.config.drain_join_timeout.as_millis() as u64,
                        "transcoder output stream still open, abandoning it"
                    );
                }
            }
        }

        (reports, first_error)
    }

    fn transition(&mut self, next: SupervisorState) {
        debug!(from = %self.state, to = %next, "supervisor state");
        self.state = next;
    }
}

fn spawn_drain<R>(
    reader: R,
    stream: &'static str,
    classifier: &LineClassifier,
    fault: &CancellationToken,
) -> JoinHandle<Result<DrainReport, TranscodeError>>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(drain_lines(reader, stream, classifier.clone(), fault.clone()).in_current_span())
}

use async_trait::async_trait;
use procstream_host::{
    HostError, HostFactory, LineEvent, OutputStreams, ProcessHost, SpawnSpec,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinSet;

const SCRIPTED_PID: u32 = 4242;

/// One action of a scripted output stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Step {
    /// Push a line.
    Line(String),
    /// Push the closing signal.
    Close,
    /// Sleep before the next step.
    Pause(Duration),
    /// Keep the stream open forever.
    Hang,
}

/// What a scripted process writes to stdout and stderr.
///
/// Both streams are played by independent tasks, so their relative order is
/// up to the scheduler.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Script {
    /// Steps played on stdout.
    pub data: Vec<Step>,
    /// Steps played on stderr.
    pub error: Vec<Step>,
}

impl Script {
    /// An empty script: both streams end without output or closing signal.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Every `data` line on stdout, every `errors` line on stderr, both closed.
    #[must_use]
    pub fn lines(data: &[&str], errors: &[&str]) -> Self {
        let mut script = Self::new();
        for line in data {
            script = script.stdout(line);
        }
        for line in errors {
            script = script.stderr(line);
        }
        script.close_stdout().close_stderr()
    }

    /// A process that never closes either stream.
    #[must_use]
    pub fn hanging() -> Self {
        Self::new().hang_stdout().hang_stderr()
    }

    /// Appends a stdout line.
    #[must_use]
    pub fn stdout(mut self, line: &str) -> Self {
        self.data.push(Step::Line(line.to_string()));
        self
    }

    /// Appends a stderr line.
    #[must_use]
    pub fn stderr(mut self, line: &str) -> Self {
        self.error.push(Step::Line(line.to_string()));
        self
    }

    /// Appends the stdout closing signal.
    #[must_use]
    pub fn close_stdout(mut self) -> Self {
        self.data.push(Step::Close);
        self
    }

    /// Appends the stderr closing signal.
    #[must_use]
    pub fn close_stderr(mut self) -> Self {
        self.error.push(Step::Close);
        self
    }

    /// Appends a stdout pause.
    #[must_use]
    pub fn pause_stdout(mut self, duration: Duration) -> Self {
        self.data.push(Step::Pause(duration));
        self
    }

    /// Appends a stderr pause.
    #[must_use]
    pub fn pause_stderr(mut self, duration: Duration) -> Self {
        self.error.push(Step::Pause(duration));
        self
    }

    /// Keeps stdout open after the previous steps.
    #[must_use]
    pub fn hang_stdout(mut self) -> Self {
        self.data.push(Step::Hang);
        self
    }

    /// Keeps stderr open after the previous steps.
    #[must_use]
    pub fn hang_stderr(mut self) -> Self {
        self.error.push(Step::Hang);
        self
    }
}

/// Counters shared between a factory, its hosts and the test.
#[derive(Debug, Default)]
pub struct HostProbe {
    spawns: AtomicUsize,
    stop_requests: AtomicUsize,
    disposals: AtomicUsize,
    last_spawn: Mutex<Option<SpawnSpec>>,
}

impl HostProbe {
    /// Number of successful and failed spawn attempts.
    pub fn spawns(&self) -> usize {
        self.spawns.load(Ordering::SeqCst)
    }

    /// Number of `request_stop` calls across all hosts.
    pub fn stop_requests(&self) -> usize {
        self.stop_requests.load(Ordering::SeqCst)
    }

    /// Number of effective `dispose` calls across all hosts.
    pub fn disposals(&self) -> usize {
        self.disposals.load(Ordering::SeqCst)
    }

    /// The `SpawnSpec` passed to the most recent spawn.
    pub fn last_spawn(&self) -> Option<SpawnSpec> {
        self.last_spawn.lock().ok().and_then(|spec| spec.clone())
    }
}

/// Factory producing [`ScriptedHost`]s that all play the same [`Script`].
#[derive(Debug, Clone, Default)]
pub struct ScriptedHostFactory {
    script: Script,
    probe: Arc<HostProbe>,
    fail_spawn: bool,
    fail_stop: bool,
}

impl ScriptedHostFactory {
    /// Creates a factory playing `script`.
    #[must_use]
    pub fn new(script: Script) -> Self {
        Self {
            script,
            ..Self::default()
        }
    }

    /// Makes every spawn fail.
    #[must_use]
    pub const fn failing_spawn(mut self) -> Self {
        self.fail_spawn = true;
        self
    }

    /// Makes every `request_stop` fail.
    #[must_use]
    pub const fn failing_stop(mut self) -> Self {
        self.fail_stop = true;
        self
    }

    /// Shared counters for assertions.
    #[must_use]
    pub fn probe(&self) -> Arc<HostProbe> {
        Arc::clone(&self.probe)
    }
}

#[async_trait]
impl HostFactory for ScriptedHostFactory {
    type Host = ScriptedHost;

    async fn spawn(&self, spec: &SpawnSpec) -> Result<ScriptedHost, HostError> {
        self.probe.spawns.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut last) = self.probe.last_spawn.lock() {
            *last = Some(spec.clone());
        }

        if self.fail_spawn {
            return Err(HostError::SpawnFailed {
                stage: "spawn".to_string(),
                source: std::io::Error::new(
                    std::io::ErrorKind::NotFound,
                    format!("scripted spawn failure for {}", spec.program),
                ),
            });
        }

        let (data_tx, data_rx) = mpsc::channel(16);
        let (error_tx, error_rx) = mpsc::channel(16);

        let mut producers = JoinSet::new();
        producers.spawn(play(self.script.data.clone(), data_tx));
        producers.spawn(play(self.script.error.clone(), error_tx));

        Ok(ScriptedHost {
            outputs: Some(OutputStreams {
                data: data_rx,
                error: error_rx,
            }),
            producers,
            probe: Arc::clone(&self.probe),
            fail_stop: self.fail_stop,
            stopped: false,
            disposed: false,
        })
    }
}

async fn play(steps: Vec<Step>, tx: mpsc::Sender<LineEvent>) {
    for step in steps {
        match step {
            Step::Line(line) => {
                if tx.send(LineEvent::Line(line)).await.is_err() {
                    return;
                }
            }
            Step::Close => {
                if tx.send(LineEvent::Closed).await.is_err() {
                    return;
                }
            }
            Step::Pause(duration) => tokio::time::sleep(duration).await,
            Step::Hang => std::future::pending::<()>().await,
        }
    }
}

/// In-memory host driven by a [`Script`].
#[derive(Debug)]
pub struct ScriptedHost {
    outputs: Option<OutputStreams>,
    producers: JoinSet<()>,
    probe: Arc<HostProbe>,
    fail_stop: bool,
    stopped: bool,
    disposed: bool,
}

#[async_trait]
impl ProcessHost for ScriptedHost {
    fn pid(&self) -> Option<u32> {
        Some(SCRIPTED_PID)
    }

    fn take_outputs(&mut self) -> Option<OutputStreams> {
        self.outputs.take()
    }

    fn has_exited(&mut self) -> bool {
        self.stopped
    }

    async fn request_stop(&mut self) -> Result<(), HostError> {
        self.probe.stop_requests.fetch_add(1, Ordering::SeqCst);
        if self.disposed {
            return Err(HostError::Disposed);
        }
        if self.fail_stop {
            return Err(HostError::Other("scripted stop failure".to_string()));
        }
        self.producers.abort_all();
        self.stopped = true;
        Ok(())
    }

    async fn await_exit(&mut self) -> Result<Option<i32>, HostError> {
        if self.disposed {
            return Err(HostError::Disposed);
        }
        while self.producers.join_next().await.is_some() {}
        self.stopped = true;
        Ok(Some(0))
    }

    fn dispose(&mut self) {
        if self.disposed {
            return;
        }
        self.disposed = true;
        self.probe.disposals.fetch_add(1, Ordering::SeqCst);
        self.outputs = None;
        self.producers.abort_all();
    }
}

//! Supervision of the mDNS reflector helper process.
//!
//! All state lives in a single task. [`Supervisor`] handles send it commands,
//! pump tasks send it output and exit events, and it publishes the state and
//! captured log through `watch` channels.

pub mod locator;
mod process;
pub mod state;

pub use locator::{FixedHelper, HelperLocator, ResourceRoots};
pub use state::SupervisorState;

use std::future::Future;
use std::io::Write;

use tokio::sync::{mpsc, oneshot, watch};
use tracing::{debug, error, info, warn};

use crate::config::SupervisorConfig;
use crate::error::{Error, Result};
use crate::log_buffer::LogBuffer;
use process::{PumpOptions, ProcessEvent, ProcessHandle};

/// Requests from handles to the supervisor task.
enum Command {
    Start {
        first: String,
        second: String,
        reply: oneshot::Sender<SupervisorState>,
    },
    Stop {
        reply: oneshot::Sender<()>,
    },
}

/// Cloneable handle to a running supervisor task.
#[derive(Clone)]
pub struct Supervisor {
    commands: mpsc::UnboundedSender<Command>,
    state: watch::Receiver<SupervisorState>,
    log: watch::Receiver<LogBuffer>,
}

impl Supervisor {
    /// Start a supervisor that locates the helper through the configured roots.
    ///
    /// Must be called from within a tokio runtime.
    pub fn spawn(config: SupervisorConfig) -> Self {
        let locator = ResourceRoots::from_config(&config);
        Self::with_locator(config, locator)
    }

    /// Start a supervisor with a custom helper locator.
    pub fn with_locator(config: SupervisorConfig, locator: impl HelperLocator + 'static) -> Self {
        let (commands_tx, commands_rx) = mpsc::unbounded_channel();
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (state_tx, state_rx) = watch::channel(SupervisorState::Idle);
        let (log_tx, log_rx) = watch::channel(LogBuffer::new(config.max_log_characters));

        let task = SupervisorTask {
            config,
            locator: Box::new(locator),
            state: state_tx,
            log: log_tx,
            events: events_tx,
            process: None,
            generation: 0,
        };
        tokio::spawn(task.run(commands_rx, events_rx));

        Self {
            commands: commands_tx,
            state: state_rx,
            log: log_rx,
        }
    }

    /// Launch the helper bridging `first` and `second`.
    ///
    /// Returns the state once the request has been applied. While a helper is
    /// already running this is a no-op and returns the unchanged state.
    pub async fn start(&self, first: &str, second: &str) -> Result<SupervisorState> {
        let (reply, response) = oneshot::channel();
        self.commands
            .send(Command::Start {
                first: first.to_string(),
                second: second.to_string(),
                reply,
            })
            .map_err(|_| Error::SupervisorClosed)?;
        response.await.map_err(|_| Error::SupervisorClosed)
    }

    /// Ask a running helper to terminate.
    ///
    /// The state is left as is; it changes once the helper has actually exited.
    pub async fn stop(&self) -> Result<()> {
        let (reply, response) = oneshot::channel();
        self.commands
            .send(Command::Stop { reply })
            .map_err(|_| Error::SupervisorClosed)?;
        response.await.map_err(|_| Error::SupervisorClosed)
    }

    pub fn current_state(&self) -> SupervisorState {
        self.state.borrow().clone()
    }

    /// Captured helper output.
    pub fn current_log(&self) -> String {
        self.log.borrow().as_str().to_string()
    }

    /// Receiver notified on every state change.
    pub fn subscribe_state(&self) -> watch::Receiver<SupervisorState> {
        self.state.clone()
    }

    /// Receiver notified on every log change.
    pub fn subscribe_log(&self) -> watch::Receiver<LogBuffer> {
        self.log.clone()
    }

    /// Wait until no helper is running and return the resulting state.
    pub async fn wait_until_stopped(&self) -> Result<SupervisorState> {
        let mut state = self.state.clone();
        let settled = state
            .wait_for(|state| !state.is_running())
            .await
            .map_err(|_| Error::SupervisorClosed)?;
        Ok(settled.clone())
    }

    /// Copy helper output to `out` as it arrives until the helper is no longer
    /// running, then return the final state.
    ///
    /// When `shutdown` completes the helper is asked to stop and following
    /// continues until it has exited.
    pub async fn follow<W, F>(&self, out: &mut W, shutdown: F) -> Result<SupervisorState>
    where
        W: Write,
        F: Future<Output = ()>,
    {
        let mut log = self.subscribe_log();
        let mut state = self.subscribe_state();
        let mut shutdown = std::pin::pin!(shutdown);
        let mut stopping = false;
        let mut mark = 0;

        loop {
            mark = write_since(&mut log, mark, out)?;
            if !state.borrow_and_update().is_running() {
                break;
            }

            tokio::select! {
                changed = log.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
                changed = state.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
                _ = &mut shutdown, if !stopping => {
                    stopping = true;
                    self.stop().await?;
                }
            }
        }

        // Exit annotations land in the log before the state changes
        write_since(&mut log, mark, out)?;
        self.wait_until_stopped().await
    }
}

/// Write log text appended after `mark` and return the new mark.
fn write_since<W: Write>(
    log: &mut watch::Receiver<LogBuffer>,
    mark: usize,
    out: &mut W,
) -> Result<usize> {
    let buffer = log.borrow_and_update();
    out.write_all(buffer.since(mark).as_bytes())?;
    out.flush()?;
    Ok(buffer.appended())
}

/// The single writer of supervisor state and log.
struct SupervisorTask {
    config: SupervisorConfig,
    locator: Box<dyn HelperLocator>,
    state: watch::Sender<SupervisorState>,
    log: watch::Sender<LogBuffer>,
    events: mpsc::UnboundedSender<ProcessEvent>,
    process: Option<ProcessHandle>,
    generation: u64,
}

impl SupervisorTask {
    async fn run(
        mut self,
        mut commands: mpsc::UnboundedReceiver<Command>,
        mut events: mpsc::UnboundedReceiver<ProcessEvent>,
    ) {
        let mut closing = false;

        loop {
            tokio::select! {
                command = commands.recv(), if !closing => match command {
                    Some(command) => self.handle_command(command),
                    None => {
                        debug!("All supervisor handles dropped");
                        closing = true;
                        match &self.process {
                            Some(process) => process.request_stop(),
                            None => break,
                        }
                    }
                },
                Some(event) = events.recv() => {
                    self.handle_event(event);
                    if closing && self.process.is_none() {
                        break;
                    }
                }
            }
        }

        debug!("Supervisor task finished");
    }

    fn handle_command(&mut self, command: Command) {
        match command {
            Command::Start {
                first,
                second,
                reply,
            } => {
                self.start(&first, &second);
                let _ = reply.send(self.state.borrow().clone());
            }
            Command::Stop { reply } => {
                self.stop();
                let _ = reply.send(());
            }
        }
    }

    fn start(&mut self, first: &str, second: &str) {
        if let SupervisorState::Running(pid) = *self.state.borrow() {
            debug!(pid, "Helper already running, ignoring start");
            return;
        }

        self.log.send_modify(LogBuffer::clear);

        let name = self.config.helper_name.clone();
        let path = match self.locator.locate(&name) {
            Ok(path) => path,
            Err(err) => {
                error!("{}", err);
                self.append_log(&format!("Error: could not locate {} binary.\n", name));
                self.set_state(SupervisorState::Failed("binary not found".to_string()));
                return;
            }
        };

        self.generation += 1;
        let options = PumpOptions {
            stop_grace: self.config.stop_grace(),
            drain_timeout: self.config.drain_timeout(),
        };

        match process::spawn_helper(
            &path,
            &["-d", first, second],
            self.generation,
            self.events.clone(),
            options,
        ) {
            Ok(process) => {
                let pid = process.pid;
                info!(pid, first, second, "Started {}", path.display());
                self.process = Some(process);
                self.set_state(SupervisorState::Running(pid));
                self.append_log(&format!(
                    "Started {} (PID: {}) bridging {} <-> {}\n",
                    name, pid, first, second
                ));
            }
            Err(err) => {
                error!("Failed to spawn {}: {}", path.display(), err);
                self.append_log(&format!("Error spawning process: {}\n", err));
                self.set_state(SupervisorState::Failed(err.to_string()));
            }
        }
    }

    fn stop(&mut self) {
        match &self.process {
            Some(process) => {
                info!(pid = process.pid, "Stopping helper");
                process.request_stop();
            }
            None => debug!("No helper running, ignoring stop"),
        }
    }

    fn handle_event(&mut self, event: ProcessEvent) {
        match event {
            ProcessEvent::Output { generation, text } => {
                if self.is_current(generation) {
                    self.append_log(&text);
                } else {
                    debug!(generation, "Dropping output from a previous helper");
                }
            }
            ProcessEvent::Exited { generation, code } => {
                if !self.is_current(generation) {
                    warn!(generation, code, "Exit of an untracked helper");
                    return;
                }
                // Exit is the only place the handle is released
                let process = self.process.take();
                let pid = process.map(|process| process.pid);
                self.on_exit(pid, code);
            }
        }
    }

    /// Classify an exit. The log is completed before the state is published.
    fn on_exit(&mut self, pid: Option<u32>, code: i32) {
        if code == 0 || code == 15 {
            info!(?pid, code, "Helper stopped");
            self.append_log("\n[Process stopped successfully]");
            self.set_state(SupervisorState::Idle);
        } else {
            warn!(?pid, code, "Helper exited unexpectedly");
            self.append_log(&format!("\n[Process exited unexpectedly: {}]", code));
            self.set_state(SupervisorState::Failed(format!("exited with code {}", code)));
        }
    }

    fn is_current(&self, generation: u64) -> bool {
        self.process
            .as_ref()
            .is_some_and(|process| process.generation == generation)
    }

    fn set_state(&self, state: SupervisorState) {
        self.state.send_replace(state);
    }

    fn append_log(&self, text: &str) {
        self.log.send_modify(|log| log.append(text));
    }
}

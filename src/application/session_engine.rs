// Session engine - connection state machine, polling loop and command dispatch
use crate::application::device_client::DeviceClient;
use crate::application::telemetry_parser::{parse_status, ParsedStatus};
use crate::domain::command::{CommandFailure, CommandOutcome, CommandRequest, CommandResult};
use crate::domain::connection::{ConnectionStatus, ConnectionTarget};
use crate::domain::error::{DeviceError, ParseError, SessionError};
use crate::domain::event::{EventLogEntry, Severity};
use crate::domain::history::BoundedBuffer;
use crate::domain::telemetry::TelemetryRecord;
use crate::infrastructure::config::ConsoleConfig;
use crate::infrastructure::session_log::{
    default_file_path, export_snapshot, write_export, ExportMetadata, SessionLog,
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};

#[derive(Debug, Clone)]
pub struct EngineSettings {
    pub fetch_timeout: Duration,
    pub command_timeout: Duration,
    pub history_capacity: usize,
    pub event_capacity: usize,
    pub log_directory: PathBuf,
}

impl EngineSettings {
    pub fn from_config(config: &ConsoleConfig) -> Self {
        Self {
            fetch_timeout: config.poll.fetch_timeout(),
            command_timeout: config.poll.command_timeout(),
            history_capacity: config.poll.history_capacity,
            event_capacity: config.poll.event_capacity,
            log_directory: config.logging.directory.clone(),
        }
    }
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self::from_config(&ConsoleConfig::default())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LogInfo {
    pub path: PathBuf,
    pub samples_written: u64,
}

impl LogInfo {
    fn of(log: &SessionLog) -> Self {
        Self {
            path: log.path().to_path_buf(),
            samples_written: log.samples_written(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportSummary {
    pub path: PathBuf,
    pub sample_count: usize,
}

/// Read-only snapshot of the last committed session state.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionView {
    pub status: ConnectionStatus,
    pub target: Option<ConnectionTarget>,
    pub latest: Option<Arc<TelemetryRecord>>,
    pub history: Vec<Arc<TelemetryRecord>>,
    pub history_capacity: usize,
    pub events: Vec<Arc<EventLogEntry>>,
    pub is_logging: bool,
    pub log: Option<LogInfo>,
    pub sample_count: u64,
    pub consecutive_failures: u32,
    pub last_error: Option<String>,
    pub last_seen: Option<DateTime<Utc>>,
    pub last_command: Option<CommandResult>,
    pub commands_in_flight: u32,
}

#[derive(Debug)]
enum PollFailure {
    Device(DeviceError),
    Parse(ParseError),
}

impl std::fmt::Display for PollFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PollFailure::Device(err) => err.fmt(f),
            PollFailure::Parse(err) => err.fmt(f),
        }
    }
}

struct SessionState {
    status: ConnectionStatus,
    target: Option<ConnectionTarget>,
    history: BoundedBuffer<Arc<TelemetryRecord>>,
    events: BoundedBuffer<Arc<EventLogEntry>>,
    log: Option<SessionLog>,
    sample_count: u64,
    generation: u64,
    poller: Option<JoinHandle<()>>,
    consecutive_failures: u32,
    last_error: Option<String>,
    last_seen: Option<DateTime<Utc>>,
    last_command: Option<CommandResult>,
    commands_in_flight: u32,
}

impl SessionState {
    fn new(settings: &EngineSettings) -> Self {
        Self {
            status: ConnectionStatus::Disconnected,
            target: None,
            history: BoundedBuffer::new(settings.history_capacity),
            events: BoundedBuffer::new(settings.event_capacity),
            log: None,
            sample_count: 0,
            generation: 0,
            poller: None,
            consecutive_failures: 0,
            last_error: None,
            last_seen: None,
            last_command: None,
            commands_in_flight: 0,
        }
    }

    /// Start a new session: history and counters reset here and nowhere else.
    fn begin_session(&mut self, target: ConnectionTarget) {
        self.generation += 1;
        self.status = ConnectionStatus::Connecting;
        self.target = Some(target);
        self.history.clear();
        self.sample_count = 0;
        self.consecutive_failures = 0;
        self.last_error = None;
        self.last_seen = None;
    }

    fn is_current(&self, generation: u64, status: ConnectionStatus) -> bool {
        self.generation == generation && self.status == status
    }

    fn record(&mut self, entry: EventLogEntry) {
        match entry.severity {
            Severity::Info => tracing::info!("{}", entry.message),
            Severity::Warn => tracing::warn!("{}", entry.message),
            Severity::Error => tracing::error!("{}", entry.message),
        }
        self.events.push(Arc::new(entry));
    }

    fn device_label(&self) -> String {
        self.target
            .as_ref()
            .map(ToString::to_string)
            .unwrap_or_default()
    }

    fn view(&self) -> SessionView {
        SessionView {
            status: self.status,
            target: self.target.clone(),
            latest: self.history.latest().cloned(),
            history: self.history.to_vec(),
            history_capacity: self.history.capacity(),
            events: self.events.to_vec(),
            is_logging: self.log.is_some(),
            log: self.log.as_ref().map(LogInfo::of),
            sample_count: self.sample_count,
            consecutive_failures: self.consecutive_failures,
            last_error: self.last_error.clone(),
            last_seen: self.last_seen,
            last_command: self.last_command.clone(),
            commands_in_flight: self.commands_in_flight,
        }
    }
}

struct EngineInner {
    client: Arc<dyn DeviceClient>,
    settings: EngineSettings,
    state: Mutex<SessionState>,
    view_tx: watch::Sender<Arc<SessionView>>,
}

/// Owns the session state. Every mutation happens under one lock; network
/// calls happen outside it and commit afterwards, guarded by the session
/// generation so that results from a finished session are discarded.
#[derive(Clone)]
pub struct SessionEngine {
    inner: Arc<EngineInner>,
}

impl SessionEngine {
    pub fn new(client: Arc<dyn DeviceClient>, settings: EngineSettings) -> Self {
        let state = SessionState::new(&settings);
        let (view_tx, _) = watch::channel(Arc::new(state.view()));
        Self {
            inner: Arc::new(EngineInner {
                client,
                settings,
                state: Mutex::new(state),
                view_tx,
            }),
        }
    }

    /// Last committed state; never waits on the state lock.
    pub fn view(&self) -> Arc<SessionView> {
        self.inner.view_tx.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<Arc<SessionView>> {
        self.inner.view_tx.subscribe()
    }

    pub async fn connect(&self, target: ConnectionTarget) -> Result<(), SessionError> {
        let inner = &self.inner;
        let generation = {
            let mut state = inner.state.lock().await;
            if state.status != ConnectionStatus::Disconnected {
                return Err(SessionError::precondition(format!(
                    "connect requires a disconnected session, current status is {}",
                    state.status.label()
                )));
            }
            if let Err(err) = target.validate() {
                state.record(EventLogEntry::error(format!("Invalid connection target: {}", err)));
                inner.publish(&state);
                return Err(err.into());
            }

            state.begin_session(target.clone());
            state.record(EventLogEntry::info(format!("Connecting to {}", target)));
            inner.publish(&state);
            state.generation
        };

        // Runs detached so that dropping the caller cannot strand the
        // session in Connecting.
        tokio::spawn(inner.clone().finish_connect(generation, target))
            .await
            .unwrap_or_else(|e| {
                Err(SessionError::precondition(format!("connect task failed: {}", e)))
            })
    }

    /// Stop polling and logging. No tick of the finished session can mutate
    /// state once this returns.
    pub async fn disconnect(&self) -> Result<(), SessionError> {
        let inner = &self.inner;
        let poller = {
            let mut guard = inner.state.lock().await;
            let state = &mut *guard;
            if state.status == ConnectionStatus::Disconnected {
                return Err(SessionError::precondition("session is not connected"));
            }

            state.generation += 1;
            state.status = ConnectionStatus::Disconnected;
            let poller = state.poller.take();
            if let Some(handle) = &poller {
                handle.abort();
            }
            close_log(state).await;
            state.record(EventLogEntry::info(format!(
                "Polling stopped for {}",
                state.device_label()
            )));
            inner.publish(state);
            poller
        };

        if let Some(handle) = poller {
            // Cancelled or finished; either way nothing of it survives.
            let _ = handle.await;
        }
        Ok(())
    }

    pub async fn start_logging(&self, path: Option<PathBuf>) -> Result<LogInfo, SessionError> {
        let inner = &self.inner;
        let mut guard = inner.state.lock().await;
        let state = &mut *guard;
        if state.status != ConnectionStatus::Connected {
            return Err(SessionError::precondition("logging requires a connected session"));
        }
        if let Some(log) = &state.log {
            return Ok(LogInfo::of(log));
        }

        let path = path.unwrap_or_else(|| {
            default_file_path(
                &inner.settings.log_directory,
                state.target.as_ref(),
                Utc::now(),
                "jsonl",
            )
        });
        match SessionLog::open(&path).await {
            Ok(log) => {
                let info = LogInfo::of(&log);
                state.log = Some(log);
                state.record(EventLogEntry::info(format!(
                    "File logging enabled: {}",
                    path.display()
                )));
                inner.publish(state);
                Ok(info)
            }
            Err(err) => {
                state.record(EventLogEntry::error(format!("Could not start logging: {}", err)));
                inner.publish(state);
                Err(err.into())
            }
        }
    }

    /// Returns the closed log, or `None` if logging was already off.
    pub async fn stop_logging(&self) -> Result<Option<LogInfo>, SessionError> {
        let inner = &self.inner;
        let mut guard = inner.state.lock().await;
        let state = &mut *guard;
        if state.status != ConnectionStatus::Connected {
            return Err(SessionError::precondition("logging requires a connected session"));
        }

        let info = state.log.as_ref().map(LogInfo::of);
        if info.is_some() {
            close_log(state).await;
            inner.publish(state);
        }
        Ok(info)
    }

    /// Dispatch a command. Device-side failures come back inside the
    /// `CommandResult`; only precondition and validation problems are errors.
    pub async fn send_command(&self, request: CommandRequest) -> Result<CommandResult, SessionError> {
        let inner = &self.inner;
        let request = request.normalized();
        let target = {
            let mut state = inner.state.lock().await;
            if state.status != ConnectionStatus::Connected {
                return Err(SessionError::precondition("commands require a connected session"));
            }
            if let Err(err) = request.validate() {
                state.record(EventLogEntry::error(format!("Command not sent: {}", err)));
                inner.publish(&state);
                return Err(err.into());
            }
            let Some(target) = state.target.clone() else {
                return Err(SessionError::precondition("no connection target"));
            };
            state.commands_in_flight += 1;
            inner.publish(&state);
            target
        };

        // Detached: the outcome is recorded even if the caller goes away.
        tokio::spawn(inner.clone().dispatch_command(target, request))
            .await
            .map_err(|e| SessionError::precondition(format!("command task failed: {}", e)))
    }

    /// Write the current history as one JSON document. Allowed in any state.
    pub async fn export_session(&self, path: Option<PathBuf>) -> Result<ExportSummary, SessionError> {
        let inner = &self.inner;
        let (history, target, samples_collected) = {
            let mut state = inner.state.lock().await;
            if state.history.is_empty() {
                state.record(EventLogEntry::warn("Export skipped: no samples recorded yet"));
                inner.publish(&state);
                return Err(SessionError::EmptyHistory);
            }
            (state.history.to_vec(), state.target.clone(), state.sample_count)
        };

        let metadata = ExportMetadata {
            exported_at: Utc::now(),
            target,
            samples_collected,
        };
        let path = path.unwrap_or_else(|| {
            default_file_path(
                &inner.settings.log_directory,
                metadata.target.as_ref(),
                metadata.exported_at,
                "json",
            )
        });
        let document = export_snapshot(&history, &metadata);
        let written = write_export(&path, &document).await;

        let mut state = inner.state.lock().await;
        match written {
            Ok(()) => {
                state.record(EventLogEntry::info(format!(
                    "Exported JSON: {} ({} samples)",
                    path.display(),
                    history.len()
                )));
                inner.publish(&state);
                Ok(ExportSummary {
                    path,
                    sample_count: history.len(),
                })
            }
            Err(err) => {
                state.record(EventLogEntry::error(format!("Export failed: {}", err)));
                inner.publish(&state);
                Err(err.into())
            }
        }
    }

    /// Disconnect if a session is active; used on process exit.
    pub async fn shutdown(&self) {
        if self.view().status == ConnectionStatus::Disconnected {
            return;
        }
        if let Err(err) = self.disconnect().await {
            tracing::debug!("Shutdown found no active session: {}", err);
        }
    }
}

impl EngineInner {
    fn publish(&self, state: &SessionState) {
        self.view_tx.send_replace(Arc::new(state.view()));
    }

    fn fetch_timeout(&self, target: &ConnectionTarget) -> Duration {
        self.settings.fetch_timeout.min(target.refresh_interval())
    }

    /// Fetch and decode one status payload. Runs without the state lock.
    async fn poll_device(&self, target: &ConnectionTarget) -> Result<ParsedStatus, PollFailure> {
        let polled_at = Utc::now();
        let reply = self
            .client
            .fetch_status(target, self.fetch_timeout(target))
            .await
            .map_err(PollFailure::Device)?;
        parse_status(reply.body, reply.latency_ms, polled_at).map_err(PollFailure::Parse)
    }

    async fn commit_poll(&self, state: &mut SessionState, outcome: Result<ParsedStatus, PollFailure>) {
        let parsed = match outcome {
            Ok(parsed) => parsed,
            Err(failure) => {
                state.consecutive_failures += 1;
                let message = failure.to_string();
                state.record(EventLogEntry::warn(format!(
                    "Poll error ({}): {}",
                    state.consecutive_failures, message
                )));
                state.last_error = Some(message);
                return;
            }
        };

        let mut record = parsed.record;
        if let Some(previous) = state.history.latest() {
            if record.timestamp_utc <= previous.timestamp_utc {
                record.timestamp_utc = previous.timestamp_utc + chrono::Duration::microseconds(1);
            }
        }
        if !parsed.warnings.is_empty() {
            state.record(EventLogEntry::warn(format!(
                "Parse warning: {}",
                parsed.warnings.join("; ")
            )));
        }

        state.sample_count += 1;
        state.consecutive_failures = 0;
        state.last_error = None;
        state.last_seen = Some(record.timestamp_utc);
        tracing::debug!(
            "Sample {}: mode={} temp={} voltage={} current={} faults={} latency={:.2}ms",
            state.sample_count,
            record.mode,
            record.temperature,
            record.voltage,
            record.current,
            record.fault_count(),
            record.latency_ms
        );

        let device = state.device_label();
        let append_failed = match state.log.as_mut() {
            Some(log) => log.append(&record, state.sample_count, &device).await.err(),
            None => None,
        };
        if let Some(err) = append_failed {
            state.log = None;
            state.record(EventLogEntry::error(format!(
                "Log write error, file logging stopped: {}",
                err
            )));
        }

        state.history.push(Arc::new(record));
    }

    /// Immediate poll, then Connected and the periodic loop.
    async fn finish_connect(
        self: Arc<Self>,
        generation: u64,
        target: ConnectionTarget,
    ) -> Result<(), SessionError> {
        let outcome = self.poll_device(&target).await;

        let mut guard = self.state.lock().await;
        let state = &mut *guard;
        if !state.is_current(generation, ConnectionStatus::Connecting) {
            return Err(SessionError::precondition(
                "connection attempt was cancelled by disconnect",
            ));
        }
        self.commit_poll(state, outcome).await;
        state.status = ConnectionStatus::Connected;
        state.record(EventLogEntry::info(format!(
            "Connected to {}, polling every {}s",
            target, target.refresh_interval_seconds
        )));
        state.poller = Some(tokio::spawn(run_poller(
            Arc::downgrade(&self),
            generation,
            target,
        )));
        self.publish(state);
        Ok(())
    }

    /// Send a command and record its outcome.
    async fn dispatch_command(
        self: Arc<Self>,
        target: ConnectionTarget,
        request: CommandRequest,
    ) -> CommandResult {
        let result = match self
            .client
            .send_command(&target, &request, self.settings.command_timeout)
            .await
        {
            Ok(reply) => CommandResult::succeeded(request, reply.payload, reply.latency_ms),
            Err(err) => CommandResult::failed(request, err.into()),
        };

        let mut state = self.state.lock().await;
        state.commands_in_flight = state.commands_in_flight.saturating_sub(1);
        let entry = match (&result.outcome, result.latency_ms) {
            (CommandOutcome::Success { .. }, latency) => {
                EventLogEntry::info(format!(
                    "Command '{}' OK ({:.2} ms)",
                    result.request.name,
                    latency.unwrap_or_default()
                ))
            }
            (CommandOutcome::Failure { reason }, _) => {
                let severity = match reason {
                    CommandFailure::Rejected(_) => Severity::Warn,
                    _ => Severity::Error,
                };
                EventLogEntry::new(
                    severity,
                    format!("Command '{}' failed: {}", result.request.name, reason),
                )
            }
        };
        state.record(entry);
        state.last_command = Some(result.clone());
        self.publish(&state);
        result
    }

    /// One periodic tick. Returns false once the session it belongs to is over.
    async fn tick(&self, generation: u64, target: &ConnectionTarget) -> bool {
        if !self
            .state
            .lock()
            .await
            .is_current(generation, ConnectionStatus::Connected)
        {
            return false;
        }

        let outcome = self.poll_device(target).await;

        let mut guard = self.state.lock().await;
        let state = &mut *guard;
        if !state.is_current(generation, ConnectionStatus::Connected) {
            tracing::debug!("Discarding poll result from a finished session");
            return false;
        }
        self.commit_poll(state, outcome).await;
        self.publish(state);
        true
    }
}

async fn run_poller(inner: Weak<EngineInner>, generation: u64, target: ConnectionTarget) {
    let period = target.refresh_interval();
    let mut ticker = time::interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        ticker.tick().await;
        let Some(inner) = inner.upgrade() else {
            break;
        };
        if !inner.tick(generation, &target).await {
            break;
        }
    }
}

async fn close_log(state: &mut SessionState) {
    let Some(log) = state.log.take() else {
        return;
    };
    let path = log.path().display().to_string();
    match log.close().await {
        Ok(samples) => state.record(EventLogEntry::info(format!(
            "File logging disabled: {} ({} samples)",
            path, samples
        ))),
        Err(err) => state.record(EventLogEntry::error(format!(
            "File logging stopped with error: {}",
            err
        ))),
    }
}

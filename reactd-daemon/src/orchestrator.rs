//! Daemon orchestration -- source wiring, event loop and lifecycle.
//!
//! The [`Orchestrator`] owns the reaction engine and runs the single event
//! loop that feeds it. Source tasks (file tailers, journal readers) send
//! [`SourceEvent`]s over one channel; the loop evaluates each line, sleeps
//! until the next engine deadline and runs expired resets and windows.
//!
//! # Event loop
//!
//! ```text
//! file tailers ──┐
//!                ├── mpsc<SourceEvent> ──> on_line ──> ProcessExecutor
//! journal readers┘            │
//!                   sleep(Driver::poll_timeout) ──> Driver::tick ──> rescan missing files
//! ```
//!
//! # Shutdown
//!
//! SIGTERM/SIGINT cancel the shared [`CancellationToken`]. Source tasks stop,
//! pending resets are discarded without running, and the PID file is removed.

use std::io::ErrorKind;
use std::path::Path;
use std::time::{Duration, Instant};

use anyhow::Result;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use reactd_core::config::ReactdConfig;
use reactd_core::runtime::{Clock, SystemClock};
use reactd_core::types::SourceLine;
use reactd_engine::{Driver, ReactionEngine};

use crate::executor::ProcessExecutor;
use crate::journal::{JournalReader, spawn_journal};
use crate::metrics_server;
use crate::pid::{remove_pid_file, write_pid_file};
use crate::source::{MissingSources, SOURCE_CHANNEL_CAPACITY, SourceEvent};
use crate::tail::{FileTail, spawn_file_tail};

/// Interval between uptime gauge updates.
const UPTIME_UPDATE_INTERVAL: Duration = Duration::from_secs(10);

/// The main daemon orchestrator.
pub struct Orchestrator {
    /// Loaded and validated configuration.
    config: ReactdConfig,
    engine: ReactionEngine<ProcessExecutor>,
    driver: Driver,
    clock: SystemClock,
    /// Cancelled on shutdown; shared by every background task.
    cancel: CancellationToken,
    start_time: Instant,
}

impl Orchestrator {
    /// Load `reactd.toml`, apply environment overrides and build.
    ///
    /// # Errors
    ///
    /// - the configuration cannot be read, parsed or validated
    /// - a rule fails to compile
    /// - the metrics endpoint cannot be installed
    pub async fn build(config_path: &Path) -> Result<Self> {
        let config = ReactdConfig::load(config_path)
            .await
            .map_err(|e| anyhow::anyhow!("failed to load config: {}", e))?;
        Self::build_from_config(config)
    }

    /// Build from an already-loaded configuration.
    ///
    /// Must be called inside a tokio runtime.
    pub fn build_from_config(config: ReactdConfig) -> Result<Self> {
        let engine = compile_rules(&config)?;

        if config.metrics.enabled {
            metrics_server::install_metrics_recorder(&config)?;
            record_daemon_metrics();
        }

        let driver = Driver::new(Duration::from_millis(config.general.rescan_interval_ms));

        info!(
            files = config.files.len(),
            journals = config.journals.len(),
            rules = engine.rule_count(),
            "orchestrator initialized"
        );

        Ok(Self {
            config,
            engine,
            driver,
            clock: SystemClock,
            cancel: CancellationToken::new(),
            start_time: Instant::now(),
        })
    }

    /// Write the PID file, install signal handlers and run until shutdown.
    ///
    /// # Shutdown Triggers
    ///
    /// - `SIGTERM` (from systemd or `kill`)
    /// - `SIGINT` (Ctrl+C)
    /// - [`Orchestrator::cancel_token`] being cancelled
    pub async fn run(&mut self) -> Result<()> {
        let pid_file = self.config.general.pid_file.clone();
        if !pid_file.is_empty() {
            write_pid_file(Path::new(&pid_file))?;
        }

        let signal_task = match spawn_signal_watcher(self.cancel.clone()) {
            Ok(task) => task,
            Err(e) => {
                if !pid_file.is_empty() {
                    remove_pid_file(Path::new(&pid_file));
                }
                return Err(e);
            }
        };

        let uptime_task = self
            .config
            .metrics
            .enabled
            .then(|| spawn_uptime_updater(self.start_time, self.cancel.clone()));

        let result = self.serve().await;

        signal_task.abort();
        if let Some(task) = uptime_task {
            let _ = task.await;
        }
        if !pid_file.is_empty() {
            remove_pid_file(Path::new(&pid_file));
        }

        result
    }

    /// Start every source and run the event loop until the token is cancelled.
    ///
    /// Does not touch the PID file or signal handlers.
    pub async fn serve(&mut self) -> Result<()> {
        let (tx, mut rx) = mpsc::channel::<SourceEvent>(SOURCE_CHANNEL_CAPACITY);
        let poll_interval = Duration::from_millis(self.config.general.poll_interval_ms);
        let cancel = self.cancel.clone();
        let mut tasks: Vec<JoinHandle<()>> = Vec::new();
        let mut missing = MissingSources::new();

        for file in &self.config.files {
            match FileTail::open(&file.path, false).await {
                Ok(tail) => {
                    tasks.push(spawn_file_tail(tail, tx.clone(), poll_interval, cancel.clone()));
                }
                Err(e) if e.kind() == ErrorKind::NotFound => {
                    warn!(path = %file.path, "file does not exist yet, will retry");
                    missing.insert(file.path.clone());
                }
                Err(e) => {
                    cancel.cancel();
                    return Err(anyhow::anyhow!("failed to open {}: {}", file.path, e));
                }
            }
        }

        for journal in &self.config.journals {
            let reader = JournalReader::from_config(journal);
            tasks.push(spawn_journal(reader, tx.clone(), cancel.clone()));
        }

        info!(
            sources = tasks.len(),
            missing = missing.len(),
            "entering main event loop"
        );

        loop {
            let timeout =
                self.driver
                    .poll_timeout(self.clock.now_millis(), &self.engine, !missing.is_empty());

            tokio::select! {
                _ = cancel.cancelled() => {
                    info!("shutdown requested, leaving event loop");
                    break;
                }
                event = rx.recv() => match event {
                    Some(SourceEvent::Line(line)) => self.handle_line(&line),
                    Some(SourceEvent::Missing(path)) => {
                        missing.insert(path);
                    }
                    None => break,
                },
                _ = sleep_until_deadline(timeout) => {}
            }

            let report =
                self.driver
                    .tick(self.clock.now_millis(), &mut self.engine, !missing.is_empty());
            if report.resets_run > 0 || report.hits_expired > 0 {
                debug!(
                    resets_run = report.resets_run,
                    hits_expired = report.hits_expired,
                    "expired entries processed"
                );
            }
            if report.rescan_due {
                tasks.retain(|task| !task.is_finished());
                rescan_missing(&mut missing, &tx, poll_interval, &cancel, &mut tasks).await;
            }
        }

        self.engine.shutdown();
        cancel.cancel();
        drop(tx);
        for task in tasks {
            let _ = task.await;
        }

        info!("event loop stopped");
        Ok(())
    }

    fn handle_line(&mut self, line: &SourceLine) {
        let now = self.clock.now();
        if let Err(e) = self.engine.on_line(&line.source, &line.line, now) {
            warn!(source = %line.source, error = %e, "line dropped");
        }
    }

    /// Token that stops [`Orchestrator::run`] / [`Orchestrator::serve`].
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn engine(&self) -> &ReactionEngine<ProcessExecutor> {
        &self.engine
    }

    pub fn config(&self) -> &ReactdConfig {
        &self.config
    }
}

/// Validate `config` and compile every rule without starting anything.
///
/// Returns the number of compiled rules. Used by `reactd --validate`.
pub fn check_config(config: &ReactdConfig) -> Result<usize> {
    Ok(compile_rules(config)?.rule_count())
}

fn compile_rules(config: &ReactdConfig) -> Result<ReactionEngine<ProcessExecutor>> {
    config
        .validate()
        .map_err(|e| anyhow::anyhow!("config validation failed: {}", e))?;
    ReactionEngine::from_config(config, ProcessExecutor::new())
        .map_err(|e| anyhow::anyhow!("failed to compile rules: {}", e))
}

async fn sleep_until_deadline(timeout: Option<Duration>) {
    match timeout {
        Some(duration) => tokio::time::sleep(duration).await,
        None => std::future::pending().await,
    }
}

/// Try to open every missing file from its start.
async fn rescan_missing(
    missing: &mut MissingSources,
    tx: &mpsc::Sender<SourceEvent>,
    poll_interval: Duration,
    cancel: &CancellationToken,
    tasks: &mut Vec<JoinHandle<()>>,
) {
    for path in missing.paths() {
        match FileTail::open(&path, true).await {
            Ok(tail) => {
                info!(path = %path, "file appeared, reading from start");
                missing.remove(&path);
                tasks.push(spawn_file_tail(tail, tx.clone(), poll_interval, cancel.clone()));
            }
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => {
                warn!(path = %path, error = %e, "failed to open file");
            }
        }
    }
}

/// Install SIGTERM/SIGINT handlers and cancel `cancel` on the first one.
///
/// # Errors
///
/// Returns an error if signal handlers cannot be installed.
fn spawn_signal_watcher(cancel: CancellationToken) -> Result<JoinHandle<()>> {
    use tokio::signal::unix::{SignalKind, signal};

    let mut sigterm = signal(SignalKind::terminate())
        .map_err(|e| anyhow::anyhow!("failed to install SIGTERM handler: {}", e))?;
    let mut sigint = signal(SignalKind::interrupt())
        .map_err(|e| anyhow::anyhow!("failed to install SIGINT handler: {}", e))?;

    Ok(tokio::spawn(async move {
        let signal = tokio::select! {
            _ = sigterm.recv() => "SIGTERM",
            _ = sigint.recv() => "SIGINT",
            _ = cancel.cancelled() => return,
        };
        info!(signal = signal, "shutdown signal received");
        cancel.cancel();
    }))
}

/// Record daemon-level metrics once at startup.
fn record_daemon_metrics() {
    use reactd_core::metrics as m;

    metrics::gauge!(m::DAEMON_BUILD_INFO, "version" => env!("CARGO_PKG_VERSION")).set(1.0);
    debug!(version = env!("CARGO_PKG_VERSION"), "daemon metrics recorded");
}

/// Spawn a background task that periodically updates the uptime gauge.
fn spawn_uptime_updater(start_time: Instant, cancel: CancellationToken) -> JoinHandle<()> {
    use reactd_core::metrics as m;

    tokio::spawn(async move {
        let mut interval = tokio::time::interval(UPTIME_UPDATE_INTERVAL);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    #[allow(clippy::cast_precision_loss)]
                    metrics::gauge!(m::DAEMON_UPTIME_SECONDS)
                        .set(start_time.elapsed().as_secs() as f64);
                }
                _ = cancel.cancelled() => {
                    debug!("uptime updater shutting down");
                    break;
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn sleep_with_deadline_completes() {
        tokio::time::timeout(
            Duration::from_secs(1),
            sleep_until_deadline(Some(Duration::from_millis(5))),
        )
        .await
        .expect("sleep should finish");
    }

    #[tokio::test]
    async fn sleep_without_deadline_blocks() {
        let result = tokio::time::timeout(
            Duration::from_millis(20),
            sleep_until_deadline(None),
        )
        .await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn uptime_updater_stops_on_cancel() {
        let cancel = CancellationToken::new();
        let task = spawn_uptime_updater(Instant::now(), cancel.clone());
        cancel.cancel();
        tokio::time::timeout(Duration::from_secs(1), task)
            .await
            .expect("uptime updater should stop")
            .unwrap();
    }

    #[tokio::test]
    async fn signal_watcher_exits_when_cancelled_elsewhere() {
        let cancel = CancellationToken::new();
        let task = spawn_signal_watcher(cancel.clone()).unwrap();
        cancel.cancel();
        tokio::time::timeout(Duration::from_secs(1), task)
            .await
            .expect("signal watcher should stop")
            .unwrap();
    }

    #[tokio::test]
    async fn check_config_counts_rules() {
        let config = ReactdConfig::parse(
            r#"
[[file]]
path = "/var/log/auth.log"

[[file.rule]]
pattern = 'Failed password for .* from (\S+)'
action = ["/bin/true", '\1']

[[file.rule]]
pattern = 'Invalid user'
action = ["/bin/true"]
"#,
        )
        .unwrap();
        assert_eq!(check_config(&config).unwrap(), 2);
    }

    #[tokio::test]
    async fn check_config_reports_bad_pattern() {
        let config = ReactdConfig::parse(
            r#"
[[file]]
path = "/var/log/auth.log"

[[file.rule]]
name = "broken"
pattern = '(unclosed'
action = ["/bin/true"]
"#,
        )
        .unwrap();
        let err = check_config(&config).unwrap_err().to_string();
        assert!(err.contains("failed to compile rules"), "got: {err}");
    }
}

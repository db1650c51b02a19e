//! systemd journal following.
//!
//! Each `[[journal]]` section runs
//! `journalctl --follow --lines=0 --output=json FIELD=value...` and feeds the
//! `MESSAGE` field of every record to the engine under the journal's name.

use std::collections::BTreeMap;
use std::process::Stdio;

use serde_json::Value;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use reactd_core::config::JournalSourceConfig;
use reactd_core::metrics as m;
use reactd_core::types::SourceLine;

use crate::source::SourceEvent;

/// Program used to follow the journal.
pub const JOURNALCTL: &str = "journalctl";

/// One followed journal stream.
#[derive(Debug, Clone)]
pub struct JournalReader {
    name: String,
    matches: BTreeMap<String, String>,
    program: String,
    program_args: Vec<String>,
}

impl JournalReader {
    pub fn new(name: impl Into<String>, matches: BTreeMap<String, String>) -> Self {
        Self {
            name: name.into(),
            matches,
            program: JOURNALCTL.to_owned(),
            program_args: Vec::new(),
        }
    }

    pub fn from_config(config: &JournalSourceConfig) -> Self {
        Self::new(config.name.clone(), config.matches.clone())
    }

    /// Run `program program_args... <journalctl args>` instead of `journalctl`.
    pub fn with_command(mut self, program: impl Into<String>, program_args: &[&str]) -> Self {
        self.program = program.into();
        self.program_args = program_args.iter().map(|a| (*a).to_owned()).collect();
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Arguments passed to `journalctl`.
    pub fn args(&self) -> Vec<String> {
        let mut args = vec![
            "--follow".to_owned(),
            "--lines=0".to_owned(),
            "--output=json".to_owned(),
        ];
        args.extend(self.matches.iter().map(|(k, v)| format!("{k}={v}")));
        args
    }
}

/// Extract `MESSAGE` from one `journalctl --output=json` record.
///
/// journald encodes non-UTF-8 messages as an array of byte values; those are
/// decoded lossily. Records without a usable message yield `None`.
pub fn parse_message(record: &str) -> Option<String> {
    let value: Value = serde_json::from_str(record).ok()?;
    match value.get("MESSAGE")? {
        Value::String(s) => Some(s.clone()),
        Value::Array(items) => {
            let bytes: Option<Vec<u8>> = items
                .iter()
                .map(|v| v.as_u64().and_then(|n| u8::try_from(n).ok()))
                .collect();
            bytes.map(|b| String::from_utf8_lossy(&b).into_owned())
        }
        _ => None,
    }
}

/// Spawn `journalctl` for `reader` and forward its messages.
///
/// The child is killed when `cancel` fires. If `journalctl` cannot be started
/// or exits, the failure is logged and the task ends.
pub fn spawn_journal(
    reader: JournalReader,
    tx: mpsc::Sender<SourceEvent>,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut child = match Command::new(&reader.program)
            .args(&reader.program_args)
            .args(reader.args())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
        {
            Ok(child) => child,
            Err(e) => {
                warn!(
                    journal = %reader.name,
                    program = %reader.program,
                    error = %e,
                    "failed to start journal reader"
                );
                return;
            }
        };

        let Some(stdout) = child.stdout.take() else {
            warn!(journal = %reader.name, "journal reader has no stdout");
            return;
        };
        info!(journal = %reader.name, args = ?reader.args(), "following journal");

        let mut records = BufReader::new(stdout).lines();
        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    debug!(journal = %reader.name, "journal reader shutting down");
                    break;
                }
                record = records.next_line() => {
                    match record {
                        Ok(Some(record)) => {
                            let Some(message) = parse_message(&record) else {
                                debug!(journal = %reader.name, "journal record without MESSAGE");
                                continue;
                            };
                            metrics::counter!(
                                m::SOURCE_LINES_READ_TOTAL,
                                m::LABEL_SOURCE => reader.name.clone()
                            )
                            .increment(1);
                            let event = SourceEvent::Line(SourceLine::new(reader.name.as_str(), message));
                            if tx.send(event).await.is_err() {
                                break;
                            }
                        }
                        Ok(None) => {
                            warn!(journal = %reader.name, "journal reader exited");
                            break;
                        }
                        Err(e) => {
                            warn!(journal = %reader.name, error = %e, "failed to read journal output");
                            break;
                        }
                    }
                }
            }
        }

        if let Err(e) = child.kill().await {
            debug!(journal = %reader.name, error = %e, "journal reader already exited");
        }
    })
}

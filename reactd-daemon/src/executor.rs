//! External command execution.
//!
//! [`ProcessExecutor`] spawns the rendered argv as a child process and returns
//! immediately. The child is reaped by a background task that only logs its
//! exit status; the engine never waits for a command to finish.

use std::process::Stdio;

use tokio::process::Command;
use tokio::runtime::Handle;
use tracing::{debug, info, warn};

use reactd_core::runtime::ActionExecutor;
use reactd_core::types::ActionRequest;

/// Spawns actions and resets as detached child processes.
///
/// The request environment is added to the inherited one. stdin is
/// `/dev/null`; stdout and stderr are inherited.
#[derive(Debug, Clone)]
pub struct ProcessExecutor {
    runtime: Handle,
}

impl ProcessExecutor {
    /// Create an executor bound to the current tokio runtime.
    ///
    /// # Panics
    ///
    /// Panics when called outside a tokio runtime.
    pub fn new() -> Self {
        Self::with_handle(Handle::current())
    }

    pub fn with_handle(runtime: Handle) -> Self {
        Self { runtime }
    }
}

impl Default for ProcessExecutor {
    fn default() -> Self {
        Self::new()
    }
}

impl ActionExecutor for ProcessExecutor {
    fn name(&self) -> &str {
        "process"
    }

    fn execute(&self, request: &ActionRequest) -> bool {
        let Some((program, args)) = request.argv.split_first() else {
            warn!("refusing to run an empty command");
            return false;
        };

        let _guard = self.runtime.enter();
        let spawned = Command::new(program)
            .args(args)
            .envs(request.env.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .stdin(Stdio::null())
            .spawn();

        let mut child = match spawned {
            Ok(child) => child,
            Err(e) => {
                warn!(program = %program, error = %e, "could not run command");
                return false;
            }
        };

        let pid = child.id();
        info!(pid = ?pid, command = %request, "command started");

        let program = program.clone();
        self.runtime.spawn(async move {
            match child.wait().await {
                Ok(status) if status.success() => {
                    debug!(pid = ?pid, program = %program, "command finished");
                }
                Ok(status) => {
                    warn!(pid = ?pid, program = %program, status = %status, "command failed");
                }
                Err(e) => {
                    warn!(pid = ?pid, program = %program, error = %e, "failed to wait for command");
                }
            }
        });

        true
    }
}

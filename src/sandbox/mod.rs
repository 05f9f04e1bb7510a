mod executor;
mod language;
mod process;
mod workspace;

use std::fmt;

use async_trait::async_trait;

use crate::models::{ExecutionRequest, ExecutionResult};

pub use executor::ProcessExecutor;
pub use language::AdapterRegistry;
pub use process::ProcessSandbox;
pub use workspace::with_workspace;

/// Program and arguments an adapter wants run inside its workspace.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub program: String,
    pub args: Vec<String>,
}

impl Invocation {
    pub fn new(program: impl Into<String>, args: &[&str]) -> Self {
        Self {
            program: program.into(),
            args: args.iter().map(|a| a.to_string()).collect(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KillReason {
    Timeout,
    OutputOverflow,
}

impl fmt::Display for KillReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KillReason::Timeout => f.write_str("timeout"),
            KillReason::OutputOverflow => f.write_str("output_overflow"),
        }
    }
}

/// How the sandboxed program ended. Richer than what goes on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionOutcome {
    Exited { code: i32 },
    Signalled,
    SpawnFailure,
    Killed(KillReason),
}

impl ExecutionOutcome {
    pub fn label(&self) -> &'static str {
        match self {
            ExecutionOutcome::Exited { code: 0 } => "success",
            ExecutionOutcome::Exited { .. } | ExecutionOutcome::Signalled => "non_zero_exit",
            ExecutionOutcome::SpawnFailure => "spawn_failure",
            ExecutionOutcome::Killed(KillReason::Timeout) => "timeout",
            ExecutionOutcome::Killed(KillReason::OutputOverflow) => "output_overflow",
        }
    }
}

#[derive(Debug, Clone)]
pub struct ExecutionReport {
    pub result: ExecutionResult,
    pub outcome: ExecutionOutcome,
}

/// Anything that can take a validated request to an execution result.
///
/// `Err` is reserved for faults of the service itself (workspace I/O, a
/// failed wait); everything the user's program does is an `Ok` report.
#[async_trait]
pub trait SandboxBackend: Send + Sync {
    fn name(&self) -> &'static str;
    async fn execute(&self, request: &ExecutionRequest) -> anyhow::Result<ExecutionReport>;
}

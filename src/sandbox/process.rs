use std::path::PathBuf;

use async_trait::async_trait;

use crate::{
    config::ServiceConfig,
    models::ExecutionRequest,
    sandbox::{AdapterRegistry, ExecutionReport, ProcessExecutor, SandboxBackend, with_workspace},
};

/// Runs snippets as local child processes, one workspace per execution.
///
/// Isolation is limited to a scrubbed environment, a private working
/// directory and the time/output bounds. There is no filesystem, network or
/// syscall confinement; deploy inside a container or VM if that is needed.
pub struct ProcessSandbox {
    adapters: AdapterRegistry,
    executor: ProcessExecutor,
    workspace_root: PathBuf,
}

impl ProcessSandbox {
    pub fn new(
        adapters: AdapterRegistry,
        executor: ProcessExecutor,
        workspace_root: PathBuf,
    ) -> Self {
        Self {
            adapters,
            executor,
            workspace_root,
        }
    }

    pub fn from_config(config: &ServiceConfig) -> Self {
        Self::new(
            AdapterRegistry::from_config(&config.runtimes),
            ProcessExecutor::new(config.limits.clone(), config.runtimes.env_passthrough.clone()),
            config.workspace_root.clone(),
        )
    }
}

#[async_trait]
impl SandboxBackend for ProcessSandbox {
    fn name(&self) -> &'static str {
        "process"
    }

    async fn execute(&self, request: &ExecutionRequest) -> anyhow::Result<ExecutionReport> {
        let adapter = self.adapters.adapter(request.language);
        with_workspace(&self.workspace_root, |dir| async move {
            let invocation = adapter.materialize(&dir, &request.code).await?;
            tracing::debug!(
                language = %adapter.language(),
                program = %invocation.program,
                workspace = %dir.display(),
                "launching snippet"
            );
            self.executor.run(&invocation, &dir, &request.input).await
        })
        .await
    }
}

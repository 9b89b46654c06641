//! Wiring of controllers, agents and the garbage collector onto one store.

use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use operator_api::{LabelSelector, NodeFilter, ObjectKind, Operation, Phase};
use operator_commands::CommandDispatcher;
use operator_store::{Error as StoreError, GarbageCollector, WatchPattern};
use tokio::task::JoinHandle;
use tokio::time::{timeout, Instant};
use tracing::{info, warn};

use crate::controller::{
    Controller, ControllerContext, OperationController, RuntimeTaskController, TaskGroupController,
};
use crate::error::{Error, Result};
use crate::node_selector::select_nodes;
use crate::planner;
use crate::r#loop::{ControllerLoop, LoopConfig, LoopStopper};
use crate::runtime_task::RuntimeTaskMachine;

/// Maximum time to wait for loops to return after a stop.
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

/// Settings for a [`Manager`].
#[derive(Debug, Clone)]
pub struct ManagerConfig {
    pub loops: LoopConfig,
    /// Delay standing in for each command under dry run.
    pub dry_run_delay: Duration,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            loops: LoopConfig::default(),
            dry_run_delay: Duration::from_secs(3),
        }
    }
}

/// Owns every background loop of an operator process.
pub struct Manager {
    ctx: ControllerContext,
    dispatcher: Arc<dyn CommandDispatcher>,
    config: ManagerConfig,
    stopper: LoopStopper,
    handles: Vec<JoinHandle<Result<()>>>,
}

impl Manager {
    pub fn new(
        ctx: ControllerContext,
        dispatcher: Arc<dyn CommandDispatcher>,
        config: ManagerConfig,
    ) -> Self {
        Self {
            ctx,
            dispatcher,
            config,
            stopper: LoopStopper::new(),
            handles: Vec::new(),
        }
    }

    pub const fn context(&self) -> &ControllerContext {
        &self.ctx
    }

    fn spawn_loop(&mut self, controller: Arc<dyn Controller>) {
        let control_loop =
            ControllerLoop::new(controller, self.ctx.store.bus().clone(), self.config.loops.clone())
                .with_stopper(self.stopper.clone());
        self.handles.push(tokio::spawn(control_loop.run()));
    }

    /// Start the operation and task group controllers plus the garbage
    /// collector.
    pub fn start_controllers(&mut self) {
        self.spawn_loop(Arc::new(OperationController::new(self.ctx.clone())));
        self.spawn_loop(Arc::new(TaskGroupController::new(self.ctx.clone())));

        let gc = GarbageCollector::new(self.ctx.store.clone());
        let shutdown = self.stopper.signal();
        self.handles.push(tokio::spawn(async move {
            gc.run(shutdown).await.map_err(Error::from)
        }));
    }

    /// Start the agent running `operation`'s tasks on `node`.
    pub fn start_agent(&mut self, node: &str, operation: &str) {
        info!(node, operation, "Starting agent");
        let machine = RuntimeTaskMachine::new(
            self.dispatcher.clone(),
            self.ctx.clock.clone(),
            self.ctx.recorder.clone(),
        )
        .with_dry_run_delay(self.config.dry_run_delay);
        self.spawn_loop(Arc::new(RuntimeTaskController::new(
            self.ctx.clone(),
            machine,
            node,
            operation,
        )));
    }

    /// Start one agent per node carrying the agent labels of `operation`.
    ///
    /// Returns the node names.
    pub async fn start_agents_for(&mut self, operation: &Operation) -> Result<Vec<String>> {
        let labels = planner::labels_for_agent(operation)?;
        let nodes = self
            .ctx
            .store
            .nodes()
            .list(&LabelSelector::default())
            .await?;
        let selected: Vec<String> = select_nodes(
            &nodes,
            &LabelSelector::from_labels(labels),
            NodeFilter::All,
        )
        .into_iter()
        .map(|n| n.metadata.name)
        .collect();
        for node in &selected {
            self.start_agent(node, &operation.metadata.name);
        }
        Ok(selected)
    }

    /// Wait until the named operation succeeds, fails or is deleted, or
    /// `limit` elapses. Returns the last state seen.
    pub async fn wait_for_operation(&self, name: &str, limit: Duration) -> Result<Operation> {
        let deadline = Instant::now().checked_add(limit).unwrap_or_else(Instant::now);
        let mut changes = self.ctx.store.bus().subscribe(WatchPattern::ByKind(ObjectKind::Operation));
        loop {
            let operation = self.ctx.store.operations().get(name).await?;
            if operation.status.phase == Phase::Failed || operation.status.phase.is_terminal() {
                return Ok(operation);
            }
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                warn!(operation = name, phase = %operation.status.phase, "Timed out waiting for operation");
                return Ok(operation);
            }
            match timeout(remaining, changes.recv()).await {
                Ok(Ok(_) | Err(StoreError::Lagged { .. })) | Err(_) => {}
                Ok(Err(e)) => return Err(e.into()),
            }
        }
    }

    /// Stop every loop and wait for them to return.
    pub async fn shutdown(self) {
        info!(loops = self.handles.len(), "Stopping operator loops");
        self.stopper.stop();
        if timeout(SHUTDOWN_TIMEOUT, join_all(self.handles)).await.is_err() {
            warn!("Loops did not stop in time");
        }
    }
}

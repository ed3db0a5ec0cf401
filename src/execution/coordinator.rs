//! Concurrency groups - serialize or cancel overlapping runs

use crate::core::{TriggerEvent, Workflow, WorkflowRun};
use crate::execution::RunEngine;
use crate::shell::CommandRunner;
use anyhow::{Context, Result};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// The live run currently holding a group's slot
struct GroupSlot {
    run_id: Uuid,
    cancel: watch::Sender<bool>,
    done: watch::Receiver<bool>,
}

impl GroupSlot {
    fn is_active(&self) -> bool {
        !*self.done.borrow()
    }
}

/// Handle to a submitted run
pub struct RunHandle {
    pub run_id: Uuid,
    pub group: Option<String>,
    task: JoinHandle<Result<WorkflowRun>>,
}

impl RunHandle {
    /// Wait for the run to finish and take its final state
    pub async fn wait(self) -> Result<WorkflowRun> {
        self.task.await.context("run task panicked")?
    }
}

/// Owns the concurrency-group registry and submits runs to the engine.
///
/// A run whose workflow declares a `concurrency` group takes that group's
/// slot. If the slot is already held by an in-flight run, the policy
/// decides: `cancel_in_progress: true` signals the holder to wind down as
/// cancelled; `cancel_in_progress: false` queues the new run behind the
/// holder's completion. Ungrouped runs start immediately.
pub struct RunCoordinator<R> {
    engine: Arc<RunEngine<R>>,
    groups: Arc<Mutex<HashMap<String, GroupSlot>>>,
}

impl<R: CommandRunner + 'static> RunCoordinator<R> {
    pub fn new(engine: RunEngine<R>) -> Self {
        Self {
            engine: Arc::new(engine),
            groups: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub fn engine(&self) -> &RunEngine<R> {
        &self.engine
    }

    /// Plan and start a run for an incoming event.
    ///
    /// Returns `Ok(None)` when the event does not trigger the workflow.
    pub async fn submit(
        &self,
        workflow: &Workflow,
        event: &TriggerEvent,
    ) -> Result<Option<RunHandle>> {
        let Some(mut run) = workflow.plan(event) else {
            debug!(
                "event {} on {} does not trigger '{}'",
                event.kind, event.ref_name, workflow.name
            );
            return Ok(None);
        };

        let run_id = run.run_id();
        let group = run.group.clone();
        let (cancel_tx, cancel_rx) = watch::channel(false);
        let (done_tx, done_rx) = watch::channel(false);

        // Claim the group slot before the run task exists, so a racing
        // submit sees this run as the holder.
        let mut wait_for: Option<watch::Receiver<bool>> = None;
        if let Some(key) = &group {
            let mut groups = self.groups.lock().await;
            if let Some(previous) = groups.get(key) {
                if previous.is_active() {
                    if run.cancel_in_progress {
                        info!(
                            "group '{}': cancelling in-flight run {} for {}",
                            key, previous.run_id, run_id
                        );
                        let _ = previous.cancel.send(true);
                    } else {
                        info!(
                            "group '{}': queueing run {} behind {}",
                            key, run_id, previous.run_id
                        );
                        wait_for = Some(previous.done.clone());
                    }
                }
            }
            groups.insert(
                key.clone(),
                GroupSlot {
                    run_id,
                    cancel: cancel_tx,
                    done: done_rx,
                },
            );
        }

        let engine = self.engine.clone();
        let registry = self.groups.clone();
        let slot_key = group.clone();
        let task = tokio::spawn(async move {
            if let Some(mut done) = wait_for {
                while !*done.borrow() {
                    if done.changed().await.is_err() {
                        // Holder dropped without signalling; treat as finished
                        warn!("run {}: predecessor vanished, starting", run_id);
                        break;
                    }
                }
            }

            let result = engine.execute_with_cancellation(&mut run, cancel_rx).await;
            let _ = done_tx.send(true);

            // Release the slot unless a newer run has already replaced it
            if let Some(key) = slot_key {
                let mut groups = registry.lock().await;
                if groups.get(&key).is_some_and(|slot| slot.run_id == run_id) {
                    groups.remove(&key);
                }
            }

            result.map(|_| run)
        });

        Ok(Some(RunHandle {
            run_id,
            group,
            task,
        }))
    }
}

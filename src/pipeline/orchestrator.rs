//! The pipeline orchestrator. Each tick it walks the automatic states in
//! funnel order, runs the bound handler over a bounded batch of projects,
//! and applies the returned outcomes. A failing project never blocks the
//! rest of the batch.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::machine;
use crate::models::action::ActionRecord;
use crate::models::transition::TransitionActor;
use crate::stages::{handler_for, StageContext, StageOutcome};
use crate::Result;

/// Drives projects through their automatic stages.
pub struct Orchestrator {
    ctx: StageContext,
    tick_lock: Mutex<()>,
}

impl Orchestrator {
    /// Create an orchestrator over the shared stage context.
    #[must_use]
    pub fn new(ctx: StageContext) -> Self {
        Self {
            ctx,
            tick_lock: Mutex::new(()),
        }
    }

    /// Run one tick: process up to `batch_limit` projects per automatic
    /// state, oldest first. Returns the number of applied transitions.
    /// Overlapping calls serialize on an internal lock, so a slow tick
    /// delays the next instead of running concurrently with it.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` when fetching a batch fails. Per-project
    /// failures are logged and recorded, not propagated.
    pub async fn tick(&self) -> Result<u32> {
        let _guard = self.tick_lock.lock().await;
        let batch_limit = i64::from(self.ctx.config.pipeline.batch_limit);
        let mut advanced = 0;

        for state in machine::auto_states() {
            let Some(kind) = machine::stage(state).handler else {
                continue;
            };
            let handler = handler_for(kind);
            let batch = self.ctx.projects.find_by_state(state, batch_limit).await?;

            for project in batch {
                let outcome = match handler.run(&self.ctx, &project).await {
                    Ok(outcome) => outcome,
                    Err(err) => {
                        error!(
                            project_id = project.id,
                            stage = kind.name(),
                            error = %err,
                            "stage handler failed"
                        );
                        let record =
                            ActionRecord::failed(kind.name(), "run", &err.to_string())
                                .for_project(project.id);
                        if let Err(log_err) = self.ctx.actions.record(&record).await {
                            error!(error = %log_err, "failed to record stage failure");
                        }
                        continue;
                    }
                };

                let (next, reason) = match outcome {
                    StageOutcome::Advance { next, reason }
                    | StageOutcome::Fallback { next, reason } => (next, reason),
                    StageOutcome::Stay => continue,
                };

                match self
                    .ctx
                    .projects
                    .transition(
                        project.id,
                        project.current_state,
                        next,
                        TransitionActor::Stage,
                        &reason,
                        None,
                    )
                    .await
                {
                    Ok(true) => advanced += 1,
                    Ok(false) => {
                        debug!(
                            project_id = project.id,
                            "project moved concurrently, skipping transition"
                        );
                    }
                    Err(err) => {
                        error!(project_id = project.id, error = %err, "transition failed");
                    }
                }
            }
        }

        Ok(advanced)
    }

    /// Spawn the tick loop until `cancel` fires.
    #[must_use]
    pub fn spawn(self: Arc<Self>, cancel: CancellationToken) -> JoinHandle<()> {
        let tick_seconds = self.ctx.config.pipeline.tick_seconds;
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_secs(tick_seconds.max(1)));
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    () = cancel.cancelled() => {
                        info!("orchestrator loop stopping");
                        break;
                    }
                    _ = interval.tick() => {
                        match self.tick().await {
                            Ok(0) => {}
                            Ok(n) => info!(transitions = n, "pipeline tick applied"),
                            Err(err) => error!(error = %err, "pipeline tick failed"),
                        }
                    }
                }
            }
        })
    }
}

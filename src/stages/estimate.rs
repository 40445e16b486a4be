//! Estimation stage: hours, price, and task breakdown. A failed estimate
//! never strands the project; it advances on configured defaults instead.

use std::time::Instant;

use tracing::{info, warn};

use crate::models::action::ActionRecord;
use crate::models::project::{Project, ProjectState, ProjectUpdate};
use crate::models::task::NewTask;
use crate::persistence::settings_repo::KEY_HOURLY_RATE;
use crate::services::ai::extract_json;
use crate::services::BoxFuture;
use crate::Result;

use super::{StageContext, StageHandler, StageOutcome};

const SYSTEM_PROMPT: &str = "You estimate freelance software projects. Respond with a single \
JSON object: {\"tasks\": [{\"title\": string, \"description\": string, \
\"hours\": number}], \"total_hours\": number}. total_hours already includes \
a 20 percent buffer for coordination and revisions. Break the work into \
3-10 concrete tasks.";

/// Handler for `RequirementsAnalyzed` projects.
pub struct EstimateStage;

impl StageHandler for EstimateStage {
    fn run<'a>(
        &'a self,
        ctx: &'a StageContext,
        project: &'a Project,
    ) -> BoxFuture<'a, Result<StageOutcome>> {
        Box::pin(run(ctx, project))
    }
}

async fn run(ctx: &StageContext, project: &Project) -> Result<StageOutcome> {
    let started = Instant::now();
    let hourly_rate = ctx
        .settings
        .get_float(KEY_HOURLY_RATE, ctx.config.pipeline.hourly_rate)
        .await?;

    let summary = project
        .analysis
        .as_ref()
        .and_then(|doc| doc.get("requirements_summary"))
        .and_then(|v| v.as_str())
        .unwrap_or("");
    let user_prompt = format!(
        "Title: {}\nCategory: {}\nStack: {}\nSummary: {summary}\n\n{}",
        project.title,
        project.category.as_deref().unwrap_or("other"),
        project.tech_stack.join(", "),
        project.description
    );

    let mut tokens = None;
    let estimate = match ctx.ai.complete(SYSTEM_PROMPT, &user_prompt).await {
        Ok(completion) => {
            tokens = completion.tokens_used;
            match extract_json(&completion.content) {
                Ok(doc) => parse_estimate(&doc),
                Err(err) => {
                    warn!(project_id = project.id, error = %err, "estimate output unusable");
                    None
                }
            }
        }
        Err(err) => {
            warn!(project_id = project.id, error = %err, "estimation call failed");
            None
        }
    };

    let duration = i64::try_from(started.elapsed().as_millis()).unwrap_or(i64::MAX);

    if let Some((tasks, total_hours)) = estimate {
        let price = total_hours * hourly_rate;
        ctx.tasks.replace_breakdown(project.id, &tasks).await?;
        ctx.projects
            .update_fields(
                project.id,
                &[
                    ProjectUpdate::EstimatedHours(total_hours),
                    ProjectUpdate::QuotedPrice(price),
                ],
            )
            .await?;

        let mut record = ActionRecord::ok("estimate", "estimate_project")
            .for_project(project.id)
            .with_output(serde_json::json!({
                "total_hours": total_hours,
                "price": price,
                "tasks": tasks.len(),
            }))
            .with_duration_ms(duration);
        if let Some(tokens) = tokens {
            record = record.with_tokens(tokens);
        }
        ctx.actions.record(&record).await?;

        info!(project_id = project.id, total_hours, price, "estimate ready");
        return Ok(StageOutcome::advance(
            ProjectState::EstimationReady,
            format!("{total_hours:.0}h at {hourly_rate:.0}/h"),
        ));
    }

    // degraded path: price on the configured default hours so the offer
    // can still go out, flagged for the operator in the reason
    let default_hours = ctx.config.pipeline.default_hours;
    let price = default_hours * hourly_rate;
    ctx.projects
        .update_fields(
            project.id,
            &[
                ProjectUpdate::EstimatedHours(default_hours),
                ProjectUpdate::QuotedPrice(price),
            ],
        )
        .await?;
    ctx.actions
        .record(
            &ActionRecord::failed("estimate", "estimate_project", "no usable estimate")
                .for_project(project.id)
                .with_duration_ms(duration),
        )
        .await?;

    info!(project_id = project.id, default_hours, "estimate defaulted");
    Ok(StageOutcome::fallback(
        ProjectState::EstimationReady,
        format!("estimation failed, defaulted to {default_hours:.0}h"),
    ))
}

fn parse_estimate(doc: &serde_json::Value) -> Option<(Vec<NewTask>, f64)> {
    let items = doc.get("tasks")?.as_array()?;
    let mut tasks = Vec::new();
    let mut summed = 0.0;
    for (i, item) in items.iter().enumerate() {
        let title = item.get("title")?.as_str()?.to_string();
        let hours = item.get("hours").and_then(serde_json::Value::as_f64);
        summed += hours.unwrap_or(0.0);
        tasks.push(NewTask {
            title,
            description: item
                .get("description")
                .and_then(|v| v.as_str())
                .map(str::to_string),
            estimated_hours: hours,
            sort_order: i64::try_from(i).unwrap_or(0),
        });
    }
    if tasks.is_empty() {
        return None;
    }
    let total = doc
        .get("total_hours")
        .and_then(serde_json::Value::as_f64)
        .filter(|h| *h > 0.0)
        .unwrap_or_else(|| (summed * 1.2).max(1.0));
    Some((tasks, total))
}

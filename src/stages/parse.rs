//! Parse stage: extract structured fields from the raw inquiry text and
//! link the client record.

use std::time::Instant;

use tracing::{info, warn};

use crate::models::action::ActionRecord;
use crate::models::project::{Project, ProjectState, ProjectUpdate};
use crate::services::ai::extract_json;
use crate::Result;

use super::{StageContext, StageHandler, StageOutcome};
use crate::services::BoxFuture;

const SYSTEM_PROMPT: &str = "You extract structured data from freelance project inquiries. \
Respond with a single JSON object: {\"title\": string, \"description\": string, \
\"budget_min\": number|null, \"budget_max\": number|null, \"tech_stack\": [string], \
\"client_name\": string|null}. Use null when a field is not stated. \
Keep the description faithful to the inquiry, do not invent requirements.";

/// Handler for `New` projects.
pub struct ParseStage;

impl StageHandler for ParseStage {
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
    let user_prompt = format!(
        "Subject: {}\n\nInquiry:\n{}",
        project.title, project.description
    );

    let mut client_name: Option<String> = None;
    let mut updates: Vec<ProjectUpdate> = Vec::new();
    let mut tokens = None;

    let doc = match ctx.ai.complete(SYSTEM_PROMPT, &user_prompt).await {
        Ok(completion) => {
            tokens = completion.tokens_used;
            match extract_json(&completion.content) {
                Ok(doc) => Some(doc),
                Err(err) => {
                    warn!(project_id = project.id, error = %err, "parse output unusable, keeping raw fields");
                    None
                }
            }
        }
        Err(err) => {
            // keep the raw subject/body as title/description
            warn!(project_id = project.id, error = %err, "parse extraction failed, keeping raw fields");
            None
        }
    };
    if let Some(doc) = doc {
        if let Some(title) = doc.get("title").and_then(|v| v.as_str()) {
            if !title.trim().is_empty() {
                updates.push(ProjectUpdate::Title(title.trim().to_string()));
            }
        }
        if let Some(description) = doc.get("description").and_then(|v| v.as_str()) {
            if !description.trim().is_empty() {
                updates.push(ProjectUpdate::Description(description.trim().to_string()));
            }
        }
        if let Some(min) = doc.get("budget_min").and_then(serde_json::Value::as_f64) {
            updates.push(ProjectUpdate::BudgetMin(min));
        }
        if let Some(max) = doc.get("budget_max").and_then(serde_json::Value::as_f64) {
            updates.push(ProjectUpdate::BudgetMax(max));
        }
        if let Some(stack) = doc.get("tech_stack").and_then(|v| v.as_array()) {
            let stack: Vec<String> = stack
                .iter()
                .filter_map(|v| v.as_str().map(str::to_string))
                .collect();
            if !stack.is_empty() {
                updates.push(ProjectUpdate::TechStack(stack));
            }
        }
        client_name = doc
            .get("client_name")
            .and_then(|v| v.as_str())
            .map(str::to_string);
    }

    if project.client_id.is_none() && !project.client_email.is_empty() {
        let client = ctx
            .clients
            .upsert_for_inquiry(&project.client_email, client_name.as_deref())
            .await?;
        updates.push(ProjectUpdate::ClientId(client.id));
    }

    if !updates.is_empty() {
        ctx.projects.update_fields(project.id, &updates).await?;
    }

    let duration = i64::try_from(started.elapsed().as_millis()).unwrap_or(i64::MAX);
    let mut record = ActionRecord::ok("parse", "extract_fields")
        .for_project(project.id)
        .with_duration_ms(duration);
    if let Some(tokens) = tokens {
        record = record.with_tokens(tokens);
    }
    ctx.actions.record(&record).await?;

    info!(project_id = project.id, "inquiry parsed");
    Ok(StageOutcome::advance(
        ProjectState::Parsed,
        "fields extracted from inquiry",
    ))
}

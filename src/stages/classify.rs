//! Classification stage: assign category, complexity tier, and stack.

use std::time::Instant;

use tracing::{info, warn};

use crate::models::action::ActionRecord;
use crate::models::project::{Complexity, Project, ProjectState, ProjectUpdate};
use crate::services::ai::extract_json;
use crate::services::BoxFuture;
use crate::Result;

use super::{StageContext, StageHandler, StageOutcome};

const SYSTEM_PROMPT: &str = "You classify freelance software projects. Respond with a single \
JSON object: {\"category\": string (one of web_development, mobile_development, \
data_engineering, automation, integration, devops, other), \
\"complexity\": string (one of micro, small, medium, large, rnd), \
\"tech_stack\": [string], \"familiar_stack\": boolean}. \
micro is under 4 hours, small 4-20, medium 20-80, large 80-200, \
rnd needs research before any estimate.";

/// Handler for `Analyzed` projects.
pub struct ClassifyStage;

impl StageHandler for ClassifyStage {
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
        "Title: {}\nKnown stack: {}\n\n{}",
        project.title,
        project.tech_stack.join(", "),
        project.description
    );

    let mut tokens = None;
    let doc = match ctx.ai.complete(SYSTEM_PROMPT, &user_prompt).await {
        Ok(completion) => {
            tokens = completion.tokens_used;
            extract_json(&completion.content)
        }
        Err(err) => Err(err),
    };
    let (category, complexity, stack, familiar) =
        match doc {
            Ok(doc) => {
                let category = doc
                    .get("category")
                    .and_then(|v| v.as_str())
                    .unwrap_or("other")
                    .to_string();
                let complexity = doc
                    .get("complexity")
                    .and_then(|v| v.as_str())
                    .and_then(Complexity::parse)
                    .unwrap_or(Complexity::Medium);
                let stack: Vec<String> = doc
                    .get("tech_stack")
                    .and_then(|v| v.as_array())
                    .map(|items| {
                        items
                            .iter()
                            .filter_map(|v| v.as_str().map(str::to_string))
                            .collect()
                    })
                    .unwrap_or_default();
                let familiar = doc
                    .get("familiar_stack")
                    .and_then(serde_json::Value::as_bool)
                    .unwrap_or(true);
                (category, complexity, stack, familiar)
            }
            Err(err) => {
                warn!(project_id = project.id, error = %err, "classification failed, using defaults");
                ("other".to_string(), Complexity::Medium, Vec::new(), true)
            }
        };

    let mut updates = vec![
        ProjectUpdate::Category(category.clone()),
        ProjectUpdate::Complexity(complexity),
        ProjectUpdate::FamiliarStack(familiar),
    ];
    if !stack.is_empty() {
        updates.push(ProjectUpdate::TechStack(stack));
    }
    ctx.projects.update_fields(project.id, &updates).await?;

    let duration = i64::try_from(started.elapsed().as_millis()).unwrap_or(i64::MAX);
    let mut record = ActionRecord::ok("classify", "classify_project")
        .for_project(project.id)
        .with_output(serde_json::json!({
            "category": category,
            "complexity": complexity.as_str(),
        }))
        .with_duration_ms(duration);
    if let Some(tokens) = tokens {
        record = record.with_tokens(tokens);
    }
    ctx.actions.record(&record).await?;

    info!(project_id = project.id, category, complexity = complexity.as_str(), "project classified");
    Ok(StageOutcome::advance(
        ProjectState::Classified,
        format!("classified as {category} / {}", complexity.as_str()),
    ))
}

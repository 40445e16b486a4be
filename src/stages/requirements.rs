//! Requirements stage: judge brief clarity and run the bounded
//! clarification loop.

use std::time::Instant;

use tracing::{info, warn};

use crate::models::action::ActionRecord;
use crate::models::message::NewMessage;
use crate::models::project::{Project, ProjectState, ProjectUpdate, SourceChannel};
use crate::persistence::settings_repo::{KEY_CLARITY_THRESHOLD, KEY_MAX_CLARIFICATION_ROUNDS};
use crate::services::ai::extract_json;
use crate::services::BoxFuture;
use crate::Result;

use super::{StageContext, StageHandler, StageOutcome};

const SYSTEM_PROMPT: &str = "You analyze freelance project briefs for completeness. Respond \
with a single JSON object: {\"clarity_score\": number between 0 and 10, \
\"summary\": string, \"questions\": [string]}. The score reflects whether \
scope, deliverables, and constraints are stated well enough to estimate. \
Questions are the most important unknowns, at most five, client-facing \
wording.";

/// Handler for `Classified` projects.
pub struct RequirementsStage;

impl StageHandler for RequirementsStage {
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
    let clarity_threshold = ctx
        .settings
        .get_float(KEY_CLARITY_THRESHOLD, ctx.config.pipeline.clarity_threshold)
        .await?;
    let max_rounds = ctx
        .settings
        .get_int(
            KEY_MAX_CLARIFICATION_ROUNDS,
            i64::from(ctx.config.pipeline.max_clarification_rounds),
        )
        .await?;
    let round = i64::from(project.clarification_round());

    // fold any clarification replies into the prompt
    let replies = ctx.messages.unprocessed_inbound(project.id).await?;
    let mut user_prompt = format!("Title: {}\n\n{}", project.title, project.description);
    for reply in &replies {
        user_prompt.push_str("\n\nClient clarification:\n");
        user_prompt.push_str(&reply.body);
    }

    let mut tokens = None;
    let doc = match ctx.ai.complete(SYSTEM_PROMPT, &user_prompt).await {
        Ok(completion) => {
            tokens = completion.tokens_used;
            extract_json(&completion.content)
        }
        Err(err) => Err(err),
    };
    let (clarity, summary, questions) = match doc {
        Ok(doc) => {
            let clarity = doc
                .get("clarity_score")
                .and_then(serde_json::Value::as_f64)
                .unwrap_or(0.0)
                .clamp(0.0, 10.0);
            let summary = doc
                .get("summary")
                .and_then(|v| v.as_str())
                .unwrap_or_default()
                .to_string();
            let questions: Vec<String> = doc
                .get("questions")
                .and_then(|v| v.as_array())
                .map(|items| {
                    items
                        .iter()
                        .filter_map(|v| v.as_str().map(str::to_string))
                        .collect()
                })
                .unwrap_or_default();
            (clarity, summary, questions)
        }
        Err(err) => {
            warn!(project_id = project.id, error = %err, "clarity analysis failed, proceeding on assumptions");
            (10.0, String::new(), Vec::new())
        }
    };

    for reply in &replies {
        ctx.messages.mark_processed(reply.id).await?;
    }

    let clear_enough = clarity >= clarity_threshold || questions.is_empty();
    let rounds_exhausted = round >= max_rounds;

    let mut analysis = project
        .analysis
        .clone()
        .unwrap_or_else(|| serde_json::json!({}));
    analysis["clarity_score"] = serde_json::json!(clarity);
    if !summary.is_empty() {
        analysis["requirements_summary"] = serde_json::json!(summary);
    }

    let duration = i64::try_from(started.elapsed().as_millis()).unwrap_or(i64::MAX);
    let mut record = ActionRecord::ok("requirements", "analyze_clarity")
        .for_project(project.id)
        .with_output(serde_json::json!({"clarity_score": clarity, "round": round}))
        .with_duration_ms(duration);
    if let Some(tokens) = tokens {
        record = record.with_tokens(tokens);
    }
    ctx.actions.record(&record).await?;

    if clear_enough || rounds_exhausted {
        ctx.projects
            .update_fields(project.id, &[ProjectUpdate::Analysis(analysis)])
            .await?;
        // acknowledge an email inquiry once, before any clarification ever
        // went out; clients who already got questions need no second ack
        if round == 0
            && project.source == SourceChannel::Email
            && !project.client_email.is_empty()
        {
            let message = NewMessage::outbound(
                project.id,
                ctx.config.mail.from_address.clone(),
                project.client_email.clone(),
                format!("Re: {}", project.title),
                acknowledgement_body(&project.title, &ctx.config.identity.signature()),
            )
            .replying_to(project.source_message_id.clone());
            ctx.messages.insert(&message).await?;
        }
        let reason = if clear_enough {
            format!("brief clear enough ({clarity:.1})")
        } else {
            format!("round limit {max_rounds} reached, proceeding on assumptions")
        };
        info!(project_id = project.id, clarity, "requirements settled");
        return Ok(StageOutcome::advance(ProjectState::RequirementsAnalyzed, reason));
    }

    // ask the client and wait
    analysis["clarification_round"] = serde_json::json!(round + 1);
    ctx.projects
        .update_fields(project.id, &[ProjectUpdate::Analysis(analysis)])
        .await?;

    let body = clarification_body(&project.title, &questions, &ctx.config.identity.signature());
    let last_out = ctx.messages.last_outbound(project.id).await?;
    let message = NewMessage::outbound(
        project.id,
        ctx.config.mail.from_address.clone(),
        project.client_email.clone(),
        format!("Re: {}", project.title),
        body,
    )
    .replying_to(
        last_out
            .and_then(|m| m.correlation_id)
            .or_else(|| project.source_message_id.clone()),
    );
    ctx.messages.insert(&message).await?;

    info!(project_id = project.id, round = round + 1, "clarification requested");
    Ok(StageOutcome::fallback(
        ProjectState::ClarificationNeeded,
        format!("clarity {clarity:.1} below {clarity_threshold:.1}, round {}", round + 1),
    ))
}

fn acknowledgement_body(title: &str, signature: &str) -> String {
    format!(
        "Hello,\n\nThank you for the details on \"{title}\". The brief gives me what I \
need to prepare an estimate; you will receive a full proposal shortly.\n\n\
Best regards\n{signature}"
    )
}

fn clarification_body(title: &str, questions: &[String], signature: &str) -> String {
    let mut body = format!(
        "Hello,\n\nThank you for the details on \"{title}\". Before I can put together \
a solid estimate, could you clarify the following:\n\n"
    );
    for (i, question) in questions.iter().enumerate() {
        body.push_str(&format!("{}. {question}\n", i + 1));
    }
    body.push_str("\nBest regards\n");
    body.push_str(signature);
    body
}

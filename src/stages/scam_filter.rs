//! Scam filter stage: score fraud and illegality risk, rejecting projects
//! at or above the configured threshold.

use std::time::Instant;

use tracing::{info, warn};

use crate::models::action::ActionRecord;
use crate::models::project::{Project, ProjectState, ProjectUpdate};
use crate::persistence::settings_repo::KEY_SCAM_THRESHOLD;
use crate::services::ai::extract_json;
use crate::services::{BoxFuture, NotifyEvent};
use crate::Result;

use super::{StageContext, StageHandler, StageOutcome};

const SYSTEM_PROMPT: &str = "You assess freelance project inquiries for fraud and legality. \
Respond with a single JSON object: {\"scam_score\": number between 0 and 1, \
\"is_illegal\": boolean, \"reason\": string}. High scores mean likely fraud \
(advance-fee schemes, payment outside the platform, check overpayment, \
cryptocurrency doubling, personal data harvesting). is_illegal is true only \
when the requested work itself is unlawful.";

/// Phrases that mark an inquiry as near-certain fraud when the AI backend
/// is unavailable.
const SUSPECT_PHRASES: &[&str] = &[
    "western union",
    "wire transfer upfront",
    "cashier's check",
    "certified check",
    "money mule",
    "process payments through your account",
    "your bank account details",
];

/// Handler for `Parsed` projects.
pub struct ScamFilterStage;

impl StageHandler for ScamFilterStage {
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
    let threshold = ctx
        .settings
        .get_float(KEY_SCAM_THRESHOLD, ctx.config.pipeline.scam_threshold)
        .await?;

    let user_prompt = format!("{}\n\n{}", project.title, project.description);
    let mut tokens = None;

    let doc = match ctx.ai.complete(SYSTEM_PROMPT, &user_prompt).await {
        Ok(completion) => {
            tokens = completion.tokens_used;
            extract_json(&completion.content)
        }
        Err(err) => Err(err),
    };
    let (score, is_illegal, reason) = match doc {
        Ok(doc) => {
            let score = doc
                .get("scam_score")
                .and_then(serde_json::Value::as_f64)
                .unwrap_or(0.0)
                .clamp(0.0, 1.0);
            let is_illegal = doc
                .get("is_illegal")
                .and_then(serde_json::Value::as_bool)
                .unwrap_or(false);
            let reason = doc
                .get("reason")
                .and_then(|v| v.as_str())
                .unwrap_or("risk assessment")
                .to_string();
            (score, is_illegal, reason)
        }
        Err(err) => {
            warn!(project_id = project.id, error = %err, "risk scoring failed, using phrase heuristic");
            heuristic_score(&project.description)
        }
    };

    // the threshold boundary is inclusive: score == threshold rejects
    let rejected = score >= threshold || is_illegal;

    let mut updates = vec![
        ProjectUpdate::ScamScore(score),
        ProjectUpdate::IsScam(rejected && !is_illegal),
        ProjectUpdate::IsIllegal(is_illegal),
    ];
    if rejected {
        updates.push(ProjectUpdate::RejectionReason(reason.clone()));
    }
    ctx.projects.update_fields(project.id, &updates).await?;

    if rejected && is_illegal && !project.client_email.is_empty() {
        ctx.clients
            .blacklist(&project.client_email, &reason)
            .await?;
    }

    let duration = i64::try_from(started.elapsed().as_millis()).unwrap_or(i64::MAX);
    let mut record = ActionRecord::ok("scam_filter", "assess_risk")
        .for_project(project.id)
        .with_output(serde_json::json!({"scam_score": score, "is_illegal": is_illegal}))
        .with_duration_ms(duration);
    if let Some(tokens) = tokens {
        record = record.with_tokens(tokens);
    }
    ctx.actions.record(&record).await?;

    if rejected {
        info!(project_id = project.id, score, "project filtered out");
        ctx.notifier
            .notify(&NotifyEvent::ProjectRejected {
                project_id: project.id,
                title: project.title.clone(),
                reason: reason.clone(),
            })
            .await?;
        return Ok(StageOutcome::fallback(ProjectState::Rejected, reason));
    }

    Ok(StageOutcome::advance(
        ProjectState::Analyzed,
        format!("risk score {score:.2} below threshold"),
    ))
}

fn heuristic_score(text: &str) -> (f64, bool, String) {
    let lowered = text.to_lowercase();
    for phrase in SUSPECT_PHRASES {
        if lowered.contains(phrase) {
            return (0.9, false, format!("suspicious phrase: {phrase}"));
        }
    }
    (0.0, false, "no risk signals found".to_string())
}

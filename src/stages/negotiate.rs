//! Negotiation stage: answer client replies, detect acceptance or decline,
//! and hand over to the operator when the exchange runs too long.

use std::time::Instant;

use tracing::{info, warn};

use crate::models::action::ActionRecord;
use crate::models::message::{Direction, NewMessage};
use crate::models::project::{Project, ProjectState, ProjectUpdate, SourceChannel};
use crate::persistence::settings_repo::KEY_MAX_NEGOTIATION_ROUNDS;
use crate::services::ai::extract_json;
use crate::services::{BoxFuture, NotifyEvent};
use crate::Result;

use super::{StageContext, StageHandler, StageOutcome};

const SYSTEM_PROMPT: &str = "You negotiate freelance contracts on behalf of the contractor. \
Given the conversation so far and the client's latest messages, respond \
with a single JSON object: {\"intent\": \"accept\"|\"decline\"|\"counter\"|\"question\", \
\"reply\": string, \"agreed_price\": number|null}. intent is accept only \
when the client clearly agreed to price and terms, decline only when they \
clearly walked away. The reply is a complete client-facing message. Hold \
the quoted price unless the client asks for scope changes; never go below \
80 percent of the quote.";

/// Handler for `Negotiation` projects.
pub struct NegotiateStage;

impl StageHandler for NegotiateStage {
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
    let pending = ctx.messages.unprocessed_inbound(project.id).await?;
    if pending.is_empty() {
        return Ok(StageOutcome::Stay);
    }

    let max_rounds = ctx
        .settings
        .get_int(
            KEY_MAX_NEGOTIATION_ROUNDS,
            i64::from(ctx.config.pipeline.max_negotiation_rounds),
        )
        .await?;
    let mut analysis = project
        .analysis
        .clone()
        .unwrap_or_else(|| serde_json::json!({}));
    let round = analysis
        .get("negotiation_round")
        .and_then(serde_json::Value::as_i64)
        .unwrap_or(0);

    if round >= max_rounds {
        // hand over to the operator; messages stay unprocessed for review
        let already_escalated = analysis
            .get("escalated")
            .and_then(serde_json::Value::as_bool)
            .unwrap_or(false);
        if !already_escalated {
            analysis["escalated"] = serde_json::json!(true);
            ctx.projects
                .update_fields(project.id, &[ProjectUpdate::Analysis(analysis)])
                .await?;
            ctx.notifier
                .notify(&NotifyEvent::EscalationNeeded {
                    project_id: project.id,
                    title: project.title.clone(),
                    reason: format!("negotiation exceeded {max_rounds} rounds"),
                })
                .await?;
            info!(project_id = project.id, "negotiation escalated to operator");
        }
        return Ok(StageOutcome::Stay);
    }

    let conversation = ctx.messages.conversation(project.id).await?;
    let mut transcript = String::new();
    for message in &conversation {
        let speaker = match message.direction {
            Direction::Inbound => "Client",
            Direction::Outbound => "Me",
        };
        transcript.push_str(&format!("{speaker}: {}\n\n", message.body));
    }

    let user_prompt = format!(
        "Project: {}\nQuoted price: {:.2}\n\nConversation:\n{transcript}",
        project.title,
        project.quoted_price.unwrap_or(0.0),
    );

    let completion = match ctx.ai.complete(SYSTEM_PROMPT, &user_prompt).await {
        Ok(completion) => completion,
        Err(err) => {
            // leave messages unprocessed so the next tick retries
            warn!(project_id = project.id, error = %err, "negotiation reply failed");
            return Ok(StageOutcome::Stay);
        }
    };
    let doc = match extract_json(&completion.content) {
        Ok(doc) => doc,
        Err(err) => {
            // leave messages unprocessed so the next tick retries
            warn!(project_id = project.id, error = %err, "negotiation reply unusable");
            return Ok(StageOutcome::Stay);
        }
    };
    let intent = doc
        .get("intent")
        .and_then(|v| v.as_str())
        .unwrap_or("question")
        .to_string();
    let reply = doc
        .get("reply")
        .and_then(|v| v.as_str())
        .unwrap_or_default()
        .to_string();
    let agreed_price = doc.get("agreed_price").and_then(serde_json::Value::as_f64);

    for message in &pending {
        ctx.messages.mark_processed(message.id).await?;
    }

    if !reply.is_empty() {
        let last_in = pending.last();
        let thread_id = last_in.and_then(|m| m.thread_id.clone());
        let message = NewMessage::outbound(
            project.id,
            ctx.config.mail.from_address.clone(),
            project.client_email.clone(),
            format!("Re: {}", project.title),
            reply.clone(),
        )
        .replying_to(last_in.and_then(|m| m.correlation_id.clone()))
        .in_thread(thread_id.clone());

        match (project.source, thread_id.as_deref()) {
            (SourceChannel::Marketplace, Some(thread)) => {
                // thread replies go straight through the marketplace; the
                // stored row is pre-consumed so the mail drain skips it
                match ctx.marketplace.send_reply(thread, &reply).await {
                    Ok(()) => {
                        let stored = ctx.messages.insert(&message).await?;
                        ctx.messages.mark_processed(stored.id).await?;
                    }
                    Err(err) => {
                        warn!(project_id = project.id, error = %err, "thread reply failed");
                        ctx.actions
                            .record(
                                &ActionRecord::failed("negotiate", "send_reply", &err.to_string())
                                    .for_project(project.id),
                            )
                            .await?;
                    }
                }
            }
            _ => {
                ctx.messages.insert(&message).await?;
            }
        }
    }

    let duration = i64::try_from(started.elapsed().as_millis()).unwrap_or(i64::MAX);
    let mut record = ActionRecord::ok("negotiate", "handle_reply")
        .for_project(project.id)
        .with_output(serde_json::json!({"intent": intent, "round": round}))
        .with_duration_ms(duration);
    if let Some(tokens) = completion.tokens_used {
        record = record.with_tokens(tokens);
    }
    ctx.actions.record(&record).await?;

    match intent.as_str() {
        "accept" => {
            let final_price = agreed_price
                .or(project.quoted_price)
                .unwrap_or(0.0);
            ctx.projects
                .update_fields(project.id, &[ProjectUpdate::FinalPrice(final_price)])
                .await?;
            ctx.notifier
                .notify(&NotifyEvent::AgreementReached {
                    project_id: project.id,
                    title: project.title.clone(),
                })
                .await?;
            info!(project_id = project.id, final_price, "client accepted");
            Ok(StageOutcome::advance(
                ProjectState::Agreed,
                format!("client accepted at {final_price:.2}"),
            ))
        }
        "decline" => {
            let reason = "client declined the offer".to_string();
            ctx.projects
                .update_fields(project.id, &[ProjectUpdate::RejectionReason(reason.clone())])
                .await?;
            ctx.notifier
                .notify(&NotifyEvent::ProjectRejected {
                    project_id: project.id,
                    title: project.title.clone(),
                    reason: reason.clone(),
                })
                .await?;
            info!(project_id = project.id, "client declined");
            Ok(StageOutcome::fallback(ProjectState::Rejected, reason))
        }
        _ => {
            analysis["negotiation_round"] = serde_json::json!(round + 1);
            ctx.projects
                .update_fields(project.id, &[ProjectUpdate::Analysis(analysis)])
                .await?;
            info!(project_id = project.id, round = round + 1, "negotiation reply queued");
            Ok(StageOutcome::Stay)
        }
    }
}

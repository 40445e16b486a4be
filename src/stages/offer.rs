//! Offer stage: compose the proposal and queue it for delivery (or place
//! a marketplace bid).

use std::time::Instant;

use tracing::{info, warn};

use crate::models::action::ActionRecord;
use crate::models::message::NewMessage;
use crate::models::project::{Project, ProjectState, SourceChannel};
use crate::persistence::settings_repo::KEY_PREPAYMENT_PERCENTAGE;
use crate::services::{BidRequest, BoxFuture, NotifyEvent};
use crate::Result;

use super::{StageContext, StageHandler, StageOutcome};

const SYSTEM_PROMPT: &str = "You write concise, professional freelance proposals. Respond with \
plain text only: a short greeting, a two-paragraph pitch tailored to the \
project, the price and timeline lines exactly as given by the user, and a \
closing. No markdown, no placeholders.";

/// Handler for `EstimationReady` projects.
pub struct OfferStage;

impl StageHandler for OfferStage {
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
    let prepayment = ctx
        .settings
        .get_int(
            KEY_PREPAYMENT_PERCENTAGE,
            i64::from(ctx.config.pipeline.prepayment_percentage),
        )
        .await?;
    let price = project.quoted_price.unwrap_or(0.0);
    let hours = project.estimated_hours.unwrap_or(0.0);
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let period_days = ((hours / 6.0).ceil() as u32).max(1);

    let terms = format!(
        "Price: {price:.2}\nTimeline: {period_days} days\nTerms: {prepayment}% upfront, \
remainder on delivery"
    );
    let user_prompt = format!(
        "Project: {}\nEstimated effort: {hours:.0} hours\n{terms}\n\nBrief:\n{}",
        project.title, project.description
    );

    let mut tokens = None;
    let proposal = match ctx.ai.complete(SYSTEM_PROMPT, &user_prompt).await {
        Ok(completion) => {
            tokens = completion.tokens_used;
            completion.content.trim().to_string()
        }
        Err(err) => {
            warn!(project_id = project.id, error = %err, "proposal drafting failed, using template");
            template_proposal(project, &terms, &ctx.config.identity.signature())
        }
    };

    match project.source {
        SourceChannel::Marketplace if project.source_url.is_some() => {
            let bid = BidRequest {
                project_url: project.source_url.clone().unwrap_or_default(),
                amount: price,
                period_days,
                proposal: proposal.clone(),
            };
            if let Err(err) = ctx.marketplace.place_bid(&bid).await {
                // the proposal is recorded for manual submission; the
                // project still moves on so the funnel never blocks
                warn!(project_id = project.id, error = %err, "bid submission failed, handing to operator");
                ctx.actions
                    .record(
                        &ActionRecord::failed("offer", "place_bid", &err.to_string())
                            .for_project(project.id)
                            .with_output(serde_json::json!({
                                "price": price,
                                "period_days": period_days,
                                "proposal": proposal,
                            })),
                    )
                    .await?;
                ctx.notifier
                    .notify(&NotifyEvent::EscalationNeeded {
                        project_id: project.id,
                        title: project.title.clone(),
                        reason: format!("bid submission failed: {err}"),
                    })
                    .await?;
                return Ok(StageOutcome::fallback(
                    ProjectState::OfferSent,
                    format!("bid failed, proposal recorded at {price:.2}"),
                ));
            }
        }
        _ => {
            let last_out = ctx.messages.last_outbound(project.id).await?;
            let message = NewMessage::outbound(
                project.id,
                ctx.config.mail.from_address.clone(),
                project.client_email.clone(),
                format!("Proposal: {}", project.title),
                proposal.clone(),
            )
            .replying_to(
                last_out
                    .and_then(|m| m.correlation_id)
                    .or_else(|| project.source_message_id.clone()),
            );
            ctx.messages.insert(&message).await?;
        }
    }

    let duration = i64::try_from(started.elapsed().as_millis()).unwrap_or(i64::MAX);
    let mut record = ActionRecord::ok("offer", "compose_offer")
        .for_project(project.id)
        .with_output(serde_json::json!({"price": price, "period_days": period_days}))
        .with_duration_ms(duration);
    if let Some(tokens) = tokens {
        record = record.with_tokens(tokens);
    }
    ctx.actions.record(&record).await?;

    ctx.notifier
        .notify(&NotifyEvent::OfferQueued {
            project_id: project.id,
            title: project.title.clone(),
            price,
        })
        .await?;

    info!(project_id = project.id, price, "offer queued");
    Ok(StageOutcome::advance(
        ProjectState::OfferSent,
        format!("offer at {price:.2} for {period_days} days"),
    ))
}

fn template_proposal(project: &Project, terms: &str, signature: &str) -> String {
    format!(
        "Hello,\n\nthank you for the inquiry about \"{}\". I reviewed the brief and \
can deliver the described scope.\n\n{terms}\n\nHappy to answer any questions.\n\n\
Best regards\n{signature}",
        project.title
    )
}

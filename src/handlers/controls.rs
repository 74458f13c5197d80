//! Persistent control handlers.

use super::{Context, ControlHandler, Reply};
use crate::error::{Missing, TicketError, TicketResult};
use crate::platform::{Embed, UserId, colors};
use crate::ticket::ClaimOutcome;
use async_trait::async_trait;

/// Create-ticket button on a panel's entry point.
pub struct CreateTicketHandler;

#[async_trait]
impl ControlHandler for CreateTicketHandler {
    async fn handle(&self, ctx: &Context<'_>) -> TicketResult<Reply> {
        let entry_point = ctx
            .message_id
            .ok_or(TicketError::NotFound(Missing::Panel))?;
        let opened = ctx
            .engine
            .open_ticket(ctx.guild_id, entry_point, ctx.actor)
            .await?;
        Ok(Reply::private(format!(
            "Ticket created: {}",
            opened.channel_id.mention()
        )))
    }
}

pub struct CloseTicketHandler;

#[async_trait]
impl ControlHandler for CloseTicketHandler {
    async fn handle(&self, ctx: &Context<'_>) -> TicketResult<Reply> {
        ctx.engine
            .close_ticket(ctx.channel_id, ctx.actor, ctx.message_id)
            .await?;
        Ok(Reply::silent())
    }
}

pub struct ClaimTicketHandler;

#[async_trait]
impl ControlHandler for ClaimTicketHandler {
    async fn handle(&self, ctx: &Context<'_>) -> TicketResult<Reply> {
        let outcome = ctx.engine.toggle_claim(ctx.channel_id, ctx.actor).await?;
        Ok(claim_reply(outcome, ctx.actor.user_id))
    }
}

/// Announcement for a claim change; an existing claim is reported privately.
pub(super) fn claim_reply(outcome: ClaimOutcome, actor: UserId) -> Reply {
    match outcome {
        ClaimOutcome::Claimed => Reply::public_embed(
            Embed::new(colors::GOLD)
                .title("Ticket Claimed")
                .description(format!("This ticket has been claimed by {}.", actor.mention())),
        ),
        ClaimOutcome::Unclaimed => Reply::public_embed(
            Embed::new(colors::GREY)
                .title("Ticket Unclaimed")
                .description(format!("{} released this ticket.", actor.mention())),
        ),
        ClaimOutcome::HeldBy(holder) if holder == actor => {
            Reply::private("You have already claimed this ticket.")
        }
        ClaimOutcome::HeldBy(holder) => Reply::private(format!(
            "This ticket is already claimed by {}.",
            holder.mention()
        )),
    }
}

pub struct ReopenTicketHandler;

#[async_trait]
impl ControlHandler for ReopenTicketHandler {
    async fn handle(&self, ctx: &Context<'_>) -> TicketResult<Reply> {
        ctx.engine
            .reopen_ticket(ctx.channel_id, ctx.actor, ctx.message_id)
            .await?;
        Ok(Reply::silent())
    }
}

pub struct DeleteTicketHandler;

#[async_trait]
impl ControlHandler for DeleteTicketHandler {
    async fn handle(&self, ctx: &Context<'_>) -> TicketResult<Reply> {
        ctx.engine.delete_ticket(ctx.channel_id, ctx.actor).await?;
        Ok(Reply::silent())
    }
}

/// Owner's confirmation on a close request.
pub struct ConfirmCloseHandler;

#[async_trait]
impl ControlHandler for ConfirmCloseHandler {
    async fn handle(&self, ctx: &Context<'_>) -> TicketResult<Reply> {
        ctx.engine
            .confirm_close(ctx.channel_id, ctx.actor, ctx.message_id)
            .await?;
        Ok(Reply::silent())
    }
}
